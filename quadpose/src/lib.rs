pub mod types;
pub mod error;
pub mod detect;
