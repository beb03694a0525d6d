pub mod catalog;
pub mod metrics;
pub mod noise;
pub mod report;
pub mod scene;
