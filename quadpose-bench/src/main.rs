use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;
use quadpose::detect::pipeline::{FrameResult, Pipeline, PipelineConfig};
use rayon::prelude::*;

use quadpose_bench::catalog::{self, Category, Scenario, Thresholds};
use quadpose_bench::metrics::{self, DetectionSummary};
use quadpose_bench::noise::ContourNoise;
use quadpose_bench::report::{self, FullReport, ScenarioReport};
use quadpose_bench::scene::{Clutter, Scene, SceneBuilder};

#[derive(Parser)]
#[command(name = "quadpose-bench", about = "Quad target pose test harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run test scenarios and output results.
    Run {
        /// Filter by category name.
        #[arg(long)]
        category: Option<String>,
        /// Filter by scenario name pattern (substring match).
        #[arg(long)]
        scenario: Option<String>,
        /// Output format: terminal, json.
        #[arg(long, default_value = "terminal")]
        format: String,
        /// Corner RMSE pass threshold in pixels (overrides the scenario's).
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,
        /// Only show failures.
        #[arg(long)]
        quiet: bool,
    },
    /// List available scenarios.
    List {
        /// Filter by category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Run all scenarios and exit with code 1 on any failure.
    Regression {
        /// Filter by category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Generate and pose a single scene with custom parameters.
    Explore {
        /// In-plane roll in degrees.
        #[arg(long, default_value_t = 0.0)]
        roll: f64,
        /// Tilt about the x axis in degrees.
        #[arg(long, default_value_t = 0.0)]
        tilt_x: f64,
        /// Tilt about the y axis in degrees.
        #[arg(long, default_value_t = 0.0)]
        tilt_y: f64,
        /// Distance along the optical axis, in model units.
        #[arg(long, default_value_t = 20.0)]
        distance: f64,
        /// Lateral offset in model units.
        #[arg(long, default_value_t = 0.0)]
        offset_x: f64,
        /// Vertical offset in model units.
        #[arg(long, default_value_t = 0.0)]
        offset_y: f64,
        /// Contour jitter sigma in pixels.
        #[arg(long, default_value_t = 0.0)]
        jitter: f64,
        /// Add distractor contours around the target.
        #[arg(long)]
        clutter: bool,
        /// Polygon approximation tolerance in pixels.
        #[arg(long, default_value_t = 4.0)]
        tolerance: f64,
        /// Output format: terminal, json.
        #[arg(long, default_value = "terminal")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            category,
            scenario,
            format,
            threshold,
            quiet,
        } => cmd_run(category, scenario, &format, threshold, quiet),
        Command::List { category } => cmd_list(category),
        Command::Regression { category } => cmd_regression(category),
        Command::Explore {
            roll,
            tilt_x,
            tilt_y,
            distance,
            offset_x,
            offset_y,
            jitter,
            clutter,
            tolerance,
            format,
        } => cmd_explore(
            roll, tilt_x, tilt_y, distance, offset_x, offset_y, jitter, clutter, tolerance,
            &format,
        ),
    }
}

fn filter_scenarios(
    category: Option<String>,
    scenario: Option<String>,
) -> anyhow::Result<Vec<Scenario>> {
    let mut scenarios = if let Some(cat_name) = &category {
        let Some(cat) = Category::from_name(cat_name) else {
            let known: Vec<&str> = Category::all().iter().map(|c| c.name()).collect();
            bail!("unknown category: {cat_name} (expected one of {})", known.join(", "));
        };
        catalog::scenarios_for_category(cat)
    } else {
        catalog::all_scenarios()
    };

    if let Some(pattern) = &scenario {
        scenarios.retain(|s| s.name.contains(pattern.as_str()));
    }

    Ok(scenarios)
}

fn run_scene(
    scene: &Scene,
    config: PipelineConfig,
) -> anyhow::Result<(metrics::SceneResult, FrameResult)> {
    let pipeline = Pipeline::new(config, scene.camera.clone(), scene.model.clone())
        .context("building pipeline")?;

    let start = Instant::now();
    let frame = pipeline.process_frame(&scene.frame);
    let elapsed = start.elapsed();

    let result = metrics::evaluate(&scene.ground_truth, &frame, elapsed.as_micros() as u64);
    Ok((result, frame))
}

fn run_scenario(scenario: &Scenario, thresholds: Thresholds) -> anyhow::Result<ScenarioReport> {
    let scene = scenario.build();
    let (result, _) = run_scene(&scene, scenario.config.clone())
        .with_context(|| format!("scenario {}", scenario.name))?;
    Ok(report::scenario_report(
        &scenario.name,
        scenario.category.name(),
        &result,
        scenario.expected,
        thresholds,
    ))
}

fn run_all(scenarios: &[Scenario], threshold_override: f64) -> anyhow::Result<Vec<ScenarioReport>> {
    info!("running {} scenarios", scenarios.len());
    scenarios
        .par_iter()
        .map(|s| {
            let mut thresholds = s.thresholds;
            if threshold_override > 0.0 {
                thresholds.max_corner_rmse = threshold_override;
            }
            run_scenario(s, thresholds)
        })
        .collect()
}

fn cmd_run(
    category: Option<String>,
    scenario: Option<String>,
    format: &str,
    threshold_override: f64,
    quiet: bool,
) -> anyhow::Result<()> {
    let scenarios = filter_scenarios(category, scenario)?;
    let mut reports = run_all(&scenarios, threshold_override)?;
    if quiet {
        reports.retain(|r| !r.passed);
    }

    let full = FullReport::from_scenarios(reports);

    match format {
        "json" => println!("{}", report::to_json(&full)),
        _ => report::print_terminal(&full),
    }
    Ok(())
}

fn cmd_list(category: Option<String>) -> anyhow::Result<()> {
    let scenarios = filter_scenarios(category, None)?;
    println!("{:<35} {:<15} Description", "Name", "Category");
    println!("{}", "-".repeat(80));
    for s in &scenarios {
        println!("{:<35} {:<15} {}", s.name, s.category.name(), s.description);
    }
    println!("\nTotal: {} scenarios", scenarios.len());
    Ok(())
}

fn cmd_regression(category: Option<String>) -> anyhow::Result<()> {
    let scenarios = filter_scenarios(category, None)?;
    let full = FullReport::from_scenarios(run_all(&scenarios, 0.0)?);
    report::print_terminal(&full);

    if !full.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_explore(
    roll: f64,
    tilt_x: f64,
    tilt_y: f64,
    distance: f64,
    offset_x: f64,
    offset_y: f64,
    jitter: f64,
    clutter: bool,
    tolerance: f64,
    format: &str,
) -> anyhow::Result<()> {
    let pose = catalog::pose_deg(roll, tilt_x, tilt_y, [offset_x, offset_y, distance]);
    let noise = if jitter > 0.0 {
        vec![ContourNoise::Jitter {
            sigma: jitter,
            seed: 42,
        }]
    } else {
        Vec::new()
    };

    let mut builder =
        SceneBuilder::new(catalog::webcam(), catalog::card()).add_target_with(pose, 0.0, false, noise);
    if clutter {
        builder = builder
            .add_clutter(Clutter::Triangle {
                center: [80.0, 80.0],
                size: 60.0,
            })
            .add_clutter(Clutter::Chevron {
                center: [560.0, 90.0],
                size: 70.0,
            })
            .add_clutter(Clutter::Speck {
                center: [560.0, 330.0],
            });
    }
    let scene = builder.build();
    if scene.ground_truth.is_empty() {
        bail!("target does not project in front of the camera");
    }

    let config = PipelineConfig {
        approx_tolerance: tolerance,
        ..catalog::card_config()
    };
    let (result, frame) = run_scene(&scene, config)?;
    let r = report::scenario_report(
        "explore",
        "explore",
        &result,
        scene.ground_truth.len(),
        Thresholds {
            max_corner_rmse: f64::INFINITY,
            max_rotation_error_deg: f64::INFINITY,
            max_translation_error: f64::INFINITY,
        },
    );

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!(
                "Pose: roll={}°, tilt_x={}°, tilt_y={}°, t=({}, {}, {})",
                roll, tilt_x, tilt_y, offset_x, offset_y, distance
            );
            if jitter > 0.0 {
                println!("Jitter: sigma={} px", jitter);
            }
            println!();
            println!(
                "Contours: {} | rejected: {} | posed: {} | failed: {}",
                frame.stats.contours, frame.stats.rejected, frame.stats.posed, frame.stats.failed
            );
            println!("Pose rate: {:.0}%", result.pose_rate * 100.0);
            println!("Corner RMSE: {:.2} px", r.corner_rmse);
            println!("Rotation error: {:.3}°", r.max_rotation_error_deg);
            println!("Translation error: {:.2}%", r.max_translation_error * 100.0);
            println!("Processing time: {:.1} ms", r.processing_time_us as f64 / 1000.0);

            for det in &frame.detections {
                let summary = DetectionSummary::from(det);
                match (&summary.translation, &summary.failure) {
                    (Some(t), _) => println!(
                        "  Contour {}: t=({:.3}, {:.3}, {:.3}), rmse={:.3} px, iters={}",
                        summary.contour_index,
                        t[0],
                        t[1],
                        t[2],
                        summary.reprojection_rmse.unwrap_or(f64::NAN),
                        summary.iterations.unwrap_or(0)
                    ),
                    (None, Some(reason)) => {
                        println!("  Contour {}: {}", summary.contour_index, reason)
                    }
                    (None, None) => {}
                }
            }
        }
    }
    Ok(())
}
