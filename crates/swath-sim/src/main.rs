//! swath-sim: CLI field simulator for guidance and coverage experiments.
//!
//! Drives a simulated vehicle back and forth across a rectangular field
//! through a full guidance session and prints the session diagnostics.
//! Useful for:
//!
//! - Comparing steering laws (`PurePursuit` vs `Stanley`)
//! - Tuning look-ahead, turn-off delay and minimum coverage
//! - Comparing the grid and rasterizer overlap figures
//! - Inspecting strips, patches and coverage as SVG and PNG
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin swath-sim -- [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod drive;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::warn;
use swath_core::{EngineConfig, FillRule, GuidanceSession, SteeringLawKind, StoreError, ToolConfig};
use swath_export::{FieldScene, SvgMetadata};

use crate::drive::{FieldPlan, PassSummary, drive, rectangular_field};
use crate::store::JsonFileStore;

/// Field simulator for the swath guidance engine.
///
/// Runs back-and-forth passes over a rectangular field and prints
/// guidance, section and coverage diagnostics.
#[derive(Parser)]
#[command(name = "swath-sim", version)]
struct Cli {
    /// Field width (east-west), metres.
    #[arg(long, default_value_t = 40.0)]
    field_width: f64,

    /// Field length (north-south), metres.
    #[arg(long, default_value_t = 100.0)]
    field_length: f64,

    /// Number of passes. Defaults to as many as fit across the field.
    #[arg(long)]
    passes: Option<usize>,

    /// Ground speed, km/h.
    #[arg(long, default_value_t = 10.0)]
    speed_kmh: f64,

    /// Sideways error every pass starts with, metres (positive is right).
    #[arg(long, default_value_t = 0.3)]
    start_offset: f64,

    /// Steering law.
    #[arg(long, value_enum, default_value_t = Law::PurePursuit)]
    steering_law: Law,

    /// Span rule of the coverage rasterizer.
    #[arg(long, value_enum, default_value_t = Fill::Inclusive)]
    fill_rule: Fill,

    /// Implement width, metres.
    #[arg(long, default_value_t = ToolConfig::DEFAULT_WIDTH)]
    tool_width: f64,

    /// Number of sections across the implement.
    #[arg(long, default_value_t = ToolConfig::DEFAULT_SECTION_COUNT)]
    sections: usize,

    /// Section turn-off delay, seconds.
    #[arg(long, default_value_t = ToolConfig::DEFAULT_TURN_OFF_DELAY_SECS)]
    turn_off_delay: f64,

    /// Drive without a field boundary.
    #[arg(long)]
    no_boundary: bool,

    /// Load previously recorded strips from this JSON file before driving.
    #[arg(long)]
    load_strips: Option<PathBuf>,

    /// Save the recorded strips to this JSON file afterwards.
    #[arg(long)]
    save_strips: Option<PathBuf>,

    /// Write an SVG field overview to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write the coverage grid as a grayscale PNG to file.
    #[arg(long)]
    coverage_png: Option<PathBuf>,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full engine config as a JSON string.
    ///
    /// When provided, all other engine parameter flags are ignored.
    /// The JSON must be a valid `EngineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Steering law selection.
#[derive(Clone, Copy, ValueEnum)]
enum Law {
    /// Goal point chased along the guide line.
    PurePursuit,
    /// Heading and cross-track error at the steer axle.
    Stanley,
}

/// Rasterizer span rule selection.
#[derive(Clone, Copy, ValueEnum)]
enum Fill {
    /// Closed spans on truncated vertices.
    Inclusive,
    /// Half-open spans at pixel centres.
    HalfOpen,
}

/// Build an [`EngineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<EngineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let mut config = EngineConfig::default();
    config.tool.width = cli.tool_width;
    config.tool.section_count = cli.sections;
    config.tool.turn_off_delay_secs = cli.turn_off_delay;
    config.guidance.steering_law = match cli.steering_law {
        Law::PurePursuit => SteeringLawKind::PurePursuit,
        Law::Stanley => SteeringLawKind::Stanley,
    };
    config.coverage.fill_rule = match cli.fill_rule {
        Fill::Inclusive => FillRule::Inclusive,
        Fill::HalfOpen => FillRule::HalfOpen,
    };
    Ok(config)
}

/// Passes that fit across the field, at least one.
fn passes_across(width: f64, pass_width: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let passes = (width / pass_width).floor().max(1.0) as usize;
    passes
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if cli.speed_kmh.is_nan() || cli.speed_kmh <= 0.0 {
        eprintln!("--speed-kmh must be positive");
        return ExitCode::FAILURE;
    }

    let boundary = if cli.no_boundary {
        None
    } else {
        match rectangular_field(cli.field_width, cli.field_length) {
            Ok(b) => Some(b),
            Err(e) => {
                eprintln!("Error building field boundary: {e}");
                return ExitCode::FAILURE;
            }
        }
    };

    let mut session = match GuidanceSession::new(config, boundary) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid engine config: {e}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!("Config: {:#?}", session.config());

    if let Some(ref path) = cli.load_strips {
        match session.load_strips(&JsonFileStore::new(path)) {
            Ok(count) => eprintln!("Loaded {count} strips from {}", path.display()),
            Err(StoreError::NotFound) => {
                warn!("no strips at {}, starting empty", path.display());
            }
            Err(e) => {
                eprintln!("Error loading strips: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let plan = FieldPlan {
        width: cli.field_width,
        length: cli.field_length,
        passes: cli.passes.unwrap_or_else(|| {
            passes_across(cli.field_width, session.config().tool.effective_width())
        }),
        speed_kmh: cli.speed_kmh,
        start_offset: cli.start_offset,
    };
    eprintln!(
        "Field: {:.1} x {:.1} m, {} passes at {:.1} km/h",
        plan.width, plan.length, plan.passes, plan.speed_kmh
    );
    eprintln!();

    let mut clock = 0.0;
    let passes = drive(&mut session, &plan, &mut clock);

    let diagnostics = session.diagnostics();
    if cli.json {
        match serde_json::to_string_pretty(&diagnostics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_pass_table(&passes);
        println!("{}", diagnostics.report());
    }

    if let Some(ref path) = cli.save_strips {
        let mut store = JsonFileStore::new(path);
        if let Err(e) = session.save_strips(&mut store) {
            eprintln!("Error saving strips: {e}");
            return ExitCode::FAILURE;
        }
        eprintln!("Strips written to {}", path.display());
    }

    if let Some(ref svg_path) = cli.svg {
        let desc = format!(
            "{} passes over {:.1} x {:.1} m",
            plan.passes, plan.width, plan.length
        );
        let config_json = serde_json::to_string(session.config()).ok();
        let metadata = SvgMetadata {
            title: svg_path.file_stem().and_then(|s| s.to_str()),
            description: Some(&desc),
            config_json: config_json.as_deref(),
        };
        let scene = FieldScene {
            boundary: session.boundary(),
            strips: session.contour().strips(),
            patches: session.zones().completed_patches(),
            guide_line: session.contour().guide_line(),
        };
        let svg = swath_export::to_svg(&scene, &metadata);
        match std::fs::write(svg_path, &svg) {
            Ok(()) => {
                eprintln!("SVG written to {} ({} bytes)", svg_path.display(), svg.len());
            }
            Err(e) => {
                eprintln!("Error writing SVG to {}: {e}", svg_path.display());
            }
        }
    }

    if let Some(ref png_path) = cli.coverage_png {
        let written = swath_export::coverage_png(session.grid())
            .map_err(|e| e.to_string())
            .and_then(|png| {
                std::fs::write(png_path, &png)
                    .map(|()| png.len())
                    .map_err(|e| e.to_string())
            });
        match written {
            Ok(len) => eprintln!("PNG written to {} ({len} bytes)", png_path.display()),
            Err(e) => eprintln!("Error writing PNG to {}: {e}", png_path.display()),
        }
    }

    ExitCode::SUCCESS
}

/// Print one row per pass.
fn print_pass_table(passes: &[PassSummary]) {
    println!("Passes\n{}", "=".repeat(60));
    println!(
        "{:<6} {:>8} {:>8} {:>12} {:>12}  Strip",
        "Pass", "Ticks", "Guided", "Max |XTE|", "Final XTE"
    );
    println!("{}", "-".repeat(60));
    for pass in passes {
        let final_xte = pass
            .final_xte
            .map_or_else(|| "-".to_string(), |x| format!("{x:.3}"));
        let max_xte = if pass.guided_ticks > 0 {
            format!("{:.3}", pass.max_abs_xte)
        } else {
            "-".to_string()
        };
        println!(
            "{:<6} {:>8} {:>8} {:>12} {:>12}  {:?}",
            pass.index, pass.ticks, pass.guided_ticks, max_xte, final_xte, pass.strip
        );
    }
    println!();
}
