//! ometiff-reader - inspect pyramidal OME-TIFF files from the command line.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ometiff_reader::{
    config::{Cli, Command, DetectConfig, InspectConfig},
    format::detect_ome_tiff,
    layer::{ChunkCache, ConversionReport, LayerData, ReaderPlugin},
    PathInput, UNMATCHED_TARGET,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Detect(config) => run_detect(config),
        Command::Inspect(config) => run_inspect(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Unmatched OME-XML keys are logged on their own target, which stays off
/// unless `RUST_LOG` names it.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        format!("ometiff_reader=debug,{}=off", UNMATCHED_TARGET)
    } else {
        format!("ometiff_reader=info,{}=off", UNMATCHED_TARGET)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Detect Command
// =============================================================================

fn run_detect(config: DetectConfig) -> ExitCode {
    let input = PathInput::from(config.paths);
    match detect_ome_tiff(&input) {
        Some(path) => {
            println!("{}: OME-TIFF", path.display());
            ExitCode::SUCCESS
        }
        None => {
            let name = input
                .first()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!("{}: not handled", name);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let capacity = match config.cache_capacity() {
        Ok(capacity) => capacity,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let plugin = ReaderPlugin::with_cache(Arc::new(ChunkCache::with_capacity(capacity)));
    let input = PathInput::from(config.paths.clone());
    let Some(reader) = plugin.get_reader(input.clone()) else {
        error!("Not an OME-TIFF file name (expected .ome.tif, .ome.tiff, .ome_tif or .ome_tiff)");
        return ExitCode::FAILURE;
    };

    let (layers, report) = match reader.read_with_report(input).await {
        Ok(result) => result,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut level_range = None;
    if let Some(level) = config.read_level {
        let Some(array) = layers.first().and_then(|layer| layer.data.get(level)) else {
            error!("Level {} does not exist", level);
            return ExitCode::FAILURE;
        };
        match array.read_any().await {
            Ok(data) => level_range = Some((level, data.min_max())),
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if config.json {
        print_json(&layers, &report, level_range);
    } else {
        print_text(&layers, &report, level_range);
    }
    ExitCode::SUCCESS
}

type LevelRange = Option<(usize, Option<(f64, f64)>)>;

fn print_json(layers: &[LayerData], report: &ConversionReport, level_range: LevelRange) {
    let layers: Vec<_> = layers
        .iter()
        .map(|layer| {
            let levels: Vec<_> = layer
                .data
                .iter()
                .map(|array| {
                    serde_json::json!({
                        "level": array.level(),
                        "axes": array.axes(),
                        "shape": array.shape(),
                        "dtype": array.pixel_type().name(),
                    })
                })
                .collect();
            serde_json::json!({
                "layer_type": layer.layer_type,
                "metadata": layer.metadata,
                "levels": levels,
            })
        })
        .collect();

    let mut json = serde_json::json!({
        "layers": layers,
        "report": report,
    });
    if let Some((level, range)) = level_range {
        json["read"] = serde_json::json!({
            "level": level,
            "min": range.map(|r| r.0),
            "max": range.map(|r| r.1),
        });
    }

    match serde_json::to_string_pretty(&json) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}

fn print_text(layers: &[LayerData], report: &ConversionReport, level_range: LevelRange) {
    let mpp = |value: Option<f64>| match value {
        Some(v) => format!("{} µm/px", v),
        None => "unknown".to_string(),
    };

    if let Some(name) = &report.image_name {
        println!("Image:     {}", name);
    }
    println!(
        "Axes:      {} (c={}, y={}, x={})",
        report.axes, report.axes_order.c, report.axes_order.y, report.axes_order.x
    );
    println!("Pixel X:   {}", mpp(report.base_mpp_x));
    println!("Pixel Y:   {}", mpp(report.base_mpp_y));

    for layer in layers {
        println!();
        println!("Layer:     {}", layer.layer_type);
        println!(
            "Display:   rgb={} contrast_limits=({}, {}) multiscale={}",
            layer.metadata.rgb,
            layer.metadata.contrast_limits.0,
            layer.metadata.contrast_limits.1,
            layer.metadata.multiscale
        );
        for array in &layer.data {
            println!(
                "  level {:>2}  {:<8} {:?} {}",
                array.level(),
                array.axes(),
                array.shape(),
                array.pixel_type()
            );
        }
    }

    if let Some((level, range)) = level_range {
        println!();
        match range {
            Some((min, max)) => println!("Level {} range: {} .. {}", level, min, max),
            None => println!("Level {} is empty", level),
        }
    }

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
}
