//! jpeg-pyramid - Build a disk-backed tile pyramid from a JPEG file.
//!
//! This binary streams the input through a background builder and prints a
//! JSON summary of the resulting pyramid.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jpeg_pyramid::{pump_source, set_flush_threshold, spawn_builder, Cli, FileSource, TiledImage};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    set_flush_threshold(cli.flush_threshold);
    let config = cli.tiler_config();

    info!("Configuration:");
    info!("  Input: {}", cli.input.display());
    info!("  Output: {}", config.output_dir.display());
    info!("  Tile size: {}", config.tile_dimension);
    info!("  Levels: {:?}", config.level_policy);
    info!("  Backend: {}", config.backend);

    let mut source = match FileSource::open(&cli.input, cli.chunk_size).await {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open input: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let handle = match spawn_builder(config) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start builder: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let image = handle.image();

    let result = pump_source(&mut source, handle).await;
    println!("{}", summary(&cli, &image));

    match result {
        Ok(status) => {
            info!("Build {}", status);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Build failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "jpeg_pyramid=debug"
    } else {
        "jpeg_pyramid=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// JSON description of the finished (or failed) build.
fn summary(cli: &Cli, image: &TiledImage) -> String {
    let json = serde_json::json!({
        "input": cli.input.display().to_string(),
        "status": image.status(),
        "failure": image.failure().map(|e| e.to_string()),
        "image_size": image.image_size(),
        "orientation": image.orientation().map(|o| o.code()),
        "levels": image.levels(),
        "directory": image.directory().map(|d| d.display().to_string()),
        "stats": image.stats(),
        "properties": image.properties(),
    });
    serde_json::to_string_pretty(&json).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}
