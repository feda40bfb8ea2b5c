//! Basemap CLI - headless driver for the vector tile background layer
//!
//! Plays the role of the render thread: renders a fixed view once per frame until every
//! visible tile has loaded, then optionally exports the drawn lines as GeoJSON.

mod cli;
mod driver;
mod error;
mod export;
mod logging;
mod metadata;
mod settings;

use basemap_tiles::{HttpTileFetcher, TileRenderer};
use error::CliError;
use settings::Settings;
use std::process::ExitCode;

fn main() -> ExitCode {
    let _logging = logging::setup_logging_and_profiling();
    metadata::log_version_info();

    let settings = Settings::from_cli();
    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings) -> Result<(), CliError> {
    let config = settings.tile_config();
    let view = settings.view();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("basemap-fetch")
        .build()?;

    let fetcher = HttpTileFetcher::new(&config)?;
    tracing::info!("Loading tiles from {}", fetcher.template().as_str());

    // Declared after the runtime so in-flight fetches are joined before it shuts down
    let mut renderer = TileRenderer::new(fetcher, &config, runtime.handle().clone());
    let outcome = driver::run_until_settled(
        &mut renderer,
        &view,
        settings.max_frames,
        settings.frame_interval(),
    );

    let stats = outcome.stats;
    tracing::info!(
        "Zoom {}: {} tiles visible, {} settled, {} segments drawn after {} frames",
        stats.zoom,
        stats.visible_tiles,
        stats.settled_tiles,
        stats.segments_drawn,
        outcome.frames
    );

    if let Some(path) = &settings.output {
        export::write_geojson_file(path, &outcome.segments)?;
        tracing::info!(
            "Wrote {} segments to {}",
            outcome.segments.len(),
            path.display()
        );
    }
    Ok(())
}
