use basemap_tiles::TileError;

/// Errors that end the CLI run
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Tile error: {0}")]
    Tiles(#[from] TileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
