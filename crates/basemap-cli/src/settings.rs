use crate::cli::{get_env, parse_args};
use basemap_tiles::{Config, View};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Basemap - Load the vector map tiles under a view and export their lines as GeoJSON
pub struct Settings {
    /// Longitude of the view center in degrees
    #[clap(long, default_value = "0.0", allow_negative_numbers = true)]
    pub lon: f64,

    /// Latitude of the view center in degrees
    #[clap(long, default_value = "0.0", allow_negative_numbers = true)]
    pub lat: f64,

    /// Latitude degrees visible above and below the center
    #[clap(long, default_value = "0.05")]
    pub half_extent: f64,

    /// Screen width in pixels
    #[clap(long, default_value = "1280")]
    pub width: u32,

    /// Screen height in pixels, drives zoom selection
    #[clap(long, default_value = "720")]
    pub height: u32,

    /// Frames to render before giving up on tiles still loading
    #[clap(long, default_value = "600")]
    pub max_frames: u32,

    /// Pause between frames in milliseconds
    #[clap(long, default_value = "16")]
    pub frame_interval_ms: u64,

    /// Write the drawn segments to this GeoJSON file
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Tile URL template with {z}, {x} and {y} placeholders [env: BASEMAP_TILE_URL]
    #[clap(long, value_name = "URL")]
    pub tile_url: Option<String>,

    /// User agent sent with tile requests [env: BASEMAP_USER_AGENT]
    #[clap(long)]
    pub user_agent: Option<String>,

    /// Timeout for a single tile request in seconds
    #[clap(long, default_value = "10")]
    pub request_timeout_secs: u64,

    /// Maximum number of tiles fetched at the same time
    #[clap(long, default_value = "4")]
    pub max_concurrent_fetches: usize,

    /// Ready tiles kept in memory before the least recently used are evicted
    #[clap(long, default_value = "256")]
    pub max_cached_tiles: usize,

    /// Highest zoom level requested from the tile provider
    #[clap(long, default_value = "14")]
    pub max_zoom: u8,
}

impl Settings {
    /// Parse the command line, exiting with usage on error
    pub fn from_cli() -> Self {
        match parse_args::<Settings>() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Tile configuration; flags win over environment variables, which win over defaults
    pub fn tile_config(&self) -> Config {
        let defaults = Config::default();
        Config {
            tile_url: self
                .tile_url
                .clone()
                .or_else(|| get_env("BASEMAP_TILE_URL"))
                .unwrap_or(defaults.tile_url),
            user_agent: self
                .user_agent
                .clone()
                .or_else(|| get_env("BASEMAP_USER_AGENT"))
                .unwrap_or(defaults.user_agent),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_concurrent_fetches: self.max_concurrent_fetches,
            max_cached_tiles: self.max_cached_tiles,
            max_zoom: self.max_zoom,
        }
    }

    pub fn view(&self) -> View {
        View::new(
            geo::Coord {
                x: self.lon,
                y: self.lat,
            },
            self.half_extent,
            self.width,
            self.height,
        )
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
