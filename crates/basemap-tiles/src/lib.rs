//! Basemap Tiles - Vector tile background layer
//!
//! This library fetches, decodes, caches and evicts the small vector map tiles drawn as a
//! background layer under a point visualization. Each tile is addressed by a
//! `(zoom, column, row)` coordinate on the Web Mercator slippy-map grid and carries a
//! protobuf-encoded vector tile with streets, buildings, water and similar layers.
//!
//! # Architecture
//!
//! - **[`tile_math`]**: Conversions between longitude/latitude and fractional tile coordinates,
//!   plus zoom selection for a given view density
//! - **[`wire`]**: Bounds-checked cursor over the protobuf wire format
//! - **[`mvt`]**: Vector tile decoder producing [`ColoredSegment`]s in geographic coordinates
//! - **[`TileCache`]**: Owner-thread tile map, bounded background fetches and LRU-style eviction
//! - **[`TileRenderer`]**: Per-frame glue between a [`View`], the cache and a [`LineSink`]
//!
//! # Threading
//!
//! The cache, renderer and eviction are driven from a single owner thread. Fetches run as
//! tokio tasks that only share a lock-protected inbox with the owner, so no call made by the
//! owner ever waits on the network.

mod cache;
mod fetch;
pub mod mvt;
mod renderer;
pub mod tile_math;
pub mod wire;

use std::time::Duration;

// Public API exports
pub use cache::{FetchInbox, FetchResult, TileCache, TileEntry, TileState};
pub use fetch::{HttpTileFetcher, TileFetcher, UrlTemplate};
pub use renderer::{FrameStats, LineSink, TileRenderer, View};

/// Address of one tile on the slippy-map grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl TileKey {
    pub const fn new(zoom: u8, column: u32, row: u32) -> Self {
        Self { zoom, column, row }
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// Linear RGBA color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// A single line segment in geographic coordinates (x = longitude, y = latitude)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColoredSegment {
    pub a: geo::Coord<f64>,
    pub b: geo::Coord<f64>,
    pub color: Rgba,
}

/// Configuration for tile fetching and caching
#[derive(Debug, Clone)]
pub struct Config {
    /// Tile URL with `{z}`, `{x}` and `{y}` placeholders
    pub tile_url: String,
    /// User agent sent with every tile request
    pub user_agent: String,
    /// Timeout for a single tile request, also bounds teardown
    pub request_timeout: Duration,
    /// Maximum number of tiles fetched at the same time
    pub max_concurrent_fetches: usize,
    /// Number of ready tiles kept before the oldest are evicted
    pub max_cached_tiles: usize,
    /// Highest zoom level requested from the tile provider
    pub max_zoom: u8,
}

/// Versatiles OSM vector tiles (free, no API key)
pub const DEFAULT_TILE_URL: &str = "https://tiles.versatiles.org/tiles/osm/{z}/{x}/{y}.pbf";

impl Default for Config {
    fn default() -> Self {
        Self {
            tile_url: DEFAULT_TILE_URL.to_string(),
            user_agent: concat!("basemap/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 4,
            max_cached_tiles: 256,
            max_zoom: 14,
        }
    }
}

/// Error types for tile fetching
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid tile URL template: {0}")]
    InvalidUrlTemplate(String),
}

pub type Result<T> = std::result::Result<T, TileError>;
