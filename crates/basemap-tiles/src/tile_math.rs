//! Coordinate conversions between WGS84 and the Web Mercator tile grid

use crate::TileKey;
use geo::Rect;
use std::f64::consts::PI;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Highest zoom level considered when picking a zoom for a view
pub const MAX_SEARCH_ZOOM: u8 = 18;

/// Pixel size of one tile when judging display density
pub const TILE_SIZE_PX: f64 = 256.0;

/// Number of tiles per side of the grid at `zoom`
#[inline(always)]
fn tiles_per_side(zoom: u8) -> f64 {
    2f64.powi(zoom as i32)
}

/// Convert a longitude in degrees to a fractional tile column
#[inline(always)]
pub fn lon_to_tile_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * tiles_per_side(zoom)
}

/// Convert a latitude in degrees to a fractional tile row (row 0 is the north edge)
#[inline(always)]
pub fn lat_to_tile_y(lat: f64, zoom: u8) -> f64 {
    let lat_rad = lat.to_radians();
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * tiles_per_side(zoom)
}

/// Convert a fractional tile column back to a longitude in degrees
#[inline(always)]
pub fn tile_x_to_lon(x: f64, zoom: u8) -> f64 {
    x / tiles_per_side(zoom) * 360.0 - 180.0
}

/// Convert a fractional tile row back to a latitude in degrees
#[inline(always)]
pub fn tile_y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = PI - 2.0 * PI * y / tiles_per_side(zoom);
    n.sinh().atan().to_degrees()
}

/// Clamp a latitude to the range Web Mercator can represent
#[inline(always)]
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
}

/// Pick the zoom level for a view showing `half_extent_deg` degrees above and below
/// its center on a screen `screen_height_px` pixels tall.
///
/// Returns the largest zoom, searching down from [`MAX_SEARCH_ZOOM`], whose tiles still
/// cover at least as many degrees per pixel as the view does. Tiles are therefore never
/// fetched at a finer resolution than the screen can show. Falls back to 0.
pub fn zoom_for_extent(half_extent_deg: f64, screen_height_px: u32) -> u8 {
    let degrees_per_pixel = (half_extent_deg * 2.0) / screen_height_px as f64;
    (0..=MAX_SEARCH_ZOOM)
        .rev()
        .find(|&zoom| 360.0 / tiles_per_side(zoom) / TILE_SIZE_PX >= degrees_per_pixel)
        .unwrap_or(0)
}

/// Inclusive range of tile columns and rows at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_column: u32,
    pub max_column: u32,
    pub min_row: u32,
    pub max_row: u32,
}

impl TileRange {
    /// Tiles covering `bounds` (x = longitude, y = latitude), clamped to the grid.
    ///
    /// Latitudes are clamped to [`MAX_LATITUDE`] before projecting.
    pub fn covering(bounds: Rect<f64>, zoom: u8) -> Self {
        let max_tile = (tiles_per_side(zoom) - 1.0).max(0.0);
        let to_index = |v: f64| v.floor().clamp(0.0, max_tile) as u32;

        let min = bounds.min();
        let max = bounds.max();

        Self {
            zoom,
            min_column: to_index(lon_to_tile_x(min.x, zoom)),
            max_column: to_index(lon_to_tile_x(max.x, zoom)),
            // Rows grow southwards, so the northern edge gives the smallest row
            min_row: to_index(lat_to_tile_y(clamp_latitude(max.y), zoom)),
            max_row: to_index(lat_to_tile_y(clamp_latitude(min.y), zoom)),
        }
    }

    /// Number of tiles in the range
    pub fn tile_count(&self) -> usize {
        let columns = (self.max_column - self.min_column) as usize + 1;
        let rows = (self.max_row - self.min_row) as usize + 1;
        columns * rows
    }

    /// Iterate tile keys row by row, west to east
    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        (self.min_row..=self.max_row).flat_map(move |row| {
            (self.min_column..=self.max_column)
                .map(move |column| TileKey::new(self.zoom, column, row))
        })
    }
}
