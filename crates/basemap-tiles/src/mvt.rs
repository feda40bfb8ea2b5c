//! Mapbox Vector Tile decoder
//!
//! Extracts line geometry from the street, building, water and land layers of a vector tile
//! and projects it to longitude/latitude. Only the message shapes needed for that are read:
//!
//! - Tile: repeated `layers` (field 3)
//! - Layer: `name` (field 1), `features` (field 2), `extent` (field 5, default 4096)
//! - Feature: `type` (field 3), packed `geometry` (field 4)
//!
//! See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1>.

use crate::tile_math::{tile_x_to_lon, tile_y_to_lat};
use crate::wire::{WireReader, WireType};
use crate::{ColoredSegment, Rgba, TileKey};

/// Extent used when a layer does not declare one
pub const DEFAULT_EXTENT: u32 = 4096;

/// Layers drawn in the background map (Versatiles/Shortbread names, then OpenMapTiles names)
pub const WANTED_LAYERS: &[&str] = &[
    "streets",
    "bridges",
    "street_polygons",
    "buildings",
    "water_polygons",
    "land",
    "transportation",
    "boundary",
    "water",
    "waterway",
    "building",
];

/// Color for wanted layers without their own entry in [`color_for_layer`]
pub const DEFAULT_LAYER_COLOR: Rgba = Rgba::new(0.4, 0.4, 0.4, 0.2);

const STREET_COLOR: Rgba = Rgba::new(0.45, 0.45, 0.45, 0.2);
const BUILDING_COLOR: Rgba = Rgba::new(0.35, 0.35, 0.35, 0.2);
const WATER_COLOR: Rgba = Rgba::new(0.2, 0.3, 0.5, 0.2);

/// Fixed color for a layer name
pub fn color_for_layer(name: &str) -> Rgba {
    match name {
        "streets" | "bridges" | "transportation" => STREET_COLOR,
        "buildings" | "building" => BUILDING_COLOR,
        "water_polygons" | "water" | "waterway" => WATER_COLOR,
        "land" => Rgba::new(0.3, 0.35, 0.3, 0.2),
        "boundary" => Rgba::new(0.6, 0.5, 0.3, 0.2),
        _ => DEFAULT_LAYER_COLOR,
    }
}

/// Whether a layer is part of the background map
#[inline]
pub fn is_wanted_layer(name: &str) -> bool {
    WANTED_LAYERS.contains(&name)
}

/// Feature geometry type (field 3 of a feature)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeomType {
    Unknown,
    Point,
    LineString,
    Polygon,
}

impl From<u64> for GeomType {
    fn from(value: u64) -> Self {
        match value {
            1 => Self::Point,
            2 => Self::LineString,
            3 => Self::Polygon,
            _ => Self::Unknown,
        }
    }
}

/// Geometry command, the low 3 bits of a command integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    MoveTo,
    LineTo,
    ClosePath,
    Unknown,
}

impl From<u32> for Command {
    fn from(id: u32) -> Self {
        match id {
            1 => Self::MoveTo,
            2 => Self::LineTo,
            7 => Self::ClosePath,
            _ => Self::Unknown,
        }
    }
}

/// Line segment in tile-local integer coordinates
type LocalSegment = ((i32, i32), (i32, i32));

/// Decode one vector tile into colored line segments in longitude/latitude.
///
/// `key` is the tile's own address, used only to project tile-local coordinates. Never
/// fails: empty or malformed input yields an empty or partial result.
pub fn decode(data: &[u8], key: TileKey) -> Vec<ColoredSegment> {
    #[cfg(feature = "profiling")]
    profiling::scope!("mvt::decode");

    let mut result = Vec::new();
    let mut tile = WireReader::new(data);

    while tile.has_more() {
        let (field, wire_type) = tile.read_tag();
        if field == 3 && wire_type == WireType::LengthDelimited {
            let layer = tile.read_bytes();
            decode_layer(layer, key, &mut result);
        } else {
            tile.skip(wire_type);
        }
    }

    result
}

/// Decode a single layer message, appending its segments to `out`
fn decode_layer(layer: WireReader<'_>, key: TileKey, out: &mut Vec<ColoredSegment>) {
    // First pass: fields may come in any order, so name and extent are found before features
    let mut name = String::new();
    let mut extent = DEFAULT_EXTENT;
    let mut probe = layer.clone();
    while probe.has_more() {
        match probe.read_tag() {
            (1, WireType::LengthDelimited) => name = probe.read_string(),
            (5, WireType::Varint) => extent = probe.read_varint() as u32,
            (_, wire_type) => probe.skip(wire_type),
        }
    }

    if !is_wanted_layer(&name) {
        tracing::trace!("Skipping layer {:?}", name);
        return;
    }
    if extent == 0 {
        extent = DEFAULT_EXTENT;
    }

    let color = color_for_layer(&name);
    let extent = f64::from(extent);
    let project = |(x, y): (i32, i32)| geo::Coord {
        x: tile_x_to_lon(key.column as f64 + f64::from(x) / extent, key.zoom),
        y: tile_y_to_lat(key.row as f64 + f64::from(y) / extent, key.zoom),
    };

    // Second pass: features
    let before = out.len();
    let mut features = layer;
    let mut local = Vec::new();
    while features.has_more() {
        let (field, wire_type) = features.read_tag();
        if field != 2 || wire_type != WireType::LengthDelimited {
            features.skip(wire_type);
            continue;
        }

        let mut feature = features.read_bytes();
        let mut geom_type = GeomType::Unknown;
        let mut geometry = Vec::new();
        while feature.has_more() {
            match feature.read_tag() {
                (3, WireType::Varint) => geom_type = GeomType::from(feature.read_varint()),
                (4, WireType::LengthDelimited) => geometry = feature.read_packed_varints(),
                (_, wire_type) => feature.skip(wire_type),
            }
        }

        if !matches!(geom_type, GeomType::LineString | GeomType::Polygon) {
            continue;
        }

        local.clear();
        decode_geometry(&geometry, &mut local);
        out.extend(local.iter().map(|&(a, b)| ColoredSegment {
            a: project(a),
            b: project(b),
            color,
        }));
    }

    tracing::trace!("Layer {:?}: {} segments", name, out.len() - before);
}

/// Decode a geometry command stream into tile-local line segments
fn decode_geometry(geometry: &[u32], lines: &mut Vec<LocalSegment>) {
    let mut cursor = (0i32, 0i32);
    let mut subpath_start = (0i32, 0i32);
    let mut last: Option<(i32, i32)> = None;
    let mut i = 0;

    // Reads one delta-encoded (dx, dy) parameter pair, if both values are present
    let next_delta = |i: &mut usize| -> Option<(i32, i32)> {
        if *i + 1 >= geometry.len() {
            return None;
        }
        let dx = crate::wire::zigzag_decode(u64::from(geometry[*i]));
        let dy = crate::wire::zigzag_decode(u64::from(geometry[*i + 1]));
        *i += 2;
        Some((dx, dy))
    };

    while i < geometry.len() {
        let command = geometry[i];
        i += 1;
        let count = command >> 3;

        match Command::from(command & 0x7) {
            Command::MoveTo => {
                for _ in 0..count {
                    let Some((dx, dy)) = next_delta(&mut i) else {
                        break;
                    };
                    cursor = (cursor.0.wrapping_add(dx), cursor.1.wrapping_add(dy));
                }
                subpath_start = cursor;
                last = Some(cursor);
            }
            Command::LineTo => {
                for _ in 0..count {
                    let Some((dx, dy)) = next_delta(&mut i) else {
                        break;
                    };
                    cursor = (cursor.0.wrapping_add(dx), cursor.1.wrapping_add(dy));
                    if let Some(previous) = last {
                        lines.push((previous, cursor));
                    }
                    last = Some(cursor);
                }
            }
            Command::ClosePath => {
                if let Some(previous) = last {
                    lines.push((previous, subpath_start));
                    last = Some(subpath_start);
                }
            }
            Command::Unknown => {}
        }
    }
}
