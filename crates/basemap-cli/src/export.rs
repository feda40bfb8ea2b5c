//! GeoJSON export of drawn segments

use crate::error::CliError;
use basemap_tiles::ColoredSegment;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One `LineString` feature per segment, colored by an `[r, g, b, a]` property
pub fn to_feature_collection(segments: &[ColoredSegment]) -> FeatureCollection {
    let features = segments
        .iter()
        .map(|segment| {
            let line = Value::LineString(vec![
                vec![segment.a.x, segment.a.y],
                vec![segment.b.x, segment.b.y],
            ]);
            let mut properties = JsonObject::new();
            properties.insert("color".to_string(), serde_json::json!(segment.color.to_array()));

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(line)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson<W: Write>(writer: W, segments: &[ColoredSegment]) -> Result<(), CliError> {
    serde_json::to_writer(writer, &to_feature_collection(segments))?;
    Ok(())
}

pub fn write_geojson_file(path: &Path, segments: &[ColoredSegment]) -> Result<(), CliError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_geojson(&mut writer, segments)?;
    writer.flush()?;
    Ok(())
}
