use anyhow::{Context, Result};
use geo::{Coord, LineString, MultiLineString, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde_json::{json, Value as JsonValue};
use std::fs;
use std::path::Path;

use crate::model::{AssetDamage, CandidatePoint, Connector, Curve, Segment};
use crate::pipeline::Intermediates;

#[cfg(feature = "gdal")]
mod ogr;
#[cfg(feature = "gdal")]
mod raster;

#[cfg(feature = "gdal")]
pub use ogr::OgrWriter;
#[cfg(feature = "gdal")]
pub use raster::GeoTiffWriter;

fn position(c: &Coord<f64>) -> Vec<f64> {
    vec![c.x, c.y]
}

fn line_value(line: &LineString<f64>) -> Vec<Vec<f64>> {
    line.0.iter().map(position).collect()
}

fn polygon_value(polygon: &Polygon<f64>) -> Value {
    Value::Polygon(
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(line_value)
            .collect(),
    )
}

fn multi_line_value(lines: &MultiLineString<f64>) -> Value {
    Value::MultiLineString(lines.0.iter().map(line_value).collect())
}

fn feature(value: Value, properties: JsonValue) -> Feature {
    let properties = match properties {
        JsonValue::Object(map) => Some(map),
        _ => None,
    };
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties,
        foreign_members: None,
    }
}

/// 未定義の値（NaN）は null にする
fn finite_or_null(value: f64) -> JsonValue {
    if value.is_finite() {
        json!(value)
    } else {
        JsonValue::Null
    }
}

pub fn segment_features(segments: &[Segment]) -> Vec<Feature> {
    segments
        .iter()
        .map(|s| {
            feature(
                polygon_value(&s.polygon),
                json!({
                    "segment_id": s.id,
                    "length": finite_or_null(s.boundary_length),
                    "total_damage": s.total_damage,
                    "damage_density": finite_or_null(s.damage_density),
                    "asset_count": s.asset_count,
                }),
            )
        })
        .collect()
}

fn curve_features(curve: &Curve) -> Vec<Feature> {
    vec![feature(
        multi_line_value(&curve.parts),
        json!({ "elevation": curve.elevation, "length": curve.length() }),
    )]
}

fn point_features(points: &[CandidatePoint]) -> Vec<Feature> {
    points
        .iter()
        .map(|p| {
            feature(
                Value::Point(position(&p.position)),
                json!({ "id": p.id, "part": p.part, "offset": p.offset }),
            )
        })
        .collect()
}

fn connector_features(connectors: &[Connector]) -> Vec<Feature> {
    connectors
        .iter()
        .map(|c| {
            feature(
                Value::LineString(line_value(&c.line)),
                json!({ "source_id": c.source_id, "target_id": c.target_id }),
            )
        })
        .collect()
}

fn damage_features(damages: &[AssetDamage]) -> Vec<Feature> {
    damages
        .iter()
        .map(|d| {
            feature(
                Value::Point(position(&d.position)),
                json!({
                    "asset_id": d.asset_id,
                    "ground_elevation": d.ground_elevation,
                    "damage": d.damage,
                }),
            )
        })
        .collect()
}

#[derive(Default)]
pub struct GeoJsonWriter {}

impl GeoJsonWriter {
    pub fn new() -> Self {
        Self {}
    }

    pub fn write_segments(&self, segments: &[Segment], output_path: &Path) -> Result<()> {
        tracing::info!("Writing {} segments to {:?}", segments.len(), output_path);
        self.write_features(segment_features(segments), output_path)
    }

    /// 途中経過をワークスペースに書き出す
    pub fn write_intermediates(&self, intermediates: &Intermediates, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create workspace {:?}", dir))?;

        let layers = [
            ("contour_tide.geojson", curve_features(&intermediates.tide)),
            ("contour_surge.geojson", curve_features(&intermediates.surge)),
            (
                "candidates_tide.geojson",
                point_features(&intermediates.tide_points),
            ),
            (
                "candidates_surge.geojson",
                point_features(&intermediates.surge_points),
            ),
            (
                "connectors.geojson",
                connector_features(&intermediates.connectors),
            ),
            (
                "asset_damage.geojson",
                damage_features(&intermediates.asset_damages),
            ),
        ];
        for (name, features) in layers {
            self.write_features(features, &dir.join(name))?;
        }

        #[cfg(feature = "gdal")]
        GeoTiffWriter::new().write(&intermediates.smoothed, &dir.join("smoothed_dem.tif"))?;

        tracing::info!("Wrote intermediate layers to {:?}", dir);
        Ok(())
    }

    fn write_features(&self, features: Vec<Feature>, output_path: &Path) -> Result<()> {
        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };
        let text = GeoJson::FeatureCollection(collection).to_string();
        fs::write(output_path, text)
            .with_context(|| format!("Failed to write {:?}", output_path))?;
        Ok(())
    }
}

/// 拡張子に応じて区画レイヤーを書き出す（`epsg` は OGR 出力のみ使用）
pub fn write_segment_layer(
    segments: &[Segment],
    output_path: &Path,
    epsg: Option<u32>,
) -> Result<()> {
    let ext = output_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    #[cfg(not(feature = "gdal"))]
    let _ = epsg;

    match ext.as_str() {
        "geojson" | "json" => GeoJsonWriter::new().write_segments(segments, output_path),
        #[cfg(feature = "gdal")]
        _ => OgrWriter::new()
            .with_epsg(epsg)
            .write_segments(segments, output_path),
        #[cfg(not(feature = "gdal"))]
        _ => anyhow::bail!(
            "Unsupported output format {:?}: use .geojson or build with the gdal feature",
            output_path
        ),
    }
}
