use anyhow::{bail, Context, Result};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, LayerAccess, LayerOptions, OGRFieldType, ToGdal};
use gdal::DriverManager;
use std::path::Path;

use crate::model::Segment;

const FIELD_NAMES: [&str; 5] = [
    "segment_id",
    "length",
    "total_damage",
    "damage_density",
    "asset_count",
];

/// 拡張子から OGR ドライバー名を決める
fn driver_name(output_path: &Path) -> Result<&'static str> {
    let ext = output_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "gpkg" => Ok("GPKG"),
        "shp" => Ok("ESRI Shapefile"),
        "fgb" => Ok("FlatGeobuf"),
        _ => bail!("Unsupported vector format: {:?}", output_path),
    }
}

/// GPKG / Shapefile などへの区画レイヤー出力
#[derive(Default)]
pub struct OgrWriter {
    epsg: Option<u32>,
}

impl OgrWriter {
    pub fn new() -> Self {
        Self { epsg: None }
    }

    pub fn with_epsg(mut self, epsg: Option<u32>) -> Self {
        self.epsg = epsg;
        self
    }

    pub fn write_segments(&self, segments: &[Segment], output_path: &Path) -> Result<()> {
        let name = driver_name(output_path)?;
        let driver = DriverManager::get_driver_by_name(name)
            .context(format!("Failed to get {} driver", name))?;
        let mut dataset = driver
            .create_vector_only(output_path)
            .context("Failed to create dataset")?;

        let srs = match self.epsg {
            Some(epsg) => Some(
                SpatialRef::from_epsg(epsg)
                    .context(format!("Failed to create SpatialRef from EPSG:{}", epsg))?,
            ),
            None => None,
        };
        let mut layer = dataset
            .create_layer(LayerOptions {
                name: "segments",
                srs: srs.as_ref(),
                ..Default::default()
            })
            .context("Failed to create layer")?;

        layer
            .create_defn_fields(&[
                ("segment_id", OGRFieldType::OFTInteger64),
                ("length", OGRFieldType::OFTReal),
                ("total_damage", OGRFieldType::OFTReal),
                ("damage_density", OGRFieldType::OFTReal),
                ("asset_count", OGRFieldType::OFTInteger64),
            ])
            .context("Failed to define fields")?;

        for segment in segments {
            let geometry = segment
                .polygon
                .to_gdal()
                .context(format!("Failed to convert segment {}", segment.id))?;

            // 密度が未定義なら項目を設定しない（null）
            let mut names: Vec<&str> = FIELD_NAMES.to_vec();
            let mut values = vec![
                FieldValue::Integer64Value(segment.id as i64),
                FieldValue::RealValue(segment.boundary_length),
                FieldValue::RealValue(segment.total_damage),
                FieldValue::RealValue(segment.damage_density),
                FieldValue::Integer64Value(segment.asset_count as i64),
            ];
            if !segment.damage_density.is_finite() {
                names.remove(3);
                values.remove(3);
            }
            layer
                .create_feature_fields(geometry, &names, &values)
                .context(format!("Failed to write segment {}", segment.id))?;
        }

        tracing::info!(
            "Wrote {} segments to {:?} ({})",
            segments.len(),
            output_path,
            name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdal::Dataset;
    use geo::{LineString, Polygon};
    use tempfile::TempDir;

    #[test]
    fn test_driver_name_by_extension() {
        assert_eq!(driver_name(Path::new("out.GPKG")).unwrap(), "GPKG");
        assert_eq!(driver_name(Path::new("out.shp")).unwrap(), "ESRI Shapefile");
        assert!(driver_name(Path::new("out.csv")).is_err());
    }

    #[test]
    fn test_write_geopackage() {
        if DriverManager::get_driver_by_name("GPKG").is_err() {
            eprintln!("Skipping test: GPKG driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("segments.gpkg");
        let segment = Segment {
            id: 1,
            polygon: Polygon::new(
                LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 5.0), (0.0, 0.0)]),
                vec![],
            ),
            boundary_length: 10.0,
            total_damage: 50.0,
            damage_density: 5.0,
            asset_count: 2,
        };

        OgrWriter::new()
            .write_segments(&[segment], &output_path)
            .unwrap();

        let dataset = Dataset::open(&output_path).unwrap();
        let layer = dataset.layer(0).unwrap();
        assert_eq!(layer.feature_count(), 1);
    }
}
