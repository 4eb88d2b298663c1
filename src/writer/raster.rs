use anyhow::{Context, Result};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};
use std::path::Path;

use crate::model::ElevationField;

const NODATA_VALUE: f64 = -9999.0;

/// 平滑化後の標高を GeoTIFF に書き出す
#[derive(Default)]
pub struct GeoTiffWriter {
    epsg: Option<u32>,
}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self { epsg: None }
    }

    pub fn with_epsg(mut self, epsg: Option<u32>) -> Self {
        self.epsg = epsg;
        self
    }

    pub fn write(&self, field: &ElevationField, output_path: &Path) -> Result<()> {
        // GTiffドライバーを取得
        let driver =
            DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;

        let (rows, cols) = field.shape();
        let mut dataset = driver
            .create_with_band_type::<f32, _>(output_path, cols, rows, 1)
            .context("Failed to create dataset")?;

        dataset
            .set_geo_transform(&field.geo_transform())
            .context("Failed to set geo transform")?;

        if let Some(epsg) = self.epsg {
            let srs = SpatialRef::from_epsg(epsg)
                .context(format!("Failed to create SpatialRef from EPSG:{}", epsg))?;
            let wkt = srs
                .to_wkt()
                .context("Failed to convert SpatialRef to WKT")?;
            dataset
                .set_projection(&wkt)
                .context("Failed to set projection")?;
        }

        let mut band = dataset.rasterband(1).context("Failed to get raster band")?;
        band.set_no_data_value(Some(NODATA_VALUE))
            .context("Failed to set no data value")?;

        // 欠測セルは NoData に置き換える（行優先）
        let values: Vec<f64> = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (row, col)))
            .map(|(row, col)| field.get(row, col).unwrap_or(NODATA_VALUE))
            .collect();
        let mut buffer = Buffer::new((cols, rows), values);
        band.write((0, 0), (cols, rows), &mut buffer)
            .context("Failed to write raster data")?;

        dataset
            .set_metadata_item("CONTENT", "smoothed elevation", "")
            .context("Failed to set content metadata")?;

        tracing::info!("Wrote {} x {} raster to {:?}", cols, rows, output_path);
        Ok(())
    }
}
