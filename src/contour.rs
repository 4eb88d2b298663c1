use std::time::Instant;

use tracing::{debug, info};

use crate::config::ContourConfig;
use crate::error::{ContourStage, Result, SeawallError};
use crate::geometry::line_length;
use crate::model::{Curve, ElevationField};
use crate::service::{RasterOps, VectorOps};

/// 標高場から指定標高の境界線を一本の `Curve` として取り出す
pub struct ContourExtractor<'a, S: ?Sized> {
    service: &'a S,
    config: &'a ContourConfig,
}

impl<'a, S> ContourExtractor<'a, S>
where
    S: RasterOps + VectorOps + ?Sized,
{
    pub fn new(service: &'a S, config: &'a ContourConfig) -> Self {
        Self { service, config }
    }

    /// 平滑化のみ（両方の標高で共有できる）
    pub fn smooth(&self, field: &ElevationField) -> Result<ElevationField> {
        let mut smoothed = field.clone();
        for _ in 0..self.config.smoothing_passes {
            smoothed = self
                .service
                .focal_mean(&smoothed, self.config.smoothing_radius)?;
        }
        Ok(smoothed)
    }

    pub fn extract(&self, field: &ElevationField, elevation: f64) -> Result<Curve> {
        let smoothed = self.smooth(field)?;
        self.extract_smoothed(&smoothed, elevation)
    }

    /// 平滑化済みの場から抽出する
    pub fn extract_smoothed(&self, smoothed: &ElevationField, elevation: f64) -> Result<Curve> {
        let start = Instant::now();
        let config = self.config;
        let empty = |stage| SeawallError::EmptyContour { elevation, stage };

        // 標高帯の抽出
        let (lo, hi) = config.band_for(elevation);
        let band = self.service.reclassify_range(smoothed, lo, hi);
        debug!("Band [{}, {}] selected {} cells", lo, hi, band.count());
        if band.count() == 0 {
            return Err(empty(ContourStage::Reclassify));
        }

        // 小さな領域の除去
        let regions = self.service.sieve(&band, config.min_region_cells);
        debug!("{} cells survive the region filter", regions.count());
        if regions.count() == 0 {
            return Err(empty(ContourStage::RegionFilter));
        }

        // 細線化とベクタ化
        let skeleton = self.service.thin(&regions);
        let lines: Vec<_> = self
            .service
            .trace_lines(&skeleton, smoothed, config.simplify_tolerance)
            .into_iter()
            .filter(|line| line_length(line) >= config.min_line_length)
            .collect();
        debug!("{} polylines survive the length filter", lines.len());
        if lines.is_empty() {
            return Err(empty(ContourStage::LengthFilter));
        }

        // 隙間を埋めて一本にまとめる
        let extended = self.service.extend_lines(lines, config.max_extension);
        let merged = self.service.merge_lines(extended, config.merge_tolerance);
        let curve = Curve::new(elevation, merged);

        info!(
            "Extracted contour at {}: {} parts, length {:.1} in {:?}",
            elevation,
            curve.parts.0.len(),
            curve.length(),
            start.elapsed()
        );
        Ok(curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PlanarEngine;

    fn ramp(rows: usize, cols: usize, slope: f64) -> ElevationField {
        let values = (0..rows * cols).map(|i| (i % cols) as f64 * slope).collect();
        ElevationField::new(rows, cols, (0.0, rows as f64), 1.0, values).unwrap()
    }

    fn small_config() -> ContourConfig {
        ContourConfig {
            smoothing_radius: 2,
            smoothing_passes: 1,
            min_region_cells: 50,
            min_line_length: 20.0,
            max_extension: 5.0,
            ..ContourConfig::default()
        }
    }

    #[test]
    fn test_extract_ramp_gives_vertical_line() {
        let field = ramp(120, 60, 0.1);
        let config = small_config();
        let engine = PlanarEngine::new();
        let curve = ContourExtractor::new(&engine, &config)
            .extract(&field, 4.0)
            .unwrap();

        assert!(!curve.is_empty());
        assert_eq!(curve.elevation, 4.0);
        // 帯 [3.9, 4.4] は列39..=44 付近
        for part in &curve.parts.0 {
            for c in &part.0 {
                assert!(c.x > 36.0 && c.x < 47.0, "x = {}", c.x);
            }
        }
        assert!(curve.length() > 100.0);
    }

    #[test]
    fn test_flat_field_reports_empty_band() {
        let field = ElevationField::new(50, 50, (0.0, 50.0), 1.0, vec![0.0; 2500]).unwrap();
        let config = small_config();
        let engine = PlanarEngine::new();
        let result = ContourExtractor::new(&engine, &config).extract(&field, 4.0);

        assert!(matches!(
            result,
            Err(SeawallError::EmptyContour {
                stage: ContourStage::Reclassify,
                ..
            })
        ));
    }

    #[test]
    fn test_region_and_length_filters_report_stage() {
        let field = ramp(120, 60, 0.1);
        let engine = PlanarEngine::new();

        let config = ContourConfig {
            min_region_cells: 1_000_000,
            ..small_config()
        };
        let result = ContourExtractor::new(&engine, &config).extract(&field, 4.0);
        assert!(matches!(
            result,
            Err(SeawallError::EmptyContour {
                stage: ContourStage::RegionFilter,
                ..
            })
        ));

        let config = ContourConfig {
            min_line_length: 10_000.0,
            ..small_config()
        };
        let result = ContourExtractor::new(&engine, &config).extract(&field, 4.0);
        assert!(matches!(
            result,
            Err(SeawallError::EmptyContour {
                stage: ContourStage::LengthFilter,
                ..
            })
        ));
    }
}
