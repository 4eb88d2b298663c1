//! In-memory geometry engine backing the service traits.

mod lines;
mod polygonize;
mod raster;
mod spatial;

pub(crate) use spatial::PointIndex;

use geo::{Coord, LineString, MultiLineString, Polygon};

use crate::error::Result;
use crate::model::{CellMask, ElevationField};
use crate::service::{GeometryService, RasterOps, VectorOps};

/// 平面座標系（メートル）で全ての処理を行うエンジン
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

impl PlanarEngine {
    pub fn new() -> Self {
        Self
    }
}

impl RasterOps for PlanarEngine {
    fn focal_mean(&self, field: &ElevationField, radius: usize) -> Result<ElevationField> {
        raster::focal_mean(field, radius)
    }

    fn reclassify_range(&self, field: &ElevationField, lo: f64, hi: f64) -> CellMask {
        raster::reclassify_range(field, lo, hi)
    }

    fn sieve(&self, mask: &CellMask, min_cells: usize) -> CellMask {
        raster::sieve(mask, min_cells)
    }

    fn thin(&self, mask: &CellMask) -> CellMask {
        raster::thin(mask)
    }

    fn trace_lines(
        &self,
        mask: &CellMask,
        field: &ElevationField,
        simplify_tolerance: f64,
    ) -> Vec<LineString<f64>> {
        raster::trace_lines(mask, field, simplify_tolerance)
    }
}

impl VectorOps for PlanarEngine {
    fn extend_lines(
        &self,
        lines: Vec<LineString<f64>>,
        max_extension: f64,
    ) -> Vec<LineString<f64>> {
        lines::extend_lines(lines, max_extension)
    }

    fn merge_lines(&self, lines: Vec<LineString<f64>>, tolerance: f64) -> MultiLineString<f64> {
        lines::merge_lines(lines, tolerance)
    }

    fn split_at_points(
        &self,
        line: &LineString<f64>,
        points: &[Coord<f64>],
        tolerance: f64,
    ) -> Vec<LineString<f64>> {
        lines::split_at_points(line, points, tolerance)
    }

    fn polygonize(&self, lines: &[LineString<f64>], tolerance: f64) -> Vec<Polygon<f64>> {
        polygonize::polygonize(lines, tolerance)
    }

    fn nearest_neighbors(
        &self,
        from: &[Coord<f64>],
        to: &[Coord<f64>],
    ) -> Vec<Option<(usize, f64)>> {
        spatial::nearest_neighbors(from, to)
    }

    fn touches_lines(
        &self,
        polygon: &Polygon<f64>,
        lines: &[LineString<f64>],
        tolerance: f64,
    ) -> bool {
        spatial::touches_lines(polygon, lines, tolerance)
    }

    fn locate_points(
        &self,
        polygons: &[Polygon<f64>],
        points: &[Coord<f64>],
        tolerance: f64,
    ) -> Vec<Option<usize>> {
        spatial::locate_points(polygons, points, tolerance)
    }
}

impl GeometryService for PlanarEngine {}
