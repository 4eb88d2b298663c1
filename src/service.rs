//! Host geometry capabilities consumed by the pipeline.
//!
//! The pipeline never implements raster filters or planar topology itself; it
//! calls these traits. [`crate::engine::PlanarEngine`] is the in-memory
//! implementation, tests can substitute their own.

use geo::{Coord, LineString, MultiLineString, Polygon};

use crate::error::Result;
use crate::model::{CellMask, ElevationField};

pub trait RasterOps {
    /// 円形窓の平均による平滑化
    fn focal_mean(&self, field: &ElevationField, radius: usize) -> Result<ElevationField>;

    /// `lo <= v <= hi` のセルを1にする
    fn reclassify_range(&self, field: &ElevationField, lo: f64, hi: f64) -> CellMask;

    /// `min_cells` 未満の連結成分（8近傍）を除去
    fn sieve(&self, mask: &CellMask, min_cells: usize) -> CellMask;

    /// 1セル幅への細線化
    fn thin(&self, mask: &CellMask) -> CellMask;

    /// 細線化済みマスクを折れ線に変換（座標はセル中心）
    fn trace_lines(
        &self,
        mask: &CellMask,
        field: &ElevationField,
        simplify_tolerance: f64,
    ) -> Vec<LineString<f64>>;
}

pub trait VectorOps {
    /// 端点を延長して近くの線に接続する
    fn extend_lines(&self, lines: Vec<LineString<f64>>, max_extension: f64)
        -> Vec<LineString<f64>>;

    /// 端点を共有する線をつなげて一つにまとめる
    fn merge_lines(&self, lines: Vec<LineString<f64>>, tolerance: f64) -> MultiLineString<f64>;

    fn split_at_points(
        &self,
        line: &LineString<f64>,
        points: &[Coord<f64>],
        tolerance: f64,
    ) -> Vec<LineString<f64>>;

    /// 線群が囲む全ての閉領域
    fn polygonize(&self, lines: &[LineString<f64>], tolerance: f64) -> Vec<Polygon<f64>>;

    /// `from` の各点について `to` の最近点 (index, distance)
    fn nearest_neighbors(&self, from: &[Coord<f64>], to: &[Coord<f64>]) -> Vec<Option<(usize, f64)>>;

    /// ポリゴン境界がいずれかの線と `tolerance` 以内で接するか
    fn touches_lines(&self, polygon: &Polygon<f64>, lines: &[LineString<f64>], tolerance: f64)
        -> bool;

    /// 各点を含む（または `tolerance` 以内の）ポリゴン番号
    fn locate_points(
        &self,
        polygons: &[Polygon<f64>],
        points: &[Coord<f64>],
        tolerance: f64,
    ) -> Vec<Option<usize>>;
}

pub trait GeometryService: RasterOps + VectorOps + Sync {
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }
}
