use std::time::Instant;

use geo::{Coord, LineString, Polygon};
use tracing::{debug, info, warn};

use crate::config::SegmentConfig;
use crate::error::{Result, SeawallError};
use crate::geometry::{line_length, point_along, ring_distance};
use crate::model::{Connector, Curve, MatchedPair, Segment};
use crate::service::VectorOps;

/// 区画化の結果
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSet {
    pub segments: Vec<Segment>,
    pub connectors: Vec<Connector>,
}

/// 対応点を結ぶ連結線と二本の曲線から区画ポリゴンを組み立てる
pub struct SegmentBuilder<'a, S: ?Sized> {
    service: &'a S,
    config: &'a SegmentConfig,
}

impl<'a, S> SegmentBuilder<'a, S>
where
    S: VectorOps + ?Sized,
{
    pub fn new(service: &'a S, config: &'a SegmentConfig) -> Self {
        Self { service, config }
    }

    /// 曲線上の最近点に寄せる（許容距離を超えたら None）
    fn snap(&self, curve: &Curve, p: Coord<f64>) -> Option<Coord<f64>> {
        let (_, location) = curve.closest_point(p)?;
        (location.distance <= self.config.snap_tolerance).then_some(location.coord)
    }

    pub fn build(&self, tide: &Curve, surge: &Curve, pairs: &[MatchedPair]) -> Result<SegmentSet> {
        let start = Instant::now();
        let tolerance = self.config.node_tolerance;

        // 1. 端点を曲線に寄せて連結線を作る
        let mut connectors = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let snapped = self
                .snap(tide, pair.source.position)
                .zip(self.snap(surge, pair.target.position));
            match snapped {
                Some((a, b)) => connectors.push(Connector {
                    source_id: pair.source.id,
                    target_id: pair.target.id,
                    line: LineString::new(vec![a, b]),
                }),
                None => warn!(
                    "Dropping pair {} -> {}: endpoint farther than {} from its curve",
                    pair.source.id, pair.target.id, self.config.snap_tolerance
                ),
            }
        }
        let failure = |reason: &str| SeawallError::Segmentation {
            reason: reason.to_string(),
            connectors: connectors.len(),
        };

        // 2. 連結線の端点で両曲線を分割
        let tide_cuts: Vec<Coord<f64>> = connectors.iter().map(|c| c.line.0[0]).collect();
        let surge_cuts: Vec<Coord<f64>> = connectors.iter().map(|c| c.line.0[1]).collect();
        let tide_pieces = self.split_curve(tide, &tide_cuts);
        let surge_pieces = self.split_curve(surge, &surge_cuts);
        debug!(
            "Split curves into {} tide and {} surge pieces",
            tide_pieces.len(),
            surge_pieces.len()
        );

        // 3. ポリゴン化
        let mut lines = Vec::with_capacity(tide_pieces.len() + surge_pieces.len() + connectors.len());
        lines.extend(tide_pieces.iter().cloned());
        lines.extend(surge_pieces);
        lines.extend(connectors.iter().map(|c| c.line.clone()));
        let polygons = self.service.polygonize(&lines, tolerance);
        if polygons.is_empty() {
            return Err(failure("polygonization produced no closed region"));
        }

        // 4. 潮位線に接しない内側の領域を除く
        let total = polygons.len();
        let adjacent: Vec<Polygon<f64>> = polygons
            .into_iter()
            .filter(|polygon| {
                self.service
                    .touches_lines(polygon, &tide_pieces, self.config.snap_tolerance)
            })
            .collect();
        if adjacent.is_empty() {
            return Err(failure("no closed region touches the tide curve"));
        }
        debug!("{} of {} regions touch the tide curve", adjacent.len(), total);

        // 5. 境界長（接する潮位線片の最大長）
        let segments: Vec<Segment> = adjacent
            .into_iter()
            .enumerate()
            .map(|(i, polygon)| {
                let boundary_length = boundary_length(&polygon, &tide_pieces, tolerance * 2.0);
                Segment {
                    id: i + 1,
                    polygon,
                    boundary_length,
                    total_damage: 0.0,
                    damage_density: f64::NAN,
                    asset_count: 0,
                }
            })
            .collect();

        info!(
            "Built {} segments from {} connectors in {:?}",
            segments.len(),
            connectors.len(),
            start.elapsed()
        );
        Ok(SegmentSet {
            segments,
            connectors,
        })
    }

    fn split_curve(&self, curve: &Curve, cuts: &[Coord<f64>]) -> Vec<LineString<f64>> {
        curve
            .parts
            .0
            .iter()
            .flat_map(|part| {
                self.service
                    .split_at_points(part, cuts, self.config.node_tolerance)
            })
            .collect()
    }
}

/// 中点がポリゴン境界上にある曲線片のうち最長のもの
fn boundary_length(polygon: &Polygon<f64>, pieces: &[LineString<f64>], tolerance: f64) -> f64 {
    pieces
        .iter()
        .filter_map(|piece| {
            let length = line_length(piece);
            let mid = point_along(piece, length / 2.0)?;
            let on_boundary = std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .any(|ring| ring_distance(ring, mid) <= tolerance);
            on_boundary.then_some(length)
        })
        .fold(0.0, f64::max)
}
