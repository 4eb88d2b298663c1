use geo::{BoundingRect, Contains, MultiPolygon, Point};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::DamageConfig;
use crate::error::Warning;
use crate::model::{Asset, AssetDamage, ElevationField, Segment};
use crate::service::VectorOps;

/// 浸水深に応じた被害額（既定の -2 / +7 帯）
pub fn storm_damage(value: f64, ground: f64, surge: f64) -> f64 {
    storm_damage_with(value, ground, surge, &DamageConfig::default())
}

pub fn storm_damage_with(value: f64, ground: f64, surge: f64, config: &DamageConfig) -> f64 {
    let flooded = surge - ground;
    let lower = ground + config.lower_offset;
    let upper = ground + config.upper_offset;
    let fraction = (flooded / (upper - lower)).clamp(0.0, 1.0);
    value * fraction
}

/// 外形内に中心があるセルの平均標高
fn footprint_mean(field: &ElevationField, shape: &MultiPolygon<f64>) -> Option<f64> {
    let rect = shape.bounding_rect()?;
    let size = field.cell_size;
    let col_lo = ((rect.min().x - field.origin_x) / size).floor().max(0.0);
    let col_hi = ((rect.max().x - field.origin_x) / size)
        .floor()
        .min(field.cols as f64 - 1.0);
    let row_lo = ((field.origin_y - rect.max().y) / size).floor().max(0.0);
    let row_hi = ((field.origin_y - rect.min().y) / size)
        .floor()
        .min(field.rows as f64 - 1.0);
    if col_lo > col_hi || row_lo > row_hi {
        return None;
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for row in row_lo as usize..=row_hi as usize {
        for col in col_lo as usize..=col_hi as usize {
            if !shape.contains(&Point::from(field.cell_center(row, col))) {
                continue;
            }
            if let Some(v) = field.get(row, col) {
                sum += v;
                count += 1;
            }
        }
    }
    (count > 0).then(|| sum / count as f64)
}

/// 地盤高: 外形があればその平均、なければ（小さすぎる外形も）代表点のセル
pub fn ground_elevation(field: &ElevationField, asset: &Asset) -> Option<f64> {
    asset
        .footprint
        .as_ref()
        .and_then(|shape| footprint_mean(field, shape))
        .or_else(|| field.sample(asset.position.x, asset.position.y))
}

/// 資産ごとの被害額を求め、区画ごとに集計する
pub struct DamageAggregator<'a, S: ?Sized> {
    service: &'a S,
    config: &'a DamageConfig,
}

impl<'a, S> DamageAggregator<'a, S>
where
    S: VectorOps + Sync + ?Sized,
{
    pub fn new(service: &'a S, config: &'a DamageConfig) -> Self {
        Self { service, config }
    }

    /// 標高を取得できない資産は警告として返す
    pub fn assess(
        &self,
        field: &ElevationField,
        assets: &[Asset],
        surge: f64,
    ) -> (Vec<AssetDamage>, Vec<Warning>) {
        let results: Vec<Result<AssetDamage, Warning>> = assets
            .par_iter()
            .map(|asset| {
                let ground = ground_elevation(field, asset)
                    .ok_or_else(|| Warning::AssetWithoutElevation {
                        asset_id: asset.id.clone(),
                    })?;
                Ok(AssetDamage {
                    asset_id: asset.id.clone(),
                    position: asset.position,
                    ground_elevation: ground,
                    damage: storm_damage_with(asset.value, ground, surge, self.config),
                })
            })
            .collect();

        let mut damages = Vec::with_capacity(results.len());
        let mut warnings = Vec::new();
        for result in results {
            match result {
                Ok(damage) => damages.push(damage),
                Err(warning) => {
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        (damages, warnings)
    }

    pub fn aggregate(&self, segments: &mut [Segment], damages: &[AssetDamage]) -> Vec<Warning> {
        let polygons: Vec<_> = segments.iter().map(|s| s.polygon.clone()).collect();
        let positions: Vec<_> = damages.iter().map(|d| d.position).collect();
        let located = self
            .service
            .locate_points(&polygons, &positions, self.config.join_tolerance);

        let mut totals = vec![0.0; segments.len()];
        let mut counts = vec![0usize; segments.len()];
        let mut unassigned = 0usize;
        for (damage, index) in damages.iter().zip(located) {
            match index {
                Some(i) => {
                    totals[i] += damage.damage;
                    counts[i] += 1;
                }
                None => unassigned += 1,
            }
        }

        let mut warnings = Vec::new();
        for ((segment, total), count) in segments.iter_mut().zip(totals).zip(counts) {
            segment.total_damage = total;
            segment.asset_count = count;
            segment.damage_density =
                if segment.boundary_length.is_finite() && segment.boundary_length > 0.0 {
                    total / segment.boundary_length
                } else {
                    let warning = Warning::UndefinedDensity {
                        segment_id: segment.id,
                    };
                    warn!("{}", warning);
                    warnings.push(warning);
                    f64::NAN
                };
        }

        info!(
            "Aggregated {} assets into {} segments ({} outside every segment)",
            damages.len() - unassigned,
            segments.len(),
            unassigned
        );
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PlanarEngine;
    use geo::{Coord, LineString, Polygon};

    fn point_asset(id: &str, x: f64, y: f64) -> Asset {
        Asset {
            id: id.into(),
            position: Coord { x, y },
            footprint: None,
            value: 90.0,
        }
    }

    fn square_segment(id: usize, x0: f64, boundary_length: f64) -> Segment {
        Segment {
            id,
            polygon: Polygon::new(
                LineString::from(vec![
                    (x0, 0.0),
                    (x0 + 10.0, 0.0),
                    (x0 + 10.0, 10.0),
                    (x0, 10.0),
                    (x0, 0.0),
                ]),
                vec![],
            ),
            boundary_length,
            total_damage: 0.0,
            damage_density: f64::NAN,
            asset_count: 0,
        }
    }

    fn damage(id: &str, x: f64, y: f64, amount: f64) -> AssetDamage {
        AssetDamage {
            asset_id: id.to_string(),
            position: Coord { x, y },
            ground_elevation: 0.0,
            damage: amount,
        }
    }

    #[test]
    fn test_storm_damage_boundary_examples() {
        assert_eq!(storm_damage(100_000.0, 5.0, 4.0), 0.0);
        assert_eq!(storm_damage(100_000.0, 0.0, 15.0), 100_000.0);
        // 部分浸水: 4.5 / 9
        assert!((storm_damage(90.0, 0.0, 4.5) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_storm_damage_is_monotone_and_bounded() {
        let v = 250_000.0;
        let mut previous = 0.0;
        for step in 0..200 {
            let s = -5.0 + step as f64 * 0.1;
            let d = storm_damage(v, 1.0, s);
            assert!(d >= previous);
            assert!((0.0..=v).contains(&d));
            previous = d;
        }

        let mut previous = v;
        for step in 0..200 {
            let ground = -5.0 + step as f64 * 0.1;
            let d = storm_damage(v, ground, 6.0);
            assert!(d <= previous);
            previous = d;
        }
    }

    #[test]
    fn test_assess_warns_outside_raster() {
        let field = ElevationField::new(2, 2, (0.0, 2.0), 1.0, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let assets = vec![point_asset("a", 0.5, 1.5), point_asset("b", 5.0, 5.0)];
        let config = DamageConfig::default();
        let engine = PlanarEngine::new();
        let (damages, warnings) = DamageAggregator::new(&engine, &config).assess(&field, &assets, 4.5);

        assert_eq!(damages.len(), 1);
        assert_eq!(damages[0].ground_elevation, 0.0);
        assert!((damages[0].damage - 45.0).abs() < 1e-9);
        assert_eq!(
            warnings,
            vec![Warning::AssetWithoutElevation {
                asset_id: "b".into()
            }]
        );
    }

    #[test]
    fn test_ground_elevation_averages_footprint() {
        // 30x30 セル、中庭 x∈[10,20], y∈[10,30] だけ標高 100、他は 2
        let values = (0..900)
            .map(|i| {
                let (row, col) = (i / 30, i % 30);
                let courtyard = (10..20).contains(&col) && row < 20;
                if courtyard {
                    100.0
                } else {
                    2.0
                }
            })
            .collect();
        let field = ElevationField::new(30, 30, (0.0, 30.0), 1.0, values).unwrap();

        let u_shape = Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (30.0, 0.0),
                (30.0, 30.0),
                (20.0, 30.0),
                (20.0, 10.0),
                (10.0, 10.0),
                (10.0, 30.0),
                (0.0, 30.0),
                (0.0, 0.0),
            ]),
            vec![],
        );
        // 代表点が中庭にあっても外形の平均を使う
        let building = Asset {
            footprint: Some(MultiPolygon::new(vec![u_shape])),
            ..point_asset("u", 15.0, 20.0)
        };
        assert_eq!(ground_elevation(&field, &building), Some(2.0));
        assert_eq!(ground_elevation(&field, &point_asset("p", 15.0, 20.0)), Some(100.0));

        // セル中心を含まない小さな外形は代表点で補う
        let tiny = Polygon::new(
            LineString::from(vec![(15.1, 20.1), (15.3, 20.1), (15.3, 20.3), (15.1, 20.1)]),
            vec![],
        );
        let small = Asset {
            footprint: Some(MultiPolygon::new(vec![tiny])),
            ..point_asset("s", 15.2, 20.2)
        };
        assert_eq!(ground_elevation(&field, &small), Some(100.0));

        // ラスタ外の外形は標高なし
        let outside = Polygon::new(
            LineString::from(vec![(40.0, 40.0), (45.0, 40.0), (45.0, 45.0), (40.0, 40.0)]),
            vec![],
        );
        let off = Asset {
            footprint: Some(MultiPolygon::new(vec![outside])),
            ..point_asset("o", 42.0, 41.0)
        };
        assert_eq!(ground_elevation(&field, &off), None);
    }

    #[test]
    fn test_aggregate_sums_and_densities() {
        let mut segments = vec![square_segment(1, 0.0, 20.0), square_segment(2, 10.0, 0.0)];
        let damages = vec![
            damage("a", 2.0, 2.0, 100.0),
            damage("b", 8.0, 8.0, 60.0),
            // 許容距離内で最寄りの区画へ
            damage("c", 25.0, 5.0, 10.0),
            damage("d", 100.0, 100.0, 999.0),
        ];
        let config = DamageConfig::default();
        let engine = PlanarEngine::new();
        let warnings = DamageAggregator::new(&engine, &config).aggregate(&mut segments, &damages);

        assert_eq!(segments[0].total_damage, 160.0);
        assert_eq!(segments[0].asset_count, 2);
        assert!((segments[0].damage_density - 8.0).abs() < 1e-12);

        assert_eq!(segments[1].total_damage, 10.0);
        assert!(segments[1].damage_density.is_nan());
        assert_eq!(warnings, vec![Warning::UndefinedDensity { segment_id: 2 }]);
    }
}
