use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::SamplingConfig;
use crate::engine::PointIndex;
use crate::error::{CurveRole, Result, SeawallError};
use crate::model::{CandidatePoint, Curve};

/// 曲線上に一定間隔以上離れた候補点をランダムに配置する
pub struct PointSampler<'a> {
    config: &'a SamplingConfig,
}

impl<'a> PointSampler<'a> {
    pub fn new(config: &'a SamplingConfig) -> Self {
        Self { config }
    }

    /// 曲線ごとに独立した乱数列（高潮側は seed + 1）
    pub fn seed_for(&self, role: CurveRole) -> u64 {
        match role {
            CurveRole::Tide => self.config.seed,
            CurveRole::Surge => self.config.seed.wrapping_add(1),
        }
    }

    pub fn sample(&self, curve: &Curve, role: CurveRole) -> Result<Vec<CandidatePoint>> {
        let config = self.config;
        let total = curve.length();
        let insufficient = |attempts| SeawallError::InsufficientCandidatePoints {
            curve: role,
            attempts,
            spacing: config.spacing,
        };
        if !(total > 0.0) {
            return Err(insufficient(0));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed_for(role));
        let mut index = PointIndex::new();
        let mut points: Vec<CandidatePoint> = Vec::with_capacity(config.target_count);
        let mut attempts = 0;

        while attempts < config.max_attempts && points.len() < config.target_count {
            attempts += 1;
            let distance = rng.gen_range(0.0..total);
            let Some((part, offset, position)) = curve.point_at(distance) else {
                continue;
            };
            // 既存点から spacing 未満なら棄却
            if index.has_within(position, config.spacing) {
                continue;
            }
            let id = points.len() as u32;
            index.insert(position, id as usize);
            points.push(CandidatePoint {
                id,
                position,
                part,
                offset,
            });
        }

        if points.is_empty() {
            return Err(insufficient(attempts));
        }
        if points.len() < config.target_count {
            debug!(
                "Only {} of {} points fit on the {} curve",
                points.len(),
                config.target_count,
                role
            );
        }
        info!(
            "Sampled {} points on the {} curve after {} attempts",
            points.len(),
            role,
            attempts
        );
        Ok(points)
    }
}
