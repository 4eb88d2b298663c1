use std::time::Instant;

use tracing::info;

use crate::config::PipelineConfig;
use crate::contour::ContourExtractor;
use crate::damage::DamageAggregator;
use crate::error::{CurveRole, Result, SeawallError, Warning};
use crate::matcher::CorrespondenceMatcher;
use crate::model::{
    Asset, AssetDamage, CandidatePoint, Connector, Curve, ElevationField, MatchedPair, Segment,
};
use crate::sampler::PointSampler;
use crate::segment::SegmentBuilder;
use crate::service::GeometryService;

/// 途中経過（確認用・ワークスペース出力用）
#[derive(Debug, Clone, PartialEq)]
pub struct Intermediates {
    pub smoothed: ElevationField,
    pub tide: Curve,
    pub surge: Curve,
    pub tide_points: Vec<CandidatePoint>,
    pub surge_points: Vec<CandidatePoint>,
    pub pairs: Vec<MatchedPair>,
    pub connectors: Vec<Connector>,
    pub asset_damages: Vec<AssetDamage>,
}

/// パイプラインの最終結果
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentLayer {
    pub segments: Vec<Segment>,
    pub warnings: Vec<Warning>,
    pub intermediates: Intermediates,
}

pub struct Pipeline<'a, S: ?Sized> {
    service: &'a S,
    config: PipelineConfig,
}

impl<'a, S> Pipeline<'a, S>
where
    S: GeometryService + ?Sized,
{
    pub fn new(service: &'a S, config: PipelineConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(
        &self,
        field: &ElevationField,
        assets: &[Asset],
        tide: f64,
        surge: f64,
    ) -> Result<SegmentLayer> {
        let start = Instant::now();
        let config = &self.config;

        // 前提条件の確認
        self.service.ensure_available()?;
        config.validate()?;
        if !(tide < surge) {
            return Err(SeawallError::invalid(
                "surge",
                surge,
                "must be greater than the tide elevation",
            ));
        }

        // 1. 等高線（平滑化は共有）
        let extractor = ContourExtractor::new(self.service, &config.contour);
        let smoothed = extractor.smooth(field)?;
        let (tide_curve, surge_curve) = if config.parallel_contours {
            rayon::join(
                || extractor.extract_smoothed(&smoothed, tide),
                || extractor.extract_smoothed(&smoothed, surge),
            )
        } else {
            (
                extractor.extract_smoothed(&smoothed, tide),
                extractor.extract_smoothed(&smoothed, surge),
            )
        };
        let (tide_curve, surge_curve) = (tide_curve?, surge_curve?);

        // 2. 候補点
        let sampler = PointSampler::new(&config.sampling);
        let tide_points = sampler.sample(&tide_curve, CurveRole::Tide)?;
        let surge_points = sampler.sample(&surge_curve, CurveRole::Surge)?;

        // 3. 対応付け
        let pairs = CorrespondenceMatcher::new(self.service, &config.matching).match_points(
            &tide_points,
            &surge_points,
            config.sampling.spacing,
        );

        // 4. 区画
        let built = SegmentBuilder::new(self.service, &config.segment).build(
            &tide_curve,
            &surge_curve,
            &pairs,
        )?;
        let mut segments = built.segments;

        // 5. 被害額
        let aggregator = DamageAggregator::new(self.service, &config.damage);
        let (asset_damages, mut warnings) = aggregator.assess(field, assets, surge);
        warnings.extend(aggregator.aggregate(&mut segments, &asset_damages));

        info!(
            "Pipeline finished: {} segments, {} warnings in {:?}",
            segments.len(),
            warnings.len(),
            start.elapsed()
        );
        Ok(SegmentLayer {
            segments,
            warnings,
            intermediates: Intermediates {
                smoothed,
                tide: tide_curve,
                surge: surge_curve,
                tide_points,
                surge_points,
                pairs,
                connectors: built.connectors,
                asset_damages,
            },
        })
    }
}
