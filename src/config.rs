use crate::error::{Result, SeawallError};

/// 標高帯の上下幅
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandOffsets {
    pub below: f64,
    pub above: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContourConfig {
    /// 平滑化の半径（セル数）
    pub smoothing_radius: usize,
    pub smoothing_passes: usize,
    /// これより高い標高では `high_band`、以下では `low_band` を使う
    pub band_split: f64,
    pub high_band: BandOffsets,
    pub low_band: BandOffsets,
    pub min_region_cells: usize,
    pub min_line_length: f64,
    pub simplify_tolerance: f64,
    pub max_extension: f64,
    pub merge_tolerance: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            smoothing_radius: 30,
            smoothing_passes: 3,
            band_split: 6.0,
            high_band: BandOffsets {
                below: 0.5,
                above: 0.1,
            },
            low_band: BandOffsets {
                below: 0.1,
                above: 0.4,
            },
            min_region_cells: 10_000,
            min_line_length: 2000.0,
            simplify_tolerance: 1.0,
            max_extension: 500.0,
            merge_tolerance: 1.0,
        }
    }
}

impl ContourConfig {
    /// 対象標高 `elevation` の周りで抽出する標高帯 `[lo, hi]`
    pub fn band_for(&self, elevation: f64) -> (f64, f64) {
        let offsets = if elevation > self.band_split {
            self.high_band
        } else {
            self.low_band
        };
        (elevation - offsets.below, elevation + offsets.above)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub target_count: usize,
    /// 点同士の最小間隔（マッチングの距離閾値も兼ねる）
    pub spacing: f64,
    pub max_attempts: usize,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            target_count: 1600,
            spacing: 150.0,
            max_attempts: 32_000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub cluster_link_factor: f64,
    pub cluster_break_distance: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            cluster_link_factor: 1.5,
            cluster_break_distance: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentConfig {
    pub snap_tolerance: f64,
    pub node_tolerance: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            snap_tolerance: 10.0,
            node_tolerance: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DamageConfig {
    pub lower_offset: f64,
    pub upper_offset: f64,
    pub join_tolerance: f64,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            lower_offset: -2.0,
            upper_offset: 7.0,
            join_tolerance: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub contour: ContourConfig,
    pub sampling: SamplingConfig,
    pub matching: MatchingConfig,
    pub segment: SegmentConfig,
    pub damage: DamageConfig,
    pub parallel_contours: bool,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self {
            parallel_contours: true,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.contour;
        if c.smoothing_radius == 0 && c.smoothing_passes > 0 {
            return Err(SeawallError::invalid(
                "smoothing_radius",
                c.smoothing_radius,
                "must be > 0 when smoothing is enabled",
            ));
        }
        for (name, offsets) in [("high_band", c.high_band), ("low_band", c.low_band)] {
            if offsets.below < 0.0 || offsets.above < 0.0 || offsets.below + offsets.above <= 0.0 {
                return Err(SeawallError::invalid(
                    name,
                    format!("{offsets:?}"),
                    "offsets must be non-negative with a positive width",
                ));
            }
        }
        non_negative("min_line_length", c.min_line_length)?;
        non_negative("simplify_tolerance", c.simplify_tolerance)?;
        non_negative("max_extension", c.max_extension)?;
        positive("merge_tolerance", c.merge_tolerance)?;

        let s = &self.sampling;
        if s.target_count == 0 {
            return Err(SeawallError::invalid("target_count", 0, "must be > 0"));
        }
        positive("spacing", s.spacing)?;
        if s.max_attempts < s.target_count {
            return Err(SeawallError::invalid(
                "max_attempts",
                s.max_attempts,
                "must be at least target_count",
            ));
        }

        positive("cluster_link_factor", self.matching.cluster_link_factor)?;
        non_negative("cluster_break_distance", self.matching.cluster_break_distance)?;

        positive("snap_tolerance", self.segment.snap_tolerance)?;
        positive("node_tolerance", self.segment.node_tolerance)?;

        let d = &self.damage;
        if d.upper_offset <= d.lower_offset {
            return Err(SeawallError::invalid(
                "upper_offset",
                d.upper_offset,
                "must be greater than lower_offset",
            ));
        }
        non_negative("join_tolerance", d.join_tolerance)?;
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SeawallError::invalid(name, value, "must be > 0"))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SeawallError::invalid(name, value, "must be >= 0"))
    }
}
