use std::fmt;

use thiserror::Error;

/// 等高線抽出の各段階（どこで空になったかを呼び出し側に伝える）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourStage {
    Reclassify,
    RegionFilter,
    LengthFilter,
}

impl fmt::Display for ContourStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContourStage::Reclassify => write!(f, "band selection"),
            ContourStage::RegionFilter => write!(f, "region filter"),
            ContourStage::LengthFilter => write!(f, "line length filter"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveRole {
    Tide,
    Surge,
}

impl fmt::Display for CurveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveRole::Tide => write!(f, "tide"),
            CurveRole::Surge => write!(f, "surge"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SeawallError {
    #[error("No contour survives extraction at elevation {elevation} (empty after {stage})")]
    EmptyContour { elevation: f64, stage: ContourStage },

    #[error("Segmentation failed with {connectors} connectors: {reason}")]
    Segmentation { reason: String, connectors: usize },

    #[error(
        "No candidate points accepted on the {curve} curve after {attempts} attempts (spacing {spacing})"
    )]
    InsufficientCandidatePoints {
        curve: CurveRole,
        attempts: usize,
        spacing: f64,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid raster dimensions: {rows}x{cols} with {len} values")]
    InvalidDimensions { rows: usize, cols: usize, len: usize },

    #[error("Geometry service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl SeawallError {
    pub(crate) fn invalid(name: &'static str, value: impl fmt::Display, reason: &str) -> Self {
        SeawallError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SeawallError>;

/// 処理は継続できるが結果に欠損がある状態
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    UndefinedDensity { segment_id: usize },
    AssetWithoutElevation { asset_id: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UndefinedDensity { segment_id } => {
                write!(f, "segment {segment_id} has no boundary length, density undefined")
            }
            Warning::AssetWithoutElevation { asset_id } => {
                write!(f, "asset {asset_id} has no elevation sample, damage skipped")
            }
        }
    }
}
