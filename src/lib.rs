pub mod config;
pub mod contour;
pub mod damage;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod sampler;
pub mod segment;
pub mod service;
pub mod writer;

pub use config::{
    ContourConfig, DamageConfig, MatchingConfig, PipelineConfig, SamplingConfig, SegmentConfig,
};
pub use damage::storm_damage;
pub use engine::PlanarEngine;
pub use error::{Result, SeawallError, Warning};
pub use model::{Asset, Curve, ElevationField, Segment};
pub use pipeline::{Intermediates, Pipeline, SegmentLayer};
pub use service::GeometryService;
pub use writer::{write_segment_layer, GeoJsonWriter};
