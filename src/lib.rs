pub mod collect;
pub mod dimred;
mod error;
pub mod features;
pub mod pipeline;
pub mod render;
pub mod standardize;
mod utils;

pub use error::Result;
pub use error::TrackscapeError;
pub use features::{AudioFeature, FeatureMatrix, FeatureMatrixBuilder, TrackRecord};
pub use pipeline::{Pipeline, PipelineBuilder, Projection, VisualizationMode};
pub use standardize::{StandardizedMatrix, Standardizer};
