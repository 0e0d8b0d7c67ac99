//! Error types shared by every pipeline stage.

use thiserror::Error;

use crate::features::AudioFeature;

/// Errors that can occur while turning a batch of tracks into an embedding plot.
#[derive(Debug, Error)]
pub enum TrackscapeError {
    /// The catalog returned no tracks, so there is nothing to project.
    #[error("no tracks found for the current query")]
    EmptyResult,

    /// A track record lacks one of the required audio features.
    #[error("track {track_id} is missing audio feature `{feature}`")]
    MissingFeature {
        track_id: String,
        feature: AudioFeature,
    },

    /// A track record carries a NaN or infinite feature value.
    #[error("track {track_id} has non-finite value {value} for `{feature}`")]
    NonFiniteFeature {
        track_id: String,
        feature: AudioFeature,
        value: f64,
    },

    /// The batch is too small for the requested reduction.
    #[error("{reducer} needs {required}, got {n_samples} samples")]
    InsufficientSamples {
        reducer: &'static str,
        n_samples: usize,
        required: String,
    },

    /// A reducer or collector was configured with an unusable value.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The catalog source failed or returned inconsistent data.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The rendering sink could not produce the chart.
    #[error("render error: {0}")]
    Render(String),

    /// A numeric routine produced a result that cannot be used.
    #[error("numerical error: {0}")]
    Numerical(String),
}

pub type Result<T> = std::result::Result<T, TrackscapeError>;
