//! # Track records and the audio-feature matrix
//!
//! A [`TrackRecord`] is what the catalog hands back for a single track: its metadata
//! plus the raw audio-feature dictionary. [`FeatureMatrixBuilder`] turns an ordered
//! batch of records into a [`FeatureMatrix`] whose columns always follow
//! [`AudioFeature::ALL`], so every downstream stage sees the same axis semantics.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackscapeError};

/// The nine audio descriptors used as coordinates of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFeature {
    Danceability,
    Energy,
    Loudness,
    Speechiness,
    Acousticness,
    Instrumentalness,
    Liveness,
    Valence,
    Tempo,
}

impl AudioFeature {
    /// Column order of every feature matrix.
    pub const ALL: [AudioFeature; 9] = [
        AudioFeature::Danceability,
        AudioFeature::Energy,
        AudioFeature::Loudness,
        AudioFeature::Speechiness,
        AudioFeature::Acousticness,
        AudioFeature::Instrumentalness,
        AudioFeature::Liveness,
        AudioFeature::Valence,
        AudioFeature::Tempo,
    ];

    /// Column index of this feature in [`AudioFeature::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn key(&self) -> &'static str {
        match self {
            AudioFeature::Danceability => "danceability",
            AudioFeature::Energy => "energy",
            AudioFeature::Loudness => "loudness",
            AudioFeature::Speechiness => "speechiness",
            AudioFeature::Acousticness => "acousticness",
            AudioFeature::Instrumentalness => "instrumentalness",
            AudioFeature::Liveness => "liveness",
            AudioFeature::Valence => "valence",
            AudioFeature::Tempo => "tempo",
        }
    }
}

impl fmt::Display for AudioFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One fetched track. Built once by the collector and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub album: String,
    pub name: String,
    pub artists: Vec<String>,
    pub url: String,
    pub explicit: bool,
    pub popularity: u8,
    pub duration_minutes: f64,
    /// Raw feature dictionary as delivered by the catalog, keyed by [`AudioFeature::key`].
    pub audio_features: BTreeMap<String, f64>,
}

impl TrackRecord {
    /// Artist names joined for display.
    pub fn artist_display(&self) -> String {
        self.artists.join(", ")
    }

    pub fn feature(&self, feature: AudioFeature) -> Option<f64> {
        self.audio_features.get(feature.key()).copied()
    }
}

/// Row-per-track numeric matrix over the fixed [`AudioFeature::ALL`] schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Array2<f64>,
}

impl FeatureMatrix {
    /// Wraps an existing `n x 9` array laid out in [`AudioFeature::ALL`] order.
    pub fn from_array(data: Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(TrackscapeError::EmptyResult);
        }
        if data.ncols() != AudioFeature::ALL.len() {
            return Err(TrackscapeError::InvalidParameter {
                name: "data",
                reason: format!(
                    "expected {} feature columns, got {}",
                    AudioFeature::ALL.len(),
                    data.ncols()
                ),
            });
        }
        Ok(FeatureMatrix { data })
    }

    pub fn columns(&self) -> &'static [AudioFeature] {
        &AudioFeature::ALL
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.data.row(index)
    }

    pub fn column(&self, feature: AudioFeature) -> ArrayView1<'_, f64> {
        self.data.column(feature.index())
    }
}

/// Builds a [`FeatureMatrix`] from an ordered batch of tracks.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMatrixBuilder {
    features: &'static [AudioFeature],
}

impl Default for FeatureMatrixBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureMatrixBuilder {
    pub fn new() -> Self {
        FeatureMatrixBuilder {
            features: &AudioFeature::ALL,
        }
    }

    /// Row `i` of the result holds the features of `tracks[i]`.
    ///
    /// Fails on an empty batch, on the first record missing a feature, and on
    /// non-finite values, before any row is kept.
    pub fn build(&self, tracks: &[TrackRecord]) -> Result<FeatureMatrix> {
        if tracks.is_empty() {
            return Err(TrackscapeError::EmptyResult);
        }

        let n_features = self.features.len();
        let mut values = Vec::with_capacity(tracks.len() * n_features);
        for track in tracks {
            for &feature in self.features {
                let value = track
                    .feature(feature)
                    .ok_or_else(|| TrackscapeError::MissingFeature {
                        track_id: track.id.clone(),
                        feature,
                    })?;
                if !value.is_finite() {
                    return Err(TrackscapeError::NonFiniteFeature {
                        track_id: track.id.clone(),
                        feature,
                        value,
                    });
                }
                values.push(value);
            }
        }

        let data = Array2::from_shape_vec((tracks.len(), n_features), values)
            .map_err(|e| TrackscapeError::Numerical(e.to_string()))?;
        log::debug!("built feature matrix {}x{}", data.nrows(), data.ncols());
        Ok(FeatureMatrix { data })
    }
}
