//! # Track collection
//!
//! The catalog itself is an external service; [`CatalogSource`] is the seam it plugs
//! into. [`Collector`] runs a search, fetches the audio features of all hits in one
//! batched call, fetches per-track metadata (optionally in parallel) and assembles
//! [`TrackRecord`]s in search order.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackscapeError};
use crate::features::TrackRecord;

mod json;

pub use json::JsonCatalog;

/// Largest batch the catalog search returns.
pub const SEARCH_LIMIT: usize = 50;

/// Track metadata as returned by a catalog lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub album: String,
    pub name: String,
    pub artists: Vec<String>,
    pub url: String,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub popularity: u8,
    pub duration_ms: u64,
}

/// Raw audio-feature dictionary keyed by feature name.
pub type FeatureDict = BTreeMap<String, f64>;

pub trait CatalogSource: Sync {
    /// Track identifiers matching `query`, best match first, at most `limit` of them.
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    /// Audio features for every id, in the same order; `None` where the catalog has none.
    fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<FeatureDict>>>;

    fn track(&self, id: &str) -> Result<TrackMetadata>;
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub search_limit: usize,
    pub parallel_fetch: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            search_limit: SEARCH_LIMIT,
            parallel_fetch: true,
        }
    }
}

#[derive(Debug)]
pub struct Collector<S: CatalogSource> {
    source: S,
    config: CollectorConfig,
}

impl<S: CatalogSource> Collector<S> {
    pub fn new(source: S, config: CollectorConfig) -> Result<Self> {
        if config.search_limit == 0 || config.search_limit > SEARCH_LIMIT {
            return Err(TrackscapeError::InvalidParameter {
                name: "search_limit",
                reason: format!(
                    "must be between 1 and {}, got {}",
                    SEARCH_LIMIT, config.search_limit
                ),
            });
        }
        Ok(Collector { source, config })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Tracks matching `query`, in search order.
    pub fn collect(&self, query: &str) -> Result<Vec<TrackRecord>> {
        let ids = self.source.search_tracks(query, self.config.search_limit)?;
        log::info!("search for {:?} returned {} tracks", query, ids.len());
        if ids.is_empty() {
            return Err(TrackscapeError::EmptyResult);
        }

        log::debug!("fetching audio features for {} tracks", ids.len());
        let features = self.source.audio_features(&ids)?;
        if features.len() != ids.len() {
            return Err(TrackscapeError::Catalog(format!(
                "requested audio features for {} tracks, got {}",
                ids.len(),
                features.len()
            )));
        }

        let metadata: Vec<TrackMetadata> = if self.config.parallel_fetch {
            ids.par_iter()
                .map(|id| self.fetch_metadata(id))
                .collect::<Result<_>>()?
        } else {
            ids.iter()
                .map(|id| self.fetch_metadata(id))
                .collect::<Result<_>>()?
        };

        ids.into_iter()
            .zip(features)
            .zip(metadata)
            .map(|((id, features), meta)| {
                let audio_features = features.ok_or_else(|| {
                    TrackscapeError::Catalog(format!("no audio features for track {}", id))
                })?;
                Ok(TrackRecord {
                    id,
                    album: meta.album,
                    name: meta.name,
                    artists: meta.artists,
                    url: meta.url,
                    explicit: meta.explicit,
                    popularity: meta.popularity,
                    duration_minutes: meta.duration_ms as f64 / 60_000.0,
                    audio_features,
                })
            })
            .collect()
    }

    fn fetch_metadata(&self, id: &str) -> Result<TrackMetadata> {
        log::debug!("fetching details for track {}", id);
        self.source.track(id)
    }
}
