use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{CatalogSource, FeatureDict, TrackMetadata};
use crate::error::{Result, TrackscapeError};

/// Offline catalog backed by a JSON dump of track metadata and audio features.
///
/// ```json
/// { "tracks": [ { "id": "...", "album": "...", "name": "...", "artists": ["..."],
///                 "url": "...", "explicit": false, "popularity": 61,
///                 "duration_ms": 215000, "audio_features": { "energy": 0.8 } } ] }
/// ```
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    order: Vec<String>,
    entries: HashMap<String, CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    tracks: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    id: String,
    #[serde(flatten)]
    metadata: TrackMetadata,
    #[serde(default)]
    audio_features: Option<FeatureDict>,
}

impl JsonCatalog {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            TrackscapeError::Catalog(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(contents)
            .map_err(|e| TrackscapeError::Catalog(format!("invalid catalog JSON: {}", e)))?;

        let mut order = Vec::with_capacity(file.tracks.len());
        let mut entries = HashMap::with_capacity(file.tracks.len());
        for entry in file.tracks {
            if entries.contains_key(&entry.id) {
                return Err(TrackscapeError::Catalog(format!(
                    "duplicate track id {}",
                    entry.id
                )));
            }
            order.push(entry.id.clone());
            entries.insert(entry.id.clone(), entry);
        }
        log::debug!("loaded catalog with {} tracks", order.len());
        Ok(JsonCatalog { order, entries })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl CatalogSource for JsonCatalog {
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(TrackscapeError::Catalog("search query is empty".to_string()));
        }

        Ok(self
            .order
            .iter()
            .filter(|id| {
                self.entries.get(*id).is_some_and(|entry| {
                    let meta = &entry.metadata;
                    meta.name.to_lowercase().contains(&needle)
                        || meta.album.to_lowercase().contains(&needle)
                        || meta
                            .artists
                            .iter()
                            .any(|a| a.to_lowercase().contains(&needle))
                })
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<FeatureDict>>> {
        Ok(ids
            .iter()
            .map(|id| {
                self.entries
                    .get(id)
                    .and_then(|entry| entry.audio_features.clone())
            })
            .collect())
    }

    fn track(&self, id: &str) -> Result<TrackMetadata> {
        self.entries
            .get(id)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| TrackscapeError::Catalog(format!("unknown track {}", id)))
    }
}
