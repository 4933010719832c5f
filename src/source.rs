use crate::error::SourceError;
use crate::models::{SourceFilters, StreamSource, Track, TrackId};
use crate::queue::shuffle::shuffle_in_place;
use async_trait::async_trait;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Resolves track identifiers into playable streams and metadata
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Playable location for one track
    async fn resolve(&self, id: &TrackId) -> Result<StreamSource, SourceError>;

    /// Metadata for many ids. Unknown ids are left out of the result.
    async fn resolve_batch(&self, ids: &[TrackId]) -> Result<Vec<Track>, SourceError>;

    /// Fresh id ordering for a selection, optionally shuffled and pinned
    /// to start with `start_with`
    async fn ordered_ids(
        &self,
        filters: &SourceFilters,
        shuffle: bool,
        start_with: Option<&TrackId>,
    ) -> Result<Vec<TrackId>, SourceError>;

    /// Give back a temporary local-cache handle once no slot holds it
    fn revoke(&self, _source: &StreamSource) {}
}

/// One `[[tracks]]` entry of a library manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_secs: f64,
    pub locator: String,
    /// Served from a temporary local cache
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub playlists: Vec<String>,
}

impl ManifestEntry {
    fn to_track(&self) -> Track {
        Track {
            id: TrackId::new(self.id.clone()),
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration: Duration::from_secs_f64(self.duration_secs),
        }
    }

    fn stream(&self) -> StreamSource {
        if self.local {
            StreamSource::local_cache(self.locator.clone())
        } else {
            StreamSource::remote(self.locator.clone())
        }
    }

    fn matches(&self, filters: &SourceFilters) -> bool {
        let same = |value: &Option<String>, wanted: &Option<String>| match wanted {
            Some(wanted) => value
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case(wanted)),
            None => true,
        };

        let in_playlist = match &filters.playlist {
            Some(name) => self.playlists.iter().any(|p| p.eq_ignore_ascii_case(name)),
            None => true,
        };

        let found = match &filters.search {
            Some(term) => {
                let term = term.to_lowercase();
                self.title
                    .as_deref()
                    .unwrap_or(&self.id)
                    .to_lowercase()
                    .contains(&term)
            }
            None => true,
        };

        same(&self.album, &filters.album) && same(&self.artist, &filters.artist) && in_playlist && found
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ManifestFile {
    #[serde(default)]
    tracks: Vec<ManifestEntry>,
}

/// Track source backed by a TOML manifest on disk
pub struct LibraryManifest {
    entries: Vec<ManifestEntry>,
    index: HashMap<TrackId, usize>,
    latency: Duration,
    revoked: Mutex<Vec<StreamSource>>,
}

impl LibraryManifest {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path)?;
        let manifest = Self::from_toml_str(&contents)?;
        debug!(
            "Loaded library manifest {} with {} tracks",
            path.display(),
            manifest.len()
        );
        Ok(manifest)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, SourceError> {
        let file: ManifestFile =
            toml::from_str(contents).map_err(|e| SourceError::Manifest(e.to_string()))?;
        Self::from_entries(file.tracks)
    }

    pub fn from_entries(entries: Vec<ManifestEntry>) -> Result<Self, SourceError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if !entry.duration_secs.is_finite() || entry.duration_secs < 0.0 {
                return Err(SourceError::Manifest(format!(
                    "track '{}' has an invalid duration",
                    entry.id
                )));
            }
            if index.insert(TrackId::new(entry.id.clone()), position).is_some() {
                return Err(SourceError::Manifest(format!(
                    "track id '{}' appears more than once",
                    entry.id
                )));
            }
        }

        Ok(Self {
            entries,
            index,
            latency: Duration::ZERO,
            revoked: Mutex::new(Vec::new()),
        })
    }

    /// Delay every lookup, as a remote library would
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// All tracks in manifest order
    pub fn tracks(&self) -> Vec<Track> {
        self.entries.iter().map(ManifestEntry::to_track).collect()
    }

    pub fn track(&self, id: &TrackId) -> Option<Track> {
        self.entry(id).map(ManifestEntry::to_track)
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.entries
            .iter()
            .map(|entry| TrackId::new(entry.id.clone()))
            .collect()
    }

    /// Local-cache handles given back so far
    pub fn revoked(&self) -> Vec<StreamSource> {
        self.revoked
            .lock()
            .map(|revoked| revoked.clone())
            .unwrap_or_default()
    }

    fn entry(&self, id: &TrackId) -> Option<&ManifestEntry> {
        self.index.get(id).and_then(|&i| self.entries.get(i))
    }

    fn select_ids(
        &self,
        filters: &SourceFilters,
        shuffle: bool,
        start_with: Option<&TrackId>,
    ) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self
            .entries
            .iter()
            .filter(|entry| entry.matches(filters))
            .map(|entry| TrackId::new(entry.id.clone()))
            .collect();

        if shuffle {
            shuffle_in_place(&mut ids, &mut rand::rng());
        }

        if let Some(first) = start_with {
            if let Some(pos) = ids.iter().position(|id| id == first) {
                let pinned = ids.remove(pos);
                ids.insert(0, pinned);
            }
        }
        ids
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl TrackSource for LibraryManifest {
    async fn resolve(&self, id: &TrackId) -> Result<StreamSource, SourceError> {
        self.simulate_latency().await;
        trace!("Resolving stream for {}", id);
        self.entry(id)
            .map(ManifestEntry::stream)
            .ok_or_else(|| SourceError::NotFound { id: id.clone() })
    }

    async fn resolve_batch(&self, ids: &[TrackId]) -> Result<Vec<Track>, SourceError> {
        self.simulate_latency().await;
        Ok(ids.iter().filter_map(|id| self.track(id)).collect())
    }

    async fn ordered_ids(
        &self,
        filters: &SourceFilters,
        shuffle: bool,
        start_with: Option<&TrackId>,
    ) -> Result<Vec<TrackId>, SourceError> {
        self.simulate_latency().await;
        let ids = self.select_ids(filters, shuffle, start_with);
        if ids.is_empty() {
            return Err(SourceError::EmptySelection);
        }
        Ok(ids)
    }

    fn revoke(&self, source: &StreamSource) {
        debug!("Revoking local cache handle {}", source.locator);
        if let Ok(mut revoked) = self.revoked.lock() {
            revoked.push(source.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MANIFEST: &str = r#"
[[tracks]]
id = "a1"
title = "Opening"
artist = "Band"
album = "First"
duration_secs = 180.0
locator = "https://cdn.example/a1"
playlists = ["Morning"]

[[tracks]]
id = "a2"
title = "Second Song"
artist = "Band"
album = "First"
duration_secs = 200.5
locator = "cache://a2"
local = true

[[tracks]]
id = "b1"
title = "Other"
artist = "Someone"
album = "Elsewhere"
duration_secs = 95.0
locator = "https://cdn.example/b1"
playlists = ["morning", "Evening"]
"#;

    fn manifest() -> LibraryManifest {
        LibraryManifest::from_toml_str(MANIFEST).unwrap()
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = manifest();
        assert_eq!(manifest.len(), 3);

        let track = manifest.track(&TrackId::new("a2")).unwrap();
        assert_eq!(track.display_name(), "Second Song");
        assert_eq!(track.duration, Duration::from_millis(200_500));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let manifest = LibraryManifest::load(file.path()).unwrap();
        assert_eq!(manifest.ids().len(), 3);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let doubled = format!("{}\n{}", MANIFEST, MANIFEST);
        assert!(matches!(
            LibraryManifest::from_toml_str(&doubled),
            Err(SourceError::Manifest(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_reports_local_cache() {
        let manifest = manifest();
        let remote = manifest.resolve(&TrackId::new("a1")).await.unwrap();
        assert!(!remote.is_local_cache);

        let local = manifest.resolve(&TrackId::new("a2")).await.unwrap();
        assert!(local.is_local_cache);

        let missing = manifest.resolve(&TrackId::new("zz")).await;
        assert!(matches!(missing, Err(SourceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_resolve_batch_skips_unknown() {
        let manifest = manifest();
        let ids = vec![TrackId::new("b1"), TrackId::new("nope"), TrackId::new("a1")];
        let tracks = manifest.resolve_batch(&ids).await.unwrap();
        let got: Vec<_> = tracks.iter().map(|t| t.id.to_string()).collect();
        assert_eq!(got, vec!["b1", "a1"]);
    }

    #[tokio::test]
    async fn test_ordered_ids_filters_and_pins() {
        let manifest = manifest();
        let filters = SourceFilters {
            artist: Some("band".to_string()),
            ..Default::default()
        };
        let ids = manifest
            .ordered_ids(&filters, true, Some(&TrackId::new("a2")))
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].as_str(), "a2");

        let morning = SourceFilters {
            playlist: Some("MORNING".to_string()),
            ..Default::default()
        };
        let ids = manifest.ordered_ids(&morning, false, None).await.unwrap();
        assert_eq!(ids, vec![TrackId::new("a1"), TrackId::new("b1")]);

        let nothing = SourceFilters {
            search: Some("absent".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            manifest.ordered_ids(&nothing, false, None).await,
            Err(SourceError::EmptySelection)
        ));
    }

    #[test]
    fn test_revoke_is_recorded() {
        let manifest = manifest();
        manifest.revoke(&StreamSource::local_cache("cache://a2"));
        assert_eq!(manifest.revoked(), vec![StreamSource::local_cache("cache://a2")]);
    }
}
