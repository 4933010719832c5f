use crate::error::PersistenceError;
use crate::models::{QueueItem, QueueSource, RepeatMode, Track, TrackId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Everything needed to pick a listening session back up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub saved_at: DateTime<Utc>,
    pub items: Vec<QueueItem>,
    pub current_index: Option<usize>,
    pub position_secs: f64,
    pub volume: f32,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    #[serde(default)]
    pub lazy: Option<PersistedLazyQueue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedLazyQueue {
    pub ids: Vec<TrackId>,
    pub pointer: usize,
    pub source: Option<QueueSource>,
    pub current: Option<Track>,
}

impl PersistedSession {
    pub fn position(&self) -> Duration {
        Duration::from_secs_f64(self.position_secs.max(0.0))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.lazy.as_ref().map_or(true, |lazy| lazy.ids.is_empty())
    }
}

/// Storage for the listening session
#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn save(&self, session: &PersistedSession) -> Result<(), PersistenceError>;

    /// `Ok(None)` when nothing was saved yet
    async fn load(&self) -> Result<Option<PersistedSession>, PersistenceError>;
}

/// JSON file on disk, replaced atomically on every save
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceService for JsonFilePersistence {
    async fn save(&self, session: &PersistedSession) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_vec_pretty(session)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        debug!(
            "Session saved to {} ({} queue items)",
            self.path.display(),
            session.items.len()
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedSession>, PersistenceError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let session: PersistedSession = serde_json::from_slice(&contents)?;
        info!(
            "Restored session saved at {}",
            session.saved_at.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(Some(session))
    }
}

/// In-process store, used when nothing should touch the disk
#[derive(Default)]
pub struct MemoryPersistence {
    session: Mutex<Option<PersistedSession>>,
    saves: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn saved(&self) -> Option<PersistedSession> {
        self.session.lock().ok().and_then(|session| session.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceService for MemoryPersistence {
    async fn save(&self, session: &PersistedSession) -> Result<(), PersistenceError> {
        if let Ok(mut slot) = self.session.lock() {
            *slot = Some(session.clone());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedSession>, PersistenceError> {
        Ok(self.saved())
    }
}

/// Coalesces session saves: the first change arms a deadline and every
/// change until it fires rides along with the same save.
#[derive(Debug, Clone)]
pub struct DebouncedSaver {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebouncedSaver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn schedule(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.delay);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True once if the deadline has passed
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the pending deadline, returning whether one was armed
    pub fn flush(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session() -> PersistedSession {
        PersistedSession {
            saved_at: Utc::now(),
            items: vec![
                QueueItem::new(Track::new("one", Duration::from_secs(100))),
                QueueItem::new(Track::new("two", Duration::from_secs(120))),
            ],
            current_index: Some(1),
            position_secs: 42.5,
            volume: 0.6,
            shuffle: true,
            repeat: RepeatMode::All,
            lazy: None,
        }
    }

    #[tokio::test]
    async fn test_json_file_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFilePersistence::new(temp_dir.path().join("nested").join("session.json"));

        let saved = session();
        store.save(&saved).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.position(), Duration::from_secs_f64(42.5));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_loads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFilePersistence::new(temp_dir.path().join("session.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_encoding_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFilePersistence::new(path);
        assert!(matches!(store.load().await, Err(PersistenceError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_memory_persistence_counts_saves() {
        let store = MemoryPersistence::new();
        assert!(store.load().await.unwrap().is_none());

        store.save(&session()).await.unwrap();
        store.save(&session()).await.unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.saved().unwrap().current_index, Some(1));
    }

    #[test]
    fn test_debounced_saver_fires_once_per_window() {
        let start = Instant::now();
        let mut saver = DebouncedSaver::new(Duration::from_millis(1000));

        saver.schedule(start);
        saver.schedule(start + Duration::from_millis(600));
        assert_eq!(saver.deadline(), Some(start + Duration::from_millis(1000)));

        assert!(!saver.take_due(start + Duration::from_millis(999)));
        assert!(saver.take_due(start + Duration::from_millis(1000)));
        assert!(!saver.take_due(start + Duration::from_millis(2000)));
        assert!(!saver.is_pending());

        saver.schedule(start + Duration::from_millis(2000));
        assert!(saver.flush());
        assert!(!saver.flush());
    }

    #[test]
    fn test_empty_session() {
        let mut empty = session();
        empty.items.clear();
        assert!(empty.is_empty());

        empty.lazy = Some(PersistedLazyQueue {
            ids: vec![TrackId::new("x")],
            pointer: 0,
            source: None,
            current: None,
        });
        assert!(!empty.is_empty());
    }
}
