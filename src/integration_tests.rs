//! End-to-end tests driving the engine through a [`Player`] handle

use crate::audio::SimulatedMedia;
use crate::config::EngineSettings;
use crate::error::{PlayerError, QueueError};
use crate::logging::{EngineLogger, LogEventType};
use crate::models::{QueueItem, QueueSource, RepeatMode, TrackId, TrackPhase};
use crate::persistence::{
    JsonFilePersistence, MemoryPersistence, PersistedSession, PersistenceService,
};
use crate::playback::events::Command;
use crate::playback::{PlaybackController, Player, PlayerTiming};
use crate::source::{LibraryManifest, ManifestEntry};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::sleep;

fn manifest(count: usize, secs: f64) -> Arc<LibraryManifest> {
    let entries = (0..count)
        .map(|n| ManifestEntry {
            id: n.to_string(),
            title: Some(format!("Song {}", n)),
            artist: Some("Quartet".to_string()),
            album: None,
            duration_secs: secs,
            locator: format!("mem://song-{}", n),
            local: false,
            playlists: Vec::new(),
        })
        .collect();
    Arc::new(LibraryManifest::from_entries(entries).unwrap())
}

fn settings() -> EngineSettings {
    EngineSettings {
        crossfade: Duration::from_secs(2),
        preload_lead: Duration::from_secs(1),
        ..EngineSettings::default()
    }
}

async fn start(
    library: &Arc<LibraryManifest>,
    persistence: Arc<dyn PersistenceService>,
    timing: PlayerTiming,
) -> Player {
    let (tx, rx) = mpsc::unbounded_channel();
    let media = SimulatedMedia::new(tx.clone());
    media.register_manifest(library);
    let controller = PlaybackController::new(
        settings(),
        library.clone(),
        &media,
        tx,
        EngineLogger::new(),
    );
    Player::start(controller, rx, persistence, timing).await
}

fn current_id(player: &Player) -> Option<TrackId> {
    player.snapshot().current_track.map(|track| track.id)
}

#[tokio::test(start_paused = true)]
async fn test_player_crossfades_into_next_track() {
    let library = manifest(2, 10.0);
    let player = start(&library, Arc::new(MemoryPersistence::new()), PlayerTiming::default()).await;

    player
        .send(Command::SetQueue {
            tracks: library.tracks(),
            start_index: 0,
        })
        .await
        .unwrap();
    assert_eq!(current_id(&player), Some(TrackId::new("0")));

    sleep(Duration::from_secs(12)).await;

    let snapshot = player.snapshot();
    assert_eq!(current_id(&player), Some(TrackId::new("1")));
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.phase, TrackPhase::Playing);

    let listing = player.listing().await.unwrap();
    assert_eq!(listing.current_index, Some(1));
    assert_eq!(listing.history.len(), 1);
    assert_eq!(listing.history[0].id, TrackId::new("0"));

    player.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stats_report_completed_crossfade() {
    let library = manifest(2, 10.0);
    let player = start(&library, Arc::new(MemoryPersistence::new()), PlayerTiming::default()).await;

    player
        .send(Command::SetQueue {
            tracks: library.tracks(),
            start_index: 0,
        })
        .await
        .unwrap();
    sleep(Duration::from_secs(12)).await;

    let stats = player.stats().await.unwrap();
    assert_eq!(stats.events.crossfades_completed, 1);
    assert_eq!(stats.events.crossfades_cancelled, 0);
    assert_eq!(stats.recovery.total_errors, 0);
    assert!(!stats.recent.is_empty());
    assert!(stats.recent.len() <= stats.events.total_events);
    assert!(stats
        .recent
        .iter()
        .any(|event| event.event_type == LogEventType::CrossfadeCompleted));

    player.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_player_resumes_saved_session_paused() {
    let library = manifest(3, 60.0);
    let tracks = library.tracks();
    let saved = PersistedSession {
        saved_at: Utc::now(),
        items: tracks.iter().cloned().map(QueueItem::new).collect(),
        current_index: Some(1),
        position_secs: 12.0,
        volume: 0.5,
        shuffle: false,
        repeat: RepeatMode::All,
        lazy: None,
    };
    let persistence = Arc::new(MemoryPersistence::with_session(saved));
    let player = start(&library, persistence, PlayerTiming::default()).await;

    sleep(Duration::from_millis(200)).await;

    let snapshot = player.snapshot();
    assert_eq!(current_id(&player), Some(TrackId::new("1")));
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.repeat, RepeatMode::All);
    assert!((snapshot.volume - 0.5).abs() < 1e-6);
    assert!(snapshot.position.abs_diff(Duration::from_secs(12)) < Duration::from_millis(100));

    player.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_flushes_session() {
    let library = manifest(3, 60.0);
    let persistence = Arc::new(MemoryPersistence::new());
    let player = start(&library, persistence.clone(), PlayerTiming::default()).await;

    player
        .send(Command::SetQueue {
            tracks: library.tracks(),
            start_index: 2,
        })
        .await
        .unwrap();
    sleep(Duration::from_secs(3)).await;
    player.stop().await.unwrap();

    assert!(persistence.save_count() >= 1);
    let session = persistence.saved().unwrap();
    assert_eq!(session.items.len(), 3);
    assert_eq!(session.current_index, Some(2));
    assert!((2.5..3.5).contains(&session.position_secs));
}

#[tokio::test(start_paused = true)]
async fn test_changes_are_saved_once_per_debounce_window() {
    let library = manifest(3, 60.0);
    let persistence = Arc::new(MemoryPersistence::new());
    let timing = PlayerTiming {
        persist_debounce: Duration::from_secs(1),
        ..PlayerTiming::default()
    };
    let player = start(&library, persistence.clone(), timing).await;

    player
        .send(Command::SetQueue {
            tracks: library.tracks(),
            start_index: 0,
        })
        .await
        .unwrap();
    player.send(Command::SetRepeat(RepeatMode::One)).await.unwrap();
    player.send(Command::SetVolume(0.3)).await.unwrap();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(persistence.save_count(), 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(persistence.save_count(), 1);
    let session = persistence.saved().unwrap();
    assert_eq!(session.repeat, RepeatMode::One);
    assert!((session.volume - 0.3).abs() < 1e-6);

    player.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_lazy_queue_through_player() {
    let library = manifest(5, 60.0);
    let player = start(&library, Arc::new(MemoryPersistence::new()), PlayerTiming::default()).await;

    player
        .send(Command::SetLazyQueue {
            ids: library.ids(),
            source: Some(QueueSource::library()),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(current_id(&player), Some(TrackId::new("0")));
    assert!(player.snapshot().queue.is_lazy);

    player.send(Command::PlayNext).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(current_id(&player), Some(TrackId::new("1")));

    let listing = player.listing().await.unwrap();
    assert_eq!(listing.lazy, Some((1, 5)));

    player.send(Command::ClearQueue).await.unwrap();
    assert!(!player.snapshot().queue.is_lazy);
    assert_eq!(current_id(&player), None);

    player.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_command_errors_reach_the_caller() {
    let library = manifest(2, 60.0);
    let player = start(&library, Arc::new(MemoryPersistence::new()), PlayerTiming::default()).await;

    tokio_test::assert_ok!(
        player
            .send(Command::SetLazyQueue {
                ids: library.ids(),
                source: None,
            })
            .await
    );
    let listing = player.listing().await.unwrap();
    assert!(listing.entries.is_empty());

    let result = player
        .send(Command::SetLazyQueue {
            ids: Vec::new(),
            source: None,
        })
        .await;
    let err = tokio_test::assert_err!(result);
    assert!(matches!(err, PlayerError::Queue(QueueError::EmptyQueue)));

    player.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_publishes_released_state() {
    let library = manifest(1, 30.0);
    let player = start(&library, Arc::new(MemoryPersistence::new()), PlayerTiming::default()).await;
    let snapshots = player.subscribe();
    player.stop().await.unwrap();

    assert!(!snapshots.borrow().is_playing);
}

#[tokio::test]
async fn test_session_file_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("session.json");
    let library = manifest(3, 120.0);

    let player = start(
        &library,
        Arc::new(JsonFilePersistence::new(path.clone())),
        PlayerTiming::default(),
    )
    .await;
    player
        .send(Command::SetQueue {
            tracks: library.tracks(),
            start_index: 1,
        })
        .await
        .unwrap();
    player.send(Command::ToggleShuffle).await.unwrap();
    player.stop().await.unwrap();
    assert!(path.exists());

    let resumed = start(
        &library,
        Arc::new(JsonFilePersistence::new(path)),
        PlayerTiming::default(),
    )
    .await;
    let snapshot = resumed.snapshot();
    assert_eq!(current_id(&resumed), Some(TrackId::new("1")));
    assert!(snapshot.shuffle);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.queue.length, 3);

    resumed.stop().await.unwrap();
}
