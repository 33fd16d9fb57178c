mod support;

use chrono::Utc;
use playsync::playback::{MediaEvent, PlaybackEvent, SyncPhase};
use playsync::test_support::{settle, track, BackendCall, MemoryPositionStore, MockRemoteService};
use playsync::{StartPosition, TrackPosition};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::support::{elapse, PlaybackFixture};

fn saved(track_id: &str, position_seconds: f64, age_seconds: i64) -> TrackPosition {
    TrackPosition {
        track_id: track_id.to_string(),
        position_seconds,
        updated_at: Some(Utc::now() - chrono::Duration::seconds(age_seconds)),
    }
}

/// Play `t1` with no saved positions and wait until it is playing
async fn playing(fx: &PlaybackFixture, duration: f64) {
    fx.handle.play(track("t1"));
    settle().await;
    fx.metadata(duration).await;
    assert_eq!(fx.phase(), SyncPhase::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_resume_from_newer_remote_position() {
    let store = MemoryPositionStore::new();
    store.insert(saved("t1", 30.0, 600));
    let remote = MockRemoteService::new();
    remote.insert_position(saved("t1", 90.0, 595));
    let fx = PlaybackFixture::start_with(store, remote);

    fx.handle.play(track("t1"));
    settle().await;
    assert_eq!(fx.phase(), SyncPhase::Loading);

    fx.metadata(300.0).await;

    let state = fx.state();
    assert_eq!(state.phase, SyncPhase::Playing);
    assert_eq!(state.event, PlaybackEvent::Play);
    assert!(state.is_playing);
    assert_eq!(state.current_position, 90.0);
    assert_eq!(fx.backend.seeks(), vec![90.0]);
}

#[tokio::test(start_paused = true)]
async fn test_newer_local_position_wins() {
    let store = MemoryPositionStore::new();
    store.insert(saved("t1", 30.0, 5));
    let remote = MockRemoteService::new();
    remote.insert_position(saved("t1", 90.0, 600));
    let fx = PlaybackFixture::start_with(store, remote);

    fx.handle.play(track("t1"));
    settle().await;
    fx.metadata(300.0).await;

    assert_eq!(fx.backend.seeks(), vec![30.0]);
}

#[tokio::test(start_paused = true)]
async fn test_metadata_before_reconciliation_seeks_once() {
    let remote = MockRemoteService::new();
    remote.insert_position(saved("t1", 120.0, 60));
    remote.delay_fetches(Duration::from_secs(2));
    let fx = PlaybackFixture::start_with(MemoryPositionStore::new(), remote);

    fx.handle.play(track("t1"));
    settle().await;
    fx.metadata(300.0).await;

    // The stream is ready but the start position is not known yet
    assert_eq!(fx.phase(), SyncPhase::Loading);
    assert_eq!(fx.backend.count(&BackendCall::Play), 0);

    elapse(Duration::from_secs(3)).await;
    assert_eq!(fx.phase(), SyncPhase::Playing);
    assert_eq!(fx.backend.seeks(), vec![120.0]);

    // A repeated metadata event must not seek again
    fx.metadata(300.0).await;
    assert_eq!(fx.backend.seeks(), vec![120.0]);
    assert_eq!(fx.backend.count(&BackendCall::Play), 1);
}

#[tokio::test(start_paused = true)]
async fn test_saved_position_at_end_starts_from_zero() {
    let store = MemoryPositionStore::new();
    store.insert(saved("t1", 300.0, 10));
    let fx = PlaybackFixture::start_with(store, MockRemoteService::new());

    fx.handle.play(track("t1"));
    settle().await;
    fx.metadata(300.0).await;

    assert_eq!(fx.phase(), SyncPhase::Playing);
    assert!(fx.backend.seeks().is_empty());
    assert_eq!(fx.state().current_position, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_start_skips_reconciliation() {
    let remote = MockRemoteService::new();
    remote.insert_position(saved("t1", 90.0, 1));
    let fx = PlaybackFixture::start_with(MemoryPositionStore::new(), remote);

    fx.handle.play_from(track("t1"), StartPosition::At(45.0));
    settle().await;
    fx.metadata(300.0).await;

    assert_eq!(fx.backend.seeks(), vec![45.0]);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_start_past_the_end_is_clamped() {
    let fx = PlaybackFixture::start();

    fx.handle.play_from(track("t1"), StartPosition::At(500.0));
    settle().await;
    fx.metadata(300.0).await;

    assert_eq!(fx.phase(), SyncPhase::Playing);
    assert_eq!(fx.backend.seeks(), vec![300.0]);
    assert_eq!(fx.state().current_position, 300.0);
}

#[tokio::test(start_paused = true)]
async fn test_seek_while_loading_is_clamped() {
    let fx = PlaybackFixture::start();

    fx.handle.play(track("t1"));
    fx.handle.seek_absolute(500.0);
    settle().await;
    fx.metadata(300.0).await;

    assert_eq!(fx.backend.seeks(), vec![300.0]);
    assert_eq!(fx.state().current_position, 300.0);
}

#[tokio::test(start_paused = true)]
async fn test_local_checkpoints_stop_on_pause() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;

    fx.time_update(12.0).await;
    elapse(Duration::from_millis(3_500)).await;
    assert_eq!(fx.store.write_count(), 3);

    fx.handle.pause();
    settle().await;
    assert_eq!(fx.phase(), SyncPhase::Paused);
    assert_eq!(fx.store.write_count(), 4);
    assert_eq!(fx.store.get("t1").unwrap().position_seconds, 12.0);

    elapse(Duration::from_secs(60)).await;
    assert_eq!(fx.store.write_count(), 4);
    assert_eq!(fx.remote.pushes_for("t1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_twice_is_noop() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;

    fx.handle.pause();
    settle().await;
    let writes = fx.store.write_count();
    let pushes = fx.remote.pushes().len();

    fx.handle.pause();
    settle().await;

    assert_eq!(fx.phase(), SyncPhase::Paused);
    assert_eq!(fx.store.write_count(), writes);
    assert_eq!(fx.remote.pushes().len(), pushes);
    assert_eq!(fx.backend.count(&BackendCall::Pause), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remote_pushes_are_throttled() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;

    fx.handle.pause();
    settle().await;
    fx.handle.resume();
    settle().await;
    fx.handle.pause();
    settle().await;

    // Both pauses saved locally, only the first reached the server
    assert_eq!(fx.store.write_count(), 2);
    assert_eq!(fx.remote.pushes_for("t1").len(), 1);

    elapse(Duration::from_secs(10)).await;
    fx.handle.resume();
    settle().await;
    fx.handle.pause();
    settle().await;
    assert_eq!(fx.remote.pushes_for("t1").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_remote_checkpoint_cadence() {
    let fx = PlaybackFixture::start();
    playing(&fx, 1_000.0).await;

    elapse(Duration::from_millis(30_500)).await;

    assert_eq!(fx.remote.pushes_for("t1").len(), 2);
    assert_eq!(fx.store.write_count(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_does_not_block_playback() {
    let remote = MockRemoteService::new();
    remote.fail_requests(true);
    let fx = PlaybackFixture::start_with(MemoryPositionStore::new(), remote);
    playing(&fx, 100.0).await;

    fx.time_update(20.0).await;
    fx.handle.pause();
    settle().await;

    assert_eq!(fx.phase(), SyncPhase::Paused);
    assert_eq!(fx.store.get("t1").unwrap().position_seconds, 20.0);
    assert!(fx.remote.pushes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_seek_is_clamped_and_saved() {
    let fx = PlaybackFixture::start();
    playing(&fx, 300.0).await;

    fx.handle.seek_absolute(500.0);
    settle().await;
    assert_eq!(fx.state().current_position, 300.0);
    assert_eq!(fx.state().event, PlaybackEvent::Seeked);
    assert_eq!(fx.store.get("t1").unwrap().position_seconds, 300.0);

    fx.handle.seek_relative(-1_000.0);
    settle().await;
    assert_eq!(fx.state().current_position, 0.0);
    assert_eq!(fx.backend.seeks(), vec![300.0, 0.0]);
}

#[tokio::test(start_paused = true)]
async fn test_media_error_enters_failed_state() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;
    fx.time_update(40.0).await;

    fx.media_event(MediaEvent::Error {
        message: "decode failed".to_string(),
    })
    .await;

    let state = fx.state();
    assert_eq!(state.phase, SyncPhase::Failed);
    assert_eq!(state.event, PlaybackEvent::Error);
    assert!(!state.is_playing);
    assert!(state.error.unwrap().contains("decode failed"));
    assert_eq!(fx.backend.count(&BackendCall::Pause), 1);
    assert_eq!(fx.store.get("t1").unwrap().position_seconds, 40.0);

    let writes = fx.store.write_count();
    elapse(Duration::from_secs(5)).await;
    assert_eq!(fx.store.write_count(), writes);

    // A new play request leaves the error state
    fx.handle.play(track("t2"));
    settle().await;
    let state = fx.state();
    assert_eq!(state.phase, SyncPhase::Loading);
    assert_eq!(state.error, None);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_does_not_break_playback() {
    let fx = PlaybackFixture::start();
    let received = Arc::new(AtomicUsize::new(0));

    fx.handle.subscribe(|_| panic!("listener bug"));
    let counter = received.clone();
    fx.handle.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    playing(&fx, 100.0).await;

    // Loading, MetadataLoaded and Play all reached the healthy listener
    assert!(received.load(Ordering::SeqCst) >= 3);
    assert!(fx.handle.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_channel_subscription_sees_transitions() {
    let fx = PlaybackFixture::start();
    let mut snapshots = fx.handle.subscribe_channel();

    playing(&fx, 100.0).await;

    let mut events = Vec::new();
    while let Ok(snapshot) = snapshots.try_recv() {
        events.push(snapshot.event);
    }
    assert_eq!(
        events,
        vec![
            PlaybackEvent::Loading,
            PlaybackEvent::MetadataLoaded,
            PlaybackEvent::Play
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_app_hidden_flushes_and_ends() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;
    fx.time_update(42.0).await;

    fx.handle.app_hidden();
    settle().await;

    assert_eq!(fx.phase(), SyncPhase::Ended);
    assert_eq!(fx.backend.calls().last(), Some(&BackendCall::Pause));
    assert_eq!(fx.store.get("t1").unwrap().position_seconds, 42.0);
    let pushes = fx.remote.pushes_for("t1");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].position_seconds, 42.0);

    let writes = fx.store.write_count();
    elapse(Duration::from_secs(20)).await;
    assert_eq!(fx.store.write_count(), writes);

    // Coming back resumes from the flushed position
    fx.handle.toggle_play();
    settle().await;
    assert_eq!(fx.phase(), SyncPhase::Loading);
    fx.metadata(100.0).await;
    assert_eq!(fx.phase(), SyncPhase::Playing);
    assert_eq!(fx.backend.seeks(), vec![42.0]);
}

#[tokio::test(start_paused = true)]
async fn test_unload_releases_track() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;
    fx.time_update(8.0).await;

    fx.handle.unload();
    settle().await;

    let state = fx.state();
    assert_eq!(state.phase, SyncPhase::Ended);
    assert_eq!(state.current_track, None);
    assert_eq!(fx.backend.calls().last(), Some(&BackendCall::Stop));
    assert_eq!(fx.store.get("t1").unwrap().position_seconds, 8.0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_returns_to_idle() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;
    fx.time_update(7.0).await;

    fx.handle.stop();
    settle().await;

    let state = fx.state();
    assert_eq!(state.phase, SyncPhase::Idle);
    assert_eq!(state.event, PlaybackEvent::Stopped);
    assert_eq!(state.current_track, None);
    assert_eq!(fx.store.get("t1").unwrap().position_seconds, 7.0);
}

#[tokio::test(start_paused = true)]
async fn test_switching_tracks_discards_stale_reconciliation() {
    let remote = MockRemoteService::new();
    remote.insert_position(saved("t1", 90.0, 30));
    remote.delay_fetches(Duration::from_secs(5));
    let fx = PlaybackFixture::start_with(MemoryPositionStore::new(), remote);

    fx.handle.play(track("t1"));
    settle().await;
    fx.handle.play(track("t2"));
    settle().await;
    elapse(Duration::from_secs(6)).await;

    assert_eq!(fx.state().track_id(), Some("t2"));
    assert_eq!(fx.phase(), SyncPhase::Loading);

    fx.metadata(300.0).await;
    assert_eq!(fx.phase(), SyncPhase::Playing);
    assert_eq!(fx.state().track_id(), Some("t2"));
    assert!(fx.backend.seeks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_switching_while_playing_flushes_previous_track() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;
    fx.time_update(55.0).await;

    fx.handle.play(track("t2"));
    settle().await;

    assert_eq!(fx.store.get("t1").unwrap().position_seconds, 55.0);
    assert_eq!(fx.state().track_id(), Some("t2"));
}

#[tokio::test(start_paused = true)]
async fn test_pause_while_loading_starts_paused() {
    let fx = PlaybackFixture::start();

    fx.handle.play(track("t1"));
    settle().await;
    fx.handle.pause();
    settle().await;
    fx.metadata(100.0).await;

    assert_eq!(fx.phase(), SyncPhase::Paused);
    assert_eq!(fx.backend.count(&BackendCall::Play), 0);

    fx.handle.resume();
    settle().await;
    assert_eq!(fx.phase(), SyncPhase::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_closing_the_service_flushes() {
    let fx = PlaybackFixture::start();
    playing(&fx, 100.0).await;
    fx.time_update(33.0).await;

    let PlaybackFixture { handle, store, .. } = fx;
    drop(handle);
    settle().await;

    assert_eq!(store.get("t1").unwrap().position_seconds, 33.0);
}
