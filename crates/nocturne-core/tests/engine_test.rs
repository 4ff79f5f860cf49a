//! Engine behavior against a scripted backend, on a paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use nocturne_core::store::keys;
use nocturne_core::{
    EngineConfig, KeyValueStore, MemoryStore, PlaybackEngine, PlaybackStatus, PlayerState,
    RepeatMode, StoreError,
};

use common::{ settle, timed_track, track, url, FakeBackend, Harness };


fn ids( tracks: &[nocturne_core::Track] ) -> Vec<String> {
    tracks.iter().map( |t| t.id.clone() ).collect()
}


#[tokio::test( start_paused = true )]
async fn test_play_loads_and_publishes() {
    let h = Harness::new();

    h.engine.play( track( "a" ) ).await;

    let loads = h.backend.loads();
    assert_eq!( loads.len(), 1 );
    assert_eq!( loads[0].0, url( "a" ) );
    assert!( loads[0].1.should_play );
    assert!( !loads[0].1.looping );

    assert_eq!( h.engine.state(), PlayerState::Playing );
    let snapshot = h.last_snapshot();
    assert!( snapshot.is_playing );
    assert!( !snapshot.is_buffering );
    assert_eq!( snapshot.current_track.unwrap().id, "a" );
    assert_eq!( ids( &snapshot.queue ), vec!["a"] );
    assert_eq!( snapshot.current_index, Some( 0 ) );
    assert_eq!( ids( &h.engine.history() ), vec!["a"] );
    assert!( h.store.peek( keys::QUEUE ).is_some() );
    assert!( h.store.peek( keys::CURRENT_TRACK ).is_some() );
}


#[tokio::test( start_paused = true )]
async fn test_play_same_track_twice_is_noop() {
    let h = Harness::new();
    h.engine.play( track( "a" ) ).await;
    h.engine.play( track( "a" ) ).await;
    assert_eq!( h.backend.handle_count(), 1 );
    assert!( !h.backend.handle( 0 ).is_unloaded() );
}


#[tokio::test( start_paused = true )]
async fn test_play_while_loading_is_dropped() {
    let h = Harness::new();
    let _gate = h.backend.hold_loads();

    let engine = h.engine.clone();
    let first = tokio::spawn( async move { engine.play( track( "a" ) ).await } );
    settle().await;
    assert_eq!( h.engine.state(), PlayerState::Loading );
    assert!( h.last_snapshot().is_buffering );

    h.engine.play( track( "b" ) ).await;
    assert_eq!( h.backend.load_urls(), vec![url( "a" )] );

    h.backend.open_gate();
    first.await.unwrap();

    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert_eq!( h.engine.snapshot().current_track.unwrap().id, "a" );
    assert_eq!( ids( &h.engine.queue() ), vec!["a"] );

    // The slot is free again.
    h.engine.play( track( "b" ) ).await;
    assert_eq!( h.engine.snapshot().current_track.unwrap().id, "b" );
}


#[tokio::test( start_paused = true )]
async fn test_failed_load_is_retried_once() {
    let h = Harness::new();
    h.backend.fail( &url( "a" ), 2 );

    h.engine.play( track( "a" ) ).await;
    assert_eq!( h.engine.state(), PlayerState::Idle );
    assert!( !h.last_snapshot().is_buffering );
    assert_eq!( h.backend.loads().len(), 1 );

    tokio::time::sleep( Duration::from_millis( 1100 ) ).await;
    assert_eq!( h.backend.loads().len(), 2 );
    assert_eq!( h.engine.state(), PlayerState::Idle );

    tokio::time::sleep( Duration::from_secs( 5 ) ).await;
    assert_eq!( h.backend.loads().len(), 2 );
}


#[tokio::test( start_paused = true )]
async fn test_retry_recovers_from_transient_failure() {
    let h = Harness::new();
    h.backend.fail( &url( "a" ), 1 );

    h.engine.play( track( "a" ) ).await;
    assert_eq!( h.engine.state(), PlayerState::Idle );

    tokio::time::sleep( Duration::from_millis( 999 ) ).await;
    assert_eq!( h.backend.loads().len(), 1 );

    tokio::time::sleep( Duration::from_millis( 10 ) ).await;
    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert_eq!( h.backend.handle_count(), 1 );
}


#[tokio::test( start_paused = true )]
async fn test_next_wraps_with_repeat_all() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" ), track( "c" )], 0 );
    h.engine.toggle_repeat();
    assert_eq!( h.engine.toggle_repeat(), RepeatMode::All );

    assert!( h.engine.play_index( 0 ).await );
    assert!( h.engine.next().await );
    assert_eq!( h.engine.current_index(), Some( 1 ) );
    assert!( h.engine.next().await );
    assert_eq!( h.engine.current_index(), Some( 2 ) );
    assert!( h.engine.next().await );
    assert_eq!( h.engine.current_index(), Some( 0 ) );

    assert_eq!( h.backend.load_urls(), vec![url( "a" ), url( "b" ), url( "c" ), url( "a" )] );
    assert!( h.backend.handle( 0 ).is_unloaded() );
    assert!( !h.backend.handle( 3 ).is_unloaded() );
}


#[tokio::test( start_paused = true )]
async fn test_next_at_end_without_repeat_fails() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" )], 1 );
    assert!( h.engine.play_index( 1 ).await );

    assert!( !h.engine.next().await );
    assert_eq!( h.engine.current_index(), Some( 1 ) );
    assert_eq!( h.backend.loads().len(), 1 );
    assert_eq!( h.engine.state(), PlayerState::Playing );
}


#[tokio::test( start_paused = true )]
async fn test_next_and_prev_on_empty_queue_fail() {
    let h = Harness::new();
    assert!( !h.engine.next().await );
    assert!( !h.engine.prev().await );
    assert!( h.backend.loads().is_empty() );
}


#[tokio::test( start_paused = true )]
async fn test_next_with_repeat_one_restarts_current() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" )], 0 );
    h.engine.toggle_repeat();
    assert!( h.engine.play_index( 0 ).await );
    assert!( h.backend.loads()[0].1.looping );

    let handle = h.backend.last_handle();
    handle.tick( 20_000, 100_000 );
    settle().await;
    assert_eq!( h.engine.snapshot().progress_ms, 20_000 );

    assert!( h.engine.next().await );
    assert_eq!( handle.position_ms(), 0 );
    assert_eq!( h.engine.snapshot().progress_ms, 0 );
    assert_eq!( h.backend.loads().len(), 1 );
}


#[tokio::test( start_paused = true )]
async fn test_prev_restarts_after_threshold() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" )], 1 );
    assert!( h.engine.play_index( 1 ).await );

    let handle = h.backend.last_handle();
    handle.tick( 5_000, 200_000 );
    settle().await;

    assert!( h.engine.prev().await );
    assert_eq!( handle.position_ms(), 0 );
    assert_eq!( h.engine.current_index(), Some( 1 ) );
    assert_eq!( h.backend.loads().len(), 1 );

    assert!( h.engine.prev().await );
    assert_eq!( h.engine.current_index(), Some( 0 ) );
    assert_eq!( h.backend.load_urls(), vec![url( "b" ), url( "a" )] );

    assert!( !h.engine.prev().await );
}


#[tokio::test( start_paused = true )]
async fn test_volume_and_speed_are_clamped() {
    let h = Harness::new();
    assert_eq!( h.engine.set_volume( 1.7 ).await, 1.0 );

    h.engine.play( track( "a" ) ).await;
    let handle = h.backend.last_handle();

    assert_eq!( h.engine.set_volume( -0.5 ).await, 0.0 );
    assert_eq!( handle.last_volume(), 0.0 );
    assert_eq!( h.engine.set_volume( f32::NAN ).await, 0.0 );
    assert_eq!( h.store.peek( keys::VOLUME ).as_deref(), Some( "0" ) );

    assert_eq!( h.engine.set_playback_speed( 3.0 ).await, 2.0 );
    assert_eq!( handle.last_rate(), 2.0 );
    assert_eq!( h.engine.set_playback_speed( 0.1 ).await, 0.5 );
    assert_eq!( h.last_snapshot().playback_speed, 0.5 );
}


#[tokio::test( start_paused = true )]
async fn test_seek_clamps_to_duration() {
    let h = Harness::new();
    h.engine.play( timed_track( "a", 60_000 ) ).await;
    let handle = h.backend.last_handle();

    h.engine.seek( 90_000 ).await;
    assert_eq!( handle.position_ms(), 60_000 );
    assert_eq!( h.engine.snapshot().progress_ms, 60_000 );

    h.engine.seek( 1_500 ).await;
    assert_eq!( handle.position_ms(), 1_500 );
}


#[tokio::test( start_paused = true )]
async fn test_pause_resume_and_toggle() {
    let h = Harness::new();
    h.engine.play( track( "a" ) ).await;
    let handle = h.backend.last_handle();

    h.engine.pause().await;
    assert_eq!( h.engine.state(), PlayerState::Paused );
    assert!( !handle.is_playing() );

    h.engine.resume().await;
    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert!( handle.is_playing() );

    h.engine.toggle_play().await;
    assert!( !h.engine.snapshot().is_playing );
    h.engine.toggle_play().await;
    assert!( h.engine.snapshot().is_playing );
    assert_eq!( h.backend.handle_count(), 1 );
}


#[tokio::test( start_paused = true )]
async fn test_stop_keeps_current_track() {
    let h = Harness::new();
    h.engine.play( track( "a" ) ).await;
    let handle = h.backend.last_handle();

    h.engine.stop().await;
    assert!( handle.is_unloaded() );
    assert!( !handle.has_callback() );
    assert_eq!( h.engine.state(), PlayerState::Idle );

    let snapshot = h.last_snapshot();
    assert!( !snapshot.is_playing );
    assert_eq!( snapshot.progress_ms, 0 );
    assert_eq!( snapshot.duration_ms(), 1 );
    assert_eq!( snapshot.current_track.unwrap().id, "a" );
}


#[tokio::test( start_paused = true )]
async fn test_status_ticks_update_progress() {
    let h = Harness::new();
    h.engine.play( track( "a" ) ).await;
    let handle = h.backend.last_handle();

    handle.tick( 12_000, 180_000 );
    settle().await;

    let snapshot = h.last_snapshot();
    assert_eq!( snapshot.progress_ms, 12_000 );
    assert_eq!( snapshot.duration_ms(), 180_000 );
    assert!( snapshot.is_playing );
}


#[tokio::test( start_paused = true )]
async fn test_position_is_saved_periodically() {
    let h = Harness::new();
    h.engine.play( track( "a" ) ).await;
    let handle = h.backend.last_handle();

    handle.tick( 1_000, 600_000 );
    settle().await;
    assert_eq!( h.store.peek( keys::CURRENT_POSITION ).as_deref(), Some( "0" ) );

    tokio::time::sleep( Duration::from_secs( 5 ) ).await;
    handle.tick( 6_000, 600_000 );
    settle().await;
    assert_eq!( h.store.peek( keys::CURRENT_POSITION ).as_deref(), Some( "6000" ) );
}


#[tokio::test( start_paused = true )]
async fn test_stale_ticks_are_ignored() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" )], 0 );
    h.engine.play_index( 0 ).await;
    let first = h.backend.last_handle();

    assert!( h.engine.next().await );
    first.emit_late( PlaybackStatus {
        is_loaded: true,
        position_ms: 99_000,
        duration_ms: Some( 100_000 ),
        is_playing: true,
        did_just_finish: true,
        ..PlaybackStatus::default()
    });
    settle().await;

    let snapshot = h.engine.snapshot();
    assert_eq!( snapshot.current_track.unwrap().id, "b" );
    assert_eq!( snapshot.progress_ms, 0 );
    assert_eq!( h.backend.loads().len(), 2 );
}


#[tokio::test( start_paused = true )]
async fn test_finish_advances_to_next_track() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" )], 0 );
    h.engine.play_index( 0 ).await;
    let first = h.backend.last_handle();

    first.finish( 180_000 );
    settle().await;

    assert_eq!( h.engine.current_index(), Some( 1 ) );
    assert_eq!( h.backend.load_urls(), vec![url( "a" ), url( "b" )] );
    assert!( first.is_unloaded() );
    assert_eq!( ids( &h.engine.history() ), vec!["b", "a"] );
}


#[tokio::test( start_paused = true )]
async fn test_finish_at_end_of_queue_stays_put() {
    let h = Harness::new();
    h.engine.play( track( "a" ) ).await;
    h.backend.last_handle().finish( 1_000 );
    settle().await;

    assert_eq!( h.backend.loads().len(), 1 );
    assert!( !h.engine.snapshot().is_playing );
    assert_eq!( h.engine.current_index(), Some( 0 ) );
}


#[tokio::test( start_paused = true )]
async fn test_finish_with_repeat_one_restarts() {
    let h = Harness::new();
    h.engine.play( track( "a" ) ).await;
    h.engine.toggle_repeat();

    h.backend.last_handle().finish( 1_000 );
    settle().await;

    let snapshot = h.engine.snapshot();
    assert_eq!( snapshot.progress_ms, 0 );
    assert!( snapshot.is_playing );
    assert_eq!( h.backend.loads().len(), 1 );
}


#[tokio::test( start_paused = true )]
async fn test_crossfade_promotes_next_track() {
    let h = Harness::new();
    h.engine.set_queue( vec![timed_track( "a", 10_000 ), timed_track( "b", 12_000 )], 0 );
    h.engine.play_index( 0 ).await;
    let outgoing = h.backend.last_handle();

    outgoing.tick( 8_000, 10_000 );
    settle().await;

    // Debounce, then the first steps of the ramp.
    tokio::time::sleep( Duration::from_millis( 500 ) ).await;
    assert_eq!( h.engine.state(), PlayerState::Crossfading );
    assert_eq!( h.backend.handle_count(), 2 );
    let load = h.backend.loads()[1].1;
    assert!( !load.should_play );
    assert_eq!( load.volume, 0.0 );

    // The outgoing track ending mid-fade does not cause a second transition.
    outgoing.finish( 10_000 );
    settle().await;
    assert_eq!( h.engine.current_index(), Some( 0 ) );
    assert_eq!( h.backend.loads().len(), 2 );

    tokio::time::sleep( Duration::from_secs( 4 ) ).await;

    let incoming = h.backend.handle( 1 );
    assert_eq!( incoming.last_volume(), 1.0 );
    assert!( incoming.is_playing() );
    assert_eq!( outgoing.last_volume(), 0.0 );
    assert!( outgoing.is_unloaded() );

    let snapshot = h.last_snapshot();
    assert_eq!( snapshot.current_track.as_ref().unwrap().id, "b" );
    assert_eq!( snapshot.current_index, Some( 1 ) );
    assert_eq!( snapshot.progress_ms, 0 );
    assert_eq!( snapshot.duration_ms(), 12_000 );
    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert_eq!( ids( &h.engine.history() ), vec!["b", "a"] );
    assert_eq!( h.backend.loads().len(), 2 );
}


#[tokio::test( start_paused = true )]
async fn test_crossfade_volumes_follow_engine_volume() {
    let h = Harness::new();
    h.engine.set_volume( 0.5 ).await;
    h.engine.set_queue( vec![timed_track( "a", 10_000 ), track( "b" )], 0 );
    h.engine.play_index( 0 ).await;

    h.backend.last_handle().tick( 9_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_secs( 4 ) ).await;

    let incoming = h.backend.handle( 1 );
    let volumes = incoming.volumes();
    assert_eq!( volumes.len(), 11 );
    assert!( volumes.windows( 2 ).all( |w| w[0] <= w[1] ) );
    assert!( ( incoming.last_volume() - 0.5 ).abs() < 1e-6 );
}


#[tokio::test( start_paused = true )]
async fn test_no_crossfade_for_last_track_or_repeat_one() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), timed_track( "b", 10_000 )], 1 );
    h.engine.play_index( 1 ).await;
    h.backend.last_handle().tick( 9_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_secs( 4 ) ).await;
    assert_eq!( h.backend.loads().len(), 1 );

    let h = Harness::new();
    h.engine.set_queue( vec![timed_track( "a", 10_000 ), track( "b" )], 0 );
    h.engine.toggle_repeat();
    h.engine.play_index( 0 ).await;
    h.backend.last_handle().tick( 9_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_secs( 4 ) ).await;
    assert_eq!( h.backend.loads().len(), 1 );
}


#[tokio::test( start_paused = true )]
async fn test_stop_cancels_crossfade() {
    let h = Harness::new();
    h.engine.set_queue( vec![timed_track( "a", 10_000 ), track( "b" )], 0 );
    h.engine.play_index( 0 ).await;
    let outgoing = h.backend.last_handle();

    outgoing.tick( 8_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_millis( 500 ) ).await;
    assert_eq!( h.backend.handle_count(), 2 );

    h.engine.stop().await;
    settle().await;

    let incoming = h.backend.handle( 1 );
    assert!( outgoing.is_unloaded() );
    assert!( incoming.is_unloaded() );

    tokio::time::sleep( Duration::from_secs( 5 ) ).await;
    assert_eq!( h.engine.state(), PlayerState::Idle );
    assert_eq!( h.engine.current_index(), Some( 0 ) );
    assert_eq!( h.engine.snapshot().current_track.unwrap().id, "a" );
}


#[tokio::test( start_paused = true )]
async fn test_play_cancels_crossfade() {
    let h = Harness::new();
    h.engine.set_queue( vec![timed_track( "a", 10_000 ), track( "b" ), track( "c" )], 0 );
    h.engine.play_index( 0 ).await;
    let outgoing = h.backend.last_handle();

    outgoing.tick( 8_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_millis( 500 ) ).await;
    assert_eq!( h.engine.state(), PlayerState::Crossfading );
    let incoming = h.backend.handle( 1 );

    h.engine.play( track( "c" ) ).await;
    settle().await;
    assert!( outgoing.is_unloaded() );
    assert!( incoming.is_unloaded() );

    tokio::time::sleep( Duration::from_secs( 5 ) ).await;
    assert_eq!( h.backend.load_urls(), vec![url( "a" ), url( "b" ), url( "c" )] );
    assert!( !h.backend.last_handle().is_unloaded() );
    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert_eq!( h.engine.current_index(), Some( 2 ) );
    assert_eq!( h.engine.snapshot().current_track.unwrap().id, "c" );
    assert_eq!( ids( &h.engine.history() ), vec!["c", "a"] );
}


#[tokio::test( start_paused = true )]
async fn test_crossfade_load_failure_keeps_outgoing_playing() {
    let h = Harness::new();
    h.engine.set_queue( vec![timed_track( "a", 10_000 ), track( "b" )], 0 );
    h.engine.play_index( 0 ).await;
    let outgoing = h.backend.last_handle();
    h.backend.fail( &url( "b" ), 1 );

    outgoing.tick( 8_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_millis( 500 ) ).await;

    assert_eq!( h.backend.load_urls(), vec![url( "a" ), url( "b" )] );
    assert_eq!( h.backend.handle_count(), 1 );
    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert_eq!( h.engine.current_index(), Some( 0 ) );
    assert!( !outgoing.is_unloaded() );
    assert_eq!( outgoing.last_volume(), 1.0 );

    // No second attempt for the same resource; the track plays out and the
    // queue advances on the normal finish.
    outgoing.tick( 9_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_secs( 1 ) ).await;
    assert_eq!( h.backend.loads().len(), 2 );

    outgoing.finish( 10_000 );
    settle().await;
    assert_eq!( h.backend.load_urls(), vec![url( "a" ), url( "b" ), url( "b" )] );
    assert_eq!( h.engine.current_index(), Some( 1 ) );
    assert_eq!( h.engine.state(), PlayerState::Playing );
}


#[tokio::test( start_paused = true )]
async fn test_finish_during_failed_crossfade_advances_queue() {
    let h = Harness::new();
    h.engine.set_queue( vec![timed_track( "a", 10_000 ), track( "b" ), track( "c" )], 0 );
    h.engine.play_index( 0 ).await;
    let outgoing = h.backend.last_handle();
    h.backend.fail( &url( "b" ), 1 );
    let _gate = h.backend.hold_loads();

    outgoing.tick( 8_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_millis( 500 ) ).await;
    assert_eq!( h.engine.state(), PlayerState::Crossfading );

    // The outgoing track ends while the incoming load is still pending.
    outgoing.finish( 10_000 );
    settle().await;
    assert_eq!( h.engine.current_index(), Some( 0 ) );

    h.backend.open_gate();
    tokio::time::sleep( Duration::from_secs( 5 ) ).await;

    assert_eq!( h.backend.load_urls(), vec![url( "a" ), url( "b" ), url( "b" )] );
    assert!( outgoing.is_unloaded() );
    assert_eq!( h.engine.current_index(), Some( 1 ) );
    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert_eq!( h.engine.snapshot().current_track.unwrap().id, "b" );
}


#[tokio::test( start_paused = true )]
async fn test_finish_during_failed_crossfade_at_repeat_all_wraps() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), timed_track( "b", 10_000 )], 1 );
    h.engine.toggle_repeat();
    assert_eq!( h.engine.toggle_repeat(), RepeatMode::All );
    h.engine.play_index( 1 ).await;
    let outgoing = h.backend.last_handle();
    h.backend.fail( &url( "a" ), 1 );
    let _gate = h.backend.hold_loads();

    outgoing.tick( 8_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_millis( 500 ) ).await;
    outgoing.finish( 10_000 );
    settle().await;

    h.backend.open_gate();
    tokio::time::sleep( Duration::from_secs( 5 ) ).await;

    assert_eq!( h.backend.load_urls(), vec![url( "b" ), url( "a" ), url( "a" )] );
    assert_eq!( h.engine.current_index(), Some( 0 ) );
    assert_eq!( h.engine.state(), PlayerState::Playing );
}


#[tokio::test( start_paused = true )]
async fn test_crossfade_commits_peeked_slot_for_duplicate_ids() {
    let h = Harness::new();
    h.engine.set_queue(
        vec![timed_track( "a", 10_000 ), timed_track( "b", 10_000 ), timed_track( "a", 10_000 )],
        0,
    );
    h.engine.play_index( 1 ).await;

    h.backend.last_handle().tick( 8_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_secs( 4 ) ).await;

    assert_eq!( h.backend.load_urls(), vec![url( "b" ), url( "a" )] );
    assert_eq!( h.engine.current_index(), Some( 2 ) );
    assert_eq!( h.engine.snapshot().current_track.unwrap().id, "a" );

    // The end of the queue is reached instead of looping back to b.
    assert!( !h.engine.next().await );
    assert_eq!( h.backend.loads().len(), 2 );
}


#[tokio::test( start_paused = true )]
async fn test_next_keeps_position_among_duplicate_ids() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" ), track( "a" ), track( "c" )], 0 );
    h.engine.play_index( 1 ).await;

    assert!( h.engine.next().await );
    assert_eq!( h.engine.current_index(), Some( 2 ) );
    assert!( h.engine.next().await );
    assert_eq!( h.engine.current_index(), Some( 3 ) );
    assert_eq!( h.backend.load_urls(), vec![url( "b" ), url( "a" ), url( "c" )] );
}


#[tokio::test( start_paused = true )]
async fn test_crossfade_fires_once_per_resource() {
    let h = Harness::new();
    h.engine.set_queue( vec![timed_track( "a", 10_000 ), track( "b" )], 0 );
    h.engine.play_index( 0 ).await;
    let outgoing = h.backend.last_handle();

    outgoing.tick( 8_000, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_millis( 500 ) ).await;
    h.engine.pause().await;
    settle().await;
    assert!( h.backend.handle( 1 ).is_unloaded() );
    assert_eq!( outgoing.last_volume(), 1.0 );

    h.engine.resume().await;
    outgoing.tick( 8_500, 10_000 );
    settle().await;
    tokio::time::sleep( Duration::from_secs( 4 ) ).await;
    assert_eq!( h.backend.loads().len(), 2 );
    assert_eq!( h.engine.current_index(), Some( 0 ) );
}


#[tokio::test( start_paused = true )]
async fn test_remove_current_track_stops_playback() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" ), track( "c" )], 0 );
    h.engine.play_index( 1 ).await;
    let handle = h.backend.last_handle();

    assert!( h.engine.remove_from_queue( 1 ).await );
    assert!( handle.is_unloaded() );
    assert_eq!( h.engine.state(), PlayerState::Idle );
    assert_eq!( ids( &h.engine.queue() ), vec!["a", "c"] );
    assert_eq!( h.engine.current_index(), Some( 1 ) );
    assert!( h.engine.snapshot().current_track.is_none() );

    assert!( !h.engine.remove_from_queue( 5 ).await );
}


#[tokio::test( start_paused = true )]
async fn test_remove_before_current_keeps_playing() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" ), track( "c" )], 0 );
    h.engine.play_index( 2 ).await;

    assert!( h.engine.remove_from_queue( 0 ).await );
    assert_eq!( h.engine.current_index(), Some( 1 ) );
    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert!( !h.backend.last_handle().is_unloaded() );
}


#[tokio::test( start_paused = true )]
async fn test_clear_queue_stops() {
    let h = Harness::new();
    h.engine.set_queue( vec![track( "a" ), track( "b" )], 0 );
    h.engine.play_index( 0 ).await;

    h.engine.clear_queue().await;
    assert!( h.backend.last_handle().is_unloaded() );
    let snapshot = h.last_snapshot();
    assert!( snapshot.queue.is_empty() );
    assert_eq!( snapshot.current_index, None );
    assert!( snapshot.current_track.is_none() );
}


#[tokio::test( start_paused = true )]
async fn test_shuffle_keeps_current_track() {
    let h = Harness::new();
    let tracks = ( 0..12 ).map( |i| track( &format!( "t{i}" ) ) ).collect();
    h.engine.set_queue( tracks, 0 );
    h.engine.play_index( 3 ).await;

    assert!( h.engine.toggle_shuffle() );
    let snapshot = h.last_snapshot();
    assert!( snapshot.shuffle_mode );
    let index = snapshot.current_index.unwrap();
    assert_eq!( snapshot.queue[index].id, "t3" );
    assert_eq!( h.store.peek( keys::SHUFFLE_MODE ).as_deref(), Some( "true" ) );

    assert!( !h.engine.toggle_shuffle() );
    assert_eq!( h.engine.current_index(), Some( index ) );
}


#[tokio::test( start_paused = true )]
async fn test_session_is_restored_without_autoplay() {
    let store = Arc::new( MemoryStore::new() );
    {
        let h = Harness::with_store( store.clone() );
        h.engine.set_queue( vec![track( "a" ), timed_track( "b", 200_000 )], 0 );
        h.engine.toggle_repeat();
        h.engine.toggle_repeat();
        h.engine.set_volume( 0.4 ).await;
        h.engine.play_index( 1 ).await;
        h.backend.last_handle().tick( 42_000, 200_000 );
        settle().await;
        h.engine.pause().await;
    }

    let h = Harness::with_store( store );
    let snapshot = h.engine.snapshot();
    assert_eq!( snapshot.current_track.as_ref().unwrap().id, "b" );
    assert_eq!( snapshot.current_index, Some( 1 ) );
    assert_eq!( snapshot.progress_ms, 42_000 );
    assert!( !snapshot.is_playing );
    assert_eq!( snapshot.repeat_mode, RepeatMode::All );
    assert_eq!( snapshot.volume, 0.4 );
    assert_eq!( h.engine.state(), PlayerState::Idle );
    assert_eq!( ids( &h.engine.history() ), vec!["b"] );
    assert!( h.backend.loads().is_empty() );

    h.engine.toggle_play().await;
    let handle = h.backend.last_handle();
    assert_eq!( handle.url, url( "b" ) );
    assert_eq!( handle.position_ms(), 42_000 );
    assert_eq!( h.backend.loads()[0].1.volume, 0.4 );
    assert_eq!( h.engine.state(), PlayerState::Playing );
}


#[tokio::test( start_paused = true )]
async fn test_listener_panic_does_not_stop_playback() {
    let h = Harness::new();
    let _bad = h.engine.subscribe( |_| panic!( "listener failure" ) );

    h.engine.play( track( "a" ) ).await;
    assert_eq!( h.engine.state(), PlayerState::Playing );
    assert!( h.published() > 0 );
}


struct BrokenStore;


impl KeyValueStore for BrokenStore {
    fn get_item( &self, _key: &str ) -> Result<Option<String>, StoreError> {
        Err( StoreError::Unavailable( "offline".to_string() ) )
    }


    fn set_item( &self, _key: &str, _value: &str ) -> Result<(), StoreError> {
        Err( StoreError::Unavailable( "offline".to_string() ) )
    }
}


#[tokio::test( start_paused = true )]
async fn test_storage_failures_do_not_affect_playback() {
    let backend = FakeBackend::new();
    let engine = PlaybackEngine::new( Arc::new( backend.clone() ), Arc::new( BrokenStore ), EngineConfig::default() );

    engine.set_queue( vec![track( "a" ), track( "b" )], 0 );
    engine.play_index( 0 ).await;
    assert!( engine.next().await );
    assert_eq!( engine.set_volume( 0.3 ).await, 0.3 );

    let snapshot = engine.snapshot();
    assert_eq!( snapshot.current_track.unwrap().id, "b" );
    assert_eq!( snapshot.volume, 0.3 );
    assert_eq!( backend.loads().len(), 2 );
}
