//! Crossfade between consecutive tracks
//!
//! When a playing track enters its trailing window the engine schedules a
//! crossfade: after a short debounce the next queued track is loaded silent,
//! both volumes are ramped in lockstep, and the incoming resource is promoted
//! to current. At most one crossfade exists at a time, and any explicit
//! transport change cancels it.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{ AudioHandle, LoadOptions };
use crate::engine::{ release, ActiveResource, EngineState, PlaybackEngine };
use crate::queue::RepeatMode;
use crate::snapshot::PlayerState;
use crate::track::Track;


/// A pending or running crossfade.
pub(crate) struct CrossfadeTask {
    outgoing_id: u64,
    token: CancellationToken,
    join: JoinHandle<()>,
}


impl CrossfadeTask {
    fn spawn( engine: PlaybackEngine, outgoing_id: u64 ) -> Self {
        let token = CancellationToken::new();
        let child = token.clone();
        let debounce = engine.shared.config.crossfade_debounce();

        let join = tokio::spawn( async move {
            tokio::select! {
                _ = child.cancelled() => return,
                _ = tokio::time::sleep( debounce ) => {}
            }
            engine.run_crossfade( outgoing_id, child ).await;
        });

        Self { outgoing_id, token, join }
    }


    pub(crate) fn cancel( self ) {
        self.token.cancel();
    }


    pub(crate) fn is_finished( &self ) -> bool {
        self.join.is_finished()
    }
}


/// Volumes for step `step` of `steps`: the outgoing track fades from
/// `volume` to silence while the incoming one rises to `volume`.
pub(crate) fn ramp_volumes( volume: f32, step: u32, steps: u32 ) -> ( f32, f32 ) {
    let steps = steps.max( 1 );
    let ratio = step.min( steps ) as f32 / steps as f32;
    ( volume * ( 1.0 - ratio ), volume * ratio )
}


struct Plan {
    outgoing: Arc<dyn AudioHandle>,
    next_index: usize,
    next_track: Track,
    volume: f32,
    rate: f32,
}


impl PlaybackEngine {
    /// Schedules a crossfade if the current resource has entered the
    /// trailing window and there is a track to fade into.
    pub(crate) fn maybe_schedule_crossfade( &self, state: &mut EngineState ) {
        let Some( resource_id ) = state.resource.as_ref().map( |r| r.id ) else {
            return;
        };

        let window = self.shared.config.crossfade_window_ms;
        if state.duration_ms == 0 || state.progress_ms == 0 || !state.is_playing {
            return;
        }
        if state.duration_ms.saturating_sub( state.progress_ms ) > window {
            return;
        }
        if state.crossfade.is_some() || state.crossfade_armed_for == Some( resource_id ) {
            return;
        }
        if state.queue.len() <= 1 || state.queue.repeat() == RepeatMode::One {
            return;
        }
        if state.queue.peek_next().is_none() {
            return;
        }

        tracing::debug!( "Scheduling crossfade out of resource {}", resource_id );
        state.crossfade_armed_for = Some( resource_id );
        state.crossfade = Some( CrossfadeTask::spawn( self.clone(), resource_id ) );
    }


    async fn run_crossfade( &self, outgoing_id: u64, token: CancellationToken ) {
        if !self.fade_into_next( outgoing_id, &token ).await {
            self.abandon( outgoing_id ).await;
        }
    }


    /// Loads the next track, ramps both volumes and promotes it. Returns
    /// false if the incoming track never became current.
    async fn fade_into_next( &self, outgoing_id: u64, token: &CancellationToken ) -> bool {
        let plan = {
            let mut state = self.lock();
            if token.is_cancelled() {
                return false;
            }

            let outgoing = state.resource.as_ref()
                .filter( |r| r.id == outgoing_id )
                .map( |r| Arc::clone( &r.handle ) );
            let Some( outgoing ) = outgoing else {
                return false;
            };
            let Some( next_index ) = state.queue.peek_next() else {
                return false;
            };
            let Some( next_track ) = state.queue.get( next_index ).cloned() else {
                return false;
            };

            state.player_state = PlayerState::Crossfading;
            Plan { outgoing, next_index, next_track, volume: state.volume, rate: state.speed }
        };
        self.publish();

        tracing::info!( "Crossfading into {}", plan.next_track.label() );
        let options = LoadOptions {
            should_play: false,
            volume: 0.0,
            rate: plan.rate,
            looping: false,
        };
        let incoming: Arc<dyn AudioHandle> = match self.shared.backend.load( &plan.next_track.stream_url, options ).await {
            Ok( handle ) => Arc::from( handle ),
            Err( e ) => {
                tracing::error!( "Crossfade failed to load {}: {}", plan.next_track.label(), e );
                return false;
            }
        };

        let incoming_id = self.attach( &incoming );
        if token.is_cancelled() {
            release( &incoming ).await;
            return false;
        }
        if let Err( e ) = incoming.play().await {
            tracing::error!( "Crossfade failed to start {}: {}", plan.next_track.label(), e );
            release( &incoming ).await;
            return false;
        }

        let steps = self.shared.config.crossfade_steps.max( 1 );
        let step_duration = self.shared.config.crossfade_step();
        for step in 1..=steps {
            let ( outgoing_volume, incoming_volume ) = ramp_volumes( plan.volume, step, steps );
            if let Err( e ) = plan.outgoing.set_volume( outgoing_volume ).await {
                tracing::debug!( "Failed to fade out: {}", e );
            }
            if let Err( e ) = incoming.set_volume( incoming_volume ).await {
                tracing::debug!( "Failed to fade in: {}", e );
            }

            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!( "Crossfade cancelled at step {}", step );
                    release( &incoming ).await;
                    self.restore_volume( outgoing_id, &plan.outgoing ).await;
                    return false;
                }
                _ = tokio::time::sleep( step_duration ) => {}
            }
        }

        let outgoing = {
            let mut state = self.lock();
            let still_current = state.resource.as_ref().is_some_and( |r| r.id == outgoing_id );
            if token.is_cancelled() || !still_current {
                None
            } else {
                let track = plan.next_track.clone();
                let outgoing = state.resource.replace( ActiveResource {
                    id: incoming_id,
                    handle: Arc::clone( &incoming ),
                });
                let same_slot = state.queue.get( plan.next_index ).is_some_and( |t| t.id == track.id );
                if same_slot {
                    state.queue.jump_to( plan.next_index );
                } else {
                    state.queue.ensure_current( &track );
                }
                state.queue.record_played( track.clone() );
                state.current_track = Some( track );
                state.progress_ms = 0;
                state.duration_ms = plan.next_track.duration_ms.unwrap_or( 0 );
                state.is_playing = true;
                state.is_buffering = false;
                state.player_state = PlayerState::Playing;
                state.last_position_save = Some( Instant::now() );
                state.finished_during_crossfade = None;
                vacate( &mut state, outgoing_id );
                outgoing
            }
        };

        match outgoing {
            Some( outgoing ) => {
                release( &outgoing.handle ).await;
                tracing::info!( "Crossfade complete: {}", plan.next_track.label() );
                self.commit();
                true
            }
            None => {
                tracing::debug!( "Crossfade superseded; discarding {}", plan.next_track.label() );
                release( &incoming ).await;
                self.restore_volume( outgoing_id, &plan.outgoing ).await;
                false
            }
        }
    }


    /// Puts the outgoing track back at full engine volume if it is still the
    /// current resource after an interrupted ramp.
    async fn restore_volume( &self, outgoing_id: u64, outgoing: &Arc<dyn AudioHandle> ) {
        let volume = {
            let state = self.lock();
            let current = state.resource.as_ref().is_some_and( |r| r.id == outgoing_id );
            current.then_some( state.volume )
        };

        if let Some( volume ) = volume {
            if let Err( e ) = outgoing.set_volume( volume ).await {
                tracing::warn!( "Failed to restore volume: {}", e );
            }
        }
    }


    /// Gives up on a crossfade. The outgoing track plays out, or, if it
    /// already ended while the crossfade ran, the queue advances now.
    async fn abandon( &self, outgoing_id: u64 ) {
        let ( changed, deferred ) = {
            let mut state = self.lock();
            vacate( &mut state, outgoing_id );

            let current = state.resource.as_ref().is_some_and( |r| r.id == outgoing_id );
            if !current {
                return;
            }

            let changed = state.player_state == PlayerState::Crossfading;
            if changed {
                state.player_state = state.settled_state();
            }
            let deferred = if state.finished_during_crossfade == Some( outgoing_id ) {
                state.finished_during_crossfade = None;
                Some( state.queue.repeat() )
            } else {
                None
            };
            ( changed, deferred )
        };

        if changed {
            self.publish();
        }
        if let Some( repeat ) = deferred {
            tracing::info!( "Track finished during an abandoned crossfade" );
            self.advance_after_finish( repeat ).await;
        }
    }
}


/// Clears the crossfade slot if it still belongs to `outgoing_id`.
fn vacate( state: &mut EngineState, outgoing_id: u64 ) {
    if state.crossfade.as_ref().is_some_and( |task| task.outgoing_id == outgoing_id ) {
        state.crossfade = None;
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_ramp_endpoints() {
        assert_eq!( ramp_volumes( 0.8, 10, 10 ), ( 0.0, 0.8 ) );

        let ( out, inc ) = ramp_volumes( 1.0, 1, 10 );
        assert!( ( out - 0.9 ).abs() < 1e-6 );
        assert!( ( inc - 0.1 ).abs() < 1e-6 );
    }


    #[test]
    fn test_ramp_volumes_sum_to_base() {
        for step in 1..=10 {
            let ( out, inc ) = ramp_volumes( 0.6, step, 10 );
            assert!( ( out + inc - 0.6 ).abs() < 1e-6 );
        }
    }


    #[test]
    fn test_ramp_tolerates_zero_steps() {
        assert_eq!( ramp_volumes( 1.0, 0, 0 ), ( 1.0, 0.0 ) );
        assert_eq!( ramp_volumes( 1.0, 5, 0 ), ( 0.0, 1.0 ) );
    }
}
