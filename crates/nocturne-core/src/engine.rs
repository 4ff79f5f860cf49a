//! Playback engine
//!
//! `PlaybackEngine` owns the one active audio resource and the play queue. It
//! turns user intents (play, pause, seek, next, ...) into backend calls,
//! follows the resource's status ticks, publishes a snapshot after every
//! change and saves the session as it goes.
//!
//! All engine state sits behind one mutex that is never held across an
//! `.await`. Backend calls are made on cloned handles outside the lock.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError, Weak };

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::backend::{ AudioBackend, AudioHandle, LoadOptions, PlaybackStatus };
use crate::config::EngineConfig;
use crate::crossfade::CrossfadeTask;
use crate::history::History;
use crate::liked::LikedSongs;
use crate::listener::{ ListenerBus, Subscription };
use crate::queue::{ PlayQueue, RepeatMode };
use crate::snapshot::{ PlaybackSnapshot, PlayerState, SnapshotParts };
use crate::store::{ KeyValueStore, PersistenceGateway, SessionState };
use crate::track::Track;


/// The loaded resource that is currently audible.
pub(crate) struct ActiveResource {
    pub(crate) id: u64,
    pub(crate) handle: Arc<dyn AudioHandle>,
}


/// Mutable engine state.
pub(crate) struct EngineState {
    pub(crate) queue: PlayQueue,
    pub(crate) current_track: Option<Track>,
    pub(crate) player_state: PlayerState,
    pub(crate) is_playing: bool,
    pub(crate) is_buffering: bool,
    pub(crate) progress_ms: u64,
    pub(crate) duration_ms: u64,
    pub(crate) volume: f32,
    pub(crate) speed: f32,
    pub(crate) resource: Option<ActiveResource>,
    pub(crate) crossfade: Option<CrossfadeTask>,
    /// Resource for which a crossfade has already been scheduled.
    pub(crate) crossfade_armed_for: Option<u64>,
    /// Resource that reached its end while a crossfade out of it was running.
    pub(crate) finished_during_crossfade: Option<u64>,
    pub(crate) last_position_save: Option<Instant>,
}


impl EngineState {
    fn new( config: &EngineConfig ) -> Self {
        Self {
            queue: PlayQueue::new( config.history_limit ),
            current_track: None,
            player_state: PlayerState::Idle,
            is_playing: false,
            is_buffering: false,
            progress_ms: 0,
            duration_ms: 0,
            volume: 1.0,
            speed: 1.0,
            resource: None,
            crossfade: None,
            crossfade_armed_for: None,
            finished_during_crossfade: None,
            last_position_save: None,
        }
    }


    /// Applies a saved session. Playback is not started.
    fn restore( &mut self, session: SessionState, history_limit: usize ) {
        self.queue.set_repeat( session.repeat );
        self.queue.set_shuffle( session.shuffle );
        self.queue.set_history( History::from_entries( session.history, history_limit ) );
        self.volume = session.volume;
        self.speed = session.playback_speed;

        let current_index = session.current_track.as_ref()
            .and_then( |saved| session.queue.iter().position( |t| t.id == saved.id ) );
        self.queue.restore( session.queue, current_index );

        if current_index.is_some() {
            if let Some( track ) = session.current_track {
                tracing::info!( "Restored last session: {} at {} ms", track.label(), session.position_ms );
                self.current_track = Some( track );
                self.progress_ms = session.position_ms;
            }
        }
    }


    pub(crate) fn snapshot( &self ) -> PlaybackSnapshot {
        PlaybackSnapshot::new( SnapshotParts {
            current_track: self.current_track.clone(),
            is_playing: self.is_playing,
            is_buffering: self.is_buffering,
            progress_ms: self.progress_ms,
            duration_ms: self.duration_ms,
            queue: self.queue.tracks().to_vec(),
            current_index: self.queue.current_index(),
            repeat_mode: self.queue.repeat(),
            shuffle_mode: self.queue.shuffle(),
            volume: self.volume,
            playback_speed: self.speed,
        })
    }


    fn session( &self ) -> SessionState {
        SessionState {
            current_track: self.current_track.clone(),
            position_ms: self.progress_ms,
            queue: self.queue.tracks().to_vec(),
            history: self.queue.history().to_vec(),
            repeat: self.queue.repeat(),
            shuffle: self.queue.shuffle(),
            volume: self.volume,
            playback_speed: self.speed,
        }
    }


    /// Cancels a pending or running crossfade, if any.
    pub(crate) fn cancel_crossfade( &mut self ) {
        if let Some( task ) = self.crossfade.take() {
            tracing::debug!( "Cancelling crossfade" );
            task.cancel();
        }
    }


    /// State shown while a resource is loaded and no transition is running.
    pub(crate) fn settled_state( &self ) -> PlayerState {
        if self.is_playing { PlayerState::Playing } else { PlayerState::Paused }
    }
}


struct StatusMessage {
    resource_id: u64,
    status: PlaybackStatus,
}


pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn AudioBackend>,
    pub(crate) gateway: PersistenceGateway,
    pub(crate) bus: ListenerBus,
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<EngineState>,
    play_in_flight: AtomicBool,
    next_resource_id: AtomicU64,
    status_tx: mpsc::UnboundedSender<StatusMessage>,
}


/// Single-slot token for `play`. Released on drop, whichever way `play` exits.
struct PlaySlot<'a>( &'a AtomicBool );


impl<'a> PlaySlot<'a> {
    fn acquire( flag: &'a AtomicBool ) -> Option<Self> {
        flag.compare_exchange( false, true, Ordering::AcqRel, Ordering::Acquire )
            .ok()
            .map( |_| Self( flag ) )
    }
}


impl Drop for PlaySlot<'_> {
    fn drop( &mut self ) {
        self.0.store( false, Ordering::Release );
    }
}


/// What `next`/`prev` decided to do once the lock is released.
enum Step {
    Restart,
    Play( Track ),
}


/// Queue-based playback engine.
///
/// Cheap to clone; all clones drive the same engine.
#[derive( Clone )]
pub struct PlaybackEngine {
    pub(crate) shared: Arc<Shared>,
}


impl PlaybackEngine {
    /// Creates an engine and restores the session saved in `store`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; the engine spawns the task
    /// that processes status ticks.
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        store: Arc<dyn KeyValueStore>,
        config: EngineConfig,
    ) -> Self {
        let gateway = PersistenceGateway::new( store );
        let mut state = EngineState::new( &config );
        state.restore( gateway.load_session(), config.history_limit );

        let ( status_tx, status_rx ) = mpsc::unbounded_channel();
        let shared = Arc::new( Shared {
            backend,
            gateway,
            bus: ListenerBus::new(),
            config,
            state: Mutex::new( state ),
            play_in_flight: AtomicBool::new( false ),
            next_resource_id: AtomicU64::new( 1 ),
            status_tx,
        });

        tokio::spawn( status_loop( Arc::downgrade( &shared ), status_rx ) );
        Self { shared }
    }


    // ----- Observation -----


    /// Registers a snapshot listener.
    pub fn subscribe<F>( &self, callback: F ) -> Subscription
    where
        F: Fn( &PlaybackSnapshot ) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe( callback )
    }


    pub fn snapshot( &self ) -> PlaybackSnapshot {
        self.lock().snapshot()
    }


    pub fn state( &self ) -> PlayerState {
        self.lock().player_state
    }


    /// Played tracks, most recent first.
    pub fn history( &self ) -> Vec<Track> {
        self.lock().queue.history().to_vec()
    }


    pub fn queue( &self ) -> Vec<Track> {
        self.lock().queue.tracks().to_vec()
    }


    pub fn current_index( &self ) -> Option<usize> {
        self.lock().queue.current_index()
    }


    pub fn repeat_mode( &self ) -> RepeatMode {
        self.lock().queue.repeat()
    }


    pub fn shuffle_mode( &self ) -> bool {
        self.lock().queue.shuffle()
    }


    pub fn volume( &self ) -> f32 {
        self.lock().volume
    }


    pub fn playback_speed( &self ) -> f32 {
        self.lock().speed
    }


    pub fn config( &self ) -> &EngineConfig {
        &self.shared.config
    }


    /// Liked songs kept in the same store as the session.
    pub fn liked_songs( &self ) -> LikedSongs {
        LikedSongs::new( self.shared.gateway.clone() )
    }


    // ----- Queue -----


    /// Replaces the queue without starting playback.
    pub fn set_queue( &self, tracks: Vec<Track>, start_index: usize ) {
        {
            let mut state = self.lock();
            state.queue.set_queue( tracks, start_index );
            tracing::info!(
                "Queue set with {} tracks, current index {:?}",
                state.queue.len(),
                state.queue.current_index()
            );
        }
        self.commit();
    }


    /// Appends a track and returns its index.
    pub fn add_to_queue( &self, track: Track ) -> usize {
        let index = {
            let mut state = self.lock();
            tracing::info!( "Added to queue: {}", track.label() );
            state.queue.add( track )
        };
        self.commit();
        index
    }


    /// Removes the track at `index`, stopping playback first if it is the
    /// current one. Returns false if the index is out of range.
    pub async fn remove_from_queue( &self, index: usize ) -> bool {
        let removes_current = {
            let state = self.lock();
            if index >= state.queue.len() {
                return false;
            }
            state.queue.is_current( index )
        };

        if removes_current {
            self.stop().await;
        }

        {
            let mut state = self.lock();
            let was_current = state.queue.is_current( index );
            let Some( removed ) = state.queue.remove( index ) else {
                return false;
            };
            if was_current {
                state.current_track = None;
            }
            tracing::info!( "Removed {} from queue", removed.label() );
        }
        self.commit();
        true
    }


    /// Stops playback and empties the queue.
    pub async fn clear_queue( &self ) {
        self.stop().await;
        {
            let mut state = self.lock();
            state.queue.clear();
            state.current_track = None;
        }
        tracing::info!( "Queue cleared" );
        self.commit();
    }


    /// Flips shuffle mode and returns the new value.
    pub fn toggle_shuffle( &self ) -> bool {
        let shuffle = self.lock().queue.toggle_shuffle();
        tracing::info!( "Shuffle mode: {}", if shuffle { "on" } else { "off" } );
        self.commit();
        shuffle
    }


    /// Cycles Off → One → All → Off and returns the new mode.
    pub fn toggle_repeat( &self ) -> RepeatMode {
        let repeat = self.lock().queue.toggle_repeat();
        tracing::info!( "Repeat mode: {}", repeat );
        self.commit();
        repeat
    }


    // ----- Transport -----


    /// Plays `track`, adding it to the queue if needed.
    ///
    /// Ignored if the track is already playing or another `play` is still
    /// loading. A failed load is retried once after the configured delay.
    pub async fn play( &self, track: Track ) {
        {
            let state = self.lock();
            let same = state.current_track.as_ref().is_some_and( |t| t.id == track.id );
            if same && state.is_playing {
                tracing::debug!( "Already playing {}", track.label() );
                return;
            }
        }

        let Some( _slot ) = PlaySlot::acquire( &self.shared.play_in_flight ) else {
            tracing::debug!( "Playback locked, dropping request for {}", track.label() );
            return;
        };

        self.lock().cancel_crossfade();
        self.stop().await;

        let options = {
            let mut state = self.lock();
            state.current_track = Some( track.clone() );
            state.progress_ms = 0;
            state.duration_ms = 0;
            state.is_playing = false;
            state.is_buffering = true;
            state.player_state = PlayerState::Loading;
            state.finished_during_crossfade = None;
            state.queue.ensure_current( &track );

            LoadOptions {
                should_play: true,
                volume: state.volume,
                rate: state.speed,
                looping: state.queue.repeat() == RepeatMode::One,
            }
        };
        self.publish();

        tracing::info!( "Loading: {}", track.label() );
        match self.shared.backend.load( &track.stream_url, options ).await {
            Ok( handle ) => {
                let handle: Arc<dyn AudioHandle> = Arc::from( handle );
                let id = self.attach( &handle );
                {
                    let mut state = self.lock();
                    state.resource = Some( ActiveResource { id, handle } );
                    state.is_playing = true;
                    state.is_buffering = false;
                    state.duration_ms = track.duration_ms.unwrap_or( 0 );
                    state.player_state = PlayerState::Playing;
                    state.last_position_save = Some( Instant::now() );
                    state.queue.record_played( track.clone() );
                }
                self.commit();
                tracing::info!( "Playback started: {}", track.label() );
            }
            Err( e ) => {
                tracing::error!( "Failed to play {}: {}", track.label(), e );
                {
                    let mut state = self.lock();
                    state.is_buffering = false;
                    state.player_state = PlayerState::Idle;
                }
                self.publish();

                if !track.retried {
                    let mut retry = track;
                    retry.retried = true;
                    tracing::info!( "Retrying {} in {:?}", retry.label(), self.shared.config.retry_delay() );
                    tokio::spawn( self.clone().retry_after_delay( retry ) );
                }
            }
        }
    }


    /// Boxed so the retry task does not make `play`'s future type recursive.
    fn retry_after_delay( self, track: Track ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin( async move {
            tokio::time::sleep( self.shared.config.retry_delay() ).await;
            self.play( track ).await;
        })
    }


    /// Plays the queued track at `index`. Returns false if out of range.
    pub async fn play_index( &self, index: usize ) -> bool {
        let track = {
            let mut state = self.lock();
            if !state.queue.jump_to( index ) {
                return false;
            }
            state.queue.get( index ).cloned()
        };

        match track {
            Some( track ) => {
                self.play( track ).await;
                true
            }
            None => false,
        }
    }


    /// Pauses if playing, resumes if paused, otherwise starts the current
    /// track. A track restored from the last session resumes at its saved
    /// position.
    pub async fn toggle_play( &self ) {
        let ( loaded, playing, pending, resume_at ) = {
            let state = self.lock();
            let pending = state.current_track.clone()
                .or_else( || state.queue.current().cloned() );
            ( state.resource.is_some(), state.is_playing, pending, state.progress_ms )
        };

        if loaded {
            if playing { self.pause().await } else { self.resume().await }
            return;
        }

        let Some( track ) = pending else {
            tracing::debug!( "Nothing to play" );
            return;
        };

        let id = track.id.clone();
        self.play( track ).await;

        if resume_at > 0 {
            let resumed_same = {
                let state = self.lock();
                state.resource.is_some() && state.current_track.as_ref().is_some_and( |t| t.id == id )
            };
            if resumed_same {
                self.seek( resume_at ).await;
            }
        }
    }


    pub async fn pause( &self ) {
        let handle = {
            let mut state = self.lock();
            let handle = match state.resource {
                Some( ref resource ) if state.is_playing => Arc::clone( &resource.handle ),
                _ => return,
            };
            state.cancel_crossfade();
            handle
        };

        if let Err( e ) = handle.pause().await {
            tracing::error!( "Failed to pause: {}", e );
            return;
        }

        {
            let mut state = self.lock();
            state.is_playing = false;
            state.player_state = PlayerState::Paused;
            if let Some( ref track ) = state.current_track {
                tracing::info!( "Paused: {}", track.label() );
            }
        }
        self.commit();
    }


    pub async fn resume( &self ) {
        let handle = {
            let state = self.lock();
            match state.resource {
                Some( ref resource ) if !state.is_playing => Arc::clone( &resource.handle ),
                _ => return,
            }
        };

        if let Err( e ) = handle.play().await {
            tracing::error!( "Failed to resume: {}", e );
            return;
        }

        {
            let mut state = self.lock();
            state.is_playing = true;
            state.player_state = PlayerState::Playing;
            if let Some( ref track ) = state.current_track {
                tracing::info!( "Resumed: {}", track.label() );
            }
        }
        self.publish();
    }


    /// Stops and releases the current resource. The current track stays
    /// selected.
    pub async fn stop( &self ) {
        let resource = {
            let mut state = self.lock();
            state.cancel_crossfade();
            state.finished_during_crossfade = None;
            state.resource.take()
        };

        if let Some( resource ) = resource {
            release( &resource.handle ).await;
            tracing::info!( "Stopped playback" );
        }

        {
            let mut state = self.lock();
            state.is_playing = false;
            state.is_buffering = false;
            state.progress_ms = 0;
            state.duration_ms = 0;
            state.player_state = PlayerState::Idle;
        }
        self.commit();
    }


    /// Moves the play position. Positions past a known duration are clamped
    /// to it.
    pub async fn seek( &self, position_ms: u64 ) {
        let ( handle, target ) = {
            let state = self.lock();
            let Some( ref resource ) = state.resource else {
                return;
            };
            let target = if state.duration_ms > 0 {
                position_ms.min( state.duration_ms )
            } else {
                position_ms
            };
            ( Arc::clone( &resource.handle ), target )
        };

        if let Err( e ) = handle.set_position( target ).await {
            tracing::error!( "Failed to seek: {}", e );
            return;
        }

        self.lock().progress_ms = target;
        tracing::info!( "Seeked to {}s", target / 1000 );
        self.commit();
    }


    /// Advances to the next queued track.
    ///
    /// With RepeatMode::One the current track restarts instead. Returns false
    /// at the end of the queue unless RepeatMode::All wraps around.
    pub async fn next( &self ) -> bool {
        let step = {
            let mut state = self.lock();
            if state.queue.is_empty() {
                tracing::debug!( "Cannot skip to next: queue is empty" );
                return false;
            }

            if state.queue.repeat() == RepeatMode::One && state.current_track.is_some() {
                Step::Restart
            } else {
                let Some( index ) = state.queue.peek_next() else {
                    tracing::debug!( "Reached end of queue" );
                    return false;
                };
                state.queue.jump_to( index );
                match state.queue.get( index ).cloned() {
                    Some( track ) => Step::Play( track ),
                    None => return false,
                }
            }
        };

        match step {
            Step::Restart => {
                self.seek( 0 ).await;
                let playing = self.lock().is_playing;
                if !playing {
                    self.resume().await;
                }
            }
            Step::Play( track ) => {
                tracing::info!( "Next track: {}", track.label() );
                self.play( track ).await;
            }
        }
        true
    }


    /// Goes back one track, or restarts the current one if it has played
    /// past the restart threshold.
    pub async fn prev( &self ) -> bool {
        let step = {
            let mut state = self.lock();
            if state.queue.is_empty() {
                tracing::debug!( "Cannot go to previous: queue is empty" );
                return false;
            }

            if state.progress_ms > self.shared.config.restart_threshold_ms {
                Step::Restart
            } else {
                let Some( index ) = state.queue.peek_previous() else {
                    tracing::debug!( "Reached beginning of queue" );
                    return false;
                };
                state.queue.jump_to( index );
                match state.queue.get( index ).cloned() {
                    Some( track ) => Step::Play( track ),
                    None => return false,
                }
            }
        };

        match step {
            Step::Restart => self.seek( 0 ).await,
            Step::Play( track ) => {
                tracing::info!( "Previous track: {}", track.label() );
                self.play( track ).await;
            }
        }
        true
    }


    /// Sets the volume, clamped to [0, 1], and returns the stored value.
    pub async fn set_volume( &self, volume: f32 ) -> f32 {
        if volume.is_nan() {
            return self.volume();
        }

        let volume = volume.clamp( 0.0, 1.0 );
        let handle = {
            let mut state = self.lock();
            state.volume = volume;
            state.resource.as_ref().map( |r| Arc::clone( &r.handle ) )
        };

        if let Some( handle ) = handle {
            if let Err( e ) = handle.set_volume( volume ).await {
                tracing::error!( "Failed to apply volume: {}", e );
            }
        }

        tracing::info!( "Volume set to {}", volume );
        self.commit();
        volume
    }


    /// Sets the playback rate, clamped to [0.5, 2], and returns the stored
    /// value. Pitch correction is requested from the backend.
    pub async fn set_playback_speed( &self, speed: f32 ) -> f32 {
        if speed.is_nan() {
            return self.playback_speed();
        }

        let speed = speed.clamp( 0.5, 2.0 );
        let handle = {
            let mut state = self.lock();
            state.speed = speed;
            state.resource.as_ref().map( |r| Arc::clone( &r.handle ) )
        };

        if let Some( handle ) = handle {
            if let Err( e ) = handle.set_rate( speed, true ).await {
                tracing::error!( "Failed to apply playback speed: {}", e );
            }
        }

        tracing::info!( "Playback speed set to {}", speed );
        self.commit();
        speed
    }


    // ----- Status ticks -----


    /// Handles one status tick from a resource.
    async fn handle_status( &self, resource_id: u64, status: PlaybackStatus ) {
        let ( snapshot, save, finished, repeat ) = {
            let mut state = self.lock();

            // Ticks from released resources or from a crossfade's incoming
            // resource are not ours to report.
            if state.resource.as_ref().map( |r| r.id ) != Some( resource_id ) {
                return;
            }

            if !status.is_loaded {
                let Some( ref error ) = status.error else {
                    return;
                };
                tracing::error!( "Playback error: {}", error );
                state.is_buffering = false;
                let snapshot = state.snapshot();
                drop( state );
                self.shared.bus.publish( &snapshot );
                return;
            }

            state.progress_ms = status.position_ms;
            if let Some( duration ) = status.duration_ms {
                state.duration_ms = duration;
            }
            state.is_playing = status.is_playing;
            state.is_buffering = status.is_buffering;
            if matches!( state.player_state, PlayerState::Playing | PlayerState::Paused ) {
                state.player_state = state.settled_state();
            }

            let now = Instant::now();
            let save = state.last_position_save
                .map_or( true, |last| now.duration_since( last ) >= self.shared.config.position_save_interval() );
            if save {
                state.last_position_save = Some( now );
            }

            let crossfading = state.crossfade.as_ref().is_some_and( |task| !task.is_finished() );
            let ended = status.did_just_finish && !status.is_looping;
            if ended && crossfading {
                // The crossfade either promotes the next track or, if it
                // gives up, advances the queue itself.
                state.finished_during_crossfade = Some( resource_id );
            }
            let finished = ended && !crossfading;
            if !finished {
                self.maybe_schedule_crossfade( &mut state );
            }

            ( state.snapshot(), save, finished, state.queue.repeat() )
        };

        self.shared.bus.publish( &snapshot );
        if save {
            self.persist();
        }

        if finished {
            if let Some( track ) = snapshot.current_track.as_ref() {
                tracing::info!( "Track finished: {}", track.label() );
            }
            self.advance_after_finish( repeat ).await;
        }
    }


    /// Restarts the track under RepeatMode::One, otherwise moves on.
    pub(crate) async fn advance_after_finish( &self, repeat: RepeatMode ) {
        if repeat == RepeatMode::One {
            self.seek( 0 ).await;
            let playing = self.lock().is_playing;
            if !playing {
                self.resume().await;
            }
        } else if !self.next().await {
            tracing::info!( "End of queue" );
        }
    }


    // ----- Internals -----


    pub(crate) fn lock( &self ) -> MutexGuard<'_, EngineState> {
        self.shared.state.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Routes a handle's status ticks into the engine, tagged with a fresh id.
    pub(crate) fn attach( &self, handle: &Arc<dyn AudioHandle> ) -> u64 {
        let resource_id = self.shared.next_resource_id.fetch_add( 1, Ordering::Relaxed );
        let tx = self.shared.status_tx.clone();
        handle.on_status_update( Some( Arc::new( move |status| {
            let _ = tx.send( StatusMessage { resource_id, status } );
        })));
        resource_id
    }


    pub(crate) fn publish( &self ) {
        let snapshot = self.lock().snapshot();
        self.shared.bus.publish( &snapshot );
    }


    pub(crate) fn persist( &self ) {
        let session = self.lock().session();
        self.shared.gateway.save_session( &session );
    }


    /// Persist then publish; the tail of every mutating operation.
    pub(crate) fn commit( &self ) {
        self.persist();
        self.publish();
    }
}


/// Detaches, stops and unloads a handle. Failures are logged.
pub(crate) async fn release( handle: &Arc<dyn AudioHandle> ) {
    handle.on_status_update( None );
    if let Err( e ) = handle.stop().await {
        tracing::warn!( "Failed to stop resource: {}", e );
    }
    if let Err( e ) = handle.unload().await {
        tracing::warn!( "Failed to unload resource: {}", e );
    }
}


async fn status_loop( shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<StatusMessage> ) {
    while let Some( message ) = rx.recv().await {
        let Some( shared ) = shared.upgrade() else {
            break;
        };
        PlaybackEngine { shared }.handle_status( message.resource_id, message.status ).await;
    }
    tracing::debug!( "Status loop exiting" );
}
