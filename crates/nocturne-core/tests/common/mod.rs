//! Scripted audio backend for engine tests.

#![allow( dead_code )]

use std::collections::HashMap;
use std::sync::{ Arc, Mutex, MutexGuard };
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use nocturne_core::{
    AudioBackend, AudioHandle, BackendError, EngineConfig, LoadOptions, MemoryStore,
    PlaybackEngine, PlaybackSnapshot, PlaybackStatus, StatusCallback, Track,
};


#[derive( Default )]
struct HandleState {
    playing: bool,
    position_ms: u64,
    volumes: Vec<f32>,
    rates: Vec<f32>,
    stopped: bool,
    unloaded: bool,
    callback: Option<StatusCallback>,
    last_attached: Option<StatusCallback>,
}


/// A fake resource. Clones share state, so tests keep one while the engine
/// owns another.
#[derive( Clone )]
pub struct FakeHandle {
    pub url: String,
    state: Arc<Mutex<HandleState>>,
}


impl FakeHandle {
    fn new( url: &str, options: LoadOptions ) -> Self {
        let state = HandleState {
            playing: options.should_play,
            volumes: vec![options.volume],
            rates: vec![options.rate],
            ..HandleState::default()
        };
        Self { url: url.to_string(), state: Arc::new( Mutex::new( state ) ) }
    }


    fn state( &self ) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap()
    }


    /// Delivers a raw status tick, if a callback is attached.
    pub fn emit( &self, status: PlaybackStatus ) {
        let callback = self.state().callback.clone();
        if let Some( callback ) = callback {
            callback( status );
        }
    }


    /// Delivers a tick through the last callback ever attached, even after
    /// the engine detached it. Models a tick already in flight at release.
    pub fn emit_late( &self, status: PlaybackStatus ) {
        let callback = self.state().last_attached.clone();
        if let Some( callback ) = callback {
            callback( status );
        }
    }


    /// Delivers a normal progress tick while playing.
    pub fn tick( &self, position_ms: u64, duration_ms: u64 ) {
        self.emit( PlaybackStatus {
            is_loaded: true,
            position_ms,
            duration_ms: Some( duration_ms ),
            is_playing: true,
            ..PlaybackStatus::default()
        });
    }


    /// Delivers the end-of-track tick.
    pub fn finish( &self, duration_ms: u64 ) {
        self.emit( PlaybackStatus {
            is_loaded: true,
            position_ms: duration_ms,
            duration_ms: Some( duration_ms ),
            is_playing: false,
            did_just_finish: true,
            ..PlaybackStatus::default()
        });
    }


    pub fn is_playing( &self ) -> bool {
        self.state().playing
    }


    pub fn position_ms( &self ) -> u64 {
        self.state().position_ms
    }


    pub fn volumes( &self ) -> Vec<f32> {
        self.state().volumes.clone()
    }


    pub fn last_volume( &self ) -> f32 {
        self.state().volumes.last().copied().unwrap_or( f32::NAN )
    }


    pub fn last_rate( &self ) -> f32 {
        self.state().rates.last().copied().unwrap_or( f32::NAN )
    }


    pub fn is_unloaded( &self ) -> bool {
        self.state().unloaded
    }


    pub fn has_callback( &self ) -> bool {
        self.state().callback.is_some()
    }
}


#[async_trait]
impl AudioHandle for FakeHandle {
    async fn play( &self ) -> Result<(), BackendError> {
        self.state().playing = true;
        Ok(())
    }


    async fn pause( &self ) -> Result<(), BackendError> {
        self.state().playing = false;
        Ok(())
    }


    async fn stop( &self ) -> Result<(), BackendError> {
        let mut state = self.state();
        state.playing = false;
        state.stopped = true;
        Ok(())
    }


    async fn unload( &self ) -> Result<(), BackendError> {
        let mut state = self.state();
        state.unloaded = true;
        state.callback = None;
        Ok(())
    }


    async fn set_position( &self, position_ms: u64 ) -> Result<(), BackendError> {
        self.state().position_ms = position_ms;
        Ok(())
    }


    async fn set_volume( &self, volume: f32 ) -> Result<(), BackendError> {
        self.state().volumes.push( volume );
        Ok(())
    }


    async fn set_rate( &self, rate: f32, _correct_pitch: bool ) -> Result<(), BackendError> {
        self.state().rates.push( rate );
        Ok(())
    }


    fn on_status_update( &self, callback: Option<StatusCallback> ) {
        let mut state = self.state();
        if callback.is_some() {
            state.last_attached = callback.clone();
        }
        state.callback = callback;
    }
}


#[derive( Default )]
struct BackendState {
    loads: Vec<( String, LoadOptions )>,
    handles: Vec<FakeHandle>,
    failures: HashMap<String, usize>,
    gate: Option<Arc<Notify>>,
}


/// Backend that records every load and hands out [`FakeHandle`]s.
#[derive( Clone, Default )]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}


impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }


    fn state( &self ) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }


    /// Makes the next `times` loads of `url` fail.
    pub fn fail( &self, url: &str, times: usize ) {
        self.state().failures.insert( url.to_string(), times );
    }


    /// Holds every subsequent load until the returned gate is notified.
    pub fn hold_loads( &self ) -> Arc<Notify> {
        let gate = Arc::new( Notify::new() );
        self.state().gate = Some( gate.clone() );
        gate
    }


    pub fn open_gate( &self ) {
        if let Some( gate ) = self.state().gate.take() {
            gate.notify_waiters();
        }
    }


    pub fn loads( &self ) -> Vec<( String, LoadOptions )> {
        self.state().loads.clone()
    }


    pub fn load_urls( &self ) -> Vec<String> {
        self.state().loads.iter().map( |( url, _ )| url.clone() ).collect()
    }


    pub fn handle( &self, index: usize ) -> FakeHandle {
        self.state().handles[index].clone()
    }


    pub fn last_handle( &self ) -> FakeHandle {
        self.state().handles.last().cloned().expect( "no handle created yet" )
    }


    pub fn handle_count( &self ) -> usize {
        self.state().handles.len()
    }
}


#[async_trait]
impl AudioBackend for FakeBackend {
    async fn load( &self, url: &str, options: LoadOptions ) -> Result<Box<dyn AudioHandle>, BackendError> {
        let gate = {
            let mut state = self.state();
            state.loads.push(( url.to_string(), options ));
            state.gate.clone()
        };

        if let Some( gate ) = gate {
            gate.notified().await;
        }

        let mut state = self.state();
        if let Some( remaining ) = state.failures.get_mut( url ) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err( BackendError::Load {
                    url: url.to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
        }

        let handle = FakeHandle::new( url, options );
        state.handles.push( handle.clone() );
        Ok( Box::new( handle ) )
    }
}


pub fn track( id: &str ) -> Track {
    Track::new( id, format!( "file:///music/{id}.mp3" ) ).with_title( id.to_uppercase() )
}


pub fn timed_track( id: &str, duration_ms: u64 ) -> Track {
    track( id ).with_duration_ms( duration_ms )
}


pub fn url( id: &str ) -> String {
    format!( "file:///music/{id}.mp3" )
}


pub struct Harness {
    pub engine: PlaybackEngine,
    pub backend: FakeBackend,
    pub store: Arc<MemoryStore>,
    pub snapshots: Arc<Mutex<Vec<PlaybackSnapshot>>>,
}


impl Harness {
    pub fn new() -> Self {
        Self::with_store( Arc::new( MemoryStore::new() ) )
    }


    pub fn with_store( store: Arc<MemoryStore> ) -> Self {
        let backend = FakeBackend::new();
        let engine = PlaybackEngine::new( Arc::new( backend.clone() ), store.clone(), EngineConfig::default() );

        let snapshots = Arc::new( Mutex::new( Vec::new() ) );
        let sink = snapshots.clone();
        let _subscription = engine.subscribe( move |snapshot| {
            sink.lock().unwrap().push( snapshot.clone() );
        });

        Self { engine, backend, store, snapshots }
    }


    pub fn last_snapshot( &self ) -> PlaybackSnapshot {
        self.snapshots.lock().unwrap().last().cloned().expect( "nothing published" )
    }


    pub fn published( &self ) -> usize {
        self.snapshots.lock().unwrap().len()
    }
}


/// Lets spawned engine tasks run until they are all waiting on something.
///
/// Under a paused clock this advances time by one millisecond.
pub async fn settle() {
    tokio::time::sleep( Duration::from_millis( 1 ) ).await;
}
