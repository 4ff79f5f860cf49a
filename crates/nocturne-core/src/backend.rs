//! Audio resource backend contract
//!
//! The platform supplies the component that actually decodes and outputs
//! audio. The engine only asks it to load a URI and then drives the returned
//! handle. Handles report progress through a status callback.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;


/// Errors reported by a backend or one of its handles.
#[derive( Debug, Clone, Error )]
pub enum BackendError {
    #[error( "Failed to load {url}: {reason}" )]
    Load { url: String, reason: String },

    #[error( "Unsupported URI: {0}" )]
    UnsupportedUri( String ),

    #[error( "Resource already released" )]
    Released,

    #[error( "Backend error: {0}" )]
    Other( String ),
}


/// Options applied when a resource is created.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct LoadOptions {
    /// Start playing as soon as the resource is ready.
    pub should_play: bool,
    pub volume: f32,
    pub rate: f32,
    pub looping: bool,
}


impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            should_play: true,
            volume: 1.0,
            rate: 1.0,
            looping: false,
        }
    }
}


/// One status tick from a resource.
#[derive( Debug, Clone, Default, PartialEq )]
pub struct PlaybackStatus {
    pub is_loaded: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub is_playing: bool,
    pub is_buffering: bool,
    /// Set on the single tick that follows reaching the end.
    pub did_just_finish: bool,
    pub is_looping: bool,
    pub error: Option<String>,
}


/// Receives status ticks. May be called from any thread.
pub type StatusCallback = Arc<dyn Fn( PlaybackStatus ) + Send + Sync>;


/// Creates playable resources.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn load( &self, url: &str, options: LoadOptions ) -> Result<Box<dyn AudioHandle>, BackendError>;
}


/// A loaded, controllable audio resource.
#[async_trait]
pub trait AudioHandle: Send + Sync {
    async fn play( &self ) -> Result<(), BackendError>;

    async fn pause( &self ) -> Result<(), BackendError>;

    async fn stop( &self ) -> Result<(), BackendError>;

    /// Releases the resource. No status ticks are delivered afterwards.
    async fn unload( &self ) -> Result<(), BackendError>;

    async fn set_position( &self, position_ms: u64 ) -> Result<(), BackendError>;

    async fn set_volume( &self, volume: f32 ) -> Result<(), BackendError>;

    async fn set_rate( &self, rate: f32, correct_pitch: bool ) -> Result<(), BackendError>;

    /// Installs or, with `None`, removes the status callback.
    fn on_status_update( &self, callback: Option<StatusCallback> );
}
