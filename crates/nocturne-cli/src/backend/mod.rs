//! Local audio backend
//!
//! Plays `file://` URIs and bare paths through Symphonia and cpal. Every
//! loaded resource runs on its own voice thread; a ticker task turns the
//! voice's progress into status callbacks.

mod decoder;
mod output;
mod voice;

pub use decoder::Decoder;

use std::path::PathBuf;
use std::sync::mpsc::{ self, Sender };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use nocturne_core::{ AudioBackend, AudioHandle, BackendError, LoadOptions, PlaybackStatus, StatusCallback };

use voice::{ VoiceCommand, VoiceInfo, VoiceShared };


/// How often a handle reports its status.
const STATUS_INTERVAL: Duration = Duration::from_millis( 250 );


fn lock<T>( mutex: &Mutex<T> ) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else( PoisonError::into_inner )
}


/// Resolves a URI to a local path. Only `file://` URIs and plain paths are
/// playable.
pub fn local_path( url: &str ) -> Result<PathBuf, BackendError> {
    if let Some( path ) = url.strip_prefix( "file://" ) {
        return Ok( PathBuf::from( path ) );
    }
    if url.contains( "://" ) {
        return Err( BackendError::UnsupportedUri( url.to_string() ) );
    }
    Ok( PathBuf::from( url ) )
}


/// Backend that decodes local files and plays them on the default device.
#[derive( Debug, Default, Clone )]
pub struct LocalBackend;


impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}


#[async_trait]
impl AudioBackend for LocalBackend {
    async fn load( &self, url: &str, options: LoadOptions ) -> Result<Box<dyn AudioHandle>, BackendError> {
        let path = local_path( url )?;
        tracing::debug!( "Loading {}", path.display() );

        let shared = Arc::new( VoiceShared::default() );
        let ( commands, receiver ) = mpsc::channel();
        let ( thread, ready ) = voice::spawn( path, options, Arc::clone( &shared ), receiver );

        let info = match ready.await {
            Ok( Ok( info ) ) => info,
            Ok( Err( reason ) ) => {
                return Err( BackendError::Load { url: url.to_string(), reason } );
            }
            Err( _ ) => {
                return Err( BackendError::Load {
                    url: url.to_string(),
                    reason: "voice thread exited during load".into(),
                });
            }
        };

        Ok( Box::new( LocalHandle::start( info, shared, commands, thread ) ) )
    }
}


/// A resource playing on a voice thread.
pub struct LocalHandle {
    commands: Mutex<Option<Sender<VoiceCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    callback: Arc<Mutex<Option<StatusCallback>>>,
    ticker: CancellationToken,
}


impl LocalHandle {
    fn start(
        info: VoiceInfo,
        shared: Arc<VoiceShared>,
        commands: Sender<VoiceCommand>,
        thread: JoinHandle<()>,
    ) -> Self {
        let callback: Arc<Mutex<Option<StatusCallback>>> = Arc::new( Mutex::new( None ) );
        let ticker = CancellationToken::new();

        tokio::spawn( status_ticker( info, shared, Arc::clone( &callback ), ticker.clone() ) );

        Self {
            commands: Mutex::new( Some( commands ) ),
            thread: Mutex::new( Some( thread ) ),
            callback,
            ticker,
        }
    }


    fn send( &self, command: VoiceCommand ) -> Result<(), BackendError> {
        let commands = lock( &self.commands );
        let sender = commands.as_ref().ok_or( BackendError::Released )?;
        sender.send( command ).map_err( |_| BackendError::Released )
    }
}


#[async_trait]
impl AudioHandle for LocalHandle {
    async fn play( &self ) -> Result<(), BackendError> {
        self.send( VoiceCommand::Play )
    }


    async fn pause( &self ) -> Result<(), BackendError> {
        self.send( VoiceCommand::Pause )
    }


    async fn stop( &self ) -> Result<(), BackendError> {
        self.send( VoiceCommand::Pause )?;
        self.send( VoiceCommand::Seek( 0 ) )
    }


    async fn unload( &self ) -> Result<(), BackendError> {
        self.ticker.cancel();
        *lock( &self.callback ) = None;

        let sender = lock( &self.commands ).take();
        let Some( sender ) = sender else {
            return Err( BackendError::Released );
        };
        let _ = sender.send( VoiceCommand::Shutdown );
        drop( sender );

        let thread = lock( &self.thread ).take();
        if let Some( thread ) = thread {
            let joined = tokio::task::spawn_blocking( move || thread.join() ).await;
            if !matches!( joined, Ok( Ok( () ) ) ) {
                tracing::warn!( "Voice thread did not shut down cleanly" );
            }
        }
        Ok(())
    }


    async fn set_position( &self, position_ms: u64 ) -> Result<(), BackendError> {
        self.send( VoiceCommand::Seek( position_ms ) )
    }


    async fn set_volume( &self, volume: f32 ) -> Result<(), BackendError> {
        self.send( VoiceCommand::Volume( volume.clamp( 0.0, 1.0 ) ) )
    }


    /// Speed is applied by resampling, so pitch always follows the rate.
    async fn set_rate( &self, rate: f32, _correct_pitch: bool ) -> Result<(), BackendError> {
        self.send( VoiceCommand::Rate( rate ) )
    }


    fn on_status_update( &self, callback: Option<StatusCallback> ) {
        *lock( &self.callback ) = callback;
    }
}


impl Drop for LocalHandle {
    fn drop( &mut self ) {
        self.ticker.cancel();
        if let Some( sender ) = lock( &self.commands ).take() {
            let _ = sender.send( VoiceCommand::Shutdown );
        }
    }
}


/// Reports the voice's progress until cancelled.
async fn status_ticker(
    info: VoiceInfo,
    shared: Arc<VoiceShared>,
    callback: Arc<Mutex<Option<StatusCallback>>>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval( STATUS_INTERVAL );

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some( callback ) = lock( &callback ).clone() else {
            continue;
        };

        let position_ms = shared.frames_played() * 1000 / u64::from( info.sample_rate.max( 1 ) );
        let position_ms = match info.duration_ms {
            Some( duration ) => position_ms.min( duration ),
            None => position_ms,
        };

        callback( PlaybackStatus {
            is_loaded: true,
            position_ms,
            duration_ms: info.duration_ms,
            is_playing: shared.is_playing(),
            is_buffering: false,
            did_just_finish: shared.take_finished(),
            is_looping: shared.is_looping(),
            error: shared.take_error(),
        });
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_local_path_strips_file_scheme() {
        assert_eq!( local_path( "file:///music/a.mp3" ).unwrap(), PathBuf::from( "/music/a.mp3" ) );
        assert_eq!( local_path( "/music/b.flac" ).unwrap(), PathBuf::from( "/music/b.flac" ) );
    }


    #[test]
    fn test_local_path_rejects_remote() {
        assert!( matches!( local_path( "https://example.com/a.mp3" ), Err( BackendError::UnsupportedUri( _ ) ) ) );
    }


    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let backend = LocalBackend::new();
        let result = backend.load( "file:///definitely/not/here.mp3", LoadOptions::default() ).await;
        assert!( matches!( result, Err( BackendError::Load { .. } ) ) );
    }
}
