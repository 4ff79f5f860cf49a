//! Voice thread
//!
//! Each loaded resource owns one thread that holds the decoder, the cpal
//! stream and the resampler. The thread is driven by `VoiceCommand`s and
//! publishes its progress through `VoiceShared`.

use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::mpsc::{ Receiver, RecvTimeoutError, TryRecvError };
use std::sync::{ Arc, Mutex, PoisonError };
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use tokio::sync::oneshot;

use nocturne_core::LoadOptions;

use super::decoder::Decoder;
use super::output::{ AudioOutput, SampleBuffer };


/// Output chunk size handed to the resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Largest speed change allowed relative to 1.0 in either direction.
const MAX_RATE_FACTOR: f64 = 2.0;


/// Commands sent to a voice thread.
#[derive( Debug, Clone, Copy, PartialEq )]
pub enum VoiceCommand {
    Play,
    Pause,
    Seek( u64 ),
    Volume( f32 ),
    Rate( f32 ),
    Shutdown,
}


/// State shared between a voice thread and its handle.
#[derive( Debug, Default )]
pub struct VoiceShared {
    frames_played: AtomicU64,
    playing: AtomicBool,
    finished: AtomicBool,
    looping: AtomicBool,
    error: Mutex<Option<String>>,
}


impl VoiceShared {
    pub fn frames_played( &self ) -> u64 {
        self.frames_played.load( Ordering::Relaxed )
    }


    pub fn is_playing( &self ) -> bool {
        self.playing.load( Ordering::Relaxed )
    }


    pub fn is_looping( &self ) -> bool {
        self.looping.load( Ordering::Relaxed )
    }


    /// Returns true once after the voice reaches the end.
    pub fn take_finished( &self ) -> bool {
        self.finished.swap( false, Ordering::Relaxed )
    }


    pub fn take_error( &self ) -> Option<String> {
        self.error.lock().unwrap_or_else( PoisonError::into_inner ).take()
    }


    fn fail( &self, reason: String ) {
        self.playing.store( false, Ordering::Relaxed );
        *self.error.lock().unwrap_or_else( PoisonError::into_inner ) = Some( reason );
    }
}


/// Properties of an opened source.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct VoiceInfo {
    pub sample_rate: u32,
    pub duration_ms: Option<u64>,
}


/// Spawns a voice thread for `path`. Resolves once the file is open and the
/// output is running, or with the reason it could not be.
pub fn spawn(
    path: PathBuf,
    options: LoadOptions,
    shared: Arc<VoiceShared>,
    commands: Receiver<VoiceCommand>,
) -> ( thread::JoinHandle<()>, oneshot::Receiver<Result<VoiceInfo, String>> ) {
    let ( ready_tx, ready_rx ) = oneshot::channel();

    let thread = thread::spawn( move || {
        let mut voice = match Voice::open( &path, options, shared ) {
            Ok( voice ) => voice,
            Err( reason ) => {
                let _ = ready_tx.send( Err( reason ) );
                return;
            }
        };

        // Keeps the stream alive for the life of the thread
        let _output = match voice.start_output() {
            Ok( output ) => output,
            Err( reason ) => {
                let _ = ready_tx.send( Err( reason ) );
                return;
            }
        };

        if ready_tx.send( Ok( voice.info() ) ).is_err() {
            tracing::debug!( "Voice for {} abandoned before it was ready", path.display() );
            return;
        }

        voice.run( commands );
        tracing::debug!( "Voice for {} ended", path.display() );
    });

    ( thread, ready_rx )
}


/// Where the decode loop is in the source.
#[derive( Debug, Clone, Copy, PartialEq )]
enum Phase {
    Decoding,
    /// Source exhausted; waiting for the output to play what is buffered.
    Draining,
    Ended,
}


struct Voice {
    decoder: Decoder,
    shared: Arc<VoiceShared>,
    options: LoadOptions,
    channels: usize,
    source_rate: u32,
    target_rate: u32,
    buffer: Option<Arc<SampleBuffer>>,
    resampler: Option<FastFixedOut<f32>>,
    /// Planar samples waiting for the resampler
    resample_input: Vec<Vec<f32>>,
    phase: Phase,
}


impl Voice {
    fn open( path: &Path, options: LoadOptions, shared: Arc<VoiceShared> ) -> Result<Self, String> {
        let decoder = Decoder::open( path ).map_err( |e| e.to_string() )?;
        let channels = decoder.channels().max( 1 );
        let source_rate = decoder.sample_rate();

        shared.looping.store( options.looping, Ordering::Relaxed );

        Ok( Self {
            decoder,
            shared,
            options,
            channels,
            source_rate,
            target_rate: source_rate,
            buffer: None,
            resampler: None,
            resample_input: ( 0..channels ).map( |_| Vec::new() ).collect(),
            phase: Phase::Decoding,
        })
    }


    fn info( &self ) -> VoiceInfo {
        VoiceInfo {
            sample_rate: self.source_rate,
            duration_ms: self.decoder.duration_ms(),
        }
    }


    /// Opens the device and the resampler. The returned output must outlive
    /// the decode loop.
    fn start_output( &mut self ) -> Result<AudioOutput, String> {
        let channels = u16::try_from( self.channels ).map_err( |e| e.to_string() )?;
        let ( output, buffer ) = AudioOutput::new( self.source_rate, channels ).map_err( |e| e.to_string() )?;
        self.target_rate = output.sample_rate();

        // Created at 1.0 so any speed within MAX_RATE_FACTOR can be reached later
        let mut resampler = FastFixedOut::<f32>::new(
            self.base_ratio(),
            MAX_RATE_FACTOR,
            PolynomialDegree::Cubic,
            RESAMPLE_CHUNK,
            self.channels,
        ).map_err( |e| format!( "Failed to create resampler: {}", e ) )?;

        if self.options.rate != 1.0 {
            let ratio = self.base_ratio() / f64::from( self.options.rate );
            resampler.set_resample_ratio( ratio, false ).map_err( |e| e.to_string() )?;
        }

        tracing::debug!(
            "Voice output: {} Hz -> {} Hz at {}x",
            self.source_rate,
            self.target_rate,
            self.options.rate
        );

        buffer.set_volume( self.options.volume );
        buffer.set_paused( !self.options.should_play );
        self.shared.playing.store( self.options.should_play, Ordering::Relaxed );

        output.play().map_err( |e| e.to_string() )?;

        self.buffer = Some( buffer );
        self.resampler = Some( resampler );
        Ok( output )
    }


    fn base_ratio( &self ) -> f64 {
        f64::from( self.target_rate ) / f64::from( self.source_rate )
    }


    fn run( &mut self, commands: Receiver<VoiceCommand> ) {
        let Some( buffer ) = self.buffer.clone() else {
            return;
        };

        loop {
            // Block briefly when there is nothing to decode
            let idle = buffer.is_paused() || self.phase == Phase::Ended;
            let command = if idle {
                match commands.recv_timeout( Duration::from_millis( 10 ) ) {
                    Ok( command ) => Some( command ),
                    Err( RecvTimeoutError::Timeout ) => None,
                    Err( RecvTimeoutError::Disconnected ) => break,
                }
            } else {
                match commands.try_recv() {
                    Ok( command ) => Some( command ),
                    Err( TryRecvError::Empty ) => None,
                    Err( TryRecvError::Disconnected ) => break,
                }
            };

            if let Some( command ) = command {
                if !self.apply( command, &buffer ) {
                    break;
                }
                continue;
            }

            if idle {
                continue;
            }

            match self.phase {
                Phase::Decoding => self.decode_step( &buffer ),
                Phase::Draining => {
                    if buffer.is_empty() {
                        self.finish( &buffer );
                    } else {
                        thread::sleep( Duration::from_millis( 10 ) );
                    }
                }
                Phase::Ended => {}
            }
        }

        buffer.set_paused( true );
        buffer.clear();
        self.shared.playing.store( false, Ordering::Relaxed );
    }


    /// Applies one command. Returns false when the voice should end.
    fn apply( &mut self, command: VoiceCommand, buffer: &SampleBuffer ) -> bool {
        match command {
            VoiceCommand::Play => {
                if self.phase == Phase::Ended {
                    self.seek( 0, buffer );
                }
                buffer.set_paused( false );
                self.shared.playing.store( true, Ordering::Relaxed );
            }
            VoiceCommand::Pause => {
                buffer.set_paused( true );
                self.shared.playing.store( false, Ordering::Relaxed );
            }
            VoiceCommand::Seek( position_ms ) => self.seek( position_ms, buffer ),
            VoiceCommand::Volume( volume ) => buffer.set_volume( volume ),
            VoiceCommand::Rate( rate ) => {
                let ratio = self.base_ratio() / f64::from( rate );
                if let Some( resampler ) = self.resampler.as_mut() {
                    if let Err( e ) = resampler.set_resample_ratio( ratio, true ) {
                        tracing::warn!( "Failed to change rate to {}: {}", rate, e );
                    }
                }
            }
            VoiceCommand::Shutdown => return false,
        }
        true
    }


    fn seek( &mut self, position_ms: u64, buffer: &SampleBuffer ) {
        if let Err( e ) = self.decoder.seek( position_ms ) {
            tracing::warn!( "Seek to {} ms failed: {}", position_ms, e );
            return;
        }

        buffer.clear();
        for channel in &mut self.resample_input {
            channel.clear();
        }
        if let Some( resampler ) = self.resampler.as_mut() {
            resampler.reset();
        }

        let frames = position_ms * u64::from( self.source_rate ) / 1000;
        self.shared.frames_played.store( frames, Ordering::Relaxed );
        self.phase = Phase::Decoding;
    }


    fn decode_step( &mut self, buffer: &SampleBuffer ) {
        // Don't decode too far ahead - keep about 50ms buffered
        let target_buffer = ( self.target_rate as usize * self.channels ) / 20;
        if buffer.len() > target_buffer {
            thread::sleep( Duration::from_millis( 5 ) );
            return;
        }

        match self.decoder.decode_next() {
            Ok( Some( samples ) ) => {
                // Position is tracked in source frames, before resampling
                let source_frames = samples.len() / self.channels;
                self.shared.frames_played.fetch_add( source_frames as u64, Ordering::Relaxed );

                for frame in samples.chunks( self.channels ) {
                    for ( channel, sample ) in self.resample_input.iter_mut().zip( frame ) {
                        channel.push( *sample );
                    }
                }

                let resampled = self.resample( false );
                push_all( buffer, &resampled );
            }
            Ok( None ) => {
                let resampled = self.resample( true );
                push_all( buffer, &resampled );

                if self.shared.is_looping() {
                    tracing::debug!( "Voice looping to start" );
                    self.seek( 0, buffer );
                } else {
                    self.phase = Phase::Draining;
                }
            }
            Err( e ) => {
                tracing::error!( "Decode error: {}", e );
                self.shared.fail( e.to_string() );
                buffer.set_paused( true );
                self.phase = Phase::Ended;
            }
        }
    }


    /// Runs every full chunk through the resampler, and with `flush` the
    /// remainder too. Returns interleaved output samples.
    fn resample( &mut self, flush: bool ) -> Vec<f32> {
        let Some( resampler ) = self.resampler.as_mut() else {
            return Vec::new();
        };

        let mut output = Vec::new();
        while self.resample_input[ 0 ].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self.resample_input
                .iter_mut()
                .map( |channel| channel.drain( ..needed ).collect() )
                .collect();

            match resampler.process( &chunk, None ) {
                Ok( resampled ) => output.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    return output;
                }
            }
        }

        if flush && !self.resample_input[ 0 ].is_empty() {
            match resampler.process_partial( Some( self.resample_input.as_slice() ), None ) {
                Ok( resampled ) => output.extend( interleave( &resampled ) ),
                Err( e ) => tracing::error!( "Final resample error: {}", e ),
            }
            for channel in &mut self.resample_input {
                channel.clear();
            }
        }

        output
    }


    fn finish( &mut self, buffer: &SampleBuffer ) {
        tracing::info!( "Voice reached end of source" );
        buffer.set_paused( true );
        self.phase = Phase::Ended;
        self.shared.playing.store( false, Ordering::Relaxed );
        self.shared.finished.store( true, Ordering::Relaxed );
    }
}


/// Pushes every sample, waiting while the output buffer is full.
fn push_all( buffer: &SampleBuffer, samples: &[f32] ) {
    let mut offset = 0;
    while offset < samples.len() {
        let pushed = buffer.push( &samples[ offset.. ] );
        offset += pushed;
        if pushed == 0 {
            if buffer.is_paused() {
                return;
            }
            thread::sleep( Duration::from_millis( 5 ) );
        }
    }
}


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    let Some( frames ) = channels.first().map( Vec::len ) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for channel in channels {
            out.push( channel[ f ] );
        }
    }
    out
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ 3.0, 4.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, 3.0, 2.0, 4.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_take_finished_fires_once() {
        let shared = VoiceShared::default();
        shared.finished.store( true, Ordering::Relaxed );
        assert!( shared.take_finished() );
        assert!( !shared.take_finished() );
    }


    #[test]
    fn test_fail_records_error_and_stops() {
        let shared = VoiceShared::default();
        shared.playing.store( true, Ordering::Relaxed );
        shared.fail( "bad packet".into() );
        assert!( !shared.is_playing() );
        assert_eq!( shared.take_error().as_deref(), Some( "bad packet" ) );
        assert_eq!( shared.take_error(), None );
    }
}
