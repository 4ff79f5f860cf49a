//! Audio output via cpal
//!
//! Handles sending decoded PCM samples to the system audio device.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get default stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Shared sample buffer between the voice thread and the audio callback.
/// Handles channel conversion between source and output.
pub struct SampleBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Volume stored as f32 bits
    volume: AtomicU32,
    source_channels: u16,
    output_channels: u16,
}


impl SampleBuffer {
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels,
            output_channels,
        }
    }


    fn lock( &self ) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Pushes samples to the buffer. Returns number of samples actually pushed.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.lock();
        let available = self.capacity.saturating_sub( buf.len() );
        let to_push = samples.len().min( available );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output`, converting channels and applying volume. Missing
    /// samples are written as silence. Returns the number of samples written.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        if self.paused.load( Ordering::Relaxed ) {
            output.fill( 0.0 );
            return 0;
        }

        let volume = f32::from_bits( self.volume.load( Ordering::Relaxed ) );
        let mut buf = self.lock();
        let src_ch = usize::from( self.source_channels.max( 1 ) );
        let out_ch = usize::from( self.output_channels.max( 1 ) );

        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
        let mut frame = Vec::with_capacity( src_ch );

        for i in 0..frames {
            frame.clear();
            frame.extend( buf.drain( ..src_ch ) );

            let out = &mut output[ i * out_ch..( i + 1 ) * out_ch ];
            if src_ch == out_ch {
                out.copy_from_slice( &frame );
            } else if out_ch == 1 {
                // Mix down
                out[0] = frame.iter().sum::<f32>() / src_ch as f32;
            } else {
                // Duplicate the last channel if output has more channels
                for ( ch, sample ) in out.iter_mut().enumerate() {
                    *sample = frame[ ch.min( src_ch - 1 ) ];
                }
            }
        }

        let written = frames * out_ch;
        output[ written.. ].fill( 0.0 );

        if volume != 1.0 {
            for sample in output[ ..written ].iter_mut() {
                *sample *= volume;
            }
        }

        written
    }


    pub fn len( &self ) -> usize {
        self.lock().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.lock().is_empty()
    }


    pub fn clear( &self ) {
        self.lock().clear();
    }


    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the volume level (0.0 = mute, 1.0 = normal).
    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }
}


/// Audio output handler.
///
/// Not Send because of `cpal::Stream`; the voice thread that creates it
/// owns it until the voice ends.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Opens the default device, preferring a config at the source sample
    /// rate. Returns the output and the buffer that feeds it.
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or( OutputError::NoDevice )?;

        tracing::debug!( "Using output device: {:?}", device.name() );

        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate && c.max_sample_rate().0 >= source_sample_rate
        };

        // Priority: exact match, then same sample rate with any channels, then
        // the device default (the resampler covers the difference).
        let config = if let Some( supported ) = supported_configs.iter()
            .find( |c| c.channels() == source_channels && supports_rate( c ) )
        {
            supported.clone().with_sample_rate( cpal::SampleRate( source_sample_rate ) ).config()
        } else if let Some( supported ) = supported_configs.iter().find( |c| supports_rate( c ) ) {
            supported.clone().with_sample_rate( cpal::SampleRate( source_sample_rate ) ).config()
        } else {
            device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
                .config()
        };

        tracing::debug!( "Audio output config: {} Hz, {} channels", config.sample_rate.0, config.channels );

        // About 500ms of source audio
        let capacity = source_sample_rate as usize * usize::from( source_channels ) / 2;
        let sample_buffer = Arc::new( SampleBuffer::new( capacity, source_channels, config.channels ) );
        let callback_buffer = Arc::clone( &sample_buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_buffer.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok(( Self { stream, sample_rate: config.sample_rate.0 }, sample_buffer ))
    }


    /// Starts audio output.
    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream.play().map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Gets the actual sample rate.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let buffer = SampleBuffer::new( 4, 2, 2 );
        assert_eq!( buffer.push( &[0.1; 6] ), 4 );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_pop_applies_volume_and_pads_silence() {
        let buffer = SampleBuffer::new( 16, 2, 2 );
        buffer.push( &[1.0, 1.0] );
        buffer.set_volume( 0.5 );

        let mut out = [9.0; 4];
        assert_eq!( buffer.pop( &mut out ), 2 );
        assert_eq!( out, [0.5, 0.5, 0.0, 0.0] );
    }


    #[test]
    fn test_mono_to_stereo() {
        let buffer = SampleBuffer::new( 16, 1, 2 );
        buffer.push( &[0.25, 0.75] );

        let mut out = [0.0; 4];
        buffer.pop( &mut out );
        assert_eq!( out, [0.25, 0.25, 0.75, 0.75] );
    }


    #[test]
    fn test_stereo_to_mono() {
        let buffer = SampleBuffer::new( 16, 2, 1 );
        buffer.push( &[0.2, 0.4] );

        let mut out = [0.0; 1];
        buffer.pop( &mut out );
        assert!( ( out[0] - 0.3 ).abs() < 1e-6 );
    }


    #[test]
    fn test_paused_outputs_silence() {
        let buffer = SampleBuffer::new( 16, 2, 2 );
        buffer.push( &[1.0; 4] );
        buffer.set_paused( true );

        let mut out = [9.0; 4];
        assert_eq!( buffer.pop( &mut out ), 0 );
        assert_eq!( out, [0.0; 4] );
        assert_eq!( buffer.len(), 4 );
    }
}
