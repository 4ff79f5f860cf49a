//! Audio decoding via Symphonia
//!
//! Handles decoding of various audio formats into interleaved f32 samples.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::formats::{ FormatOptions, FormatReader, SeekMode, SeekTo };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::{ MetadataOptions, StandardTagKey, Tag };
use symphonia::core::probe::{ Hint, ProbedMetadata };
use symphonia::core::units::Time;
use thiserror::Error;


/// Tags used to label queued tracks.
#[derive( Debug, Clone, Default, PartialEq )]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
}


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Seek error: {0}" )]
    Seek( String ),
}


/// Audio decoder wrapper around Symphonia.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    sample_buf: Option<SampleBuffer<f32>>,
    duration_ms: Option<u64>,
    probe_metadata: ProbedMetadata,
}


impl Decoder {
    /// Opens an audio file for decoding.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions { buffer_len: 64 * 1024 } );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;

        let probe_metadata = probed.metadata;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );
        let duration_ms = codec_params.n_frames.map( |frames| frames * 1000 / u64::from( sample_rate ) );

        tracing::debug!(
            "Opened audio: {} Hz, {} channels, duration: {:?} ms",
            sample_rate,
            channels,
            duration_ms
        );

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
            duration_ms,
            probe_metadata,
        })
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Returns the duration in milliseconds, if known.
    pub fn duration_ms( &self ) -> Option<u64> {
        self.duration_ms
    }


    /// Reads title and artist from container and probe tags.
    pub fn tags( &mut self ) -> TrackTags {
        let mut tags = TrackTags::default();

        let extract = |tags: &mut TrackTags, found: &[Tag]| {
            for tag in found {
                match tag.std_key {
                    Some( StandardTagKey::TrackTitle ) if tags.title.is_none() => {
                        tags.title = Some( tag.value.to_string() );
                    }
                    Some( StandardTagKey::Artist ) if tags.artist.is_none() => {
                        tags.artist = Some( tag.value.to_string() );
                    }
                    _ => {}
                }
            }
        };

        if let Some( log ) = self.probe_metadata.get() {
            if let Some( revision ) = log.current() {
                extract( &mut tags, revision.tags() );
            }
        }

        if let Some( revision ) = self.format_reader.metadata().current() {
            extract( &mut tags, revision.tags() );
        }

        tags
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when EOF is reached.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( symphonia::core::errors::Error::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                // Recoverable; skip the packet
                Err( symphonia::core::errors::Error::DecodeError( _ ) ) => continue,
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();

            if self.sample_buf.as_ref().map_or( true, |buf| buf.capacity() < num_frames ) {
                self.sample_buf = Some( SampleBuffer::new( num_frames as u64, spec ) );
            }

            if let Some( sample_buf ) = self.sample_buf.as_mut() {
                sample_buf.copy_interleaved_ref( decoded );
                return Ok( Some( sample_buf.samples().to_vec() ) );
            }
        }
    }


    /// Seeks to a position in milliseconds.
    pub fn seek( &mut self, position_ms: u64 ) -> Result<(), DecoderError> {
        let seek_to = SeekTo::Time {
            time: Time::from( position_ms as f64 / 1000.0 ),
            track_id: Some( self.track_id ),
        };

        self.format_reader
            .seek( SeekMode::Accurate, seek_to )
            .map_err( |e| DecoderError::Seek( e.to_string() ) )?;

        self.decoder.reset();
        Ok(())
    }
}
