//! Externally observable playback state

use serde::{ Serialize, Serializer };

use crate::queue::RepeatMode;
use crate::track::Track;


/// Engine lifecycle state.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize )]
#[serde( rename_all = "lowercase" )]
pub enum PlayerState {
    /// No resource loaded.
    #[default]
    Idle,
    /// A resource has been requested.
    Loading,
    Playing,
    Paused,
    /// Playing while a second resource fades in.
    Crossfading,
}


/// Complete playback state at one instant.
///
/// This is what listeners receive. `duration_ms` is never 0 so consumers can
/// divide by it.
#[derive( Debug, Clone, Serialize )]
#[serde( rename_all = "camelCase" )]
pub struct PlaybackSnapshot {
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub is_buffering: bool,
    #[serde( rename = "progress" )]
    pub progress_ms: u64,
    #[serde( rename = "duration" )]
    duration_ms: u64,
    pub queue: Vec<Track>,
    #[serde( serialize_with = "serialize_index" )]
    pub current_index: Option<usize>,
    pub repeat_mode: RepeatMode,
    pub shuffle_mode: bool,
    pub volume: f32,
    pub playback_speed: f32,
}


/// Raw fields used to build a snapshot.
#[derive( Debug, Clone, Default )]
pub struct SnapshotParts {
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub is_buffering: bool,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub queue: Vec<Track>,
    pub current_index: Option<usize>,
    pub repeat_mode: RepeatMode,
    pub shuffle_mode: bool,
    pub volume: f32,
    pub playback_speed: f32,
}


impl PlaybackSnapshot {
    /// Builds a snapshot. A zero duration is reported as 1.
    pub fn new( parts: SnapshotParts ) -> Self {
        Self {
            current_track: parts.current_track,
            is_playing: parts.is_playing,
            is_buffering: parts.is_buffering,
            progress_ms: parts.progress_ms,
            duration_ms: parts.duration_ms.max( 1 ),
            queue: parts.queue,
            current_index: parts.current_index,
            repeat_mode: parts.repeat_mode,
            shuffle_mode: parts.shuffle_mode,
            volume: parts.volume,
            playback_speed: parts.playback_speed,
        }
    }


    /// Track duration in milliseconds, at least 1.
    pub fn duration_ms( &self ) -> u64 {
        self.duration_ms
    }


    /// Fraction of the track played, in [0, 1].
    pub fn fraction_played( &self ) -> f64 {
        ( self.progress_ms as f64 / self.duration_ms as f64 ).clamp( 0.0, 1.0 )
    }
}


fn serialize_index<S: Serializer>( index: &Option<usize>, serializer: S ) -> Result<S::Ok, S::Error> {
    match index {
        Some( i ) => serializer.serialize_i64( *i as i64 ),
        None => serializer.serialize_i64( -1 ),
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_zero_duration_becomes_one() {
        let snapshot = PlaybackSnapshot::new( SnapshotParts::default() );
        assert_eq!( snapshot.duration_ms(), 1 );
    }


    #[test]
    fn test_fraction_played() {
        let snapshot = PlaybackSnapshot::new( SnapshotParts {
            progress_ms: 30_000,
            duration_ms: 120_000,
            ..SnapshotParts::default()
        });
        assert!( ( snapshot.fraction_played() - 0.25 ).abs() < f64::EPSILON );
    }


    #[test]
    fn test_payload_shape() {
        let snapshot = PlaybackSnapshot::new( SnapshotParts {
            volume: 0.5,
            playback_speed: 1.0,
            ..SnapshotParts::default()
        });
        let json = serde_json::to_value( &snapshot ).unwrap();

        assert_eq!( json[ "currentIndex" ], -1 );
        assert_eq!( json[ "duration" ], 1 );
        assert_eq!( json[ "progress" ], 0 );
        assert_eq!( json[ "repeatMode" ], "off" );
        assert_eq!( json[ "shuffleMode" ], false );
        assert!( json[ "currentTrack" ].is_null() );
    }
}
