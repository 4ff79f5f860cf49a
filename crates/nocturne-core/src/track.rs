//! Track records
//!
//! A track is a fully resolved, playable unit of audio. Resolution of the
//! stream URL happens outside the engine.

use serde::{ Deserialize, Serialize };


/// A playable track with metadata and a resolved media URI.
///
/// Tracks are compared by `id`. The `retried` marker is per instance and is
/// never serialized.
#[derive( Debug, Clone, Default, Serialize, Deserialize )]
pub struct Track {
    pub id: String,

    #[serde( default )]
    pub title: String,

    #[serde( default )]
    pub artist: String,

    #[serde( rename = "artwork", default )]
    pub artwork_uri: String,

    #[serde( rename = "url" )]
    pub stream_url: String,

    /// Duration hint in milliseconds. The loaded resource is authoritative.
    #[serde( rename = "duration", default, skip_serializing_if = "Option::is_none" )]
    pub duration_ms: Option<u64>,

    #[serde( skip )]
    pub(crate) retried: bool,
}


impl Track {
    /// Creates a track with the given id and stream URL.
    pub fn new( id: impl Into<String>, stream_url: impl Into<String> ) -> Self {
        Self {
            id: id.into(),
            stream_url: stream_url.into(),
            ..Self::default()
        }
    }


    /// Sets the title.
    pub fn with_title( mut self, title: impl Into<String> ) -> Self {
        self.title = title.into();
        self
    }


    /// Sets the artist.
    pub fn with_artist( mut self, artist: impl Into<String> ) -> Self {
        self.artist = artist.into();
        self
    }


    /// Sets the artwork URI.
    pub fn with_artwork( mut self, artwork_uri: impl Into<String> ) -> Self {
        self.artwork_uri = artwork_uri.into();
        self
    }


    /// Sets the duration hint.
    pub fn with_duration_ms( mut self, duration_ms: u64 ) -> Self {
        self.duration_ms = Some( duration_ms );
        self
    }


    /// Returns true once an automatic retry has been spent on this instance.
    pub fn is_retried( &self ) -> bool {
        self.retried
    }


    /// Returns a label suitable for log lines.
    pub fn label( &self ) -> &str {
        if self.title.is_empty() { &self.id } else { &self.title }
    }
}


impl PartialEq for Track {
    fn eq( &self, other: &Self ) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_json_shape() {
        let track = Track::new( "a1", "https://cdn.example/a1.mp3" )
            .with_title( "Intro" )
            .with_artist( "Band" )
            .with_artwork( "https://cdn.example/a1.jpg" );

        let json = serde_json::to_value( &track ).unwrap();
        assert_eq!( json[ "id" ], "a1" );
        assert_eq!( json[ "url" ], "https://cdn.example/a1.mp3" );
        assert_eq!( json[ "artwork" ], "https://cdn.example/a1.jpg" );
        assert!( json.get( "duration" ).is_none() );
        assert!( json.get( "retried" ).is_none() );
    }


    #[test]
    fn test_retried_marker_not_restored() {
        let mut track = Track::new( "a1", "file:///a1.flac" ).with_duration_ms( 1000 );
        track.retried = true;

        let json = serde_json::to_string( &track ).unwrap();
        let back: Track = serde_json::from_str( &json ).unwrap();
        assert!( !back.is_retried() );
        assert_eq!( back.duration_ms, Some( 1000 ) );
    }


    #[test]
    fn test_equality_is_by_id() {
        let a = Track::new( "x", "file:///one.mp3" ).with_title( "One" );
        let b = Track::new( "x", "file:///two.mp3" ).with_title( "Two" );
        assert_eq!( a, b );
    }


    #[test]
    fn test_label_falls_back_to_id() {
        assert_eq!( Track::new( "x", "u" ).label(), "x" );
        assert_eq!( Track::new( "x", "u" ).with_title( "T" ).label(), "T" );
    }
}
