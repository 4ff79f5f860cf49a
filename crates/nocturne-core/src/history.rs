//! Playback history
//!
//! Bounded, most-recent-first log of played tracks, deduplicated by id.

use std::collections::VecDeque;

use crate::track::Track;


/// Default number of entries kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;


/// Most-recent-first track history.
#[derive( Debug, Clone )]
pub struct History {
    tracks: VecDeque<Track>,
    limit: usize,
}


impl History {
    /// Creates an empty history holding at most `limit` entries.
    pub fn new( limit: usize ) -> Self {
        Self {
            tracks: VecDeque::with_capacity( limit ),
            limit,
        }
    }


    /// Rebuilds a history from stored entries (most recent first).
    ///
    /// Duplicates are dropped keeping the most recent occurrence and the
    /// result is truncated to `limit`.
    pub fn from_entries( entries: Vec<Track>, limit: usize ) -> Self {
        let mut history = Self::new( limit );
        for track in entries.into_iter().rev() {
            history.push( track );
        }
        history
    }


    /// Records a play. Any older entry with the same id is removed first.
    pub fn push( &mut self, track: Track ) {
        self.tracks.retain( |t| t.id != track.id );
        self.tracks.push_front( track );
        self.tracks.truncate( self.limit );
    }


    /// Most recent entry.
    pub fn latest( &self ) -> Option<&Track> {
        self.tracks.front()
    }


    /// Iterates entries, most recent first.
    pub fn iter( &self ) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }


    /// Clones the entries into a vector, most recent first.
    pub fn to_vec( &self ) -> Vec<Track> {
        self.tracks.iter().cloned().collect()
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    pub fn limit( &self ) -> usize {
        self.limit
    }


    pub fn clear( &mut self ) {
        self.tracks.clear();
    }
}


impl Default for History {
    fn default() -> Self {
        Self::new( DEFAULT_HISTORY_LIMIT )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn track( id: &str ) -> Track {
        Track::new( id, format!( "file:///music/{}.mp3", id ) )
    }


    fn ids( history: &History ) -> Vec<String> {
        history.iter().map( |t| t.id.clone() ).collect()
    }


    #[test]
    fn test_most_recent_first() {
        let mut history = History::default();
        history.push( track( "a" ) );
        history.push( track( "b" ) );
        history.push( track( "c" ) );

        assert_eq!( ids( &history ), vec![ "c", "b", "a" ] );
        assert_eq!( history.latest().map( |t| t.id.as_str() ), Some( "c" ) );
    }


    #[test]
    fn test_replay_moves_to_front() {
        let mut history = History::default();
        history.push( track( "a" ) );
        history.push( track( "b" ) );
        history.push( track( "a" ) );

        assert_eq!( ids( &history ), vec![ "a", "b" ] );
    }


    #[test]
    fn test_evicts_from_tail() {
        let mut history = History::new( 3 );
        for id in [ "a", "b", "c", "d" ] {
            history.push( track( id ) );
        }

        assert_eq!( history.len(), 3 );
        assert_eq!( ids( &history ), vec![ "d", "c", "b" ] );
    }


    #[test]
    fn test_default_limit_is_fifty() {
        let mut history = History::default();
        for i in 0..75 {
            history.push( track( &i.to_string() ) );
        }

        assert_eq!( history.len(), 50 );
        assert_eq!( history.latest().map( |t| t.id.as_str() ), Some( "74" ) );
    }


    #[test]
    fn test_from_entries_keeps_order_and_dedups() {
        let stored = vec![ track( "c" ), track( "b" ), track( "c" ), track( "a" ) ];
        let history = History::from_entries( stored, 50 );

        assert_eq!( ids( &history ), vec![ "c", "b", "a" ] );
    }
}
