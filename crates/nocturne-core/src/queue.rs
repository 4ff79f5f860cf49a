//! Play queue management
//!
//! Handles track ordering, the current-track pointer, shuffle, repeat and
//! playback history. Pure data: nothing here touches audio or storage.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{ Deserialize, Serialize };

use crate::history::{ History, DEFAULT_HISTORY_LIMIT };
use crate::track::Track;


/// Repeat mode for the queue.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
#[serde( rename_all = "lowercase" )]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}


impl RepeatMode {
    /// Returns the mode that follows this one in the Off → One → All cycle.
    pub fn cycled( self ) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
            RepeatMode::All => RepeatMode::Off,
        }
    }


    pub fn as_str( &self ) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}


impl fmt::Display for RepeatMode {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.as_str() )
    }
}


/// Error returned when a repeat mode string is not recognised.
#[derive( Debug, Clone, PartialEq, Eq, thiserror::Error )]
#[error( "Invalid repeat mode: '{0}'. Use 'off', 'one', or 'all'" )]
pub struct ParseRepeatModeError( pub String );


impl FromStr for RepeatMode {
    type Err = ParseRepeatModeError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "0" => Ok( RepeatMode::Off ),
            "one" | "1" => Ok( RepeatMode::One ),
            "all" | "2" => Ok( RepeatMode::All ),
            _ => Err( ParseRepeatModeError( s.to_string() ) ),
        }
    }
}


/// Ordered play queue with a current-track pointer and history.
#[derive( Debug, Clone )]
pub struct PlayQueue {
    tracks: Vec<Track>,
    current_index: Option<usize>,
    shuffle: bool,
    repeat: RepeatMode,
    history: History,
}


impl PlayQueue {
    /// Creates an empty queue whose history keeps `history_limit` entries.
    pub fn new( history_limit: usize ) -> Self {
        Self {
            tracks: Vec::new(),
            current_index: None,
            shuffle: false,
            repeat: RepeatMode::Off,
            history: History::new( history_limit ),
        }
    }


    /// Replaces the queue.
    ///
    /// The current index becomes `start_index` when it is in range, 0
    /// otherwise. An empty list leaves no current track.
    pub fn set_queue( &mut self, tracks: Vec<Track>, start_index: usize ) {
        self.current_index = if tracks.is_empty() {
            None
        } else if start_index < tracks.len() {
            Some( start_index )
        } else {
            Some( 0 )
        };
        self.tracks = tracks;
    }


    /// Replaces the queue with an explicit pointer. Used when restoring a
    /// session; an out-of-range pointer is dropped.
    pub fn restore( &mut self, tracks: Vec<Track>, current_index: Option<usize> ) {
        self.current_index = current_index.filter( |&i| i < tracks.len() );
        self.tracks = tracks;
    }


    /// Appends a track and returns its index.
    pub fn add( &mut self, track: Track ) -> usize {
        self.tracks.push( track );
        if self.tracks.len() == 1 {
            self.current_index = Some( 0 );
        }
        self.tracks.len() - 1
    }


    /// Returns true if removing `index` would remove the current track.
    pub fn is_current( &self, index: usize ) -> bool {
        self.current_index == Some( index )
    }


    /// Removes the track at `index`.
    ///
    /// Returns None without touching anything if the index is out of range.
    /// When the current track is removed the pointer stays on the same slot,
    /// clamped to the new end, or clears if the queue becomes empty.
    pub fn remove( &mut self, index: usize ) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }

        if let Some( current ) = self.current_index {
            if index < current {
                self.current_index = Some( current - 1 );
            } else if index == current {
                self.current_index = if self.tracks.len() > 1 {
                    Some( current.min( self.tracks.len() - 2 ) )
                } else {
                    None
                };
            }
        }

        Some( self.tracks.remove( index ) )
    }


    /// Empties the queue. History and modes are kept.
    pub fn clear( &mut self ) {
        self.tracks.clear();
        self.current_index = None;
    }


    /// Flips shuffle mode using the thread-local RNG.
    pub fn toggle_shuffle( &mut self ) -> bool {
        self.toggle_shuffle_with( &mut rand::thread_rng() )
    }


    /// Flips shuffle mode.
    ///
    /// Turning shuffle on with more than one track shuffles the queue in place
    /// and moves the pointer to wherever the current track landed. Turning it
    /// off keeps the shuffled order.
    pub fn toggle_shuffle_with<R: Rng + ?Sized>( &mut self, rng: &mut R ) -> bool {
        self.shuffle = !self.shuffle;

        if self.shuffle && self.tracks.len() > 1 {
            let current_id = self.current().map( |t| t.id.clone() );
            self.tracks.shuffle( rng );

            if let Some( id ) = current_id {
                self.current_index = Some( self.locate( &id ).unwrap_or( 0 ) );
            }
        }

        self.shuffle
    }


    /// Advances the repeat mode one step and returns the new mode.
    pub fn toggle_repeat( &mut self ) -> RepeatMode {
        self.repeat = self.repeat.cycled();
        self.repeat
    }


    /// Index that `next` would move to, honouring RepeatMode::All wrap-around.
    ///
    /// Does not mutate. RepeatMode::One is not considered here; callers that
    /// restart the current track handle it themselves.
    pub fn peek_next( &self ) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }

        let next = self.current_index.map_or( 0, |i| i + 1 );
        if next < self.tracks.len() {
            Some( next )
        } else if self.repeat == RepeatMode::All {
            Some( 0 )
        } else {
            None
        }
    }


    /// Index that `prev` would move to, honouring RepeatMode::All wrap-around.
    pub fn peek_previous( &self ) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }

        match self.current_index {
            Some( current ) if current > 0 => Some( current - 1 ),
            _ if self.repeat == RepeatMode::All => Some( self.tracks.len() - 1 ),
            _ => None,
        }
    }


    /// Moves the pointer to `index`. Returns false if out of range.
    pub fn jump_to( &mut self, index: usize ) -> bool {
        if index < self.tracks.len() {
            self.current_index = Some( index );
            true
        } else {
            false
        }
    }


    /// Finds the first queued track with the given id.
    pub fn locate( &self, id: &str ) -> Option<usize> {
        self.tracks.iter().position( |t| t.id == id )
    }


    /// Makes `track` current, appending it if it is not queued yet.
    ///
    /// The pointer stays put when it already sits on a track with the same id,
    /// so duplicates keep their own slot. Returns the index it now occupies.
    pub fn ensure_current( &mut self, track: &Track ) -> usize {
        if let Some( index ) = self.current_index.filter( |&i| self.tracks.get( i ).is_some_and( |t| t.id == track.id ) ) {
            return index;
        }

        let index = match self.locate( &track.id ) {
            Some( index ) => index,
            None => self.add( track.clone() ),
        };
        self.current_index = Some( index );
        index
    }


    /// Records a play in the history.
    pub fn record_played( &mut self, track: Track ) {
        self.history.push( track );
    }


    /// Gets the current track.
    pub fn current( &self ) -> Option<&Track> {
        self.current_index.and_then( |i| self.tracks.get( i ) )
    }


    pub fn get( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    pub fn current_index( &self ) -> Option<usize> {
        self.current_index
    }


    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    pub fn shuffle( &self ) -> bool {
        self.shuffle
    }


    /// Sets shuffle mode without reordering. Used when restoring a session.
    pub fn set_shuffle( &mut self, shuffle: bool ) {
        self.shuffle = shuffle;
    }


    pub fn repeat( &self ) -> RepeatMode {
        self.repeat
    }


    pub fn set_repeat( &mut self, repeat: RepeatMode ) {
        self.repeat = repeat;
    }


    pub fn history( &self ) -> &History {
        &self.history
    }


    /// Replaces the history. Used when restoring a session.
    pub fn set_history( &mut self, history: History ) {
        self.history = history;
    }
}


impl Default for PlayQueue {
    fn default() -> Self {
        Self::new( DEFAULT_HISTORY_LIMIT )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;


    fn track( id: &str ) -> Track {
        Track::new( id, format!( "file:///music/{}.mp3", id ) )
    }


    fn queue_of( ids: &[&str] ) -> PlayQueue {
        let mut queue = PlayQueue::default();
        queue.set_queue( ids.iter().map( |id| track( id ) ).collect(), 0 );
        queue
    }


    #[test]
    fn test_set_queue_in_range() {
        let mut queue = PlayQueue::default();
        queue.set_queue( vec![ track( "a" ), track( "b" ), track( "c" ) ], 2 );
        assert_eq!( queue.current_index(), Some( 2 ) );
        assert_eq!( queue.current().map( |t| t.id.as_str() ), Some( "c" ) );
    }


    #[test]
    fn test_set_queue_out_of_range_falls_back_to_zero() {
        let mut queue = PlayQueue::default();
        queue.set_queue( vec![ track( "a" ), track( "b" ) ], 7 );
        assert_eq!( queue.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_set_queue_empty_has_no_current() {
        let mut queue = queue_of( &[ "a" ] );
        queue.set_queue( Vec::new(), 0 );
        assert_eq!( queue.current_index(), None );
        assert!( queue.is_empty() );
    }


    #[test]
    fn test_add_first_track_becomes_current() {
        let mut queue = PlayQueue::default();
        assert_eq!( queue.add( track( "a" ) ), 0 );
        assert_eq!( queue.current_index(), Some( 0 ) );
        assert_eq!( queue.add( track( "b" ) ), 1 );
        assert_eq!( queue.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_remove_before_current_shifts_pointer() {
        let mut queue = queue_of( &[ "a", "b", "c" ] );
        queue.jump_to( 2 );
        queue.remove( 0 );
        assert_eq!( queue.current_index(), Some( 1 ) );
        assert_eq!( queue.current().map( |t| t.id.as_str() ), Some( "c" ) );
    }


    #[test]
    fn test_remove_current_at_end_clamps() {
        let mut queue = queue_of( &[ "a", "b", "c" ] );
        queue.jump_to( 2 );
        queue.remove( 2 );
        assert_eq!( queue.current_index(), Some( 1 ) );
    }


    #[test]
    fn test_remove_current_in_middle_keeps_slot() {
        let mut queue = queue_of( &[ "a", "b", "c" ] );
        queue.jump_to( 1 );
        queue.remove( 1 );
        assert_eq!( queue.current().map( |t| t.id.as_str() ), Some( "c" ) );
    }


    #[test]
    fn test_remove_last_remaining_clears_pointer() {
        let mut queue = queue_of( &[ "a" ] );
        assert!( queue.remove( 0 ).is_some() );
        assert_eq!( queue.current_index(), None );
    }


    #[test]
    fn test_remove_out_of_range_is_noop() {
        let mut queue = queue_of( &[ "a", "b" ] );
        queue.jump_to( 1 );
        assert!( queue.remove( 5 ).is_none() );
        assert_eq!( queue.len(), 2 );
        assert_eq!( queue.current_index(), Some( 1 ) );
    }


    #[test]
    fn test_repeat_cycles_back() {
        let mut queue = PlayQueue::default();
        assert_eq!( queue.toggle_repeat(), RepeatMode::One );
        assert_eq!( queue.toggle_repeat(), RepeatMode::All );
        assert_eq!( queue.toggle_repeat(), RepeatMode::Off );
    }


    #[test]
    fn test_peek_next_wraps_only_with_repeat_all() {
        let mut queue = queue_of( &[ "a", "b", "c" ] );
        queue.jump_to( 2 );
        assert_eq!( queue.peek_next(), None );

        queue.set_repeat( RepeatMode::All );
        assert_eq!( queue.peek_next(), Some( 0 ) );
    }


    #[test]
    fn test_peek_previous_wraps_only_with_repeat_all() {
        let mut queue = queue_of( &[ "a", "b", "c" ] );
        assert_eq!( queue.peek_previous(), None );

        queue.set_repeat( RepeatMode::All );
        assert_eq!( queue.peek_previous(), Some( 2 ) );

        queue.jump_to( 1 );
        assert_eq!( queue.peek_previous(), Some( 0 ) );
    }


    #[test]
    fn test_peek_on_empty_queue() {
        let mut queue = PlayQueue::default();
        queue.set_repeat( RepeatMode::All );
        assert_eq!( queue.peek_next(), None );
        assert_eq!( queue.peek_previous(), None );
    }


    #[test]
    fn test_shuffle_keeps_current_track() {
        let mut queue = queue_of( &[ "a", "b", "c", "d", "e", "f" ] );
        queue.jump_to( 3 );
        let mut rng = StdRng::seed_from_u64( 7 );

        assert!( queue.toggle_shuffle_with( &mut rng ) );
        assert_eq!( queue.current().map( |t| t.id.as_str() ), Some( "d" ) );

        let mut ids: Vec<_> = queue.tracks().iter().map( |t| t.id.clone() ).collect();
        ids.sort();
        assert_eq!( ids, vec![ "a", "b", "c", "d", "e", "f" ] );
    }


    #[test]
    fn test_shuffle_off_keeps_order() {
        let mut queue = queue_of( &[ "a", "b", "c", "d", "e", "f" ] );
        let mut rng = StdRng::seed_from_u64( 11 );
        queue.toggle_shuffle_with( &mut rng );
        let shuffled: Vec<_> = queue.tracks().to_vec();

        assert!( !queue.toggle_shuffle_with( &mut rng ) );
        assert_eq!( queue.tracks(), shuffled.as_slice() );
    }


    #[test]
    fn test_ensure_current_appends_or_locates() {
        let mut queue = queue_of( &[ "a", "b" ] );
        assert_eq!( queue.ensure_current( &track( "b" ) ), 1 );
        assert_eq!( queue.ensure_current( &track( "z" ) ), 2 );
        assert_eq!( queue.current_index(), Some( 2 ) );
        assert_eq!( queue.len(), 3 );
    }


    #[test]
    fn test_ensure_current_keeps_duplicate_slot() {
        let mut queue = queue_of( &[ "a", "b", "a" ] );
        queue.jump_to( 2 );
        assert_eq!( queue.ensure_current( &track( "a" ) ), 2 );
        assert_eq!( queue.current_index(), Some( 2 ) );

        queue.jump_to( 1 );
        assert_eq!( queue.ensure_current( &track( "a" ) ), 0 );
    }


    #[test]
    fn test_shuffle_is_deterministic_for_a_seed() {
        let ids = [ "a", "b", "c", "d", "e", "f", "g", "h" ];
        let mut first = queue_of( &ids );
        let mut second = queue_of( &ids );

        first.toggle_shuffle_with( &mut StdRng::seed_from_u64( 3 ) );
        second.toggle_shuffle_with( &mut StdRng::seed_from_u64( 3 ) );
        assert_eq!( first.tracks(), second.tracks() );
        assert_eq!( first.current(), second.current() );
    }


    #[test]
    fn test_repeat_mode_parse() {
        assert_eq!( "ALL".parse::<RepeatMode>(), Ok( RepeatMode::All ) );
        assert_eq!( "1".parse::<RepeatMode>(), Ok( RepeatMode::One ) );
        assert!( "sometimes".parse::<RepeatMode>().is_err() );
        assert_eq!( RepeatMode::One.to_string(), "one" );
    }
}
