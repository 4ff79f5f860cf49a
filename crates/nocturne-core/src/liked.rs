//! Liked songs

use crate::store::{ keys, PersistenceGateway };
use crate::track::Track;


/// The user's liked tracks, stored as one JSON array.
#[derive( Clone )]
pub struct LikedSongs {
    gateway: PersistenceGateway,
}


impl LikedSongs {
    pub fn new( gateway: PersistenceGateway ) -> Self {
        Self { gateway }
    }


    /// All liked tracks in the order they were liked.
    pub fn all( &self ) -> Vec<Track> {
        self.gateway.get_json( keys::LIKED_SONGS ).unwrap_or_default()
    }


    pub fn contains( &self, id: &str ) -> bool {
        self.all().iter().any( |t| t.id == id )
    }


    /// Likes or unlikes `track` and returns the new state, or `None` if the
    /// change could not be saved.
    pub fn toggle( &self, track: &Track ) -> Option<bool> {
        let mut liked = self.all();
        let was_liked = liked.iter().any( |t| t.id == track.id );

        if was_liked {
            liked.retain( |t| t.id != track.id );
            tracing::info!( "Removed from liked songs: {}", track.label() );
        } else {
            liked.push( track.clone() );
            tracing::info!( "Added to liked songs: {}", track.label() );
        }

        self.gateway.set_json( keys::LIKED_SONGS, &liked ).then_some( !was_liked )
    }
}


#[cfg( test )]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStore;


    fn liked() -> ( LikedSongs, Arc<MemoryStore> ) {
        let store = Arc::new( MemoryStore::new() );
        ( LikedSongs::new( PersistenceGateway::new( store.clone() ) ), store )
    }


    #[test]
    fn test_toggle_adds_then_removes() {
        let ( liked, _ ) = liked();
        let track = Track::new( "a", "file:///a.mp3" ).with_title( "A" );

        assert_eq!( liked.toggle( &track ), Some( true ) );
        assert!( liked.contains( "a" ) );
        assert_eq!( liked.all().len(), 1 );

        assert_eq!( liked.toggle( &track ), Some( false ) );
        assert!( !liked.contains( "a" ) );
        assert!( liked.all().is_empty() );
    }


    #[test]
    fn test_order_is_preserved() {
        let ( liked, store ) = liked();
        liked.toggle( &Track::new( "b", "b" ) );
        liked.toggle( &Track::new( "a", "a" ) );

        let ids: Vec<_> = liked.all().into_iter().map( |t| t.id ).collect();
        assert_eq!( ids, vec!["b", "a"] );
        assert!( store.peek( keys::LIKED_SONGS ).is_some() );
    }


    #[test]
    fn test_malformed_value_reads_as_empty() {
        let ( liked, store ) = liked();
        crate::store::KeyValueStore::set_item( store.as_ref(), keys::LIKED_SONGS, "{oops" ).unwrap();
        assert!( liked.all().is_empty() );
        assert!( !liked.contains( "a" ) );
    }
}
