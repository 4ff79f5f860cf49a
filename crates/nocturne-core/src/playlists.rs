//! Saved playlists
//!
//! Named track lists kept in the key/value store as a single JSON array.
//! A fresh store is seeded with "Favorites" and "Recently Played".

use std::time::{ SystemTime, UNIX_EPOCH };

use serde::{ Deserialize, Serialize };

use crate::store::{ keys, PersistenceGateway };
use crate::track::Track;


pub const FAVORITES: &str = "Favorites";
pub const RECENTLY_PLAYED: &str = "Recently Played";

/// Maximum entries kept in "Recently Played".
pub const RECENTLY_PLAYED_LIMIT: usize = 50;


#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde( default )]
    pub tracks: Vec<Track>,
    /// Milliseconds since the Unix epoch.
    #[serde( default )]
    pub created_at: u64,
}


impl Playlist {
    fn new( id: impl Into<String>, name: impl Into<String>, created_at: u64 ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tracks: Vec::new(),
            created_at,
        }
    }
}


/// Playlist collection backed by the persistence gateway.
pub struct PlaylistStore {
    gateway: PersistenceGateway,
    playlists: Vec<Playlist>,
}


impl PlaylistStore {
    /// Loads stored playlists, seeding the defaults if none exist.
    pub fn load( gateway: PersistenceGateway ) -> Self {
        let stored = gateway.get( keys::PLAYLISTS );
        let seeded = stored.is_none();
        let playlists = match stored {
            Some( raw ) => match serde_json::from_str::<Vec<Playlist>>( &raw ) {
                Ok( playlists ) => {
                    tracing::info!( "Loaded {} playlists", playlists.len() );
                    playlists
                }
                Err( e ) => {
                    tracing::error!( "Failed to parse playlists: {}", e );
                    Vec::new()
                }
            },
            None => {
                let now = now_millis();
                vec![
                    Playlist::new( "1", FAVORITES, now ),
                    Playlist::new( "2", RECENTLY_PLAYED, now ),
                ]
            }
        };

        let store = Self { gateway, playlists };
        if seeded {
            store.save();
        }
        store
    }


    pub fn playlists( &self ) -> &[Playlist] {
        &self.playlists
    }


    pub fn get( &self, id: &str ) -> Option<&Playlist> {
        self.playlists.iter().find( |p| p.id == id )
    }


    /// Finds a playlist by name, ignoring case.
    pub fn find_by_name( &self, name: &str ) -> Option<&Playlist> {
        self.playlists.iter().find( |p| p.name.eq_ignore_ascii_case( name ) )
    }


    /// Creates an empty playlist. Its id is the creation time in millis.
    pub fn create( &mut self, name: impl Into<String> ) -> Playlist {
        let created_at = now_millis();
        let mut stamp = created_at;
        while self.get( &stamp.to_string() ).is_some() {
            stamp += 1;
        }

        let playlist = Playlist::new( stamp.to_string(), name, created_at );
        self.playlists.push( playlist.clone() );
        self.save();
        tracing::info!( "Created playlist: {}", playlist.name );
        playlist
    }


    /// Deletes a playlist. Returns false if it did not exist.
    pub fn delete( &mut self, id: &str ) -> bool {
        let before = self.playlists.len();
        self.playlists.retain( |p| p.id != id );
        if self.playlists.len() == before {
            return false;
        }
        self.save();
        tracing::info!( "Deleted playlist: {}", id );
        true
    }


    pub fn rename( &mut self, id: &str, name: impl Into<String> ) -> bool {
        let Some( playlist ) = self.get_mut( id ) else {
            return false;
        };
        playlist.name = name.into();
        tracing::info!( "Renamed playlist to: {}", playlist.name );
        self.save();
        true
    }


    /// Appends a track. Returns false if the playlist is missing or already
    /// holds the track.
    pub fn add_track( &mut self, id: &str, track: Track ) -> bool {
        let Some( playlist ) = self.get_mut( id ) else {
            return false;
        };
        if playlist.tracks.iter().any( |t| t.id == track.id ) {
            return false;
        }
        playlist.tracks.push( track );
        tracing::info!( "Added track to playlist: {}", playlist.name );
        self.save();
        true
    }


    pub fn remove_track( &mut self, id: &str, track_id: &str ) -> bool {
        let Some( playlist ) = self.get_mut( id ) else {
            return false;
        };
        playlist.tracks.retain( |t| t.id != track_id );
        tracing::info!( "Removed track from playlist: {}", playlist.name );
        self.save();
        true
    }


    /// Tracks of a playlist; empty if it does not exist.
    pub fn tracks( &self, id: &str ) -> Vec<Track> {
        self.get( id ).map( |p| p.tracks.clone() ).unwrap_or_default()
    }


    /// Moves `track` to the front of "Recently Played".
    pub fn add_to_recently_played( &mut self, track: Track ) {
        let Some( recent ) = self.playlists.iter_mut().find( |p| p.name == RECENTLY_PLAYED ) else {
            return;
        };
        recent.tracks.retain( |t| t.id != track.id );
        recent.tracks.insert( 0, track );
        recent.tracks.truncate( RECENTLY_PLAYED_LIMIT );
        self.save();
    }


    fn get_mut( &mut self, id: &str ) -> Option<&mut Playlist> {
        self.playlists.iter_mut().find( |p| p.id == id )
    }


    fn save( &self ) {
        if !self.gateway.set_json( keys::PLAYLISTS, &self.playlists ) {
            tracing::error!( "Failed to save playlists" );
        }
    }
}


fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since( UNIX_EPOCH )
        .map( |d| d.as_millis() as u64 )
        .unwrap_or( 0 )
}


#[cfg( test )]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStore;


    fn store() -> ( PlaylistStore, Arc<MemoryStore> ) {
        let backing = Arc::new( MemoryStore::new() );
        ( PlaylistStore::load( PersistenceGateway::new( backing.clone() ) ), backing )
    }


    #[test]
    fn test_seeds_defaults_once() {
        let ( playlists, backing ) = store();
        let names: Vec<_> = playlists.playlists().iter().map( |p| p.name.as_str() ).collect();
        assert_eq!( names, vec![FAVORITES, RECENTLY_PLAYED] );
        assert!( backing.peek( keys::PLAYLISTS ).is_some() );

        let reloaded = PlaylistStore::load( PersistenceGateway::new( backing ) );
        assert_eq!( reloaded.playlists(), playlists.playlists() );
    }


    #[test]
    fn test_create_rename_delete() {
        let ( mut playlists, _ ) = store();
        let created = playlists.create( "Road trip" );
        assert_eq!( playlists.playlists().len(), 3 );

        assert!( playlists.rename( &created.id, "Night drive" ) );
        assert_eq!( playlists.get( &created.id ).unwrap().name, "Night drive" );
        assert!( playlists.find_by_name( "night DRIVE" ).is_some() );

        assert!( playlists.delete( &created.id ) );
        assert!( !playlists.delete( &created.id ) );
        assert!( !playlists.rename( "missing", "x" ) );
    }


    #[test]
    fn test_ids_are_unique_within_one_millisecond() {
        let ( mut playlists, _ ) = store();
        let a = playlists.create( "a" );
        let b = playlists.create( "b" );
        assert_ne!( a.id, b.id );
    }


    #[test]
    fn test_add_track_rejects_duplicates() {
        let ( mut playlists, _ ) = store();
        let track = Track::new( "t", "file:///t.mp3" );

        assert!( playlists.add_track( "1", track.clone() ) );
        assert!( !playlists.add_track( "1", track ) );
        assert!( !playlists.add_track( "missing", Track::new( "u", "u" ) ) );
        assert_eq!( playlists.tracks( "1" ).len(), 1 );

        assert!( playlists.remove_track( "1", "t" ) );
        assert!( playlists.tracks( "1" ).is_empty() );
        assert!( playlists.tracks( "missing" ).is_empty() );
    }


    #[test]
    fn test_recently_played_is_capped_and_deduplicated() {
        let ( mut playlists, _ ) = store();
        for i in 0..60 {
            playlists.add_to_recently_played( Track::new( i.to_string(), "x" ) );
        }
        playlists.add_to_recently_played( Track::new( "30", "x" ) );

        let recent = playlists.tracks( "2" );
        assert_eq!( recent.len(), RECENTLY_PLAYED_LIMIT );
        assert_eq!( recent[0].id, "30" );
        assert_eq!( recent.iter().filter( |t| t.id == "30" ).count(), 1 );
        assert_eq!( recent[1].id, "59" );
    }
}
