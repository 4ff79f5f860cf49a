//! Session persistence
//!
//! The engine saves and restores its state through a narrow key/value
//! contract. Values are plain strings; structured values are JSON. Storage
//! failures are logged and never change in-memory state.

use std::collections::{ BTreeMap, HashMap };
use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::thread;

use tokio::sync::mpsc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::queue::RepeatMode;
use crate::track::Track;


/// Fixed storage keys.
pub mod keys {
    pub const CURRENT_TRACK: &str = "@nocturne/current_track";
    pub const CURRENT_POSITION: &str = "@nocturne/current_position";
    pub const QUEUE: &str = "@nocturne/queue";
    pub const HISTORY: &str = "@nocturne/history";
    pub const LIKED_SONGS: &str = "@nocturne/liked_songs";
    pub const REPEAT_MODE: &str = "@nocturne/repeat_mode";
    pub const SHUFFLE_MODE: &str = "@nocturne/shuffle_mode";
    pub const VOLUME: &str = "@nocturne/volume";
    pub const PLAYBACK_SPEED: &str = "@nocturne/playback_speed";
    pub const PLAYLISTS: &str = "@nocturne/playlists";
}


/// Errors raised by a key/value store.
#[derive( Debug, Error )]
pub enum StoreError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid JSON: {0}" )]
    Json( #[from] serde_json::Error ),

    #[error( "Store unavailable: {0}" )]
    Unavailable( String ),
}


/// Persistent string store.
pub trait KeyValueStore: Send + Sync {
    fn get_item( &self, key: &str ) -> Result<Option<String>, StoreError>;

    fn set_item( &self, key: &str, value: &str ) -> Result<(), StoreError>;

    /// Writes several entries at once. Stores that pay per write override
    /// this to apply the batch in one go.
    fn set_items( &self, entries: &[( &str, String )] ) -> Result<(), StoreError> {
        for ( key, value ) in entries {
            self.set_item( key, value )?;
        }
        Ok(())
    }
}


/// Volatile store, used for tests and for sessions that should not persist.
#[derive( Debug, Default )]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}


impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }


    /// Returns a copy of the stored value, bypassing the trait.
    pub fn peek( &self, key: &str ) -> Option<String> {
        lock( &self.items ).get( key ).cloned()
    }
}


impl KeyValueStore for MemoryStore {
    fn get_item( &self, key: &str ) -> Result<Option<String>, StoreError> {
        Ok( lock( &self.items ).get( key ).cloned() )
    }


    fn set_item( &self, key: &str, value: &str ) -> Result<(), StoreError> {
        lock( &self.items ).insert( key.to_string(), value.to_string() );
        Ok(())
    }
}


/// Store backed by a single JSON object on disk.
///
/// Reads are served from memory. Each change queues a snapshot of the whole
/// object for a background writer thread, which only writes the newest one
/// when several are waiting. Dropping the store waits for the last write.
#[derive( Debug )]
pub struct JsonFileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
    writer: Option<Writer>,
}


#[derive( Debug )]
struct Writer {
    tx: mpsc::UnboundedSender<String>,
    join: thread::JoinHandle<()>,
}


impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open( path: impl Into<PathBuf> ) -> Result<Self, StoreError> {
        let path = path.into();
        let items = if path.exists() {
            let contents = fs::read_to_string( &path )?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str( &contents )?
            }
        } else {
            BTreeMap::new()
        };

        let ( tx, rx ) = mpsc::unbounded_channel();
        let target = path.clone();
        let join = thread::Builder::new()
            .name( "nocturne-store".to_string() )
            .spawn( move || write_loop( target, rx ) )?;

        tracing::debug!( "Opened state store {:?} ({} keys)", path, items.len() );
        Ok( Self {
            path,
            items: Mutex::new( items ),
            writer: Some( Writer { tx, join } ),
        })
    }


    /// Default location: `<data_local_dir>/nocturne/state.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map( |d| d.join( "nocturne" ).join( "state.json" ) )
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }


    /// Hands the current contents to the writer thread.
    fn schedule_write( &self, items: &BTreeMap<String, String> ) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty( items )?;
        let sent = self.writer.as_ref().is_some_and( |writer| writer.tx.send( json ).is_ok() );
        if sent {
            Ok(())
        } else {
            Err( StoreError::Unavailable( format!( "writer for {:?} has stopped", self.path ) ) )
        }
    }
}


impl KeyValueStore for JsonFileStore {
    fn get_item( &self, key: &str ) -> Result<Option<String>, StoreError> {
        Ok( lock( &self.items ).get( key ).cloned() )
    }


    fn set_item( &self, key: &str, value: &str ) -> Result<(), StoreError> {
        let mut items = lock( &self.items );
        items.insert( key.to_string(), value.to_string() );
        self.schedule_write( &items )
    }


    fn set_items( &self, entries: &[( &str, String )] ) -> Result<(), StoreError> {
        let mut items = lock( &self.items );
        for ( key, value ) in entries {
            items.insert( key.to_string(), value.clone() );
        }
        self.schedule_write( &items )
    }
}


impl Drop for JsonFileStore {
    fn drop( &mut self ) {
        if let Some( Writer { tx, join } ) = self.writer.take() {
            drop( tx );
            if join.join().is_err() {
                tracing::error!( "State writer for {:?} panicked", self.path );
            }
        }
    }
}


/// Writes queued snapshots until every sender is gone. Only the newest of a
/// burst reaches the disk.
fn write_loop( path: PathBuf, mut rx: mpsc::UnboundedReceiver<String> ) {
    while let Some( mut json ) = rx.blocking_recv() {
        while let Ok( newer ) = rx.try_recv() {
            json = newer;
        }
        if let Err( e ) = write_file( &path, &json ) {
            tracing::warn!( "Failed to write {:?}: {}", path, e );
        }
    }
    tracing::debug!( "State writer for {:?} exiting", path );
}


fn write_file( path: &Path, json: &str ) -> Result<(), StoreError> {
    if let Some( parent ) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all( parent )?;
        }
    }

    fs::write( path, json )?;
    Ok(())
}


/// Everything needed to resume a session.
#[derive( Debug, Clone, PartialEq )]
pub struct SessionState {
    /// Last current track; restored only together with a position.
    pub current_track: Option<Track>,
    pub position_ms: u64,
    pub queue: Vec<Track>,
    /// Most recent first.
    pub history: Vec<Track>,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub volume: f32,
    pub playback_speed: f32,
}


impl Default for SessionState {
    fn default() -> Self {
        Self {
            current_track: None,
            position_ms: 0,
            queue: Vec::new(),
            history: Vec::new(),
            repeat: RepeatMode::Off,
            shuffle: false,
            volume: 1.0,
            playback_speed: 1.0,
        }
    }
}


/// Best-effort save/restore over a [`KeyValueStore`].
#[derive( Clone )]
pub struct PersistenceGateway {
    store: Arc<dyn KeyValueStore>,
}


impl PersistenceGateway {
    pub fn new( store: Arc<dyn KeyValueStore> ) -> Self {
        Self { store }
    }


    /// Reads a raw value. Failures are logged and read as missing.
    pub fn get( &self, key: &str ) -> Option<String> {
        match self.store.get_item( key ) {
            Ok( value ) => value,
            Err( e ) => {
                tracing::warn!( "Failed to read {}: {}", key, e );
                None
            }
        }
    }


    /// Writes a raw value. Returns false if the store rejected it.
    pub fn set( &self, key: &str, value: &str ) -> bool {
        match self.store.set_item( key, value ) {
            Ok(()) => true,
            Err( e ) => {
                tracing::warn!( "Failed to write {}: {}", key, e );
                false
            }
        }
    }


    /// Reads and decodes a JSON value. Malformed values are logged and ignored.
    pub fn get_json<T: DeserializeOwned>( &self, key: &str ) -> Option<T> {
        let raw = self.get( key )?;
        match serde_json::from_str( &raw ) {
            Ok( value ) => Some( value ),
            Err( e ) => {
                tracing::warn!( "Ignoring malformed {}: {}", key, e );
                None
            }
        }
    }


    /// Encodes and writes a JSON value.
    pub fn set_json<T: Serialize + ?Sized>( &self, key: &str, value: &T ) -> bool {
        match encode( key, value ) {
            Some( json ) => self.set( key, &json ),
            None => false,
        }
    }


    /// Restores the saved session. Missing or malformed entries keep defaults.
    pub fn load_session( &self ) -> SessionState {
        let mut session = SessionState::default();

        if let Some( repeat ) = self.get( keys::REPEAT_MODE ) {
            match repeat.parse() {
                Ok( mode ) => session.repeat = mode,
                Err( e ) => tracing::warn!( "Ignoring stored repeat mode: {}", e ),
            }
        }

        if let Some( shuffle ) = self.get( keys::SHUFFLE_MODE ) {
            session.shuffle = shuffle.trim() == "true";
        }

        if let Some( volume ) = self.get( keys::VOLUME ).and_then( |v| v.trim().parse::<f32>().ok() ) {
            if volume.is_finite() {
                session.volume = volume.clamp( 0.0, 1.0 );
            }
        }

        if let Some( speed ) = self.get( keys::PLAYBACK_SPEED ).and_then( |v| v.trim().parse::<f32>().ok() ) {
            if speed.is_finite() {
                session.playback_speed = speed.clamp( 0.5, 2.0 );
            }
        }

        if let Some( queue ) = self.get_json( keys::QUEUE ) {
            session.queue = queue;
        }

        if let Some( history ) = self.get_json( keys::HISTORY ) {
            session.history = history;
        }

        let track: Option<Track> = self.get_json( keys::CURRENT_TRACK );
        let position = self.get( keys::CURRENT_POSITION )
            .and_then( |p| p.trim().parse::<u64>().ok() );

        if let ( Some( track ), Some( position ) ) = ( track, position ) {
            session.current_track = Some( track );
            session.position_ms = position;
        }

        session
    }


    /// Writes the full session as one batch. The current track and position
    /// are only written when there is a current track.
    pub fn save_session( &self, session: &SessionState ) {
        let mut entries: Vec<( &str, String )> = Vec::with_capacity( 8 );

        if let Some( ref track ) = session.current_track {
            if let Some( json ) = encode( keys::CURRENT_TRACK, track ) {
                entries.push(( keys::CURRENT_TRACK, json ));
            }
            entries.push(( keys::CURRENT_POSITION, session.position_ms.to_string() ));
        }

        if let Some( json ) = encode( keys::QUEUE, &session.queue ) {
            entries.push(( keys::QUEUE, json ));
        }
        if let Some( json ) = encode( keys::HISTORY, &session.history ) {
            entries.push(( keys::HISTORY, json ));
        }
        entries.push(( keys::REPEAT_MODE, session.repeat.as_str().to_string() ));
        entries.push(( keys::SHUFFLE_MODE, session.shuffle.to_string() ));
        entries.push(( keys::VOLUME, session.volume.to_string() ));
        entries.push(( keys::PLAYBACK_SPEED, session.playback_speed.to_string() ));

        if let Err( e ) = self.store.set_items( &entries ) {
            tracing::warn!( "Failed to save session: {}", e );
        }
    }


    /// Underlying store, shared with other persisted collections.
    pub fn store( &self ) -> Arc<dyn KeyValueStore> {
        Arc::clone( &self.store )
    }
}


fn encode<T: Serialize + ?Sized>( key: &str, value: &T ) -> Option<String> {
    match serde_json::to_string( value ) {
        Ok( json ) => Some( json ),
        Err( e ) => {
            tracing::warn!( "Failed to serialize {}: {}", key, e );
            None
        }
    }
}


fn lock<T>( mutex: &Mutex<T> ) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else( PoisonError::into_inner )
}


#[cfg( test )]
mod tests {
    use super::*;


    struct BrokenStore;


    impl KeyValueStore for BrokenStore {
        fn get_item( &self, _key: &str ) -> Result<Option<String>, StoreError> {
            Err( StoreError::Unavailable( "disk on fire".into() ) )
        }


        fn set_item( &self, _key: &str, _value: &str ) -> Result<(), StoreError> {
            Err( StoreError::Unavailable( "disk on fire".into() ) )
        }
    }


    /// Counts calls so tests can see how a session reaches the store.
    #[derive( Default )]
    struct CountingStore {
        inner: MemoryStore,
        single_writes: Mutex<usize>,
        batches: Mutex<Vec<usize>>,
    }


    impl KeyValueStore for CountingStore {
        fn get_item( &self, key: &str ) -> Result<Option<String>, StoreError> {
            self.inner.get_item( key )
        }


        fn set_item( &self, key: &str, value: &str ) -> Result<(), StoreError> {
            *lock( &self.single_writes ) += 1;
            self.inner.set_item( key, value )
        }


        fn set_items( &self, entries: &[( &str, String )] ) -> Result<(), StoreError> {
            lock( &self.batches ).push( entries.len() );
            for ( key, value ) in entries {
                self.inner.set_item( key, value )?;
            }
            Ok(())
        }
    }


    fn track( id: &str ) -> Track {
        Track::new( id, format!( "file:///music/{}.mp3", id ) ).with_title( id.to_uppercase() )
    }


    #[test]
    fn test_session_round_trip() {
        let gateway = PersistenceGateway::new( Arc::new( MemoryStore::new() ) );
        let session = SessionState {
            current_track: Some( track( "b" ) ),
            position_ms: 42_000,
            queue: vec![ track( "a" ), track( "b" ) ],
            history: vec![ track( "b" ), track( "a" ) ],
            repeat: RepeatMode::All,
            shuffle: true,
            volume: 0.4,
            playback_speed: 1.25,
        };

        gateway.save_session( &session );
        assert_eq!( gateway.load_session(), session );
    }


    #[test]
    fn test_raw_value_formats() {
        let store = Arc::new( MemoryStore::new() );
        let gateway = PersistenceGateway::new( store.clone() );
        gateway.save_session( &SessionState {
            repeat: RepeatMode::One,
            shuffle: true,
            volume: 0.5,
            ..SessionState::default()
        });

        assert_eq!( store.peek( keys::REPEAT_MODE ).as_deref(), Some( "one" ) );
        assert_eq!( store.peek( keys::SHUFFLE_MODE ).as_deref(), Some( "true" ) );
        assert_eq!( store.peek( keys::VOLUME ).as_deref(), Some( "0.5" ) );
        assert!( store.peek( keys::CURRENT_TRACK ).is_none() );
    }


    #[test]
    fn test_track_without_position_is_not_restored() {
        let store = Arc::new( MemoryStore::new() );
        store.set_item( keys::CURRENT_TRACK, &serde_json::to_string( &track( "a" ) ).unwrap() ).unwrap();

        let session = PersistenceGateway::new( store ).load_session();
        assert!( session.current_track.is_none() );
    }


    #[test]
    fn test_malformed_values_keep_defaults() {
        let store = Arc::new( MemoryStore::new() );
        store.set_item( keys::QUEUE, "not json" ).unwrap();
        store.set_item( keys::VOLUME, "loud" ).unwrap();
        store.set_item( keys::REPEAT_MODE, "sometimes" ).unwrap();
        store.set_item( keys::PLAYBACK_SPEED, "9" ).unwrap();

        let session = PersistenceGateway::new( store ).load_session();
        assert!( session.queue.is_empty() );
        assert_eq!( session.volume, 1.0 );
        assert_eq!( session.repeat, RepeatMode::Off );
        assert_eq!( session.playback_speed, 2.0 );
    }


    #[test]
    fn test_broken_store_is_tolerated() {
        let gateway = PersistenceGateway::new( Arc::new( BrokenStore ) );
        gateway.save_session( &SessionState::default() );
        assert_eq!( gateway.load_session(), SessionState::default() );
        assert!( !gateway.set( keys::VOLUME, "1" ) );
    }


    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "state.json" );

        {
            let store = JsonFileStore::open( &path ).unwrap();
            store.set_item( keys::VOLUME, "0.3" ).unwrap();
        }

        let reopened = JsonFileStore::open( &path ).unwrap();
        assert_eq!( reopened.get_item( keys::VOLUME ).unwrap().as_deref(), Some( "0.3" ) );
        assert_eq!( reopened.path(), path.as_path() );
    }


    #[test]
    fn test_session_is_saved_as_one_batch() {
        let store = Arc::new( CountingStore::default() );
        let gateway = PersistenceGateway::new( store.clone() );
        gateway.save_session( &SessionState {
            current_track: Some( track( "a" ) ),
            position_ms: 1_000,
            queue: vec![ track( "a" ) ],
            ..SessionState::default()
        });

        assert_eq!( *lock( &store.batches ), vec![ 8 ] );
        assert_eq!( *lock( &store.single_writes ), 0 );
        assert_eq!( store.inner.peek( keys::CURRENT_POSITION ).as_deref(), Some( "1000" ) );
    }


    #[test]
    fn test_json_file_store_keeps_last_of_many_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "state.json" );

        {
            let gateway = PersistenceGateway::new( Arc::new( JsonFileStore::open( &path ).unwrap() ) );
            for position in 0..50u64 {
                gateway.save_session( &SessionState {
                    current_track: Some( track( "a" ) ),
                    position_ms: position,
                    ..SessionState::default()
                });
            }
            assert!( gateway.set( keys::LIKED_SONGS, "[]" ) );
        }

        let reopened = PersistenceGateway::new( Arc::new( JsonFileStore::open( &path ).unwrap() ) );
        let session = reopened.load_session();
        assert_eq!( session.position_ms, 49 );
        assert_eq!( session.current_track.map( |t| t.id ).as_deref(), Some( "a" ) );
        assert_eq!( reopened.get( keys::LIKED_SONGS ).as_deref(), Some( "[]" ) );
    }


    #[test]
    fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "state.json" );
        fs::write( &path, "{ nope" ).unwrap();

        assert!( matches!( JsonFileStore::open( &path ), Err( StoreError::Json( _ ) ) ) );
    }
}
