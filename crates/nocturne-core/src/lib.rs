//! Nocturne Core - Queue-based playback engine
//!
//! This crate provides the platform-independent half of a music player:
//! the play queue with shuffle, repeat and history, the playback engine
//! that drives one audio resource at a time, crossfading between tracks,
//! snapshot broadcasting and best-effort session persistence.
//!
//! Actual decoding and output live behind the [`AudioBackend`] trait.

pub mod backend;
pub mod config;
mod crossfade;
pub mod engine;
pub mod history;
pub mod liked;
pub mod listener;
pub mod playlists;
pub mod queue;
pub mod snapshot;
pub mod store;
pub mod track;

pub use backend::{ AudioBackend, AudioHandle, BackendError, LoadOptions, PlaybackStatus, StatusCallback };
pub use config::EngineConfig;
pub use engine::PlaybackEngine;
pub use history::History;
pub use liked::LikedSongs;
pub use listener::{ ListenerBus, Subscription };
pub use playlists::{ Playlist, PlaylistStore };
pub use queue::{ ParseRepeatModeError, PlayQueue, RepeatMode };
pub use snapshot::{ PlaybackSnapshot, PlayerState };
pub use store::{ JsonFileStore, KeyValueStore, MemoryStore, PersistenceGateway, SessionState, StoreError };
pub use track::Track;
