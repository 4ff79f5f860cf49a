//! Application settings management
//!
//! Engine tuning lives in `settings.json` under the user's config directory.

use std::fs;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };

use nocturne_core::EngineConfig;


/// Application settings.
#[derive( Debug, Clone, Default, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Crossfade, retry and persistence tuning
    pub engine: EngineConfig,
}


impl Settings {
    /// Returns the path to the settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "nocturne" ).join( "settings.json" ) )
    }


    /// Loads settings from the default location, or returns defaults.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some( path ) => Self::load_from( &path ),
            None => Self::default(),
        }
    }


    /// Loads settings from `path`, or returns defaults if it is missing or
    /// unreadable.
    pub fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => {
                serde_json::from_str( &contents ).unwrap_or_else( |e| {
                    tracing::warn!( "Ignoring malformed settings {:?}: {}", path, e );
                    Self::default()
                })
            }
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Saves settings to `path`.
    pub fn save_to( &self, path: &Path ) {
        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }


    /// Writes the defaults on first run so they can be edited.
    pub fn ensure_saved( &self ) {
        if let Some( path ) = Self::settings_path() {
            if !path.exists() {
                self.save_to( &path );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!( Settings::load_from( &dir.path().join( "settings.json" ) ), Settings::default() );
    }


    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "settings.json" );

        let mut settings = Settings::default();
        settings.engine.crossfade_window_ms = 8000;
        settings.save_to( &path );

        assert_eq!( Settings::load_from( &path ), settings );
    }


    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        std::fs::write( &path, r#"{ "engine": { "history_limit": 5 } }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert_eq!( settings.engine.history_limit, 5 );
        assert_eq!( settings.engine.crossfade_steps, EngineConfig::default().crossfade_steps );
    }


    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        std::fs::write( &path, "{ nope" ).unwrap();
        assert_eq!( Settings::load_from( &path ), Settings::default() );
    }
}
