//! Library scanning
//!
//! Discovers audio files under a path and turns them into queueable tracks.

use std::path::{ Path, PathBuf };

use thiserror::Error;

use nocturne_core::Track;

use crate::backend::Decoder;


/// Supported audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "wma", "aiff", "alac",
];


/// Errors that can occur during library operations.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "Not an audio file: {0}" )]
    Unsupported( PathBuf ),
}


/// Returns the audio files at `path`: the file itself, or every supported
/// file below a directory, sorted.
pub fn scan( path: &Path ) -> Result<Vec<PathBuf>, LibraryError> {
    if !path.exists() {
        return Err( LibraryError::NotFound( path.to_path_buf() ) );
    }

    if path.is_file() {
        return if is_audio_file( path ) {
            Ok( vec![ path.to_path_buf() ] )
        } else {
            Err( LibraryError::Unsupported( path.to_path_buf() ) )
        };
    }

    let mut files = Vec::new();
    scan_recursive( path, &mut files )?;
    files.sort();

    tracing::info!( "Found {} tracks in {:?}", files.len(), path );
    Ok( files )
}


fn scan_recursive( dir: &Path, files: &mut Vec<PathBuf> ) -> Result<(), LibraryError> {
    let entries = match std::fs::read_dir( dir ) {
        Ok( e ) => e,
        Err( e ) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!( "Access denied: {:?}", dir );
            return Ok(()); // Skip inaccessible directories
        }
        Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err( LibraryError::NotFound( dir.to_path_buf() ) );
        }
        Err( e ) => return Err( LibraryError::Io( e ) ),
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            scan_recursive( &path, files )?;
        } else if is_audio_file( &path ) {
            files.push( path );
        }
    }

    Ok(())
}


/// Checks if a file has a supported audio extension.
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


/// Builds a track for a local file. Tags and duration are read when the file
/// can be probed; otherwise the file name is used as the title.
pub fn track_from_path( path: &Path ) -> Track {
    let path = path.canonicalize().unwrap_or_else( |_| path.to_path_buf() );
    let id = path.to_string_lossy().into_owned();
    let mut track = Track::new( id.clone(), format!( "file://{}", id ) );

    let file_name = path
        .file_stem()
        .map( |s| s.to_string_lossy().into_owned() )
        .unwrap_or_else( || id.clone() );

    match Decoder::open( &path ) {
        Ok( mut decoder ) => {
            let tags = decoder.tags();
            track = track.with_title( tags.title.unwrap_or( file_name ) );
            if let Some( artist ) = tags.artist {
                track = track.with_artist( artist );
            }
            if let Some( duration_ms ) = decoder.duration_ms() {
                track = track.with_duration_ms( duration_ms );
            }
        }
        Err( e ) => {
            tracing::debug!( "Could not probe {:?}: {}", path, e );
            track = track.with_title( file_name );
        }
    }

    track
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_is_audio_file() {
        assert!( is_audio_file( Path::new( "song.mp3" ) ) );
        assert!( is_audio_file( Path::new( "Song.FLAC" ) ) );
        assert!( !is_audio_file( Path::new( "cover.jpg" ) ) );
        assert!( !is_audio_file( Path::new( "README" ) ) );
    }


    #[test]
    fn test_scan_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join( "album" );
        std::fs::create_dir( &nested ).unwrap();
        std::fs::write( dir.path().join( "b.mp3" ), b"" ).unwrap();
        std::fs::write( nested.join( "a.ogg" ), b"" ).unwrap();
        std::fs::write( nested.join( "notes.txt" ), b"" ).unwrap();

        let files = scan( dir.path() ).unwrap();
        assert_eq!( files, vec![ nested.join( "a.ogg" ), dir.path().join( "b.mp3" ) ] );
    }


    #[test]
    fn test_scan_missing_path() {
        assert!( matches!( scan( Path::new( "/no/such/dir" ) ), Err( LibraryError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_track_from_unreadable_file_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "Night Drive.mp3" );
        std::fs::write( &path, b"not audio" ).unwrap();

        let track = track_from_path( &path );
        assert_eq!( track.title, "Night Drive" );
        assert!( track.stream_url.starts_with( "file://" ) );
        assert!( track.stream_url.ends_with( "Night Drive.mp3" ) );
        assert_eq!( track.duration_ms, None );
    }
}
