//! Command-line argument parsing for Nocturne.

use std::path::PathBuf;

use clap::Parser;


/// Nocturne - a queue-driven music player for the terminal.
#[derive( Parser, Debug )]
#[command( name = "nocturne" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// File holding the persisted session, liked songs and playlists.
    #[arg( short, long )]
    pub state: Option<PathBuf>,

    /// Settings file to use instead of the one in the config directory.
    #[arg( short, long )]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg( short, long )]
    pub verbose: bool,

    /// Files or directories to queue and start playing.
    #[arg( trailing_var_arg = true )]
    pub files: Vec<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_files_and_flags() {
        let args = Args::parse_from( [ "nocturne", "-v", "--state", "/tmp/s.json", "a.mp3", "music" ] );
        assert!( args.verbose );
        assert_eq!( args.state, Some( PathBuf::from( "/tmp/s.json" ) ) );
        assert_eq!( args.files, vec![ PathBuf::from( "a.mp3" ), PathBuf::from( "music" ) ] );
    }
}
