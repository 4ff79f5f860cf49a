//! Slash command parsing.
//!
//! Commands are read line by line from stdin. The leading `/` is optional.

use std::path::PathBuf;
use std::time::Duration;

use nocturne_core::RepeatMode;
use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Queue commands
    Add { path: PathBuf },
    /// 1-based queue position.
    Remove { position: usize },
    Clear,
    Shuffle,
    Repeat { mode: Option<RepeatMode> },
    Queue,
    History,

    // Playback commands
    /// Optional 1-based queue position.
    Play { position: Option<usize> },
    Pause,
    Resume,
    Stop,
    Next,
    Prev,
    Seek { position: Duration },
    Volume { level: Option<u32> },
    Speed { rate: Option<f32> },

    // Collections
    Like,
    Liked,
    Save { name: String },
    Load { name: String },
    Playlists,

    // Other
    Status,
    Help,
    Quit,
}


impl Command {
    /// Parses a command line, with or without the leading `/`.
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let input = input.strip_prefix( '/' ).unwrap_or( input );
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            // Queue commands
            "add" | "a" => {
                let path = args
                    .ok_or_else( || CommandError::MissingArgument( "path".into() ) )?;
                Ok( Command::Add { path: PathBuf::from( path ) } )
            }
            "remove" | "rm" | "del" => {
                let arg = args
                    .ok_or_else( || CommandError::MissingArgument( "queue position".into() ) )?;
                Ok( Command::Remove { position: parse_position( arg )? } )
            }
            "clear" | "cl" => Ok( Command::Clear ),
            "shuffle" | "sh" => Ok( Command::Shuffle ),
            "repeat" | "rep" => {
                let mode = args
                    .map( |s| s.parse::<RepeatMode>() )
                    .transpose()
                    .map_err( |e| CommandError::InvalidArgument( e.to_string() ) )?;
                Ok( Command::Repeat { mode } )
            }
            "queue" | "ls" => Ok( Command::Queue ),
            "history" | "hist" => Ok( Command::History ),

            // Playback commands
            "play" | "p" => {
                let position = args.map( parse_position ).transpose()?;
                Ok( Command::Play { position } )
            }
            "pause" | "pa" => Ok( Command::Pause ),
            "resume" | "res" => Ok( Command::Resume ),
            "stop" | "st" => Ok( Command::Stop ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "seek" | "sk" => {
                let time_str = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                let position = parse_time( time_str )?;
                Ok( Command::Seek { position } )
            }
            "vol" | "volume" => {
                let level = args
                    .map( |s| s.parse::<u32>() )
                    .transpose()
                    .map_err( |_| CommandError::InvalidArgument( "volume must be 0-100".into() ) )?;
                Ok( Command::Volume { level } )
            }
            "speed" | "rate" => {
                let rate = args
                    .map( |s| s.trim_end_matches( 'x' ).parse::<f32>() )
                    .transpose()
                    .map_err( |_| CommandError::InvalidArgument( "speed must be a number like 1.25".into() ) )?;
                Ok( Command::Speed { rate } )
            }

            // Collections
            "like" | "fav" => Ok( Command::Like ),
            "liked" | "favs" => Ok( Command::Liked ),
            "save" => {
                let name = args
                    .ok_or_else( || CommandError::MissingArgument( "playlist name".into() ) )?;
                Ok( Command::Save { name: name.to_string() } )
            }
            "load" => {
                let name = args
                    .ok_or_else( || CommandError::MissingArgument( "playlist name".into() ) )?;
                Ok( Command::Load { name: name.to_string() } )
            }
            "playlists" | "pl" => Ok( Command::Playlists ),

            // Other
            "status" | "now" => Ok( Command::Status ),
            "help" | "h" | "?" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


/// Parses a 1-based queue position.
fn parse_position( s: &str ) -> Result<usize, CommandError> {
    match s.parse::<usize>() {
        Ok( n ) if n > 0 => Ok( n ),
        _ => Err( CommandError::InvalidArgument( format!( "Invalid queue position: {}", s ) ) ),
    }
}


/// Parses a time string like "1:30" or "90" into a Duration.
fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        Ok( Duration::from_secs( minutes * 60 + seconds ) )
    } else {
        let seconds: u64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( Duration::from_secs( seconds ) )
    }
}


/// Formats milliseconds as `M:SS`.
pub fn format_time( ms: u64 ) -> String {
    let secs = ms / 1000;
    format!( "{}:{:02}", secs / 60, secs % 60 )
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Queue Commands:
  /add <path>     Add file or folder to the queue
  /remove <n>     Remove track n from the queue
  /clear          Stop and clear the queue
  /shuffle        Toggle shuffle mode
  /repeat [mode]  Cycle or set repeat (off/one/all)
  /queue          Show the queue
  /history        Show recently played tracks

Playback Commands:
  /play [n]       Play track n, or toggle play/pause
  /pause          Pause playback
  /resume         Resume playback
  /stop           Stop playback
  /next           Next track
  /prev           Previous track (restarts after 3s)
  /seek <time>    Seek to position (e.g., 1:30)
  /vol [0-100]    Show or set volume
  /speed [rate]   Show or set speed (0.5-2.0)

Collections:
  /like           Like or unlike the current track
  /liked          Show liked songs
  /save <name>    Save the queue as a playlist
  /load <name>    Replace the queue with a playlist
  /playlists      List playlists

Other Commands:
  /status         Show what is playing
  /help           Show this help
  /quit           Exit nocturne"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_add() {
        let cmd = Command::parse( "/add /path/to/file.mp3" ).unwrap();
        assert_eq!( cmd, Command::Add { path: PathBuf::from( "/path/to/file.mp3" ) } );
    }


    #[test]
    fn test_parse_without_slash() {
        let cmd = Command::parse( "a /music" ).unwrap();
        assert_eq!( cmd, Command::Add { path: PathBuf::from( "/music" ) } );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );

        let cmd = Command::parse( "seek 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 45 ) } );
    }


    #[test]
    fn test_parse_repeat() {
        assert_eq!( Command::parse( "repeat all" ).unwrap(), Command::Repeat { mode: Some( RepeatMode::All ) } );
        assert_eq!( Command::parse( "repeat" ).unwrap(), Command::Repeat { mode: None } );
        assert!( matches!( Command::parse( "repeat twice" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_play_position() {
        assert_eq!( Command::parse( "play" ).unwrap(), Command::Play { position: None } );
        assert_eq!( Command::parse( "p 3" ).unwrap(), Command::Play { position: Some( 3 ) } );
        assert!( matches!( Command::parse( "play 0" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume_and_speed() {
        assert_eq!( Command::parse( "vol 40" ).unwrap(), Command::Volume { level: Some( 40 ) } );
        assert_eq!( Command::parse( "vol" ).unwrap(), Command::Volume { level: None } );
        assert_eq!( Command::parse( "speed 1.5x" ).unwrap(), Command::Speed { rate: Some( 1.5 ) } );
        assert!( Command::parse( "vol loud" ).is_err() );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        assert!( matches!( Command::parse( "add" ), Err( CommandError::MissingArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "save   " ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0 ), "0:00" );
        assert_eq!( format_time( 90_500 ), "1:30" );
        assert_eq!( format_time( 3_725_000 ), "62:05" );
    }
}
