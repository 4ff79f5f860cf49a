//! Nocturne CLI - line-driven music player

mod backend;
mod cli;
mod command;
mod library;
mod settings;

use std::path::{ Path, PathBuf };
use std::sync::{ Arc, Mutex, PoisonError };

use anyhow::{ Context, Result };
use clap::Parser;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::mpsc;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

use nocturne_core::{
    JsonFileStore, PersistenceGateway, PlaybackEngine, PlaybackSnapshot, PlaylistStore, RepeatMode,
    Track,
};

use backend::LocalBackend;
use cli::Args;
use command::{ format_time, help_text, Command };
use settings::Settings;


/// Application state for the command loop.
struct App {
    engine: PlaybackEngine,
    playlists: PlaylistStore,
}


impl App {
    /// Runs one command. Returns false when the player should exit.
    async fn run_command( &mut self, cmd: Command ) -> Result<bool> {
        match cmd {
            // Queue commands
            Command::Add { path } => {
                let tracks = load_tracks( path ).await?;
                let count = tracks.len();
                for track in tracks {
                    self.engine.add_to_queue( track );
                }
                println!( "Added {} track(s)", count );
            }
            Command::Remove { position } => {
                if self.engine.remove_from_queue( position - 1 ).await {
                    println!( "Removed track {}", position );
                } else {
                    println!( "No track at position {}", position );
                }
            }
            Command::Clear => {
                self.engine.clear_queue().await;
                println!( "Queue cleared" );
            }
            Command::Shuffle => {
                let on = self.engine.toggle_shuffle();
                println!( "Shuffle: {}", if on { "on" } else { "off" } );
            }
            Command::Repeat { mode } => {
                let mode = match mode {
                    Some( target ) => {
                        // Cycling visits every mode within three steps
                        let mut current = self.engine.repeat_mode();
                        while current != target {
                            current = self.engine.toggle_repeat();
                        }
                        current
                    }
                    None => self.engine.toggle_repeat(),
                };
                println!( "Repeat: {}", mode );
            }
            Command::Queue => print_queue( &self.engine.snapshot() ),
            Command::History => {
                let history = self.engine.history();
                if history.is_empty() {
                    println!( "Nothing played yet" );
                }
                for ( i, track ) in history.iter().enumerate() {
                    println!( "{:>3}. {}", i + 1, describe( track ) );
                }
            }

            // Playback commands
            Command::Play { position: Some( position ) } => {
                if !self.engine.play_index( position - 1 ).await {
                    println!( "No track at position {}", position );
                }
            }
            Command::Play { position: None } => self.engine.toggle_play().await,
            Command::Pause => {
                self.engine.pause().await;
                println!( "Paused" );
            }
            Command::Resume => self.engine.resume().await,
            Command::Stop => {
                self.engine.stop().await;
                println!( "Stopped" );
            }
            Command::Next => {
                if !self.engine.next().await {
                    println!( "End of queue" );
                }
            }
            Command::Prev => {
                if !self.engine.prev().await {
                    println!( "Start of queue" );
                }
            }
            Command::Seek { position } => {
                let position_ms = u64::try_from( position.as_millis() ).unwrap_or( u64::MAX );
                self.engine.seek( position_ms ).await;
                println!( "Seeked to {}", format_time( self.engine.snapshot().progress_ms ) );
            }
            Command::Volume { level } => {
                let volume = match level {
                    Some( level ) => self.engine.set_volume( level as f32 / 100.0 ).await,
                    None => self.engine.volume(),
                };
                println!( "Volume: {}%", ( volume * 100.0 ).round() as u32 );
            }
            Command::Speed { rate } => {
                let speed = match rate {
                    Some( rate ) => self.engine.set_playback_speed( rate ).await,
                    None => self.engine.playback_speed(),
                };
                println!( "Speed: {:.2}x", speed );
            }

            // Collections
            Command::Like => {
                let Some( track ) = self.engine.snapshot().current_track else {
                    println!( "Nothing is playing" );
                    return Ok( true );
                };
                match self.engine.liked_songs().toggle( &track ) {
                    Some( true ) => println!( "Liked {}", track.label() ),
                    Some( false ) => println!( "Unliked {}", track.label() ),
                    None => println!( "Could not update liked songs" ),
                }
            }
            Command::Liked => {
                let liked = self.engine.liked_songs().all();
                if liked.is_empty() {
                    println!( "No liked songs" );
                }
                for ( i, track ) in liked.iter().enumerate() {
                    println!( "{:>3}. {}", i + 1, describe( track ) );
                }
            }
            Command::Save { name } => {
                let queue = self.engine.queue();
                if queue.is_empty() {
                    println!( "Queue is empty" );
                    return Ok( true );
                }
                let id = match self.playlists.find_by_name( &name ) {
                    Some( existing ) => existing.id.clone(),
                    None => self.playlists.create( name.as_str() ).id,
                };
                let existing: Vec<String> = self.playlists.tracks( &id ).into_iter().map( |t| t.id ).collect();
                for track in existing {
                    self.playlists.remove_track( &id, &track );
                }
                let count = queue.len();
                for track in queue {
                    self.playlists.add_track( &id, track );
                }
                println!( "Saved {} track(s) to {}", count, name );
            }
            Command::Load { name } => {
                let Some( playlist ) = self.playlists.find_by_name( &name ) else {
                    println!( "No playlist named {}", name );
                    return Ok( true );
                };
                let tracks = playlist.tracks.clone();
                if tracks.is_empty() {
                    println!( "{} is empty", playlist.name );
                    return Ok( true );
                }
                self.engine.set_queue( tracks, 0 );
                self.engine.play_index( 0 ).await;
            }
            Command::Playlists => {
                for playlist in self.playlists.playlists() {
                    println!( "{} ({} tracks)", playlist.name, playlist.tracks.len() );
                }
            }

            // Other
            Command::Status => print_status( &self.engine.snapshot() ),
            Command::Help => println!( "{}", help_text() ),
            Command::Quit => return Ok( false ),
        }
        Ok( true )
    }


    fn track_started( &mut self, track: Track ) {
        println!( "Now playing: {}", describe( &track ) );
        self.playlists.add_to_recently_played( track );
    }
}


/// Scans `path` and probes every file off the async runtime.
async fn load_tracks( path: PathBuf ) -> Result<Vec<Track>> {
    let tracks = tokio::task::spawn_blocking( move || -> Result<Vec<Track>> {
        let files = library::scan( &path )?;
        Ok( files.iter().map( |file| library::track_from_path( file ) ).collect() )
    })
    .await??;
    Ok( tracks )
}


fn describe( track: &Track ) -> String {
    let mut text = track.label().to_string();
    if !track.artist.is_empty() {
        text.push_str( " - " );
        text.push_str( &track.artist );
    }
    if let Some( duration_ms ) = track.duration_ms {
        text.push_str( &format!( " [{}]", format_time( duration_ms ) ) );
    }
    text
}


fn print_queue( snapshot: &PlaybackSnapshot ) {
    if snapshot.queue.is_empty() {
        println!( "Queue is empty" );
        return;
    }
    for ( i, track ) in snapshot.queue.iter().enumerate() {
        let marker = if snapshot.current_index == Some( i ) { ">" } else { " " };
        println!( "{} {:>3}. {}", marker, i + 1, describe( track ) );
    }
}


fn print_status( snapshot: &PlaybackSnapshot ) {
    let Some( track ) = &snapshot.current_track else {
        println!( "Nothing is playing" );
        return;
    };

    let state = if snapshot.is_buffering {
        "Loading"
    } else if snapshot.is_playing {
        "Playing"
    } else {
        "Paused"
    };

    println!(
        "{}: {} {} / {}",
        state,
        describe( track ),
        format_time( snapshot.progress_ms ),
        format_time( snapshot.duration_ms() ),
    );

    let mut modes = Vec::new();
    if snapshot.repeat_mode != RepeatMode::Off {
        modes.push( format!( "repeat {}", snapshot.repeat_mode ) );
    }
    if snapshot.shuffle_mode {
        modes.push( "shuffle".to_string() );
    }
    if snapshot.playback_speed != 1.0 {
        modes.push( format!( "{:.2}x", snapshot.playback_speed ) );
    }
    modes.push( format!( "vol {}%", ( snapshot.volume * 100.0 ).round() as u32 ) );
    println!( "  {}", modes.join( ", " ) );
}


fn init_tracing( verbose: bool ) {
    let default = if verbose { "nocturne=debug,nocturne_core=debug" } else { "nocturne=info,nocturne_core=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else( |_| default.into() ),
        )
        .with( tracing_subscriber::fmt::layer().with_writer( std::io::stderr ) )
        .init();
}


fn state_path( args: &Args ) -> Result<PathBuf> {
    args.state
        .clone()
        .or_else( JsonFileStore::default_path )
        .context( "Could not determine a data directory; pass --state" )
}


fn settings( config: Option<&Path> ) -> Settings {
    match config {
        Some( path ) => Settings::load_from( path ),
        None => {
            let settings = Settings::load();
            settings.ensure_saved();
            settings
        }
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing( args.verbose );

    let settings = settings( args.config.as_deref() );
    let path = state_path( &args )?;
    let store = Arc::new(
        JsonFileStore::open( path.clone() )
            .with_context( || format!( "Failed to open state file {}", path.display() ) )?,
    );
    tracing::info!( "Using state file {}", path.display() );

    let engine = PlaybackEngine::new( Arc::new( LocalBackend::new() ), store.clone(), settings.engine );
    let playlists = PlaylistStore::load( PersistenceGateway::new( store ) );

    // Report each newly started track to the command loop
    let ( started_tx, mut started_rx ) = mpsc::unbounded_channel::<Track>();
    let last_started: Mutex<Option<String>> = Mutex::new( None );
    let _subscription = engine.subscribe( move |snapshot| {
        if !snapshot.is_playing {
            return;
        }
        let Some( track ) = &snapshot.current_track else {
            return;
        };
        let mut last = last_started.lock().unwrap_or_else( PoisonError::into_inner );
        if last.as_deref() != Some( track.id.as_str() ) {
            *last = Some( track.id.clone() );
            let _ = started_tx.send( track.clone() );
        }
    });

    let mut app = App { engine, playlists };

    if !args.files.is_empty() {
        let mut tracks = Vec::new();
        for file in &args.files {
            match load_tracks( file.clone() ).await {
                Ok( found ) => tracks.extend( found ),
                Err( e ) => eprintln!( "Skipping {}: {}", file.display(), e ),
            }
        }
        if !tracks.is_empty() {
            app.engine.set_queue( tracks, 0 );
            app.engine.play_index( 0 ).await;
        }
    } else if let Some( track ) = app.engine.snapshot().current_track {
        println!( "Restored {} (use /play to resume)", describe( &track ) );
    }

    println!( "Type /help for commands" );

    let mut lines = BufReader::new( tokio::io::stdin() ).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some( line ) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse( &line ) {
                    Ok( cmd ) => match app.run_command( cmd ).await {
                        Ok( true ) => {}
                        Ok( false ) => break,
                        Err( e ) => println!( "Error: {}", e ),
                    },
                    Err( e ) => println!( "{}", e ),
                }
            }
            Some( track ) = started_rx.recv() => app.track_started( track ),
        }
    }

    app.engine.stop().await;
    Ok(())
}
