use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "villain-couch",
    version,
    about = "Play media in VLC, remember where you stopped and continue with the next episode"
)]
pub struct Cli {
    /// Use this config file instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Play a media file, resuming from the stored position when known.
    Play {
        file: PathBuf,
        #[arg(long)]
        from_start: bool,
    },
    /// Resume the most recently watched file.
    Continue,
    /// Register a directory as a media library for episode lookups.
    AddWorkspace { dir: PathBuf },
    /// Show registered media libraries.
    Workspaces,
    /// Print the next episode of the most recently watched show.
    Next,
    /// Show recorded playback positions.
    List,
}
