//! Cutline CLI: create, inspect, and export timeline projects.
//!
//! Usage:
//!   cutline init <NAME>              Create an empty project
//!   cutline info <ID>                Show project information
//!   cutline validate <ID>            Check a project for problems
//!   cutline import <ID> <FILE>       Add a media file and place it on a track
//!   cutline export <ID>              Render the active sequence to a file
//!   cutline check                    Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cutline_common::{EngineConfig, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "cutline",
    about = "Non-linear timeline editing and rendering",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project store directory (defaults to the configured projects dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new empty project
    Init {
        /// Project name
        name: String,

        /// Sequence width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Sequence height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Sequence frame rate
        #[arg(long, default_value = "30")]
        fps: f64,
    },

    /// Show project information
    Info {
        /// Project id
        id: String,
    },

    /// Validate a stored project
    Validate {
        /// Project id
        id: String,
    },

    /// Import a media file and append it to a track
    Import {
        /// Project id
        id: String,

        /// Media file to import
        file: PathBuf,

        /// Target track id (defaults to the first compatible track)
        #[arg(long)]
        track: Option<String>,

        /// Timeline position in seconds (defaults to the end of the track)
        #[arg(long)]
        at: Option<f64>,
    },

    /// Export the active sequence to a video file
    Export {
        /// Project id
        id: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: mp4-h264|mp4-h265|webm|gif
        #[arg(long, default_value = "mp4-h264")]
        format: String,

        /// Output resolution: sequence|480p|720p|1080p|1440p|2160p
        #[arg(long, default_value = "sequence")]
        resolution: String,

        /// Quality preset: low|medium|high
        #[arg(long, default_value = "medium")]
        quality: String,

        /// Aspect ratio: sequence|16:9|9:16|1:1|4:3
        #[arg(long, default_value = "sequence")]
        aspect: String,

        /// Leave the audio track out
        #[arg(long)]
        no_audio: bool,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load();

    let logging = if cli.verbose {
        LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        }
    } else {
        config.logging.clone()
    };
    cutline_common::logging::init_logging(&logging);

    let store = commands::open_store(cli.store, &config);

    match cli.command {
        Commands::Init {
            name,
            width,
            height,
            fps,
        } => commands::init::run(&store, name, width, height, fps),
        Commands::Info { id } => commands::info::run(&store, &id),
        Commands::Validate { id } => commands::validate::run(&store, &id),
        Commands::Import { id, file, track, at } => {
            commands::import::run(&store, &config, &id, file, track, at).await
        }
        Commands::Export {
            id,
            output,
            format,
            resolution,
            quality,
            aspect,
            no_audio,
        } => {
            let options = commands::export::parse_options(
                &format,
                &resolution,
                &quality,
                &aspect,
                !no_audio,
            )?;
            commands::export::run(&store, &config, &id, output, options).await
        }
        Commands::Check => commands::check::run(&store),
    }
}
