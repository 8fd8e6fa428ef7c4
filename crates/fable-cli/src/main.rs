//! Fable CLI - Command-line interface for the fable story asset pipeline

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{asset, story, Session};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "fable")]
#[command(about = "Generate and persist story text, images and narration", long_about = None)]
#[command(version)]
struct Cli {
    /// Use the offline mock generation service
    #[arg(long, global = true)]
    mock: bool,

    /// Owner the command acts for
    #[arg(long, global = true, default_value = "guest")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Story operations
    #[command(subcommand)]
    Story(story::StoryCommands),

    /// Give a story a cover image (reuses an existing one)
    Image {
        /// Story id
        id: String,
    },

    /// Narrate a story
    Voice {
        /// Story id
        id: String,

        /// Voice style (defaults to the story's, then the configured default)
        #[arg(long)]
        voice: Option<String>,

        /// Playback speed; non-positive values mean 1.0
        #[arg(long)]
        speed: Option<f32>,
    },

    /// Black/white coloring variant of an image URL
    Bw {
        /// Image URL
        url: String,
    },

    /// Time-limited URL for a story's voice track
    VoiceUrl {
        /// Story id
        id: String,

        /// Minutes until the URL expires
        #[arg(long, default_value = "60")]
        minutes: u32,
    },

    /// Build a story's coloring template now
    Template {
        /// Story id
        id: String,
    },

    /// Check the generation service and object storage
    Health,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let session = Session::open(cli.mock, &cli.owner)?;

    match cli.command {
        Commands::Story(cmd) => story::run(&session, cmd),
        Commands::Image { id } => asset::image(&session, &id),
        Commands::Voice { id, voice, speed } => asset::voice(&session, &id, voice, speed),
        Commands::Bw { url } => asset::black_white(&session, &url),
        Commands::VoiceUrl { id, minutes } => asset::voice_url(&session, &id, minutes),
        Commands::Template { id } => asset::template(&session, &id),
        Commands::Health => asset::health(&session),
    }
}
