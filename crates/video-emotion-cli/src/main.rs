//! Video Emotion CLI
//!
//! Offline front end to the analysis pipeline: analyze a video file or a
//! single image synchronously and print the per-frame emotions.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::analyze::AnalyzeCommand;
use commands::image::ImageCommand;

#[derive(Parser)]
#[command(
    name = "video-emotion",
    version,
    about = "Facial emotion analysis for video files",
    after_help = "EXAMPLES:\n  \
                  # Every 10th frame of a clip\n  \
                  video-emotion analyze interview.mp4\n\n  \
                  # Every 5th frame, JSON output\n  \
                  video-emotion analyze --interval 5 --json interview.mp4\n\n  \
                  # FER+ model with its own label order\n  \
                  video-emotion analyze --preset ferplus --classifier-model emotion-ferplus-8.onnx clip.mov\n\n  \
                  # One still image\n  \
                  video-emotion image portrait.jpg"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze sampled frames of a video
    Analyze(AnalyzeCommand),

    /// Analyze a single image
    Image(ImageCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Analyze(cmd) => cmd.execute(),
        Commands::Image(cmd) => cmd.execute(),
    }
}
