//! Analyze sampled frames of a video file

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use video_emotion_decoder::{sample, FfmpegVideoSource};
use video_emotion_pipeline::{EmotionSummary, VideoAnalysisResult};

use super::{format_frame, ModelArgs};

#[derive(Args)]
pub struct AnalyzeCommand {
    /// Input video file
    #[arg(value_name = "VIDEO")]
    input: PathBuf,

    /// Analyze every Nth frame
    #[arg(short, long, default_value = "10")]
    interval: NonZeroU32,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Serialize)]
struct AnalysisReport<'a> {
    video: String,
    interval: u32,
    frames: &'a VideoAnalysisResult,
    summary: &'a EmotionSummary,
}

impl AnalyzeCommand {
    pub fn execute(self) -> Result<()> {
        if !self.input.is_file() {
            anyhow::bail!("Input file does not exist: {}", self.input.display());
        }

        let pipeline = self.models.load_pipeline()?;

        let start = Instant::now();
        let mut frames = sample(&FfmpegVideoSource::new(), &self.input, self.interval)
            .with_context(|| format!("Failed to open {}", self.input.display()))?;
        let results = pipeline.analyze_many(frames.by_ref());
        if let Some(e) = frames.take_error() {
            return Err(e).context("Video is corrupt; results would be incomplete");
        }
        let summary = EmotionSummary::from_results(&results);
        info!(
            "Analyzed {} frames in {:.2}s",
            results.len(),
            start.elapsed().as_secs_f64()
        );

        if self.json {
            let report = AnalysisReport {
                video: self.input.display().to_string(),
                interval: self.interval.get(),
                frames: &results,
                summary: &summary,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        for result in &results {
            println!("{}", format_frame(result));
        }
        println!();
        println!(
            "{} frames analyzed (every {} frame(s))",
            summary.total_frames, self.interval
        );
        for count in &summary.emotions {
            println!(
                "  {:<16} {:>5}  {:>5.1}%",
                count.emotion, count.frames, count.percentage
            );
        }
        if let Some(dominant) = summary.dominant() {
            println!("Dominant emotion: {}", dominant.emotion);
        }

        Ok(())
    }
}
