//! Analyze one still image

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;

use super::{format_frame, ModelArgs};

#[derive(Args)]
pub struct ImageCommand {
    /// Input image (JPEG or PNG)
    #[arg(value_name = "IMAGE")]
    input: PathBuf,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    models: ModelArgs,
}

impl ImageCommand {
    pub fn execute(self) -> Result<()> {
        let image = ::image::open(&self.input)
            .with_context(|| format!("Failed to read image {}", self.input.display()))?
            .to_rgb8();

        let pipeline = self.models.load_pipeline()?;
        let result = pipeline.analyze_image(&image, 0);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }

        println!("{}", format_frame(&result));
        if let Some(scores) = result.scores() {
            for (label, score) in scores {
                println!("  {label:<16} {score:.3}");
            }
        }
        Ok(())
    }
}
