mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use distort_core::adapter::StopSignal;
use distort_core::pipeline::{self, PipelineConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Render {
            input,
            output,
            filter,
            mode,
            chroma,
            buffers,
            clock,
            max_frames,
            debug_frames,
            font,
        } => {
            let filter = cli::effective_filter(filter, mode);
            info!(?input, ?output, %filter, ?max_frames, "starting render");

            let defaults = PipelineConfig::default();
            let config = PipelineConfig {
                filter,
                chroma: chroma.into(),
                buffers,
                clock: clock.into(),
                max_frames,
                debug_frames_dir: debug_frames,
                font_path: font.unwrap_or(defaults.font_path.clone()),
                ..defaults
            };

            let stop = StopSignal::new();
            let summary = pipeline::run_pipeline(&input, &output, &config, &stop)
                .context("pipeline failed")?;

            if summary.frames_written == 0 {
                warn!("no frames written");
            }
            if summary.passthrough() {
                warn!(chroma = %config.chroma, "effect not applied, output is the unmodified input");
            }

            info!(
                mode = ?summary.mode,
                frames_read = summary.frames_read,
                frames_written = summary.frames_written,
                ?output,
                "render complete"
            );

            Ok(())
        }
    }
}
