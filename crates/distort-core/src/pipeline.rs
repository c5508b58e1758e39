use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::adapter::{
    AdapterConfig, FrameOutcome, PipelineAdapter, StopSignal, DEFAULT_DISPLAY_LATENCY,
    DEFAULT_POLL_INTERVAL,
};
use crate::debug::{DebugRenderer, DebugTapSink, DEFAULT_FONT_PATH};
use crate::effect::clock::{ManualClock, MonotonicClock, Ticks, TimeSource};
use crate::effect::mode::{select_mode, Mode};
use crate::effect::scanline::FillValues;
use crate::error::DistortError;
use crate::video::decoder::{FrameSource, VideoDecoder};
use crate::video::frame::{Chroma, Frame, FrameFormat};
use crate::video::sink::{FrameSink, RawVideoSink, DEFAULT_BUFFER_COUNT};

/// Where the animation clock reads time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockKind {
    /// Each frame's presentation timestamp. Output is reproducible.
    #[default]
    Stream,
    /// Real elapsed time while processing.
    Wall,
}

/// Parameters for the distort pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Filter string carrying the mode, e.g. `distort:ripple`.
    pub filter: String,
    /// Layout to request from the decoder.
    pub chroma: Chroma,
    /// Output buffers the sink may have in flight.
    pub buffers: usize,
    pub poll_interval: Duration,
    pub display_latency: Ticks,
    pub fill: FillValues,
    pub clock: ClockKind,
    /// Maximum number of frames to process, or None for the entire video.
    pub max_frames: Option<u32>,
    /// Directory to write debug frame images, or None to skip.
    pub debug_frames_dir: Option<PathBuf>,
    pub font_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter: "distort:wave".to_string(),
            chroma: Chroma::I420,
            buffers: DEFAULT_BUFFER_COUNT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            display_latency: DEFAULT_DISPLAY_LATENCY,
            fill: FillValues::default(),
            clock: ClockKind::Stream,
            max_frames: None,
            debug_frames_dir: None,
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
        }
    }
}

/// What a pipeline run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Mode applied, or `None` when frames were passed through.
    pub mode: Option<Mode>,
    pub frames_read: u32,
    pub frames_written: u32,
    pub frames_abandoned: u32,
}

impl PipelineSummary {
    fn new(mode: Option<Mode>) -> Self {
        Self {
            mode,
            frames_read: 0,
            frames_written: 0,
            frames_abandoned: 0,
        }
    }

    pub fn passthrough(&self) -> bool {
        self.mode.is_none()
    }
}

/// Distort a video file into a raw video file.
pub fn run_pipeline(
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
    stop: &StopSignal,
) -> Result<PipelineSummary> {
    if !input.exists() {
        bail!("input video does not exist: {}", input.display());
    }

    info!(
        ?input,
        ?output,
        filter = %config.filter,
        chroma = %config.chroma,
        max_frames = ?config.max_frames,
        "pipeline starting"
    );

    let mut decoder =
        VideoDecoder::open(input, config.chroma).context("failed to open video")?;

    let summary = run_stream(&mut decoder, config, stop, |buffers| {
        open_raw_output(output, buffers)
    })?;

    info!(
        frames_read = summary.frames_read,
        frames_written = summary.frames_written,
        passthrough = summary.passthrough(),
        ?output,
        "pipeline complete"
    );
    Ok(summary)
}

fn open_raw_output(output: &Path, buffers: usize) -> Result<RawVideoSink<BufWriter<File>>> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create output directory")?;
    }
    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    Ok(RawVideoSink::new(BufWriter::new(file), buffers))
}

/// Run every frame of `source` through the effect into a sink made by `open_output`.
///
/// `open_output` gets the number of buffers the sink should keep. When the
/// source's format can't be distorted, frames are written through unchanged.
pub fn run_stream<Src, W, F>(
    source: &mut Src,
    config: &PipelineConfig,
    stop: &StopSignal,
    open_output: F,
) -> Result<PipelineSummary>
where
    Src: FrameSource,
    W: Write + 'static,
    F: Fn(usize) -> Result<RawVideoSink<W>>,
{
    if config.buffers < 1 {
        bail!("buffers must be >= 1, got {}", config.buffers);
    }

    let format: FrameFormat = *source.format();
    let mode = select_mode(&config.filter);
    let adapter_config = AdapterConfig {
        mode,
        fill: config.fill,
        poll_interval: config.poll_interval,
        display_latency: config.display_latency,
    };

    let stream_clock = ManualClock::new(0);
    let wall_clock = MonotonicClock::new();
    let clock: &dyn TimeSource = match config.clock {
        ClockKind::Stream => &stream_clock,
        ClockKind::Wall => &wall_clock,
    };

    let open_sink = |_: &FrameFormat| -> Result<Box<dyn FrameSink>> {
        let raw = open_output(config.buffers)?;
        let Some(dir) = &config.debug_frames_dir else {
            return Ok(Box::new(raw));
        };
        std::fs::create_dir_all(dir).context("failed to create debug frames directory")?;
        info!(?dir, "debug frames directory ready");
        let renderer = DebugRenderer::new(&config.font_path);
        Ok(Box::new(DebugTapSink::new(raw, renderer, dir.clone(), mode)))
    };

    // A local, not a match temporary: the adapter must drop before the clocks it borrows.
    let opened = PipelineAdapter::open(adapter_config, format, open_sink, clock, stop.clone());
    match opened {
        Ok(mut adapter) => {
            let summary = distort_frames(source, &mut adapter, &stream_clock, config, stop);
            adapter.close();
            summary
        }
        Err(e @ DistortError::UnsupportedChroma(_)) => {
            warn!(error = %e, "distort unavailable, passing frames through unmodified");
            let mut sink = open_output(1)?;
            let summary = passthrough_frames(source, &mut sink, config, stop);
            sink.destroy();
            summary
        }
        Err(e) => Err(e).context("failed to set up distort stage"),
    }
}

fn next_input<Src: FrameSource>(
    source: &mut Src,
    frames_read: u32,
    config: &PipelineConfig,
    stop: &StopSignal,
) -> Result<Option<Frame>> {
    if let Some(max) = config.max_frames {
        if frames_read >= max {
            return Ok(None);
        }
    }
    if stop.should_abort() {
        info!(frames_read, "stop requested, ending stream");
        return Ok(None);
    }
    source.next_frame()
}

fn distort_frames<Src: FrameSource, S: FrameSink, C: TimeSource>(
    source: &mut Src,
    adapter: &mut PipelineAdapter<S, C>,
    stream_clock: &ManualClock,
    config: &PipelineConfig,
    stop: &StopSignal,
) -> Result<PipelineSummary> {
    let mut summary = PipelineSummary::new(Some(adapter.mode()));

    while let Some(frame) = next_input(source, summary.frames_read, config, stop)? {
        summary.frames_read += 1;
        stream_clock.set(frame.pts.unwrap_or_default());

        match adapter
            .process_frame(&frame)
            .context("distort stage failed")?
        {
            FrameOutcome::Delivered { pts, stats } => {
                summary.frames_written += 1;
                debug!(
                    frame_number = frame.frame_number,
                    pts,
                    phase = stats.phase,
                    displaced_lines = stats.displaced_lines,
                    "frame processed"
                );
            }
            FrameOutcome::Abandoned => {
                summary.frames_abandoned += 1;
                break;
            }
        }
    }

    Ok(summary)
}

fn passthrough_frames<Src: FrameSource, W: Write>(
    source: &mut Src,
    sink: &mut RawVideoSink<W>,
    config: &PipelineConfig,
    stop: &StopSignal,
) -> Result<PipelineSummary> {
    let mut summary = PipelineSummary::new(None);

    while let Some(frame) = next_input(source, summary.frames_read, config, stop)? {
        summary.frames_read += 1;
        sink.write_frame(&frame)
            .context("failed to write passthrough frame")?;
        summary.frames_written += 1;
    }

    Ok(summary)
}
