use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use distort_core::effect::Mode;
use distort_core::pipeline::ClockKind;
use distort_core::video::frame::Chroma;

#[derive(Parser)]
#[command(name = "distort", about = "Wave and ripple video distortion")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Distort a video file into a raw video stream.
    Render {
        /// Path to the input video file (MP4, etc.).
        #[arg(short, long)]
        input: PathBuf,

        /// Path to write the raw output frames to.
        #[arg(short, long)]
        output: PathBuf,

        /// Filter string selecting the mode, e.g. "distort:ripple".
        #[arg(short, long, default_value = "distort:wave")]
        filter: String,

        /// Mode by name, in place of --filter ("wave" or "ripple").
        #[arg(short, long, conflicts_with = "filter")]
        mode: Option<Mode>,

        /// Pixel layout to decode into. Non-planar layouts are passed through untouched.
        #[arg(long, value_enum, default_value_t = ChromaArg::I420)]
        chroma: ChromaArg,

        /// Output buffers in flight (2 = double buffering).
        #[arg(long, default_value_t = 2)]
        buffers: usize,

        /// Time source driving the animation.
        #[arg(long, value_enum, default_value_t = ClockArg::Stream)]
        clock: ClockArg,

        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<u32>,

        /// Directory to save debug frames (luma only) with overlays.
        #[arg(long)]
        debug_frames: Option<PathBuf>,

        /// TrueType font for debug overlays.
        #[arg(long)]
        font: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ChromaArg {
    I420,
    Iyuv,
    Yv12,
    I422,
    I444,
    Yuy2,
    Rgb24,
}

impl From<ChromaArg> for Chroma {
    fn from(arg: ChromaArg) -> Self {
        match arg {
            ChromaArg::I420 => Chroma::I420,
            ChromaArg::Iyuv => Chroma::Iyuv,
            ChromaArg::Yv12 => Chroma::Yv12,
            ChromaArg::I422 => Chroma::I422,
            ChromaArg::I444 => Chroma::I444,
            ChromaArg::Yuy2 => Chroma::Yuy2,
            ChromaArg::Rgb24 => Chroma::Rgb24,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ClockArg {
    /// Frame timestamps; the same input always gives the same output.
    Stream,
    /// Real time spent processing.
    Wall,
}

impl From<ClockArg> for ClockKind {
    fn from(arg: ClockArg) -> Self {
        match arg {
            ClockArg::Stream => ClockKind::Stream,
            ClockArg::Wall => ClockKind::Wall,
        }
    }
}

/// The filter string to run with: `--mode` wins over `--filter`.
pub fn effective_filter(filter: String, mode: Option<Mode>) -> String {
    match mode {
        Some(mode) => format!("distort:{mode}"),
        None => filter,
    }
}
