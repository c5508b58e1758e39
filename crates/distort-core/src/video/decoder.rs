use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::{debug, error, info, warn};

use super::frame::{AspectRatio, Chroma, Frame, FrameFormat, Plane};
use crate::effect::clock::Ticks;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Video metadata obtained by probing with ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Sample (pixel) aspect ratio, 1:1 when the container doesn't say.
    pub sample_aspect: AspectRatio,
}

impl ProbeResult {
    /// Display aspect ratio: frame size scaled by the sample aspect.
    pub fn display_aspect(&self) -> AspectRatio {
        AspectRatio {
            numerator: self.width * self.sample_aspect.numerator,
            denominator: (self.height * self.sample_aspect.denominator).max(1),
        }
    }
}

pub fn probe(path: &Path) -> Result<ProbeResult> {
    info!(?path, "probing video metadata with ffprobe");

    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate,sample_aspect_ratio",
            "-of", "csv=p=0",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .context("failed to run ffprobe — is ffmpeg installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, ?path, "ffprobe failed");
        bail!("ffprobe failed: {stderr}");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let result = parse_probe_output(&stdout)?;
    info!(
        width = result.width,
        height = result.height,
        fps = result.fps,
        "probe completed"
    );
    Ok(result)
}

/// Parse ffprobe's `width,height,num/den[,sar_num:sar_den]` line.
pub fn parse_probe_output(stdout: &str) -> Result<ProbeResult> {
    let parts: Vec<&str> = stdout.trim().split(',').collect();
    if parts.len() < 3 {
        error!(%stdout, "unexpected ffprobe output format, expected width,height,fps");
        bail!("unexpected ffprobe output: {stdout}");
    }

    let width: u32 = parts[0].parse().context("failed to parse width")?;
    let height: u32 = parts[1].parse().context("failed to parse height")?;

    let fps = if let Some((num, den)) = parts[2].split_once('/') {
        let num: f64 = num.parse().context("failed to parse fps numerator")?;
        let den: f64 = den.parse().context("failed to parse fps denominator")?;
        if den > 0.0 { num / den } else { 0.0 }
    } else {
        parts[2].parse().context("failed to parse fps")?
    };

    if fps <= 0.0 {
        warn!(fps, "video has non-positive fps, timestamps will be 0");
    }

    // "N/A" or "0:1" mean the container didn't specify one.
    let sample_aspect = parts
        .get(3)
        .and_then(|sar| sar.split_once(':'))
        .and_then(|(n, d)| Some((n.parse::<u32>().ok()?, d.parse::<u32>().ok()?)))
        .filter(|&(n, d)| n > 0 && d > 0)
        .map(|(numerator, denominator)| AspectRatio {
            numerator,
            denominator,
        })
        .unwrap_or(AspectRatio {
            numerator: 1,
            denominator: 1,
        });

    Ok(ProbeResult {
        width,
        height,
        fps,
        sample_aspect,
    })
}

/// Anything that produces decoded frames of one fixed format.
pub trait FrameSource {
    fn format(&self) -> &FrameFormat;

    /// The next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Decodes video frames by piping raw planar data from the ffmpeg CLI.
pub struct VideoDecoder {
    child: Child,
    format: FrameFormat,
    fps: f64,
    frame_count: u32,
    frame_bytes: usize,
}

impl VideoDecoder {
    /// Open a video file, asking ffmpeg for frames laid out as `chroma`.
    pub fn open(path: &Path, chroma: Chroma) -> Result<Self> {
        if !path.exists() {
            bail!("video file does not exist: {}", path.display());
        }

        let info = probe(path)?;
        if info.width == 0 || info.height == 0 {
            bail!("invalid video dimensions: {}x{}", info.width, info.height);
        }

        let format = FrameFormat {
            chroma,
            width: info.width,
            height: info.height,
            aspect: info.display_aspect(),
        };

        info!(?path, pix_fmt = chroma.ffmpeg_pix_fmt(), "spawning ffmpeg decoder process");

        let child = Command::new("ffmpeg")
            .args(["-i"])
            .arg(path)
            .args([
                "-f", "rawvideo",
                "-pix_fmt", chroma.ffmpeg_pix_fmt(),
                "-v", "error",
                "pipe:1",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn ffmpeg — is ffmpeg installed?")?;

        let frame_bytes = format.frame_bytes();

        info!(
            width = info.width,
            height = info.height,
            %chroma,
            fps = info.fps,
            frame_bytes,
            "video decoder opened"
        );

        Ok(Self {
            child,
            format,
            fps: info.fps,
            frame_count: 0,
            frame_bytes,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

impl FrameSource for VideoDecoder {
    fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Read the next frame from the ffmpeg pipe, or `None` if the video is finished.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .context("ffmpeg stdout not available")?;

        let mut buf = vec![0u8; self.frame_bytes];
        let mut read = 0;

        while read < self.frame_bytes {
            match stdout.read(&mut buf[read..]) {
                Ok(0) => {
                    if read == 0 {
                        info!(total_frames = self.frame_count, "video stream ended");
                        return Ok(None);
                    }
                    error!(
                        read_bytes = read,
                        expected_bytes = self.frame_bytes,
                        frame = self.frame_count,
                        "ffmpeg stream ended mid-frame"
                    );
                    bail!(
                        "ffmpeg stream ended mid-frame (read {read}/{} bytes)",
                        self.frame_bytes,
                    );
                }
                Ok(n) => read += n,
                Err(e) => {
                    error!(frame = self.frame_count, %e, "failed to read from ffmpeg pipe");
                    return Err(e).context("failed to read from ffmpeg pipe");
                }
            }
        }

        let mut frame = split_planes(self.format, buf)?;
        frame.frame_number = self.frame_count;
        frame.pts = Some(frame_pts(self.frame_count, self.fps));
        self.frame_count += 1;

        debug!(frame_number = frame.frame_number, pts = ?frame.pts, "decoded frame");

        Ok(Some(frame))
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        info!(total_frames = self.frame_count, "closing video decoder");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Presentation time of frame `n` at `fps`, in ticks.
fn frame_pts(frame_number: u32, fps: f64) -> Ticks {
    if fps > 0.0 {
        (frame_number as f64 * MICROS_PER_SECOND / fps).round() as Ticks
    } else {
        0
    }
}

/// Cut one contiguous raw frame into its planes.
fn split_planes(format: FrameFormat, buf: Vec<u8>) -> Result<Frame> {
    let layout = format.chroma.plane_layout(format.width, format.height);
    let mut planes = Vec::with_capacity(layout.len());
    let mut rest = buf.as_slice();
    for (line_bytes, lines) in layout {
        let (head, tail) = rest.split_at(line_bytes * lines);
        planes.push(Plane::new(head.to_vec(), line_bytes));
        rest = tail;
    }

    // ffmpeg's yuv420p is Y, U, V; YV12 wants Y, V, U.
    if format.chroma == Chroma::Yv12 {
        planes.swap(1, 2);
    }

    Frame::from_planes(format, planes).context("decoded frame does not match its format")
}
