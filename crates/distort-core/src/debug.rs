use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{bail, Context, Result};
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use crate::effect::clock::Ticks;
use crate::effect::engine::TransformStats;
use crate::effect::mode::Mode;
use crate::effect::scanline::ripple_first_line;
use crate::error::DistortResult;
use crate::video::frame::{Frame, FrameFormat};
use crate::video::sink::FrameSink;

/// Font tried when none is configured.
pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf";

const TEXT_SCALE: f32 = 18.0;
const TEXT_COLOR: Luma<u8> = Luma([255]);
const BAND_COLOR: Luma<u8> = Luma([255]);
const TEXT_LINE_HEIGHT: i32 = 20;

/// What to print on a debug frame.
#[derive(Debug, Clone, Copy)]
pub struct DebugOverlay {
    pub mode: Mode,
    pub pts: Option<Ticks>,
    /// Missing when the frame never went through the effect.
    pub stats: Option<TransformStats>,
}

/// Saves the luma plane of frames as grayscale PNGs with the effect's state drawn on top.
pub struct DebugRenderer {
    font: Option<FontVec>,
}

impl DebugRenderer {
    pub fn new(font_path: &Path) -> Self {
        let font = Self::load_font(font_path);
        Self { font }
    }

    pub fn save_frame(&self, frame: &Frame, overlay: &DebugOverlay, dir: &Path) -> Result<()> {
        let mut img = luma_image(frame)?;

        if overlay.mode == Mode::Ripple {
            let first = ripple_first_line(img.height() as usize) as u32;
            let band_h = img.height() - first;
            if band_h > 0 && img.width() > 0 {
                let rect = Rect::at(0, first as i32).of_size(img.width(), band_h);
                draw_hollow_rect_mut(&mut img, rect, BAND_COLOR);
            }
        }

        self.draw_text_overlay(&mut img, frame, overlay);

        let path = dir.join(format!("frame_{:08}.png", frame.frame_number));
        img.save(&path)
            .with_context(|| format!("failed to save debug frame to {}", path.display()))?;

        debug!(?path, "saved debug frame");
        Ok(())
    }

    fn draw_text_overlay(&self, img: &mut GrayImage, frame: &Frame, overlay: &DebugOverlay) {
        let Some(font) = &self.font else { return };
        let scale = PxScale::from(TEXT_SCALE);
        let x = 8;
        let mut y = 8;

        let mut lines = vec![
            format!("F:{}", frame.frame_number),
            format!("mode:{}", overlay.mode),
        ];
        if let Some(stats) = overlay.stats {
            lines.push(format!("phase:{:.3}", stats.phase));
            lines.push(format!("displaced:{}", stats.displaced_lines));
        }
        lines.push(match overlay.pts {
            Some(pts) => format!("pts:{pts}"),
            None => "pts:--".to_string(),
        });
        for text in &lines {
            draw_text_mut(img, TEXT_COLOR, x, y, scale, font, text);
            y += TEXT_LINE_HEIGHT;
        }
    }

    fn load_font(path: &Path) -> Option<FontVec> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!(?path, error = %e, "failed to read font file");
                return None;
            }
        };
        match FontVec::try_from_vec(data) {
            Ok(font) => {
                info!(?path, "loaded debug font");
                Some(font)
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to parse font file");
                None
            }
        }
    }
}

/// Sink wrapper that saves every delivered frame as a debug image first.
pub struct DebugTapSink<S: FrameSink> {
    inner: S,
    renderer: DebugRenderer,
    dir: PathBuf,
    mode: Mode,
    pending: Option<TransformStats>,
}

impl<S: FrameSink> DebugTapSink<S> {
    pub fn new(inner: S, renderer: DebugRenderer, dir: PathBuf, mode: Mode) -> Self {
        Self {
            inner,
            renderer,
            dir,
            mode,
            pending: None,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: FrameSink> FrameSink for DebugTapSink<S> {
    fn create_output_buffer(&mut self, format: &FrameFormat) -> DistortResult<Option<Frame>> {
        self.inner.create_output_buffer(format)
    }

    fn set_presentation_time(&mut self, frame: &mut Frame, pts: Ticks) {
        self.inner.set_presentation_time(frame, pts);
    }

    fn note_transform(&mut self, stats: &TransformStats) {
        self.pending = Some(*stats);
        self.inner.note_transform(stats);
    }

    fn deliver(&mut self, frame: Frame) -> DistortResult<()> {
        let overlay = DebugOverlay {
            mode: self.mode,
            pts: frame.pts,
            stats: self.pending.take(),
        };
        // A failed debug image must not stop the stream.
        if let Err(e) = self.renderer.save_frame(&frame, &overlay, &self.dir) {
            warn!(frame_number = frame.frame_number, error = %e, "failed to save debug frame");
        }
        self.inner.deliver(frame)
    }

    fn destroy(&mut self) {
        self.inner.destroy();
    }
}

/// The first plane of `frame` as an image, padding bytes dropped.
fn luma_image(frame: &Frame) -> Result<GrayImage> {
    let Some(plane) = frame.planes.first() else {
        bail!("frame {} has no planes", frame.frame_number);
    };
    let width = (frame.format.width as usize).min(plane.line_bytes) as u32;
    let height = plane.line_count() as u32;
    Ok(GrayImage::from_fn(width, height, |x, y| {
        Luma([plane.data[y as usize * plane.line_bytes + x as usize]])
    }))
}
