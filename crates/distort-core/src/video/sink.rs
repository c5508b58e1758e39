use std::io::Write;

use tracing::{debug, info, warn};

use super::frame::{Frame, FrameFormat};
use crate::effect::clock::Ticks;
use crate::effect::engine::TransformStats;
use crate::error::DistortResult;

/// Number of output buffers a sink keeps in flight (double buffering).
pub const DEFAULT_BUFFER_COUNT: usize = 2;

/// Downstream consumer of distorted frames.
pub trait FrameSink {
    /// Hand out a free output buffer for `format`, or `None` while every
    /// buffer is still in use downstream.
    fn create_output_buffer(&mut self, format: &FrameFormat) -> DistortResult<Option<Frame>>;

    /// Stamp when `frame` should be shown.
    fn set_presentation_time(&mut self, frame: &mut Frame, pts: Ticks);

    /// How the frame about to be delivered was drawn.
    fn note_transform(&mut self, _stats: &TransformStats) {}

    /// Queue `frame` for display. The sink owns it from here on.
    fn deliver(&mut self, frame: Frame) -> DistortResult<()>;

    /// Release everything the sink holds. Called once, at teardown.
    fn destroy(&mut self);
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn create_output_buffer(&mut self, format: &FrameFormat) -> DistortResult<Option<Frame>> {
        (**self).create_output_buffer(format)
    }

    fn set_presentation_time(&mut self, frame: &mut Frame, pts: Ticks) {
        (**self).set_presentation_time(frame, pts);
    }

    fn note_transform(&mut self, stats: &TransformStats) {
        (**self).note_transform(stats);
    }

    fn deliver(&mut self, frame: Frame) -> DistortResult<()> {
        (**self).deliver(frame)
    }

    fn destroy(&mut self) {
        (**self).destroy();
    }
}

/// Fixed set of reusable output frames.
#[derive(Debug)]
pub struct BufferPool {
    capacity: usize,
    free: Vec<Frame>,
    in_use: usize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            free: Vec::new(),
            in_use: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// A free frame for `format`, allocating one while under capacity.
    pub fn take(&mut self, format: FrameFormat) -> DistortResult<Option<Frame>> {
        if self.in_use >= self.capacity {
            return Ok(None);
        }

        let frame = match self.free.iter().position(|f| f.format == format) {
            Some(index) => self.free.swap_remove(index),
            None => {
                // Buffers of a stale format are never handed out again.
                self.free.clear();
                debug!(
                    chroma = %format.chroma,
                    width = format.width,
                    height = format.height,
                    "allocating output buffer"
                );
                Frame::allocate(format)?
            }
        };

        self.in_use += 1;
        Ok(Some(frame))
    }

    /// Return a frame taken from this pool.
    pub fn recycle(&mut self, mut frame: Frame) {
        frame.pts = None;
        self.in_use = self.in_use.saturating_sub(1);
        if self.free.len() < self.capacity {
            self.free.push(frame);
        }
    }
}

/// Writes delivered frames, plane after plane, as a raw video stream.
pub struct RawVideoSink<W: Write> {
    writer: W,
    pool: BufferPool,
    frames_written: u64,
    last_pts: Option<Ticks>,
    destroyed: bool,
}

impl<W: Write> RawVideoSink<W> {
    pub fn new(writer: W, buffers: usize) -> Self {
        Self {
            writer,
            pool: BufferPool::new(buffers),
            frames_written: 0,
            last_pts: None,
            destroyed: false,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn last_pts(&self) -> Option<Ticks> {
        self.last_pts
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Write one frame without going through the buffer pool.
    pub fn write_frame(&mut self, frame: &Frame) -> DistortResult<()> {
        for plane in &frame.planes {
            let lines = plane.line_count();
            self.writer.write_all(&plane.data[..lines * plane.line_bytes])?;
        }
        self.frames_written += 1;
        if frame.pts.is_some() {
            self.last_pts = frame.pts;
        }
        debug!(
            frame_number = frame.frame_number,
            pts = ?frame.pts,
            frames_written = self.frames_written,
            "frame written"
        );
        Ok(())
    }
}

impl<W: Write> FrameSink for RawVideoSink<W> {
    fn create_output_buffer(&mut self, format: &FrameFormat) -> DistortResult<Option<Frame>> {
        self.pool.take(*format)
    }

    fn set_presentation_time(&mut self, frame: &mut Frame, pts: Ticks) {
        frame.pts = Some(pts);
    }

    fn deliver(&mut self, frame: Frame) -> DistortResult<()> {
        self.write_frame(&frame)?;
        self.pool.recycle(frame);
        Ok(())
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Err(e) = self.writer.flush() {
            warn!(error = %e, "failed to flush raw video output");
        }
        info!(frames_written = self.frames_written, "raw video sink closed");
    }
}
