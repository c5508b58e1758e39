use std::fmt;

use crate::effect::clock::Ticks;
use crate::error::{DistortError, DistortResult};

/// Pixel layouts a frame can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chroma {
    /// Planar 4:2:0, planes Y, U, V.
    I420,
    /// Same layout as I420 under another FourCC.
    Iyuv,
    /// Planar 4:2:0, planes Y, V, U.
    Yv12,
    /// Planar 4:2:2.
    I422,
    /// Planar 4:4:4.
    I444,
    /// Packed 4:2:2, single plane.
    Yuy2,
    /// Packed 24-bit RGB, single plane.
    Rgb24,
}

impl Chroma {
    /// Whether this is one of the planar YUV layouts the effect accepts.
    pub fn is_planar_yuv(self) -> bool {
        matches!(
            self,
            Chroma::I420 | Chroma::Iyuv | Chroma::Yv12 | Chroma::I422 | Chroma::I444
        )
    }

    /// `(line_bytes, line_count)` for every plane, in plane order.
    pub fn plane_layout(self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let w = width as usize;
        let h = height as usize;
        let half_w = w.div_ceil(2);
        let half_h = h.div_ceil(2);
        match self {
            Chroma::I420 | Chroma::Iyuv | Chroma::Yv12 => {
                vec![(w, h), (half_w, half_h), (half_w, half_h)]
            }
            Chroma::I422 => vec![(w, h), (half_w, h), (half_w, h)],
            Chroma::I444 => vec![(w, h), (w, h), (w, h)],
            Chroma::Yuy2 => vec![(w * 2, h)],
            Chroma::Rgb24 => vec![(w * 3, h)],
        }
    }

    /// The ffmpeg `-pix_fmt` name that produces this layout.
    ///
    /// YV12 is decoded as `yuv420p` and has its chroma planes swapped afterwards.
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            Chroma::I420 | Chroma::Iyuv | Chroma::Yv12 => "yuv420p",
            Chroma::I422 => "yuv422p",
            Chroma::I444 => "yuv444p",
            Chroma::Yuy2 => "yuyv422",
            Chroma::Rgb24 => "rgb24",
        }
    }
}

impl fmt::Display for Chroma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chroma::I420 => "I420",
            Chroma::Iyuv => "IYUV",
            Chroma::Yv12 => "YV12",
            Chroma::I422 => "I422",
            Chroma::I444 => "I444",
            Chroma::Yuy2 => "YUY2",
            Chroma::Rgb24 => "RGB24",
        };
        f.write_str(name)
    }
}

/// Display aspect ratio (e.g. 16/9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub numerator: u32,
    pub denominator: u32,
}

impl AspectRatio {
    /// Aspect ratio of square pixels at the given size.
    pub fn square_pixels(width: u32, height: u32) -> Self {
        Self {
            numerator: width,
            denominator: height.max(1),
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

/// Geometry negotiated once at stream setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub chroma: Chroma,
    pub width: u32,
    pub height: u32,
    pub aspect: AspectRatio,
}

impl FrameFormat {
    pub fn new(chroma: Chroma, width: u32, height: u32) -> Self {
        Self {
            chroma,
            width,
            height,
            aspect: AspectRatio::square_pixels(width, height),
        }
    }

    /// Total bytes of one frame in this format.
    pub fn frame_bytes(&self) -> usize {
        self.chroma
            .plane_layout(self.width, self.height)
            .iter()
            .map(|(line_bytes, lines)| line_bytes * lines)
            .sum()
    }
}

/// One color component of a frame, stored row after row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes per row, padding included.
    pub line_bytes: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, line_bytes: usize) -> Self {
        Self { data, line_bytes }
    }

    pub fn line_count(&self) -> usize {
        if self.line_bytes == 0 {
            0
        } else {
            self.data.len() / self.line_bytes
        }
    }

    pub fn line(&self, index: usize) -> &[u8] {
        let start = index * self.line_bytes;
        &self.data[start..start + self.line_bytes]
    }

    pub fn line_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.line_bytes;
        &mut self.data[start..start + self.line_bytes]
    }
}

/// A decoded picture: planes plus the format they were laid out for.
#[derive(Debug, Clone)]
pub struct Frame {
    pub format: FrameFormat,
    pub planes: Vec<Plane>,
    /// Presentation time, if one has been assigned.
    pub pts: Option<Ticks>,
    /// Position of the frame in its stream (0-based).
    pub frame_number: u32,
}

impl Frame {
    /// Allocate a zeroed frame for `format`.
    pub fn allocate(format: FrameFormat) -> DistortResult<Self> {
        let mut planes = Vec::new();
        for (line_bytes, lines) in format.chroma.plane_layout(format.width, format.height) {
            let bytes = line_bytes * lines;
            let mut data = Vec::new();
            data.try_reserve_exact(bytes)
                .map_err(|source| DistortError::Allocation { bytes, source })?;
            data.resize(bytes, 0);
            planes.push(Plane::new(data, line_bytes));
        }
        Ok(Self {
            format,
            planes,
            pts: None,
            frame_number: 0,
        })
    }

    /// Wrap existing planes, checking them against `format`.
    pub fn from_planes(format: FrameFormat, planes: Vec<Plane>) -> DistortResult<Self> {
        check_planes(&format, &planes)?;
        Ok(Self {
            format,
            planes,
            pts: None,
            frame_number: 0,
        })
    }

    /// Fail unless this frame is laid out exactly as `format` requires.
    pub fn check_format(&self, format: &FrameFormat) -> DistortResult<()> {
        let (ours, theirs) = (&self.format, format);
        if (ours.chroma, ours.width, ours.height) != (theirs.chroma, theirs.width, theirs.height) {
            return Err(DistortError::Geometry(format!(
                "frame is {} {}x{}, stream is {} {}x{}",
                ours.chroma, ours.width, ours.height, theirs.chroma, theirs.width, theirs.height
            )));
        }
        check_planes(format, &self.planes)
    }

    /// Same plane count and per-plane `line_bytes`/`line_count`.
    pub fn same_geometry(&self, other: &Frame) -> bool {
        self.planes.len() == other.planes.len()
            && self.planes.iter().zip(&other.planes).all(|(a, b)| {
                a.line_bytes == b.line_bytes && a.line_count() == b.line_count()
            })
    }
}

fn check_planes(format: &FrameFormat, planes: &[Plane]) -> DistortResult<()> {
    let layout = format.chroma.plane_layout(format.width, format.height);
    if layout.len() != planes.len() {
        return Err(DistortError::Geometry(format!(
            "{} expects {} planes, got {}",
            format.chroma,
            layout.len(),
            planes.len()
        )));
    }
    for (index, (plane, (line_bytes, lines))) in planes.iter().zip(&layout).enumerate() {
        if plane.line_bytes != *line_bytes || plane.data.len() != line_bytes * lines {
            return Err(DistortError::Geometry(format!(
                "plane {index}: expected {lines} lines of {line_bytes} bytes, got {} bytes with line_bytes {}",
                plane.data.len(),
                plane.line_bytes
            )));
        }
    }
    Ok(())
}
