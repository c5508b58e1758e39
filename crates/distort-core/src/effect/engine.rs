use tracing::debug;

use super::clock::{AnimationState, Ticks};
use super::mode::Mode;
use super::scanline::{apply_offset, compute_offset, ripple_first_line, source_line, FillValues};
use crate::video::frame::Frame;

/// Summary of one transformed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformStats {
    /// Phase the frame was drawn with.
    pub phase: f64,
    /// Lines, across all planes, that ended up shifted.
    pub displaced_lines: usize,
}

/// Draws one mode's distortion from an input frame into an output frame.
#[derive(Debug, Clone, Copy)]
pub struct DistortEngine {
    mode: Mode,
    fill: FillValues,
}

impl DistortEngine {
    pub fn new(mode: Mode, fill: FillValues) -> Self {
        Self { mode, fill }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Advance the animation to `now`, then distort every plane of `input`
    /// into the matching plane of `output`.
    ///
    /// `output` must have the same geometry as `input`.
    pub fn transform(
        &self,
        state: &mut AnimationState,
        now: Ticks,
        input: &Frame,
        output: &mut Frame,
    ) -> TransformStats {
        debug_assert!(
            input.same_geometry(output),
            "output geometry must match input"
        );

        state.advance(self.mode, now);
        let phase = state.phase;
        let mut displaced_lines = 0;

        for (index, (src, dst)) in input.planes.iter().zip(output.planes.iter_mut()).enumerate() {
            let total = src.line_count();
            if total == 0 {
                continue;
            }
            let line_bytes = src.line_bytes;
            let fill = self.fill.for_plane(index);

            // Rows above the ripple band are untouched; copy them in one go.
            let first = match self.mode {
                Mode::Wave => 0,
                Mode::Ripple => ripple_first_line(total),
            };
            let verbatim = first * line_bytes;
            dst.data[..verbatim].copy_from_slice(&src.data[..verbatim]);

            for line in first..total {
                let offset = compute_offset(self.mode, phase, line, total, line_bytes);
                if offset != 0 {
                    displaced_lines += 1;
                }
                let from = source_line(self.mode, line, total);
                apply_offset(offset, src.line(from), dst.line_mut(line), fill);
            }
        }

        output.frame_number = input.frame_number;

        debug!(
            mode = %self.mode,
            frame_number = input.frame_number,
            phase,
            displaced_lines,
            "frame distorted"
        );

        TransformStats {
            phase,
            displaced_lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::{Chroma, FrameFormat, Plane};

    fn gradient_frame(chroma: Chroma, width: u32, height: u32) -> Frame {
        let mut frame = Frame::allocate(FrameFormat::new(chroma, width, height)).unwrap();
        for (p, plane) in frame.planes.iter_mut().enumerate() {
            for (i, byte) in plane.data.iter_mut().enumerate() {
                *byte = (i * 7 + p * 31) as u8 | 1;
            }
        }
        frame
    }

    /// Single luma plane of `line_bytes * lines`, every byte `value`.
    fn luma_only(line_bytes: usize, lines: usize, value: u8) -> Frame {
        let format = FrameFormat::new(Chroma::I444, line_bytes as u32, lines as u32);
        Frame {
            format,
            planes: vec![Plane::new(vec![value; line_bytes * lines], line_bytes)],
            pts: None,
            frame_number: 0,
        }
    }

    #[test]
    fn geometry_is_preserved() {
        let chromas = [Chroma::I420, Chroma::Iyuv, Chroma::Yv12, Chroma::I422, Chroma::I444];
        for chroma in chromas {
            for mode in [Mode::Wave, Mode::Ripple] {
                let input = gradient_frame(chroma, 64, 30);
                let mut output = Frame::allocate(input.format).unwrap();
                let engine = DistortEngine::new(mode, FillValues::default());
                let mut state = AnimationState::new();
                for now in [0, 40_000, 80_000] {
                    engine.transform(&mut state, now, &input, &mut output);
                    assert!(input.same_geometry(&output), "{chroma} {mode}");
                    for (a, b) in input.planes.iter().zip(&output.planes) {
                        assert_eq!(a.data.len(), b.data.len());
                    }
                }
            }
        }
    }

    #[test]
    fn reference_wave_scenario() {
        let input = luma_only(100, 10, 0xFF);
        let mut output = luma_only(100, 10, 0x33);
        let engine = DistortEngine::new(Mode::Wave, FillValues::default());
        let mut state = AnimationState::new();

        let stats = engine.transform(&mut state, 1_000, &input, &mut output);
        assert_eq!(stats.phase, 0.0);

        let line5 = output.planes[0].line(5);
        assert!(line5[..96].iter().all(|&b| b == 0xFF));
        assert!(line5[96..].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn fill_never_leaves_stale_bytes() {
        for mode in [Mode::Wave, Mode::Ripple] {
            let input = luma_only(200, 50, 0xFF);
            let mut frame = Frame::allocate(FrameFormat::new(Chroma::I420, 200, 50)).unwrap();
            frame.planes[0] = input.planes[0].clone();
            for plane in &mut frame.planes[1..] {
                plane.data.fill(0xFF);
            }
            let mut output = Frame::allocate(frame.format).unwrap();
            for plane in &mut output.planes {
                plane.data.fill(0x42);
            }

            let engine = DistortEngine::new(mode, FillValues::default());
            let mut state = AnimationState { phase: 1.3, last: Some(0) };
            engine.transform(&mut state, 0, &frame, &mut output);

            for (p, plane) in output.planes.iter().enumerate() {
                let fill = if p == 0 { 0x00 } else { 0x80 };
                for line in 0..plane.line_count() {
                    let offset =
                        compute_offset(mode, state.phase, line, plane.line_count(), plane.line_bytes);
                    let row = plane.line(line);
                    let gap = offset.unsigned_abs();
                    let (filled, kept) = if offset < 0 {
                        (&row[row.len() - gap..], &row[..row.len() - gap])
                    } else {
                        (&row[..gap], &row[gap..])
                    };
                    assert!(filled.iter().all(|&b| b == fill), "{mode} plane {p} line {line}");
                    assert!(kept.iter().all(|&b| b == 0xFF), "{mode} plane {p} line {line}");
                }
            }
        }
    }

    #[test]
    fn zero_offset_lines_are_identical() {
        let input = gradient_frame(Chroma::I420, 40, 20);
        let mut output = Frame::allocate(input.format).unwrap();
        let engine = DistortEngine::new(Mode::Wave, FillValues::default());
        let mut state = AnimationState::new();
        engine.transform(&mut state, 0, &input, &mut output);

        let mut checked = 0;
        for (src, dst) in input.planes.iter().zip(&output.planes) {
            let total = src.line_count();
            for line in 0..total {
                if compute_offset(Mode::Wave, 0.0, line, total, src.line_bytes) == 0 {
                    assert_eq!(src.line(line), dst.line(line));
                    checked += 1;
                }
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn ripple_copies_top_and_mirrors_band() {
        let lines = 20;
        let line_bytes = 400;
        let mut input = luma_only(line_bytes, lines, 0);
        for line in 0..lines {
            input.planes[0].line_mut(line).fill(line as u8 + 1);
        }
        let mut output = luma_only(line_bytes, lines, 0xEE);

        let engine = DistortEngine::new(Mode::Ripple, FillValues::default());
        let mut state = AnimationState::new();
        engine.transform(&mut state, 0, &input, &mut output);

        let plane = &output.planes[0];
        let first = ripple_first_line(lines);
        for line in 0..first {
            assert_eq!(plane.line(line), input.planes[0].line(line), "line {line}");
        }
        for line in first..lines {
            let expected = (first - (line - first)) as u8 + 1;
            let offset = compute_offset(Mode::Ripple, 0.0, line, lines, line_bytes);
            let gap = offset.unsigned_abs();
            let row = plane.line(line);
            let kept = if offset < 0 { &row[..line_bytes - gap] } else { &row[gap..] };
            assert!(kept.iter().all(|&b| b == expected), "line {line} row {row:?}");
        }
    }

    #[test]
    fn phase_advances_once_per_frame() {
        let input = gradient_frame(Chroma::I420, 16, 16);
        let mut output = Frame::allocate(input.format).unwrap();
        let engine = DistortEngine::new(Mode::Wave, FillValues::default());
        let mut state = AnimationState::new();
        engine.transform(&mut state, 0, &input, &mut output);
        let stats = engine.transform(&mut state, 200_000, &input, &mut output);
        assert!((stats.phase - 1.0).abs() < 1e-12);
    }

    #[test]
    fn custom_fill_values_are_used() {
        let input = luma_only(100, 10, 0xFF);
        let mut output = luma_only(100, 10, 0);
        let engine = DistortEngine::new(Mode::Wave, FillValues { luma: 0x10, chroma: 0x80 });
        let mut state = AnimationState::new();
        engine.transform(&mut state, 0, &input, &mut output);
        assert!(output.planes[0].line(5)[96..].iter().all(|&b| b == 0x10));
    }
}
