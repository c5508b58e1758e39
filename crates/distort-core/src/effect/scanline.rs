use super::mode::Mode;

/// Sample value written into the gap a displaced line leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillValues {
    /// Plane 0 (black).
    pub luma: u8,
    /// Every other plane (neutral chroma).
    pub chroma: u8,
}

impl Default for FillValues {
    fn default() -> Self {
        Self {
            luma: 0x00,
            chroma: 0x80,
        }
    }
}

impl FillValues {
    pub fn for_plane(&self, index: usize) -> u8 {
        if index == 0 {
            self.luma
        } else {
            self.chroma
        }
    }
}

/// Wave offset: at most 1/20th of the line, ten radians of sweep top to bottom.
pub fn wave_offset(phase: f64, line: usize, total_lines: usize, line_bytes: usize) -> isize {
    let angle = phase + 10.0 * line as f64 / total_lines as f64;
    (line_bytes as f64 * angle.sin() / 20.0) as isize
}

/// First line of the ripple band (the bottom fifth).
pub fn ripple_first_line(total_lines: usize) -> usize {
    total_lines * 4 / 5
}

/// Ripple offset for a line inside the band. Amplitude grows from zero at
/// `first_line` toward the bottom.
pub fn ripple_offset(
    phase: f64,
    line: usize,
    first_line: usize,
    total_lines: usize,
    line_bytes: usize,
) -> isize {
    debug_assert!(line >= first_line);
    let depth = (line - first_line) as f64;
    let angle = phase + 2.0 * line as f64 / (1.0 + depth);
    (line_bytes as f64 * angle.sin() * depth / total_lines as f64 / 8.0) as isize
}

/// Offset of `line` for the given mode. Ripple leaves lines above its band alone.
pub fn compute_offset(
    mode: Mode,
    phase: f64,
    line: usize,
    total_lines: usize,
    line_bytes: usize,
) -> isize {
    match mode {
        Mode::Wave => wave_offset(phase, line, total_lines, line_bytes),
        Mode::Ripple => {
            let first = ripple_first_line(total_lines);
            if line < first {
                0
            } else {
                ripple_offset(phase, line, first, total_lines, line_bytes)
            }
        }
    }
}

/// Input line that output `line` is built from.
///
/// Inside the ripple band rows are read upward from the band boundary, so the
/// band shows a reflection of the picture just above it.
pub fn source_line(mode: Mode, line: usize, total_lines: usize) -> usize {
    match mode {
        Mode::Wave => line,
        Mode::Ripple => {
            let first = ripple_first_line(total_lines);
            if line < first {
                line
            } else {
                first.saturating_sub(line - first)
            }
        }
    }
}

/// Copy `input` into `output` shifted by `offset` bytes, filling the gap.
///
/// A negative offset moves the line left and exposes its right edge; a
/// positive one exposes the left edge. Offsets at least as wide as the line
/// fill the whole line.
pub fn apply_offset(offset: isize, input: &[u8], output: &mut [u8], fill: u8) {
    let len = input.len().min(output.len());
    let (input, output) = (&input[..len], &mut output[..len]);
    let shift = offset.unsigned_abs().min(len);

    if offset == 0 {
        output.copy_from_slice(input);
    } else if offset < 0 {
        output[..len - shift].copy_from_slice(&input[shift..]);
        output[len - shift..].fill(fill);
    } else {
        output[shift..].copy_from_slice(&input[..len - shift]);
        output[..shift].fill(fill);
    }
}
