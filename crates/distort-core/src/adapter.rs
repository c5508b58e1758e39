use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::effect::clock::{AnimationState, Ticks, TimeSource};
use crate::effect::engine::{DistortEngine, TransformStats};
use crate::effect::mode::{select_mode, Mode};
use crate::effect::scanline::FillValues;
use crate::error::{DistortError, DistortResult};
use crate::video::frame::{Frame, FrameFormat};
use crate::video::sink::FrameSink;

/// How long to sleep between attempts to get an output buffer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How far in the future delivered frames are scheduled.
pub const DEFAULT_DISPLAY_LATENCY: Ticks = 50_000;

/// Settings for one effect instance.
#[derive(Debug, Clone, Copy)]
pub struct AdapterConfig {
    pub mode: Mode,
    pub fill: FillValues,
    pub poll_interval: Duration,
    pub display_latency: Ticks,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Wave,
            fill: FillValues::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            display_latency: DEFAULT_DISPLAY_LATENCY,
        }
    }
}

impl AdapterConfig {
    /// Defaults with the mode taken from a filter string like `distort:ripple`.
    pub fn from_filter(filter: &str) -> Self {
        Self {
            mode: select_mode(filter),
            ..Self::default()
        }
    }
}

/// Cooperative stop request shared between the adapter and whoever owns the stream.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    die: Arc<AtomicBool>,
    error: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the stream to shut down.
    pub fn request_stop(&self) {
        self.die.store(true, Ordering::SeqCst);
    }

    /// Flag the stream as failed.
    pub fn report_error(&self) {
        self.error.store(true, Ordering::SeqCst);
    }

    pub fn should_abort(&self) -> bool {
        self.die.load(Ordering::SeqCst) || self.error.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Idle,
    AwaitingBuffer,
    Transforming,
    Delivered,
    TornDown,
}

/// What happened to one input frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// The distorted frame was handed downstream.
    Delivered { pts: Ticks, stats: TransformStats },
    /// The stream was stopped before an output buffer became free.
    Abandoned,
}

/// Poll `sink` for a free output buffer until one shows up or `stop` fires.
///
/// Returns `Ok(None)` when stopped. Only `stop` bounds the wait.
pub fn acquire_output<S: FrameSink + ?Sized>(
    sink: &mut S,
    format: &FrameFormat,
    stop: &StopSignal,
    poll_interval: Duration,
) -> DistortResult<Option<Frame>> {
    let mut retries: u32 = 0;
    loop {
        if let Some(frame) = sink.create_output_buffer(format)? {
            if retries > 0 {
                debug!(retries, "output buffer acquired after waiting");
            }
            return Ok(Some(frame));
        }
        if stop.should_abort() {
            debug!(retries, "stop requested while waiting for an output buffer");
            return Ok(None);
        }
        retries += 1;
        trace!(retries, "no free output buffer, sleeping");
        thread::sleep(poll_interval);
    }
}

/// Sits between the upstream decoder and a downstream sink: fetches an
/// output buffer, distorts the input into it and delivers it.
pub struct PipelineAdapter<S: FrameSink, C: TimeSource> {
    engine: DistortEngine,
    animation: AnimationState,
    format: FrameFormat,
    sink: S,
    clock: C,
    stop: StopSignal,
    poll_interval: Duration,
    display_latency: Ticks,
    state: AdapterState,
    frames_delivered: u64,
    sink_destroyed: bool,
}

impl<S: FrameSink, C: TimeSource> PipelineAdapter<S, C> {
    /// Set up the effect for a stream of `format`.
    ///
    /// Non-planar-YUV formats are rejected before `open_sink` is called.
    pub fn open<F, E>(
        config: AdapterConfig,
        format: FrameFormat,
        open_sink: F,
        clock: C,
        stop: StopSignal,
    ) -> DistortResult<Self>
    where
        F: FnOnce(&FrameFormat) -> Result<S, E>,
        E: fmt::Display,
    {
        if !format.chroma.is_planar_yuv() {
            warn!(chroma = %format.chroma, "unsupported chroma, distort disabled");
            return Err(DistortError::UnsupportedChroma(format.chroma));
        }

        info!("spawning the real video output");
        let sink = open_sink(&format).map_err(|e| {
            error!(error = %e, "can't open output sink, aborting");
            DistortError::SinkUnavailable(e.to_string())
        })?;

        info!(
            mode = %config.mode,
            chroma = %format.chroma,
            width = format.width,
            height = format.height,
            aspect = format.aspect.as_f64(),
            "distort adapter ready"
        );

        Ok(Self {
            engine: DistortEngine::new(config.mode, config.fill),
            animation: AnimationState::new(),
            format,
            sink,
            clock,
            stop,
            poll_interval: config.poll_interval,
            display_latency: config.display_latency,
            state: AdapterState::Idle,
            frames_delivered: 0,
            sink_destroyed: false,
        })
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.engine.mode()
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub fn animation(&self) -> &AnimationState {
        &self.animation
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Distort `input` and deliver it downstream.
    ///
    /// A frame that doesn't match the stream's format is rejected with
    /// `DistortError::Geometry` and the adapter stays usable. Any other error
    /// tears the adapter down; later calls return `Abandoned`.
    pub fn process_frame(&mut self, input: &Frame) -> DistortResult<FrameOutcome> {
        if self.state == AdapterState::TornDown {
            return Ok(FrameOutcome::Abandoned);
        }
        if self.state == AdapterState::Delivered {
            self.set_state(AdapterState::Idle);
        }

        if let Err(e) = input.check_format(&self.format) {
            warn!(frame_number = input.frame_number, error = %e, "input frame rejected");
            return Err(e);
        }

        match self.run_frame(input) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(frame_number = input.frame_number, error = %e, "distort stage failed");
                self.set_state(AdapterState::TornDown);
                Err(e)
            }
        }
    }

    fn run_frame(&mut self, input: &Frame) -> DistortResult<FrameOutcome> {
        self.set_state(AdapterState::AwaitingBuffer);
        let Some(mut output) =
            acquire_output(&mut self.sink, &self.format, &self.stop, self.poll_interval)?
        else {
            warn!(
                frame_number = input.frame_number,
                "stream stopped before an output buffer was free, frame dropped"
            );
            self.set_state(AdapterState::TornDown);
            return Ok(FrameOutcome::Abandoned);
        };

        self.set_state(AdapterState::Transforming);
        let now = self.clock.now();
        let stats = self
            .engine
            .transform(&mut self.animation, now, input, &mut output);

        let pts = now + self.display_latency;
        self.sink.set_presentation_time(&mut output, pts);
        self.sink.note_transform(&stats);
        self.sink.deliver(output)?;

        self.set_state(AdapterState::Delivered);
        self.frames_delivered += 1;
        debug!(frame_number = input.frame_number, pts, "frame delivered");

        Ok(FrameOutcome::Delivered { pts, stats })
    }

    fn set_state(&mut self, next: AdapterState) {
        trace!(from = ?self.state, to = ?next, "adapter state changed");
        self.state = next;
    }

    /// Tear the stream down and release the sink.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.state = AdapterState::TornDown;
        if !self.sink_destroyed {
            self.sink_destroyed = true;
            self.sink.destroy();
            info!(frames_delivered = self.frames_delivered, "distort adapter closed");
        }
    }
}

impl<S: FrameSink, C: TimeSource> Drop for PipelineAdapter<S, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Instant;

    use tracing_test::traced_test;

    use super::*;
    use crate::effect::clock::ManualClock;
    use crate::video::frame::Chroma;

    /// Sink that reports busy a set number of times before handing out buffers.
    struct ScriptedSink {
        busy_for: usize,
        attempts: usize,
        delivered: Vec<Frame>,
        destroyed: Rc<Cell<u32>>,
        fail_delivery: bool,
        noted: Vec<TransformStats>,
    }

    impl ScriptedSink {
        fn new(busy_for: usize) -> Self {
            Self {
                busy_for,
                attempts: 0,
                delivered: Vec::new(),
                destroyed: Rc::new(Cell::new(0)),
                fail_delivery: false,
                noted: Vec::new(),
            }
        }
    }

    impl FrameSink for ScriptedSink {
        fn create_output_buffer(&mut self, format: &FrameFormat) -> DistortResult<Option<Frame>> {
            self.attempts += 1;
            if self.attempts <= self.busy_for {
                return Ok(None);
            }
            Frame::allocate(*format).map(Some)
        }

        fn set_presentation_time(&mut self, frame: &mut Frame, pts: Ticks) {
            frame.pts = Some(pts);
        }

        fn note_transform(&mut self, stats: &TransformStats) {
            self.noted.push(*stats);
        }

        fn deliver(&mut self, frame: Frame) -> DistortResult<()> {
            if self.fail_delivery {
                return Err(DistortError::Sink(std::io::Error::other("display gone")));
            }
            self.delivered.push(frame);
            Ok(())
        }

        fn destroy(&mut self) {
            self.destroyed.set(self.destroyed.get() + 1);
        }
    }

    fn config() -> AdapterConfig {
        AdapterConfig {
            poll_interval: Duration::from_millis(1),
            ..AdapterConfig::default()
        }
    }

    fn input(format: FrameFormat) -> Frame {
        let mut frame = Frame::allocate(format).unwrap();
        for plane in &mut frame.planes {
            plane.data.fill(0xC0);
        }
        frame
    }

    fn open_with(
        sink: ScriptedSink,
        clock: &ManualClock,
        stop: StopSignal,
    ) -> PipelineAdapter<ScriptedSink, &ManualClock> {
        let format = FrameFormat::new(Chroma::I420, 64, 40);
        PipelineAdapter::open(
            config(),
            format,
            |_| Ok::<_, DistortError>(sink),
            clock,
            stop,
        )
        .unwrap()
    }

    #[test]
    fn delivers_with_fixed_latency() {
        let clock = ManualClock::new(1_000_000);
        let mut adapter = open_with(ScriptedSink::new(0), &clock, StopSignal::new());
        assert_eq!(adapter.state(), AdapterState::Idle);

        let frame = input(*adapter.format());
        let outcome = adapter.process_frame(&frame).unwrap();
        assert!(matches!(outcome, FrameOutcome::Delivered { pts: 1_050_000, .. }));
        assert_eq!(adapter.state(), AdapterState::Delivered);
        assert_eq!(adapter.sink().delivered[0].pts, Some(1_050_000));
        assert!(adapter.sink().delivered[0].same_geometry(&frame));
    }

    #[test]
    fn phase_advances_once_per_frame() {
        let clock = ManualClock::new(0);
        let mut adapter = open_with(ScriptedSink::new(0), &clock, StopSignal::new());
        let frame = input(*adapter.format());

        adapter.process_frame(&frame).unwrap();
        clock.advance(400_000);
        let outcome = adapter.process_frame(&frame).unwrap();

        let FrameOutcome::Delivered { stats, .. } = outcome else {
            panic!("expected delivery, got {outcome:?}");
        };
        assert!((stats.phase - 2.0).abs() < 1e-12);
        assert_eq!(adapter.frames_delivered(), 2);
    }

    #[test]
    fn retries_while_sink_is_busy() {
        let clock = ManualClock::new(0);
        let mut adapter = open_with(ScriptedSink::new(3), &clock, StopSignal::new());
        let frame = input(*adapter.format());

        let outcome = adapter.process_frame(&frame).unwrap();
        assert!(matches!(outcome, FrameOutcome::Delivered { .. }));
        assert_eq!(adapter.sink().attempts, 4);
    }

    #[test]
    #[traced_test]
    fn stop_while_waiting_abandons_frame() {
        let clock = ManualClock::new(0);
        let stop = StopSignal::new();
        let mut adapter = open_with(ScriptedSink::new(usize::MAX), &clock, stop.clone());
        let frame = input(*adapter.format());

        let stopper = {
            let stop = stop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                stop.request_stop();
            })
        };

        let started = Instant::now();
        let outcome = adapter.process_frame(&frame).unwrap();
        stopper.join().unwrap();

        assert_eq!(outcome, FrameOutcome::Abandoned);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(adapter.state(), AdapterState::TornDown);
        assert!(adapter.sink().delivered.is_empty());
        assert!(logs_contain("frame dropped"));
    }

    #[test]
    fn error_flag_also_aborts() {
        let clock = ManualClock::new(0);
        let stop = StopSignal::new();
        stop.report_error();
        let mut adapter = open_with(ScriptedSink::new(usize::MAX), &clock, stop);
        let frame = input(*adapter.format());

        assert_eq!(adapter.process_frame(&frame).unwrap(), FrameOutcome::Abandoned);
        assert_eq!(adapter.sink().attempts, 1);
    }

    #[test]
    fn torn_down_adapter_ignores_frames() {
        let clock = ManualClock::new(0);
        let stop = StopSignal::new();
        stop.request_stop();
        let mut adapter = open_with(ScriptedSink::new(usize::MAX), &clock, stop);
        let frame = input(*adapter.format());

        adapter.process_frame(&frame).unwrap();
        let attempts = adapter.sink().attempts;
        assert_eq!(adapter.process_frame(&frame).unwrap(), FrameOutcome::Abandoned);
        assert_eq!(adapter.sink().attempts, attempts);
    }

    #[test]
    fn delivery_failure_tears_down() {
        let clock = ManualClock::new(0);
        let mut sink = ScriptedSink::new(0);
        sink.fail_delivery = true;
        let mut adapter = open_with(sink, &clock, StopSignal::new());
        let frame = input(*adapter.format());

        assert!(matches!(adapter.process_frame(&frame), Err(DistortError::Sink(_))));
        assert_eq!(adapter.state(), AdapterState::TornDown);
        assert_eq!(adapter.process_frame(&frame).unwrap(), FrameOutcome::Abandoned);
    }

    #[test]
    #[traced_test]
    fn unsupported_chroma_never_opens_sink() {
        let opened = Cell::new(false);
        let clock = ManualClock::new(0);
        let result = PipelineAdapter::open(
            config(),
            FrameFormat::new(Chroma::Yuy2, 32, 32),
            |_| {
                opened.set(true);
                Ok::<_, DistortError>(ScriptedSink::new(0))
            },
            &clock,
            StopSignal::new(),
        );

        let Err(e) = result else {
            panic!("YUY2 must be rejected");
        };
        assert!(matches!(e, DistortError::UnsupportedChroma(Chroma::Yuy2)));
        assert!(e.is_setup_failure());
        assert!(!opened.get());
        assert!(logs_contain("unsupported chroma"));
    }

    #[test]
    fn sink_open_failure_is_setup_failure() {
        let clock = ManualClock::new(0);
        let result = PipelineAdapter::<ScriptedSink, _>::open(
            config(),
            FrameFormat::new(Chroma::I422, 32, 32),
            |_| Err("no display"),
            &clock,
            StopSignal::new(),
        );
        let Err(e) = result else {
            panic!("sink failure must fail setup");
        };
        assert!(matches!(&e, DistortError::SinkUnavailable(msg) if msg == "no display"));
        assert!(e.is_setup_failure());
    }

    #[test]
    fn sink_is_destroyed_exactly_once() {
        let clock = ManualClock::new(0);
        let sink = ScriptedSink::new(0);
        let destroyed = Rc::clone(&sink.destroyed);
        let adapter = open_with(sink, &clock, StopSignal::new());
        adapter.close();
        assert_eq!(destroyed.get(), 1);

        let sink = ScriptedSink::new(0);
        let destroyed = Rc::clone(&sink.destroyed);
        drop(open_with(sink, &clock, StopSignal::new()));
        assert_eq!(destroyed.get(), 1);
    }

    #[test]
    fn sink_sees_stats_before_delivery() {
        let clock = ManualClock::new(0);
        let mut adapter = open_with(ScriptedSink::new(0), &clock, StopSignal::new());
        let frame = input(*adapter.format());

        let FrameOutcome::Delivered { stats, .. } = adapter.process_frame(&frame).unwrap() else {
            panic!("expected delivery");
        };
        assert_eq!(adapter.sink().noted, vec![stats]);
    }

    #[test]
    #[traced_test]
    fn mismatched_frame_is_rejected_without_teardown() {
        let clock = ManualClock::new(0);
        let mut adapter = open_with(ScriptedSink::new(0), &clock, StopSignal::new());
        let good = input(*adapter.format());
        adapter.process_frame(&good).unwrap();
        assert_eq!(adapter.state(), AdapterState::Delivered);

        let cases = [
            FrameFormat::new(Chroma::I420, 128, 80),
            FrameFormat::new(Chroma::I420, 16, 16),
            FrameFormat::new(Chroma::I444, 64, 40),
        ];
        for format in cases {
            let result = adapter.process_frame(&input(format));
            assert!(matches!(result, Err(DistortError::Geometry(_))), "{format:?}");
            // The next input moved the adapter back to Idle before the check.
            assert_eq!(adapter.state(), AdapterState::Idle);
        }
        assert_eq!(adapter.sink().attempts, 1);
        assert!(logs_contain("input frame rejected"));

        let outcome = adapter.process_frame(&good).unwrap();
        assert!(matches!(outcome, FrameOutcome::Delivered { .. }));
        assert_eq!(adapter.frames_delivered(), 2);
    }

    #[test]
    fn planes_not_matching_format_are_rejected() {
        let clock = ManualClock::new(0);
        let mut adapter = open_with(ScriptedSink::new(0), &clock, StopSignal::new());
        let mut frame = input(*adapter.format());
        frame.planes[0].data.truncate(64 * 10);

        assert!(matches!(adapter.process_frame(&frame), Err(DistortError::Geometry(_))));
        assert!(adapter.sink().delivered.is_empty());
        assert_ne!(adapter.state(), AdapterState::TornDown);
    }

    #[test]
    fn config_from_filter_selects_mode() {
        assert_eq!(AdapterConfig::from_filter("distort:ripple").mode, Mode::Ripple);
        assert_eq!(AdapterConfig::from_filter("distort").mode, Mode::Wave);
    }
}
