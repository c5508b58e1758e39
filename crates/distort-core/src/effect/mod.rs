pub mod clock;
pub mod engine;
pub mod mode;
pub mod scanline;

pub use clock::{AnimationState, ManualClock, MonotonicClock, Ticks, TimeSource};
pub use engine::{DistortEngine, TransformStats};
pub use mode::{select_mode, Mode};
pub use scanline::FillValues;
