pub mod adapter;
pub mod debug;
pub mod effect;
pub mod error;
pub mod pipeline;
pub mod video;

pub use error::{DistortError, DistortResult};
