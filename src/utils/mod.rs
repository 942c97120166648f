pub mod constants;
pub mod progress;
pub mod stats;

pub use constants::*;
pub use progress::ProgressReporter;
pub use stats::{mean, quantile, sample_std};
