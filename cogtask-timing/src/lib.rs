pub mod timer;

pub use timer::{CalibrationStats, HighPrecisionTimer, ManualTimer, Timer};
