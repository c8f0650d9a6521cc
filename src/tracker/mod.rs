pub mod alert;
pub mod calibration;
pub mod classifier;
pub mod controller;
pub mod state;

pub use alert::AlertDebouncer;
pub use calibration::{CalibrationProgress, CalibrationStage};
pub use classifier::{classify, Verdict};
pub use controller::{SessionController, SessionReport, StepOutcome, StopReason};
pub use state::{Phase, SessionState};
