pub mod controller;
pub mod oscillator;

pub use controller::ActuatorController;

use anyhow::Result;
use std::sync::atomic::{AtomicU32, Ordering};

/// Resting duty; the servo must always be left here.
pub const NEUTRAL_DUTY: f32 = 0.0;

/// Physical actuator accepting a signed duty in `[-1, 1]`.
///
/// Shared between the controller and the oscillation thread, hence `&self`.
pub trait Actuator: Send + Sync {
    fn set_duty(&self, duty: f32) -> Result<()>;
}

/// Driver for runs without hardware: logs each write and remembers the last.
pub struct LoggingActuator {
    last_duty: AtomicU32,
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self {
            last_duty: AtomicU32::new(NEUTRAL_DUTY.to_bits()),
        }
    }

    pub fn last_duty(&self) -> f32 {
        f32::from_bits(self.last_duty.load(Ordering::SeqCst))
    }
}

impl Default for LoggingActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuator for LoggingActuator {
    fn set_duty(&self, duty: f32) -> Result<()> {
        log::debug!("servo duty -> {duty:+.1}");
        self.last_duty.store(duty.to_bits(), Ordering::SeqCst);
        Ok(())
    }
}
