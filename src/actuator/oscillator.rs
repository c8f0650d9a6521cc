use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use super::{Actuator, NEUTRAL_DUTY};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Timing for one oscillation run.
#[derive(Debug, Clone, Copy)]
pub struct OscillationPlan {
    pub duty_extreme: f32,
    pub half_period: Duration,
    pub poll_interval: Duration,
}

/// Swings the actuator between `+duty_extreme` and `-duty_extreme` until
/// `stop` is raised, then parks it at neutral.
///
/// Each half period is slept in `poll_interval` slices, so a stop request is
/// seen within one slice.
pub fn oscillate(actuator: Arc<dyn Actuator>, stop: Arc<AtomicBool>, plan: OscillationPlan) {
    log_debug!("oscillation loop running");
    while !stop.load(Ordering::SeqCst) {
        write_duty(actuator.as_ref(), plan.duty_extreme);
        if wait_or_stopped(&stop, plan.half_period, plan.poll_interval) {
            break;
        }
        write_duty(actuator.as_ref(), -plan.duty_extreme);
        if wait_or_stopped(&stop, plan.half_period, plan.poll_interval) {
            break;
        }
    }
    write_duty(actuator.as_ref(), NEUTRAL_DUTY);
    log_debug!("oscillation loop parked at neutral");
}

/// Sleeps up to `total`; returns true as soon as `stop` is observed.
pub fn wait_or_stopped(stop: &AtomicBool, total: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(poll.min(deadline - now));
    }
}

fn write_duty(actuator: &dyn Actuator, duty: f32) {
    if let Err(err) = actuator.set_duty(duty) {
        log_warn!("servo write of {duty:+.1} failed: {err:#}");
    }
}
