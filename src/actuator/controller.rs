use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};

use crate::settings::ActuatorSettings;

use super::{
    oscillator::{oscillate, OscillationPlan},
    Actuator, NEUTRAL_DUTY,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const JOIN_POLL: Duration = Duration::from_millis(2);

struct Oscillation {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

/// Owns the oscillation thread and keeps at most one alive.
///
/// Start/stop decisions come from the frame loop only; the per-run stop flag
/// is the single value shared with the oscillation thread.
pub struct ActuatorController {
    actuator: Arc<dyn Actuator>,
    settings: ActuatorSettings,
    active: Option<Oscillation>,
    /// Thread that missed the join deadline. Blocks new starts until it exits.
    stalled: Option<Oscillation>,
}

impl ActuatorController {
    /// Invalid settings are replaced by the defaults.
    pub fn new(actuator: Arc<dyn Actuator>, settings: ActuatorSettings) -> Self {
        let settings = match settings.validate() {
            Ok(()) => settings,
            Err(err) => {
                log_warn!("invalid actuator settings ({err:#}); using defaults");
                ActuatorSettings::default()
            }
        };
        Self {
            actuator,
            settings,
            active: None,
            stalled: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .map(|run| !run.handle.is_finished())
            .unwrap_or(false)
    }

    /// Starts oscillating. Returns `Ok(false)` without side effects when an
    /// oscillation thread is already alive.
    pub fn start(&mut self) -> Result<bool> {
        self.reap_stalled();
        if self.stalled.is_some() {
            return Ok(false);
        }

        if let Some(run) = self.active.take() {
            if !run.handle.is_finished() {
                self.active = Some(run);
                return Ok(false);
            }
            if run.handle.join().is_err() {
                log_error!("oscillation thread panicked; restarting");
                self.force_neutral();
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let plan = OscillationPlan {
            duty_extreme: self.settings.duty_extreme,
            half_period: self.settings.half_period(),
            poll_interval: self.settings.poll_interval(),
        };
        let actuator = Arc::clone(&self.actuator);
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("actuator-oscillator".into())
            .spawn(move || oscillate(actuator, thread_stop, plan))
            .context("failed to spawn oscillation thread")?;

        self.active = Some(Oscillation { handle, stop });
        log_info!("actuator oscillation started");
        Ok(true)
    }

    /// Stops the oscillation thread and waits for it to park the actuator at
    /// neutral. Returns true if a thread was running.
    ///
    /// The wait is bounded by `join_timeout`; past it the controller writes
    /// neutral itself and keeps the stuck handle so no second thread starts.
    pub fn stop(&mut self) -> bool {
        let Some(run) = self.active.take() else {
            return false;
        };
        run.stop.store(true, Ordering::SeqCst);

        let started = Instant::now();
        let timeout = self.settings.join_timeout();
        while !run.handle.is_finished() {
            if started.elapsed() >= timeout {
                log_error!(
                    "oscillation thread ignored stop for {timeout:?}; forcing neutral \
                     and holding off new starts until it exits"
                );
                self.force_neutral();
                self.stalled = Some(run);
                return true;
            }
            thread::sleep(JOIN_POLL);
        }

        if run.handle.join().is_err() {
            log_error!("oscillation thread panicked before parking; forcing neutral");
            self.force_neutral();
        }
        log_info!("actuator oscillation stopped");
        true
    }

    /// Starts on distraction, stops on focus. Called once per tracked frame.
    pub fn follow(&mut self, in_range: bool) -> Result<()> {
        if in_range {
            if self.active.is_some() {
                self.stop();
            }
        } else if !self.is_running() {
            self.start()?;
        }
        Ok(())
    }

    /// Final release: stops any oscillation and leaves the actuator neutral.
    pub fn shutdown(&mut self) {
        self.stop();
        self.reap_stalled();
        if self.stalled.is_some() {
            self.force_neutral();
        }
    }

    fn reap_stalled(&mut self) {
        let finished = self
            .stalled
            .as_ref()
            .map(|run| run.handle.is_finished())
            .unwrap_or(false);
        if finished {
            if let Some(run) = self.stalled.take() {
                let _ = run.handle.join();
                log_info!("stalled oscillation thread has exited");
            }
        }
    }

    fn force_neutral(&self) {
        if let Err(err) = self.actuator.set_duty(NEUTRAL_DUTY) {
            log_error!("failed to force servo to neutral: {err:#}");
        }
    }
}

impl Drop for ActuatorController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::testing::RecordingActuator;

    fn fast_settings() -> ActuatorSettings {
        ActuatorSettings {
            half_period_secs: 0.02,
            poll_interval_secs: 0.005,
            join_timeout_secs: 1.0,
            duty_extreme: 1.0,
        }
    }

    fn controller(
        actuator: &Arc<RecordingActuator>,
        settings: ActuatorSettings,
    ) -> ActuatorController {
        let actuator: Arc<dyn Actuator> = actuator.clone();
        ActuatorController::new(actuator, settings)
    }

    #[test]
    fn second_start_is_a_no_op_while_running() {
        let actuator = Arc::new(RecordingActuator::default());
        let mut ctl = controller(
            &actuator,
            ActuatorSettings {
                half_period_secs: 5.0,
                ..fast_settings()
            },
        );

        assert!(ctl.start().unwrap());
        assert!(!ctl.start().unwrap());
        thread::sleep(Duration::from_millis(30));
        assert!(ctl.is_running());
        assert_eq!(actuator.writes(), vec![1.0]);

        assert!(ctl.stop());
        assert_eq!(actuator.writes(), vec![1.0, NEUTRAL_DUTY]);
        assert!(!ctl.is_running());
    }

    #[test]
    fn stop_always_leaves_neutral() {
        let actuator = Arc::new(RecordingActuator::default());
        let mut ctl = controller(&actuator, fast_settings());

        for pause_ms in [0, 15, 45, 70] {
            ctl.start().unwrap();
            thread::sleep(Duration::from_millis(pause_ms));
            assert!(ctl.stop());
            assert_eq!(actuator.last(), Some(NEUTRAL_DUTY));
        }
    }

    #[test]
    fn stop_without_thread_is_harmless() {
        let actuator = Arc::new(RecordingActuator::default());
        let mut ctl = controller(&actuator, fast_settings());
        assert!(!ctl.stop());
        assert!(actuator.writes().is_empty());
    }

    #[test]
    fn follow_tracks_verdicts() {
        let actuator = Arc::new(RecordingActuator::default());
        let mut ctl = controller(&actuator, fast_settings());

        ctl.follow(true).unwrap();
        assert!(!ctl.is_running());
        ctl.follow(false).unwrap();
        ctl.follow(false).unwrap();
        assert!(ctl.is_running());
        ctl.follow(true).unwrap();
        assert!(!ctl.is_running());
        assert_eq!(actuator.last(), Some(NEUTRAL_DUTY));
    }

    #[test]
    fn unresponsive_thread_is_neutralized_and_blocks_restart() {
        let actuator = Arc::new(RecordingActuator::blocking_first_write(
            Duration::from_millis(300),
        ));
        let mut ctl = controller(
            &actuator,
            ActuatorSettings {
                join_timeout_secs: 0.05,
                ..fast_settings()
            },
        );

        ctl.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        assert!(ctl.stop());
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(actuator.last(), Some(NEUTRAL_DUTY));

        assert!(!ctl.start().unwrap());

        thread::sleep(Duration::from_millis(400));
        assert_eq!(actuator.last(), Some(NEUTRAL_DUTY));
        assert!(ctl.start().unwrap());
        ctl.shutdown();
        assert_eq!(actuator.last(), Some(NEUTRAL_DUTY));
    }

    #[test]
    fn parked_thread_keeps_follow_quiet() {
        let actuator = Arc::new(RecordingActuator::blocking_first_write(
            Duration::from_millis(300),
        ));
        let mut ctl = controller(
            &actuator,
            ActuatorSettings {
                join_timeout_secs: 0.05,
                ..fast_settings()
            },
        );

        ctl.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        ctl.stop();
        let parked_writes = actuator.writes().len();

        for _ in 0..30 {
            ctl.follow(false).unwrap();
        }
        assert!(!ctl.is_running());
        assert_eq!(actuator.writes().len(), parked_writes);
        ctl.shutdown();
    }

    #[test]
    fn out_of_range_settings_fall_back_to_defaults() {
        let actuator = Arc::new(RecordingActuator::default());
        let mut ctl = controller(
            &actuator,
            ActuatorSettings {
                join_timeout_secs: 1.0e19,
                poll_interval_secs: 0.0,
                ..fast_settings()
            },
        );
        assert_eq!(ctl.settings, ActuatorSettings::default());

        ctl.start().unwrap();
        thread::sleep(Duration::from_millis(10));
        assert!(ctl.stop());
        assert_eq!(actuator.last(), Some(NEUTRAL_DUTY));
    }

    #[test]
    fn drop_releases_to_neutral() {
        let actuator = Arc::new(RecordingActuator::default());
        {
            let mut ctl = controller(&actuator, fast_settings());
            ctl.start().unwrap();
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(actuator.last(), Some(NEUTRAL_DUTY));
    }
}
