use std::{sync::Arc, time::Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::{
    actuator::ActuatorController,
    audio::VoiceSink,
    camera::{FrameSource, LandmarkExtractor},
    geometry::{FrameObservation, GazeBand},
    settings::TrackerSettings,
    status::{FrameStatus, StatusSnapshot, StatusWriter},
};

use super::{classify, AlertDebouncer, CalibrationProgress, CalibrationStage, SessionState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Cumulative distraction reached the limit.
    AutoStopped,
    ManualStop,
    /// The camera stopped delivering frames.
    AcquisitionFailure,
    /// No face appeared for too long during calibration.
    CalibrationStalled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::AutoStopped => "AutoStopped",
            StopReason::ManualStop => "ManualStop",
            StopReason::AcquisitionFailure => "AcquisitionFailure",
            StopReason::CalibrationStalled => "CalibrationStalled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Stop(StopReason),
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub reason: StopReason,
    pub goal_angle: Option<f64>,
    pub focus_secs: f64,
    pub distraction_secs: f64,
    pub off_count: u32,
    pub alerts_fired: u32,
    pub frames: u64,
}

/// Runs the per-frame pipeline: calibration, classification, timing,
/// actuator, alert, status, stop check.
pub struct SessionController {
    settings: TrackerSettings,
    band: GazeBand,
    state: SessionState,
    calibration: Option<CalibrationStage>,
    actuator: ActuatorController,
    debouncer: AlertDebouncer,
    voice: Arc<dyn VoiceSink>,
    status_writer: Option<StatusWriter>,
    last_status: FrameStatus,
    stop: CancellationToken,
    frames: u64,
    alerts_fired: u32,
    log_every_frames: u64,
}

impl SessionController {
    pub fn new(
        settings: TrackerSettings,
        actuator: ActuatorController,
        voice: Arc<dyn VoiceSink>,
        status_writer: Option<StatusWriter>,
    ) -> Result<Self> {
        settings.validate()?;

        let debug_mode = std::env::var("FOCUSWATCH_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            band: GazeBand {
                left_limit: settings.eye_x_left_limit,
                right_limit: settings.eye_x_right_limit,
            },
            state: SessionState::new(settings.frame_period_secs),
            calibration: None,
            actuator,
            debouncer: AlertDebouncer::new(settings.alert_threshold_secs),
            voice,
            status_writer,
            last_status: FrameStatus::Idle,
            stop: CancellationToken::new(),
            frames: 0,
            alerts_fired: 0,
            log_every_frames: if debug_mode {
                1
            } else {
                u64::from(settings.nominal_fps())
            },
            settings,
        })
    }

    /// Token that ends the session at the next frame boundary when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn last_status(&self) -> FrameStatus {
        self.last_status
    }

    pub fn actuator_running(&self) -> bool {
        self.actuator.is_running()
    }

    pub fn gaze_band(&self) -> GazeBand {
        self.band
    }

    /// Pulls frames until a stop condition, then releases the actuator.
    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        extractor: &mut dyn LandmarkExtractor,
    ) -> SessionReport {
        log_info!(
            "Please face forward and hold steady for {}s to set focus direction.",
            self.settings.calibration_secs
        );

        let reason = loop {
            if self.stop.is_cancelled() {
                log_info!("Manual stop");
                break StopReason::ManualStop;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log_warn!("Failed to grab frame; ending session");
                    break StopReason::AcquisitionFailure;
                }
                Err(err) => {
                    log_error!("frame source failed: {err:#}");
                    break StopReason::AcquisitionFailure;
                }
            };

            let landmarks = extractor.extract(&frame.image);
            let observation = FrameObservation::from_landmarks(landmarks.as_ref(), self.band);
            if let StepOutcome::Stop(reason) = self.process(observation, Instant::now()) {
                break reason;
            }
        };

        self.finish(reason)
    }

    /// Handles one frame observed at `now`.
    pub fn process(&mut self, observation: FrameObservation, now: Instant) -> StepOutcome {
        self.frames += 1;

        let outcome = match (self.state.goal_angle, observation) {
            (None, FrameObservation::Face { rotation_deg, .. }) => {
                self.calibrate(rotation_deg, now)
            }
            (None, FrameObservation::NoFace) => self.calibration_gap(now),
            (
                Some(goal_angle),
                FrameObservation::Face {
                    rotation_deg,
                    gaze_diverted,
                },
            ) => self.track(goal_angle, rotation_deg, gaze_diverted),
            // Face loss freezes the counters and the edge state.
            (Some(_), FrameObservation::NoFace) => {
                self.last_status = FrameStatus::NoFace;
                StepOutcome::Continue
            }
        };

        self.publish_status();
        outcome
    }

    /// Releases the actuator and summarizes the session.
    pub fn finish(&mut self, reason: StopReason) -> SessionReport {
        self.actuator.shutdown();
        self.publish_status();

        let report = SessionReport {
            reason,
            goal_angle: self.state.goal_angle,
            focus_secs: self.state.focus_seconds(),
            distraction_secs: self.state.distraction_seconds(),
            off_count: self.state.off_transition_count,
            alerts_fired: self.alerts_fired,
            frames: self.frames,
        };
        log_info!(
            "session ended ({}): focus {:.0}s, distraction {:.0}s, off count {}",
            reason.as_str(),
            report.focus_secs,
            report.distraction_secs,
            report.off_count
        );
        report
    }

    fn stage(&mut self, now: Instant) -> &mut CalibrationStage {
        let window = self.settings.calibration_window();
        let stall_after = self.settings.calibration_stall();
        self.calibration
            .get_or_insert_with(|| CalibrationStage::new(window, stall_after, now))
    }

    fn calibrate(&mut self, rotation_deg: f64, now: Instant) -> StepOutcome {
        let stage = self.stage(now);
        let progress = stage.observe(rotation_deg, now);
        let elapsed_secs = stage.elapsed(now).as_secs();
        self.last_status = FrameStatus::Calibrating { elapsed_secs };

        if let CalibrationProgress::Complete {
            goal_angle,
            samples,
        } = progress
        {
            log_info!("Focus direction set at angle {goal_angle:.2}° from {samples} samples");
            self.state.begin_tracking(goal_angle);
            self.calibration = None;
        }
        StepOutcome::Continue
    }

    fn calibration_gap(&mut self, now: Instant) -> StepOutcome {
        self.last_status = FrameStatus::NoFace;
        if self.stage(now).is_stalled(now) {
            log_warn!(
                "no face seen for {}s during calibration; giving up",
                self.settings.calibration_stall_secs
            );
            return StepOutcome::Stop(StopReason::CalibrationStalled);
        }
        StepOutcome::Continue
    }

    fn track(&mut self, goal_angle: f64, rotation_deg: f64, gaze_diverted: bool) -> StepOutcome {
        let verdict = classify(
            goal_angle,
            rotation_deg,
            gaze_diverted,
            self.settings.angle_tolerance_deg,
        );

        if self.state.record_frame(verdict.in_range) {
            log_info!(
                "distraction #{} (face diff {:.1}°, eyes out: {gaze_diverted})",
                self.state.off_transition_count,
                verdict.angle_diff
            );
        }

        if let Err(err) = self.actuator.follow(verdict.in_range) {
            log_error!("actuator update failed: {err:#}");
        }

        if self.debouncer.evaluate(&mut self.state, verdict.in_range) {
            self.alerts_fired += 1;
            log_info!(
                "distracted for {:.0}s; speaking alert",
                self.state.distraction_seconds()
            );
            if let Err(err) = self.voice.speak(&self.settings.alert_text) {
                log_warn!("voice alert failed: {err:#}");
            }
        }

        self.last_status = if verdict.in_range {
            FrameStatus::Focused {
                angle_diff: verdict.angle_diff,
            }
        } else {
            FrameStatus::Distracted {
                angle_diff: verdict.angle_diff,
                gaze_diverted,
            }
        };

        if self.state.distraction_seconds() >= self.settings.distraction_limit_secs {
            log_warn!(
                "Distracted over {}s. Auto stopping.",
                self.settings.distraction_limit_secs
            );
            return StepOutcome::Stop(StopReason::AutoStopped);
        }
        StepOutcome::Continue
    }

    fn publish_status(&self) {
        let snapshot = StatusSnapshot::capture(&self.state, self.last_status);
        if let Some(writer) = &self.status_writer {
            if let Err(err) = writer.write(&snapshot) {
                log_warn!("{err:#}");
            }
        }

        if self.frames % self.log_every_frames == 0 {
            log_info!(
                "{} | focus {}s, distraction {}s, off {}",
                self.last_status,
                snapshot.focus_secs,
                snapshot.distraction_secs,
                snapshot.off_count
            );
        } else {
            log_debug!("{}", self.last_status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{testing::RecordingActuator, Actuator, NEUTRAL_DUTY};
    use crate::audio::testing::RecordingVoice;
    use crate::settings::ActuatorSettings;
    use crate::tracker::Phase;
    use std::time::Duration;

    struct Harness {
        controller: SessionController,
        actuator: Arc<RecordingActuator>,
        voice: Arc<RecordingVoice>,
        now: Instant,
    }

    impl Harness {
        fn new(settings: TrackerSettings) -> Self {
            let actuator = Arc::new(RecordingActuator::default());
            let voice = Arc::new(RecordingVoice::default());
            let driver: Arc<dyn Actuator> = actuator.clone();
            let actuator_ctl = ActuatorController::new(
                driver,
                ActuatorSettings {
                    half_period_secs: 0.05,
                    poll_interval_secs: 0.005,
                    ..ActuatorSettings::default()
                },
            );
            let controller =
                SessionController::new(settings, actuator_ctl, voice.clone(), None).unwrap();
            Self {
                controller,
                actuator,
                voice,
                now: Instant::now(),
            }
        }

        fn frame(&mut self, observation: FrameObservation) -> StepOutcome {
            self.now += Duration::from_millis(33);
            self.controller.process(observation, self.now)
        }

        fn calibrate_at(&mut self, angle: f64) {
            let start = self.now;
            while self.controller.state().phase == Phase::Calibrating {
                self.frame(face(angle, false));
                assert!(self.now - start < Duration::from_secs(11));
            }
        }
    }

    fn face(rotation_deg: f64, gaze_diverted: bool) -> FrameObservation {
        FrameObservation::Face {
            rotation_deg,
            gaze_diverted,
        }
    }

    #[test]
    fn unschedulable_calibration_window_is_rejected() {
        let actuator: Arc<dyn Actuator> = Arc::new(RecordingActuator::default());
        let settings = TrackerSettings {
            calibration_secs: 1e20,
            ..TrackerSettings::default()
        };
        let result = SessionController::new(
            settings,
            ActuatorController::new(actuator, ActuatorSettings::default()),
            Arc::new(RecordingVoice::default()),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn calibration_then_focus_accumulates() {
        let mut h = Harness::new(TrackerSettings::default());
        h.calibrate_at(5.0);
        assert_eq!(h.controller.state().goal_angle, Some(5.0));
        assert_eq!(h.controller.state().focus_frames, 0);

        for _ in 0..900 {
            assert_eq!(h.frame(face(12.0, false)), StepOutcome::Continue);
        }
        assert_eq!(h.controller.state().focus_seconds(), 30.0);
        assert_eq!(h.controller.state().off_transition_count, 0);
        assert_eq!(
            h.controller.last_status(),
            FrameStatus::Focused { angle_diff: 7.0 }
        );
        assert!(h.actuator.writes().is_empty());
    }

    #[test]
    fn calibration_ignores_faceless_frames() {
        let mut h = Harness::new(TrackerSettings::default());
        h.frame(face(2.0, false));
        for _ in 0..30 {
            h.frame(FrameObservation::NoFace);
        }
        assert_eq!(h.controller.last_status(), FrameStatus::NoFace);
        h.calibrate_at(4.0);
        // the first sample is part of the mean
        let goal = h.controller.state().goal_angle.unwrap();
        assert!(goal < 4.0 && goal > 3.9, "goal {goal}");
    }

    #[test]
    fn calibration_stall_stops_session() {
        let mut h = Harness::new(TrackerSettings::default());
        let mut outcome = StepOutcome::Continue;
        for _ in 0..400 {
            outcome = h.frame(FrameObservation::NoFace);
            if outcome != StepOutcome::Continue {
                break;
            }
        }
        assert_eq!(outcome, StepOutcome::Stop(StopReason::CalibrationStalled));
    }

    #[test]
    fn distraction_edge_drives_actuator() {
        let mut h = Harness::new(TrackerSettings::default());
        h.calibrate_at(0.0);

        h.frame(face(0.0, false));
        h.frame(face(30.0, false));
        assert!(h.controller.actuator_running());
        h.frame(face(0.0, true));
        assert_eq!(h.controller.state().off_transition_count, 1);

        h.frame(face(1.0, false));
        assert!(!h.controller.actuator_running());
        assert_eq!(h.actuator.last(), Some(NEUTRAL_DUTY));
        assert_eq!(h.controller.state().off_transition_count, 1);
    }

    #[test]
    fn face_loss_freezes_counters() {
        let mut h = Harness::new(TrackerSettings::default());
        h.calibrate_at(0.0);
        h.frame(face(0.0, false));
        let before = h.controller.state().clone();

        for _ in 0..90 {
            h.frame(FrameObservation::NoFace);
        }
        let after = h.controller.state();
        assert_eq!(after.focus_frames, before.focus_frames);
        assert_eq!(after.distraction_frames, before.distraction_frames);
        assert!(after.was_in_range);

        h.frame(face(40.0, false));
        assert_eq!(h.controller.state().off_transition_count, 1);
    }

    #[test]
    fn alert_fires_once_and_session_auto_stops() {
        let mut h = Harness::new(TrackerSettings::default());
        h.calibrate_at(0.0);

        let mut stopped_at = None;
        for frame in 1..=2000u32 {
            if let StepOutcome::Stop(reason) = h.frame(face(45.0, false)) {
                stopped_at = Some((frame, reason));
                break;
            }
        }
        assert_eq!(stopped_at, Some((1800, StopReason::AutoStopped)));
        assert_eq!(h.voice.lines(), vec!["專心點".to_string()]);

        let report = h.controller.finish(StopReason::AutoStopped);
        assert_eq!(report.alerts_fired, 1);
        assert_eq!(report.distraction_secs, 60.0);
        assert!(!h.controller.actuator_running());
        assert_eq!(h.actuator.last(), Some(NEUTRAL_DUTY));
    }
}
