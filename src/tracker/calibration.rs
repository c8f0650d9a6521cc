use std::time::{Duration, Instant};

/// Result of feeding one face frame to the calibration stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationProgress {
    Collecting { elapsed: Duration },
    Complete { goal_angle: f64, samples: usize },
}

/// Collects rotation angles over the warm-up window and averages them into
/// the goal angle.
///
/// The window is wall-clock time measured from the first face sample. Frames
/// without a face add nothing; if none arrives for `stall_after` the stage
/// reports a stall instead of waiting forever.
#[derive(Debug, Clone)]
pub struct CalibrationStage {
    window: Duration,
    stall_after: Duration,
    samples: Vec<f64>,
    started_at: Option<Instant>,
    last_face_at: Instant,
}

impl CalibrationStage {
    pub fn new(window: Duration, stall_after: Duration, now: Instant) -> Self {
        Self {
            window,
            stall_after,
            samples: Vec::new(),
            started_at: None,
            last_face_at: now,
        }
    }

    pub fn observe(&mut self, rotation_deg: f64, now: Instant) -> CalibrationProgress {
        let started_at = *self.started_at.get_or_insert(now);
        self.last_face_at = now;
        self.samples.push(rotation_deg);

        let elapsed = now.saturating_duration_since(started_at);
        if elapsed < self.window {
            return CalibrationProgress::Collecting { elapsed };
        }

        let goal_angle = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        CalibrationProgress::Complete {
            goal_angle,
            samples: self.samples.len(),
        }
    }

    /// True once no face has been seen for longer than the stall limit.
    pub fn is_stalled(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_face_at) > self.stall_after
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[test]
    fn goal_is_mean_of_all_samples() {
        let t0 = Instant::now();
        let mut stage = CalibrationStage::new(WINDOW, WINDOW, t0);
        let angles = [2.0, -1.0, 4.0, 3.0, 0.5, 1.5, -2.0, 6.0, 1.0, 0.0, 2.5];

        let mut last = None;
        for (i, angle) in angles.iter().enumerate() {
            last = Some(stage.observe(*angle, t0 + Duration::from_secs(i as u64)));
        }

        let expected = angles.iter().sum::<f64>() / angles.len() as f64;
        match last {
            Some(CalibrationProgress::Complete {
                goal_angle,
                samples,
            }) => {
                assert!((goal_angle - expected).abs() < 1e-12);
                assert_eq!(samples, angles.len());
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn stays_open_until_window_elapses() {
        let t0 = Instant::now();
        let mut stage = CalibrationStage::new(WINDOW, WINDOW, t0);
        let progress = stage.observe(1.0, t0 + Duration::from_secs(3));
        assert_eq!(
            progress,
            CalibrationProgress::Collecting {
                elapsed: Duration::ZERO
            }
        );

        let progress = stage.observe(1.0, t0 + Duration::from_millis(12_999));
        assert!(matches!(progress, CalibrationProgress::Collecting { .. }));
        assert_eq!(stage.sample_count(), 2);

        let progress = stage.observe(4.0, t0 + Duration::from_secs(13));
        assert_eq!(
            progress,
            CalibrationProgress::Complete {
                goal_angle: 2.0,
                samples: 3
            }
        );
    }

    #[test]
    fn stalls_without_faces() {
        let t0 = Instant::now();
        let stage = CalibrationStage::new(WINDOW, Duration::from_secs(5), t0);
        assert!(!stage.is_stalled(t0 + Duration::from_secs(5)));
        assert!(stage.is_stalled(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn a_face_resets_the_stall_clock() {
        let t0 = Instant::now();
        let mut stage = CalibrationStage::new(WINDOW, Duration::from_secs(5), t0);
        stage.observe(0.0, t0 + Duration::from_secs(4));
        assert!(!stage.is_stalled(t0 + Duration::from_secs(8)));
        assert!(stage.is_stalled(t0 + Duration::from_secs(10)));
        assert_eq!(
            stage.elapsed(t0 + Duration::from_secs(10)),
            Duration::from_secs(6)
        );
    }
}
