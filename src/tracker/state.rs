#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Calibrating,
    Tracking,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Calibrating
    }
}

/// Counters owned by the session controller and updated once per frame.
///
/// Time is kept as frame counts and converted with the assumed frame period,
/// so long runs do not drift from repeated float addition.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: Phase,
    pub goal_angle: Option<f64>,
    pub focus_frames: u64,
    pub distraction_frames: u64,
    pub off_transition_count: u32,
    pub was_in_range: bool,
    pub alert_fired: bool,
    frame_period_secs: f64,
}

impl SessionState {
    pub fn new(frame_period_secs: f64) -> Self {
        Self {
            phase: Phase::Calibrating,
            goal_angle: None,
            focus_frames: 0,
            distraction_frames: 0,
            off_transition_count: 0,
            was_in_range: true,
            alert_fired: false,
            frame_period_secs,
        }
    }

    /// Enters tracking with fresh counters; the session clock starts here.
    pub fn begin_tracking(&mut self, goal_angle: f64) {
        *self = Self {
            phase: Phase::Tracking,
            goal_angle: Some(goal_angle),
            ..Self::new(self.frame_period_secs)
        };
    }

    /// Adds one frame period to the matching bucket. Returns true when this
    /// frame is the first distracted frame after an in-range one.
    pub fn record_frame(&mut self, in_range: bool) -> bool {
        let went_off = self.was_in_range && !in_range;
        if in_range {
            self.focus_frames += 1;
        } else {
            self.distraction_frames += 1;
        }
        if went_off {
            self.off_transition_count += 1;
        }
        self.was_in_range = in_range;
        went_off
    }

    pub fn focus_seconds(&self) -> f64 {
        self.focus_frames as f64 * self.frame_period_secs
    }

    pub fn distraction_seconds(&self) -> f64 {
        self.distraction_frames as f64 * self.frame_period_secs
    }

    pub fn frame_period_secs(&self) -> f64 {
        self.frame_period_secs
    }
}
