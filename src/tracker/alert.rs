use super::SessionState;

/// One spoken alert per distraction episode.
///
/// The threshold applies to the session's cumulative distraction time. Once it
/// has been crossed, every later episode alerts on its first distracted frame.
#[derive(Debug, Clone)]
pub struct AlertDebouncer {
    threshold_secs: f64,
}

impl AlertDebouncer {
    pub fn new(threshold_secs: f64) -> Self {
        Self { threshold_secs }
    }

    /// Updates `alert_fired` for this frame and returns true when the alert
    /// should be spoken now.
    pub fn evaluate(&self, state: &mut SessionState, in_range: bool) -> bool {
        if in_range {
            state.alert_fired = false;
            return false;
        }
        if state.alert_fired || state.distraction_seconds() < self.threshold_secs {
            return false;
        }
        state.alert_fired = true;
        true
    }
}
