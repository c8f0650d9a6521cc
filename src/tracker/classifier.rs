/// Per-frame attention decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub in_range: bool,
    /// Signed rotation away from the goal angle, in degrees.
    pub angle_diff: f64,
}

/// Focused iff the head is within `tolerance_deg` of the goal and the gaze
/// is not diverted. Stateless: one noisy frame is enough to flip the result.
pub fn classify(
    goal_angle: f64,
    rotation_deg: f64,
    gaze_diverted: bool,
    tolerance_deg: f64,
) -> Verdict {
    let angle_diff = rotation_deg - goal_angle;
    Verdict {
        in_range: angle_diff.abs() <= tolerance_deg && !gaze_diverted,
        angle_diff,
    }
}
