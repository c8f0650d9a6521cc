//! Head-rotation and gaze signals derived from face-mesh landmarks.
//!
//! Landmarks use the face-mesh convention: `x` and `y` are normalized to the
//! image, so `(0, 0)` is the top-left corner and `(1, 1)` the bottom-right.

mod landmarks;

pub use landmarks::{
    Landmark, LandmarkSet, LEFT_EYE_INNER, LEFT_EYE_OUTER, RIGHT_EYE_INNER, RIGHT_EYE_OUTER,
};

/// Horizontal band the eye midpoints must stay inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeBand {
    pub left_limit: f64,
    pub right_limit: f64,
}

impl Default for GazeBand {
    fn default() -> Self {
        Self {
            left_limit: 0.40,
            right_limit: 0.60,
        }
    }
}

/// Angle of the outer-eye to outer-eye vector against the horizontal, in degrees.
pub fn rotation_angle(landmarks: &LandmarkSet) -> f64 {
    let left = landmarks.point(LEFT_EYE_OUTER);
    let right = landmarks.point(RIGHT_EYE_OUTER);
    let dx = right.x - left.x;
    let dy = right.y - left.y;
    dy.atan2(dx).to_degrees()
}

/// True when either eye's corner midpoint leaves the central band.
pub fn gaze_diverted(landmarks: &LandmarkSet, band: GazeBand) -> bool {
    let left_mid = midpoint_x(landmarks, LEFT_EYE_INNER, LEFT_EYE_OUTER);
    let right_mid = midpoint_x(landmarks, RIGHT_EYE_INNER, RIGHT_EYE_OUTER);
    left_mid < band.left_limit || right_mid > band.right_limit
}

fn midpoint_x(landmarks: &LandmarkSet, a: usize, b: usize) -> f64 {
    (landmarks.point(a).x + landmarks.point(b).x) / 2.0
}

/// One frame's derived signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameObservation {
    NoFace,
    Face {
        rotation_deg: f64,
        gaze_diverted: bool,
    },
}

impl FrameObservation {
    pub fn from_landmarks(landmarks: Option<&LandmarkSet>, band: GazeBand) -> Self {
        match landmarks {
            Some(set) => FrameObservation::Face {
                rotation_deg: rotation_angle(set),
                gaze_diverted: gaze_diverted(set, band),
            },
            None => FrameObservation::NoFace,
        }
    }

    pub fn face_found(&self) -> bool {
        matches!(self, FrameObservation::Face { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eyes(
        left_outer: (f64, f64),
        left_inner: (f64, f64),
        right_inner: (f64, f64),
        right_outer: (f64, f64),
    ) -> LandmarkSet {
        LandmarkSet::from_eye_corners(left_outer, left_inner, right_inner, right_outer)
    }

    #[test]
    fn level_eyes_give_zero_rotation() {
        let set = eyes((0.45, 0.5), (0.48, 0.5), (0.52, 0.5), (0.55, 0.5));
        assert!(rotation_angle(&set).abs() < 1e-9);
    }

    #[test]
    fn tilted_eyes_give_signed_rotation() {
        // right eye 0.1 lower and 0.1 further right: 45 degrees
        let set = eyes((0.40, 0.40), (0.45, 0.45), (0.45, 0.45), (0.50, 0.50));
        assert!((rotation_angle(&set) - 45.0).abs() < 1e-9);

        let set = eyes((0.40, 0.50), (0.45, 0.45), (0.45, 0.45), (0.50, 0.40));
        assert!((rotation_angle(&set) + 45.0).abs() < 1e-9);
    }

    #[test]
    fn left_midpoint_below_band_is_diverted() {
        // midpoint of 0.33 and 0.37 is 0.35
        for right_mid in [0.45, 0.5, 0.55] {
            let set = eyes(
                (0.33, 0.5),
                (0.37, 0.5),
                (right_mid - 0.02, 0.5),
                (right_mid + 0.02, 0.5),
            );
            assert!(gaze_diverted(&set, GazeBand::default()));
        }
    }

    #[test]
    fn right_midpoint_above_band_is_diverted() {
        let set = eyes((0.45, 0.5), (0.49, 0.5), (0.60, 0.5), (0.64, 0.5));
        assert!(gaze_diverted(&set, GazeBand::default()));
    }

    #[test]
    fn midpoints_inside_band_are_not_diverted() {
        for (left_mid, right_mid) in [(0.41, 0.59), (0.45, 0.55), (0.5, 0.5), (0.42, 0.58)] {
            let set = eyes(
                (left_mid - 0.01, 0.5),
                (left_mid + 0.01, 0.5),
                (right_mid - 0.01, 0.5),
                (right_mid + 0.01, 0.5),
            );
            assert!(
                !gaze_diverted(&set, GazeBand::default()),
                "left {left_mid} right {right_mid}"
            );
        }
    }

    #[test]
    fn band_is_configurable() {
        let set = eyes((0.33, 0.5), (0.37, 0.5), (0.48, 0.5), (0.52, 0.5));
        let wide = GazeBand {
            left_limit: 0.30,
            right_limit: 0.70,
        };
        assert!(!gaze_diverted(&set, wide));
    }

    #[test]
    fn observation_without_landmarks_is_no_face() {
        let obs = FrameObservation::from_landmarks(None, GazeBand::default());
        assert_eq!(obs, FrameObservation::NoFace);
        assert!(!obs.face_found());
    }
}
