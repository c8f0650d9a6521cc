use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Outer corner of the left eye in image space.
pub const LEFT_EYE_OUTER: usize = 33;
pub const LEFT_EYE_INNER: usize = 133;
pub const RIGHT_EYE_INNER: usize = 362;
/// Outer corner of the right eye in image space.
pub const RIGHT_EYE_OUTER: usize = 263;

/// Point count of a refined face mesh (468 face points plus 10 iris points).
pub const FACE_MESH_POINTS: usize = 478;

const MIN_POINTS: usize = RIGHT_EYE_INNER + 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Landmarks of one detected face.
///
/// Construction guarantees every eye-corner index used by the geometry
/// functions is present, so lookups never fail afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Result<Self> {
        if points.len() < MIN_POINTS {
            bail!(
                "landmark set has {} points, need at least {MIN_POINTS}",
                points.len()
            );
        }
        Ok(Self { points })
    }

    /// Full-size mesh with only the four eye corners placed; every other
    /// point sits at the origin.
    pub fn from_eye_corners(
        left_outer: (f64, f64),
        left_inner: (f64, f64),
        right_inner: (f64, f64),
        right_outer: (f64, f64),
    ) -> Self {
        let mut points = vec![Landmark::default(); FACE_MESH_POINTS];
        points[LEFT_EYE_OUTER] = Landmark::new(left_outer.0, left_outer.1);
        points[LEFT_EYE_INNER] = Landmark::new(left_inner.0, left_inner.1);
        points[RIGHT_EYE_INNER] = Landmark::new(right_inner.0, right_inner.1);
        points[RIGHT_EYE_OUTER] = Landmark::new(right_outer.0, right_outer.1);
        Self { points }
    }

    pub fn point(&self, index: usize) -> Landmark {
        self.points[index]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
