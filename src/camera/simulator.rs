//! Stand-ins for the camera and face mesh, for running without hardware.

use anyhow::Result;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread;
use std::time::{Duration, Instant};

use super::{Frame, FrameSource, LandmarkExtractor};
use crate::geometry::LandmarkSet;

/// Emits blank frames paced at a fixed period, like a camera at its
/// nominal rate.
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    period: Duration,
    next_due: Option<Instant>,
    remaining: Option<u64>,
}

impl SimulatedCamera {
    pub fn new(period: Duration) -> Self {
        Self {
            width: 64,
            height: 48,
            period,
            next_due: None,
            remaining: None,
        }
    }

    /// Stops delivering after `frames` frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }
}

impl FrameSource for SimulatedCamera {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }

        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        self.next_due = Some(due.max(now) + self.period);

        Ok(Some(Frame::new(RgbImage::new(self.width, self.height))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Focused,
    /// Eyes shifted sideways past the gaze band.
    Glancing,
    /// Head rolled well past the tolerance.
    Turned,
    Absent,
}

/// Random subject: mostly focused, with glances, head turns and short
/// absences. Ignores frame content.
pub struct SimulatedFaceMesh {
    rng: StdRng,
    behaviour: Behaviour,
    frames_left: u32,
    glance_dir: f64,
    fps: u32,
}

impl SimulatedFaceMesh {
    pub fn new(fps: u32) -> Self {
        Self::with_rng(StdRng::from_entropy(), fps)
    }

    pub fn seeded(seed: u64, fps: u32) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), fps)
    }

    fn with_rng(rng: StdRng, fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            rng,
            behaviour: Behaviour::Focused,
            // calm start so calibration sees a steady face
            frames_left: fps * 15,
            glance_dir: 1.0,
            fps,
        }
    }

    fn next_behaviour(&mut self) {
        let roll: f64 = self.rng.gen();
        let (behaviour, secs) = if roll < 0.55 {
            (Behaviour::Focused, self.rng.gen_range(5.0..20.0))
        } else if roll < 0.75 {
            (Behaviour::Glancing, self.rng.gen_range(1.0..8.0))
        } else if roll < 0.92 {
            (Behaviour::Turned, self.rng.gen_range(1.0..10.0))
        } else {
            (Behaviour::Absent, self.rng.gen_range(0.5..3.0))
        };
        self.behaviour = behaviour;
        self.frames_left = ((secs * self.fps as f64) as u32).max(1);
        self.glance_dir = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    }

    fn face(&mut self, roll_deg: f64, shift_x: f64) -> LandmarkSet {
        let jitter = self.rng.gen_range(-0.004..0.004);
        let (cx, cy) = (0.5 + shift_x + jitter, 0.45);
        let radius = 0.08;
        let (sin, cos) = roll_deg.to_radians().sin_cos();
        let at = |scale: f64| (cx + scale * radius * cos, cy + scale * radius * sin);
        LandmarkSet::from_eye_corners(at(-1.0), at(-0.4), at(0.4), at(1.0))
    }
}

impl LandmarkExtractor for SimulatedFaceMesh {
    fn extract(&mut self, _image: &RgbImage) -> Option<LandmarkSet> {
        if self.frames_left == 0 {
            self.next_behaviour();
        }
        self.frames_left -= 1;

        let noise = self.rng.gen_range(-3.0..3.0);
        match self.behaviour {
            Behaviour::Focused => Some(self.face(noise, 0.0)),
            Behaviour::Glancing => {
                let shift = self.glance_dir * 0.12;
                Some(self.face(noise, shift))
            }
            Behaviour::Turned => {
                let roll = self.glance_dir * 25.0 + noise;
                Some(self.face(roll, 0.0))
            }
            Behaviour::Absent => None,
        }
    }
}
