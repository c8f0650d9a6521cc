//! Seams for the camera and the face-landmark model.

pub mod simulator;

pub use simulator::{SimulatedCamera, SimulatedFaceMesh};

use anyhow::{bail, Result};
use image::RgbImage;

use crate::geometry::LandmarkSet;

/// One captured frame, already converted to RGB for the landmark model.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Builds a frame from a packed BGR capture buffer.
    pub fn from_bgr(width: u32, height: u32, mut bgr: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if bgr.len() != expected {
            bail!(
                "BGR buffer holds {} bytes, expected {expected} for {width}x{height}",
                bgr.len()
            );
        }
        for pixel in bgr.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        match RgbImage::from_raw(width, height, bgr) {
            Some(image) => Ok(Self { image }),
            None => bail!("BGR buffer does not fit {width}x{height}"),
        }
    }
}

/// Blocking frame producer. `Ok(None)` means the camera stopped delivering.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Face-mesh model. Returns landmarks of the first detected face, if any.
pub trait LandmarkExtractor: Send {
    fn extract(&mut self, image: &RgbImage) -> Option<LandmarkSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_channels_are_swapped() {
        let frame = Frame::from_bgr(2, 1, vec![1, 2, 3, 10, 20, 30]).unwrap();
        assert_eq!(frame.image.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(frame.image.get_pixel(1, 0).0, [30, 20, 10]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(Frame::from_bgr(2, 2, vec![0; 5]).is_err());
    }
}
