//! Per-frame status and the two-line snapshot file read by external displays.

use anyhow::{Context, Result};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::tracker::SessionState;

/// What the tracker concluded for the latest frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameStatus {
    /// Nothing processed yet.
    Idle,
    Calibrating { elapsed_secs: u64 },
    Focused { angle_diff: f64 },
    Distracted { angle_diff: f64, gaze_diverted: bool },
    NoFace,
}

impl FrameStatus {
    pub fn code(&self) -> StatusCode {
        match self {
            FrameStatus::Focused { .. } => StatusCode::Ok,
            FrameStatus::Distracted { .. } => StatusCode::Distracted,
            FrameStatus::NoFace => StatusCode::NoFace,
            FrameStatus::Idle | FrameStatus::Calibrating { .. } => StatusCode::Unknown,
        }
    }
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameStatus::Idle => write!(f, "Waiting for frames"),
            FrameStatus::Calibrating { elapsed_secs } => {
                write!(f, "Setting focus... {elapsed_secs}s")
            }
            FrameStatus::Focused { angle_diff } => {
                write!(f, "Focusing! Face diff: {angle_diff:.1}, Eyes OK")
            }
            FrameStatus::Distracted {
                angle_diff,
                gaze_diverted,
            } => write!(
                f,
                "Distracted! Face diff: {angle_diff:.1}, Eye out: {gaze_diverted}"
            ),
            FrameStatus::NoFace => write!(f, "No face detected"),
        }
    }
}

/// Coarse status code written to the snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Distracted,
    NoFace,
    Unknown,
}

impl StatusCode {
    /// Short form used by the snapshot file; the small status display only
    /// has room for seven characters.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Distracted => "Distrct",
            StatusCode::NoFace => "NoFace",
            StatusCode::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub focus_secs: u64,
    pub distraction_secs: u64,
    pub off_count: u32,
    pub code: StatusCode,
}

impl StatusSnapshot {
    /// Seconds are truncated, never rounded.
    pub fn capture(state: &SessionState, status: FrameStatus) -> Self {
        Self {
            focus_secs: state.focus_seconds().max(0.0) as u64,
            distraction_secs: state.distraction_seconds().max(0.0) as u64,
            off_count: state.off_transition_count,
            code: status.code(),
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fcs:{}s Dst:{}s",
            self.focus_secs, self.distraction_secs
        )?;
        writeln!(f, "Off:{} Stat:{}", self.off_count, self.code.as_str())
    }
}

/// Replaces the snapshot file on every write. Readers see either the old or
/// the new snapshot, never a partial one.
pub struct StatusWriter {
    path: PathBuf,
    staging: PathBuf,
}

impl StatusWriter {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create status directory {}", parent.display())
                })?;
            }
        }
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        Ok(Self {
            path,
            staging: PathBuf::from(staging),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, snapshot: &StatusSnapshot) -> Result<()> {
        fs::write(&self.staging, snapshot.to_string())
            .with_context(|| format!("failed to write status to {}", self.staging.display()))?;
        fs::rename(&self.staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))
    }
}
