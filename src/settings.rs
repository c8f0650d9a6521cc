use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

/// Longest accepted duration setting (one day).
const MAX_SETTING_SECS: f64 = 86_400.0;

/// Shortest oscillator poll slice.
const MIN_POLL_SECS: f64 = 0.001;

fn check_secs(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= MAX_SETTING_SECS) {
        bail!("{name} must lie in (0, {MAX_SETTING_SECS}] seconds, got {value}");
    }
    Ok(())
}

/// Thresholds for calibration, classification and the session limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerSettings {
    /// Allowed deviation from the calibrated goal angle, in degrees.
    pub angle_tolerance_deg: f64,
    pub calibration_secs: f64,
    /// Calibration gives up after this long without a detected face.
    pub calibration_stall_secs: f64,
    /// Cumulative distraction that ends the session.
    pub distraction_limit_secs: f64,
    /// Normalized x below which the left eye midpoint counts as diverted.
    pub eye_x_left_limit: f64,
    /// Normalized x above which the right eye midpoint counts as diverted.
    pub eye_x_right_limit: f64,
    pub alert_threshold_secs: f64,
    /// Assumed time per processed frame. Not measured.
    pub frame_period_secs: f64,
    pub alert_text: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            angle_tolerance_deg: 15.0,
            calibration_secs: 10.0,
            calibration_stall_secs: 10.0,
            distraction_limit_secs: 60.0,
            eye_x_left_limit: 0.40,
            eye_x_right_limit: 0.60,
            alert_threshold_secs: 30.0,
            frame_period_secs: 1.0 / 30.0,
            alert_text: "專心點".into(),
        }
    }
}

impl TrackerSettings {
    pub fn calibration_window(&self) -> Duration {
        Duration::from_secs_f64(self.calibration_secs)
    }

    pub fn calibration_stall(&self) -> Duration {
        Duration::from_secs_f64(self.calibration_stall_secs)
    }

    /// Frames per second implied by `frame_period_secs`, rounded.
    pub fn nominal_fps(&self) -> u32 {
        (1.0 / self.frame_period_secs).round().max(1.0) as u32
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.angle_tolerance_deg > 0.0 && self.angle_tolerance_deg <= 180.0) {
            bail!(
                "angle_tolerance_deg must lie in (0, 180], got {}",
                self.angle_tolerance_deg
            );
        }
        check_secs("calibration_secs", self.calibration_secs)?;
        check_secs("calibration_stall_secs", self.calibration_stall_secs)?;
        check_secs("frame_period_secs", self.frame_period_secs)?;
        check_secs("alert_threshold_secs", self.alert_threshold_secs)?;
        check_secs("distraction_limit_secs", self.distraction_limit_secs)?;
        for (name, value) in [
            ("eye_x_left_limit", self.eye_x_left_limit),
            ("eye_x_right_limit", self.eye_x_right_limit),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must lie in [0, 1], got {value}");
            }
        }
        if self.eye_x_left_limit > self.eye_x_right_limit {
            bail!(
                "eye_x_left_limit ({}) exceeds eye_x_right_limit ({})",
                self.eye_x_left_limit,
                self.eye_x_right_limit
            );
        }
        Ok(())
    }
}

/// Timing of the servo oscillation and its shutdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActuatorSettings {
    pub half_period_secs: f64,
    /// Cancellation is checked at least this often while oscillating.
    pub poll_interval_secs: f64,
    /// Upper bound on waiting for the oscillator to exit.
    pub join_timeout_secs: f64,
    pub duty_extreme: f32,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            half_period_secs: 1.0,
            poll_interval_secs: 0.1,
            join_timeout_secs: 2.0,
            duty_extreme: 1.0,
        }
    }
}

impl ActuatorSettings {
    pub fn half_period(&self) -> Duration {
        Duration::from_secs_f64(self.half_period_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.join_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        check_secs("half_period_secs", self.half_period_secs)?;
        check_secs("join_timeout_secs", self.join_timeout_secs)?;
        if !(MIN_POLL_SECS..=self.half_period_secs).contains(&self.poll_interval_secs) {
            bail!(
                "poll_interval_secs must lie in [{MIN_POLL_SECS}, half_period_secs], got {}",
                self.poll_interval_secs
            );
        }
        if !(self.duty_extreme > 0.0 && self.duty_extreme <= 1.0) {
            bail!("duty_extreme must lie in (0, 1], got {}", self.duty_extreme);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceSettings {
    pub language_code: String,
    pub voice_name: String,
    pub listen_prompt: String,
    pub no_command_reply: String,
    pub no_input_reply: String,
    pub unavailable_reply: String,
    pub max_response_words: u32,
    pub max_retries: u32,
    pub initial_retry_delay_secs: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            language_code: "zh-TW".into(),
            voice_name: "cmn-TW-Wavenet-C".into(),
            listen_prompt: "Please say your command.".into(),
            no_command_reply: "No valid command received, please try again.".into(),
            no_input_reply: "No valid input received, I cannot respond.".into(),
            unavailable_reply: "Sorry, the assistant is temporarily unavailable.".into(),
            max_response_words: 200,
            max_retries: 3,
            initial_retry_delay_secs: 2.0,
        }
    }
}

impl VoiceSettings {
    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.initial_retry_delay_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub tracker: TrackerSettings,
    pub actuator: ActuatorSettings,
    pub voice: VoiceSettings,
    /// Overrides `<data dir>/focus_status.txt`.
    pub status_file: Option<PathBuf>,
}

impl UserSettings {
    pub fn validate(&self) -> Result<()> {
        self.tracker.validate().context("invalid tracker settings")?;
        self.actuator
            .validate()
            .context("invalid actuator settings")?;
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring unreadable settings at {} ({err}); using defaults",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> UserSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Writes the current settings to disk if no file exists yet, so a first
    /// launch leaves an editable copy of the defaults behind.
    pub fn ensure_persisted(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        self.persist(&self.snapshot())
    }

    pub fn update_tracker(&self, settings: TrackerSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.tracker = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
