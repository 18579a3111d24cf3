use crate::error::Error;
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Full runtime configuration, normally loaded from YAML at startup.
/// Every field has a documented fallback so partial files are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracking: TrackingConfig,
    pub trajectory: TrajectoryConfig,
    pub warnings: WarningConfig,
    pub pipeline: PipelineConfig,
    pub class_names: ClassNames,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Consecutive hits required to promote Tentative → Confirmed (3)
    pub confirm_threshold: u32,
    /// Consecutive misses after which a track is Lost (5)
    pub lost_threshold: u32,
    /// Minimum IoU between a predicted track box and a detection (0.3)
    pub min_iou: f32,
    /// Detections below this confidence are ignored (0.0)
    pub min_confidence: f32,
    /// Only match detections of the track's own class (false)
    pub class_aware: bool,
    /// Observations kept per track (10)
    pub history_len: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            confirm_threshold: 3,
            lost_threshold: 5,
            min_iou: 0.3,
            min_confidence: 0.0,
            class_aware: false,
            history_len: 10,
        }
    }
}

/// Horizontal region of the frame considered to be in the wearer's path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DangerZone {
    /// Absolute pixel band
    Band { x_min: f32, x_max: f32 },
    /// Band centered in the frame covering `fraction` of its width
    Central { fraction: f32 },
}

impl DangerZone {
    /// `(x_min, x_max)` in pixels for a frame of the given width.
    pub fn resolve(&self, frame_width: f32) -> (f32, f32) {
        match *self {
            DangerZone::Band { x_min, x_max } => (x_min, x_max),
            DangerZone::Central { fraction } => {
                let half = frame_width * fraction / 2.0;
                let center = frame_width / 2.0;
                (center - half, center + half)
            }
        }
    }
}

impl Default for DangerZone {
    fn default() -> Self {
        DangerZone::Central { fraction: 1.0 / 3.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    /// Time-to-contact at or below which a hazard is High (1.0 s)
    pub high_ttc: f32,
    /// Time-to-contact at or below which a hazard is Medium (2.5 s)
    pub medium_ttc: f32,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            high_ttc: 1.0,
            medium_ttc: 2.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// History entries used to smooth velocity and growth (3)
    pub velocity_window: usize,
    /// Relative box-area growth per second above which an object is closing in (0.5)
    pub closing_rate_threshold: f32,
    /// Relative growth per second treated as neither closing nor receding (0.1)
    pub growth_deadband: f32,
    /// Lateral center speed in px/s that counts as moving sideways (40)
    pub lateral_speed_threshold: f32,
    /// Seconds ahead to project the box when testing the danger zone (1.5)
    pub horizon: f32,
    pub danger_zone: DangerZone,
    /// Minimum frames between two signals for the same track (10)
    pub cooldown_frames: u64,
    /// Consecutive non-hazard frames after which the cooldown is cleared (3)
    pub cooldown_reset_frames: u32,
    pub severity: SeverityConfig,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            velocity_window: 3,
            closing_rate_threshold: 0.5,
            growth_deadband: 0.1,
            lateral_speed_threshold: 40.0,
            horizon: 1.5,
            danger_zone: DangerZone::default(),
            cooldown_frames: 10,
            cooldown_reset_frames: 3,
            severity: SeverityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningConfig {
    /// Speak hazard warnings as they occur (true)
    pub enabled: bool,
    /// Seconds between two spoken warnings (3.0)
    pub min_interval: f32,
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames buffered between capture and tracking (2)
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { queue_capacity: 2 }
    }
}

/// Human-readable names indexed by detector class id. Defaults to the first
/// COCO classes relevant to walking navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassNames(pub Vec<String>);

pub const DEFAULT_CLASS_NAMES: [&str; 10] = [
    "person",
    "bicycle",
    "car",
    "motorbike",
    "aeroplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
];

impl Default for ClassNames {
    fn default() -> Self {
        Self(DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl ClassNames {
    pub fn name(&self, class: i32) -> &str {
        usize::try_from(class)
            .ok()
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
            .unwrap_or("object")
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let t = &self.tracking;
        let tr = &self.trajectory;

        let check = |ok: bool, msg: &str| {
            if ok {
                Ok(())
            } else {
                Err(Error::InvalidConfig(msg.to_string()))
            }
        };

        check(t.confirm_threshold >= 1, "tracking.confirm_threshold must be at least 1")?;
        check(t.lost_threshold >= 1, "tracking.lost_threshold must be at least 1")?;
        check(
            t.min_iou > 0.0 && t.min_iou <= 1.0,
            "tracking.min_iou must be in (0, 1]",
        )?;
        check(
            (0.0..=1.0).contains(&t.min_confidence),
            "tracking.min_confidence must be in [0, 1]",
        )?;
        check(t.history_len >= 2, "tracking.history_len must be at least 2")?;

        check(
            tr.velocity_window >= 2 && tr.velocity_window <= t.history_len,
            "trajectory.velocity_window must be in [2, tracking.history_len]",
        )?;
        check(
            tr.closing_rate_threshold.is_finite() && tr.closing_rate_threshold > 0.0,
            "trajectory.closing_rate_threshold must be positive",
        )?;
        check(tr.growth_deadband >= 0.0, "trajectory.growth_deadband must not be negative")?;
        check(
            tr.closing_rate_threshold > tr.growth_deadband,
            "trajectory.closing_rate_threshold must exceed growth_deadband",
        )?;
        check(
            tr.lateral_speed_threshold >= 0.0,
            "trajectory.lateral_speed_threshold must not be negative",
        )?;
        check(tr.horizon >= 0.0, "trajectory.horizon must not be negative")?;
        check(tr.cooldown_frames >= 1, "trajectory.cooldown_frames must be at least 1")?;
        check(
            tr.cooldown_reset_frames >= 1,
            "trajectory.cooldown_reset_frames must be at least 1",
        )?;
        check(
            tr.severity.high_ttc <= tr.severity.medium_ttc,
            "trajectory.severity.high_ttc must not exceed medium_ttc",
        )?;

        match tr.danger_zone {
            DangerZone::Band { x_min, x_max } => {
                check(x_min < x_max, "trajectory.danger_zone band is empty")?
            }
            DangerZone::Central { fraction } => check(
                fraction > 0.0 && fraction <= 1.0,
                "trajectory.danger_zone fraction must be in (0, 1]",
            )?,
        }

        check(
            self.warnings.min_interval >= 0.0,
            "warnings.min_interval must not be negative",
        )?;
        check(
            self.pipeline.queue_capacity >= 1,
            "pipeline.queue_capacity must be at least 1",
        )?;

        Ok(())
    }
}
