use crate::config::SeverityConfig;
use crate::error::Error;
use crate::track::TrackId;
use serde_derive::Serialize;
use std::fmt;

/// Direction of an object's movement relative to the wearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    /// On the left half, moving toward the center
    ApproachingLeft,
    /// On the right half, moving toward the center
    ApproachingRight,
    /// Growing in the frame without strong sideways motion
    ApproachingCenter,
    Static,
    Receding,
}

impl Motion {
    pub fn is_approaching(&self) -> bool {
        matches!(
            self,
            Self::ApproachingLeft | Self::ApproachingRight | Self::ApproachingCenter
        )
    }

    /// Phrase completing "<object> ...".
    pub fn phrase(&self) -> &'static str {
        match self {
            Self::ApproachingLeft => "approaching from your left",
            Self::ApproachingRight => "approaching from your right",
            Self::ApproachingCenter => "approaching ahead",
            Self::Static => "ahead",
            Self::Receding => "moving away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_ttc(ttc: Option<f32>, config: &SeverityConfig) -> Self {
        match ttc {
            Some(t) if t <= config.high_ttc => Severity::High,
            Some(t) if t <= config.medium_ttc => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// An approaching object worth warning about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HazardSignal {
    pub track_id: TrackId,
    pub source: String,
    pub frame: u64,
    pub timestamp: f32,
    pub class: i32,
    pub label: String,
    pub kind: Motion,
    pub severity: Severity,

    // relative box-area growth per second
    pub closing_rate: f32,

    // seconds
    pub time_to_contact: Option<f32>,
}

impl HazardSignal {
    /// Single-line JSON record.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}
