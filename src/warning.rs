//! Boundary toward the speech/output layer.

use crate::config::WarningConfig;
use crate::hazard::{HazardSignal, Motion};
use crate::track::TrackReport;

use std::collections::BTreeMap;
use tracing::{info, warn};

/// Receives the hazard signals of every processed frame, possibly none.
pub trait WarningSink {
    fn emit(&mut self, signals: &[HazardSignal]);
}

/// Text-to-speech boundary.
pub trait Speaker {
    fn speak(&mut self, text: &str);
}

impl Speaker for Vec<String> {
    fn speak(&mut self, text: &str) {
        self.push(text.to_string());
    }
}

/// Speaker that writes to the log instead of an audio device.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSpeaker;

impl Speaker for LogSpeaker {
    fn speak(&mut self, text: &str) {
        info!(target: "speech", "{}", text);
    }
}

/// Logs every signal as structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl WarningSink for LogSink {
    fn emit(&mut self, signals: &[HazardSignal]) {
        for s in signals {
            warn!(
                source = %s.source,
                frame = s.frame,
                track = s.track_id,
                label = %s.label,
                kind = ?s.kind,
                severity = %s.severity,
                closing_rate = s.closing_rate,
                "hazard warning"
            );
        }
    }
}

impl<F: FnMut(&[HazardSignal])> WarningSink for F {
    fn emit(&mut self, signals: &[HazardSignal]) {
        self(signals)
    }
}

/// "person approaching from your left"
pub fn describe_hazard(signal: &HazardSignal) -> String {
    format!("{} {}", signal.label, signal.kind.phrase())
}

/// Single spoken sentence for a frame's signals, most severe first.
pub fn render_warning(signals: &[HazardSignal]) -> Option<String> {
    if signals.is_empty() {
        return None;
    }

    let mut sorted: Vec<&HazardSignal> = signals.iter().collect();
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.track_id.cmp(&b.track_id)));

    let parts: Vec<String> = sorted.into_iter().map(describe_hazard).collect();

    Some(format!("Caution: {}", parts.join(", ")))
}

/// Summary of what is being tracked: "I see one person and 2 cars".
pub fn describe_tracks(tracks: &[TrackReport]) -> String {
    if tracks.is_empty() {
        return "No objects being tracked".to_string();
    }

    let approaching: Vec<String> = tracks
        .iter()
        .filter(|t| {
            matches!(
                t.motion,
                Some(Motion::ApproachingLeft) | Some(Motion::ApproachingRight)
            )
        })
        .filter_map(|t| t.motion.map(|m| format!("{} {}", t.label, m.phrase())))
        .collect();

    if !approaching.is_empty() {
        return format!("Caution: {}", approaching.join(", "));
    }

    // first-seen order of labels
    let mut order: Vec<&str> = Vec::new();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for t in tracks {
        let c = counts.entry(t.label.as_str()).or_insert(0);
        if *c == 0 {
            order.push(t.label.as_str());
        }
        *c += 1;
    }

    let parts: Vec<String> = order
        .into_iter()
        .map(|label| match counts[label] {
            1 => format!("one {}", label),
            n => format!("{} {}s", n, label),
        })
        .collect();

    match parts.as_slice() {
        [one] => format!("I see {}", one),
        [a, b] => format!("I see {} and {}", a, b),
        [init @ .., last] => format!("I see {}, and {}", init.join(", "), last),
        [] => "No objects being tracked".to_string(),
    }
}

/// Speaks hazard warnings, rate limited across all tracks.
pub struct Announcer<S: Speaker> {
    speaker: S,
    enabled: bool,
    min_interval: f32,
    last_spoken: Option<f32>,
}

impl<S: Speaker> Announcer<S> {
    pub fn new(config: &WarningConfig, speaker: S) -> Self {
        Self {
            speaker,
            enabled: config.enabled,
            min_interval: config.min_interval,
            last_spoken: None,
        }
    }

    /// Flips continuous warnings on or off and says so.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        let status = if self.enabled { "enabled" } else { "disabled" };
        self.speaker.speak(&format!("Warnings {}", status));
        self.enabled
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Answers "what's ahead?" on demand, regardless of the rate limit.
    pub fn describe(&mut self, tracks: &[TrackReport]) {
        let text = describe_tracks(tracks);
        self.speaker.speak(&text);
    }

    #[inline]
    pub fn speaker(&self) -> &S {
        &self.speaker
    }

    pub fn into_speaker(self) -> S {
        self.speaker
    }
}

impl<S: Speaker> WarningSink for Announcer<S> {
    fn emit(&mut self, signals: &[HazardSignal]) {
        if !self.enabled {
            return;
        }

        let Some(now) = signals.iter().map(|s| s.timestamp).reduce(f32::max) else {
            return;
        };

        if let Some(last) = self.last_spoken {
            if now >= last && now - last < self.min_interval {
                return;
            }
        }

        if let Some(text) = render_warning(signals) {
            self.speaker.speak(&text);
            self.last_spoken = Some(now);
        }
    }
}
