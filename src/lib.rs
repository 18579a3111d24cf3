pub mod association;
pub mod bbox;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod hazard;
pub mod pipeline;
pub mod replay;
pub mod rolling_avg;
pub mod scene;
pub mod track;
pub mod trajectory;
pub mod warning;

mod circular_queue;
mod predictor;

pub use config::Config;
pub use detection::Detection;
pub use error::Error;
pub use frame::Frame;
pub use hazard::{HazardSignal, Motion, Severity};
pub use track::{Track, TrackId, TrackReport, TrackState};
pub use warning::WarningSink;

use scene::{Scene, Transitions};
use std::collections::HashMap;
use std::sync::Arc;
use trajectory::TrajectoryAnalyzer;

pub trait Tracking {
    /// Runs one frame of `src` through the tracker and returns the hazards
    /// it raised, possibly none.
    fn update(&mut self, frame: &Frame, src: &str) -> Vec<HazardSignal>;

    /// Confirmed tracks of `src` after the last update.
    fn tracks(&self, src: &str) -> Arc<[TrackReport]>;

    /// Forgets every track and cooldown of `src`. Ids issued later never
    /// repeat earlier ones.
    fn reset(&mut self, src: &str);
}

struct Source {
    scene: Scene,
    analyzer: TrajectoryAnalyzer,
    last_width: f32,
    last_transitions: Transitions,
}

/// Tracks every camera source independently and raises hazard warnings.
pub struct HazardTracker {
    config: Config,
    sources: HashMap<String, Source>,
}

impl HazardTracker {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sources: HashMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scene(&self, src: &str) -> Option<&Scene> {
        self.sources.get(src).map(|s| &s.scene)
    }

    /// Lifecycle changes committed by the last update of `src`.
    pub fn last_transitions(&self, src: &str) -> Option<&Transitions> {
        self.sources.get(src).map(|s| &s.last_transitions)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    fn source_mut(&mut self, src: &str) -> &mut Source {
        let config = &self.config;

        self.sources.entry(src.to_string()).or_insert_with(|| Source {
            scene: Scene::new(config.tracking.clone()),
            analyzer: TrajectoryAnalyzer::new(config.trajectory.clone(), config.class_names.clone()),
            last_width: 0.0,
            last_transitions: Transitions::default(),
        })
    }
}

impl Default for HazardTracker {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl crate::Tracking for HazardTracker {
    fn update(&mut self, frame: &Frame, src: &str) -> Vec<HazardSignal> {
        let source = self.source_mut(src);

        source.last_transitions = source.scene.step(frame);
        source.last_width = frame.width();

        source.analyzer.analyze(src, frame, &source.scene)
    }

    fn tracks(&self, src: &str) -> Arc<[TrackReport]> {
        let Some(source) = self.sources.get(src) else {
            return Arc::new([]);
        };

        let center = source.last_width / 2.0;

        source
            .scene
            .confirmed()
            .map(|t| {
                let label = source.analyzer.names().name(t.class());
                let motion = source.analyzer.trajectory(t, center).map(|tr| tr.motion);

                TrackReport::new(t, label, motion)
            })
            .collect()
    }

    fn reset(&mut self, src: &str) {
        if let Some(source) = self.sources.get_mut(src) {
            source.scene.reset();
            source.analyzer.reset();
            source.last_transitions = Transitions::default();
        }
    }
}
