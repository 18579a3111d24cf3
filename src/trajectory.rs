use crate::circular_queue::CircularQueue;
use crate::config::{ClassNames, TrajectoryConfig};
use crate::frame::Frame;
use crate::hazard::{HazardSignal, Motion, Severity};
use crate::predictor::MIN_DT;
use crate::scene::Scene;
use crate::track::{Observation, Track, TrackId};

use nalgebra as na;
use std::collections::HashMap;
use tracing::{debug, info};

/// Motion of one track smoothed over the recent history window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trajectory {
    /// Center velocity in px/s
    pub velocity: na::Vector2<f32>,
    /// Relative box-area growth per second
    pub closing_rate: f32,
    pub time_to_contact: Option<f32>,
    pub motion: Motion,
    /// Horizontal span of the newest observation
    pub span: (f32, f32),
}

impl Trajectory {
    /// Uses the oldest and newest of the last `window` observations; `None`
    /// while fewer than two are known or no time has elapsed between them.
    pub fn estimate(
        history: &CircularQueue<Observation>,
        frame_center: f32,
        config: &TrajectoryConfig,
    ) -> Option<Self> {
        let mut recent = history.recent(config.velocity_window);
        let first = recent.next()?;
        let last = recent.last()?;

        let dt = last.ts - first.ts;
        if dt <= MIN_DT {
            return None;
        }

        let (x0, y0) = first.bbox.center();
        let (x1, y1) = last.bbox.center();
        let velocity = na::Vector2::new((x1 - x0) / dt, (y1 - y0) / dt);

        let (a0, a1) = (first.bbox.area(), last.bbox.area());
        if a0 <= f32::EPSILON {
            return None;
        }

        let closing_rate = (a1 / a0 - 1.0) / dt;

        let scale_rate = (a1.sqrt() - a0.sqrt()) / dt;
        let time_to_contact = if scale_rate > 0.0 {
            Some(a1.sqrt() / scale_rate)
        } else {
            None
        };

        let motion = classify(x1, velocity.x, closing_rate, frame_center, config);

        Some(Self {
            velocity,
            closing_rate,
            time_to_contact,
            motion,
            span: (last.bbox.left(), last.bbox.right()),
        })
    }

    /// Whether the box, swept by its lateral velocity over `horizon` seconds,
    /// overlaps `zone`.
    pub fn enters_zone(&self, zone: (f32, f32), horizon: f32) -> bool {
        let shift = self.velocity.x * horizon;
        let left = self.span.0 + shift.min(0.0);
        let right = self.span.1 + shift.max(0.0);

        left <= zone.1 && right >= zone.0
    }
}

fn classify(cx: f32, vx: f32, closing_rate: f32, center: f32, config: &TrajectoryConfig) -> Motion {
    // growth that counts as closing is never treated as static
    let growing = closing_rate > config.growth_deadband.min(config.closing_rate_threshold);
    let shrinking = closing_rate < -config.growth_deadband;
    let lateral = vx.abs() > config.lateral_speed_threshold;

    if shrinking {
        Motion::Receding
    } else if lateral && cx < center && vx > 0.0 {
        Motion::ApproachingLeft
    } else if lateral && cx > center && vx < 0.0 {
        Motion::ApproachingRight
    } else if growing {
        Motion::ApproachingCenter
    } else if lateral {
        Motion::Receding
    } else {
        Motion::Static
    }
}

/// Rate limit for one track's warnings.
#[derive(Debug, Clone, Default)]
pub struct Cooldown {
    last_emit: Option<u64>,
    clear_streak: u32,
}

impl Cooldown {
    /// Feeds whether the hazard condition holds at `cycle`; returns `true`
    /// when a signal should be emitted.
    pub fn tick(&mut self, cycle: u64, holds: bool, cooldown: u64, reset_after: u32) -> bool {
        if !holds {
            self.clear_streak += 1;
            if self.clear_streak >= reset_after {
                self.last_emit = None;
            }
            return false;
        }

        self.clear_streak = 0;

        match self.last_emit {
            Some(last) if cycle.saturating_sub(last) < cooldown => false,
            _ => {
                self.last_emit = Some(cycle);
                true
            }
        }
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.last_emit.is_none()
    }
}

/// Turns confirmed tracks into hazard signals.
pub struct TrajectoryAnalyzer {
    config: TrajectoryConfig,
    names: ClassNames,
    cooldowns: HashMap<TrackId, Cooldown>,
    cycle: u64,
}

impl TrajectoryAnalyzer {
    pub fn new(config: TrajectoryConfig, names: ClassNames) -> Self {
        Self {
            config,
            names,
            cooldowns: HashMap::new(),
            cycle: 0,
        }
    }

    #[inline]
    pub fn trajectory(&self, track: &Track, frame_center: f32) -> Option<Trajectory> {
        Trajectory::estimate(track.history(), frame_center, &self.config)
    }

    fn is_hazard(&self, trajectory: &Trajectory, frame: &Frame) -> bool {
        let zone = self.config.danger_zone.resolve(frame.width());

        trajectory.closing_rate > self.config.closing_rate_threshold
            && trajectory.enters_zone(zone, self.config.horizon)
    }

    /// Evaluates every confirmed track of `scene` after the lifecycle update of `frame`.
    pub fn analyze(&mut self, source: &str, frame: &Frame, scene: &Scene) -> Vec<HazardSignal> {
        self.cycle += 1;
        let cycle = self.cycle;

        self.cooldowns
            .retain(|id, _| scene.get(*id).map_or(false, |t| !t.is_lost()));

        let mut signals = Vec::new();

        for track in scene.confirmed() {
            let trajectory = self.trajectory(track, frame.center_x());
            let holds = trajectory
                .as_ref()
                .map_or(false, |t| self.is_hazard(t, frame));

            let (cooldown, reset) = (self.config.cooldown_frames, self.config.cooldown_reset_frames);
            let emit = if holds {
                self.cooldowns
                    .entry(track.id())
                    .or_default()
                    .tick(cycle, true, cooldown, reset)
            } else {
                if let Some(c) = self.cooldowns.get_mut(&track.id()) {
                    c.tick(cycle, false, cooldown, reset);
                }
                false
            };

            if !emit {
                if holds {
                    debug!(track = track.id(), "hazard suppressed by cooldown");
                }
                continue;
            }

            let Some(trajectory) = trajectory else {
                continue;
            };

            let signal = HazardSignal {
                track_id: track.id(),
                source: source.to_string(),
                frame: frame.index,
                timestamp: frame.timestamp,
                class: track.class(),
                label: self.names.name(track.class()).to_string(),
                kind: trajectory.motion,
                severity: Severity::from_ttc(trajectory.time_to_contact, &self.config.severity),
                closing_rate: trajectory.closing_rate,
                time_to_contact: trajectory.time_to_contact,
            };

            info!(
                track = signal.track_id,
                label = %signal.label,
                kind = ?signal.kind,
                severity = %signal.severity,
                ttc = ?signal.time_to_contact,
                "hazard"
            );

            signals.push(signal);
        }

        self.cooldowns.retain(|_, c| !c.is_idle());

        signals
    }

    #[inline]
    pub fn names(&self) -> &ClassNames {
        &self.names
    }

    pub fn reset(&mut self) {
        self.cooldowns.clear();
        self.cycle = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::config::DangerZone;

    fn history(boxes: &[(f32, f32, f32, f32)], dt: f32) -> CircularQueue<Observation> {
        let mut q = CircularQueue::with_capacity(10);
        for (i, &(l, t, r, b)) in boxes.iter().enumerate() {
            q.push(Observation {
                ts: i as f32 * dt,
                frame: i as u64,
                bbox: BBox::ltrb(l, t, r, b),
            });
        }
        q
    }

    fn config() -> TrajectoryConfig {
        TrajectoryConfig {
            velocity_window: 3,
            ..Default::default()
        }
    }

    #[test]
    fn cooldown_emits_once_per_window() {
        let mut c = Cooldown::default();
        let emitted: Vec<u64> = (1..=25).filter(|&f| c.tick(f, true, 10, 3)).collect();
        assert_eq!(emitted, vec![1, 11, 21]);
    }

    #[test]
    fn cooldown_resets_after_clear_streak() {
        let mut c = Cooldown::default();
        assert!(c.tick(1, true, 10, 2));
        assert!(!c.tick(2, false, 10, 2));
        // a single clear frame does not reset
        assert!(!c.tick(3, true, 10, 2));
        assert!(!c.tick(4, false, 10, 2));
        assert!(!c.tick(5, false, 10, 2));
        assert!(c.is_idle());
        assert!(c.tick(6, true, 10, 2));
    }

    #[test]
    fn needs_two_observations() {
        let h = history(&[(0., 0., 10., 10.)], 0.1);
        assert!(Trajectory::estimate(&h, 320., &config()).is_none());
    }

    #[test]
    fn zero_elapsed_time_is_skipped() {
        let h = history(&[(0., 0., 10., 10.), (5., 0., 15., 10.)], 0.0);
        assert!(Trajectory::estimate(&h, 320., &config()).is_none());
    }

    #[test]
    fn approaching_from_left() {
        let h = history(
            &[(100., 100., 150., 200.), (110., 100., 160., 200.), (120., 100., 170., 200.)],
            0.1,
        );

        let t = Trajectory::estimate(&h, 320., &config()).unwrap();
        assert!((t.velocity.x - 100.0).abs() < 1e-3);
        assert_eq!(t.motion, Motion::ApproachingLeft);
    }

    #[test]
    fn approaching_from_right() {
        let h = history(
            &[(500., 100., 550., 200.), (490., 100., 540., 200.), (480., 100., 530., 200.)],
            0.1,
        );

        let t = Trajectory::estimate(&h, 320., &config()).unwrap();
        assert_eq!(t.motion, Motion::ApproachingRight);
    }

    #[test]
    fn growing_box_approaches_center() {
        let h = history(
            &[(300., 100., 340., 180.), (295., 95., 345., 185.), (290., 90., 350., 190.)],
            0.1,
        );

        let t = Trajectory::estimate(&h, 320., &config()).unwrap();
        assert_eq!(t.motion, Motion::ApproachingCenter);
        assert!(t.closing_rate > 0.0);
        assert!(t.time_to_contact.unwrap() > 0.0);
    }

    #[test]
    fn closing_growth_inside_deadband_still_approaches() {
        let cfg = TrajectoryConfig {
            closing_rate_threshold: 0.05,
            growth_deadband: 0.1,
            ..config()
        };
        let h = history(
            &[(300., 100., 400., 200.), (300., 100., 400.75, 200.), (300., 100., 401.5, 200.)],
            0.1,
        );

        let t = Trajectory::estimate(&h, 320., &cfg).unwrap();
        assert!(t.closing_rate > 0.05 && t.closing_rate < 0.1, "{}", t.closing_rate);
        assert_eq!(t.motion, Motion::ApproachingCenter);
    }

    #[test]
    fn shrinking_box_recedes() {
        let h = history(
            &[(290., 90., 350., 190.), (295., 95., 345., 185.), (300., 100., 340., 180.)],
            0.1,
        );

        let t = Trajectory::estimate(&h, 320., &config()).unwrap();
        assert_eq!(t.motion, Motion::Receding);
        assert!(t.time_to_contact.is_none());
    }

    #[test]
    fn still_box_is_static() {
        let h = history(&[(300., 100., 340., 180.); 3], 0.1);

        let t = Trajectory::estimate(&h, 320., &config()).unwrap();
        assert_eq!(t.motion, Motion::Static);
        assert_eq!(t.closing_rate, 0.0);
    }

    #[test]
    fn zone_projection_sweeps_the_horizon() {
        let h = history(&[(0., 100., 20., 200.), (10., 100., 30., 200.)], 0.1);
        let t = Trajectory::estimate(&h, 320., &config()).unwrap();

        // 100 px/s toward the right; zone starts at 150
        assert!(!t.enters_zone((150., 250.), 1.0));
        assert!(t.enters_zone((150., 250.), 1.5));

        let zone = DangerZone::Band {
            x_min: 0.,
            x_max: 5.,
        }
        .resolve(640.);
        assert!(!t.enters_zone(zone, 0.0));
    }
}
