use crate::association::{associate, CostMatrix};
use crate::bbox::{BBox, Ltrb};
use crate::config::TrackingConfig;
use crate::detection::Detection;
use crate::frame::Frame;
use crate::track::{Track, TrackId};

use tracing::{debug, trace, warn};

/// Association of one frame's detections against the live tracks.
#[derive(Debug, Clone)]
pub struct DetectionsMapping {
    frame: u64,
    timestamp: f32,
    detections: Vec<Detection>,
    matched: Vec<(TrackId, usize, f32)>,
    missed_tracks: Vec<TrackId>,
    missed_detections: Vec<usize>,
}

impl DetectionsMapping {
    /// `(detection index, track id)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, TrackId)> + '_ {
        self.matched.iter().map(|&(id, det, _)| (det, id))
    }

    #[inline]
    pub fn missed_tracks(&self) -> &[TrackId] {
        &self.missed_tracks
    }

    #[inline]
    pub fn missed_detections(&self) -> &[usize] {
        &self.missed_detections
    }

    #[inline]
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }
}

/// Lifecycle changes committed during one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transitions {
    pub spawned: Vec<TrackId>,
    pub confirmed: Vec<TrackId>,
    pub lost: Vec<TrackId>,
    pub purged: Vec<TrackId>,
}

/// Owns every track of one source and is the only place they are mutated.
pub struct Scene {
    config: TrackingConfig,
    tracks: Vec<Track>,
    next_id: TrackId,
    last_ts: Option<f32>,
    purged: Vec<TrackId>,
}

impl Scene {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(64),
            next_id: 1,
            last_ts: None,
            purged: Vec::new(),
        }
    }

    /// Runs predict, association and lifecycle update for one frame.
    pub fn step(&mut self, frame: &Frame) -> Transitions {
        self.predict(frame.timestamp);
        let mapping = self.map_detections(frame);
        self.update(mapping)
    }

    /// Purges tracks lost during the previous cycle and advances every motion
    /// model to `ts`.
    pub fn predict(&mut self, ts: f32) {
        if let Some(last) = self.last_ts {
            if ts <= last {
                warn!(ts, last, "frame timestamp did not advance");
            }
        }

        let purged = &mut self.purged;
        self.tracks.retain(|t| {
            if t.is_lost() {
                purged.push(t.id());
                false
            } else {
                true
            }
        });

        for t in &mut self.tracks {
            t.predict(ts);
        }
    }

    pub fn map_detections(&self, frame: &Frame) -> DetectionsMapping {
        let detections = frame.usable(self.config.min_confidence);
        if detections.len() < frame.len() {
            trace!(
                frame = frame.index,
                dropped = frame.len() - detections.len(),
                "ignoring malformed detections"
            );
        }

        let predicted: Vec<BBox<Ltrb>> = self.tracks.iter().map(Track::predicted_bbox).collect();
        let boxes: Vec<BBox<Ltrb>> = detections.iter().map(Detection::bbox).collect();

        let class_aware = self.config.class_aware;
        let tracks = &self.tracks;
        let costs = CostMatrix::iou(&predicted, &boxes, self.config.min_iou, |r, c| {
            !class_aware || tracks[r].class() == detections[c].class
        });

        let assoc = associate(&costs);

        DetectionsMapping {
            frame: frame.index,
            timestamp: frame.timestamp,
            matched: assoc
                .matches
                .iter()
                .map(|m| (self.tracks[m.track].id(), m.detection, m.cost))
                .collect(),
            missed_tracks: assoc
                .unmatched_tracks
                .iter()
                .map(|&r| self.tracks[r].id())
                .collect(),
            missed_detections: assoc.unmatched_detections,
            detections,
        }
    }

    fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.binary_search_by_key(&id, Track::id).ok()
    }

    pub fn update(&mut self, mapping: DetectionsMapping) -> Transitions {
        let DetectionsMapping {
            frame,
            timestamp: ts,
            detections,
            matched,
            missed_tracks,
            missed_detections,
        } = mapping;

        let mut transitions = Transitions {
            purged: std::mem::take(&mut self.purged),
            ..Default::default()
        };

        let confirm = self.config.confirm_threshold;
        let lost = self.config.lost_threshold;

        for (id, j, cost) in matched {
            let Some(i) = self.index_of(id) else {
                continue;
            };

            trace!(track = id, det = j, cost, "matched");
            if self.tracks[i].mark_hit(frame, ts, &detections[j], confirm) {
                debug!(track = id, class = self.tracks[i].class(), "track confirmed");
                transitions.confirmed.push(id);
            }
        }

        for id in missed_tracks {
            let Some(i) = self.index_of(id) else {
                continue;
            };

            if self.tracks[i].mark_missed(ts, lost) {
                debug!(track = id, "track lost");
                transitions.lost.push(id);
            }
        }

        for j in missed_detections {
            let id = self.next_id;
            self.next_id += 1;

            let mut track = Track::new(id, frame, ts, &detections[j], self.config.history_len);
            debug!(track = id, class = track.class(), "track spawned");
            transitions.spawned.push(id);

            if track.promote_if_ready(confirm) {
                transitions.confirmed.push(id);
            }

            self.tracks.push(track);
        }

        assert!(
            self.tracks.windows(2).all(|w| w[0].id() < w[1].id()),
            "track set corrupted: duplicate or unordered track ids"
        );

        self.last_ts = Some(ts);

        transitions
    }

    /// Drops every track. The id counter survives so ids stay unique.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.purged.clear();
        self.last_ts = None;
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_confirmed())
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.index_of(id).map(|i| &self.tracks[i])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackState;

    fn config() -> TrackingConfig {
        TrackingConfig {
            confirm_threshold: 3,
            lost_threshold: 2,
            ..Default::default()
        }
    }

    fn frame(index: u64, dets: &[(f32, f32, f32, f32)]) -> Frame {
        Frame::new(
            index,
            index as f32 * 0.1,
            (640, 480),
            dets.iter()
                .map(|&(l, t, r, b)| Detection::new(BBox::ltrb(l, t, r, b), 0, 0.9))
                .collect(),
        )
    }

    #[test]
    fn identity_is_stable_over_smooth_motion() {
        let mut scene = Scene::new(config());

        for i in 0..40u64 {
            let x = 50.0 + 6.0 * i as f32;
            scene.step(&frame(i, &[(x, 100., x + 60., 220.)]));

            assert_eq!(scene.len(), 1);
            assert_eq!(scene.tracks()[0].id(), 1);
        }

        assert!(scene.tracks()[0].is_confirmed());
    }

    #[test]
    fn confirms_exactly_at_threshold() {
        let mut scene = Scene::new(config());
        let det = [(100., 100., 150., 200.)];

        let t = scene.step(&frame(1, &det));
        assert_eq!(t.spawned, vec![1]);
        assert_eq!(scene.tracks()[0].state(), TrackState::Tentative);

        let t = scene.step(&frame(2, &det));
        assert!(t.confirmed.is_empty());
        assert_eq!(scene.tracks()[0].state(), TrackState::Tentative);

        let t = scene.step(&frame(3, &det));
        assert_eq!(t.confirmed, vec![1]);
        assert_eq!(scene.tracks()[0].state(), TrackState::Confirmed);
    }

    #[test]
    fn lost_at_threshold_and_purged_next_cycle() {
        let mut scene = Scene::new(config());
        let det = [(100., 100., 150., 200.)];
        for i in 1..=3 {
            scene.step(&frame(i, &det));
        }

        let t = scene.step(&frame(4, &[]));
        assert!(t.lost.is_empty());
        assert_eq!(scene.tracks()[0].misses(), 1);

        let t = scene.step(&frame(5, &[]));
        assert_eq!(t.lost, vec![1]);
        assert_eq!(scene.tracks()[0].state(), TrackState::Lost);
        assert_eq!(scene.len(), 1);

        let t = scene.step(&frame(6, &[]));
        assert_eq!(t.purged, vec![1]);
        assert!(scene.is_empty());
    }

    #[test]
    fn ids_are_never_reused() {
        let mut scene = Scene::new(config());
        let det = [(100., 100., 150., 200.)];

        scene.step(&frame(1, &det));
        scene.step(&frame(2, &[]));
        scene.step(&frame(3, &[]));
        scene.step(&frame(4, &[]));
        assert!(scene.is_empty());

        let t = scene.step(&frame(5, &det));
        assert_eq!(t.spawned, vec![2]);
    }

    #[test]
    fn reset_keeps_the_id_counter() {
        let mut scene = Scene::new(config());
        scene.step(&frame(1, &[(100., 100., 150., 200.), (300., 100., 350., 200.)]));

        scene.reset();
        assert!(scene.is_empty());

        let t = scene.step(&frame(2, &[(100., 100., 150., 200.)]));
        assert_eq!(t.spawned, vec![3]);
        assert!(t.purged.is_empty());
    }

    #[test]
    fn missed_hit_resets_streak() {
        let mut scene = Scene::new(TrackingConfig {
            confirm_threshold: 3,
            lost_threshold: 5,
            ..Default::default()
        });
        let det = [(100., 100., 150., 200.)];

        scene.step(&frame(1, &det));
        scene.step(&frame(2, &det));
        scene.step(&frame(3, &[]));
        scene.step(&frame(4, &det));
        scene.step(&frame(5, &det));
        assert_eq!(scene.tracks()[0].state(), TrackState::Tentative);

        scene.step(&frame(6, &det));
        assert_eq!(scene.tracks()[0].state(), TrackState::Confirmed);
    }

    #[test]
    fn malformed_detections_are_dropped() {
        let mut scene = Scene::new(config());
        let t = scene.step(&frame(
            1,
            &[
                (100., 100., 150., 200.),
                (f32::NAN, 0., 10., 10.),
                (50., 50., 40., 60.),
            ],
        ));

        assert_eq!(t.spawned.len(), 1);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn two_objects_keep_their_ids() {
        let mut scene = Scene::new(config());

        for i in 0..20u64 {
            let dx = 4.0 * i as f32;
            scene.step(&frame(
                i,
                &[(300. - dx, 100., 360. - dx, 200.), (20. + dx, 100., 80. + dx, 200.)],
            ));
        }

        assert_eq!(scene.len(), 2);
        let a = scene.get(1).unwrap().bbox().center().0;
        let b = scene.get(2).unwrap().bbox().center().0;
        assert!(a > 240.0, "{}", a);
        assert!(b < 140.0, "{}", b);
    }

    #[test]
    fn lowest_id_wins_a_contested_detection() {
        let mut scene = Scene::new(TrackingConfig {
            confirm_threshold: 1,
            ..config()
        });

        // two identical boxes spawn tracks 1 and 2
        let b = (100., 100., 150., 200.);
        scene.step(&frame(1, &[b, b]));
        assert_eq!(scene.len(), 2);

        let mapping = {
            scene.predict(0.2);
            scene.map_detections(&frame(2, &[b]))
        };

        assert_eq!(mapping.pairs().collect::<Vec<_>>(), vec![(0, 1)]);
        assert_eq!(mapping.missed_tracks(), &[2]);
    }

    #[test]
    fn class_aware_matching() {
        let mut scene = Scene::new(TrackingConfig {
            class_aware: true,
            ..config()
        });

        let mk = |i: u64, class: i32| {
            Frame::new(
                i,
                i as f32 * 0.1,
                (640, 480),
                vec![Detection::new(BBox::ltrb(100., 100., 150., 200.), class, 0.9)],
            )
        };

        scene.step(&mk(1, 0));
        let t = scene.step(&mk(2, 2));
        assert_eq!(t.spawned, vec![2]);
        assert_eq!(scene.get(1).unwrap().misses(), 1);
    }
}
