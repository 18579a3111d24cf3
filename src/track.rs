use crate::bbox::{BBox, Ltrb};
use crate::circular_queue::CircularQueue;
use crate::detection::Detection;
use crate::hazard::Motion;
use crate::predictor::Predictor;

use nalgebra as na;
use serde_derive::Serialize;

pub type TrackId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Lost,
}

/// One matched detection as remembered by a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub ts: f32,
    pub frame: u64,
    pub bbox: BBox<Ltrb>,
}

/// A tracked object. Only [`Scene`](crate::scene::Scene) mutates tracks.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    class: i32,
    confidence: f32,
    state: TrackState,
    hits: u32,
    misses: u32,
    age: u32,
    predictor: Predictor,
    history: CircularQueue<Observation>,
}

impl Track {
    pub(crate) fn new(id: TrackId, frame: u64, ts: f32, det: &Detection, history_len: usize) -> Self {
        let bbox = det.bbox();
        let mut history = CircularQueue::with_capacity(history_len);
        history.push(Observation { ts, frame, bbox });

        Self {
            id,
            class: det.class,
            confidence: det.confidence,
            state: TrackState::Tentative,
            hits: 1,
            misses: 0,
            age: 1,
            predictor: Predictor::new(ts, &bbox),
            history,
        }
    }

    pub(crate) fn predict(&mut self, ts: f32) -> BBox<Ltrb> {
        self.predictor.predict(ts)
    }

    /// Returns `true` when this hit promoted the track.
    pub(crate) fn mark_hit(&mut self, frame: u64, ts: f32, det: &Detection, confirm_threshold: u32) -> bool {
        let bbox = det.bbox();

        self.predictor.update(ts, &bbox);
        self.history.push(Observation { ts, frame, bbox });
        self.confidence = det.confidence;
        self.age += 1;
        self.hits += 1;
        self.misses = 0;

        self.promote_if_ready(confirm_threshold)
    }

    pub(crate) fn promote_if_ready(&mut self, confirm_threshold: u32) -> bool {
        if self.state == TrackState::Tentative && self.hits >= confirm_threshold {
            self.state = TrackState::Confirmed;
            return true;
        }

        false
    }

    /// Returns `true` when this miss marked the track as lost.
    pub(crate) fn mark_missed(&mut self, ts: f32, lost_threshold: u32) -> bool {
        self.predictor.coast(ts);
        self.age += 1;
        self.hits = 0;
        self.misses += 1;

        if self.state != TrackState::Lost && self.misses >= lost_threshold {
            self.state = TrackState::Lost;
            return true;
        }

        false
    }

    #[inline]
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Class of the detection that created the track.
    #[inline]
    pub fn class(&self) -> i32 {
        self.class
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    #[inline]
    pub fn is_lost(&self) -> bool {
        self.state == TrackState::Lost
    }

    #[inline]
    pub fn hits(&self) -> u32 {
        self.hits
    }

    #[inline]
    pub fn misses(&self) -> u32 {
        self.misses
    }

    #[inline]
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Filtered box estimate.
    #[inline]
    pub fn bbox(&self) -> BBox<Ltrb> {
        self.predictor.bbox()
    }

    /// Box expected for the frame being processed.
    #[inline]
    pub fn predicted_bbox(&self) -> BBox<Ltrb> {
        self.predictor.predicted()
    }

    /// Filtered center velocity in pixels per second.
    #[inline]
    pub fn velocity(&self) -> na::Vector2<f32> {
        self.predictor.velocity()
    }

    #[inline]
    pub fn position_uncertainty(&self) -> f32 {
        self.predictor.position_uncertainty()
    }

    #[inline]
    pub fn history(&self) -> &CircularQueue<Observation> {
        &self.history
    }

    #[inline]
    pub fn last_observation(&self) -> Option<&Observation> {
        self.history.newest()
    }
}

/// Snapshot of a confirmed track handed to consumers.
#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub track_id: TrackId,
    pub class: i32,
    pub label: String,
    pub confidence: f32,
    pub state: TrackState,
    pub age: u32,
    pub misses: u32,

    // ltrb, in px
    pub bbox: [f32; 4],

    // px per second
    pub velocity: (f32, f32),

    pub motion: Option<Motion>,
}

impl TrackReport {
    pub fn new(track: &Track, label: &str, motion: Option<Motion>) -> Self {
        let velocity = track.velocity();

        Self {
            track_id: track.id(),
            class: track.class(),
            label: label.to_string(),
            confidence: track.confidence(),
            state: track.state(),
            age: track.age(),
            misses: track.misses(),
            bbox: track.bbox().into(),
            velocity: (velocity.x, velocity.y),
            motion,
        }
    }
}
