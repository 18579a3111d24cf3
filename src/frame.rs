use crate::detection::Detection;

/// All detections produced for one captured image.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub dims: (u32, u32),
    pub timestamp: f32, // in seconds
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(index: u64, timestamp: f32, dims: (u32, u32), detections: Vec<Detection>) -> Self {
        Self {
            index,
            dims,
            timestamp,
            detections,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.dims.0 as f32
    }

    #[inline]
    pub fn center_x(&self) -> f32 {
        self.width() / 2.0
    }

    /// Detections usable for tracking: well-formed and at least `min_confidence`.
    pub fn usable(&self, min_confidence: f32) -> Vec<Detection> {
        self.detections
            .iter()
            .filter(|d| d.is_well_formed() && d.confidence >= min_confidence)
            .copied()
            .collect()
    }
}
