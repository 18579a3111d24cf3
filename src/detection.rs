use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// Contains left-top and right-bottom corners of the detected object in pixels
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    #[serde(rename = "l")]
    pub xmin: f32,
    #[serde(rename = "t")]
    pub ymin: f32,
    #[serde(rename = "r")]
    pub xmax: f32,
    #[serde(rename = "b")]
    pub ymax: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: i32,
}

impl Detection {
    pub fn new(bbox: BBox<Ltrb>, class: i32, confidence: f32) -> Self {
        Self {
            xmin: bbox.left(),
            ymin: bbox.top(),
            xmax: bbox.right(),
            ymax: bbox.bottom(),
            confidence,
            class,
        }
    }

    #[inline(always)]
    pub fn bbox(&self) -> BBox<Ltrb> {
        BBox::ltrb(self.xmin, self.ymin, self.xmax, self.ymax)
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox().iou(&other.bbox())
    }

    /// Finite, non-inverted box and a finite confidence.
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.bbox().is_valid() && self.confidence.is_finite()
    }
}
