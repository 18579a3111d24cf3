use crate::bbox::{BBox, Ltrb};
use munkres::{solve_assignment, WeightMatrix};
use tracing::warn;

/// Cost assigned to pairs that may never be matched and to padding cells.
const GATED: f64 = 100000.0;

/// Per-rank bias keeping equal-cost rows ordered; far below any IoU step we care about.
const TIE_BREAK: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub track: usize,
    pub detection: usize,
    pub cost: f32,
}

/// Result of matching one frame's detections against the live tracks.
/// Indexes refer to the rows (tracks) and columns (detections) of the cost matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Association {
    pub matches: Vec<Match>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl Association {
    fn unmatched(tracks: usize, detections: usize) -> Self {
        Self {
            matches: Vec::new(),
            unmatched_tracks: (0..tracks).collect(),
            unmatched_detections: (0..detections).collect(),
        }
    }
}

/// Track-by-detection costs; `None` marks a pair that cannot match.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Option<f32>>,
}

impl CostMatrix {
    pub fn from_fn<F: FnMut(usize, usize) -> Option<f32>>(rows: usize, cols: usize, mut f: F) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c).filter(|v| v.is_finite()));
            }
        }

        Self { rows, cols, data }
    }

    /// `1 - IoU` for every pair whose overlap reaches `min_iou` and which `gate` admits.
    pub fn iou<G: Fn(usize, usize) -> bool>(
        tracks: &[BBox<Ltrb>],
        detections: &[BBox<Ltrb>],
        min_iou: f32,
        gate: G,
    ) -> Self {
        Self::from_fn(tracks.len(), detections.len(), |r, c| {
            if !gate(r, c) {
                return None;
            }

            let iou = tracks[r].iou(&detections[c]);
            if iou >= min_iou && iou > 0.0 {
                Some(1.0 - iou)
            } else {
                None
            }
        })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }
}

/// Global minimum-cost assignment. Rows are expected in ascending track-id
/// order: among equal costs the earlier row wins.
pub fn associate(costs: &CostMatrix) -> Association {
    let (rows, cols) = (costs.rows(), costs.cols());

    if rows == 0 || cols == 0 || costs.data.iter().all(Option::is_none) {
        return Association::unmatched(rows, cols);
    }

    let n = rows.max(cols);
    let mut mat = WeightMatrix::from_fn(n, |(r, c)| {
        if r < rows && c < cols {
            match costs.get(r, c) {
                Some(cost) => cost as f64 + TIE_BREAK * r as f64,
                None => GATED,
            }
        } else {
            GATED
        }
    });

    let solution = match solve_assignment(&mut mat) {
        Ok(solution) => solution,
        Err(err) => {
            warn!(?err, rows, cols, "assignment could not be solved");
            return Association::unmatched(rows, cols);
        }
    };

    let mut track_taken = vec![false; rows];
    let mut det_taken = vec![false; cols];
    let mut matches = Vec::new();

    for pos in solution {
        if pos.row >= rows || pos.column >= cols {
            continue;
        }

        if let Some(cost) = costs.get(pos.row, pos.column) {
            debug_assert!(!track_taken[pos.row] && !det_taken[pos.column]);

            track_taken[pos.row] = true;
            det_taken[pos.column] = true;
            matches.push(Match {
                track: pos.row,
                detection: pos.column,
                cost,
            });
        }
    }

    matches.sort_by_key(|m| m.track);

    Association {
        matches,
        unmatched_tracks: (0..rows).filter(|&r| !track_taken[r]).collect(),
        unmatched_detections: (0..cols).filter(|&c| !det_taken[c]).collect(),
    }
}
