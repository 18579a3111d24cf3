//! Constant-velocity Kalman filter over a bounding box.
//!
//! State is `[cx, cy, w, h, vx, vy, vw, vh]` in pixels and pixels per second,
//! the measurement is `[cx, cy, w, h]`. Noise is scaled by the box height so
//! near and far objects are treated alike.

use crate::bbox::{BBox, Ltrb};
use nalgebra as na;
use tracing::warn;

type State = na::SVector<f32, 8>;
type Covariance = na::SMatrix<f32, 8, 8>;
type Measurement = na::SVector<f32, 4>;
type Observation = na::SMatrix<f32, 4, 8>;

/// Elapsed time below this is treated as a clock anomaly.
pub const MIN_DT: f32 = 1e-4;

const STD_WEIGHT_POSITION: f32 = 1.0 / 20.0;
const STD_WEIGHT_VELOCITY: f32 = 1.0 / 4.0;
const MIN_SIDE: f32 = 1.0;

#[derive(Debug, Clone)]
struct Prediction {
    ts: f32,
    mean: State,
    covariance: Covariance,
}

#[derive(Debug, Clone)]
pub struct Predictor {
    mean: State,
    covariance: Covariance,
    ts: f32,
    prediction: Option<Prediction>,
}

impl Predictor {
    pub fn new(ts: f32, bbox: &BBox<Ltrb>) -> Self {
        let b = bbox.as_xywh();
        let h = b.height().max(MIN_SIDE);

        let mut mean = State::zeros();
        mean.fixed_rows_mut::<4>(0)
            .copy_from(&Measurement::new(b.cx(), b.cy(), b.width(), b.height()));

        let pos = 2.0 * STD_WEIGHT_POSITION * h;
        let vel = 10.0 * STD_WEIGHT_VELOCITY * h;
        let std = State::from_column_slice(&[pos, pos, pos, pos, vel, vel, vel, vel]);

        Self {
            mean,
            covariance: Covariance::from_diagonal(&std.component_mul(&std)),
            ts,
            prediction: None,
        }
    }

    fn transition(dt: f32) -> Covariance {
        let mut f = Covariance::identity();
        for i in 0..4 {
            f[(i, i + 4)] = dt;
        }
        f
    }

    fn observation() -> Observation {
        Observation::identity()
    }

    fn propagate(&self, dt: f32) -> (State, Covariance) {
        let h = self.mean[3].max(MIN_SIDE);
        let pos = STD_WEIGHT_POSITION * h;
        let vel = STD_WEIGHT_VELOCITY * h;
        let std = State::from_column_slice(&[pos, pos, pos, pos, vel, vel, vel, vel]);
        let q = Covariance::from_diagonal(&std.component_mul(&std)) * dt;

        let f = Self::transition(dt);
        let mean = f * self.mean;
        let covariance = f * self.covariance * f.transpose() + q;

        (mean, covariance)
    }

    /// Expected box at `ts`. Caches the propagated state for a following
    /// [`update`](Self::update) or [`coast`](Self::coast).
    pub fn predict(&mut self, ts: f32) -> BBox<Ltrb> {
        let dt = ts - self.ts;
        if dt <= MIN_DT {
            self.prediction = None;
            return self.bbox();
        }

        let (mean, covariance) = self.propagate(dt);
        let bbox = Self::mean_bbox(&mean);

        self.prediction = Some(Prediction {
            ts,
            mean,
            covariance,
        });

        bbox
    }

    fn take_prediction(&mut self, ts: f32) -> Option<(State, Covariance)> {
        match self.prediction.take() {
            Some(p) if p.ts == ts => Some((p.mean, p.covariance)),
            _ => {
                let dt = ts - self.ts;
                if dt <= MIN_DT {
                    None
                } else {
                    Some(self.propagate(dt))
                }
            }
        }
    }

    /// Fuses a measured box taken at `ts`. Returns `false` when the elapsed
    /// time is not positive, in which case the state is left untouched.
    pub fn update(&mut self, ts: f32, measured: &BBox<Ltrb>) -> bool {
        let (mean, covariance) = match self.take_prediction(ts) {
            Some(p) => p,
            None => {
                warn!(ts, last = self.ts, "non-increasing timestamp, skipping motion update");
                return false;
            }
        };

        let b = measured.as_xywh();
        let z = Measurement::new(b.cx(), b.cy(), b.width(), b.height());

        let hm = Self::observation();
        let std = STD_WEIGHT_POSITION * mean[3].max(MIN_SIDE);
        let r = na::SMatrix::<f32, 4, 4>::from_diagonal_element(std * std);

        let s = hm * covariance * hm.transpose() + r;
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => {
                warn!(ts, "singular innovation covariance, coasting instead");
                self.commit(ts, mean, covariance);
                return false;
            }
        };

        let gain = covariance * hm.transpose() * s_inv;
        let innovation = z - hm * mean;

        let mean = mean + gain * innovation;
        let covariance = (Covariance::identity() - gain * hm) * covariance;

        self.commit(ts, mean, covariance);
        true
    }

    /// Advances the state to `ts` without a measurement; uncertainty only grows.
    pub fn coast(&mut self, ts: f32) -> bool {
        match self.take_prediction(ts) {
            Some((mean, covariance)) => {
                self.commit(ts, mean, covariance);
                true
            }
            None => false,
        }
    }

    fn commit(&mut self, ts: f32, mean: State, covariance: Covariance) {
        self.mean = mean;
        self.covariance = covariance;
        self.ts = ts;
    }

    fn mean_bbox(mean: &State) -> BBox<Ltrb> {
        BBox::xywh(
            mean[0],
            mean[1],
            mean[2].max(MIN_SIDE),
            mean[3].max(MIN_SIDE),
        )
        .as_ltrb()
    }

    #[inline]
    pub fn bbox(&self) -> BBox<Ltrb> {
        Self::mean_bbox(&self.mean)
    }

    /// Box from the cached prediction, or the current estimate if none is pending.
    #[inline]
    pub fn predicted(&self) -> BBox<Ltrb> {
        match &self.prediction {
            Some(p) => Self::mean_bbox(&p.mean),
            None => self.bbox(),
        }
    }

    /// Center velocity in pixels per second.
    #[inline]
    pub fn velocity(&self) -> na::Vector2<f32> {
        na::Vector2::new(self.mean[4], self.mean[5])
    }

    /// Sum of the positional variances, a scalar measure of uncertainty.
    #[inline]
    pub fn position_uncertainty(&self) -> f32 {
        (0..4).map(|i| self.covariance[(i, i)]).sum()
    }

    #[inline]
    pub fn timestamp(&self) -> f32 {
        self.ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving_box(i: usize) -> BBox<Ltrb> {
        let x = 100.0 + 10.0 * i as f32;
        BBox::ltrb(x, 100., x + 50., 200.)
    }

    #[test]
    fn learns_constant_velocity() {
        let dt = 0.1;
        let mut p = Predictor::new(0.0, &moving_box(0));

        for i in 1..20 {
            let ts = i as f32 * dt;
            p.predict(ts);
            assert!(p.update(ts, &moving_box(i)));
        }

        // 10px per 0.1s
        assert!((p.velocity().x - 100.0).abs() < 5.0, "{}", p.velocity().x);
        assert!(p.velocity().y.abs() < 5.0);

        let next = p.predict(2.0);
        let (cx, _) = next.center();
        assert!((cx - 325.0).abs() < 5.0, "{}", cx);
    }

    #[test]
    fn non_positive_dt_is_a_no_op() {
        let mut p = Predictor::new(1.0, &moving_box(0));
        let before = p.bbox();
        let unc = p.position_uncertainty();

        assert_eq!(p.predict(1.0), before);
        assert!(!p.update(1.0, &moving_box(5)));
        assert!(!p.update(0.5, &moving_box(5)));
        assert!(!p.coast(0.9));

        assert_eq!(p.bbox(), before);
        assert_eq!(p.position_uncertainty(), unc);
        assert!(p.velocity().x.is_finite());
    }

    #[test]
    fn uncertainty_grows_while_coasting() {
        let mut p = Predictor::new(0.0, &moving_box(0));
        let mut prev = p.position_uncertainty();

        for i in 1..6 {
            let ts = i as f32 * 0.1;
            p.predict(ts);
            assert!(p.coast(ts));

            let unc = p.position_uncertainty();
            assert!(unc > prev);
            prev = unc;
        }
    }

    #[test]
    fn update_shrinks_uncertainty() {
        let mut p = Predictor::new(0.0, &moving_box(0));
        p.predict(0.1);
        p.coast(0.1);
        let coasted = p.position_uncertainty();

        p.predict(0.2);
        p.update(0.2, &moving_box(2));
        assert!(p.position_uncertainty() < coasted);
    }
}
