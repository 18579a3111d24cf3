use crate::circular_queue::CircularQueue;

/// Event rate averaged over the last `window` timestamps.
#[derive(Debug, Clone)]
pub struct RollingRate {
    stamps: CircularQueue<f64>,
    rate: f64,
}

impl RollingRate {
    pub fn new(window: usize) -> Self {
        Self {
            stamps: CircularQueue::with_capacity(window.max(2)),
            rate: 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
        self.rate = 0.0;
    }

    /// Records an event at `ts` seconds and returns the updated rate.
    pub fn push(&mut self, ts: f64) -> f64 {
        if let Some(&last) = self.stamps.newest() {
            // a clock jump backwards restarts the window
            if ts < last {
                self.clear();
            }
        }

        self.stamps.push(ts);

        if let (Some(&first), Some(&last)) = (self.stamps.oldest(), self.stamps.newest()) {
            let elapsed = last - first;
            if elapsed > 0.0 {
                self.rate = (self.stamps.len() - 1) as f64 / elapsed;
            }
        }

        self.rate
    }

    /// Events per second; zero until two distinct timestamps were seen.
    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_rate() {
        let mut r = RollingRate::new(30);
        assert_eq!(r.rate(), 0.0);

        for i in 0..100 {
            r.push(i as f64 * 0.05);
        }

        assert!((r.rate() - 20.0).abs() < 1e-6);
        assert_eq!(r.len(), 30);
    }

    #[test]
    fn follows_recent_window() {
        let mut r = RollingRate::new(5);
        for i in 0..10 {
            r.push(i as f64 * 0.1);
        }
        let t = 0.9;
        for i in 1..=5 {
            r.push(t + i as f64 * 0.5);
        }

        assert!((r.rate() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn backwards_clock_restarts() {
        let mut r = RollingRate::new(5);
        r.push(10.0);
        r.push(11.0);
        r.push(1.0);

        assert_eq!(r.len(), 1);
        assert_eq!(r.rate(), 0.0);
    }
}
