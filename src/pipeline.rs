//! Capture to tracking hand-off on a dedicated worker thread.

use crate::circular_queue::CircularQueue;
use crate::config::Config;
use crate::error::Error;
use crate::frame::Frame;
use crate::rolling_avg::RollingRate;
use crate::warning::WarningSink;
use crate::{HazardTracker, Tracking};

use parking_lot::{Condvar, Mutex};
use serde_derive::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

struct QueueState {
    frames: CircularQueue<Frame>,
    closed: bool,
    dropped: u64,
}

/// Bounded frame queue where the newest frame always wins: pushing into a
/// full queue evicts the oldest unconsumed frame.
pub struct FrameQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: CircularQueue::with_capacity(capacity),
                closed: false,
                dropped: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Returns `true` when an older frame had to be evicted.
    pub fn push(&self, frame: Frame) -> Result<bool, Error> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::PipelineClosed);
        }

        let evicted = state.frames.push(frame);
        if let Some(old) = &evicted {
            state.dropped += 1;
            warn!(frame = old.index, "tracker is behind, dropping frame");
        }

        drop(state);
        self.ready.notify_one();

        Ok(evicted.is_some())
    }

    /// Blocks until a frame is available. `None` once the queue is closed.
    pub fn pop(&self) -> Option<Frame> {
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return None;
            }

            if let Some(frame) = state.frames.pop_oldest() {
                return Some(frame);
            }

            self.ready.wait(&mut state);
        }
    }

    /// Stops admission and discards whatever is still queued. Returns the
    /// number of discarded frames.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;

        let discarded = state.frames.len();
        state.frames.clear();
        state.dropped += discarded as u64;

        drop(state);
        self.ready.notify_all();

        discarded
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames evicted or discarded so far.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub processed: u64,
    pub dropped: u64,
    pub signals: u64,
    /// Processed frames per second over the last 30 frames
    pub rate: f64,
}

struct WorkerStats {
    processed: u64,
    signals: u64,
    rate: f64,
}

/// Runs a [`HazardTracker`] for one source on its own thread and forwards
/// every frame's signals to a sink.
pub struct Pipeline {
    queue: Arc<FrameQueue>,
    worker: Option<JoinHandle<WorkerStats>>,
}

impl Pipeline {
    pub fn spawn<K>(config: Config, source: &str, mut sink: K) -> Result<Self, Error>
    where
        K: WarningSink + Send + 'static,
    {
        let queue = Arc::new(FrameQueue::new(config.pipeline.queue_capacity));
        let worker_queue = queue.clone();
        let source = source.to_string();

        let worker = thread::Builder::new()
            .name(format!("tracker-{}", source))
            .spawn(move || {
                let mut tracker = HazardTracker::new(config);
                let mut rate = RollingRate::new(30);
                let started = Instant::now();
                let mut stats = WorkerStats {
                    processed: 0,
                    signals: 0,
                    rate: 0.0,
                };

                while let Some(frame) = worker_queue.pop() {
                    let signals = tracker.update(&frame, &source);
                    sink.emit(&signals);

                    stats.processed += 1;
                    stats.signals += signals.len() as u64;
                    stats.rate = rate.push(started.elapsed().as_secs_f64());
                }

                debug!(source = %source, processed = stats.processed, "tracker worker finished");

                stats
            })?;

        Ok(Self {
            queue,
            worker: Some(worker),
        })
    }

    /// Queues a frame, evicting the oldest pending one if the worker is behind.
    pub fn submit(&self, frame: Frame) -> Result<(), Error> {
        self.queue.push(frame).map(|_| ())
    }

    /// Shared handle for producers on other threads.
    pub fn queue(&self) -> Arc<FrameQueue> {
        self.queue.clone()
    }

    /// Stops admission, lets the frame in flight finish and discards the rest.
    pub fn shutdown(mut self) -> Result<PipelineStats, Error> {
        self.stop()
    }

    fn stop(&mut self) -> Result<PipelineStats, Error> {
        let discarded = self.queue.close();
        if discarded > 0 {
            info!(discarded, "discarding queued frames on shutdown");
        }

        let Some(worker) = self.worker.take() else {
            return Err(Error::PipelineClosed);
        };

        let stats = worker.join().map_err(|_| Error::WorkerPanicked)?;

        Ok(PipelineStats {
            processed: stats.processed,
            dropped: self.queue.dropped(),
            signals: stats.signals,
            rate: stats.rate,
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(err) = self.stop() {
                warn!("pipeline shutdown failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::detection::Detection;
    use crate::hazard::HazardSignal;
    use std::time::Duration;

    fn frame(index: u64) -> Frame {
        Frame::new(
            index,
            index as f32 * 0.1,
            (640, 480),
            vec![Detection::new(BBox::ltrb(100., 100., 150., 200.), 0, 0.9)],
        )
    }

    #[test]
    fn latest_frame_wins() {
        let q = FrameQueue::new(2);
        assert!(!q.push(frame(1)).unwrap());
        assert!(!q.push(frame(2)).unwrap());
        assert!(q.push(frame(3)).unwrap());

        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop().map(|f| f.index), Some(2));
        assert_eq!(q.pop().map(|f| f.index), Some(3));
    }

    #[test]
    fn close_discards_and_rejects() {
        let q = FrameQueue::new(4);
        q.push(frame(1)).unwrap();
        q.push(frame(2)).unwrap();

        assert_eq!(q.close(), 2);
        assert_eq!(q.dropped(), 2);
        assert!(q.pop().is_none());
        assert!(matches!(q.push(frame(3)), Err(Error::PipelineClosed)));
    }

    #[test]
    fn pop_waits_for_producer() {
        let q = Arc::new(FrameQueue::new(2));
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.push(frame(7)).unwrap();
            })
        };

        assert_eq!(q.pop().map(|f| f.index), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn close_wakes_a_waiting_consumer() {
        let q = Arc::new(FrameQueue::new(2));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop())
        };

        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn every_frame_is_processed_or_dropped() {
        let seen = Arc::new(Mutex::new(0u64));
        let sink = {
            let seen = seen.clone();
            move |_: &[HazardSignal]| *seen.lock() += 1
        };

        let pipeline = Pipeline::spawn(Config::default(), "cam", sink).unwrap();
        for i in 1..=50 {
            pipeline.submit(frame(i)).unwrap();
        }

        let stats = pipeline.shutdown().unwrap();
        assert_eq!(stats.processed + stats.dropped, 50);
        assert_eq!(*seen.lock(), stats.processed);
        assert_eq!(stats.signals, 0);
    }
}
