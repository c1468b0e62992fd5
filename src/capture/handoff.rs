use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Bar/line heights for one rendered instant, channel by channel.
#[derive(Clone, Debug, PartialEq)]
pub struct AmplitudeFrame {
    pub values: Vec<f64>,
    pub sequence: u64,
}

impl AmplitudeFrame {
    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        (self.values.iter().sum::<f64>() / self.values.len() as f64) as f32
    }
}

/// Last-write-wins slot between the capture thread and the render loop.
///
/// Publishing never waits for the reader: a frame that was not drawn before
/// the next one arrives is dropped.
#[derive(Default)]
pub struct FrameHandoff {
    slot: Mutex<Option<Arc<AmplitudeFrame>>>,
    redraw: AtomicBool,
    published: AtomicU64,
}

impl FrameHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame and ask for a redraw.
    pub fn publish(&self, values: Vec<f64>) {
        let sequence = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Arc::new(AmplitudeFrame { values, sequence });
        *self.slot.lock() = Some(frame);
        self.redraw.store(true, Ordering::Release);
    }

    /// The current frame, left in place for later reads.
    pub fn take_latest(&self) -> Option<Arc<AmplitudeFrame>> {
        self.slot.lock().clone()
    }

    /// Whether a frame arrived since the last call. Clears the request.
    pub fn take_redraw_request(&self) -> bool {
        self.redraw.swap(false, Ordering::Acquire)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn empty_before_first_publish() {
        let handoff = FrameHandoff::new();
        assert!(handoff.take_latest().is_none());
        assert!(!handoff.take_redraw_request());
    }

    #[test]
    fn newer_frame_replaces_unread_one() {
        let handoff = FrameHandoff::new();
        handoff.publish(vec![0.1, 0.2]);
        handoff.publish(vec![0.9, 0.8]);
        let latest = handoff.take_latest().unwrap();
        assert_eq!(latest.values, vec![0.9, 0.8]);
        assert_eq!(latest.sequence, 2);
    }

    #[test]
    fn repeated_reads_return_the_same_frame() {
        let handoff = FrameHandoff::new();
        handoff.publish(vec![0.5]);
        let first = handoff.take_latest().unwrap();
        let second = handoff.take_latest().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn redraw_request_is_consumed_once() {
        let handoff = FrameHandoff::new();
        handoff.publish(vec![0.5]);
        handoff.publish(vec![0.6]);
        assert!(handoff.take_redraw_request());
        assert!(!handoff.take_redraw_request());
        assert!(handoff.take_latest().is_some());
    }

    #[test]
    fn publisher_thread_never_waits_for_reader() {
        let handoff = Arc::new(FrameHandoff::new());
        let writer = {
            let handoff = Arc::clone(&handoff);
            thread::spawn(move || {
                for i in 0..1000 {
                    handoff.publish(vec![i as f64]);
                }
            })
        };
        writer.join().unwrap();
        assert_eq!(handoff.published(), 1000);
        assert_eq!(handoff.take_latest().unwrap().values, vec![999.0]);
    }

    #[test]
    fn average_of_values() {
        let frame = AmplitudeFrame { values: vec![0.0, 0.5, 1.0], sequence: 1 };
        assert!((frame.average() - 0.5).abs() < 1e-6);
    }
}
