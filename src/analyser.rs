use std::sync::{Arc, Mutex, PoisonError};

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use voice_session_utils::audio::shared_buffer;

/// Number of recent samples each analyser keeps.
pub const ANALYSER_SIZE: usize = 2048;

/// A live tap on one side of the audio graph.
///
/// Holds the most recent mono samples written by the device callback.
/// Visualizers clone the handle and read from it at their own pace.
#[derive(Clone)]
pub struct AnalyserNode {
    samples: Arc<Mutex<HeapRb<f32>>>,
}

impl AnalyserNode {
    pub fn new(size: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(shared_buffer(size.max(1)))),
        }
    }

    /// Writes the first channel of interleaved `data`. Skips the write rather
    /// than wait when a reader holds the lock, since this runs on the device
    /// callback.
    pub fn write(&self, data: &[f32], channel_count: usize) {
        let Ok(mut samples) = self.samples.try_lock() else {
            return;
        };
        for sample in data.iter().step_by(channel_count.max(1)) {
            samples.push_overwrite(*sample);
        }
    }

    /// The buffered samples, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.iter().copied().collect()
    }

    pub fn rms(&self) -> f32 {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let len = samples.occupied_len();
        if len == 0 {
            return 0.0;
        }
        let sum: f32 = samples.iter().map(|s| s * s).sum();
        (sum / len as f32).sqrt()
    }

    pub fn capacity(&self) -> usize {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.capacity().get()
    }
}

impl std::fmt::Debug for AnalyserNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyserNode").field("capacity", &self.capacity()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_most_recent_samples() {
        let analyser = AnalyserNode::new(4);
        analyser.write(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 1);
        assert_eq!(analyser.snapshot(), vec![0.3, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_interleaved_write_takes_first_channel() {
        let analyser = AnalyserNode::new(8);
        analyser.write(&[0.5, -1.0, 0.5, -1.0], 2);
        assert_eq!(analyser.snapshot(), vec![0.5, 0.5]);
        assert!((analyser.rms() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_rms_is_zero() {
        let analyser = AnalyserNode::new(16);
        assert_eq!(analyser.rms(), 0.0);
        assert_eq!(analyser.capacity(), 16);
    }
}
