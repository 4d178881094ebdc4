use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use voice_session_utils::audio::AudioBuffer;

use crate::playback::{AudioOutput, BufferId};

struct Playing {
    id: BufferId,
    buffer: AudioBuffer,
    start_frame: u64,
}

impl Playing {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.buffer.frames() as u64
    }
}

/// Sample-accurate mix of scheduled buffers, rendered by the output device
/// callback. The number of frames rendered so far is the output clock.
pub(crate) struct Timeline {
    sample_rate: u32,
    frames_rendered: u64,
    playing: Vec<Playing>,
}

impl Timeline {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            playing: Vec::new(),
        }
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub(crate) fn start(&mut self, id: BufferId, buffer: AudioBuffer, at: f64) {
        let requested = (at * self.sample_rate as f64).round().max(0.0) as u64;
        // the callback may have moved past `at` since it was read
        let start_frame = requested.max(self.frames_rendered);
        self.playing.push(Playing {
            id,
            buffer,
            start_frame,
        });
    }

    pub(crate) fn stop(&mut self, id: BufferId) {
        self.playing.retain(|p| p.id != id);
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.playing.is_empty()
    }

    /// Mixes the next `out.len() / channel_count` frames into interleaved
    /// `out`. `finished` is cleared and receives the buffers that ended
    /// during them.
    pub(crate) fn render(&mut self, out: &mut [f32], channel_count: usize, finished: &mut Vec<BufferId>) {
        let channel_count = channel_count.max(1);
        out.fill(0.0);
        let frames = (out.len() / channel_count) as u64;
        let block_start = self.frames_rendered;
        let block_end = block_start + frames;

        for playing in &self.playing {
            if playing.start_frame >= block_end || playing.end_frame() <= block_start {
                continue;
            }
            let from = playing.start_frame.max(block_start);
            let to = playing.end_frame().min(block_end);
            for frame in from..to {
                let source = (frame - playing.start_frame) as usize;
                let target = (frame - block_start) as usize * channel_count;
                for ch in 0..channel_count {
                    out[target + ch] += playing.buffer.channel(ch)[source];
                }
            }
        }

        self.frames_rendered = block_end;
        finished.clear();
        self.playing.retain(|p| {
            let done = p.end_frame() <= block_end;
            if done {
                finished.push(p.id);
            }
            !done
        });
    }
}

pub(crate) type SharedTimeline = Arc<Mutex<Timeline>>;

pub(crate) fn lock(timeline: &SharedTimeline) -> MutexGuard<'_, Timeline> {
    timeline.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render side of the timeline, owned by the output device callback.
///
/// Never waits for the lock: while the session holds it the block is
/// silent and the clock does not advance.
pub(crate) struct Renderer {
    timeline: SharedTimeline,
    channel_count: usize,
    finished: Vec<BufferId>,
}

impl Renderer {
    pub(crate) fn new(timeline: SharedTimeline, channel_count: usize) -> Self {
        Self {
            timeline,
            channel_count,
            finished: Vec::with_capacity(64),
        }
    }

    /// Fills `out` and returns the buffers that ended in it.
    pub(crate) fn render(&mut self, out: &mut [f32]) -> &[BufferId] {
        match self.timeline.try_lock() {
            Ok(mut timeline) => timeline.render(out, self.channel_count, &mut self.finished),
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned
                    .into_inner()
                    .render(out, self.channel_count, &mut self.finished)
            }
            Err(TryLockError::WouldBlock) => {
                out.fill(0.0);
                self.finished.clear();
            }
        }
        &self.finished
    }
}

/// [`AudioOutput`] backed by the timeline a device callback is rendering.
pub(crate) struct DeviceOutput {
    timeline: SharedTimeline,
}

impl DeviceOutput {
    pub(crate) fn new(timeline: SharedTimeline) -> Self {
        Self { timeline }
    }
}

impl AudioOutput for DeviceOutput {
    fn current_time(&self) -> f64 {
        lock(&self.timeline).current_time()
    }

    fn start(&mut self, id: BufferId, buffer: AudioBuffer, at: f64) {
        lock(&self.timeline).start(id, buffer, at);
    }

    fn stop(&mut self, id: BufferId) {
        lock(&self.timeline).stop(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: u32) -> AudioBuffer {
        let samples = (1..=frames).map(|i| i as f32).collect();
        AudioBuffer::from_mono(samples, sample_rate, 2)
    }

    #[test]
    fn test_renders_back_to_back_without_gap() {
        let mut timeline = Timeline::new(10);
        timeline.start(1, ramp(3, 10), 0.0);
        timeline.start(2, ramp(2, 10), 0.3);

        let mut finished = Vec::new();
        let mut out = vec![0.0; 8];
        timeline.render(&mut out, 2, &mut finished);
        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 1.0, 1.0]);
        assert_eq!(finished, vec![1]);

        let mut out = vec![0.0; 4];
        timeline.render(&mut out, 2, &mut finished);
        assert_eq!(out, vec![2.0, 2.0, 0.0, 0.0]);
        assert_eq!(finished, vec![2]);
        assert!(timeline.is_idle());
        assert!((timeline.current_time() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_future_start_leaves_silence() {
        let mut timeline = Timeline::new(10);
        timeline.start(7, ramp(2, 10), 0.2);
        let mut out = vec![9.0; 3];
        let mut finished = vec![42];
        timeline.render(&mut out, 1, &mut finished);
        assert!(finished.is_empty());
        assert_eq!(out, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_stopped_buffer_is_not_reported() {
        let mut timeline = Timeline::new(10);
        timeline.start(1, ramp(4, 10), 0.0);
        let mut finished = Vec::new();
        let mut out = vec![0.0; 2];
        timeline.render(&mut out, 1, &mut finished);
        timeline.stop(1);
        let mut out = vec![0.0; 4];
        timeline.render(&mut out, 1, &mut finished);
        assert!(finished.is_empty());
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn test_past_start_is_clamped_to_clock() {
        let mut timeline = Timeline::new(10);
        let mut finished = Vec::new();
        let mut out = vec![0.0; 5];
        timeline.render(&mut out, 1, &mut finished);
        timeline.start(1, ramp(2, 10), 0.1);
        let mut out = vec![0.0; 2];
        timeline.render(&mut out, 1, &mut finished);
        assert_eq!(finished, vec![1]);
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn test_device_output_reads_shared_clock() {
        let timeline: SharedTimeline = Arc::new(Mutex::new(Timeline::new(100)));
        let mut output = DeviceOutput::new(timeline.clone());
        output.start(0, ramp(10, 100), 0.0);
        let mut renderer = Renderer::new(timeline.clone(), 1);
        let mut out = vec![0.0; 50];
        assert_eq!(renderer.render(&mut out), &[0]);
        assert!((output.current_time() - 0.5).abs() < 1e-9);
        assert_eq!(lock(&timeline).sample_rate(), 100);
    }

    #[test]
    fn test_renderer_plays_silence_while_session_holds_the_lock() {
        let timeline: SharedTimeline = Arc::new(Mutex::new(Timeline::new(10)));
        lock(&timeline).start(3, ramp(2, 10), 0.0);
        let mut renderer = Renderer::new(timeline.clone(), 1);

        let guard = lock(&timeline);
        let mut out = vec![9.0; 4];
        assert!(renderer.render(&mut out).is_empty());
        assert_eq!(out, vec![0.0; 4]);
        assert_eq!(guard.current_time(), 0.0);
        drop(guard);

        let mut out = vec![0.0; 4];
        assert_eq!(renderer.render(&mut out), &[3]);
        assert_eq!(out, vec![1.0, 2.0, 0.0, 0.0]);
    }
}
