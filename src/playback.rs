use std::collections::BTreeSet;

use voice_session_utils::audio::AudioBuffer;

pub type BufferId = u64;

/// The output clock and mixer the scheduler drives.
///
/// Times are seconds on the output's own timeline, which starts at zero when
/// the output is opened.
pub trait AudioOutput: Send {
    fn current_time(&self) -> f64;

    /// Plays `buffer` starting at time `at`. A start time already in the past
    /// plays immediately.
    fn start(&mut self, id: BufferId, buffer: AudioBuffer, at: f64);

    /// Silences a buffer now. Stopped buffers are never reported as ended.
    fn stop(&mut self, id: BufferId);
}

/// Approximate loudness for visualization: RMS over every `stride`-th sample
/// of the first channel, scaled by `gain` and clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelMeter {
    stride: usize,
    gain: f32,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self {
            stride: 100,
            gain: 5.0,
        }
    }
}

impl LevelMeter {
    pub fn new(stride: usize, gain: f32) -> Self {
        Self {
            stride: stride.max(1),
            gain,
        }
    }

    pub fn level(&self, buffer: &AudioBuffer) -> f32 {
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for sample in buffer.channel(0).iter().step_by(self.stride) {
            sum += sample * sample;
            count += 1;
        }
        if count == 0 {
            return 0.0;
        }
        ((sum / count as f32).sqrt() * self.gain).clamp(0.0, 1.0)
    }
}

/// Where and when a buffer was placed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub id: BufferId,
    pub start: f64,
    pub duration: f64,
    pub level: f32,
    /// The active set went from empty to non-empty.
    pub started_speaking: bool,
}

/// Places decoded buffers back to back on the output timeline.
///
/// `cursor` is the earliest time the next buffer may start. Each buffer
/// starts at `max(cursor, now)` and moves the cursor to its end, so buffers
/// never overlap and no gap is left while delivery keeps up.
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    cursor: f64,
    active: BTreeSet<BufferId>,
    next_id: BufferId,
    meter: LevelMeter,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            cursor: 0.0,
            active: BTreeSet::new(),
            next_id: 0,
            meter: LevelMeter::default(),
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn now(&self) -> f64 {
        self.output.current_time()
    }

    pub fn is_playing(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Schedules `buffer` right after the current tail. Empty buffers are
    /// not scheduled.
    pub fn schedule(&mut self, buffer: AudioBuffer) -> Option<Scheduled> {
        if buffer.is_empty() {
            tracing::debug!("skipping empty audio buffer");
            return None;
        }
        let now = self.output.current_time();
        let start = self.cursor.max(now);
        let duration = buffer.duration();
        let level = self.meter.level(&buffer);
        let id = self.next_id;
        self.next_id += 1;

        let started_speaking = self.active.is_empty();
        self.output.start(id, buffer, start);
        self.active.insert(id);
        self.cursor = start + duration;
        tracing::debug!(id, start, duration, cursor = self.cursor, "scheduled audio buffer");

        Some(Scheduled {
            id,
            start,
            duration,
            level,
            started_speaking,
        })
    }

    /// Records that buffer `id` finished playing. Returns true when that
    /// emptied the active set.
    pub fn complete(&mut self, id: BufferId) -> bool {
        if !self.active.remove(&id) {
            return false;
        }
        self.active.is_empty()
    }

    /// Stops everything now and pulls the cursor back to the present.
    /// Returns true if anything was playing.
    pub fn interrupt(&mut self) -> bool {
        let was_playing = self.stop_all();
        self.cursor = self.output.current_time();
        was_playing
    }

    /// Stops everything and returns the cursor to its initial value.
    pub fn reset(&mut self) -> bool {
        let was_playing = self.stop_all();
        self.cursor = 0.0;
        was_playing
    }

    fn stop_all(&mut self) -> bool {
        let active = std::mem::take(&mut self.active);
        for id in &active {
            self.output.stop(*id);
        }
        !active.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct FakeClock {
        pub now: f64,
        pub started: Vec<(BufferId, f64)>,
        pub stopped: Vec<BufferId>,
    }

    /// An output whose clock only moves when the test says so.
    #[derive(Clone, Default)]
    pub(crate) struct FakeOutput(pub Arc<Mutex<FakeClock>>);

    impl FakeOutput {
        pub fn set_now(&self, now: f64) {
            self.0.lock().unwrap().now = now;
        }

        pub fn started(&self) -> Vec<(BufferId, f64)> {
            self.0.lock().unwrap().started.clone()
        }

        pub fn stopped(&self) -> Vec<BufferId> {
            self.0.lock().unwrap().stopped.clone()
        }
    }

    impl AudioOutput for FakeOutput {
        fn current_time(&self) -> f64 {
            self.0.lock().unwrap().now
        }

        fn start(&mut self, id: BufferId, _buffer: AudioBuffer, at: f64) {
            self.0.lock().unwrap().started.push((id, at));
        }

        fn stop(&mut self, id: BufferId) {
            self.0.lock().unwrap().stopped.push(id);
        }
    }

    pub(crate) fn seconds(duration: f64, value: f32) -> AudioBuffer {
        let frames = (duration * 1000.0).round() as usize;
        AudioBuffer::from_mono(vec![value; frames], 1000, 1)
    }

    fn scheduler() -> (PlaybackScheduler, FakeOutput) {
        let output = FakeOutput::default();
        (PlaybackScheduler::new(Box::new(output.clone())), output)
    }

    #[test]
    fn test_back_to_back_scheduling() {
        let (mut scheduler, output) = scheduler();
        let first = scheduler.schedule(seconds(1.0, 0.1)).unwrap();
        // the second chunk arrives while the first is still playing
        output.set_now(0.2);
        let second = scheduler.schedule(seconds(1.5, 0.1)).unwrap();

        assert_eq!(first.start, 0.0);
        assert!((second.start - 1.0).abs() < 1e-9);
        assert!((scheduler.cursor() - 2.5).abs() < 1e-9);
        assert!(first.started_speaking);
        assert!(!second.started_speaking);
    }

    #[test]
    fn test_late_delivery_starts_now() {
        let (mut scheduler, output) = scheduler();
        scheduler.schedule(seconds(0.5, 0.1));
        output.set_now(3.0);
        let late = scheduler.schedule(seconds(0.5, 0.1)).unwrap();
        assert_eq!(late.start, 3.0);
        assert!((scheduler.cursor() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_overlap_for_arbitrary_arrivals() {
        let (mut scheduler, output) = scheduler();
        let durations = [0.3, 0.05, 1.2, 0.7, 0.25, 0.9];
        let arrivals = [0.0, 0.0, 0.1, 2.0, 2.05, 4.5];
        let mut previous_end: Option<f64> = None;
        for (duration, arrival) in durations.iter().zip(arrivals) {
            output.set_now(arrival);
            let scheduled = scheduler.schedule(seconds(*duration, 0.1)).unwrap();
            let expected = previous_end.map_or(arrival, |end| end.max(arrival));
            assert!((scheduled.start - expected).abs() < 1e-9);
            previous_end = Some(scheduled.start + scheduled.duration);
        }
    }

    #[test]
    fn test_completion_reports_when_set_empties() {
        let (mut scheduler, _) = scheduler();
        let a = scheduler.schedule(seconds(0.1, 0.1)).unwrap();
        let b = scheduler.schedule(seconds(0.1, 0.1)).unwrap();
        assert!(!scheduler.complete(a.id));
        assert!(scheduler.complete(b.id));
        // unknown or repeated ids are ignored
        assert!(!scheduler.complete(b.id));
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_interrupt_stops_all_and_resets_cursor_to_now() {
        let (mut scheduler, output) = scheduler();
        scheduler.schedule(seconds(2.0, 0.1));
        scheduler.schedule(seconds(2.0, 0.1));
        output.set_now(0.5);

        assert!(scheduler.interrupt());
        assert_eq!(output.stopped(), vec![0, 1]);
        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.cursor(), 0.5);

        let next = scheduler.schedule(seconds(1.0, 0.1)).unwrap();
        assert_eq!(next.start, 0.5);
        assert!(next.started_speaking);
        assert_eq!(scheduler.active_count(), 1);
    }

    #[test]
    fn test_empty_buffer_is_not_scheduled() {
        let (mut scheduler, output) = scheduler();
        assert!(scheduler.schedule(AudioBuffer::from_mono(vec![], 24_000, 1)).is_none());
        assert!(output.started().is_empty());
        assert_eq!(scheduler.cursor(), 0.0);
    }

    #[test]
    fn test_level_meter() {
        let meter = LevelMeter::default();
        assert_eq!(meter.level(&seconds(1.0, 0.0)), 0.0);
        assert!((meter.level(&seconds(1.0, 0.1)) - 0.5).abs() < 1e-5);
        assert_eq!(meter.level(&seconds(1.0, 0.9)), 1.0);
        let quiet = LevelMeter::new(1, 1.0);
        assert!((quiet.level(&seconds(0.01, 0.25)) - 0.25).abs() < 1e-6);
    }
}
