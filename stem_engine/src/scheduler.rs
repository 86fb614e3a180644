use std::sync::Arc;

use crate::song::AudioBuffer;

/// Ramp length for live gain changes. Long enough to avoid the click of
/// an instantaneous step, short enough to feel immediate.
pub const GAIN_RAMP_SECONDS: f64 = 0.03;

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("no audio data to schedule")]
    EmptyBuffer,

    #[error("invalid start offset {offset}s for a {duration}s buffer")]
    InvalidOffset { offset: f64, duration: f64 },

    #[error("output stream error: {0}")]
    Stream(String),
}

/// One live voice. Stopping twice, or stopping a voice that already ran
/// to its end, is a no-op.
pub trait SourceHandle: Send {
    /// Moves the voice's gain toward `target` over `ramp_seconds`
    /// without re-triggering playback.
    fn set_gain(&mut self, target: f32, ramp_seconds: f64);

    fn stop(&mut self);
}

/// The playback primitive: a device clock plus sample-accurate buffer
/// scheduling. Callers that need several voices phase-locked read `now`
/// once and pass the same `at` to every `spawn`.
pub trait Scheduler {
    /// Current time on the device clock, in seconds. Monotonic.
    fn now(&self) -> f64;

    /// Schedules `buffer` to begin sounding at device time `at`, skipping
    /// the first `offset_seconds` of the buffer, at `gain`. An `at` in
    /// the past starts immediately at the correspondingly advanced
    /// buffer position.
    fn spawn(
        &mut self,
        buffer: Arc<AudioBuffer>,
        at: f64,
        offset_seconds: f64,
        gain: f32,
    ) -> Result<Box<dyn SourceHandle>, SchedulerError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::{Arc, Mutex};

    use super::{Scheduler, SchedulerError, SourceHandle};
    use crate::song::AudioBuffer;

    #[derive(Debug, Clone)]
    pub struct VoiceRecord {
        pub at: f64,
        pub offset: f64,
        pub gain: f32,
        pub ramps: Vec<(f32, f64)>,
        pub stopped: bool,
        pub stop_calls: usize,
    }

    #[derive(Default)]
    struct Shared {
        now: f64,
        voices: Vec<VoiceRecord>,
        fail_next: usize,
    }

    /// Scheduler with a hand-cranked clock, recording every spawned voice
    /// and every gain update for later inspection.
    pub struct FakeScheduler {
        shared: Arc<Mutex<Shared>>,
    }

    /// Test-side handle onto a [`FakeScheduler`]'s clock and records.
    #[derive(Clone)]
    pub struct FakeControl {
        shared: Arc<Mutex<Shared>>,
    }

    pub fn fake_scheduler() -> (FakeScheduler, FakeControl) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            FakeScheduler {
                shared: shared.clone(),
            },
            FakeControl { shared },
        )
    }

    impl FakeControl {
        pub fn advance(&self, seconds: f64) {
            self.shared.lock().unwrap().now += seconds;
        }

        pub fn fail_next_spawns(&self, count: usize) {
            self.shared.lock().unwrap().fail_next = count;
        }

        pub fn voices(&self) -> Vec<VoiceRecord> {
            self.shared.lock().unwrap().voices.clone()
        }

        pub fn live_voices(&self) -> Vec<VoiceRecord> {
            self.voices().into_iter().filter(|v| !v.stopped).collect()
        }
    }

    impl Scheduler for FakeScheduler {
        fn now(&self) -> f64 {
            self.shared.lock().unwrap().now
        }

        fn spawn(
            &mut self,
            _buffer: Arc<AudioBuffer>,
            at: f64,
            offset_seconds: f64,
            gain: f32,
        ) -> Result<Box<dyn SourceHandle>, SchedulerError> {
            let mut shared = self.shared.lock().unwrap();
            if shared.fail_next > 0 {
                shared.fail_next -= 1;
                return Err(SchedulerError::Stream("induced start failure".to_string()));
            }

            let id = shared.voices.len();
            shared.voices.push(VoiceRecord {
                at,
                offset: offset_seconds,
                gain,
                ramps: Vec::new(),
                stopped: false,
                stop_calls: 0,
            });

            Ok(Box::new(FakeHandle {
                id,
                shared: self.shared.clone(),
            }))
        }
    }

    struct FakeHandle {
        id: usize,
        shared: Arc<Mutex<Shared>>,
    }

    impl SourceHandle for FakeHandle {
        fn set_gain(&mut self, target: f32, ramp_seconds: f64) {
            let mut shared = self.shared.lock().unwrap();
            let voice = &mut shared.voices[self.id];
            voice.ramps.push((target, ramp_seconds));
            voice.gain = target;
        }

        fn stop(&mut self) {
            let mut shared = self.shared.lock().unwrap();
            let voice = &mut shared.voices[self.id];
            voice.stopped = true;
            voice.stop_calls += 1;
        }
    }
}
