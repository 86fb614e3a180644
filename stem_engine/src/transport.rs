/// Slack at the end of the song. Observed positions within this window
/// of the duration count as finished, absorbing scheduler jitter between
/// the device clock and the last scheduled sample.
pub const END_EPSILON_SECONDS: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Playing,
    Paused,
}

/// The playhead state machine shared by all stems of a song.
///
/// While Playing the position is never stored; it is derived from the
/// device clock as `now - epoch` on every read, so all observers agree
/// on a single timeline. The stored position is only meaningful in
/// Stopped and Paused.
#[derive(Debug)]
pub struct Transport {
    phase: Phase,
    position: f64,
    epoch: f64,
    duration: f64,
}

impl Transport {
    pub fn new(duration: f64) -> Self {
        Transport {
            phase: Phase::Stopped,
            position: 0.0,
            epoch: 0.0,
            duration,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Observed playhead position, clamped into `[0, duration]`.
    pub fn position(&self, now: f64) -> f64 {
        let raw = if self.phase == Phase::Playing {
            now - self.epoch
        } else {
            self.position
        };
        raw.clamp(0.0, self.duration)
    }

    /// Enters Playing from the stored position, anchoring the clock so
    /// that `now - epoch` equals that position.
    pub fn begin(&mut self, now: f64) {
        self.epoch = now - self.position;
        self.phase = Phase::Playing;
    }

    pub fn pause(&mut self, now: f64) {
        if self.phase != Phase::Playing {
            return;
        }
        self.position = (now - self.epoch).clamp(0.0, self.duration);
        self.phase = Phase::Paused;
    }

    /// Unconditional: rewinds to the start and enters Stopped. Used both
    /// for the explicit user action and for end-of-song.
    pub fn stop(&mut self) {
        self.position = 0.0;
        self.phase = Phase::Stopped;
    }

    /// Moves the playhead to `normalized * duration` (input clamped into
    /// `[0, 1]`) and returns the new position. While Playing the epoch is
    /// re-anchored; the caller re-triggers the sources at the returned
    /// offset.
    pub fn seek_normalized(&mut self, normalized: f64, now: f64) -> f64 {
        let position = normalized.clamp(0.0, 1.0) * self.duration;
        self.position = position;
        if self.phase == Phase::Playing {
            self.epoch = now - position;
        }
        position
    }

    pub fn finished(&self, now: f64) -> bool {
        self.phase == Phase::Playing && self.position(now) >= self.duration - END_EPSILON_SECONDS
    }
}
