use crate::scheduler::{Scheduler, SourceHandle, GAIN_RAMP_SECONDS};
use crate::song::Song;

/// Offsets are kept this far short of a stem's end so no source is ever
/// scheduled with zero remaining audio, which some backends reject.
const MIN_REMAINDER_SECONDS: f64 = 0.0001;

/// At most one live voice per track, all triggered from one shared
/// reference instant so inter-track phase error is bounded by the
/// scheduling backend alone, not by per-track clock reads drifting
/// apart.
#[derive(Default)]
pub struct SourceSet {
    handles: Vec<Option<Box<dyn SourceHandle>>>,
}

impl SourceSet {
    pub fn new() -> Self {
        SourceSet::default()
    }

    /// Stops whatever is live and triggers a fresh voice per track at
    /// `offset_seconds`, all anchored to a single `now` read once per
    /// call. A track whose spawn fails is logged and skipped for this
    /// cycle; the rest of the mix still starts.
    pub fn create_all(
        &mut self,
        scheduler: &mut dyn Scheduler,
        song: &Song,
        gains: &[f32],
        offset_seconds: f64,
    ) {
        debug_assert_eq!(gains.len(), song.tracks().len());
        self.stop_all();

        let at = scheduler.now();
        self.handles = song
            .tracks()
            .iter()
            .map(|track| {
                let buffer = track.buffer()?;
                let max_offset = (track.duration_seconds() - MIN_REMAINDER_SECONDS).max(0.0);
                let offset = offset_seconds.clamp(0.0, max_offset);

                match scheduler.spawn(buffer.clone(), at, offset, gains[track.id()]) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        log::warn!("track {:?} did not start this cycle: {e}", track.name());
                        None
                    }
                }
            })
            .collect();
    }

    /// Idempotent; stopping an already-stopped or never-started set does
    /// nothing.
    pub fn stop_all(&mut self) {
        for handle in self.handles.iter_mut().flatten() {
            handle.stop();
        }
        self.handles.clear();
    }

    /// Pushes resolved gains into the live voices with the smoothing
    /// ramp. No re-trigger; audio keeps running. With nothing live
    /// (Stopped or Paused) there is nothing to update and this is a
    /// no-op.
    pub fn apply_gains(&mut self, gains: &[f32]) {
        debug_assert!(self.handles.is_empty() || gains.len() == self.handles.len());
        for (handle, &gain) in self.handles.iter_mut().zip(gains) {
            if let Some(handle) = handle {
                handle.set_gain(gain, GAIN_RAMP_SECONDS);
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.handles.iter().flatten().count()
    }
}
