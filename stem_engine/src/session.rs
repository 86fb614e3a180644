use std::path::{Path, PathBuf};

use crate::mix::MixState;
use crate::render::{export_song_wav, render_mixdown, CancelToken, Mixdown, RenderError};
use crate::scheduler::Scheduler;
use crate::song::Song;
use crate::source_set::SourceSet;
use crate::store::MixStore;
use crate::transport::{Phase, Transport};

/// One active song with its transport, mix state and live sources. The
/// caller owns the session; several can coexist, each with their own
/// scheduler and store.
pub struct PlayerSession<S: Scheduler, M: MixStore> {
    scheduler: S,
    store: M,
    song: Option<Song>,
    mix: MixState,
    transport: Transport,
    sources: SourceSet,
    render_cancel: Option<CancelToken>,
}

impl<S: Scheduler, M: MixStore> PlayerSession<S, M> {
    pub fn new(scheduler: S, store: M) -> Self {
        PlayerSession {
            scheduler,
            store,
            song: None,
            mix: MixState::new(0),
            transport: Transport::new(0.0),
            sources: SourceSet::new(),
            render_cancel: None,
        }
    }

    /// Replaces the active song: live sources are torn down, any
    /// in-flight render is cancelled, the transport resets to the start
    /// and mix settings come back from the store (defaults if absent).
    pub fn load_song(&mut self, song: Song) {
        self.cancel_render();
        self.sources.stop_all();
        self.transport = Transport::new(song.duration_seconds());

        self.mix = match self.store.load(song.id()) {
            Ok(Some(snapshot)) => MixState::from_snapshot(&snapshot, song.tracks().len()),
            Ok(None) => {
                // First visit: seed the store with defaults.
                let mix = MixState::new(song.tracks().len());
                if let Err(e) = self.store.save(song.id(), &mix.snapshot()) {
                    log::warn!("failed to persist mix settings for {:?}: {e}", song.id());
                }
                mix
            }
            Err(e) => {
                log::warn!("failed to read mix settings for {:?}: {e}", song.id());
                MixState::new(song.tracks().len())
            }
        };

        log::info!(
            "loaded {:?}: {} tracks, {:.1}s",
            song.title(),
            song.tracks().len(),
            song.duration_seconds()
        );
        self.song = Some(song);
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn mix(&self) -> &MixState {
        &self.mix
    }

    pub fn phase(&self) -> Phase {
        self.transport.phase()
    }

    pub fn duration(&self) -> f64 {
        self.transport.duration()
    }

    /// Observed playhead position on the device clock.
    pub fn position(&self) -> f64 {
        self.transport.position(self.scheduler.now())
    }

    /// Whether playback can start: a loaded song with every stem
    /// decoded. Partial readiness is not a valid play state.
    pub fn ready(&self) -> bool {
        self.song.as_ref().is_some_and(Song::ready)
    }

    /// Starts (or resumes) playback from the current position. No-op
    /// while already Playing or before every stem has decoded.
    pub fn play(&mut self) {
        if self.transport.phase() == Phase::Playing || !self.ready() {
            return;
        }
        let Some(song) = &self.song else { return };

        let now = self.scheduler.now();
        let offset = self.transport.position(now);
        let gains = self.mix.effective_gains();
        self.sources.create_all(&mut self.scheduler, song, &gains, offset);
        self.transport.begin(now);
        log::debug!("playing from {offset:.3}s");
    }

    /// Freezes the playhead and silences all sources. No-op unless
    /// Playing.
    pub fn pause(&mut self) {
        if self.transport.phase() != Phase::Playing {
            return;
        }
        self.transport.pause(self.scheduler.now());
        self.sources.stop_all();
        log::debug!("paused at {:.3}s", self.position());
    }

    /// Unconditional: silences everything and rewinds to the start.
    pub fn stop(&mut self) {
        self.sources.stop_all();
        self.transport.stop();
    }

    /// Moves the playhead to `normalized` (0 = start, 1 = end, clamped).
    /// While Playing every source is re-triggered at the new offset; old
    /// voices are fully stopped before new ones start.
    pub fn seek(&mut self, normalized: f64) {
        let now = self.scheduler.now();
        let position = self.transport.seek_normalized(normalized, now);

        if self.transport.phase() == Phase::Playing {
            let Some(song) = &self.song else { return };
            let gains = self.mix.effective_gains();
            self.sources
                .create_all(&mut self.scheduler, song, &gains, position);
        }
    }

    /// Poll from the owning loop once per refresh. Returns the observed
    /// position; when playback has reached the end of the song this is
    /// the one place that detects it and stops.
    pub fn tick(&mut self) -> f64 {
        let now = self.scheduler.now();
        if self.transport.finished(now) {
            log::debug!("end of song reached");
            self.stop();
            return 0.0;
        }
        self.transport.position(now)
    }

    pub fn set_volume(&mut self, track: usize, volume: f32) {
        self.mix.set_volume(track, volume);
        self.mix_changed();
    }

    pub fn toggle_mute(&mut self, track: usize) {
        self.mix.toggle_mute(track);
        self.mix_changed();
    }

    pub fn toggle_solo(&mut self, track: usize) {
        self.mix.toggle_solo(track);
        self.mix_changed();
    }

    pub fn reset_mix(&mut self) {
        self.mix.reset();
        self.mix_changed();
    }

    /// Every mutation runs a full resolution pass over all tracks (solo
    /// is global state) and persists the result. A store failure is
    /// logged and playback continues.
    fn mix_changed(&mut self) {
        let gains = self.mix.effective_gains();
        self.sources.apply_gains(&gains);

        if let Some(song) = &self.song {
            if let Err(e) = self.store.save(song.id(), &self.mix.snapshot()) {
                log::warn!("failed to persist mix settings for {:?}: {e}", song.id());
            }
        }
    }

    /// Hands out a token for a render started by the caller, cancelling
    /// whatever render was in flight before it.
    pub fn begin_render(&mut self) -> CancelToken {
        self.cancel_render();
        let token = CancelToken::new();
        self.render_cancel = Some(token.clone());
        token
    }

    fn cancel_render(&mut self) {
        if let Some(token) = self.render_cancel.take() {
            token.cancel();
        }
    }

    /// Offline render of the current song through the current mix.
    pub fn render_mixdown(&mut self) -> Result<Mixdown, RenderError> {
        let token = self.begin_render();
        let Some(song) = &self.song else {
            return Err(RenderError::NoSong);
        };
        render_mixdown(song, &self.mix, &token)
    }

    /// Renders and writes the mixdown WAV under `dir`.
    pub fn export_mixdown(&mut self, dir: &Path) -> Result<PathBuf, RenderError> {
        let token = self.begin_render();
        let Some(song) = &self.song else {
            return Err(RenderError::NoSong);
        };
        export_song_wav(song, &self.mix, dir, &token)
    }
}
