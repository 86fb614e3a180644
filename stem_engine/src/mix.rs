/// Mix setting for a single track. Mute and solo are independent flags;
/// how they interact is decided globally by [`MixState::effective_gains`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMixState {
    volume: f32,
    muted: bool,
    soloed: bool,
}

impl Default for TrackMixState {
    fn default() -> Self {
        TrackMixState {
            volume: 1.0,
            muted: false,
            soloed: false,
        }
    }
}

impl TrackMixState {
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn soloed(&self) -> bool {
        self.soloed
    }
}

/// Per-track mute/solo/volume state for one song session.
#[derive(Debug, Clone)]
pub struct MixState {
    tracks: Vec<TrackMixState>,
}

impl MixState {
    pub fn new(track_count: usize) -> Self {
        MixState {
            tracks: vec![TrackMixState::default(); track_count],
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> TrackMixState {
        debug_assert!(index < self.tracks.len());
        self.tracks[index]
    }

    /// Mutations address tracks by ordinal index; an index with no
    /// track is ignored.
    pub fn set_volume(&mut self, index: usize, volume: f32) {
        if let Some(track) = self.tracks.get_mut(index) {
            track.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn toggle_mute(&mut self, index: usize) {
        if let Some(track) = self.tracks.get_mut(index) {
            track.muted = !track.muted;
        }
    }

    pub fn toggle_solo(&mut self, index: usize) {
        if let Some(track) = self.tracks.get_mut(index) {
            track.soloed = !track.soloed;
        }
    }

    pub fn reset(&mut self) {
        self.tracks.fill(TrackMixState::default());
    }

    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.soloed)
    }

    /// Resolves mute/solo/volume into one playback gain per track. While
    /// any solo is active only soloed tracks are audible, and their mute
    /// flag is irrelevant; otherwise mute gates each track individually.
    /// Toggling solo on one track changes the audibility of every other
    /// track, so this is always a full pass over the set, never a
    /// single-track patch.
    pub fn effective_gains(&self) -> Vec<f32> {
        let any_solo = self.any_solo();
        self.tracks
            .iter()
            .map(|t| {
                let audible = if any_solo { t.soloed } else { !t.muted };
                if audible {
                    t.volume
                } else {
                    0.0
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> MixSnapshot {
        MixSnapshot {
            volumes: self.tracks.iter().map(|t| t.volume).collect(),
            muted: self.tracks.iter().map(|t| t.muted).collect(),
            soloed: self.tracks.iter().map(|t| t.soloed).collect(),
        }
    }

    /// Restores a persisted snapshot. A snapshot whose arrays do not
    /// match the song's track count is ignored and defaults apply, since
    /// the stems it described are not the stems we have.
    pub fn from_snapshot(snapshot: &MixSnapshot, track_count: usize) -> Self {
        if snapshot.volumes.len() != track_count
            || snapshot.muted.len() != track_count
            || snapshot.soloed.len() != track_count
        {
            return MixState::new(track_count);
        }

        let tracks = (0..track_count)
            .map(|i| TrackMixState {
                volume: snapshot.volumes[i].clamp(0.0, 1.0),
                muted: snapshot.muted[i],
                soloed: snapshot.soloed[i],
            })
            .collect();

        MixState { tracks }
    }
}

/// The persisted unit: mix settings aligned to the song's track order,
/// keyed by song id in an external store.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MixSnapshot {
    pub volumes: Vec<f32>,
    pub muted: Vec<bool>,
    pub soloed: Vec<bool>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_all_audible_at_unity() {
        let mix = MixState::new(3);
        assert_eq!(mix.effective_gains(), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_mute_silences_track() {
        let mut mix = MixState::new(3);
        mix.toggle_mute(1);
        assert_eq!(mix.effective_gains(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_solo_silences_everyone_else() {
        let mut mix = MixState::new(3);
        mix.set_volume(2, 0.5);
        mix.toggle_solo(2);
        assert_eq!(mix.effective_gains(), vec![0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_muted_and_soloed_track_is_audible() {
        // Solo wins: while solo is active, mute on a soloed track does
        // not silence it.
        let mut mix = MixState::new(2);
        mix.toggle_mute(0);
        mix.toggle_solo(0);
        assert_eq!(mix.effective_gains(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_gains_match_resolution_table() {
        let mut mix = MixState::new(4);
        mix.set_volume(0, 0.8);
        mix.toggle_mute(1);
        mix.toggle_solo(2);
        mix.toggle_solo(3);
        mix.toggle_mute(3);
        mix.set_volume(3, 0.25);

        let any_solo = mix.any_solo();
        assert!(any_solo);

        let expected: Vec<f32> = (0..4)
            .map(|i| {
                let t = mix.track(i);
                let audible = if any_solo { t.soloed() } else { !t.muted() };
                if audible {
                    t.volume()
                } else {
                    0.0
                }
            })
            .collect();

        assert_eq!(mix.effective_gains(), expected);
        assert_eq!(mix.effective_gains(), vec![0.0, 0.0, 1.0, 0.25]);
    }

    #[test]
    fn test_toggles_are_involutions() {
        let mut mix = MixState::new(2);
        mix.toggle_mute(0);
        mix.toggle_mute(0);
        assert!(!mix.track(0).muted());

        mix.toggle_solo(1);
        mix.toggle_solo(1);
        assert!(!mix.track(1).soloed());
    }

    #[test]
    fn test_volume_clamped() {
        let mut mix = MixState::new(1);
        mix.set_volume(0, 1.7);
        assert_eq!(mix.track(0).volume(), 1.0);
        mix.set_volume(0, -0.3);
        assert_eq!(mix.track(0).volume(), 0.0);
    }

    #[test]
    fn test_out_of_range_mutation_is_ignored() {
        let mut mix = MixState::new(2);
        mix.toggle_mute(5);
        mix.toggle_solo(17);
        mix.set_volume(2, 0.5);
        assert_eq!(mix.effective_gains(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut mix = MixState::new(2);
        mix.toggle_mute(0);
        mix.toggle_solo(1);
        mix.set_volume(1, 0.2);
        mix.reset();
        assert_eq!(mix.effective_gains(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut mix = MixState::new(3);
        mix.toggle_mute(0);
        mix.toggle_solo(2);
        mix.set_volume(1, 0.4);

        let restored = MixState::from_snapshot(&mix.snapshot(), 3);
        assert_eq!(restored.effective_gains(), mix.effective_gains());
        assert_eq!(restored.track(0).muted(), true);
        assert_eq!(restored.track(2).soloed(), true);
    }

    #[test]
    fn test_snapshot_shape_mismatch_falls_back_to_defaults() {
        let snapshot = MixSnapshot {
            volumes: vec![0.5, 0.5],
            muted: vec![true, false],
            soloed: vec![false, false],
        };

        let mix = MixState::from_snapshot(&snapshot, 3);
        assert_eq!(mix.effective_gains(), vec![1.0, 1.0, 1.0]);
    }
}
