use std::sync::Arc;

/// A chunk of decoded PCM audio, stored planar (one `Vec<f32>` per channel).
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(!channels.is_empty());
        debug_assert!(channels.windows(2).all(|w| w[0].len() == w[1].len()));
        AudioBuffer {
            channels,
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Sample for a given output channel, upmixing a mono buffer by
    /// duplication and folding excess output channels onto the last
    /// source channel. The live output path and the offline renderer both
    /// go through this so their channel mapping cannot diverge.
    pub fn sample_mapped(&self, out_channel: usize, frame: usize) -> f32 {
        let src = out_channel.min(self.channels.len() - 1);
        self.channels[src][frame]
    }
}

/// One stem of a song. The id is the ordinal index in the song's track
/// order and is stable for the lifetime of the song.
#[derive(Debug, Clone)]
pub struct Track {
    id: usize,
    name: String,
    buffer: Option<Arc<AudioBuffer>>,
}

impl Track {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration_seconds())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SongError {
    #[error("a song needs at least one track")]
    NoTracks,
}

/// An immutable set of stems sharing one timeline. The song is only as
/// long as its longest stem; shorter stems simply end early.
#[derive(Debug, Clone)]
pub struct Song {
    id: String,
    title: String,
    tracks: Vec<Track>,
}

impl Song {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        tracks: impl IntoIterator<Item = (String, Option<Arc<AudioBuffer>>)>,
    ) -> Result<Self, SongError> {
        let tracks: Vec<Track> = tracks
            .into_iter()
            .enumerate()
            .map(|(id, (name, buffer))| Track { id, name, buffer })
            .collect();

        if tracks.is_empty() {
            return Err(SongError::NoTracks);
        }

        Ok(Song {
            id: id.into(),
            title: title.into(),
            tracks,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn duration_seconds(&self) -> f64 {
        self.tracks
            .iter()
            .map(Track::duration_seconds)
            .fold(0.0, f64::max)
    }

    /// A song is playable only once every stem has decoded audio.
    pub fn ready(&self) -> bool {
        self.tracks.iter().all(|t| t.buffer.is_some())
    }
}

/// Catalog record describing where a song's stems come from. How the
/// record was produced (static config, folder scan, manifest file) is up
/// to the caller; only the stable track order matters here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SongManifest {
    pub id: String,
    pub title: String,
    pub tracks: Vec<TrackEntry>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackEntry {
    pub name: String,
    pub source: String,
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn buffer(frames: usize, channels: usize, sample_rate: u32) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(vec![vec![0.5f32; frames]; channels], sample_rate))
    }

    #[test]
    fn test_empty_song_rejected() {
        let result = Song::new("s", "Song", Vec::new());
        assert!(matches!(result, Err(SongError::NoTracks)));
    }

    #[test]
    fn test_track_ids_follow_order() {
        let song = Song::new(
            "s",
            "Song",
            vec![
                ("drums".to_string(), Some(buffer(10, 2, 44100))),
                ("vocals".to_string(), Some(buffer(10, 2, 44100))),
            ],
        )
        .unwrap();

        assert_eq!(song.tracks()[0].id(), 0);
        assert_eq!(song.tracks()[0].name(), "drums");
        assert_eq!(song.tracks()[1].id(), 1);
    }

    #[test]
    fn test_duration_is_longest_stem() {
        let song = Song::new(
            "s",
            "Song",
            vec![
                ("short".to_string(), Some(buffer(44100, 1, 44100))),
                ("long".to_string(), Some(buffer(88200, 1, 44100))),
            ],
        )
        .unwrap();

        assert!((song.duration_seconds() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_ready_requires_every_buffer() {
        let song = Song::new(
            "s",
            "Song",
            vec![
                ("a".to_string(), Some(buffer(10, 1, 44100))),
                ("b".to_string(), None),
            ],
        )
        .unwrap();

        assert!(!song.ready());
    }

    #[test]
    fn test_mono_upmix_duplicates() {
        let buf = AudioBuffer::new(vec![vec![0.25f32, 0.75f32]], 44100);
        assert_eq!(buf.sample_mapped(0, 1), 0.75);
        assert_eq!(buf.sample_mapped(1, 1), 0.75);
    }
}
