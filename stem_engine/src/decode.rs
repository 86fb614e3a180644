use std::path::Path;
use std::sync::Arc;

use hound::SampleFormat;

use crate::song::{AudioBuffer, Song, SongError, SongManifest};

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("failed to read audio file {path}: {source}")]
    ReadError {
        path: String,
        source: hound::Error,
    },

    #[error("unsupported sample format in {path}: {bits} bit {format:?}")]
    UnsupportedFormat {
        path: String,
        bits: u16,
        format: SampleFormat,
    },

    #[error("sample rate mismatch: track {track:?} is {found} Hz, song is {expected} Hz")]
    SampleRateMismatch {
        track: String,
        expected: u32,
        found: u32,
    },

    #[error(transparent)]
    InvalidSong(#[from] SongError),
}

/// Decodes a WAV file into a planar f32 buffer, preserving channel count.
pub fn decode_wav(path: &Path) -> Result<AudioBuffer, DecodeError> {
    let read_error = |source| DecodeError::ReadError {
        path: path.display().to_string(),
        source,
    };

    let mut reader = hound::WavReader::open(path).map_err(read_error)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(read_error)?,
        (SampleFormat::Int, 16 | 24 | 32) => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(read_error)?
        }
        (format, bits) => {
            return Err(DecodeError::UnsupportedFormat {
                path: path.display().to_string(),
                bits,
                format,
            })
        }
    };

    let channel_count = spec.channels as usize;
    let mut channels: Vec<Vec<f32>> = (0..channel_count)
        .map(|_| Vec::with_capacity(interleaved.len() / channel_count))
        .collect();
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    Ok(AudioBuffer::new(channels, spec.sample_rate))
}

/// Decodes every stem named by the manifest. All tracks decode or the
/// whole load fails; a partially decoded song is never returned.
pub fn load_song(manifest: &SongManifest, base_dir: &Path) -> Result<Song, DecodeError> {
    let mut decoded = Vec::with_capacity(manifest.tracks.len());
    let mut song_rate: Option<u32> = None;

    for entry in &manifest.tracks {
        let buffer = decode_wav(&base_dir.join(&entry.source))?;

        match song_rate {
            None => song_rate = Some(buffer.sample_rate()),
            Some(expected) if expected != buffer.sample_rate() => {
                return Err(DecodeError::SampleRateMismatch {
                    track: entry.name.clone(),
                    expected,
                    found: buffer.sample_rate(),
                });
            }
            Some(_) => {}
        }

        decoded.push((entry.name.clone(), Some(Arc::new(buffer))));
    }

    Ok(Song::new(&manifest.id, &manifest.title, decoded)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::song::TrackEntry;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in frames {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_preserves_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, 44100, &[16384, -16384, 0, 8192]);

        let buffer = decode_wav(&path).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2);
        assert!((buffer.sample_mapped(0, 0) - 0.5).abs() < 1e-3);
        assert!((buffer.sample_mapped(1, 0) + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_load_song_aborts_on_missing_stem() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("drums.wav"), 1, 44100, &[0; 10]);

        let manifest = SongManifest {
            id: "s1".to_string(),
            title: "Song".to_string(),
            tracks: vec![
                TrackEntry {
                    name: "Drums".to_string(),
                    source: "drums.wav".to_string(),
                },
                TrackEntry {
                    name: "Vocals".to_string(),
                    source: "vocals.wav".to_string(),
                },
            ],
        };

        assert!(matches!(
            load_song(&manifest, dir.path()),
            Err(DecodeError::ReadError { .. })
        ));
    }

    #[test]
    fn test_load_song_rejects_mixed_sample_rates() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 1, 44100, &[0; 10]);
        write_wav(&dir.path().join("b.wav"), 1, 48000, &[0; 10]);

        let manifest = SongManifest {
            id: "s1".to_string(),
            title: "Song".to_string(),
            tracks: vec![
                TrackEntry {
                    name: "A".to_string(),
                    source: "a.wav".to_string(),
                },
                TrackEntry {
                    name: "B".to_string(),
                    source: "b.wav".to_string(),
                },
            ],
        };

        assert!(matches!(
            load_song(&manifest, dir.path()),
            Err(DecodeError::SampleRateMismatch { .. })
        ));
    }

    #[test]
    fn test_load_song_ready_after_full_decode() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 1, 44100, &[0; 10]);

        let manifest = SongManifest {
            id: "s1".to_string(),
            title: "Song".to_string(),
            tracks: vec![TrackEntry {
                name: "A".to_string(),
                source: "a.wav".to_string(),
            }],
        };

        let song = load_song(&manifest, dir.path()).unwrap();
        assert!(song.ready());
    }
}
