use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dasp::sample::Sample;

use crate::mix::MixState;
use crate::song::Song;

/// How often the renderer polls its cancel token mid-track.
const CANCEL_CHECK_FRAMES: usize = 65536;

/// Gains at or below this threshold contribute nothing and are skipped
/// wholesale.
const SILENCE_GAIN: f32 = 1e-6;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("no song loaded to render")]
    NoSong,

    #[error("track {name:?} has no decoded audio to render")]
    SourceMissing { name: String },

    #[error("render cancelled")]
    Cancelled,

    #[error("failed to write mixdown: {0}")]
    WriteError(#[from] hound::Error),
}

/// Cooperative cancellation flag shared between the caller and a
/// long-running render. A new render or song load supersedes the
/// previous token by cancelling it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The rendered mix: interleaved f32 frames plus the container
/// parameters needed to write them out.
#[derive(Debug, Clone, PartialEq)]
pub struct Mixdown {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Offline render of the whole song through the current mix.
///
/// Independent of the live transport: every track starts at frame 0 and
/// per-track gain is re-derived from the mix state here, so the output
/// matches what the live paths would have played with the same settings.
/// Deterministic: identical inputs produce byte-identical output.
pub fn render_mixdown(
    song: &Song,
    mix: &MixState,
    cancel: &CancelToken,
) -> Result<Mixdown, RenderError> {
    // Validate every stem up front; a track that was expected to
    // contribute must never be silently replaced by silence.
    let mut stems = Vec::with_capacity(song.tracks().len());
    for track in song.tracks() {
        let buffer = track.buffer().ok_or_else(|| RenderError::SourceMissing {
            name: track.name().to_string(),
        })?;
        stems.push(buffer);
    }

    let gains = mix.effective_gains();
    let sample_rate = stems[0].sample_rate();
    let channels = stems.iter().map(|b| b.channel_count()).max().unwrap_or(1);
    let frames = stems.iter().map(|b| b.frames()).max().unwrap_or(0);

    let mut samples = vec![0.0f32; frames * channels];
    for (buffer, &gain) in stems.iter().zip(&gains) {
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        if gain <= SILENCE_GAIN {
            continue;
        }

        for (n, frame) in samples
            .chunks_exact_mut(channels)
            .take(buffer.frames())
            .enumerate()
        {
            if n % CANCEL_CHECK_FRAMES == 0 && cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            for (c, out) in frame.iter_mut().enumerate() {
                // Clip into range as the sample is written, not on read.
                *out = (*out + buffer.sample_mapped(c, n) * gain).clamp(-1.0, 1.0);
            }
        }
    }

    Ok(Mixdown {
        channels: channels as u16,
        sample_rate,
        samples,
    })
}

/// Renders the song and writes it as a 16-bit signed interleaved WAV
/// under `dir`, named after the song title. Returns the written path.
pub fn export_song_wav(
    song: &Song,
    mix: &MixState,
    dir: &Path,
    cancel: &CancelToken,
) -> Result<PathBuf, RenderError> {
    let mixdown = render_mixdown(song, mix, cancel)?;

    let spec = hound::WavSpec {
        channels: mixdown.channels,
        sample_rate: mixdown.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let path = dir.join(format!("{}.wav", crate::sanitize_component(song.title())));
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &sample in &mixdown.samples {
        writer.write_sample(sample.to_sample::<i16>())?;
    }
    writer.finalize()?;

    log::info!("wrote mixdown of {:?} to {}", song.title(), path.display());
    Ok(path)
}
