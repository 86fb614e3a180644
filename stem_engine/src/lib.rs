mod decode;
mod mix;
mod output;
mod render;
mod scheduler;
mod session;
mod song;
mod source_set;
mod store;
mod transport;

pub use decode::{decode_wav, load_song, DecodeError};
pub use mix::{MixSnapshot, MixState, TrackMixState};
pub use output::CpalOutput;
pub use render::{export_song_wav, render_mixdown, CancelToken, Mixdown, RenderError};
pub use scheduler::{Scheduler, SchedulerError, SourceHandle, GAIN_RAMP_SECONDS};
pub use session::PlayerSession;
pub use song::{AudioBuffer, Song, SongError, SongManifest, Track, TrackEntry};
pub use source_set::SourceSet;
pub use store::{JsonMixStore, MemoryMixStore, MixStore, StoreError};
pub use transport::{Phase, Transport, END_EPSILON_SECONDS};

/// Replaces characters that are unsafe in file names across platforms.
pub(crate) fn sanitize_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.trim().is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}
