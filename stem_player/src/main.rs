mod catalog;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use stem_engine::{
    load_song, CpalOutput, JsonMixStore, Phase, PlayerSession, Song,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let dir = std::env::args()
        .nth(1)
        .context("usage: stem_player <song-directory>")?;
    let dir = PathBuf::from(dir);

    let manifest = catalog::discover_song(&dir)?;
    log::info!("discovered {:?} in {}", manifest.title, dir.display());
    println!(
        "decoding {:?} ({} tracks)...",
        manifest.title,
        manifest.tracks.len()
    );

    // Every stem decodes before play is offered; a half-loaded song is
    // never playable.
    let song = load_song(&manifest, &dir)?;

    let output = CpalOutput::new()?;
    let store = JsonMixStore::new(dir.join(".stemmix"));
    let mut session = PlayerSession::new(output, store);
    session.load_song(song);

    print_tracks(&session);
    println!("commands: play pause stop seek <0..1> mute <n> solo <n> vol <n> <0..1> reset export status quit");

    let stdin = io::stdin();
    loop {
        // Polled refresh: end-of-song detection happens here.
        let position = session.tick();
        print!("[{:?} {:6.2}s] > ", session.phase(), position);
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["play"] => session.play(),
            ["pause"] => session.pause(),
            ["stop"] => session.stop(),
            ["seek", target] => match target.parse::<f64>() {
                Ok(normalized) => session.seek(normalized),
                Err(_) => println!("seek wants a number in 0..1"),
            },
            ["mute", index] => with_track(&mut session, index, |s, i| s.toggle_mute(i)),
            ["solo", index] => with_track(&mut session, index, |s, i| s.toggle_solo(i)),
            ["vol", index, volume] => match volume.parse::<f32>() {
                Ok(volume) => {
                    with_track(&mut session, index, |s, i| s.set_volume(i, volume))
                }
                Err(_) => println!("vol wants a number in 0..1"),
            },
            ["reset"] => session.reset_mix(),
            ["export"] => match session.export_mixdown(&dir) {
                Ok(path) => println!("wrote {}", path.display()),
                Err(e) => println!("export failed: {e}"),
            },
            ["status"] => print_tracks(&session),
            ["quit"] | ["q"] => break,
            [] => {}
            _ => println!("unknown command"),
        }
    }

    session.stop();
    log::info!("session closed");
    Ok(())
}

fn with_track<S, M, F>(session: &mut PlayerSession<S, M>, index: &str, apply: F)
where
    S: stem_engine::Scheduler,
    M: stem_engine::MixStore,
    F: FnOnce(&mut PlayerSession<S, M>, usize),
{
    let track_count = session.song().map_or(0, |s: &Song| s.tracks().len());
    match index.parse::<usize>() {
        Ok(i) if i < track_count => apply(session, i),
        _ => println!("track index must be 0..{track_count}"),
    }
}

fn print_tracks<S: stem_engine::Scheduler, M: stem_engine::MixStore>(
    session: &PlayerSession<S, M>,
) {
    let Some(song) = session.song() else {
        println!("no song loaded");
        return;
    };

    println!(
        "{} - {:.1}s{}",
        song.title(),
        song.duration_seconds(),
        if session.phase() == Phase::Playing {
            " (playing)"
        } else {
            ""
        }
    );
    for track in song.tracks() {
        let state = session.mix().track(track.id());
        println!(
            "  [{}] {:24} vol {:.2}{}{}",
            track.id(),
            track.name(),
            state.volume(),
            if state.muted() { "  MUTE" } else { "" },
            if state.soloed() { "  SOLO" } else { "" },
        );
    }
}
