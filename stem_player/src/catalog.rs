use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use stem_engine::{SongManifest, TrackEntry};

/// Builds the song manifest for one directory. An explicit `song.json`
/// wins; otherwise every `.wav` file in the directory becomes a track,
/// in sorted filename order so the track order is stable across runs.
pub fn discover_song(dir: &Path) -> anyhow::Result<SongManifest> {
    let manifest_path = dir.join("song.json");
    if manifest_path.exists() {
        let raw = fs::read_to_string(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let manifest: SongManifest = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;
        if manifest.tracks.is_empty() {
            bail!("{} lists no tracks", manifest_path.display());
        }
        return Ok(manifest);
    }

    let mut sources: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let is_wav = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
            if is_wav && path.is_file() {
                Some(path.file_name()?.to_string_lossy().into_owned())
            } else {
                None
            }
        })
        .collect();
    sources.sort();

    if sources.is_empty() {
        bail!("no song.json and no .wav files in {}", dir.display());
    }

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "song".to_string());

    Ok(SongManifest {
        id: name.clone(),
        title: name,
        tracks: sources
            .into_iter()
            .map(|source| {
                let name = source.trim_end_matches(".wav").trim_end_matches(".WAV");
                TrackEntry {
                    name: name.to_string(),
                    source,
                }
            })
            .collect(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scan_orders_tracks_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["02-vocals.wav", "01-drums.wav", "notes.txt"] {
            fs::write(dir.path().join(file), b"").unwrap();
        }

        let manifest = discover_song(dir.path()).unwrap();
        assert_eq!(manifest.tracks.len(), 2);
        assert_eq!(manifest.tracks[0].name, "01-drums");
        assert_eq!(manifest.tracks[1].name, "02-vocals");
    }

    #[test]
    fn test_explicit_manifest_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("extra.wav"), b"").unwrap();
        fs::write(
            dir.path().join("song.json"),
            r#"{"id":"s1","title":"My Song","tracks":[{"name":"Drums","source":"drums.wav"}]}"#,
        )
        .unwrap();

        let manifest = discover_song(dir.path()).unwrap();
        assert_eq!(manifest.id, "s1");
        assert_eq!(manifest.tracks.len(), 1);
        assert_eq!(manifest.tracks[0].source, "drums.wav");
    }

    #[test]
    fn test_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_song(dir.path()).is_err());
    }
}
