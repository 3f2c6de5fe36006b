use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::config::{BatchConfig, Bitrate};
use crate::cover::CoverArtState;
use crate::error::{StageError, ToolError};
use crate::tools::MediaTools;
use crate::track::Track;

/// Encodes the track to constant-bitrate opus at its temporary path.
pub fn transcode(track: &Track, bitrate: Bitrate, tools: &impl MediaTools) -> Result<(), StageError> {
    debug!("Transcoding {} at {}", track.display_name(), bitrate);
    tools
        .transcode(track.source(), track.temp_path(), bitrate)
        .map_err(StageError::TranscodeFailed)
}

/// Embeds the resolved cover into `target`.
///
/// Succeeds without doing anything when covers are skipped or none was
/// resolved. The tag tool only sees bare file names inside one directory, so
/// a cover living elsewhere is first copied next to `target`.
pub fn inject(
    cover: &CoverArtState,
    target: &Path,
    config: &BatchConfig,
    tools: &impl MediaTools,
) -> Result<(), StageError> {
    if config.skip_cover_art {
        return Ok(());
    }
    let Some(cover_path) = cover.cover() else {
        return Ok(());
    };

    let dir = target.parent().unwrap_or(Path::new(""));
    let (Some(cover_name), Some(target_name)) = (cover_path.file_name(), target.file_name())
    else {
        return Err(StageError::InjectionFailed(ToolError::Output {
            program: config.tools.tagger.clone(),
            reason: format!("cannot name {:?} or {:?}", cover_path, target),
        }));
    };
    let cover_name = cover_name.to_string_lossy().into_owned();
    let target_name = target_name.to_string_lossy().into_owned();

    let staged = dir.join(&cover_name);
    let needs_staging = cover_path.parent().unwrap_or(Path::new("")) != dir;
    if needs_staging {
        fs::copy(cover_path, &staged).map_err(|e| {
            StageError::InjectionFailed(ToolError::Io {
                path: staged.clone(),
                source: e,
            })
        })?;
    }

    let result = tools.inject_cover(dir, &cover_name, &target_name);
    if needs_staging {
        _ = fs::remove_file(&staged);
    }
    result.map_err(StageError::InjectionFailed)?;
    info!("Embedded cover into {}", target_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::CoverOutcome;
    use crate::testing::{Call, MockTools};

    fn track_in(dir: &Path, name: &str) -> Track {
        let path = dir.join(name);
        fs::write(&path, b"pcm").unwrap();
        Track::new(path, dir.join("out")).unwrap()
    }

    fn cover_state(track: &Track, outcome: CoverOutcome) -> CoverArtState {
        fs::write(track.cropped_cover_path(), b"square").unwrap();
        CoverArtState {
            extracted: track.extracted_cover_path("jpg"),
            cropped: track.cropped_cover_path(),
            outcome,
        }
    }

    #[test]
    fn transcode_writes_temp_file_at_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let track = track_in(dir.path(), "song.flac");
        let bitrate: Bitrate = "96k".parse().unwrap();
        transcode(&track, bitrate, &MockTools::new()).unwrap();
        assert_eq!(fs::read(track.temp_path()).unwrap(), b"opus@96k:pcm");
    }

    #[test]
    fn transcode_failure_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let track = track_in(dir.path(), "song.flac");
        let tools = MockTools::new().fail_transcode("song");
        assert!(matches!(
            transcode(&track, Bitrate::default(), &tools),
            Err(StageError::TranscodeFailed(_))
        ));
    }

    #[test]
    fn unavailable_cover_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let track = track_in(dir.path(), "song.mp3");
        let state = cover_state(&track, CoverOutcome::Unavailable);
        let tools = MockTools::new();
        inject(&state, track.temp_path(), &BatchConfig::default(), &tools).unwrap();
        assert!(tools.calls().is_empty());
    }

    #[test]
    fn skipped_cover_art_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let track = track_in(dir.path(), "song.mp3");
        let state = cover_state(&track, CoverOutcome::Extracted);
        let config = BatchConfig {
            skip_cover_art: true,
            ..Default::default()
        };
        let tools = MockTools::new();
        inject(&state, track.temp_path(), &config, &tools).unwrap();
        assert!(tools.calls().is_empty());
    }

    #[test]
    fn injects_co_located_cover() {
        let dir = tempfile::tempdir().unwrap();
        let track = track_in(dir.path(), "song.mp3");
        transcode(&track, Bitrate::default(), &MockTools::new()).unwrap();
        let state = cover_state(&track, CoverOutcome::Extracted);
        let tools = MockTools::new();
        inject(&state, track.temp_path(), &BatchConfig::default(), &tools).unwrap();
        assert_eq!(
            tools.calls(),
            [Call::Inject {
                track: "song".into(),
                cover: b"square".to_vec(),
            }]
        );
    }

    #[test]
    fn stages_cover_from_another_directory() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let track = track_in(dir.path(), "song.mp3");
        transcode(&track, Bitrate::default(), &MockTools::new()).unwrap();
        let cropped = elsewhere.path().join("song.cover-square.jpg");
        fs::write(&cropped, b"remote").unwrap();
        let state = CoverArtState {
            extracted: elsewhere.path().join("song.cover-extract.jpg"),
            cropped,
            outcome: CoverOutcome::FallbackUsed,
        };
        let tools = MockTools::new();
        inject(&state, track.temp_path(), &BatchConfig::default(), &tools).unwrap();
        assert_eq!(tools.injected(), [("song".to_string(), b"remote".to_vec())]);
        assert!(!dir.path().join("song.cover-square.jpg").exists());
    }

    #[test]
    fn injection_failure_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let track = track_in(dir.path(), "song.mp3");
        transcode(&track, Bitrate::default(), &MockTools::new()).unwrap();
        let state = cover_state(&track, CoverOutcome::Extracted);
        let tools = MockTools::new().fail_inject("song");
        assert!(matches!(
            inject(&state, track.temp_path(), &BatchConfig::default(), &tools),
            Err(StageError::InjectionFailed(_))
        ));
    }
}
