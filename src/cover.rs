use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use strum_macros::Display;

use crate::config::{BatchConfig, BatchKind};
use crate::error::{StageError, ToolError};
use crate::report::ErrorTracker;
use crate::tools::MediaTools;
use crate::track::{BATCH_COVER_NAME, BATCH_COVER_STAGING_NAME, Track};

/// Edge length of every finished cover.
pub const COVER_SIZE: u32 = 512;
/// Extension used when the cover codec cannot be determined.
pub const DEFAULT_COVER_EXTENSION: &str = "jpg";

/// Pixel size of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A centered square cut, scaled to [`COVER_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareCrop {
    pub side: u32,
    pub x: u32,
    pub y: u32,
}

impl SquareCrop {
    /// The largest centered square of `dims`, or `None` for an empty image.
    pub fn centered(dims: Dimensions) -> Option<Self> {
        let side = dims.width.min(dims.height);
        if side == 0 {
            return None;
        }
        Some(Self {
            side,
            x: (dims.width - side) / 2,
            y: (dims.height - side) / 2,
        })
    }

    /// ffmpeg video filter performing the crop and the resize.
    pub fn filter(&self) -> String {
        format!(
            "crop={side}:{side}:{x}:{y},scale={COVER_SIZE}:{COVER_SIZE}",
            side = self.side,
            x = self.x,
            y = self.y
        )
    }
}

/// Maps a probed picture codec to the extension of the extracted file.
pub fn cover_extension(codec: Option<&str>) -> &'static str {
    match codec {
        Some("mjpeg") | Some("jpeg") => "jpg",
        Some("png") => "png",
        Some("webp") => "webp",
        Some("bmp") => "bmp",
        _ => DEFAULT_COVER_EXTENSION,
    }
}

/// How a track's cover was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CoverOutcome {
    Extracted,
    FallbackUsed,
    Unavailable,
}

/// Per-track artwork state, discarded once the track is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArtState {
    pub extracted: PathBuf,
    pub cropped: PathBuf,
    pub outcome: CoverOutcome,
}

impl CoverArtState {
    fn unavailable(extracted: PathBuf, cropped: PathBuf) -> Self {
        Self {
            extracted,
            cropped,
            outcome: CoverOutcome::Unavailable,
        }
    }

    /// The square cover to embed, if one was resolved.
    pub fn cover(&self) -> Option<&Path> {
        match self.outcome {
            CoverOutcome::Extracted | CoverOutcome::FallbackUsed => Some(&self.cropped),
            CoverOutcome::Unavailable => None,
        }
    }

    /// Every transient file this state may have produced.
    pub fn transient_files(&self) -> [&Path; 2] {
        [&self.extracted, &self.cropped]
    }
}

/// The last cover that passed cropping, kept for tracks without art of their own.
///
/// The cover is copied into a fixed file of the working directory, so it
/// outlives the cleanup of the track that produced it.
#[derive(Debug)]
pub struct BatchCoverMemory {
    slot: PathBuf,
    filled: bool,
}

impl BatchCoverMemory {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            slot: working_dir.as_ref().join(BATCH_COVER_NAME),
            filled: false,
        }
    }

    /// Path of the remembered cover, once any track produced one.
    pub fn fallback(&self) -> Option<&Path> {
        self.filled.then_some(self.slot.as_path())
    }

    /// Replaces the remembered cover. On error the previous cover is kept.
    pub fn remember(&mut self, cropped: &Path) -> io::Result<()> {
        let staging = self.slot.with_file_name(BATCH_COVER_STAGING_NAME);
        fs::copy(cropped, &staging)?;
        if let Err(e) = fs::rename(&staging, &self.slot) {
            _ = fs::remove_file(&staging);
            return Err(e);
        }
        self.filled = true;
        Ok(())
    }

    /// Removes the remembered cover at the end of a batch.
    pub fn discard(self) {
        if self.filled {
            if let Err(e) = fs::remove_file(&self.slot) {
                debug!("Could not remove {:?}: {}", self.slot, e);
            }
        }
    }
}

/// Determines the cover for `track`: its own art, the batch fallback, or none.
///
/// Never fails. Missing art is a valid result; a failed crop or a failed
/// hand-over of the batch cover is recorded in `tracker`. In album mode a
/// successful crop becomes the new fallback.
pub fn resolve(
    track: &Track,
    config: &BatchConfig,
    memory: &mut BatchCoverMemory,
    tools: &impl MediaTools,
    tracker: &mut ErrorTracker,
) -> CoverArtState {
    let name = track.display_name();
    let cropped = track.cropped_cover_path();
    if config.skip_cover_art {
        return CoverArtState::unavailable(
            track.extracted_cover_path(DEFAULT_COVER_EXTENSION),
            cropped,
        );
    }

    let (extracted, outcome) = match extract(track, tools) {
        Ok(extracted) => (extracted, CoverOutcome::Extracted),
        Err(e) => {
            debug!("{}: {}", name, e);
            let slot = track.extracted_cover_path(DEFAULT_COVER_EXTENSION);
            let fallback = match config.kind {
                BatchKind::Album => memory.fallback(),
                BatchKind::Collection => None,
            };
            let Some(fallback) = fallback else {
                info!("{}: no cover art available", name);
                return CoverArtState::unavailable(slot, cropped);
            };
            if let Err(e) = fs::copy(fallback, &slot) {
                let e = StageError::FallbackFailed(ToolError::Io {
                    path: fallback.to_path_buf(),
                    source: e,
                });
                warn!("{}: {}", name, e);
                tracker.record(track, &e);
                return CoverArtState::unavailable(slot, cropped);
            }
            info!("{}: using the batch cover", name);
            (slot, CoverOutcome::FallbackUsed)
        }
    };

    if let Err(e) = crop(&extracted, &cropped, tools) {
        warn!("{}: {}", name, e);
        tracker.record(track, &e);
        return CoverArtState::unavailable(extracted, cropped);
    }

    if config.kind == BatchKind::Album {
        if let Err(e) = memory.remember(&cropped) {
            let e = StageError::FallbackFailed(ToolError::Io {
                path: memory.slot.clone(),
                source: e,
            });
            warn!("{}: {}", name, e);
            tracker.record(track, &e);
        }
    }

    CoverArtState {
        extracted,
        cropped,
        outcome,
    }
}

fn extract(track: &Track, tools: &impl MediaTools) -> Result<PathBuf, StageError> {
    let codec = match tools.probe_cover_codec(track.source()) {
        Ok(codec) => codec,
        Err(e) => {
            debug!("Cover probe failed for {:?}: {}", track.source(), e);
            None
        }
    };
    let extracted = track.extracted_cover_path(cover_extension(codec.as_deref()));
    if let Err(e) = tools.extract_cover(track.source(), &extracted) {
        _ = fs::remove_file(&extracted);
        return Err(StageError::ExtractionFailed(e));
    }
    Ok(extracted)
}

fn crop(extracted: &Path, cropped: &Path, tools: &impl MediaTools) -> Result<(), StageError> {
    let dims = tools
        .probe_dimensions(extracted)
        .map_err(StageError::CropFailed)?;
    let square = SquareCrop::centered(dims).ok_or_else(|| {
        StageError::CropFailed(ToolError::Output {
            program: "ffprobe".to_string(),
            reason: format!("{}x{} image has no area", dims.width, dims.height),
        })
    })?;
    tools
        .crop_cover(extracted, cropped, &square)
        .map_err(StageError::CropFailed)
}
