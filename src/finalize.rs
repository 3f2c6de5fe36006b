use std::fs;
use std::io;
use std::path::Path;

use log::{debug, info, warn};

use crate::cover::CoverArtState;
use crate::error::StageError;
use crate::tools::MediaTools;
use crate::track::Track;

/// Whether a transcoded file may replace its original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected,
}

/// Checks the structural integrity of a transcoded file.
pub fn verify(temp_path: &Path, tools: &impl MediaTools) -> Result<(), StageError> {
    tools
        .verify(temp_path)
        .map_err(|e| StageError::VerificationFailed {
            path: temp_path.to_path_buf(),
            source: e,
        })
}

/// Removes the track's cover artifacts, then, only if approved, moves the
/// transcoded file into place and deletes the original.
///
/// A rejected track keeps both its original and its temporary file.
pub fn finalize(track: &Track, cover: &CoverArtState, verdict: Verdict) -> Result<(), StageError> {
    for path in cover.transient_files() {
        remove_if_present(path);
    }

    match verdict {
        Verdict::Rejected => {
            debug!("Keeping original {:?}", track.source());
            Ok(())
        }
        Verdict::Approved => {
            move_into_place(track.temp_path(), track.destination()).map_err(|e| {
                StageError::FinalizeFailed {
                    from: track.temp_path().to_path_buf(),
                    source: e,
                }
            })?;
            // Re-encoding an opus in place leaves source and destination identical.
            if track.source() != track.destination() {
                remove_if_present(track.source());
            }
            info!("Finalized {:?}", track.destination());
            Ok(())
        }
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {:?}: {}", path, e),
    }
}

/// Renames `from` over `to`. Across filesystems the file is copied next to
/// `to` first, so `to` is only ever replaced by a complete file. Any other
/// rename failure is returned as is.
fn move_into_place(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        // EXDEV is 18 on Linux
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) => {
            debug!("{:?} is on another filesystem, copying", to);
        }
        Err(e) => return Err(e),
    }
    let file_name = to.file_name().unwrap_or_default().to_string_lossy();
    let staging = to.with_file_name(format!(".{file_name}.part"));
    if let Err(e) = fs::copy(from, &staging).and_then(|_| fs::rename(&staging, to)) {
        _ = fs::remove_file(&staging);
        return Err(e);
    }
    fs::remove_file(from)
}
