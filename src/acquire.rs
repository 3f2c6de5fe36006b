//! Dependency checks and the download step that run before finalization.
//!
//! Failures here are fatal: the batch never starts.

use std::process::Command;

use log::info;

use crate::config::BatchConfig;
use crate::error::Error;
use crate::tools::run;

/// Tools the configured run will invoke, paired with a harmless probe flag.
fn required_tools(config: &BatchConfig) -> Vec<(&str, &'static str)> {
    let tools = &config.tools;
    let mut required = vec![
        (tools.ffmpeg.as_str(), "-version"),
        (tools.ffprobe.as_str(), "-version"),
    ];
    if !config.skip_cover_art {
        required.push((tools.tagger.as_str(), "--help"));
    }
    if !config.skip_download {
        required.push((tools.downloader.as_str(), "--version"));
    }
    required
}

/// Fails with [`Error::DependencyMissing`] on the first tool that cannot run.
pub fn check_dependencies(config: &BatchConfig) -> Result<(), Error> {
    for (tool, flag) in required_tools(config) {
        run(tool, Command::new(tool).arg(flag)).map_err(|e| Error::DependencyMissing {
            tool: tool.to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// Downloads the configured source into the working directory as audio.
pub fn download(config: &BatchConfig) -> Result<(), Error> {
    if config.skip_download {
        info!("Skipping download, finalizing existing files.");
        return Ok(());
    }
    let source = config
        .source
        .as_deref()
        .ok_or_else(|| Error::AcquisitionFailed("no source given".to_string()))?;

    info!("Downloading {} into {:?}...", source, config.working_dir);
    let downloader = &config.tools.downloader;
    let mut command = Command::new(downloader);
    command
        .args(["--extract-audio", "--embed-metadata", "--embed-thumbnail"])
        .args(["--output", "%(title)s.%(ext)s"])
        .arg("--paths")
        .arg(&config.working_dir);
    if !config.verbose {
        command.arg("--quiet");
    }
    command.arg(source);
    run(downloader, &mut command).map_err(|e| Error::AcquisitionFailed(e.to_string()))?;
    Ok(())
}
