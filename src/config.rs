use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use log::info;
use strum_macros::Display;

use crate::error::Error;

/// Constant audio bitrate in kilobits per second, written as `64k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitrate(u32);

impl Bitrate {
    pub fn from_kbps(kbps: u32) -> Option<Self> {
        (kbps > 0).then_some(Self(kbps))
    }

    #[inline]
    pub fn kbps(&self) -> u32 {
        self.0
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Self(64)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.0)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid bitrate {0:?}, expected a value such as \"64k\"")]
pub struct BitrateParseError(String);

impl FromStr for Bitrate {
    type Err = BitrateParseError;

    /// Accepts `64k`, `64K` or a plain bit count such as `64000`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || BitrateParseError(s.to_string());
        let kbps = match trimmed.strip_suffix(['k', 'K']) {
            Some(digits) => digits.parse::<u32>().map_err(|_| err())?,
            None => {
                let bits = trimmed.parse::<u32>().map_err(|_| err())?;
                if bits % 1000 != 0 {
                    return Err(err());
                }
                bits / 1000
            }
        };
        Bitrate::from_kbps(kbps).ok_or_else(err)
    }
}

/// Whether the tracks of a batch share one album cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BatchKind {
    /// Tracks without art inherit the last good cover of the batch.
    #[default]
    Album,
    /// Every track stands alone; covers are never inherited.
    Collection,
}

/// Names of the external executables the pipeline drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub tagger: String,
    pub downloader: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            tagger: "kid3-cli".to_string(),
            downloader: "yt-dlp".to_string(),
        }
    }
}

/// Settings for one batch run. Built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Target constant bitrate of the opus output
    pub bitrate: Bitrate,
    /// Skip the download step and only finalize what is already in `working_dir`
    pub skip_download: bool,
    /// Neither extract nor embed cover art
    pub skip_cover_art: bool,
    pub kind: BatchKind,
    pub verbose: bool,
    /// Source reference handed to the downloader
    pub source: Option<String>,
    /// Scratch directory holding downloads and in-progress artifacts
    pub working_dir: PathBuf,
    /// Directory receiving finalized tracks
    pub destination_dir: PathBuf,
    /// Number of worker threads. `None` or `Some(1)` processes tracks strictly one by one.
    pub jobs: Option<usize>,
    pub tools: Toolchain,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            bitrate: Bitrate::default(),
            skip_download: false,
            skip_cover_art: false,
            kind: BatchKind::default(),
            verbose: false,
            source: None,
            working_dir: PathBuf::from("."),
            destination_dir: PathBuf::from("."),
            jobs: None,
            tools: Toolchain::default(),
        }
    }
}

impl BatchConfig {
    /// Worker count when parallel processing was requested.
    pub fn parallel_jobs(&self) -> Option<usize> {
        self.jobs.filter(|&n| n > 1)
    }
}

/// Checks the directory layout, creating both directories when absent.
pub fn validate_options(config: &BatchConfig) -> Result<(), Error> {
    for dir in [&config.working_dir, &config.destination_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| Error::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
            info!("Created directory: {:?}", dir);
        } else if !dir.is_dir() {
            return Err(Error::InvalidOptions(format!(
                "Path exists but is not a directory: {:?}",
                dir
            )));
        }
    }
    if config.jobs == Some(0) {
        return Err(Error::InvalidOptions(
            "Number of jobs must be at least 1".to_string(),
        ));
    }
    Ok(())
}
