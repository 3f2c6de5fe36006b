//! Scripted stand-in for the external tools, for tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::Bitrate;
use crate::cover::{Dimensions, SquareCrop};
use crate::error::ToolError;
use crate::tools::{MediaTools, ensure_nonempty};
use crate::track::{EXTRACT_MARKER, SQUARE_MARKER, TEMP_MARKER};

/// A recorded tool invocation, keyed by track base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ProbeCover(String),
    Extract(String),
    ProbeDimensions(String),
    Crop(String),
    Transcode(String),
    /// Cover bytes as they were at injection time.
    Inject { track: String, cover: Vec<u8> },
    Verify(String),
}

/// Mock implementation of [`MediaTools`].
///
/// Works on real files so the filesystem side of the pipeline can be checked:
/// - extraction writes `cover of <base name>` for tracks given a cover
/// - cropping copies its input unchanged
/// - transcoding writes `opus@<bitrate>:` followed by the source bytes
/// - any stage can be scripted to fail for a given base name
///
/// # Example
///
/// ```rust,ignore
/// let tools = MockTools::new().with_cover("01 intro", "mjpeg").fail_verify("02 outro");
/// let summary = run_batch(&config, &tools)?;
/// assert_eq!(summary.errors.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTools {
    covers: HashMap<String, String>,
    dimensions: Option<Dimensions>,
    fail_crop: HashSet<String>,
    fail_transcode: HashSet<String>,
    fail_inject: HashSet<String>,
    fail_verify: HashSet<String>,
    calls: Mutex<Vec<Call>>,
}

/// Base name of the track a working-directory file belongs to.
fn track_key(path: &Path) -> String {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    for marker in [TEMP_MARKER, EXTRACT_MARKER, SQUARE_MARKER] {
        if let Some((file_name, _)) = name.split_once(marker) {
            return Path::new(file_name)
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned();
        }
    }
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

fn scripted_failure(program: &str, key: &str) -> ToolError {
    ToolError::Status {
        program: program.to_string(),
        status: "exit status: 1".to_string(),
        stderr: format!("scripted failure for {key}"),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ToolError {
    ToolError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl MockTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives the track `base_name` an embedded picture of `codec`.
    pub fn with_cover(mut self, base_name: &str, codec: &str) -> Self {
        self.covers.insert(base_name.to_string(), codec.to_string());
        self
    }

    /// Size reported for every probed image (800x600 by default).
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some(Dimensions { width, height });
        self
    }

    pub fn fail_crop(mut self, base_name: &str) -> Self {
        self.fail_crop.insert(base_name.to_string());
        self
    }

    pub fn fail_transcode(mut self, base_name: &str) -> Self {
        self.fail_transcode.insert(base_name.to_string());
        self
    }

    pub fn fail_inject(mut self, base_name: &str) -> Self {
        self.fail_inject.insert(base_name.to_string());
        self
    }

    pub fn fail_verify(mut self, base_name: &str) -> Self {
        self.fail_verify.insert(base_name.to_string());
        self
    }

    /// Every invocation so far, in call order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().clone()
    }

    /// Cover bytes injected into each track, in call order.
    pub fn injected(&self) -> Vec<(String, Vec<u8>)> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                Call::Inject { track, cover } => Some((track.clone(), cover.clone())),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Call>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, call: Call) {
        self.lock().push(call);
    }
}

impl MediaTools for MockTools {
    fn probe_cover_codec(&self, track: &Path) -> Result<Option<String>, ToolError> {
        let key = track_key(track);
        self.push(Call::ProbeCover(key.clone()));
        Ok(self.covers.get(&key).cloned())
    }

    fn extract_cover(&self, track: &Path, output: &Path) -> Result<(), ToolError> {
        let key = track_key(track);
        self.push(Call::Extract(key.clone()));
        if !self.covers.contains_key(&key) {
            return Err(scripted_failure("ffmpeg", &key));
        }
        fs::write(output, format!("cover of {key}")).map_err(|e| io_error(output, e))
    }

    fn probe_dimensions(&self, image: &Path) -> Result<Dimensions, ToolError> {
        self.push(Call::ProbeDimensions(track_key(image)));
        ensure_nonempty("ffprobe", image)?;
        Ok(self.dimensions.unwrap_or(Dimensions {
            width: 800,
            height: 600,
        }))
    }

    fn crop_cover(&self, input: &Path, output: &Path, _crop: &SquareCrop) -> Result<(), ToolError> {
        let key = track_key(input);
        self.push(Call::Crop(key.clone()));
        if self.fail_crop.contains(&key) {
            return Err(scripted_failure("ffmpeg", &key));
        }
        fs::copy(input, output)
            .map(drop)
            .map_err(|e| io_error(output, e))
    }

    fn transcode(&self, input: &Path, output: &Path, bitrate: Bitrate) -> Result<(), ToolError> {
        let key = track_key(input);
        self.push(Call::Transcode(key.clone()));
        if self.fail_transcode.contains(&key) {
            return Err(scripted_failure("ffmpeg", &key));
        }
        let mut encoded = format!("opus@{bitrate}:").into_bytes();
        encoded.extend(fs::read(input).map_err(|e| io_error(input, e))?);
        fs::write(output, encoded).map_err(|e| io_error(output, e))
    }

    fn inject_cover(
        &self,
        dir: &Path,
        cover_name: &str,
        target_name: &str,
    ) -> Result<(), ToolError> {
        let target = dir.join(target_name);
        let key = track_key(&target);
        let cover_path = dir.join(cover_name);
        let cover = fs::read(&cover_path).map_err(|e| io_error(&cover_path, e))?;
        self.push(Call::Inject {
            track: key.clone(),
            cover,
        });
        if self.fail_inject.contains(&key) {
            return Err(scripted_failure("kid3-cli", &key));
        }
        ensure_nonempty("kid3-cli", &target)
    }

    fn verify(&self, path: &Path) -> Result<(), ToolError> {
        let key = track_key(path);
        self.push(Call::Verify(key.clone()));
        if self.fail_verify.contains(&key) {
            return Err(ToolError::Output {
                program: "ffmpeg".to_string(),
                reason: format!("corrupt stream in {key}"),
            });
        }
        ensure_nonempty("ffmpeg", path)
    }
}
