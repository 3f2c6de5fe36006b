use std::path::Path;
use std::process::{Command, Output, Stdio};

use log::debug;

use crate::config::{Bitrate, Toolchain};
use crate::cover::{Dimensions, SquareCrop};
use crate::error::ToolError;

/// The external processing tools the pipeline drives.
///
/// Every method maps one tool invocation to an explicit result, so no caller
/// ever inspects an exit status after the fact.
pub trait MediaTools: Send + Sync {
    /// Codec name of the first attached picture stream, if the track has one.
    fn probe_cover_codec(&self, track: &Path) -> Result<Option<String>, ToolError>;

    /// Copies the attached picture of `track` to `output` without re-encoding.
    fn extract_cover(&self, track: &Path, output: &Path) -> Result<(), ToolError>;

    fn probe_dimensions(&self, image: &Path) -> Result<Dimensions, ToolError>;

    /// Cuts `crop` out of `input` and writes it, resized, to `output`.
    fn crop_cover(&self, input: &Path, output: &Path, crop: &SquareCrop) -> Result<(), ToolError>;

    /// Encodes `input` to constant-bitrate opus at `output`, keeping tags.
    fn transcode(&self, input: &Path, output: &Path, bitrate: Bitrate) -> Result<(), ToolError>;

    /// Embeds `cover_name` into `target_name`. Both are bare file names inside `dir`.
    fn inject_cover(&self, dir: &Path, cover_name: &str, target_name: &str)
    -> Result<(), ToolError>;

    /// Structural integrity check of an encoded file.
    fn verify(&self, path: &Path) -> Result<(), ToolError>;
}

/// Runs a prepared command to completion and fails on a nonzero exit.
pub(crate) fn run(program: &str, command: &mut Command) -> Result<Output, ToolError> {
    debug!("Running {:?}", command);
    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ToolError::Spawn {
            program: program.to_string(),
            source: e,
        })?;
    if !output.status.success() {
        return Err(ToolError::Status {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// Fails unless `path` exists and holds at least one byte.
pub(crate) fn ensure_nonempty(program: &str, path: &Path) -> Result<(), ToolError> {
    match path.metadata() {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(ToolError::Output {
            program: program.to_string(),
            reason: format!("{} is empty", path.display()),
        }),
        Err(e) => Err(ToolError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Parses `ffprobe` csv output such as `600x400`.
fn parse_dimensions(program: &str, stdout: &str) -> Result<Dimensions, ToolError> {
    let line = stdout.lines().next().unwrap_or_default().trim();
    let invalid = || ToolError::Output {
        program: program.to_string(),
        reason: format!("unexpected dimensions {:?}", line),
    };
    let (w, h) = line.split_once('x').ok_or_else(invalid)?;
    Ok(Dimensions {
        width: w.trim().parse().map_err(|_| invalid())?,
        height: h.trim().parse().map_err(|_| invalid())?,
    })
}

/// `ffmpeg`, `ffprobe` and `kid3-cli` invoked as child processes.
#[derive(Debug, Clone, Default)]
pub struct ExternalTools {
    toolchain: Toolchain,
}

impl ExternalTools {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    fn ffmpeg(&self) -> Command {
        let mut command = Command::new(&self.toolchain.ffmpeg);
        command.args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]);
        command
    }

    fn ffprobe(&self) -> Command {
        let mut command = Command::new(&self.toolchain.ffprobe);
        command.args(["-v", "error", "-select_streams", "v:0"]);
        command
    }
}

impl MediaTools for ExternalTools {
    fn probe_cover_codec(&self, track: &Path) -> Result<Option<String>, ToolError> {
        let output = run(
            &self.toolchain.ffprobe,
            self.ffprobe()
                .args(["-show_entries", "stream=codec_name"])
                .args(["-of", "default=noprint_wrappers=1:nokey=1"])
                .arg(track),
        )?;
        let codec = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok((!codec.is_empty()).then_some(codec))
    }

    fn extract_cover(&self, track: &Path, output: &Path) -> Result<(), ToolError> {
        run(
            &self.toolchain.ffmpeg,
            self.ffmpeg()
                .arg("-i")
                .arg(track)
                .args(["-an", "-map", "0:v:0", "-c", "copy"])
                .arg(output),
        )?;
        ensure_nonempty(&self.toolchain.ffmpeg, output)
    }

    fn probe_dimensions(&self, image: &Path) -> Result<Dimensions, ToolError> {
        let output = run(
            &self.toolchain.ffprobe,
            self.ffprobe()
                .args(["-show_entries", "stream=width,height"])
                .args(["-of", "csv=s=x:p=0"])
                .arg(image),
        )?;
        parse_dimensions(
            &self.toolchain.ffprobe,
            &String::from_utf8_lossy(&output.stdout),
        )
    }

    fn crop_cover(&self, input: &Path, output: &Path, crop: &SquareCrop) -> Result<(), ToolError> {
        run(
            &self.toolchain.ffmpeg,
            self.ffmpeg()
                .arg("-i")
                .arg(input)
                .args(["-frames:v", "1", "-vf"])
                .arg(crop.filter())
                .arg(output),
        )?;
        ensure_nonempty(&self.toolchain.ffmpeg, output)
    }

    fn transcode(&self, input: &Path, output: &Path, bitrate: Bitrate) -> Result<(), ToolError> {
        run(
            &self.toolchain.ffmpeg,
            self.ffmpeg()
                .arg("-i")
                .arg(input)
                .args(["-map", "0:a", "-map_metadata", "0", "-c:a", "libopus"])
                .arg("-b:a")
                .arg(bitrate.to_string())
                .args(["-vbr", "off"])
                .arg(output),
        )
        .map(drop)
    }

    fn inject_cover(
        &self,
        dir: &Path,
        cover_name: &str,
        target_name: &str,
    ) -> Result<(), ToolError> {
        // kid3-cli resolves the picture path relative to the target file.
        run(
            &self.toolchain.tagger,
            Command::new(&self.toolchain.tagger)
                .current_dir(dir)
                .arg("-c")
                .arg(format!("set picture:\"{cover_name}\" \"\""))
                .arg(target_name),
        )
        .map(drop)
    }

    fn verify(&self, path: &Path) -> Result<(), ToolError> {
        let output = run(
            &self.toolchain.ffmpeg,
            Command::new(&self.toolchain.ffmpeg)
                .args(["-hide_banner", "-nostdin", "-v", "error", "-i"])
                .arg(path)
                .args(["-f", "null", "-"]),
        )?;
        let diagnostics = String::from_utf8_lossy(&output.stderr);
        if !diagnostics.trim().is_empty() {
            return Err(ToolError::Output {
                program: self.toolchain.ffmpeg.clone(),
                reason: diagnostics.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_probe_dimensions() {
        assert_eq!(
            parse_dimensions("ffprobe", "600x400\n").unwrap(),
            Dimensions {
                width: 600,
                height: 400
            }
        );
        assert!(parse_dimensions("ffprobe", "").is_err());
        assert!(parse_dimensions("ffprobe", "600,400").is_err());
        assert!(parse_dimensions("ffprobe", "wide x tall").is_err());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run(
            "definitely-not-installed-tool",
            &mut Command::new("definitely-not-installed-tool"),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn empty_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.jpg");
        assert!(matches!(
            ensure_nonempty("ffmpeg", &path),
            Err(ToolError::Io { .. })
        ));
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            ensure_nonempty("ffmpeg", &path),
            Err(ToolError::Output { .. })
        ));
        std::fs::write(&path, b"jpeg").unwrap();
        assert!(ensure_nonempty("ffmpeg", &path).is_ok());
    }

    #[cfg(unix)]
    mod stubbed {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        /// Writes an executable shell script standing in for a tool.
        fn stub(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        // A freshly written script can briefly fail with ETXTBSY while another
        // test thread forks.
        fn retry<T>(mut f: impl FnMut() -> Result<T, ToolError>) -> Result<T, ToolError> {
            for _ in 0..20 {
                match f() {
                    Err(ToolError::Spawn { source, .. }) if source.raw_os_error() == Some(26) => {
                        std::thread::sleep(std::time::Duration::from_millis(25));
                    }
                    other => return other,
                }
            }
            f()
        }

        /// A tool that records its arguments and working directory, then exits 0.
        fn recorder(dir: &Path) -> (String, PathBuf, PathBuf) {
            let args = dir.join("args.log");
            let cwd = dir.join("cwd.log");
            let program = stub(
                dir,
                "recorder",
                &format!(
                    "pwd -P > '{}'\nprintf '%s\\n' \"$@\" > '{}'",
                    cwd.display(),
                    args.display()
                ),
            );
            (program, args, cwd)
        }

        fn tools(ffmpeg: &str, tagger: &str) -> ExternalTools {
            ExternalTools::new(Toolchain {
                ffmpeg: ffmpeg.to_string(),
                tagger: tagger.to_string(),
                ..Default::default()
            })
        }

        fn recorded_args(path: &Path) -> Vec<String> {
            fs::read_to_string(path)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
            args.windows(2).any(|w| w[0] == flag && w[1] == value)
        }

        #[test]
        fn transcode_requests_constant_bitrate_opus() {
            let dir = tempfile::tempdir().unwrap();
            let (ffmpeg, args, _) = recorder(dir.path());
            let tools = tools(&ffmpeg, "kid3-cli");
            let bitrate = Bitrate::from_kbps(96).unwrap();

            retry(|| tools.transcode(Path::new("in.flac"), Path::new("out.opus"), bitrate))
                .unwrap();
            let args = recorded_args(&args);
            assert!(has_pair(&args, "-c:a", "libopus"));
            assert!(has_pair(&args, "-b:a", "96k"));
            assert!(has_pair(&args, "-vbr", "off"));
            assert!(has_pair(&args, "-map_metadata", "0"));
            assert!(has_pair(&args, "-i", "in.flac"));
            assert_eq!(args.last().map(String::as_str), Some("out.opus"));
        }

        #[test]
        fn injection_runs_in_the_track_directory_with_bare_names() {
            let dir = tempfile::tempdir().unwrap();
            let (tagger, args, cwd) = recorder(dir.path());
            let target_dir = dir.path().join("album dir");
            fs::create_dir(&target_dir).unwrap();
            let tools = tools("ffmpeg", &tagger);

            retry(|| {
                tools.inject_cover(&target_dir, "x.cover-square.jpg", "x.mp3.finalize-tmp.opus")
            })
            .unwrap();
            assert_eq!(
                fs::read_to_string(&cwd).unwrap().trim(),
                target_dir.canonicalize().unwrap().to_string_lossy()
            );
            assert_eq!(
                recorded_args(&args),
                [
                    "-c",
                    "set picture:\"x.cover-square.jpg\" \"\"",
                    "x.mp3.finalize-tmp.opus"
                ]
            );
        }

        #[test]
        fn verification_fails_on_diagnostics_despite_clean_exit() {
            let dir = tempfile::tempdir().unwrap();
            let noisy = stub(dir.path(), "noisy", "echo 'invalid packet size' >&2");
            let silent = stub(dir.path(), "silent", "exit 0");
            let crashing = stub(dir.path(), "crashing", "exit 1");
            let target = Path::new("a.finalize-tmp.opus");

            match retry(|| tools(&noisy, "kid3-cli").verify(target)) {
                Err(ToolError::Output { reason, .. }) => {
                    assert_eq!(reason, "invalid packet size")
                }
                other => panic!("unexpected {other:?}"),
            }
            assert!(retry(|| tools(&silent, "kid3-cli").verify(target)).is_ok());
            assert!(matches!(
                retry(|| tools(&crashing, "kid3-cli").verify(target)),
                Err(ToolError::Status { .. })
            ));
        }
    }
}
