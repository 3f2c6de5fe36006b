use std::path::{Path, PathBuf};

use log::debug;
use strum_macros::Display;
use walkdir::WalkDir;

use crate::error::Error;

/// Marker inside the name of an in-progress transcode.
pub const TEMP_MARKER: &str = ".finalize-tmp.";
/// Marker inside the name of a freshly extracted cover.
pub const EXTRACT_MARKER: &str = ".cover-extract.";
/// Marker inside the name of a cropped square cover.
pub const SQUARE_MARKER: &str = ".cover-square.";
/// The batch-wide fallback cover, shared by every track of an album.
pub const BATCH_COVER_NAME: &str = ".batch-cover.jpg";
/// Where a new fallback cover is written before it replaces [`BATCH_COVER_NAME`].
pub const BATCH_COVER_STAGING_NAME: &str = ".batch-cover.part.jpg";

const OUTPUT_EXTENSION: &str = "opus";

/// Media containers accepted as batch input
#[derive(Debug, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MediaFormat {
    Opus,
    Mp3,
    Flac,
    M4a,
    Ogg,
    Webm,
    Wav,
}

impl MediaFormat {
    /// Returns a list of supported file extensions
    #[inline]
    pub fn supported_extensions() -> &'static [&'static str] {
        &["opus", "mp3", "flac", "m4a", "ogg", "webm", "wav"]
    }

    /// Creates a MediaFormat from a file path based on its extension
    #[inline]
    pub fn from_path(value: impl AsRef<Path>) -> Option<Self> {
        Some(
            match value
                .as_ref()
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase()
                .as_ref()
            {
                "opus" => Self::Opus,
                "mp3" => Self::Mp3,
                "flac" => Self::Flac,
                "m4a" => Self::M4a,
                "ogg" => Self::Ogg,
                "webm" => Self::Webm,
                "wav" => Self::Wav,
                _ => return None,
            },
        )
    }
}

/// True for files the pipeline itself creates in the working directory.
pub fn is_transient(file_name: &str) -> bool {
    file_name == BATCH_COVER_NAME
        || file_name == BATCH_COVER_STAGING_NAME
        || file_name.contains(TEMP_MARKER)
        || file_name.contains(EXTRACT_MARKER)
        || file_name.contains(SQUARE_MARKER)
}

/// One media file under processing. All derived paths are fixed at creation.
///
/// Transient names carry the full file name, so `a.flac` and `a.mp3` never
/// share a temporary file even though both finalize to `a.opus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    source: PathBuf,
    base_name: String,
    destination: PathBuf,
    temp_path: PathBuf,
}

impl Track {
    /// Builds a track for `source`, or `None` when the path has no file name.
    pub fn new(source: impl Into<PathBuf>, destination_dir: impl AsRef<Path>) -> Option<Self> {
        let source = source.into();
        let base_name = source.file_stem()?.to_string_lossy().into_owned();
        let file_name = source.file_name()?.to_string_lossy().into_owned();
        let working_dir = source.parent().unwrap_or(Path::new("")).to_path_buf();
        let destination = destination_dir
            .as_ref()
            .join(format!("{base_name}.{OUTPUT_EXTENSION}"));
        let temp_path = working_dir.join(format!("{file_name}{TEMP_MARKER}{OUTPUT_EXTENSION}"));
        Some(Self {
            source,
            base_name,
            destination,
            temp_path,
        })
    }

    #[inline]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// File name without its trailing extension
    #[inline]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    #[inline]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Where the transcoder writes before verification
    #[inline]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn working_dir(&self) -> &Path {
        self.source.parent().unwrap_or(Path::new(""))
    }

    /// Short name used in logs and error reports.
    pub fn display_name(&self) -> String {
        self.source
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    pub fn extracted_cover_path(&self, extension: &str) -> PathBuf {
        self.working_dir()
            .join(format!("{}{EXTRACT_MARKER}{extension}", self.cover_stem()))
    }

    pub fn cropped_cover_path(&self) -> PathBuf {
        self.working_dir()
            .join(format!("{}{SQUARE_MARKER}jpg", self.cover_stem()))
    }

    // Cover names are passed to the tag tool inside a quoted command string.
    fn cover_stem(&self) -> String {
        self.display_name().replace(['"', '\''], "_")
    }
}

/// Lists eligible tracks directly inside `working_dir`, sorted by file name.
pub fn enumerate_tracks(
    working_dir: impl AsRef<Path>,
    destination_dir: impl AsRef<Path>,
) -> Result<Vec<Track>, Error> {
    let working_dir = working_dir.as_ref();
    if !working_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Working directory is not a valid directory: {:?}",
            working_dir
        )));
    }

    let mut tracks = Vec::new();
    for entry in WalkDir::new(working_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        if is_transient(&name) {
            debug!("Skipping transient file {}", name);
            continue;
        }
        if MediaFormat::from_path(entry.path()).is_none() {
            continue;
        }
        if let Some(track) = Track::new(entry.path(), destination_dir.as_ref()) {
            tracks.push(track);
        }
    }
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn derives_paths_from_file_name() {
        let track = Track::new("/work/My Song.mp3", "/music").unwrap();
        assert_eq!(track.base_name(), "My Song");
        assert_eq!(track.destination(), Path::new("/music/My Song.opus"));
        assert_eq!(
            track.temp_path(),
            Path::new("/work/My Song.mp3.finalize-tmp.opus")
        );
        assert_eq!(
            track.extracted_cover_path("png"),
            Path::new("/work/My Song.mp3.cover-extract.png")
        );
        assert_eq!(
            track.cropped_cover_path(),
            Path::new("/work/My Song.mp3.cover-square.jpg")
        );
    }

    #[test]
    fn naming_is_stable_across_runs() {
        let a = Track::new("/work/a.b.flac", "/out").unwrap();
        let b = Track::new("/work/a.b.flac", "/out").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.base_name(), "a.b");
    }

    #[test]
    fn same_base_name_shares_only_the_destination() {
        let flac = Track::new("/work/a.flac", "/out").unwrap();
        let mp3 = Track::new("/work/a.mp3", "/out").unwrap();
        assert_eq!(flac.destination(), mp3.destination());
        assert_ne!(flac.temp_path(), mp3.temp_path());
        assert_ne!(flac.cropped_cover_path(), mp3.cropped_cover_path());
        assert_ne!(
            flac.extracted_cover_path("jpg"),
            mp3.extracted_cover_path("jpg")
        );
    }

    #[test]
    fn cover_names_drop_quotes() {
        let track = Track::new("/work/Don't \"Stop\".opus", "/out").unwrap();
        assert_eq!(
            track.cropped_cover_path(),
            Path::new("/work/Don_t _Stop_.opus.cover-square.jpg")
        );
    }

    #[test]
    fn transient_names_are_recognized() {
        assert!(is_transient("x.finalize-tmp.opus"));
        assert!(is_transient("x.cover-extract.png"));
        assert!(is_transient("x.cover-square.jpg"));
        assert!(is_transient(BATCH_COVER_NAME));
        assert!(is_transient(BATCH_COVER_STAGING_NAME));
        assert!(!is_transient("x.opus"));
        assert!(!is_transient(".intro.mp3"));
    }

    #[test]
    fn enumerates_sorted_media_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "c.flac",
            "a.mp3",
            "B.opus",
            "notes.txt",
            "a.finalize-tmp.opus",
            "a.mp3.cover-extract.jpg",
            ".hidden.mp3",
            BATCH_COVER_NAME,
        ] {
            fs::write(dir.path().join(name), b"data").unwrap();
        }
        fs::create_dir(dir.path().join("nested.mp3")).unwrap();

        let tracks = enumerate_tracks(dir.path(), "/out").unwrap();
        let names: Vec<_> = tracks.iter().map(Track::display_name).collect();
        assert_eq!(names, [".hidden.mp3", "B.opus", "a.mp3", "c.flac"]);
    }

    #[test]
    fn empty_directory_yields_no_tracks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(enumerate_tracks(dir.path(), dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_invalid() {
        assert!(matches!(
            enumerate_tracks("/definitely/not/here", "/out"),
            Err(Error::InvalidOptions(_))
        ));
    }
}
