/// Dependency checks and the download step
pub mod acquire;
/// Module for the batch orchestrator
pub mod batch;
/// Module for run configuration
pub mod config;
/// Module for cover art resolution
pub mod cover;
/// Transcoding and cover injection
pub mod encode;
/// Module for error handling
pub mod error;
/// Verification and atomic replacement
pub mod finalize;
pub mod report;
/// Scripted tool doubles for tests
pub mod testing;
/// Module for invoking external tools
pub mod tools;
pub mod track;

pub use batch::{BatchSummary, finalize_folder, run_batch};
pub use config::{BatchConfig, BatchKind, Bitrate, Toolchain};
pub use cover::{BatchCoverMemory, CoverArtState, CoverOutcome};
pub use error::{Error, StageError, ToolError};
pub use report::{ErrorRecord, ErrorTracker, Stage};
pub use tools::{ExternalTools, MediaTools};
pub use track::{MediaFormat, Track, enumerate_tracks};
