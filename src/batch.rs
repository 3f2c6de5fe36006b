use std::collections::HashMap;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;

use crate::config::{BatchConfig, validate_options};
use crate::cover::{self, BatchCoverMemory, CoverArtState};
use crate::encode;
use crate::error::Error;
use crate::finalize::{self, Verdict};
use crate::report::ErrorTracker;
use crate::tools::MediaTools;
use crate::track::{Track, enumerate_tracks};

/// Result of one batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub finalized: usize,
    pub errors: ErrorTracker,
}

impl BatchSummary {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Finalizes every track in the working directory and reports the outcome.
///
/// Every track is processed even when some fail; the run then returns
/// [`Error::TracksFailed`] with the number of recorded failures.
pub fn finalize_folder(
    config: &BatchConfig,
    tools: &impl MediaTools,
) -> Result<BatchSummary, Error> {
    let summary = run_batch(config, tools)?;
    info!(
        "Processing complete. {} of {} tracks finalized, {} error(s).",
        summary.finalized,
        summary.processed,
        summary.errors.len()
    );
    if summary.is_success() {
        return Ok(summary);
    }
    for line in summary.errors.render().lines() {
        error!("{}", line);
    }
    Err(Error::TracksFailed(summary.errors.len()))
}

/// Runs the pipeline over all tracks and returns the summary, failures included.
pub fn run_batch(config: &BatchConfig, tools: &impl MediaTools) -> Result<BatchSummary, Error> {
    validate_options(config)?;

    info!("Discovering tracks in {:?}...", config.working_dir);
    let tracks = enumerate_tracks(&config.working_dir, &config.destination_dir)?;
    if tracks.is_empty() {
        info!("No tracks found.");
        return Ok(BatchSummary::default());
    }
    info!(
        "Found {} tracks, encoding to opus at {}.",
        tracks.len(),
        config.bitrate
    );

    let pb = ProgressBar::new(tracks.len() as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}").expect("Internal Error: Failed to set progress bar style")
        .progress_chars("#>-"));
    pb.set_message("Finalizing tracks");

    let mut memory = BatchCoverMemory::new(&config.working_dir);
    let pool = config.parallel_jobs().and_then(|jobs| {
        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => {
                info!("Using {} threads for processing.", jobs);
                Some(pool)
            }
            Err(e) => {
                warn!("Failed to build thread pool: {}. Processing sequentially.", e);
                None
            }
        }
    });

    let results: Vec<(bool, ErrorTracker)> = match pool {
        None => tracks
            .iter()
            .map(|track| {
                let mut tracker = ErrorTracker::new();
                let cover = cover::resolve(track, config, &mut memory, tools, &mut tracker);
                let finalized = process_track(track, &cover, config, tools, &mut tracker);
                pb.inc(1);
                (finalized, tracker)
            })
            .collect(),
        Some(pool) => {
            // Covers are resolved in enumeration order so fallback inheritance
            // matches the sequential run. Tracks sharing a destination form
            // one group, which a single worker processes in that same order.
            let mut groups: Vec<Vec<(usize, CoverArtState, ErrorTracker)>> = Vec::new();
            let mut by_destination: HashMap<&Path, usize> = HashMap::new();
            for (index, track) in tracks.iter().enumerate() {
                let mut tracker = ErrorTracker::new();
                let cover = cover::resolve(track, config, &mut memory, tools, &mut tracker);
                let group = *by_destination.entry(track.destination()).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[group].push((index, cover, tracker));
            }
            let (tracks, pb) = (&tracks, &pb);
            let mut results: Vec<(usize, bool, ErrorTracker)> = pool.install(|| {
                groups
                    .into_par_iter()
                    .flat_map_iter(move |group| {
                        group.into_iter().map(move |(index, cover, mut tracker)| {
                            let track = &tracks[index];
                            let finalized =
                                process_track(track, &cover, config, tools, &mut tracker);
                            pb.inc(1);
                            (index, finalized, tracker)
                        })
                    })
                    .collect()
            });
            results.sort_by_key(|(index, ..)| *index);
            results
                .into_iter()
                .map(|(_, finalized, tracker)| (finalized, tracker))
                .collect()
        }
    };
    pb.finish_with_message("Finalizing done");
    memory.discard();

    let mut summary = BatchSummary {
        processed: tracks.len(),
        ..Default::default()
    };
    for (finalized, tracker) in results {
        if finalized {
            summary.finalized += 1;
        }
        summary.errors.append(tracker);
    }
    Ok(summary)
}

/// Transcode, inject, verify and finalize one track whose cover is resolved.
///
/// Returns whether the track reached its destination. Every failure is
/// recorded exactly once in `tracker`.
fn process_track(
    track: &Track,
    cover: &CoverArtState,
    config: &BatchConfig,
    tools: &impl MediaTools,
    tracker: &mut ErrorTracker,
) -> bool {
    let name = track.display_name();

    let verdict = match encode::transcode(track, config.bitrate, tools) {
        Err(e) => {
            warn!("{}: {}", name, e);
            tracker.record(track, &e);
            Verdict::Rejected
        }
        Ok(()) => {
            if let Err(e) = encode::inject(cover, track.temp_path(), config, tools) {
                warn!("{}: {}. Continuing without embedded cover.", name, e);
                tracker.record(track, &e);
            }
            match finalize::verify(track.temp_path(), tools) {
                Ok(()) => Verdict::Approved,
                Err(e) => {
                    warn!("{}: {}. Original kept.", name, e);
                    tracker.record(track, &e);
                    Verdict::Rejected
                }
            }
        }
    };

    match finalize::finalize(track, cover, verdict) {
        Ok(()) => verdict == Verdict::Approved,
        Err(e) => {
            warn!("{}: {}", name, e);
            tracker.record(track, &e);
            false
        }
    }
}
