use anyhow::Result;
use clap::Parser;
use log::{error, info};
use opus_batch_finalize::{
    BatchConfig, BatchKind, Bitrate, Error, ExternalTools, Toolchain, acquire, finalize_folder,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// source URL handed to the downloader
    source: Option<String>,

    /// constant opus bitrate
    #[arg(short, long, default_value = "64k")]
    bitrate: Bitrate,

    /// finalize files already in the working directory without downloading
    #[arg(long)]
    skip_download: bool,

    /// neither extract nor embed cover art
    #[arg(long)]
    skip_cover_art: bool,

    /// tracks do not share an album cover; never inherit covers between tracks
    #[arg(short, long)]
    collection: bool,

    /// log every step and tool invocation
    #[arg(short, long)]
    verbose: bool,

    /// scratch directory for downloads and in-progress files
    #[arg(short, long, default_value = ".")]
    working_dir: PathBuf,

    /// output directory, default to the working directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// number of tracks processed in parallel, default to one at a time
    #[arg(short, long)]
    jobs: Option<usize>,

    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: String,

    #[arg(long, default_value = "ffprobe")]
    ffprobe: String,

    /// tag tool used to embed covers
    #[arg(long, default_value = "kid3-cli")]
    tagger: String,

    #[arg(long, default_value = "yt-dlp")]
    downloader: String,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    _ = pretty_env_logger::formatted_builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_timestamp_secs()
        .parse_default_env()
        .try_init();

    // --- Configuration ---
    let config = BatchConfig {
        bitrate: cli.bitrate,
        skip_download: cli.skip_download,
        skip_cover_art: cli.skip_cover_art,
        kind: if cli.collection {
            BatchKind::Collection
        } else {
            BatchKind::Album
        },
        verbose: cli.verbose,
        source: cli.source,
        destination_dir: cli.output.unwrap_or_else(|| cli.working_dir.clone()),
        working_dir: cli.working_dir,
        jobs: cli.jobs,
        tools: Toolchain {
            ffmpeg: cli.ffmpeg,
            ffprobe: cli.ffprobe,
            tagger: cli.tagger,
            downloader: cli.downloader,
        },
    };

    info!("Starting batch finalization with options:");
    info!("  Working Directory: {:?}", config.working_dir);
    info!("  Output Directory: {:?}", config.destination_dir);
    info!("  Bitrate: {}", config.bitrate);
    info!("  Batch Kind: {}", config.kind);
    info!(
        "  Cover Art: {}",
        if config.skip_cover_art { "Skipped" } else { "Enabled" }
    );
    match config.parallel_jobs() {
        Some(n) => info!("  Jobs: {}", n),
        None => info!("  Jobs: Sequential"),
    }
    info!("---");

    acquire::check_dependencies(&config)?;
    acquire::download(&config)?;

    let tools = ExternalTools::new(config.tools.clone());
    match finalize_folder(&config, &tools) {
        Ok(_) => {
            info!("All tracks finalized successfully!");
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::TracksFailed(count)) => {
            error!("Finalization finished with {} error(s).", count);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!("Finalization failed: {}", e);
            Err(e.into())
        }
    }
}
