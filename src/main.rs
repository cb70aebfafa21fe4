//! CLI entry point for the fileshare tool.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fileshare_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use fileshare_core::{
    ContentHash, ContentIdentity, DownloadEvent, DownloadRequest, FileShareDownloader,
    HashAlgorithm, HttpClient, OfflinePeers, SourceKind, SourceUri, attempt_order,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, load_default_file_config};
use cli::{Cli, Command, GetArgs, HashArgs, SourcesArgs};

/// Read buffer for draining the download stream.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Length of a SHA-1 digest in bytes.
const SHA1_LEN: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();
    let file_config = load_default_file_config()?.unwrap_or_default();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => file_config
                .verbosity
                .map_or("info", app_config::VerbositySetting::default_level),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    match cli.command {
        Command::Get(args) => run_get(args, &file_config, cli.quiet).await,
        Command::Sources(args) => {
            run_sources(&args);
            Ok(())
        }
        Command::Hash(args) => run_hash(&args),
    }
}

async fn run_get(args: GetArgs, file_config: &FileConfig, quiet: bool) -> Result<()> {
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.download_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let http = HttpClient::with_timeouts(
        file_config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    )
    .context("Failed to build HTTP client")?;

    let mut identity = ContentIdentity::new();
    if let Some(sha1) = args.sha1.as_deref() {
        let digest = hex::decode(sha1.trim()).context("--sha1 must be hex encoded")?;
        if digest.len() != SHA1_LEN {
            bail!("--sha1 must be {SHA1_LEN} bytes, got {}", digest.len());
        }
        identity.insert(ContentHash::new(HashAlgorithm::Sha1, digest));
    }

    let range = args.range.unwrap_or_default();
    let expected = if range.length > 0 {
        Some(range.length)
    } else {
        args.size.map(|size| size.saturating_sub(range.offset))
    };
    let request = DownloadRequest {
        identity,
        name: args.name,
        size: args.size,
        mime_type: args.mime,
        sources: args.uris,
        peers: args.peers,
        output_dir,
        range,
    };

    // no chat session here: peer sources fail and fall back
    let mut downloader = FileShareDownloader::new(request, http, Arc::new(OfflinePeers));
    if !downloader.open() {
        bail!(
            "Download failed: {}",
            downloader.last_error().unwrap_or("no usable source")
        );
    }

    let bar = progress_bar(expected, quiet);
    let mut buf = vec![0_u8; READ_BUFFER_SIZE];
    while let Some(event) = downloader.next_event().await {
        match event {
            DownloadEvent::MetadataChanged => {
                debug!(range = %downloader.range(), "source metadata received");
            }
            DownloadEvent::ReadyRead | DownloadEvent::Disconnected => loop {
                let n = downloader.read(&mut buf);
                if n == 0 {
                    break;
                }
                bar.inc(n as u64);
            },
            DownloadEvent::Finished => {}
        }
    }
    bar.finish_and_clear();

    let Some(path) = downloader.file_name() else {
        bail!(
            "Download failed: {}",
            downloader.last_error().unwrap_or("unknown error")
        );
    };
    info!(
        path = %path.display(),
        bytes = downloader.bytes_written(),
        "Download complete"
    );
    println!("{}", path.display());
    Ok(())
}

fn progress_bar(expected: Option<u64>, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    match expected {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} {binary_bytes_per_sec}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        }
        None => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {bytes} {binary_bytes_per_sec}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner
        }
    }
}

fn run_sources(args: &SourcesArgs) {
    for uri in &args.uris {
        if SourceUri::new(uri.as_str()).kind() == SourceKind::Unknown {
            warn!(uri = %uri, "Skipped unrecognized source");
        }
    }
    for (index, source) in attempt_order(args.uris.iter().cloned()).iter().enumerate() {
        println!("{}. [{}] {}", index + 1, source.kind(), source);
    }
}

fn run_hash(args: &HashArgs) -> Result<()> {
    let identity = ContentIdentity::of_file(&args.path)
        .with_context(|| format!("Failed to hash '{}'", args.path.display()))?;
    for hash in &identity {
        println!("{hash}");
    }
    Ok(())
}
