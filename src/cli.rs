//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use fileshare_core::{ByteRange, PeerId};

/// Download shared files from several sources with automatic fallback.
///
/// Sources are tried one at a time in priority order (peer-stream,
/// store-and-forward, FTP, HTTP) until one delivers the file.
#[derive(Parser, Debug)]
#[command(name = "fileshare")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a file from the given sources
    Get(GetArgs),
    /// Print the order in which sources would be attempted
    Sources(SourcesArgs),
    /// Print the content identity of a local file
    Hash(HashArgs),
}

/// Arguments of `fileshare get`.
#[derive(Args, Debug, Clone)]
pub struct GetArgs {
    /// Source URIs of the file (http, ftp, xmpp, cid)
    #[arg(required = true)]
    pub uris: Vec<String>,

    /// File name to save as
    #[arg(long)]
    pub name: Option<String>,

    /// Expected size in bytes
    #[arg(long)]
    pub size: Option<u64>,

    /// SHA-1 of the file, hex encoded
    #[arg(long)]
    pub sha1: Option<String>,

    /// Media type of the file
    #[arg(long)]
    pub mime: Option<String>,

    /// Download only part of the file (START:LENGTH, LENGTH 0 = to the end)
    #[arg(long, value_parser = parse_range)]
    pub range: Option<ByteRange>,

    /// Peer that may serve peer-stream or store-and-forward sources (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<PeerId>,

    /// Output directory (defaults to the configured download directory)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,
}

/// Arguments of `fileshare sources`.
#[derive(Args, Debug, Clone)]
pub struct SourcesArgs {
    /// Source URIs to order
    #[arg(required = true)]
    pub uris: Vec<String>,
}

/// Arguments of `fileshare hash`.
#[derive(Args, Debug, Clone)]
pub struct HashArgs {
    /// File to hash
    pub path: PathBuf,
}

fn parse_range(value: &str) -> Result<ByteRange, String> {
    let (start, length) = value
        .split_once(':')
        .ok_or_else(|| format!("expected START:LENGTH, got '{value}'"))?;
    let start = start
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid range start '{start}': {e}"))?;
    let length = length
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid range length '{length}': {e}"))?;
    Ok(ByteRange::new(start, length))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_get_parses_sources_and_options() {
        let cli = Cli::try_parse_from([
            "fileshare",
            "get",
            "https://h/a.png",
            "cid:abc",
            "--name",
            "a.png",
            "--range",
            "100:50",
            "--peer",
            "juliet@capulet.lit/balcony",
        ])
        .unwrap();
        let Command::Get(args) = cli.command else {
            panic!("expected get command");
        };
        assert_eq!(args.uris, vec!["https://h/a.png", "cid:abc"]);
        assert_eq!(args.name.as_deref(), Some("a.png"));
        assert_eq!(args.range, Some(ByteRange::new(100, 50)));
        assert_eq!(args.peers.len(), 1);
    }

    #[test]
    fn test_cli_get_requires_a_source() {
        let result = Cli::try_parse_from(["fileshare", "get"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_malformed_range() {
        let result = Cli::try_parse_from(["fileshare", "get", "https://h/a", "--range", "10"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let cli = Cli::try_parse_from(["fileshare", "-vv", "sources", "cid:x"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["fileshare", "sources", "cid:x", "--verbose"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let cli = Cli::try_parse_from(["fileshare", "-q", "hash", "a.txt"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Cli::try_parse_from(["fileshare", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0:10"), Ok(ByteRange::new(0, 10)));
        assert_eq!(parse_range("5:0"), Ok(ByteRange::new(5, 0)));
        assert!(parse_range("a:1").is_err());
        assert!(parse_range("1-2").is_err());
    }
}
