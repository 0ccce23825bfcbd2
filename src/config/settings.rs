//! Configuration settings for StoreCopy
//!
//! Defines the CLI arguments and the immutable configuration value built
//! from them. Everything is validated here, before any backend is
//! contacted.

use crate::core::{CopyOptions, DEFAULT_CONCURRENCY};
use crate::error::{Result, StoreCopyError};
use crate::storage::{GcsConfig, S3Config, DEFAULT_GCS_ENDPOINT, DEFAULT_QUEUE_DEPTH};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

/// StoreCopy - parallel copy between local disks and object stores
#[derive(Parser, Debug, Clone)]
#[command(name = "storecopy")]
#[command(author = "StoreCopy Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy files between local storage, S3-compatible stores and GCS")]
#[command(long_about = r#"
StoreCopy copies every file under a local path to an object store bucket,
or every object under a bucket prefix to a local directory, with a fixed
number of parallel workers.

Remote locations:
  s3://bucket[/prefix]    S3 or any S3-compatible service (--endpoint)
  gs://bucket[/prefix]    Google Cloud Storage (--gcs-token)

Examples:
  storecopy put /data s3://archive/backup/          # Upload a tree
  storecopy get gs://archive/backup /restore -c 32  # Download with 32 workers
  storecopy put /data s3://archive --continue-on-error
"#)]
pub struct CliArgs {
    /// Number of parallel workers
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, value_name = "NUM", global = true)]
    pub concurrency: usize,

    /// Continue on errors (log and skip failed items)
    #[arg(long, global = true)]
    pub continue_on_error: bool,

    /// Discovered items buffered ahead of the workers (0 = unbounded)
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH, value_name = "NUM", global = true)]
    pub queue_depth: usize,

    /// Follow symbolic links when walking local trees
    #[arg(short = 'L', long, global = true)]
    pub follow_symlinks: bool,

    /// Show live progress
    #[arg(short = 'p', long, global = true)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only warnings and errors)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// S3 region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1", global = true)]
    pub region: String,

    /// S3 endpoint URL (MinIO, Ceph, ...)
    #[arg(long, env = "AWS_ENDPOINT_URL", value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    /// S3 access key ID
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true, global = true)]
    pub access_key: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    pub secret_key: Option<String>,

    /// Use path-style S3 URLs
    #[arg(long, global = true)]
    pub path_style: bool,

    /// GCS OAuth2 access token
    #[arg(long, env = "GCS_OAUTH_TOKEN", hide_env_values = true, global = true)]
    pub gcs_token: Option<String>,

    /// GCS API endpoint
    #[arg(long, default_value = DEFAULT_GCS_ENDPOINT, value_name = "URL", global = true)]
    pub gcs_endpoint: String,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Copy direction, the local side is always one end
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Upload a local file or tree to a remote location
    #[command(name = "put")]
    Put {
        /// Local file or directory
        local: PathBuf,
        /// Remote location (s3://bucket/prefix or gs://bucket/prefix)
        remote: String,
    },

    /// Download everything under a remote location into a local directory
    #[command(name = "get")]
    Get {
        /// Remote location (s3://bucket/prefix or gs://bucket/prefix)
        remote: String,
        /// Local directory
        local: PathBuf,
    },
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON lines
    Json,
}

/// Which way items flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local to remote
    Put,
    /// Remote to local
    Get,
}

/// Object store flavour of a remote location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    /// S3-compatible
    S3,
    /// Google Cloud Storage
    Gcs,
}

/// A parsed `s3://` or `gs://` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    /// Backend kind
    pub kind: RemoteKind,
    /// Bucket name
    pub bucket: String,
    /// Key prefix (may be empty)
    pub prefix: String,
}

/// Parse a remote location URL
pub fn parse_remote_location(location: &str) -> Result<RemoteLocation> {
    let (kind, rest) = if let Some(rest) = location.strip_prefix("s3://") {
        (RemoteKind::S3, rest)
    } else if let Some(rest) = location.strip_prefix("gs://") {
        (RemoteKind::Gcs, rest)
    } else {
        return Err(StoreCopyError::config(format!(
            "Unsupported remote location {} (expected s3:// or gs://)",
            location
        )));
    };

    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(StoreCopyError::config(format!(
            "Missing bucket name in {}",
            location
        )));
    }

    Ok(RemoteLocation {
        kind,
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
    })
}

/// Backend settings for the remote side
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// S3-compatible store
    S3(S3Config),
    /// Google Cloud Storage
    Gcs(GcsConfig),
}

impl RemoteConfig {
    /// Validate backend settings
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::S3(config) => config.validate(),
            Self::Gcs(config) => config.validate(),
        }
    }
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone, Serialize)]
pub struct CopyConfig {
    /// Copy direction
    pub direction: Direction,
    /// Local file or directory
    pub local_path: PathBuf,
    /// Remote backend
    pub remote: RemoteConfig,
    /// Engine options
    #[serde(skip)]
    pub copy: CopyOptions,
    /// Queue depth (`None` = unbounded)
    pub queue_depth: Option<usize>,
    /// Follow symlinks
    pub follow_symlinks: bool,
    /// Show progress
    pub progress: bool,
}

impl CopyConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let (direction, local_path, remote) = match &args.command {
            Commands::Put { local, remote } => (Direction::Put, local.clone(), remote),
            Commands::Get { remote, local } => (Direction::Get, local.clone(), remote),
        };

        let location = parse_remote_location(remote)?;
        let remote = match location.kind {
            RemoteKind::S3 => RemoteConfig::S3(S3Config {
                region: args.region.clone(),
                endpoint: args.endpoint.clone(),
                access_key_id: args.access_key.clone(),
                secret_access_key: args.secret_key.clone(),
                bucket: location.bucket,
                prefix: location.prefix,
                path_style: args.path_style,
            }),
            RemoteKind::Gcs => RemoteConfig::Gcs(GcsConfig {
                bucket: location.bucket,
                prefix: location.prefix,
                token: args.gcs_token.clone(),
                endpoint: args.gcs_endpoint.clone(),
            }),
        };
        remote.validate()?;

        let copy = CopyOptions {
            concurrency: args.concurrency,
            continue_on_error: args.continue_on_error,
        };
        copy.validate()?;

        Ok(Self {
            direction,
            local_path,
            remote,
            copy,
            queue_depth: (args.queue_depth > 0).then_some(args.queue_depth),
            follow_symlinks: args.follow_symlinks,
            progress: args.progress && !args.quiet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        let mut argv = vec!["storecopy"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_remote_location() {
        let loc = parse_remote_location("s3://archive/backup/").unwrap();
        assert_eq!(loc.kind, RemoteKind::S3);
        assert_eq!(loc.bucket, "archive");
        assert_eq!(loc.prefix, "backup/");

        let loc = parse_remote_location("gs://archive").unwrap();
        assert_eq!(loc.kind, RemoteKind::Gcs);
        assert_eq!(loc.prefix, "");

        assert!(parse_remote_location("http://archive/x").is_err());
        assert!(parse_remote_location("s3:///backup").is_err());
    }

    #[test]
    fn test_put_to_s3() {
        let args = parse(&["put", "/data", "s3://archive/backup/", "-c", "4", "--region", "eu-west-1"]);
        let config = CopyConfig::from_cli(&args).unwrap();

        assert_eq!(config.direction, Direction::Put);
        assert_eq!(config.local_path, PathBuf::from("/data"));
        assert_eq!(config.copy.concurrency, 4);
        assert!(!config.copy.continue_on_error);
        assert_eq!(config.queue_depth, Some(DEFAULT_QUEUE_DEPTH));
        match config.remote {
            RemoteConfig::S3(s3) => {
                assert_eq!(s3.bucket, "archive");
                assert_eq!(s3.prefix, "backup/");
                assert_eq!(s3.region, "eu-west-1");
            }
            other => panic!("unexpected remote {:?}", other),
        }
    }

    #[test]
    fn test_get_from_gcs() {
        let args = parse(&[
            "get",
            "gs://archive/backup",
            "/restore",
            "--gcs-token",
            "ya29.token",
            "--continue-on-error",
            "--queue-depth",
            "0",
        ]);
        let config = CopyConfig::from_cli(&args).unwrap();

        assert_eq!(config.direction, Direction::Get);
        assert!(config.copy.continue_on_error);
        assert_eq!(config.queue_depth, None);
        assert!(matches!(config.remote, RemoteConfig::Gcs(ref gcs) if gcs.prefix == "backup"));
    }

    #[test]
    fn test_configuration_errors() {
        let zero = parse(&["put", "/data", "s3://archive", "-c", "0"]);
        assert!(CopyConfig::from_cli(&zero).unwrap_err().is_config_error());

        let region = parse(&["put", "/data", "s3://archive", "--region", "nowhere 1"]);
        assert!(CopyConfig::from_cli(&region).unwrap_err().is_config_error());

        let endpoint = parse(&["put", "/data", "s3://archive", "--endpoint", "not a url"]);
        assert!(CopyConfig::from_cli(&endpoint).unwrap_err().is_config_error());

        let scheme = parse(&["put", "/data", "ftp://archive"]);
        assert!(CopyConfig::from_cli(&scheme).unwrap_err().is_config_error());
    }

    #[test]
    fn test_secret_not_serialized() {
        let args = parse(&[
            "put",
            "/data",
            "s3://archive",
            "--access-key",
            "AKIAEXAMPLE",
            "--secret-key",
            "very-secret",
        ]);
        let config = CopyConfig::from_cli(&args).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("archive"));
        assert!(!json.contains("very-secret"));
    }
}
