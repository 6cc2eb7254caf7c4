//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/blockput/cli.toml`
//! - Windows: `%APPDATA%/blockput/cli.toml`

use std::path::{Path, PathBuf};

use blockput_local_bucket::LocalBucketConfig;
use blockput_protocol::{BLOCK_SIZE, DEFAULT_CHUNK_SIZE};
use blockput_uploader::UploaderConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding progress records.
    #[serde(default = "default_progress_dir")]
    pub progress_dir: PathBuf,

    /// Root directory of the local bucket.
    #[serde(default = "default_bucket_root")]
    pub bucket_root: PathBuf,

    /// Block size in bytes.
    #[serde(default = "default_block_size")]
    pub block_size: u64,

    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Blocks uploaded concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Lifetime of a block context in seconds.
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: i64,

    /// Credential the bucket accepts (empty accepts any).
    #[serde(default)]
    pub bucket_token: String,

    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_progress_dir() -> PathBuf {
    UploaderConfig::default().progress_dir
}

fn default_bucket_root() -> PathBuf {
    data_dir().join("bucket")
}

fn default_block_size() -> u64 {
    BLOCK_SIZE
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_concurrent() -> usize {
    4
}

fn default_context_ttl_secs() -> i64 {
    7 * 24 * 3600
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            progress_dir: default_progress_dir(),
            bucket_root: default_bucket_root(),
            block_size: default_block_size(),
            chunk_size: default_chunk_size(),
            max_concurrent: default_max_concurrent(),
            context_ttl_secs: default_context_ttl_secs(),
            bucket_token: String::new(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            if config.block_size == 0 {
                anyhow::bail!("{}: block_size must be positive", path.display());
            }
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix, the file may hold a token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            progress_dir: self.progress_dir.clone(),
            block_size: self.block_size,
        }
    }

    pub fn bucket_config(&self) -> LocalBucketConfig {
        LocalBucketConfig {
            root: self.bucket_root.clone(),
            chunk_size: self.chunk_size,
            max_concurrent: self.max_concurrent,
            context_ttl_secs: self.context_ttl_secs,
            token: self.bucket_token.clone(),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("blockput").join("cli.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("blockput")
            .join("cli.toml")
    }
}

/// Returns the platform-specific data directory.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("LOCALAPPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("blockput")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("blockput")
    }
}
