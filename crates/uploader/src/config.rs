//! Uploader configuration.

use std::path::PathBuf;

use blockput_protocol::BLOCK_SIZE;
use blockput_protocol::constants::PROGRESS_DIR_NAME;
use serde::{Deserialize, Serialize};

/// Settings shared by every session of an [`Uploader`](crate::Uploader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Directory holding progress records.
    #[serde(default = "default_progress_dir")]
    pub progress_dir: PathBuf,

    /// Block size in bytes. Records are only resumable with the block size
    /// that produced them.
    #[serde(default = "default_block_size")]
    pub block_size: u64,
}

fn default_progress_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(PROGRESS_DIR_NAME)
}

fn default_block_size() -> u64 {
    BLOCK_SIZE
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            progress_dir: default_progress_dir(),
            block_size: default_block_size(),
        }
    }
}
