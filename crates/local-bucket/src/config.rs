use std::path::PathBuf;

use blockput_protocol::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

/// Settings of a [`LocalBucket`](crate::LocalBucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalBucketConfig {
    /// Bucket root directory.
    pub root: PathBuf,

    /// Bytes sent per chunk inside a block.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Blocks uploaded concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Lifetime of a block context, in seconds.
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: i64,

    /// Expected upload credential. Empty accepts any credential.
    #[serde(default)]
    pub token: String,
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

impl LocalBucketConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: default_chunk_size(),
            max_concurrent: default_max_concurrent(),
            context_ttl_secs: default_context_ttl_secs(),
            token: String::new(),
        }
    }
}
