use serde::{Deserialize, Deserializer, Serialize};

/// Result of uploading (part of) one block, as returned by the remote service.
///
/// Field names match the service's block-put reply so records written by
/// older clients stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResult {
    /// Opaque continuation context for this block.
    #[serde(default)]
    pub ctx: String,
    /// Hex digest of the last chunk sent.
    #[serde(default)]
    pub checksum: String,
    /// CRC-32 of the last chunk sent.
    #[serde(default)]
    pub crc32: u32,
    /// Bytes of the block acknowledged so far.
    #[serde(default)]
    pub offset: u64,
    /// Upload host the context is bound to.
    #[serde(default)]
    pub host: String,
    /// Context expiry, Unix seconds.
    #[serde(default)]
    pub expired_at: i64,
}

impl BlockResult {
    /// A zero-value result carries no context and stands for "not uploaded".
    pub fn is_empty(&self) -> bool {
        self.ctx.is_empty()
    }
}

/// Persisted per-block progress of one upload.
///
/// Serialized as `{"progresses": [BlockResult | null, ...]}`, one slot per block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default, deserialize_with = "deserialize_slots")]
    pub progresses: Vec<Option<BlockResult>>,
}

/// Reads `null` slots and zero-value slots alike as unset.
fn deserialize_slots<'de, D>(deserializer: D) -> Result<Vec<Option<BlockResult>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<BlockResult>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|slot| slot.filter(|r| !r.is_empty()))
        .collect())
}

impl ProgressRecord {
    /// Creates a record with `block_count` unset slots.
    pub fn empty(block_count: usize) -> Self {
        Self {
            progresses: vec![None; block_count],
        }
    }

    /// Number of slots.
    pub fn block_count(&self) -> usize {
        self.progresses.len()
    }

    /// Returns the stored result for `index`, if any.
    pub fn get(&self, index: usize) -> Option<&BlockResult> {
        self.progresses.get(index).and_then(Option::as_ref)
    }

    /// Stores `result` in slot `index`. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, result: BlockResult) -> bool {
        match self.progresses.get_mut(index) {
            Some(slot) => {
                *slot = Some(result);
                true
            }
            None => false,
        }
    }

    /// Number of slots holding a result.
    pub fn filled(&self) -> usize {
        self.progresses.iter().filter(|s| s.is_some()).count()
    }

    /// Iterates over `(index, result)` for every set slot.
    pub fn iter_set(&self) -> impl Iterator<Item = (usize, &BlockResult)> {
        self.progresses
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|r| (i, r)))
    }
}

/// Final reply of the remote service for a committed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRet {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub key: String,
}

/// Position of an upload session in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "resuming")]
    Resuming,
    #[serde(rename = "transferring")]
    Transferring,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl SessionState {
    /// Returns `true` once the session has ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// One element of a progress subscription.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Fraction of blocks completed, in `[0, 1]`.
    Progress(f64),
    /// Sent once after the final `1.0`.
    EndOfStream,
}

/// Structured reply handed back to the host for every upload request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub key: String,
    /// Empty on success.
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub result: Option<PutRet>,
    /// Blocks already uploaded when the upload ended without success. Absent
    /// when the file was never partitioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialUpload>,
}

/// How far a failed or cancelled upload got; the record keeps these blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialUpload {
    pub completed_blocks: usize,
    pub block_count: usize,
}

impl UploadResponse {
    pub fn ok(key: impl Into<String>, result: PutRet) -> Self {
        Self {
            success: true,
            key: key.into(),
            error: String::new(),
            result: Some(result),
            partial: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            key: key.into(),
            error: error.to_string(),
            result: None,
            partial: None,
        }
    }

    /// Attaches the blocks a failed upload already completed.
    pub fn with_partial(mut self, partial: Option<PartialUpload>) -> Self {
        self.partial = partial;
        self
    }
}
