//! Remote storage capability consumed by upload sessions.
//!
//! `RemoteStorage` is implemented by a backend crate. Keeping it a trait
//! decouples the session logic from any transport and makes it testable
//! with scripted mocks.

use std::future::Future;
use std::pin::Pin;

use blockput_protocol::{BlockResult, CONTEXT_EXPIRY_MARGIN_SECS, PutRet};
use blockput_transfer::FileDescriptor;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;

/// Everything the remote needs to (re)start a resumable upload.
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Upload credential issued by the host.
    pub credential: String,
    /// Logical key of the object.
    pub key: String,
    pub file: FileDescriptor,
    pub block_size: u64,
    /// Seed state, one slot per block. Set slots hold contexts from an
    /// earlier attempt; the remote skips or continues those blocks.
    pub progresses: Vec<Option<BlockResult>>,
}

/// A block result reported by the remote while the upload runs.
///
/// Sent after every acknowledged chunk; the block is complete once
/// `result.offset` equals the block length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    pub index: usize,
    pub result: BlockResult,
}

/// Channel the remote reports block results on.
pub type BlockSender = mpsc::UnboundedSender<BlockEvent>;

/// A running `put_file` call.
pub type PutFuture<'a> = Pin<Box<dyn Future<Output = Result<PutRet, UploadError>> + Send + 'a>>;

/// Abstract resumable-upload client.
pub trait RemoteStorage: Send + Sync {
    /// Uploads every block not already covered by `request.progresses` and
    /// commits the file.
    ///
    /// Must report each acknowledged block (or chunk) on `events`, must stop
    /// dispatching new blocks once `cancel` fires, and should return
    /// [`UploadError::Cancelled`] when it aborted because of it.
    fn put_file(
        &self,
        request: PutRequest,
        events: BlockSender,
        cancel: CancellationToken,
    ) -> PutFuture<'_>;

    /// Whether a stored block result can no longer be resumed at `now`
    /// (Unix seconds).
    fn is_expired(&self, result: &BlockResult, now: i64) -> bool {
        context_expired(result, now)
    }
}

/// Default expiry rule: a context is unusable from one day before its
/// `expired_at`. Results without a context never expire.
pub fn context_expired(result: &BlockResult, now: i64) -> bool {
    if result.ctx.is_empty() {
        return false;
    }
    now > result.expired_at - CONTEXT_EXPIRY_MARGIN_SECS
}
