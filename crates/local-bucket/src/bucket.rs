//! Block upload, resume and commit against the local filesystem.

use std::collections::VecDeque;
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use blockput_protocol::{BlockResult, PutRet};
use blockput_transfer::{
    BlockPlan, BlockReader, Chunk, ChunkWriter, calculate_file_checksum, validate_object_key,
};
use blockput_uploader::{
    BlockEvent, BlockSender, PutRequest, RemoteStorage, UploadError, context_expired,
};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LocalBucketConfig;
use crate::error::BucketError;
use crate::faults::FaultInjector;
use crate::token::validate_token;

const STAGING_DIR: &str = "staging";
const OBJECTS_DIR: &str = "objects";

/// Future of one block upload, tagged with its index.
type BlockFuture<'a> =
    Pin<Box<dyn Future<Output = (usize, Result<BlockResult, BucketError>)> + Send + 'a>>;

/// Running totals, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct UploadCounters {
    blocks_started: AtomicUsize,
    chunks_stored: AtomicUsize,
    commits: AtomicUsize,
}

impl UploadCounters {
    /// Blocks dispatched for upload (fresh or continued).
    pub fn blocks_started(&self) -> usize {
        self.blocks_started.load(Ordering::Relaxed)
    }

    pub fn chunks_stored(&self) -> usize {
        self.chunks_stored.load(Ordering::Relaxed)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }
}

/// Where a stored chunk ended up.
struct StoredChunk {
    end: u64,
    checksum: String,
    crc32: u32,
}

/// A bucket on the local filesystem.
pub struct LocalBucket {
    config: LocalBucketConfig,
    faults: FaultInjector,
    counters: UploadCounters,
}

impl LocalBucket {
    pub fn new(config: LocalBucketConfig) -> Self {
        Self {
            config,
            faults: FaultInjector::new(),
            counters: UploadCounters::default(),
        }
    }

    pub fn config(&self) -> &LocalBucketConfig {
        &self.config
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn counters(&self) -> &UploadCounters {
        &self.counters
    }

    /// Path a committed object is stored at.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, BucketError> {
        validate_object_key(key).map_err(|_| BucketError::InvalidKey(key.to_string()))?;
        Ok(self.config.root.join(OBJECTS_DIR).join(key))
    }

    fn staging_dir(&self) -> PathBuf {
        self.config.root.join(STAGING_DIR)
    }

    fn host(&self) -> String {
        format!("file://{}", self.config.root.display())
    }

    /// Bytes staged under `ctx`, 0 if nothing is.
    fn staged_len(&self, ctx: &str) -> u64 {
        if validate_object_key(ctx).is_err() {
            return 0;
        }
        std::fs::metadata(self.staging_dir().join(ctx))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Keeps a seeded result only if it can be continued here.
    fn usable_seed(
        &self,
        plan: &BlockPlan,
        index: usize,
        seed: Option<BlockResult>,
        now: i64,
    ) -> Option<BlockResult> {
        let seed = seed?;
        if seed.is_empty() || context_expired(&seed, now) {
            return None;
        }
        if seed.offset > plan.block_len(index) || self.staged_len(&seed.ctx) < seed.offset {
            debug!(block = index, ctx = %seed.ctx, "stored context not found, restarting block");
            return None;
        }
        Some(seed)
    }

    async fn put(
        &self,
        request: PutRequest,
        events: BlockSender,
        cancel: CancellationToken,
    ) -> Result<PutRet, BucketError> {
        if !self.config.token.is_empty() && !validate_token(&request.credential, &self.config.token)
        {
            return Err(BucketError::Unauthorized);
        }
        let object = self.object_path(&request.key)?;

        let plan = BlockPlan::new(request.file.size, request.block_size);
        let now = chrono::Utc::now().timestamp();
        let mut seeds = request.progresses;
        seeds.resize(plan.block_count(), None);

        let mut results: Vec<Option<BlockResult>> = vec![None; plan.block_count()];
        let mut queue = VecDeque::new();
        for (index, seed) in seeds.into_iter().enumerate() {
            match self.usable_seed(&plan, index, seed, now) {
                Some(done) if plan.is_block_complete(index, done.offset) => {
                    results[index] = Some(done);
                }
                seed => queue.push_back((index, seed)),
            }
        }
        debug!(
            key = %request.key,
            blocks = plan.block_count(),
            pending = queue.len(),
            "dispatching blocks"
        );

        let source = request.file.path;
        let max_concurrent = self.config.max_concurrent.max(1);
        let mut in_flight: FuturesUnordered<BlockFuture<'_>> = FuturesUnordered::new();
        let mut failure: Option<BucketError> = None;

        loop {
            while in_flight.len() < max_concurrent && failure.is_none() && !cancel.is_cancelled()
            {
                let Some((index, seed)) = queue.pop_front() else {
                    break;
                };
                let (source, events, cancel) = (&source, &events, &cancel);
                in_flight.push(Box::pin(async move {
                    let outcome = self
                        .upload_block(source, plan, index, seed, events, cancel)
                        .await;
                    (index, outcome)
                }));
            }

            let Some((index, outcome)) = in_flight.next().await else {
                break;
            };
            match outcome {
                Ok(result) => results[index] = Some(result),
                Err(BucketError::Cancelled) => {}
                Err(e) => {
                    warn!(block = index, error = %e, "block upload failed");
                    failure.get_or_insert(e);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(BucketError::Cancelled);
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let blocks = results
            .into_iter()
            .enumerate()
            .map(|(index, r)| r.ok_or(BucketError::MissingBlock(index)))
            .collect::<Result<Vec<_>, _>>()?;
        self.commit(request.key, object, plan, blocks).await
    }

    /// Uploads block `index` chunk by chunk, continuing `seed` if given.
    async fn upload_block(
        &self,
        source: &Path,
        plan: BlockPlan,
        index: usize,
        seed: Option<BlockResult>,
        events: &BlockSender,
        cancel: &CancellationToken,
    ) -> Result<BlockResult, BucketError> {
        self.counters.blocks_started.fetch_add(1, Ordering::Relaxed);
        let block_len = plan.block_len(index);
        let (ctx, mut offset) = match seed {
            Some(seed) => {
                debug!(block = index, offset = seed.offset, "continuing block");
                (seed.ctx, seed.offset)
            }
            None => (uuid::Uuid::new_v4().simple().to_string(), 0),
        };
        let expired_at = chrono::Utc::now().timestamp() + self.config.context_ttl_secs;

        loop {
            if let Some(delay) = self.faults.latency() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                debug!(block = index, offset, "block aborted");
                return Err(BucketError::Cancelled);
            }
            if self.faults.should_fail_chunk() {
                return Err(BucketError::Injected(format!(
                    "chunk at offset {offset} of block {index}"
                )));
            }

            let len = std::cmp::min(self.config.chunk_size.max(1), block_len - offset);
            let stored = self
                .store_chunk(source, plan, index, &ctx, offset, len)
                .await?;
            self.counters.chunks_stored.fetch_add(1, Ordering::Relaxed);
            offset = stored.end;

            let result = BlockResult {
                ctx: ctx.clone(),
                checksum: stored.checksum,
                crc32: stored.crc32,
                offset,
                host: self.host(),
                expired_at,
            };
            let _ = events.send(BlockEvent {
                index,
                result: result.clone(),
            });
            if offset >= block_len {
                return Ok(result);
            }
        }
    }

    /// Copies `len` bytes at `offset` of block `index` into the block's
    /// staging file.
    async fn store_chunk(
        &self,
        source: &Path,
        plan: BlockPlan,
        index: usize,
        ctx: &str,
        offset: u64,
        len: u64,
    ) -> Result<StoredChunk, BucketError> {
        let source = source.to_path_buf();
        let staging = self.staging_dir();
        let ctx = ctx.to_string();
        let stored = tokio::task::spawn_blocking(move || -> Result<StoredChunk, BucketError> {
            let mut reader = BlockReader::open(&source, plan.block_size())?;
            let chunk = reader.read_chunk(index, offset, len)?;
            let staged = Chunk {
                offset,
                file_path: ctx,
                ..chunk
            };
            let end = ChunkWriter::new(&staging).write_chunk(&staged)?;
            Ok(StoredChunk {
                end,
                checksum: staged.checksum,
                crc32: staged.crc32,
            })
        })
        .await??;
        Ok(stored)
    }

    async fn commit(
        &self,
        key: String,
        object: PathBuf,
        plan: BlockPlan,
        blocks: Vec<BlockResult>,
    ) -> Result<PutRet, BucketError> {
        if self.faults.should_fail_commit() {
            return Err(BucketError::Injected(format!("commit of {key}")));
        }
        let staging = self.staging_dir();
        let hash = tokio::task::spawn_blocking(move || -> Result<String, BucketError> {
            assemble(&staging, &object, &plan, &blocks)?;
            for block in &blocks {
                let _ = std::fs::remove_file(staging.join(&block.ctx));
            }
            Ok(calculate_file_checksum(&object)?)
        })
        .await??;

        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        info!(key = %key, hash = %hash, "object committed");
        Ok(PutRet { hash, key })
    }
}

/// Concatenates staged blocks into `object` through a temp file and rename.
fn assemble(
    staging: &Path,
    object: &Path,
    plan: &BlockPlan,
    blocks: &[BlockResult],
) -> Result<(), BucketError> {
    if let Some(parent) = object.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let name = object
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = object.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let result = (|| -> Result<(), BucketError> {
        let mut out = std::fs::File::create(&tmp)?;
        for (index, block) in blocks.iter().enumerate() {
            let expected = plan.block_len(index);
            let mut part = std::fs::File::open(staging.join(&block.ctx))?.take(expected);
            let actual = std::io::copy(&mut part, &mut out)?;
            if actual != expected {
                return Err(BucketError::ShortBlock {
                    index,
                    expected,
                    actual,
                });
            }
        }
        out.sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, object)?;
    Ok(())
}

impl RemoteStorage for LocalBucket {
    fn put_file(
        &self,
        request: PutRequest,
        events: BlockSender,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<PutRet, UploadError>> + Send + '_>> {
        Box::pin(async move {
            self.put(request, events, cancel)
                .await
                .map_err(UploadError::from)
        })
    }
}
