//! One resumable upload, from stat to commit.
//!
//! State machine: `Idle → Resuming → Transferring → {Completed | Failed |
//! Cancelled}`. The session is the single coordinator for its file: it
//! consumes block events from the remote one at a time, persists each result
//! and publishes progress from the size of the completed-block set, so the
//! published fraction never goes down even when blocks finish out of order.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use blockput_protocol::{BlockResult, ProgressRecord, PutRet, SessionState};
use blockput_transfer::{
    BlockPlan, FileDescriptor, ProgressNotifier, ProgressStore, ProgressStream, fingerprint,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::remote::{BlockEvent, PutFuture, PutRequest, RemoteStorage};

/// Drives one upload of one file.
pub struct UploadSession {
    remote: Arc<dyn RemoteStorage>,
    store: Arc<ProgressStore>,
    notifier: ProgressNotifier,
    cancel: CancellationToken,
    block_size: u64,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    state: SessionState,
    completed: BTreeSet<usize>,
    block_count: usize,
    cancelled: bool,
}

impl UploadSession {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        store: Arc<ProgressStore>,
        notifier: ProgressNotifier,
        cancel: CancellationToken,
        block_size: u64,
    ) -> Self {
        Self {
            remote,
            store,
            notifier,
            cancel,
            block_size,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                completed: BTreeSet::new(),
                block_count: 0,
                cancelled: false,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    /// Number of blocks known to be fully uploaded.
    pub fn completed_blocks(&self) -> usize {
        self.inner.lock().unwrap().completed.len()
    }

    /// Block count of the file, 0 until the file has been read.
    pub fn block_count(&self) -> usize {
        self.inner.lock().unwrap().block_count
    }

    /// Subscribes to this session's progress.
    pub fn subscribe(&self) -> Option<ProgressStream> {
        self.notifier.subscribe()
    }

    /// Uploads `file_path` under `key`.
    ///
    /// On failure or cancellation the progress record is kept, so calling
    /// `start` on a new session with the same file and key resumes.
    pub async fn start(
        &self,
        file_path: &Path,
        key: &str,
        credential: &str,
    ) -> Result<PutRet, UploadError> {
        if self.state() != SessionState::Idle {
            return Err(UploadError::AlreadyStarted);
        }
        if self.block_size == 0 {
            warn!(key, "refusing upload with a zero block size");
            self.notifier.close();
            self.transition(SessionState::Failed);
            return Err(UploadError::InvalidBlockSize(self.block_size));
        }

        let file = match FileDescriptor::stat(file_path) {
            Ok(file) => file,
            Err(source) => {
                warn!(path = %file_path.display(), error = %source, "cannot read source file");
                self.notifier.close();
                self.transition(SessionState::Failed);
                return Err(UploadError::FileUnreadable {
                    path: file_path.to_path_buf(),
                    source,
                });
            }
        };

        let plan = BlockPlan::new(file.size, self.block_size);
        let fp = fingerprint(key, &file.path, file.modified);
        let record = self.resume_record(&fp, &plan);

        let _lease = match self.store.open(&fp, record.clone()) {
            Ok(lease) => lease,
            Err(e) => {
                warn!(key, fingerprint = %fp, error = %e, "upload already running for this file");
                self.notifier.close();
                self.transition(SessionState::Failed);
                return Err(UploadError::SessionBusy(fp));
            }
        };

        let resumed = {
            let mut inner = self.inner.lock().unwrap();
            inner.block_count = plan.block_count();
            for (index, result) in record.iter_set() {
                if plan.is_block_complete(index, result.offset) {
                    inner.completed.insert(index);
                }
            }
            inner.completed.len()
        };
        self.transition(SessionState::Resuming);
        info!(
            key,
            fingerprint = %fp,
            size = file.size,
            blocks = plan.block_count(),
            resumed,
            "upload session started"
        );

        if self.cancel.is_cancelled() {
            return Err(self.cancelled(key));
        }
        if resumed > 0 && resumed < plan.block_count() {
            self.notifier.publish(resumed, plan.block_count());
        }

        self.transition(SessionState::Transferring);
        let request = PutRequest {
            credential: credential.to_string(),
            key: key.to_string(),
            file,
            block_size: self.block_size,
            progresses: record.progresses,
        };
        let outcome = self.transfer(&fp, &plan, request).await;

        // A commit that beat the cancel request stands.
        match outcome {
            Ok(ret) => {
                if self.cancel.is_cancelled() {
                    debug!(key, "cancel arrived after the remote committed");
                }
                self.complete(key, &fp);
                Ok(ret)
            }
            Err(_) if self.cancel.is_cancelled() => Err(self.cancelled(key)),
            Err(e) => {
                warn!(key, error = %e, "upload failed, progress kept for resume");
                self.notifier.close();
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Loads and validates the stored record, or starts an empty one.
    fn resume_record(&self, fp: &str, plan: &BlockPlan) -> ProgressRecord {
        let Some(stored) = self.store.load(fp) else {
            return ProgressRecord::empty(plan.block_count());
        };
        let now = chrono::Utc::now().timestamp();
        ProgressStore::validate(stored, plan.block_count(), now, |r, now| {
            self.remote.is_expired(r, now)
        })
    }

    /// Runs the remote upload while consuming its block events.
    async fn transfer(
        &self,
        fp: &str,
        plan: &BlockPlan,
        request: PutRequest,
    ) -> Result<PutRet, UploadError> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut upload = self
            .remote
            .put_file(request, events_tx, self.cancel.clone());

        let mut finished = None;
        let mut cancel_seen = false;
        while finished.is_none() {
            tokio::select! {
                biased;
                Some(event) = events_rx.recv() => {
                    let BlockEvent { index, result } = event;
                    let (offset, live) = (result.offset, !self.cancel.is_cancelled());
                    let persist = self.persist(fp, index, result);
                    drive_while(&mut upload, &mut finished, persist).await;
                    self.acknowledge(plan, index, offset, live);
                }
                _ = self.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    self.stop_notifications();
                    debug!(fingerprint = fp, "cancel observed, waiting for transfer to stop");
                }
                result = &mut upload => finished = Some(result),
            }
        }

        // Results reported right before the remote returned.
        while let Ok(BlockEvent { index, result }) = events_rx.try_recv() {
            let (offset, live) = (result.offset, !self.cancel.is_cancelled());
            self.persist(fp, index, result).await;
            self.acknowledge(plan, index, offset, live);
        }
        finished.unwrap_or_else(|| {
            Err(UploadError::Transfer("remote ended without a result".into()))
        })
    }

    /// Writes one block result to the record on the blocking pool.
    async fn persist(&self, fp: &str, index: usize, result: BlockResult) {
        let store = Arc::clone(&self.store);
        let fingerprint = fp.to_string();
        match tokio::task::spawn_blocking(move || store.save_block(&fingerprint, index, result))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(block = index, error = %e, "failed to persist block result"),
            Err(e) => warn!(block = index, error = %e, "persist task failed"),
        }
    }

    /// Counts block `index` if `offset` completes it. Progress is published
    /// only for results that arrived before cancellation (`live`).
    fn acknowledge(&self, plan: &BlockPlan, index: usize, offset: u64, live: bool) {
        if !plan.is_block_complete(index, offset) {
            debug!(block = index, offset, "partial block acknowledged");
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.completed.insert(index) {
            return;
        }
        debug!(
            block = index,
            completed = inner.completed.len(),
            total = inner.block_count,
            "block completed"
        );
        if live && !inner.cancelled {
            self.notifier.publish(inner.completed.len(), inner.block_count);
        }
    }

    fn complete(&self, key: &str, fp: &str) {
        let (completed, total) = {
            let inner = self.inner.lock().unwrap();
            (inner.completed.len(), inner.block_count)
        };
        if completed < total {
            // The remote may finish without reporting blocks it skipped.
            debug!(completed, total, "remote finished before reporting every block");
        }
        self.notifier.publish(total, total);

        if let Err(e) = self.store.clear(fp) {
            warn!(fingerprint = fp, error = %e, "failed to remove progress record");
        }
        self.transition(SessionState::Completed);
        info!(key, "upload completed");
    }

    fn stop_notifications(&self) {
        self.inner.lock().unwrap().cancelled = true;
        self.notifier.close();
    }

    fn cancelled(&self, key: &str) -> UploadError {
        self.stop_notifications();
        self.transition(SessionState::Cancelled);
        info!(key, "upload cancelled, progress kept for resume");
        UploadError::Cancelled
    }

    fn transition(&self, to: SessionState) {
        let mut inner = self.inner.lock().unwrap();
        debug!(from = ?inner.state, to = ?to, "session state");
        inner.state = to;
    }
}

/// Awaits `work` while still polling the remote, so record writes do not
/// stall the transfer. Stores the remote's result in `finished` if it
/// returns meanwhile.
async fn drive_while<W: Future>(
    upload: &mut PutFuture<'_>,
    finished: &mut Option<Result<PutRet, UploadError>>,
    work: W,
) -> W::Output {
    tokio::pin!(work);
    loop {
        tokio::select! {
            biased;
            out = &mut work => return out,
            result = &mut *upload, if finished.is_none() => *finished = Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockput_protocol::{BLOCK_SIZE, ProgressEvent};
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;

    use ProgressEvent::{EndOfStream, Progress};

    const TEN_MB: u64 = 10_000_000;

    #[derive(Clone)]
    enum Step {
        /// Reports block `i` fully uploaded.
        Block(usize),
        /// Reports `offset` bytes of block `i`.
        Partial(usize, u64),
        /// Fires the session's token, as a host cancel request would.
        CancelFromOutside,
        /// Waits for the token and aborts.
        WaitCancel,
        Fail(&'static str),
        Finish,
    }

    struct ScriptedRemote {
        steps: Vec<Step>,
        requests: Mutex<Vec<PutRequest>>,
    }

    impl ScriptedRemote {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> Option<PutRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    fn fresh_result(index: usize, offset: u64) -> BlockResult {
        BlockResult {
            ctx: format!("ctx-{index}-{offset}"),
            checksum: String::new(),
            crc32: 0,
            offset,
            host: "mock".into(),
            expired_at: chrono::Utc::now().timestamp() + 7 * 24 * 3600,
        }
    }

    impl RemoteStorage for ScriptedRemote {
        fn put_file(
            &self,
            request: PutRequest,
            events: crate::remote::BlockSender,
            cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<PutRet, UploadError>> + Send + '_>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(request.clone());
                let plan = BlockPlan::new(request.file.size, request.block_size);
                let done = PutRet {
                    hash: "hash".into(),
                    key: request.key.clone(),
                };
                for step in self.steps.clone() {
                    match step {
                        Step::Block(index) => {
                            let result = fresh_result(index, plan.block_len(index));
                            let _ = events.send(BlockEvent { index, result });
                            tokio::task::yield_now().await;
                        }
                        Step::Partial(index, offset) => {
                            let result = fresh_result(index, offset);
                            let _ = events.send(BlockEvent { index, result });
                            tokio::task::yield_now().await;
                        }
                        Step::CancelFromOutside => cancel.cancel(),
                        Step::WaitCancel => {
                            cancel.cancelled().await;
                            return Err(UploadError::Cancelled);
                        }
                        Step::Fail(msg) => return Err(UploadError::Transfer(msg.into())),
                        Step::Finish => return Ok(done),
                    }
                }
                Ok(done)
            })
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        file: PathBuf,
        store: Arc<ProgressStore>,
    }

    impl Fixture {
        fn new(size: u64) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let file = tmp.path().join("src.bin");
            std::fs::File::create(&file).unwrap().set_len(size).unwrap();
            let store = Arc::new(ProgressStore::new(tmp.path().join("progress")));
            Self {
                _tmp: tmp,
                file,
                store,
            }
        }

        fn fingerprint(&self, key: &str) -> String {
            let fd = FileDescriptor::stat(&self.file).unwrap();
            fingerprint(key, &fd.path, fd.modified)
        }

        fn session(&self, remote: Arc<ScriptedRemote>, cancel: CancellationToken) -> UploadSession {
            UploadSession::new(
                remote,
                Arc::clone(&self.store),
                ProgressNotifier::new(),
                cancel,
                BLOCK_SIZE,
            )
        }

        /// Writes a record as an earlier, interrupted attempt would have.
        fn seed_record(&self, key: &str, slots: &[(usize, BlockResult)]) {
            let fp = self.fingerprint(key);
            let _lease = self.store.open(&fp, ProgressRecord::empty(3)).unwrap();
            for (index, result) in slots {
                self.store.save_block(&fp, *index, result.clone()).unwrap();
            }
        }
    }

    fn full_block(index: usize) -> BlockResult {
        fresh_result(index, BlockPlan::new(TEN_MB, BLOCK_SIZE).block_len(index))
    }

    #[tokio::test]
    async fn out_of_order_blocks_reach_full_progress() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![
            Step::Block(1),
            Step::Block(0),
            Step::Block(2),
            Step::Finish,
        ]);
        let session = fx.session(remote, CancellationToken::new());
        let stream = session.subscribe().unwrap();

        let ret = session.start(&fx.file, "k", "tok").await.unwrap();
        assert_eq!(ret.key, "k");
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.block_count(), 3);
        assert_eq!(session.completed_blocks(), 3);

        assert_eq!(
            stream.collect().await,
            vec![Progress(1.0 / 3.0), Progress(2.0 / 3.0), Progress(1.0), EndOfStream]
        );
        assert!(!fx.store.record_path(&fx.fingerprint("k")).exists());
    }

    #[tokio::test]
    async fn cancel_after_first_block_keeps_record() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![
            Step::Block(0),
            Step::CancelFromOutside,
            Step::WaitCancel,
        ]);
        let session = fx.session(remote, CancellationToken::new());
        let stream = session.subscribe().unwrap();

        let err = session.start(&fx.file, "k", "tok").await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(stream.collect().await, vec![Progress(1.0 / 3.0)]);

        let record = fx.store.load(&fx.fingerprint("k")).unwrap();
        assert_eq!(record.get(0).unwrap().offset, BLOCK_SIZE);
        assert!(record.get(1).is_none());
        assert!(record.get(2).is_none());
    }

    #[tokio::test]
    async fn results_after_cancel_are_persisted_but_not_published() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![
            Step::Block(0),
            Step::CancelFromOutside,
            Step::Block(1),
            Step::Block(2),
            Step::WaitCancel,
        ]);
        let session = fx.session(remote, CancellationToken::new());
        let stream = session.subscribe().unwrap();

        let err = session.start(&fx.file, "k", "tok").await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(stream.collect().await, vec![Progress(1.0 / 3.0)]);
        assert_eq!(fx.store.load(&fx.fingerprint("k")).unwrap().filled(), 3);
    }

    #[tokio::test]
    async fn cancel_before_start_skips_transfer() {
        let fx = Fixture::new(TEN_MB);
        fx.seed_record("k", &[(0, full_block(0))]);

        let remote = ScriptedRemote::new(vec![Step::Finish]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = fx.session(Arc::clone(&remote), cancel);

        let err = session.start(&fx.file, "k", "tok").await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(remote.last_request().is_none());
        assert_eq!(fx.store.load(&fx.fingerprint("k")).unwrap().filled(), 1);
    }

    #[tokio::test]
    async fn commit_that_beats_cancel_completes() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![Step::Block(0), Step::CancelFromOutside, Step::Finish]);
        let session = fx.session(remote, CancellationToken::new());

        let ret = session.start(&fx.file, "k", "tok").await.unwrap();
        assert_eq!(ret.key, "k");
        assert_eq!(session.state(), SessionState::Completed);
        assert!(!fx.store.record_path(&fx.fingerprint("k")).exists());
    }

    #[tokio::test]
    async fn remote_error_after_cancel_is_cancelled() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![
            Step::Block(0),
            Step::CancelFromOutside,
            Step::Fail("connection reset"),
        ]);
        let session = fx.session(remote, CancellationToken::new());

        let err = session.start(&fx.file, "k", "tok").await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(fx.store.record_path(&fx.fingerprint("k")).exists());
    }

    #[tokio::test]
    async fn zero_block_size_fails_without_transfer() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![Step::Finish]);
        let session = UploadSession::new(
            Arc::clone(&remote) as Arc<dyn RemoteStorage>,
            Arc::clone(&fx.store),
            ProgressNotifier::new(),
            CancellationToken::new(),
            0,
        );

        let err = session.start(&fx.file, "k", "tok").await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidBlockSize(0)));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(remote.last_request().is_none());
    }

    #[tokio::test]
    async fn remote_keeps_running_while_record_is_written() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let mut upload: PutFuture<'_> = Box::pin(async move {
            let _ = tx.send(());
            Ok(PutRet {
                hash: "h".into(),
                key: "k".into(),
            })
        });
        let mut finished = None;

        // The write only completes once the remote has been polled.
        drive_while(&mut upload, &mut finished, async { rx.await.unwrap() }).await;
        assert_eq!(finished.unwrap().unwrap().hash, "h");
    }

    #[tokio::test]
    async fn failure_keeps_record_for_resume() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![Step::Block(1), Step::Block(0), Step::Fail("boom")]);
        let session = fx.session(remote, CancellationToken::new());
        let stream = session.subscribe().unwrap();

        let err = session.start(&fx.file, "k", "tok").await.unwrap_err();
        assert!(matches!(err, UploadError::Transfer(ref m) if m == "boom"));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(
            stream.collect().await,
            vec![Progress(1.0 / 3.0), Progress(2.0 / 3.0)]
        );

        let record = fx.store.load(&fx.fingerprint("k")).unwrap();
        assert!(record.get(0).is_some());
        assert!(record.get(1).is_some());
        assert!(record.get(2).is_none());
    }

    #[tokio::test]
    async fn resume_seeds_unexpired_results() {
        let fx = Fixture::new(TEN_MB);
        fx.seed_record("k", &[(0, full_block(0))]);

        let remote = ScriptedRemote::new(vec![Step::Block(2), Step::Block(1), Step::Finish]);
        let session = fx.session(Arc::clone(&remote), CancellationToken::new());
        let stream = session.subscribe().unwrap();

        session.start(&fx.file, "k", "tok").await.unwrap();

        let request = remote.last_request().unwrap();
        assert_eq!(request.progresses.len(), 3);
        let seeded = request.progresses[0].as_ref().unwrap();
        assert_eq!(seeded.ctx, full_block(0).ctx);
        assert_eq!(seeded.offset, BLOCK_SIZE);
        assert!(request.progresses[1].is_none());
        assert!(request.progresses[2].is_none());

        assert_eq!(
            stream.collect().await,
            vec![Progress(1.0 / 3.0), Progress(2.0 / 3.0), Progress(1.0), EndOfStream]
        );
    }

    #[tokio::test]
    async fn expired_entry_restarts_every_block() {
        let fx = Fixture::new(TEN_MB);
        let mut stale = full_block(1);
        stale.expired_at = chrono::Utc::now().timestamp() - 60;
        fx.seed_record("k", &[(0, full_block(0)), (1, stale)]);

        let remote = ScriptedRemote::new(vec![
            Step::Block(0),
            Step::Block(1),
            Step::Block(2),
            Step::Finish,
        ]);
        let session = fx.session(Arc::clone(&remote), CancellationToken::new());
        session.start(&fx.file, "k", "tok").await.unwrap();

        let request = remote.last_request().unwrap();
        assert!(request.progresses.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn partial_results_persist_without_progress() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![
            Step::Partial(0, 1024),
            Step::Block(1),
            Step::Fail("network"),
        ]);
        let session = fx.session(remote, CancellationToken::new());
        let stream = session.subscribe().unwrap();

        session.start(&fx.file, "k", "tok").await.unwrap_err();
        assert_eq!(stream.collect().await, vec![Progress(1.0 / 3.0)]);
        assert_eq!(session.completed_blocks(), 1);

        let record = fx.store.load(&fx.fingerprint("k")).unwrap();
        assert_eq!(record.get(0).unwrap().offset, 1024);
    }

    #[tokio::test]
    async fn success_without_every_block_still_reaches_full() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![Step::Block(0), Step::Finish]);
        let session = fx.session(remote, CancellationToken::new());
        let stream = session.subscribe().unwrap();

        session.start(&fx.file, "k", "tok").await.unwrap();
        assert_eq!(
            stream.collect().await,
            vec![Progress(1.0 / 3.0), Progress(1.0), EndOfStream]
        );
    }

    #[tokio::test]
    async fn duplicate_completions_count_once() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![
            Step::Block(0),
            Step::Block(0),
            Step::Block(1),
            Step::Block(2),
            Step::Finish,
        ]);
        let session = fx.session(remote, CancellationToken::new());
        let stream = session.subscribe().unwrap();

        session.start(&fx.file, "k", "tok").await.unwrap();
        assert_eq!(
            stream.collect().await,
            vec![Progress(1.0 / 3.0), Progress(2.0 / 3.0), Progress(1.0), EndOfStream]
        );
    }

    #[tokio::test]
    async fn empty_file_uploads_as_one_block() {
        let fx = Fixture::new(0);
        let remote = ScriptedRemote::new(vec![Step::Block(0), Step::Finish]);
        let session = fx.session(remote, CancellationToken::new());
        let stream = session.subscribe().unwrap();

        session.start(&fx.file, "k", "tok").await.unwrap();
        assert_eq!(session.block_count(), 1);
        assert_eq!(stream.collect().await, vec![Progress(1.0), EndOfStream]);
    }

    #[tokio::test]
    async fn unreadable_file_fails_before_transfer() {
        let fx = Fixture::new(TEN_MB);
        let remote = ScriptedRemote::new(vec![Step::Finish]);
        let session = fx.session(Arc::clone(&remote), CancellationToken::new());

        let missing = fx.file.with_file_name("missing.bin");
        let err = session.start(&missing, "k", "tok").await.unwrap_err();
        assert!(matches!(err, UploadError::FileUnreadable { .. }));
        assert!(err.to_string().contains("missing.bin"));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(remote.last_request().is_none());
    }

    #[tokio::test]
    async fn concurrent_session_for_same_file_is_busy() {
        let fx = Fixture::new(TEN_MB);
        let _lease = fx
            .store
            .open(&fx.fingerprint("k"), ProgressRecord::empty(3))
            .unwrap();

        let session = fx.session(ScriptedRemote::new(vec![Step::Finish]), CancellationToken::new());
        let err = session.start(&fx.file, "k", "tok").await.unwrap_err();
        assert!(matches!(err, UploadError::SessionBusy(_)));
    }

    #[tokio::test]
    async fn session_cannot_start_twice() {
        let fx = Fixture::new(TEN_MB);
        let session = fx.session(ScriptedRemote::new(vec![Step::Finish]), CancellationToken::new());

        session.start(&fx.file, "k", "tok").await.unwrap();
        assert!(matches!(
            session.start(&fx.file, "k", "tok").await,
            Err(UploadError::AlreadyStarted)
        ));
    }
}
