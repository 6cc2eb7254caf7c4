//! Host-facing upload facade.
//!
//! Owns the progress store, the cancellation controller and the remote, and
//! runs one [`UploadSession`] per upload request.

use std::path::Path;
use std::sync::{Arc, Mutex};

use blockput_protocol::{PartialUpload, PutRet, UploadResponse};
use blockput_transfer::{ProgressNotifier, ProgressStore, ProgressStream};
use tracing::{error, info, warn};

use crate::cancel::CancellationController;
use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::remote::RemoteStorage;
use crate::session::UploadSession;

/// Entry point for hosts: upload, cancel, subscribe.
pub struct Uploader {
    remote: Arc<dyn RemoteStorage>,
    store: Arc<ProgressStore>,
    cancellation: CancellationController,
    config: UploaderConfig,
    /// Notifier the next session adopts; subscribers attach here between uploads.
    pending: Mutex<ProgressNotifier>,
    current: Mutex<Option<ProgressNotifier>>,
}

impl Uploader {
    /// Creates an uploader. A progress directory that cannot be created is
    /// logged; uploads still run but are not resumable.
    pub fn new(remote: Arc<dyn RemoteStorage>, config: UploaderConfig) -> Self {
        if let Err(e) = std::fs::create_dir_all(&config.progress_dir) {
            warn!(
                dir = %config.progress_dir.display(),
                error = %e,
                "cannot create progress directory"
            );
        }
        Self {
            remote,
            store: Arc::new(ProgressStore::new(config.progress_dir.clone())),
            cancellation: CancellationController::new(),
            config,
            pending: Mutex::new(ProgressNotifier::new()),
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Uploads one file and returns the typed outcome.
    pub async fn run(
        &self,
        file_path: &Path,
        key: &str,
        credential: &str,
    ) -> Result<PutRet, UploadError> {
        self.run_session(file_path, key, credential).await.0
    }

    /// Runs one session and reports how far it got when it did not succeed.
    async fn run_session(
        &self,
        file_path: &Path,
        key: &str,
        credential: &str,
    ) -> (Result<PutRet, UploadError>, Option<PartialUpload>) {
        let scope = self.cancellation.acquire();
        let notifier = {
            let mut current = self.current.lock().unwrap();
            let notifier = std::mem::take(&mut *self.pending.lock().unwrap());
            *current = Some(notifier.clone());
            notifier
        };

        let session = UploadSession::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.store),
            notifier.clone(),
            scope.token(),
            self.config.block_size,
        );
        let result = session.start(file_path, key, credential).await;

        {
            let mut current = self.current.lock().unwrap();
            if current.as_ref().is_some_and(|n| n.same_as(&notifier)) {
                *current = None;
            }
        }
        drop(scope);

        let partial = match (&result, session.block_count()) {
            (Ok(_), _) | (_, 0) => None,
            (Err(_), block_count) => Some(PartialUpload {
                completed_blocks: session.completed_blocks(),
                block_count,
            }),
        };
        (result, partial)
    }

    /// Uploads one file and folds the outcome into an [`UploadResponse`].
    pub async fn upload(&self, file_path: &Path, key: &str, credential: &str) -> UploadResponse {
        let (result, partial) = self.run_session(file_path, key, credential).await;
        match result {
            Ok(ret) => {
                info!(key, hash = %ret.hash, "upload succeeded");
                UploadResponse::ok(key, ret)
            }
            Err(e) if e.is_cancelled() => UploadResponse::failed(key, e).with_partial(partial),
            Err(e) => {
                error!(key, error = %e, "upload failed");
                UploadResponse::failed(key, e).with_partial(partial)
            }
        }
    }

    /// Cancels the running upload. Returns `false` if none was running.
    pub fn cancel_upload(&self) -> bool {
        self.cancellation.request_cancel()
    }

    /// Subscribes to progress of the running upload, or of the next one if
    /// none is running.
    pub fn subscribe(&self) -> Option<ProgressStream> {
        let current = self.current.lock().unwrap();
        match current.as_ref() {
            Some(notifier) => notifier.subscribe(),
            None => self.pending.lock().unwrap().subscribe(),
        }
    }
}
