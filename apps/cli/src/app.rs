//! Runs one upload against the local bucket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use blockput_local_bucket::LocalBucket;
use blockput_protocol::{ProgressEvent, UploadResponse};
use blockput_uploader::Uploader;
use tracing::info;

use crate::config::Config;

/// Uploads `file` under `key`, printing progress to stderr.
///
/// Ctrl-C cancels the upload; the progress record stays on disk and the
/// next run with the same file and key resumes.
pub async fn run(
    config: Config,
    file: PathBuf,
    key: String,
    credential: String,
) -> anyhow::Result<UploadResponse> {
    let bucket = Arc::new(LocalBucket::new(config.bucket_config()));
    let uploader = Arc::new(Uploader::new(bucket, config.uploader_config()));

    let mut progress = uploader
        .subscribe()
        .context("progress stream unavailable")?;
    let reporter = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            match event {
                ProgressEvent::Progress(fraction) => {
                    eprintln!("progress {:>5.1}%", fraction * 100.0)
                }
                ProgressEvent::EndOfStream => eprintln!("upload finished"),
            }
        }
    });

    info!(file = %file.display(), key = %key, "uploading");
    let mut upload = {
        let uploader = Arc::clone(&uploader);
        tokio::spawn(async move { uploader.upload(&file, &key, &credential).await })
    };

    let response = tokio::select! {
        response = &mut upload => response?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, cancelling upload");
            uploader.cancel_upload();
            upload.await?
        }
    };

    let _ = reporter.await;
    Ok(response)
}
