//! Resumable block uploads.
//!
//! This crate implements the **session logic** for uploading one file to a
//! remote storage service. It has no transport of its own: the remote is
//! reached through the [`RemoteStorage`] trait, which a backend crate
//! implements.
//!
//! # Flow
//!
//! 1. **Stat**: read size and mtime of the source file
//! 2. **Resume**: load the progress record for the file's fingerprint and
//!    drop it if any stored context has expired
//! 3. **Transfer**: hand the outstanding blocks to the remote, persisting
//!    every block result as it arrives
//! 4. **Finish**: clear the record on success, keep it on failure or cancel

pub mod cancel;
pub mod config;
pub mod error;
pub mod remote;
pub mod service;
pub mod session;

// Re-export primary types for convenience.
pub use cancel::{CancelScope, CancellationController};
pub use config::UploaderConfig;
pub use error::UploadError;
pub use remote::{BlockEvent, BlockSender, PutFuture, PutRequest, RemoteStorage, context_expired};
pub use service::Uploader;
pub use session::UploadSession;
