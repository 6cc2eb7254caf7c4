//! Filesystem-backed block storage implementing [`RemoteStorage`].
//!
//! Layout under the bucket root:
//!
//! - `staging/<ctx>`: bytes of one block, written chunk by chunk. The
//!   context id doubles as the file name, so a stored context can be
//!   continued as long as its staging file is there.
//! - `objects/<key>`: committed objects, assembled from the staged blocks
//!   and moved into place with a rename.
//!
//! [`RemoteStorage`]: blockput_uploader::RemoteStorage

mod bucket;
mod config;
mod error;
mod faults;
mod token;

pub use bucket::{LocalBucket, UploadCounters};
pub use config::LocalBucketConfig;
pub use error::BucketError;
pub use faults::FaultInjector;
pub use token::validate_token;
