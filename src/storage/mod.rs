//! Object storage integration module
//!
//! Uploads and deletes image files on a remote object store. Adapters own
//! their session and bucket caches and clear both whenever a remote call
//! fails.

pub mod providers;
pub mod spool;
pub mod traits;
pub mod types;

pub use traits::ObjectStorage;
pub use types::{Bucket, DeleteConfirmation, UploadRequest, UploadResult};
