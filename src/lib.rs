//! A filesystem-style interface over B2 buckets.
//!
//! [`ObjectFs`] resolves one bucket of an [`ObjectClient`] and exposes the
//! [`Filesystem`] operations on top of it, plus public and time-limited
//! download URLs. Backends live in [`adapters`]: the native B2 API, the
//! S3-compatible endpoint, and an in-memory store for tests.

pub mod adapters;
pub mod config;
pub mod fs;
pub mod model;
pub mod util;

pub use adapters::{ObjectBucket, ObjectClient};
pub use config::B2Config;
pub use fs::{Filesystem, ObjectFs};
pub use model::error::{ErrorKind, FsError, Result};
pub use model::fs::{FileMetadata, FileObject, TemporaryUrlOptions, Visibility, WriteConfig};
