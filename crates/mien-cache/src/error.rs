use thiserror::Error;

use mien_client::ModelError;
use mien_core::{FaceError, ImageError, RecordError};
use mien_store::StoreError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// External aligner/embedder failure, propagated unchanged — retry
    /// policy belongs to the caller or the model client, not here.
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Face(#[from] FaceError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("image: {0}")]
    Image(#[from] ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
