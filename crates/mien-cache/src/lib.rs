//! mien-cache — the two-tier content-addressed cache in front of the
//! external face model.
//!
//! Three caches compose here:
//!
//! - [`FaceCache`] persists face entities by content hash, deduplicating
//!   identical crops across source images, with a side-car PNG per hash.
//! - [`AlignmentCache`] memoizes "detect faces in this image": image hash →
//!   ordered face-hash list, faces resolved through the face cache.
//! - [`EmbeddingCache`] memoizes "embed this face": face hash → 128-dim
//!   vector.
//!
//! Identical inputs never trigger duplicate model computation in the
//! sequential case; two *concurrent* misses on one key may both call the
//! model and race their writes, which is benign because identical hashes
//! imply identical content (last-writer-wins, no single-flight map).

pub mod alignment;
pub mod embedding;
pub mod error;
pub mod events;
pub mod face_cache;

pub use alignment::AlignmentCache;
pub use embedding::EmbeddingCache;
pub use error::CacheError;
pub use events::{CacheLookup, CacheSource};
pub use face_cache::{FaceCache, DEFAULT_MAX_CROP_DIM};
