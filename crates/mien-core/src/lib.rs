//! mien-core — face and image data model.
//!
//! Content-addressed pixel buffers, detection geometry, the [`Face`]
//! entity, and the serialized record format the on-disk caches persist.

pub mod face;
pub mod geometry;
pub mod pixel;
pub mod record;

pub use face::{Embedding, Face, FaceError, FacialLandmarks, EMBEDDING_DIM};
pub use geometry::{Point, Rect};
pub use pixel::{ChannelLayout, ImageError, PixelBuffer};
pub use record::{FaceRecord, ImageRecord, RecordError};
