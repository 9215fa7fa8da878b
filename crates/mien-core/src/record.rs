//! Persisted face records.
//!
//! The on-disk form of a [`Face`]: JSON with base64 pixel payloads. Struct
//! field order is the serialized field order, so deserializing a record and
//! re-serializing it produces byte-identical output.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::face::{Embedding, Face, FaceError, FacialLandmarks};
use crate::geometry::Rect;
use crate::pixel::{ChannelLayout, ImageError, PixelBuffer};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported channel count {0}")]
    Channels(u8),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Face(#[from] FaceError),
}

/// Base64-encoded pixel payload with its dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: String,
}

impl ImageRecord {
    pub fn from_buffer(buffer: &PixelBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
            channels: buffer.layout().channels(),
            data: BASE64.encode(buffer.data()),
        }
    }

    pub fn into_buffer(self) -> Result<PixelBuffer, RecordError> {
        let layout =
            ChannelLayout::from_channels(self.channels).ok_or(RecordError::Channels(self.channels))?;
        let data = BASE64.decode(&self.data)?;
        Ok(PixelBuffer::new(self.width, self.height, layout, data)?)
    }
}

/// Persisted form of a face. An empty `embedding` means "not yet computed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRecord {
    pub confidence: Option<f32>,
    pub embedding: Vec<f32>,
    pub image: ImageRecord,
    pub landmarks: Option<FacialLandmarks>,
    pub location: Rect,
    pub content_hash: String,
}

impl FaceRecord {
    /// Serialize a face. Fails with [`FaceError::MissingImageData`] when the
    /// face carries no pixels — such a face cannot be cached.
    pub fn from_face(face: &Face) -> Result<Self, FaceError> {
        let image = face.image().ok_or(FaceError::MissingImageData)?;
        Ok(Self {
            confidence: face.confidence(),
            embedding: face
                .embedding()
                .map(|e| e.values().to_vec())
                .unwrap_or_default(),
            image: ImageRecord::from_buffer(image),
            landmarks: face.landmarks().copied(),
            location: face.location(),
            content_hash: face.content_hash().to_owned(),
        })
    }

    /// Rebuild the in-memory face. The stored content hash is kept as-is.
    pub fn into_face(self) -> Result<Face, RecordError> {
        let embedding = if self.embedding.is_empty() {
            None
        } else {
            Some(Embedding::new(self.embedding)?)
        };
        let buffer = self.image.into_buffer()?;
        Ok(Face::from_stored_parts(
            Some(buffer),
            self.location,
            self.confidence,
            self.landmarks,
            self.content_hash,
            embedding,
        ))
    }
}
