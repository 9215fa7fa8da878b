//! The `Face` entity and its 128-dimensional embedding.
//!
//! A face is value-like: whoever holds it owns it, and caches persist
//! serialized copies rather than sharing live references. The content hash
//! is fixed at construction; the embedding transitions once from unset to
//! set unless explicitly cleared first.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point, Rect};
use crate::pixel::{ImageError, PixelBuffer};

/// FaceNet embedding dimensionality.
pub const EMBEDDING_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("embedding is already set; clear it before assigning a new one")]
    EmbeddingAlreadySet,
    #[error("embedding must have {EMBEDDING_DIM} dimensions, got {0}")]
    InvalidEmbedding(usize),
    #[error("face has no pixel data")]
    MissingImageData,
}

/// Five-point facial landmarks, as supplied by the aligner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacialLandmarks {
    pub left_eye: Point,
    pub right_eye: Point,
    pub nose: Point,
    pub left_mouth_corner: Point,
    pub right_mouth_corner: Point,
}

/// Fixed-length face embedding vector.
///
/// Serializes as a bare `Vec<f32>`; deserialization re-validates the
/// dimensionality, so malformed stored vectors are rejected on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, FaceError> {
        if values.len() != EMBEDDING_DIM {
            return Err(FaceError::InvalidEmbedding(values.len()));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = FaceError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Embedding::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.values
    }
}

static NEXT_FACE_ID: AtomicU64 = AtomicU64::new(1);

fn next_face_id() -> u64 {
    NEXT_FACE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A detected face: cropped pixels, bounding box, optional detection
/// metadata, and an optional write-once embedding.
#[derive(Debug, Clone)]
pub struct Face {
    /// Process-local sequential id for logging; never persisted.
    id: u64,
    image: Option<PixelBuffer>,
    location: Rect,
    confidence: Option<f32>,
    landmarks: Option<FacialLandmarks>,
    content_hash: String,
    embedding: Option<Embedding>,
}

impl Face {
    /// Build a face by cropping `location` out of a parent buffer. When the
    /// rect covers the whole parent, the parent is reused uncropped and the
    /// face hash equals the parent's hash.
    pub fn from_crop(
        parent: &PixelBuffer,
        location: Rect,
        confidence: Option<f32>,
        landmarks: Option<FacialLandmarks>,
    ) -> Result<Self, ImageError> {
        let image = if location.covers(parent.width(), parent.height()) {
            parent.clone()
        } else {
            parent.crop(location)?
        };
        Ok(Self::from_buffer(image, location, confidence, landmarks))
    }

    /// Build a face from an already-cropped buffer (the aligner supplies the
    /// crop itself).
    pub fn from_buffer(
        image: PixelBuffer,
        location: Rect,
        confidence: Option<f32>,
        landmarks: Option<FacialLandmarks>,
    ) -> Self {
        let content_hash = image.content_hash().to_owned();
        Self {
            id: next_face_id(),
            image: Some(image),
            location,
            confidence,
            landmarks,
            content_hash,
            embedding: None,
        }
    }

    /// Reconstruct a face from persisted parts. The stored content hash is
    /// authoritative and is not recomputed.
    pub fn from_stored_parts(
        image: Option<PixelBuffer>,
        location: Rect,
        confidence: Option<f32>,
        landmarks: Option<FacialLandmarks>,
        content_hash: String,
        embedding: Option<Embedding>,
    ) -> Self {
        Self {
            id: next_face_id(),
            image,
            location,
            confidence,
            landmarks,
            content_hash,
            embedding,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image(&self) -> Option<&PixelBuffer> {
        self.image.as_ref()
    }

    pub fn location(&self) -> Rect {
        self.location
    }

    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    pub fn landmarks(&self) -> Option<&FacialLandmarks> {
        self.landmarks.as_ref()
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    /// Attach the embedding. Write-once: fails if one is already present.
    pub fn set_embedding(&mut self, embedding: Embedding) -> Result<(), FaceError> {
        if self.embedding.is_some() {
            return Err(FaceError::EmbeddingAlreadySet);
        }
        self.embedding = Some(embedding);
        Ok(())
    }

    pub fn clear_embedding(&mut self) {
        self.embedding = None;
    }
}
