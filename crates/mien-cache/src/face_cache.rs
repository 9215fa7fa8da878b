//! Deduplicated persistence of face entities by content hash.

use std::path::{Path, PathBuf};

use mien_core::{Embedding, Face, FaceError, FaceRecord};
use mien_store::ContentStore;

use crate::error::CacheError;

/// Largest side-car image dimension, matching the embedder's input size.
/// Only the image file is downsampled; the stored record keeps full
/// resolution.
pub const DEFAULT_MAX_CROP_DIM: u32 = 160;

/// Persists faces keyed by content hash, with a secondary embedding index
/// and one PNG file per hash under `imagedir/`.
///
/// Cloning yields a handle to the same stores; a face cache instance owns
/// its directory exclusively within the process.
#[derive(Clone)]
pub struct FaceCache {
    records: ContentStore,
    embeddings: ContentStore,
    image_dir: PathBuf,
    max_crop_dim: u32,
}

impl FaceCache {
    pub async fn open(root: &Path) -> Result<Self, CacheError> {
        Self::with_max_crop_dim(root, DEFAULT_MAX_CROP_DIM).await
    }

    pub async fn with_max_crop_dim(root: &Path, max_crop_dim: u32) -> Result<Self, CacheError> {
        let records = ContentStore::open(root, "face-cache").await?;
        let embeddings = ContentStore::open(root, "face-cache-embedding").await?;
        // The image directory is the one path this component creates itself.
        let image_dir = root.join("imagedir");
        tokio::fs::create_dir_all(&image_dir).await?;
        Ok(Self {
            records,
            embeddings,
            image_dir,
            max_crop_dim,
        })
    }

    /// Load and reconstruct a face. `Ok(None)` on a miss.
    pub async fn get(&self, hash: &str) -> Result<Option<Face>, CacheError> {
        match self.records.get::<FaceRecord>(hash).await? {
            Some(record) => Ok(Some(record.into_face()?)),
            None => Ok(None),
        }
    }

    /// Persist a face under its content hash.
    ///
    /// Overwrite-safe and idempotent for identical content. Writes the
    /// embedding index entry when the face carries an embedding, and the
    /// side-car image file only when no file exists for this hash yet —
    /// an existing file is never re-encoded or overwritten.
    pub async fn put(&self, face: &Face) -> Result<(), CacheError> {
        let image = face.image().ok_or(FaceError::MissingImageData)?;
        let record = FaceRecord::from_face(face)?;
        self.records.put(face.content_hash(), &record).await?;

        if let Some(embedding) = face.embedding() {
            self.embeddings.put(face.content_hash(), embedding).await?;
        }

        let path = self.image_path(face.content_hash());
        if !tokio::fs::try_exists(&path).await? {
            let scaled = image.downsample_to_fit(self.max_crop_dim)?;
            let png = scaled.encode_png()?;
            tokio::fs::write(&path, png).await?;
            tracing::debug!(
                face = face.id(),
                hash = %face.content_hash(),
                "face crop image written"
            );
        }
        Ok(())
    }

    /// Embedding lookup through the secondary index, skipping full face
    /// deserialization.
    pub async fn embedding_by_hash(&self, hash: &str) -> Result<Option<Embedding>, CacheError> {
        Ok(self.embeddings.get(hash).await?)
    }

    /// Stored hashes starting with `prefix`, for short-hash lookup tools.
    pub async fn list(&self, prefix: &str, limit: usize) -> Result<Vec<String>, CacheError> {
        Ok(self.records.keys_with_prefix(prefix, limit).await?)
    }

    pub async fn count(&self) -> Result<u64, CacheError> {
        Ok(self.records.count().await?)
    }

    /// Drop one face's record and embedding index entry. The side-car image
    /// file is kept; a later re-put will find it and skip the encode.
    pub async fn remove(&self, hash: &str) -> Result<bool, CacheError> {
        self.embeddings.delete(hash).await?;
        Ok(self.records.delete(hash).await?)
    }

    /// Delete the record store, the embedding index, and the whole image
    /// tree (recreated empty so the cache stays usable).
    pub async fn destroy(&self) -> Result<(), CacheError> {
        self.records.destroy().await?;
        self.embeddings.destroy().await?;
        if tokio::fs::try_exists(&self.image_dir).await? {
            tokio::fs::remove_dir_all(&self.image_dir).await?;
        }
        tokio::fs::create_dir_all(&self.image_dir).await?;
        Ok(())
    }

    /// Deterministic side-car path for a face hash.
    pub fn image_path(&self, hash: &str) -> PathBuf {
        self.image_dir.join(format!("{hash}.png"))
    }
}
