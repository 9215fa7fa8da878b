//! Memoized embedding computation: face content hash → 128-dim vector.

use std::path::Path;

use mien_client::ModelClient;
use mien_core::{Embedding, Face, FaceError};
use mien_store::ContentStore;

use crate::error::CacheError;
use crate::events::{CacheLookup, CacheSource};

/// Caches embedder results per face content hash.
pub struct EmbeddingCache<C> {
    store: ContentStore,
    client: C,
}

impl<C: ModelClient> EmbeddingCache<C> {
    pub async fn open(root: &Path, client: C) -> Result<Self, CacheError> {
        let store = ContentStore::open(root, "embedding").await?;
        Ok(Self { store, client })
    }

    /// Fetch or compute the embedding for this face.
    ///
    /// Never mutates `face.embedding` — that field is write-once and the
    /// caller decides whether to attach the returned vector. A hit therefore
    /// succeeds even when the caller's face already carries an embedding.
    /// The embedder is invoked at most once per distinct face hash across
    /// sequential calls.
    pub async fn embedding(&self, face: &Face) -> Result<CacheLookup<Embedding>, CacheError> {
        let key = face.content_hash().to_owned();

        if let Some(embedding) = self.store.get::<Embedding>(&key).await? {
            tracing::debug!(face = face.id(), hash = %key, "embedding cache hit");
            return Ok(CacheLookup {
                value: embedding,
                source: CacheSource::Hit,
                key,
            });
        }

        tracing::debug!(face = face.id(), hash = %key, "embedding cache miss");
        let image = face.image().ok_or(FaceError::MissingImageData)?;
        let values = self.client.embed(image).await?;
        let embedding = Embedding::new(values)?;
        self.store.put(&key, &embedding).await?;

        Ok(CacheLookup {
            value: embedding,
            source: CacheSource::Miss,
            key,
        })
    }

    pub async fn count(&self) -> Result<u64, CacheError> {
        Ok(self.store.count().await?)
    }

    pub async fn destroy(&self) -> Result<(), CacheError> {
        Ok(self.store.destroy().await?)
    }
}
