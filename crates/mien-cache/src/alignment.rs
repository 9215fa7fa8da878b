//! Memoized face detection: image content hash → ordered face-hash list.

use std::path::Path;

use mien_client::ModelClient;
use mien_core::{Face, PixelBuffer};
use mien_store::ContentStore;

use crate::error::CacheError;
use crate::events::{CacheLookup, CacheSource};
use crate::face_cache::FaceCache;

/// Caches aligner results per image content hash.
///
/// The face entities themselves live in the composed [`FaceCache`]; this
/// cache only stores the ordered hash list. The face cache is a separately
/// owned collaborator: [`AlignmentCache::destroy`] does not cascade into it.
pub struct AlignmentCache<C> {
    store: ContentStore,
    faces: FaceCache,
    client: C,
}

impl<C: ModelClient> AlignmentCache<C> {
    pub async fn open(root: &Path, faces: FaceCache, client: C) -> Result<Self, CacheError> {
        let store = ContentStore::open(root, "alignment").await?;
        Ok(Self {
            store,
            faces,
            client,
        })
    }

    /// Load an image file and align it.
    pub async fn align_path(&self, path: &Path) -> Result<CacheLookup<Vec<Face>>, CacheError> {
        let image = PixelBuffer::load(path)?;
        self.align(&image).await
    }

    /// Detect faces in the image, via cache when possible.
    ///
    /// A stored hash list only counts as a hit when *every* listed face
    /// resolves through the face cache; a partially resolvable list (the
    /// face cache was cleared independently) is treated as a full miss and
    /// realigned, never returned truncated. The returned sequence preserves
    /// detection order on both paths. The aligner is invoked at most once
    /// per distinct image hash across sequential calls.
    pub async fn align(&self, image: &PixelBuffer) -> Result<CacheLookup<Vec<Face>>, CacheError> {
        let key = image.content_hash().to_owned();

        if let Some(hashes) = self.store.get::<Vec<String>>(&key).await? {
            match self.resolve(&hashes).await? {
                Some(faces) => {
                    tracing::debug!(image = %key, faces = faces.len(), "alignment cache hit");
                    return Ok(CacheLookup {
                        value: faces,
                        source: CacheSource::Hit,
                        key,
                    });
                }
                None => {
                    tracing::warn!(
                        image = %key,
                        "alignment record references missing faces; realigning"
                    );
                }
            }
        } else {
            tracing::debug!(image = %key, "alignment cache miss");
        }

        let detections = self.client.align(image).await?;
        let mut faces = Vec::with_capacity(detections.len());
        for detection in detections {
            let face = Face::from_buffer(
                detection.crop,
                detection.bounding_box,
                Some(detection.confidence),
                detection.landmarks,
            );
            self.faces.put(&face).await?;
            faces.push(face);
        }

        // The hash list is written last: if a face put fails mid-way the
        // mapping stays absent and a retry redoes the full alignment.
        let hashes: Vec<&str> = faces.iter().map(|f| f.content_hash()).collect();
        self.store.put(&key, &hashes).await?;

        Ok(CacheLookup {
            value: faces,
            source: CacheSource::Miss,
            key,
        })
    }

    /// Resolve every hash through the face cache, or `None` if any is gone.
    async fn resolve(&self, hashes: &[String]) -> Result<Option<Vec<Face>>, CacheError> {
        let mut faces = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.faces.get(hash).await? {
                Some(face) => faces.push(face),
                None => return Ok(None),
            }
        }
        Ok(Some(faces))
    }

    pub async fn count(&self) -> Result<u64, CacheError> {
        Ok(self.store.count().await?)
    }

    /// Drop this cache's image→faces mappings. The composed face cache is
    /// left untouched.
    pub async fn destroy(&self) -> Result<(), CacheError> {
        Ok(self.store.destroy().await?)
    }

    pub fn face_cache(&self) -> &FaceCache {
        &self.faces
    }
}
