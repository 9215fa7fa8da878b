//! End-to-end properties of the alignment/embedding/face caches, exercised
//! against a deterministic counting stub in place of the model service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use mien_cache::{AlignmentCache, CacheError, CacheSource, EmbeddingCache, FaceCache};
use mien_client::{Detection, ModelClient, ModelResult};
use mien_core::{
    ChannelLayout, Embedding, Face, FaceError, PixelBuffer, Rect, EMBEDDING_DIM,
};

const CROP_SIDE: u32 = 8;

/// Fake model service: "detects" one face per configured fill byte, in
/// order, and derives embeddings from the crop's first pixel. Counts every
/// invocation.
#[derive(Clone)]
struct StubModel {
    fills: Vec<u8>,
    align_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
}

impl StubModel {
    fn new(fills: Vec<u8>) -> Self {
        Self {
            fills,
            align_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn align_calls(&self) -> usize {
        self.align_calls.load(Ordering::SeqCst)
    }

    fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

fn crop_for_fill(fill: u8) -> PixelBuffer {
    PixelBuffer::new(
        CROP_SIDE,
        CROP_SIDE,
        ChannelLayout::Luma8,
        vec![fill; (CROP_SIDE * CROP_SIDE) as usize],
    )
    .unwrap()
}

#[async_trait]
impl ModelClient for StubModel {
    async fn align(&self, _image: &PixelBuffer) -> ModelResult<Vec<Detection>> {
        self.align_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .fills
            .iter()
            .enumerate()
            .map(|(i, &fill)| Detection {
                bounding_box: Rect::new(i as i32 * CROP_SIDE as i32, 0, CROP_SIDE, CROP_SIDE),
                confidence: 0.9,
                landmarks: None,
                crop: crop_for_fill(fill),
            })
            .collect())
    }

    async fn embed(&self, image: &PixelBuffer) -> ModelResult<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        let seed = image.data()[0] as f32 / 255.0;
        Ok(vec![seed; EMBEDDING_DIM])
    }
}

fn source_image(fill: u8) -> PixelBuffer {
    PixelBuffer::new(16, 16, ChannelLayout::Luma8, vec![fill; 256]).unwrap()
}

async fn alignment_cache(
    root: &std::path::Path,
    stub: StubModel,
) -> AlignmentCache<StubModel> {
    let faces = FaceCache::open(root).await.unwrap();
    AlignmentCache::open(root, faces, stub).await.unwrap()
}

#[tokio::test]
async fn second_put_does_not_rewrite_the_image_file() {
    let dir = tempfile::tempdir().unwrap();
    let faces = FaceCache::open(dir.path()).await.unwrap();
    let face = Face::from_buffer(crop_for_fill(42), Rect::new(0, 0, CROP_SIDE, CROP_SIDE), None, None);

    faces.put(&face).await.unwrap();
    let path = faces.image_path(face.content_hash());

    // Plant sentinel bytes; a rewrite would clobber them.
    std::fs::write(&path, b"sentinel").unwrap();
    faces.put(&face).await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"sentinel");
    // The record itself is still intact after the second put.
    let loaded = faces.get(face.content_hash()).await.unwrap().unwrap();
    assert_eq!(loaded.content_hash(), face.content_hash());
}

#[tokio::test]
async fn aligner_runs_once_per_image_and_preserves_order() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubModel::new(vec![1, 2, 3]);
    let cache = alignment_cache(dir.path(), stub.clone()).await;
    let image = source_image(77);

    let first = cache.align(&image).await.unwrap();
    assert_eq!(first.source, CacheSource::Miss);
    assert_eq!(first.key, image.content_hash());
    let miss_hashes: Vec<String> = first
        .value
        .iter()
        .map(|f| f.content_hash().to_owned())
        .collect();
    assert_eq!(miss_hashes.len(), 3);

    let second = cache.align(&image).await.unwrap();
    assert_eq!(second.source, CacheSource::Hit);
    let hit_hashes: Vec<String> = second
        .value
        .iter()
        .map(|f| f.content_hash().to_owned())
        .collect();
    assert_eq!(hit_hashes, miss_hashes);

    assert_eq!(stub.align_calls(), 1);
}

#[tokio::test]
async fn identical_image_content_hits_across_distinct_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubModel::new(vec![4]);
    let cache = alignment_cache(dir.path(), stub.clone()).await;

    let first = cache.align(&source_image(9)).await.unwrap();
    assert_eq!(first.source, CacheSource::Miss);

    // A separately constructed buffer with the same pixels shares the hash.
    let second = cache.align(&source_image(9)).await.unwrap();
    assert_eq!(second.source, CacheSource::Hit);
    assert_eq!(stub.align_calls(), 1);
}

#[tokio::test]
async fn partially_missing_faces_force_a_full_realign() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubModel::new(vec![10, 20]);
    let cache = alignment_cache(dir.path(), stub.clone()).await;
    let image = source_image(55);

    let primed = cache.align(&image).await.unwrap();
    assert_eq!(primed.value.len(), 2);
    let victim = primed.value[0].content_hash().to_owned();

    // Remove one face behind the alignment cache's back.
    assert!(cache.face_cache().remove(&victim).await.unwrap());

    let realigned = cache.align(&image).await.unwrap();
    assert_eq!(realigned.source, CacheSource::Miss, "partial list must not count as a hit");
    assert_eq!(realigned.value.len(), 2);
    assert_eq!(stub.align_calls(), 2);

    // Repopulated: the next call is a clean hit again.
    let after = cache.align(&image).await.unwrap();
    assert_eq!(after.source, CacheSource::Hit);
    assert_eq!(stub.align_calls(), 2);
}

#[tokio::test]
async fn embedder_runs_once_per_face_hash() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubModel::new(vec![]);
    let cache = EmbeddingCache::open(dir.path(), stub.clone()).await.unwrap();
    let face = Face::from_buffer(crop_for_fill(100), Rect::new(0, 0, CROP_SIDE, CROP_SIDE), None, None);

    let first = cache.embedding(&face).await.unwrap();
    assert_eq!(first.source, CacheSource::Miss);
    assert_eq!(first.value.values().len(), EMBEDDING_DIM);

    let second = cache.embedding(&face).await.unwrap();
    assert_eq!(second.source, CacheSource::Hit);
    assert_eq!(second.value, first.value);
    assert_eq!(stub.embed_calls(), 1);
}

#[tokio::test]
async fn embedding_hit_does_not_touch_the_face() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubModel::new(vec![]);
    let cache = EmbeddingCache::open(dir.path(), stub.clone()).await.unwrap();

    let mut face = Face::from_buffer(crop_for_fill(7), Rect::new(0, 0, CROP_SIDE, CROP_SIDE), None, None);
    cache.embedding(&face).await.unwrap();

    // Caller attaches an embedding of their own; a later hit must still
    // succeed and must not try to overwrite the write-once field.
    face.set_embedding(Embedding::new(vec![0.0; EMBEDDING_DIM]).unwrap())
        .unwrap();
    let hit = cache.embedding(&face).await.unwrap();
    assert_eq!(hit.source, CacheSource::Hit);
    assert_eq!(face.embedding().unwrap().values(), vec![0.0; EMBEDDING_DIM]);
}

#[tokio::test]
async fn destroyed_embedding_cache_recomputes_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubModel::new(vec![]);
    let cache = EmbeddingCache::open(dir.path(), stub.clone()).await.unwrap();
    let face = Face::from_buffer(crop_for_fill(3), Rect::new(0, 0, CROP_SIDE, CROP_SIDE), None, None);

    cache.embedding(&face).await.unwrap();
    assert_eq!(cache.count().await.unwrap(), 1);

    cache.destroy().await.unwrap();
    assert_eq!(cache.count().await.unwrap(), 0);

    let fresh = cache.embedding(&face).await.unwrap();
    assert_eq!(fresh.source, CacheSource::Miss);
    assert_eq!(stub.embed_calls(), 2);
}

#[tokio::test]
async fn embedding_an_imageless_face_is_a_caller_bug() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubModel::new(vec![]);
    let cache = EmbeddingCache::open(dir.path(), stub.clone()).await.unwrap();

    let face = Face::from_stored_parts(
        None,
        Rect::new(0, 0, 4, 4),
        None,
        None,
        "0123abcd".into(),
        None,
    );
    let err = cache.embedding(&face).await.unwrap_err();
    assert!(matches!(err, CacheError::Face(FaceError::MissingImageData)));
    assert_eq!(stub.embed_calls(), 0);
}

#[tokio::test]
async fn alignment_destroy_does_not_cascade_to_the_face_cache() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubModel::new(vec![11]);
    let cache = alignment_cache(dir.path(), stub.clone()).await;
    let image = source_image(200);

    cache.align(&image).await.unwrap();
    assert_eq!(cache.count().await.unwrap(), 1);
    assert_eq!(cache.face_cache().count().await.unwrap(), 1);

    cache.destroy().await.unwrap();
    assert_eq!(cache.count().await.unwrap(), 0);
    assert_eq!(cache.face_cache().count().await.unwrap(), 1);

    // Faces survive, so the realign repopulates the mapping with one model
    // call but reuses the cached side-car files.
    let realigned = cache.align(&image).await.unwrap();
    assert_eq!(realigned.source, CacheSource::Miss);
    assert_eq!(stub.align_calls(), 2);
}
