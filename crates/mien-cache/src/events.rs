//! Hit/miss reporting.
//!
//! Cache operations discriminate hit from miss in their return value rather
//! than through a listener interface; callers that only want the value read
//! `.value`, observers read `.source`.

/// Whether a lookup was served from disk or recomputed via the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Hit,
    Miss,
}

impl CacheSource {
    pub fn is_hit(self) -> bool {
        matches!(self, CacheSource::Hit)
    }
}

/// A cache result, the key it was resolved under, and how it was served.
#[derive(Debug)]
pub struct CacheLookup<T> {
    pub value: T,
    pub source: CacheSource,
    /// Content hash the lookup was keyed by (image hash for alignment,
    /// face hash for embeddings).
    pub key: String,
}
