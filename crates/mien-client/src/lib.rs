//! mien-client — process boundary to the external face model.
//!
//! The detection and embedding networks (MTCNN + FaceNet) run in a separate
//! Python sidecar service; this crate only speaks its JSON contract. The
//! caches depend on the [`ModelClient`] trait, never on the HTTP transport,
//! so tests substitute counting stubs.

pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpModelClient, ModelClient, ModelClientConfig};
pub use error::{ModelError, ModelResult};
pub use types::Detection;
