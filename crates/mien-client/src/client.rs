//! HTTP client for the face model sidecar.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use mien_core::PixelBuffer;

use crate::error::{ModelError, ModelResult};
use crate::types::{
    AlignRequest, AlignResponse, Detection, EmbedRequest, EmbedResponse, HealthResponse,
    ImagePayload,
};

/// The external aligner/embedder, reached over some process boundary.
///
/// `align` returns detections in the model's detection order; callers rely
/// on that order being stable. `embed` returns the raw vector; dimensional
/// validation happens in the cache layer.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn align(&self, image: &PixelBuffer) -> ModelResult<Vec<Detection>>;
    async fn embed(&self, image: &PixelBuffer) -> ModelResult<Vec<f32>>;
}

/// Configuration for the sidecar connection.
#[derive(Debug, Clone)]
pub struct ModelClientConfig {
    /// Base URL of the model service.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ModelClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8018".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ModelClientConfig {
    /// Load from `MIEN_MODEL_URL` / `MIEN_MODEL_TIMEOUT_SECS` with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("MIEN_MODEL_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("MIEN_MODEL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// JSON-over-HTTP implementation of [`ModelClient`]. Cloning shares the
/// underlying connection pool.
#[derive(Clone)]
pub struct HttpModelClient {
    http: reqwest::Client,
    config: ModelClientConfig,
}

impl HttpModelClient {
    pub fn new(config: ModelClientConfig) -> ModelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ModelError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ModelResult<Self> {
        Self::new(ModelClientConfig::from_env())
    }

    /// Whether the sidecar answers its health endpoint.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<HealthResponse>()
                .await
                .map(|h| h.status == "ok" || h.status == "healthy")
                .unwrap_or(false),
            Ok(response) => {
                warn!(status = %response.status(), "model service health check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "model service unreachable");
                false
            }
        }
    }

    async fn post_json<Req, Resp>(&self, endpoint: &str, request: &Req) -> ModelResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        debug!(url = %url, "model service request");
        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Invocation {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn align(&self, image: &PixelBuffer) -> ModelResult<Vec<Detection>> {
        let request = AlignRequest {
            image: ImagePayload::from_buffer(image),
        };
        let response: AlignResponse = self.post_json("/align", &request).await?;
        response
            .faces
            .into_iter()
            .map(|payload| payload.into_detection())
            .collect()
    }

    async fn embed(&self, image: &PixelBuffer) -> ModelResult<Vec<f32>> {
        let request = EmbedRequest {
            image: ImagePayload::from_buffer(image),
        };
        let response: EmbedResponse = self.post_json("/embed", &request).await?;
        Ok(response.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mien_core::ChannelLayout;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_image() -> PixelBuffer {
        PixelBuffer::new(2, 2, ChannelLayout::Luma8, vec![10, 20, 30, 40]).unwrap()
    }

    fn client_for(server: &MockServer) -> HttpModelClient {
        HttpModelClient::new(ModelClientConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn config_defaults() {
        let config = ModelClientConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8018");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn align_decodes_detections_in_order() {
        let server = MockServer::start().await;
        let crop = ImagePayload::from_buffer(&test_image());
        let body = json!({
            "faces": [
                {
                    "bounding_box": { "x": 1, "y": 2, "width": 2, "height": 2 },
                    "confidence": 0.98,
                    "landmarks": null,
                    "crop": crop.clone(),
                },
                {
                    "bounding_box": { "x": 5, "y": 6, "width": 2, "height": 2 },
                    "confidence": 0.72,
                    "landmarks": null,
                    "crop": crop,
                }
            ]
        });
        Mock::given(method("POST"))
            .and(path("/align"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let detections = client_for(&server).align(&test_image()).await.unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].bounding_box.x, 1);
        assert_eq!(detections[1].bounding_box.x, 5);
        assert_eq!(
            detections[0].crop.content_hash(),
            test_image().content_hash()
        );
    }

    #[tokio::test]
    async fn embed_returns_raw_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embedding": [0.25, 0.5] })),
            )
            .mount(&server)
            .await;

        let values = client_for(&server).embed(&test_image()).await.unwrap();
        assert_eq!(values, vec![0.25, 0.5]);
    }

    #[tokio::test]
    async fn non_success_status_is_an_invocation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/align"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let err = client_for(&server).align(&test_image()).await.unwrap_err();
        match err {
            ModelError::Invocation { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model crashed");
            }
            other => panic!("expected Invocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_check_reads_status_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .mount(&server)
            .await;

        assert!(client_for(&server).health_check().await);
    }
}
