//! Wire types for the sidecar's JSON contract, plus the domain-facing
//! [`Detection`] the caches consume.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use mien_core::{ChannelLayout, FacialLandmarks, PixelBuffer, Rect};

use crate::error::ModelError;

/// One detected face as returned by the aligner: bounding box, confidence,
/// optional landmarks, and the crop the service already extracted.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bounding_box: Rect,
    pub confidence: f32,
    pub landmarks: Option<FacialLandmarks>,
    pub crop: PixelBuffer,
}

/// Base64 pixel payload with dimensions, shared by requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: String,
}

impl ImagePayload {
    pub fn from_buffer(buffer: &PixelBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
            channels: buffer.layout().channels(),
            data: BASE64.encode(buffer.data()),
        }
    }

    pub fn into_buffer(self) -> Result<PixelBuffer, ModelError> {
        let layout = ChannelLayout::from_channels(self.channels).ok_or_else(|| {
            ModelError::InvalidResponse(format!("unsupported channel count {}", self.channels))
        })?;
        let data = BASE64
            .decode(&self.data)
            .map_err(|e| ModelError::InvalidResponse(format!("pixel payload: {e}")))?;
        PixelBuffer::new(self.width, self.height, layout, data)
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct AlignRequest {
    pub image: ImagePayload,
}

#[derive(Debug, Deserialize)]
pub struct AlignResponse {
    pub faces: Vec<DetectionPayload>,
}

#[derive(Debug, Deserialize)]
pub struct DetectionPayload {
    pub bounding_box: Rect,
    pub confidence: f32,
    pub landmarks: Option<FacialLandmarks>,
    pub crop: ImagePayload,
}

impl DetectionPayload {
    pub fn into_detection(self) -> Result<Detection, ModelError> {
        Ok(Detection {
            bounding_box: self.bounding_box,
            confidence: self.confidence,
            landmarks: self.landmarks,
            crop: self.crop.into_buffer()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct EmbedRequest {
    pub image: ImagePayload,
}

#[derive(Debug, Deserialize)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_payload_roundtrip() {
        let data: Vec<u8> = (0..27).collect();
        let buffer = PixelBuffer::new(3, 3, ChannelLayout::Rgb8, data).unwrap();
        let payload = ImagePayload::from_buffer(&buffer);
        let rebuilt = payload.into_buffer().unwrap();
        assert_eq!(rebuilt.content_hash(), buffer.content_hash());
        assert_eq!(rebuilt.layout(), ChannelLayout::Rgb8);
    }

    #[test]
    fn bad_channel_count_is_invalid_response() {
        let payload = ImagePayload {
            width: 2,
            height: 2,
            channels: 7,
            data: String::new(),
        };
        assert!(matches!(
            payload.into_buffer().unwrap_err(),
            ModelError::InvalidResponse(_)
        ));
    }

    #[test]
    fn corrupt_base64_is_invalid_response() {
        let payload = ImagePayload {
            width: 2,
            height: 2,
            channels: 1,
            data: "not base64!!!".into(),
        };
        assert!(matches!(
            payload.into_buffer().unwrap_err(),
            ModelError::InvalidResponse(_)
        ));
    }
}
