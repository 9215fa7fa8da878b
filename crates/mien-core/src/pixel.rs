//! Content-addressed pixel buffers.
//!
//! A [`PixelBuffer`] owns raw interleaved pixel bytes plus its SHA-256
//! content hash, computed once at construction. Buffers are immutable;
//! every transformation returns a new buffer with a fresh hash.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::geometry::Rect;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("pixel data length {got} does not match {width}x{height}x{channels}")]
    LengthMismatch {
        got: usize,
        width: u32,
        height: u32,
        channels: u8,
    },
    #[error("crop {rect:?} exceeds image bounds {width}x{height}")]
    CropOutOfBounds {
        rect: Rect,
        width: u32,
        height: u32,
    },
    #[error("image codec: {0}")]
    Codec(#[from] image::ImageError),
}

/// Interleaved channel layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Luma8,
    Rgb8,
    Rgba8,
}

impl ChannelLayout {
    pub fn channels(self) -> u8 {
        match self {
            ChannelLayout::Luma8 => 1,
            ChannelLayout::Rgb8 => 3,
            ChannelLayout::Rgba8 => 4,
        }
    }

    pub fn from_channels(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(ChannelLayout::Luma8),
            3 => Some(ChannelLayout::Rgb8),
            4 => Some(ChannelLayout::Rgba8),
            _ => None,
        }
    }
}

/// Immutable raw pixel buffer addressable by content hash.
#[derive(Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    data: Vec<u8>,
    content_hash: String,
}

impl PixelBuffer {
    /// Build a buffer from raw interleaved bytes, computing the content hash.
    pub fn new(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * layout.channels() as usize;
        if data.len() != expected {
            return Err(ImageError::LengthMismatch {
                got: data.len(),
                width,
                height,
                channels: layout.channels(),
            });
        }
        let content_hash = format!("{:x}", Sha256::digest(&data));
        Ok(Self {
            width,
            height,
            layout,
            data,
            content_hash,
        })
    }

    /// Decode an image file. Grayscale, RGB, and RGBA stay as-is; any other
    /// color type is normalized to RGB8.
    pub fn load(path: &Path) -> Result<Self, ImageError> {
        let decoded = image::open(path)?;
        let buffer = Self::from_dynamic(decoded)?;
        tracing::debug!(
            path = %path.display(),
            width = buffer.width,
            height = buffer.height,
            hash = %buffer.content_hash,
            "decoded image"
        );
        Ok(buffer)
    }

    pub fn from_dynamic(image: DynamicImage) -> Result<Self, ImageError> {
        let (width, height) = (image.width(), image.height());
        let (layout, data) = match image {
            DynamicImage::ImageLuma8(b) => (ChannelLayout::Luma8, b.into_raw()),
            DynamicImage::ImageRgb8(b) => (ChannelLayout::Rgb8, b.into_raw()),
            DynamicImage::ImageRgba8(b) => (ChannelLayout::Rgba8, b.into_raw()),
            other => (ChannelLayout::Rgb8, other.to_rgb8().into_raw()),
        };
        Self::new(width, height, layout, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Lowercase hex SHA-256 of the raw pixel bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Extract a sub-region as a new buffer. The rect must lie fully inside
    /// this buffer's bounds.
    pub fn crop(&self, rect: Rect) -> Result<PixelBuffer, ImageError> {
        if !rect.fits_within(self.width, self.height) {
            return Err(ImageError::CropOutOfBounds {
                rect,
                width: self.width,
                height: self.height,
            });
        }
        let channels = self.layout.channels() as usize;
        let src_stride = self.width as usize * channels;
        let row_bytes = rect.width as usize * channels;
        let mut out = Vec::with_capacity(rect.height as usize * row_bytes);
        for row in 0..rect.height as usize {
            let y = rect.y as usize + row;
            let start = y * src_stride + rect.x as usize * channels;
            out.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        PixelBuffer::new(rect.width, rect.height, self.layout, out)
    }

    /// Shrink so neither dimension exceeds `max_dim`, preserving aspect
    /// ratio. Returns a clone when the buffer already fits.
    pub fn downsample_to_fit(&self, max_dim: u32) -> Result<PixelBuffer, ImageError> {
        if self.width <= max_dim && self.height <= max_dim {
            return Ok(self.clone());
        }
        let resized = self.to_dynamic().resize(max_dim, max_dim, FilterType::Triangle);
        Self::from_dynamic(resized)
    }

    /// Encode as PNG bytes.
    pub fn encode_png(&self) -> Result<Vec<u8>, ImageError> {
        let mut bytes = Vec::new();
        self.to_dynamic()
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    fn to_dynamic(&self) -> DynamicImage {
        // Data length is validated at construction, so from_raw cannot fail.
        match self.layout {
            ChannelLayout::Luma8 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .expect("buffer length matches dimensions"),
            ),
            ChannelLayout::Rgb8 => DynamicImage::ImageRgb8(
                RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .expect("buffer length matches dimensions"),
            ),
            ChannelLayout::Rgba8 => DynamicImage::ImageRgba8(
                RgbaImage::from_raw(self.width, self.height, self.data.clone())
                    .expect("buffer length matches dimensions"),
            ),
        }
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("content_hash", &self.content_hash)
            .finish()
    }
}
