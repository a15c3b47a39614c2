//! Disk codec collaborator.
//!
//! The pipeline only needs `decode` and `encode`; [`ExrCodec`] provides them
//! for OpenEXR files through the `image` crate. Anything else (tests, other
//! formats) plugs in through [`ImageCodec`].

use std::path::Path;

use image::{DynamicImage, Rgba32FImage};
use thiserror::Error;

use crate::image::Image;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EncodeError {
    pub message: String,
}

impl EncodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait ImageCodec {
    /// Reads a file into a four-channel float image.
    fn decode(&self, path: &Path) -> Result<Image, DecodeError>;

    /// Writes a four-channel float image.
    fn encode(&self, path: &Path, image: &Image) -> Result<(), EncodeError>;
}

/// OpenEXR reader/writer. Inputs with fewer channels are expanded to RGBA
/// with an opaque alpha.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExrCodec;

impl ImageCodec for ExrCodec {
    fn decode(&self, path: &Path) -> Result<Image, DecodeError> {
        if !path.is_file() {
            return Err(DecodeError::new(format!(
                "no such file: {}",
                path.display()
            )));
        }
        let decoded = image::open(path).map_err(|err| DecodeError::new(err.to_string()))?;
        from_dynamic(decoded)
    }

    fn encode(&self, path: &Path, image: &Image) -> Result<(), EncodeError> {
        let buffer =
            Rgba32FImage::from_raw(image.width(), image.height(), image.pixels().to_vec())
                .ok_or_else(|| EncodeError::new("pixel buffer does not match image extent"))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                EncodeError::new(format!(
                    "failed to create output directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        buffer
            .save_with_format(path, image::ImageFormat::OpenExr)
            .map_err(|err| EncodeError::new(err.to_string()))
    }
}

fn from_dynamic(decoded: DynamicImage) -> Result<Image, DecodeError> {
    let rgba = decoded.into_rgba32f();
    let (width, height) = rgba.dimensions();
    Image::new(width, height, rgba.into_raw()).map_err(DecodeError::new)
}
