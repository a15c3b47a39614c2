//! Host-side float images and the all-or-nothing [`ImageStore`].

use std::fmt;
use std::path::Path;

use crate::codec::ImageCodec;
use crate::error::LoadError;
use crate::types::CHANNELS;

/// Width and height shared by every image bound to one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of floats in an RGBA buffer covering this extent.
    pub fn float_count(&self) -> usize {
        self.pixel_count() * CHANNELS
    }

    pub(crate) fn to_wgpu(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Row-major RGBA32F pixels.
#[derive(Clone, PartialEq)]
pub struct Image {
    extent: Extent,
    pixels: Vec<f32>,
}

impl Image {
    /// Wraps an RGBA buffer, checking that it matches the extent.
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!("image dimensions must be non-zero, got {width}x{height}"));
        }
        let extent = Extent::new(width, height);
        if pixels.len() != extent.float_count() {
            return Err(format!(
                "expected {} floats for a {extent} RGBA image, got {}",
                extent.float_count(),
                pixels.len()
            ));
        }
        Ok(Self { extent, pixels })
    }

    /// Image with every channel of every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Result<Self, String> {
        let count = width as usize * height as usize * CHANNELS;
        Self::new(width, height, vec![value; count])
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// RGBA value at `(x, y)`; panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let start = (y as usize * self.extent.width as usize + x as usize) * CHANNELS;
        let mut out = [0.0; 4];
        out.copy_from_slice(&self.pixels[start..start + CHANNELS]);
        out
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("extent", &self.extent)
            .field("floats", &self.pixels.len())
            .finish()
    }
}

/// Holds the decoded inputs of the current run in slot order.
#[derive(Debug, Default)]
pub struct ImageStore {
    images: Vec<Image>,
    extent: Option<Extent>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every path in order. The first failure discards everything
    /// decoded so far and leaves the store untouched.
    pub fn load<C, P>(&mut self, codec: &C, paths: &[P]) -> Result<&[Image], LoadError>
    where
        C: ImageCodec + ?Sized,
        P: AsRef<Path>,
    {
        let mut decoded = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            let image = codec.decode(path).map_err(|err| LoadError {
                index,
                identifier: path.display().to_string(),
                message: err.to_string(),
            })?;
            tracing::debug!(
                index,
                path = %path.display(),
                extent = %image.extent(),
                "decoded input image"
            );
            decoded.push(image);
        }
        self.commit(decoded)
    }

    /// Stores already-decoded images under the same rules as [`load`](Self::load).
    pub fn insert(&mut self, images: Vec<Image>) -> Result<&[Image], LoadError> {
        self.commit(images)
    }

    fn commit(&mut self, images: Vec<Image>) -> Result<&[Image], LoadError> {
        if images.is_empty() {
            return Err(LoadError {
                index: 0,
                identifier: "<none>".to_string(),
                message: "at least one input image is required".to_string(),
            });
        }
        // The last image wins; mismatches are rejected when a variant is bound.
        self.extent = images.last().map(Image::extent);
        self.images = images;
        Ok(&self.images)
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Resolution recorded by the last successful load.
    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    pub fn clear(&mut self) {
        self.images = Vec::new();
        self.extent = None;
    }
}
