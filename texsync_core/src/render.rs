//! Local render resources.
//!
//! The GPU backend is outside this crate; a `RenderTarget` is whatever can
//! accept a whole RGB8 payload. `CpuTexture` keeps the pixels in memory,
//! which is enough for headless nodes, the simulator and tests.

use crate::state::{Dimensions, Payload};
use image::error::{ParameterError, ParameterErrorKind};
use image::{ImageError, ImageResult, RgbImage};
use std::path::Path;

/// Something a payload can be uploaded into, e.g. a texture.
pub trait RenderTarget: Send {
    /// Dimensions the resource was created with.
    fn dimensions(&self) -> Dimensions;
    
    /// Replaces the whole resource contents.
    ///
    /// Callers guarantee `payload.dimensions() == self.dimensions()`.
    fn upload(&mut self, payload: &Payload);
}

/// Headless RGB8 texture kept in memory.
#[derive(Debug, Clone)]
pub struct CpuTexture {
    dims: Dimensions,
    pixels: Payload,
    uploads: u64,
}

impl CpuTexture {
    /// Creates a black texture.
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            pixels: Payload::zeroed(dims),
            uploads: 0,
        }
    }
    
    /// Current texture contents.
    pub fn pixels(&self) -> &Payload {
        &self.pixels
    }
    
    /// Number of uploads so far.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }
    
    /// Copies the texture into an `image` buffer.
    pub fn to_image(&self) -> ImageResult<RgbImage> {
        RgbImage::from_raw(
            self.dims.width() as u32,
            self.dims.height() as u32,
            self.pixels.as_bytes().to_vec(),
        )
        .ok_or_else(|| {
            ImageError::Parameter(ParameterError::from_kind(ParameterErrorKind::DimensionMismatch))
        })
    }
    
    /// Saves the texture; the format follows the extension (`.ppm`, `.png`).
    pub fn write_image(&self, path: impl AsRef<Path>) -> ImageResult<()> {
        self.to_image()?.save(path)
    }
}

impl RenderTarget for CpuTexture {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }
    
    fn upload(&mut self, payload: &Payload) {
        self.pixels = payload.clone();
        self.uploads += 1;
    }
}
