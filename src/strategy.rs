//! Backend selection strategies
//!
//! A [`BufferFactory`](crate::service::BufferFactory) asks its strategies in
//! turn for a buffer; a strategy either builds one or declines with
//! `Ok(None)`.

use crate::buffer::PixelBuffer;
use crate::chunked::ChunkedPixelBuffer;
use crate::config::ChunkedConfig;
use crate::dv::{header::has_magic, DvPixelBuffer, HEADER_SIZE};
use crate::error::{PixelsError, Result};
use crate::service::Pixels;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builds a pixel buffer for an image, or declines
pub trait BufferStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// `path` is where the image's native pixel file lives or would live
    fn make(&self, pixels: &Pixels, path: &Path) -> Result<Option<Box<dyn PixelBuffer>>>;
}

/// Serves images whose original file is a DeltaVision file
#[derive(Debug, Default)]
pub struct DvStrategy;

impl DvStrategy {
    /// True if the file carries a DeltaVision header
    pub fn is_dv_file(path: &Path) -> Result<bool> {
        let mut block = Vec::with_capacity(HEADER_SIZE);
        File::open(path)?
            .take(HEADER_SIZE as u64)
            .read_to_end(&mut block)?;
        Ok(has_magic(&block))
    }
}

impl BufferStrategy for DvStrategy {
    fn name(&self) -> &str {
        "deltavision"
    }

    fn make(&self, pixels: &Pixels, _path: &Path) -> Result<Option<Box<dyn PixelBuffer>>> {
        let Some(original) = pixels.original_file.as_deref() else {
            return Ok(None);
        };
        if !original.is_file() || !Self::is_dv_file(original)? {
            return Ok(None);
        }

        let buffer = DvPixelBuffer::open(original)?;
        if *buffer.geometry() != pixels.geometry {
            return Err(PixelsError::InvalidConfiguration(format!(
                "{} holds {}, image {} expects {}",
                original.display(),
                buffer.geometry(),
                pixels.id,
                pixels.geometry
            )));
        }
        Ok(Some(Box::new(buffer)))
    }
}

/// Keeps large images in chunked containers next to the native files
#[derive(Debug, Default)]
pub struct ChunkedStrategy {
    config: ChunkedConfig,
}

impl ChunkedStrategy {
    pub fn new(config: ChunkedConfig) -> Self {
        Self { config }
    }

    /// Location of the container for a native pixel path
    pub fn container_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push("_chunks");
        PathBuf::from(name)
    }
}

impl BufferStrategy for ChunkedStrategy {
    fn name(&self) -> &str {
        "chunked"
    }

    fn make(&self, pixels: &Pixels, path: &Path) -> Result<Option<Box<dyn PixelBuffer>>> {
        let container = Self::container_path(path);
        let exists = container.is_dir();
        if !exists && (path.exists() || !self.config.wants(&pixels.geometry)) {
            return Ok(None);
        }

        debug!(
            id = pixels.id,
            path = %container.display(),
            exists,
            "using chunked container"
        );
        let options = self.config.options(&pixels.geometry);
        let buffer = ChunkedPixelBuffer::with_options(container, pixels.geometry, options)?;
        Ok(Some(Box::new(buffer)))
    }
}
