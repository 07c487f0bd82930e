//! Service configuration

use crate::chunked::{make_chunks, ChunkedOptions, DimensionOrder, TUNED_CHUNKS};
use crate::compression::{CompressionLevel, CompressionMethod};
use crate::digest::DigestAlgorithm;
use crate::error::Result;
use crate::row_major::NULL_PLANE_SIZE;
use crate::types::ImageGeometry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Planes with at least this many pixels go to chunked containers
pub const DEFAULT_CHUNKED_PLANE_PIXELS: u64 = 3192 * 3192;

/// Options of the chunked container backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkedConfig {
    /// Create chunked containers for new large buffers
    pub enabled: bool,
    /// Smallest plane, in pixels, stored in a chunked container
    pub min_plane_pixels: u64,
    pub order: DimensionOrder,
    pub compression: CompressionMethod,
    pub compression_level: CompressionLevel,
    /// Use the fixed small chunks of tuned buffers
    pub tuned: bool,
    /// Byte budget of one chunk; one plane per chunk when unset
    pub chunk_budget: Option<u64>,
}

impl Default for ChunkedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_plane_pixels: DEFAULT_CHUNKED_PLANE_PIXELS,
            order: DimensionOrder::default(),
            compression: CompressionMethod::Zstd,
            compression_level: CompressionLevel::default(),
            tuned: false,
            chunk_budget: None,
        }
    }
}

impl ChunkedConfig {
    /// Container options for a buffer of the given geometry
    pub fn options(&self, geometry: &ImageGeometry) -> ChunkedOptions {
        let options = ChunkedOptions::default()
            .with_order(self.order)
            .with_compression(self.compression, self.compression_level);
        if self.tuned {
            options.with_chunks(TUNED_CHUNKS)
        } else if let Some(budget) = self.chunk_budget {
            options.with_chunks(make_chunks(geometry, budget))
        } else {
            options
        }
    }

    /// Whether a new buffer of this geometry belongs in a chunked container
    pub fn wants(&self, geometry: &ImageGeometry) -> bool {
        self.enabled && geometry.size_x as u64 * geometry.size_y as u64 >= self.min_plane_pixels
    }
}

/// Configuration of a [`PixelsService`](crate::service::PixelsService)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory below which all pixel files are stored
    pub root: PathBuf,
    /// Leading plane bytes probed for the null plane pattern
    pub null_plane_probe: usize,
    pub digest: DigestAlgorithm,
    pub chunked: ChunkedConfig,
    /// Serve buffers straight from DeltaVision original files
    pub dv_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            null_plane_probe: NULL_PLANE_SIZE,
            digest: DigestAlgorithm::default(),
            chunked: ChunkedConfig::default(),
            dv_enabled: true,
        }
    }
}

impl ServiceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_null_plane_probe(mut self, probe: usize) -> Self {
        self.null_plane_probe = probe;
        self
    }

    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_chunked(mut self, chunked: ChunkedConfig) -> Self {
        self.chunked = chunked;
        self
    }

    pub fn with_dv_enabled(mut self, enabled: bool) -> Self {
        self.dv_enabled = enabled;
        self
    }
}
