//! Pixel file locations and buffer construction

use crate::buffer::PixelBuffer;
use crate::config::ServiceConfig;
use crate::digest::{calculate_hex_digest, DigestAlgorithm};
use crate::error::Result;
use crate::row_major::RowMajorPixelBuffer;
use crate::strategy::{BufferStrategy, ChunkedStrategy, DvStrategy};
use crate::types::ImageGeometry;
use crate::utils::fanout_path;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Directory below the root holding native pixel files
pub const PIXELS_DIR: &str = "Pixels";

/// An image known to the store
#[derive(Debug, Clone, PartialEq)]
pub struct Pixels {
    pub id: u64,
    pub geometry: ImageGeometry,
    /// File the image was imported from, if it is kept
    pub original_file: Option<PathBuf>,
}

impl Pixels {
    pub fn new(id: u64, geometry: ImageGeometry) -> Self {
        Self {
            id,
            geometry,
            original_file: None,
        }
    }

    pub fn with_original_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.original_file = Some(path.into());
        self
    }
}

/// Maps images to native pixel files below a root directory
#[derive(Debug, Clone)]
pub struct PixelsService {
    config: ServiceConfig,
}

impl PixelsService {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Path of the native pixel file of image `id`
    pub fn pixels_path(&self, id: u64) -> PathBuf {
        self.config.root.join(PIXELS_DIR).join(fanout_path(id))
    }

    /// Create the directories that will hold `path`
    pub fn create_subpath(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Create a fresh native buffer, replacing any existing file
    pub fn create_pixel_buffer(&self, pixels: &Pixels) -> Result<RowMajorPixelBuffer> {
        let path = self.pixels_path(pixels.id);
        self.create_subpath(&path)?;
        info!(id = pixels.id, path = %path.display(), "creating pixel buffer");
        Ok(RowMajorPixelBuffer::create(path, pixels.geometry)?
            .with_null_plane_probe(self.config.null_plane_probe))
    }

    /// Open the native buffer of an image, creating it when missing
    pub fn open_pixel_buffer(&self, pixels: &Pixels) -> Result<RowMajorPixelBuffer> {
        let path = self.pixels_path(pixels.id);
        if !path.exists() {
            return self.create_pixel_buffer(pixels);
        }
        Ok(RowMajorPixelBuffer::open(path, pixels.geometry)?
            .with_null_plane_probe(self.config.null_plane_probe))
    }
}

/// Chooses a backend for every image through an ordered strategy chain
pub struct BufferFactory {
    service: PixelsService,
    strategies: RwLock<Vec<Arc<dyn BufferStrategy>>>,
}

impl BufferFactory {
    /// Factory without strategies; every image gets a native buffer
    pub fn new(service: PixelsService) -> Self {
        Self {
            service,
            strategies: RwLock::new(Vec::new()),
        }
    }

    /// Factory with the strategies enabled by the configuration: DeltaVision
    /// originals first, then chunked containers
    pub fn from_config(config: ServiceConfig) -> Self {
        let mut strategies: Vec<Arc<dyn BufferStrategy>> = Vec::new();
        if config.dv_enabled {
            strategies.push(Arc::new(DvStrategy));
        }
        strategies.push(Arc::new(ChunkedStrategy::new(config.chunked.clone())));

        Self {
            service: PixelsService::new(config),
            strategies: RwLock::new(strategies),
        }
    }

    pub fn service(&self) -> &PixelsService {
        &self.service
    }

    /// Append a strategy; it is asked after the existing ones
    pub fn register(&self, strategy: Arc<dyn BufferStrategy>) {
        debug!(strategy = strategy.name(), "registered buffer strategy");
        self.strategies.write().push(strategy);
    }

    /// Names of the strategies in the order they are asked
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Buffer for an image from the first strategy that accepts it, or the
    /// native buffer
    pub fn get_pixel_buffer(&self, pixels: &Pixels) -> Result<Box<dyn PixelBuffer>> {
        let path = self.service.pixels_path(pixels.id);
        let strategies = self.strategies.read().clone();
        for strategy in strategies {
            if let Some(buffer) = strategy.make(pixels, &path)? {
                info!(id = pixels.id, strategy = strategy.name(), "selected pixel buffer");
                return Ok(buffer);
            }
        }

        debug!(id = pixels.id, "no strategy accepted image, using native pixel file");
        Ok(Box::new(self.service.open_pixel_buffer(pixels)?))
    }

    /// Hex digest of every pixel of an image, using the configured algorithm
    pub fn digest(&self, pixels: &Pixels) -> Result<String> {
        self.digest_with(pixels, self.service.config().digest)
    }

    pub fn digest_with(&self, pixels: &Pixels, algorithm: DigestAlgorithm) -> Result<String> {
        let mut buffer = self.get_pixel_buffer(pixels)?;
        let digest = calculate_hex_digest(buffer.as_mut(), algorithm);
        buffer.close()?;
        digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelType;
    use tempfile::TempDir;

    fn geometry() -> ImageGeometry {
        ImageGeometry::new(8, 8, 2, 1, 1, PixelType::UInt8).unwrap()
    }

    #[test]
    fn test_pixels_path_fans_out() {
        let service = PixelsService::new(ServiceConfig::new("/srv"));
        assert_eq!(service.pixels_path(12), PathBuf::from("/srv/Pixels/12"));
        assert_eq!(
            service.pixels_path(1234567),
            PathBuf::from("/srv/Pixels/Dir-001/Dir-234/1234567")
        );
    }

    #[test]
    fn test_open_creates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let service = PixelsService::new(ServiceConfig::new(temp_dir.path()));
        let pixels = Pixels::new(2001, geometry());

        let buffer = service.open_pixel_buffer(&pixels).unwrap();
        assert_eq!(buffer.path(), temp_dir.path().join("Pixels/Dir-002/2001"));
        assert_eq!(std::fs::metadata(buffer.path()).unwrap().len(), 128);
    }

    #[test]
    fn test_factory_falls_back_to_native() {
        let temp_dir = TempDir::new().unwrap();
        let factory = BufferFactory::from_config(ServiceConfig::new(temp_dir.path()));
        assert_eq!(factory.strategy_names(), vec!["deltavision", "chunked"]);

        let pixels = Pixels::new(5, geometry());
        let mut buffer = factory.get_pixel_buffer(&pixels).unwrap();
        assert_eq!(buffer.path(), factory.service().pixels_path(5));
        assert!(buffer.get_plane(0, 0, 0).unwrap().is_none());
    }

    struct Declining;

    impl BufferStrategy for Declining {
        fn name(&self) -> &str {
            "declining"
        }

        fn make(&self, _pixels: &Pixels, _path: &Path) -> Result<Option<Box<dyn PixelBuffer>>> {
            Ok(None)
        }
    }

    #[test]
    fn test_registered_strategies_are_asked_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let factory = BufferFactory::new(PixelsService::new(ServiceConfig::new(temp_dir.path())));
        factory.register(Arc::new(Declining));
        assert_eq!(factory.strategy_names(), vec!["declining"]);
        assert!(factory.get_pixel_buffer(&Pixels::new(1, geometry())).is_ok());
    }
}
