//! Backend selection through the buffer factory

use anyhow::Result;
use pixstore::dv::PlaneSequence;
use pixstore::{
    BufferFactory, BufferStrategy, ByteOrder, ChunkedConfig, ChunkedStrategy, DvHeader,
    ImageGeometry, PixelBuffer, PixelType, Pixels, ServiceConfig,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn small() -> ImageGeometry {
    ImageGeometry::new(16, 16, 2, 1, 1, PixelType::Int16).expect("valid geometry")
}

#[test]
fn test_native_fallback_persists_pixels() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let factory = BufferFactory::from_config(ServiceConfig::new(temp_dir.path()));
    let pixels = Pixels::new(1_000_042, small());

    let row: Vec<u8> = (0..32).collect();
    {
        let mut buffer = factory.get_pixel_buffer(&pixels)?;
        buffer.set_row(&row, 3, 1, 0, 0)?;
        buffer.close()?;
    }

    let expected = temp_dir.path().join("Pixels/Dir-001/Dir-000/1000042");
    assert!(expected.is_file());

    let mut buffer = factory.get_pixel_buffer(&pixels)?;
    assert_eq!(buffer.path(), expected.as_path());
    assert_eq!(buffer.get_row(3, 1, 0, 0)?.as_bytes(), &row[..]);
    Ok(())
}

#[test]
fn test_dv_original_wins() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let original = temp_dir.path().join("import.r3d");
    let mut bytes = DvHeader::new(small(), PlaneSequence::Wzt, ByteOrder::LittleEndian)?.to_bytes()?;
    bytes.extend(std::iter::repeat(1u8).take(16 * 16 * 2 * 2));
    std::fs::write(&original, bytes)?;

    let factory = BufferFactory::from_config(ServiceConfig::new(temp_dir.path()));
    let pixels = Pixels::new(9, small()).with_original_file(&original);
    let mut buffer = factory.get_pixel_buffer(&pixels)?;
    assert_eq!(buffer.path(), original.as_path());
    assert!(buffer.set_plane(&[0u8; 512], 0, 0, 0).is_err());

    // with the DeltaVision strategy disabled the native file is used
    let factory = BufferFactory::from_config(
        ServiceConfig::new(temp_dir.path()).with_dv_enabled(false),
    );
    let buffer = factory.get_pixel_buffer(&pixels)?;
    assert_eq!(buffer.path(), factory.service().pixels_path(9).as_path());
    Ok(())
}

#[test]
fn test_large_images_go_to_chunked_containers() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = ServiceConfig::new(temp_dir.path()).with_chunked(ChunkedConfig {
        min_plane_pixels: 256,
        ..ChunkedConfig::default()
    });
    let factory = BufferFactory::from_config(config);

    let pixels = Pixels::new(77, small());
    let mut buffer = factory.get_pixel_buffer(&pixels)?;
    let native = factory.service().pixels_path(77);
    assert_eq!(buffer.path(), ChunkedStrategy::container_path(&native).as_path());
    assert!(!native.exists());
    assert!(buffer.get_region(2, 0)?.is_none());

    let plane = vec![5u8; 512];
    buffer.set_plane(&plane, 1, 0, 0)?;
    buffer.close()?;

    let digest = factory.digest(&pixels)?;
    assert_eq!(digest.len(), 40);
    Ok(())
}

/// Counts how often it is asked and never accepts
struct Counting(AtomicUsize);

impl BufferStrategy for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn make(&self, _pixels: &Pixels, _path: &Path) -> pixstore::Result<Option<Box<dyn PixelBuffer>>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[test]
fn test_registered_strategy_is_consulted() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let factory = BufferFactory::from_config(ServiceConfig::new(temp_dir.path()));
    let counting = Arc::new(Counting(AtomicUsize::new(0)));
    factory.register(counting.clone());
    assert_eq!(
        factory.strategy_names(),
        vec!["deltavision", "chunked", "counting"]
    );

    factory.get_pixel_buffer(&Pixels::new(3, small()))?;
    factory.get_pixel_buffer(&Pixels::new(4, small()))?;
    assert_eq!(counting.0.load(Ordering::SeqCst), 2);
    Ok(())
}
