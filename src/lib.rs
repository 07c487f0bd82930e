//! pixstore - random access to 5D scientific pixel buffers
//!
//! Images are five dimensional arrays indexed X (fastest), Y, Z (focal
//! plane), C (channel) and T (timepoint). Every storage backend implements
//! the same [`PixelBuffer`] contract of bounds-checked row, plane, stack,
//! timepoint and hypercube access.
//!
//! # Backends
//!
//! - [`RowMajorPixelBuffer`]: one headerless big-endian file, read-write
//! - [`DvPixelBuffer`]: DeltaVision files, read-only, in the file's own
//!   plane sequence and byte order
//! - [`ChunkedPixelBuffer`]: a chunked, compressed container directory
//!
//! A [`BufferFactory`] picks the backend for an image by asking its
//! [`BufferStrategy`] chain, falling back to the row-major file.
//!
//! # Example
//!
//! ```rust,no_run
//! use pixstore::{BufferFactory, ImageGeometry, Pixels, PixelType, ServiceConfig};
//!
//! # fn example() -> pixstore::Result<()> {
//! let factory = BufferFactory::from_config(ServiceConfig::new("/srv/pixels"));
//! let geometry = ImageGeometry::new(512, 512, 10, 2, 5, PixelType::UInt16)?;
//! let mut buffer = factory.get_pixel_buffer(&Pixels::new(42, geometry))?;
//!
//! let plane = vec![0u8; buffer.plane_size() as usize];
//! buffer.set_plane(&plane, 3, 1, 0)?;
//! let row = buffer.get_row(100, 3, 1, 0)?;
//! println!("first pixel: {}", row.pixel_value(0));
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod chunked;
pub mod compression;
pub mod config;
pub mod container;
pub mod digest;
pub mod dv;
pub mod error;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod pixel_data;
pub mod row_major;
pub mod service;
pub mod strategy;
pub mod types;
pub mod utils;

// Re-exports
pub use buffer::PixelBuffer;
pub use chunked::{make_chunks, ChunkedOptions, ChunkedPixelBuffer, DimensionOrder};
pub use compression::{CompressionLevel, CompressionMethod, Compressor};
pub use config::{ChunkedConfig, ServiceConfig};
pub use container::{Container, Dataset};
pub use digest::{calculate_digest, calculate_hex_digest, DigestAlgorithm};
pub use dv::{DvHeader, DvPixelBuffer, PlaneSequence};
pub use error::{PixelsError, Result};
pub use io::{ContainerStore, FileSystemStore};
pub use layout::{Coordinate, Hypercube, PixelLayout};
pub use pixel_data::PixelData;
pub use row_major::RowMajorPixelBuffer;
pub use service::{BufferFactory, Pixels, PixelsService};
pub use strategy::{BufferStrategy, ChunkedStrategy, DvStrategy};
pub use types::{Axis, ByteOrder, ImageGeometry, PixelType};

/// Version of this crate
pub const PIXSTORE_VERSION: &str = env!("CARGO_PKG_VERSION");
