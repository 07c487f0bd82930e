//! The contract shared by every pixel buffer backend
//!
//! A pixel buffer owns exactly one storage resource from open until
//! [`PixelBuffer::close`]. Buffers are not internally synchronized: every
//! method that touches storage takes `&mut self`, so callers that share a
//! buffer between threads must serialize access themselves. Distinct buffers
//! may be used from distinct threads.

use crate::error::{PixelsError, Result};
use crate::layout::{Hypercube, PixelLayout};
use crate::pixel_data::PixelData;
use crate::types::ImageGeometry;
use std::path::Path;

/// Random access to the pixels of one 5D image.
///
/// Getters return [`PixelData`] views; the `_direct` variants copy into a
/// caller owned slice whose length must equal the requested size exactly.
/// Setters fail with [`PixelsError::BufferOverflow`] when the supplied bytes
/// do not match the size of the target block.
pub trait PixelBuffer: Send {
    /// Path of the backing file or container
    fn path(&self) -> &Path;

    /// Derived sizes and offsets for this buffer's geometry
    fn layout(&self) -> &PixelLayout;

    /// Release the underlying resource. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    fn geometry(&self) -> &ImageGeometry {
        self.layout().geometry()
    }

    fn row_size(&self) -> u64 {
        self.layout().row_size()
    }

    fn plane_size(&self) -> u64 {
        self.layout().plane_size()
    }

    fn stack_size(&self) -> u64 {
        self.layout().stack_size()
    }

    fn timepoint_size(&self) -> u64 {
        self.layout().timepoint_size()
    }

    fn total_size(&self) -> u64 {
        self.layout().total_size()
    }

    fn hypercube_size(&self, cube: &Hypercube) -> u64 {
        self.layout().hypercube_size(cube)
    }

    fn check_bounds(
        &self,
        y: Option<u32>,
        z: Option<u32>,
        c: Option<u32>,
        t: Option<u32>,
    ) -> Result<()> {
        self.layout().check_bounds(y, z, c, t)
    }

    fn row_offset(&self, y: u32, z: u32, c: u32, t: u32) -> Result<u64> {
        self.layout().row_offset(y, z, c, t)
    }

    fn plane_offset(&self, z: u32, c: u32, t: u32) -> Result<u64> {
        self.layout().plane_offset(z, c, t)
    }

    fn stack_offset(&self, c: u32, t: u32) -> Result<u64> {
        self.layout().stack_offset(c, t)
    }

    fn timepoint_offset(&self, t: u32) -> Result<u64> {
        self.layout().timepoint_offset(t)
    }

    /// Read `size` bytes at a flat `offset`.
    ///
    /// Returns `None` when the backend has no flat byte addressing.
    fn get_region(&mut self, size: usize, offset: u64) -> Result<Option<PixelData>>;

    /// Copy `size` bytes at a flat `offset` into `buffer`, returning the
    /// number of bytes copied, or `None` when the backend has no flat byte
    /// addressing.
    fn get_region_direct(
        &mut self,
        size: usize,
        offset: u64,
        buffer: &mut [u8],
    ) -> Result<Option<usize>>;

    fn get_row(&mut self, y: u32, z: u32, c: u32, t: u32) -> Result<PixelData>;

    fn get_row_direct(&mut self, y: u32, z: u32, c: u32, t: u32, buffer: &mut [u8]) -> Result<()>;

    /// Read a plane. Backends that can detect unwritten planes return `None`
    /// for them.
    fn get_plane(&mut self, z: u32, c: u32, t: u32) -> Result<Option<PixelData>>;

    fn get_plane_direct(&mut self, z: u32, c: u32, t: u32, buffer: &mut [u8]) -> Result<()>;

    /// Copy `count` pixels of a plane, starting at pixel `offset`, into the
    /// front of `buffer`.
    fn get_plane_region_direct(
        &mut self,
        z: u32,
        c: u32,
        t: u32,
        count: usize,
        offset: usize,
        buffer: &mut [u8],
    ) -> Result<()>;

    fn get_stack(&mut self, c: u32, t: u32) -> Result<PixelData>;

    fn get_stack_direct(&mut self, c: u32, t: u32, buffer: &mut [u8]) -> Result<()>;

    fn get_timepoint(&mut self, t: u32) -> Result<PixelData>;

    fn get_timepoint_direct(&mut self, t: u32, buffer: &mut [u8]) -> Result<()>;

    /// Copy a hypercube into `buffer` in logical order (X fastest, T slowest)
    fn get_hypercube_direct(&mut self, cube: &Hypercube, buffer: &mut [u8]) -> Result<()>;

    /// Read a hypercube into a freshly allocated buffer
    fn get_hypercube(&mut self, cube: &Hypercube) -> Result<Vec<u8>> {
        self.layout().check_hypercube(cube)?;
        let mut buffer = vec![0u8; to_len(self.hypercube_size(cube))?];
        self.get_hypercube_direct(cube, &mut buffer)?;
        Ok(buffer)
    }

    fn set_region(&mut self, size: usize, offset: u64, data: &[u8]) -> Result<()>;

    fn set_row(&mut self, data: &[u8], y: u32, z: u32, c: u32, t: u32) -> Result<()>;

    fn set_plane(&mut self, data: &[u8], z: u32, c: u32, t: u32) -> Result<()>;

    fn set_stack(&mut self, data: &[u8], c: u32, t: u32) -> Result<()>;

    fn set_timepoint(&mut self, data: &[u8], t: u32) -> Result<()>;

    fn set_hypercube(&mut self, data: &[u8], cube: &Hypercube) -> Result<()>;
}

/// Fail with `SizeMismatch` unless a destination has exactly `expected` bytes
pub(crate) fn check_destination(buffer: &[u8], expected: u64) -> Result<()> {
    if buffer.len() as u64 != expected {
        return Err(PixelsError::SizeMismatch {
            expected,
            actual: buffer.len() as u64,
        });
    }
    Ok(())
}

/// Fail with `BufferOverflow` unless a source has exactly `expected` bytes
pub(crate) fn check_source(data: &[u8], expected: u64) -> Result<()> {
    if data.len() as u64 != expected {
        return Err(PixelsError::BufferOverflow {
            expected,
            actual: data.len() as u64,
        });
    }
    Ok(())
}

/// Convert a byte count to an in-memory length
pub(crate) fn to_len(size: u64) -> Result<usize> {
    usize::try_from(size).map_err(|_| {
        PixelsError::OutOfBounds(format!("{} bytes cannot be held in memory", size))
    })
}
