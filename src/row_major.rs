//! Row-major pixel files
//!
//! The file holds exactly `total_size` bytes laid out XYZCT with no header,
//! no row reordering and big-endian words. Every accessor validates its
//! coordinates, computes an offset with [`PixelLayout`] and performs one
//! positioned read or write.

use crate::buffer::{check_destination, check_source, to_len, PixelBuffer};
use crate::error::{PixelsError, Result};
use crate::layout::{Hypercube, PixelLayout};
use crate::pixel_data::PixelData;
use crate::types::{Axis, ImageGeometry};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Number of leading plane bytes compared against the null plane pattern
pub const NULL_PLANE_SIZE: usize = 64;

/// Byte every position of an unwritten plane holds
const NULL_PLANE_BYTE: u8 = 0;

/// Pixel buffer over a single headerless row-major file
#[derive(Debug)]
pub struct RowMajorPixelBuffer {
    path: PathBuf,
    layout: PixelLayout,
    file: Option<File>,
    null_plane_probe: usize,
}

impl RowMajorPixelBuffer {
    /// Create (or truncate) the file and size it to hold every pixel.
    /// All planes of a new buffer are null planes.
    pub fn create(path: impl AsRef<Path>, geometry: ImageGeometry) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let layout = PixelLayout::new(geometry)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(layout.total_size())?;

        info!(path = %path.display(), "created pixel file {}", layout.summary());
        Ok(Self {
            path,
            layout,
            file: Some(file),
            null_plane_probe: NULL_PLANE_SIZE,
        })
    }

    /// Open an existing pixel file read-write
    pub fn open(path: impl AsRef<Path>, geometry: ImageGeometry) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let layout = PixelLayout::new(geometry)?;
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let length = file.metadata()?.len();
        if length != layout.total_size() {
            warn!(
                path = %path.display(),
                "pixel file holds {} bytes, geometry {} expects {}",
                length,
                geometry,
                layout.total_size()
            );
        }

        debug!(path = %path.display(), "opened pixel file {}", layout.summary());
        Ok(Self {
            path,
            layout,
            file: Some(file),
            null_plane_probe: NULL_PLANE_SIZE,
        })
    }

    /// Set how many leading bytes of a plane are probed for the null pattern
    pub fn with_null_plane_probe(mut self, probe: usize) -> Self {
        self.null_plane_probe = probe.max(1);
        self
    }

    /// Flush written pixels to the storage device
    pub fn sync(&mut self) -> Result<()> {
        self.file()?.sync_data()?;
        Ok(())
    }

    fn file(&mut self) -> Result<&mut File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(PixelsError::Closed(self.path.display().to_string())),
        }
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let file = self.file()?;
        let length = file.metadata()?.len();
        let end = offset.checked_add(buffer.len() as u64);
        if end.map_or(true, |end| end > length) {
            return Err(PixelsError::OutOfBounds(format!(
                "region of {} bytes at offset {} exceeds file length {}",
                buffer.len(),
                offset,
                length
            )));
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buffer)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let total = self.layout.total_size();
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > total) {
            return Err(PixelsError::OutOfBounds(format!(
                "region of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                total
            )));
        }
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn read_block(&mut self, size: u64, offset: u64) -> Result<PixelData> {
        let mut data = vec![0u8; to_len(size)?];
        self.read_at(offset, &mut data)?;
        Ok(PixelData::new(self.layout.geometry().pixel_type, data))
    }

    fn is_null_plane(&self, plane: &[u8]) -> bool {
        let probe = self.null_plane_probe.min(plane.len());
        plane[..probe].iter().all(|&b| b == NULL_PLANE_BYTE)
    }

    /// Byte offset of the first pixel of each row selected by a hypercube
    /// that already passed [`PixelLayout::check_hypercube`]
    fn row_starts(&self, cube: &Hypercube) -> Result<Vec<u64>> {
        let width = self.layout.geometry().byte_width() as u64;
        let x = cube.extent(Axis::X).start as u64 * width;
        let (y, z, c, t) = (
            cube.extent(Axis::Y),
            cube.extent(Axis::Z),
            cube.extent(Axis::C),
            cube.extent(Axis::T),
        );

        let rows = [y, z, c, t]
            .iter()
            .fold(1usize, |rows, e| rows.saturating_mul(e.size as usize));
        let mut starts = Vec::with_capacity(rows);
        for t in t.start..t.start + t.size {
            for c in c.start..c.start + c.size {
                for z in z.start..z.start + z.size {
                    for y in y.start..y.start + y.size {
                        starts.push(self.layout.row_offset(y, z, c, t)? + x);
                    }
                }
            }
        }
        Ok(starts)
    }
}

impl PixelBuffer for RowMajorPixelBuffer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn layout(&self) -> &PixelLayout {
        &self.layout
    }

    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            drop(file);
            debug!(path = %self.path.display(), "closed pixel file");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn get_region(&mut self, size: usize, offset: u64) -> Result<Option<PixelData>> {
        self.read_block(size as u64, offset).map(Some)
    }

    fn get_region_direct(
        &mut self,
        size: usize,
        offset: u64,
        buffer: &mut [u8],
    ) -> Result<Option<usize>> {
        check_destination(buffer, size as u64)?;
        self.read_at(offset, buffer)?;
        Ok(Some(size))
    }

    fn get_row(&mut self, y: u32, z: u32, c: u32, t: u32) -> Result<PixelData> {
        let offset = self.layout.row_offset(y, z, c, t)?;
        self.read_block(self.layout.row_size(), offset)
    }

    fn get_row_direct(&mut self, y: u32, z: u32, c: u32, t: u32, buffer: &mut [u8]) -> Result<()> {
        let offset = self.layout.row_offset(y, z, c, t)?;
        check_destination(buffer, self.layout.row_size())?;
        self.read_at(offset, buffer)
    }

    fn get_plane(&mut self, z: u32, c: u32, t: u32) -> Result<Option<PixelData>> {
        debug!("retrieving plane: {}x{}x{}", z, c, t);
        let offset = self.layout.plane_offset(z, c, t)?;
        let plane = self.read_block(self.layout.plane_size(), offset)?;

        if self.is_null_plane(plane.as_bytes()) {
            debug!("plane {}x{}x{} is a null plane", z, c, t);
            return Ok(None);
        }
        Ok(Some(plane))
    }

    fn get_plane_direct(&mut self, z: u32, c: u32, t: u32, buffer: &mut [u8]) -> Result<()> {
        let offset = self.layout.plane_offset(z, c, t)?;
        check_destination(buffer, self.layout.plane_size())?;
        self.read_at(offset, buffer)
    }

    fn get_plane_region_direct(
        &mut self,
        z: u32,
        c: u32,
        t: u32,
        count: usize,
        offset: usize,
        buffer: &mut [u8],
    ) -> Result<()> {
        let plane_offset = self.layout.plane_offset(z, c, t)?;
        let (start, length) = self.layout.plane_region(count, offset)?;
        if buffer.len() < length {
            return Err(PixelsError::SizeMismatch {
                expected: length as u64,
                actual: buffer.len() as u64,
            });
        }
        self.read_at(plane_offset + start as u64, &mut buffer[..length])
    }

    fn get_stack(&mut self, c: u32, t: u32) -> Result<PixelData> {
        let offset = self.layout.stack_offset(c, t)?;
        self.read_block(self.layout.stack_size(), offset)
    }

    fn get_stack_direct(&mut self, c: u32, t: u32, buffer: &mut [u8]) -> Result<()> {
        let offset = self.layout.stack_offset(c, t)?;
        check_destination(buffer, self.layout.stack_size())?;
        self.read_at(offset, buffer)
    }

    fn get_timepoint(&mut self, t: u32) -> Result<PixelData> {
        let offset = self.layout.timepoint_offset(t)?;
        self.read_block(self.layout.timepoint_size(), offset)
    }

    fn get_timepoint_direct(&mut self, t: u32, buffer: &mut [u8]) -> Result<()> {
        let offset = self.layout.timepoint_offset(t)?;
        check_destination(buffer, self.layout.timepoint_size())?;
        self.read_at(offset, buffer)
    }

    fn get_hypercube_direct(&mut self, cube: &Hypercube, buffer: &mut [u8]) -> Result<()> {
        self.layout.check_hypercube(cube)?;
        check_destination(buffer, self.layout.hypercube_size(cube))?;

        let scan = cube.extent(Axis::X).size as usize * self.layout.geometry().byte_width() as usize;
        let starts = self.row_starts(cube)?;
        for (row, start) in buffer.chunks_exact_mut(scan).zip(starts) {
            self.read_at(start, row)?;
        }
        Ok(())
    }

    fn set_region(&mut self, size: usize, offset: u64, data: &[u8]) -> Result<()> {
        check_source(data, size as u64)?;
        self.write_at(offset, data)
    }

    fn set_row(&mut self, data: &[u8], y: u32, z: u32, c: u32, t: u32) -> Result<()> {
        let offset = self.layout.row_offset(y, z, c, t)?;
        check_source(data, self.layout.row_size())?;
        self.write_at(offset, data)
    }

    fn set_plane(&mut self, data: &[u8], z: u32, c: u32, t: u32) -> Result<()> {
        let offset = self.layout.plane_offset(z, c, t)?;
        check_source(data, self.layout.plane_size())?;
        self.write_at(offset, data)
    }

    fn set_stack(&mut self, data: &[u8], c: u32, t: u32) -> Result<()> {
        let offset = self.layout.stack_offset(c, t)?;
        check_source(data, self.layout.stack_size())?;
        self.write_at(offset, data)
    }

    fn set_timepoint(&mut self, data: &[u8], t: u32) -> Result<()> {
        let offset = self.layout.timepoint_offset(t)?;
        check_source(data, self.layout.timepoint_size())?;
        self.write_at(offset, data)
    }

    fn set_hypercube(&mut self, data: &[u8], cube: &Hypercube) -> Result<()> {
        self.layout.check_hypercube(cube)?;
        check_source(data, self.layout.hypercube_size(cube))?;

        let scan = cube.extent(Axis::X).size as usize * self.layout.geometry().byte_width() as usize;
        let starts = self.row_starts(cube)?;
        for (row, start) in data.chunks_exact(scan).zip(starts) {
            self.write_at(start, row)?;
        }
        Ok(())
    }
}

impl Drop for RowMajorPixelBuffer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
