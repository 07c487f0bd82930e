//! Read-only access to DeltaVision image files
//!
//! Planes are stored bottom row first, in the file's byte order, in the
//! sequence named by the header. View getters hand out the stored bytes
//! tagged with that order; direct getters copy logical (top row first) bytes
//! and, for little-endian files, swap 2 and 4 byte integer words into
//! big-endian order.

pub mod header;

pub use header::{DvHeader, PlaneSequence, DV_MAGIC, HEADER_SIZE};

use crate::buffer::{check_destination, to_len, PixelBuffer};
use crate::error::{PixelsError, Result};
use crate::layout::{Hypercube, PixelLayout};
use crate::pixel_data::{reorder_pixels, reorder_rows, PixelData};
use crate::types::{Axis, PixelType};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const BACKEND: &str = "DeltaVision files";

/// Pixel buffer over a DeltaVision file
#[derive(Debug)]
pub struct DvPixelBuffer {
    path: PathBuf,
    header: DvHeader,
    layout: PixelLayout,
    file: Option<File>,
}

impl DvPixelBuffer {
    /// Open a file and parse its header; the geometry comes from the header
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut block = vec![0u8; HEADER_SIZE];
        file.read_exact(&mut block).map_err(|e| {
            PixelsError::InvalidFormat(format!("{}: {}", path.display(), e))
        })?;
        let header = DvHeader::parse(&block)?;
        let layout = PixelLayout::new(header.geometry()?)?;

        let expected = header.first_plane_offset() + layout.total_size();
        let length = file.metadata()?.len();
        if length < expected {
            warn!(
                path = %path.display(),
                "DeltaVision file holds {} bytes, header describes {}",
                length,
                expected
            );
        }

        info!(
            path = %path.display(),
            sequence = ?header.sequence,
            byte_order = ?header.byte_order,
            "opened DeltaVision file {}",
            layout.summary()
        );
        Ok(Self {
            path,
            header,
            layout,
            file: Some(file),
        })
    }

    pub fn header(&self) -> &DvHeader {
        &self.header
    }

    /// Word width to byte swap while reordering, if any
    fn swap_width(&self) -> Option<usize> {
        if self.header.is_native() {
            return None;
        }
        match self.header.pixel_type {
            PixelType::Int16 | PixelType::UInt16 | PixelType::Int32 | PixelType::UInt32 => {
                Some(self.header.pixel_type.byte_width() as usize)
            }
            _ => None,
        }
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(PixelsError::Closed(self.path.display().to_string())),
        };
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

    /// Stored bytes as a bottom-left origin view in the file's byte order
    fn read_view(&mut self, size: u64, offset: u64) -> Result<PixelData> {
        let mut data = vec![0u8; to_len(size)?];
        self.read_at(offset, &mut data)?;
        let view = PixelData::reordered(
            self.header.pixel_type,
            data,
            self.layout.row_size() as usize,
        )?;
        Ok(view.with_byte_order(self.header.byte_order))
    }

    /// Stored bytes copied into `buffer` in logical order
    fn read_logical(&mut self, size: u64, offset: u64, buffer: &mut [u8]) -> Result<()> {
        check_destination(buffer, size)?;
        let mut stored = vec![0u8; buffer.len()];
        self.read_at(offset, &mut stored)?;
        let row_size = self.layout.row_size() as usize;
        reorder_rows(&stored, buffer, row_size, self.swap_width())
    }
}

impl PixelBuffer for DvPixelBuffer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn layout(&self) -> &PixelLayout {
        &self.layout
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "closed DeltaVision file");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn plane_offset(&self, z: u32, c: u32, t: u32) -> Result<u64> {
        self.layout.check_bounds(None, Some(z), Some(c), Some(t))?;
        let plane_number = self.header.plane_number(z, c, t);
        Ok(self.header.first_plane_offset() + plane_number * self.layout.plane_size())
    }

    fn row_offset(&self, y: u32, z: u32, c: u32, t: u32) -> Result<u64> {
        self.layout.check_bounds(Some(y), Some(z), Some(c), Some(t))?;
        let flipped = (self.header.size_y - 1 - y) as u64;
        Ok(self.plane_offset(z, c, t)? + self.layout.row_size() * flipped)
    }

    fn get_region(&mut self, size: usize, offset: u64) -> Result<Option<PixelData>> {
        self.read_view(size as u64, offset).map(Some)
    }

    fn get_region_direct(
        &mut self,
        size: usize,
        offset: u64,
        buffer: &mut [u8],
    ) -> Result<Option<usize>> {
        self.read_logical(size as u64, offset, buffer)?;
        Ok(Some(size))
    }

    fn get_row(&mut self, y: u32, z: u32, c: u32, t: u32) -> Result<PixelData> {
        let offset = self.row_offset(y, z, c, t)?;
        self.read_view(self.layout.row_size(), offset)
    }

    fn get_row_direct(&mut self, y: u32, z: u32, c: u32, t: u32, buffer: &mut [u8]) -> Result<()> {
        let offset = self.row_offset(y, z, c, t)?;
        self.read_logical(self.layout.row_size(), offset, buffer)
    }

    fn get_plane(&mut self, z: u32, c: u32, t: u32) -> Result<Option<PixelData>> {
        let offset = self.plane_offset(z, c, t)?;
        self.read_view(self.layout.plane_size(), offset).map(Some)
    }

    fn get_plane_direct(&mut self, z: u32, c: u32, t: u32, buffer: &mut [u8]) -> Result<()> {
        let offset = self.plane_offset(z, c, t)?;
        self.read_logical(self.layout.plane_size(), offset, buffer)
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
        let plane_offset = self.plane_offset(z, c, t)?;
        let width = self.header.pixel_type.byte_width() as usize;
        let plane_size = self.layout.plane_size();
        let (_, length) = self.layout.plane_region(count, offset)?;
        if buffer.len() < length {
            return Err(PixelsError::SizeMismatch {
                expected: length as u64,
                actual: buffer.len() as u64,
            });
        }

        let mut plane = vec![0u8; to_len(plane_size)?];
        self.read_at(plane_offset, &mut plane)?;
        reorder_pixels(
            &plane,
            buffer,
            count,
            offset,
            width,
            self.layout.row_size() as usize,
            self.swap_width().is_some(),
        );
        Ok(())
    }

    fn get_stack(&mut self, _c: u32, _t: u32) -> Result<PixelData> {
        Err(PixelsError::unsupported("get_stack", BACKEND))
    }

    fn get_stack_direct(&mut self, _c: u32, _t: u32, _buffer: &mut [u8]) -> Result<()> {
        Err(PixelsError::unsupported("get_stack_direct", BACKEND))
    }

    fn get_timepoint(&mut self, _t: u32) -> Result<PixelData> {
        Err(PixelsError::unsupported("get_timepoint", BACKEND))
    }

    fn get_timepoint_direct(&mut self, _t: u32, _buffer: &mut [u8]) -> Result<()> {
        Err(PixelsError::unsupported("get_timepoint_direct", BACKEND))
    }

    fn get_hypercube_direct(&mut self, cube: &Hypercube, buffer: &mut [u8]) -> Result<()> {
        self.layout.check_hypercube(cube)?;
        check_destination(buffer, self.layout.hypercube_size(cube))?;

        let width = self.header.pixel_type.byte_width() as usize;
        let row_size = self.layout.row_size() as usize;
        let (x, y, z, c, t) = (
            cube.extent(Axis::X),
            cube.extent(Axis::Y),
            cube.extent(Axis::Z),
            cube.extent(Axis::C),
            cube.extent(Axis::T),
        );
        let scan = x.size as usize * width;
        let first = x.start as usize * width;

        let mut plane = vec![0u8; to_len(self.layout.plane_size())?];
        let mut rows = buffer.chunks_exact_mut(scan);
        for t in t.start..t.start + t.size {
            for c in c.start..c.start + c.size {
                for z in z.start..z.start + z.size {
                    self.get_plane_direct(z, c, t, &mut plane)?;
                    for y in y.start..y.start + y.size {
                        let start = y as usize * row_size + first;
                        let row = rows.next().ok_or_else(|| {
                            PixelsError::Internal("hypercube buffer exhausted".to_string())
                        })?;
                        row.copy_from_slice(&plane[start..start + scan]);
                    }
                }
            }
        }
        Ok(())
    }

    fn set_region(&mut self, _size: usize, _offset: u64, _data: &[u8]) -> Result<()> {
        Err(PixelsError::unsupported("set_region", BACKEND))
    }

    fn set_row(&mut self, _data: &[u8], _y: u32, _z: u32, _c: u32, _t: u32) -> Result<()> {
        Err(PixelsError::unsupported("set_row", BACKEND))
    }

    fn set_plane(&mut self, _data: &[u8], _z: u32, _c: u32, _t: u32) -> Result<()> {
        Err(PixelsError::unsupported("set_plane", BACKEND))
    }

    fn set_stack(&mut self, _data: &[u8], _c: u32, _t: u32) -> Result<()> {
        Err(PixelsError::unsupported("set_stack", BACKEND))
    }

    fn set_timepoint(&mut self, _data: &[u8], _t: u32) -> Result<()> {
        Err(PixelsError::unsupported("set_timepoint", BACKEND))
    }

    fn set_hypercube(&mut self, _data: &[u8], _cube: &Hypercube) -> Result<()> {
        Err(PixelsError::unsupported("set_hypercube", BACKEND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ByteOrder, ImageGeometry};
    use std::io::Write;
    use tempfile::TempDir;

    /// Write a 3x2 UInt16 file with two planes (z) whose logical pixel values
    /// are `plane * 100 + index`.
    fn write_file(dir: &TempDir, order: ByteOrder) -> PathBuf {
        let geometry = ImageGeometry::new(3, 2, 2, 1, 1, PixelType::UInt16).unwrap();
        let header = DvHeader::new(geometry, PlaneSequence::Ztw, order)
            .unwrap()
            .with_extended_header_size(64);

        let mut bytes = header.to_bytes().unwrap();
        bytes.extend_from_slice(&[0u8; 64]);
        for plane in 0..2u16 {
            // stored bottom row first
            for row in [1u16, 0] {
                for x in 0..3u16 {
                    let value = plane * 100 + row * 3 + x;
                    match order {
                        ByteOrder::BigEndian => bytes.extend_from_slice(&value.to_be_bytes()),
                        ByteOrder::LittleEndian => bytes.extend_from_slice(&value.to_le_bytes()),
                    }
                }
            }
        }

        let path = dir.path().join("image.dv");
        File::create(&path).unwrap().write_all(&bytes).unwrap();
        path
    }

    fn logical_plane(plane: u16) -> Vec<u8> {
        (0..6u16).flat_map(|i| (plane * 100 + i).to_be_bytes()).collect()
    }

    #[test]
    fn test_direct_reads_are_logical_big_endian() {
        let temp_dir = TempDir::new().unwrap();
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let mut buffer = DvPixelBuffer::open(write_file(&temp_dir, order)).unwrap();
            let mut plane = vec![0u8; 12];
            buffer.get_plane_direct(1, 0, 0, &mut plane).unwrap();
            assert_eq!(plane, logical_plane(1), "{:?}", order);

            let mut row = vec![0u8; 6];
            buffer.get_row_direct(0, 0, 0, 0, &mut row).unwrap();
            assert_eq!(row, logical_plane(0)[..6]);
        }
    }

    #[test]
    fn test_views_keep_file_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = DvPixelBuffer::open(write_file(&temp_dir, ByteOrder::LittleEndian)).unwrap();
        let plane = buffer.get_plane(1, 0, 0).unwrap().unwrap();
        assert_eq!(plane.byte_order(), ByteOrder::LittleEndian);
        assert_eq!(plane.pixel_value(0), 100.0);
        assert_eq!(plane.pixel_value(4), 104.0);

        let row = buffer.get_row(1, 0, 0, 0).unwrap();
        assert_eq!(row.pixel_value(2), 5.0);
    }

    #[test]
    fn test_offsets_follow_header() {
        let temp_dir = TempDir::new().unwrap();
        let buffer = DvPixelBuffer::open(write_file(&temp_dir, ByteOrder::BigEndian)).unwrap();
        assert_eq!(buffer.plane_offset(0, 0, 0).unwrap(), 1024 + 64);
        assert_eq!(buffer.plane_offset(1, 0, 0).unwrap(), 1024 + 64 + 12);
        assert_eq!(buffer.row_offset(0, 0, 0, 0).unwrap(), 1024 + 64 + 6);
        assert_eq!(buffer.row_offset(1, 0, 0, 0).unwrap(), 1024 + 64);
        assert!(buffer.row_offset(2, 0, 0, 0).is_err());
    }

    #[test]
    fn test_plane_region_direct() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = DvPixelBuffer::open(write_file(&temp_dir, ByteOrder::LittleEndian)).unwrap();
        let mut out = vec![0u8; 6];
        buffer.get_plane_region_direct(0, 0, 0, 3, 2, &mut out).unwrap();
        assert_eq!(out, logical_plane(0)[4..10]);
        assert!(buffer.get_plane_region_direct(0, 0, 0, 3, 4, &mut out).is_err());
    }

    #[test]
    fn test_plane_region_with_overflowing_offset_is_out_of_bounds() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = DvPixelBuffer::open(write_file(&temp_dir, ByteOrder::BigEndian)).unwrap();
        let mut out = vec![0u8; 8];
        for (count, offset) in [(1, usize::MAX / 2 + 1), (usize::MAX / 2 + 1, 0), (2, usize::MAX)] {
            assert!(matches!(
                buffer.get_plane_region_direct(0, 0, 0, count, offset, &mut out),
                Err(PixelsError::OutOfBounds(_))
            ));
        }
    }

    #[test]
    fn test_hypercube_is_synthesized_from_planes() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = DvPixelBuffer::open(write_file(&temp_dir, ByteOrder::LittleEndian)).unwrap();
        let cube = Hypercube::new((1, 2), (0, 2), (0, 2), (0, 1), (0, 1));
        let data = buffer.get_hypercube(&cube).unwrap();
        let expected: Vec<u8> = [1u16, 2, 4, 5, 101, 102, 104, 105]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        assert_eq!(data, expected);
    }

    #[test]
    fn test_stack_and_timepoint_are_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = DvPixelBuffer::open(write_file(&temp_dir, ByteOrder::BigEndian)).unwrap();
        assert!(matches!(
            buffer.get_stack(0, 0),
            Err(PixelsError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            buffer.get_timepoint_direct(0, &mut [0; 24]),
            Err(PixelsError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_not_a_dv_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.raw");
        File::create(&path).unwrap().write_all(&[0u8; 2048]).unwrap();
        assert!(matches!(
            DvPixelBuffer::open(&path),
            Err(PixelsError::InvalidFormat(_))
        ));
    }
}
