//! Pixel buffers stored as a chunked dataset inside a container
//!
//! All pixels live in the dataset [`PIXELS_DATASET`] of the container's root
//! group. A [`DimensionOrder`] decides which dataset dimension each logical
//! axis occupies; callers always exchange bytes in logical XYZCT row-major
//! order whatever the stored order is.

use crate::buffer::{check_destination, check_source, to_len, PixelBuffer};
use crate::compression::{CompressionLevel, CompressionMethod};
use crate::container::{Container, Dataset, ROOT_GROUP};
use crate::error::{PixelsError, Result};
use crate::layout::{Hypercube, PixelLayout};
use crate::metadata::{DataType, DatasetMetadata};
use crate::pixel_data::PixelData;
use crate::types::{Axis, ImageGeometry};
use ndarray::{ArrayView, ArrayViewMut, IxDyn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the dataset holding the pixels
pub const PIXELS_DATASET: &str = "pixels";

/// Chunk extents (x, y, z, c, t) of tuned buffers
pub const TUNED_CHUNKS: [u32; 5] = [5, 5, 1, 1, 2];

/// Logical axes from slowest to fastest
const LOGICAL_ORDER: [Axis; 5] = [Axis::T, Axis::C, Axis::Z, Axis::Y, Axis::X];

/// Dataset dimension of every logical axis, indexed X, Y, Z, C, T
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[usize; 5]", into = "[usize; 5]")]
pub struct DimensionOrder([usize; 5]);

impl DimensionOrder {
    /// Accept only permutations of `0..5`
    pub fn new(order: [usize; 5]) -> Result<Self> {
        let mut seen = [false; 5];
        for &dim in &order {
            if dim >= 5 || seen[dim] {
                return Err(PixelsError::InvalidConfiguration(format!(
                    "dimension order {:?} is not a permutation of 0..5",
                    order
                )));
            }
            seen[dim] = true;
        }
        Ok(Self(order))
    }

    /// Dataset dimension holding `axis`
    pub fn dimension(&self, axis: Axis) -> usize {
        self.0[axis.to_index()]
    }

    pub fn as_array(&self) -> [usize; 5] {
        self.0
    }

    /// True when the dataset stores T slowest and X fastest
    pub fn is_logical(&self) -> bool {
        LOGICAL_ORDER
            .iter()
            .enumerate()
            .all(|(dim, &axis)| self.dimension(axis) == dim)
    }

    /// Place per-axis values at their dataset dimensions
    fn scatter(&self, values: [u64; 5]) -> Vec<u64> {
        let mut stored = vec![0u64; 5];
        for axis in Axis::ALL {
            stored[self.dimension(axis)] = values[axis.to_index()];
        }
        stored
    }

    /// Axis permutation taking a stored selection (plus its byte axis) to
    /// logical order
    fn to_logical(&self) -> Vec<usize> {
        let mut perm: Vec<usize> = LOGICAL_ORDER.iter().map(|&axis| self.dimension(axis)).collect();
        perm.push(5);
        perm
    }
}

impl Default for DimensionOrder {
    fn default() -> Self {
        Self([4, 3, 2, 1, 0])
    }
}

impl TryFrom<[usize; 5]> for DimensionOrder {
    type Error = PixelsError;

    fn try_from(order: [usize; 5]) -> Result<Self> {
        Self::new(order)
    }
}

impl From<DimensionOrder> for [usize; 5] {
    fn from(order: DimensionOrder) -> Self {
        order.0
    }
}

/// Start and count of a dataset selection, in dataset dimension order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub start: Vec<u64>,
    pub count: Vec<u64>,
}

/// How a chunked buffer lays out its dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedOptions {
    pub order: DimensionOrder,
    /// Chunk extents (x, y, z, c, t); one plane per chunk when unset
    pub chunks: Option<[u32; 5]>,
    pub compression: CompressionMethod,
    pub compression_level: CompressionLevel,
}

impl Default for ChunkedOptions {
    fn default() -> Self {
        Self {
            order: DimensionOrder::default(),
            chunks: None,
            compression: CompressionMethod::None,
            compression_level: CompressionLevel::default(),
        }
    }
}

impl ChunkedOptions {
    pub fn with_order(mut self, order: DimensionOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_chunks(mut self, chunks: [u32; 5]) -> Self {
        self.chunks = Some(chunks);
        self
    }

    pub fn with_compression(mut self, method: CompressionMethod, level: CompressionLevel) -> Self {
        self.compression = method;
        self.compression_level = level;
        self
    }

    /// Chunk extents clamped to the geometry, indexed X..T
    fn chunk_extents(&self, geometry: &ImageGeometry) -> [u32; 5] {
        let requested = self
            .chunks
            .unwrap_or([geometry.size_x, geometry.size_y, 1, 1, 1]);
        let mut extents = [1u32; 5];
        for axis in Axis::ALL {
            let i = axis.to_index();
            extents[i] = requested[i].clamp(1, geometry.size(axis));
        }
        extents
    }
}

/// Square power-of-two XY chunk whose bytes fit in `budget`, one plane deep.
///
/// Returned extents are (x, y, z, c, t), never larger than the geometry.
pub fn make_chunks(geometry: &ImageGeometry, budget: u64) -> [u32; 5] {
    let width = geometry.byte_width() as u64;
    let mut side: u64 = 1;
    while side < (1 << 31) && (side * 2) * (side * 2) * width <= budget {
        side *= 2;
    }
    let side = u32::try_from(side).unwrap_or(u32::MAX);
    [
        side.min(geometry.size_x),
        side.min(geometry.size_y),
        1,
        1,
        1,
    ]
}

/// Pixel buffer over the `pixels` dataset of a chunked container
pub struct ChunkedPixelBuffer {
    path: PathBuf,
    layout: PixelLayout,
    order: DimensionOrder,
    dataset: Option<Dataset>,
}

impl ChunkedPixelBuffer {
    /// Open or create a container with default options
    pub fn open(path: impl AsRef<Path>, geometry: ImageGeometry) -> Result<Self> {
        Self::with_options(path, geometry, ChunkedOptions::default())
    }

    /// Open or create a container whose chunks are [`TUNED_CHUNKS`]
    pub fn tuned(path: impl AsRef<Path>, geometry: ImageGeometry) -> Result<Self> {
        Self::with_options(
            path,
            geometry,
            ChunkedOptions::default().with_chunks(TUNED_CHUNKS),
        )
    }

    /// Open or create a container.
    ///
    /// An existing `pixels` dataset must match the geometry; its stored chunk
    /// extents and compression are kept.
    pub fn with_options(
        path: impl AsRef<Path>,
        geometry: ImageGeometry,
        options: ChunkedOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let layout = PixelLayout::new(geometry)?;
        let order = options.order;

        let shape = order.scatter(geometry.sizes().map(u64::from));
        let dtype = DataType::from_pixel_type(geometry.pixel_type);

        let mut container = Container::open_or_create(&path)?;
        let dataset = if container.has_dataset(ROOT_GROUP, PIXELS_DATASET) {
            let dataset = container.open_dataset(ROOT_GROUP, PIXELS_DATASET)?;
            let stored = dataset.metadata();
            if stored.shape != shape || stored.dtype != dtype {
                return Err(PixelsError::InvalidConfiguration(format!(
                    "dataset {} has shape {:?} of {:?}, geometry {} needs {:?} of {:?}",
                    PIXELS_DATASET, stored.shape, stored.dtype, geometry, shape, dtype
                )));
            }
            debug!(path = %path.display(), "opened pixels dataset");
            dataset
        } else {
            let chunks = order.scatter(options.chunk_extents(&geometry).map(u64::from));
            let metadata = DatasetMetadata::new(shape, chunks, dtype)?
                .with_compression(options.compression, options.compression_level);
            container.create_dataset(ROOT_GROUP, PIXELS_DATASET, metadata)?
        };

        info!(
            path = %path.display(),
            order = ?order.as_array(),
            chunks = ?dataset.metadata().chunks,
            "chunked pixel buffer {}",
            layout.summary()
        );
        Ok(Self {
            path,
            layout,
            order,
            dataset: Some(dataset),
        })
    }

    pub fn order(&self) -> DimensionOrder {
        self.order
    }

    /// Stored chunk extents in dataset dimension order
    pub fn chunks(&self) -> Result<Vec<u64>> {
        Ok(self.dataset()?.metadata().chunks.clone())
    }

    fn dataset(&self) -> Result<&Dataset> {
        self.dataset
            .as_ref()
            .ok_or_else(|| PixelsError::Closed(self.path.display().to_string()))
    }

    /// Dataset selection covering a hypercube
    pub fn hyper_cube(&self, cube: &Hypercube) -> Result<Selection> {
        self.layout.check_hypercube(cube)?;
        Ok(Selection {
            start: self.order.scatter(cube.starts().map(u64::from)),
            count: self.order.scatter(cube.sizes().map(u64::from)),
        })
    }

    pub fn subselect_row(&self, y: u32, z: u32, c: u32, t: u32) -> Result<Selection> {
        self.layout.check_bounds(Some(y), Some(z), Some(c), Some(t))?;
        self.hyper_cube(&Hypercube::row(self.layout.geometry(), y, z, c, t))
    }

    pub fn subselect_plane(&self, z: u32, c: u32, t: u32) -> Result<Selection> {
        self.layout.check_bounds(None, Some(z), Some(c), Some(t))?;
        self.hyper_cube(&Hypercube::plane(self.layout.geometry(), z, c, t))
    }

    pub fn subselect_stack(&self, c: u32, t: u32) -> Result<Selection> {
        self.layout.check_bounds(None, None, Some(c), Some(t))?;
        self.hyper_cube(&Hypercube::stack(self.layout.geometry(), c, t))
    }

    pub fn subselect_timepoint(&self, t: u32) -> Result<Selection> {
        self.layout.check_bounds(None, None, None, Some(t))?;
        self.hyper_cube(&Hypercube::timepoint(self.layout.geometry(), t))
    }

    /// Read a selection into `buffer` in logical order
    fn read_into(&self, selection: &Selection, buffer: &mut [u8]) -> Result<()> {
        check_destination(buffer, self.selection_size(selection))?;
        let stored = self.dataset()?.read_selected(&selection.start, &selection.count)?;
        if self.order.is_logical() {
            buffer.copy_from_slice(&stored);
            return Ok(());
        }

        let view = ArrayView::from_shape(IxDyn(&self.stored_shape(selection)), &stored[..])?
            .permuted_axes(IxDyn(&self.order.to_logical()));
        let mut out = ArrayViewMut::from_shape(IxDyn(&self.logical_shape(selection)), buffer)?;
        out.assign(&view);
        Ok(())
    }

    fn read(&self, selection: &Selection) -> Result<PixelData> {
        let mut data = vec![0u8; to_len(self.selection_size(selection))?];
        self.read_into(selection, &mut data)?;
        Ok(PixelData::new(self.layout.geometry().pixel_type, data))
    }

    /// Write logical order bytes to a selection
    fn write(&self, selection: &Selection, data: &[u8]) -> Result<()> {
        check_source(data, self.selection_size(selection))?;
        let dataset = self.dataset()?;
        if self.order.is_logical() {
            return dataset.write_selected(&selection.start, &selection.count, data);
        }

        let mut stored = vec![0u8; data.len()];
        {
            let source = ArrayView::from_shape(IxDyn(&self.logical_shape(selection)), data)?;
            let mut target = ArrayViewMut::from_shape(IxDyn(&self.stored_shape(selection)), &mut stored[..])?
                .permuted_axes(IxDyn(&self.order.to_logical()));
            target.assign(&source);
        }
        dataset.write_selected(&selection.start, &selection.count, &stored)
    }

    fn selection_size(&self, selection: &Selection) -> u64 {
        selection.count.iter().product::<u64>() * self.layout.geometry().byte_width() as u64
    }

    fn stored_shape(&self, selection: &Selection) -> Vec<usize> {
        let mut shape: Vec<usize> = selection.count.iter().map(|&n| n as usize).collect();
        shape.push(self.layout.geometry().byte_width() as usize);
        shape
    }

    fn logical_shape(&self, selection: &Selection) -> Vec<usize> {
        let mut shape: Vec<usize> = LOGICAL_ORDER
            .iter()
            .map(|&axis| selection.count[self.order.dimension(axis)] as usize)
            .collect();
        shape.push(self.layout.geometry().byte_width() as usize);
        shape
    }
}

impl PixelBuffer for ChunkedPixelBuffer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn layout(&self) -> &PixelLayout {
        &self.layout
    }

    fn close(&mut self) -> Result<()> {
        if self.dataset.take().is_some() {
            debug!(path = %self.path.display(), "closed chunked pixel buffer");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.dataset.is_none()
    }

    fn get_region(&mut self, _size: usize, _offset: u64) -> Result<Option<PixelData>> {
        Ok(None)
    }

    fn get_region_direct(
        &mut self,
        _size: usize,
        _offset: u64,
        _buffer: &mut [u8],
    ) -> Result<Option<usize>> {
        Ok(None)
    }

    fn get_row(&mut self, y: u32, z: u32, c: u32, t: u32) -> Result<PixelData> {
        self.read(&self.subselect_row(y, z, c, t)?)
    }

    fn get_row_direct(&mut self, y: u32, z: u32, c: u32, t: u32, buffer: &mut [u8]) -> Result<()> {
        self.read_into(&self.subselect_row(y, z, c, t)?, buffer)
    }

    fn get_plane(&mut self, z: u32, c: u32, t: u32) -> Result<Option<PixelData>> {
        self.read(&self.subselect_plane(z, c, t)?).map(Some)
    }

    fn get_plane_direct(&mut self, z: u32, c: u32, t: u32, buffer: &mut [u8]) -> Result<()> {
        self.read_into(&self.subselect_plane(z, c, t)?, buffer)
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
        let selection = self.subselect_plane(z, c, t)?;
        let (start, length) = self.layout.plane_region(count, offset)?;
        if buffer.len() < length {
            return Err(PixelsError::SizeMismatch {
                expected: length as u64,
                actual: buffer.len() as u64,
            });
        }

        let plane = self.read(&selection)?;
        buffer[..length].copy_from_slice(&plane.as_bytes()[start..start + length]);
        Ok(())
    }

    fn get_stack(&mut self, c: u32, t: u32) -> Result<PixelData> {
        self.read(&self.subselect_stack(c, t)?)
    }

    fn get_stack_direct(&mut self, c: u32, t: u32, buffer: &mut [u8]) -> Result<()> {
        self.read_into(&self.subselect_stack(c, t)?, buffer)
    }

    fn get_timepoint(&mut self, t: u32) -> Result<PixelData> {
        self.read(&self.subselect_timepoint(t)?)
    }

    fn get_timepoint_direct(&mut self, t: u32, buffer: &mut [u8]) -> Result<()> {
        self.read_into(&self.subselect_timepoint(t)?, buffer)
    }

    fn get_hypercube_direct(&mut self, cube: &Hypercube, buffer: &mut [u8]) -> Result<()> {
        self.read_into(&self.hyper_cube(cube)?, buffer)
    }

    fn set_region(&mut self, _size: usize, _offset: u64, _data: &[u8]) -> Result<()> {
        Err(PixelsError::unsupported("set_region", "chunked pixel buffers"))
    }

    fn set_row(&mut self, data: &[u8], y: u32, z: u32, c: u32, t: u32) -> Result<()> {
        self.write(&self.subselect_row(y, z, c, t)?, data)
    }

    fn set_plane(&mut self, data: &[u8], z: u32, c: u32, t: u32) -> Result<()> {
        self.write(&self.subselect_plane(z, c, t)?, data)
    }

    fn set_stack(&mut self, data: &[u8], c: u32, t: u32) -> Result<()> {
        self.write(&self.subselect_stack(c, t)?, data)
    }

    fn set_timepoint(&mut self, data: &[u8], t: u32) -> Result<()> {
        self.write(&self.subselect_timepoint(t)?, data)
    }

    fn set_hypercube(&mut self, data: &[u8], cube: &Hypercube) -> Result<()> {
        self.write(&self.hyper_cube(cube)?, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelType;
    use tempfile::TempDir;

    fn geometry() -> ImageGeometry {
        ImageGeometry::new(6, 4, 3, 2, 2, PixelType::Int16).unwrap()
    }

    #[test]
    fn test_dimension_order_must_be_permutation() {
        assert!(matches!(
            DimensionOrder::new([0, 1, 2, 2, 4]),
            Err(PixelsError::InvalidConfiguration(_))
        ));
        assert!(DimensionOrder::new([0, 1, 2, 3, 5]).is_err());
        assert!(DimensionOrder::new([4, 3, 2, 1, 0]).is_ok());
        assert!(DimensionOrder::default().is_logical());
        assert!(!DimensionOrder::new([0, 1, 2, 3, 4]).unwrap().is_logical());
    }

    #[test]
    fn test_dimension_order_serde() {
        let json = serde_json::to_string(&DimensionOrder::default()).unwrap();
        assert_eq!(json, "[4,3,2,1,0]");
        assert!(serde_json::from_str::<DimensionOrder>("[0,0,1,2,3]").is_err());
    }

    #[test]
    fn test_hyper_cube_selection() {
        let temp_dir = TempDir::new().unwrap();
        let order = DimensionOrder::new([0, 1, 2, 3, 4]).unwrap();
        let buffer = ChunkedPixelBuffer::with_options(
            temp_dir.path().join("c"),
            geometry(),
            ChunkedOptions::default().with_order(order),
        )
        .unwrap();

        let selection = buffer.subselect_plane(2, 1, 0).unwrap();
        assert_eq!(selection.start, vec![0, 0, 2, 1, 0]);
        assert_eq!(selection.count, vec![6, 4, 1, 1, 1]);
        assert!(matches!(
            buffer.subselect_row(4, 0, 0, 0),
            Err(PixelsError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_region_access_is_not_available() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = ChunkedPixelBuffer::open(temp_dir.path().join("c"), geometry()).unwrap();
        assert!(buffer.get_region(16, 0).unwrap().is_none());
        assert!(buffer.get_region_direct(16, 0, &mut [0; 16]).unwrap().is_none());
        assert!(matches!(
            buffer.set_region(2, 0, &[0, 0]),
            Err(PixelsError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_make_chunks() {
        let large = ImageGeometry::new(10000, 10000, 1, 1, 1, PixelType::Int8).unwrap();
        assert_eq!(make_chunks(&large, 1 << 20), [1024, 1024, 1, 1, 1]);

        let wide = ImageGeometry::new(4000, 100, 5, 1, 1, PixelType::UInt16).unwrap();
        assert_eq!(make_chunks(&wide, 1 << 20), [512, 100, 1, 1, 1]);

        let tiny = ImageGeometry::new(3, 3, 1, 1, 1, PixelType::Float64).unwrap();
        assert_eq!(make_chunks(&tiny, 1), [1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_tuned_chunks_are_clamped() {
        let temp_dir = TempDir::new().unwrap();
        let small = ImageGeometry::new(3, 8, 2, 1, 1, PixelType::UInt8).unwrap();
        let buffer = ChunkedPixelBuffer::tuned(temp_dir.path().join("c"), small).unwrap();
        // t, c, z, y, x
        assert_eq!(buffer.chunks().unwrap(), vec![1, 1, 1, 5, 3]);
    }

    #[test]
    fn test_closed_buffer() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = ChunkedPixelBuffer::open(temp_dir.path().join("c"), geometry()).unwrap();
        buffer.close().unwrap();
        buffer.close().unwrap();
        assert!(matches!(buffer.get_plane(0, 0, 0), Err(PixelsError::Closed(_))));
    }
}
