//! Hierarchical chunked containers
//!
//! A container is a directory holding a `container.json` document and one
//! directory per dataset. Datasets are N-dimensional arrays of fixed width
//! elements split into equally sized chunks:
//!
//! ```text
//! container/
//!   container.json
//!   pixels/
//!     dataset.json
//!     chunks/0.0.0.0.0
//!     chunks/0.0.1.0.0
//! ```
//!
//! Every chunk file holds one full chunk (edge chunks are padded), encoded
//! with the dataset's compression. Chunks that were never written read back
//! as zeros.

use crate::compression::{get_compressor, Compressor};
use crate::error::{PixelsError, Result};
use crate::io::{ContainerStore, FileSystemStore};
use crate::metadata::{ContainerMetadata, DatasetMetadata, CONTAINER_KEY, DATASET_FILE};
use crate::utils::chunk_key;
use ndarray::{ArrayView, ArrayViewMut, IxDyn, Slice};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Group holding datasets created without an explicit group
pub const ROOT_GROUP: &str = "/";

/// An open container and its root document
pub struct Container {
    store: Arc<dyn ContainerStore>,
    metadata: ContainerMetadata,
}

impl Container {
    /// Create a new, empty container directory
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let store = FileSystemStore::create(path)?;
        if store.exists(CONTAINER_KEY)? {
            return Err(PixelsError::InvalidConfiguration(format!(
                "container already exists at {}",
                store.location().display()
            )));
        }

        let container = Self {
            store: Arc::new(store),
            metadata: ContainerMetadata::new(),
        };
        container.save()?;
        info!(
            path = %container.store.location().display(),
            id = %container.metadata.id,
            "created container"
        );
        Ok(container)
    }

    /// Open an existing container
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_store(Arc::new(FileSystemStore::open(path)?))
    }

    /// Open a container held by any store
    pub fn open_store(store: Arc<dyn ContainerStore>) -> Result<Self> {
        let bytes = store.read_optional(CONTAINER_KEY)?.ok_or_else(|| {
            PixelsError::InvalidFormat(format!(
                "{} has no {}",
                store.location().display(),
                CONTAINER_KEY
            ))
        })?;
        let metadata = ContainerMetadata::from_json(&bytes)?;
        debug!(path = %store.location().display(), id = %metadata.id, "opened container");
        Ok(Self { store, metadata })
    }

    /// Open the container at `path`, creating it when it does not exist
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().join(CONTAINER_KEY).is_file() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    pub fn metadata(&self) -> &ContainerMetadata {
        &self.metadata
    }

    pub fn location(&self) -> &Path {
        self.store.location()
    }

    /// Names of the datasets held by a group
    pub fn datasets(&self, group: &str) -> Vec<String> {
        self.metadata.groups.get(group).cloned().unwrap_or_default()
    }

    pub fn has_dataset(&self, group: &str, name: &str) -> bool {
        self.metadata.has_dataset(group, name)
    }

    /// Create a dataset and record it in the container document
    pub fn create_dataset(
        &mut self,
        group: &str,
        name: &str,
        metadata: DatasetMetadata,
    ) -> Result<Dataset> {
        if self.has_dataset(group, name) {
            return Err(PixelsError::InvalidConfiguration(format!(
                "dataset {} already exists in group {}",
                name, group
            )));
        }

        let prefix = dataset_prefix(group, name)?;
        self.store
            .write(&format!("{}/{}", prefix, DATASET_FILE), &metadata.to_json()?)?;
        self.metadata.add_dataset(group, name);
        self.save()?;

        debug!(
            dataset = %prefix,
            shape = ?metadata.shape,
            chunks = ?metadata.chunks,
            compression = %metadata.compression,
            "created dataset"
        );
        Ok(Dataset::new(Arc::clone(&self.store), prefix, metadata))
    }

    pub fn open_dataset(&self, group: &str, name: &str) -> Result<Dataset> {
        if !self.has_dataset(group, name) {
            return Err(PixelsError::InvalidConfiguration(format!(
                "no dataset {} in group {}",
                name, group
            )));
        }

        let prefix = dataset_prefix(group, name)?;
        let bytes = self.store.read(&format!("{}/{}", prefix, DATASET_FILE))?;
        let metadata = DatasetMetadata::from_json(&bytes)?;
        Ok(Dataset::new(Arc::clone(&self.store), prefix, metadata))
    }

    fn save(&self) -> Result<()> {
        self.store.write(CONTAINER_KEY, &self.metadata.to_json()?)
    }
}

fn dataset_prefix(group: &str, name: &str) -> Result<String> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(PixelsError::InvalidConfiguration(format!(
            "invalid dataset name: {:?}",
            name
        )));
    }
    let group = group.trim_matches('/');
    if group.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{}/{}", group, name))
    }
}

/// A chunked dataset inside a container
pub struct Dataset {
    store: Arc<dyn ContainerStore>,
    prefix: String,
    metadata: DatasetMetadata,
    compressor: Box<dyn Compressor>,
}

impl Dataset {
    fn new(store: Arc<dyn ContainerStore>, prefix: String, metadata: DatasetMetadata) -> Self {
        let compressor = get_compressor(metadata.compression);
        Self {
            store,
            prefix,
            metadata,
            compressor,
        }
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.prefix
    }

    /// Read a selection, returned row-major in dataset dimension order
    pub fn read_selected(&self, start: &[u64], count: &[u64]) -> Result<Vec<u8>> {
        let width = self.metadata.dtype.width as usize;
        let selection_shape = self.check_selection(start, count)?;
        let mut out = vec![0u8; selection_shape.iter().product()];

        {
            let mut selection = ArrayViewMut::from_shape(IxDyn(&selection_shape), &mut out[..])?;
            let chunk_shape = self.chunk_shape();
            for coords in self.overlapping_chunks(start, count) {
                let Some(chunk_data) = self.read_chunk(&coords)? else {
                    // unwritten chunks are zeros, already in place
                    continue;
                };
                let chunk = ArrayView::from_shape(IxDyn(&chunk_shape), &chunk_data[..])?;
                let (in_chunk, in_selection) = self.intersection(&coords, start, count);

                let source = chunk.slice_each_axis(|ax| axis_slice(&in_chunk, ax.axis.index()));
                selection
                    .slice_each_axis_mut(|ax| axis_slice(&in_selection, ax.axis.index()))
                    .assign(&source);
            }
        }

        trace!(dataset = %self.prefix, ?start, ?count, width, "read selection");
        Ok(out)
    }

    /// Write a selection given row-major in dataset dimension order
    pub fn write_selected(&self, start: &[u64], count: &[u64], data: &[u8]) -> Result<()> {
        let selection_shape = self.check_selection(start, count)?;
        let expected: usize = selection_shape.iter().product();
        if data.len() != expected {
            return Err(PixelsError::BufferOverflow {
                expected: expected as u64,
                actual: data.len() as u64,
            });
        }

        let selection = ArrayView::from_shape(IxDyn(&selection_shape), data)?;
        let chunk_shape = self.chunk_shape();
        let chunk_len: usize = chunk_shape.iter().product();

        for coords in self.overlapping_chunks(start, count) {
            let (in_chunk, in_selection) = self.intersection(&coords, start, count);
            let covered = in_chunk
                .iter()
                .zip(&self.metadata.chunks)
                .all(|(range, &extent)| (range.end - range.start) as u64 == extent);

            let mut chunk_data = if covered {
                vec![0u8; chunk_len]
            } else {
                self.read_chunk(&coords)?.unwrap_or_else(|| vec![0u8; chunk_len])
            };

            {
                let mut chunk = ArrayViewMut::from_shape(IxDyn(&chunk_shape), &mut chunk_data[..])?;
                let source =
                    selection.slice_each_axis(|ax| axis_slice(&in_selection, ax.axis.index()));
                chunk
                    .slice_each_axis_mut(|ax| axis_slice(&in_chunk, ax.axis.index()))
                    .assign(&source);
            }
            self.write_chunk(&coords, &chunk_data)?;
        }
        Ok(())
    }

    /// Number of chunks stored so far
    pub fn stored_chunks(&self) -> Result<usize> {
        Ok(self.store.list(&format!("{}/chunks", self.prefix))?.len())
    }

    fn chunk_path(&self, coords: &[u64]) -> String {
        format!("{}/{}", self.prefix, chunk_key(coords))
    }

    fn read_chunk(&self, coords: &[u64]) -> Result<Option<Vec<u8>>> {
        let Some(encoded) = self.store.read_optional(&self.chunk_path(coords))? else {
            return Ok(None);
        };
        let expected = self.metadata.chunk_bytes() as usize;
        self.compressor.decompress(&encoded, Some(expected)).map(Some)
    }

    fn write_chunk(&self, coords: &[u64], data: &[u8]) -> Result<()> {
        let encoded = self
            .compressor
            .compress(data, self.metadata.compression_level)?;
        trace!(
            chunk = %chunk_key(coords),
            raw = data.len(),
            stored = encoded.len(),
            "writing chunk"
        );
        self.store.write(&self.chunk_path(coords), &encoded)
    }

    /// Chunk extents plus a trailing byte axis
    fn chunk_shape(&self) -> Vec<usize> {
        let mut shape: Vec<usize> = self.metadata.chunks.iter().map(|&c| c as usize).collect();
        shape.push(self.metadata.dtype.width as usize);
        shape
    }

    /// Validate a selection and return its shape plus a trailing byte axis
    fn check_selection(&self, start: &[u64], count: &[u64]) -> Result<Vec<usize>> {
        let rank = self.metadata.rank();
        if start.len() != rank || count.len() != rank {
            return Err(PixelsError::InvalidConfiguration(format!(
                "selection of rank {} on a dataset of rank {}",
                start.len().max(count.len()),
                rank
            )));
        }
        for (dim, ((&s, &c), &extent)) in start.iter().zip(count).zip(&self.metadata.shape).enumerate() {
            if c == 0 || s.checked_add(c).map_or(true, |end| end > extent) {
                return Err(PixelsError::OutOfBounds(format!(
                    "selection {}+{} exceeds extent {} of dimension {}",
                    s, c, extent, dim
                )));
            }
        }

        let mut shape: Vec<usize> = count.iter().map(|&c| c as usize).collect();
        shape.push(self.metadata.dtype.width as usize);
        Ok(shape)
    }

    /// Coordinates of every chunk a selection touches, last dimension fastest
    fn overlapping_chunks(&self, start: &[u64], count: &[u64]) -> Vec<Vec<u64>> {
        let chunks = &self.metadata.chunks;
        let min_chunk: Vec<u64> = start.iter().zip(chunks).map(|(&s, &c)| s / c).collect();
        let max_chunk: Vec<u64> = start
            .iter()
            .zip(count)
            .zip(chunks)
            .map(|((&s, &n), &c)| (s + n - 1) / c)
            .collect();

        let mut result = Vec::new();
        let mut coords = min_chunk.clone();
        loop {
            result.push(coords.clone());

            let mut dim = coords.len();
            loop {
                if dim == 0 {
                    return result;
                }
                dim -= 1;
                coords[dim] += 1;
                if coords[dim] <= max_chunk[dim] {
                    break;
                }
                coords[dim] = min_chunk[dim];
            }
        }
    }

    /// Ranges of one chunk's overlap with a selection, in chunk and in
    /// selection coordinates
    fn intersection(
        &self,
        coords: &[u64],
        start: &[u64],
        count: &[u64],
    ) -> (Vec<std::ops::Range<usize>>, Vec<std::ops::Range<usize>>) {
        let mut in_chunk = Vec::with_capacity(coords.len());
        let mut in_selection = Vec::with_capacity(coords.len());
        for dim in 0..coords.len() {
            let extent = self.metadata.chunks[dim];
            let origin = coords[dim] * extent;
            let lo = start[dim].max(origin);
            let hi = (start[dim] + count[dim]).min(origin + extent);
            in_chunk.push((lo - origin) as usize..(hi - origin) as usize);
            in_selection.push((lo - start[dim]) as usize..(hi - start[dim]) as usize);
        }
        (in_chunk, in_selection)
    }
}

/// Slice for one array axis; the trailing byte axis is taken whole
fn axis_slice(ranges: &[std::ops::Range<usize>], axis: usize) -> Slice {
    match ranges.get(axis) {
        Some(range) => Slice::from(range.clone()),
        None => Slice::from(..),
    }
}
