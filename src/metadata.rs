//! Container and dataset metadata documents

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::error::{PixelsError, Result};
use crate::types::PixelType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Key of the container document at the container root
pub const CONTAINER_KEY: &str = "container.json";

/// Name of the dataset document inside a dataset directory
pub const DATASET_FILE: &str = "dataset.json";

/// Container format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Root document of a chunked container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub version: FormatVersion,

    /// Identifier assigned when the container is created
    pub id: Uuid,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,

    /// Group path to the names of the datasets it holds
    pub groups: BTreeMap<String, Vec<String>>,
}

impl ContainerMetadata {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: FormatVersion::default(),
            id: Uuid::new_v4(),
            created_at: now,
            modified_at: now,
            groups: BTreeMap::new(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let metadata: Self =
            serde_json::from_slice(bytes).map_err(|e| PixelsError::Metadata(e.to_string()))?;
        if !FormatVersion::CURRENT.is_compatible(&metadata.version) {
            return Err(PixelsError::InvalidFormat(format!(
                "unsupported container version {}.{}",
                metadata.version.major, metadata.version.minor
            )));
        }
        Ok(metadata)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Record a dataset under a group, returning false if it was already known
    pub fn add_dataset(&mut self, group: &str, name: &str) -> bool {
        let datasets = self.groups.entry(group.to_string()).or_default();
        if datasets.iter().any(|existing| existing == name) {
            return false;
        }
        datasets.push(name.to_string());
        self.touch();
        true
    }

    pub fn has_dataset(&self, group: &str, name: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|datasets| datasets.iter().any(|existing| existing == name))
    }

    /// Update modification timestamp
    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

impl Default for ContainerMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric class of stored elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataClass {
    Integer,
    Float,
    Complex,
}

/// Element type of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
    pub class: DataClass,
    /// Bytes per element
    pub width: u8,
    pub signed: bool,
}

impl DataType {
    pub fn from_pixel_type(pixel_type: PixelType) -> Self {
        let class = if pixel_type.is_complex() {
            DataClass::Complex
        } else if pixel_type.is_float() {
            DataClass::Float
        } else {
            DataClass::Integer
        };
        Self {
            class,
            width: pixel_type.byte_width(),
            signed: pixel_type.is_signed(),
        }
    }
}

/// Document describing one chunked dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Extent of every dimension, slowest first
    pub shape: Vec<u64>,

    /// Chunk extent of every dimension, same order as `shape`
    pub chunks: Vec<u64>,

    pub dtype: DataType,

    pub compression: CompressionMethod,

    #[serde(default)]
    pub compression_level: CompressionLevel,
}

impl DatasetMetadata {
    pub fn new(shape: Vec<u64>, chunks: Vec<u64>, dtype: DataType) -> Result<Self> {
        let metadata = Self {
            shape,
            chunks,
            dtype,
            compression: CompressionMethod::None,
            compression_level: CompressionLevel::default(),
        };
        metadata.check().map_err(PixelsError::InvalidConfiguration)?;
        Ok(metadata)
    }

    /// Rank agreement and non-zero extents, which chunk arithmetic relies on
    fn check(&self) -> std::result::Result<(), String> {
        if self.shape.len() != self.chunks.len() {
            return Err(format!(
                "{} chunk extents for a {}-dimensional dataset",
                self.chunks.len(),
                self.shape.len()
            ));
        }
        if self.shape.iter().chain(self.chunks.iter()).any(|&extent| extent == 0) {
            return Err("dataset and chunk extents must be non-zero".to_string());
        }
        if self.dtype.width == 0 {
            return Err("element width must be non-zero".to_string());
        }
        Ok(())
    }

    pub fn with_compression(mut self, method: CompressionMethod, level: CompressionLevel) -> Self {
        self.compression = method;
        self.compression_level = level;
        self
    }

    /// Parse a stored document; an inconsistent one is `InvalidFormat`
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let metadata: Self =
            serde_json::from_slice(bytes).map_err(|e| PixelsError::Metadata(e.to_string()))?;
        metadata
            .check()
            .map_err(|message| PixelsError::InvalidFormat(format!("dataset document: {}", message)))?;
        Ok(metadata)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of chunks along every dimension
    pub fn grid(&self) -> Vec<u64> {
        self.shape
            .iter()
            .zip(&self.chunks)
            .map(|(&extent, &chunk)| extent.div_ceil(chunk))
            .collect()
    }

    pub fn chunk_count(&self) -> u64 {
        self.grid().iter().product()
    }

    /// Bytes of one decoded chunk, edge chunks included
    pub fn chunk_bytes(&self) -> u64 {
        self.chunks.iter().product::<u64>() * self.dtype.width as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatibility() {
        let v1_0 = FormatVersion::new(1, 0);
        let v1_1 = FormatVersion::new(1, 1);
        let v2_0 = FormatVersion::new(2, 0);

        assert!(v1_0.is_compatible(&v1_1));
        assert!(!v1_0.is_compatible(&v2_0));
    }

    #[test]
    fn test_container_metadata_json() {
        let mut metadata = ContainerMetadata::new();
        assert!(metadata.add_dataset("/", "pixels"));
        assert!(!metadata.add_dataset("/", "pixels"));
        assert!(metadata.modified_at >= metadata.created_at);

        let parsed = ContainerMetadata::from_json(&metadata.to_json().unwrap()).unwrap();
        assert_eq!(parsed.id, metadata.id);
        assert!(parsed.has_dataset("/", "pixels"));
        assert!(!parsed.has_dataset("/", "labels"));
    }

    #[test]
    fn test_incompatible_container_is_rejected() {
        let mut metadata = ContainerMetadata::new();
        metadata.version = FormatVersion::new(2, 0);
        let json = metadata.to_json().unwrap();
        assert!(matches!(
            ContainerMetadata::from_json(&json),
            Err(PixelsError::InvalidFormat(_))
        ));
        assert!(matches!(
            ContainerMetadata::from_json(b"{"),
            Err(PixelsError::Metadata(_))
        ));
    }

    #[test]
    fn test_dtype_from_pixel_type() {
        let dtype = DataType::from_pixel_type(PixelType::Int16);
        assert_eq!(dtype.class, DataClass::Integer);
        assert_eq!(dtype.width, 2);
        assert!(dtype.signed);

        assert_eq!(
            DataType::from_pixel_type(PixelType::Float64).class,
            DataClass::Float
        );
        assert_eq!(
            DataType::from_pixel_type(PixelType::Complex64).class,
            DataClass::Complex
        );
        assert!(!DataType::from_pixel_type(PixelType::UInt8).signed);
    }

    #[test]
    fn test_dataset_grid() {
        let dtype = DataType::from_pixel_type(PixelType::UInt16);
        let dataset = DatasetMetadata::new(vec![4, 2, 3, 10, 10], vec![2, 1, 1, 5, 5], dtype).unwrap();
        assert_eq!(dataset.grid(), vec![2, 2, 3, 2, 2]);
        assert_eq!(dataset.chunk_count(), 48);
        assert_eq!(dataset.chunk_bytes(), 2 * 25 * 2);

        let edge = DatasetMetadata::new(vec![7], vec![3], dtype).unwrap();
        assert_eq!(edge.grid(), vec![3]);

        assert!(DatasetMetadata::new(vec![4, 4], vec![2], dtype).is_err());
        assert!(DatasetMetadata::new(vec![4, 0], vec![2, 2], dtype).is_err());
    }

    #[test]
    fn test_inconsistent_dataset_document_is_rejected() {
        let dtype = DataType::from_pixel_type(PixelType::UInt8);
        let stored = DatasetMetadata::new(vec![1, 1, 1, 4, 4], vec![1, 1, 1, 4, 4], dtype).unwrap();
        assert_eq!(DatasetMetadata::from_json(&stored.to_json().unwrap()).unwrap(), stored);

        let mut zero_chunks = stored.clone();
        zero_chunks.chunks = vec![0; 5];
        let mut short_chunks = stored.clone();
        short_chunks.chunks = vec![4, 4];
        let mut no_width = stored;
        no_width.dtype.width = 0;
        for document in [zero_chunks, short_chunks, no_width] {
            let json = serde_json::to_vec(&document).unwrap();
            assert!(matches!(
                DatasetMetadata::from_json(&json),
                Err(PixelsError::InvalidFormat(_))
            ));
        }
    }
}
