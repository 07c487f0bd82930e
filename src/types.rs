//! Core data types for pixel buffers

use crate::error::{PixelsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel numeric types supported by the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PixelType {
    /// Signed 8-bit integer
    Int8 = 0,
    /// Unsigned 8-bit integer
    UInt8 = 1,
    /// Signed 16-bit integer
    Int16 = 2,
    /// Unsigned 16-bit integer
    UInt16 = 3,
    /// Signed 32-bit integer
    Int32 = 4,
    /// Unsigned 32-bit integer
    UInt32 = 5,
    /// 32-bit floating point
    Float32 = 6,
    /// 64-bit floating point
    Float64 = 7,
    /// Pair of 32-bit floats (real, imaginary)
    Complex64 = 8,
    /// Pair of 64-bit floats (real, imaginary)
    Complex128 = 9,
}

impl PixelType {
    /// Size in bytes of one pixel of this type
    pub fn byte_width(&self) -> u8 {
        match self {
            PixelType::Int8 | PixelType::UInt8 => 1,
            PixelType::Int16 | PixelType::UInt16 => 2,
            PixelType::Int32 | PixelType::UInt32 | PixelType::Float32 => 4,
            PixelType::Float64 | PixelType::Complex64 => 8,
            PixelType::Complex128 => 16,
        }
    }

    /// Bits per pixel
    pub fn bit_depth(&self) -> u32 {
        self.byte_width() as u32 * 8
    }

    /// Check if this is a signed type. Floating point types are signed.
    pub fn is_signed(&self) -> bool {
        !matches!(
            self,
            PixelType::UInt8 | PixelType::UInt16 | PixelType::UInt32
        )
    }

    /// Check if this is a floating point type (complex included)
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            PixelType::Float32 | PixelType::Float64 | PixelType::Complex64 | PixelType::Complex128
        )
    }

    /// Check if this is a complex type
    pub fn is_complex(&self) -> bool {
        matches!(self, PixelType::Complex64 | PixelType::Complex128)
    }

    /// Width of one scalar component (half the pixel for complex types)
    pub fn component_width(&self) -> usize {
        if self.is_complex() {
            self.byte_width() as usize / 2
        } else {
            self.byte_width() as usize
        }
    }

    /// Name used by pixel repositories for this type
    pub fn storage_name(&self) -> &'static str {
        match self {
            PixelType::Int8 => "int8",
            PixelType::UInt8 => "uint8",
            PixelType::Int16 => "int16",
            PixelType::UInt16 => "uint16",
            PixelType::Int32 => "int32",
            PixelType::UInt32 => "uint32",
            PixelType::Float32 => "float",
            PixelType::Float64 => "double",
            PixelType::Complex64 => "complex",
            PixelType::Complex128 => "double-complex",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_name())
    }
}

impl FromStr for PixelType {
    type Err = PixelsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int8" => Ok(PixelType::Int8),
            "uint8" => Ok(PixelType::UInt8),
            "int16" => Ok(PixelType::Int16),
            "uint16" => Ok(PixelType::UInt16),
            "int32" => Ok(PixelType::Int32),
            "uint32" => Ok(PixelType::UInt32),
            "float" | "float32" => Ok(PixelType::Float32),
            "double" | "float64" => Ok(PixelType::Float64),
            "complex" | "complex64" => Ok(PixelType::Complex64),
            "double-complex" | "complex128" => Ok(PixelType::Complex128),
            other => Err(PixelsError::InvalidConfiguration(format!(
                "Unknown pixel type: {}",
                other
            ))),
        }
    }
}

/// Multi-byte word layout of stored pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Most significant byte first; the storage order of row-major pixel files
    #[default]
    BigEndian,
    /// Least significant byte first
    LittleEndian,
}

impl ByteOrder {
    /// Byte order of the running platform
    pub fn platform() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }
}

/// The five logical axes of a pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
    C = 3,
    T = 4,
}

impl Axis {
    /// All axes, fastest varying first
    pub const ALL: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::C, Axis::T];

    /// Convert from usize index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Convert to usize index
    pub fn to_index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Immutable description of a 5D pixel array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub pixel_type: PixelType,
}

impl ImageGeometry {
    /// Create a new geometry; every axis must hold at least one sample
    pub fn new(
        size_x: u32,
        size_y: u32,
        size_z: u32,
        size_c: u32,
        size_t: u32,
        pixel_type: PixelType,
    ) -> Result<Self> {
        let geometry = Self {
            size_x,
            size_y,
            size_z,
            size_c,
            size_t,
            pixel_type,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Reject empty axes; needed for geometries built from literals or
    /// deserialized without going through [`ImageGeometry::new`]
    pub fn validate(&self) -> Result<()> {
        for axis in Axis::ALL {
            if self.size(axis) == 0 {
                return Err(PixelsError::InvalidConfiguration(format!(
                    "size{} must be at least 1",
                    axis
                )));
            }
        }
        Ok(())
    }

    /// Size along one axis
    pub fn size(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.size_x,
            Axis::Y => self.size_y,
            Axis::Z => self.size_z,
            Axis::C => self.size_c,
            Axis::T => self.size_t,
        }
    }

    /// Sizes of all axes in X, Y, Z, C, T order
    pub fn sizes(&self) -> [u32; 5] {
        [self.size_x, self.size_y, self.size_z, self.size_c, self.size_t]
    }

    pub fn byte_width(&self) -> u8 {
        self.pixel_type.byte_width()
    }

    /// Number of planes (Z * C * T)
    pub fn plane_count(&self) -> u64 {
        self.size_z as u64 * self.size_c as u64 * self.size_t as u64
    }
}

impl fmt::Display for ImageGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}x{}x{} {}",
            self.size_x, self.size_y, self.size_z, self.size_c, self.size_t, self.pixel_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_type_widths() {
        assert_eq!(PixelType::Int8.byte_width(), 1);
        assert_eq!(PixelType::UInt16.byte_width(), 2);
        assert_eq!(PixelType::Float32.byte_width(), 4);
        assert_eq!(PixelType::Float64.byte_width(), 8);
        assert_eq!(PixelType::Complex64.byte_width(), 8);
        assert_eq!(PixelType::Complex128.byte_width(), 16);
        assert_eq!(PixelType::Complex128.component_width(), 8);
    }

    #[test]
    fn test_pixel_type_names() {
        assert_eq!("uint16".parse::<PixelType>().unwrap(), PixelType::UInt16);
        assert_eq!("double-complex".parse::<PixelType>().unwrap(), PixelType::Complex128);
        assert_eq!("FLOAT".parse::<PixelType>().unwrap(), PixelType::Float32);
        assert!(matches!(
            "bit".parse::<PixelType>(),
            Err(PixelsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_signedness() {
        assert!(PixelType::Int16.is_signed());
        assert!(!PixelType::UInt32.is_signed());
        assert!(PixelType::Float32.is_signed());
        assert!(PixelType::Complex64.is_float());
        assert!(!PixelType::Int32.is_float());
    }

    #[test]
    fn test_axis_conversion() {
        assert_eq!(Axis::from_index(0), Some(Axis::X));
        assert_eq!(Axis::from_index(4), Some(Axis::T));
        assert_eq!(Axis::from_index(5), None);
        assert_eq!(Axis::C.to_index(), 3);
    }

    #[test]
    fn test_geometry_rejects_empty_axis() {
        assert!(ImageGeometry::new(10, 10, 0, 1, 1, PixelType::UInt8).is_err());
        let geometry = ImageGeometry::new(10, 20, 3, 2, 4, PixelType::Int16).unwrap();
        assert_eq!(geometry.sizes(), [10, 20, 3, 2, 4]);
        assert_eq!(geometry.plane_count(), 24);
        assert_eq!(geometry.to_string(), "10x20x3x2x4 int16");
    }
}
