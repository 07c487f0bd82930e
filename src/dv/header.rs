//! DeltaVision file header
//!
//! The header is a fixed 1024-byte block followed by an optional extended
//! header and then the image planes. Its byte order is discovered from the
//! magic number; every other field uses the same order.

use crate::error::{PixelsError, Result};
use crate::types::{ByteOrder, ImageGeometry, PixelType};
use byteorder::{BigEndian, LittleEndian};

/// Size of the fixed header block
pub const HEADER_SIZE: usize = 1024;

/// Magic number (0xC0A0) stored at [`offsets::MAGIC`]
pub const DV_MAGIC: i16 = -16224;

/// Header field byte offsets
mod offsets {
    pub const SIZE_X: usize = 0;
    pub const SIZE_Y: usize = 4;
    pub const IMAGE_COUNT: usize = 8;
    pub const PIXEL_MODE: usize = 12;
    pub const PIXEL_SIZE_X: usize = 40;
    pub const PIXEL_SIZE_Y: usize = 44;
    pub const PIXEL_SIZE_Z: usize = 48;
    pub const EXTENDED_SIZE: usize = 92;
    pub const MAGIC: usize = 96;
    pub const SIZE_T: usize = 180;
    pub const SEQUENCE: usize = 182;
    pub const SIZE_C: usize = 196;
}

/// Pixel type stored under a DeltaVision pixel mode
pub fn pixel_type_for_mode(mode: i32) -> Result<PixelType> {
    match mode {
        0 => Ok(PixelType::Int8),
        1 => Ok(PixelType::Int16),
        2 => Ok(PixelType::Float32),
        4 => Ok(PixelType::Complex64),
        6 => Ok(PixelType::UInt16),
        7 => Ok(PixelType::Int32),
        3 => Err(PixelsError::InvalidConfiguration(
            "pixel mode 3 (complex int16) is not supported".to_string(),
        )),
        other => Err(PixelsError::InvalidConfiguration(format!(
            "unknown pixel mode {}",
            other
        ))),
    }
}

/// DeltaVision pixel mode of a pixel type, if the format can hold it
pub fn mode_for_pixel_type(pixel_type: PixelType) -> Option<i32> {
    match pixel_type {
        PixelType::Int8 => Some(0),
        PixelType::Int16 => Some(1),
        PixelType::Float32 => Some(2),
        PixelType::Complex64 => Some(4),
        PixelType::UInt16 => Some(6),
        PixelType::Int32 => Some(7),
        _ => None,
    }
}

/// True if `bytes` start with a DeltaVision header in either byte order
pub fn has_magic(bytes: &[u8]) -> bool {
    detect_byte_order(bytes).is_some()
}

fn detect_byte_order(bytes: &[u8]) -> Option<ByteOrder> {
    let magic = bytes.get(offsets::MAGIC..offsets::MAGIC + 2)?;
    if <BigEndian as byteorder::ByteOrder>::read_i16(magic) == DV_MAGIC {
        Some(ByteOrder::BigEndian)
    } else if <LittleEndian as byteorder::ByteOrder>::read_i16(magic) == DV_MAGIC {
        Some(ByteOrder::LittleEndian)
    } else {
        None
    }
}

/// Order in which planes are stacked in the file.
///
/// Letters list the axes fastest first; `W` is the channel (wavelength).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSequence {
    Ztw,
    Wzt,
    Zwt,
}

impl PlaneSequence {
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            0 => Ok(PlaneSequence::Ztw),
            1 => Ok(PlaneSequence::Wzt),
            2 => Ok(PlaneSequence::Zwt),
            other => Err(PixelsError::InvalidConfiguration(format!(
                "unknown image sequence {}",
                other
            ))),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            PlaneSequence::Ztw => 0,
            PlaneSequence::Wzt => 1,
            PlaneSequence::Zwt => 2,
        }
    }

    /// Index of plane (z, c, t) in the file
    pub fn plane_number(&self, z: u64, c: u64, t: u64, size_z: u64, size_c: u64, size_t: u64) -> u64 {
        match self {
            PlaneSequence::Ztw => z + t * size_z + c * size_z * size_t,
            PlaneSequence::Wzt => c + z * size_c + t * size_c * size_z,
            PlaneSequence::Zwt => z + c * size_z + t * size_z * size_c,
        }
    }
}

/// Parsed, immutable DeltaVision header
#[derive(Debug, Clone, PartialEq)]
pub struct DvHeader {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub pixel_type: PixelType,
    /// Physical pixel size along x, y and z
    pub pixel_size: [f32; 3],
    pub extended_header_size: u32,
    pub sequence: PlaneSequence,
    /// Byte order of the header and the pixels
    pub byte_order: ByteOrder,
}

impl DvHeader {
    /// Describe a new file holding `geometry`
    pub fn new(geometry: ImageGeometry, sequence: PlaneSequence, byte_order: ByteOrder) -> Result<Self> {
        if mode_for_pixel_type(geometry.pixel_type).is_none() {
            return Err(PixelsError::InvalidConfiguration(format!(
                "{} pixels cannot be stored in a DeltaVision file",
                geometry.pixel_type
            )));
        }
        Ok(Self {
            size_x: geometry.size_x,
            size_y: geometry.size_y,
            size_z: geometry.size_z,
            size_c: geometry.size_c,
            size_t: geometry.size_t,
            pixel_type: geometry.pixel_type,
            pixel_size: [1.0; 3],
            extended_header_size: 0,
            sequence,
            byte_order,
        })
    }

    pub fn with_extended_header_size(mut self, size: u32) -> Self {
        self.extended_header_size = size;
        self
    }

    pub fn with_pixel_size(mut self, pixel_size: [f32; 3]) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    /// Parse the fixed header block
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(PixelsError::InvalidFormat(format!(
                "DeltaVision header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        match detect_byte_order(bytes) {
            Some(ByteOrder::BigEndian) => Self::parse_with::<BigEndian>(bytes, ByteOrder::BigEndian),
            Some(ByteOrder::LittleEndian) => {
                Self::parse_with::<LittleEndian>(bytes, ByteOrder::LittleEndian)
            }
            None => Err(PixelsError::InvalidFormat(
                "missing DeltaVision magic number".to_string(),
            )),
        }
    }

    fn parse_with<E: byteorder::ByteOrder>(bytes: &[u8], byte_order: ByteOrder) -> Result<Self> {
        let read_i32 = |offset: usize| E::read_i32(&bytes[offset..offset + 4]);
        let read_i16 = |offset: usize| E::read_i16(&bytes[offset..offset + 2]);
        let read_f32 = |offset: usize| E::read_f32(&bytes[offset..offset + 4]);

        let positive = |name: &str, value: i64| -> Result<u32> {
            if value < 1 || value > u32::MAX as i64 {
                return Err(PixelsError::InvalidFormat(format!(
                    "invalid {} in DeltaVision header: {}",
                    name, value
                )));
            }
            Ok(value as u32)
        };

        let size_x = positive("sizeX", read_i32(offsets::SIZE_X) as i64)?;
        let size_y = positive("sizeY", read_i32(offsets::SIZE_Y) as i64)?;
        let image_count = positive("image count", read_i32(offsets::IMAGE_COUNT) as i64)?;
        let size_c = positive("sizeC", read_i16(offsets::SIZE_C) as i64)?;
        let size_t = positive("sizeT", read_i16(offsets::SIZE_T) as i64)?;

        let per_section = size_c * size_t;
        if image_count % per_section != 0 {
            return Err(PixelsError::InvalidFormat(format!(
                "{} images cannot be split into {} channels and {} timepoints",
                image_count, size_c, size_t
            )));
        }

        let extended = read_i32(offsets::EXTENDED_SIZE);
        if extended < 0 {
            return Err(PixelsError::InvalidFormat(format!(
                "negative extended header size {}",
                extended
            )));
        }

        Ok(Self {
            size_x,
            size_y,
            size_z: image_count / per_section,
            size_c,
            size_t,
            pixel_type: pixel_type_for_mode(read_i32(offsets::PIXEL_MODE))?,
            pixel_size: [
                read_f32(offsets::PIXEL_SIZE_X),
                read_f32(offsets::PIXEL_SIZE_Y),
                read_f32(offsets::PIXEL_SIZE_Z),
            ],
            extended_header_size: extended as u32,
            sequence: PlaneSequence::from_code(read_i16(offsets::SEQUENCE))?,
            byte_order,
        })
    }

    /// Encode the fixed header block in the header's byte order
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self.byte_order {
            ByteOrder::BigEndian => self.encode::<BigEndian>(),
            ByteOrder::LittleEndian => self.encode::<LittleEndian>(),
        }
    }

    fn encode<E: byteorder::ByteOrder>(&self) -> Result<Vec<u8>> {
        let mode = mode_for_pixel_type(self.pixel_type).ok_or_else(|| {
            PixelsError::InvalidConfiguration(format!(
                "{} pixels cannot be stored in a DeltaVision file",
                self.pixel_type
            ))
        })?;
        let narrow = |name: &str, value: u32| -> Result<i16> {
            i16::try_from(value).map_err(|_| {
                PixelsError::InvalidConfiguration(format!("{} {} does not fit the header", name, value))
            })
        };
        let wide = |name: &str, value: u64| -> Result<i32> {
            i32::try_from(value).map_err(|_| {
                PixelsError::InvalidConfiguration(format!("{} {} does not fit the header", name, value))
            })
        };

        let image_count = self.size_z as u64 * self.size_c as u64 * self.size_t as u64;
        let mut bytes = vec![0u8; HEADER_SIZE];
        E::write_i32(&mut bytes[offsets::SIZE_X..], wide("sizeX", self.size_x as u64)?);
        E::write_i32(&mut bytes[offsets::SIZE_Y..], wide("sizeY", self.size_y as u64)?);
        E::write_i32(&mut bytes[offsets::IMAGE_COUNT..], wide("image count", image_count)?);
        E::write_i32(&mut bytes[offsets::PIXEL_MODE..], mode);
        E::write_f32(&mut bytes[offsets::PIXEL_SIZE_X..], self.pixel_size[0]);
        E::write_f32(&mut bytes[offsets::PIXEL_SIZE_Y..], self.pixel_size[1]);
        E::write_f32(&mut bytes[offsets::PIXEL_SIZE_Z..], self.pixel_size[2]);
        E::write_i32(
            &mut bytes[offsets::EXTENDED_SIZE..],
            wide("extended header size", self.extended_header_size as u64)?,
        );
        E::write_i16(&mut bytes[offsets::MAGIC..], DV_MAGIC);
        E::write_i16(&mut bytes[offsets::SIZE_T..], narrow("sizeT", self.size_t)?);
        E::write_i16(&mut bytes[offsets::SEQUENCE..], self.sequence.code());
        E::write_i16(&mut bytes[offsets::SIZE_C..], narrow("sizeC", self.size_c)?);
        Ok(bytes)
    }

    pub fn geometry(&self) -> Result<ImageGeometry> {
        ImageGeometry::new(
            self.size_x,
            self.size_y,
            self.size_z,
            self.size_c,
            self.size_t,
            self.pixel_type,
        )
    }

    /// Pixels are stored in big-endian order
    pub fn is_native(&self) -> bool {
        self.byte_order == ByteOrder::BigEndian
    }

    /// Byte offset of the first plane
    pub fn first_plane_offset(&self) -> u64 {
        self.extended_header_size as u64 + HEADER_SIZE as u64
    }

    pub fn plane_number(&self, z: u32, c: u32, t: u32) -> u64 {
        self.sequence.plane_number(
            z as u64,
            c as u64,
            t as u64,
            self.size_z as u64,
            self.size_c as u64,
            self.size_t as u64,
        )
    }
}
