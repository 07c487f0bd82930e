//! Typed, byte-order aware views over raw pixel bytes

use crate::error::{PixelsError, Result};
use crate::types::{ByteOrder, PixelType};
use byteorder::{BigEndian, LittleEndian};
use bytes::Bytes;
use num_traits::ToPrimitive;

/// Where the first stored row sits relative to the logical image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    /// Rows are stored top to bottom, matching logical row-major order
    TopLeft,
    /// Rows are stored bottom to top
    BottomLeft { row_size: usize },
}

/// Maps a top-left origin offset inside a block of rows to the offset of the
/// same byte when the rows are stored bottom-left origin.
///
/// `size` must be a multiple of `row_size` and `offset < size`.
pub fn reordered_offset(size: usize, offset: usize, row_size: usize) -> usize {
    let stride = offset / row_size;
    let remainder = row_size - (offset % row_size);
    size - (stride * row_size) - remainder
}

/// Reverse the bytes of every `width` sized word in place
pub fn swap_words(buffer: &mut [u8], width: usize) {
    if width < 2 {
        return;
    }
    for word in buffer.chunks_exact_mut(width) {
        word.reverse();
    }
}

/// Copy a bottom-left origin block of rows into top-left order.
///
/// With `swap_width` set, every word of that width is byte swapped while it
/// is moved.
pub fn reorder_rows(
    source: &[u8],
    destination: &mut [u8],
    row_size: usize,
    swap_width: Option<usize>,
) -> Result<()> {
    let size = source.len();
    if destination.len() != size {
        return Err(PixelsError::SizeMismatch {
            expected: size as u64,
            actual: destination.len() as u64,
        });
    }
    if row_size == 0 || size % row_size != 0 {
        return Err(PixelsError::UnalignedRegion {
            size: size as u64,
            row_size: row_size as u64,
        });
    }

    match swap_width {
        Some(width) if width > 1 => {
            for offset in (0..size).step_by(width) {
                let physical = reordered_offset(size, offset, row_size);
                let word = &mut destination[offset..offset + width];
                word.copy_from_slice(&source[physical..physical + width]);
                word.reverse();
            }
        }
        _ => {
            for offset in (0..size).step_by(row_size) {
                let physical = reordered_offset(size, offset, row_size);
                destination[offset..offset + row_size]
                    .copy_from_slice(&source[physical..physical + row_size]);
            }
        }
    }
    Ok(())
}

/// Copy `count` pixels starting at logical pixel `offset` out of a
/// bottom-left origin plane, looking up every pixel individually.
pub fn reorder_pixels(
    plane: &[u8],
    destination: &mut [u8],
    count: usize,
    offset: usize,
    pixel_width: usize,
    row_size: usize,
    swap: bool,
) {
    let size = plane.len();
    for i in 0..count {
        let physical = reordered_offset(size, (i + offset) * pixel_width, row_size);
        let pixel = &mut destination[i * pixel_width..(i + 1) * pixel_width];
        pixel.copy_from_slice(&plane[physical..physical + pixel_width]);
        if swap {
            pixel.reverse();
        }
    }
}

/// A block of pixels with its numeric type and byte order.
///
/// The view shares its backing bytes; changing the byte order produces a new
/// view instead of mutating the shared one.
#[derive(Debug, Clone)]
pub struct PixelData {
    pixel_type: PixelType,
    data: Bytes,
    order: ByteOrder,
    origin: RowOrigin,
}

impl PixelData {
    /// Create a view in storage byte order with a top-left origin
    pub fn new(pixel_type: PixelType, data: impl Into<Bytes>) -> Self {
        Self {
            pixel_type,
            data: data.into(),
            order: ByteOrder::default(),
            origin: RowOrigin::TopLeft,
        }
    }

    /// Create a view over rows stored bottom-left origin.
    ///
    /// The backing bytes are left untouched; lookups through
    /// [`value_at`](Self::value_at) are remapped instead.
    pub fn reordered(pixel_type: PixelType, data: impl Into<Bytes>, row_size: usize) -> Result<Self> {
        let data = data.into();
        if row_size == 0 || data.len() % row_size != 0 {
            return Err(PixelsError::UnalignedRegion {
                size: data.len() as u64,
                row_size: row_size as u64,
            });
        }
        Ok(Self {
            pixel_type,
            data,
            order: ByteOrder::default(),
            origin: RowOrigin::BottomLeft { row_size },
        })
    }

    /// Same bytes, read with a different byte order
    pub fn with_byte_order(self, order: ByteOrder) -> Self {
        Self { order, ..self }
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn origin(&self) -> RowOrigin {
        self.origin
    }

    /// Raw backing bytes, in stored order
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Cheap clone of the backing bytes
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / self.pixel_type.byte_width() as usize
    }

    /// Numeric value of the pixel starting at byte `offset` (top-left origin).
    ///
    /// Complex pixels yield their real component. No rescaling is applied.
    ///
    /// # Panics
    ///
    /// Panics if the pixel extends past the end of the view.
    pub fn value_at(&self, offset: usize) -> f64 {
        let offset = match self.origin {
            RowOrigin::TopLeft => offset,
            RowOrigin::BottomLeft { row_size } => {
                reordered_offset(self.data.len(), offset, row_size)
            }
        };
        let width = self.pixel_type.byte_width() as usize;
        let bytes = &self.data[offset..offset + width];
        match self.order {
            ByteOrder::BigEndian => decode::<BigEndian>(bytes, self.pixel_type),
            ByteOrder::LittleEndian => decode::<LittleEndian>(bytes, self.pixel_type),
        }
    }

    /// Numeric value of the `index`th pixel
    pub fn pixel_value(&self, index: usize) -> f64 {
        self.value_at(index * self.pixel_type.byte_width() as usize)
    }
}

fn widen<T: ToPrimitive>(value: T) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

fn decode<E: byteorder::ByteOrder>(bytes: &[u8], pixel_type: PixelType) -> f64 {
    match pixel_type {
        PixelType::Int8 => widen(bytes[0] as i8),
        PixelType::UInt8 => widen(bytes[0]),
        PixelType::Int16 => widen(E::read_i16(bytes)),
        PixelType::UInt16 => widen(E::read_u16(bytes)),
        PixelType::Int32 => widen(E::read_i32(bytes)),
        PixelType::UInt32 => widen(E::read_u32(bytes)),
        PixelType::Float32 | PixelType::Complex64 => widen(E::read_f32(&bytes[..4])),
        PixelType::Float64 | PixelType::Complex128 => widen(E::read_f64(&bytes[..8])),
    }
}
