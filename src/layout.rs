//! Pixel layout - byte sizes and offsets of rows, planes, stacks and timepoints
//!
//! Pixels are stored row-major with T slowest varying, then C, Z, Y and X
//! fastest. All arithmetic is done in `u64` so buffers well beyond 4 GiB are
//! addressed exactly even though per-axis sizes are `u32`.

use crate::error::{PixelsError, Result};
use crate::types::{Axis, ImageGeometry};
use serde::{Deserialize, Serialize};

/// A logical coordinate whose components may be left unbounded.
///
/// An absent component selects the start of the enclosing block, so a
/// coordinate without `y` addresses a plane, without `y` and `z` a stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coordinate {
    pub y: Option<u32>,
    pub z: Option<u32>,
    pub c: Option<u32>,
    pub t: Option<u32>,
}

impl Coordinate {
    pub fn row(y: u32, z: u32, c: u32, t: u32) -> Self {
        Self {
            y: Some(y),
            z: Some(z),
            c: Some(c),
            t: Some(t),
        }
    }

    pub fn plane(z: u32, c: u32, t: u32) -> Self {
        Self {
            z: Some(z),
            c: Some(c),
            t: Some(t),
            ..Default::default()
        }
    }

    pub fn stack(c: u32, t: u32) -> Self {
        Self {
            c: Some(c),
            t: Some(t),
            ..Default::default()
        }
    }

    pub fn timepoint(t: u32) -> Self {
        Self {
            t: Some(t),
            ..Default::default()
        }
    }
}

/// Start and length of a selection along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub start: u32,
    pub size: u32,
}

impl Extent {
    pub fn new(start: u32, size: u32) -> Self {
        Self { start, size }
    }

    /// Exclusive end, widened so it never overflows
    pub fn end(&self) -> u64 {
        self.start as u64 + self.size as u64
    }
}

/// An axis-aligned sub-volume spanning all five axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypercube {
    extents: [Extent; 5],
}

impl Hypercube {
    /// Create a hypercube from `(start, size)` pairs in X, Y, Z, C, T order
    pub fn new(
        x: (u32, u32),
        y: (u32, u32),
        z: (u32, u32),
        c: (u32, u32),
        t: (u32, u32),
    ) -> Self {
        Self {
            extents: [
                Extent::new(x.0, x.1),
                Extent::new(y.0, y.1),
                Extent::new(z.0, z.1),
                Extent::new(c.0, c.1),
                Extent::new(t.0, t.1),
            ],
        }
    }

    /// The whole buffer
    pub fn whole(geometry: &ImageGeometry) -> Self {
        Self::new(
            (0, geometry.size_x),
            (0, geometry.size_y),
            (0, geometry.size_z),
            (0, geometry.size_c),
            (0, geometry.size_t),
        )
    }

    pub fn row(geometry: &ImageGeometry, y: u32, z: u32, c: u32, t: u32) -> Self {
        Self::new((0, geometry.size_x), (y, 1), (z, 1), (c, 1), (t, 1))
    }

    pub fn plane(geometry: &ImageGeometry, z: u32, c: u32, t: u32) -> Self {
        Self::new(
            (0, geometry.size_x),
            (0, geometry.size_y),
            (z, 1),
            (c, 1),
            (t, 1),
        )
    }

    pub fn stack(geometry: &ImageGeometry, c: u32, t: u32) -> Self {
        Self::new(
            (0, geometry.size_x),
            (0, geometry.size_y),
            (0, geometry.size_z),
            (c, 1),
            (t, 1),
        )
    }

    pub fn timepoint(geometry: &ImageGeometry, t: u32) -> Self {
        Self::new(
            (0, geometry.size_x),
            (0, geometry.size_y),
            (0, geometry.size_z),
            (0, geometry.size_c),
            (t, 1),
        )
    }

    pub fn extent(&self, axis: Axis) -> Extent {
        self.extents[axis.to_index()]
    }

    pub fn starts(&self) -> [u32; 5] {
        self.extents.map(|e| e.start)
    }

    pub fn sizes(&self) -> [u32; 5] {
        self.extents.map(|e| e.size)
    }

    /// Number of pixels selected, saturating at `u64::MAX`
    pub fn pixel_count(&self) -> u64 {
        self.extents
            .iter()
            .fold(1u64, |count, e| count.saturating_mul(e.size as u64))
    }
}

/// Derived byte sizes of a pixel buffer, computed once from its geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    geometry: ImageGeometry,
    row_size: u64,
    plane_size: u64,
    stack_size: u64,
    timepoint_size: u64,
    total_size: u64,
}

impl PixelLayout {
    /// Compute the layout; fails on an empty axis or if the total size does
    /// not fit in 64 bits
    pub fn new(geometry: ImageGeometry) -> Result<Self> {
        geometry.validate()?;
        let overflow = || {
            PixelsError::InvalidConfiguration(format!(
                "Buffer of {} exceeds the addressable size",
                geometry
            ))
        };

        let row_size = geometry.size_x as u64 * geometry.byte_width() as u64;
        let plane_size = row_size
            .checked_mul(geometry.size_y as u64)
            .ok_or_else(overflow)?;
        let stack_size = plane_size
            .checked_mul(geometry.size_z as u64)
            .ok_or_else(overflow)?;
        let timepoint_size = stack_size
            .checked_mul(geometry.size_c as u64)
            .ok_or_else(overflow)?;
        let total_size = timepoint_size
            .checked_mul(geometry.size_t as u64)
            .ok_or_else(overflow)?;

        Ok(Self {
            geometry,
            row_size,
            plane_size,
            stack_size,
            timepoint_size,
            total_size,
        })
    }

    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    pub fn row_size(&self) -> u64 {
        self.row_size
    }

    pub fn plane_size(&self) -> u64 {
        self.plane_size
    }

    pub fn stack_size(&self) -> u64 {
        self.stack_size
    }

    pub fn timepoint_size(&self) -> u64 {
        self.timepoint_size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes occupied by a hypercube of the given extent. Saturates for
    /// cubes that fail [`PixelLayout::check_hypercube`].
    pub fn hypercube_size(&self, cube: &Hypercube) -> u64 {
        cube.pixel_count()
            .saturating_mul(self.geometry.byte_width() as u64)
    }

    /// Byte start and length of `count` pixels at pixel `offset` in a plane
    pub fn plane_region(&self, count: usize, offset: usize) -> Result<(usize, usize)> {
        let width = self.geometry.byte_width() as usize;
        let region = offset.checked_mul(width).and_then(|start| {
            let length = count.checked_mul(width)?;
            let end = start.checked_add(length)?;
            (end as u64 <= self.plane_size).then_some((start, length))
        });
        region.ok_or_else(|| {
            PixelsError::OutOfBounds(format!(
                "{} pixels at pixel offset {} exceed the plane",
                count, offset
            ))
        })
    }

    /// Validate the supplied indices; an absent index is always valid
    pub fn check_bounds(
        &self,
        y: Option<u32>,
        z: Option<u32>,
        c: Option<u32>,
        t: Option<u32>,
    ) -> Result<()> {
        let checks = [(Axis::Y, y), (Axis::Z, z), (Axis::C, c), (Axis::T, t)];
        for (axis, index) in checks {
            if let Some(index) = index {
                let size = self.geometry.size(axis);
                if index >= size {
                    return Err(PixelsError::OutOfBounds(format!(
                        "{} '{}' greater than size{} '{}'",
                        axis, index, axis, size
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate a hypercube against every axis of the geometry
    pub fn check_hypercube(&self, cube: &Hypercube) -> Result<()> {
        for axis in Axis::ALL {
            let extent = cube.extent(axis);
            let size = self.geometry.size(axis);
            if extent.size < 1 || extent.end() > size as u64 {
                return Err(PixelsError::OutOfBounds(format!(
                    "Incorrect hypercube bounds on {}: start {} size {} exceeds size{} '{}'",
                    axis, extent.start, extent.size, axis, size
                )));
            }
        }
        Ok(())
    }

    /// Offset of the block addressed by a possibly partial coordinate
    pub fn offset(&self, coord: &Coordinate) -> Result<u64> {
        self.check_bounds(coord.y, coord.z, coord.c, coord.t)?;
        let y = coord.y.unwrap_or(0) as u64;
        let z = coord.z.unwrap_or(0) as u64;
        let c = coord.c.unwrap_or(0) as u64;
        let t = coord.t.unwrap_or(0) as u64;

        Ok(y * self.row_size
            + t * self.timepoint_size
            + c * self.stack_size
            + z * self.plane_size)
    }

    pub fn row_offset(&self, y: u32, z: u32, c: u32, t: u32) -> Result<u64> {
        self.offset(&Coordinate::row(y, z, c, t))
    }

    pub fn plane_offset(&self, z: u32, c: u32, t: u32) -> Result<u64> {
        self.offset(&Coordinate::plane(z, c, t))
    }

    pub fn stack_offset(&self, c: u32, t: u32) -> Result<u64> {
        self.offset(&Coordinate::stack(c, t))
    }

    pub fn timepoint_offset(&self, t: u32) -> Result<u64> {
        self.offset(&Coordinate::timepoint(t))
    }

    /// Get a summary string of the layout
    pub fn summary(&self) -> String {
        format!(
            "{} ({} per plane, {} total)",
            self.geometry,
            crate::utils::format_bytes(self.plane_size),
            crate::utils::format_bytes(self.total_size)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelType;

    fn create_test_layout() -> PixelLayout {
        let geometry = ImageGeometry::new(10, 10, 3, 2, 4, PixelType::UInt16).unwrap();
        PixelLayout::new(geometry).unwrap()
    }

    #[test]
    fn test_derived_sizes() {
        let layout = create_test_layout();
        assert_eq!(layout.row_size(), 20);
        assert_eq!(layout.plane_size(), 200);
        assert_eq!(layout.stack_size(), 600);
        assert_eq!(layout.timepoint_size(), 1200);
        assert_eq!(layout.total_size(), 4800);
    }

    #[test]
    fn test_offsets() {
        let layout = create_test_layout();
        assert_eq!(layout.row_offset(3, 2, 1, 2).unwrap(), 3 * 20 + 2 * 1200 + 600 + 2 * 200);
        assert_eq!(layout.plane_offset(1, 1, 2).unwrap(), 2 * 1200 + 600 + 200);
        assert_eq!(layout.stack_offset(1, 3).unwrap(), 3 * 1200 + 600);
        assert_eq!(layout.timepoint_offset(3).unwrap(), 3600);
    }

    #[test]
    fn test_unbounded_components_address_block_start() {
        let layout = create_test_layout();
        let partial = Coordinate {
            y: None,
            z: Some(2),
            c: Some(1),
            t: Some(0),
        };
        assert_eq!(layout.offset(&partial).unwrap(), layout.plane_offset(2, 1, 0).unwrap());
        assert_eq!(layout.offset(&Coordinate::default()).unwrap(), 0);
    }

    #[test]
    fn test_timepoint_offsets_are_monotonic() {
        let layout = create_test_layout();
        let mut previous = None;
        for t in 0..4 {
            let offset = layout.timepoint_offset(t).unwrap();
            assert_eq!(offset, t as u64 * 10 * 10 * 3 * 2 * 2);
            if let Some(previous) = previous {
                assert!(previous < offset);
            }
            previous = Some(offset);
        }
    }

    #[test]
    fn test_check_bounds() {
        let layout = create_test_layout();
        assert!(layout.check_bounds(Some(9), None, None, None).is_ok());
        assert!(matches!(
            layout.check_bounds(Some(10), None, None, None),
            Err(PixelsError::OutOfBounds(_))
        ));
        assert!(layout.check_bounds(None, Some(3), None, None).is_err());
        assert!(layout.check_bounds(None, None, Some(2), None).is_err());
        assert!(layout.check_bounds(None, None, None, Some(4)).is_err());
        assert!(layout.check_bounds(None, None, None, None).is_ok());
    }

    #[test]
    fn test_check_hypercube() {
        let layout = create_test_layout();
        let whole = Hypercube::whole(layout.geometry());
        assert!(layout.check_hypercube(&whole).is_ok());

        let past_x = Hypercube::new((1, 10), (0, 10), (0, 3), (0, 2), (0, 4));
        assert!(matches!(
            layout.check_hypercube(&past_x),
            Err(PixelsError::OutOfBounds(_))
        ));
        let past_t = Hypercube::new((0, 10), (0, 10), (0, 3), (0, 2), (2, 3));
        assert!(layout.check_hypercube(&past_t).is_err());
        let empty = Hypercube::new((0, 0), (0, 10), (0, 3), (0, 2), (0, 4));
        assert!(layout.check_hypercube(&empty).is_err());
        let huge = Hypercube::new((u32::MAX, 2), (0, 1), (0, 1), (0, 1), (0, 1));
        assert!(layout.check_hypercube(&huge).is_err());
    }

    #[test]
    fn test_hypercube_size() {
        let layout = create_test_layout();
        let cube = Hypercube::new((2, 5), (0, 4), (1, 2), (0, 1), (1, 3));
        assert_eq!(layout.hypercube_size(&cube), 5 * 4 * 2 * 3 * 2);
    }

    #[test]
    fn test_unchecked_hypercube_size_saturates() {
        let layout = create_test_layout();
        let cube = Hypercube::new(
            (0, u32::MAX),
            (0, u32::MAX),
            (0, u32::MAX),
            (0, u32::MAX),
            (0, u32::MAX),
        );
        assert_eq!(cube.pixel_count(), u64::MAX);
        assert_eq!(layout.hypercube_size(&cube), u64::MAX);
        assert!(layout.check_hypercube(&cube).is_err());
    }

    #[test]
    fn test_plane_region() {
        let layout = create_test_layout();
        assert_eq!(layout.plane_region(4, 10).unwrap(), (20, 8));
        assert_eq!(layout.plane_region(100, 0).unwrap(), (0, 200));
        assert_eq!(layout.plane_region(0, 100).unwrap(), (200, 0));
        assert!(layout.plane_region(1, 100).is_err());
        for (count, offset) in [
            (1, usize::MAX / 2 + 1),
            (usize::MAX / 2 + 1, 0),
            (usize::MAX, usize::MAX),
        ] {
            assert!(matches!(
                layout.plane_region(count, offset),
                Err(PixelsError::OutOfBounds(_))
            ));
        }
    }

    #[test]
    fn test_literal_geometry_with_empty_axis_is_rejected() {
        let valid = ImageGeometry::new(4, 4, 1, 1, 1, PixelType::UInt8).unwrap();
        let empty_x = ImageGeometry { size_x: 0, ..valid };
        assert!(matches!(
            PixelLayout::new(empty_x),
            Err(PixelsError::InvalidConfiguration(_))
        ));

        let json = r#"{"size_x":4,"size_y":4,"size_z":1,"size_c":0,"size_t":1,"pixel_type":"UInt8"}"#;
        let deserialized: ImageGeometry = serde_json::from_str(json).unwrap();
        assert!(PixelLayout::new(deserialized).is_err());
    }

    #[test]
    fn test_large_buffers_use_wide_arithmetic() {
        let geometry = ImageGeometry::new(65536, 65536, 64, 4, 2, PixelType::UInt16).unwrap();
        let layout = PixelLayout::new(geometry).unwrap();
        assert_eq!(layout.total_size(), 1u64 << 42);
        assert_eq!(layout.timepoint_offset(1).unwrap(), 1u64 << 41);
    }

    #[test]
    fn test_overflowing_geometry_is_rejected() {
        let geometry =
            ImageGeometry::new(u32::MAX, u32::MAX, u32::MAX, 2, 2, PixelType::Complex128).unwrap();
        assert!(matches!(
            PixelLayout::new(geometry),
            Err(PixelsError::InvalidConfiguration(_))
        ));
    }
}
