//! Z-order curve over integer coordinates.
//!
//! A spatial index replaces its coordinate columns with a single ordinal whose
//! bits interleave the coordinates. Nearby points tend to share long ordinal
//! prefixes, and the mapping is invertible so scans can hand the original
//! coordinates back to the caller.

use crate::error::{CoreError, CoreResult};

/// Number of coordinates in a latitude/longitude space.
pub const LAT_LON_DIMENSIONS: usize = 2;

const COORDINATE_BIAS: u32 = 0x8000_0000;
const ORDINAL_BIAS: u64 = 0x8000_0000_0000_0000;

/// A space whose points map onto a signed 64-bit z-order ordinal.
///
/// Coordinates must fit in an `i32`; callers scale latitude and longitude to
/// fixed-point integers before indexing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Space {
    dimensions: usize,
}

impl Space {
    /// The two-dimensional latitude/longitude space.
    #[must_use]
    pub const fn lat_lon() -> Self {
        Self { dimensions: LAT_LON_DIMENSIONS }
    }

    /// Creates a space with the given number of dimensions.
    ///
    /// # Errors
    ///
    /// Only latitude/longitude spaces are supported.
    pub fn new(dimensions: usize) -> CoreResult<Self> {
        if dimensions != LAT_LON_DIMENSIONS {
            return Err(CoreError::Spatial(format!(
                "unsupported dimensionality {dimensions}, expected {LAT_LON_DIMENSIONS}"
            )));
        }
        Ok(Self { dimensions })
    }

    /// Returns the number of coordinates per point.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Interleaves the coordinates into an ordinal.
    ///
    /// The first coordinate contributes the most significant bit of every bit
    /// pair. Ordinals compare as signed integers in curve order.
    ///
    /// # Errors
    ///
    /// Fails if the coordinate count is wrong or a coordinate overflows `i32`.
    pub fn shuffle(&self, coordinates: &[i64]) -> CoreResult<i64> {
        if coordinates.len() != self.dimensions {
            return Err(CoreError::Spatial(format!(
                "expected {} coordinates, got {}",
                self.dimensions,
                coordinates.len()
            )));
        }
        let mut biased = [0u32; LAT_LON_DIMENSIONS];
        for (slot, &coordinate) in biased.iter_mut().zip(coordinates) {
            let narrow = i32::try_from(coordinate).map_err(|_| {
                CoreError::Spatial(format!("coordinate {coordinate} is outside the i32 range"))
            })?;
            *slot = (narrow as u32) ^ COORDINATE_BIAS;
        }

        let mut z = 0u64;
        for bit in 0..32 {
            for (d, coordinate) in biased.iter().enumerate() {
                let shift = bit * LAT_LON_DIMENSIONS + (LAT_LON_DIMENSIONS - 1 - d);
                z |= u64::from((coordinate >> bit) & 1) << shift;
            }
        }
        Ok((z ^ ORDINAL_BIAS) as i64)
    }

    /// Recovers the coordinates encoded in an ordinal.
    #[must_use]
    pub fn unshuffle(&self, ordinal: i64) -> Vec<i64> {
        let z = (ordinal as u64) ^ ORDINAL_BIAS;
        let mut biased = [0u32; LAT_LON_DIMENSIONS];
        for bit in 0..32 {
            for (d, coordinate) in biased.iter_mut().enumerate() {
                let shift = bit * LAT_LON_DIMENSIONS + (LAT_LON_DIMENSIONS - 1 - d);
                *coordinate |= (((z >> shift) & 1) as u32) << bit;
            }
        }
        biased.iter().map(|&c| i64::from((c ^ COORDINATE_BIAS) as i32)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn only_lat_lon_is_supported() {
        assert!(Space::new(2).is_ok());
        assert!(Space::new(3).is_err());
    }

    #[test]
    fn origin_sits_mid_curve() {
        let space = Space::lat_lon();
        let low = space.shuffle(&[i64::from(i32::MIN), i64::from(i32::MIN)]).unwrap();
        let origin = space.shuffle(&[0, 0]).unwrap();
        let high = space.shuffle(&[i64::from(i32::MAX), i64::from(i32::MAX)]).unwrap();
        assert_eq!(low, i64::MIN);
        assert_eq!(high, i64::MAX);
        assert!(low < origin && origin < high);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let space = Space::lat_lon();
        assert!(space.shuffle(&[i64::from(i32::MAX) + 1, 0]).is_err());
        assert!(space.shuffle(&[1]).is_err());
    }

    proptest! {
        #[test]
        fn unshuffle_inverts_shuffle(x in any::<i32>(), y in any::<i32>()) {
            let space = Space::lat_lon();
            let z = space.shuffle(&[i64::from(x), i64::from(y)]).unwrap();
            prop_assert_eq!(space.unshuffle(z), vec![i64::from(x), i64::from(y)]);
        }

        #[test]
        fn curve_is_monotone_per_axis(x in any::<i32>(), y in any::<i32>(), dx in 1..1000i64) {
            let space = Space::lat_lon();
            let x = i64::from(x);
            let y = i64::from(y);
            prop_assume!(x + dx <= i64::from(i32::MAX) && y + dx <= i64::from(i32::MAX));
            let base = space.shuffle(&[x, y]).unwrap();
            prop_assert!(space.shuffle(&[x + dx, y]).unwrap() > base);
            prop_assert!(space.shuffle(&[x, y + dx]).unwrap() > base);
        }
    }
}
