//! Bit-field descriptors.

use crate::error::{name, ConfigError};

/// A named bit range inside a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name as used in the datasheet (lowercase).
    pub name: &'static str,
    /// Bit offset of the least significant bit.
    pub offset: u8,
    /// Width in bits (1-32).
    pub width: u8,
    /// Two's complement value.
    pub signed: bool,
}

impl Field {
    /// Unsigned multi-bit field.
    pub const fn new(name: &'static str, offset: u8, width: u8) -> Self {
        Self {
            name,
            offset,
            width,
            signed: false,
        }
    }

    /// Single-bit flag.
    pub const fn bit(name: &'static str, offset: u8) -> Self {
        Self::new(name, offset, 1)
    }

    /// Signed (two's complement) field.
    pub const fn signed(name: &'static str, offset: u8, width: u8) -> Self {
        Self {
            name,
            offset,
            width,
            signed: true,
        }
    }

    /// Unshifted mask covering `width` bits.
    #[inline]
    pub fn mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Smallest value the field accepts.
    pub fn min(&self) -> i64 {
        if self.signed {
            -(1i64 << (self.width - 1))
        } else {
            0
        }
    }

    /// Largest value the field accepts.
    pub fn max(&self) -> i64 {
        if self.signed {
            (1i64 << (self.width - 1)) - 1
        } else {
            self.mask() as i64
        }
    }

    /// Extract this field from a raw register value.
    pub fn extract(&self, raw: u32) -> i32 {
        let mask = self.mask();
        let bits = (raw >> self.offset) & mask;
        if self.signed && self.width < 32 && bits & (1 << (self.width - 1)) != 0 {
            (bits | !mask) as i32
        } else {
            bits as i32
        }
    }

    /// Insert `value` into `raw`, leaving all other bits untouched.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FieldOverflow` if the value does not fit.
    pub fn insert(&self, raw: u32, value: i32) -> Result<u32, ConfigError> {
        let v = value as i64;
        if v < self.min() || v > self.max() {
            return Err(ConfigError::FieldOverflow {
                field: name(self.name),
                value,
                width: self.width,
            });
        }

        let mask = self.mask();
        let cleared = raw & !(mask << self.offset);
        Ok(cleared | (((value as u32) & mask) << self.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extract_unsigned() {
        let f = Field::new("mres", 24, 4);
        assert_eq!(f.extract(0x1500_0053), 5);
        assert_eq!(f.mask(), 0xF);
    }

    #[test]
    fn test_extract_signed() {
        let f = Field::signed("vactual", 0, 24);
        assert_eq!(f.extract(0x00FF_FFFF), -1);
        assert_eq!(f.extract(0x0080_0000), -(1 << 23));
        assert_eq!(f.extract(0x0000_1000), 4096);
    }

    #[test]
    fn test_insert_preserves_other_bits() {
        let f = Field::new("irun", 8, 5);
        let raw = f.insert(0xFFFF_FFFF, 0).unwrap();
        assert_eq!(raw, 0xFFFF_E0FF);
        let raw = f.insert(raw, 31).unwrap();
        assert_eq!(raw, 0xFFFF_FFFF);
    }

    #[test]
    fn test_insert_signed() {
        let f = Field::signed("sgt", 16, 7);
        let raw = f.insert(0, -64).unwrap();
        assert_eq!(raw, 0x0040_0000);
        assert_eq!(f.extract(raw), -64);
        assert!(f.insert(0, 64).is_err());
        assert!(f.insert(0, -65).is_err());
    }

    #[test]
    fn test_insert_overflow_rejected() {
        let f = Field::bit("shaft", 3);
        assert!(f.insert(0, 1).is_ok());
        assert!(matches!(
            f.insert(0, 2),
            Err(ConfigError::FieldOverflow { width: 1, value: 2, .. })
        ));
        assert!(f.insert(0, -1).is_err());
    }

    proptest! {
        #[test]
        fn prop_insert_extract_round_trip(
            raw in any::<u32>(),
            offset in 0u8..32,
            width in 1u8..=32,
            signed in any::<bool>(),
            seed in any::<i64>(),
        ) {
            // unsigned values are passed as i32, so 31 bits at most
            let width = width.min(32 - offset).min(if signed { 32 } else { 31 });
            let f = Field { name: "f", offset, width, signed };
            let span = (f.max() - f.min() + 1) as i128;
            let value = (f.min() as i128 + (seed as i128).rem_euclid(span)) as i32;

            let written = f.insert(raw, value).unwrap();
            prop_assert_eq!(f.extract(written), value);

            let outside = !(f.mask().checked_shl(offset as u32).unwrap_or(0));
            prop_assert_eq!(written & outside, raw & outside);
        }
    }
}
