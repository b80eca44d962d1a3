//! Unit types for microstep configuration.

use serde::Deserialize;

use crate::error::ConfigError;

/// Microstep resolution (1, 2, 4, 8, 16, 32, 64, 128, 256 µsteps per full step).
///
/// Validated at construction to be a power of 2 within the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Microsteps(u16);

impl Microsteps {
    /// Full step (no microstepping).
    pub const FULL: Self = Self(1);
    /// Half step.
    pub const HALF: Self = Self(2);
    /// Quarter step.
    pub const QUARTER: Self = Self(4);
    /// Eighth step.
    pub const EIGHTH: Self = Self(8);
    /// Sixteenth step.
    pub const SIXTEENTH: Self = Self(16);
    /// Thirty-second step.
    pub const THIRTY_SECOND: Self = Self(32);
    /// Sixty-fourth step.
    pub const SIXTY_FOURTH: Self = Self(64);
    /// 128th step.
    pub const ONE_TWENTY_EIGHTH: Self = Self(128);
    /// 256th step (maximum resolution).
    pub const TWO_FIFTY_SIXTH: Self = Self(256);

    /// Valid microstep values.
    const VALID_VALUES: [u16; 9] = [1, 2, 4, 8, 16, 32, 64, 128, 256];

    /// Create a new Microsteps value with validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidMicrosteps` if the value is not a valid power of 2.
    pub fn new(value: u16) -> Result<Self, ConfigError> {
        if Self::VALID_VALUES.contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidMicrosteps(value))
        }
    }

    /// Get the raw divisor value.
    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Check if a value is valid.
    #[inline]
    pub fn is_valid(value: u16) -> bool {
        Self::VALID_VALUES.contains(&value)
    }

    /// Encode as the CHOPCONF `mres` field (256 → 0, 128 → 1, ... 1 → 8).
    #[inline]
    pub fn to_mres(self) -> u8 {
        8 - self.0.trailing_zeros() as u8
    }

    /// Decode a CHOPCONF `mres` field value.
    ///
    /// Values above 8 are reserved and decode to full steps, as the chip does.
    pub fn from_mres(mres: u8) -> Self {
        let shift = 8u8.saturating_sub(mres.min(8));
        Self(1 << shift)
    }
}

impl Default for Microsteps {
    fn default() -> Self {
        Self::SIXTEENTH
    }
}

impl TryFrom<u16> for Microsteps {
    type Error = ConfigError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Microsteps {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u16::deserialize(deserializer)?;
        Microsteps::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microsteps_valid_values() {
        for &v in &Microsteps::VALID_VALUES {
            assert!(Microsteps::new(v).is_ok());
        }
    }

    #[test]
    fn test_microsteps_invalid_values() {
        assert!(Microsteps::new(0).is_err());
        assert!(Microsteps::new(3).is_err());
        assert!(Microsteps::new(17).is_err());
        assert!(Microsteps::new(512).is_err());
    }

    #[test]
    fn test_mres_encoding() {
        assert_eq!(Microsteps::TWO_FIFTY_SIXTH.to_mres(), 0);
        assert_eq!(Microsteps::SIXTEENTH.to_mres(), 4);
        assert_eq!(Microsteps::FULL.to_mres(), 8);

        for &v in &Microsteps::VALID_VALUES {
            let ms = Microsteps::new(v).unwrap();
            assert_eq!(Microsteps::from_mres(ms.to_mres()), ms);
        }
    }

    #[test]
    fn test_reserved_mres_is_full_step() {
        assert_eq!(Microsteps::from_mres(15), Microsteps::FULL);
    }
}
