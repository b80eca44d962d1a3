//! SPI status byte.

/// Sticky status flags returned as the first byte of every SPI reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpiStatus {
    /// The chip was reset since GSTAT was last cleared.
    pub reset_flag: bool,
    /// Driver shut down due to overtemperature or short circuit.
    pub driver_error: bool,
    /// StallGuard2 stall flag.
    pub sg2: bool,
    /// Motor is at standstill.
    pub standstill: bool,
}

impl SpiStatus {
    /// Decode the status byte.
    pub fn from_byte(byte: u8) -> Self {
        Self {
            reset_flag: byte & 0x01 != 0,
            driver_error: byte & 0x02 != 0,
            sg2: byte & 0x04 != 0,
            standstill: byte & 0x08 != 0,
        }
    }
}
