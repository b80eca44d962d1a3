//! CRC-8 used by the TMC UART protocol.

/// Compute the datagram CRC (polynomial x^8 + x^2 + x + 1).
///
/// Each byte is shifted in least significant bit first, as specified by the
/// TMC220x/TMC2209 datasheets.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut current = byte;
        for _ in 0..8 {
            if (crc >> 7) ^ (current & 0x01) != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
            current >>= 1;
        }
    }
    crc
}
