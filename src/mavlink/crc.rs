//! # CRC-16/MCRF4XX Implementation
//!
//! X.25 checksum used by MAVLink frames.
//!
//! **Polynomial**: 0x1021 (reflected)
//! **Initial Value**: 0xFFFF
//!
//! The frame checksum covers every byte after the start marker up to the end
//! of the payload, then one extra byte (CRC_EXTRA) derived from the message
//! definition so that mismatched dialects are rejected.

/// Initial CRC accumulator value
pub const X25_INIT_CRC: u16 = 0xFFFF;

/// Fold one byte into a running X.25 checksum
#[inline]
pub fn crc_accumulate(byte: u8, crc: u16) -> u16 {
    let mut tmp = byte ^ (crc & 0xFF) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

/// Calculate the X.25 checksum of a byte slice
///
/// # Examples
///
/// ```
/// use mav_telemetry_gateway::mavlink::crc::crc16_x25;
///
/// assert_eq!(crc16_x25(b"123456789"), 0x6F91);
/// ```
pub fn crc16_x25(data: &[u8]) -> u16 {
    data.iter()
        .fold(X25_INIT_CRC, |crc, &byte| crc_accumulate(byte, crc))
}

/// Calculate a MAVLink frame checksum
///
/// # Arguments
///
/// * `data` - Frame bytes after the start marker through the end of the payload
/// * `crc_extra` - Per-message seed byte
pub fn frame_crc(data: &[u8], crc_extra: u8) -> u16 {
    crc_accumulate(crc_extra, crc16_x25(data))
}
