//! CRC16 used by the AM2321 response frames.
//!
//! The sensor appends a CRC-16/MODBUS (initial value 0xFFFF, reflected
//! polynomial 0xA001) to every response, low byte first.

use crc::{CRC_16_MODBUS, Crc};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Computes the CRC16 of `bytes`. An empty slice yields 0xFFFF.
pub fn crc16(bytes: &[u8]) -> u16 {
    MODBUS.checksum(bytes)
}

/// Checks a frame whose last two bytes are the CRC16 of the preceding bytes,
/// low byte then high byte.
///
/// Frames shorter than the two CRC bytes never verify.
pub fn verify_crc(frame: &[u8]) -> bool {
    let Some(split) = frame.len().checked_sub(2) else {
        return false;
    };
    let (data, crc) = frame.split_at(split);
    crc16(data) == u16::from_le_bytes([crc[0], crc[1]])
}
