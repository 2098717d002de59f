//! Frame checksum
//!
//! CRC-32 with polynomial 0x04C11DB7, zero init, no reflection and no final
//! xor. A frame with its trailing CRC appended checks to a zero residue.

use crc::{Algorithm, Crc};

/// CRC size appended to every frame
pub const CRC_SIZE: usize = 4;

pub const FRAME_CRC_ALGORITHM: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c1_1db7,
    init: 0x0000_0000,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x89a1_897f,
    residue: 0x0000_0000,
};

pub const FRAME_CRC: Crc<u32> = Crc::<u32>::new(&FRAME_CRC_ALGORITHM);

/// Checksum over header and body bytes
pub fn frame_crc(bytes: &[u8]) -> u32 {
    FRAME_CRC.checksum(bytes)
}

/// Check the trailing CRC of a complete frame
pub fn verify_frame(frame: &[u8]) -> bool {
    if frame.len() < CRC_SIZE {
        return false;
    }
    let (payload, trailer) = frame.split_at(frame.len() - CRC_SIZE);
    let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    frame_crc(payload) == stored
}
