//! Error types for packet and frame decoding

use thiserror::Error;

use crate::frame::FrameType;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Packet too short: {len} bytes")]
    PacketTooShort { len: usize },

    #[error("Invalid packet magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Too many frames: {count} (max: {max})")]
    TooManyFrames { count: u32, max: u32 },

    #[error("Frame length table truncated")]
    TruncatedLengthTable,

    #[error("Frame {index} has zero length")]
    ZeroLengthFrame { index: usize },

    #[error("Frame {index} overruns packet: needs {needed} bytes, {available} available")]
    FrameOverrun {
        index: usize,
        needed: usize,
        available: usize,
    },

    #[error("Invalid frame type: {0}")]
    InvalidFrameType(u8),

    #[error("Frame too short for {frame_type:?}: {len} bytes (min: {min})")]
    FrameTooShort {
        frame_type: FrameType,
        len: usize,
        min: usize,
    },

    #[error("Unexpected frame type: expected {expected:?}, found {found:?}")]
    UnexpectedFrameType {
        expected: FrameType,
        found: FrameType,
    },

    #[error("Frame index out of range: {0}")]
    FrameIndexOutOfRange(usize),
}
