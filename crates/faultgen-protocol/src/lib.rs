//! Faultgen Protocol Module
//!
//! This module defines the wire vocabulary of the readout packet family:
//! frame types and layouts, the frame CRC, the frame buffer used to build
//! frames, the packet container, and the diagnostic taxonomy a decoder
//! reports against.

pub mod buffer;
pub mod checksum;
pub mod diag;
pub mod error;
pub mod frame;
pub mod packet;

pub use buffer::{ByteCounters, FinalizedFrame, FrameBuffer};
pub use diag::DiagMask;
pub use error::{ProtocolError, Result};
pub use frame::{FrameType, HeaderWord};
pub use packet::{Packet, MAX_FRAMES, PACKET_MAGIC};
