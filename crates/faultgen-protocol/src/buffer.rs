//! Frame buffer
//!
//! Accumulates the bytes of the frame currently being built and moves the
//! finished frame, with its CRC appended, into a [`Packet`]. Every append
//! also advances the controller and module byte counters. The counters are
//! kept apart from the bytes so that ghost-frame retraction can undo a
//! provisional increment without touching frames already finalized.

use tracing::warn;

use crate::checksum::{frame_crc, CRC_SIZE};
use crate::packet::Packet;

/// Running byte counts used for the End frame length fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounters {
    pub controller: u32,
    pub module: u32,
}

impl ByteCounters {
    fn add(&mut self, bytes: u32) {
        self.controller = self.controller.wrapping_add(bytes);
        self.module = self.module.wrapping_add(bytes);
    }

    fn retract(&mut self, bytes: u32) {
        self.controller = self.controller.wrapping_sub(bytes);
        self.module = self.module.wrapping_sub(bytes);
    }
}

/// Result of [`FrameBuffer::finalize_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizedFrame {
    /// Position in the packet's frame list
    pub index: usize,
    /// Frame length including the CRC
    pub len: usize,
    /// Whether the frame was 32-bit aligned
    pub aligned: bool,
}

#[derive(Debug, Default)]
pub struct FrameBuffer {
    working: Vec<u8>,
    counters: ByteCounters,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new frame. Calling it twice in a row leaves the same state.
    pub fn begin_frame(&mut self) {
        self.working.clear();
    }

    pub fn append_u8(&mut self, value: u8) {
        self.working.push(value);
        self.counters.add(1);
    }

    pub fn append_u16(&mut self, value: u16) {
        self.working.extend_from_slice(&value.to_be_bytes());
        self.counters.add(2);
    }

    pub fn append_u32(&mut self, value: u32) {
        self.working.extend_from_slice(&value.to_be_bytes());
        self.counters.add(4);
    }

    /// Bytes of the frame in progress
    pub fn working(&self) -> &[u8] {
        &self.working
    }

    pub fn len(&self) -> usize {
        self.working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// Shorten the frame in progress without touching the counters
    pub fn truncate(&mut self, len: usize) {
        self.working.truncate(len);
    }

    /// Undo counter increments for bytes that will not be emitted
    pub fn retract(&mut self, bytes: u32) {
        self.counters.retract(bytes);
    }

    pub fn counters(&self) -> ByteCounters {
        self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = ByteCounters::default();
    }

    pub fn reset_module_counter(&mut self) {
        self.counters.module = 0;
    }

    /// Append the CRC and move the frame into `packet`.
    ///
    /// A frame that is not a multiple of 4 bytes is still emitted; decoders
    /// require 32-bit alignment so a warning is logged.
    pub fn finalize_frame(&mut self, packet: &mut Packet) -> FinalizedFrame {
        let crc = frame_crc(&self.working);
        self.append_u32(crc);

        let len = self.working.len();
        let aligned = len % 4 == 0;
        if !aligned {
            warn!(
                "Frame {} is not 32-bit aligned: {} bytes",
                packet.frame_count(),
                len - CRC_SIZE
            );
        }

        let index = packet.push_frame(std::mem::take(&mut self.working));
        FinalizedFrame {
            index,
            len,
            aligned,
        }
    }
}
