//! Packet container
//!
//! One packet per (controller, event). On the wire:
//! - Magic (4 bytes): 0xCAFEBABE
//! - Frame count (4 bytes)
//! - Frame length table (4 bytes per frame)
//! - Frames, each padded with zeros to a 4-byte boundary
//!
//! The length table ("header index") carries unpadded frame lengths. The
//! declared magic, frame count and table entries are normally derived from
//! the frames, but can be overridden to build deliberately broken packets.

use serde::{Deserialize, Serialize};

use crate::checksum::{verify_frame, CRC_SIZE};
use crate::error::{ProtocolError, Result};
use crate::frame::{read_u32, FrameType, HeaderWord};

/// Packet magic
pub const PACKET_MAGIC: u32 = 0xCAFE_BABE;

/// Largest frame count a decoder accepts
pub const MAX_FRAMES: u32 = 256;

/// Magic plus frame count
pub const PACKET_PREFIX_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    magic: u32,
    declared_frame_count: u32,
    header_index: Vec<u32>,
    frames: Vec<Vec<u8>>,
    wire_limit: Option<usize>,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    pub fn new() -> Self {
        Packet {
            magic: PACKET_MAGIC,
            declared_frame_count: 0,
            header_index: Vec::new(),
            frames: Vec::new(),
            wire_limit: None,
        }
    }

    /// Append a finished frame, returning its index
    pub(crate) fn push_frame(&mut self, frame: Vec<u8>) -> usize {
        let index = self.frames.len();
        self.header_index.push(frame.len() as u32);
        self.frames.push(frame);
        self.declared_frame_count = self.declared_frame_count.wrapping_add(1);
        index
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn declared_frame_count(&self) -> u32 {
        self.declared_frame_count
    }

    pub fn header_index(&self) -> &[u32] {
        &self.header_index
    }

    pub fn frame_type(&self, index: usize) -> Option<FrameType> {
        self.frame(index)
            .and_then(|frame| HeaderWord::read(frame).ok())
            .map(|header| header.frame_type())
    }

    pub fn frame_types(&self) -> Vec<FrameType> {
        (0..self.frames.len())
            .filter_map(|index| self.frame_type(index))
            .collect()
    }

    /// Index of the first frame of the given type
    pub fn position(&self, frame_type: FrameType) -> Option<usize> {
        (0..self.frames.len()).find(|&index| self.frame_type(index) == Some(frame_type))
    }

    /// Magic, frame count and length table all agree with the frames
    pub fn is_consistent(&self) -> bool {
        let declared: u64 = self.header_index.iter().map(|&len| len as u64).sum();
        let actual: u64 = self.frames.iter().map(|frame| frame.len() as u64).sum();
        self.magic == PACKET_MAGIC
            && self.declared_frame_count as usize == self.frames.len()
            && self.header_index.len() == self.frames.len()
            && declared == actual
            && self.wire_limit.is_none()
    }

    /// Check the trailing CRC of one frame
    pub fn verify_crc(&self, index: usize) -> bool {
        self.frame(index).map(verify_frame).unwrap_or(false)
    }

    pub fn set_magic(&mut self, magic: u32) {
        self.magic = magic;
    }

    pub fn set_declared_frame_count(&mut self, count: u32) {
        self.declared_frame_count = count;
    }

    pub fn set_declared_length(&mut self, index: usize, len: u32) -> Result<()> {
        let entry = self
            .header_index
            .get_mut(index)
            .ok_or(ProtocolError::FrameIndexOutOfRange(index))?;
        *entry = len;
        Ok(())
    }

    /// Cut the serialized packet to at most `len` bytes
    pub fn limit_wire_length(&mut self, len: usize) {
        self.wire_limit = Some(len);
    }

    /// Corrupt the stored CRC of a finalized frame.
    ///
    /// This is the only mutation of a frame after it was finalized.
    pub fn poison_crc(&mut self, index: usize) -> Result<()> {
        let frame = self
            .frames
            .get_mut(index)
            .ok_or(ProtocolError::FrameIndexOutOfRange(index))?;
        if frame.len() < CRC_SIZE {
            return Err(ProtocolError::FrameIndexOutOfRange(index));
        }
        let last = frame.len() - 1;
        frame[last] = frame[last].wrapping_add(1);
        Ok(())
    }

    /// Serialize the packet for the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload: usize = self.frames.iter().map(|frame| padded_len(frame.len())).sum();
        let mut bytes =
            Vec::with_capacity(PACKET_PREFIX_SIZE + 4 * self.header_index.len() + payload);

        bytes.extend_from_slice(&self.magic.to_be_bytes());
        bytes.extend_from_slice(&self.declared_frame_count.to_be_bytes());
        for len in &self.header_index {
            bytes.extend_from_slice(&len.to_be_bytes());
        }
        for frame in &self.frames {
            bytes.extend_from_slice(frame);
            bytes.resize(bytes.len() + padded_len(frame.len()) - frame.len(), 0);
        }

        if let Some(limit) = self.wire_limit {
            bytes.truncate(limit);
        }
        bytes
    }

    /// Parse a serialized packet
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PACKET_PREFIX_SIZE {
            return Err(ProtocolError::PacketTooShort { len: bytes.len() });
        }

        let magic = read_u32(bytes, 0);
        if magic != PACKET_MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let count = read_u32(bytes, 4);
        if count > MAX_FRAMES {
            return Err(ProtocolError::TooManyFrames {
                count,
                max: MAX_FRAMES,
            });
        }

        let table_end = PACKET_PREFIX_SIZE + 4 * count as usize;
        if bytes.len() < table_end {
            return Err(ProtocolError::TruncatedLengthTable);
        }
        let header_index: Vec<u32> = (0..count as usize)
            .map(|index| read_u32(bytes, PACKET_PREFIX_SIZE + 4 * index))
            .collect();

        let mut offset = table_end;
        let mut frames = Vec::with_capacity(header_index.len());
        for (index, &len) in header_index.iter().enumerate() {
            let len = len as usize;
            if len == 0 {
                return Err(ProtocolError::ZeroLengthFrame { index });
            }
            let available = bytes.len() - offset;
            if len > available {
                return Err(ProtocolError::FrameOverrun {
                    index,
                    needed: len,
                    available,
                });
            }
            frames.push(bytes[offset..offset + len].to_vec());
            offset = (offset + padded_len(len)).min(bytes.len());
        }

        Ok(Packet {
            magic,
            declared_frame_count: count,
            header_index,
            frames,
            wire_limit: None,
        })
    }
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}
