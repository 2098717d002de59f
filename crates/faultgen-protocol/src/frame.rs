//! Frame layouts for wire transmission
//!
//! Every frame is a 32-bit header word, a type-specific body and a trailing
//! CRC (see `checksum`). All multi-byte fields are big-endian.
//!
//! Header word:
//! - Bit 31: error flag
//! - Bits 30..27: frame type
//! - Bits 26..16: type-specific ids and masks
//! - Bits 15..0: low 16 bits of the trigger number
//!
//! Fixed frame sizes (header + body + CRC):
//! - Trigger: 32 bytes
//! - Controller Start: 20 bytes
//! - Controller End: 16 bytes
//! - Module Start: 16 bytes
//! - Module End: 16 bytes
//! - Ghost: 8 bytes

use serde::{Deserialize, Serialize};

use crate::checksum::CRC_SIZE;
use crate::error::{ProtocolError, Result};

/// Header word size
pub const HEADER_SIZE: usize = 4;

/// Error flag in the header word
pub const ERROR_FLAG: u32 = 0x8000_0000;

pub const TRIGGER_FRAME_SIZE: usize = 32;
pub const CONTROLLER_START_SIZE: usize = 20;
pub const CONTROLLER_END_SIZE: usize = 16;
pub const MODULE_START_SIZE: usize = 16;
pub const MODULE_END_SIZE: usize = 16;
pub const GHOST_FRAME_SIZE: usize = 8;

/// Header word plus chip header, the smallest valid chip data payload
pub const CHIP_HEADER_SIZE: usize = 8;

/// Header words of the fake controller frames sent when a trigger has no data
pub const FAKE_CONTROLLER_START: u32 = 0x5800_0000;
pub const FAKE_CONTROLLER_END: u32 = 0x6000_0000;

/// Trigger sub-record magic (upper 16 bits)
pub const TRIGGER_MAGIC: u32 = 0xCAFE_0000;
pub const TRIGGER_MAGIC_MASK: u32 = 0xFFFF_0000;
/// Main trigger flag: event accepted
pub const TRIGGER_ACCEPTED: u32 = 0x0000_8000;
/// Main trigger flag: chip data is forwarded without region filtering
pub const TRIGGER_SEND_UNFILTERED: u32 = 0x0000_4000;

/// Chip header data type for zero-suppressed data
pub const CHIP_DATA_ZSD: u32 = 5;

/// Module geometry
pub const ROWS: u16 = 768;
pub const COLUMNS: u16 = 250;
pub const CHIP_COLUMNS: u16 = 64;
pub const CHIPS_PER_MODULE: u8 = 4;
pub const PORTS_PER_CONTROLLER: usize = 5;

/// Trigger clock ticks per nanosecond (127.216 MHz)
pub const TICKS_PER_NS: f64 = 0.127216;

/// Readout gates per frame
pub const GATES: u32 = 192;

/// Frame type carried in bits 30..27 of the header word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    ChipRaw = 0,
    ClusterRaw = 1,
    Ghost = 2,
    ModuleStart = 3,
    ModuleEnd = 4,
    ChipData = 5,
    CommonMode = 6,
    Unused7 = 7,
    Unused8 = 8,
    MergerCluster = 9,
    Unused10 = 10,
    ControllerStart = 11,
    ControllerEnd = 12,
    MergerChipData = 13,
    Trigger = 14,
    RegionOfInterest = 15,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FrameType::ChipRaw),
            1 => Ok(FrameType::ClusterRaw),
            2 => Ok(FrameType::Ghost),
            3 => Ok(FrameType::ModuleStart),
            4 => Ok(FrameType::ModuleEnd),
            5 => Ok(FrameType::ChipData),
            6 => Ok(FrameType::CommonMode),
            7 => Ok(FrameType::Unused7),
            8 => Ok(FrameType::Unused8),
            9 => Ok(FrameType::MergerCluster),
            10 => Ok(FrameType::Unused10),
            11 => Ok(FrameType::ControllerStart),
            12 => Ok(FrameType::ControllerEnd),
            13 => Ok(FrameType::MergerChipData),
            14 => Ok(FrameType::Trigger),
            15 => Ok(FrameType::RegionOfInterest),
            other => Err(ProtocolError::InvalidFrameType(other)),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Size of frames with a fixed layout
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            FrameType::Trigger => Some(TRIGGER_FRAME_SIZE),
            FrameType::ControllerStart => Some(CONTROLLER_START_SIZE),
            FrameType::ControllerEnd => Some(CONTROLLER_END_SIZE),
            FrameType::ModuleStart => Some(MODULE_START_SIZE),
            FrameType::ModuleEnd => Some(MODULE_END_SIZE),
            FrameType::Ghost => Some(GHOST_FRAME_SIZE),
            _ => None,
        }
    }

    /// Codes with no assigned meaning
    pub fn is_unused(self) -> bool {
        matches!(
            self,
            FrameType::Unused7 | FrameType::Unused8 | FrameType::Unused10
        )
    }
}

/// 32-bit frame header word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeaderWord(u32);

impl HeaderWord {
    /// Create a header word; `fields` fills bits 26..16
    pub fn new(frame_type: FrameType, fields: u32, trigger_lo: u16) -> Self {
        HeaderWord(
            ((frame_type.to_u8() as u32 & 0xF) << 27)
                | ((fields & 0x7FF) << 16)
                | trigger_lo as u32,
        )
    }

    /// Controller frames: id in bits 24..21, active module mask in bits 20..16
    pub fn controller(frame_type: FrameType, id: u8, module_mask: u8, trigger_lo: u16) -> Self {
        let fields = ((id as u32 & 0xF) << 5) | (module_mask as u32 & 0x1F);
        Self::new(frame_type, fields, trigger_lo)
    }

    /// Module frames: id in bits 25..20, active chip mask in bits 19..16
    pub fn module(frame_type: FrameType, id: u8, chip_mask: u8, trigger_lo: u16) -> Self {
        let fields = ((id as u32 & 0x3F) << 4) | (chip_mask as u32 & 0xF);
        Self::new(frame_type, fields, trigger_lo)
    }

    /// Chip frames: module id in bits 25..20, reformat flag in bit 19, chip in bits 17..16
    pub fn chip(frame_type: FrameType, id: u8, reformat: bool, chip: u8, trigger_lo: u16) -> Self {
        let fields =
            ((id as u32 & 0x3F) << 4) | ((reformat as u32) << 3) | (chip as u32 & 0x3);
        Self::new(frame_type, fields, trigger_lo)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn read(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort { len: frame.len() });
        }
        Ok(HeaderWord(read_u32(frame, 0)))
    }

    pub fn with_error_flag(self) -> Self {
        HeaderWord(self.0 | ERROR_FLAG)
    }

    pub fn without_error_flag(self) -> Self {
        HeaderWord(self.0 & !ERROR_FLAG)
    }

    pub fn error_flag(&self) -> bool {
        self.0 & ERROR_FLAG != 0
    }

    pub fn frame_type(&self) -> FrameType {
        match FrameType::from_u8(((self.0 >> 27) & 0xF) as u8) {
            Ok(frame_type) => frame_type,
            // four bits always name a frame type
            Err(_) => FrameType::Unused7,
        }
    }

    pub fn fields(&self) -> u32 {
        (self.0 >> 16) & 0x7FF
    }

    pub fn trigger_lo(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn controller_id(&self) -> u8 {
        ((self.0 >> 21) & 0xF) as u8
    }

    pub fn module_mask(&self) -> u8 {
        ((self.0 >> 16) & 0x1F) as u8
    }

    pub fn module_id(&self) -> u8 {
        ((self.0 >> 20) & 0x3F) as u8
    }

    pub fn chip_mask(&self) -> u8 {
        ((self.0 >> 16) & 0xF) as u8
    }

    pub fn chip_id(&self) -> u8 {
        ((self.0 >> 16) & 0x3) as u8
    }

    pub fn reformat(&self) -> bool {
        (self.0 >> 19) & 0x1 != 0
    }
}

pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn expect_frame(frame: &[u8], expected: FrameType, min: usize) -> Result<HeaderWord> {
    let header = HeaderWord::read(frame)?;
    let found = header.frame_type();
    if found != expected {
        return Err(ProtocolError::UnexpectedFrameType { expected, found });
    }
    if frame.len() < min {
        return Err(ProtocolError::FrameTooShort {
            frame_type: expected,
            len: frame.len(),
            min,
        });
    }
    Ok(header)
}

/// Experiment, run and subrun identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RunTag {
    /// 10 bits
    pub experiment: u16,
    /// 14 bits
    pub run: u16,
    pub subrun: u8,
}

impl RunTag {
    pub fn new(experiment: u16, run: u16, subrun: u8) -> Self {
        RunTag {
            experiment: experiment & 0x3FF,
            run: run & 0x3FFF,
            subrun,
        }
    }

    /// Packed form used by the trigger frame: exp<<22 | run<<8 | subrun
    pub fn to_trigger_tag(&self) -> u32 {
        ((self.experiment as u32 & 0x3FF) << 22)
            | ((self.run as u32 & 0x3FFF) << 8)
            | self.subrun as u32
    }

    pub fn from_trigger_tag(tag: u32) -> Self {
        RunTag {
            experiment: ((tag >> 22) & 0x3FF) as u16,
            run: ((tag >> 8) & 0x3FFF) as u16,
            subrun: (tag & 0xFF) as u8,
        }
    }

    /// Two 16-bit words used by the Controller Start frame
    pub fn to_controller_words(&self) -> (u16, u16) {
        let word1 = ((self.run & 0xFF) << 8) | self.subrun as u16;
        let word2 = ((self.experiment & 0x3FF) << 6) | ((self.run >> 8) & 0x3F);
        (word1, word2)
    }

    pub fn from_controller_words(word1: u16, word2: u16) -> Self {
        RunTag {
            experiment: (word2 >> 6) & 0x3FF,
            run: ((word2 & 0x3F) << 8) | (word1 >> 8),
            subrun: (word1 & 0xFF) as u8,
        }
    }
}

/// Coarse timestamp in trigger clock ticks within the second, plus seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeTag {
    /// 27 bits
    pub ticks: u32,
    /// 17 bits
    pub seconds: u32,
}

impl TimeTag {
    pub fn from_ns(time_ns: u64) -> Self {
        let sub_second = (time_ns % 1_000_000_000) as f64;
        TimeTag {
            ticks: ((sub_second * TICKS_PER_NS + 0.5) as u32) & 0x07FF_FFFF,
            seconds: ((time_ns / 1_000_000_000) as u32) & 0x1_FFFF,
        }
    }

    /// Three Controller Start words; the first shares its low nibble with the trigger type
    pub fn to_controller_words(&self, trigger_type: u8) -> (u16, u16, u16) {
        let lo = (((self.ticks << 4) & 0xFFF0) as u16) | (trigger_type as u16 & 0xF);
        let mid = (((self.ticks >> 12) & 0x7FFF) as u16) | (((self.seconds & 1) as u16) << 15);
        let hi = ((self.seconds >> 1) & 0xFFFF) as u16;
        (lo, mid, hi)
    }

    pub fn from_controller_words(lo: u16, mid: u16, hi: u16) -> Self {
        TimeTag {
            ticks: ((lo as u32) >> 4) | (((mid & 0x7FFF) as u32) << 12),
            seconds: ((hi as u32) << 1) | ((mid >> 15) as u32),
        }
    }
}

/// Trigger frame: main and auxiliary trigger sub-records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerFrame {
    pub header: HeaderWord,
    pub main_magic: u32,
    pub main_trigger: u32,
    pub main_tag: u32,
    pub aux_magic: u32,
    pub aux_trigger: u32,
    pub aux_tag: u32,
}

impl TriggerFrame {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let header = expect_frame(frame, FrameType::Trigger, TRIGGER_FRAME_SIZE)?;
        Ok(TriggerFrame {
            header,
            main_magic: read_u32(frame, 4),
            main_trigger: read_u32(frame, 8),
            main_tag: read_u32(frame, 12),
            aux_magic: read_u32(frame, 16),
            aux_trigger: read_u32(frame, 20),
            aux_tag: read_u32(frame, 24),
        })
    }

    pub fn magic_valid(magic: u32) -> bool {
        magic & TRIGGER_MAGIC_MASK == TRIGGER_MAGIC
    }

    pub fn main_run_tag(&self) -> RunTag {
        RunTag::from_trigger_tag(self.main_tag)
    }

    pub fn aux_run_tag(&self) -> RunTag {
        RunTag::from_trigger_tag(self.aux_tag)
    }

    /// An all-zero auxiliary sub-record marks an absent auxiliary source
    pub fn aux_absent(&self) -> bool {
        self.aux_magic == 0 && self.aux_trigger == 0 && self.aux_tag == 0
    }

    pub fn send_unfiltered(&self) -> bool {
        self.main_magic & TRIGGER_SEND_UNFILTERED != 0
    }
}

/// Controller Start frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStart {
    pub header: HeaderWord,
    pub trigger_hi: u16,
    pub time_lo_type: u16,
    pub time_mid: u16,
    pub time_hi: u16,
    pub run_word1: u16,
    pub run_word2: u16,
}

impl ControllerStart {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let header = expect_frame(frame, FrameType::ControllerStart, CONTROLLER_START_SIZE)?;
        Ok(ControllerStart {
            header,
            trigger_hi: read_u16(frame, 4),
            time_lo_type: read_u16(frame, 6),
            time_mid: read_u16(frame, 8),
            time_hi: read_u16(frame, 10),
            run_word1: read_u16(frame, 12),
            run_word2: read_u16(frame, 14),
        })
    }

    pub fn trigger(&self) -> u32 {
        ((self.trigger_hi as u32) << 16) | self.header.trigger_lo() as u32
    }

    pub fn trigger_type(&self) -> u8 {
        (self.time_lo_type & 0xF) as u8
    }

    pub fn time_tag(&self) -> TimeTag {
        TimeTag::from_controller_words(self.time_lo_type, self.time_mid, self.time_hi)
    }

    pub fn run_tag(&self) -> RunTag {
        RunTag::from_controller_words(self.run_word1, self.run_word2)
    }

    pub fn controller_id(&self) -> u8 {
        self.header.controller_id()
    }

    pub fn module_mask(&self) -> u8 {
        self.header.module_mask()
    }

    pub fn is_fake(&self) -> bool {
        self.header.raw() == FAKE_CONTROLLER_START
            && self.trigger_hi == 0
            && self.time_lo_type == 0
            && self.time_mid == 0
            && self.time_hi == 0
            && self.run_word1 == 0
            && self.run_word2 == 0
    }
}

/// Controller End frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerEnd {
    pub header: HeaderWord,
    /// Controller byte count in 32-bit words
    pub words: u32,
    pub error_flags: u32,
}

impl ControllerEnd {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let header = expect_frame(frame, FrameType::ControllerEnd, CONTROLLER_END_SIZE)?;
        Ok(ControllerEnd {
            header,
            words: read_u32(frame, 4),
            error_flags: read_u32(frame, 8),
        })
    }

    pub fn controller_id(&self) -> u8 {
        self.header.controller_id()
    }

    pub fn byte_count(&self) -> u64 {
        self.words as u64 * 4
    }
}

/// Module Start frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleStart {
    pub header: HeaderWord,
    pub trigger_hi: u16,
    pub time_lo: u16,
    pub time_hi: u16,
    pub frame_gate: u16,
}

impl ModuleStart {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let header = expect_frame(frame, FrameType::ModuleStart, MODULE_START_SIZE)?;
        Ok(ModuleStart {
            header,
            trigger_hi: read_u16(frame, 4),
            time_lo: read_u16(frame, 6),
            time_hi: read_u16(frame, 8),
            frame_gate: read_u16(frame, 10),
        })
    }

    /// Pack the readout frame number (6 bits) and trigger gate (10 bits)
    pub fn pack_frame_gate(frame_nr: u16, gate: u16) -> u16 {
        ((frame_nr & 0x3F) << 10) | (gate & 0x3FF)
    }

    pub fn trigger(&self) -> u32 {
        ((self.trigger_hi as u32) << 16) | self.header.trigger_lo() as u32
    }

    pub fn frame_nr(&self) -> u16 {
        (self.frame_gate >> 10) & 0x3F
    }

    pub fn gate(&self) -> u16 {
        self.frame_gate & 0x3FF
    }

    pub fn module_id(&self) -> u8 {
        self.header.module_id()
    }

    pub fn chip_mask(&self) -> u8 {
        self.header.chip_mask()
    }
}

/// Module End frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleEnd {
    pub header: HeaderWord,
    pub words_lo: u16,
    pub words_hi: u16,
    pub error_flags: u32,
}

impl ModuleEnd {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let header = expect_frame(frame, FrameType::ModuleEnd, MODULE_END_SIZE)?;
        Ok(ModuleEnd {
            header,
            words_lo: read_u16(frame, 4),
            words_hi: read_u16(frame, 6),
            error_flags: read_u32(frame, 8),
        })
    }

    /// Module byte count in 16-bit words
    pub fn words(&self) -> u32 {
        ((self.words_hi as u32) << 16) | self.words_lo as u32
    }

    pub fn byte_count(&self) -> u64 {
        self.words() as u64 * 2
    }

    pub fn module_id(&self) -> u8 {
        self.header.module_id()
    }
}

/// One 16-bit record of a zero-suppressed chip frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipRecord {
    /// Starts a row pair; `row` has its lowest bit cleared
    RowStart { row: u16, common_mode: u8 },
    /// Hit within the current row pair
    Hit { row_odd: bool, column: u8, adc: u8 },
}

impl ChipRecord {
    pub fn row_start(row: u16) -> Self {
        ChipRecord::RowStart {
            row: row & 0x3FE,
            common_mode: 0,
        }
    }

    pub fn hit(row: u16, column: u8, adc: u8) -> Self {
        ChipRecord::Hit {
            row_odd: row & 1 != 0,
            column: column & 0x3F,
            adc,
        }
    }

    pub fn encode(&self) -> u16 {
        match *self {
            ChipRecord::RowStart { row, common_mode } => {
                ((row & 0x3FE) << 5) | (common_mode as u16 & 0x3F)
            }
            ChipRecord::Hit {
                row_odd,
                column,
                adc,
            } => 0x8000 | ((row_odd as u16) << 14) | ((column as u16 & 0x3F) << 8) | adc as u16,
        }
    }

    pub fn decode(word: u16) -> Self {
        if word & 0x8000 == 0 {
            ChipRecord::RowStart {
                row: (word >> 5) & 0x3FE,
                common_mode: (word & 0x3F) as u8,
            }
        } else {
            ChipRecord::Hit {
                row_odd: word & 0x4000 != 0,
                column: ((word >> 8) & 0x3F) as u8,
                adc: (word & 0xFF) as u8,
            }
        }
    }
}

/// Chip header word: data type, module id, chip id and chip readout frame number
pub fn chip_header_word(module_id: u8, chip: u8, frame_nr: u16) -> u32 {
    (CHIP_DATA_ZSD << 29)
        | ((module_id as u32 & 0x3F) << 18)
        | ((chip as u32 & 0x3) << 16)
        | frame_nr as u32
}

/// Inner modules carry the row axis mirrored in raw readout coordinates
pub fn is_inner_module(module_id: u8) -> bool {
    module_id & 0x20 == 0
}

/// Map a chip-local pixel between reformatted and raw readout coordinates.
///
/// The mapping is its own inverse. Rows outside the module are left as they are.
pub fn raw_coordinates(module_id: u8, row: u16, column: u8) -> (u16, u8) {
    let column = 63 - (column & 0x3F);
    let row = if is_inner_module(module_id) && row < ROWS {
        ROWS - 1 - row
    } else {
        row
    };
    (row, column)
}

/// A pixel hit in module coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hit {
    pub row: u16,
    pub column: u16,
    pub adc: u8,
}

/// Chip data frame (zero-suppressed, or merger chip data)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipFrame {
    pub header: HeaderWord,
    pub chip_header: u32,
    pub records: Vec<u16>,
}

impl ChipFrame {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let header = HeaderWord::read(frame)?;
        let found = header.frame_type();
        if found != FrameType::ChipData && found != FrameType::MergerChipData {
            return Err(ProtocolError::UnexpectedFrameType {
                expected: FrameType::ChipData,
                found,
            });
        }
        let min = CHIP_HEADER_SIZE + CRC_SIZE;
        if frame.len() < min {
            return Err(ProtocolError::FrameTooShort {
                frame_type: found,
                len: frame.len(),
                min,
            });
        }
        let body = &frame[CHIP_HEADER_SIZE..frame.len() - CRC_SIZE];
        let records = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(ChipFrame {
            header,
            chip_header: read_u32(frame, HEADER_SIZE),
            records,
        })
    }

    pub fn data_type(&self) -> u32 {
        self.chip_header >> 29
    }

    pub fn chip_module_id(&self) -> u8 {
        ((self.chip_header >> 18) & 0x3F) as u8
    }

    pub fn chip_port(&self) -> u8 {
        ((self.chip_header >> 16) & 0x3) as u8
    }

    pub fn chip_frame_nr(&self) -> u16 {
        (self.chip_header & 0xFFFF) as u16
    }

    /// Decode hits into module coordinates.
    ///
    /// Hits preceding the first row-start record are dropped.
    pub fn hits(&self) -> Vec<Hit> {
        let module_id = self.header.module_id();
        let chip = self.header.chip_id() as u16;
        let mut row_base = None;
        let mut hits = Vec::new();

        for &word in &self.records {
            match ChipRecord::decode(word) {
                ChipRecord::RowStart { row, .. } => row_base = Some(row),
                ChipRecord::Hit {
                    row_odd,
                    column,
                    adc,
                } => {
                    let Some(base) = row_base else {
                        continue;
                    };
                    let mut row = base | row_odd as u16;
                    let mut column = column;
                    if !self.header.reformat() {
                        (row, column) = raw_coordinates(module_id, row, column);
                    }
                    hits.push(Hit {
                        row,
                        column: chip * CHIP_COLUMNS + column as u16,
                        adc,
                    });
                }
            }
        }
        hits
    }
}
