//! Diagnostic taxonomy
//!
//! The fixed vocabulary of error bits a decoder reports for one event. Bit
//! positions are part of the reported-mask format and must not move.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
    pub struct DiagMask: u64 {
        /// Frame trigger number differs from the trigger frame
        const FRAME_TNR_MM = 1 << 0;
        /// Trigger number differs from the event metadata
        const META_MM = 1 << 1;
        /// First frame is not a trigger frame, or a trigger frame repeats
        const TRIGGER_FIRST = 1 << 2;
        const CONTROLLER_END_MISS = 1 << 3;
        /// Fewer than three frames in the packet
        const NR_FRAMES_TOO_SMALL = 1 << 4;
        const ROI_PACKET_INV_SIZE = 1 << 5;
        const TRIGGER_MAGIC = 1 << 6;
        /// Main and auxiliary trigger numbers differ
        const MERGER_TRIGNR = 1 << 7;
        const CHIP_SIZE = 1 << 8;
        /// Module id in the chip header differs from the frame header
        const CHIP_MODULE_ID = 1 << 9;
        /// Chip id in the chip header differs from the frame header
        const CHIP_PORT = 1 << 10;
        const PIX_WITHOUT_ROW = 1 << 11;
        const MODULE_START_END_ID = 1 << 12;
        /// Frame module id differs from the enclosing Module Start
        const MODULE_START_ID = 1 << 13;
        const MODULE_START_WITHOUT_END = 1 << 14;
        const NO_PACKET = 1 << 15;
        const NO_AUX_TRIGGER = 1 << 16;
        const FAKE_NO_DATA_TRIG = 1 << 17;
        /// Module Start/End counts differ from the active module mask
        const MODULE_ACTIVE = 1 << 18;
        /// Chip frames found differ from the active chip mask
        const CHIP_ACTIVE = 1 << 19;
        const SENDALL_TYPE = 1 << 20;
        const NOTSENDALL_TYPE = 1 << 21;
        const CHIP_DOUBLE_HEADER = 1 << 22;
        const HEADER_ERR = 1 << 23;
        const HEADER_ERR_GHOST = 1 << 24;
        const SUSP_PADDING = 1 << 25;
        const CONTROLLER_WORD_COUNT = 1 << 26;
        const MODULE_WORD_COUNT = 1 << 27;
        const ROW_OVERFLOW = 1 << 28;
        const CHIP_NOT_CONT = 1 << 29;
        const CHIP_CHIP_FRAME_DIFFER = 1 << 30;
        const CHIP_MODULE_FRAME_DIFFER = 1 << 31;
        const MODULE_ID_INVALID = 1 << 32;
        const CONTROLLER_ID_START_END_MM = 1 << 33;
        const MODULE_END_WITHOUT_START = 1 << 34;
        const CONTROLLER_END_DOUBLE = 1 << 35;
        const META_MM_CONTROLLER = 1 << 36;
        const META_MM_MODULE = 1 << 37;
        const COL_OVERFLOW = 1 << 38;
        const UNEXPECTED_FRAME_TYPE = 1 << 39;
        /// Experiment, run or subrun differ in the Controller Start
        const META_MM_CONTROLLER_ERS = 1 << 40;
        /// Time tag differs in the Controller Start
        const META_MM_CONTROLLER_TT = 1 << 41;
        const META_MM_TRIGGER_MAIN = 1 << 42;
        const META_MM_TRIGGER_AUX = 1 << 43;
        const EVT_TRG_GATE_DIFFER = 1 << 44;
        const EVT_TRG_FRM_NR_DIFFER = 1 << 45;
        const ROW_WITHOUT_PIX = 1 << 46;
        const MODULE_START_MISS = 1 << 47;
        const FAKE_NO_FAKE_DATA = 1 << 48;
        const MAGIC = 1 << 49;
        const FRAME_NR = 1 << 50;
        const FRAME_SIZE = 1 << 51;
        const PACKET_SIZE = 1 << 52;
        const CONTROLLER_START_SECOND = 1 << 53;
        const MODULE_WRONG_ID_SEQ = 1 << 54;
        const UNKNOWN_FRAME_TYPE = 1 << 55;
        const FIX_SIZE = 1 << 56;
        const FRAME_CRC = 1 << 57;
    }
}

impl DiagMask {
    /// Number of named taxonomy bits
    pub const BIT_COUNT: usize = 58;

    /// Names of the set bits, lowest bit first
    pub fn bit_names(&self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }

    /// Bit position of a single-bit mask
    pub fn bit_index(&self) -> Option<u32> {
        if self.bits().count_ones() == 1 {
            Some(self.bits().trailing_zeros())
        } else {
            None
        }
    }
}

impl fmt::Display for DiagMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(none)");
        }
        let mut parts: Vec<String> = self.bit_names().into_iter().map(String::from).collect();
        let unknown = self.bits() & !Self::all().bits();
        if unknown != 0 {
            parts.push(format!("{:#x}", unknown));
        }
        write!(f, "{}", parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_count() {
        assert_eq!(DiagMask::all().iter_names().count(), DiagMask::BIT_COUNT);
        assert_eq!(DiagMask::all().bits(), (1u64 << DiagMask::BIT_COUNT) - 1);
    }

    #[test]
    fn test_bit_positions_fixed() {
        assert_eq!(DiagMask::FRAME_TNR_MM.bit_index(), Some(0));
        assert_eq!(DiagMask::SUSP_PADDING.bit_index(), Some(25));
        assert_eq!(DiagMask::FRAME_CRC.bit_index(), Some(57));
        assert_eq!((DiagMask::MAGIC | DiagMask::FRAME_NR).bit_index(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(DiagMask::empty().to_string(), "(none)");
        assert_eq!(
            (DiagMask::MAGIC | DiagMask::FRAME_TNR_MM).to_string(),
            "FRAME_TNR_MM | MAGIC"
        );
    }

    #[test]
    fn test_unknown_bits_retained() {
        let mask = DiagMask::from_bits_retain(1 << 63 | 1);
        assert!(mask.contains(DiagMask::FRAME_TNR_MM));
        assert_eq!(mask.bit_names(), vec!["FRAME_TNR_MM"]);
        assert_eq!(mask.to_string(), "FRAME_TNR_MM | 0x8000000000000000");
    }
}
