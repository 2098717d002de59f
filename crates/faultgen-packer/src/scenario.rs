//! Fault scenarios and the event-indexed fault matrix
//!
//! Each scenario names exactly one deviation from the nominal encoding and
//! the diagnostic bits a correct decoder must raise for it. The canonical
//! matrix binds scenario n to event n; further scenarios can be stacked on
//! an event to compose faults.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use faultgen_protocol::DiagMask;
use serde::{Deserialize, Serialize};

use crate::error::SetupError;

macro_rules! scenarios {
    ($(
        $variant:ident = $id:literal, $name:literal, [$($bit:ident),+], $description:literal;
    )+) => {
        /// Named fault scenario; the discriminant is its canonical event number
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u32)]
        pub enum ScenarioId {
            $(
                #[serde(rename = $name)]
                $variant = $id,
            )+
        }

        impl ScenarioId {
            pub const ALL: &'static [ScenarioId] = &[$(ScenarioId::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(ScenarioId::$variant => $name,)+
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $(ScenarioId::$variant => $description,)+
                }
            }

            /// Minimal mask a correct decoder must report
            pub fn expected(self) -> DiagMask {
                match self {
                    $(ScenarioId::$variant => DiagMask::empty()$(.union(DiagMask::$bit))+,)+
                }
            }
        }
    };
}

scenarios! {
    TriggerMagicMain = 1, "trigger_magic_main", [TRIGGER_MAGIC], "Main trigger sub-record carries a bad magic";
    TriggerNumberMain = 2, "trigger_number_main", [META_MM_TRIGGER_MAIN, MERGER_TRIGNR], "Main trigger number off by one";
    TriggerTagMain = 3, "trigger_tag_main", [META_MM_TRIGGER_MAIN], "Main trigger run number off by one";
    TriggerMagicAux = 4, "trigger_magic_aux", [TRIGGER_MAGIC], "Auxiliary trigger sub-record carries a bad magic";
    TriggerNumberAux = 5, "trigger_number_aux", [META_MM_TRIGGER_AUX, MERGER_TRIGNR], "Auxiliary trigger number off by ten";
    TriggerTagAux = 6, "trigger_tag_aux", [META_MM_TRIGGER_AUX], "Auxiliary trigger subrun off by one";
    AuxTriggerAbsent = 7, "aux_trigger_absent", [NO_AUX_TRIGGER], "Auxiliary trigger sub-record zeroed";
    TriggerFrameMissing = 8, "trigger_frame_missing", [TRIGGER_FIRST, CONTROLLER_START_SECOND], "Trigger frame not emitted";
    TriggerFrameDoubled = 9, "trigger_frame_doubled", [TRIGGER_FIRST, CONTROLLER_START_SECOND], "Trigger frame emitted twice";
    TriggerFrameTriggerLow = 10, "trigger_frame_trigger_low", [META_MM, FRAME_TNR_MM], "Trigger frame header trigger number off by one";
    TriggerNotUnfiltered = 11, "trigger_not_unfiltered", [NOTSENDALL_TYPE], "Send-unfiltered flag cleared while chip data stays unfiltered";
    RoiFrameInvalidSize = 12, "roi_frame_invalid_size", [ROI_PACKET_INV_SIZE, CONTROLLER_START_SECOND], "Region-of-interest frame with a fractional record";
    PacketMagic = 13, "packet_magic", [MAGIC], "Packet magic corrupted";
    PacketFrameCount = 14, "packet_frame_count", [FRAME_NR], "Packet frame count above the decoder limit";
    FrameLengthZero = 15, "frame_length_zero", [FRAME_SIZE], "Length table entry of the second frame is zero";
    FrameLengthOverrun = 16, "frame_length_overrun", [FRAME_SIZE], "Last frame length runs past the packet";
    PacketTruncated = 17, "packet_truncated", [PACKET_SIZE], "Packet cut to four bytes";
    NoPacket = 18, "no_packet", [NO_PACKET], "No packet emitted for the event";
    OnlyTriggerFrame = 19, "only_trigger_frame", [NR_FRAMES_TOO_SMALL, CONTROLLER_END_MISS], "Packet ends after the trigger frame";
    FrameCrc = 20, "frame_crc", [FRAME_CRC], "Controller Start CRC corrupted";
    ControllerStartMissing = 21, "controller_start_missing", [CONTROLLER_START_SECOND, CONTROLLER_ID_START_END_MM], "Controller Start not emitted";
    ControllerEndMissing = 22, "controller_end_missing", [CONTROLLER_END_MISS], "Controller End not emitted";
    ControllerStartDoubled = 23, "controller_start_doubled", [CONTROLLER_START_SECOND], "Controller Start emitted twice";
    ControllerEndDoubled = 24, "controller_end_doubled", [CONTROLLER_END_DOUBLE], "Controller End emitted twice";
    NoControllerFrames = 25, "no_controller_frames", [CONTROLLER_START_SECOND, CONTROLLER_END_MISS], "Neither Controller Start nor End emitted";
    ControllerIdEndMismatch = 26, "controller_id_end_mismatch", [CONTROLLER_ID_START_END_MM], "Controller End carries another controller id";
    ControllerWordCount = 27, "controller_word_count", [CONTROLLER_WORD_COUNT], "Controller End word count off by one";
    ControllerTriggerHigh = 28, "controller_trigger_high", [META_MM_CONTROLLER], "Controller Start trigger high bits off by one";
    ControllerRunTag = 29, "controller_run_tag", [META_MM_CONTROLLER_ERS], "Controller Start run/subrun word off by one";
    ControllerTimeTag = 30, "controller_time_tag", [META_MM_CONTROLLER_TT], "Controller Start time tag off by one tick";
    ControllerStartTriggerLow = 31, "controller_start_trigger_low", [META_MM, FRAME_TNR_MM, META_MM_CONTROLLER], "Controller Start header trigger number off by one";
    ControllerEndTriggerLow = 32, "controller_end_trigger_low", [META_MM, FRAME_TNR_MM], "Controller End header trigger number off by one";
    ControllerActiveMask = 33, "controller_active_mask", [MODULE_ACTIVE], "Active module mask disagrees with the modules sent";
    ControllerStartOversize = 34, "controller_start_oversize", [FIX_SIZE], "Controller Start carries an extra word";
    ControllerErrorFlag = 35, "controller_error_flag", [HEADER_ERR], "Controller Start error flag set";
    FakeControllerFrames = 36, "fake_controller_frames", [FAKE_NO_DATA_TRIG], "Fake Controller Start and End in place of data";
    FakeStartRealEnd = 37, "fake_start_real_end", [FAKE_NO_DATA_TRIG, FAKE_NO_FAKE_DATA], "Fake Controller Start closed by a real End";
    ModuleStartMissing = 38, "module_start_missing", [MODULE_END_WITHOUT_START, MODULE_START_MISS, MODULE_ACTIVE], "Module Start of the first module not emitted";
    ModuleEndMissing = 39, "module_end_missing", [MODULE_ACTIVE], "Module End of the first module not emitted";
    ModuleStartDoubled = 40, "module_start_doubled", [MODULE_START_WITHOUT_END, MODULE_WRONG_ID_SEQ, MODULE_ACTIVE], "Module Start of the first module emitted twice";
    ModuleEndDoubled = 41, "module_end_doubled", [MODULE_END_WITHOUT_START, MODULE_ACTIVE], "Module End of the first module emitted twice";
    ModuleGroupRepeated = 42, "module_group_repeated", [MODULE_WRONG_ID_SEQ, MODULE_ACTIVE], "First module group emitted twice";
    ModuleIdEndMismatch = 43, "module_id_end_mismatch", [MODULE_START_END_ID], "Module End carries another module id";
    ModuleWordCount = 44, "module_word_count", [MODULE_WORD_COUNT], "Module End word count off by one";
    ModuleTriggerHigh = 45, "module_trigger_high", [META_MM_MODULE], "Module Start trigger high bits off by one";
    ModuleStartTriggerLow = 46, "module_start_trigger_low", [META_MM, FRAME_TNR_MM, META_MM_MODULE], "Module Start header trigger number off by one";
    ModuleIdInvalid = 47, "module_id_invalid", [MODULE_ID_INVALID], "First module sent with an id naming no ladder";
    ModuleActiveMask = 48, "module_active_mask", [CHIP_ACTIVE], "Active chip mask omits a chip that is sent";
    ModuleStartOversize = 49, "module_start_oversize", [FIX_SIZE], "Module Start carries an extra word";
    ModuleGateDiffer = 50, "module_gate_differ", [EVT_TRG_GATE_DIFFER], "Second module reports another trigger gate";
    ModuleFrameNrDiffer = 51, "module_frame_nr_differ", [EVT_TRG_FRM_NR_DIFFER], "Second module reports another readout frame number";
    ChipFrameMissing = 52, "chip_frame_missing", [CHIP_ACTIVE], "Frame of chip 0 not emitted";
    UnknownFrameType = 53, "unknown_frame_type", [UNKNOWN_FRAME_TYPE], "Filler frame of an unused type inside the module";
    UnexpectedFrameType = 54, "unexpected_frame_type", [UNEXPECTED_FRAME_TYPE], "Raw cluster frame inside zero-suppressed readout";
    SendAllType = 55, "send_all_type", [SENDALL_TYPE], "Chip data typed as merger chip data in an unfiltered event";
    ChipHeaderModuleId = 56, "chip_header_module_id", [CHIP_MODULE_ID], "Chip header carries another module id";
    ChipHeaderPort = 57, "chip_header_port", [CHIP_PORT], "Chip header carries another chip id";
    ChipFrameModuleId = 58, "chip_frame_module_id", [MODULE_START_ID], "Chip frame header carries another module id";
    ChipFrameTooSmall = 59, "chip_frame_too_small", [CHIP_SIZE], "Chip data frame without chip header";
    PixelWithoutRow = 60, "pixel_without_row", [PIX_WITHOUT_ROW], "First hit sent without a row-start record";
    RowWithoutPixel = 61, "row_without_pixel", [ROW_WITHOUT_PIX], "Row-start record followed by another row start";
    ChipDoubleHeader = 62, "chip_double_header", [CHIP_DOUBLE_HEADER], "Chip header repeated with the next frame number";
    RowOverflow = 63, "row_overflow", [ROW_OVERFLOW], "Hit beyond the last module row";
    ColumnOverflow = 64, "column_overflow", [COL_OVERFLOW], "Hit beyond the last module column";
    ChipFrameNrRepeated = 65, "chip_frame_nr_repeated", [CHIP_NOT_CONT], "Second frame of chip 0 with the same frame number";
    ChipFrameNrOffset = 66, "chip_frame_nr_offset", [CHIP_MODULE_FRAME_DIFFER], "All chip frame numbers ahead of the module by four";
    ChipFrameNrSpread = 67, "chip_frame_nr_spread", [CHIP_CHIP_FRAME_DIFFER, CHIP_MODULE_FRAME_DIFFER], "Chip 1 frame number ahead by two";
    GhostWithoutErrorFlag = 68, "ghost_without_error_flag", [HEADER_ERR_GHOST], "Ghost frame of chip 0 without its error flag";
    ChipErrorFlag = 69, "chip_error_flag", [HEADER_ERR], "Chip data frame error flag set";
    ChipFrameMisaligned = 70, "chip_frame_misaligned", [CHIP_ACTIVE], "Chip data frame not 32-bit aligned";
    ChipFrameTruncated = 71, "chip_frame_truncated", [MODULE_WORD_COUNT, CONTROLLER_WORD_COUNT], "Chip data frame cut short after counting";
}

/// Readout level a scenario perturbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioFamily {
    Trigger,
    Packet,
    Controller,
    Module,
    Chip,
}

impl fmt::Display for ScenarioFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioFamily::Trigger => "trigger",
            ScenarioFamily::Packet => "packet",
            ScenarioFamily::Controller => "controller",
            ScenarioFamily::Module => "module",
            ScenarioFamily::Chip => "chip",
        };
        f.pad(name)
    }
}

impl ScenarioId {
    /// Canonical event number
    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|scenario| scenario.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|scenario| scenario.name() == name)
    }

    pub fn family(self) -> ScenarioFamily {
        match self.id() {
            1..=12 => ScenarioFamily::Trigger,
            13..=20 => ScenarioFamily::Packet,
            21..=37 => ScenarioFamily::Controller,
            38..=51 => ScenarioFamily::Module,
            _ => ScenarioFamily::Chip,
        }
    }

    /// Every chip of the target module needs at least one hit
    pub fn needs_hits(self) -> bool {
        matches!(
            self,
            ScenarioId::TriggerNotUnfiltered
                | ScenarioId::SendAllType
                | ScenarioId::ChipHeaderModuleId
                | ScenarioId::ChipHeaderPort
                | ScenarioId::ChipFrameModuleId
                | ScenarioId::PixelWithoutRow
                | ScenarioId::RowWithoutPixel
                | ScenarioId::ChipDoubleHeader
                | ScenarioId::ChipFrameNrRepeated
                | ScenarioId::ChipFrameNrOffset
                | ScenarioId::ChipFrameNrSpread
                | ScenarioId::ChipErrorFlag
                | ScenarioId::ChipFrameMisaligned
                | ScenarioId::ChipFrameTruncated
        )
    }

    /// Chip 0 of the target module must send a ghost frame
    pub fn needs_empty_chip(self) -> bool {
        self == ScenarioId::GhostWithoutErrorFlag
    }

    /// Acts on the second module of the event
    pub fn needs_second_module(self) -> bool {
        matches!(
            self,
            ScenarioId::ModuleGateDiffer | ScenarioId::ModuleFrameNrDiffer
        )
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown scenario: {}", s))
    }
}

/// Scenarios active for one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultSet(BTreeSet<ScenarioId>);

impl FaultSet {
    pub fn contains(&self, scenario: ScenarioId) -> bool {
        self.0.contains(&scenario)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ScenarioId> + '_ {
        self.0.iter().copied()
    }

    pub fn needs_hits(&self) -> bool {
        self.iter().any(ScenarioId::needs_hits)
    }

    pub fn needs_empty_chip(&self) -> bool {
        self.iter().any(ScenarioId::needs_empty_chip)
    }

    pub fn needs_second_module(&self) -> bool {
        self.iter().any(ScenarioId::needs_second_module)
    }

    /// Union of the expected masks
    pub fn expected(&self) -> DiagMask {
        self.iter()
            .fold(DiagMask::empty(), |mask, scenario| mask | scenario.expected())
    }
}

impl FromIterator<ScenarioId> for FaultSet {
    fn from_iter<I: IntoIterator<Item = ScenarioId>>(iter: I) -> Self {
        FaultSet(iter.into_iter().collect())
    }
}

/// Event number -> scenarios, read-only once the run starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultMatrix {
    table: BTreeMap<u32, FaultSet>,
}

impl FaultMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scenario n on event n, for every scenario
    pub fn canonical() -> Self {
        let table = ScenarioId::ALL
            .iter()
            .map(|&scenario| (scenario.id(), std::iter::once(scenario).collect()))
            .collect();
        FaultMatrix { table }
    }

    /// Add scenarios to an event
    pub fn with_scenarios<I>(mut self, event: u32, scenarios: I) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = ScenarioId>,
    {
        if event == 0 {
            return Err(SetupError::BaselineFault);
        }
        let entry = self.table.entry(event).or_default();
        entry.0.extend(scenarios);
        Ok(self)
    }

    pub fn is_active_for(&self, event: u32, scenario: ScenarioId) -> bool {
        self.table
            .get(&event)
            .map(|set| set.contains(scenario))
            .unwrap_or(false)
    }

    pub fn scenarios_for(&self, event: u32) -> FaultSet {
        self.table.get(&event).cloned().unwrap_or_default()
    }

    pub fn events(&self) -> impl Iterator<Item = u32> + '_ {
        self.table.keys().copied()
    }

    /// Highest event number carrying a scenario
    pub fn last_event(&self) -> u32 {
        self.table.keys().next_back().copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &FaultSet)> + '_ {
        self.table.iter().map(|(&event, set)| (event, set))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_contiguous() {
        for (index, scenario) in ScenarioId::ALL.iter().enumerate() {
            assert_eq!(scenario.id() as usize, index + 1);
            assert_eq!(ScenarioId::from_id(scenario.id()), Some(*scenario));
        }
        assert_eq!(ScenarioId::from_id(0), None);
    }

    #[test]
    fn test_names_unique_and_parse() {
        let names: BTreeSet<&str> = ScenarioId::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), ScenarioId::ALL.len());
        assert_eq!(
            "controller_end_missing".parse::<ScenarioId>(),
            Ok(ScenarioId::ControllerEndMissing)
        );
        assert!("no_such_fault".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_every_scenario_expects_bits() {
        for scenario in ScenarioId::ALL {
            assert!(!scenario.expected().is_empty(), "{}", scenario);
            assert!(!scenario.description().is_empty());
        }
    }

    #[test]
    fn test_missing_end_expectation() {
        assert!(ScenarioId::ControllerEndMissing
            .expected()
            .contains(DiagMask::CONTROLLER_END_MISS));
    }

    #[test]
    fn test_families() {
        assert_eq!(ScenarioId::RoiFrameInvalidSize.family(), ScenarioFamily::Trigger);
        assert_eq!(ScenarioId::FrameCrc.family(), ScenarioFamily::Packet);
        assert_eq!(ScenarioId::FakeStartRealEnd.family(), ScenarioFamily::Controller);
        assert_eq!(ScenarioId::ModuleFrameNrDiffer.family(), ScenarioFamily::Module);
        assert_eq!(ScenarioId::ChipFrameMissing.family(), ScenarioFamily::Chip);
    }

    #[test]
    fn test_chip_data_faults_force_hits() {
        assert!(ScenarioId::ChipFrameModuleId.needs_hits());
        assert!(ScenarioId::ChipHeaderModuleId.needs_hits());
        assert!(!ScenarioId::ChipFrameTooSmall.needs_hits());
        assert!(ScenarioId::GhostWithoutErrorFlag.needs_empty_chip());
    }

    #[test]
    fn test_cross_module_faults() {
        let cross: Vec<ScenarioId> = ScenarioId::ALL
            .iter()
            .copied()
            .filter(|scenario| scenario.needs_second_module())
            .collect();
        assert_eq!(
            cross,
            vec![ScenarioId::ModuleGateDiffer, ScenarioId::ModuleFrameNrDiffer]
        );
        let set: FaultSet = [ScenarioId::FrameCrc, ScenarioId::ModuleGateDiffer]
            .into_iter()
            .collect();
        assert!(set.needs_second_module());
    }

    #[test]
    fn test_canonical_matrix() {
        let matrix = FaultMatrix::canonical();
        assert_eq!(matrix.len(), ScenarioId::ALL.len());
        assert!(matrix.is_active_for(22, ScenarioId::ControllerEndMissing));
        assert!(!matrix.is_active_for(22, ScenarioId::ControllerStartMissing));
        assert!(matrix.scenarios_for(0).is_empty());
        assert!(matrix.scenarios_for(500).is_empty());
        assert_eq!(matrix.last_event(), 71);
    }

    #[test]
    fn test_composed_faults() {
        let matrix = FaultMatrix::canonical()
            .with_scenarios(100, [ScenarioId::PacketMagic, ScenarioId::FrameCrc])
            .unwrap();
        let set = matrix.scenarios_for(100);
        assert_eq!(set.len(), 2);
        assert_eq!(set.expected(), DiagMask::MAGIC | DiagMask::FRAME_CRC);
        assert_eq!(matrix.last_event(), 100);
    }

    #[test]
    fn test_baseline_rejected() {
        assert_eq!(
            FaultMatrix::new().with_scenarios(0, [ScenarioId::PacketMagic]),
            Err(SetupError::BaselineFault)
        );
    }

    #[test]
    fn test_serde_names_match() {
        for scenario in ScenarioId::ALL {
            let json = serde_json::to_string(scenario).unwrap();
            assert_eq!(json, format!("\"{}\"", scenario.name()));
        }
        let parsed: ScenarioId = serde_json::from_str("\"frame_crc\"").unwrap();
        assert_eq!(parsed, ScenarioId::FrameCrc);
    }
}
