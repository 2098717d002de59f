//! Integration tests for packet assembly
//!
//! Packets are built for the canonical fault matrix and decoded again
//! through the typed frame views, checking the structural consequence of
//! each scenario family.

use std::collections::BTreeMap;

use faultgen_packer::{
    ControllerPacket, EventMeta, FaultMatrix, HitSource, PacketBuilder, PixelMap, ReadoutMap,
    RunInfo, ScenarioId, SyntheticHits,
};
use faultgen_protocol::frame::{
    chip_header_word, ChipFrame, ControllerEnd, ControllerStart, Hit, ModuleEnd, ModuleStart,
    TriggerFrame, CHIPS_PER_MODULE, CHIP_COLUMNS, GHOST_FRAME_SIZE,
};
use faultgen_protocol::{FrameType, HeaderWord, Packet, ProtocolError};

fn readout() -> ReadoutMap {
    let mut mapping = BTreeMap::new();
    mapping.insert(0, vec![0x02, 0x03, 0x04, 0x05, -1]);
    mapping.insert(1, vec![0x22, 0x23, 0x24, -1, -1]);
    ReadoutMap::new(&mapping).unwrap()
}

fn meta(event: u32) -> EventMeta {
    RunInfo::default().event(event)
}

fn build_with<H: HitSource>(
    readout: ReadoutMap,
    matrix: FaultMatrix,
    hits: H,
    event: u32,
) -> Vec<ControllerPacket> {
    PacketBuilder::new(readout, matrix, hits)
        .build_event(&meta(event))
        .unwrap()
}

fn build(matrix: FaultMatrix, event: u32) -> Vec<ControllerPacket> {
    build_with(readout(), matrix, SyntheticHits, event)
}

/// Packet of controller 0 for a canonical event
fn canonical_packet(scenario: ScenarioId) -> Packet {
    build(FaultMatrix::canonical(), scenario.id())
        .into_iter()
        .next()
        .unwrap()
        .packet
}

fn frame(packet: &Packet, index: usize) -> &[u8] {
    packet.frame(index).unwrap()
}

/// (Module Start index, Module End index) of each module group
fn module_groups(packet: &Packet) -> Vec<(usize, usize)> {
    let types = packet.frame_types();
    let mut groups = Vec::new();
    for (start, frame_type) in types.iter().enumerate() {
        if *frame_type != FrameType::ModuleStart {
            continue;
        }
        if let Some(offset) = types[start..]
            .iter()
            .position(|t| *t == FrameType::ModuleEnd)
        {
            groups.push((start, start + offset));
        }
    }
    groups
}

fn declared_bytes(packet: &Packet, start: usize, end: usize) -> u64 {
    packet.header_index()[start..end]
        .iter()
        .map(|&len| len as u64)
        .sum()
}

fn expected_hits(event: u32, module_id: u8) -> Vec<Hit> {
    let mut map = PixelMap::new();
    SyntheticHits.fill(&meta(event), module_id, &mut map);
    let mut hits: Vec<Hit> = (0..CHIPS_PER_MODULE)
        .flat_map(|chip| {
            map.chip_hits(chip)
                .into_iter()
                .map(move |(row, column, adc)| Hit {
                    row,
                    column: chip as u16 * CHIP_COLUMNS + column as u16,
                    adc,
                })
        })
        .collect();
    hits.sort();
    hits
}

fn decoded_hits(packet: &Packet, start: usize, end: usize) -> Vec<Hit> {
    let mut hits: Vec<Hit> = (start + 1..end)
        .filter(|&i| packet.frame_type(i) == Some(FrameType::ChipData))
        .flat_map(|i| ChipFrame::parse(frame(packet, i)).unwrap().hits())
        .collect();
    hits.sort();
    hits
}

#[test]
fn test_baseline_identifiers() {
    let meta = meta(0);
    let packets = build(FaultMatrix::canonical(), 0);
    assert_eq!(packets.len(), 2);

    for (controller_packet, unit) in packets.iter().zip(readout().controllers()) {
        let packet = &controller_packet.packet;
        assert_eq!(controller_packet.controller, unit.id);
        assert!(packet.is_consistent());

        let types = packet.frame_types();
        assert_eq!(types[0], FrameType::Trigger);
        assert_eq!(types[1], FrameType::ControllerStart);
        assert_eq!(types.last(), Some(&FrameType::ControllerEnd));

        let trigger = TriggerFrame::parse(frame(packet, 0)).unwrap();
        assert!(TriggerFrame::magic_valid(trigger.main_magic));
        assert!(TriggerFrame::magic_valid(trigger.aux_magic));
        assert!(trigger.send_unfiltered());
        assert!(!trigger.aux_absent());
        assert_eq!(trigger.main_trigger, 0);
        assert_eq!(trigger.main_run_tag(), meta.run_tag());
        assert_eq!(trigger.aux_run_tag(), meta.run_tag());

        let start = ControllerStart::parse(frame(packet, 1)).unwrap();
        assert!(!start.is_fake());
        assert_eq!(start.controller_id(), unit.id);
        assert_eq!(start.module_mask(), unit.active_mask());
        assert_eq!(start.trigger(), 0);
        assert_eq!(start.run_tag(), meta.run_tag());
        assert_eq!(start.time_tag(), meta.time_tag());

        let end = ControllerEnd::parse(frame(packet, types.len() - 1)).unwrap();
        assert_eq!(end.controller_id(), unit.id);
        assert_eq!(end.error_flags, 0);

        assert_eq!(module_groups(packet).len(), unit.active_modules().len());
    }
}

#[test]
fn test_wire_round_trip_keeps_frames() {
    for event in [0, 3, 9] {
        for controller_packet in build(FaultMatrix::new(), event) {
            let packet = controller_packet.packet;
            let parsed = Packet::from_bytes(&packet.to_bytes()).unwrap();
            assert_eq!(parsed.frames(), packet.frames());
            assert_eq!(parsed.header_index(), packet.header_index());
        }
    }
}

#[test]
fn test_byte_accounting() {
    for event in 0..24 {
        for controller_packet in build(FaultMatrix::new(), event) {
            let packet = controller_packet.packet;
            let start = packet.position(FrameType::ControllerStart).unwrap();
            let end = packet.position(FrameType::ControllerEnd).unwrap();
            let controller_end = ControllerEnd::parse(frame(&packet, end)).unwrap();
            assert_eq!(controller_end.byte_count(), declared_bytes(&packet, start, end));

            for (module_start, module_end) in module_groups(&packet) {
                let view = ModuleEnd::parse(frame(&packet, module_end)).unwrap();
                assert_eq!(
                    view.byte_count(),
                    declared_bytes(&packet, module_start, module_end)
                );
            }
        }
    }
}

#[test]
fn test_every_frame_aligned_and_checksummed() {
    for event in 0..24 {
        for controller_packet in build(FaultMatrix::new(), event) {
            let packet = controller_packet.packet;
            for index in 0..packet.frame_count() {
                assert!(packet.verify_crc(index));
                assert_eq!(frame(&packet, index).len() % 4, 0);
            }
        }
    }
}

#[test]
fn test_one_ghost_per_module() {
    for event in 0..16 {
        for controller_packet in build(FaultMatrix::new(), event) {
            let packet = controller_packet.packet;
            for (start, end) in module_groups(&packet) {
                let ghosts: Vec<usize> = (start + 1..end)
                    .filter(|&i| packet.frame_type(i) == Some(FrameType::Ghost))
                    .collect();
                assert_eq!(ghosts.len(), 1);
                let ghost = frame(&packet, ghosts[0]);
                assert_eq!(ghost.len(), GHOST_FRAME_SIZE);
                assert!(HeaderWord::read(ghost).unwrap().error_flag());
                assert_eq!(end - start - 1, CHIPS_PER_MODULE as usize);
            }
        }
    }
}

#[test]
fn test_hits_recovered() {
    for invert in [false, true] {
        let readout = readout().with_invert_mapping(invert);
        for event in [0, 5, 13] {
            let packets = build_with(readout.clone(), FaultMatrix::new(), SyntheticHits, event);
            for (controller_packet, unit) in packets.iter().zip(readout.controllers()) {
                let packet = &controller_packet.packet;
                let groups = module_groups(packet);
                let modules = unit.active_modules();
                for ((start, end), (_, module_id)) in groups.into_iter().zip(modules) {
                    assert_eq!(
                        decoded_hits(packet, start, end),
                        expected_hits(event, module_id),
                        "event {} module {:#04x} invert {}",
                        event,
                        module_id,
                        invert
                    );
                }
            }
        }
    }
}

#[test]
fn test_reformat_flag_follows_mapping() {
    let packets = build_with(
        readout().with_invert_mapping(true),
        FaultMatrix::new(),
        SyntheticHits,
        2,
    );
    let packet = &packets[0].packet;
    let index = packet.position(FrameType::ChipData).unwrap();
    assert!(!HeaderWord::read(frame(packet, index)).unwrap().reformat());
}

#[test]
fn test_closure_hit_source_makes_all_ghosts() {
    let empty = |_: &EventMeta, _: u8, _: &mut PixelMap| {};
    let packets = build_with(readout(), FaultMatrix::new(), empty, 1);
    let packet = &packets[0].packet;
    for (start, end) in module_groups(packet) {
        assert!((start + 1..end).all(|i| packet.frame_type(i) == Some(FrameType::Ghost)));
    }
}

#[test]
fn test_no_packet() {
    assert!(build(FaultMatrix::canonical(), ScenarioId::NoPacket.id()).is_empty());
}

#[test]
fn test_trigger_frame_scenarios() {
    let missing = canonical_packet(ScenarioId::TriggerFrameMissing);
    assert_eq!(missing.frame_type(0), Some(FrameType::ControllerStart));

    let doubled = canonical_packet(ScenarioId::TriggerFrameDoubled);
    assert_eq!(doubled.frame_type(0), Some(FrameType::Trigger));
    assert_eq!(doubled.frame_type(1), Some(FrameType::Trigger));

    let only = canonical_packet(ScenarioId::OnlyTriggerFrame);
    assert_eq!(only.frame_types(), vec![FrameType::Trigger]);

    let roi = canonical_packet(ScenarioId::RoiFrameInvalidSize);
    assert_eq!(roi.frame_type(1), Some(FrameType::RegionOfInterest));
    assert_eq!(frame(&roi, 1).len(), 16);
}

#[test]
fn test_trigger_record_scenarios() {
    let parse = |scenario: ScenarioId| {
        TriggerFrame::parse(frame(&canonical_packet(scenario), 0)).unwrap()
    };

    assert!(!TriggerFrame::magic_valid(parse(ScenarioId::TriggerMagicMain).main_magic));
    assert!(!TriggerFrame::magic_valid(parse(ScenarioId::TriggerMagicAux).aux_magic));
    assert_eq!(parse(ScenarioId::TriggerNumberMain).main_trigger, 3);
    assert_eq!(parse(ScenarioId::TriggerNumberAux).aux_trigger, 15);
    assert_eq!(parse(ScenarioId::TriggerTagMain).main_run_tag().run, 2);
    assert_eq!(parse(ScenarioId::TriggerTagAux).aux_run_tag().subrun, 1);
    assert!(parse(ScenarioId::AuxTriggerAbsent).aux_absent());
    assert!(!parse(ScenarioId::TriggerNotUnfiltered).send_unfiltered());
    assert_eq!(parse(ScenarioId::TriggerFrameTriggerLow).header.trigger_lo(), 11);
}

#[test]
fn test_container_scenarios() {
    let magic = canonical_packet(ScenarioId::PacketMagic).to_bytes();
    assert_eq!(&magic[..4], &[0xCA, 0xFE, 0xDE, 0xAD]);
    assert_eq!(
        Packet::from_bytes(&magic),
        Err(ProtocolError::InvalidMagic(0xCAFE_DEAD))
    );

    let count = canonical_packet(ScenarioId::PacketFrameCount).to_bytes();
    assert!(matches!(
        Packet::from_bytes(&count),
        Err(ProtocolError::TooManyFrames { count: 257, .. })
    ));

    let zero = canonical_packet(ScenarioId::FrameLengthZero);
    assert_eq!(zero.header_index()[1], 0);
    assert!(Packet::from_bytes(&zero.to_bytes()).is_err());

    let overrun = canonical_packet(ScenarioId::FrameLengthOverrun);
    assert!(Packet::from_bytes(&overrun.to_bytes()).is_err());

    let truncated = canonical_packet(ScenarioId::PacketTruncated).to_bytes();
    assert_eq!(truncated.len(), 4);
}

#[test]
fn test_crc_fault_isolated_to_controller_start() {
    let packet = canonical_packet(ScenarioId::FrameCrc);
    let start = packet.position(FrameType::ControllerStart).unwrap();
    for index in 0..packet.frame_count() {
        assert_eq!(packet.verify_crc(index), index != start);
    }
}

#[test]
fn test_missing_controller_end_drops_one_frame() {
    let event = ScenarioId::ControllerEndMissing.id();
    let baseline = build(FaultMatrix::new(), event);
    let faulted = build(FaultMatrix::canonical(), event);
    for (clean, broken) in baseline.iter().zip(&faulted) {
        assert_eq!(broken.packet.frame_count() + 1, clean.packet.frame_count());
        assert!(broken.packet.position(FrameType::ControllerEnd).is_none());
    }
    assert!(ScenarioId::ControllerEndMissing
        .expected()
        .contains(faultgen_protocol::DiagMask::CONTROLLER_END_MISS));
}

#[test]
fn test_controller_frame_scenarios() {
    let doubled = canonical_packet(ScenarioId::ControllerEndDoubled);
    let types = doubled.frame_types();
    assert_eq!(&types[types.len() - 2..], &[FrameType::ControllerEnd; 2]);

    let oversize = canonical_packet(ScenarioId::ControllerStartOversize);
    assert_eq!(frame(&oversize, 1).len(), 24);

    let flagged = canonical_packet(ScenarioId::ControllerErrorFlag);
    assert!(HeaderWord::read(frame(&flagged, 1)).unwrap().error_flag());

    let mismatch = canonical_packet(ScenarioId::ControllerIdEndMismatch);
    let end = ControllerEnd::parse(frame(&mismatch, mismatch.frame_count() - 1)).unwrap();
    assert_eq!(end.controller_id(), 1);

    let none = canonical_packet(ScenarioId::NoControllerFrames);
    assert!(none.position(FrameType::ControllerStart).is_none());
    assert!(none.position(FrameType::ControllerEnd).is_none());
    assert_eq!(none.frame_type(1), Some(FrameType::ModuleStart));
}

#[test]
fn test_active_mask_perturbed() {
    let packets = build(
        FaultMatrix::canonical(),
        ScenarioId::ControllerActiveMask.id(),
    );
    let masks: Vec<u8> = packets
        .iter()
        .map(|p| ControllerStart::parse(frame(&p.packet, 1)).unwrap().module_mask())
        .collect();
    assert_eq!(masks, vec![0b11111, 0b01111]);
}

#[test]
fn test_fake_controller_frames() {
    let fake = canonical_packet(ScenarioId::FakeControllerFrames);
    assert_eq!(
        fake.frame_types(),
        vec![
            FrameType::Trigger,
            FrameType::ControllerStart,
            FrameType::ControllerEnd
        ]
    );
    assert!(ControllerStart::parse(frame(&fake, 1)).unwrap().is_fake());

    let mixed = canonical_packet(ScenarioId::FakeStartRealEnd);
    assert!(ControllerStart::parse(frame(&mixed, 1)).unwrap().is_fake());
    let end = ControllerEnd::parse(frame(&mixed, 2)).unwrap();
    assert_eq!(end.controller_id(), 0);
}

#[test]
fn test_module_frame_scenarios() {
    let invalid = canonical_packet(ScenarioId::ModuleIdInvalid);
    let (start, end) = module_groups(&invalid)[0];
    assert_eq!(ModuleStart::parse(frame(&invalid, start)).unwrap().module_id(), 0x3F);
    assert_eq!(ModuleEnd::parse(frame(&invalid, end)).unwrap().module_id(), 0x3F);

    let mask = canonical_packet(ScenarioId::ModuleActiveMask);
    let (start, _) = module_groups(&mask)[0];
    assert_eq!(ModuleStart::parse(frame(&mask, start)).unwrap().chip_mask(), 0b0111);

    let oversize = canonical_packet(ScenarioId::ModuleStartOversize);
    let (start, _) = module_groups(&oversize)[0];
    assert_eq!(frame(&oversize, start).len(), 20);

    let gate = canonical_packet(ScenarioId::ModuleGateDiffer);
    let groups = module_groups(&gate);
    let first = ModuleStart::parse(frame(&gate, groups[0].0)).unwrap();
    let second = ModuleStart::parse(frame(&gate, groups[1].0)).unwrap();
    assert_eq!(first.gate(), 50);
    assert_eq!(second.gate(), 51);
    assert_eq!(first.frame_nr(), second.frame_nr());

    let repeated = canonical_packet(ScenarioId::ModuleGroupRepeated);
    let groups = module_groups(&repeated);
    assert_eq!(groups.len(), 5);
    assert_eq!(
        frame(&repeated, groups[0].0),
        frame(&repeated, groups[1].0)
    );
}

#[test]
fn test_filler_frames() {
    let unknown = canonical_packet(ScenarioId::UnknownFrameType);
    assert!(unknown.position(FrameType::Unused7).is_some());

    let unexpected = canonical_packet(ScenarioId::UnexpectedFrameType);
    let index = unexpected.position(FrameType::ClusterRaw).unwrap();
    let (_, end) = module_groups(&unexpected)[0];
    assert_eq!(index + 1, end);
}

#[test]
fn test_chip_frame_scenarios() {
    let ghost = canonical_packet(ScenarioId::GhostWithoutErrorFlag);
    let (start, _) = module_groups(&ghost)[0];
    let header = HeaderWord::read(frame(&ghost, start + 1)).unwrap();
    assert_eq!(header.frame_type(), FrameType::Ghost);
    assert!(!header.error_flag());

    let small = canonical_packet(ScenarioId::ChipFrameTooSmall);
    let (start, _) = module_groups(&small)[0];
    assert_eq!(frame(&small, start + 1).len(), 8);
    assert_eq!(small.frame_type(start + 1), Some(FrameType::ChipData));

    let double = canonical_packet(ScenarioId::ChipDoubleHeader);
    let (start, _) = module_groups(&double)[0];
    let chip = frame(&double, start + 1);
    assert_eq!(&chip[8..12], &chip_header_word(0x02, 0, 63).to_be_bytes());

    let spread = canonical_packet(ScenarioId::ChipFrameNrSpread);
    let (start, _) = module_groups(&spread)[0];
    let nr = |i: usize| ChipFrame::parse(frame(&spread, i)).unwrap().chip_frame_nr();
    assert_eq!(nr(start + 1), 67);
    assert_eq!(nr(start + 2), 69);

    let send_all = canonical_packet(ScenarioId::SendAllType);
    let (start, _) = module_groups(&send_all)[0];
    assert_eq!(send_all.frame_type(start + 1), Some(FrameType::MergerChipData));

    let port = canonical_packet(ScenarioId::ChipHeaderPort);
    let (start, _) = module_groups(&port)[0];
    let view = ChipFrame::parse(frame(&port, start + 1)).unwrap();
    assert_eq!(view.header.chip_id(), 0);
    assert_eq!(view.chip_port(), 1);

    let missing = canonical_packet(ScenarioId::ChipFrameMissing);
    let (start, end) = module_groups(&missing)[0];
    assert_eq!(end - start - 1, CHIPS_PER_MODULE as usize - 1);
}

#[test]
fn test_misaligned_chip_frame_is_padded_on_wire() {
    let packet = canonical_packet(ScenarioId::ChipFrameMisaligned);
    let (start, _) = module_groups(&packet)[0];
    assert_ne!(frame(&packet, start + 1).len() % 4, 0);
    assert!(packet.verify_crc(start + 1));
    assert_eq!(packet.to_bytes().len() % 4, 0);
}

#[test]
fn test_truncated_chip_frame_breaks_accounting() {
    let packet = canonical_packet(ScenarioId::ChipFrameTruncated);
    let (start, end) = module_groups(&packet)[0];
    let module_end = ModuleEnd::parse(frame(&packet, end)).unwrap();
    assert_eq!(module_end.byte_count(), declared_bytes(&packet, start, end) + 4);

    let controller_start = packet.position(FrameType::ControllerStart).unwrap();
    let controller_end = packet.position(FrameType::ControllerEnd).unwrap();
    let view = ControllerEnd::parse(frame(&packet, controller_end)).unwrap();
    assert_eq!(
        view.byte_count(),
        declared_bytes(&packet, controller_start, controller_end) + 4
    );
}

#[test]
fn test_overflow_hits_emitted() {
    let rows = canonical_packet(ScenarioId::RowOverflow);
    let (start, end) = module_groups(&rows)[0];
    assert!(decoded_hits(&rows, start, end).iter().any(|hit| hit.row == 800));

    let columns = canonical_packet(ScenarioId::ColumnOverflow);
    let (start, end) = module_groups(&columns)[0];
    assert!(decoded_hits(&columns, start, end)
        .iter()
        .any(|hit| hit.column == 252));
}

#[test]
fn test_composed_faults() {
    let matrix = FaultMatrix::new()
        .with_scenarios(
            100,
            [ScenarioId::PacketMagic, ScenarioId::ControllerEndMissing],
        )
        .unwrap();
    let packets = build(matrix, 100);
    for controller_packet in packets {
        let packet = controller_packet.packet;
        assert_eq!(packet.magic(), 0xCAFE_DEAD);
        assert!(packet.position(FrameType::ControllerEnd).is_none());
    }
}

/// One module per controller, ids whose chip 0 is empty in event 58
fn sparse_readout() -> ReadoutMap {
    let mut mapping = BTreeMap::new();
    mapping.insert(0, vec![0x05, -1, -1, -1, -1]);
    mapping.insert(1, vec![0x0D, -1, -1, -1, -1]);
    ReadoutMap::new(&mapping).unwrap()
}

fn wire_bytes(packets: Vec<ControllerPacket>) -> Vec<Vec<u8>> {
    packets.into_iter().map(|p| p.packet.to_bytes()).collect()
}

#[test]
fn test_every_scenario_changes_its_event() {
    for readout in [readout(), sparse_readout()] {
        for &scenario in ScenarioId::ALL {
            let event = scenario.id();
            let faulted =
                build_with(readout.clone(), FaultMatrix::canonical(), SyntheticHits, event);
            let clean = build_with(readout.clone(), FaultMatrix::new(), SyntheticHits, event);
            assert_ne!(
                wire_bytes(faulted),
                wire_bytes(clean),
                "{} left event {} unchanged on {:?}",
                scenario,
                event,
                readout.controllers()
            );
        }
    }
}

#[test]
fn test_chip_frame_module_id_on_empty_chip() {
    let mut mapping = BTreeMap::new();
    mapping.insert(0, vec![0x05, 0x06]);
    let readout = ReadoutMap::new(&mapping).unwrap();
    let event = ScenarioId::ChipFrameModuleId.id();

    let clean = build_with(readout.clone(), FaultMatrix::new(), SyntheticHits, event);
    let (start, _) = module_groups(&clean[0].packet)[0];
    assert_eq!(clean[0].packet.frame_type(start + 1), Some(FrameType::Ghost));

    let faulted = build_with(readout, FaultMatrix::canonical(), SyntheticHits, event);
    let packet = &faulted[0].packet;
    let (start, _) = module_groups(packet)[0];
    assert_eq!(packet.frame_type(start + 1), Some(FrameType::ChipData));
    let header = HeaderWord::read(frame(packet, start + 1)).unwrap();
    assert_eq!(header.module_id(), 0x06);
    assert_eq!(ModuleStart::parse(frame(packet, start)).unwrap().module_id(), 0x05);
}

#[test]
fn test_cross_module_faults_span_controllers() {
    let gate_event = ScenarioId::ModuleGateDiffer.id();
    let clean = build_with(sparse_readout(), FaultMatrix::new(), SyntheticHits, gate_event);
    let faulted = build_with(
        sparse_readout(),
        FaultMatrix::canonical(),
        SyntheticHits,
        gate_event,
    );
    let module_start = |packets: &Vec<ControllerPacket>, controller: usize| {
        let packet = &packets[controller].packet;
        let (start, _) = module_groups(packet)[0];
        ModuleStart::parse(frame(packet, start)).unwrap()
    };
    assert_eq!(module_start(&faulted, 0), module_start(&clean, 0));
    assert_eq!(module_start(&faulted, 1).gate(), module_start(&clean, 1).gate() + 1);

    let nr_event = ScenarioId::ModuleFrameNrDiffer.id();
    let clean = build_with(sparse_readout(), FaultMatrix::new(), SyntheticHits, nr_event);
    let faulted = build_with(
        sparse_readout(),
        FaultMatrix::canonical(),
        SyntheticHits,
        nr_event,
    );
    assert_eq!(module_start(&faulted, 0), module_start(&clean, 0));
    assert_eq!(
        module_start(&faulted, 1).frame_nr(),
        module_start(&clean, 1).frame_nr() + 1
    );
}

#[test]
fn test_cross_module_faults_need_two_modules() {
    let mut mapping = BTreeMap::new();
    mapping.insert(0, vec![0x02]);
    let readout = ReadoutMap::new(&mapping).unwrap();
    assert_eq!(readout.module_count(), 1);

    let event = ScenarioId::ModuleGateDiffer.id();
    let faulted = build_with(readout.clone(), FaultMatrix::canonical(), SyntheticHits, event);
    let clean = build_with(readout, FaultMatrix::new(), SyntheticHits, event);
    assert_eq!(wire_bytes(faulted), wire_bytes(clean));
}
