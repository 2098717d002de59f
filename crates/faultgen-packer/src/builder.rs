//! Packet builder
//!
//! Walks the readout topology for one event and emits one packet per
//! controller: trigger frame, Controller Start, one Module Start / chip
//! frames / Module End group per active port, Controller End. Each active
//! scenario is applied at the point where the affected field or frame is
//! produced, so everything that follows stays nominal.

use faultgen_protocol::frame::{
    chip_header_word, raw_coordinates, ChipRecord, ModuleStart, RunTag, CHIPS_PER_MODULE,
    CHIP_COLUMNS, CHIP_HEADER_SIZE, GATES, PORTS_PER_CONTROLLER, TRIGGER_ACCEPTED, TRIGGER_MAGIC,
    TRIGGER_SEND_UNFILTERED,
};
use faultgen_protocol::frame::{FAKE_CONTROLLER_END, FAKE_CONTROLLER_START};
use faultgen_protocol::{FrameType, HeaderWord, Packet, MAX_FRAMES};
use tracing::{debug, info, warn};

use crate::context::EncodingContext;
use crate::error::Result;
use crate::event::EventMeta;
use crate::hits::{HitSource, PixelMap};
use crate::readout::{ControllerUnit, ReadoutMap};
use crate::scenario::{FaultMatrix, FaultSet, ScenarioId};

const MAIN_TRIGGER_MAGIC: u32 = TRIGGER_MAGIC | TRIGGER_ACCEPTED | TRIGGER_SEND_UNFILTERED;
const BAD_MAIN_TRIGGER_MAGIC: u32 = 0xDEAD_8000;
const BAD_AUX_TRIGGER_MAGIC: u32 = 0xDEAD_0000;
const BAD_PACKET_MAGIC: u32 = 0xCAFE_DEAD;

/// Layer 2, ladder 15
const INVALID_MODULE_ID: u8 = 0x3F;

const MARKER_ROW: u16 = 100;
const MARKER_ADC: u8 = 0x7F;

/// Beyond the last module row, inside the row-start range
const OVERFLOW_ROW: u16 = 800;
/// Beyond the last module column, inside chip 3
const OVERFLOW_COLUMN: u16 = 252;

/// Packet of one controller for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPacket {
    pub controller: u8,
    pub packet: Packet,
}

pub struct PacketBuilder<H> {
    readout: ReadoutMap,
    matrix: FaultMatrix,
    hits: H,
}

impl<H: HitSource> PacketBuilder<H> {
    pub fn new(readout: ReadoutMap, matrix: FaultMatrix, hits: H) -> Self {
        PacketBuilder {
            readout,
            matrix,
            hits,
        }
    }

    pub fn readout(&self) -> &ReadoutMap {
        &self.readout
    }

    pub fn matrix(&self) -> &FaultMatrix {
        &self.matrix
    }

    /// Build the packets of every controller for one event.
    ///
    /// An event carrying the no-packet scenario yields no packets at all.
    pub fn build_event(&self, meta: &EventMeta) -> Result<Vec<ControllerPacket>> {
        let faults = self.matrix.scenarios_for(meta.event);
        if faults.contains(ScenarioId::NoPacket) {
            info!("Event {}: no packet emitted", meta.event);
            return Ok(Vec::new());
        }
        if !faults.is_empty() {
            let names: Vec<&str> = faults.iter().map(ScenarioId::name).collect();
            info!("Event {}: injecting {}", meta.event, names.join(", "));
        }

        if faults.needs_second_module() && self.readout.module_count() < 2 {
            warn!(
                "Event {}: readout has a single module, cross-module faults are not injected",
                meta.event
            );
        }

        let mut packets = Vec::with_capacity(self.readout.controllers().len());
        let mut first_module = 0;
        for unit in self.readout.controllers() {
            let packet = self.build_controller(meta, &faults, unit, first_module)?;
            first_module += unit.active_modules().len();
            packets.push(ControllerPacket {
                controller: unit.id,
                packet,
            });
        }
        Ok(packets)
    }

    fn build_controller(
        &self,
        meta: &EventMeta,
        faults: &FaultSet,
        unit: &ControllerUnit,
        first_module: usize,
    ) -> Result<Packet> {
        let mut ctx = EncodingContext::new(meta, faults);
        self.pack_controller(&mut ctx, unit, first_module);
        apply_container_faults(&mut ctx)?;

        debug!(
            "Event {}: controller {} packet with {} frames",
            meta.event,
            unit.id,
            ctx.packet.frame_count()
        );
        Ok(ctx.into_packet())
    }

    /// `first_module` is the event-wide index of the controller's first module
    fn pack_controller(
        &self,
        ctx: &mut EncodingContext<'_>,
        unit: &ControllerUnit,
        first_module: usize,
    ) {
        if !ctx.active(ScenarioId::TriggerFrameMissing) {
            for _ in 0..copies(ctx.active(ScenarioId::TriggerFrameDoubled)) {
                pack_trigger(ctx);
            }
        }
        if ctx.active(ScenarioId::OnlyTriggerFrame) {
            return;
        }
        if ctx.active(ScenarioId::RoiFrameInvalidSize) {
            pack_roi(ctx);
        }

        ctx.buffer.reset_counters();

        let fake_start = ctx.active(ScenarioId::FakeControllerFrames)
            || ctx.active(ScenarioId::FakeStartRealEnd);
        let no_frames = ctx.active(ScenarioId::NoControllerFrames);

        if fake_start {
            pack_fake_start(ctx);
        } else if !no_frames && !ctx.active(ScenarioId::ControllerStartMissing) {
            for _ in 0..copies(ctx.active(ScenarioId::ControllerStartDoubled)) {
                self.pack_controller_start(ctx, unit);
            }
        }

        // a fake start announces that no module data follows
        if !fake_start {
            for (position, (_, module_id)) in unit.active_modules().into_iter().enumerate() {
                let repeated = position == 0 && ctx.active(ScenarioId::ModuleGroupRepeated);
                for _ in 0..copies(repeated) {
                    self.pack_module(ctx, module_id, position, first_module + position);
                }
            }
        }

        if ctx.active(ScenarioId::FakeControllerFrames) {
            pack_fake_end(ctx);
        } else if !no_frames && !ctx.active(ScenarioId::ControllerEndMissing) {
            let words = ctx.buffer.counters().controller / 4;
            for _ in 0..copies(ctx.active(ScenarioId::ControllerEndDoubled)) {
                pack_controller_end(ctx, unit.id, words);
            }
        }
    }

    fn pack_controller_start(&self, ctx: &mut EncodingContext<'_>, unit: &ControllerUnit) {
        let mut mask = unit.active_mask();
        if ctx.active(ScenarioId::ControllerActiveMask) {
            mask = perturb_module_mask(mask);
        }

        let mut trigger_lo = ctx.trigger_lo();
        if ctx.active(ScenarioId::ControllerStartTriggerLow) {
            trigger_lo = trigger_lo.wrapping_add(1);
        }
        let mut header =
            HeaderWord::controller(FrameType::ControllerStart, unit.id, mask, trigger_lo);
        if ctx.active(ScenarioId::ControllerErrorFlag) {
            header = header.with_error_flag();
        }

        let mut trigger_hi = ctx.trigger_hi();
        if ctx.active(ScenarioId::ControllerTriggerHigh) {
            trigger_hi = trigger_hi.wrapping_add(1);
        }

        let mut time = ctx.meta().time_tag();
        if ctx.active(ScenarioId::ControllerTimeTag) {
            time.ticks = time.ticks.wrapping_add(1) & 0x07FF_FFFF;
        }
        let (time_lo, time_mid, time_hi) = time.to_controller_words(self.readout.trigger_type());

        let (mut run_word1, run_word2) = ctx.meta().run_tag().to_controller_words();
        if ctx.active(ScenarioId::ControllerRunTag) {
            run_word1 = run_word1.wrapping_add(1);
        }

        ctx.buffer.begin_frame();
        ctx.buffer.append_u32(header.raw());
        ctx.buffer.append_u16(trigger_hi);
        ctx.buffer.append_u16(time_lo);
        ctx.buffer.append_u16(time_mid);
        ctx.buffer.append_u16(time_hi);
        ctx.buffer.append_u16(run_word1);
        ctx.buffer.append_u16(run_word2);
        if ctx.active(ScenarioId::ControllerStartOversize) {
            ctx.buffer.append_u32(0);
        }
        ctx.finalize();
    }

    /// One Module Start / chip frames / Module End group.
    ///
    /// Module and chip faults apply to the module at port position 0 of each
    /// controller. The cross-module faults apply to the second module of the
    /// event, counted across controllers.
    fn pack_module(
        &self,
        ctx: &mut EncodingContext<'_>,
        module_id: u8,
        position: usize,
        event_position: usize,
    ) {
        let first = position == 0;
        let second = event_position == 1;
        let id = if first && ctx.active(ScenarioId::ModuleIdInvalid) {
            INVALID_MODULE_ID
        } else {
            module_id
        };

        let mut map = PixelMap::new();
        self.hits.fill(ctx.meta(), module_id, &mut map);
        if first {
            prepare_target_map(ctx, &mut map);
        }

        let mut chip_mask: u8 = (1 << CHIPS_PER_MODULE) - 1;
        if first && ctx.active(ScenarioId::ModuleActiveMask) {
            chip_mask &= !(1 << (CHIPS_PER_MODULE - 1));
        }

        ctx.buffer.reset_module_counter();

        if !(first && ctx.active(ScenarioId::ModuleStartMissing)) {
            let doubled = first && ctx.active(ScenarioId::ModuleStartDoubled);
            for _ in 0..copies(doubled) {
                pack_module_start(ctx, id, chip_mask, first, second);
            }
        }

        for chip in 0..CHIPS_PER_MODULE {
            let target = first && chip == 0;
            if target && ctx.active(ScenarioId::ChipFrameMissing) {
                continue;
            }
            let repeated = target && ctx.active(ScenarioId::ChipFrameNrRepeated);
            for _ in 0..copies(repeated) {
                self.pack_chip(ctx, &map, id, chip, first);
            }
        }

        if first && ctx.active(ScenarioId::UnknownFrameType) {
            pack_filler(ctx, FrameType::Unused7);
        }
        if first && ctx.active(ScenarioId::UnexpectedFrameType) {
            pack_filler(ctx, FrameType::ClusterRaw);
        }

        if !(first && ctx.active(ScenarioId::ModuleEndMissing)) {
            let words = ctx.buffer.counters().module / 2;
            let doubled = first && ctx.active(ScenarioId::ModuleEndDoubled);
            for _ in 0..copies(doubled) {
                pack_module_end(ctx, id, words, first);
            }
        }
    }

    /// Chip data frame, or a ghost frame when the chip has no hits
    fn pack_chip(
        &self,
        ctx: &mut EncodingContext<'_>,
        map: &PixelMap,
        id: u8,
        chip: u8,
        first: bool,
    ) {
        let target = first && chip == 0;
        let invert = self.readout.invert_mapping();

        let mut hits = map.chip_hits(chip);
        if invert {
            for hit in hits.iter_mut() {
                let (row, column) = raw_coordinates(id, hit.0, hit.1);
                hit.0 = row;
                hit.1 = column;
            }
            hits.sort_unstable();
        }

        let frame_type = if target && ctx.active(ScenarioId::SendAllType) {
            FrameType::MergerChipData
        } else {
            FrameType::ChipData
        };
        let frame_id = if target && ctx.active(ScenarioId::ChipFrameModuleId) {
            next_module_id(id)
        } else {
            id
        };
        let mut header = HeaderWord::chip(frame_type, frame_id, !invert, chip, ctx.trigger_lo());
        if target && ctx.active(ScenarioId::ChipErrorFlag) {
            header = header.with_error_flag();
        }

        let mut frame_nr = ctx.trigger_lo();
        if first && ctx.active(ScenarioId::ChipFrameNrOffset) {
            frame_nr = frame_nr.wrapping_add(4);
        }
        if first && chip == 1 && ctx.active(ScenarioId::ChipFrameNrSpread) {
            frame_nr = frame_nr.wrapping_add(2);
        }
        let header_id = if target && ctx.active(ScenarioId::ChipHeaderModuleId) {
            next_module_id(id)
        } else {
            id
        };
        let port = if target && ctx.active(ScenarioId::ChipHeaderPort) {
            chip ^ 1
        } else {
            chip
        };

        ctx.buffer.begin_frame();
        ctx.buffer.append_u32(header.raw());
        ctx.buffer.append_u32(chip_header_word(header_id, port, frame_nr));

        if target && ctx.active(ScenarioId::ChipFrameTooSmall) {
            ctx.buffer.begin_frame();
            ctx.buffer.retract(CHIP_HEADER_SIZE as u32);
            ctx.buffer.append_u32(header.raw());
            ctx.finalize();
            return;
        }

        if hits.is_empty() {
            ctx.buffer.begin_frame();
            ctx.buffer.retract(CHIP_HEADER_SIZE as u32);
            let mut ghost = HeaderWord::chip(FrameType::Ghost, id, false, chip, ctx.trigger_lo())
                .with_error_flag();
            if target && ctx.active(ScenarioId::GhostWithoutErrorFlag) {
                ghost = ghost.without_error_flag();
            }
            ctx.buffer.append_u32(ghost.raw());
            ctx.finalize();
            return;
        }

        if target && ctx.active(ScenarioId::ChipDoubleHeader) {
            ctx.buffer
                .append_u32(chip_header_word(header_id, port, frame_nr.wrapping_add(1)));
        }

        let faults = RecordFaults {
            pixel_without_row: target && ctx.active(ScenarioId::PixelWithoutRow),
            row_without_pixel: target && ctx.active(ScenarioId::RowWithoutPixel),
            misaligned: target && ctx.active(ScenarioId::ChipFrameMisaligned),
        };
        for record in chip_records(&hits, faults) {
            ctx.buffer.append_u16(record.encode());
        }

        if target && ctx.active(ScenarioId::ChipFrameTruncated) {
            let len = ctx.buffer.len();
            ctx.buffer.truncate(len.saturating_sub(4));
        }
        ctx.finalize();
    }
}

fn copies(doubled: bool) -> usize {
    if doubled {
        2
    } else {
        1
    }
}

fn next_module_id(id: u8) -> u8 {
    id.wrapping_add(1) & 0x3F
}

/// Announce a module on an unused port, or drop one when all ports are used
fn perturb_module_mask(mask: u8) -> u8 {
    let full: u8 = (1 << PORTS_PER_CONTROLLER) - 1;
    let unused = !mask & full;
    if unused == 0 {
        mask & (mask - 1)
    } else {
        mask | (unused & unused.wrapping_neg())
    }
}

/// Pixel content the target module's scenarios depend on
fn prepare_target_map(ctx: &EncodingContext<'_>, map: &mut PixelMap) {
    if ctx.faults().needs_hits() {
        for chip in 0..CHIPS_PER_MODULE {
            if !map.has_hits(chip) {
                map.set(MARKER_ROW, chip as u16 * CHIP_COLUMNS + 1, MARKER_ADC);
            }
        }
    }
    if ctx.faults().needs_empty_chip() {
        map.clear_chip(0);
    }
    if ctx.active(ScenarioId::RowOverflow) {
        map.set(OVERFLOW_ROW, 5, 0x33);
    }
    if ctx.active(ScenarioId::ColumnOverflow) {
        map.set(10, OVERFLOW_COLUMN, 0x34);
    }
}

fn pack_trigger(ctx: &mut EncodingContext<'_>) {
    let trigger = ctx.trigger();
    let tag = ctx.meta().run_tag();

    let mut trigger_lo = ctx.trigger_lo();
    if ctx.active(ScenarioId::TriggerFrameTriggerLow) {
        trigger_lo = trigger_lo.wrapping_add(1);
    }

    let mut main_magic = if ctx.active(ScenarioId::TriggerMagicMain) {
        BAD_MAIN_TRIGGER_MAGIC
    } else {
        MAIN_TRIGGER_MAGIC
    };
    if ctx.active(ScenarioId::TriggerNotUnfiltered) {
        main_magic &= !TRIGGER_SEND_UNFILTERED;
    }
    let main_trigger = if ctx.active(ScenarioId::TriggerNumberMain) {
        trigger.wrapping_add(1)
    } else {
        trigger
    };
    let main_tag = if ctx.active(ScenarioId::TriggerTagMain) {
        RunTag::new(tag.experiment, tag.run.wrapping_add(1), tag.subrun)
    } else {
        tag
    };

    let aux = if ctx.active(ScenarioId::AuxTriggerAbsent) {
        [0; 3]
    } else {
        let magic = if ctx.active(ScenarioId::TriggerMagicAux) {
            BAD_AUX_TRIGGER_MAGIC
        } else {
            TRIGGER_MAGIC
        };
        let aux_trigger = if ctx.active(ScenarioId::TriggerNumberAux) {
            trigger.wrapping_add(10)
        } else {
            trigger
        };
        let aux_tag = if ctx.active(ScenarioId::TriggerTagAux) {
            RunTag::new(tag.experiment, tag.run, tag.subrun.wrapping_add(1))
        } else {
            tag
        };
        [magic, aux_trigger, aux_tag.to_trigger_tag()]
    };

    ctx.buffer.begin_frame();
    ctx.buffer
        .append_u32(HeaderWord::new(FrameType::Trigger, 0, trigger_lo).raw());
    ctx.buffer.append_u32(main_magic);
    ctx.buffer.append_u32(main_trigger);
    ctx.buffer.append_u32(main_tag.to_trigger_tag());
    for word in aux {
        ctx.buffer.append_u32(word);
    }
    ctx.finalize();
}

/// Region-of-interest frame with a body that is not a whole number of records
fn pack_roi(ctx: &mut EncodingContext<'_>) {
    ctx.buffer.begin_frame();
    ctx.buffer
        .append_u32(HeaderWord::new(FrameType::RegionOfInterest, 0, ctx.trigger_lo()).raw());
    ctx.buffer.append_u32(0);
    ctx.buffer.append_u32(0);
    ctx.finalize();
}

fn pack_fake_start(ctx: &mut EncodingContext<'_>) {
    ctx.buffer.begin_frame();
    ctx.buffer.append_u32(FAKE_CONTROLLER_START);
    for _ in 0..6 {
        ctx.buffer.append_u16(0);
    }
    ctx.finalize();
}

fn pack_fake_end(ctx: &mut EncodingContext<'_>) {
    ctx.buffer.begin_frame();
    ctx.buffer.append_u32(FAKE_CONTROLLER_END);
    ctx.buffer.append_u32(0);
    ctx.buffer.append_u32(0);
    ctx.finalize();
}

fn pack_controller_end(ctx: &mut EncodingContext<'_>, id: u8, words: u32) {
    let id = if ctx.active(ScenarioId::ControllerIdEndMismatch) {
        id.wrapping_add(1) & 0xF
    } else {
        id
    };
    let mut trigger_lo = ctx.trigger_lo();
    if ctx.active(ScenarioId::ControllerEndTriggerLow) {
        trigger_lo = trigger_lo.wrapping_add(1);
    }
    let words = if ctx.active(ScenarioId::ControllerWordCount) {
        words.wrapping_add(1)
    } else {
        words
    };

    ctx.buffer.begin_frame();
    ctx.buffer
        .append_u32(HeaderWord::controller(FrameType::ControllerEnd, id, 0, trigger_lo).raw());
    ctx.buffer.append_u32(words);
    ctx.buffer.append_u32(0);
    ctx.finalize();
}

fn pack_module_start(
    ctx: &mut EncodingContext<'_>,
    id: u8,
    chip_mask: u8,
    first: bool,
    second: bool,
) {
    let trigger = ctx.trigger();

    let mut trigger_lo = ctx.trigger_lo();
    if first && ctx.active(ScenarioId::ModuleStartTriggerLow) {
        trigger_lo = trigger_lo.wrapping_add(1);
    }
    let mut trigger_hi = ctx.trigger_hi();
    if first && ctx.active(ScenarioId::ModuleTriggerHigh) {
        trigger_hi = trigger_hi.wrapping_add(1);
    }

    let mut frame_nr = ctx.trigger_lo();
    if second && ctx.active(ScenarioId::ModuleFrameNrDiffer) {
        frame_nr = frame_nr.wrapping_add(1);
    }
    let mut gate = (trigger % GATES) as u16;
    if second && ctx.active(ScenarioId::ModuleGateDiffer) {
        gate += 1;
    }

    let ticks = ctx.meta().time_tag().ticks;

    ctx.buffer.begin_frame();
    ctx.buffer
        .append_u32(HeaderWord::module(FrameType::ModuleStart, id, chip_mask, trigger_lo).raw());
    ctx.buffer.append_u16(trigger_hi);
    ctx.buffer.append_u16((ticks & 0xFFFF) as u16);
    ctx.buffer.append_u16((ticks >> 16) as u16);
    ctx.buffer
        .append_u16(ModuleStart::pack_frame_gate(frame_nr, gate));
    if first && ctx.active(ScenarioId::ModuleStartOversize) {
        ctx.buffer.append_u32(0);
    }
    ctx.finalize();
}

fn pack_module_end(ctx: &mut EncodingContext<'_>, id: u8, words: u32, first: bool) {
    let id = if first && ctx.active(ScenarioId::ModuleIdEndMismatch) {
        next_module_id(id)
    } else {
        id
    };
    let words = if first && ctx.active(ScenarioId::ModuleWordCount) {
        words.wrapping_add(1)
    } else {
        words
    };

    ctx.buffer.begin_frame();
    ctx.buffer
        .append_u32(HeaderWord::module(FrameType::ModuleEnd, id, 0, ctx.trigger_lo()).raw());
    ctx.buffer.append_u16((words & 0xFFFF) as u16);
    ctx.buffer.append_u16((words >> 16) as u16);
    ctx.buffer.append_u32(0);
    ctx.finalize();
}

/// Header-only frame of a type the module readout never carries
fn pack_filler(ctx: &mut EncodingContext<'_>, frame_type: FrameType) {
    ctx.buffer.begin_frame();
    ctx.buffer
        .append_u32(HeaderWord::new(frame_type, 0, ctx.trigger_lo()).raw());
    ctx.finalize();
}

#[derive(Debug, Clone, Copy, Default)]
struct RecordFaults {
    pixel_without_row: bool,
    row_without_pixel: bool,
    misaligned: bool,
}

/// Encode row-major hits as row-start and hit records.
///
/// A row-start precedes the first hit of each row pair. An odd record
/// count is padded with the last row-start unless the frame is meant to
/// stay misaligned.
fn chip_records(hits: &[(u16, u8, u8)], faults: RecordFaults) -> Vec<ChipRecord> {
    let mut records = Vec::with_capacity(2 * hits.len() + 2);
    let mut pair = None;
    let mut last_row_start = None;

    for (index, &(row, column, adc)) in hits.iter().enumerate() {
        let row_pair = row & !1;
        if pair != Some(row_pair) {
            pair = Some(row_pair);
            let start = ChipRecord::row_start(row_pair);
            if index == 0 && faults.row_without_pixel {
                records.push(ChipRecord::row_start(row_pair.wrapping_add(2)));
            }
            if !(index == 0 && faults.pixel_without_row) {
                records.push(start);
            }
            last_row_start = Some(start);
        }
        records.push(ChipRecord::hit(row, column, adc));
    }

    let odd = records.len() % 2 == 1;
    if odd != faults.misaligned {
        if let Some(start) = last_row_start {
            records.push(start);
        }
    }
    records
}

/// Faults on the packet container, applied after all frames are finalized
fn apply_container_faults(ctx: &mut EncodingContext<'_>) -> Result<()> {
    let event = ctx.meta().event;

    if ctx.active(ScenarioId::PacketMagic) {
        ctx.packet.set_magic(BAD_PACKET_MAGIC);
    }
    if ctx.active(ScenarioId::PacketFrameCount) {
        ctx.packet.set_declared_frame_count(MAX_FRAMES + 1);
    }
    if ctx.active(ScenarioId::FrameLengthZero) {
        if ctx.packet.frame_count() > 1 {
            ctx.packet.set_declared_length(1, 0)?;
        } else {
            warn!("Event {}: no second frame to zero the length of", event);
        }
    }
    if ctx.active(ScenarioId::FrameLengthOverrun) {
        match ctx.packet.header_index().last().copied() {
            Some(len) => {
                let index = ctx.packet.frame_count() - 1;
                ctx.packet.set_declared_length(index, len.wrapping_add(0x100))?;
            }
            None => warn!("Event {}: no frame to overrun", event),
        }
    }
    if ctx.active(ScenarioId::PacketTruncated) {
        ctx.packet.limit_wire_length(4);
    }
    if ctx.active(ScenarioId::FrameCrc) {
        match ctx.packet.position(FrameType::ControllerStart) {
            Some(index) => ctx.packet.poison_crc(index)?,
            None => warn!("Event {}: no Controller Start to corrupt", event),
        }
    }
    Ok(())
}
