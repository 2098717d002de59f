//! Per-packet encoding state

use faultgen_protocol::{FinalizedFrame, FrameBuffer, Packet};
use tracing::debug;

use crate::event::EventMeta;
use crate::scenario::{FaultSet, ScenarioId};

/// State threaded through the assembly of one (controller, event) packet.
///
/// Owns the frame buffer and the packet under construction; the event
/// metadata and the active faults are borrowed read-only.
#[derive(Debug)]
pub struct EncodingContext<'a> {
    pub buffer: FrameBuffer,
    pub packet: Packet,
    meta: &'a EventMeta,
    faults: &'a FaultSet,
}

impl<'a> EncodingContext<'a> {
    pub fn new(meta: &'a EventMeta, faults: &'a FaultSet) -> Self {
        EncodingContext {
            buffer: FrameBuffer::new(),
            packet: Packet::new(),
            meta,
            faults,
        }
    }

    pub fn meta(&self) -> &EventMeta {
        self.meta
    }

    pub fn faults(&self) -> &FaultSet {
        self.faults
    }

    pub fn active(&self, scenario: ScenarioId) -> bool {
        self.faults.contains(scenario)
    }

    pub fn trigger(&self) -> u32 {
        self.meta.trigger()
    }

    pub fn trigger_lo(&self) -> u16 {
        (self.trigger() & 0xFFFF) as u16
    }

    pub fn trigger_hi(&self) -> u16 {
        (self.trigger() >> 16) as u16
    }

    /// Close the frame in progress and append it to the packet
    pub fn finalize(&mut self) -> FinalizedFrame {
        let frame = self.buffer.finalize_frame(&mut self.packet);
        debug!(
            "Event {}: frame {} {:?}, {} bytes",
            self.meta.event,
            frame.index,
            self.packet.frame_type(frame.index),
            frame.len
        );
        frame
    }

    pub fn into_packet(self) -> Packet {
        self.packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RunInfo;
    use faultgen_protocol::{FrameType, HeaderWord};

    #[test]
    fn test_trigger_halves() {
        let meta = RunInfo::default().event(0x0003_0007);
        let faults = FaultSet::default();
        let ctx = EncodingContext::new(&meta, &faults);
        assert_eq!(ctx.trigger_lo(), 0x0007);
        assert_eq!(ctx.trigger_hi(), 0x0003);
        assert!(!ctx.active(ScenarioId::FrameCrc));
    }

    #[test]
    fn test_finalize_appends_frame() {
        let meta = RunInfo::default().event(1);
        let faults: FaultSet = [ScenarioId::FrameCrc].into_iter().collect();
        let mut ctx = EncodingContext::new(&meta, &faults);
        assert!(ctx.active(ScenarioId::FrameCrc));

        ctx.buffer.begin_frame();
        ctx.buffer
            .append_u32(HeaderWord::new(FrameType::ClusterRaw, 0, ctx.trigger_lo()).raw());
        let frame = ctx.finalize();
        assert_eq!(frame.index, 0);
        assert_eq!(frame.len, 8);

        let packet = ctx.into_packet();
        assert_eq!(packet.frame_types(), vec![FrameType::ClusterRaw]);
        assert!(packet.verify_crc(0));
    }
}
