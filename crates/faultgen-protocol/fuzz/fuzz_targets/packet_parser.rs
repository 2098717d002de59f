#![no_main]

use faultgen_protocol::frame::{
    ChipFrame, ControllerEnd, ControllerStart, FrameType, HeaderWord, ModuleEnd, ModuleStart,
    TriggerFrame,
};
use faultgen_protocol::Packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The container parser and frame views must reject malformed input without panicking
    if let Ok(packet) = Packet::from_bytes(data) {
        let reparsed = Packet::from_bytes(&packet.to_bytes());
        assert_eq!(reparsed.as_ref(), Ok(&packet));

        for frame in packet.frames() {
            let Ok(header) = HeaderWord::read(frame) else {
                continue;
            };
            match header.frame_type() {
                FrameType::Trigger => {
                    let _ = TriggerFrame::parse(frame);
                }
                FrameType::ControllerStart => {
                    let _ = ControllerStart::parse(frame);
                }
                FrameType::ControllerEnd => {
                    let _ = ControllerEnd::parse(frame);
                }
                FrameType::ModuleStart => {
                    let _ = ModuleStart::parse(frame);
                }
                FrameType::ModuleEnd => {
                    let _ = ModuleEnd::parse(frame);
                }
                FrameType::ChipData | FrameType::MergerChipData => {
                    if let Ok(chip) = ChipFrame::parse(frame) {
                        let _ = chip.hits();
                    }
                }
                _ => {}
            }
        }
    }
});
