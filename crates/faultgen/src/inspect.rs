//! Human-readable listings: packet files and the scenario catalogue

use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use faultgen_packer::ScenarioId;
use faultgen_protocol::{HeaderWord, Packet};

use crate::runner::read_packet_records;

/// Bytes shown per frame
const DUMP_BYTES: usize = 16;

/// Describe the frames of every record in a packet file
pub fn inspect_file(path: &Path, event: Option<u32>) -> Result<String> {
    let records = read_packet_records(path)?;
    let mut out = String::new();

    for record in records
        .iter()
        .filter(|record| event.map_or(true, |event| record.event == event))
    {
        writeln!(
            out,
            "event {} controller {}: {} bytes",
            record.event,
            record.controller,
            record.bytes.len()
        )?;
        match Packet::from_bytes(&record.bytes) {
            Ok(packet) => describe_packet(&mut out, &packet)?,
            Err(e) => writeln!(
                out,
                "  undecodable ({}): {}",
                e,
                hex::encode(&record.bytes[..record.bytes.len().min(DUMP_BYTES)])
            )?,
        }
    }
    Ok(out)
}

fn describe_packet(out: &mut String, packet: &Packet) -> std::fmt::Result {
    for (index, frame) in packet.frames().iter().enumerate() {
        let header = HeaderWord::read(frame).map(|header| {
            let flag = if header.error_flag() { " ERR" } else { "" };
            format!("{:?}{}", header.frame_type(), flag)
        });
        let crc = if packet.verify_crc(index) { "ok" } else { "BAD" };
        writeln!(
            out,
            "  [{:3}] {:<20} {:4} bytes crc {:3}  {}",
            index,
            header.unwrap_or_else(|_| "?".to_string()),
            frame.len(),
            crc,
            hex::encode(&frame[..frame.len().min(DUMP_BYTES)])
        )?;
    }
    Ok(())
}

/// One line per scenario: event, name, family and expected bits
pub fn catalogue() -> Vec<String> {
    ScenarioId::ALL
        .iter()
        .map(|scenario| {
            format!(
                "{:3} {:<30} {:<10} {}",
                scenario.id(),
                scenario.name(),
                scenario.family(),
                scenario.expected()
            )
        })
        .collect()
}
