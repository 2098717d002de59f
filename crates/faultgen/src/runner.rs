//! Generate and check runs
//!
//! Generate mode writes every controller packet of every event as a
//! bincode stream of [`PacketRecord`]s. Check mode reads the masks a
//! decoder reported for those packets, one JSON object per line, and runs
//! them through the compliance oracle.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use anyhow::{Context, Result};
use faultgen_packer::{
    ComplianceOracle, OracleSummary, PacketBuilder, SequentialEvents, SyntheticHits,
};
use faultgen_protocol::DiagMask;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;

/// One serialized packet as handed to a decoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub event: u32,
    pub controller: u8,
    pub bytes: Vec<u8>,
}

/// Mask a decoder reported for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedMask {
    pub event: u32,
    pub mask: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub events: u32,
    pub packets: usize,
    pub bytes: usize,
}

/// Build and write the packets of events `0..events`
pub fn generate(config: &Config, events: u32) -> Result<GenerateSummary> {
    let readout = config.readout_map().context("Invalid readout configuration")?;
    let matrix = config.fault_matrix().context("Invalid fault configuration")?;
    let builder = PacketBuilder::new(readout, matrix, SyntheticHits);

    let path = &config.output.packets;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    info!(
        "Generating {} events for {} controllers",
        events,
        builder.readout().controllers().len()
    );

    let mut summary = GenerateSummary {
        events,
        ..GenerateSummary::default()
    };
    for meta in SequentialEvents::new(config.run_info(), events) {
        for controller_packet in builder.build_event(&meta)? {
            let record = PacketRecord {
                event: meta.event,
                controller: controller_packet.controller,
                bytes: controller_packet.packet.to_bytes(),
            };
            summary.packets += 1;
            summary.bytes += record.bytes.len();
            bincode::serialize_into(&mut writer, &record)
                .context("Failed to write packet record")?;
        }
    }
    writer.flush()?;

    info!(
        "Wrote {} packets ({} bytes) to {}",
        summary.packets,
        summary.bytes,
        path.display()
    );
    Ok(summary)
}

/// Judge the reported masks of events `0..events`.
///
/// Every event is checked and logged; the first failure is returned once
/// the whole run has been judged.
pub fn check(config: &Config, events: u32) -> Result<OracleSummary> {
    let matrix = config.fault_matrix().context("Invalid fault configuration")?;
    let reported = read_reported_masks(&config.output.reported)?;
    let mut oracle = ComplianceOracle::from_matrix(&matrix);

    for (&event, _) in reported.range(events..) {
        warn!("Reported mask for event {} is outside the run", event);
    }

    for event in 0..events {
        let mask = reported.get(&event).copied().unwrap_or_else(|| {
            debug!("Event {}: no mask reported", event);
            DiagMask::empty()
        });
        oracle.check(event, mask);
    }

    for name in oracle.coverage_report() {
        warn!("Diagnostic {} is not exercised by any event", name);
    }

    let summary = oracle.end_run().context("Compliance check failed")?;
    info!(
        "Compliance check passed: {} of {} events",
        summary.passed, summary.checked
    );
    Ok(summary)
}

pub fn read_packet_records(path: &Path) -> Result<Vec<PacketRecord>> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read packet file {}", path.display()))?;
    let mut cursor = Cursor::new(bytes.as_slice());
    let mut records = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let record: PacketRecord = bincode::deserialize_from(&mut cursor)
            .with_context(|| format!("Failed to decode packet record {}", records.len()))?;
        records.push(record);
    }
    Ok(records)
}

pub fn read_reported_masks(path: &Path) -> Result<BTreeMap<u32, DiagMask>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read reported masks {}", path.display()))?;

    let mut masks = BTreeMap::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reported: ReportedMask = serde_json::from_str(line)
            .with_context(|| format!("Invalid reported mask on line {}", number + 1))?;
        if masks
            .insert(reported.event, DiagMask::from_bits_retain(reported.mask))
            .is_some()
        {
            warn!("Event {} reported more than once, keeping the last mask", reported.event);
        }
    }
    Ok(masks)
}
