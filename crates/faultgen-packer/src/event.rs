//! Event metadata and the sequential event source

use faultgen_protocol::frame::{RunTag, TimeTag};
use serde::{Deserialize, Serialize};

/// Read-only metadata of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub event: u32,
    pub run: u16,
    pub subrun: u8,
    pub experiment: u16,
    /// Coarse timestamp in nanoseconds
    pub time_ns: u64,
}

impl EventMeta {
    /// Trigger number carried by every frame of the event
    pub fn trigger(&self) -> u32 {
        self.event
    }

    pub fn run_tag(&self) -> RunTag {
        RunTag::new(self.experiment, self.run, self.subrun)
    }

    pub fn time_tag(&self) -> TimeTag {
        TimeTag::from_ns(self.time_ns)
    }
}

/// Run-wide identifiers shared by all events of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub experiment: u16,
    pub run: u16,
    pub subrun: u8,
    pub base_time_ns: u64,
    pub event_spacing_ns: u64,
}

impl Default for RunInfo {
    fn default() -> Self {
        RunInfo {
            experiment: 1,
            run: 1,
            subrun: 0,
            base_time_ns: 1_000_000_000,
            event_spacing_ns: 30_000,
        }
    }
}

impl RunInfo {
    pub fn event(&self, event: u32) -> EventMeta {
        EventMeta {
            event,
            run: self.run,
            subrun: self.subrun,
            experiment: self.experiment,
            time_ns: self
                .base_time_ns
                .wrapping_add(self.event_spacing_ns.wrapping_mul(event as u64)),
        }
    }
}

/// Yields events `0..count` of one run
#[derive(Debug, Clone)]
pub struct SequentialEvents {
    info: RunInfo,
    next: u32,
    end: u32,
}

impl SequentialEvents {
    pub fn new(info: RunInfo, count: u32) -> Self {
        SequentialEvents {
            info,
            next: 0,
            end: count,
        }
    }
}

impl Iterator for SequentialEvents {
    type Item = EventMeta;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let meta = self.info.event(self.next);
        self.next += 1;
        Some(meta)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SequentialEvents {}
