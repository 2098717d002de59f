//! Compliance oracle
//!
//! Compares the diagnostic mask a decoder reports for each event with the
//! mask the event's scenarios predict. A faulted event passes when every
//! expected bit is reported; further bits are tolerated. The clean event
//! passes only with an empty mask.

use std::collections::BTreeMap;
use std::fmt;

use faultgen_protocol::DiagMask;
use tracing::{error, info};

use crate::error::OracleError;
use crate::scenario::FaultMatrix;

/// Expected mask per event, derived from a fault matrix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedDiagnostics {
    masks: BTreeMap<u32, DiagMask>,
}

impl ExpectedDiagnostics {
    pub fn from_matrix(matrix: &FaultMatrix) -> Self {
        let masks = matrix
            .iter()
            .map(|(event, set)| (event, set.expected()))
            .collect();
        ExpectedDiagnostics { masks }
    }

    /// Empty for events without scenarios
    pub fn expected(&self, event: u32) -> DiagMask {
        self.masks.get(&event).copied().unwrap_or_default()
    }

    /// Every bit some event expects
    pub fn union(&self) -> DiagMask {
        self.masks
            .values()
            .fold(DiagMask::empty(), |acc, &mask| acc | mask)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, DiagMask)> + '_ {
        self.masks.iter().map(|(&event, &mask)| (event, mask))
    }
}

/// Judgement of one taxonomy bit for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitVerdict {
    /// Expected and reported
    AsExpected,
    /// Reported on a faulted event without being expected
    Optional,
    /// Expected but not reported
    NotSet,
    /// Reported on the clean event
    Unexpected,
}

impl BitVerdict {
    pub fn label(self) -> &'static str {
        match self {
            BitVerdict::AsExpected => "as expected",
            BitVerdict::Optional => "optional",
            BitVerdict::NotSet => "NOT SET",
            BitVerdict::Unexpected => "unexpected",
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, BitVerdict::NotSet | BitVerdict::Unexpected)
    }
}

impl fmt::Display for BitVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleSummary {
    pub checked: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ComplianceOracle {
    expected: ExpectedDiagnostics,
    summary: OracleSummary,
    first_failure: Option<OracleError>,
}

impl ComplianceOracle {
    pub fn new(expected: ExpectedDiagnostics) -> Self {
        ComplianceOracle {
            expected,
            summary: OracleSummary::default(),
            first_failure: None,
        }
    }

    pub fn from_matrix(matrix: &FaultMatrix) -> Self {
        Self::new(ExpectedDiagnostics::from_matrix(matrix))
    }

    pub fn expected(&self) -> &ExpectedDiagnostics {
        &self.expected
    }

    /// Per-bit verdicts for every bit set in either mask, lowest bit first
    pub fn verdicts(&self, event: u32, reported: DiagMask) -> Vec<(DiagMask, BitVerdict)> {
        let expected = self.expected.expected(event);
        let clean = expected.is_empty();
        let combined = (expected | reported).bits();

        (0..u64::BITS)
            .filter(|bit| combined & (1 << bit) != 0)
            .map(|bit| {
                let mask = DiagMask::from_bits_retain(1 << bit);
                let verdict = match (expected.contains(mask), reported.contains(mask)) {
                    (true, true) => BitVerdict::AsExpected,
                    (true, false) => BitVerdict::NotSet,
                    (false, _) if clean => BitVerdict::Unexpected,
                    (false, _) => BitVerdict::Optional,
                };
                (mask, verdict)
            })
            .collect()
    }

    /// Check one event; returns whether it passed.
    ///
    /// Only the first failure is kept for [`end_run`](Self::end_run).
    pub fn check(&mut self, event: u32, reported: DiagMask) -> bool {
        let expected = self.expected.expected(event);

        for (mask, verdict) in self.verdicts(event, reported) {
            if verdict.is_failure() {
                error!("Event {}: {} {}", event, mask, verdict);
            } else {
                info!("Event {}: {} {}", event, mask, verdict);
            }
        }

        let failure = if expected.is_empty() {
            (reported.bits() != 0).then_some(OracleError::UnexpectedBits { event, reported })
        } else {
            let missing = expected.difference(reported);
            (!missing.is_empty()).then_some(OracleError::MissingBits {
                event,
                missing,
                reported,
            })
        };

        self.summary.checked += 1;
        match failure {
            Some(failure) => {
                self.summary.failed += 1;
                if self.first_failure.is_none() {
                    self.first_failure = Some(failure);
                }
                false
            }
            None => {
                self.summary.passed += 1;
                true
            }
        }
    }

    /// Names of taxonomy bits no event expects
    pub fn coverage_report(&self) -> Vec<&'static str> {
        DiagMask::all().difference(self.expected.union()).bit_names()
    }

    pub fn first_failure(&self) -> Option<&OracleError> {
        self.first_failure.as_ref()
    }

    pub fn summary(&self) -> OracleSummary {
        self.summary
    }

    /// Re-raise the first recorded failure, if any
    pub fn end_run(&self) -> Result<OracleSummary, OracleError> {
        match &self.first_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(self.summary),
        }
    }
}
