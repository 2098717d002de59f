//! Faultgen packet assembly and compliance checking
//!
//! Builds one readout packet per (controller, event), perturbed by the
//! scenarios the fault matrix assigns to the event, and judges a decoder's
//! reported diagnostics against the masks those scenarios predict.

pub mod builder;
pub mod context;
pub mod error;
pub mod event;
pub mod hits;
pub mod oracle;
pub mod readout;
pub mod scenario;

pub use builder::{ControllerPacket, PacketBuilder};
pub use context::EncodingContext;
pub use error::{OracleError, PackerError, Result, SetupError};
pub use event::{EventMeta, RunInfo, SequentialEvents};
pub use hits::{HitSource, PixelMap, SyntheticHits};
pub use oracle::{BitVerdict, ComplianceOracle, ExpectedDiagnostics, OracleSummary};
pub use readout::{ControllerUnit, ReadoutMap};
pub use scenario::{FaultMatrix, FaultSet, ScenarioFamily, ScenarioId};
