//! Error types for setup validation and compliance checking

use faultgen_protocol::{DiagMask, ProtocolError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackerError>;

/// Configuration errors, fatal before any event is processed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SetupError {
    #[error("Controller id out of range: {0} (max: 15)")]
    ControllerIdOutOfRange(u32),

    #[error("Controller {controller} lists {ports} ports (max: 5)")]
    TooManyPorts { controller: u8, ports: usize },

    #[error("Module id out of range on controller {controller}: {id} (max: 63)")]
    ModuleIdOutOfRange { controller: u8, id: i64 },

    #[error("Module id {0} is assigned to more than one port")]
    DuplicateModuleId(u8),

    #[error("Event 0 is the clean baseline and cannot carry faults")]
    BaselineFault,
}

/// Hard mismatch between expected and reported diagnostics
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Event {event}: decoder did not report {missing} (reported: {reported})")]
    MissingBits {
        event: u32,
        missing: DiagMask,
        reported: DiagMask,
    },

    #[error("Event {event}: clean event reported {reported}")]
    UnexpectedBits { event: u32, reported: DiagMask },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PackerError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
