//! Faultgen - synthetic readout packets with injected faults
//!
//! Configuration, the generate/check runs, and packet file inspection
//! behind the `faultgen` command.

pub mod config;
pub mod inspect;
pub mod runner;
