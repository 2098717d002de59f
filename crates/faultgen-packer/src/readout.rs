//! Readout topology: which modules hang off which controller port
//!
//! Module ids encode their position: layer = (id >> 5) + 1,
//! ladder = (id & 0x1E) >> 1, sensor = (id & 1) + 1.

use std::collections::{BTreeMap, BTreeSet};

use faultgen_protocol::frame::PORTS_PER_CONTROLLER;
use tracing::warn;

use crate::error::SetupError;

pub const MAX_CONTROLLER_ID: u32 = 15;
pub const MAX_MODULE_ID: i64 = 63;

/// Port entry value for a disabled port
pub const DISABLED_PORT: i64 = -1;

pub fn layer(module_id: u8) -> u8 {
    (module_id >> 5) + 1
}

pub fn ladder(module_id: u8) -> u8 {
    (module_id & 0x1E) >> 1
}

pub fn sensor(module_id: u8) -> u8 {
    (module_id & 0x1) + 1
}

/// Whether a module id names an existing ladder
pub fn is_valid_module_id(module_id: u8) -> bool {
    let ladder = ladder(module_id);
    match layer(module_id) {
        1 => (1..=8).contains(&ladder),
        2 => (1..=12).contains(&ladder),
        _ => false,
    }
}

/// One controller and the module on each of its ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerUnit {
    pub id: u8,
    pub ports: [Option<u8>; PORTS_PER_CONTROLLER],
}

impl ControllerUnit {
    /// Bit p set when port p carries a module
    pub fn active_mask(&self) -> u8 {
        self.ports
            .iter()
            .enumerate()
            .filter(|(_, module)| module.is_some())
            .fold(0, |mask, (port, _)| mask | (1 << port))
    }

    /// (port, module id) in ascending port order
    pub fn active_modules(&self) -> Vec<(usize, u8)> {
        self.ports
            .iter()
            .enumerate()
            .filter_map(|(port, module)| module.map(|id| (port, id)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadoutMap {
    controllers: Vec<ControllerUnit>,
    invert_mapping: bool,
    trigger_type: u8,
}

impl ReadoutMap {
    /// Validate a controller id -> module id list mapping
    pub fn new(mapping: &BTreeMap<u32, Vec<i64>>) -> Result<Self, SetupError> {
        let mut controllers = Vec::with_capacity(mapping.len());
        let mut seen = BTreeSet::new();

        for (&controller, entries) in mapping {
            if controller > MAX_CONTROLLER_ID {
                return Err(SetupError::ControllerIdOutOfRange(controller));
            }
            let controller = controller as u8;
            if entries.len() > PORTS_PER_CONTROLLER {
                return Err(SetupError::TooManyPorts {
                    controller,
                    ports: entries.len(),
                });
            }

            let mut ports = [None; PORTS_PER_CONTROLLER];
            for (port, &entry) in entries.iter().enumerate() {
                if entry == DISABLED_PORT {
                    continue;
                }
                if !(0..=MAX_MODULE_ID).contains(&entry) {
                    return Err(SetupError::ModuleIdOutOfRange { controller, id: entry });
                }
                let id = entry as u8;
                if !seen.insert(id) {
                    return Err(SetupError::DuplicateModuleId(id));
                }
                if !is_valid_module_id(id) {
                    warn!(
                        "Controller {} port {}: module id {:#04x} names no ladder",
                        controller, port, id
                    );
                }
                ports[port] = Some(id);
            }

            let unit = ControllerUnit { id: controller, ports };
            let ids: Vec<u8> = unit.active_modules().into_iter().map(|(_, id)| id).collect();
            if ids.windows(2).any(|pair| pair[0] >= pair[1]) {
                warn!(
                    "Controller {}: module ids {:?} do not ascend in port order",
                    controller, ids
                );
            }
            controllers.push(unit);
        }

        Ok(ReadoutMap {
            controllers,
            invert_mapping: false,
            trigger_type: 0,
        })
    }

    /// Use raw readout coordinates in chip frames
    pub fn with_invert_mapping(mut self, invert: bool) -> Self {
        self.invert_mapping = invert;
        self
    }

    pub fn with_trigger_type(mut self, trigger_type: u8) -> Self {
        self.trigger_type = trigger_type & 0xF;
        self
    }

    pub fn controllers(&self) -> &[ControllerUnit] {
        &self.controllers
    }

    pub fn controller(&self, id: u8) -> Option<&ControllerUnit> {
        self.controllers.iter().find(|unit| unit.id == id)
    }

    pub fn invert_mapping(&self) -> bool {
        self.invert_mapping
    }

    pub fn trigger_type(&self) -> u8 {
        self.trigger_type
    }

    pub fn module_count(&self) -> usize {
        self.controllers
            .iter()
            .map(|unit| unit.active_modules().len())
            .sum()
    }
}
