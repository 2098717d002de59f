//! Pixel hit sources

use faultgen_protocol::frame::{CHIPS_PER_MODULE, CHIP_COLUMNS, COLUMNS, ROWS};

use crate::event::EventMeta;

/// Rows addressable by the row-start record (10 bits)
pub const MAP_ROWS: usize = 1024;
/// Columns addressable by four chips
pub const MAP_COLUMNS: usize = CHIPS_PER_MODULE as usize * CHIP_COLUMNS as usize;

/// ADC values of one module for one event, zero meaning no hit.
///
/// The grid is larger than the module so that out-of-range pixels can be
/// placed deliberately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelMap {
    cells: Vec<u8>,
}

impl Default for PixelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelMap {
    pub fn new() -> Self {
        PixelMap {
            cells: vec![0; MAP_ROWS * MAP_COLUMNS],
        }
    }

    pub fn get(&self, row: u16, column: u16) -> u8 {
        self.index(row, column).map(|i| self.cells[i]).unwrap_or(0)
    }

    /// Set one pixel; coordinates outside the grid are ignored
    pub fn set(&mut self, row: u16, column: u16, adc: u8) {
        if let Some(i) = self.index(row, column) {
            self.cells[i] = adc;
        }
    }

    pub fn clear_chip(&mut self, chip: u8) {
        for row in 0..MAP_ROWS as u16 {
            for column in chip_columns(chip) {
                self.set(row, column, 0);
            }
        }
    }

    /// Hits of one chip as (row, chip-local column, adc), row-major
    pub fn chip_hits(&self, chip: u8) -> Vec<(u16, u8, u8)> {
        let mut hits = Vec::new();
        for row in 0..MAP_ROWS as u16 {
            for column in chip_columns(chip) {
                let adc = self.get(row, column);
                if adc != 0 {
                    hits.push((row, (column % CHIP_COLUMNS) as u8, adc));
                }
            }
        }
        hits
    }

    pub fn has_hits(&self, chip: u8) -> bool {
        (0..MAP_ROWS as u16).any(|row| chip_columns(chip).any(|column| self.get(row, column) != 0))
    }

    pub fn hit_count(&self) -> usize {
        self.cells.iter().filter(|&&adc| adc != 0).count()
    }

    fn index(&self, row: u16, column: u16) -> Option<usize> {
        let (row, column) = (row as usize, column as usize);
        (row < MAP_ROWS && column < MAP_COLUMNS).then_some(row * MAP_COLUMNS + column)
    }
}

fn chip_columns(chip: u8) -> std::ops::Range<u16> {
    let first = chip as u16 * CHIP_COLUMNS;
    first..first + CHIP_COLUMNS
}

/// Supplies the pixel content of one module for one event
pub trait HitSource {
    fn fill(&self, event: &EventMeta, module_id: u8, map: &mut PixelMap);
}

impl<F> HitSource for F
where
    F: Fn(&EventMeta, u8, &mut PixelMap),
{
    fn fill(&self, event: &EventMeta, module_id: u8, map: &mut PixelMap) {
        self(event, module_id, map)
    }
}

/// Deterministic hits derived from the event and module numbers.
///
/// Per chip c of module m in event e: no hits when (e ^ m) + c is 3 mod 4,
/// otherwise 1 + (e + c + m) mod 3 hits inside the module area.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticHits;

impl HitSource for SyntheticHits {
    fn fill(&self, event: &EventMeta, module_id: u8, map: &mut PixelMap) {
        let e = event.event;
        let m = module_id as u32;
        let rows = ROWS as u32;
        // chip 3 covers only the columns up to COLUMNS
        let span = (COLUMNS - 3 * CHIP_COLUMNS) as u32;

        for chip in 0..CHIPS_PER_MODULE {
            let c = chip as u32;
            if (e ^ m).wrapping_add(c) % 4 == 3 {
                continue;
            }
            let count = 1 + e.wrapping_add(c).wrapping_add(m) % 3;
            for k in 0..count {
                let row = e
                    .wrapping_mul(7)
                    .wrapping_add(m * 13)
                    .wrapping_add(k * 97)
                    .wrapping_add(c * 31)
                    % rows;
                let column =
                    c * CHIP_COLUMNS as u32 + e.wrapping_add(k * 11).wrapping_add(m) % span;
                let adc = 1 + e.wrapping_mul(3).wrapping_add(k * 29).wrapping_add(m) % 254;
                map.set(row as u16, column as u16, adc as u8);
            }
        }
    }
}
