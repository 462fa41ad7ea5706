//! Current channel values of the lighting universe

use crate::models::{Mask, Universe};

/// Holds the last universe handed to the transmitter
///
/// Only the lighting controller owns a store; everything else reads copies.
#[derive(Debug, Default)]
pub struct UniverseStore {
    current: Universe,
}

impl UniverseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Universe {
        self.current.clone()
    }

    pub(crate) fn replace(&mut self, universe: Universe) {
        self.current = universe;
    }
}

/// Universe with every channel of the mask at `power`, others off
pub fn scale(mask: &Mask, power: u8) -> Universe {
    let mut universe = Universe::zero();

    for (channel, value) in universe.as_mut_slice().iter_mut().enumerate() {
        if mask.is_set(channel) {
            *value = power;
        }
    }

    universe
}
