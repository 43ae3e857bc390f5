//! Register-write events travelling through the pipeline.

use core::slice;

use bitvec::prelude::*;

/// Register address reserved for events that only carry time
pub const DELAY_ADDR: u8 = 0xFF;

/// Register space of one emulated chip
pub const REGISTER_MASK: u8 = 0x1F;

/// Upper bound of chip instances driven by one dispatcher
pub const MAX_CHIPS: usize = 2;

/// Read a single bit of a byte-sized mask, least significant bit first
pub(crate) fn bit_set(mask: &u8, index: usize) -> bool {
    slice::from_ref(mask)
        .view_bits::<Lsb0>()
        .get(index)
        .copied()
        .unwrap_or(false)
}

/// Set of chip instances an event is written to.
///
/// An empty selector addresses every chip, which is what narrow wire
/// records carry implicitly.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChipMask(u8);

impl ChipMask {
    pub const ALL: ChipMask = ChipMask(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Selector for a single chip instance (`chip` < 8)
    pub const fn single(chip: u8) -> Self {
        Self(1 << chip)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_all(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, chip: usize) -> bool {
        self.is_all() || bit_set(&self.0, chip)
    }

    /// Replace the implicit "all" selector by `default`
    pub fn or_default(self, default: ChipMask) -> Self {
        if self.is_all() {
            default
        } else {
            self
        }
    }
}

/// One timestamped register write, or a pure delay.
///
/// `delay` counts chip cycles since the previous event in the same stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterEvent {
    pub delay: u32,
    pub target: ChipMask,
    pub addr: u8,
    pub value: u8,
}

impl RegisterEvent {
    pub const fn write(delay: u32, addr: u8, value: u8) -> Self {
        Self {
            delay,
            target: ChipMask::ALL,
            addr,
            value,
        }
    }

    pub const fn delay_only(delay: u32) -> Self {
        Self {
            delay,
            target: ChipMask::ALL,
            addr: DELAY_ADDR,
            value: 0,
        }
    }

    pub fn with_target(mut self, target: ChipMask) -> Self {
        self.target = target;
        self
    }

    pub fn is_delay_only(&self) -> bool {
        self.addr == DELAY_ADDR
    }

    /// Emit this event `delay` cycles after the previous one, preceded by as
    /// many pure delays as a delay wider than one event needs
    pub fn emit_after<F>(mut self, delay: u64, mut emit: F)
    where
        F: FnMut(RegisterEvent),
    {
        let max = u64::from(u32::MAX);
        let mut delay = delay;
        while delay > max {
            emit(Self::delay_only(u32::MAX));
            delay -= max;
        }
        self.delay = delay as u32;
        emit(self);
    }
}

impl Default for RegisterEvent {
    fn default() -> Self {
        Self::delay_only(0)
    }
}
