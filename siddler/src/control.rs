//! Control plane: in-band host commands, local actions and chip modes.

use log::info;

use crate::event::{bit_set, ChipMask, RegisterEvent, REGISTER_MASK};
use crate::status::View;

/// Analog model an emulated chip instance runs as
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChipModel {
    Mos6581,
    Mos8580,
}

/// Chip configuration of the whole player
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChipMode {
    Mos6581,
    Mos8580,
    /// 6581 on the left channel, 8580 on the right
    Split,
}

impl ChipMode {
    pub fn next(self) -> Self {
        match self {
            ChipMode::Mos6581 => ChipMode::Mos8580,
            ChipMode::Mos8580 => ChipMode::Split,
            ChipMode::Split => ChipMode::Mos6581,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChipMode::Mos6581 => "6581",
            ChipMode::Mos8580 => "8580",
            ChipMode::Split => "6581+8580",
        }
    }

    /// Models for chip instances 0 and 1
    pub fn models(self) -> [ChipModel; 2] {
        match self {
            ChipMode::Mos6581 => [ChipModel::Mos6581, ChipModel::Mos6581],
            ChipMode::Mos8580 => [ChipModel::Mos8580, ChipModel::Mos8580],
            ChipMode::Split => [ChipModel::Mos6581, ChipModel::Mos8580],
        }
    }

    /// Selector used for events that address every chip
    pub fn default_target(self) -> ChipMask {
        match self {
            ChipMode::Split => ChipMask::from_bits(0b11),
            _ => ChipMask::single(0),
        }
    }
}

impl Default for ChipMode {
    fn default() -> Self {
        ChipMode::Mos6581
    }
}

pub const OP_CYCLE_CHIP_MODE: u8 = 0x01;
pub const OP_SET_VOICE_MASK: u8 = 0x02;
pub const OP_SET_FILTER: u8 = 0x03;

/// Command carried by a control frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    CycleChipMode,
    /// Bit `n` set mutes voice `n`
    SetVoiceMask(u8),
    /// Whether filter register writes are passed through
    SetFilter(bool),
    Unknown(u8),
}

impl Command {
    pub fn parse(raw: [u8; 4]) -> Self {
        match raw[0] {
            OP_CYCLE_CHIP_MODE => Command::CycleChipMode,
            OP_SET_VOICE_MASK => Command::SetVoiceMask(raw[1] & 0x07),
            OP_SET_FILTER => Command::SetFilter(raw[1] != 0),
            op => Command::Unknown(op),
        }
    }

    pub fn encode(self) -> [u8; 4] {
        match self {
            Command::CycleChipMode => [OP_CYCLE_CHIP_MODE, 0, 0, 0],
            Command::SetVoiceMask(mask) => [OP_SET_VOICE_MASK, mask, 0, 0],
            Command::SetFilter(enabled) => [OP_SET_FILTER, enabled as u8, 0, 0],
            Command::Unknown(op) => [op, 0, 0, 0],
        }
    }
}

/// Local user action, from a console key or a board button
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    TogglePause,
    ShowView(View),
    CycleView(i8),
    CycleChipMode,
    ScaleClock { num: u32, den: u32 },
    ResetClock,
}

impl Action {
    pub fn from_key(key: u8) -> Option<Self> {
        let action = match key {
            b'p' | b'P' | b' ' => Action::TogglePause,
            b'1' => Action::ShowView(View::Status),
            b'2' => Action::ShowView(View::UsbQueue),
            b'3' => Action::ShowView(View::SidQueue),
            b'4' | b'h' | b'H' => Action::ShowView(View::Hex),
            b'v' | b'V' => Action::CycleView(1),
            b'm' | b'M' => Action::CycleChipMode,
            b'[' => Action::ScaleClock { num: 99, den: 100 },
            b']' => Action::ScaleClock { num: 101, den: 100 },
            b'{' | b'<' => Action::ScaleClock { num: 9, den: 10 },
            b'}' | b'>' => Action::ScaleClock { num: 11, den: 10 },
            b'0' | b'=' => Action::ResetClock,
            _ => return None,
        };
        Some(action)
    }

    /// Buttons A, B and C of the board, on release
    pub fn from_button(index: usize) -> Option<Self> {
        match index {
            0 => Some(Action::CycleView(-1)),
            1 => Some(Action::CycleView(1)),
            2 => Some(Action::CycleChipMode),
            _ => None,
        }
    }
}

const FILTER_ADDR_MIN: u8 = 0x15;
const FILTER_ADDR_MAX: u8 = 0x18;

fn voice_of(reg: u8) -> Option<usize> {
    match reg {
        0x00..=0x06 => Some(0),
        0x07..=0x0D => Some(1),
        0x0E..=0x14 => Some(2),
        _ => None,
    }
}

/// Drops muted voice writes and, optionally, filter writes.
///
/// The delay of every dropped write is carried into the next forwarded
/// event so the stream keeps its timing.
#[derive(Debug, Default)]
pub struct EventFilter {
    voice_mute: u8,
    filter_blocked: bool,
    pending: u64,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_voice_mask(&mut self, mask: u8) {
        if mask != self.voice_mute {
            info!("voice mute mask -> {:03b}", mask);
        }
        self.voice_mute = mask;
    }

    pub fn set_filter_enabled(&mut self, enabled: bool) {
        if enabled == self.filter_blocked {
            info!("filter pass-through -> {}", if enabled { "on" } else { "off" });
        }
        self.filter_blocked = !enabled;
    }

    pub fn voice_mask(&self) -> u8 {
        self.voice_mute
    }

    pub fn filter_enabled(&self) -> bool {
        !self.filter_blocked
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn blocks(&self, event: &RegisterEvent) -> bool {
        if event.is_delay_only() {
            return false;
        }
        let reg = event.addr & REGISTER_MASK;
        if let Some(voice) = voice_of(reg) {
            if bit_set(&self.voice_mute, voice) {
                return true;
            }
        }
        self.filter_blocked && (FILTER_ADDR_MIN..=FILTER_ADDR_MAX).contains(&reg)
    }

    /// Hand `event` to `emit` unless it is blocked, carrying the time of
    /// blocked writes along
    pub fn pass<F>(&mut self, event: RegisterEvent, emit: F)
    where
        F: FnMut(RegisterEvent),
    {
        let delay = self.pending + u64::from(event.delay);
        if self.blocks(&event) {
            self.pending = delay;
        } else {
            self.pending = 0;
            event.emit_after(delay, emit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn chip_mode_cycles_through_all_modes() {
        let mode = ChipMode::default();
        assert_eq!(mode.next(), ChipMode::Mos8580);
        assert_eq!(mode.next().next(), ChipMode::Split);
        assert_eq!(mode.next().next().next(), mode);
        assert_eq!(ChipMode::Split.default_target(), ChipMask::from_bits(0b11));
        assert_eq!(ChipMode::Mos8580.default_target(), ChipMask::single(0));
    }

    #[test]
    fn command_parse_and_encode() {
        assert_eq!(Command::parse([0x01, 9, 9, 9]), Command::CycleChipMode);
        assert_eq!(Command::parse([0x02, 0b101, 0, 0]), Command::SetVoiceMask(0b101));
        assert_eq!(Command::parse([0x03, 0, 0, 0]), Command::SetFilter(false));
        assert_eq!(Command::parse([0x03, 7, 0, 0]), Command::SetFilter(true));
        assert_eq!(Command::parse([0x7E, 0, 0, 0]), Command::Unknown(0x7E));
        let cmd = Command::SetVoiceMask(0b011);
        assert_eq!(Command::parse(cmd.encode()), cmd);
    }

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(Action::from_key(b' '), Some(Action::TogglePause));
        assert_eq!(Action::from_key(b'h'), Some(Action::ShowView(View::Hex)));
        assert_eq!(
            Action::from_key(b'>'),
            Some(Action::ScaleClock { num: 11, den: 10 })
        );
        assert_eq!(Action::from_key(b'='), Some(Action::ResetClock));
        assert_eq!(Action::from_key(b'x'), None);
        assert_eq!(Action::from_button(0), Some(Action::CycleView(-1)));
        assert_eq!(Action::from_button(3), None);
    }

    fn pass(filter: &mut EventFilter, event: RegisterEvent) -> Vec<RegisterEvent> {
        let mut out = Vec::new();
        filter.pass(event, |ev| out.push(ev));
        out
    }

    #[test]
    fn transparent_filter_passes_everything() {
        let mut filter = EventFilter::new();
        let ev = RegisterEvent::write(10, 0x04, 0x41);
        assert_eq!(pass(&mut filter, ev), vec![ev]);
    }

    #[test]
    fn muted_voice_delay_moves_to_next_event() {
        let mut filter = EventFilter::new();
        filter.set_voice_mask(0b010);
        assert!(pass(&mut filter, RegisterEvent::write(10, 0x08, 1)).is_empty());
        assert!(pass(&mut filter, RegisterEvent::write(5, 0x0B, 1)).is_empty());
        let out = pass(&mut filter, RegisterEvent::write(7, 0x00, 2));
        assert_eq!(out, vec![RegisterEvent::write(22, 0x00, 2)]);
    }

    #[test]
    fn filter_registers_blocked_when_disabled() {
        let mut filter = EventFilter::new();
        filter.set_filter_enabled(false);
        assert!(pass(&mut filter, RegisterEvent::write(3, 0x17, 0xF1)).is_empty());
        assert!(pass(&mut filter, RegisterEvent::write(4, 0x18, 0x0F)).is_empty());
        let out = pass(&mut filter, RegisterEvent::delay_only(1));
        assert_eq!(out, vec![RegisterEvent::delay_only(8)]);
    }

    #[test]
    fn long_muted_delay_is_chained() {
        let mut filter = EventFilter::new();
        filter.set_voice_mask(0b001);
        assert!(pass(&mut filter, RegisterEvent::write(u32::MAX - 5, 0x04, 0x41)).is_empty());
        let out = pass(&mut filter, RegisterEvent::write(100, 0x0B, 0x21));
        assert_eq!(
            out,
            vec![
                RegisterEvent::delay_only(u32::MAX),
                RegisterEvent::write(95, 0x0B, 0x21),
            ]
        );
        let total: u64 = out.iter().map(|ev| u64::from(ev.delay)).sum();
        assert_eq!(total, u64::from(u32::MAX - 5) + 100);
    }
}
