//! Minimal three-voice square wave chip.
//!
//! Understands the frequency and control registers of each voice and the
//! master volume, so a board without a full emulator still makes sound.

use crate::context::SoundChip;
use crate::control::ChipModel;
use crate::event::REGISTER_MASK;

const VOICES: usize = 3;
const VOICE_STRIDE: usize = 7;
const REG_VOLUME: usize = 0x18;

const GATE: u8 = 0x01;
const TEST: u8 = 0x08;

const PHASE_MASK: u32 = 0x00FF_FFFF;
const PHASE_MSB: u32 = 0x0080_0000;

/// Peak level of one voice at full volume
pub const VOICE_LEVEL: i32 = 2048;
/// DC step per volume unit on the 6581
const DC_STEP: i32 = 64;

#[derive(Copy, Clone, Debug, Default)]
struct Voice {
    freq: u16,
    control: u8,
    phase: u32,
}

impl Voice {
    fn clock(&mut self, cycles: u32) {
        if self.control & TEST != 0 {
            self.phase = 0;
            return;
        }
        let step = u32::from(self.freq).wrapping_mul(cycles);
        self.phase = self.phase.wrapping_add(step) & PHASE_MASK;
    }

    fn level(&self, amplitude: i32) -> i32 {
        if self.control & GATE == 0 {
            0
        } else if self.phase & PHASE_MSB != 0 {
            amplitude
        } else {
            -amplitude
        }
    }
}

pub struct ToneChip {
    regs: [u8; 32],
    voices: [Voice; VOICES],
    model: ChipModel,
}

impl ToneChip {
    pub fn new(model: ChipModel) -> Self {
        Self {
            regs: [0; 32],
            voices: [Voice::default(); VOICES],
            model,
        }
    }

    pub fn model(&self) -> ChipModel {
        self.model
    }

    pub fn register(&self, addr: u8) -> u8 {
        self.regs[usize::from(addr & REGISTER_MASK)]
    }

    fn volume(&self) -> i32 {
        i32::from(self.regs[REG_VOLUME] & 0x0F)
    }
}

impl SoundChip for ToneChip {
    fn write(&mut self, addr: u8, value: u8) {
        let addr = usize::from(addr & REGISTER_MASK);
        self.regs[addr] = value;
        if addr >= VOICES * VOICE_STRIDE {
            return;
        }
        let voice = &mut self.voices[addr / VOICE_STRIDE];
        match addr % VOICE_STRIDE {
            0 => voice.freq = (voice.freq & 0xFF00) | u16::from(value),
            1 => voice.freq = (voice.freq & 0x00FF) | (u16::from(value) << 8),
            4 => {
                voice.control = value;
                if value & TEST != 0 {
                    voice.phase = 0;
                }
            }
            _ => {}
        }
    }

    fn clock(&mut self, cycles: u32) {
        for voice in self.voices.iter_mut() {
            voice.clock(cycles);
        }
    }

    fn output(&mut self) -> i32 {
        let volume = self.volume();
        let amplitude = VOICE_LEVEL * volume / 15;
        let mix: i32 = self.voices.iter().map(|v| v.level(amplitude)).sum();
        match self.model {
            ChipModel::Mos6581 => mix + volume * DC_STEP,
            ChipModel::Mos8580 => mix,
        }
    }

    fn set_model(&mut self, model: ChipModel) {
        self.model = model;
    }

    fn reset(&mut self) {
        self.regs = [0; 32];
        self.voices = [Voice::default(); VOICES];
    }
}
