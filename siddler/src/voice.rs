//! Note-driven producer: voice allocation and SID note writes.

use crate::context::SoundChip;
use crate::dispatch::Dispatcher;
use crate::event::RegisterEvent;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VoiceState {
    pub active: bool,
    pub note: u8,
    pub velocity: u8,
    pub generation: u32,
}

/// Assigns notes to a fixed set of voices, stealing the least recently
/// started voice when all of them sound.
///
/// Equal generations resolve to the lowest voice index.
#[derive(Debug)]
pub struct VoiceAllocator<const V: usize> {
    voices: [VoiceState; V],
    generation: u32,
}

impl<const V: usize> VoiceAllocator<V> {
    pub fn new() -> Self {
        Self {
            voices: [VoiceState::default(); V],
            generation: 0,
        }
    }

    pub fn voices(&self) -> &[VoiceState; V] {
        &self.voices
    }

    /// Voice currently holding `note`
    pub fn find(&self, note: u8) -> Option<usize> {
        self.voices
            .iter()
            .position(|voice| voice.active && voice.note == note)
    }

    /// Pick a voice for `note`; only fails without any voice at all
    pub fn note_on(&mut self, note: u8, velocity: u8) -> Option<usize> {
        let index = self
            .find(note)
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .filter(|(_, voice)| !voice.active)
                    .min_by_key(|(_, voice)| voice.generation)
                    .map(|(i, _)| i)
            })
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, voice)| voice.generation)
                    .map(|(i, _)| i)
            })?;

        self.generation = self.generation.wrapping_add(1);
        self.voices[index] = VoiceState {
            active: true,
            note,
            velocity,
            generation: self.generation,
        };
        Some(index)
    }

    /// Release `note`, if some voice holds it
    pub fn note_off(&mut self, note: u8) -> Option<usize> {
        let index = self.find(note)?;
        self.voices[index].active = false;
        Some(index)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl<const V: usize> Default for VoiceAllocator<V> {
    fn default() -> Self {
        Self::new()
    }
}

const VOICE_STRIDE: u8 = 7;
const REG_FREQ_LO: u8 = 0;
const REG_FREQ_HI: u8 = 1;
const REG_CONTROL: u8 = 4;
const REG_ATTACK_DECAY: u8 = 5;
const REG_SUSTAIN_RELEASE: u8 = 6;
const REG_MODE_VOLUME: u8 = 0x18;

const CTRL_GATE: u8 = 0x01;
const CTRL_TEST: u8 = 0x08;
const CTRL_SAW: u8 = 0x20;

const DEFAULT_ATTACK_DECAY: u8 = 0x11;
const DEFAULT_RELEASE: u8 = 0x04;

/// Frequency register values of MIDI notes 60..=71 at a PAL clock
const OCTAVE_FOUR: [u16; 12] = [
    4455, 4720, 5001, 5298, 5613, 5947, 6300, 6675, 7072, 7493, 7938, 8410,
];

pub fn sid_frequency(note: u8) -> u16 {
    let offset = i32::from(note) - 60;
    let base = u32::from(OCTAVE_FOUR[offset.rem_euclid(12) as usize]);
    let octave = offset.div_euclid(12);
    let freq = if octave >= 0 {
        base << octave
    } else {
        base >> -octave
    };
    freq.min(u32::from(u16::MAX)) as u16
}

pub fn velocity_to_sustain(velocity: u8) -> u8 {
    ((u16::from(velocity) * 15 + 63) / 127).min(15) as u8
}

/// Plays notes on the three SID voices through a dispatcher
#[derive(Debug, Default)]
pub struct NotePlayer {
    voices: VoiceAllocator<3>,
}

impl NotePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voices(&self) -> &VoiceAllocator<3> {
        &self.voices
    }

    fn write<C: SoundChip, const N: usize>(
        disp: &mut Dispatcher<C, N>,
        voice: usize,
        reg: u8,
        value: u8,
    ) {
        let addr = voice as u8 * VOICE_STRIDE + reg;
        disp.queue_event(RegisterEvent::write(0, addr, value));
    }

    /// Saw waveform, short attack, full sustain and full volume
    pub fn configure<C: SoundChip, const N: usize>(&mut self, disp: &mut Dispatcher<C, N>) {
        self.voices.reset();
        for voice in 0..3 {
            Self::write(disp, voice, REG_ATTACK_DECAY, DEFAULT_ATTACK_DECAY);
            Self::write(disp, voice, REG_SUSTAIN_RELEASE, 0xF0 | DEFAULT_RELEASE);
            Self::write(disp, voice, REG_CONTROL, CTRL_SAW);
        }
        disp.queue_event(RegisterEvent::write(0, REG_MODE_VOLUME, 0x0F));
    }

    pub fn note_on<C: SoundChip, const N: usize>(
        &mut self,
        disp: &mut Dispatcher<C, N>,
        note: u8,
        velocity: u8,
    ) -> Option<usize> {
        let voice = self.voices.note_on(note, velocity)?;
        let [lo, hi] = sid_frequency(note).to_le_bytes();
        let sustain = velocity_to_sustain(velocity);

        // retrigger the oscillator before the new pitch
        Self::write(disp, voice, REG_CONTROL, CTRL_TEST);
        Self::write(disp, voice, REG_CONTROL, 0);
        Self::write(disp, voice, REG_FREQ_LO, lo);
        Self::write(disp, voice, REG_FREQ_HI, hi);
        Self::write(disp, voice, REG_SUSTAIN_RELEASE, (sustain << 4) | DEFAULT_RELEASE);
        Self::write(disp, voice, REG_CONTROL, CTRL_SAW | CTRL_GATE);
        Some(voice)
    }

    pub fn note_off<C: SoundChip, const N: usize>(
        &mut self,
        disp: &mut Dispatcher<C, N>,
        note: u8,
    ) -> Option<usize> {
        let voice = self.voices.note_off(note)?;
        Self::write(disp, voice, REG_CONTROL, CTRL_SAW);
        Some(voice)
    }
}
