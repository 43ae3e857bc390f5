use heapless::Vec;

use crate::config::Config;
use crate::context::SoundChip;
use crate::engine::Engine;
use crate::event::MAX_CHIPS;
use crate::shared::SharedStatus;

pub struct Builder<'a, C: SoundChip, const IN: usize, const OUT: usize> {
    config: Config,
    shared: Option<&'a SharedStatus>,
    chips: Vec<C, MAX_CHIPS>,
    too_many: bool,
    audio_ready: bool,
}

impl<'a, C: SoundChip, const IN: usize, const OUT: usize> Builder<'a, C, IN, OUT> {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            shared: None,
            chips: Vec::new(),
            too_many: false,
            audio_ready: true,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_shared(mut self, shared: &'a SharedStatus) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn with_chip(mut self, chip: C) -> Self {
        if self.chips.push(chip).is_err() {
            self.too_many = true;
        }
        self
    }

    pub fn with_chips<I: IntoIterator<Item = C>>(self, chips: I) -> Self {
        chips.into_iter().fold(self, Self::with_chip)
    }

    /// Whether the audio output came up; without it nothing is clocked
    pub fn with_audio(mut self, ready: bool) -> Self {
        self.audio_ready = ready;
        self
    }

    pub fn build(self) -> Result<Engine<'a, C, IN, OUT>, &'static str> {
        let shared = self.shared.ok_or("Shared status not provided")?;
        if self.too_many {
            return Err("Too many chips");
        }
        if self.chips.is_empty() {
            return Err("Chip not provided");
        }
        Engine::new(self.config, shared, self.chips, self.audio_ready)
    }
}

impl<'a, C: SoundChip, const IN: usize, const OUT: usize> Default for Builder<'a, C, IN, OUT> {
    fn default() -> Self {
        Self::new()
    }
}
