use crate::event::RegisterEvent;

const REG_MODE_VOLUME: u8 = 0x18;

/// Parameters the renderer derives its colours and wave overlay from
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VisualParams {
    pub hue: u8,
    pub brightness: u8,
    pub wave_depth: u8,
    pub polarity: bool,
}

impl VisualParams {
    pub const fn blank() -> Self {
        Self {
            hue: 0,
            brightness: 0,
            wave_depth: 0,
            polarity: false,
        }
    }

    /// Fold a completed input frame into the record
    pub fn absorb(&mut self, frame: &FrameSummary) {
        self.hue = self.hue.wrapping_add(frame.events as u8);
        let flash = (64 + u32::from(frame.writes) * 8).min(255) as u8;
        self.brightness = self.brightness.max(flash);
        if let Some(volume) = frame.volume {
            self.wave_depth = (volume & 0x0F) * 17;
        }
        self.polarity = frame.sequence & 1 == 1;
    }

    /// Decay applied once per video frame
    pub fn age(&mut self) {
        self.brightness = self.brightness.saturating_sub(self.brightness / 16 + 1);
        self.wave_depth = self.wave_depth.saturating_sub(1);
    }
}

/// What the engine saw of the input frame being received
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub sequence: u32,
    pub events: u16,
    pub writes: u16,
    pub volume: Option<u8>,
}

impl FrameSummary {
    pub fn observe(&mut self, event: &RegisterEvent) {
        self.events = self.events.saturating_add(1);
        if event.is_delay_only() {
            return;
        }
        self.writes = self.writes.saturating_add(1);
        if event.addr == REG_MODE_VOLUME {
            self.volume = Some(event.value);
        }
    }

    /// Close the frame and start collecting the next one
    pub fn finish(&mut self, sequence: u32) -> FrameSummary {
        let mut done = *self;
        done.sequence = sequence;
        *self = Self::default();
        done
    }
}
