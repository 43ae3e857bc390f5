//! Cycle-accurate dispatch of queued register writes.
//!
//! Every rendered sample owes the chips `chip_hz / sample_rate` cycles. The
//! dispatcher spends them in runs that end exactly on the next queued event,
//! applies the event, and carries on until the sample's cycles are used up.

use heapless::Vec;

use crate::context::SoundChip;
use crate::control::ChipMode;
use crate::event::{RegisterEvent, MAX_CHIPS, REGISTER_MASK};
use crate::queue::{EventQueue, OverflowMerge};

/// Left and right output sample
pub type StereoFrame = [i16; 2];

/// Unity gain in the 8.8 fixed point gain format
pub const GAIN_UNITY: i32 = 256;

/// Splits a chip clock into whole cycles per output sample without drift.
///
/// The fractional part is carried as an exact remainder of `sample_rate`.
#[derive(Debug)]
pub struct RateAccumulator {
    chip_hz: u32,
    sample_rate: u32,
    residual: u32,
}

impl RateAccumulator {
    pub fn new(chip_hz: u32, sample_rate: u32) -> Result<Self, &'static str> {
        if sample_rate == 0 {
            return Err("Sample rate must not be zero");
        }
        Ok(Self {
            chip_hz,
            sample_rate,
            residual: 0,
        })
    }

    /// Cycles owed for the next sample, never zero
    pub fn next_due(&mut self) -> u32 {
        let owed = u64::from(self.residual) + u64::from(self.chip_hz);
        let due = owed / u64::from(self.sample_rate);
        if due == 0 {
            self.residual = 0;
            return 1;
        }
        self.residual = (owed % u64::from(self.sample_rate)) as u32;
        due.min(u64::from(u32::MAX)) as u32
    }

    pub fn reset(&mut self) {
        self.residual = 0;
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub depth: usize,
    pub dropped: u32,
    pub cycles_to_next: Option<u32>,
    pub queued_cycles: u64,
}

impl QueueStats {
    pub fn of<const N: usize>(queue: &EventQueue<N>) -> Self {
        Self {
            depth: queue.depth(),
            dropped: queue.dropped_count(),
            cycles_to_next: queue.peek_cycles_to_next(),
            queued_cycles: queue.queued_cycles(),
        }
    }
}

/// Drains the chip-facing queue in step with the audio sample clock
pub struct Dispatcher<C: SoundChip, const N: usize> {
    chips: Vec<C, MAX_CHIPS>,
    active: usize,
    queue: EventQueue<N>,
    rate: RateAccumulator,
    gain_q8: i32,
    elapsed: u64,
}

impl<C: SoundChip, const N: usize> Dispatcher<C, N> {
    pub fn new(chips: Vec<C, MAX_CHIPS>, rate: RateAccumulator, merge: OverflowMerge) -> Self {
        let active = chips.len().min(1);
        Self {
            chips,
            active,
            queue: EventQueue::with_merge(merge),
            rate,
            gain_q8: GAIN_UNITY,
            elapsed: 0,
        }
    }

    pub fn with_gain(mut self, gain_q8: i32) -> Self {
        self.gain_q8 = gain_q8;
        self
    }

    pub fn queue_event(&mut self, event: RegisterEvent) {
        self.queue.push(event);
    }

    pub fn queue(&self) -> &EventQueue<N> {
        &self.queue
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::of(&self.queue)
    }

    /// Chip cycles run since the last reset
    pub fn elapsed_cycles(&self) -> u64 {
        self.elapsed
    }

    /// Chips that currently receive writes and produce output
    pub fn active_chips(&self) -> usize {
        self.active
    }

    pub fn chips_mut(&mut self) -> &mut [C] {
        &mut self.chips
    }

    /// Switch chip models; split mode needs a second chip to take effect
    pub fn set_mode(&mut self, mode: ChipMode) {
        let models = mode.models();
        for (chip, model) in self.chips.iter_mut().zip(models.iter()) {
            chip.set_model(*model);
        }
        self.active = match mode {
            ChipMode::Split => self.chips.len().min(2),
            _ => self.chips.len().min(1),
        };
    }

    /// Drop queued events and residual time, and reset every chip
    pub fn reset(&mut self) {
        self.queue.reset();
        self.rate.reset();
        self.elapsed = 0;
        for chip in self.chips.iter_mut() {
            chip.reset();
        }
    }

    /// Render one sample into `out`; nothing happens without a destination
    pub fn render(&mut self, out: Option<&mut StereoFrame>) {
        if let Some(out) = out {
            *out = self.render_frame();
        }
    }

    pub fn render_frame(&mut self) -> StereoFrame {
        let due = self.rate.next_due();
        self.advance(due);
        self.sample()
    }

    pub fn fill(&mut self, frames: &mut [StereoFrame]) {
        for frame in frames.iter_mut() {
            *frame = self.render_frame();
        }
    }

    /// Run the chips for exactly `cycles`, applying every event that falls
    /// due on the way at its own cycle.
    pub fn advance(&mut self, cycles: u32) {
        let mut due = cycles;
        self.apply_due();
        while due > 0 {
            let run = match self.queue.peek_cycles_to_next() {
                Some(next) => due.min(next),
                None => due,
            };
            for chip in self.chips[..self.active].iter_mut() {
                chip.clock(run);
            }
            self.queue.advance(run);
            self.elapsed += u64::from(run);
            due -= run;
            self.apply_due();
        }
    }

    fn apply_due(&mut self) {
        while let Some(0) = self.queue.peek_cycles_to_next() {
            match self.queue.pop() {
                Some(event) => self.apply(&event),
                None => break,
            }
        }
    }

    fn apply(&mut self, event: &RegisterEvent) {
        if event.is_delay_only() {
            return;
        }
        let addr = event.addr & REGISTER_MASK;
        for (i, chip) in self.chips[..self.active].iter_mut().enumerate() {
            if event.target.contains(i) {
                chip.write(addr, event.value);
            }
        }
    }

    fn level(&mut self, chip: usize) -> i16 {
        let raw = i64::from(self.chips[chip].output()) * i64::from(self.gain_q8) >> 8;
        raw.max(i64::from(i16::MIN)).min(i64::from(i16::MAX)) as i16
    }

    fn sample(&mut self) -> StereoFrame {
        match self.active {
            0 => [0, 0],
            1 => {
                let mono = self.level(0);
                [mono, mono]
            }
            _ => [self.level(0), self.level(1)],
        }
    }
}
