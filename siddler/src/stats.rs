use crate::event::RegisterEvent;

/// Counters of everything received from the host
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub total_events: u64,
    pub total_bytes: u64,
    pub total_frames: u64,
    pub total_cycles: u64,
    pub last_delay: u32,
    pub last_addr: u8,
    pub last_value: u8,
    /// Events arrived since the session started
    pub streaming: bool,
    pub desyncs: u32,
    pub desync_bytes: u64,
    pub commands: u32,
    pub frame_events_last: u16,
    pub frame_events_max: u16,
    frame_events_sum: u64,
}

impl LoaderStats {
    pub fn record_bytes(&mut self, count: usize) {
        self.total_bytes += count as u64;
    }

    pub fn record_event(&mut self, event: &RegisterEvent) {
        self.total_events += 1;
        self.total_cycles += u64::from(event.delay);
        self.last_delay = event.delay;
        self.last_addr = event.addr;
        self.last_value = event.value;
        self.streaming = true;
    }

    pub fn record_frame(&mut self, events: u16) {
        self.total_frames += 1;
        self.frame_events_last = events;
        self.frame_events_max = self.frame_events_max.max(events);
        self.frame_events_sum += u64::from(events);
    }

    pub fn record_resync(&mut self, skipped: usize) {
        self.desyncs = self.desyncs.saturating_add(1);
        self.desync_bytes += skipped as u64;
    }

    pub fn record_command(&mut self) {
        self.commands = self.commands.saturating_add(1);
    }

    pub fn average_frame_events(&self) -> u64 {
        if self.total_frames == 0 {
            0
        } else {
            self.frame_events_sum / self.total_frames
        }
    }

    /// Stream time received so far, as seconds and milliseconds
    pub fn elapsed(&self, chip_hz: u32) -> (u64, u64) {
        if chip_hz == 0 {
            return (0, 0);
        }
        let hz = u64::from(chip_hz);
        (
            self.total_cycles / hz,
            self.total_cycles % hz * 1000 / hz,
        )
    }

    /// Stop streaming; totals are kept
    pub fn end_stream(&mut self) {
        self.streaming = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
