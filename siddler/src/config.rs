use crate::clock::{SCALE_MAX, SCALE_MIN};
use crate::codec::{RecordFormat, MAX_FRAME_EVENTS};
use crate::control::ChipMode;
use crate::flow::Watermarks;
use crate::queue::OverflowMerge;

/// PAL C64 system clock
pub const PAL_CLOCK_HZ: u32 = 985_248;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_GAIN_Q8: i32 = 384;

/// Tunables of the engine
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub chip_clock_hz: u32,
    pub sample_rate_hz: u32,
    pub clock_scale_min: u32,
    pub clock_scale_max: u32,
    /// Ingestion gate, derived from the queue size when `None`
    pub ingest_marks: Option<(usize, usize)>,
    /// Dispatch gate, derived from the queue size when `None`
    pub dispatch_marks: Option<(usize, usize)>,
    pub read_chunk: usize,
    pub max_chunks: usize,
    pub status_period_us: u64,
    pub record_format: RecordFormat,
    pub max_frame_events: u16,
    pub overflow_merge: OverflowMerge,
    /// Push changed status rows to the host
    pub status_push: bool,
    /// Output gain in 8.8 fixed point
    pub output_gain_q8: i32,
    pub chip_mode: ChipMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chip_clock_hz: PAL_CLOCK_HZ,
            sample_rate_hz: DEFAULT_SAMPLE_RATE,
            clock_scale_min: SCALE_MIN,
            clock_scale_max: SCALE_MAX,
            ingest_marks: None,
            dispatch_marks: None,
            read_chunk: 512,
            max_chunks: 4,
            status_period_us: 100_000,
            record_format: RecordFormat::default(),
            max_frame_events: MAX_FRAME_EVENTS,
            overflow_merge: OverflowMerge::default(),
            status_push: false,
            output_gain_q8: DEFAULT_GAIN_Q8,
            chip_mode: ChipMode::default(),
        }
    }
}

fn marks_within(marks: (usize, usize), capacity: usize) -> Result<Watermarks, &'static str> {
    let marks = Watermarks::new(marks.0, marks.1)?;
    if marks.high() > capacity {
        return Err("High watermark above queue capacity");
    }
    Ok(marks)
}

impl Config {
    /// Gate for a host-facing queue of `capacity` events
    pub fn ingest_watermarks(&self, capacity: usize) -> Result<Watermarks, &'static str> {
        let marks = self
            .ingest_marks
            .unwrap_or((capacity / 16, capacity - capacity / 32));
        marks_within(marks, capacity)
    }

    /// Gate for a chip-facing queue of `capacity` events
    pub fn dispatch_watermarks(&self, capacity: usize) -> Result<Watermarks, &'static str> {
        let marks = self
            .dispatch_marks
            .unwrap_or((capacity / 2, capacity * 3 / 4));
        marks_within(marks, capacity)
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.sample_rate_hz == 0 {
            return Err("Sample rate must not be zero");
        }
        if self.chip_clock_hz == 0 {
            return Err("Chip clock must not be zero");
        }
        if self.clock_scale_min == 0 || self.clock_scale_min > self.clock_scale_max {
            return Err("Invalid clock scale band");
        }
        if self.read_chunk == 0 || self.max_chunks == 0 {
            return Err("Transport reads must be allowed");
        }
        if self.max_frame_events == 0 {
            return Err("Frames must hold at least one event");
        }
        Ok(())
    }
}
