use log::debug;

/// Depth thresholds of a hysteresis gate, `low < high`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Watermarks {
    low: usize,
    high: usize,
}

impl Watermarks {
    pub fn new(low: usize, high: usize) -> Result<Self, &'static str> {
        if low >= high {
            return Err("Low watermark must be below high watermark");
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> usize {
        self.low
    }

    pub fn high(&self) -> usize {
        self.high
    }
}

/// Pauses a producer once a queue fills up to `high` and lets it run again
/// only after the queue drained down to `low`.
#[derive(Debug)]
pub struct FlowGate {
    name: &'static str,
    marks: Watermarks,
    paused: bool,
}

impl FlowGate {
    pub fn new(name: &'static str, marks: Watermarks) -> Self {
        Self {
            name,
            marks,
            paused: false,
        }
    }

    /// Update the gate with the current depth; returns whether the producer
    /// may run.
    pub fn consider(&mut self, depth: usize) -> bool {
        if !self.paused && depth >= self.marks.high {
            self.paused = true;
            debug!("{} paused at depth {}", self.name, depth);
        } else if self.paused && depth <= self.marks.low {
            self.paused = false;
            debug!("{} resumed at depth {}", self.name, depth);
        }
        !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn watermarks(&self) -> Watermarks {
        self.marks
    }

    pub fn reset(&mut self) {
        self.paused = false;
    }
}
