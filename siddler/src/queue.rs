use log::{trace, warn};

use crate::event::RegisterEvent;

/// Which event absorbs the delay of an event dropped on overflow
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OverflowMerge {
    /// Oldest surviving event, so later events keep their offsets
    IntoOldest,
    /// The event being pushed
    IntoNewest,
}

impl Default for OverflowMerge {
    fn default() -> Self {
        OverflowMerge::IntoOldest
    }
}

/// Fixed capacity ring of events that never refuses a push.
///
/// When full, the oldest event is dropped and whatever remains of its delay
/// is folded into a surviving event, so the cycle time held by the queue
/// never shrinks because of an overflow.
#[derive(Debug)]
pub struct EventQueue<const N: usize> {
    slots: [RegisterEvent; N],
    head: usize,
    tail: usize,
    count: usize,
    cycles_to_next: Option<u32>,
    queued_cycles: u64,
    dropped: u32,
    high_water: usize,
    merge: OverflowMerge,
}

impl<const N: usize> EventQueue<N> {
    pub fn new() -> Self {
        Self::with_merge(OverflowMerge::default())
    }

    pub fn with_merge(merge: OverflowMerge) -> Self {
        Self {
            slots: [RegisterEvent::default(); N],
            head: 0,
            tail: 0,
            count: 0,
            cycles_to_next: None,
            queued_cycles: 0,
            dropped: 0,
            high_water: 0,
            merge,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn merge_policy(&self) -> OverflowMerge {
        self.merge
    }

    pub fn push(&mut self, mut event: RegisterEvent) {
        self.queued_cycles += u64::from(event.delay);
        if self.count == N {
            let folded = self.cycles_to_next.unwrap_or(0);
            self.head = (self.head + 1) % N;
            self.count -= 1;
            self.dropped = self.dropped.saturating_add(1);

            let lost = self.fold(&mut event, folded);
            if lost > 0 {
                warn!("queue cannot hold {} folded cycles", lost);
                self.queued_cycles -= u64::from(lost);
            }
            self.cycles_to_next = if self.count > 0 {
                Some(self.slots[self.head].delay)
            } else {
                None
            };
            trace!("queue full, dropped oldest ({} cycles folded)", folded);
        }

        self.slots[self.tail] = event;
        self.tail = (self.tail + 1) % N;
        self.count += 1;
        if self.count == 1 {
            self.cycles_to_next = Some(event.delay);
        }
        self.high_water = self.high_water.max(self.count);
    }

    /// Spread `cycles` over the survivors and the incoming event without
    /// pushing any delay past `u32::MAX`. Returns what could not be placed.
    ///
    /// Survivors are filled oldest first for `IntoOldest`, so an event that
    /// cannot absorb everything fires early and the next one keeps its
    /// offset. `IntoNewest` fills the incoming event first and walks back
    /// from the newest survivor.
    fn fold(&mut self, incoming: &mut RegisterEvent, mut cycles: u32) -> u32 {
        match self.merge {
            OverflowMerge::IntoOldest => {
                for i in 0..self.count {
                    absorb(&mut self.slots[(self.head + i) % N].delay, &mut cycles);
                }
                absorb(&mut incoming.delay, &mut cycles);
            }
            OverflowMerge::IntoNewest => {
                absorb(&mut incoming.delay, &mut cycles);
                for i in (0..self.count).rev() {
                    absorb(&mut self.slots[(self.head + i) % N].delay, &mut cycles);
                }
            }
        }
        cycles
    }

    pub fn pop(&mut self) -> Option<RegisterEvent> {
        if self.count == 0 {
            return None;
        }
        let event = self.slots[self.head];
        let remaining = self.cycles_to_next.unwrap_or(0);
        self.queued_cycles = self.queued_cycles.saturating_sub(u64::from(remaining));
        self.head = (self.head + 1) % N;
        self.count -= 1;
        self.cycles_to_next = if self.count > 0 {
            Some(self.slots[self.head].delay)
        } else {
            None
        };
        Some(event)
    }

    pub fn peek(&self) -> Option<&RegisterEvent> {
        if self.count == 0 {
            None
        } else {
            Some(&self.slots[self.head])
        }
    }

    /// Cycles left before the head event is due, `None` when empty
    pub fn peek_cycles_to_next(&self) -> Option<u32> {
        self.cycles_to_next
    }

    /// Let `cycles` elapse against the head event. Callers never advance past
    /// it; excess cycles are ignored.
    pub fn advance(&mut self, cycles: u32) {
        if let Some(left) = self.cycles_to_next.as_mut() {
            let run = cycles.min(*left);
            *left -= run;
            self.queued_cycles = self.queued_cycles.saturating_sub(u64::from(run));
        }
    }

    pub fn depth(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    pub fn dropped_count(&self) -> u32 {
        self.dropped
    }

    /// Cycles still to elapse until the last queued event is due
    pub fn queued_cycles(&self) -> u64 {
        self.queued_cycles
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Forget every event and counter, keeping the capacity and merge policy
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
        self.cycles_to_next = None;
        self.queued_cycles = 0;
        self.dropped = 0;
        self.high_water = 0;
    }

    /// Queued events, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &RegisterEvent> + '_ {
        (0..self.count).map(move |i| &self.slots[(self.head + i) % N])
    }
}

fn absorb(delay: &mut u32, cycles: &mut u32) {
    let take = (u32::MAX - *delay).min(*cycles);
    *delay += take;
    *cycles -= take;
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
