//! Wire codec for event frames.
//!
//! A frame is a 10 byte little-endian header followed by `count` fixed-size
//! event records:
//!
//! ```text
//! +-------------+-----------+----------------+----------------------+
//! | magic (u32) | count u16 | sequence (u32) | count * record       |
//! +-------------+-----------+----------------+----------------------+
//! ```
//!
//! A header with `count == 0xFFFF` introduces a 4 byte control command
//! instead of event records.
//!
//! Decoding never fails: bytes that do not start a valid header are skipped
//! one at a time until the stream lines up again.

use crate::control::Command;
use crate::event::{ChipMask, RegisterEvent};

pub const MAGIC: u32 = 0x5349_4446;
pub const HEADER_LEN: usize = 10;
pub const COMMAND_COUNT: u16 = 0xFFFF;
pub const COMMAND_LEN: usize = 4;
/// Default upper bound of events one frame may declare
pub const MAX_FRAME_EVENTS: u16 = 4096;

const STAGE_LEN: usize = HEADER_LEN;

fn le_u16(raw: &[u8]) -> u16 {
    u16::from_le_bytes([raw[0], raw[1]])
}

fn le_u32(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

/// Layout of one event record
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecordFormat {
    /// u16 delay, address, value; implicit "all chips" target
    Narrow,
    /// u32 delay, target selector, address, value
    Wide,
}

impl RecordFormat {
    pub const fn len(self) -> usize {
        match self {
            RecordFormat::Narrow => 4,
            RecordFormat::Wide => 7,
        }
    }

    /// Longest delay a single record can carry
    pub const fn max_delay(self) -> u32 {
        match self {
            RecordFormat::Narrow => u16::MAX as u32,
            RecordFormat::Wide => u32::MAX,
        }
    }

    pub fn decode(self, raw: &[u8]) -> RegisterEvent {
        match self {
            RecordFormat::Narrow => RegisterEvent::write(u32::from(le_u16(raw)), raw[2], raw[3]),
            RecordFormat::Wide => RegisterEvent::write(le_u32(raw), raw[5], raw[6])
                .with_target(ChipMask::from_bits(raw[4])),
        }
    }

    /// Encode `event`, whose delay must fit this format
    pub fn encode(self, event: &RegisterEvent, out: &mut [u8]) -> Result<usize, &'static str> {
        if out.len() < self.len() {
            return Err("Output buffer too small");
        }
        if event.delay > self.max_delay() {
            return Err("Delay does not fit record");
        }
        match self {
            RecordFormat::Narrow => {
                out[..2].copy_from_slice(&(event.delay as u16).to_le_bytes());
                out[2] = event.addr;
                out[3] = event.value;
            }
            RecordFormat::Wide => {
                out[..4].copy_from_slice(&event.delay.to_le_bytes());
                out[4] = event.target.bits();
                out[5] = event.addr;
                out[6] = event.value;
            }
        }
        Ok(self.len())
    }
}

impl Default for RecordFormat {
    fn default() -> Self {
        RecordFormat::Narrow
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub count: u16,
    pub sequence: u32,
}

impl FrameHeader {
    pub fn command() -> Self {
        Self {
            count: COMMAND_COUNT,
            sequence: 0,
        }
    }

    pub fn is_command(&self) -> bool {
        self.count == COMMAND_COUNT
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<usize, &'static str> {
        if out.len() < HEADER_LEN {
            return Err("Output buffer too small");
        }
        out[..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4..6].copy_from_slice(&self.count.to_le_bytes());
        out[6..10].copy_from_slice(&self.sequence.to_le_bytes());
        Ok(HEADER_LEN)
    }
}

/// Write a complete command frame
pub fn encode_command(command: Command, out: &mut [u8]) -> Result<usize, &'static str> {
    if out.len() < HEADER_LEN + COMMAND_LEN {
        return Err("Output buffer too small");
    }
    let len = FrameHeader::command().encode(out)?;
    out[len..len + COMMAND_LEN].copy_from_slice(&command.encode());
    Ok(len + COMMAND_LEN)
}

/// Emit `event` preceded by as many pure-delay events as needed to carry a
/// delay longer than `format` allows in one record.
pub fn chain_delay<F>(format: RecordFormat, mut event: RegisterEvent, mut emit: F)
where
    F: FnMut(RegisterEvent),
{
    let max = format.max_delay();
    while event.delay > max {
        emit(RegisterEvent::delay_only(max));
        event.delay -= max;
    }
    emit(event);
}

/// Item produced by the decoder
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Event(RegisterEvent),
    /// All events declared by a header were delivered
    FrameComplete { sequence: u32, events: u16 },
    Command(Command),
    /// A header was found after `skipped` misaligned bytes
    Resync { skipped: usize },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Header,
    Events { sequence: u32, count: u16, remaining: u16 },
    Command,
}

/// Incremental frame decoder.
///
/// Partial records stay staged inside the decoder until the rest of their
/// bytes arrive; nothing is emitted for them meanwhile.
#[derive(Debug)]
pub struct FrameDecoder {
    format: RecordFormat,
    max_events: u16,
    state: State,
    stage: [u8; STAGE_LEN],
    have: usize,
    skipped: usize,
    skipped_total: u64,
    pending: Option<Decoded>,
}

impl FrameDecoder {
    pub fn new(format: RecordFormat) -> Self {
        Self::with_limit(format, MAX_FRAME_EVENTS)
    }

    pub fn with_limit(format: RecordFormat, max_events: u16) -> Self {
        Self {
            format,
            max_events: max_events.min(COMMAND_COUNT - 1),
            state: State::Header,
            stage: [0; STAGE_LEN],
            have: 0,
            skipped: 0,
            skipped_total: 0,
            pending: None,
        }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Whether any part of a frame has been received but not completed
    pub fn is_mid_frame(&self) -> bool {
        self.have > 0 || self.state != State::Header || self.pending.is_some()
    }

    /// Bytes dropped while hunting for a header, over the decoder lifetime
    pub fn skipped_total(&self) -> u64 {
        self.skipped_total
    }

    /// Bytes dropped since the last header that no `Resync` reported yet
    pub fn hunting(&self) -> usize {
        self.skipped
    }

    /// Discard any partial frame and wait for a header.
    ///
    /// Returns the bytes of an unfinished hunt, which no `Resync` will
    /// report any more.
    pub fn reset(&mut self) -> usize {
        let skipped = self.skipped;
        self.state = State::Header;
        self.have = 0;
        self.skipped = 0;
        self.pending = None;
        skipped
    }

    /// Decode the next item, consuming bytes from the front of `input`.
    ///
    /// Returns `None` once `input` is exhausted without completing an item.
    pub fn next(&mut self, input: &mut &[u8]) -> Option<Decoded> {
        if let Some(item) = self.pending.take() {
            return Some(item);
        }
        while let Some((&byte, rest)) = input.split_first() {
            *input = rest;
            if let Some(item) = self.push(byte) {
                return Some(item);
            }
        }
        None
    }

    /// Decode all of `data`, handing every item to `f`
    pub fn feed<F>(&mut self, mut data: &[u8], mut f: F)
    where
        F: FnMut(Decoded),
    {
        while let Some(item) = self.next(&mut data) {
            f(item);
        }
    }

    fn push(&mut self, byte: u8) -> Option<Decoded> {
        self.stage[self.have] = byte;
        self.have += 1;
        match self.state {
            State::Header => self.push_header(),
            State::Events {
                sequence,
                count,
                remaining,
            } => {
                if self.have < self.format.len() {
                    return None;
                }
                let event = self.format.decode(&self.stage[..self.have]);
                self.have = 0;
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.state = State::Header;
                    self.pending = Some(Decoded::FrameComplete {
                        sequence,
                        events: count,
                    });
                } else {
                    self.state = State::Events {
                        sequence,
                        count,
                        remaining,
                    };
                }
                Some(Decoded::Event(event))
            }
            State::Command => {
                if self.have < COMMAND_LEN {
                    return None;
                }
                let raw = [self.stage[0], self.stage[1], self.stage[2], self.stage[3]];
                self.have = 0;
                self.state = State::Header;
                Some(Decoded::Command(Command::parse(raw)))
            }
        }
    }

    fn skip_one(&mut self) {
        self.stage.copy_within(1..self.have, 0);
        self.have -= 1;
        self.skipped += 1;
        self.skipped_total += 1;
    }

    fn push_header(&mut self) -> Option<Decoded> {
        // reject as soon as the magic, then the count, can be judged
        loop {
            if self.have >= 4 && le_u32(&self.stage[..4]) != MAGIC {
                self.skip_one();
                continue;
            }
            if self.have >= 6 {
                let count = le_u16(&self.stage[4..6]);
                if count != COMMAND_COUNT && count > self.max_events {
                    self.skip_one();
                    continue;
                }
            }
            break;
        }
        if self.have < HEADER_LEN {
            return None;
        }

        let header = FrameHeader {
            count: le_u16(&self.stage[4..6]),
            sequence: le_u32(&self.stage[6..10]),
        };
        self.have = 0;

        let item = if header.is_command() {
            self.state = State::Command;
            None
        } else if header.count == 0 {
            Some(Decoded::FrameComplete {
                sequence: header.sequence,
                events: 0,
            })
        } else {
            self.state = State::Events {
                sequence: header.sequence,
                count: header.count,
                remaining: header.count,
            };
            None
        };

        if self.skipped > 0 {
            let skipped = self.skipped;
            self.skipped = 0;
            self.pending = item;
            Some(Decoded::Resync { skipped })
        } else {
            item
        }
    }
}
