#![allow(dead_code)]

use core::convert::Infallible;
use std::time::Instant;

use siddler::codec::{FrameHeader, RecordFormat, HEADER_LEN};
use siddler::{Action, EngineContext, RegisterEvent, SoundChip, StereoFrame};

/// Chip that stamps every write with the cycle it landed on
#[derive(Debug, Default)]
pub struct StampChip {
    pub cycles: u64,
    pub writes: Vec<(u64, u8, u8)>,
    pub resets: usize,
}

impl SoundChip for StampChip {
    fn write(&mut self, addr: u8, value: u8) {
        self.writes.push((self.cycles, addr, value));
    }

    fn clock(&mut self, cycles: u32) {
        self.cycles += u64::from(cycles);
    }

    fn output(&mut self) -> i32 {
        0
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

/// Host that has everything it will ever send ready from the start
pub struct HostContext {
    inbound: Vec<u8>,
    cursor: usize,
    pub outbound: Vec<u8>,
    audio: Vec<StereoFrame>,
    pub played: usize,
    pub actions: Vec<Action>,
    started: Instant,
}

impl HostContext {
    pub fn new(inbound: Vec<u8>, audio_frames: usize) -> Self {
        Self {
            inbound,
            cursor: 0,
            outbound: Vec::new(),
            audio: vec![[0; 2]; audio_frames],
            played: 0,
            actions: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn drained(&self) -> bool {
        self.cursor == self.inbound.len()
    }
}

impl EngineContext for HostContext {
    fn connected(&mut self) -> bool {
        true
    }

    fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Infallible> {
        let rest = &self.inbound[self.cursor..];
        if rest.is_empty() {
            return Err(nb::Error::WouldBlock);
        }
        let count = rest.len().min(buf.len());
        buf[..count].copy_from_slice(&rest[..count]);
        self.cursor += count;
        Ok(count)
    }

    fn write(&mut self, data: &[u8]) -> nb::Result<(), Infallible> {
        self.outbound.extend_from_slice(data);
        Ok(())
    }

    fn audio_buffer(&mut self) -> nb::Result<&mut [StereoFrame], Infallible> {
        Ok(&mut self.audio)
    }

    fn submit_audio(&mut self) {
        self.played += self.audio.len();
    }

    fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop()
    }

    fn now_us(&mut self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }
}

/// Host stream carrying `events` split into frames of `per_frame`
pub fn stream(events: &[RegisterEvent], per_frame: usize) -> Vec<u8> {
    let format = RecordFormat::Narrow;
    let mut out = Vec::new();
    for (sequence, chunk) in events.chunks(per_frame).enumerate() {
        let mut header = [0u8; HEADER_LEN];
        FrameHeader {
            count: chunk.len() as u16,
            sequence: sequence as u32,
        }
        .encode(&mut header)
        .unwrap();
        out.extend_from_slice(&header);
        for event in chunk {
            let mut record = [0u8; 4];
            format.encode(event, &mut record).unwrap();
            out.extend_from_slice(&record);
        }
    }
    out
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
