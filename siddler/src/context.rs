//! Collaborators the pipeline is driven through.
//!
//! The engine loop talks to the transport, the audio output and the local
//! controls through an `EngineContext`; the renderer loop hands every
//! scanline to a `ScanlineContext`. Chip emulation sits behind `SoundChip`.
//!
//! Implementations for a board live outside this crate.

use core::convert::Infallible;

use crate::control::{Action, ChipModel};
use crate::dispatch::StereoFrame;
use crate::shared::TextRow;
use crate::visual::VisualParams;

/// Register-level interface of an emulated sound chip
pub trait SoundChip {
    /// Write `value` to register `addr` (`addr` < 0x20)
    fn write(&mut self, addr: u8, value: u8);
    /// Advance the emulation by `cycles` chip clock cycles
    fn clock(&mut self, cycles: u32);
    /// Current output sample, roughly in `i16` range
    fn output(&mut self) -> i32;
    fn set_model(&mut self, _model: ChipModel) {}
    fn reset(&mut self) {}
}

/// Platform side of the engine loop
pub trait EngineContext {
    /// Whether a host is attached to the transport
    fn connected(&mut self) -> bool;
    /// Read whatever bytes are available into `buf`
    ///
    /// `WouldBlock` when nothing arrived since the last call
    fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Infallible>;
    /// Write all of `data` or nothing
    fn write(&mut self, data: &[u8]) -> nb::Result<(), Infallible>;
    /// Free output buffer to be filled with samples
    ///
    /// `WouldBlock` while every buffer is still queued for playback
    fn audio_buffer(&mut self) -> nb::Result<&mut [StereoFrame], Infallible>;
    /// Hand the buffer obtained from `audio_buffer` over for playback
    fn submit_audio(&mut self);
    /// Next pending key press or button release
    fn poll_action(&mut self) -> Option<Action>;
    /// Monotonic time in microseconds
    fn now_us(&mut self) -> u64;
    /// Bytes from a MIDI input, for platforms that have one
    fn read_midi(&mut self, _buf: &mut [u8]) -> nb::Result<usize, Infallible> {
        Err(nb::Error::WouldBlock)
    }
}

/// Everything needed to draw one scanline
#[derive(Debug)]
pub struct ScanlineInput<'a> {
    pub text: &'a TextRow,
    /// Text row the scanline belongs to
    pub text_row: u8,
    /// Pixel row inside the glyph
    pub glyph_row: u8,
    pub visual: VisualParams,
}

/// Platform side of the renderer loop
pub trait ScanlineContext {
    /// Scanline that must be produced next
    ///
    /// `WouldBlock` until the video timing asks for one
    fn next_scanline(&mut self) -> nb::Result<u16, Infallible>;
    fn lines_per_frame(&self) -> u16;
    /// Draw `scanline`
    fn emit(&mut self, scanline: u16, input: &ScanlineInput<'_>);
}
