use stm32f3xx_hal as stm32f303;

use core::convert::Infallible;

use cortex_m::peripheral::DWT;
use stm32f303::hal::{
    digital::v2::{InputPin, OutputPin},
    serial::{Read, Write},
};

use peripherals::{AudioSink, Buttons, Console, MidiIn, SerialTransport};
use siddler::{Action, EngineContext, StereoFrame};

/// Everything the engine loop touches on the board
pub(crate) struct BoardContext<'a, TX, DTR, RTS, KEYS, MIDI> {
    pub transport: SerialTransport<TX, DTR, RTS>,
    pub audio: AudioSink,
    pub console: Console<KEYS>,
    pub buttons: Buttons<'a>,
    pub midi: MidiIn<MIDI>,
    cycles_per_us: u32,
    last_cycles: u32,
    cycles: u64,
}

impl<'a, TX, DTR, RTS, KEYS, MIDI> BoardContext<'a, TX, DTR, RTS, KEYS, MIDI> {
    pub fn new(
        transport: SerialTransport<TX, DTR, RTS>,
        audio: AudioSink,
        console: Console<KEYS>,
        buttons: Buttons<'a>,
        midi: MidiIn<MIDI>,
        sysclk_hz: u32,
    ) -> Self {
        Self {
            transport,
            audio,
            console,
            buttons,
            midi,
            cycles_per_us: (sysclk_hz / 1_000_000).max(1),
            last_cycles: DWT::get_cycle_count(),
            cycles: 0,
        }
    }
}

impl<'a, TX, DTR, RTS, KEYS, MIDI> EngineContext for BoardContext<'a, TX, DTR, RTS, KEYS, MIDI>
where
    TX: Write<u8, Error = Infallible>,
    DTR: InputPin,
    RTS: OutputPin,
    KEYS: Read<u8>,
    MIDI: Read<u8>,
{
    fn connected(&mut self) -> bool {
        self.transport.update_flow();
        self.transport.connected()
    }

    fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Infallible> {
        self.transport.read(buf)
    }

    fn write(&mut self, data: &[u8]) -> nb::Result<(), Infallible> {
        self.transport.write(data)
    }

    fn audio_buffer(&mut self) -> nb::Result<&mut [StereoFrame], Infallible> {
        self.audio.buffer()
    }

    fn submit_audio(&mut self) {
        self.audio.submit();
    }

    fn poll_action(&mut self) -> Option<Action> {
        self.buttons.poll().or_else(|| self.console.poll_action())
    }

    /// The cycle counter wraps within a minute, so wraps are folded into a
    /// 64-bit total on every call
    fn now_us(&mut self) -> u64 {
        let now = DWT::get_cycle_count();
        self.cycles += u64::from(now.wrapping_sub(self.last_cycles));
        self.last_cycles = now;
        self.cycles / u64::from(self.cycles_per_us)
    }

    fn read_midi(&mut self, buf: &mut [u8]) -> nb::Result<usize, Infallible> {
        self.midi.read(buf)
    }
}
