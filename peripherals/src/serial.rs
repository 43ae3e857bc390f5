//! Host transport over a UART with RTS/DTR handshake lines.
//!
//! The receive interrupt drains the data register into a ring through
//! [`RxPump`]; the engine side reads from the ring through
//! [`SerialTransport`]. The UART itself cannot push back, so the transport
//! raises RTS once the ring passes its high mark and drops it again below
//! the low mark. A host is considered attached while it asserts DTR.

use stm32f3xx_hal as stm32f303;

use core::convert::Infallible;

use heapless::spsc::{Consumer, Producer};
use stm32f303::hal::{
    digital::v2::{InputPin, OutputPin},
    serial::{Read, Write},
};

use siddler::Action;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

pub const RX_RING: usize = 1024;
pub const MIDI_BAUD: u32 = 31_250;

/// Interrupt half: moves received bytes into the ring
pub struct RxPump<RX> {
    rx: RX,
    ring: Producer<'static, u8, RX_RING>,
    lost: u32,
}

impl<RX: Read<u8>> RxPump<RX> {
    pub fn new(rx: RX, ring: Producer<'static, u8, RX_RING>) -> Self {
        Self { rx, ring, lost: 0 }
    }

    /// Call from the receive interrupt
    pub fn service(&mut self) {
        loop {
            match self.rx.read() {
                Ok(byte) => {
                    if self.ring.enqueue(byte).is_err() {
                        self.lost = self.lost.wrapping_add(1);
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(_)) => {
                    self.lost = self.lost.wrapping_add(1);
                    break;
                }
            }
        }
    }

    /// Bytes dropped by a full ring or a receiver overrun
    pub fn lost(&self) -> u32 {
        self.lost
    }
}

/// Engine half: ring reader plus the handshake lines
pub struct SerialTransport<TX, DTR, RTS> {
    tx: TX,
    ring: Consumer<'static, u8, RX_RING>,
    dtr: DTR,
    rts: RTS,
    halted: bool,
}

impl<TX, DTR, RTS> SerialTransport<TX, DTR, RTS>
where
    TX: Write<u8, Error = Infallible>,
    DTR: InputPin,
    RTS: OutputPin,
{
    const HIGH_MARK: usize = RX_RING * 3 / 4;
    const LOW_MARK: usize = RX_RING / 4;

    pub fn new(tx: TX, ring: Consumer<'static, u8, RX_RING>, dtr: DTR, mut rts: RTS) -> Self {
        rts.set_low().ok();
        Self {
            tx,
            ring,
            dtr,
            rts,
            halted: false,
        }
    }

    /// DTR is active low on the adapter
    pub fn connected(&self) -> bool {
        self.dtr.is_low().unwrap_or(false)
    }

    /// Raise or release RTS for the current ring fill; call every loop
    pub fn update_flow(&mut self) {
        let fill = self.ring.len();
        if !self.halted && fill >= Self::HIGH_MARK {
            self.halted = true;
            self.rts.set_high().ok();
            trace!("rx ring at {}, rts raised", fill);
        } else if self.halted && fill <= Self::LOW_MARK {
            self.halted = false;
            self.rts.set_low().ok();
            trace!("rx ring at {}, rts released", fill);
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Infallible> {
        let mut count = 0;
        while count < buf.len() {
            match self.ring.dequeue() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        self.update_flow();
        if count == 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(count)
    }

    /// Blocks until all of `data` is in the transmit register
    pub fn write(&mut self, data: &[u8]) -> nb::Result<(), Infallible> {
        for byte in data {
            nb::block!(self.tx.write(*byte)).ok();
        }
        nb::block!(self.tx.flush()).ok();
        Ok(())
    }
}

/// Local console keys on a second UART
pub struct Console<RX> {
    rx: RX,
}

impl<RX: Read<u8>> Console<RX> {
    pub fn new(rx: RX) -> Self {
        Self { rx }
    }

    /// Next key that maps to an action; other keys are skipped
    pub fn poll_action(&mut self) -> Option<Action> {
        while let Ok(key) = self.rx.read() {
            if let Some(action) = Action::from_key(key) {
                debug!("console key {:?}", key as char);
                return Some(action);
            }
        }
        None
    }
}

/// MIDI input on a UART of its own at [`MIDI_BAUD`], polled from the engine
/// loop
pub struct MidiIn<RX> {
    rx: RX,
    errors: u32,
}

impl<RX: Read<u8>> MidiIn<RX> {
    pub fn new(rx: RX) -> Self {
        Self { rx, errors: 0 }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Infallible> {
        let mut count = 0;
        while count < buf.len() {
            match self.rx.read() {
                Ok(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(_)) => {
                    self.errors = self.errors.wrapping_add(1);
                    break;
                }
            }
        }
        if count == 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(count)
    }

    /// Framing and overrun errors seen so far
    pub fn errors(&self) -> u32 {
        self.errors
    }
}
