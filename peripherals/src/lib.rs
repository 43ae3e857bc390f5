#![no_std]

use stm32f3xx_hal as stm32f303;

use stm32f303::{
    flash, pac, rcc,
    time::{MegaHertz, U32Ext},
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

pub mod buttons;
pub mod logger;
pub mod ppu;
pub mod serial;
pub mod spu;

pub use buttons::Buttons;
pub use ppu::OledPanel;
pub use serial::{Console, MidiIn, RxPump, SerialTransport};
pub use spu::{AudioOut, AudioSink};

/// Run the core from the external 8MHz crystal at `sysclk`
pub fn freeze_clocks(sysclk: MegaHertz, cfgr: rcc::CFGR, flash: &mut flash::Parts) -> rcc::Clocks {
    let clocks = cfgr
        .use_hse(8u32.mhz())
        .sysclk(sysclk)
        .pclk1(MegaHertz(sysclk.0 / 2))
        .freeze(&mut flash.acr);
    debug!("sysclk {}hz, pclk1 {}hz", clocks.sysclk().0, clocks.pclk1().0);
    clocks
}

/// tpiu is a bridge for ITM, it's asynchronous clock prescaller
/// has to be updated, otherwise logging through ITM won't work
pub trait ClocksExt {
    fn set_tpiu_async_cpr(self, baud_rate: MegaHertz) -> Self;
}

impl ClocksExt for rcc::Clocks {
    fn set_tpiu_async_cpr(self, baud_rate: MegaHertz) -> Self {
        let tpiu_async_presc = self.hclk().0 / (baud_rate.0 * 1_000_000) - 1;
        unsafe { (*pac::TPIU::ptr()).acpr.write(tpiu_async_presc) }
        trace!("setting async clock prescaller: {}", tpiu_async_presc);
        self
    }
}
