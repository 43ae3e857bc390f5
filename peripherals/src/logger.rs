//! Logging backends for the `log` facade, built on cortex_m_log.
//!
//! The firmware logs over ITM; semihosting is kept for boards without a
//! trace pin. Whichever backend is picked must outlive every log call, so
//! create it at the top of `main` and never drop it.
//!
//! ```no_run
//! # use peripherals::logger::*;
//! let p = cortex_m::Peripherals::take().unwrap();
//! let logger = create_itm_logger::<InterruptFree>(LevelFilter::Info, p.ITM);
//! unsafe { init(&logger) }
//! log::info!("engine up");
//! ```

use core::marker::{Send, Sync};
use cortex_m::peripheral::ITM;
use cortex_m_log::{
    destination,
    log::{trick_init, Logger},
    modes::InterruptModer,
    printer::{
        itm::ItmSync,
        semihosting::{hio::HStdout, Semihosting},
        Printer,
    },
};

pub use log::LevelFilter;

pub use cortex_m_log::modes::{InterruptFree, InterruptOk};

/// Logger writing to ITM stimulus port 0
///
/// The audio interrupt must not be delayed by a log call, so the firmware
/// uses `InterruptOk` outside of bring-up.
pub type ItmLogger<M> = Logger<ItmSync<M>>;

/// Requires ITM enabled in openocd:
///
/// ```gdb
/// monitor tpiu config internal itm.out uart off 8000000
/// monitor itm port 0 on
/// ```
pub fn create_itm_logger<M>(level: LevelFilter, itm_reg: ITM) -> ItmLogger<M>
where
    M: InterruptModer + Send + Sync + 'static,
{
    Logger {
        level,
        inner: ItmSync::<M>::new(destination::Itm::new(itm_reg)),
    }
}

/// Logger writing to the debugger's stdout, `None` without a debugger
pub fn create_shout_logger<M>(level: LevelFilter) -> Option<Logger<Semihosting<M, HStdout>>>
where
    M: InterruptModer + Send + Sync + 'static,
{
    Semihosting::<M, _>::stdout()
        .ok()
        .map(|inner| Logger { level, inner })
}

/// Install `logger` into the log facade. Returns false if one was already
/// installed.
///
/// # Safety
///
/// Call at most once. `logger` is treated as `'static`: dropping it while
/// logging is still in use is undefined behaviour.
pub unsafe fn init<P>(logger: &Logger<P>) -> bool
where
    P: Printer + Send + Sync + 'static,
{
    trick_init(logger).is_ok()
}
