use stm32f3xx_hal as stm32f303;

use core::convert::Infallible;

use cortex_m::peripheral::SYST;
use embedded_graphics::fonts::{Font, Font6x8};
use ssd1306::{prelude::*, Builder};
use stm32f303::{
    delay::Delay,
    hal::digital::v2::OutputPin,
    rcc,
    spi::{MisoPin, Mode, MosiPin, Phase, Polarity, SckPin, Spi},
    stm32::SPI2,
    time::Hertz,
};

use siddler::render::GLYPH_HEIGHT;
use siddler::shared::TEXT_ROWS;
use siddler::{ScanlineContext, ScanlineInput};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

pub fn init_ssd1306_on_spi2<H, SCK, MISO, MOSI, CS, DC, RST>(
    freq: H,
    spi2: SPI2,
    (sck, miso, mosi): (SCK, MISO, MOSI),
    (cs, dc, mut rst): (CS, DC, RST),
    apb1: &mut rcc::APB1,
    syst: SYST,
    clocks: rcc::Clocks,
) -> Option<GraphicsMode<impl WriteOnlyDataCommand>>
where
    H: Into<Hertz>,
    SCK: SckPin<SPI2>,
    MISO: MisoPin<SPI2>,
    MOSI: MosiPin<SPI2>,
    CS: OutputPin,
    DC: OutputPin,
    RST: OutputPin,
{
    let spi_mode = Mode {
        polarity: Polarity::IdleLow,
        phase: Phase::CaptureOnFirstTransition,
    };

    let spi = Spi::spi2(spi2, (sck, miso, mosi), spi_mode, freq.into(), clocks, apb1);

    let mut delay = Delay::new(syst, clocks);
    let interface = SPIInterface::new(spi, dc, cs);
    let mut disp: GraphicsMode<_> = Builder::new().connect(interface).into();

    let _ = disp.reset(&mut rst, &mut delay);
    if disp.init().is_err() {
        error!("ssd1306 did not answer");
        return None;
    }
    info!("ssd1306 up");
    Some(disp)
}

const PANEL_WIDTH: u32 = 128;
const GLYPH_WIDTH: u32 = 6;
const PANEL_COLS: usize = (PANEL_WIDTH / GLYPH_WIDTH) as usize;
/// Text rows that fit above the level bar
pub const PANEL_ROWS: u8 = 7;
const BAR_TOP: u32 = PANEL_ROWS as u32 * GLYPH_HEIGHT as u32 + 1;
const BAR_BOTTOM: u32 = 64;

/// Scrolling window of the status grid on a 128x64 panel, with a level bar
/// driven by the visual record underneath.
pub struct OledPanel<DI: WriteOnlyDataCommand> {
    display: GraphicsMode<DI>,
    top: u8,
    next: u16,
    budget: u16,
}

impl<DI: WriteOnlyDataCommand> OledPanel<DI> {
    pub fn new(display: GraphicsMode<DI>) -> Self {
        Self {
            display,
            top: 0,
            next: 0,
            budget: 0,
        }
    }

    /// First grid row shown on the panel
    pub fn scroll_to(&mut self, top: u8) {
        self.top = top.min(TEXT_ROWS as u8 - PANEL_ROWS);
    }

    /// Ask the renderer for a whole frame, starting over at line 0
    pub fn request_frame(&mut self) {
        self.next = 0;
        self.budget = self.lines_per_frame();
    }

    fn draw_glyph_row(&mut self, y: u32, input: &ScanlineInput<'_>) {
        for (col, byte) in input.text.iter().take(PANEL_COLS).enumerate() {
            let ch = *byte as char;
            for x in 0..GLYPH_WIDTH {
                let on = Font6x8::character_pixel(ch, x, u32::from(input.glyph_row));
                self.display
                    .set_pixel(col as u32 * GLYPH_WIDTH + x, y, u8::from(on));
            }
        }
    }

    fn draw_bar(&mut self, input: &ScanlineInput<'_>) {
        let visual = input.visual;
        let width = u32::from(visual.brightness) / 2;
        let ripple = u32::from(visual.wave_depth) / 64;
        for y in BAR_TOP..BAR_BOTTOM {
            let span = width.saturating_sub(ripple * (y - BAR_TOP));
            for x in 0..PANEL_WIDTH {
                let lit = if visual.polarity {
                    x >= PANEL_WIDTH - span
                } else {
                    x < span
                };
                self.display.set_pixel(x, y, u8::from(lit));
            }
        }
    }
}

impl<DI: WriteOnlyDataCommand> ScanlineContext for OledPanel<DI> {
    fn next_scanline(&mut self) -> nb::Result<u16, Infallible> {
        if self.budget == 0 {
            return Err(nb::Error::WouldBlock);
        }
        self.budget -= 1;
        let line = self.next;
        self.next += 1;
        Ok(line)
    }

    fn lines_per_frame(&self) -> u16 {
        TEXT_ROWS as u16 * GLYPH_HEIGHT
    }

    fn emit(&mut self, scanline: u16, input: &ScanlineInput<'_>) {
        let row = input.text_row;
        if row >= self.top && row < self.top + PANEL_ROWS {
            let y = u32::from(row - self.top) * u32::from(GLYPH_HEIGHT) + u32::from(input.glyph_row);
            self.draw_glyph_row(y, input);
        }
        if scanline + 1 == self.lines_per_frame() {
            self.draw_bar(input);
            if self.display.flush().is_err() {
                warn!("panel flush failed");
            }
        }
    }
}
