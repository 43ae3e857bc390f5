use stm32f3xx_hal as stm32f303;

use core::convert::Infallible;

use stm32f303::hal::digital::v2::InputPin;

use siddler::Action;

/// Consecutive polls a button has to hold its level
const DEBOUNCE: u8 = 4;

/// Board buttons A, B and C, active low, reported on release
pub struct Buttons<'a> {
    pins: [&'a dyn InputPin<Error = Infallible>; 3],
    pressed: [bool; 3],
    stable: [u8; 3],
}

impl<'a> Buttons<'a> {
    pub fn new(pins: [&'a dyn InputPin<Error = Infallible>; 3]) -> Self {
        Self {
            pins,
            pressed: [false; 3],
            stable: [0; 3],
        }
    }

    /// Sample every pin once; returns the action of a button just released
    pub fn poll(&mut self) -> Option<Action> {
        let mut released = None;
        for (n, pin) in self.pins.iter().enumerate() {
            let down = pin.is_low().unwrap_or(false);
            if down == self.pressed[n] {
                self.stable[n] = 0;
                continue;
            }
            self.stable[n] += 1;
            if self.stable[n] < DEBOUNCE {
                continue;
            }
            self.stable[n] = 0;
            self.pressed[n] = down;
            if !down && released.is_none() {
                released = Action::from_button(n);
            }
        }
        released
    }
}
