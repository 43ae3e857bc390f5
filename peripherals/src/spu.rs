//! PWM audio output.
//!
//! The engine renders blocks of samples into [`AudioSink`], which hands them
//! to the sample interrupt through a ring. The interrupt side,
//! [`AudioOut`], plays one mono-mixed sample per tick as a PWM duty cycle.

use stm32f3xx_hal as stm32f303;

use core::convert::Infallible;

use heapless::spsc::{Consumer, Producer};
use stm32f303::{
    gpio::{gpiob, AF2},
    hal::PwmPin,
    pwm::{self, PwmChannel, WithPins, TIM3_CH2},
    rcc,
    stm32::TIM3,
    time::Hertz,
};

use siddler::StereoFrame;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

pub const AUDIO_RING: usize = 512;
pub const AUDIO_BLOCK: usize = 64;

/// 8-bit resolution keeps the carrier well above the audible band
const PWM_RESOLUTION: u16 = 255;

pub fn init_tim3_pwm_on_pb5(
    carrier: Hertz,
    tim3: TIM3,
    pb5: gpiob::PB5<AF2>,
    clocks: &rcc::Clocks,
) -> PwmChannel<TIM3_CH2, WithPins> {
    info!("configuring timer3 as pwm audio");
    debug!("resolution: {}, carrier: {}hz", PWM_RESOLUTION, carrier.0);
    let (_, tim3_ch2, ..) = pwm::tim3(tim3, PWM_RESOLUTION, carrier, clocks);
    let mut tim3_ch2 = tim3_ch2.output_to_pb5(pb5);
    tim3_ch2.set_duty(tim3_ch2.get_max_duty() / 2);
    tim3_ch2.enable();
    tim3_ch2
}

/// Engine side of the audio ring
pub struct AudioSink {
    ring: Producer<'static, StereoFrame, AUDIO_RING>,
    block: [StereoFrame; AUDIO_BLOCK],
}

impl AudioSink {
    pub fn new(ring: Producer<'static, StereoFrame, AUDIO_RING>) -> Self {
        Self {
            ring,
            block: [[0; 2]; AUDIO_BLOCK],
        }
    }

    /// Block to render into, once the ring has room for all of it
    pub fn buffer(&mut self) -> nb::Result<&mut [StereoFrame], Infallible> {
        if self.ring.capacity() - self.ring.len() < AUDIO_BLOCK {
            return Err(nb::Error::WouldBlock);
        }
        Ok(&mut self.block)
    }

    pub fn submit(&mut self) {
        for frame in self.block.iter() {
            if self.ring.enqueue(*frame).is_err() {
                break;
            }
        }
    }
}

/// Interrupt side: one sample per call
pub struct AudioOut {
    ring: Consumer<'static, StereoFrame, AUDIO_RING>,
    pwm: PwmChannel<TIM3_CH2, WithPins>,
    underruns: u32,
}

impl AudioOut {
    pub fn new(
        ring: Consumer<'static, StereoFrame, AUDIO_RING>,
        pwm: PwmChannel<TIM3_CH2, WithPins>,
    ) -> Self {
        Self {
            ring,
            pwm,
            underruns: 0,
        }
    }

    /// Call from the sample rate interrupt
    pub fn tick(&mut self) {
        let frame = match self.ring.dequeue() {
            Some(frame) => frame,
            None => {
                self.underruns = self.underruns.wrapping_add(1);
                [0, 0]
            }
        };
        let duty = duty_of(frame, self.pwm.get_max_duty());
        self.pwm.set_duty(duty);
    }

    pub fn underruns(&self) -> u32 {
        self.underruns
    }
}

/// Mix to mono and map the signed sample onto `0..=max`
fn duty_of(frame: StereoFrame, max: u16) -> u16 {
    let mono = (i32::from(frame[0]) + i32::from(frame[1])) / 2;
    let unsigned = (mono + 0x8000) as u32;
    (unsigned * u32::from(max) / 0xFFFF) as u16
}
