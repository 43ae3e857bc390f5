use log::info;

/// Parts per million of the nominal chip rate
pub const SCALE_BASE: u32 = 1_000_000;
pub const SCALE_MIN: u32 = 200_000;
pub const SCALE_MAX: u32 = 3_000_000;

/// Stretch `delay` by `ppm / SCALE_BASE`, rounding to nearest.
///
/// A nonzero delay never scales to zero. Above 1x the result can outgrow a
/// single event's delay and is left to the caller to chain.
pub fn scale(delay: u32, ppm: u32) -> u64 {
    if delay == 0 {
        return 0;
    }
    let base = u64::from(SCALE_BASE);
    let scaled = (u64::from(delay) * u64::from(ppm) + base / 2) / base;
    scaled.max(1)
}

/// Bounded time dilation applied to every transferred delay
#[derive(Debug)]
pub struct ClockScale {
    ppm: u32,
    min: u32,
    max: u32,
}

impl ClockScale {
    pub fn new(min: u32, max: u32) -> Result<Self, &'static str> {
        if min == 0 || min > max {
            return Err("Invalid clock scale band");
        }
        Ok(Self {
            ppm: SCALE_BASE.max(min).min(max),
            min,
            max,
        })
    }

    pub fn ppm(&self) -> u32 {
        self.ppm
    }

    pub fn scale(&self, delay: u32) -> u64 {
        scale(delay, self.ppm)
    }

    /// Clamp and store `ppm`; returns whether the scale changed
    pub fn set(&mut self, ppm: u32) -> bool {
        let ppm = ppm.max(self.min).min(self.max);
        if ppm == self.ppm {
            return false;
        }
        self.ppm = ppm;
        info!("clock scale -> {}.{:02}%", ppm / 10_000, ppm / 100 % 100);
        true
    }

    pub fn mul(&mut self, num: u32, den: u32) -> bool {
        if den == 0 {
            return false;
        }
        let den = u64::from(den);
        let ppm = (u64::from(self.ppm) * u64::from(num) + den / 2) / den;
        self.set(ppm.min(u64::from(u32::MAX)) as u32)
    }

    pub fn reset(&mut self) -> bool {
        self.set(SCALE_BASE)
    }

    /// Scaled equivalent of a nominal `chip_hz`
    pub fn effective_hz(&self, chip_hz: u32) -> u32 {
        let base = u64::from(SCALE_BASE);
        ((u64::from(chip_hz) * u64::from(self.ppm) + base / 2) / base) as u32
    }

    /// Scale as whole percent and hundredths of a percent
    pub fn percent(&self) -> (u32, u32) {
        (self.ppm / 10_000, self.ppm / 100 % 100)
    }
}

impl Default for ClockScale {
    fn default() -> Self {
        Self {
            ppm: SCALE_BASE,
            min: SCALE_MIN,
            max: SCALE_MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_scale() {
        for delay in &[1, 2, 17, 985_248, u32::MAX] {
            assert_eq!(scale(*delay, SCALE_BASE), u64::from(*delay));
        }
    }

    #[test]
    fn nonzero_never_rounds_to_zero() {
        assert_eq!(scale(0, SCALE_MAX), 0);
        assert_eq!(scale(1, SCALE_MIN), 1);
        assert_eq!(scale(2, SCALE_MIN), 1);
        assert_eq!(scale(3, SCALE_MIN), 1);
        assert_eq!(scale(5, SCALE_MIN), 1);
        assert_eq!(scale(8, SCALE_MIN), 2);
        assert_eq!(scale(100, 1_500_000), 150);
        assert_eq!(scale(u32::MAX, SCALE_MAX), 3 * u64::from(u32::MAX));
    }

    #[test]
    fn set_clamps_and_reports_change() {
        let mut clock = ClockScale::default();
        assert!(!clock.set(SCALE_BASE));
        assert!(clock.set(10));
        assert_eq!(clock.ppm(), SCALE_MIN);
        assert!(!clock.set(1));
        assert!(clock.set(u32::MAX));
        assert_eq!(clock.ppm(), SCALE_MAX);
        assert!(clock.reset());
        assert_eq!(clock.ppm(), SCALE_BASE);
    }

    #[test]
    fn mul_steps() {
        let mut clock = ClockScale::default();
        assert!(clock.mul(11, 10));
        assert_eq!(clock.ppm(), 1_100_000);
        assert!(clock.mul(9, 10));
        assert_eq!(clock.ppm(), 990_000);
        assert!(!clock.mul(1, 0));
        assert_eq!(clock.percent(), (99, 0));
        clock.mul(101, 100);
        assert_eq!(clock.ppm(), 999_900);
        assert_eq!(clock.percent(), (99, 99));
    }

    #[test]
    fn band_validation() {
        assert!(ClockScale::new(0, 10).is_err());
        assert!(ClockScale::new(20, 10).is_err());
        let clock = ClockScale::new(2_000_000, 3_000_000).unwrap();
        assert_eq!(clock.ppm(), 2_000_000);
        assert_eq!(clock.effective_hz(985_248), 1_970_496);
    }
}
