use std::time::Duration;

use crate::errors::{InvalidConfigSnafu, Result};

/// The default signal frequency of WS281x and SK6812 strips.
pub const DEFAULT_FREQUENCY: u32 = 800_000;

/// The slowest signal frequency; used by older WS2811 parts.
pub const MIN_FREQUENCY: u32 = 400_000;

/// Chip families with distinct timing requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripFamily {
    /// WS2811, WS2812, WS2812B
    Ws281x,
    /// SK6812 (RGBW)
    Sk6812,
}

/// Pulse widths of the one-wire protocol, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitTiming {
    /// High time of a `0` bit.
    pub t0h: u32,
    /// Low time of a `0` bit.
    pub t0l: u32,
    /// High time of a `1` bit.
    pub t1h: u32,
    /// Low time of a `1` bit.
    pub t1l: u32,
    /// Low time after the last bit, before the strip latches the frame.
    pub reset: u32,
}

impl BitTiming {
    /// WS281x at 800 kHz.
    pub const WS281X: Self = Self {
        t0h: 400,
        t0l: 850,
        t1h: 800,
        t1l: 450,
        reset: 55_000,
    };

    /// SK6812 at 800 kHz.
    pub const SK6812: Self = Self {
        t0h: 300,
        t0l: 900,
        t1h: 600,
        t1l: 600,
        reset: 80_000,
    };

    /// The timing for a chip family at the given signal frequency.
    ///
    /// Pulse widths stretch with the bit period; the reset gap does not.
    pub fn for_family(family: StripFamily, frequency: u32) -> Result<Self> {
        if !(MIN_FREQUENCY..=DEFAULT_FREQUENCY).contains(&frequency) {
            return InvalidConfigSnafu {
                reason: format!(
                    "frequency {frequency} Hz outside of {MIN_FREQUENCY}..={DEFAULT_FREQUENCY} Hz"
                ),
            }
            .fail();
        }

        let base = match family {
            StripFamily::Ws281x => Self::WS281X,
            StripFamily::Sk6812 => Self::SK6812,
        };

        let stretch = |ns: u32| -> u32 {
            let scaled = u64::from(ns) * u64::from(DEFAULT_FREQUENCY) / u64::from(frequency);
            scaled as u32
        };

        Ok(Self {
            t0h: stretch(base.t0h),
            t0l: stretch(base.t0l),
            t1h: stretch(base.t1h),
            t1l: stretch(base.t1l),
            reset: base.reset,
        })
    }

    /// Duration of a `0` bit.
    pub const fn zero_period(&self) -> u32 {
        self.t0h + self.t0l
    }

    /// Duration of a `1` bit.
    pub const fn one_period(&self) -> u32 {
        self.t1h + self.t1l
    }

    /// The reset gap as a [`Duration`].
    pub fn reset_gap(&self) -> Duration {
        Duration::from_nanos(u64::from(self.reset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_gaps_match_datasheets() {
        assert!(BitTiming::WS281X.reset >= 50_000);
        assert!(BitTiming::SK6812.reset >= 80_000);
    }

    #[test]
    fn one_bits_are_longer_high() {
        for timing in [BitTiming::WS281X, BitTiming::SK6812] {
            assert!(timing.t1h > timing.t0h);
            assert!(timing.t1l < timing.t0l);
        }
    }

    #[test]
    fn slow_strips_stretch_pulses() {
        let timing = BitTiming::for_family(StripFamily::Ws281x, 400_000).unwrap();
        assert_eq!(timing.t0h, 800);
        assert_eq!(timing.t1h, 1600);
        assert_eq!(timing.reset, BitTiming::WS281X.reset);
    }

    #[test]
    fn frequency_out_of_range() {
        assert!(BitTiming::for_family(StripFamily::Ws281x, 1_000_000).is_err());
        assert!(BitTiming::for_family(StripFamily::Sk6812, 100_000).is_err());
    }
}
