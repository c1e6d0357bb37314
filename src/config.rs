use std::env;
use std::str::FromStr;

use crate::errors::{BrightnessOutOfRangeSnafu, InvalidConfigSnafu, Result};
use crate::peripheral::pwm_channel_for_pin;
use crate::strip_type::StripType;
use crate::timing::{BitTiming, DEFAULT_FREQUENCY};

/// GPIO 18, PWM channel 0. Usable on all Raspberry Pi models.
pub const DEFAULT_GPIO_PIN: u8 = 18;

/// DMA channel 10 is unused by the firmware on all Raspberry Pi models.
pub const DEFAULT_DMA_CHANNEL: u8 = 10;

/// Highest DMA channel with a full (non-lite) register block below the 0xE05000 gap.
pub const MAX_DMA_CHANNEL: u8 = 14;

/// Maps the host's `0..=100` brightness to the physical scale `0..=255`.
///
/// Rounds half up, so 100 is exactly 255.
pub fn brightness_to_scale(brightness: u32) -> Result<u8> {
    if brightness > 100 {
        return BrightnessOutOfRangeSnafu { brightness }.fail();
    }
    Ok(((brightness * 255 + 50) / 100) as u8)
}

/// The validated configuration of a strip.
///
/// Fixed for the lifetime of an initialized driver; use
/// [`Ws281x::reset`](crate::Ws281x::reset) and init again to change it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripConfig {
    count: usize,
    strip_type: StripType,
    gpio_pin: u8,
    pwm_channel: u8,
    dma_channel: u8,
    frequency: u32,
    invert: bool,
    brightness: u8,
    timing: BitTiming,
}

impl StripConfig {
    /// Starts a configuration for `count` pixels.
    pub fn builder(count: usize) -> StripConfigBuilder {
        StripConfigBuilder::new(count)
    }

    /// Number of pixels.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Channel order and width.
    pub fn strip_type(&self) -> StripType {
        self.strip_type
    }

    /// The GPIO the strip's data line is connected to.
    pub fn gpio_pin(&self) -> u8 {
        self.gpio_pin
    }

    /// The PWM channel driving the pin.
    pub fn pwm_channel(&self) -> u8 {
        self.pwm_channel
    }

    /// The DMA channel feeding the PWM FIFO.
    pub fn dma_channel(&self) -> u8 {
        self.dma_channel
    }

    /// Signal frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Whether the output is inverted.
    pub fn invert(&self) -> bool {
        self.invert
    }

    /// The initial physical brightness scale.
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Pulse widths for this strip.
    pub fn timing(&self) -> BitTiming {
        self.timing
    }
}

/// Builds a [`StripConfig`].
#[derive(Debug, Clone)]
pub struct StripConfigBuilder {
    count: usize,
    strip_type: StripType,
    gpio_pin: u8,
    pwm_channel: Option<u8>,
    dma_channel: u8,
    frequency: u32,
    invert: bool,
    brightness: u8,
}

impl StripConfigBuilder {
    /// A `WS2811_STRIP_RGB` strip on GPIO 18, DMA 10, 800 kHz, full brightness.
    pub fn new(count: usize) -> Self {
        Self {
            count,
            strip_type: StripType::Ws2811Rgb,
            gpio_pin: DEFAULT_GPIO_PIN,
            pwm_channel: None,
            dma_channel: DEFAULT_DMA_CHANNEL,
            frequency: DEFAULT_FREQUENCY,
            invert: false,
            brightness: 255,
        }
    }

    /// Sets the channel order.
    pub fn strip_type(mut self, strip_type: StripType) -> Self {
        self.strip_type = strip_type;
        self
    }

    /// Sets the output GPIO.
    pub fn gpio_pin(mut self, gpio_pin: u8) -> Self {
        self.gpio_pin = gpio_pin;
        self
    }

    /// Pins the PWM channel; must match the one wired to the GPIO.
    pub fn pwm_channel(mut self, pwm_channel: u8) -> Self {
        self.pwm_channel = Some(pwm_channel);
        self
    }

    /// Sets the DMA channel.
    pub fn dma_channel(mut self, dma_channel: u8) -> Self {
        self.dma_channel = dma_channel;
        self
    }

    /// Sets the signal frequency in Hz.
    pub fn frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Inverts the output, for inverting level shifters.
    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Sets the initial physical brightness scale.
    pub fn brightness(mut self, brightness: u8) -> Self {
        self.brightness = brightness;
        self
    }

    /// Validates the configuration.
    pub fn build(self) -> Result<StripConfig> {
        if self.count == 0 {
            return InvalidConfigSnafu {
                reason: "count must be > 0",
            }
            .fail();
        }

        if self.dma_channel > MAX_DMA_CHANNEL {
            return InvalidConfigSnafu {
                reason: format!(
                    "DMA channel {} not supported, use 0 to {MAX_DMA_CHANNEL}",
                    self.dma_channel
                ),
            }
            .fail();
        }

        let Some(wired_channel) = pwm_channel_for_pin(self.gpio_pin) else {
            return InvalidConfigSnafu {
                reason: format!("GPIO {} has no PWM function", self.gpio_pin),
            }
            .fail();
        };

        if let Some(pwm_channel) = self.pwm_channel {
            if pwm_channel != wired_channel {
                return InvalidConfigSnafu {
                    reason: format!(
                        "GPIO {} is driven by PWM channel {wired_channel}, not {pwm_channel}",
                        self.gpio_pin
                    ),
                }
                .fail();
            }
        }

        let timing = BitTiming::for_family(self.strip_type.family(), self.frequency)?;

        Ok(StripConfig {
            count: self.count,
            strip_type: self.strip_type,
            gpio_pin: self.gpio_pin,
            pwm_channel: wired_channel,
            dma_channel: self.dma_channel,
            frequency: self.frequency,
            invert: self.invert,
            brightness: self.brightness,
            timing,
        })
    }
}

/// The loosely typed init options of the host wrapper.
///
/// Converted into a [`StripConfig`] at init time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Number of pixels; must be > 0.
    pub count: u32,
    /// Raw strip type constant, e.g. [`StripType::WS2811_STRIP_GRB`].
    /// Defaults to `WS2811_STRIP_RGB`.
    pub strip_type: Option<u32>,
    /// Output GPIO.
    pub gpio_pin: Option<u8>,
    /// DMA channel.
    pub dma_channel: Option<u8>,
    /// PWM channel; must match the GPIO.
    pub pwm_channel: Option<u8>,
    /// Signal frequency in Hz.
    pub frequency: Option<u32>,
    /// Inverted output.
    pub invert: bool,
    /// Initial brightness, `0..=100`.
    pub brightness: Option<u32>,
}

impl InitOptions {
    /// Options for `count` pixels, everything else default.
    pub fn new(count: u32) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    /// Reads the options from `WS281X_*` environment variables.
    ///
    /// `WS281X_COUNT` is required. Unset variables keep their defaults;
    /// unparsable ones are an [`InvalidConfig`](crate::Ws281xError::InvalidConfig).
    pub fn from_env() -> Result<Self> {
        let Some(count) = env_var("WS281X_COUNT")? else {
            return InvalidConfigSnafu {
                reason: "WS281X_COUNT is not set",
            }
            .fail();
        };

        Ok(Self {
            count,
            strip_type: env_var::<StripTypeName>("WS281X_STRIP_TYPE")?.map(|t| t.0.raw()),
            gpio_pin: env_var("WS281X_GPIO_PIN")?,
            dma_channel: env_var("WS281X_DMA_CHANNEL")?,
            pwm_channel: env_var("WS281X_PWM_CHANNEL")?,
            frequency: env_var("WS281X_FREQUENCY")?,
            invert: env_var("WS281X_INVERT")?.unwrap_or(false),
            brightness: env_var("WS281X_BRIGHTNESS")?,
        })
    }
}

impl TryFrom<&InitOptions> for StripConfig {
    type Error = crate::Ws281xError;

    fn try_from(options: &InitOptions) -> Result<Self> {
        let strip_type = match options.strip_type {
            Some(raw) => StripType::from_raw(raw)?,
            None => StripType::Ws2811Rgb,
        };

        let mut builder = StripConfig::builder(options.count as usize)
            .strip_type(strip_type)
            .invert(options.invert);

        if let Some(gpio_pin) = options.gpio_pin {
            builder = builder.gpio_pin(gpio_pin);
        }
        if let Some(dma_channel) = options.dma_channel {
            builder = builder.dma_channel(dma_channel);
        }
        if let Some(pwm_channel) = options.pwm_channel {
            builder = builder.pwm_channel(pwm_channel);
        }
        if let Some(frequency) = options.frequency {
            builder = builder.frequency(frequency);
        }
        if let Some(brightness) = options.brightness {
            let scale = brightness_to_scale(brightness).map_err(|e| {
                InvalidConfigSnafu {
                    reason: e.to_string(),
                }
                .build()
            })?;
            builder = builder.brightness(scale);
        }

        builder.build()
    }
}

impl TryFrom<InitOptions> for StripConfig {
    type Error = crate::Ws281xError;

    fn try_from(options: InitOptions) -> Result<Self> {
        Self::try_from(&options)
    }
}

/// Accepts a constant name (`WS2811_STRIP_GRB`) or its raw value.
struct StripTypeName(StripType);

impl FromStr for StripTypeName {
    type Err = crate::Ws281xError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(strip_type) = StripType::ALL.iter().find(|t| t.name() == s) {
            return Ok(Self(*strip_type));
        }

        let raw = match s.strip_prefix("0x") {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse(),
        };
        match raw {
            Ok(raw) => StripType::from_raw(raw).map(Self),
            Err(_) => InvalidConfigSnafu {
                reason: format!("unknown strip type {s:?}"),
            }
            .fail(),
        }
    }
}

fn env_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
{
    let Ok(value) = env::var(name) else {
        return Ok(None);
    };

    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => InvalidConfigSnafu {
            reason: format!("unable to parse {name}={value:?}"),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ws281xError;

    #[test]
    fn brightness_rounds_half_up() {
        assert_eq!(brightness_to_scale(0).unwrap(), 0);
        assert_eq!(brightness_to_scale(5).unwrap(), 13);
        assert_eq!(brightness_to_scale(50).unwrap(), 128);
        assert_eq!(brightness_to_scale(100).unwrap(), 255);
        assert!(matches!(
            brightness_to_scale(101),
            Err(Ws281xError::BrightnessOutOfRange { brightness: 101 })
        ));
    }

    #[test]
    fn brightness_scale_is_monotonic() {
        let scales: Vec<u8> = (0..=100).map(|b| brightness_to_scale(b).unwrap()).collect();
        assert!(scales.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn defaults() {
        let config = StripConfig::builder(16).build().unwrap();
        assert_eq!(config.gpio_pin(), 18);
        assert_eq!(config.pwm_channel(), 0);
        assert_eq!(config.dma_channel(), 10);
        assert_eq!(config.frequency(), 800_000);
        assert_eq!(config.brightness(), 255);
        assert_eq!(config.strip_type(), StripType::Ws2811Rgb);
        assert_eq!(config.timing(), BitTiming::WS281X);
    }

    #[test]
    fn rejects_invalid_values() {
        let invalid = |builder: StripConfigBuilder| {
            matches!(builder.build(), Err(Ws281xError::InvalidConfig { .. }))
        };

        assert!(invalid(StripConfig::builder(0)));
        assert!(invalid(StripConfig::builder(1).gpio_pin(4)));
        assert!(invalid(StripConfig::builder(1).gpio_pin(18).pwm_channel(1)));
        assert!(invalid(StripConfig::builder(1).dma_channel(15)));
        assert!(invalid(StripConfig::builder(1).frequency(2_000_000)));
    }

    #[test]
    fn pwm_channel_follows_pin() {
        let config = StripConfig::builder(1).gpio_pin(13).build().unwrap();
        assert_eq!(config.pwm_channel(), 1);
    }

    #[test]
    fn init_options() {
        let options = InitOptions {
            strip_type: Some(StripType::SK6812_STRIP_GRBW),
            brightness: Some(50),
            ..InitOptions::new(8)
        };
        let config = StripConfig::try_from(&options).unwrap();
        assert_eq!(config.count(), 8);
        assert_eq!(config.strip_type(), StripType::Sk6812Grbw);
        assert_eq!(config.brightness(), 128);
        assert_eq!(config.timing(), BitTiming::SK6812);

        let unknown = InitOptions {
            strip_type: Some(0xdead_beef),
            ..InitOptions::new(8)
        };
        assert!(matches!(
            StripConfig::try_from(&unknown),
            Err(Ws281xError::InvalidConfig { .. })
        ));

        let too_bright = InitOptions {
            brightness: Some(150),
            ..InitOptions::new(8)
        };
        assert!(matches!(
            StripConfig::try_from(&too_bright),
            Err(Ws281xError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn strip_type_names() {
        assert_eq!("WS2811_STRIP_GRB".parse::<StripTypeName>().unwrap().0, StripType::Ws2811Grb);
        assert_eq!("0x18100800".parse::<StripTypeName>().unwrap().0, StripType::Sk6812Rgbw);
        assert_eq!("528384".parse::<StripTypeName>().unwrap().0, StripType::Ws2811Grb);
        assert!("GRB".parse::<StripTypeName>().is_err());
    }
}
