#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod errors;
mod pixel;
mod strip;
mod strip_type;
mod timing;
mod waveform;

pub mod peripheral;
pub mod platform;
pub mod teardown;

pub use config::{
    brightness_to_scale, InitOptions, StripConfig, StripConfigBuilder, DEFAULT_DMA_CHANNEL,
    DEFAULT_GPIO_PIN, MAX_DMA_CHANNEL,
};
pub use errors::{Result, Ws281xError};
pub use peripheral::{Backend, OutputChannel, Peripheral, SimulatedBus};
pub use pixel::{Pixel, RawColor, Rgbw};
pub use strip::Ws281x;
pub use strip_type::{encode_all, ColorWord, StripType, SK6812_SHIFT_WMASK};
pub use timing::{BitTiming, StripFamily, DEFAULT_FREQUENCY, MIN_FREQUENCY};
pub use waveform::{Pulse, SymbolStream, Waveform, SYMBOLS_PER_BIT};
