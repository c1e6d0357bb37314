//! The timing-capable output peripheral.

use core::fmt;

use crate::config::StripConfig;
use crate::errors::Result;
use crate::platform::Platform;
use crate::waveform::Waveform;

mod claims;
mod pins;
#[cfg(target_os = "linux")]
mod pwm_dma;
pub mod simulated;

pub use claims::{ChannelClaims, Claim};
pub use pins::{pwm_channel_for_pin, pwm_pin, PinFunction, PwmPin, PWM_PINS};
pub use simulated::SimulatedBus;

/// The hardware resources a strip is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputChannel {
    /// PWM channel, 0 or 1.
    pub pwm: u8,
    /// DMA channel feeding the PWM FIFO.
    pub dma: u8,
}

impl OutputChannel {
    /// The channel a configuration binds.
    pub fn of(config: &StripConfig) -> Self {
        Self {
            pwm: config.pwm_channel(),
            dma: config.dma_channel(),
        }
    }

    /// Whether both channels need a common resource.
    pub fn conflicts_with(&self, other: &OutputChannel) -> bool {
        self.pwm == other.pwm || self.dma == other.dma
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PWM{}/DMA{}", self.pwm, self.dma)
    }
}

/// A live binding to an output peripheral.
///
/// Obtained from [`Backend::open`]. After [`close`](Peripheral::close),
/// every operation fails with [`UseAfterClose`](crate::Ws281xError::UseAfterClose).
pub trait Peripheral: Send {
    /// The bound channel.
    fn channel(&self) -> OutputChannel;

    /// Sends a waveform to the strip.
    ///
    /// Blocks until the previous transmission and this one are complete.
    /// A hardware fault leaves the handle unusable; nothing is retried.
    fn transmit(&mut self, waveform: &Waveform) -> Result<()>;

    /// Sets the physical brightness scale applied to the next rendered frame.
    fn set_brightness_scale(&mut self, scale: u8) -> Result<()>;

    /// The current physical brightness scale.
    fn brightness_scale(&self) -> Result<u8>;

    /// Drives the output low for one reset gap and releases the hardware.
    fn close(&mut self) -> Result<()>;

    /// Whether [`close`](Peripheral::close) was called.
    fn is_closed(&self) -> bool;
}

/// Selects the peripheral implementation.
#[derive(Debug, Clone)]
pub enum Backend {
    /// The BCM283x PWM, fed by DMA.
    Hardware,
    /// An in-memory stand-in that records every transmission.
    Simulated(SimulatedBus),
}

impl Backend {
    /// Probes the platform and picks the hardware if possible,
    /// the simulated backend otherwise.
    pub fn detect() -> Self {
        match Platform::probe() {
            Ok(platform) => {
                log::debug!("Using PWM/DMA backend on {:?}.", platform.soc());
                Backend::Hardware
            }
            Err(e) => {
                log::warn!(
                    "{}. A non-functional simulated backend will be used instead.",
                    e
                );
                Backend::Simulated(SimulatedBus::new())
            }
        }
    }

    /// A fresh simulated backend.
    pub fn simulated() -> Self {
        Backend::Simulated(SimulatedBus::new())
    }

    /// Whether this is the simulated backend.
    pub fn is_simulated(&self) -> bool {
        matches!(self, Backend::Simulated(_))
    }

    /// Binds the output channel of `config`.
    ///
    /// Fails with [`ResourceBusy`](crate::Ws281xError::ResourceBusy) if the
    /// channel is already bound, and with
    /// [`PermissionDenied`](crate::Ws281xError::PermissionDenied) or
    /// [`UnsupportedPlatform`](crate::Ws281xError::UnsupportedPlatform) if the
    /// hardware cannot be accessed.
    pub fn open(&self, config: &StripConfig) -> Result<Box<dyn Peripheral>> {
        match self {
            Backend::Hardware => open_hardware(config),
            Backend::Simulated(bus) => Ok(Box::new(bus.open(config)?)),
        }
    }
}

#[cfg(target_os = "linux")]
fn open_hardware(config: &StripConfig) -> Result<Box<dyn Peripheral>> {
    let platform = Platform::probe()?;
    Ok(Box::new(pwm_dma::PwmDma::open(&platform, config)?))
}

#[cfg(not(target_os = "linux"))]
fn open_hardware(_config: &StripConfig) -> Result<Box<dyn Peripheral>> {
    Platform::probe()?;
    crate::errors::UnsupportedPlatformSnafu {
        reason: "the PWM/DMA backend requires Linux",
    }
    .fail()
}
