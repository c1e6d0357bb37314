//! A peripheral that records what it would have sent.
//!
//! Selected when the host cannot drive the hardware, and used by the tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{ChannelClaims, Claim, OutputChannel, Peripheral};
use crate::config::StripConfig;
use crate::errors::{HardwareFaultSnafu, Result, UseAfterCloseSnafu};
use crate::waveform::Waveform;

/// Something that happened on the simulated bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A handle was opened.
    Opened(OutputChannel),
    /// A waveform was sent.
    Transmitted {
        /// The channel it was sent on.
        channel: OutputChannel,
        /// The waveform.
        waveform: Waveform,
    },
    /// A handle was closed; the line was held low for `hold_low`.
    Closed {
        /// The closed channel.
        channel: OutputChannel,
        /// How long the line was driven low.
        hold_low: Duration,
    },
}

#[derive(Debug, Default)]
struct BusLog {
    events: Vec<BusEvent>,
    pending_faults: Vec<OutputChannel>,
}

/// A set of simulated output channels.
///
/// Clones share the same channels and the same event log, so a test can
/// keep a clone to inspect what a driver did.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    claims: Arc<ChannelClaims>,
    log: Arc<Mutex<BusLog>>,
}

impl SimulatedBus {
    /// A bus without bound channels.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, BusLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds the channel of `config`.
    pub fn open(&self, config: &StripConfig) -> Result<SimulatedPeripheral> {
        let channel = OutputChannel::of(config);
        let claim = ChannelClaims::claim(Arc::clone(&self.claims), channel)?;

        log::debug!("Opened simulated channel {}.", channel);
        self.log().events.push(BusEvent::Opened(channel));

        Ok(SimulatedPeripheral {
            bus: self.clone(),
            claim: Some(claim),
            channel,
            brightness: config.brightness(),
            reset_gap: config.timing().reset_gap(),
            faulted: false,
        })
    }

    /// Everything that happened so far.
    pub fn events(&self) -> Vec<BusEvent> {
        self.log().events.clone()
    }

    /// All waveforms sent on `channel`, oldest first.
    pub fn transmissions(&self, channel: OutputChannel) -> Vec<Waveform> {
        self.log()
            .events
            .iter()
            .filter_map(|event| match event {
                BusEvent::Transmitted {
                    channel: c,
                    waveform,
                } if *c == channel => Some(waveform.clone()),
                _ => None,
            })
            .collect()
    }

    /// The bytes the strip on `channel` received last.
    pub fn last_frame(&self, channel: OutputChannel) -> Option<Vec<u8>> {
        self.transmissions(channel)
            .last()
            .map(Waveform::decode_bytes)
    }

    /// Number of closes of `channel`.
    pub fn close_count(&self, channel: OutputChannel) -> usize {
        self.log()
            .events
            .iter()
            .filter(|event| matches!(event, BusEvent::Closed { channel: c, .. } if *c == channel))
            .count()
    }

    /// Whether a handle currently holds `channel`.
    pub fn is_bound(&self, channel: OutputChannel) -> bool {
        self.claims.is_claimed(channel)
    }

    /// Makes the next transmission on `channel` fail with a hardware fault.
    pub fn inject_fault(&self, channel: OutputChannel) {
        self.log().pending_faults.push(channel);
    }

    fn take_fault(&self, channel: OutputChannel) -> bool {
        let mut log = self.log();
        match log.pending_faults.iter().position(|c| *c == channel) {
            Some(pos) => {
                log.pending_faults.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// A handle on a [`SimulatedBus`] channel.
#[derive(Debug)]
pub struct SimulatedPeripheral {
    bus: SimulatedBus,
    claim: Option<Claim<Arc<ChannelClaims>>>,
    channel: OutputChannel,
    brightness: u8,
    reset_gap: Duration,
    faulted: bool,
}

impl SimulatedPeripheral {
    fn ensure_open(&self) -> Result<()> {
        if self.claim.is_none() {
            return UseAfterCloseSnafu.fail();
        }
        Ok(())
    }
}

impl Peripheral for SimulatedPeripheral {
    fn channel(&self) -> OutputChannel {
        self.channel
    }

    fn transmit(&mut self, waveform: &Waveform) -> Result<()> {
        self.ensure_open()?;

        if self.faulted {
            return HardwareFaultSnafu {
                reason: "handle faulted by a previous transmission",
            }
            .fail();
        }

        if self.bus.take_fault(self.channel) {
            self.faulted = true;
            log::error!("Injected DMA fault on {}.", self.channel);
            return HardwareFaultSnafu {
                reason: format!("injected DMA fault on {}", self.channel),
            }
            .fail();
        }

        self.bus.log().events.push(BusEvent::Transmitted {
            channel: self.channel,
            waveform: waveform.clone(),
        });
        Ok(())
    }

    fn set_brightness_scale(&mut self, scale: u8) -> Result<()> {
        self.ensure_open()?;
        self.brightness = scale;
        Ok(())
    }

    fn brightness_scale(&self) -> Result<u8> {
        self.ensure_open()?;
        Ok(self.brightness)
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;

        self.bus.log().events.push(BusEvent::Closed {
            channel: self.channel,
            hold_low: self.reset_gap,
        });
        self.claim = None;

        log::debug!("Closed simulated channel {}.", self.channel);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.claim.is_none()
    }
}

impl Drop for SimulatedPeripheral {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                log::error!("Unable to close simulated channel {}: {}", self.channel, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ws281xError;

    fn config() -> StripConfig {
        StripConfig::builder(4).build().unwrap()
    }

    #[test]
    fn open_twice_is_busy() {
        let bus = SimulatedBus::new();
        let _handle = bus.open(&config()).unwrap();
        assert!(matches!(
            bus.open(&config()),
            Err(Ws281xError::ResourceBusy { .. })
        ));
    }

    #[test]
    fn closed_handle_is_unusable() {
        let bus = SimulatedBus::new();
        let mut handle = bus.open(&config()).unwrap();
        let waveform = Waveform::blank(4, 3, config().timing());

        handle.close().unwrap();
        assert!(handle.is_closed());
        assert!(!bus.is_bound(handle.channel()));
        assert!(matches!(handle.transmit(&waveform), Err(Ws281xError::UseAfterClose)));
        assert!(matches!(handle.set_brightness_scale(1), Err(Ws281xError::UseAfterClose)));
        assert!(matches!(handle.brightness_scale(), Err(Ws281xError::UseAfterClose)));
        assert!(matches!(handle.close(), Err(Ws281xError::UseAfterClose)));
        assert_eq!(bus.close_count(handle.channel()), 1);
    }

    #[test]
    fn faults_are_sticky() {
        let bus = SimulatedBus::new();
        let mut handle = bus.open(&config()).unwrap();
        let waveform = Waveform::blank(4, 3, config().timing());

        bus.inject_fault(handle.channel());
        assert!(handle.transmit(&waveform).unwrap_err().is_hardware_fault());
        assert!(handle.transmit(&waveform).unwrap_err().is_hardware_fault());
        assert!(bus.transmissions(handle.channel()).is_empty());
    }

    #[test]
    fn drop_closes() {
        let bus = SimulatedBus::new();
        let channel = {
            let handle = bus.open(&config()).unwrap();
            handle.channel()
        };
        assert!(!bus.is_bound(channel));
        assert_eq!(bus.close_count(channel), 1);
    }
}
