use core::cell::RefCell;
use core::fmt;
use core::ops::Deref;

use critical_section::Mutex;

use super::OutputChannel;
use crate::errors::{ResourceBusySnafu, Result};

/// Tracks which output channels are bound.
///
/// At most one handle may own a PWM channel or a DMA channel at a time.
pub struct ChannelClaims {
    claimed: Mutex<RefCell<Vec<OutputChannel>>>,
}

impl ChannelClaims {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            claimed: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Binds `channel`, or fails with
    /// [`ResourceBusy`](crate::Ws281xError::ResourceBusy) if any of its
    /// resources is already bound.
    ///
    /// The channel is released when the returned [`Claim`] is dropped.
    pub fn claim<R>(registry: R, channel: OutputChannel) -> Result<Claim<R>>
    where
        R: Deref<Target = ChannelClaims>,
    {
        Self::claim_with(registry, channel, OutputChannel::conflicts_with)
    }

    /// Like [`claim`](ChannelClaims::claim), with a custom notion of
    /// which channels share resources.
    pub fn claim_with<R, F>(registry: R, channel: OutputChannel, conflicts: F) -> Result<Claim<R>>
    where
        R: Deref<Target = ChannelClaims>,
        F: Fn(&OutputChannel, &OutputChannel) -> bool,
    {
        critical_section::with(|cs| {
            let mut claimed = registry.claimed.borrow(cs).borrow_mut();
            if let Some(existing) = claimed.iter().find(|c| conflicts(c, &channel)) {
                return ResourceBusySnafu {
                    channel: existing.to_string(),
                }
                .fail();
            }
            claimed.push(channel);
            Ok(())
        })?;

        Ok(Claim { registry, channel })
    }

    /// Whether a handle currently holds `channel` or parts of it.
    pub fn is_claimed(&self, channel: OutputChannel) -> bool {
        critical_section::with(|cs| {
            self.claimed
                .borrow(cs)
                .borrow()
                .iter()
                .any(|c| c.conflicts_with(&channel))
        })
    }

    fn release(&self, channel: OutputChannel) {
        critical_section::with(|cs| {
            self.claimed.borrow(cs).borrow_mut().retain(|c| *c != channel);
        });
    }
}

impl Default for ChannelClaims {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChannelClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let claimed = critical_section::with(|cs| self.claimed.borrow(cs).borrow().clone());
        f.debug_struct("ChannelClaims").field("claimed", &claimed).finish()
    }
}

/// Ownership of an output channel; releases it on drop.
#[derive(Debug)]
pub struct Claim<R>
where
    R: Deref<Target = ChannelClaims>,
{
    registry: R,
    channel: OutputChannel,
}

impl<R> Claim<R>
where
    R: Deref<Target = ChannelClaims>,
{
    /// The claimed channel.
    pub fn channel(&self) -> OutputChannel {
        self.channel
    }
}

impl<R> Drop for Claim<R>
where
    R: Deref<Target = ChannelClaims>,
{
    fn drop(&mut self) {
        self.registry.release(self.channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ws281xError;

    const PWM0_DMA10: OutputChannel = OutputChannel { pwm: 0, dma: 10 };

    #[test]
    fn second_claim_is_busy() {
        let claims = ChannelClaims::new();

        let claim = ChannelClaims::claim(&claims, PWM0_DMA10).unwrap();
        assert!(matches!(
            ChannelClaims::claim(&claims, PWM0_DMA10),
            Err(Ws281xError::ResourceBusy { .. })
        ));
        assert!(matches!(
            ChannelClaims::claim(&claims, OutputChannel { pwm: 1, dma: 10 }),
            Err(Ws281xError::ResourceBusy { .. })
        ));

        let other = ChannelClaims::claim(&claims, OutputChannel { pwm: 1, dma: 11 }).unwrap();
        assert_eq!(other.channel(), OutputChannel { pwm: 1, dma: 11 });

        drop(claim);
        assert!(!claims.is_claimed(PWM0_DMA10));
        assert!(ChannelClaims::claim(&claims, PWM0_DMA10).is_ok());
    }

    #[test]
    fn exclusive_claim() {
        let claims = ChannelClaims::new();

        let _claim = ChannelClaims::claim_with(&claims, PWM0_DMA10, |_, _| true).unwrap();
        assert!(matches!(
            ChannelClaims::claim_with(&claims, OutputChannel { pwm: 1, dma: 5 }, |_, _| true),
            Err(Ws281xError::ResourceBusy { .. })
        ));
    }
}
