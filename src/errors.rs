use std::time::Duration;

use snafu::prelude::*;

/// Errors of the LED strip driver.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Ws281xError {
    /// The strip configuration is invalid.
    #[snafu(display("invalid strip configuration: {reason}"))]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },
    /// The driver is not initialized, or was reset.
    #[snafu(display("called before initialization"))]
    NotInitialized,
    /// The driver is already initialized; it needs to be reset first.
    #[snafu(display("already initialized, reset() first"))]
    AlreadyInitialized,
    /// The output channel is already bound to another handle.
    #[snafu(display("output channel {channel} is already in use"))]
    ResourceBusy {
        /// The channel that is in use.
        channel: String,
    },
    /// Not enough privileges to access the peripheral registers.
    #[snafu(display("permission denied: {reason}"))]
    PermissionDenied {
        /// Why access was denied.
        reason: String,
    },
    /// The host is not a supported board.
    #[snafu(display("unsupported platform: {reason}"))]
    UnsupportedPlatform {
        /// Why the platform was rejected.
        reason: String,
    },
    /// The peripheral handle was already closed.
    #[snafu(display("peripheral handle used after close"))]
    UseAfterClose,
    /// Register access or DMA failure. Fatal to the peripheral handle.
    #[snafu(display("hardware fault: {reason}"))]
    HardwareFault {
        /// A description of the fault.
        reason: String,
    },
    /// The hardware did not respond within a bounded wait. Fatal to the peripheral handle.
    #[snafu(display("{operation} timed out after {waited:?}"))]
    Timeout {
        /// The operation that was waiting.
        operation: &'static str,
        /// How long we waited.
        waited: Duration,
    },
    /// A pixel position outside of the strip.
    #[snafu(display("pixel position {position} out of range, strip has {count} pixels"))]
    PositionOutOfRange {
        /// The requested position.
        position: usize,
        /// The number of pixels of the strip.
        count: usize,
    },
    /// A brightness outside of `0..=100`.
    #[snafu(display("brightness {brightness} out of range, expected 0 to 100"))]
    BrightnessOutOfRange {
        /// The requested brightness.
        brightness: u32,
    },
    /// The termination signal hook could not be installed.
    #[snafu(display("unable to install termination hook"))]
    HookInstall {
        /// The underlying OS error.
        source: std::io::Error,
    },
}

impl Ws281xError {
    /// Whether this error leaves the peripheral handle unusable.
    pub fn is_hardware_fault(&self) -> bool {
        matches!(self, Self::HardwareFault { .. } | Self::Timeout { .. })
    }
}

/// Result type of this crate.
pub type Result<T, E = Ws281xError> = core::result::Result<T, E>;
