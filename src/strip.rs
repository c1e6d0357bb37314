//! The driver lifecycle: `Uninitialized → Initialized → Reset`, re-initializable.

use core::fmt;
use core::mem;

use crate::config::{brightness_to_scale, InitOptions, StripConfig};
use crate::errors::{
    AlreadyInitializedSnafu, NotInitializedSnafu, PositionOutOfRangeSnafu, Result,
};
use crate::peripheral::{Backend, Peripheral};
use crate::pixel::{Pixel, RawColor};
use crate::waveform::Waveform;

struct Session {
    config: StripConfig,
    pixels: Vec<RawColor>,
    handle: Box<dyn Peripheral>,
}

impl Session {
    fn check_position(&self, position: usize) -> Result<()> {
        if position >= self.pixels.len() {
            return PositionOutOfRangeSnafu {
                position,
                count: self.pixels.len(),
            }
            .fail();
        }
        Ok(())
    }

    fn render(&self) -> Result<Waveform> {
        let strip_type = self.config.strip_type();
        let brightness = self.handle.brightness_scale()?;

        let words: Vec<_> = self
            .pixels
            .iter()
            .map(|pixel| strip_type.encode(*pixel, brightness))
            .collect();

        Ok(Waveform::encode(&words, self.config.timing()))
    }

    fn blank(&self) -> Waveform {
        Waveform::blank(
            self.pixels.len(),
            self.config.strip_type().channel_count(),
            self.config.timing(),
        )
    }
}

enum State {
    Uninitialized,
    Initialized(Session),
    Reset,
}

/// A WS281x/SK6812 LED strip.
///
/// Owns the pixel buffer and the peripheral handle. Every operation
/// except [`init`](Ws281x::init) and [`reset`](Ws281x::reset) fails with
/// [`NotInitialized`](crate::Ws281xError::NotInitialized) outside of an
/// init/reset pair.
///
/// Dropping an initialized strip resets it.
///
/// # Example
///
/// ```
/// use ws281x_rpi::{Backend, Rgbw, StripConfig, StripType, Ws281x};
///
/// let mut strip = Ws281x::new(Backend::simulated());
/// strip.init(
///     StripConfig::builder(16)
///         .strip_type(StripType::Ws2811Grb)
///         .build()?,
/// )?;
///
/// strip.set_all_color(Rgbw::rgb(255, 0, 0))?;
/// strip.show()?;
/// strip.reset()?;
/// # Ok::<(), ws281x_rpi::Ws281xError>(())
/// ```
pub struct Ws281x {
    backend: Backend,
    state: State,
}

impl Ws281x {
    /// A strip that opens its peripheral on `backend`.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            state: State::Uninitialized,
        }
    }

    /// A strip on the hardware if it is usable, on a simulated backend otherwise.
    pub fn detect() -> Self {
        Self::new(Backend::detect())
    }

    /// Whether the simulated backend is in use.
    pub fn is_simulated(&self) -> bool {
        self.backend.is_simulated()
    }

    /// The backend peripherals are opened on.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Whether [`init`](Ws281x::init) succeeded and no reset happened since.
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Initialized(_))
    }

    fn session(&self) -> Result<&Session> {
        match &self.state {
            State::Initialized(session) => Ok(session),
            State::Uninitialized | State::Reset => NotInitializedSnafu.fail(),
        }
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        match &mut self.state {
            State::Initialized(session) => Ok(session),
            State::Uninitialized | State::Reset => NotInitializedSnafu.fail(),
        }
    }

    /// Opens the peripheral and allocates a dark pixel buffer.
    ///
    /// Fails with [`AlreadyInitialized`](crate::Ws281xError::AlreadyInitialized)
    /// if the strip was not reset since the last init.
    pub fn init(&mut self, config: StripConfig) -> Result<()> {
        if self.is_initialized() {
            return AlreadyInitializedSnafu.fail();
        }

        let handle = self.backend.open(&config)?;

        log::info!(
            "Initialized {} pixels of {} on GPIO {} ({}).",
            config.count(),
            config.strip_type().name(),
            config.gpio_pin(),
            handle.channel()
        );

        self.state = State::Initialized(Session {
            pixels: vec![RawColor::BLACK; config.count()],
            config,
            handle,
        });
        Ok(())
    }

    /// Validates loosely typed options, then [`init`](Ws281x::init)s.
    pub fn init_with(&mut self, options: &InitOptions) -> Result<()> {
        if self.is_initialized() {
            return AlreadyInitializedSnafu.fail();
        }
        self.init(StripConfig::try_from(options)?)
    }

    /// The active configuration.
    pub fn config(&self) -> Result<&StripConfig> {
        Ok(&self.session()?.config)
    }

    /// Renders the pixel buffer and sends it to the strip.
    ///
    /// Returns once the strip has received every bit.
    pub fn show(&mut self) -> Result<()> {
        let session = self.session_mut()?;
        let waveform = session.render()?;
        session.handle.transmit(&waveform)
    }

    /// Blanks the strip, closes the peripheral and frees the pixel buffer.
    ///
    /// Does nothing if the strip is not initialized, so a repeated call
    /// from a termination handler is harmless. The peripheral is closed
    /// even if blanking fails; the first error is returned.
    pub fn reset(&mut self) -> Result<()> {
        let session = match mem::replace(&mut self.state, State::Reset) {
            State::Initialized(session) => session,
            previous => {
                self.state = previous;
                return Ok(());
            }
        };

        let blank = session.blank();
        let Session {
            config, mut handle, ..
        } = session;

        let blanked = handle.transmit(&blank);
        if let Err(e) = &blanked {
            log::error!("Unable to blank the strip: {}", e);
        }
        let closed = handle.close();

        log::info!("Reset strip on GPIO {}.", config.gpio_pin());

        blanked.and(closed)
    }

    /// Sets one pixel of the buffer. Channels are masked to 8 bits.
    pub fn set_pixel_color(&mut self, position: usize, color: impl Pixel) -> Result<()> {
        let session = self.session_mut()?;
        session.check_position(position)?;
        session.pixels[position] = color.into_raw_color();
        Ok(())
    }

    /// Sets every pixel of the buffer to `color`.
    pub fn set_all_color(&mut self, color: impl Pixel + Clone) -> Result<()> {
        let count = self.session()?.pixels.len();
        for position in 0..count {
            self.set_pixel_color(position, &color)?;
        }
        Ok(())
    }

    /// The buffered value of a pixel, as `0xWWRRGGBB`.
    ///
    /// This is not necessarily what the strip shows: changes since the
    /// last [`show`](Ws281x::show) are included.
    pub fn get_pixel_color(&self, position: usize) -> Result<RawColor> {
        let session = self.session()?;
        session.check_position(position)?;
        Ok(session.pixels[position])
    }

    /// Fills the buffer from position 0. Surplus pixels are ignored.
    pub fn write<I>(&mut self, pixels: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Pixel,
    {
        let session = self.session_mut()?;
        for (slot, pixel) in session.pixels.iter_mut().zip(pixels) {
            *slot = pixel.into_raw_color();
        }
        Ok(())
    }

    /// The pixel buffer.
    pub fn pixels(&self) -> Result<&[RawColor]> {
        Ok(&self.session()?.pixels)
    }

    /// The pixel buffer, writable but not resizable.
    pub fn pixels_mut(&mut self) -> Result<&mut [RawColor]> {
        Ok(&mut self.session_mut()?.pixels)
    }

    /// Sets the brightness, `0..=100`, for the next [`show`](Ws281x::show).
    ///
    /// Mapped linearly to the physical scale, rounding half up.
    /// Buffered pixel values are not altered.
    pub fn set_brightness(&mut self, brightness: u32) -> Result<()> {
        let session = self.session_mut()?;
        session.handle.set_brightness_scale(brightness_to_scale(brightness)?)
    }

    /// Sets the physical brightness scale, `0..=255`.
    pub fn set_brightness_scale(&mut self, scale: u8) -> Result<()> {
        self.session_mut()?.handle.set_brightness_scale(scale)
    }

    /// The physical brightness scale.
    pub fn brightness_scale(&self) -> Result<u8> {
        self.session()?.handle.brightness_scale()
    }

    /// The waveform the next [`show`](Ws281x::show) would send.
    pub fn render(&self) -> Result<Waveform> {
        self.session()?.render()
    }

    /// The waveform [`reset`](Ws281x::reset) sends to blank the strip.
    pub fn blank(&self) -> Result<Waveform> {
        Ok(self.session()?.blank())
    }
}

impl fmt::Debug for Ws281x {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Ws281x");
        s.field("backend", &self.backend);
        match &self.state {
            State::Uninitialized => s.field("state", &"Uninitialized"),
            State::Reset => s.field("state", &"Reset"),
            State::Initialized(session) => s
                .field("state", &"Initialized")
                .field("config", &session.config)
                .field("channel", &session.handle.channel()),
        };
        s.finish()
    }
}

impl Drop for Ws281x {
    fn drop(&mut self) {
        if let Err(e) = self.reset() {
            log::error!("Unable to reset strip: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::SimulatedBus;
    use crate::{StripType, Ws281xError};

    fn strip() -> (Ws281x, SimulatedBus) {
        let bus = SimulatedBus::new();
        (Ws281x::new(Backend::Simulated(bus.clone())), bus)
    }

    fn config(count: usize) -> StripConfig {
        StripConfig::builder(count)
            .strip_type(StripType::Ws2811Grb)
            .build()
            .unwrap()
    }

    #[test]
    fn uninitialized_operations_fail() {
        let (mut strip, _bus) = strip();

        assert!(matches!(strip.show(), Err(Ws281xError::NotInitialized)));
        assert!(matches!(strip.set_brightness(50), Err(Ws281xError::NotInitialized)));
        assert!(matches!(strip.set_pixel_color(0, 0xffu32), Err(Ws281xError::NotInitialized)));
        assert!(matches!(strip.get_pixel_color(0), Err(Ws281xError::NotInitialized)));
        assert!(matches!(strip.pixels(), Err(Ws281xError::NotInitialized)));
        assert!(strip.reset().is_ok());
        assert!(!strip.is_initialized());
    }

    #[test]
    fn set_all_uses_every_position() {
        let (mut strip, _bus) = strip();
        strip.init(config(5)).unwrap();

        strip.set_all_color([1u8, 2, 3]).unwrap();
        assert_eq!(strip.pixels().unwrap(), &[RawColor(0x0001_0203); 5]);
    }

    #[test]
    fn write_ignores_surplus() {
        let (mut strip, _bus) = strip();
        strip.init(config(2)).unwrap();

        strip.write([0x11u32, 0x22, 0x33]).unwrap();
        assert_eq!(strip.pixels().unwrap(), &[RawColor(0x11), RawColor(0x22)]);

        strip.write([0x44u32]).unwrap();
        assert_eq!(strip.pixels().unwrap(), &[RawColor(0x44), RawColor(0x22)]);
    }

    #[test]
    fn brightness_does_not_touch_buffer() {
        let (mut strip, _bus) = strip();
        strip.init(config(1)).unwrap();

        strip.set_pixel_color(0, 0x00ff_ffffu32).unwrap();
        strip.set_brightness(50).unwrap();

        assert_eq!(strip.brightness_scale().unwrap(), 128);
        assert_eq!(strip.get_pixel_color(0).unwrap(), RawColor(0x00ff_ffff));
        assert_eq!(strip.render().unwrap().decode_bytes(), [0x80, 0x80, 0x80]);
        assert!(matches!(
            strip.set_brightness(101),
            Err(Ws281xError::BrightnessOutOfRange { brightness: 101 })
        ));
    }

    #[test]
    fn drop_resets() {
        let bus = SimulatedBus::new();
        let channel = {
            let mut strip = Ws281x::new(Backend::Simulated(bus.clone()));
            strip.init(config(3)).unwrap();
            strip.handle_channel()
        };

        assert!(!bus.is_bound(channel));
        assert_eq!(bus.last_frame(channel), Some(vec![0; 9]));
    }

    impl Ws281x {
        fn handle_channel(&self) -> crate::peripheral::OutputChannel {
            self.session().unwrap().handle.channel()
        }
    }
}
