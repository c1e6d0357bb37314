use core::fmt;

/// A buffered pixel value, as stored in the strip's pixel buffer.
///
/// The layout is `0xWWRRGGBB`, independent of the channel order of the strip.
/// The [`StripType`](crate::StripType) decides how it gets put on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RawColor(pub u32);

impl RawColor {
    /// All channels off.
    pub const BLACK: Self = Self(0);

    /// Packs channel values; each is masked to its low 8 bits.
    pub const fn from_channels(r: u32, g: u32, b: u32, w: u32) -> Self {
        Self(((w & 0xff) << 24) | ((r & 0xff) << 16) | ((g & 0xff) << 8) | (b & 0xff))
    }

    /// The red channel.
    pub const fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// The green channel.
    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// The blue channel.
    pub const fn b(self) -> u8 {
        self.0 as u8
    }

    /// The white channel. Ignored by 3-channel strips.
    pub const fn w(self) -> u8 {
        (self.0 >> 24) as u8
    }
}

impl fmt::Debug for RawColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawColor({:#010x})", self.0)
    }
}

impl From<RawColor> for u32 {
    fn from(color: RawColor) -> Self {
        color.0
    }
}

/// A color as handed over by the host: separate channel values.
///
/// Values above 255 are not rejected; only their low 8 bits are used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgbw {
    /// Red
    pub r: u32,
    /// Green
    pub g: u32,
    /// Blue
    pub b: u32,
    /// White; only emitted by 4-channel strips.
    pub w: u32,
}

impl Rgbw {
    /// A color without white channel.
    pub const fn rgb(r: u32, g: u32, b: u32) -> Self {
        Self { r, g, b, w: 0 }
    }

    /// A color with white channel.
    pub const fn rgbw(r: u32, g: u32, b: u32, w: u32) -> Self {
        Self { r, g, b, w }
    }
}

/// A pixel that can be stored in the pixel buffer.
pub trait Pixel {
    /// Convert into the raw buffer representation.
    ///
    /// Channel values wider than 8 bits are truncated.
    fn into_raw_color(self) -> RawColor;
}

impl Pixel for RawColor {
    fn into_raw_color(self) -> RawColor {
        self
    }
}

/// Raw `0xWWRRGGBB` data.
impl Pixel for u32 {
    fn into_raw_color(self) -> RawColor {
        RawColor(self)
    }
}

impl Pixel for Rgbw {
    fn into_raw_color(self) -> RawColor {
        RawColor::from_channels(self.r, self.g, self.b, self.w)
    }
}

/// Raw RGB data.
impl Pixel for [u8; 3] {
    fn into_raw_color(self) -> RawColor {
        let [r, g, b] = self.map(u32::from);
        RawColor::from_channels(r, g, b, 0)
    }
}

/// Raw RGBW data.
impl Pixel for [u8; 4] {
    fn into_raw_color(self) -> RawColor {
        let [r, g, b, w] = self.map(u32::from);
        RawColor::from_channels(r, g, b, w)
    }
}

/// 8-bit Linear sRGB, which is the color space
/// most NeoPixel strips are in.
///
/// Be aware that this differs from normal,
/// gamma-corrected sRGB. A conversion has to take place.
///
/// More info can be found in the documentation of the
/// [palette] crate.
impl Pixel for palette::LinSrgb<u8> {
    fn into_raw_color(self) -> RawColor {
        RawColor::from_channels(self.red.into(), self.green.into(), self.blue.into(), 0)
    }
}

impl<'a, P> Pixel for &'a P
where
    P: Pixel + Clone,
{
    fn into_raw_color(self) -> RawColor {
        self.clone().into_raw_color()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_masked_to_8_bits() {
        let color = Rgbw::rgbw(0x1ff, 0x100, 0x2a, 0xfff).into_raw_color();
        assert_eq!(color, RawColor(0xff_ff_00_2a));
        assert_eq!(color.r(), 0xff);
        assert_eq!(color.g(), 0x00);
        assert_eq!(color.b(), 0x2a);
        assert_eq!(color.w(), 0xff);
    }

    #[test]
    fn rgb_array_has_no_white() {
        assert_eq!([1u8, 2, 3].into_raw_color(), RawColor(0x00_01_02_03));
        assert_eq!([1u8, 2, 3, 4].into_raw_color(), RawColor(0x04_01_02_03));
    }

    #[test]
    fn linear_srgb() {
        let color = palette::LinSrgb::new(10u8, 20, 30).into_raw_color();
        assert_eq!((color.r(), color.g(), color.b()), (10, 20, 30));
    }
}
