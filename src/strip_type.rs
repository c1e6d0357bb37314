use paste::paste;

use crate::errors::{InvalidConfigSnafu, Result};
use crate::pixel::RawColor;
use crate::timing::StripFamily;

/// Mask of the white channel shift; non-zero for 4-channel strips.
pub const SK6812_SHIFT_WMASK: u32 = 0xf000_0000;

macro_rules! strip_types {
    ($( $family:ident $order:ident = $raw:literal ),+ $(,)?) => {
        paste! {
            /// The channel order and width of an LED strip.
            ///
            /// Every variant corresponds to a raw constant of the form
            /// `0xWWRRGGBB`, where each byte is the shift at which the
            /// channel that is sent in that wire slot sits in a [`RawColor`].
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum StripType {
                $(
                    #[doc = "`" $family "_STRIP_" $order "`"]
                    [<$family:camel $order:camel>],
                )+
            }

            impl StripType {
                $(
                    #[doc = "Raw shift encoding of `" $family "_STRIP_" $order "`."]
                    pub const [<$family _STRIP_ $order>]: u32 = $raw;
                )+

                /// All supported strip types.
                pub const ALL: &'static [StripType] = &[$(Self::[<$family:camel $order:camel>]),+];

                /// The raw shift encoding of this strip type.
                pub const fn raw(self) -> u32 {
                    match self {
                        $(Self::[<$family:camel $order:camel>] => $raw,)+
                    }
                }

                /// The name of the constant, e.g. `WS2811_STRIP_GRB`.
                pub const fn name(self) -> &'static str {
                    match self {
                        $(Self::[<$family:camel $order:camel>] => concat!(stringify!($family), "_STRIP_", stringify!($order)),)+
                    }
                }
            }
        }
    };
}

strip_types! {
    // 4 color R, G, B and W ordering
    SK6812 RGBW = 0x1810_0800,
    SK6812 RBGW = 0x1810_0008,
    SK6812 GRBW = 0x1808_1000,
    SK6812 GBRW = 0x1808_0010,
    SK6812 BRGW = 0x1800_1008,
    SK6812 BGRW = 0x1800_0810,
    // 3 color R, G and B ordering
    WS2811 RGB = 0x0010_0800,
    WS2811 RBG = 0x0010_0008,
    WS2811 GRB = 0x0008_1000,
    WS2811 GBR = 0x0008_0010,
    WS2811 BRG = 0x0000_1008,
    WS2811 BGR = 0x0000_0810,
}

impl StripType {
    /// Looks up the strip type of a raw constant.
    ///
    /// Unknown values are a configuration error.
    pub fn from_raw(raw: u32) -> Result<Self> {
        match Self::ALL.iter().find(|t| t.raw() == raw) {
            Some(strip_type) => Ok(*strip_type),
            None => InvalidConfigSnafu {
                reason: format!("unknown strip type {raw:#010x}"),
            }
            .fail(),
        }
    }

    /// Number of color channels per pixel, 3 or 4.
    pub const fn channel_count(self) -> usize {
        if self.raw() & SK6812_SHIFT_WMASK != 0 {
            4
        } else {
            3
        }
    }

    /// The chip family, which determines the bit timing.
    pub const fn family(self) -> StripFamily {
        if self.channel_count() == 4 {
            StripFamily::Sk6812
        } else {
            StripFamily::Ws281x
        }
    }

    /// Shifts of the wire slots, in wire order.
    fn slot_shifts(self) -> [u32; 4] {
        let raw = self.raw();
        [(raw >> 16) & 0xff, (raw >> 8) & 0xff, raw & 0xff, (raw >> 24) & 0xff]
    }

    /// Encodes one buffered pixel into the word that goes on the wire.
    ///
    /// `brightness` is the physical scale, 0 to 255. 255 leaves the
    /// channels untouched.
    pub fn encode(self, color: RawColor, brightness: u8) -> ColorWord {
        let scale = u32::from(brightness) + 1;
        let channels = self.channel_count();

        let mut packed = 0;
        for shift in self.slot_shifts().into_iter().take(channels) {
            let channel = (color.0 >> shift) & 0xff;
            packed = (packed << 8) | ((channel * scale) >> 8);
        }

        ColorWord {
            packed,
            channels: channels as u8,
        }
    }
}

impl TryFrom<u32> for StripType {
    type Error = crate::Ws281xError;

    fn try_from(raw: u32) -> Result<Self> {
        Self::from_raw(raw)
    }
}

/// One pixel in wire order.
///
/// The first channel on the wire is the most significant byte of the word;
/// bits above the last channel are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorWord {
    packed: u32,
    channels: u8,
}

impl ColorWord {
    /// The packed channel bytes.
    pub const fn packed(self) -> u32 {
        self.packed
    }

    /// The number of channels, 3 or 4.
    pub const fn channel_count(self) -> usize {
        self.channels as usize
    }

    /// The channel bytes in the order they are sent.
    pub fn bytes(self) -> impl Iterator<Item = u8> {
        let channels = u32::from(self.channels);
        (0..channels)
            .rev()
            .map(move |slot| (self.packed >> (slot * 8)) as u8)
    }
}

/// Encodes a solid color for every position of a strip.
///
/// Every position goes through [`StripType::encode`] once.
pub fn encode_all(
    strip_type: StripType,
    color: RawColor,
    count: usize,
    brightness: u8,
) -> Vec<ColorWord> {
    (0..count)
        .map(|_| strip_type.encode(color, brightness))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::{Pixel, Rgbw};

    #[test]
    fn grb_puts_green_first() {
        let word = StripType::Ws2811Grb.encode(Rgbw::rgb(0xff, 0x00, 0x12).into_raw_color(), 255);
        assert_eq!(word.packed(), 0x00_ff_12);
        assert_eq!(word.bytes().collect::<Vec<_>>(), [0x00, 0xff, 0x12]);
    }

    #[test]
    fn every_order_is_a_permutation() {
        let color = RawColor::from_channels(0x11, 0x22, 0x33, 0x44);
        let expected: &[(StripType, &[u8])] = &[
            (StripType::Ws2811Rgb, &[0x11, 0x22, 0x33]),
            (StripType::Ws2811Rbg, &[0x11, 0x33, 0x22]),
            (StripType::Ws2811Grb, &[0x22, 0x11, 0x33]),
            (StripType::Ws2811Gbr, &[0x22, 0x33, 0x11]),
            (StripType::Ws2811Brg, &[0x33, 0x11, 0x22]),
            (StripType::Ws2811Bgr, &[0x33, 0x22, 0x11]),
            (StripType::Sk6812Rgbw, &[0x11, 0x22, 0x33, 0x44]),
            (StripType::Sk6812Rbgw, &[0x11, 0x33, 0x22, 0x44]),
            (StripType::Sk6812Grbw, &[0x22, 0x11, 0x33, 0x44]),
            (StripType::Sk6812Gbrw, &[0x22, 0x33, 0x11, 0x44]),
            (StripType::Sk6812Brgw, &[0x33, 0x11, 0x22, 0x44]),
            (StripType::Sk6812Bgrw, &[0x33, 0x22, 0x11, 0x44]),
        ];

        for (strip_type, bytes) in expected {
            let word = strip_type.encode(color, 255);
            assert_eq!(word.bytes().collect::<Vec<_>>(), *bytes, "{}", strip_type.name());
        }
    }

    #[test]
    fn three_channel_words_have_no_high_byte() {
        let word = StripType::Ws2811Rgb.encode(RawColor(0xff_ff_ff_ff), 255);
        assert_eq!(word.packed(), 0x00ff_ffff);
        assert_eq!(word.channel_count(), 3);
    }

    #[test]
    fn raw_constants_round_trip() {
        assert_eq!(StripType::WS2811_STRIP_GRB, 0x0008_1000);
        assert_eq!(StripType::SK6812_STRIP_RGBW, 0x1810_0800);
        assert_eq!(StripType::from_raw(0x0008_1000).unwrap(), StripType::Ws2811Grb);
        assert_eq!(StripType::Ws2811Grb.name(), "WS2811_STRIP_GRB");
        assert!(matches!(
            StripType::from_raw(0x1234),
            Err(crate::Ws281xError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn brightness_scaling() {
        let color = RawColor::from_channels(200, 100, 1, 0);
        assert_eq!(StripType::Ws2811Rgb.encode(color, 0).packed(), 0);
        assert_eq!(StripType::Ws2811Rgb.encode(color, 127).bytes().collect::<Vec<_>>(), [100, 50, 0]);

        let mut last = 0;
        for brightness in 0..=255u8 {
            let red = StripType::Ws2811Rgb.encode(color, brightness).bytes().next().unwrap();
            assert!(red >= last);
            last = red;
        }
        assert_eq!(last, 200);
    }

    #[test]
    fn solid_color_for_all_positions() {
        let words = encode_all(StripType::Ws2811Grb, RawColor::from_channels(255, 0, 0, 0), 16, 255);
        assert_eq!(words.len(), 16);
        assert!(words.iter().all(|w| w.packed() == 0x00_ff_00));
    }
}
