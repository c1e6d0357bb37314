//! The one-wire RZ signal: every bit becomes a high pulse followed by a low pulse.

use std::time::Duration;

use crate::strip_type::ColorWord;
use crate::timing::BitTiming;

/// Serializer symbols per bit on the wire.
pub const SYMBOLS_PER_BIT: usize = 3;

const ZERO_HIGH_SYMBOLS: usize = 1;
const ONE_HIGH_SYMBOLS: usize = 2;

/// The high and low time of a single bit, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pulse {
    /// Time the line is driven high.
    pub high: u32,
    /// Time the line is driven low afterwards.
    pub low: u32,
}

/// The signal for one render pass.
///
/// Built from the color words of a single frame, consumed by
/// [`Peripheral::transmit`](crate::peripheral::Peripheral::transmit)
/// and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waveform {
    timing: BitTiming,
    pulses: Vec<Pulse>,
}

impl Waveform {
    /// Expands color words into bit pulses.
    ///
    /// Channels are sent in word order, bits MSB first. The reset gap
    /// of `timing` terminates the frame.
    pub fn encode(words: &[ColorWord], timing: BitTiming) -> Self {
        let bit_count = words.iter().map(|w| w.channel_count() * 8).sum();
        let mut pulses = Vec::with_capacity(bit_count);

        for byte in words.iter().flat_map(|w| w.bytes()) {
            for bit in (0..8).rev() {
                pulses.push(if byte & (1 << bit) != 0 {
                    Pulse {
                        high: timing.t1h,
                        low: timing.t1l,
                    }
                } else {
                    Pulse {
                        high: timing.t0h,
                        low: timing.t0l,
                    }
                });
            }
        }

        Self { timing, pulses }
    }

    /// A frame of `pixels` dark pixels with `channels` channels each.
    pub fn blank(pixels: usize, channels: usize, timing: BitTiming) -> Self {
        Self {
            timing,
            pulses: vec![
                Pulse {
                    high: timing.t0h,
                    low: timing.t0l,
                };
                pixels * channels * 8
            ],
        }
    }

    /// The timing this waveform was built with.
    pub fn timing(&self) -> &BitTiming {
        &self.timing
    }

    /// The bit pulses, without the trailing reset gap.
    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// The low time that terminates the frame.
    pub fn reset_gap(&self) -> Duration {
        self.timing.reset_gap()
    }

    /// The total time on the wire, including the reset gap.
    pub fn duration(&self) -> Duration {
        let bits: u64 = self
            .pulses
            .iter()
            .map(|p| u64::from(p.high) + u64::from(p.low))
            .sum();
        Duration::from_nanos(bits + u64::from(self.timing.reset))
    }

    /// Whether each pulse encodes a `1` bit, in transmission order.
    fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        self.pulses.iter().map(|pulse| pulse.high == self.timing.t1h)
    }

    /// Reads the bytes back from the pulses; used to inspect what a strip receives.
    ///
    /// Incomplete trailing bytes are dropped.
    pub fn decode_bytes(&self) -> Vec<u8> {
        let bits: Vec<bool> = self.bits().collect();
        bits.chunks_exact(8)
            .map(|bits| bits.iter().fold(0u8, |byte, &bit| (byte << 1) | u8::from(bit)))
            .collect()
    }

    /// Serializes the waveform into a bitstream of [`SYMBOLS_PER_BIT`]
    /// symbols per bit, `symbol_ps` picoseconds each.
    ///
    /// A `0` bit is high for one symbol, a `1` bit for two. The reset gap
    /// is rounded up to whole symbols.
    pub fn to_symbols(&self, symbol_ps: u64) -> SymbolStream {
        let mut stream = SymbolStream::default();
        for bit in self.bits() {
            let high = if bit { ONE_HIGH_SYMBOLS } else { ZERO_HIGH_SYMBOLS };
            stream.push(true, high);
            stream.push(false, SYMBOLS_PER_BIT - high);
        }

        let reset_ps = u64::from(self.timing.reset) * 1000;
        let reset_symbols = ((reset_ps + symbol_ps - 1) / symbol_ps) as usize;
        stream.push(false, reset_symbols);

        stream
    }
}

/// A bitstream of line levels, packed MSB first into 32-bit words.
///
/// This is the format the PWM serializer consumes from its FIFO.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolStream {
    words: Vec<u32>,
    len: usize,
}

impl SymbolStream {
    fn push(&mut self, level: bool, count: usize) {
        for _ in 0..count {
            let bit = self.len % 32;
            if bit == 0 {
                self.words.push(0);
            }
            if level {
                if let Some(word) = self.words.last_mut() {
                    *word |= 0x8000_0000 >> bit;
                }
            }
            self.len += 1;
        }
    }

    /// The packed words; the last word is zero padded.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// The number of symbols.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the stream contains no symbols.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The size in bytes of the packed words.
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::RawColor;
    use crate::strip_type::StripType;

    fn words(strip_type: StripType, colors: &[u32]) -> Vec<ColorWord> {
        colors
            .iter()
            .map(|c| strip_type.encode(RawColor(*c), 255))
            .collect()
    }

    #[test]
    fn one_pulse_per_bit() {
        let rgb = Waveform::encode(&words(StripType::Ws2811Rgb, &[0; 5]), BitTiming::WS281X);
        assert_eq!(rgb.pulses().len(), 5 * 3 * 8);

        let rgbw = Waveform::encode(&words(StripType::Sk6812Rgbw, &[0; 5]), BitTiming::SK6812);
        assert_eq!(rgbw.pulses().len(), 5 * 4 * 8);
    }

    #[test]
    fn msb_first() {
        let waveform = Waveform::encode(&words(StripType::Ws2811Rgb, &[0x00_80_00_01]), BitTiming::WS281X);
        let pulses = waveform.pulses();

        let one = Pulse { high: 800, low: 450 };
        let zero = Pulse { high: 400, low: 850 };
        assert_eq!(pulses[0], one);
        assert!(pulses[1..23].iter().all(|p| *p == zero));
        assert_eq!(pulses[23], one);
        assert_eq!(waveform.decode_bytes(), [0x80, 0x00, 0x01]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let frame = words(StripType::Sk6812Grbw, &[0x12345678, 0x9abcdef0, 0xffffffff]);
        assert_eq!(
            Waveform::encode(&frame, BitTiming::SK6812),
            Waveform::encode(&frame, BitTiming::SK6812)
        );
    }

    #[test]
    fn reset_gap_terminates_the_frame() {
        let waveform = Waveform::blank(2, 3, BitTiming::WS281X);
        assert!(waveform.reset_gap() >= Duration::from_micros(50));
        assert_eq!(
            waveform.duration(),
            Duration::from_nanos(48 * 1250) + waveform.reset_gap()
        );
        assert_eq!(waveform.decode_bytes(), [0; 6]);
    }

    #[test]
    fn three_symbols_per_bit_at_800khz() {
        // 2.4 MHz symbol rate
        let symbol_ps = 1_000_000_000_000 / (3 * 800_000);
        let waveform = Waveform::encode(&words(StripType::Ws2811Rgb, &[0x00_a0_00_00]), BitTiming::WS281X);
        let stream = waveform.to_symbols(symbol_ps);

        // 1 0 1 0 ... -> 110 100 110 100 ...
        assert_eq!(stream.words()[0] >> 20, 0b1101_0011_0100);

        let reset_symbols = (55_000_000 + symbol_ps - 1) / symbol_ps;
        assert_eq!(stream.len(), 24 * 3 + reset_symbols as usize);
        assert_eq!(stream.byte_len(), (stream.len() + 31) / 32 * 4);
    }

    fn high_symbols(stream: &SymbolStream, bit: usize) -> u32 {
        (0..SYMBOLS_PER_BIT)
            .map(|i| {
                let symbol = bit * SYMBOLS_PER_BIT + i;
                (stream.words()[symbol / 32] >> (31 - symbol % 32)) & 1
            })
            .sum()
    }

    #[test]
    fn sk6812_bits_are_distinguishable() {
        // 19.2 MHz oscillator, divisor 8
        let symbol_ps = 8 * 1_000_000_000_000 / 19_200_000;
        let ones = Waveform::encode(&words(StripType::Sk6812Rgbw, &[0xffff_ffff]), BitTiming::SK6812);
        let zeros = Waveform::encode(&words(StripType::Sk6812Rgbw, &[0]), BitTiming::SK6812);

        let ones = ones.to_symbols(symbol_ps);
        let zeros = zeros.to_symbols(symbol_ps);

        // 1 1 1 ... -> 110 110 110 ..., 0 0 0 ... -> 100 100 100 ...
        assert_eq!(ones.words()[0], 0b1101_1011_0110_1101_1011_0110_1101_1011);
        assert_eq!(zeros.words()[0], 0b1001_0010_0100_1001_0010_0100_1001_0010);
        for bit in 0..32 {
            assert_eq!(high_symbols(&ones, bit), 2);
            assert_eq!(high_symbols(&zeros, bit), 1);
        }

        let reset_symbols = (80_000_000 + symbol_ps - 1) / symbol_ps;
        assert_eq!(ones.len(), 32 * SYMBOLS_PER_BIT + reset_symbols as usize);
        assert_eq!(ones.len(), zeros.len());
    }

    #[test]
    fn bit_period_is_fixed_at_400khz() {
        let timing = BitTiming::for_family(crate::timing::StripFamily::Sk6812, 400_000).unwrap();
        let symbol_ps = 16 * 1_000_000_000_000 / 19_200_000;
        let waveform = Waveform::encode(&words(StripType::Sk6812Grbw, &[0x00a5_5a0f; 2]), timing);
        let stream = waveform.to_symbols(symbol_ps);

        let reset_symbols = (u64::from(timing.reset) * 1000 + symbol_ps - 1) / symbol_ps;
        assert_eq!(stream.len(), 2 * 32 * SYMBOLS_PER_BIT + reset_symbols as usize);
    }
}
