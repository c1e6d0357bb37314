use std::thread;
use std::time::Duration;

use super::mailbox::DmaBuffer;
use super::registers::{block, cm, dma, gpio, pwm, MappedRegion};
use super::{completion, Registers};
use crate::config::StripConfig;
use crate::errors::{InvalidConfigSnafu, Result};
use crate::peripheral::PinFunction;
use crate::platform::Platform;
use crate::waveform::SYMBOLS_PER_BIT;

/// Control block, data follows.
pub const CONTROL_BLOCK_SIZE: usize = 32;

// Clock manager and PWM need a moment to settle after register writes.
const SETTLE: Duration = Duration::from_micros(10);
const CLOCK_TIMEOUT: Duration = Duration::from_millis(10);

/// The symbol clock divisor for a bit frequency, and the resulting symbol period.
pub fn clock_divisor(oscillator: u32, frequency: u32) -> Result<(u32, u64)> {
    let divisor = oscillator / (SYMBOLS_PER_BIT as u32 * frequency);
    if !(2..=cm::MAX_DIVI).contains(&divisor) {
        return InvalidConfigSnafu {
            reason: format!("no PWM clock divisor for {frequency} Hz from a {oscillator} Hz oscillator"),
        }
        .fail();
    }

    let symbol_ps = u64::from(divisor) * 1_000_000_000_000 / u64::from(oscillator);
    Ok((divisor, symbol_ps))
}

pub struct DriverBuilder {
    registers: Registers,
    buffer: DmaBuffer,
}

impl DriverBuilder {
    /// Maps the register blocks and stops whatever the DMA channel
    /// and the PWM were doing.
    pub fn new(platform: &Platform, config: &StripConfig, buffer_len: usize) -> Result<Self> {
        let base = platform.soc().peripheral_base();
        let dma_base = block::DMA + u64::from(config.dma_channel()) * block::DMA_CHANNEL_STRIDE;

        let registers = Registers {
            pwm: MappedRegion::map(base + block::PWM, 0x28)?,
            clock: MappedRegion::map(base + block::CM_PWM, 0x08)?,
            gpio: MappedRegion::map(base + block::GPIO, 0xb4)?,
            dma: MappedRegion::map(base + dma_base, 0x24)?,
        };
        let buffer = DmaBuffer::allocate(platform.soc(), CONTROL_BLOCK_SIZE + buffer_len)?;

        // Reset
        registers.dma.write(dma::CS, dma::RESET);
        thread::sleep(SETTLE);
        registers.pwm.write(pwm::CTL, 0);
        thread::sleep(SETTLE);

        Ok(Self { registers, buffer })
    }

    pub fn build(self) -> (Registers, DmaBuffer) {
        (self.registers, self.buffer)
    }

    pub fn configure_clock(&mut self, divisor: u32) -> Result<()> {
        let clock = &self.registers.clock;

        clock.write(cm::CTL, cm::PASSWD | cm::KILL);
        completion::block_until("stopping the PWM clock", CLOCK_TIMEOUT, || {
            Ok(clock.read(cm::CTL) & cm::BUSY == 0)
        })?;

        clock.write(cm::DIV, cm::PASSWD | cm::divi(divisor));
        clock.write(cm::CTL, cm::PASSWD | cm::SRC_OSC);
        clock.write(cm::CTL, cm::PASSWD | cm::SRC_OSC | cm::ENAB);
        completion::block_until("starting the PWM clock", CLOCK_TIMEOUT, || {
            Ok(clock.read(cm::CTL) & cm::BUSY != 0)
        })?;

        Ok(())
    }

    pub fn configure_pwm(&mut self, channel: u8, invert: bool) {
        let pwm = &self.registers.pwm;
        let shift = pwm::channel_shift(channel);

        // Clear sticky status flags
        pwm.write(pwm::STA, pwm.read(pwm::STA));

        pwm.write(pwm::rng(channel), pwm::RANGE);
        pwm.write(pwm::dat(channel), 0);
        pwm.write(
            pwm::DMAC,
            pwm::DMAC_ENAB | pwm::dmac_panic(7) | pwm::dmac_dreq(3),
        );

        pwm.write(pwm::CTL, pwm::CLRF);
        thread::sleep(SETTLE);

        let mut ctl = pwm::USEF | pwm::MODE; // Serializer fed from the FIFO
        if invert {
            ctl |= pwm::POLA;
        }
        pwm.write(pwm::CTL, ctl << shift);
        pwm.modify(pwm::CTL, |ctl| ctl | (pwm::PWEN << shift));
    }

    pub fn configure_dma(&mut self) {
        let dma = &self.registers.dma;

        dma.write(dma::CS, dma::RESET);
        thread::sleep(SETTLE);
        dma.write(dma::CS, dma::INT | dma::END);
        dma.write(dma::DEBUG, dma::DEBUG_CLEAR_ERRORS);
    }

    pub fn configure_pin(&mut self, pin: u8, function: PinFunction) {
        set_pin_function(&self.registers.gpio, pin, function);
    }
}

/// Writes the function select field of a GPIO.
pub fn set_pin_function(gpio: &MappedRegion, pin: u8, function: PinFunction) {
    let (offset, shift) = gpio::fsel(pin);
    gpio.modify(offset, |fsel| (fsel & !(0b111 << shift)) | ((function as u32) << shift));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisors() {
        assert_eq!(clock_divisor(19_200_000, 800_000).unwrap(), (8, 416_666));
        assert_eq!(clock_divisor(19_200_000, 400_000).unwrap().0, 16);
        assert_eq!(clock_divisor(54_000_000, 800_000).unwrap(), (22, 407_407));
        assert!(clock_divisor(19_200_000, 4_000_000).is_err());
    }
}
