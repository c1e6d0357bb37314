//! BCM283x PWM serializer, fed from memory by a DMA channel.
//!
//! Every WS281x bit is expanded into three PWM symbols. The symbol stream
//! lives in GPU allocated memory behind a single DMA control block; the
//! DMA paces its writes into the PWM FIFO by the PWM's DREQ line.

use std::thread;
use std::time::Duration;

use super::{ChannelClaims, Claim, OutputChannel, Peripheral, PinFunction};
use crate::config::StripConfig;
use crate::errors::{HardwareFaultSnafu, InvalidConfigSnafu, Result, UseAfterCloseSnafu};
use crate::platform::Platform;
use crate::waveform::Waveform;

mod completion;
mod driver_builder;
mod mailbox;
mod registers;

use driver_builder::{DriverBuilder, CONTROL_BLOCK_SIZE};
use mailbox::DmaBuffer;
use registers::{block, dma, gpio, pwm, MappedRegion};

/// The PWM has a single FIFO, so one strip at a time may use it.
static HARDWARE_CLAIMS: ChannelClaims = ChannelClaims::new();

// Upper bound for a transfer, on top of twice its nominal duration.
const TRANSFER_MARGIN: Duration = Duration::from_millis(20);

pub struct Registers {
    pwm: MappedRegion,
    clock: MappedRegion,
    gpio: MappedRegion,
    dma: MappedRegion,
}

struct Hardware {
    registers: Registers,
    buffer: DmaBuffer,
}

/// A strip output on a PWM channel.
pub struct PwmDma {
    channel: OutputChannel,
    claim: Option<Claim<&'static ChannelClaims>>,
    hardware: Option<Hardware>,
    gpio_pin: u8,
    symbol_ps: u64,
    brightness: u8,
    reset_gap: Duration,
    faulted: bool,
}

impl PwmDma {
    /// Binds the output of `config` and brings up clock, PWM, DMA and pin.
    pub fn open(platform: &Platform, config: &StripConfig) -> Result<Self> {
        let channel = OutputChannel::of(config);
        let claim = ChannelClaims::claim_with(&HARDWARE_CLAIMS, channel, |_, _| true)?;

        let Some(pin) = super::pwm_pin(config.gpio_pin()) else {
            return InvalidConfigSnafu {
                reason: format!("GPIO {} has no PWM function", config.gpio_pin()),
            }
            .fail();
        };

        let soc = platform.soc();
        let (divisor, symbol_ps) =
            driver_builder::clock_divisor(soc.oscillator_frequency(), config.frequency())?;
        let frame_len = frame_capacity(config, symbol_ps);

        log::debug!("Initializing PWM/DMA output {}.", channel);
        log::debug!("    SoC: {:?}", soc);
        log::debug!("    Model: {}", platform.model().unwrap_or("unknown"));
        log::debug!("    Peripheral base: {:#010x}", soc.peripheral_base());
        log::debug!("    GPIO: {} ({:?})", pin.gpio, pin.function);
        log::debug!("    Clock divisor: {}", divisor);
        log::debug!("    Symbol period: {} ps", symbol_ps);
        log::debug!("    Frame buffer: {} bytes", frame_len);

        let mut driver = DriverBuilder::new(platform, config, frame_len)?;
        driver.configure_clock(divisor)?;
        driver.configure_pwm(channel.pwm, config.invert());
        driver.configure_dma();
        driver.configure_pin(pin.gpio, pin.function);
        let (registers, buffer) = driver.build();

        Ok(Self {
            channel,
            claim: Some(claim),
            hardware: Some(Hardware { registers, buffer }),
            gpio_pin: pin.gpio,
            symbol_ps,
            brightness: config.brightness(),
            reset_gap: config.timing().reset_gap(),
            faulted: false,
        })
    }

    fn hardware(&self) -> Result<&Hardware> {
        match &self.hardware {
            Some(hardware) if self.claim.is_some() => Ok(hardware),
            _ => UseAfterCloseSnafu.fail(),
        }
    }

    fn wait_idle(&self, operation: &'static str, timeout: Duration) -> Result<()> {
        let registers = &self.hardware()?.registers;
        completion::block_until(operation, timeout, || transfer_finished(registers))
    }

    fn start_transfer(&self, stream_words: &[u32], byte_len: usize) -> Result<()> {
        let Hardware { registers, buffer } = self.hardware()?;
        let memory = buffer.region()?;

        if CONTROL_BLOCK_SIZE + byte_len > memory.len() {
            return InvalidConfigSnafu {
                reason: format!(
                    "frame of {byte_len} bytes exceeds the DMA buffer of {} bytes",
                    memory.len() - CONTROL_BLOCK_SIZE
                ),
            }
            .fail();
        }

        let bus_address = buffer.bus_address();
        memory.write_words(CONTROL_BLOCK_SIZE, stream_words);
        memory.write_words(
            0,
            &[
                dma::NO_WIDE_BURSTS
                    | dma::WAIT_RESP
                    | dma::DEST_DREQ
                    | dma::permap(dma::PERMAP_PWM)
                    | dma::SRC_INC,
                bus_address + CONTROL_BLOCK_SIZE as u32,
                block::PWM_FIF1_BUS,
                byte_len as u32,
                0, // stride
                0, // next control block
                0,
                0,
            ],
        );

        let dma_regs = &registers.dma;
        dma_regs.write(dma::CS, dma::RESET);
        thread::sleep(Duration::from_micros(10));
        dma_regs.write(dma::CS, dma::INT | dma::END);
        dma_regs.write(dma::CONBLK_AD, bus_address);
        dma_regs.write(dma::DEBUG, dma::DEBUG_CLEAR_ERRORS);
        dma_regs.write(
            dma::CS,
            dma::WAIT_OUTSTANDING_WRITES
                | dma::panic_priority(15)
                | dma::priority(15)
                | dma::ACTIVE,
        );

        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(Hardware { registers, buffer }) = self.hardware.take() else {
            return;
        };

        registers.dma.write(dma::CS, dma::RESET);
        registers
            .pwm
            .modify(pwm::CTL, |ctl| ctl & !(pwm::CHANNEL_MASK << pwm::channel_shift(self.channel.pwm)));

        // Hold the line low
        driver_builder::set_pin_function(&registers.gpio, self.gpio_pin, PinFunction::Output);
        let (offset, mask) = gpio::clr(self.gpio_pin);
        registers.gpio.write(offset, mask);

        drop(buffer);
        drop(registers);
    }
}

impl Peripheral for PwmDma {
    fn channel(&self) -> OutputChannel {
        self.channel
    }

    fn transmit(&mut self, waveform: &Waveform) -> Result<()> {
        self.hardware()?;

        if self.faulted {
            return HardwareFaultSnafu {
                reason: format!("{} faulted by a previous transmission", self.channel),
            }
            .fail();
        }

        let stream = waveform.to_symbols(self.symbol_ps);
        let timeout = waveform.duration() * 2 + TRANSFER_MARGIN;

        let result = self
            .start_transfer(stream.words(), stream.byte_len())
            .and_then(|()| self.wait_idle("transmission", timeout));

        if let Err(e) = &result {
            if e.is_hardware_fault() {
                self.faulted = true;
            }
        }
        result
    }

    fn set_brightness_scale(&mut self, scale: u8) -> Result<()> {
        self.hardware()?;
        self.brightness = scale;
        Ok(())
    }

    fn brightness_scale(&self) -> Result<u8> {
        self.hardware()?;
        Ok(self.brightness)
    }

    fn close(&mut self) -> Result<()> {
        self.hardware()?;

        let drained = if self.faulted {
            Ok(())
        } else {
            self.wait_idle("draining the PWM FIFO", self.reset_gap + TRANSFER_MARGIN)
        };

        thread::sleep(self.reset_gap);
        self.shutdown();
        self.claim = None;

        log::debug!("Closed PWM/DMA output {}.", self.channel);
        drained
    }

    fn is_closed(&self) -> bool {
        self.claim.is_none()
    }
}

impl Drop for PwmDma {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                log::error!("Unable to close {}: {}", self.channel, e);
            }
        }
    }
}

/// DMA has consumed the buffer and the PWM has shifted out the FIFO.
fn transfer_finished(registers: &Registers) -> Result<bool> {
    let cs = registers.dma.read(dma::CS);
    if cs & dma::ERROR != 0 {
        let debug = registers.dma.read(dma::DEBUG);
        return HardwareFaultSnafu {
            reason: format!("DMA error (CS {cs:#010x}, DEBUG {debug:#x})"),
        }
        .fail();
    }

    let sta = registers.pwm.read(pwm::STA);
    if sta & pwm::BERR != 0 {
        log::warn!("PWM bus error (STA {:#x}).", sta);
        registers.pwm.write(pwm::STA, pwm::BERR);
    }

    Ok(cs & dma::ACTIVE == 0 && sta & pwm::EMPT1 != 0)
}

/// The symbol stream size of every frame of `config`.
fn frame_capacity(config: &StripConfig, symbol_ps: u64) -> usize {
    Waveform::blank(
        config.count(),
        config.strip_type().channel_count(),
        config.timing(),
    )
    .to_symbols(symbol_ps)
    .byte_len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::RawColor;
    use crate::StripType;

    #[test]
    fn capacity_fits_every_frame() {
        let config = StripConfig::builder(16)
            .strip_type(StripType::Ws2811Grb)
            .build()
            .unwrap();
        let (_, symbol_ps) = driver_builder::clock_divisor(19_200_000, 800_000).unwrap();
        let capacity = frame_capacity(&config, symbol_ps);

        let mixed = Waveform::encode(
            &crate::strip_type::encode_all(
                StripType::Ws2811Grb,
                RawColor(0x00a5_5a0f),
                16,
                255,
            ),
            config.timing(),
        );
        assert_eq!(mixed.to_symbols(symbol_ps).byte_len(), capacity);

        // 3 symbols per bit, plus at least 55 us of low symbols
        assert!(capacity * 8 >= 16 * 24 * 3 + 132);
    }
}
