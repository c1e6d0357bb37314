//! Detection of the board and of the privileges needed to drive its peripherals.

use std::fs;

use crate::errors::{PermissionDeniedSnafu, Result, UnsupportedPlatformSnafu};

/// The Broadcom SoCs with a PWM/DMA pair this driver can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Soc {
    /// Raspberry Pi 1, Zero
    Bcm2835,
    /// Raspberry Pi 2
    Bcm2836,
    /// Raspberry Pi 3, Zero 2
    Bcm2837,
    /// Raspberry Pi 4, 400, CM4
    Bcm2711,
}

impl Soc {
    /// Physical (ARM side) base address of the peripherals.
    pub const fn peripheral_base(self) -> u64 {
        match self {
            Soc::Bcm2835 => 0x2000_0000,
            Soc::Bcm2836 | Soc::Bcm2837 => 0x3f00_0000,
            Soc::Bcm2711 => 0xfe00_0000,
        }
    }

    /// Bus alias of SDRAM, as seen by the DMA engine.
    pub const fn videocore_base(self) -> u32 {
        match self {
            Soc::Bcm2835 => 0x4000_0000,
            Soc::Bcm2836 | Soc::Bcm2837 | Soc::Bcm2711 => 0xc000_0000,
        }
    }

    /// The ARM physical address of an SDRAM bus address.
    pub const fn bus_to_physical(self, bus_address: u32) -> u64 {
        (bus_address & !self.videocore_base()) as u64
    }

    /// Mailbox allocation flags for memory the DMA engine can read coherently.
    pub const fn mem_flags(self) -> u32 {
        match self {
            // Direct and coherent, L1 non-allocating
            Soc::Bcm2835 => 0xc,
            // Direct, uncached
            Soc::Bcm2836 | Soc::Bcm2837 | Soc::Bcm2711 => 0x4,
        }
    }

    /// Frequency of the oscillator that clocks the PWM.
    pub const fn oscillator_frequency(self) -> u32 {
        match self {
            Soc::Bcm2711 => 54_000_000,
            Soc::Bcm2835 | Soc::Bcm2836 | Soc::Bcm2837 => 19_200_000,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bcm2708" | "bcm2835" => Some(Soc::Bcm2835),
            "bcm2709" | "bcm2836" => Some(Soc::Bcm2836),
            "bcm2710" | "bcm2837" => Some(Soc::Bcm2837),
            "bcm2711" => Some(Soc::Bcm2711),
            _ => None,
        }
    }
}

/// Finds the SoC in the contents of `/proc/device-tree/compatible`.
///
/// The file holds NUL separated `vendor,model` strings.
pub fn parse_compatible(compatible: &str) -> Option<Soc> {
    compatible
        .split('\0')
        .filter_map(|entry| entry.strip_prefix("brcm,"))
        .find_map(Soc::from_name)
}

/// Finds the SoC in the `Hardware` line of `/proc/cpuinfo`.
///
/// Newer kernels report `BCM2835` for every model, so this is only
/// a fallback for kernels without a device tree.
pub fn parse_cpuinfo(cpuinfo: &str) -> Option<Soc> {
    cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("hardware") {
            Soc::from_name(value)
        } else {
            None
        }
    })
}

/// A board that passed the platform and privilege checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    soc: Soc,
    model: Option<String>,
}

impl Platform {
    /// Checks privileges, then the board.
    ///
    /// The two failures are reported distinctly, as
    /// [`PermissionDenied`](crate::Ws281xError::PermissionDenied) and
    /// [`UnsupportedPlatform`](crate::Ws281xError::UnsupportedPlatform).
    pub fn probe() -> Result<Self> {
        check_privileges()?;

        let soc = detect_soc()?;
        let model = fs::read_to_string("/proc/device-tree/model")
            .ok()
            .map(|model| model.trim_end_matches('\0').to_string());

        log::debug!("Detected {:?} ({})", soc, model.as_deref().unwrap_or("unknown model"));

        Ok(Self { soc, model })
    }

    /// Creates a platform description without probing.
    pub fn new(soc: Soc) -> Self {
        Self { soc, model: None }
    }

    /// The detected SoC.
    pub fn soc(&self) -> Soc {
        self.soc
    }

    /// The board model, if the device tree names it.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

#[cfg(unix)]
fn check_privileges() -> Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return PermissionDeniedSnafu {
            reason: format!(
                "mapping peripheral memory requires root privileges (running as uid {euid})"
            ),
        }
        .fail();
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_privileges() -> Result<()> {
    UnsupportedPlatformSnafu {
        reason: "not a Linux host",
    }
    .fail()
}

fn detect_soc() -> Result<Soc> {
    if !cfg!(target_os = "linux") {
        return UnsupportedPlatformSnafu {
            reason: format!("{} is not supported, only Linux on a Raspberry Pi", std::env::consts::OS),
        }
        .fail();
    }

    if let Ok(compatible) = fs::read_to_string("/proc/device-tree/compatible") {
        if let Some(soc) = parse_compatible(&compatible) {
            return Ok(soc);
        }
        return UnsupportedPlatformSnafu {
            reason: format!(
                "unsupported board: {}",
                compatible.replace('\0', " ").trim_end()
            ),
        }
        .fail();
    }

    match fs::read_to_string("/proc/cpuinfo").ok().as_deref().and_then(parse_cpuinfo) {
        Some(soc) => Ok(soc),
        None => UnsupportedPlatformSnafu {
            reason: "could not verify Raspberry Pi SoC",
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_strings() {
        assert_eq!(
            parse_compatible("raspberrypi,4-model-b\0brcm,bcm2711\0"),
            Some(Soc::Bcm2711)
        );
        assert_eq!(
            parse_compatible("raspberrypi,3-model-b-plus\0brcm,bcm2837\0"),
            Some(Soc::Bcm2837)
        );
        assert_eq!(
            parse_compatible("raspberrypi,model-zero-w\0brcm,bcm2835\0"),
            Some(Soc::Bcm2835)
        );
        assert_eq!(parse_compatible("raspberrypi,5-model-b\0brcm,bcm2712\0"), None);
        assert_eq!(parse_compatible("qemu,virt\0"), None);
    }

    #[test]
    fn cpuinfo_hardware_line() {
        let cpuinfo = "processor\t: 0\nmodel name\t: ARMv7 Processor rev 4 (v7l)\n\nHardware\t: BCM2709\nRevision\t: a02082\n";
        assert_eq!(parse_cpuinfo(cpuinfo), Some(Soc::Bcm2836));
        assert_eq!(parse_cpuinfo("Hardware : bcm2708\n"), Some(Soc::Bcm2835));
        assert_eq!(parse_cpuinfo("processor : 0\nvendor_id : GenuineIntel\n"), None);
    }

    #[test]
    fn addresses() {
        assert_eq!(Soc::Bcm2835.peripheral_base(), 0x2000_0000);
        assert_eq!(Soc::Bcm2837.peripheral_base(), 0x3f00_0000);
        assert_eq!(Soc::Bcm2711.oscillator_frequency(), 54_000_000);
        assert_eq!(Soc::Bcm2835.videocore_base(), 0x4000_0000);

        assert_eq!(Soc::Bcm2835.bus_to_physical(0x4f00_1000), 0x0f00_1000);
        assert_eq!(Soc::Bcm2837.bus_to_physical(0xfe00_1000), 0x3e00_1000);
        assert_eq!(Soc::Bcm2711.bus_to_physical(0xc000_2000), 0x2000);
    }
}
