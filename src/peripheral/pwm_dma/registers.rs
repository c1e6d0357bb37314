use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

use crate::errors::{HardwareFaultSnafu, PermissionDeniedSnafu, Result, UnsupportedPlatformSnafu};

/// Offsets of the peripheral blocks from the peripheral base.
pub mod block {
    pub const DMA: u64 = 0x0000_7000;
    pub const DMA_CHANNEL_STRIDE: u64 = 0x100;
    pub const CM_PWM: u64 = 0x0010_10a0;
    pub const GPIO: u64 = 0x0020_0000;
    pub const PWM: u64 = 0x0020_c000;

    /// Bus address of the PWM FIFO, as targeted by DMA.
    pub const PWM_FIF1_BUS: u32 = 0x7e20_c018;
}

pub mod pwm {
    pub const CTL: usize = 0x00;
    pub const STA: usize = 0x04;
    pub const DMAC: usize = 0x08;

    /// Range register of a channel.
    pub const fn rng(channel: u8) -> usize {
        0x10 + channel as usize * 0x10
    }

    /// Data register of a channel.
    pub const fn dat(channel: u8) -> usize {
        0x14 + channel as usize * 0x10
    }

    // CTL, channel 1 bits; channel 2 is shifted by 8.
    pub const PWEN: u32 = 1 << 0;
    pub const MODE: u32 = 1 << 1;
    pub const RPTL: u32 = 1 << 2;
    pub const SBIT: u32 = 1 << 3;
    pub const POLA: u32 = 1 << 4;
    pub const USEF: u32 = 1 << 5;
    pub const CLRF: u32 = 1 << 6;
    pub const MSEN: u32 = 1 << 7;

    /// All control bits of channel 1.
    pub const CHANNEL_MASK: u32 = PWEN | MODE | RPTL | SBIT | POLA | USEF | MSEN;

    /// Shift of the control bits of a channel.
    pub const fn channel_shift(channel: u8) -> u32 {
        channel as u32 * 8
    }

    // STA
    pub const EMPT1: u32 = 1 << 1;
    pub const BERR: u32 = 1 << 8;

    // DMAC
    pub const DMAC_ENAB: u32 = 1 << 31;
    pub const fn dmac_panic(threshold: u32) -> u32 {
        (threshold & 0xff) << 8
    }
    pub const fn dmac_dreq(threshold: u32) -> u32 {
        threshold & 0xff
    }

    /// Bits per FIFO word.
    pub const RANGE: u32 = 32;
}

pub mod cm {
    pub const CTL: usize = 0x00;
    pub const DIV: usize = 0x04;

    pub const PASSWD: u32 = 0x5a << 24;
    pub const SRC_OSC: u32 = 1;
    pub const ENAB: u32 = 1 << 4;
    pub const KILL: u32 = 1 << 5;
    pub const BUSY: u32 = 1 << 7;

    pub const fn divi(divisor: u32) -> u32 {
        (divisor & 0xfff) << 12
    }

    pub const MAX_DIVI: u32 = 0xfff;
}

pub mod dma {
    pub const CS: usize = 0x00;
    pub const CONBLK_AD: usize = 0x04;
    pub const DEBUG: usize = 0x20;

    // CS
    pub const ACTIVE: u32 = 1 << 0;
    pub const END: u32 = 1 << 1;
    pub const INT: u32 = 1 << 2;
    pub const ERROR: u32 = 1 << 8;
    pub const WAIT_OUTSTANDING_WRITES: u32 = 1 << 28;
    pub const RESET: u32 = 1 << 31;
    pub const fn priority(p: u32) -> u32 {
        (p & 0xf) << 16
    }
    pub const fn panic_priority(p: u32) -> u32 {
        (p & 0xf) << 20
    }

    // TI
    pub const WAIT_RESP: u32 = 1 << 3;
    pub const DEST_DREQ: u32 = 1 << 6;
    pub const SRC_INC: u32 = 1 << 8;
    pub const NO_WIDE_BURSTS: u32 = 1 << 26;
    pub const fn permap(peripheral: u32) -> u32 {
        (peripheral & 0x1f) << 16
    }
    /// DREQ line of the PWM.
    pub const PERMAP_PWM: u32 = 5;

    // DEBUG; write to clear.
    pub const DEBUG_CLEAR_ERRORS: u32 = 0x7;
}

pub mod gpio {
    pub const GPCLR0: usize = 0x28;

    pub const fn fsel(pin: u8) -> (usize, u32) {
        ((pin as usize / 10) * 4, (pin as u32 % 10) * 3)
    }

    pub const fn clr(pin: u8) -> (usize, u32) {
        (GPCLR0 + (pin as usize / 32) * 4, 1 << (pin as u32 % 32))
    }
}

/// A window of physical memory mapped through `/dev/mem`.
#[derive(Debug)]
pub struct MappedRegion {
    map: NonNull<u8>,
    map_len: usize,
    offset: usize,
    len: usize,
}

// The region is only ever accessed through volatile reads and writes
// by the handle that owns it.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Maps `len` bytes starting at physical address `phys`.
    pub fn map(phys: u64, len: usize) -> Result<Self> {
        let page_size = page_size();
        let page_base = phys & !(page_size as u64 - 1);
        let offset = (phys - page_base) as usize;
        let map_len = (offset + len + page_size - 1) / page_size * page_size;

        let path = CString::new("/dev/mem").map_err(|_| {
            HardwareFaultSnafu {
                reason: "invalid device path",
            }
            .build()
        })?;

        // SAFETY: `path` is a valid NUL terminated string.
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_SYNC | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(map_open_error(io::Error::last_os_error()));
        }

        // SAFETY: `fd` is open; a shared mapping of it does not alias any Rust object.
        let map = unsafe {
            mmap(
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                page_base,
            )
        };
        let mmap_error = io::Error::last_os_error();

        // SAFETY: the mapping stays valid after the descriptor is closed.
        unsafe { libc::close(fd) };

        if map == libc::MAP_FAILED {
            return HardwareFaultSnafu {
                reason: format!("unable to map physical address {phys:#x}: {mmap_error}"),
            }
            .fail();
        }

        let map = NonNull::new(map.cast::<u8>()).ok_or_else(|| {
            HardwareFaultSnafu {
                reason: format!("null mapping of physical address {phys:#x}"),
            }
            .build()
        })?;

        log::trace!("Mapped {:#x}+{:#x} to {:p}.", phys, len, map);

        Ok(Self {
            map,
            map_len,
            offset,
            len,
        })
    }

    fn reg(&self, offset: usize) -> *mut u32 {
        debug_assert!(offset % 4 == 0 && offset + 4 <= self.len);
        // SAFETY: within the mapping, checked above in debug builds.
        unsafe { self.map.as_ptr().add(self.offset + offset).cast() }
    }

    /// Reads the 32-bit register at `offset`.
    pub fn read(&self, offset: usize) -> u32 {
        // SAFETY: the register lies within the mapping and is 4-byte aligned.
        unsafe { self.reg(offset).read_volatile() }
    }

    /// Writes the 32-bit register at `offset`.
    pub fn write(&self, offset: usize, value: u32) {
        // SAFETY: the register lies within the mapping and is 4-byte aligned.
        unsafe { self.reg(offset).write_volatile(value) }
    }

    /// Read-modify-write of the register at `offset`.
    pub fn modify(&self, offset: usize, f: impl FnOnce(u32) -> u32) {
        self.write(offset, f(self.read(offset)));
    }

    /// Copies `words` into the region, starting at `offset`.
    pub fn write_words(&self, offset: usize, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            self.write(offset + i * 4, *word);
        }
    }

    /// Size of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: `map` and `map_len` describe a mapping created by `map()`.
        if unsafe { libc::munmap(self.map.as_ptr().cast(), self.map_len) } != 0 {
            log::error!(
                "Unable to unmap {:p}: {}",
                self.map,
                io::Error::last_os_error()
            );
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        size if size > 0 => size as usize,
        _ => 4096,
    }
}

#[cfg(target_env = "gnu")]
unsafe fn mmap(len: usize, prot: i32, flags: i32, fd: i32, offset: u64) -> *mut libc::c_void {
    libc::mmap64(core::ptr::null_mut(), len, prot, flags, fd, offset as libc::off64_t)
}

#[cfg(not(target_env = "gnu"))]
unsafe fn mmap(len: usize, prot: i32, flags: i32, fd: i32, offset: u64) -> *mut libc::c_void {
    libc::mmap(core::ptr::null_mut(), len, prot, flags, fd, offset as libc::off_t)
}

fn map_open_error(error: io::Error) -> crate::Ws281xError {
    match error.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => PermissionDeniedSnafu {
            reason: format!("unable to open /dev/mem: {error}"),
        }
        .build(),
        Some(libc::ENOENT) => UnsupportedPlatformSnafu {
            reason: "/dev/mem does not exist",
        }
        .build(),
        _ => HardwareFaultSnafu {
            reason: format!("unable to open /dev/mem: {error}"),
        }
        .build(),
    }
}
