use std::ffi::CString;
use std::io;

use super::registers::MappedRegion;
use crate::errors::{HardwareFaultSnafu, PermissionDeniedSnafu, Result, UnsupportedPlatformSnafu};
use crate::platform::Soc;

const TAG_ALLOCATE: u32 = 0x0003_000c;
const TAG_LOCK: u32 = 0x0003_000d;
const TAG_UNLOCK: u32 = 0x0003_000e;
const TAG_RELEASE: u32 = 0x0003_000f;

const REQUEST: u32 = 0;
const RESPONSE_SUCCESS: u32 = 0x8000_0000;

const PAGE: u32 = 4096;

// _IOWR(100, 0, char *)
const IOCTL_PROPERTY: libc::c_ulong = (3 << 30)
    | ((core::mem::size_of::<*mut libc::c_char>() as libc::c_ulong) << 16)
    | (100 << 8);

/// The property channel of the VideoCore firmware.
#[derive(Debug)]
struct Mailbox {
    fd: libc::c_int,
}

impl Mailbox {
    fn open() -> Result<Self> {
        let path = CString::new("/dev/vcio").map_err(|_| {
            HardwareFaultSnafu {
                reason: "invalid device path",
            }
            .build()
        })?;

        // SAFETY: `path` is a valid NUL terminated string.
        let fd = unsafe { libc::open(path.as_ptr(), 0) };
        if fd < 0 {
            let error = io::Error::last_os_error();
            return Err(match error.raw_os_error() {
                Some(libc::EACCES) | Some(libc::EPERM) => PermissionDeniedSnafu {
                    reason: format!("unable to open /dev/vcio: {error}"),
                }
                .build(),
                Some(libc::ENOENT) => UnsupportedPlatformSnafu {
                    reason: "/dev/vcio does not exist",
                }
                .build(),
                _ => HardwareFaultSnafu {
                    reason: format!("unable to open /dev/vcio: {error}"),
                }
                .build(),
            });
        }

        Ok(Self { fd })
    }

    /// Sends a single tag and returns the first response word.
    fn property(&self, tag: u32, args: &[u32]) -> Result<u32> {
        let mut message = encode_message(tag, args);

        // SAFETY: `message` is a well formed property buffer that outlives the call.
        let rc = unsafe { libc::ioctl(self.fd, IOCTL_PROPERTY as _, message.as_mut_ptr()) };
        if rc < 0 {
            return HardwareFaultSnafu {
                reason: format!(
                    "mailbox tag {tag:#x} failed: {}",
                    io::Error::last_os_error()
                ),
            }
            .fail();
        }

        decode_response(tag, &message)
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        // SAFETY: `fd` was opened by `open()` and is closed only here.
        unsafe { libc::close(self.fd) };
    }
}

fn encode_message(tag: u32, args: &[u32]) -> Vec<u32> {
    let arg_bytes = (args.len() * 4) as u32;
    let mut message = Vec::with_capacity(args.len() + 6);
    message.push(0); // size, filled in below
    message.push(REQUEST);
    message.push(tag);
    message.push(arg_bytes);
    message.push(arg_bytes);
    message.extend_from_slice(args);
    message.push(0); // end tag
    message[0] = (message.len() * 4) as u32;
    message
}

fn decode_response(tag: u32, message: &[u32]) -> Result<u32> {
    match (message.get(1), message.get(5)) {
        (Some(&RESPONSE_SUCCESS), Some(&value)) => Ok(value),
        (code, _) => HardwareFaultSnafu {
            reason: format!("mailbox tag {tag:#x} rejected (response code {code:#x?})"),
        }
        .fail(),
    }
}

/// Memory the DMA engine can read, allocated from the GPU.
///
/// Released in reverse order of acquisition: unmapped, unlocked, freed.
#[derive(Debug)]
pub struct DmaBuffer {
    region: Option<MappedRegion>,
    mailbox: Mailbox,
    handle: u32,
    bus_address: u32,
    len: usize,
}

impl DmaBuffer {
    /// Allocates and maps at least `len` bytes.
    pub fn allocate(soc: Soc, len: usize) -> Result<Self> {
        let mailbox = Mailbox::open()?;
        let size = (len as u32 + PAGE - 1) / PAGE * PAGE;

        let handle = mailbox.property(TAG_ALLOCATE, &[size, PAGE, soc.mem_flags()])?;
        if handle == 0 {
            return HardwareFaultSnafu {
                reason: format!("GPU memory allocation of {size} bytes failed"),
            }
            .fail();
        }

        let mut buffer = Self {
            region: None,
            mailbox,
            handle,
            bus_address: 0,
            len: size as usize,
        };

        buffer.bus_address = buffer.mailbox.property(TAG_LOCK, &[handle])?;
        if buffer.bus_address == 0 {
            return HardwareFaultSnafu {
                reason: "unable to lock GPU memory",
            }
            .fail();
        }

        let phys = soc.bus_to_physical(buffer.bus_address);
        buffer.region = Some(MappedRegion::map(phys, buffer.len)?);

        log::debug!(
            "Allocated {} bytes of DMA memory at bus address {:#010x}.",
            buffer.len,
            buffer.bus_address
        );

        Ok(buffer)
    }

    /// The mapped memory.
    pub fn region(&self) -> Result<&MappedRegion> {
        self.region.as_ref().ok_or_else(|| {
            HardwareFaultSnafu {
                reason: "DMA memory not mapped",
            }
            .build()
        })
    }

    /// The address the DMA engine sees the buffer at.
    pub fn bus_address(&self) -> u32 {
        self.bus_address
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        self.region = None;

        if self.bus_address != 0 {
            if let Err(e) = self.mailbox.property(TAG_UNLOCK, &[self.handle]) {
                log::error!("{}", e);
            }
        }
        if let Err(e) = self.mailbox.property(TAG_RELEASE, &[self.handle]) {
            log::error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_layout() {
        let message = encode_message(TAG_ALLOCATE, &[4096, 4096, 0xc]);
        assert_eq!(
            message,
            [36, 0, TAG_ALLOCATE, 12, 12, 4096, 4096, 0xc, 0]
        );
    }

    #[test]
    fn responses() {
        let ok = [28, RESPONSE_SUCCESS, TAG_LOCK, 4, 0x8000_0004, 0xfe00_1000, 0];
        assert_eq!(decode_response(TAG_LOCK, &ok).unwrap(), 0xfe00_1000);

        let rejected = [28, 0x8000_0001, TAG_LOCK, 4, 4, 0, 0];
        assert!(decode_response(TAG_LOCK, &rejected).unwrap_err().is_hardware_fault());
    }
}
