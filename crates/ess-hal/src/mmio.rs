//! Physical hardware backend: `/dev/mem` MMIO windows, MDIO ioctls, and a
//! sysfs reset control.
//!
//! Window sizes follow the platform's register-space layout: 512 KiB for
//! the switch core (the per-port statistics blocks sit at +0x1000) and
//! 2 KiB for the PSGMII wrapper. MDIO goes through the standard
//! `SIOCGMIIREG`/`SIOCSMIIREG` ioctls on the platform MDIO net device.
//!
//! Mapping failures are fatal to construction; the supervisor must not
//! come up half-attached (a missing window would silently no-op an entire
//! address space).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{HalError, HalResult};
use crate::Hal;

/// Switch-core window size.
const ESS_WINDOW_LEN: usize = 0x8_0000;
/// PSGMII wrapper window size.
const PSGMII_WINDOW_LEN: usize = 0x800;

const SIOCGMIIREG: libc::c_ulong = 0x8948;
const SIOCSMIIREG: libc::c_ulong = 0x8949;

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct MiiIoctlData {
    phy_id: u16,
    reg_num: u16,
    val_in: u16,
    val_out: u16,
}

#[repr(C)]
struct IfreqMii {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    mii: MiiIoctlData,
}

/// One mmap'd physical register window.
struct MmioWindow {
    ptr: *mut u8,
    len: usize,
}

impl MmioWindow {
    fn map(name: &str, phys_base: u64, len: usize) -> HalResult<Self> {
        let fd = unsafe {
            libc::open(
                c"/dev/mem".as_ptr(),
                libc::O_RDWR | libc::O_SYNC | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(HalError::bus(
                "open /dev/mem",
                io::Error::last_os_error().to_string(),
            ));
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                phys_base as libc::off_t,
            )
        };
        unsafe { libc::close(fd) };

        if ptr == libc::MAP_FAILED {
            return Err(HalError::unmapped(name));
        }
        tracing::debug!("mapped {name} window at {phys_base:#x} ({len:#x} bytes)");

        Ok(Self {
            ptr: ptr as *mut u8,
            len,
        })
    }

    fn check(&self, op: &str, reg: u32) -> HalResult<()> {
        if reg as usize + 4 > self.len {
            return Err(HalError::bus(
                op,
                format!("offset {reg:#x} outside {len:#x} window", len = self.len),
            ));
        }
        Ok(())
    }

    fn read(&self, op: &str, reg: u32) -> HalResult<u32> {
        self.check(op, reg)?;
        Ok(unsafe { std::ptr::read_volatile(self.ptr.add(reg as usize) as *const u32) })
    }

    fn write(&self, op: &str, reg: u32, val: u32) -> HalResult<()> {
        self.check(op, reg)?;
        unsafe { std::ptr::write_volatile(self.ptr.add(reg as usize) as *mut u32, val) };
        Ok(())
    }
}

impl Drop for MmioWindow {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
    }
}

/// MDIO access through the MII ioctls on a platform net device.
struct MiiBus {
    fd: libc::c_int,
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
}

impl MiiBus {
    fn open(dev: &str) -> HalResult<Self> {
        if dev.len() >= libc::IFNAMSIZ {
            return Err(HalError::bus("mii open", format!("device name '{dev}' too long")));
        }
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(HalError::bus(
                "mii open",
                io::Error::last_os_error().to_string(),
            ));
        }
        let mut ifr_name = [0 as libc::c_char; libc::IFNAMSIZ];
        for (dst, src) in ifr_name.iter_mut().zip(dev.bytes()) {
            *dst = src as libc::c_char;
        }
        Ok(Self { fd, ifr_name })
    }

    fn ifreq(&self, phy: u8, reg: u16) -> IfreqMii {
        IfreqMii {
            ifr_name: self.ifr_name,
            mii: MiiIoctlData {
                phy_id: phy as u16,
                reg_num: reg,
                ..Default::default()
            },
        }
    }

    fn read(&self, phy: u8, reg: u16) -> HalResult<u16> {
        let mut ifr = self.ifreq(phy, reg);
        let rc = unsafe { libc::ioctl(self.fd, SIOCGMIIREG, &mut ifr) };
        if rc < 0 {
            return Err(HalError::bus(
                "mdio_read",
                io::Error::last_os_error().to_string(),
            ));
        }
        Ok(ifr.mii.val_out)
    }

    fn write(&self, phy: u8, reg: u16, val: u16) -> HalResult<()> {
        let mut ifr = self.ifreq(phy, reg);
        ifr.mii.val_in = val;
        let rc = unsafe { libc::ioctl(self.fd, SIOCSMIIREG, &mut ifr) };
        if rc < 0 {
            return Err(HalError::bus(
                "mdio_write",
                io::Error::last_os_error().to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for MiiBus {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// Hardware-backed [`Hal`] over `/dev/mem` and the MII ioctls.
pub struct DevMemHal {
    ess: MmioWindow,
    psgmii: MmioWindow,
    mii: MiiBus,
    reset_ctrl: PathBuf,
}

// Raw window pointers make this !Send/!Sync by default. Concurrent word
// access is serialized by the supervisor's coarse locks, and a single
// aligned volatile word access is atomic on this hardware.
unsafe impl Send for DevMemHal {}
unsafe impl Sync for DevMemHal {}

impl DevMemHal {
    /// Maps both register windows, opens the MDIO device, and checks the
    /// reset control exists. Any failure leaves nothing running.
    pub fn new(
        switch_base: u64,
        psgmii_base: u64,
        mdio_dev: &str,
        reset_ctrl: &Path,
    ) -> HalResult<Self> {
        let ess = MmioWindow::map("switch", switch_base, ESS_WINDOW_LEN)?;
        let psgmii = MmioWindow::map("psgmii", psgmii_base, PSGMII_WINDOW_LEN)?;
        let mii = MiiBus::open(mdio_dev)?;
        if !reset_ctrl.exists() {
            return Err(HalError::bus(
                "reset_ctrl",
                format!("{} does not exist", reset_ctrl.display()),
            ));
        }
        Ok(Self {
            ess,
            psgmii,
            mii,
            reset_ctrl: reset_ctrl.to_path_buf(),
        })
    }

    fn write_reset(&self, val: &str) -> HalResult<()> {
        fs::write(&self.reset_ctrl, val)
            .map_err(|e| HalError::bus("reset_ctrl", e.to_string()))
    }
}

impl Hal for DevMemHal {
    fn ess_read(&self, reg: u32) -> HalResult<u32> {
        self.ess.read("ess_read", reg)
    }

    fn ess_write(&self, reg: u32, val: u32) -> HalResult<()> {
        self.ess.write("ess_write", reg, val)
    }

    fn psgmii_read(&self, reg: u32) -> HalResult<u32> {
        self.psgmii.read("psgmii_read", reg)
    }

    fn psgmii_write(&self, reg: u32, val: u32) -> HalResult<()> {
        self.psgmii.write("psgmii_write", reg, val)
    }

    fn mdio_read(&self, phy: u8, reg: u16) -> HalResult<u16> {
        if phy > 0x1f {
            return Err(HalError::InvalidPhy { phy });
        }
        self.mii.read(phy, reg)
    }

    fn mdio_write(&self, phy: u8, reg: u16, val: u16) -> HalResult<()> {
        if phy > 0x1f {
            return Err(HalError::InvalidPhy { phy });
        }
        self.mii.write(phy, reg, val)
    }

    fn assert_ess_reset(&self) -> HalResult<()> {
        self.write_reset("1")
    }

    fn deassert_ess_reset(&self) -> HalResult<()> {
        self.write_reset("0")
    }
}
