//! Direct DRM/KMS gamma control via raw kernel ioctl.
//!
//! Pure kernel interface, no libdrm. Opens `/dev/dri/card{N}` and
//! drives the mode-setting gamma LUT ioctls directly. The ioctl struct
//! layouts are kernel ABI; their sizes are asserted at compile time.

use super::GammaError;
use super::colorramp;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};

const DRM_IOCTL_BASE: libc::c_ulong = b'd' as libc::c_ulong;
const DRM_IOCTL_MODE_GETRESOURCES: libc::c_ulong = 0xA0;
const DRM_IOCTL_MODE_GETCRTC: libc::c_ulong = 0xA1;
const DRM_IOCTL_MODE_GETGAMMA: libc::c_ulong = 0xA4;
const DRM_IOCTL_MODE_SETGAMMA: libc::c_ulong = 0xA5;

/// `struct drm_mode_card_res` from `drm/drm_mode.h`.
#[repr(C)]
#[derive(Default)]
struct DrmModeCardRes {
    fb_id_ptr: u64,
    crtc_id_ptr: u64,
    connector_id_ptr: u64,
    encoder_id_ptr: u64,
    count_fbs: u32,
    count_crtcs: u32,
    count_connectors: u32,
    count_encoders: u32,
    min_width: u32,
    max_width: u32,
    min_height: u32,
    max_height: u32,
}

/// `struct drm_mode_crtc`. The trailing mode info is opaque here.
#[repr(C)]
struct DrmModeCrtc {
    set_connectors_ptr: u64,
    count_connectors: u32,
    crtc_id: u32,
    fb_id: u32,
    x: u32,
    y: u32,
    gamma_size: u32,
    mode_valid: u32,
    mode: [u8; 68],
}

impl Default for DrmModeCrtc {
    fn default() -> Self {
        // Safety: all-zero is a valid bit pattern for this POD struct
        unsafe { std::mem::zeroed() }
    }
}

/// `struct drm_mode_crtc_lut`: the gamma set/get payload.
#[repr(C)]
#[derive(Default)]
struct DrmModeCrtcLut {
    crtc_id: u32,
    gamma_size: u32,
    red: u64,
    green: u64,
    blue: u64,
}

// Kernel ABI sizes. A mismatch here means the struct definitions above
// no longer match the kernel headers.
const _: () = assert!(std::mem::size_of::<DrmModeCardRes>() == 64);
const _: () = assert!(std::mem::size_of::<DrmModeCrtc>() == 104);
const _: () = assert!(std::mem::size_of::<DrmModeCrtcLut>() == 32);

/// `_IOWR('d', nr, T)` and dispatch.
fn ioctl_rw<T>(fd: RawFd, nr: libc::c_ulong, data: &mut T) -> Result<(), GammaError> {
    let size = std::mem::size_of::<T>() as libc::c_ulong;
    let request: libc::c_ulong = (3 << 30) | ((size & 0x3FFF) << 16) | (DRM_IOCTL_BASE << 8) | nr;

    let ret = unsafe { libc::ioctl(fd, request as libc::Ioctl, data as *mut T) };
    if ret < 0 {
        Err(GammaError::Resources)
    } else {
        Ok(())
    }
}

/// Saved and working ramps for one CRTC. `gamma_size <= 1` marks the
/// CRTC unusable and it is skipped everywhere.
struct CrtcState {
    crtc_id: u32,
    gamma_size: u32,
    saved_r: Vec<u16>,
    saved_g: Vec<u16>,
    saved_b: Vec<u16>,
    work_r: Vec<u16>,
    work_g: Vec<u16>,
    work_b: Vec<u16>,
}

impl CrtcState {
    fn unusable(crtc_id: u32) -> Self {
        Self {
            crtc_id,
            gamma_size: 0,
            saved_r: Vec::new(),
            saved_g: Vec::new(),
            saved_b: Vec::new(),
            work_r: Vec::new(),
            work_g: Vec::new(),
            work_b: Vec::new(),
        }
    }
}

/// DRM backend state. Holds the card fd and every CRTC's pre-daemon
/// gamma, which is written back on restore and drop.
pub struct DrmState {
    fd: RawFd,
    _file: File, // owns the fd
    crtcs: Vec<CrtcState>,
}

impl DrmState {
    pub fn init(card_num: i32) -> Result<Self, GammaError> {
        let path = format!("/dev/dri/card{card_num}");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    GammaError::Permission
                } else {
                    GammaError::Open
                }
            })?;

        let fd = file.as_raw_fd();

        // The GETRESOURCES handshake the kernel ABI mandates: first
        // call learns the counts, second call fills the arrays.
        let mut res = DrmModeCardRes::default();
        ioctl_rw(fd, DRM_IOCTL_MODE_GETRESOURCES, &mut res)?;

        if res.count_crtcs == 0 {
            return Err(GammaError::NoCrtc);
        }

        let mut crtc_ids = vec![0u32; res.count_crtcs as usize];
        res.crtc_id_ptr = crtc_ids.as_mut_ptr() as u64;
        // Drop the other counts so the kernel only fills what we sized
        res.count_fbs = 0;
        res.count_connectors = 0;
        res.count_encoders = 0;
        ioctl_rw(fd, DRM_IOCTL_MODE_GETRESOURCES, &mut res)?;

        let mut crtcs = Vec::with_capacity(res.count_crtcs as usize);

        for &crtc_id in &crtc_ids[..res.count_crtcs as usize] {
            let mut crtc_info = DrmModeCrtc {
                crtc_id,
                ..Default::default()
            };
            if ioctl_rw(fd, DRM_IOCTL_MODE_GETCRTC, &mut crtc_info).is_err()
                || crtc_info.gamma_size <= 1
            {
                crtcs.push(CrtcState::unusable(crtc_id));
                continue;
            }

            let gamma_size = crtc_info.gamma_size;
            let mut saved_r = vec![0u16; gamma_size as usize];
            let mut saved_g = vec![0u16; gamma_size as usize];
            let mut saved_b = vec![0u16; gamma_size as usize];

            let mut lut = DrmModeCrtcLut {
                crtc_id,
                gamma_size,
                red: saved_r.as_mut_ptr() as u64,
                green: saved_g.as_mut_ptr() as u64,
                blue: saved_b.as_mut_ptr() as u64,
            };
            if ioctl_rw(fd, DRM_IOCTL_MODE_GETGAMMA, &mut lut).is_err() {
                crtcs.push(CrtcState::unusable(crtc_id));
                continue;
            }

            crtcs.push(CrtcState {
                crtc_id,
                gamma_size,
                saved_r,
                saved_g,
                saved_b,
                work_r: vec![0u16; gamma_size as usize],
                work_g: vec![0u16; gamma_size as usize],
                work_b: vec![0u16; gamma_size as usize],
            });
        }

        Ok(Self {
            fd,
            _file: file,
            crtcs,
        })
    }

    pub fn crtc_count(&self) -> usize {
        self.crtcs.len()
    }

    pub fn gamma_size(&self, crtc_idx: usize) -> usize {
        self.crtcs
            .get(crtc_idx)
            .map(|c| c.gamma_size as usize)
            .unwrap_or(0)
    }

    pub fn set_temperature_crtc(
        &mut self,
        crtc_idx: usize,
        temp: i32,
        brightness: f32,
    ) -> Result<(), GammaError> {
        let fd = self.fd;
        let crtc = self.crtcs.get_mut(crtc_idx).ok_or(GammaError::Crtc)?;
        if crtc.gamma_size <= 1 {
            return Err(GammaError::Crtc);
        }

        colorramp::fill_gamma_ramps(
            temp,
            &mut crtc.work_r,
            &mut crtc.work_g,
            &mut crtc.work_b,
            brightness,
        );

        let mut lut = DrmModeCrtcLut {
            crtc_id: crtc.crtc_id,
            gamma_size: crtc.gamma_size,
            red: crtc.work_r.as_mut_ptr() as u64,
            green: crtc.work_g.as_mut_ptr() as u64,
            blue: crtc.work_b.as_mut_ptr() as u64,
        };
        ioctl_rw(fd, DRM_IOCTL_MODE_SETGAMMA, &mut lut).map_err(|_| GammaError::Gamma)
    }

    /// Apply to every usable CRTC; success when at least one took.
    pub fn set_temperature(&mut self, temp: i32, brightness: f32) -> Result<(), GammaError> {
        let mut last_err = None;
        let mut successes = 0;

        for i in 0..self.crtcs.len() {
            if self.crtcs[i].gamma_size > 1 {
                match self.set_temperature_crtc(i, temp, brightness) {
                    Ok(()) => successes += 1,
                    Err(e) => last_err = Some(e),
                }
            }
        }

        if successes > 0 {
            Ok(())
        } else {
            Err(last_err.unwrap_or(GammaError::NoCrtc))
        }
    }

    /// Write back the saved pre-daemon ramps.
    pub fn restore(&mut self) -> Result<(), GammaError> {
        for crtc in &mut self.crtcs {
            if crtc.gamma_size > 1 && !crtc.saved_r.is_empty() {
                let mut lut = DrmModeCrtcLut {
                    crtc_id: crtc.crtc_id,
                    gamma_size: crtc.gamma_size,
                    red: crtc.saved_r.as_mut_ptr() as u64,
                    green: crtc.saved_g.as_mut_ptr() as u64,
                    blue: crtc.saved_b.as_mut_ptr() as u64,
                };
                let _ = ioctl_rw(self.fd, DRM_IOCTL_MODE_SETGAMMA, &mut lut);
            }
        }
        Ok(())
    }
}

impl Drop for DrmState {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
