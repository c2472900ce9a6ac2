//! X11 RandR gamma control fallback.
//!
//! Used for Xorg sessions and as the NVIDIA fallback when DRM exposes
//! no usable gamma LUT. Built on `x11rb`'s pure-Rust connection, so
//! nothing X-related is loaded into the process unless this backend is
//! actually probed.

use super::GammaError;
use super::colorramp;
use x11rb::connection::Connection;
use x11rb::protocol::randr::ConnectionExt as RandrExt;
use x11rb::rust_connection::RustConnection;

/// Saved and working ramps for one RandR CRTC. `gamma_size == 0` marks
/// the CRTC unusable.
struct CrtcState {
    crtc: u32,
    gamma_size: u16,
    saved_r: Vec<u16>,
    saved_g: Vec<u16>,
    saved_b: Vec<u16>,
    work_r: Vec<u16>,
    work_g: Vec<u16>,
    work_b: Vec<u16>,
}

/// X11 backend state.
pub struct X11State {
    conn: RustConnection,
    crtcs: Vec<CrtcState>,
}

impl X11State {
    /// Connect to the default display and save every CRTC's gamma.
    pub fn init() -> Result<Self, GammaError> {
        let (conn, screen_num) = RustConnection::connect(None).map_err(|_| GammaError::Open)?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;

        let resources = conn
            .randr_get_screen_resources_current(root)
            .map_err(|_| GammaError::Resources)?
            .reply()
            .map_err(|_| GammaError::Resources)?;

        if resources.crtcs.is_empty() {
            return Err(GammaError::NoCrtc);
        }

        let mut crtcs = Vec::with_capacity(resources.crtcs.len());

        for &crtc_id in &resources.crtcs {
            let gamma_size = conn
                .randr_get_crtc_gamma_size(crtc_id)
                .map_err(|_| GammaError::Crtc)?
                .reply()
                .map_err(|_| GammaError::Crtc)?
                .size;

            if gamma_size == 0 {
                crtcs.push(CrtcState {
                    crtc: crtc_id,
                    gamma_size: 0,
                    saved_r: Vec::new(),
                    saved_g: Vec::new(),
                    saved_b: Vec::new(),
                    work_r: Vec::new(),
                    work_g: Vec::new(),
                    work_b: Vec::new(),
                });
                continue;
            }

            let gamma = conn
                .randr_get_crtc_gamma(crtc_id)
                .map_err(|_| GammaError::Gamma)?
                .reply()
                .map_err(|_| GammaError::Gamma)?;

            crtcs.push(CrtcState {
                crtc: crtc_id,
                gamma_size,
                saved_r: gamma.red,
                saved_g: gamma.green,
                saved_b: gamma.blue,
                work_r: vec![0u16; gamma_size as usize],
                work_g: vec![0u16; gamma_size as usize],
                work_b: vec![0u16; gamma_size as usize],
            });
        }

        Ok(X11State { conn, crtcs })
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
        let crtc = self.crtcs.get_mut(crtc_idx).ok_or(GammaError::Crtc)?;
        if crtc.gamma_size == 0 {
            return Err(GammaError::Crtc);
        }

        colorramp::fill_gamma_ramps(
            temp,
            &mut crtc.work_r,
            &mut crtc.work_g,
            &mut crtc.work_b,
            brightness,
        );

        self.conn
            .randr_set_crtc_gamma(crtc.crtc, &crtc.work_r, &crtc.work_g, &crtc.work_b)
            .map_err(|_| GammaError::Gamma)?;
        self.conn.flush().map_err(|_| GammaError::Gamma)?;
        Ok(())
    }

    /// Apply to every usable CRTC; success when at least one took.
    pub fn set_temperature(&mut self, temp: i32, brightness: f32) -> Result<(), GammaError> {
        let mut last_err = None;
        let mut successes = 0;

        for i in 0..self.crtcs.len() {
            if self.crtcs[i].gamma_size > 0 {
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

    /// Send the saved gamma objects back and flush.
    pub fn restore(&mut self) -> Result<(), GammaError> {
        for crtc in &self.crtcs {
            if crtc.gamma_size > 0 && !crtc.saved_r.is_empty() {
                let _ = self.conn.randr_set_crtc_gamma(
                    crtc.crtc,
                    &crtc.saved_r,
                    &crtc.saved_g,
                    &crtc.saved_b,
                );
            }
        }
        let _ = self.conn.flush();
        Ok(())
    }
}

impl Drop for X11State {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
