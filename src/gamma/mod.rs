//! Gamma control with automatic backend selection.
//!
//! Four sibling backends expose the same small operation set; a sum
//! type with per-variant state and match-based forwarding dispatches
//! between them. The probe order is part of the contract:
//!
//!   1. If `$WAYLAND_DISPLAY` is set and non-empty:
//!      a. Wayland (wlr-gamma-control) — Sway, Hyprland, river, niri
//!      b. GNOME (Mutter message bus)
//!   2. DRM (kernel ioctl) — skipped when no CRTC has a usable LUT
//!   3. X11 (RandR) — Xorg sessions, NVIDIA fallback
//!
//! Absent build features simply drop out of the order. Saved gamma
//! state lives inside each backend and is written back on restore and
//! on drop.

pub mod colorramp;
pub mod drm;

#[cfg(feature = "gnome")]
pub mod gnome;
#[cfg(feature = "wayland")]
pub mod wayland;
#[cfg(feature = "x11")]
pub mod x11;

use std::fmt;

/// Error kinds for gamma operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GammaError {
    Open,
    Resources,
    Crtc,
    Gamma,
    NoCrtc,
    Permission,
    WaylandConnect,
    WaylandProtocol,
    GnomeDbus,
}

impl fmt::Display for GammaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GammaError::Open => write!(f, "failed to open display device"),
            GammaError::Resources => write!(f, "failed to get display resources"),
            GammaError::Crtc => write!(f, "failed to get CRTC info"),
            GammaError::Gamma => write!(f, "failed to set gamma ramp"),
            GammaError::NoCrtc => write!(f, "no usable CRTC found"),
            GammaError::Permission => write!(f, "permission denied (need video group?)"),
            GammaError::WaylandConnect => write!(f, "failed to connect to Wayland display"),
            GammaError::WaylandProtocol => {
                write!(f, "Wayland compositor lacks gamma control protocol")
            }
            GammaError::GnomeDbus => write!(f, "failed to communicate with Mutter"),
        }
    }
}

impl std::error::Error for GammaError {}

enum Backend {
    Drm(drm::DrmState),
    #[cfg(feature = "wayland")]
    Wayland(wayland::WaylandState),
    #[cfg(feature = "x11")]
    X11(x11::X11State),
    #[cfg(feature = "gnome")]
    Gnome(gnome::GnomeState),
}

/// Unified gamma handle over whichever backend probing selected.
pub struct GammaState {
    backend: Backend,
}

impl GammaState {
    /// Short user-visible name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Drm(_) => "drm",
            #[cfg(feature = "wayland")]
            Backend::Wayland(_) => "wayland",
            #[cfg(feature = "x11")]
            Backend::X11(_) => "x11",
            #[cfg(feature = "gnome")]
            Backend::Gnome(_) => "gnome",
        }
    }

    pub fn crtc_count(&self) -> usize {
        match &self.backend {
            Backend::Drm(s) => s.crtc_count(),
            #[cfg(feature = "wayland")]
            Backend::Wayland(s) => s.crtc_count(),
            #[cfg(feature = "x11")]
            Backend::X11(s) => s.crtc_count(),
            #[cfg(feature = "gnome")]
            Backend::Gnome(s) => s.crtc_count(),
        }
    }

    /// Ramp size for one CRTC. Zero means the CRTC is unusable.
    pub fn gamma_size(&self, crtc_idx: usize) -> usize {
        match &self.backend {
            Backend::Drm(s) => s.gamma_size(crtc_idx),
            #[cfg(feature = "wayland")]
            Backend::Wayland(s) => s.gamma_size(crtc_idx),
            #[cfg(feature = "x11")]
            Backend::X11(s) => s.gamma_size(crtc_idx),
            #[cfg(feature = "gnome")]
            Backend::Gnome(s) => s.gamma_size(crtc_idx),
        }
    }

    /// Apply a temperature to all usable CRTCs. Succeeds when at least
    /// one CRTC accepted the ramp.
    pub fn set_temperature(&mut self, temp: i32, brightness: f32) -> Result<(), GammaError> {
        match &mut self.backend {
            Backend::Drm(s) => s.set_temperature(temp, brightness),
            #[cfg(feature = "wayland")]
            Backend::Wayland(s) => s.set_temperature(temp, brightness),
            #[cfg(feature = "x11")]
            Backend::X11(s) => s.set_temperature(temp, brightness),
            #[cfg(feature = "gnome")]
            Backend::Gnome(s) => s.set_temperature(temp, brightness),
        }
    }

    pub fn set_temperature_crtc(
        &mut self,
        crtc_idx: usize,
        temp: i32,
        brightness: f32,
    ) -> Result<(), GammaError> {
        match &mut self.backend {
            Backend::Drm(s) => s.set_temperature_crtc(crtc_idx, temp, brightness),
            #[cfg(feature = "wayland")]
            Backend::Wayland(s) => s.set_temperature_crtc(crtc_idx, temp, brightness),
            #[cfg(feature = "x11")]
            Backend::X11(s) => s.set_temperature_crtc(crtc_idx, temp, brightness),
            #[cfg(feature = "gnome")]
            Backend::Gnome(s) => s.set_temperature_crtc(crtc_idx, temp, brightness),
        }
    }

    /// Put the display back in its pre-daemon state.
    pub fn restore(&mut self) -> Result<(), GammaError> {
        match &mut self.backend {
            Backend::Drm(s) => s.restore(),
            #[cfg(feature = "wayland")]
            Backend::Wayland(s) => s.restore(),
            #[cfg(feature = "x11")]
            Backend::X11(s) => s.restore(),
            #[cfg(feature = "gnome")]
            Backend::Gnome(s) => s.restore(),
        }
    }
}

/// Probe backends on the default card.
pub fn init() -> Result<GammaState, GammaError> {
    init_card(0)
}

/// Probe backends in the fixed order and return the first that works.
pub fn init_card(card_num: i32) -> Result<GammaState, GammaError> {
    // Wayland session: compositor backends first
    let on_wayland = std::env::var("WAYLAND_DISPLAY")
        .map(|v| !v.is_empty())
        .unwrap_or(false);

    if on_wayland {
        #[cfg(feature = "wayland")]
        match wayland::WaylandState::init() {
            Ok(state) => {
                return Ok(GammaState {
                    backend: Backend::Wayland(state),
                });
            }
            Err(e) => log_debug!("gamma probe: wayland: {e}"),
        }

        #[cfg(feature = "gnome")]
        match gnome::GnomeState::init() {
            Ok(state) => {
                return Ok(GammaState {
                    backend: Backend::Gnome(state),
                });
            }
            Err(e) => log_debug!("gamma probe: gnome: {e}"),
        }
    } else {
        log_debug!("gamma probe: wayland skipped (WAYLAND_DISPLAY not set)");
    }

    // DRM opens on nearly every machine, but a compositor-owned card
    // reports LUT-less CRTCs; skip it then so X11 gets a chance.
    match drm::DrmState::init(card_num) {
        Ok(state) => {
            let usable = (0..state.crtc_count())
                .filter(|&i| state.gamma_size(i) > 1)
                .count();
            if usable > 0 {
                return Ok(GammaState {
                    backend: Backend::Drm(state),
                });
            }
            log_debug!("gamma probe: drm: card{card_num} open but no usable CRTC");
        }
        Err(e) => log_debug!("gamma probe: drm: {e}"),
    }

    #[cfg(feature = "x11")]
    match x11::X11State::init() {
        Ok(state) => {
            let usable = (0..state.crtc_count())
                .filter(|&i| state.gamma_size(i) > 0)
                .count();
            if usable > 0 {
                return Ok(GammaState {
                    backend: Backend::X11(state),
                });
            }
            log_debug!("gamma probe: x11: connected but no usable CRTC");
        }
        Err(e) => log_debug!("gamma probe: x11: {e}"),
    }

    Err(GammaError::NoCrtc)
}
