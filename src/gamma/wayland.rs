//! Wayland gamma control via wlr-gamma-control-unstable-v1.
//!
//! Covers the wlroots family of compositors (Sway, Hyprland, river,
//! labwc, Wayfire, niri). Gamma ramps travel to the compositor through
//! a sealed memfd laid out R‖G‖B. The protocol defines that destroying
//! a gamma-control object restores the compositor's own ramp, so
//! restore destroys and re-acquires the controls rather than writing
//! saved tables back.

use super::GammaError;
use super::colorramp;
use std::num::NonZeroUsize;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};

use wayland_client::protocol::{wl_output::WlOutput, wl_registry};
use wayland_client::{Connection, Dispatch, EventQueue, QueueHandle, delegate_noop};
use wayland_protocols_wlr::gamma_control::v1::client::{
    zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1,
    zwlr_gamma_control_v1::{self, ZwlrGammaControlV1},
};

/// One `wl_output` and its gamma control. `gamma_size` arrives by event
/// after the control is requested; `failed` means the compositor
/// rejected the control (another client holds it).
struct OutputState {
    output: WlOutput,
    gamma_control: Option<ZwlrGammaControlV1>,
    gamma_size: u32,
    failed: bool,
}

struct WaylandInner {
    gamma_manager: Option<ZwlrGammaControlManagerV1>,
    outputs: Vec<OutputState>,
}

impl Dispatch<wl_registry::WlRegistry, ()> for WaylandInner {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global {
            name,
            interface,
            version: _,
        } = event
        {
            if interface == "zwlr_gamma_control_manager_v1" {
                state.gamma_manager =
                    Some(registry.bind::<ZwlrGammaControlManagerV1, _, _>(name, 1, qh, ()));
            } else if interface == "wl_output" {
                let output = registry.bind::<WlOutput, _, _>(name, 1, qh, ());
                state.outputs.push(OutputState {
                    output,
                    gamma_control: None,
                    gamma_size: 0,
                    failed: false,
                });
            }
        }
    }
}

// The usize user data is the output index the control was created for.
impl Dispatch<ZwlrGammaControlV1, usize> for WaylandInner {
    fn event(
        state: &mut Self,
        _proxy: &ZwlrGammaControlV1,
        event: zwlr_gamma_control_v1::Event,
        idx: &usize,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let Some(out) = state.outputs.get_mut(*idx) {
            match event {
                zwlr_gamma_control_v1::Event::GammaSize { size } => {
                    out.gamma_size = size;
                }
                zwlr_gamma_control_v1::Event::Failed => {
                    out.failed = true;
                    if let Some(ctrl) = out.gamma_control.take() {
                        ctrl.destroy();
                    }
                }
                _ => {}
            }
        }
    }
}

delegate_noop!(WaylandInner: ignore WlOutput);
delegate_noop!(WaylandInner: ignore ZwlrGammaControlManagerV1);

/// Wayland backend state.
pub struct WaylandState {
    conn: Connection,
    queue: EventQueue<WaylandInner>,
    inner: WaylandInner,
}

impl WaylandState {
    /// Connect to `$WAYLAND_DISPLAY`, bind the gamma-control manager,
    /// and acquire a control per output.
    ///
    /// Errors with `WaylandProtocol` when the compositor does not
    /// advertise `zwlr_gamma_control_manager_v1` (KWin, Mutter), and
    /// `NoCrtc` when no output ends up with a usable gamma size.
    pub fn init() -> Result<Self, GammaError> {
        let conn = Connection::connect_to_env().map_err(|_| GammaError::WaylandConnect)?;
        let display = conn.display();

        let mut inner = WaylandInner {
            gamma_manager: None,
            outputs: Vec::new(),
        };

        let mut queue = conn.new_event_queue();
        let qh = queue.handle();

        // First roundtrip: discover globals
        let _registry = display.get_registry(&qh, ());
        queue
            .roundtrip(&mut inner)
            .map_err(|_| GammaError::WaylandConnect)?;

        let manager = match inner.gamma_manager {
            Some(ref m) => m.clone(),
            None => return Err(GammaError::WaylandProtocol),
        };
        if inner.outputs.is_empty() {
            return Err(GammaError::NoCrtc);
        }

        for i in 0..inner.outputs.len() {
            let ctrl = manager.get_gamma_control(&inner.outputs[i].output, &qh, i);
            inner.outputs[i].gamma_control = Some(ctrl);
        }

        // Second roundtrip: collect gamma_size / failed events
        queue
            .roundtrip(&mut inner)
            .map_err(|_| GammaError::WaylandConnect)?;

        let usable = inner
            .outputs
            .iter()
            .filter(|o| !o.failed && o.gamma_size > 0)
            .count();
        if usable == 0 {
            return Err(GammaError::NoCrtc);
        }

        Ok(WaylandState { conn, queue, inner })
    }

    pub fn crtc_count(&self) -> usize {
        self.inner.outputs.len()
    }

    pub fn gamma_size(&self, crtc_idx: usize) -> usize {
        self.inner
            .outputs
            .get(crtc_idx)
            .filter(|o| !o.failed)
            .map(|o| o.gamma_size as usize)
            .unwrap_or(0)
    }

    pub fn set_temperature_crtc(
        &mut self,
        crtc_idx: usize,
        temp: i32,
        brightness: f32,
    ) -> Result<(), GammaError> {
        let out = self.inner.outputs.get(crtc_idx).ok_or(GammaError::Crtc)?;
        if out.failed || out.gamma_control.is_none() || out.gamma_size == 0 {
            return Err(GammaError::WaylandProtocol);
        }

        let gs = out.gamma_size as usize;
        let ramp_bytes = gs * std::mem::size_of::<u16>();
        let total = ramp_bytes * 3;

        let fd = create_sealed_ramp_fd(total, |bytes| {
            // The mapping is R || G || B, contiguous u16 tables
            let (r_bytes, rest) = bytes.split_at_mut(ramp_bytes);
            let (g_bytes, b_bytes) = rest.split_at_mut(ramp_bytes);
            let mut r = vec![0u16; gs];
            let mut g = vec![0u16; gs];
            let mut b = vec![0u16; gs];
            colorramp::fill_gamma_ramps(temp, &mut r, &mut g, &mut b, brightness);
            copy_u16_le(&r, r_bytes);
            copy_u16_le(&g, g_bytes);
            copy_u16_le(&b, b_bytes);
        })?;

        let ctrl = out
            .gamma_control
            .as_ref()
            .ok_or(GammaError::WaylandProtocol)?;
        ctrl.set_gamma(fd.as_fd());

        let _ = self.conn.flush();
        Ok(())
    }

    /// Apply to every usable output; success when at least one took.
    pub fn set_temperature(&mut self, temp: i32, brightness: f32) -> Result<(), GammaError> {
        let mut last_err = None;
        let mut successes = 0;

        for i in 0..self.inner.outputs.len() {
            let out = &self.inner.outputs[i];
            if !out.failed && out.gamma_size > 0 {
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

    /// Destroy all controls (the compositor restores its default ramp)
    /// and re-acquire fresh ones so the backend stays usable.
    pub fn restore(&mut self) -> Result<(), GammaError> {
        let qh = self.queue.handle();

        for out in &mut self.inner.outputs {
            if let Some(ctrl) = out.gamma_control.take() {
                ctrl.destroy();
            }
            out.failed = false;
            out.gamma_size = 0;
        }
        let _ = self.conn.flush();

        if let Some(ref manager) = self.inner.gamma_manager {
            for i in 0..self.inner.outputs.len() {
                let ctrl = manager.get_gamma_control(&self.inner.outputs[i].output, &qh, i);
                self.inner.outputs[i].gamma_control = Some(ctrl);
            }
        }

        self.queue
            .roundtrip(&mut self.inner)
            .map_err(|_| GammaError::WaylandConnect)?;
        Ok(())
    }
}

impl Drop for WaylandState {
    fn drop(&mut self) {
        // Destroying the controls restores the compositor's gamma
        for out in &mut self.inner.outputs {
            if let Some(ctrl) = out.gamma_control.take() {
                ctrl.destroy();
            }
        }
        let _ = self.conn.flush();
    }
}

fn copy_u16_le(src: &[u16], dst: &mut [u8]) {
    for (value, chunk) in src.iter().zip(dst.chunks_exact_mut(2)) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}

/// Create a memfd of `size` bytes, fill it through `fill`, and seal it
/// (shrink, grow, write) as the protocol requires.
fn create_sealed_ramp_fd(
    size: usize,
    fill: impl FnOnce(&mut [u8]),
) -> Result<OwnedFd, GammaError> {
    use nix::fcntl::{FcntlArg, SealFlag, fcntl};
    use nix::sys::memfd::{MemFdCreateFlag, memfd_create};
    use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};

    let fd = memfd_create(
        c"abraxas-gamma",
        MemFdCreateFlag::MFD_CLOEXEC | MemFdCreateFlag::MFD_ALLOW_SEALING,
    )
    .map_err(|_| GammaError::Resources)?;
    nix::unistd::ftruncate(&fd, size as libc::off_t).map_err(|_| GammaError::Resources)?;

    let len = NonZeroUsize::new(size).ok_or(GammaError::Resources)?;
    let map = unsafe {
        mmap(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            &fd,
            0,
        )
    }
    .map_err(|_| GammaError::Resources)?;

    let bytes = unsafe { std::slice::from_raw_parts_mut(map.as_ptr() as *mut u8, size) };
    fill(bytes);
    unsafe {
        let _ = munmap(map, size);
    }

    let seals = SealFlag::F_SEAL_SHRINK | SealFlag::F_SEAL_GROW | SealFlag::F_SEAL_WRITE;
    fcntl(fd.as_raw_fd(), FcntlArg::F_ADD_SEALS(seals)).map_err(|_| GammaError::Resources)?;

    Ok(fd)
}
