//! GNOME/Mutter gamma control over the session message bus.
//!
//! Mutter does not implement wlr-gamma-control; gamma goes through
//! `org.gnome.Mutter.DisplayConfig.SetCrtcGamma` instead. The serial
//! and CRTC ids come from `GetResources`, whose reply is walked
//! dynamically so only the leading fields we need are interpreted.
//! Mutter does not expose a ramp size; 256 entries is what it expects.
//!
//! Uses zbus's blocking API. All bus failures surface as the single
//! `GnomeDbus` error kind.

use super::GammaError;
use super::colorramp;
use zbus::blocking::Connection;
use zbus::zvariant::{Structure, Value};

const GNOME_GAMMA_SIZE: usize = 256;

const DBUS_NAME: &str = "org.gnome.Mutter.DisplayConfig";
const DBUS_PATH: &str = "/org/gnome/Mutter/DisplayConfig";
const DBUS_IFACE: &str = "org.gnome.Mutter.DisplayConfig";

/// GNOME backend state.
pub struct GnomeState {
    conn: Connection,
    serial: u32,
    crtc_ids: Vec<u32>,
    // Working ramps, always GNOME_GAMMA_SIZE entries
    work_r: Vec<u16>,
    work_g: Vec<u16>,
    work_b: Vec<u16>,
}

impl GnomeState {
    /// Open the user bus and discover the display configuration.
    pub fn init() -> Result<Self, GammaError> {
        let conn = Connection::session().map_err(|_| GammaError::GnomeDbus)?;

        let (serial, crtc_ids) = get_resources(&conn)?;
        if crtc_ids.is_empty() {
            return Err(GammaError::NoCrtc);
        }

        Ok(Self {
            conn,
            serial,
            crtc_ids,
            work_r: vec![0u16; GNOME_GAMMA_SIZE],
            work_g: vec![0u16; GNOME_GAMMA_SIZE],
            work_b: vec![0u16; GNOME_GAMMA_SIZE],
        })
    }

    pub fn crtc_count(&self) -> usize {
        self.crtc_ids.len()
    }

    pub fn gamma_size(&self, crtc_idx: usize) -> usize {
        if crtc_idx < self.crtc_ids.len() {
            GNOME_GAMMA_SIZE
        } else {
            0
        }
    }

    pub fn set_temperature_crtc(
        &mut self,
        crtc_idx: usize,
        temp: i32,
        brightness: f32,
    ) -> Result<(), GammaError> {
        let crtc_id = *self.crtc_ids.get(crtc_idx).ok_or(GammaError::Crtc)?;

        colorramp::fill_gamma_ramps(
            temp,
            &mut self.work_r,
            &mut self.work_g,
            &mut self.work_b,
            brightness,
        );

        set_crtc_gamma(
            &self.conn,
            self.serial,
            crtc_id,
            &self.work_r,
            &self.work_g,
            &self.work_b,
        )
    }

    /// Apply to every CRTC; success when at least one took.
    pub fn set_temperature(&mut self, temp: i32, brightness: f32) -> Result<(), GammaError> {
        let mut last_err = None;
        let mut successes = 0;

        for i in 0..self.crtc_ids.len() {
            match self.set_temperature_crtc(i, temp, brightness) {
                Ok(()) => successes += 1,
                Err(e) => last_err = Some(e),
            }
        }

        if successes > 0 {
            Ok(())
        } else {
            Err(last_err.unwrap_or(GammaError::NoCrtc))
        }
    }

    /// Mutter has no saved-state query, so restore writes a linear
    /// identity ramp on every CRTC.
    pub fn restore(&mut self) -> Result<(), GammaError> {
        for i in 0..GNOME_GAMMA_SIZE {
            let val = (i as f32 / (GNOME_GAMMA_SIZE - 1) as f32 * u16::MAX as f32) as u16;
            self.work_r[i] = val;
            self.work_g[i] = val;
            self.work_b[i] = val;
        }

        let mut last_err = None;
        for &crtc_id in &self.crtc_ids {
            if let Err(e) = set_crtc_gamma(
                &self.conn,
                self.serial,
                crtc_id,
                &self.work_r,
                &self.work_g,
                &self.work_b,
            ) {
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for GnomeState {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/// Call `GetResources` and pull out the serial (first `u`) and the CRTC
/// id leading each record of the first array. The reply structure is
/// walked dynamically; trailing fields are ignored.
fn get_resources(conn: &Connection) -> Result<(u32, Vec<u32>), GammaError> {
    let reply = conn
        .call_method(
            Some(DBUS_NAME),
            DBUS_PATH,
            Some(DBUS_IFACE),
            "GetResources",
            &(),
        )
        .map_err(|_| GammaError::GnomeDbus)?;

    let body = reply.body();
    let root: Structure = body.deserialize().map_err(|_| GammaError::GnomeDbus)?;
    let fields = root.fields();

    let serial = match fields.first() {
        Some(Value::U32(s)) => *s,
        _ => return Err(GammaError::GnomeDbus),
    };

    let crtc_ids = match fields.get(1) {
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|rec| match rec {
                Value::Structure(s) => match s.fields().first() {
                    Some(Value::U32(id)) => Some(*id),
                    _ => None,
                },
                _ => None,
            })
            .collect(),
        _ => return Err(GammaError::GnomeDbus),
    };

    Ok((serial, crtc_ids))
}

/// `SetCrtcGamma(serial: u, crtc: u, red: aq, green: aq, blue: aq)`.
fn set_crtc_gamma(
    conn: &Connection,
    serial: u32,
    crtc_id: u32,
    r: &[u16],
    g: &[u16],
    b: &[u16],
) -> Result<(), GammaError> {
    conn.call_method(
        Some(DBUS_NAME),
        DBUS_PATH,
        Some(DBUS_IFACE),
        "SetCrtcGamma",
        &(serial, crtc_id, r, g, b),
    )
    .map_err(|_| GammaError::GnomeDbus)?;
    Ok(())
}
