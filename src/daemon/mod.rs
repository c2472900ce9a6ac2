//! Daemon event loop.
//!
//! One long-running, single-threaded process owns the display's gamma
//! ramps. Each loop iteration is a single kernel wait on four sources:
//! a periodic tick, inotify on the configuration directory, blocked
//! termination signals surfaced through a signalfd, and the weather
//! fetch pipe when a fetch is in flight. On modern kernels the wait is
//! one `io_uring_enter`; without io_uring it degrades to one `ppoll`
//! with identical semantics.
//!
//! Setup order matters: signals are blocked and routed to a signalfd
//! before anything that can fail, gamma probing retries while the
//! session is still coming up, and the Landlock sandbox plus seccomp
//! filter land only after every persistent fd is open.

pub mod ring;
pub mod sandbox;
pub mod seccomp;

use anyhow::{Context, Result};
use chrono::Local;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use crate::config::{self, Location, Paths, WeatherData};
use crate::constants::{
    GAMMA_INIT_MAX_RETRIES, GAMMA_INIT_RETRY_MS, TEMP_UPDATE_SEC,
};
use crate::gamma::{self, GammaState};
use crate::now_epoch;
use crate::sigmoid;
use crate::solar;
use crate::weather::{FetchState, ReadOutcome};

// Completion tags for the io_uring path
const EV_INOTIFY: u64 = 1;
const EV_SIGNAL: u64 = 2;
const EV_TIMEOUT: u64 = 3;
const EV_CANCEL: u64 = 4;
const EV_WEATHER: u64 = 5;

/// What a single inotify drain told us.
#[derive(Debug, Default, Clone, Copy)]
struct EventResult {
    override_changed: bool,
    config_changed: bool,
    weather_changed: bool,
}

/// Manual-override block of the daemon state.
#[derive(Debug, Default, Clone, Copy)]
struct Manual {
    active: bool,
    start_temp: i32,
    target_temp: i32,
    start_time: i64,
    duration_min: i32,
    issued_at: i64,
    resume_time: i64,
}

/// Everything the daemon owns.
struct DaemonState {
    location: Location,
    paths: Paths,
    weather: Option<WeatherData>,
    gamma: GammaState,
    manual: Manual,
    last_temp: i32,
    last_temp_valid: bool,
}

/// Solar temperature for the current state of the world.
pub fn solar_temperature(now: i64, lat: f64, lon: f64, weather: Option<&WeatherData>) -> i32 {
    let dark = weather
        .map(|w| !w.has_error && sigmoid::is_dark_mode(w.cloud_cover))
        .unwrap_or(false);

    let (min_from_sunrise, min_to_sunset) = match solar::sunrise_sunset(now, lat, lon) {
        Some(times) => (
            (now - times.sunrise) as f64 / 60.0,
            (times.sunset - now) as f64 / 60.0,
        ),
        None => (0.0, 0.0),
    };

    sigmoid::calculate_solar_temp(min_from_sunrise, min_to_sunset, dark)
}

/// Block SIGTERM/SIGINT process-wide and surface them on a signalfd.
/// This happens before any fallible startup step so the user can
/// always kill the process cleanly.
fn setup_signalfd() -> Result<SignalFd> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGTERM);
    mask.add(Signal::SIGINT);
    mask.thread_block().context("failed to block signals")?;

    SignalFd::with_flags(&mask, SfdFlags::SFD_CLOEXEC | SfdFlags::SFD_NONBLOCK)
        .context("failed to create signalfd")
}

/// Watch the config directory for completed writes only; partial
/// writes must never be observed, hence IN_CLOSE_WRITE and not
/// IN_MODIFY.
fn setup_inotify(paths: &Paths) -> Option<Inotify> {
    let instance = Inotify::init(InitFlags::IN_CLOEXEC | InitFlags::IN_NONBLOCK).ok()?;
    instance
        .add_watch(&paths.config_dir, AddWatchFlags::IN_CLOSE_WRITE)
        .ok()?;
    Some(instance)
}

/// Nonblocking check whether a termination signal is already pending.
fn signal_pending(signal_fd: &SignalFd) -> bool {
    let borrowed = unsafe { BorrowedFd::borrow_raw(signal_fd.as_raw_fd()) };
    let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
    matches!(poll(&mut fds, PollTimeout::ZERO), Ok(n) if n > 0)
}

fn drain_signalfd(signal_fd: &SignalFd) {
    while let Ok(Some(_)) = signal_fd.read_signal() {}
}

/// Probe the gamma dispatcher with retry; at login the display server
/// may not be accepting connections yet. Returns `None` when a
/// termination signal arrived mid-retry.
fn init_gamma_with_retry(signal_fd: &SignalFd) -> Result<Option<GammaState>> {
    for attempt in 0..GAMMA_INIT_MAX_RETRIES {
        match gamma::init() {
            Ok(state) => return Ok(Some(state)),
            Err(e) => {
                if attempt == GAMMA_INIT_MAX_RETRIES - 1 {
                    return Err(anyhow::anyhow!("no gamma backend after 30s: {e}"));
                }
                if signal_pending(signal_fd) {
                    return Ok(None);
                }
                std::thread::sleep(std::time::Duration::from_millis(GAMMA_INIT_RETRY_MS));
            }
        }
    }
    Ok(None)
}

/// The single kernel wait, io_uring when available.
enum Waiter {
    Ring(ring::Ring),
    Poll,
}

/// Which sources fired in one wake.
#[derive(Debug, Default, Clone, Copy)]
struct Wake {
    tick: bool,
    signal: bool,
    inotify: bool,
    weather: bool,
}

impl Waiter {
    fn new() -> Self {
        match ring::Ring::new(8) {
            Ok(r) => Waiter::Ring(r),
            Err(e) => {
                log_warning!("io_uring unavailable ({e}), falling back to ppoll");
                Waiter::Poll
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Waiter::Ring(_) => "io_uring",
            Waiter::Poll => "ppoll",
        }
    }

    fn wait(&mut self, sig_fd: i32, ino_fd: Option<i32>, weather_fd: Option<i32>) -> Result<Wake> {
        match self {
            Waiter::Ring(ring) => wait_uring(ring, sig_fd, ino_fd, weather_fd),
            Waiter::Poll => wait_poll(sig_fd, ino_fd, weather_fd),
        }
    }
}

fn wait_uring(
    ring: &mut ring::Ring,
    sig_fd: i32,
    ino_fd: Option<i32>,
    weather_fd: Option<i32>,
) -> Result<Wake> {
    let ts = ring::KernelTimespec {
        tv_sec: TEMP_UPDATE_SEC,
        tv_nsec: 0,
    };

    ring.prep_poll(sig_fd, EV_SIGNAL);
    if let Some(fd) = ino_fd {
        ring.prep_poll(fd, EV_INOTIFY);
    }
    if let Some(fd) = weather_fd {
        ring.prep_poll(fd, EV_WEATHER);
    }
    ring.prep_timeout(&ts, EV_TIMEOUT);

    ring.submit_and_wait().context("io_uring_enter failed")?;

    let mut wake = Wake::default();
    let (mut saw_signal, mut saw_inotify, mut saw_weather, mut saw_timeout) =
        (false, false, false, false);

    while let Some(cqe) = ring.peek_cqe() {
        match cqe.user_data {
            EV_TIMEOUT => {
                saw_timeout = true;
                if cqe.res != -libc::ECANCELED {
                    wake.tick = true;
                }
            }
            EV_SIGNAL => {
                saw_signal = true;
                if cqe.res > 0 {
                    wake.signal = true;
                }
            }
            EV_INOTIFY => {
                saw_inotify = true;
                if cqe.res > 0 {
                    wake.inotify = true;
                }
            }
            EV_WEATHER => {
                saw_weather = true;
                if cqe.res > 0 {
                    wake.weather = true;
                }
            }
            _ => {}
        }
        ring.cqe_seen();
    }

    // Cancel whatever is still armed so the next iteration starts from
    // a clean ring instead of accumulating stale one-shot polls.
    let mut cancels = 0;
    if !saw_signal {
        ring.prep_cancel(EV_SIGNAL, EV_CANCEL);
        cancels += 1;
    }
    if ino_fd.is_some() && !saw_inotify {
        ring.prep_cancel(EV_INOTIFY, EV_CANCEL);
        cancels += 1;
    }
    if weather_fd.is_some() && !saw_weather {
        ring.prep_cancel(EV_WEATHER, EV_CANCEL);
        cancels += 1;
    }
    if !saw_timeout {
        ring.prep_cancel(EV_TIMEOUT, EV_CANCEL);
        cancels += 1;
    }

    if cancels > 0 {
        ring.submit_and_wait().context("io_uring_enter failed")?;
        // An event can race its own cancellation; keep it for this wake
        while let Some(cqe) = ring.peek_cqe() {
            match cqe.user_data {
                EV_SIGNAL if cqe.res > 0 => wake.signal = true,
                EV_INOTIFY if cqe.res > 0 => wake.inotify = true,
                EV_WEATHER if cqe.res > 0 => wake.weather = true,
                _ => {}
            }
            ring.cqe_seen();
        }
    }

    Ok(wake)
}

fn wait_poll(sig_fd: i32, ino_fd: Option<i32>, weather_fd: Option<i32>) -> Result<Wake> {
    let sig = unsafe { BorrowedFd::borrow_raw(sig_fd) };
    let ino = ino_fd.map(|fd| unsafe { BorrowedFd::borrow_raw(fd) });
    let wfd = weather_fd.map(|fd| unsafe { BorrowedFd::borrow_raw(fd) });

    let mut fds = Vec::with_capacity(3);
    fds.push(PollFd::new(sig, PollFlags::POLLIN));
    let ino_idx = ino.map(|fd| {
        fds.push(PollFd::new(fd, PollFlags::POLLIN));
        fds.len() - 1
    });
    let weather_idx = wfd.map(|fd| {
        fds.push(PollFd::new(fd, PollFlags::POLLIN));
        fds.len() - 1
    });

    let timeout = PollTimeout::from((TEMP_UPDATE_SEC * 1000) as u16);
    let readable = |pfd: &PollFd| {
        pfd.revents()
            .map(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP))
            .unwrap_or(false)
    };

    match poll(&mut fds, timeout) {
        Ok(0) => Ok(Wake {
            tick: true,
            ..Default::default()
        }),
        Ok(_) => Ok(Wake {
            tick: false,
            signal: readable(&fds[0]),
            inotify: ino_idx.map(|i| readable(&fds[i])).unwrap_or(false),
            weather: weather_idx.map(|i| readable(&fds[i])).unwrap_or(false),
        }),
        Err(nix::errno::Errno::EINTR) => Ok(Wake::default()),
        Err(e) => Err(e).context("ppoll failed"),
    }
}

/// Read and classify pending inotify events by filename.
fn classify_inotify(instance: &Inotify, paths: &Paths) -> EventResult {
    let mut result = EventResult::default();

    let override_name = paths.override_file.file_name();
    let config_name = paths.config_file.file_name();
    let cache_name = paths.cache_file.file_name();

    let events = match instance.read_events() {
        Ok(events) => events,
        Err(_) => return result,
    };

    for event in events {
        let Some(name) = event.name else { continue };
        if Some(name.as_os_str()) == override_name {
            result.override_changed = true;
        } else if Some(name.as_os_str()) == config_name {
            result.config_changed = true;
        } else if Some(name.as_os_str()) == cache_name {
            result.weather_changed = true;
        }
    }

    result
}

/// Run the daemon until a termination signal arrives.
pub fn run(location: Location, paths: &Paths) -> Result<()> {
    // 1. Signals first: must precede anything that can fail so the
    //    process stays killable during startup.
    let signal_fd = setup_signalfd()?;

    // 2. Gamma with retry
    let Some(gamma_state) = init_gamma_with_retry(&signal_fd)? else {
        log_decorated!("Received signal during gamma init, exiting");
        return Ok(());
    };

    // 3. PID file
    if let Err(e) = config::write_pid(paths) {
        log_warning!("failed to write PID file: {e}");
    }

    let mut state = DaemonState {
        location,
        paths: paths.clone(),
        weather: config::load_weather_cache(paths),
        gamma: gamma_state,
        manual: Manual::default(),
        last_temp: 0,
        last_temp_valid: false,
    };

    // 4. The screen must be correct before the first scheduled tick
    state.tick(&EventResult::default());

    // 5. Config-change observation
    let inotify = setup_inotify(&state.paths);
    if inotify.is_none() {
        log_warning!("inotify unavailable, config hot-reload disabled");
    }

    // 6. Process hardening
    unsafe {
        libc::prctl(libc::PR_SET_TIMERSLACK, 1usize);
        libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0);
        libc::prctl(libc::PR_SET_DUMPABLE, 0);
    }
    log_decorated!("hardening: timerslack=1ns, no_new_privs, !dumpable");

    // 7. Filesystem sandbox
    if sandbox::install(&state.paths.config_dir) {
        log_decorated!("landlock: filesystem sandbox active");
    } else {
        log_warning!("landlock: unavailable, running unsandboxed");
    }

    // 8. Syscall filter, last: nothing new gets called after this
    if seccomp::install() {
        log_decorated!("seccomp: allow-list active ({} syscalls)", seccomp::allowed_count());
    } else {
        log_warning!("seccomp: failed to install filter");
    }

    // 9. Pick up an override that survived a daemon restart
    recover_override(&mut state);
    state.tick(&EventResult::default());

    let mut waiter = Waiter::new();
    let mut wfs = FetchState::new();

    log_block_start!(
        "daemon started (backend: {}, wait: {}, inotify: {})",
        state.gamma.backend_name(),
        waiter.name(),
        if inotify.is_some() { "active" } else { "unavailable" },
    );

    loop {
        let wake = match waiter.wait(
            signal_fd.as_raw_fd(),
            inotify.as_ref().map(|i| i.as_fd().as_raw_fd()),
            wfs.pipe_fd(),
        ) {
            Ok(wake) => wake,
            Err(e) => {
                // Break rather than bail so shutdown still restores
                // gamma and removes the PID file
                log_error!("event wait failed: {e:#}");
                break;
            }
        };

        // Fixed processing order: signal, inotify, weather, then tick
        if wake.signal {
            drain_signalfd(&signal_fd);
            log_block_start!("received shutdown signal");
            break;
        }

        let mut event = EventResult::default();
        if wake.inotify
            && let Some(ref instance) = inotify
        {
            event = classify_inotify(instance, &state.paths);
        }

        if wake.weather {
            match wfs.read_response() {
                ReadOutcome::Pending | ReadOutcome::NewPipe => {}
                ReadOutcome::Done(wd) => {
                    if wd.has_error {
                        log_warning!("weather fetch failed");
                    } else {
                        log_decorated!(
                            "weather: {} ({}% clouds)",
                            wd.forecast,
                            wd.cloud_cover
                        );
                    }
                    if let Err(e) = config::save_weather_cache(&state.paths, &wd) {
                        log_warning!("failed to save weather cache: {e}");
                    }
                    state.weather = Some(wd);
                }
            }
        }

        state.tick(&event);

        // Kick off a refresh when the cache has gone stale
        #[cfg(feature = "noaa")]
        if !wfs.in_flight() {
            let needs = state
                .weather
                .as_ref()
                .map(config::weather_needs_refresh)
                .unwrap_or(true);
            if needs {
                log_decorated!(
                    "[{}] starting weather fetch",
                    Local::now().format("%H:%M:%S")
                );
                if let Err(e) = wfs.start(state.location.lat, state.location.lon) {
                    log_warning!("weather fetch failed to start: {e}");
                    // Hold the error for a full refresh window instead
                    // of re-spawning curl every tick
                    let sentinel = WeatherData::error_sentinel("Unknown");
                    let _ = config::save_weather_cache(&state.paths, &sentinel);
                    state.weather = Some(sentinel);
                }
            }
        }
    }

    // Clean shutdown: kill a pending fetch, put the screen back,
    // release the PID file
    wfs.abort();
    if let Err(e) = state.gamma.restore() {
        log_warning!("gamma restore failed: {e}");
    }
    config::remove_pid(&state.paths);
    log_decorated!("shutdown complete");

    Ok(())
}

/// Rehydrate a persisted override after a daemon restart. A transition
/// whose duration has already elapsed is discarded; an in-flight one
/// resumes, filling `start_temp` from the solar curve if the CLI-
/// written zero is still there.
fn recover_override(state: &mut DaemonState) {
    let Some(ovr) = config::load_override(&state.paths) else {
        return;
    };
    if !ovr.active {
        return;
    }

    let now = now_epoch();
    let elapsed_min = (now - ovr.issued_at) as f64 / 60.0;

    if elapsed_min >= ovr.duration_minutes as f64 {
        config::clear_override(&state.paths);
        log_decorated!(
            "cleared stale override (completed {:.0} min ago)",
            elapsed_min - ovr.duration_minutes as f64
        );
        return;
    }

    state.manual = Manual {
        active: true,
        target_temp: ovr.target_temp,
        duration_min: ovr.duration_minutes,
        issued_at: ovr.issued_at,
        start_time: ovr.issued_at,
        resume_time: sigmoid::next_transition_resume(now, state.location.lat, state.location.lon),
        start_temp: if ovr.start_temp != 0 {
            ovr.start_temp
        } else {
            let temp = solar_temperature(
                now,
                state.location.lat,
                state.location.lon,
                state.weather.as_ref(),
            );
            let _ = config::save_override(
                &state.paths,
                &config::OverrideState {
                    start_temp: temp,
                    ..ovr
                },
            );
            temp
        },
    };

    log_decorated!(
        "recovered override: -> {}K ({} min)",
        state.manual.target_temp,
        state.manual.duration_min
    );
}

impl DaemonState {
    /// One tick: absorb observed file changes, compute the target
    /// temperature, apply it when it moved.
    fn tick(&mut self, event: &EventResult) {
        let now = now_epoch();

        // Config changes land before override changes so an override
        // arriving in the same wake schedules against fresh coordinates
        if event.config_changed {
            if let Some(new_loc) = config::load_location(&self.paths) {
                self.location = new_loc;
                log_decorated!(
                    "location updated: {:.4}, {:.4}",
                    self.location.lat,
                    self.location.lon
                );
            }
            self.weather = config::load_weather_cache(&self.paths);
        } else if event.weather_changed {
            self.weather = config::load_weather_cache(&self.paths);
        }

        if event.override_changed {
            self.absorb_override_change(now);
        }

        let target_temp = if self.manual.active {
            let temp = sigmoid::calculate_manual_temp(
                self.manual.start_temp,
                self.manual.target_temp,
                self.manual.start_time,
                self.manual.duration_min,
                now,
            );

            // Once the transition has played out, hand control back to
            // the solar engine as the next window approaches
            let elapsed_min = (now - self.manual.start_time) as f64 / 60.0;
            if elapsed_min >= self.manual.duration_min as f64
                && self.manual.resume_time > 0
                && now >= self.manual.resume_time
            {
                self.manual = Manual::default();
                config::clear_override(&self.paths);
                log_decorated!("auto-resuming solar control (transition window approaching)");
                solar_temperature(now, self.location.lat, self.location.lon, self.weather.as_ref())
            } else {
                temp
            }
        } else {
            solar_temperature(now, self.location.lat, self.location.lon, self.weather.as_ref())
        };

        if !self.last_temp_valid || target_temp != self.last_temp {
            self.log_application(now, target_temp);
            if self.gamma.set_temperature(target_temp, 1.0).is_ok() {
                self.last_temp = target_temp;
                self.last_temp_valid = true;
            }
        }
    }

    /// Reload the override file after inotify saw it close.
    fn absorb_override_change(&mut self, now: i64) {
        let Some(ovr) = config::load_override(&self.paths) else {
            // File removed: treat as resume
            if self.manual.active {
                self.manual = Manual::default();
                log_decorated!("override cleared, resuming solar control");
            }
            return;
        };

        if ovr.active {
            if !self.manual.active || ovr.issued_at != self.manual.issued_at {
                let start_temp = if self.last_temp_valid {
                    self.last_temp
                } else {
                    ovr.target_temp
                };

                self.manual = Manual {
                    active: true,
                    start_temp,
                    target_temp: ovr.target_temp,
                    start_time: ovr.issued_at,
                    duration_min: ovr.duration_minutes,
                    issued_at: ovr.issued_at,
                    resume_time: sigmoid::next_transition_resume(
                        now,
                        self.location.lat,
                        self.location.lon,
                    ),
                };

                // Persist the fill-in so a daemon restart mid-
                // transition resumes from the right start point
                if ovr.start_temp == 0 {
                    let _ = config::save_override(
                        &self.paths,
                        &config::OverrideState { start_temp, ..ovr },
                    );
                }

                if self.manual.duration_min > 0 {
                    log_decorated!(
                        "override: {}K -> {}K over {} min",
                        self.manual.start_temp,
                        self.manual.target_temp,
                        self.manual.duration_min
                    );
                } else {
                    log_decorated!("override: -> {}K (instant)", self.manual.target_temp);
                }
            }
        } else if self.manual.active {
            self.manual = Manual::default();
            config::clear_override(&self.paths);
            log_decorated!("override cleared, resuming solar control");
        }
    }

    fn log_application(&self, now: i64, target_temp: i32) {
        let stamp = Local::now().format("%H:%M:%S");
        if self.manual.active {
            let elapsed_min = (now - self.manual.start_time) as f64 / 60.0;
            if elapsed_min < self.manual.duration_min as f64 {
                let pct = ((elapsed_min / self.manual.duration_min as f64) * 100.0) as i32;
                log_decorated!("[{stamp}] manual: {target_temp}K ({}%)", pct.min(100));
            } else {
                log_decorated!("[{stamp}] manual: {target_temp}K (holding)");
            }
        } else {
            let sp = solar::position(now, self.location.lat, self.location.lon);
            let clouds = self
                .weather
                .as_ref()
                .filter(|w| !w.has_error)
                .map(|w| w.cloud_cover)
                .unwrap_or(0);
            log_decorated!(
                "[{stamp}] solar: {target_temp}K (sun: {:.1}°, clouds: {clouds}%)",
                sp.elevation
            );
        }
    }
}
