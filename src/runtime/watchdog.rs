//! Watchdog timer that cuts off scripts which never yield back to the host.
//!
//! The countdown lives on its own thread and is driven only through a command
//! channel; the script thread never touches the loop's state directly. When
//! the countdown reaches zero the loop cancels the runtime's [`CancelToken`]
//! with [`CancelReason::Timeout`], which the engine's instruction hook turns
//! into a cancellation signal inside the running script.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn};

use super::{CancelReason, CancelToken};

/// How long [`Watchdog::quit`] waits for the loop before giving up.
const QUIT_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on a single wait, so a cancelled context is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
enum Command {
    Reset,
    Stop,
    Quit,
}

/// Handles to a live countdown loop.
struct Control {
    cmd_tx: Sender<Command>,
    /// Disconnects when the loop thread returns.
    done_rx: Receiver<()>,
}

/// Flags shared between the handle and the loop thread.
#[derive(Default)]
struct Flags {
    running: AtomicBool,
    expired: AtomicBool,
    quit: AtomicBool,
}

/// A single-shot, pausable countdown.
///
/// States: idle until [`run`](Self::run), running (counting or paused) until
/// it either expires or is quit. It never restarts.
pub struct Watchdog {
    duration: Duration,
    flags: Arc<Flags>,
    control: Mutex<Option<Control>>,
    expired_tx: Arc<watch::Sender<bool>>,
}

impl Watchdog {
    /// Create an idle watchdog with the given countdown.
    pub fn new(duration: Duration) -> Self {
        let (expired_tx, _) = watch::channel(false);
        Self {
            duration,
            flags: Arc::new(Flags::default()),
            control: Mutex::new(None),
            expired_tx: Arc::new(expired_tx),
        }
    }

    /// The configured countdown.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start the countdown loop.
    ///
    /// Returns `false` if the watchdog is already running, has expired, or
    /// has been quit. Cancelling `ctx` from elsewhere ends the loop; expiry
    /// cancels `ctx` with [`CancelReason::Timeout`].
    pub fn run(&self, ctx: &CancelToken) -> bool {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_running() || self.is_expired() || self.is_quit() {
            return false;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let countdown = Countdown {
            duration: self.duration,
            flags: Arc::clone(&self.flags),
            expired_tx: Arc::clone(&self.expired_tx),
            ctx: ctx.clone(),
        };

        self.flags.running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || {
                countdown.run(cmd_rx);
                drop(done_tx);
            });

        match spawned {
            Ok(_) => {
                debug!("watchdog started with {:?}", self.duration);
                *control = Some(Control { cmd_tx, done_rx });
                true
            }
            Err(e) => {
                warn!("failed to spawn watchdog thread: {}", e);
                self.flags.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Pause the countdown. Returns `false` if not running.
    pub fn stop(&self) -> bool {
        self.send(Command::Stop)
    }

    /// Restart the countdown from the full duration. Returns `false` if not running.
    pub fn reset(&self) -> bool {
        self.send(Command::Reset)
    }

    fn send(&self, command: Command) -> bool {
        if !self.is_running() {
            return false;
        }
        let control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        match control.as_ref() {
            Some(control) => control.cmd_tx.send(command).is_ok(),
            None => false,
        }
    }

    /// Ask the loop to exit and wait for it.
    ///
    /// # Panics
    ///
    /// Panics if the loop does not exit within five seconds. The loop only
    /// ever blocks for [`POLL_INTERVAL`], so this indicates a broken loop.
    pub fn quit(&self) {
        let control = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(control) = control {
            let _ = control.cmd_tx.send(Command::Quit);
            if let Err(RecvTimeoutError::Timeout) = control.done_rx.recv_timeout(QUIT_GRACE) {
                panic!("watchdog loop did not exit within {:?}", QUIT_GRACE);
            }
        }
        self.flags.running.store(false, Ordering::SeqCst);
        self.flags.quit.store(true, Ordering::SeqCst);
    }

    /// A receiver that flips to `true` exactly once, when the countdown expires.
    pub fn expired(&self) -> watch::Receiver<bool> {
        self.expired_tx.subscribe()
    }

    pub fn is_expired(&self) -> bool {
        self.flags.expired.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    pub fn is_quit(&self) -> bool {
        self.flags.quit.load(Ordering::SeqCst)
    }

    /// Run `f` with the countdown paused.
    ///
    /// The countdown is reset when `f` returns or unwinds, so a deliberately
    /// unbounded wait never trips the watchdog while everything else still does.
    pub fn keep_alive<T>(&self, f: impl FnOnce() -> T) -> T {
        self.stop();
        let _resume = ResumeOnDrop(self);
        f()
    }
}

struct ResumeOnDrop<'a>(&'a Watchdog);

impl Drop for ResumeOnDrop<'_> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

/// State owned by the loop thread.
struct Countdown {
    duration: Duration,
    flags: Arc<Flags>,
    expired_tx: Arc<watch::Sender<bool>>,
    ctx: CancelToken,
}

impl Countdown {
    fn run(self, commands: Receiver<Command>) {
        let mut deadline = Some(Instant::now() + self.duration);

        loop {
            if self.ctx.is_cancelled() {
                break;
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.expire();
                        return;
                    }
                    (deadline - now).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            match commands.recv_timeout(wait) {
                Ok(Command::Reset) => deadline = Some(Instant::now() + self.duration),
                Ok(Command::Stop) => deadline = None,
                Ok(Command::Quit) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        self.flags.running.store(false, Ordering::SeqCst);
        self.flags.quit.store(true, Ordering::SeqCst);
    }

    fn expire(&self) {
        if self.flags.expired.swap(true, Ordering::SeqCst) {
            return;
        }
        self.flags.running.store(false, Ordering::SeqCst);
        warn!("script watchdog expired after {:?}", self.duration);
        self.expired_tx.send_replace(true);
        self.ctx.cancel(CancelReason::Timeout);
    }
}
