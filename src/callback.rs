use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::board::{FIRST_PIN, NUM_PINS, pin_in_range};
use crate::error::GpioError;
use crate::gpio::{PIN_HIGH, PinAccess};

pub const DEFAULT_PAUSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How often `pause` re-checks whether the poll thread has exited.
const STOP_POLL_INTERVAL: Duration = Duration::from_micros(50);

/// One observed transition, handed to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinChange {
    pub pin: u32,
    pub new_value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Fire on every observed value change.
    Standard,
    /// Fire only when the value departs from its registration-time baseline
    /// and then returns to it, e.g. a button press followed by its release.
    Flip,
}

pub type CallbackResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
pub type PinCallback = Box<dyn FnMut(PinChange) -> CallbackResult + Send>;

struct CallbackSlot {
    handler: PinCallback,
    mode: TriggerMode,
    last_value: u8,
    /// Value read at registration time, the "at rest" reference for Flip mode.
    baseline: u8,
    /// Set once the value has diverged from the baseline. Never cleared again
    /// until the slot is re-registered.
    away: bool,
}

/// State shared between the control side and the poll thread.
struct EngineShared {
    /// Indexed by pin id; `None` means not subscribed. A plain array keeps the
    /// sweep order ascending by pin id, which callers may rely on.
    slots: Mutex<Vec<Option<CallbackSlot>>>,
    poll_delay_nanos: AtomicU64,
}

/// Handle to one spawned poll thread. Each spawn gets fresh stop/finished
/// flags so an abandoned thread can never stop its replacement.
struct PollWorker {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && self.finished.load(Ordering::Acquire)
        {
            let _ = handle.join();
        }
        // a thread that has not finished is detached here; it exits on its own
        // once it observes the stop flag
    }
}

/// Polls registered pins on a background thread and dispatches callbacks on
/// value transitions.
///
/// All control operations take `&mut self`: the engine expects a single
/// control thread, with only the poll thread running concurrently. While the
/// engine is live, `register` and `remove` bracket their table mutation in a
/// pause/resume of the poll thread so a sweep is never mid-flight across the
/// change.
pub struct CallbackEngine<B: PinAccess + ?Sized> {
    access: Arc<B>,
    shared: Arc<EngineShared>,
    worker: Option<PollWorker>,
    started: bool,
    paused: bool,
    /// Set when a pause timed out and the poll thread was abandoned. Table
    /// mutations are refused until a fresh worker takes over, both to surface
    /// the race and because the stuck sweep may still hold the table lock.
    wedged: bool,
    pause_timeout: Duration,
}

impl<B: PinAccess + ?Sized + 'static> CallbackEngine<B> {
    pub fn new(access: Arc<B>) -> Self {
        let len = (FIRST_PIN + NUM_PINS) as usize;
        let mut slots = Vec::new();
        slots.resize_with(len, || None);

        Self {
            access,
            shared: Arc::new(EngineShared {
                slots: Mutex::new(slots),
                poll_delay_nanos: AtomicU64::new(0),
            }),
            worker: None,
            started: false,
            paused: false,
            wedged: false,
            pause_timeout: DEFAULT_PAUSE_TIMEOUT,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether a callback is currently installed for `pin`.
    ///
    /// Takes the registry lock, so while the engine is wedged (a pause timed
    /// out and the abandoned sweep is stuck inside a handler) this can block
    /// until that handler returns.
    pub fn is_registered(&self, pin: u32) -> bool {
        pin_in_range(pin) && self.shared.slots.lock()[pin as usize].is_some()
    }

    /// Inter-cycle sleep of the poll loop. Zero (the default) polls as fast
    /// as possible. Takes effect on the next cycle, no restart required.
    pub fn set_polling_delay(&self, delay: Duration) {
        let nanos = delay.as_nanos().min(u64::MAX as u128) as u64;
        self.shared.poll_delay_nanos.store(nanos, Ordering::Relaxed);
    }

    /// Bound used by `pause` before it gives up and abandons the poll thread.
    pub fn set_pause_timeout(&mut self, timeout: Duration) {
        self.pause_timeout = timeout;
    }

    /// Register a callback invoked on every value change of `pin`.
    ///
    /// The pin's current value is read synchronously to seed change tracking;
    /// a failed or impossible read aborts the registration, and any callback
    /// previously registered on the pin is dropped rather than left to keep
    /// firing. Once this returns the pin is monitored from the next sweep on.
    pub fn register<F>(&mut self, pin: u32, handler: F) -> Result<(), GpioError>
    where
        F: FnMut(PinChange) -> CallbackResult + Send + 'static,
    {
        self.install(pin, Box::new(handler), TriggerMode::Standard)
    }

    /// Register a callback invoked when the pin's value departs from its
    /// current (registration-time) value and then returns to it. For a button
    /// at rest this fires once per press-and-release, on the release.
    pub fn register_flip<F>(&mut self, pin: u32, handler: F) -> Result<(), GpioError>
    where
        F: FnMut(PinChange) -> CallbackResult + Send + 'static,
    {
        self.install(pin, Box::new(handler), TriggerMode::Flip)
    }

    pub fn register_named<F>(&mut self, name: &str, handler: F) -> Result<u32, GpioError>
    where
        F: FnMut(PinChange) -> CallbackResult + Send + 'static,
    {
        let pin = self.access.resolve_name(name)?;
        self.register(pin, handler)?;
        Ok(pin)
    }

    pub fn register_flip_named<F>(&mut self, name: &str, handler: F) -> Result<u32, GpioError>
    where
        F: FnMut(PinChange) -> CallbackResult + Send + 'static,
    {
        let pin = self.access.resolve_name(name)?;
        self.register_flip(pin, handler)?;
        Ok(pin)
    }

    /// Deregister a pin's callback. Once this returns no further callback for
    /// the pin fires, even if a sweep was in flight when it was called.
    pub fn remove(&mut self, pin: u32) -> Result<(), GpioError> {
        if !pin_in_range(pin) {
            return Err(GpioError::InvalidPin(pin));
        }
        self.ensure_not_wedged()?;

        let bracket = self.started && !self.paused;
        if bracket {
            self.pause()?;
        }
        let result = {
            let mut slots = self.shared.slots.lock();
            if slots[pin as usize].take().is_some() {
                Ok(())
            } else {
                Err(GpioError::NotRegistered(pin))
            }
        };
        if bracket {
            self.resume()?;
        }
        result
    }

    pub fn remove_named(&mut self, name: &str) -> Result<u32, GpioError> {
        let pin = self.access.resolve_name(name)?;
        self.remove(pin)?;
        Ok(pin)
    }

    /// Force the trigger state of a Flip-mode pin: `value` is what the pin
    /// reads while away from rest, so the baseline becomes its complement.
    ///
    /// No pause/resume bracket is taken; if the poll thread is running the
    /// caller is responsible for avoiding a semantic race with an in-flight
    /// sweep, ideally by calling this before `start`.
    pub fn set_flip_baseline(&mut self, pin: u32, value: u8) -> Result<(), GpioError> {
        if !pin_in_range(pin) {
            return Err(GpioError::InvalidPin(pin));
        }
        if value > PIN_HIGH {
            return Err(GpioError::InvalidValue(format!(
                "digital pins only carry 0 or 1, got {value}"
            )));
        }
        self.ensure_not_wedged()?;

        let mut slots = self.shared.slots.lock();
        let slot = slots[pin as usize]
            .as_mut()
            .ok_or(GpioError::NotRegistered(pin))?;
        slot.baseline = value ^ 1;
        slot.last_value = value ^ 1;
        Ok(())
    }

    pub fn set_flip_baseline_named(&mut self, name: &str, value: u8) -> Result<u32, GpioError> {
        let pin = self.access.resolve_name(name)?;
        self.set_flip_baseline(pin, value)?;
        Ok(pin)
    }

    /// Spawn the poll thread. Also serves as the resume path after a clean
    /// pause, and replaces a worker abandoned by a timed-out pause.
    pub fn start(&mut self) -> Result<(), GpioError> {
        if let Some(worker) = self.worker.take() {
            if !worker.finished.load(Ordering::Acquire) {
                self.worker = Some(worker);
                return Err(GpioError::AlreadyRunning);
            }
            // stale worker left behind by an abnormal stop
            debug!("discarding a stale poll worker before starting a fresh one");
            drop(worker);
        }

        self.spawn_worker()?;
        self.started = true;
        self.paused = false;
        self.wedged = false;
        Ok(())
    }

    /// Stop the poll thread without dropping any registrations, waiting up to
    /// the configured timeout for it to exit cleanly.
    pub fn pause(&mut self) -> Result<(), GpioError> {
        self.pause_within(self.pause_timeout)
    }

    /// `pause` with an explicit bound. The poll loop only checks its stop flag
    /// between sweeps, so a callback stuck in a blocking call would otherwise
    /// hang this forever; when the bound is exceeded the thread is abandoned
    /// and `PauseTimeout` is returned. The engine then refuses registry
    /// mutations until `resume` or `start` installs a fresh worker.
    pub fn pause_within(&mut self, timeout: Duration) -> Result<(), GpioError> {
        let Some(worker) = self.worker.take() else {
            return Err(GpioError::NotRunning);
        };

        worker.stop.store(true, Ordering::Release);
        let deadline = Instant::now() + timeout;
        while !worker.finished.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                warn!("poll thread did not stop within {timeout:?}; abandoning it");
                drop(worker);
                self.paused = true;
                self.wedged = true;
                return Err(GpioError::PauseTimeout(timeout));
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }

        // the thread observed the stop flag; this join is immediate
        drop(worker);
        self.paused = true;
        self.wedged = false;
        Ok(())
    }

    /// Restart polling after `pause`, keeping all registrations.
    pub fn resume(&mut self) -> Result<(), GpioError> {
        if !self.paused {
            return Err(GpioError::NotPaused);
        }
        self.spawn_worker()?;
        self.paused = false;
        self.wedged = false;
        Ok(())
    }

    /// Stop polling and drop every registration. Tolerates never-started and
    /// repeated calls; afterwards the engine is back in its initial state and
    /// can be started again.
    pub fn terminate(&mut self) -> Result<(), GpioError> {
        self.ensure_not_wedged()?;

        if self.worker.is_some() {
            self.pause()?;
        }
        for slot in self.shared.slots.lock().iter_mut() {
            *slot = None;
        }
        self.started = false;
        self.paused = false;
        Ok(())
    }

    fn ensure_not_wedged(&self) -> Result<(), GpioError> {
        if self.wedged {
            Err(GpioError::PauseTimeout(self.pause_timeout))
        } else {
            Ok(())
        }
    }

    fn install(
        &mut self,
        pin: u32,
        handler: PinCallback,
        mode: TriggerMode,
    ) -> Result<(), GpioError> {
        if !pin_in_range(pin) {
            return Err(GpioError::InvalidPin(pin));
        }
        self.ensure_not_wedged()?;

        let bracket = self.started && !self.paused;
        if bracket {
            self.pause()?;
        }
        let result = self.seed_slot(pin, handler, mode);
        if bracket {
            self.resume()?;
        }
        result
    }

    fn seed_slot(&self, pin: u32, handler: PinCallback, mode: TriggerMode) -> Result<(), GpioError> {
        // a bad seed read also clears any previous registration on the pin,
        // the same way a bad read during a sweep would
        let value = match self.access.read_value(pin) {
            Ok(v) if v <= PIN_HIGH => v,
            Ok(v) => {
                self.shared.slots.lock()[pin as usize] = None;
                return Err(GpioError::ReadFailure(
                    pin,
                    format!("impossible value {v}"),
                ));
            }
            Err(e) => {
                self.shared.slots.lock()[pin as usize] = None;
                return Err(e);
            }
        };

        self.shared.slots.lock()[pin as usize] = Some(CallbackSlot {
            handler,
            mode,
            last_value: value,
            baseline: value,
            away: false,
        });
        Ok(())
    }

    fn spawn_worker(&mut self) -> Result<(), GpioError> {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let access = self.access.clone();
        let shared = self.shared.clone();
        let thread_stop = stop.clone();
        let thread_finished = finished.clone();

        let handle = thread::Builder::new()
            .name("gpio-poll".into())
            .spawn(move || {
                poll_loop(&*access, &shared, &thread_stop);
                thread_finished.store(true, Ordering::Release);
            })
            .map_err(|e| GpioError::Access(format!("could not spawn poll thread: {e}")))?;

        self.worker = Some(PollWorker {
            stop,
            finished,
            handle: Some(handle),
        });
        Ok(())
    }
}

impl<B: PinAccess + ?Sized> Drop for CallbackEngine<B> {
    fn drop(&mut self) {
        // cooperative best-effort stop; never blocks on an abandoned thread
        self.worker.take();
    }
}

fn poll_loop<B: PinAccess + ?Sized>(access: &B, shared: &EngineShared, stop: &AtomicBool) {
    while !stop.load(Ordering::Acquire) {
        sweep(access, shared);

        let delay = shared.poll_delay_nanos.load(Ordering::Relaxed);
        if delay > 0 && !stop.load(Ordering::Acquire) {
            thread::sleep(Duration::from_nanos(delay));
        }
    }
}

/// One pass over all registered pins, in ascending pin order.
fn sweep<B: PinAccess + ?Sized>(access: &B, shared: &EngineShared) {
    let mut slots = shared.slots.lock();

    for pin in FIRST_PIN as usize..slots.len() {
        if slots[pin].is_none() {
            continue;
        }

        let value = match access.read_value(pin as u32) {
            Ok(v) if v <= PIN_HIGH => v,
            Ok(v) => {
                warn!(
                    "read impossible value {v} from pin {pin}; removing its callback \
                     (was the pin closed before its callback was removed?)"
                );
                slots[pin] = None;
                continue;
            }
            Err(e) => {
                warn!("could not read pin {pin}; removing its callback: {e}");
                slots[pin] = None;
                continue;
            }
        };

        let Some(slot) = slots[pin].as_mut() else {
            continue;
        };
        if value == slot.last_value {
            continue;
        }
        slot.last_value = value;

        let fire = match slot.mode {
            TriggerMode::Standard => true,
            TriggerMode::Flip => {
                if value != slot.baseline {
                    // just diverged from rest; only the return fires
                    slot.away = true;
                    false
                } else {
                    slot.away
                }
            }
        };

        if fire {
            let change = PinChange {
                pin: pin as u32,
                new_value: value,
            };
            if let Err(e) = (slot.handler)(change) {
                warn!("callback for pin {pin} returned an error: {e}");
            }
        }
    }
}
