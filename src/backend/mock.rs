use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::board::BoardLayout;
use crate::error::GpioError;
use crate::gpio::{Direction, PIN_HIGH, PinAccess};

/// In-memory pin access for tests and development without the board.
///
/// Pins behave like freshly exported sysfs pins: they must be opened before
/// use and come up as inputs reading low. Tests drive input values through
/// `set_raw_value`, which deliberately accepts impossible values so the
/// engine's self-healing path can be exercised, and can make reads fail
/// outright with `fail_reads`.
pub struct MockGpio {
    board: Arc<BoardLayout>,
    pins: Mutex<FxHashMap<u32, MockPin>>, // keyed by pin id
}

struct MockPin {
    direction: Direction,
    value: u8,
    fail_reads: bool,
}

impl MockGpio {
    pub fn new(board: Arc<BoardLayout>) -> Self {
        Self {
            board,
            pins: Mutex::new(FxHashMap::default()),
        }
    }

    /// Force the stored value of a pin, range-checked or not. No-op for pins
    /// that were never opened.
    pub fn set_raw_value(&self, pin: u32, value: u8) {
        if let Some(state) = self.pins.lock().get_mut(&pin) {
            state.value = value;
        }
    }

    /// Make every read of this pin fail until cleared.
    pub fn fail_reads(&self, pin: u32, fail: bool) {
        if let Some(state) = self.pins.lock().get_mut(&pin) {
            state.fail_reads = fail;
        }
    }
}

impl PinAccess for MockGpio {
    fn resolve_name(&self, name: &str) -> Result<u32, GpioError> {
        self.board.resolve(name)
    }

    fn open(&self, pin: u32) -> Result<(), GpioError> {
        let mut pins = self.pins.lock();
        if pins.contains_key(&pin) {
            warn!("pin {pin} may already be open; this will likely cause issues");
        }
        pins.insert(
            pin,
            MockPin {
                direction: Direction::In,
                value: 0,
                fail_reads: false,
            },
        );
        Ok(())
    }

    fn close(&self, pin: u32) -> Result<(), GpioError> {
        if self.pins.lock().remove(&pin).is_none() {
            warn!("closing pin {pin} which is not managed by this program");
        }
        Ok(())
    }

    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), GpioError> {
        let mut pins = self.pins.lock();
        let state = pins
            .get_mut(&pin)
            .ok_or_else(|| GpioError::Access(format!("pin {pin} is not open")))?;
        state.direction = direction;
        Ok(())
    }

    fn read_value(&self, pin: u32) -> Result<u8, GpioError> {
        let pins = self.pins.lock();
        let state = pins
            .get(&pin)
            .ok_or_else(|| GpioError::ReadFailure(pin, "pin is not open".into()))?;
        if state.fail_reads {
            return Err(GpioError::ReadFailure(pin, "injected read failure".into()));
        }
        Ok(state.value)
    }

    fn write_value(&self, pin: u32, value: u8) -> Result<(), GpioError> {
        if value > PIN_HIGH {
            return Err(GpioError::InvalidValue(format!(
                "digital pins only carry 0 or 1, got {value}"
            )));
        }
        let mut pins = self.pins.lock();
        let state = pins
            .get_mut(&pin)
            .ok_or_else(|| GpioError::Access(format!("pin {pin} is not open")))?;
        if state.direction != Direction::Out {
            return Err(GpioError::Access(format!(
                "pin {pin} must be in the output direction to set its value"
            )));
        }
        state.value = value;
        Ok(())
    }

    fn is_open(&self, pin: u32) -> bool {
        self.pins.lock().contains_key(&pin)
    }
}
