use serde::{Deserialize, Serialize};

use crate::error::GpioError;

pub const PIN_LOW: u8 = 0;
pub const PIN_HIGH: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    In,
    Out,
}

/// Board-level pin access. `SysfsGpio` implements this against the kernel's
/// sysfs interface; `MockGpio` implements it in memory for tests and
/// off-hardware development.
///
/// Pins are addressed by their id on the headers. The `_named` methods accept
/// the stable logical name instead and return the id they resolved, at the
/// cost of a table lookup per call.
pub trait PinAccess: Send + Sync {
    fn resolve_name(&self, name: &str) -> Result<u32, GpioError>;
    fn open(&self, pin: u32) -> Result<(), GpioError>;
    fn close(&self, pin: u32) -> Result<(), GpioError>;
    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), GpioError>;
    fn read_value(&self, pin: u32) -> Result<u8, GpioError>;
    fn write_value(&self, pin: u32, value: u8) -> Result<(), GpioError>;
    fn is_open(&self, pin: u32) -> bool;

    /// Open a pin and set its direction in one call.
    fn setup(&self, pin: u32, direction: Direction) -> Result<(), GpioError> {
        self.open(pin)?;
        self.set_direction(pin, direction)
    }

    fn open_named(&self, name: &str) -> Result<u32, GpioError> {
        let pin = self.resolve_name(name)?;
        self.open(pin)?;
        Ok(pin)
    }

    fn close_named(&self, name: &str) -> Result<u32, GpioError> {
        let pin = self.resolve_name(name)?;
        self.close(pin)?;
        Ok(pin)
    }

    fn setup_named(&self, name: &str, direction: Direction) -> Result<u32, GpioError> {
        let pin = self.resolve_name(name)?;
        self.setup(pin, direction)?;
        Ok(pin)
    }

    fn set_direction_named(&self, name: &str, direction: Direction) -> Result<u32, GpioError> {
        let pin = self.resolve_name(name)?;
        self.set_direction(pin, direction)?;
        Ok(pin)
    }

    fn read_value_named(&self, name: &str) -> Result<u8, GpioError> {
        self.read_value(self.resolve_name(name)?)
    }

    fn write_value_named(&self, name: &str, value: u8) -> Result<u32, GpioError> {
        let pin = self.resolve_name(name)?;
        self.write_value(pin, value)?;
        Ok(pin)
    }
}
