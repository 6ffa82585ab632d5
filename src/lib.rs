pub mod backend;
pub mod board;
pub mod callback;
pub mod error;
pub mod gpio;

pub use backend::{MockGpio, SysfsGpio};
pub use board::{BoardLayout, FIRST_PIN, NUM_PINS, PinKind, PinSpec, U14_OFFSET, XIO_CHIP_LABEL};
pub use callback::{
    CallbackEngine, CallbackResult, DEFAULT_PAUSE_TIMEOUT, PinCallback, PinChange, TriggerMode,
};
pub use error::GpioError;
pub use gpio::{Direction, PIN_HIGH, PIN_LOW, PinAccess};
