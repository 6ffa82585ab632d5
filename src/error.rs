use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("Pin {0} does not exist on this board")]
    InvalidPin(u32),
    #[error("Unknown pin name: {0}")]
    UnknownPin(String),
    #[error("No callback registered for pin {0}")]
    NotRegistered(u32),
    #[error("Could not read pin {0}: {1}")]
    ReadFailure(u32, String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Callback manager is not running")]
    NotRunning,
    #[error("Callback manager is not paused")]
    NotPaused,
    #[error("Callback manager is already running")]
    AlreadyRunning,
    #[error("Poll thread did not stop within {0:?} and was abandoned")]
    PauseTimeout(Duration),
    #[error("Board layout error: {0}")]
    Layout(String),
    #[error("GPIO access error: {0}")]
    Access(String),
}
