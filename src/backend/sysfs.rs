use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use parking_lot::{Mutex, RwLock};

use crate::board::{BoardLayout, FIRST_PIN, NUM_PINS, XIO_CHIP_LABEL, pin_in_range};
use crate::error::GpioError;
use crate::gpio::{Direction, PIN_HIGH, PinAccess};

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Pin access through the kernel's sysfs gpio interface. Pins are opened by
/// writing their kernel number to the export file and closed through the
/// unexport file; direction and value are plain file reads and writes under
/// `gpio<N>/`.
///
/// The export and unexport files are opened once and held for the lifetime of
/// the instance. Dropping the instance closes every pin it opened.
pub struct SysfsGpio {
    board: Arc<BoardLayout>,
    root: PathBuf,
    export: Mutex<File>,
    unexport: Mutex<File>,
    xio_base: u32,
    open_pins: RwLock<Vec<bool>>, // indexed by pin id
}

impl SysfsGpio {
    pub fn new(board: Arc<BoardLayout>) -> Result<Self, GpioError> {
        Self::with_root(board, SYSFS_GPIO_ROOT)
    }

    /// Same as `new` but against an alternate sysfs root. Intended for tests
    /// running against a staged directory tree.
    pub fn with_root(board: Arc<BoardLayout>, root: impl Into<PathBuf>) -> Result<Self, GpioError> {
        let root = root.into();
        let xio_base = discover_xio_base(&root)?;
        let export = open_control_file(root.join("export"))?;
        let unexport = open_control_file(root.join("unexport"))?;

        Ok(Self {
            board,
            root,
            export: Mutex::new(export),
            unexport: Mutex::new(unexport),
            xio_base,
            open_pins: RwLock::new(vec![false; (FIRST_PIN + NUM_PINS) as usize]),
        })
    }

    /// Base kernel number assigned to the XIO expander by the running kernel.
    pub fn xio_base(&self) -> u32 {
        self.xio_base
    }

    fn kernel_number(&self, pin: u32) -> Result<u32, GpioError> {
        if !pin_in_range(pin) {
            return Err(GpioError::InvalidPin(pin));
        }
        self.board.kernel_number(pin, self.xio_base)
    }

    fn pin_file(&self, kernel: u32, file: &str) -> PathBuf {
        self.root.join(format!("gpio{kernel}")).join(file)
    }

    /// Close every pin this instance opened. Failures are logged and skipped
    /// so one stuck pin cannot keep the rest exported.
    pub fn close_all(&self) {
        for pin in FIRST_PIN..FIRST_PIN + NUM_PINS {
            if self.is_open(pin)
                && let Err(e) = self.close(pin)
            {
                warn!("could not close pin {pin}: {e}");
            }
        }
    }
}

impl PinAccess for SysfsGpio {
    fn resolve_name(&self, name: &str) -> Result<u32, GpioError> {
        self.board.resolve(name)
    }

    fn open(&self, pin: u32) -> Result<(), GpioError> {
        let kernel = self.kernel_number(pin)?;

        if self.is_open(pin) || self.pin_file(kernel, "value").exists() {
            warn!("pin {pin} ({kernel}) may already be open; this will likely cause issues");
        }

        self.export
            .lock()
            .write_all(kernel.to_string().as_bytes())
            .map_err(|e| {
                GpioError::Access(format!("could not open pin {pin} ({kernel}), are you root? {e}"))
            })?;

        self.open_pins.write()[pin as usize] = true;
        Ok(())
    }

    fn close(&self, pin: u32) -> Result<(), GpioError> {
        let kernel = self.kernel_number(pin)?;

        if !self.is_open(pin) {
            warn!("closing pin {pin} which is not managed by this program");
        }

        self.unexport
            .lock()
            .write_all(kernel.to_string().as_bytes())
            .map_err(|e| {
                GpioError::Access(format!("could not close pin {pin} ({kernel}), was it open? {e}"))
            })?;

        self.open_pins.write()[pin as usize] = false;
        Ok(())
    }

    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), GpioError> {
        let kernel = self.kernel_number(pin)?;
        let word = match direction {
            Direction::In => "in",
            Direction::Out => "out",
        };
        fs::write(self.pin_file(kernel, "direction"), word).map_err(|e| {
            GpioError::Access(format!("could not set direction of pin {pin} ({kernel}): {e}"))
        })
    }

    fn read_value(&self, pin: u32) -> Result<u8, GpioError> {
        let kernel = self.kernel_number(pin)?;
        let raw = fs::read_to_string(self.pin_file(kernel, "value"))
            .map_err(|e| GpioError::ReadFailure(pin, e.to_string()))?;

        // the kernel hands back the ASCII digit, usually with a trailing newline
        match raw.trim() {
            "0" => Ok(0),
            "1" => Ok(1),
            other => Err(GpioError::ReadFailure(
                pin,
                format!("invalid value {other:?} in sysfs"),
            )),
        }
    }

    fn write_value(&self, pin: u32, value: u8) -> Result<(), GpioError> {
        if value > PIN_HIGH {
            return Err(GpioError::InvalidValue(format!(
                "digital pins only carry 0 or 1, got {value}"
            )));
        }
        let kernel = self.kernel_number(pin)?;
        fs::write(
            self.pin_file(kernel, "value"),
            if value == PIN_HIGH { "1" } else { "0" },
        )
        .map_err(|e| GpioError::Access(format!("could not write to pin {pin} ({kernel}): {e}")))
    }

    fn is_open(&self, pin: u32) -> bool {
        pin_in_range(pin) && self.open_pins.read()[pin as usize]
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn open_control_file(path: PathBuf) -> Result<File, GpioError> {
    OpenOptions::new().write(true).open(&path).map_err(|e| {
        GpioError::Access(format!("could not open {}, are you root? {e}", path.display()))
    })
}

/// Find the kernel base number of the XIO expander by scanning the gpiochip
/// directories for the expander's label. The base moves between kernel
/// versions, so it cannot be hard-coded.
fn discover_xio_base(root: &Path) -> Result<u32, GpioError> {
    let entries = fs::read_dir(root)
        .map_err(|e| GpioError::Access(format!("could not scan {}: {e}", root.display())))?;

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.starts_with("gpiochip") {
            continue;
        }
        let Ok(label) = fs::read_to_string(entry.path().join("label")) else {
            continue;
        };
        if label.trim() != XIO_CHIP_LABEL {
            continue;
        }

        let base_path = entry.path().join("base");
        let base = fs::read_to_string(&base_path).map_err(|e| {
            GpioError::Access(format!("could not read {}: {e}", base_path.display()))
        })?;
        return base.trim().parse::<u32>().map_err(|e| {
            GpioError::Access(format!("bad xio base in {}: {e}", base_path.display()))
        });
    }

    Err(GpioError::Access(format!(
        "no gpiochip labelled {XIO_CHIP_LABEL} under {}",
        root.display()
    )))
}
