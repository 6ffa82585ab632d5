use std::{fs, path::Path};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::GpioError;

/// Pins are labelled starting at 1 on the headers; 0 is unused.
pub const FIRST_PIN: u32 = 1;
pub const NUM_PINS: u32 = 80;
/// Pin ids for the U14 header are the printed label plus this offset.
pub const U14_OFFSET: u32 = 40;
/// Sysfs label of the i2c expander driving the XIO pins. The chip directory
/// carrying this label holds the kernel base number for XIO-P0.
pub const XIO_CHIP_LABEL: &str = "pcf8574a";

pub fn pin_in_range(pin: u32) -> bool {
    (FIRST_PIN..FIRST_PIN + NUM_PINS).contains(&pin)
}

/// How a pin's kernel-assigned gpio number is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinKind {
    /// Allwinner R8 pin, identified by its port bank letter and offset as
    /// printed in the R8 documentation (e.g. LCD-D4 is PD4). The kernel
    /// number does not depend on the kernel version.
    R8 { bank: char, offset: u32 },
    /// Pin on the XIO expander. The kernel number is the discovered chip base
    /// plus this index, and changes between kernel versions.
    Xio { index: u32 },
    /// Kernel number fixed ahead of time. Not kernel-agnostic; avoid where
    /// possible.
    Fixed { kernel: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSpec {
    pub name: String,
    pub kind: PinKind,
}

/// The pin table for one board revision: which pin ids exist, their stable
/// logical names, and how to map them to kernel gpio numbers. `chip()` is the
/// stock C.H.I.P. pinout; a revised layout can be loaded from a JSON file
/// instead of recompiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardLayout {
    pins: FxHashMap<u32, PinSpec>,
}

// U13 header. LCD pins sit on bank D, PWM0 on bank B.
const U13_R8_PINS: &[(u32, &str, char, u32)] = &[
    (17, "LCD-D2", 'D', 2),
    (18, "PWM0", 'B', 2),
    (19, "LCD-D4", 'D', 4),
    (20, "LCD-D3", 'D', 3),
    (21, "LCD-D6", 'D', 6),
    (22, "LCD-D5", 'D', 5),
    (23, "LCD-D10", 'D', 10),
    (24, "LCD-D7", 'D', 7),
    (25, "LCD-D12", 'D', 12),
    (26, "LCD-D11", 'D', 11),
    (27, "LCD-D14", 'D', 14),
    (28, "LCD-D13", 'D', 13),
    (29, "LCD-D18", 'D', 18),
    (30, "LCD-D15", 'D', 15),
    (31, "LCD-D20", 'D', 20),
    (32, "LCD-D19", 'D', 19),
    (33, "LCD-D22", 'D', 22),
    (34, "LCD-D21", 'D', 21),
    (35, "LCD-CLK", 'D', 24),
    (36, "LCD-D23", 'D', 23),
    (37, "LCD-VSYNC", 'D', 27),
    (38, "LCD-HSYNC", 'D', 26),
    (40, "LCD-DE", 'D', 25),
];

// U14 header, CSI block (bank E). Pin ids already include U14_OFFSET.
const U14_R8_PINS: &[(u32, &str, char, u32)] = &[
    (67, "CSIPCK", 'E', 0),
    (68, "CSICK", 'E', 1),
    (69, "CSIHSYNC", 'E', 2),
    (70, "CSIVSYNC", 'E', 3),
    (71, "CSID0", 'E', 4),
    (72, "CSID1", 'E', 5),
    (73, "CSID2", 'E', 6),
    (74, "CSID3", 'E', 7),
    (75, "CSID4", 'E', 8),
    (76, "CSID5", 'E', 9),
    (77, "CSID6", 'E', 10),
    (78, "CSID7", 'E', 11),
];

const XIO_FIRST_PIN: u32 = 13 + U14_OFFSET;
const NUM_XIO_PINS: u32 = 8;

impl BoardLayout {
    /// Pinout of the stock C.H.I.P. (U13/U14 headers).
    pub fn chip() -> Self {
        let mut pins = FxHashMap::default();
        for &(id, name, bank, offset) in U13_R8_PINS.iter().chain(U14_R8_PINS) {
            pins.insert(
                id,
                PinSpec {
                    name: name.to_string(),
                    kind: PinKind::R8 { bank, offset },
                },
            );
        }
        for index in 0..NUM_XIO_PINS {
            pins.insert(
                XIO_FIRST_PIN + index,
                PinSpec {
                    name: format!("XIO-P{index}"),
                    kind: PinKind::Xio { index },
                },
            );
        }
        Self { pins }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GpioError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| GpioError::Layout(format!("Failed to read layout: {e}")))?;
        let layout: Self = serde_json::from_str(&contents)
            .map_err(|e| GpioError::Layout(format!("Invalid layout json: {e}")))?;
        for &pin in layout.pins.keys() {
            if !pin_in_range(pin) {
                return Err(GpioError::Layout(format!("pin {pin} is out of range")));
            }
        }
        Ok(layout)
    }

    pub fn contains(&self, pin: u32) -> bool {
        self.pins.contains_key(&pin)
    }

    pub fn spec(&self, pin: u32) -> Result<&PinSpec, GpioError> {
        self.pins.get(&pin).ok_or(GpioError::InvalidPin(pin))
    }

    /// Resolve a logical pin name ("XIO-P7", "LCD-D2", ...) to its pin id.
    pub fn resolve(&self, name: &str) -> Result<u32, GpioError> {
        self.pins
            .iter()
            .find(|(_, spec)| spec.name == name)
            .map(|(&pin, _)| pin)
            .ok_or_else(|| GpioError::UnknownPin(name.to_string()))
    }

    /// Kernel-assigned gpio number for a pin. `xio_base` is the discovered
    /// base of the XIO expander chip and is only consulted for XIO pins.
    pub fn kernel_number(&self, pin: u32, xio_base: u32) -> Result<u32, GpioError> {
        match self.spec(pin)?.kind {
            PinKind::R8 { bank, offset } => {
                if !bank.is_ascii_uppercase() {
                    return Err(GpioError::Layout(format!(
                        "pin {pin} has invalid port bank {bank:?}"
                    )));
                }
                // e.g. LCD-D4 is PD4: 32 per bank starting at A, plus the offset
                Ok(32 * (bank as u32 - 'A' as u32) + offset)
            }
            PinKind::Xio { index } => Ok(xio_base + index),
            PinKind::Fixed { kernel } => Ok(kernel),
        }
    }
}
