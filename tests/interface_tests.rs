use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chip_gpio::{BoardLayout, Direction, GpioError, MockGpio, PinAccess, SysfsGpio};

fn chip_board() -> Arc<BoardLayout> {
    Arc::new(BoardLayout::chip())
}

#[test]
fn chip_layout_resolves_names() {
    let board = chip_board();
    assert_eq!(board.resolve("LCD-D2").unwrap(), 17);
    assert_eq!(board.resolve("PWM0").unwrap(), 18);
    assert_eq!(board.resolve("LCD-DE").unwrap(), 40);
    assert_eq!(board.resolve("XIO-P0").unwrap(), 53);
    assert_eq!(board.resolve("XIO-P7").unwrap(), 60);
    assert_eq!(board.resolve("CSIPCK").unwrap(), 67);
    assert_eq!(board.resolve("CSID7").unwrap(), 78);
    assert!(matches!(
        board.resolve("NO-SUCH-PIN"),
        Err(GpioError::UnknownPin(_))
    ));
}

#[test]
fn kernel_numbers_follow_the_bank_decode() {
    let board = chip_board();
    let base = 408;

    // R8 pins: 32 per port bank plus the offset, independent of the base
    assert_eq!(board.kernel_number(17, base).unwrap(), 98); // LCD-D2 = PD2
    assert_eq!(board.kernel_number(18, base).unwrap(), 34); // PWM0 = PB2
    assert_eq!(board.kernel_number(35, base).unwrap(), 120); // LCD-CLK = PD24
    assert_eq!(board.kernel_number(67, base).unwrap(), 128); // CSIPCK = PE0
    assert_eq!(board.kernel_number(78, base).unwrap(), 139); // CSID7 = PE11

    // XIO pins ride on the discovered expander base
    assert_eq!(board.kernel_number(53, base).unwrap(), 408);
    assert_eq!(board.kernel_number(60, base).unwrap(), 415);

    // pins with no assignment on this board
    assert!(matches!(
        board.kernel_number(1, base),
        Err(GpioError::InvalidPin(1))
    ));
}

#[test]
fn layout_loads_from_json() {
    let path = std::env::temp_dir().join(format!("chip-gpio-layout-{}.json", std::process::id()));
    fs::write(
        &path,
        r#"
        {
            "pins": {
                "17": { "name": "STATUS-LED", "kind": { "r8": { "bank": "D", "offset": 2 } } },
                "53": { "name": "DOOR-SWITCH", "kind": { "xio": { "index": 0 } } },
                "40": { "name": "RELAY", "kind": { "fixed": { "kernel": 133 } } }
            }
        }
        "#,
    )
    .unwrap();

    let layout = BoardLayout::load_from_file(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(layout.resolve("STATUS-LED").unwrap(), 17);
    assert_eq!(layout.resolve("DOOR-SWITCH").unwrap(), 53);
    assert_eq!(layout.kernel_number(17, 408).unwrap(), 98);
    assert_eq!(layout.kernel_number(53, 408).unwrap(), 408);
    assert_eq!(layout.kernel_number(40, 408).unwrap(), 133);
    assert!(!layout.contains(18));
}

#[test]
fn layout_rejects_out_of_range_pins() {
    let path =
        std::env::temp_dir().join(format!("chip-gpio-bad-layout-{}.json", std::process::id()));
    fs::write(
        &path,
        r#"{ "pins": { "99": { "name": "GHOST", "kind": { "xio": { "index": 0 } } } } }"#,
    )
    .unwrap();

    let result = BoardLayout::load_from_file(&path);
    fs::remove_file(&path).ok();
    assert!(matches!(result, Err(GpioError::Layout(_))));
}

#[test]
fn mock_pins_behave_like_fresh_exports() {
    let gpio = MockGpio::new(chip_board());

    // reads require an open pin
    assert!(matches!(
        gpio.read_value(53),
        Err(GpioError::ReadFailure(53, _))
    ));

    gpio.open(53).unwrap();
    assert!(gpio.is_open(53));
    assert_eq!(gpio.read_value(53).unwrap(), 0);

    // writes require the output direction
    assert!(matches!(gpio.write_value(53, 1), Err(GpioError::Access(_))));
    gpio.set_direction(53, Direction::Out).unwrap();
    gpio.write_value(53, 1).unwrap();
    assert_eq!(gpio.read_value(53).unwrap(), 1);
    assert!(matches!(
        gpio.write_value(53, 2),
        Err(GpioError::InvalidValue(_))
    ));

    gpio.close(53).unwrap();
    assert!(!gpio.is_open(53));
    assert!(matches!(
        gpio.read_value(53),
        Err(GpioError::ReadFailure(53, _))
    ));
}

#[test]
fn mock_named_helpers_resolve_and_forward() {
    let gpio = MockGpio::new(chip_board());

    let led = gpio.setup_named("XIO-P7", Direction::Out).unwrap();
    assert_eq!(led, 60);
    assert!(gpio.is_open(led));

    let written = gpio.write_value_named("XIO-P7", 1).unwrap();
    assert_eq!(written, led);
    assert_eq!(gpio.read_value_named("XIO-P7").unwrap(), 1);

    assert!(matches!(
        gpio.setup_named("NO-SUCH-PIN", Direction::In),
        Err(GpioError::UnknownPin(_))
    ));

    assert_eq!(gpio.close_named("XIO-P7").unwrap(), led);
    assert!(!gpio.is_open(led));
}

/// Stage a directory tree shaped like /sys/class/gpio with the XIO expander
/// chip present.
fn fake_sysfs_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("chip-gpio-{}-{tag}", std::process::id()));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(root.join("gpiochip0")).unwrap();
    fs::write(root.join("gpiochip0").join("label"), "pcf8574a\n").unwrap();
    fs::write(root.join("gpiochip0").join("base"), "408\n").unwrap();
    fs::write(root.join("export"), "").unwrap();
    fs::write(root.join("unexport"), "").unwrap();
    root
}

#[test]
fn sysfs_discovers_the_xio_base() {
    let root = fake_sysfs_root("base");
    let gpio = SysfsGpio::with_root(chip_board(), &root).unwrap();
    assert_eq!(gpio.xio_base(), 408);
    drop(gpio);
    fs::remove_dir_all(&root).ok();
}

#[test]
fn sysfs_errors_without_the_expander_chip() {
    let root = std::env::temp_dir().join(format!("chip-gpio-noexp-{}", std::process::id()));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("export"), "").unwrap();
    fs::write(root.join("unexport"), "").unwrap();

    let result = SysfsGpio::with_root(chip_board(), &root);
    assert!(matches!(result, Err(GpioError::Access(_))));
    fs::remove_dir_all(&root).ok();
}

#[test]
fn sysfs_reads_and_writes_value_files() {
    let root = fake_sysfs_root("rw");
    let gpio = SysfsGpio::with_root(chip_board(), &root).unwrap();

    // XIO-P7 is pin 60, kernel number 408 + 7
    gpio.open(60).unwrap();
    assert!(gpio.is_open(60));
    assert!(fs::read_to_string(root.join("export")).unwrap().contains("415"));

    fs::create_dir_all(root.join("gpio415")).unwrap();
    fs::write(root.join("gpio415").join("direction"), "in\n").unwrap();
    fs::write(root.join("gpio415").join("value"), "1\n").unwrap();

    assert_eq!(gpio.read_value(60).unwrap(), 1);

    gpio.set_direction(60, Direction::Out).unwrap();
    assert_eq!(
        fs::read_to_string(root.join("gpio415").join("direction")).unwrap(),
        "out"
    );

    gpio.write_value(60, 0).unwrap();
    assert_eq!(gpio.read_value(60).unwrap(), 0);
    assert!(matches!(
        gpio.write_value(60, 7),
        Err(GpioError::InvalidValue(_))
    ));

    // garbage in the value file surfaces as a read failure
    fs::write(root.join("gpio415").join("value"), "x\n").unwrap();
    assert!(matches!(
        gpio.read_value(60),
        Err(GpioError::ReadFailure(60, _))
    ));

    gpio.close(60).unwrap();
    assert!(!gpio.is_open(60));
    assert!(fs::read_to_string(root.join("unexport")).unwrap().contains("415"));

    drop(gpio);
    fs::remove_dir_all(&root).ok();
}

#[test]
fn sysfs_drop_closes_open_pins() {
    let root = fake_sysfs_root("drop");
    let gpio = SysfsGpio::with_root(chip_board(), &root).unwrap();

    gpio.open(53).unwrap(); // kernel 408
    gpio.open(17).unwrap(); // kernel 98
    drop(gpio);

    let unexported = fs::read_to_string(root.join("unexport")).unwrap();
    assert!(unexported.contains("408"));
    assert!(unexported.contains("98"));
    fs::remove_dir_all(&root).ok();
}
