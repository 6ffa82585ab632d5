//! Toggles an LED on XIO-P7 every time a button wired to XIO-P5 is pressed
//! and released. Requires root (or udev rules granting sysfs gpio access).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chip_gpio::{BoardLayout, CallbackEngine, Direction, PinAccess, SysfsGpio};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let board = Arc::new(BoardLayout::chip());
    let gpio = Arc::new(SysfsGpio::new(board)?);

    let led = gpio.setup_named("XIO-P7", Direction::Out)?;
    gpio.setup_named("XIO-P5", Direction::In)?;

    let mut engine = CallbackEngine::new(gpio.clone());
    engine.set_polling_delay(Duration::from_millis(5));

    let toggler = gpio.clone();
    engine.register_flip_named("XIO-P5", move |change| {
        println!("button released (pin {} read {})", change.pin, change.new_value);
        let lit = toggler.read_value(led)?;
        toggler.write_value(led, lit ^ 1)?;
        Ok(())
    })?;

    engine.start()?;
    println!("press the button to toggle the LED; Ctrl-C to quit");
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
