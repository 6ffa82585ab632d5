pub mod mock;
pub mod sysfs;

pub use mock::MockGpio;
pub use sysfs::SysfsGpio;
