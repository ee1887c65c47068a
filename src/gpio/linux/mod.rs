use std::io;

mod gpiomem;
mod sysfs;

use crate::gpio::{
	Gpio,
	PinNo,
};

/// Exports (if necessary) and opens every pin in `pins` through
/// `/sys/class/gpio`; pins exported here are unexported on drop.
pub fn open_sysfs(pins: &[PinNo]) -> io::Result<impl Gpio> {
	sysfs::inner_open(pins)
}

/// Maps the BCM283x GPIO register block; pins are BCM GPIO numbers.
pub fn open_gpiomem() -> io::Result<impl Gpio> {
	gpiomem::inner_open("/dev/gpiomem")
}
