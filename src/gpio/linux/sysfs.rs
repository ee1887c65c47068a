use std::collections::HashMap;
use std::fs;
use std::io::{
	self,
	Write,
};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::gpio::{
	Clock,
	Direction,
	Gpio,
	PinNo,
};

const SYSFS_GPIO: &str = "/sys/class/gpio";

struct PinFiles {
	direction: fs::File,
	value: fs::File,
	// unexport on drop
	exported_by_us: bool,
}

fn write_exact_at(file: &fs::File, buf: &[u8]) -> io::Result<()> {
	// sysfs attributes take the whole value in one write
	let l = file.write_at(buf, 0)?;
	if l != buf.len() {
		Err(io::Error::new(io::ErrorKind::Other, "failed to write whole buffer"))
	} else {
		Ok(())
	}
}

fn write_control_file(name: &str, pin: PinNo) -> io::Result<()> {
	fs::OpenOptions::new()
		.write(true)
		.open(Path::new(SYSFS_GPIO).join(name))?
		.write_all(pin.to_string().as_bytes())
}

pub struct Sysfs {
	pins: HashMap<PinNo, PinFiles>,
	clock: Clock,
}

impl Sysfs {
	fn pin(&self, pin: PinNo) -> &PinFiles {
		match self.pins.get(&pin) {
			Some(p) => p,
			None => panic!("GPIO {} was not opened", pin),
		}
	}
}

impl Gpio for Sysfs {
	fn set_direction(&mut self, pin: PinNo, direction: Direction) {
		let value: &[u8] = match direction {
			Direction::Input => b"in",
			Direction::InputPullUp => {
				trace!("GPIO {}: sysfs can't enable pull-ups, relying on external ones", pin);
				b"in"
			},
			Direction::Output => b"out",
		};
		write_exact_at(&self.pin(pin).direction, value).expect("write to exported GPIO direction must not fail")
	}

	fn write(&mut self, pin: PinNo, high: bool) {
		let value: &[u8] = if high { b"1" } else { b"0" };
		write_exact_at(&self.pin(pin).value, value).expect("write to exported GPIO value must not fail")
	}

	fn read(&mut self, pin: PinNo) -> bool {
		let mut buf = [0u8];
		let l = self.pin(pin).value.read_at(&mut buf, 0).expect("read from exported GPIO value must not fail");
		assert!(l == 1, "empty GPIO value read");
		buf[0] == b'1'
	}

	fn micros(&self) -> u64 {
		self.clock.micros()
	}
}

impl Drop for Sysfs {
	fn drop(&mut self) {
		for (&pin, files) in self.pins.iter() {
			if files.exported_by_us {
				let _ = write_exact_at(&files.direction, b"in");
				if let Err(e) = write_control_file("unexport", pin) {
					warn!("GPIO {}: couldn't unexport: {}", pin, e);
				}
			}
		}
	}
}

// TODO: exclusive open / file locking?
pub fn inner_open(pins: &[PinNo]) -> io::Result<Sysfs> {
	// pins exported so far get unexported again if a later one fails
	let mut gpio = Sysfs {
		pins: HashMap::new(),
		clock: Clock::new(),
	};
	for &pin in pins {
		if gpio.pins.contains_key(&pin) {
			continue;
		}
		let dir = Path::new(SYSFS_GPIO).join(format!("gpio{}", pin));
		let exported_by_us = !dir.exists();
		if exported_by_us {
			write_control_file("export", pin)?;
		}
		let open_rw = |name: &str| {
			fs::OpenOptions::new()
				.read(true)
				.write(true)
				.open(dir.join(name))
		};
		let direction = open_rw("direction")?;
		let value = open_rw("value")?;
		debug!("GPIO {}: opened via sysfs", pin);
		gpio.pins.insert(pin, PinFiles {
			direction,
			value,
			exported_by_us,
		});
	}

	Ok(gpio)
}
