use std::thread;
use std::time::{
	Duration,
	Instant,
};

pub mod linux;

pub type PinNo = u32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Input,
	// open-drain lines and unconnected pins
	InputPullUp,
	Output,
}

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Board GPIO lines as seen by the programmer.
///
/// Pin numbers are whatever the backend uses to address a line (sysfs GPIO
/// number, BCM GPIO number, ...). Implementations must not fail once opened.
pub trait Gpio {
	fn set_direction(&mut self, pin: PinNo, direction: Direction);
	fn write(&mut self, pin: PinNo, high: bool);
	fn read(&mut self, pin: PinNo) -> bool;

	// monotonic clock, only differences are meaningful
	fn micros(&self) -> u64;

	// delay for (at least) `us` microseconds
	fn delay_us(&mut self, us: u32) {
		reliable_sleep(Duration::from_micros(us as u64));
	}
}

impl<'a, G: ?Sized + Gpio> Gpio for &'a mut G {
	fn set_direction(&mut self, pin: PinNo, direction: Direction) {
		G::set_direction(*self, pin, direction)
	}
	fn write(&mut self, pin: PinNo, high: bool) {
		G::write(*self, pin, high)
	}
	fn read(&mut self, pin: PinNo) -> bool {
		G::read(*self, pin)
	}
	fn micros(&self) -> u64 {
		G::micros(*self)
	}
	fn delay_us(&mut self, us: u32) {
		G::delay_us(*self, us)
	}
}

impl<G: ?Sized + Gpio> Gpio for Box<G> {
	fn set_direction(&mut self, pin: PinNo, direction: Direction) {
		G::set_direction(&mut **self, pin, direction)
	}
	fn write(&mut self, pin: PinNo, high: bool) {
		G::write(&mut **self, pin, high)
	}
	fn read(&mut self, pin: PinNo) -> bool {
		G::read(&mut **self, pin)
	}
	fn micros(&self) -> u64 {
		G::micros(&**self)
	}
	fn delay_us(&mut self, us: u32) {
		G::delay_us(&mut **self, us)
	}
}

/// Wall clock for real hardware backends.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
	start: Instant,
}

impl Clock {
	pub fn new() -> Self {
		Clock { start: Instant::now() }
	}

	pub fn micros(&self) -> u64 {
		let elapsed = self.start.elapsed();
		elapsed.as_secs() * 1_000_000 + elapsed.subsec_micros() as u64
	}
}

impl Default for Clock {
	fn default() -> Self {
		Clock::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reliable_sleep_waits_at_least_duration() {
		let start = Instant::now();
		reliable_sleep(Duration::from_micros(1500));
		assert!(start.elapsed() >= Duration::from_micros(1500));
	}

	#[test]
	fn clock_is_monotonic() {
		let clock = Clock::new();
		let a = clock.micros();
		reliable_sleep(Duration::from_micros(100));
		assert!(clock.micros() >= a + 100);
	}
}
