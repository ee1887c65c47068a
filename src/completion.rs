//! Waiting for the internal programming cycle after a byte was latched.
//!
//! Neither strategy can fail: after the bounded wait the write counts as
//! done, whether completion was observed or not (a timeout is only logged).

use crate::bus::{
	BusDriver,
	DataDirection,
};
use crate::gpio::Gpio;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WaitReport {
	pub elapsed_us: u64,
	/// `None` if no polling took place (flat wait)
	pub poll_cycles: Option<u32>,
}

pub trait CompletionDetector<G: Gpio> {
	/// Called with !CE and !WE de-asserted right after the latching edge;
	/// must leave the control lines de-asserted and the data bus as output.
	fn wait(&mut self, bus: &mut BusDriver<G>, written: u8) -> WaitReport;
}

fn attempts(max_wait_us: u32, interval_us: u32) -> u32 {
	max_wait_us / interval_us.max(1)
}

/// Watches the open-drain RDY/!BUSY line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReadyBusyPolling {
	/// time for the chip to pull the line low after the !WE edge
	pub settle_us: u32,
	pub interval_us: u32,
	pub max_wait_us: u32,
}

impl<G: Gpio> CompletionDetector<G> for ReadyBusyPolling {
	fn wait(&mut self, bus: &mut BusDriver<G>, _written: u8) -> WaitReport {
		let start = bus.micros();
		bus.delay_us(self.settle_us);

		let poll_cycles = match bus.read_ready() {
			Some(false) => {
				let mut cycles = 0u32;
				let mut ready = false;
				for _ in 0..attempts(self.max_wait_us, self.interval_us) {
					bus.delay_us(self.interval_us);
					cycles += 1;
					// busy -> ready edge
					if bus.read_ready() == Some(true) {
						ready = true;
						break;
					}
				}
				if !ready {
					warn!("chip still busy after {} us, continuing anyway", self.max_wait_us);
				}
				Some(cycles)
			},
			status => {
				// never saw it busy (missed the pulse, or no status pin): wait the
				// worst case
				if status.is_none() {
					debug!("no RDY/!BUSY pin, flat wait");
				}
				bus.delay_us(self.max_wait_us);
				None
			},
		};

		WaitReport {
			elapsed_us: bus.micros() - start,
			poll_cycles,
		}
	}
}

/// Reads back the written address until the chip returns the written byte
/// (during the write cycle it returns the complement of bit 7).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DataPolling {
	pub interval_us: u32,
	pub output_enable_delay_us: u32,
	pub max_wait_us: u32,
}

impl<G: Gpio> CompletionDetector<G> for DataPolling {
	fn wait(&mut self, bus: &mut BusDriver<G>, written: u8) -> WaitReport {
		let start = bus.micros();
		// the chip drives the bus while polling
		bus.set_data_direction(DataDirection::Input);

		let mut cycles = 0u32;
		let mut matched = false;
		for _ in 0..attempts(self.max_wait_us, self.interval_us) {
			bus.delay_us(self.interval_us);
			cycles += 1;

			// every poll needs its own !CE/!OE cycle, the chip only updates the
			// output on the falling edge
			bus.set_chip_enable(true);
			bus.set_output_enable(true);
			bus.delay_us(self.output_enable_delay_us);
			let data = bus.read_data();
			bus.set_output_enable(false);
			bus.set_chip_enable(false);

			if data == written {
				matched = true;
				break;
			}
		}
		if !matched {
			warn!("data polling didn't return 0x{:02x} within {} us, continuing anyway", written, self.max_wait_us);
		}

		bus.set_data_direction(DataDirection::Output);

		WaitReport {
			elapsed_us: bus.micros() - start,
			poll_cycles: Some(cycles),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sim::SimulatedChip;
	use crate::wiring::WiringRegistry;

	const MAX_WAIT: u32 = 1400;

	// latch `data` at address 0 and leave the bus the way the write waveform
	// hands it to the detector
	fn latched(chip: &str, data: u8, setup: impl FnOnce(&mut SimulatedChip)) -> BusDriver<SimulatedChip> {
		let profile = WiringRegistry::builtin().unwrap().resolve(chip, "MEGA_DIP28").unwrap();
		let mut sim = SimulatedChip::new(&profile);
		sim.set_write_cycle_us(500);
		setup(&mut sim);
		let mut bus = BusDriver::configure(sim, profile);
		bus.set_data_direction(DataDirection::Output);
		bus.set_address(0);
		bus.set_chip_enable(true);
		bus.set_write_enable(true);
		bus.set_data(data);
		bus.set_write_enable(false);
		bus.set_chip_enable(false);
		bus
	}

	fn ready_busy() -> ReadyBusyPolling {
		ReadyBusyPolling { settle_us: 1, interval_us: 100, max_wait_us: MAX_WAIT }
	}

	fn data_polling() -> DataPolling {
		DataPolling { interval_us: 50, output_enable_delay_us: 1, max_wait_us: MAX_WAIT }
	}

	#[test]
	fn ready_busy_stops_at_rising_edge() {
		let mut bus = latched("AT28C64", 0x42, |_| ());
		let report = ready_busy().wait(&mut bus, 0x42);
		assert_eq!(report.poll_cycles, Some(5));
		assert_eq!(report.elapsed_us, 501);
		assert!(!bus.gpio().is_busy());
	}

	#[test]
	fn ready_busy_never_rising_is_bounded() {
		let mut bus = latched("AT28C64", 0x42, |sim| sim.set_stuck_busy(true));
		let report = ready_busy().wait(&mut bus, 0x42);
		assert_eq!(report.poll_cycles, Some(14));
		assert!(report.elapsed_us >= MAX_WAIT as u64);
		assert!(report.elapsed_us <= MAX_WAIT as u64 + 1);
	}

	#[test]
	fn ready_at_first_sample_waits_worst_case() {
		let mut bus = latched("AT28C64", 0x42, |sim| sim.set_status_stuck_ready(true));
		let report = ready_busy().wait(&mut bus, 0x42);
		assert_eq!(report.poll_cycles, None);
		assert_eq!(report.elapsed_us, MAX_WAIT as u64 + 1);
	}

	#[test]
	fn data_polling_stops_on_match() {
		let mut bus = latched("AT28C256", 0x5a, |_| ());
		let activity_before = bus.gpio().activity();
		let report = data_polling().wait(&mut bus, 0x5a);
		// 500 us cycle, 51 us per attempt
		assert_eq!(report.poll_cycles, Some(10));
		assert!(report.elapsed_us < MAX_WAIT as u64);
		assert_eq!(bus.data_direction(), DataDirection::Output);
		// each attempt toggles !CE and !OE twice
		assert!(bus.gpio().activity() - activity_before >= 4 * 10);
		assert_eq!(bus.gpio().level(bus.profile().chip_enable_pin()), Some(true));
	}

	#[test]
	fn data_polling_never_matching_is_bounded() {
		let mut bus = latched("AT28C256", 0x5a, |sim| sim.set_stuck_busy(true));
		let report = data_polling().wait(&mut bus, 0x5a);
		assert_eq!(report.poll_cycles, Some(28));
		assert!(report.elapsed_us >= MAX_WAIT as u64);
		assert_eq!(bus.data_direction(), DataDirection::Output);
	}
}
