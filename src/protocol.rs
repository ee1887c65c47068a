//! Read and write waveforms of AT28C-style parallel EEPROMs.
//!
//! Read (!OE controlled):
//! 1. address
//! 2. !CE low, then !OE low
//! 3. wait tOE (!OE to output delay, 100 ns max; we can only wait whole
//!    microseconds)
//! 4. sample data
//! 5. !OE high, then !CE high
//! 6. address 0
//!
//! Write (!WE controlled):
//! 1. address
//! 2. !CE low
//! 3. !WE low
//! 4. data
//! 5. !WE high: latches the byte and starts the internal write cycle
//! 6. !CE high
//! 7. wait for the write cycle to complete
//! 8. address 0

use crate::bus::{
	BusDriver,
	DataDirection,
};
use crate::completion::{
	CompletionDetector,
	DataPolling,
	ReadyBusyPolling,
	WaitReport,
};
use crate::error::{
	PResult,
	ProgrammerError,
};
use crate::gpio::Gpio;
use crate::wiring::ChipProfile;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum OperationMode {
	Uninitialized,
	ReadArmed,
	WriteArmed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Timings {
	pub output_enable_delay_us: u32,
	pub ready_busy_settle_us: u32,
	pub ready_busy_interval_us: u32,
	pub data_polling_interval_us: u32,
	/// maximum completion wait in percent of the chip's write cycle time
	pub write_margin_percent: u32,
}

impl Default for Timings {
	fn default() -> Self {
		Timings {
			output_enable_delay_us: 1,
			ready_busy_settle_us: 1,
			ready_busy_interval_us: 100,
			data_polling_interval_us: 50,
			write_margin_percent: 140,
		}
	}
}

impl Timings {
	pub fn max_write_wait_us(&self, write_cycle_us: u32) -> u32 {
		(write_cycle_us as u64 * self.write_margin_percent as u64 / 100) as u32
	}

	/// Ready/busy polling if the chip has the pin, data polling otherwise.
	pub fn detector<G: Gpio>(&self, profile: &ChipProfile) -> Box<dyn CompletionDetector<G>> {
		let max_wait_us = self.max_write_wait_us(profile.write_cycle_us());
		if profile.has_ready_busy() {
			Box::new(ReadyBusyPolling {
				settle_us: self.ready_busy_settle_us,
				interval_us: self.ready_busy_interval_us,
				max_wait_us,
			})
		} else {
			Box::new(DataPolling {
				interval_us: self.data_polling_interval_us,
				output_enable_delay_us: self.output_enable_delay_us,
				max_wait_us,
			})
		}
	}
}

pub struct EepromProtocol<G: Gpio> {
	bus: BusDriver<G>,
	mode: OperationMode,
	timings: Timings,
	detector: Box<dyn CompletionDetector<G>>,
	last_wait: Option<WaitReport>,
}

impl<G: Gpio> EepromProtocol<G> {
	pub fn new(bus: BusDriver<G>, timings: Timings) -> Self {
		let detector = timings.detector(bus.profile());
		EepromProtocol::with_detector(bus, timings, detector)
	}

	pub fn with_detector(bus: BusDriver<G>, timings: Timings, detector: Box<dyn CompletionDetector<G>>) -> Self {
		EepromProtocol {
			bus,
			mode: OperationMode::Uninitialized,
			timings,
			detector,
			last_wait: None,
		}
	}

	pub fn into_bus(self) -> BusDriver<G> {
		self.bus
	}

	pub fn bus(&self) -> &BusDriver<G> {
		&self.bus
	}

	pub fn bus_mut(&mut self) -> &mut BusDriver<G> {
		&mut self.bus
	}

	pub fn profile(&self) -> &ChipProfile {
		self.bus.profile()
	}

	pub fn mode(&self) -> OperationMode {
		self.mode
	}

	pub fn timings(&self) -> &Timings {
		&self.timings
	}

	/// Completion wait of the last write, if any.
	pub fn last_wait(&self) -> Option<WaitReport> {
		self.last_wait
	}

	/// Arms reads (disarming writes): control lines idle, data bus input.
	pub fn set_read_mode(&mut self) {
		self.bus.idle_control();
		self.bus.set_data_direction(DataDirection::Input);
		if self.mode != OperationMode::ReadArmed {
			debug!("{}: read mode", self.profile().model());
		}
		self.mode = OperationMode::ReadArmed;
	}

	/// Arms writes (disarming reads): control lines idle, data bus output.
	pub fn set_write_mode(&mut self) {
		self.bus.idle_control();
		self.bus.set_data_direction(DataDirection::Output);
		if self.mode != OperationMode::WriteArmed {
			debug!("{}: write mode", self.profile().model());
		}
		self.mode = OperationMode::WriteArmed;
	}

	pub fn read_byte(&mut self, address: u32) -> PResult<u8> {
		if self.mode != OperationMode::ReadArmed {
			return Err(ProgrammerError::ReadModeDisabled);
		}
		let oe_delay = self.timings.output_enable_delay_us;
		let bus = &mut self.bus;

		bus.set_address(address);
		bus.set_chip_enable(true);
		bus.set_output_enable(true);
		bus.delay_us(oe_delay);
		let data = bus.read_data();
		bus.set_output_enable(false);
		bus.set_chip_enable(false);
		bus.set_address(0);

		trace!("read 0x{:04x}: 0x{:02x}", address, data);
		Ok(data)
	}

	pub fn write_byte(&mut self, address: u32, data: u8) -> PResult<WaitReport> {
		if self.mode != OperationMode::WriteArmed {
			return Err(ProgrammerError::WriteModeDisabled);
		}
		let bus = &mut self.bus;

		bus.set_address(address);
		bus.set_chip_enable(true);
		bus.set_write_enable(true);
		bus.set_data(data);
		bus.set_write_enable(false);
		bus.set_chip_enable(false);

		let report = self.detector.wait(bus, data);

		bus.set_address(0);

		trace!("wrote 0x{:02x} to 0x{:04x}, waited {} us ({:?} polls)",
			data, address, report.elapsed_us, report.poll_cycles);
		self.last_wait = Some(report);
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sim::SimulatedChip;
	use crate::wiring::WiringRegistry;

	fn protocol(chip: &str) -> EepromProtocol<SimulatedChip> {
		let profile = WiringRegistry::builtin().unwrap().resolve(chip, "MEGA_DIP28").unwrap();
		let sim = SimulatedChip::new(&profile);
		EepromProtocol::new(BusDriver::configure(sim, profile), Timings::default())
	}

	// records (pin, level) of every write after arming
	struct Recorder {
		log: Vec<(u32, bool)>,
		reads: usize,
		now: u64,
	}

	impl Gpio for Recorder {
		fn set_direction(&mut self, _pin: u32, _direction: crate::gpio::Direction) {}
		fn write(&mut self, pin: u32, high: bool) {
			self.log.push((pin, high));
		}
		fn read(&mut self, _pin: u32) -> bool {
			self.reads += 1;
			true
		}
		fn micros(&self) -> u64 {
			self.now
		}
		fn delay_us(&mut self, us: u32) {
			self.now += us as u64;
		}
	}

	struct NoWait;

	impl<G: Gpio> CompletionDetector<G> for NoWait {
		fn wait(&mut self, _bus: &mut BusDriver<G>, _written: u8) -> WaitReport {
			WaitReport { elapsed_us: 0, poll_cycles: None }
		}
	}

	fn recorder(chip: &str) -> EepromProtocol<Recorder> {
		let profile = WiringRegistry::builtin().unwrap().resolve(chip, "MEGA_DIP28").unwrap();
		let rec = Recorder { log: Vec::new(), reads: 0, now: 0 };
		EepromProtocol::with_detector(BusDriver::configure(rec, profile), Timings::default(), Box::new(NoWait))
	}

	fn control_events(p: &mut EepromProtocol<Recorder>) -> Vec<(&'static str, bool)> {
		let profile = p.profile().clone();
		let log = std::mem::replace(&mut p.bus.gpio_mut().log, Vec::new());
		log.into_iter().filter_map(|(pin, level)| {
			if pin == profile.chip_enable_pin() {
				Some(("CE", level))
			} else if pin == profile.output_enable_pin() {
				Some(("OE", level))
			} else if pin == profile.write_enable_pin() {
				Some(("WE", level))
			} else if pin == profile.data_pins()[0] {
				Some(("IO0", level))
			} else if pin == profile.address_pins()[0] {
				Some(("A0", level))
			} else {
				None
			}
		}).collect()
	}

	#[test]
	fn read_waveform_order() {
		let mut p = recorder("AT28C64");
		p.set_read_mode();
		control_events(&mut p);
		p.read_byte(1).unwrap();
		assert_eq!(control_events(&mut p), vec![
			("A0", true),
			("CE", false),
			("OE", false),
			("OE", true),
			("CE", true),
			("A0", false),
		]);
		assert_eq!(p.bus().gpio().now, 1);
		assert_eq!(p.bus().gpio().reads, 8);
	}

	#[test]
	fn write_waveform_order() {
		let mut p = recorder("AT28C64");
		p.set_write_mode();
		control_events(&mut p);
		p.write_byte(1, 0x01).unwrap();
		assert_eq!(control_events(&mut p), vec![
			("A0", true),
			("CE", false),
			("WE", false),
			("IO0", true),
			("WE", true),
			("CE", true),
			("A0", false),
		]);
	}

	#[test]
	fn byte_operations_need_matching_mode() {
		let mut p = protocol("AT28C64");
		assert_eq!(p.mode(), OperationMode::Uninitialized);
		assert_eq!(p.read_byte(0), Err(ProgrammerError::ReadModeDisabled));
		assert_eq!(p.write_byte(0, 0), Err(ProgrammerError::WriteModeDisabled));

		p.set_write_mode();
		let before = p.bus().gpio().activity();
		assert_eq!(p.read_byte(0), Err(ProgrammerError::ReadModeDisabled));
		assert_eq!(p.bus().gpio().activity(), before);

		p.set_read_mode();
		assert_eq!(p.mode(), OperationMode::ReadArmed);
		assert_eq!(p.write_byte(0, 0), Err(ProgrammerError::WriteModeDisabled));
	}

	#[test]
	fn write_then_read_with_ready_busy() {
		let mut p = protocol("AT28C64");
		p.set_write_mode();
		let report = p.write_byte(0x1234, 0xa5).unwrap();
		assert!(report.poll_cycles.unwrap() > 0);
		assert_eq!(p.last_wait(), Some(report));
		assert_eq!(p.bus().gpio().memory()[0x1234], 0xa5);

		p.set_read_mode();
		assert_eq!(p.read_byte(0x1234).unwrap(), 0xa5);
		assert_eq!(p.read_byte(0x1235).unwrap(), 0xff);
	}

	#[test]
	fn write_then_read_with_data_polling() {
		let mut p = protocol("AT28C256");
		p.set_write_mode();
		let report = p.write_byte(0x7fff, 0x3c).unwrap();
		assert!(report.poll_cycles.unwrap() > 0);
		assert!(report.elapsed_us < p.timings().max_write_wait_us(10_000) as u64);
		p.set_read_mode();
		assert_eq!(p.read_byte(0x7fff).unwrap(), 0x3c);
	}

	#[test]
	fn bus_left_idle_after_operations() {
		let mut p = protocol("AT28C64");
		p.set_write_mode();
		p.write_byte(0x1fff, 0x00).unwrap();
		let profile = p.profile().clone();
		let sim = p.bus().gpio();
		assert_eq!(sim.level(profile.chip_enable_pin()), Some(true));
		assert_eq!(sim.level(profile.write_enable_pin()), Some(true));
		for &pin in profile.address_pins() {
			assert_eq!(sim.level(pin), Some(false));
		}
	}

	#[test]
	fn max_wait_uses_integer_margin() {
		assert_eq!(Timings::default().max_write_wait_us(1000), 1400);
		assert_eq!(Timings::default().max_write_wait_us(10_000), 14_000);
	}
}
