use crate::bits;
use crate::gpio::{
	Direction,
	Gpio,
};
use crate::wiring::ChipProfile;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum DataDirection {
	// chip drives the data bus
	Input,
	// we drive the data bus
	Output,
}

/// The address/data buses and control lines of one chip.
///
/// Control lines are active low; the `set_*` helpers take the logical state
/// (`true` = asserted, i.e. pin driven low).
pub struct BusDriver<G: Gpio> {
	gpio: G,
	profile: ChipProfile,
	data_direction: DataDirection,
}

impl<G: Gpio> BusDriver<G> {
	/// Puts every pin of the chip into its idle state: control lines
	/// de-asserted, address 0, data bus floating (input with pull-up), status
	/// and unconnected pins pulled up.
	pub fn configure(mut gpio: G, profile: ChipProfile) -> Self {
		for &pin in [profile.chip_enable_pin(), profile.output_enable_pin(), profile.write_enable_pin()].iter() {
			gpio.set_direction(pin, Direction::Output);
			gpio.write(pin, true);
		}
		for &pin in profile.address_pins() {
			gpio.set_direction(pin, Direction::Output);
		}
		if let Some(pin) = profile.ready_busy_pin() {
			// open drain
			gpio.set_direction(pin, Direction::InputPullUp);
		}
		for &pin in profile.not_connected_pins() {
			gpio.set_direction(pin, Direction::InputPullUp);
		}
		for &pin in profile.data_pins() {
			gpio.set_direction(pin, Direction::InputPullUp);
		}

		let mut bus = BusDriver {
			gpio,
			profile,
			data_direction: DataDirection::Input,
		};
		bus.set_address(0);
		debug!("{} in {}: bus configured", bus.profile.model(), bus.profile.socket());
		bus
	}

	/// Drops the chip's pins back to input with pull-up, returns the GPIO
	/// handle.
	pub fn release(mut self) -> G {
		for &(_, pin) in self.profile.pins() {
			self.gpio.set_direction(pin, Direction::InputPullUp);
		}
		self.gpio
	}

	pub fn profile(&self) -> &ChipProfile {
		&self.profile
	}

	pub fn gpio(&self) -> &G {
		&self.gpio
	}

	pub fn gpio_mut(&mut self) -> &mut G {
		&mut self.gpio
	}

	pub fn data_direction(&self) -> DataDirection {
		self.data_direction
	}

	pub fn set_data_direction(&mut self, direction: DataDirection) {
		if direction == self.data_direction {
			return;
		}
		let pin_direction = match direction {
			DataDirection::Input => Direction::InputPullUp,
			DataDirection::Output => Direction::Output,
		};
		for &pin in self.profile.data_pins() {
			self.gpio.set_direction(pin, pin_direction);
		}
		trace!("data bus: {:?}", direction);
		self.data_direction = direction;
	}

	pub fn set_address(&mut self, address: u32) {
		let bits = bits::encode(address, self.profile.address_width());
		for (&pin, &bit) in self.profile.address_pins().iter().zip(bits.iter()) {
			self.gpio.write(pin, bit);
		}
	}

	pub fn set_data(&mut self, data: u8) {
		debug_assert_eq!(self.data_direction, DataDirection::Output);
		let bits = bits::encode(data as u32, self.profile.data_width());
		for (&pin, &bit) in self.profile.data_pins().iter().zip(bits.iter()) {
			self.gpio.write(pin, bit);
		}
	}

	pub fn read_data(&mut self) -> u8 {
		debug_assert_eq!(self.data_direction, DataDirection::Input);
		let mut bits = Vec::with_capacity(self.profile.data_width());
		for &pin in self.profile.data_pins() {
			bits.push(self.gpio.read(pin));
		}
		bits::decode(&bits, bits.len()) as u8
	}

	pub fn set_chip_enable(&mut self, asserted: bool) {
		let pin = self.profile.chip_enable_pin();
		self.gpio.write(pin, !asserted);
	}

	pub fn set_output_enable(&mut self, asserted: bool) {
		let pin = self.profile.output_enable_pin();
		self.gpio.write(pin, !asserted);
	}

	pub fn set_write_enable(&mut self, asserted: bool) {
		let pin = self.profile.write_enable_pin();
		self.gpio.write(pin, !asserted);
	}

	/// All control lines de-asserted.
	pub fn idle_control(&mut self) {
		self.set_chip_enable(false);
		self.set_output_enable(false);
		self.set_write_enable(false);
	}

	/// `None` for chips without RDY/!BUSY; otherwise `true` once the chip
	/// released the (pulled-up) line.
	pub fn read_ready(&mut self) -> Option<bool> {
		match self.profile.ready_busy_pin() {
			Some(pin) => Some(self.gpio.read(pin)),
			None => None,
		}
	}

	pub fn delay_us(&mut self, us: u32) {
		self.gpio.delay_us(us)
	}

	pub fn micros(&self) -> u64 {
		self.gpio.micros()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sim::SimulatedChip;
	use crate::wiring::WiringRegistry;

	fn bus() -> BusDriver<SimulatedChip> {
		let profile = WiringRegistry::builtin().unwrap().resolve("AT28C64", "MEGA_DIP28").unwrap();
		BusDriver::configure(SimulatedChip::new(&profile), profile)
	}

	#[test]
	fn configure_sets_pin_directions() {
		let bus = bus();
		let sim = bus.gpio();
		assert_eq!(sim.direction(36), Some(Direction::Output)); // !CE
		assert_eq!(sim.level(36), Some(true));
		assert_eq!(sim.direction(22), Some(Direction::Output)); // !WE
		assert_eq!(sim.level(22), Some(true));
		assert_eq!(sim.direction(47), Some(Direction::Output)); // A0
		assert_eq!(sim.level(47), Some(false));
		assert_eq!(sim.direction(49), Some(Direction::InputPullUp)); // IO0
		assert_eq!(sim.direction(29), Some(Direction::InputPullUp)); // !BSY
		assert_eq!(sim.direction(24), Some(Direction::InputPullUp)); // NC
		assert_eq!(bus.data_direction(), DataDirection::Input);
	}

	#[test]
	fn address_lines_follow_bit_order() {
		let mut bus = bus();
		bus.set_address(0x1001);
		let sim = bus.gpio();
		assert_eq!(sim.level(47), Some(true)); // A0
		assert_eq!(sim.level(45), Some(false)); // A1
		assert_eq!(sim.level(31), Some(true)); // A12
	}

	#[test]
	fn data_bus_direction_switch() {
		let mut bus = bus();
		bus.set_data_direction(DataDirection::Output);
		bus.set_data(0x81);
		assert_eq!(bus.gpio().direction(49), Some(Direction::Output));
		assert_eq!(bus.gpio().level(49), Some(true)); // IO0
		assert_eq!(bus.gpio().level(51), Some(false)); // IO1
		assert_eq!(bus.gpio().level(38), Some(true)); // IO7
		bus.set_data_direction(DataDirection::Input);
		assert_eq!(bus.gpio().direction(38), Some(Direction::InputPullUp));
	}

	#[test]
	fn control_lines_are_active_low() {
		let mut bus = bus();
		bus.set_chip_enable(true);
		bus.set_output_enable(true);
		assert_eq!(bus.gpio().level(36), Some(false));
		assert_eq!(bus.gpio().level(32), Some(false));
		bus.idle_control();
		assert_eq!(bus.gpio().level(36), Some(true));
		assert_eq!(bus.gpio().level(32), Some(true));
		assert_eq!(bus.read_ready(), Some(true));
	}

	#[test]
	fn release_floats_all_pins() {
		let sim = bus().release();
		assert_eq!(sim.direction(36), Some(Direction::InputPullUp));
		assert_eq!(sim.direction(47), Some(Direction::InputPullUp));
	}
}
