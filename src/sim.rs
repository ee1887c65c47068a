//! Electrical model of an AT28C-style parallel EEPROM behind the `Gpio`
//! trait.
//!
//! Time is virtual: `delay_us` only advances the simulated clock, so the
//! programming cycle and all polling loops run without real delays.
//!
//! Modelled behaviour:
//! - the chip drives the data bus while !CE and !OE are low and !WE is high
//! - a rising !WE edge with !CE low and !OE high latches address and data and
//!   starts the internal write cycle; writes during the cycle are ignored
//! - during the cycle RDY/!BUSY is low and reads return the complement of
//!   bit 7 of the byte being written (data polling)
//! - undriven inputs read high when pulled up

use std::collections::HashMap;

use crate::bits;
use crate::gpio::{
	Direction,
	Gpio,
	PinNo,
};
use crate::wiring::{
	ChipProfile,
	PinRole,
};

pub struct SimulatedChip {
	roles: HashMap<PinNo, PinRole>,
	address: Vec<PinNo>,
	data: Vec<PinNo>,
	chip_enable: PinNo,
	output_enable: PinNo,
	write_enable: PinNo,
	memory: Vec<u8>,

	directions: HashMap<PinNo, Direction>,
	levels: HashMap<PinNo, bool>,

	now_us: u64,
	write_cycle_us: u32,
	busy_until: u64,
	last_write: Option<(u32, u8)>,
	stuck_busy: bool,
	status_stuck_ready: bool,

	pin_writes: usize,
	direction_changes: usize,
	completed_writes: usize,
}

impl SimulatedChip {
	/// Erased chip (all 0xff); the write cycle takes half the worst case.
	pub fn new(profile: &ChipProfile) -> Self {
		SimulatedChip {
			roles: profile.pins().iter().map(|&(role, pin)| (pin, role)).collect(),
			address: profile.address_pins().to_vec(),
			data: profile.data_pins().to_vec(),
			chip_enable: profile.chip_enable_pin(),
			output_enable: profile.output_enable_pin(),
			write_enable: profile.write_enable_pin(),
			memory: vec![0xff; profile.memory_size() as usize],
			directions: HashMap::new(),
			levels: HashMap::new(),
			now_us: 0,
			write_cycle_us: profile.write_cycle_us() / 2,
			busy_until: 0,
			last_write: None,
			stuck_busy: false,
			status_stuck_ready: false,
			pin_writes: 0,
			direction_changes: 0,
			completed_writes: 0,
		}
	}

	pub fn set_write_cycle_us(&mut self, us: u32) {
		self.write_cycle_us = us;
	}

	/// The internal write cycle never ends.
	pub fn set_stuck_busy(&mut self, stuck: bool) {
		self.stuck_busy = stuck;
	}

	/// RDY/!BUSY always reads ready, as if the busy pulse was missed.
	pub fn set_status_stuck_ready(&mut self, stuck: bool) {
		self.status_stuck_ready = stuck;
	}

	pub fn load(&mut self, offset: usize, bytes: &[u8]) {
		self.memory[offset..offset + bytes.len()].copy_from_slice(bytes);
	}

	pub fn memory(&self) -> &[u8] {
		&self.memory
	}

	pub fn direction(&self, pin: PinNo) -> Option<Direction> {
		self.directions.get(&pin).cloned()
	}

	/// Level last driven by the host.
	pub fn level(&self, pin: PinNo) -> Option<bool> {
		self.levels.get(&pin).cloned()
	}

	/// Number of level writes and direction changes so far.
	pub fn activity(&self) -> usize {
		self.pin_writes + self.direction_changes
	}

	pub fn pin_writes(&self) -> usize {
		self.pin_writes
	}

	/// Bytes latched by a !WE edge.
	pub fn completed_writes(&self) -> usize {
		self.completed_writes
	}

	pub fn is_busy(&self) -> bool {
		self.stuck_busy || self.now_us < self.busy_until
	}

	fn is_low(&self, pin: PinNo) -> bool {
		self.levels.get(&pin) == Some(&false)
	}

	fn is_host_output(&self, pin: PinNo) -> bool {
		self.directions.get(&pin) == Some(&Direction::Output)
	}

	fn bus_value(&self, pins: &[PinNo]) -> u32 {
		let bits: Vec<bool> = pins.iter()
			.map(|&pin| self.is_host_output(pin) && self.levels.get(&pin) == Some(&true))
			.collect();
		bits::decode(&bits, bits.len())
	}

	fn chip_drives_data(&self) -> bool {
		self.is_low(self.chip_enable) && self.is_low(self.output_enable) && !self.is_low(self.write_enable)
	}

	fn output_byte(&self) -> u8 {
		if self.is_busy() {
			// data polling: complement of the bit 7 being written
			let written = self.last_write.map(|(_, data)| data).unwrap_or(0xff);
			written ^ 0x80
		} else {
			self.memory[self.bus_value(&self.address) as usize]
		}
	}

	fn latch(&mut self) {
		if self.is_busy() {
			trace!("sim: write ignored while busy");
			return;
		}
		let address = self.bus_value(&self.address);
		let data = self.bus_value(&self.data) as u8;
		trace!("sim: latched 0x{:02x} at 0x{:04x}", data, address);
		self.memory[address as usize] = data;
		self.last_write = Some((address, data));
		self.busy_until = self.now_us + self.write_cycle_us as u64;
		self.completed_writes += 1;
	}

	fn pulled_up(&self, pin: PinNo) -> bool {
		self.directions.get(&pin) == Some(&Direction::InputPullUp)
	}
}

impl Gpio for SimulatedChip {
	fn set_direction(&mut self, pin: PinNo, direction: Direction) {
		self.direction_changes += 1;
		self.directions.insert(pin, direction);
	}

	fn write(&mut self, pin: PinNo, high: bool) {
		self.pin_writes += 1;
		let previous = self.levels.insert(pin, high);
		let we_rising = pin == self.write_enable && high && previous == Some(false);
		if we_rising && self.is_low(self.chip_enable) && !self.is_low(self.output_enable) {
			self.latch();
		}
	}

	fn read(&mut self, pin: PinNo) -> bool {
		if self.is_host_output(pin) {
			return self.level(pin).unwrap_or(false);
		}
		match self.roles.get(&pin) {
			Some(&PinRole::Data(n)) if self.chip_drives_data() => {
				0 != (self.output_byte() >> n) & 1
			},
			Some(&PinRole::ReadyBusy) => {
				// open drain: chip pulls low while busy
				self.status_stuck_ready || !self.is_busy()
			},
			_ => self.pulled_up(pin),
		}
	}

	fn micros(&self) -> u64 {
		self.now_us
	}

	fn delay_us(&mut self, us: u32) {
		self.now_us += us as u64;
	}
}
