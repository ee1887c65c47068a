//! Chip pinouts, socket harnesses, and how they combine into the list of
//! board GPIO lines a chip is reached through.
//!
//! Resolution is two-stage: a chip definition maps each package pin to a
//! logical role, a socket mapping maps each package pin to a board pin. Any
//! chip can be combined with any socket of the same package.

use std::convert::TryFrom;
use std::fmt;
use std::str;

use crate::error::{
	PResult,
	ProgrammerError,
};
use crate::gpio::PinNo;

mod registry;

pub use self::registry::{
	MAX_ADDRESS_WIDTH,
	ChipDefinition,
	SocketMapping,
	WiringRegistry,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum PinRole {
	Address(u8),
	Data(u8),
	ChipEnable,
	OutputEnable,
	WriteEnable,
	ReadyBusy,
	NotConnected,
}

impl fmt::Display for PinRole {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			PinRole::Address(n) => write!(f, "A{}", n),
			PinRole::Data(n) => write!(f, "IO{}", n),
			PinRole::ChipEnable => write!(f, "CE"),
			PinRole::OutputEnable => write!(f, "OE"),
			PinRole::WriteEnable => write!(f, "WE"),
			PinRole::ReadyBusy => write!(f, "RDY"),
			PinRole::NotConnected => write!(f, "NC"),
		}
	}
}

impl str::FromStr for PinRole {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		// active-low markers are accepted but carry no meaning
		let name = s.trim().trim_start_matches('!').to_ascii_uppercase();

		let indexed = |prefix: &str| -> Option<crate::AResult<u8>> {
			if name.len() > prefix.len() && name.starts_with(prefix) {
				let index = &name[prefix.len()..];
				Some(with_context!(("invalid pin index in {:?}", s),
					index.parse::<u8>().map_err(|e| e.into())
				))
			} else {
				None
			}
		};

		Ok(match name.as_str() {
			"CE" => PinRole::ChipEnable,
			"OE" => PinRole::OutputEnable,
			"WE" => PinRole::WriteEnable,
			"RDY" | "BSY" | "RDY/BSY" => PinRole::ReadyBusy,
			"NC" => PinRole::NotConnected,
			_ => {
				if let Some(index) = indexed("IO") {
					PinRole::Data(index?)
				} else if let Some(index) = indexed("A") {
					PinRole::Address(index?)
				} else {
					bail!("unknown pin role: {:?}", s);
				}
			},
		})
	}
}

impl TryFrom<String> for PinRole {
	type Error = ::failure::Error;

	fn try_from(s: String) -> Result<Self, Self::Error> {
		s.parse()
	}
}

/// A chip wired into a socket: every logical pin resolved to a board pin.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChipProfile {
	model: String,
	socket: String,
	write_cycle_us: u32,
	// ordered by role: address bus, data bus, control, status, NC
	pins: Vec<(PinRole, PinNo)>,
	address: Vec<PinNo>,
	data: Vec<PinNo>,
	chip_enable: PinNo,
	output_enable: PinNo,
	write_enable: PinNo,
	ready_busy: Option<PinNo>,
	not_connected: Vec<PinNo>,
}

impl ChipProfile {
	pub fn model(&self) -> &str {
		&self.model
	}

	pub fn socket(&self) -> &str {
		&self.socket
	}

	pub fn address_width(&self) -> usize {
		self.address.len()
	}

	pub fn data_width(&self) -> usize {
		self.data.len()
	}

	pub fn has_ready_busy(&self) -> bool {
		self.ready_busy.is_some()
	}

	/// Worst-case duration of the internal programming cycle.
	pub fn write_cycle_us(&self) -> u32 {
		self.write_cycle_us
	}

	pub fn memory_size(&self) -> u32 {
		1u32 << self.address.len()
	}

	pub fn pins(&self) -> &[(PinRole, PinNo)] {
		&self.pins
	}

	pub fn pin(&self, role: PinRole) -> Option<PinNo> {
		self.pins.iter().find(|&&(r, _)| r == role).map(|&(_, p)| p)
	}

	/// A0 first
	pub fn address_pins(&self) -> &[PinNo] {
		&self.address
	}

	/// IO0 first
	pub fn data_pins(&self) -> &[PinNo] {
		&self.data
	}

	pub fn chip_enable_pin(&self) -> PinNo {
		self.chip_enable
	}

	pub fn output_enable_pin(&self) -> PinNo {
		self.output_enable
	}

	pub fn write_enable_pin(&self) -> PinNo {
		self.write_enable
	}

	pub fn ready_busy_pin(&self) -> Option<PinNo> {
		self.ready_busy
	}

	pub fn not_connected_pins(&self) -> &[PinNo] {
		&self.not_connected
	}
}

/// Compose a (validated) chip definition with a socket mapping.
pub fn resolve(chip: &ChipDefinition, socket: &SocketMapping) -> PResult<ChipProfile> {
	if chip.package != socket.package {
		debug!("{} ({}) doesn't fit into socket {} ({})", chip.name, chip.package, socket.name, socket.package);
		return Err(ProgrammerError::ChipNotSupported);
	}

	let mut pins = Vec::with_capacity(chip.pins.len());
	for (package_pin, &role) in chip.pins.iter() {
		match socket.pins.get(package_pin) {
			Some(&board_pin) => pins.push((role, board_pin)),
			None => {
				debug!("{}: pin {} ({}) not wired in socket {}", chip.name, package_pin, role, socket.name);
				return Err(ProgrammerError::ChipNotSupported);
			},
		}
	}
	pins.sort();

	let select = |f: fn(PinRole) -> bool| -> Vec<PinNo> {
		pins.iter().filter(|&&(r, _)| f(r)).map(|&(_, p)| p).collect()
	};
	let address = select(|r| match r { PinRole::Address(_) => true, _ => false });
	let data = select(|r| match r { PinRole::Data(_) => true, _ => false });
	let not_connected = select(|r| r == PinRole::NotConnected);
	let control = |role: PinRole| -> PResult<PinNo> {
		pins.iter().find(|&&(r, _)| r == role).map(|&(_, p)| p).ok_or(ProgrammerError::ChipNotSupported)
	};

	Ok(ChipProfile {
		model: chip.name.clone(),
		socket: socket.name.clone(),
		write_cycle_us: chip.write_cycle_us,
		address,
		data,
		chip_enable: control(PinRole::ChipEnable)?,
		output_enable: control(PinRole::OutputEnable)?,
		write_enable: control(PinRole::WriteEnable)?,
		ready_busy: control(PinRole::ReadyBusy).ok(),
		not_connected,
		pins,
	})
}
