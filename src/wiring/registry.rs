use std::collections::{
	BTreeMap,
	BTreeSet,
	HashMap,
};
use std::fs::File;
use std::io::{
	self,
	BufReader,
};
use std::path::Path;

use serde::Deserialize;

use super::{
	ChipProfile,
	PinRole,
	resolve,
};
use crate::error::{
	PResult,
	ProgrammerError,
};
use crate::gpio::PinNo;

const BUILTIN: &str = include_str!("builtin.yaml");

// memory size (2^width bytes) has to fit into a u32
pub const MAX_ADDRESS_WIDTH: usize = 31;

/// Package pin -> role for one chip model.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct ChipDefinition {
	pub name: String,
	pub package: String,
	pub write_cycle_us: u32,
	pub pins: BTreeMap<u8, PinRole>,
}

/// Package pin -> board pin for one socket harness.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct SocketMapping {
	pub name: String,
	pub package: String,
	pub pins: BTreeMap<u8, PinNo>,
}

#[derive(Deserialize)]
struct WiringFile {
	#[serde(default)]
	chips: Vec<ChipDefinition>,
	#[serde(default)]
	sockets: Vec<SocketMapping>,
}

// "DIP28" -> 28
fn package_pin_count(package: &str) -> crate::AResult<u8> {
	let digits = package.trim_start_matches(|c: char| !c.is_ascii_digit());
	ensure!(!digits.is_empty(), "package {:?} doesn't end in a pin count", package);
	with_context!(("invalid pin count in package {:?}", package),
		Ok(digits.parse::<u8>()?)
	)
}

fn check_bus(name: &str, bus: &str, indices: &BTreeSet<u8>, max: usize) -> crate::AResult<()> {
	ensure!(!indices.is_empty(), "{}: no {} bus pins", name, bus);
	ensure!(indices.len() <= max, "{}: {} bus wider than {} bits", name, bus, max);
	// BTreeSet iterates in order, so contiguous means it ends at len - 1
	let last = *indices.iter().next_back().unwrap_or(&0) as usize;
	ensure!(last + 1 == indices.len(), "{}: {} bus lines are not numbered 0..{}", name, bus, indices.len());
	Ok(())
}

impl ChipDefinition {
	pub fn validate(&self) -> crate::AResult<()> {
		let pin_count = package_pin_count(&self.package)?;
		ensure!(self.write_cycle_us > 0, "{}: write cycle time must not be zero", self.name);

		let mut address = BTreeSet::new();
		let mut data = BTreeSet::new();
		let mut single = BTreeSet::new();
		for (&package_pin, &role) in self.pins.iter() {
			ensure!(package_pin >= 1 && package_pin <= pin_count,
				"{}: pin {} outside of package {}", self.name, package_pin, self.package);
			let unique = match role {
				PinRole::Address(n) => address.insert(n),
				PinRole::Data(n) => data.insert(n),
				PinRole::NotConnected => true,
				_ => single.insert(role),
			};
			ensure!(unique, "{}: role {} assigned to more than one pin", self.name, role);
		}
		check_bus(&self.name, "address", &address, MAX_ADDRESS_WIDTH)?;
		check_bus(&self.name, "data", &data, 8)?;
		for &role in [PinRole::ChipEnable, PinRole::OutputEnable, PinRole::WriteEnable].iter() {
			ensure!(single.contains(&role), "{}: missing {} pin", self.name, role);
		}
		Ok(())
	}
}

impl SocketMapping {
	pub fn validate(&self) -> crate::AResult<()> {
		let pin_count = package_pin_count(&self.package)?;
		let mut seen = BTreeSet::new();
		for (&package_pin, &board_pin) in self.pins.iter() {
			ensure!(package_pin >= 1 && package_pin <= pin_count,
				"{}: pin {} outside of package {}", self.name, package_pin, self.package);
			ensure!(seen.insert(board_pin), "{}: board pin {} wired twice", self.name, board_pin);
		}
		Ok(())
	}

	/// Every board pin of the harness, in package pin order.
	pub fn board_pins(&self) -> Vec<PinNo> {
		self.pins.values().cloned().collect()
	}
}

/// Known chips and sockets, keyed by upper-case name.
///
/// Filled once at startup (built-in definitions plus optional files); lookups
/// never modify it.
#[derive(Clone, Default, Debug)]
pub struct WiringRegistry {
	chips: HashMap<String, ChipDefinition>,
	sockets: HashMap<String, SocketMapping>,
}

impl WiringRegistry {
	pub fn new() -> Self {
		WiringRegistry::default()
	}

	pub fn builtin() -> crate::AResult<Self> {
		let mut registry = WiringRegistry::new();
		with_context!("built-in wiring definitions", registry.load_str(BUILTIN))?;
		Ok(registry)
	}

	/// Adds all chips and sockets of a YAML document; existing entries with
	/// the same name are replaced. Nothing is added if any entry is invalid.
	pub fn load_yaml<R: io::Read>(&mut self, reader: R) -> crate::AResult<()> {
		let file: WiringFile = serde_yaml::from_reader(reader)?;
		self.add(file)
	}

	pub fn load_str(&mut self, definition: &str) -> crate::AResult<()> {
		let file: WiringFile = serde_yaml::from_str(definition)?;
		self.add(file)
	}

	pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> crate::AResult<()> {
		let path = path.as_ref();
		with_context!(("couldn't load wiring file {:?}", path), {
			let reader = BufReader::new(File::open(path)?);
			self.load_yaml(reader)
		})
	}

	fn add(&mut self, file: WiringFile) -> crate::AResult<()> {
		for chip in file.chips.iter() {
			chip.validate()?;
		}
		for socket in file.sockets.iter() {
			socket.validate()?;
		}
		for chip in file.chips {
			debug!("chip {} ({}, {} pins)", chip.name, chip.package, chip.pins.len());
			self.chips.insert(chip.name.to_ascii_uppercase(), chip);
		}
		for socket in file.sockets {
			debug!("socket {} ({}, {} pins)", socket.name, socket.package, socket.pins.len());
			self.sockets.insert(socket.name.to_ascii_uppercase(), socket);
		}
		Ok(())
	}

	pub fn chip(&self, name: &str) -> Option<&ChipDefinition> {
		self.chips.get(&name.trim().to_ascii_uppercase())
	}

	pub fn socket(&self, name: &str) -> Option<&SocketMapping> {
		self.sockets.get(&name.trim().to_ascii_uppercase())
	}

	pub fn chip_names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.chips.values().map(|c| c.name.as_str()).collect();
		names.sort();
		names
	}

	pub fn socket_names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.sockets.values().map(|s| s.name.as_str()).collect();
		names.sort();
		names
	}

	pub fn resolve(&self, chip: &str, socket: &str) -> PResult<ChipProfile> {
		let chip = self.chip(chip).ok_or(ProgrammerError::ChipNotSupported)?;
		let socket = self.socket(socket).ok_or(ProgrammerError::ChipNotSupported)?;
		resolve(chip, socket)
	}
}
