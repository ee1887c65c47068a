use std::mem;

use crate::error::{
	PResult,
	ProgrammerError,
};
use crate::gpio::{
	Direction,
	Gpio,
};
use crate::protocol::{
	EepromProtocol,
	OperationMode,
	Timings,
};
use crate::bus::BusDriver;
use crate::wiring::{
	ChipProfile,
	SocketMapping,
	WiringRegistry,
};

pub const MAX_PAGE_SIZE: usize = 64;

/// Page size of the armed mode; pages start at multiples of the size.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PageDescriptor {
	size: u32,
}

impl PageDescriptor {
	pub fn new(size: usize) -> PResult<Self> {
		if size < 1 || size > MAX_PAGE_SIZE {
			return Err(ProgrammerError::InvalidPageSize);
		}
		Ok(PageDescriptor { size: size as u32 })
	}

	pub fn size(&self) -> usize {
		self.size as usize
	}

	pub fn page_count(&self, memory_size: u32) -> u32 {
		memory_size / self.size
	}

	pub fn start_address(&self, page_no: u32) -> u32 {
		page_no * self.size
	}

	pub fn check_page_no(&self, page_no: u32, memory_size: u32) -> PResult<()> {
		if page_no >= self.page_count(memory_size) {
			return Err(ProgrammerError::InvalidPageNo);
		}
		Ok(())
	}
}

enum Stage<G: Gpio> {
	Detached(G),
	PinsReady {
		gpio: G,
		socket: SocketMapping,
	},
	ChipReady {
		protocol: EepromProtocol<G>,
		socket: SocketMapping,
	},
	// only while switching stages
	Poisoned,
}

/// Byte and page access to one chip in one socket.
///
/// Usage: `init_programmer` (socket), `init_chip` (model), then
/// `set_read_mode`/`set_write_mode` before the matching byte or page
/// operations. Every operation validates its preconditions in that order
/// and fails without touching the hardware.
pub struct Programmer<G: Gpio> {
	registry: WiringRegistry,
	timings: Timings,
	stage: Stage<G>,
	page: Option<PageDescriptor>,
}

impl<G: Gpio> Programmer<G> {
	pub fn new(gpio: G, registry: WiringRegistry) -> Self {
		Programmer::with_timings(gpio, registry, Timings::default())
	}

	pub fn with_timings(gpio: G, registry: WiringRegistry, timings: Timings) -> Self {
		Programmer {
			registry,
			timings,
			stage: Stage::Detached(gpio),
			page: None,
		}
	}

	/// Selects the socket harness and floats all of its pins (input with
	/// pull-up).
	pub fn init_programmer(&mut self, socket: &str) -> PResult<()> {
		let socket = match self.registry.socket(socket) {
			Some(s) => s.clone(),
			None => {
				warn!("unknown socket {:?}", socket);
				return Err(ProgrammerError::InvalidWiringType);
			},
		};

		let mut gpio = match mem::replace(&mut self.stage, Stage::Poisoned) {
			Stage::Detached(gpio) | Stage::PinsReady { gpio, .. } => gpio,
			stage => {
				self.stage = stage;
				return Err(ProgrammerError::ChipAlreadyInitialized);
			},
		};
		for pin in socket.board_pins() {
			gpio.set_direction(pin, Direction::InputPullUp);
		}
		info!("socket {}: {} pins", socket.name, socket.pins.len());
		self.stage = Stage::PinsReady { gpio, socket };
		Ok(())
	}

	pub fn init_chip(&mut self, model: &str) -> PResult<()> {
		let profile = match &self.stage {
			Stage::PinsReady { socket, .. } => self.registry.resolve(model, &socket.name)?,
			Stage::ChipReady { .. } => return Err(ProgrammerError::ChipAlreadyInitialized),
			_ => return Err(ProgrammerError::PinsNotInitialized),
		};

		match mem::replace(&mut self.stage, Stage::Poisoned) {
			Stage::PinsReady { gpio, socket } => {
				info!("{} in {}: {} address lines, {} data lines, {}",
					profile.model(), socket.name, profile.address_width(), profile.data_width(),
					if profile.has_ready_busy() { "ready/busy polling" } else { "data polling" });
				let bus = BusDriver::configure(gpio, profile);
				let protocol = EepromProtocol::new(bus, self.timings);
				self.stage = Stage::ChipReady { protocol, socket };
				self.page = None;
				Ok(())
			},
			_ => unreachable!(),
		}
	}

	/// Back to the state after `init_programmer`; mode and page size reset.
	pub fn release_chip(&mut self) -> PResult<()> {
		self.protocol()?;
		match mem::replace(&mut self.stage, Stage::Poisoned) {
			Stage::ChipReady { protocol, socket } => {
				debug!("{}: released", protocol.profile().model());
				let gpio = protocol.into_bus().release();
				self.stage = Stage::PinsReady { gpio, socket };
				self.page = None;
				Ok(())
			},
			_ => unreachable!(),
		}
	}

	fn protocol(&mut self) -> PResult<&mut EepromProtocol<G>> {
		match &mut self.stage {
			Stage::ChipReady { protocol, .. } => Ok(protocol),
			Stage::PinsReady { .. } => Err(ProgrammerError::ChipNotInitialized),
			_ => Err(ProgrammerError::PinsNotInitialized),
		}
	}

	fn armed(&mut self, mode: OperationMode) -> PResult<(&mut EepromProtocol<G>, PageDescriptor)> {
		let page = self.page;
		let protocol = self.protocol()?;
		match (protocol.mode() == mode, page) {
			(true, Some(page)) => Ok((protocol, page)),
			_ => Err(match mode {
				OperationMode::ReadArmed => ProgrammerError::ReadModeDisabled,
				_ => ProgrammerError::WriteModeDisabled,
			}),
		}
	}

	fn check_address(protocol: &EepromProtocol<G>, address: u32) -> PResult<()> {
		if address >= protocol.profile().memory_size() {
			return Err(ProgrammerError::InvalidAddress);
		}
		Ok(())
	}

	pub fn set_read_mode(&mut self, page_size: usize) -> PResult<()> {
		let protocol = self.protocol()?;
		let page = PageDescriptor::new(page_size)?;
		protocol.set_read_mode();
		self.page = Some(page);
		Ok(())
	}

	pub fn set_write_mode(&mut self, page_size: usize) -> PResult<()> {
		let protocol = self.protocol()?;
		let page = PageDescriptor::new(page_size)?;
		protocol.set_write_mode();
		self.page = Some(page);
		Ok(())
	}

	pub fn read_byte(&mut self, address: u32) -> PResult<u8> {
		let (protocol, _) = self.armed(OperationMode::ReadArmed)?;
		Self::check_address(protocol, address)?;
		protocol.read_byte(address)
	}

	pub fn write_byte(&mut self, address: u32, data: u8) -> PResult<()> {
		let (protocol, _) = self.armed(OperationMode::WriteArmed)?;
		Self::check_address(protocol, address)?;
		protocol.write_byte(address, data)?;
		Ok(())
	}

	pub fn read_page(&mut self, page_no: u32) -> PResult<Vec<u8>> {
		let (protocol, page) = self.armed(OperationMode::ReadArmed)?;
		page.check_page_no(page_no, protocol.profile().memory_size())?;

		let start = page.start_address(page_no);
		let mut bytes = Vec::with_capacity(page.size());
		for address in start..start + page.size() as u32 {
			match self.read_byte(address) {
				Ok(b) => bytes.push(b),
				Err(e) => {
					error!("page {}: reading 0x{:04x} failed: {}", page_no, address, e);
					return Err(ProgrammerError::ReadFailed);
				},
			}
		}
		debug!("read page {} (0x{:04x}, {} bytes)", page_no, start, bytes.len());
		Ok(bytes)
	}

	/// `bytes` must hold exactly one page.
	pub fn write_page(&mut self, page_no: u32, bytes: &[u8]) -> PResult<()> {
		let (protocol, page) = self.armed(OperationMode::WriteArmed)?;
		if bytes.len() != page.size() {
			return Err(ProgrammerError::InvalidPageSize);
		}
		page.check_page_no(page_no, protocol.profile().memory_size())?;

		let start = page.start_address(page_no);
		for (address, &b) in (start..).zip(bytes.iter()) {
			if let Err(e) = self.write_byte(address, b) {
				error!("page {}: writing 0x{:04x} failed: {}", page_no, address, e);
				return Err(ProgrammerError::WriteFailed);
			}
		}
		debug!("wrote page {} (0x{:04x}, {} bytes)", page_no, start, bytes.len());
		Ok(())
	}

	/// Completion wait of the last byte write (0 before the first write).
	pub fn write_op_wait_time_us(&self) -> u64 {
		self.last_wait().map(|w| w.elapsed_us).unwrap_or(0)
	}

	/// Poll attempts of the last byte write; `None` if it didn't poll.
	pub fn write_op_wait_cycles(&self) -> Option<u32> {
		self.last_wait().and_then(|w| w.poll_cycles)
	}

	fn last_wait(&self) -> Option<crate::completion::WaitReport> {
		match &self.stage {
			Stage::ChipReady { protocol, .. } => protocol.last_wait(),
			_ => None,
		}
	}

	pub fn profile(&self) -> Option<&ChipProfile> {
		match &self.stage {
			Stage::ChipReady { protocol, .. } => Some(protocol.profile()),
			_ => None,
		}
	}

	pub fn socket(&self) -> Option<&SocketMapping> {
		match &self.stage {
			Stage::PinsReady { socket, .. } | Stage::ChipReady { socket, .. } => Some(socket),
			_ => None,
		}
	}

	pub fn mode(&self) -> OperationMode {
		match &self.stage {
			Stage::ChipReady { protocol, .. } => protocol.mode(),
			_ => OperationMode::Uninitialized,
		}
	}

	pub fn page_size(&self) -> Option<usize> {
		self.page.map(|p| p.size())
	}

	pub fn memory_size(&self) -> Option<u32> {
		self.profile().map(|p| p.memory_size())
	}

	pub fn registry(&self) -> &WiringRegistry {
		&self.registry
	}

	pub fn hardware(&self) -> &G {
		match &self.stage {
			Stage::Detached(gpio) | Stage::PinsReady { gpio, .. } => gpio,
			Stage::ChipReady { protocol, .. } => protocol.bus().gpio(),
			Stage::Poisoned => unreachable!(),
		}
	}

	/// Direct pin access; bypasses all bus state tracking.
	pub fn hardware_mut(&mut self) -> &mut G {
		match &mut self.stage {
			Stage::Detached(gpio) | Stage::PinsReady { gpio, .. } => gpio,
			Stage::ChipReady { protocol, .. } => protocol.bus_mut().gpio_mut(),
			Stage::Poisoned => unreachable!(),
		}
	}

	pub fn into_hardware(self) -> G {
		match self.stage {
			Stage::Detached(gpio) | Stage::PinsReady { gpio, .. } => gpio,
			Stage::ChipReady { protocol, .. } => protocol.into_bus().release(),
			Stage::Poisoned => unreachable!(),
		}
	}
}
