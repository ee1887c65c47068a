use failure::Fail;

/// Result codes of the programmer facade.
///
/// Every precondition is checked before touching the hardware, so an error
/// means nothing was driven on the bus (page operations abort at the first
/// failing byte).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Fail)]
pub enum ProgrammerError {
	#[fail(display = "invalid wiring type")]
	InvalidWiringType,
	#[fail(display = "pins not initialized")]
	PinsNotInitialized,
	#[fail(display = "chip not supported")]
	ChipNotSupported,
	#[fail(display = "chip already initialized")]
	ChipAlreadyInitialized,
	#[fail(display = "chip not initialized")]
	ChipNotInitialized,
	#[fail(display = "invalid page size")]
	InvalidPageSize,
	#[fail(display = "invalid page number")]
	InvalidPageNo,
	#[fail(display = "invalid address")]
	InvalidAddress,
	#[fail(display = "read mode disabled")]
	ReadModeDisabled,
	#[fail(display = "read failed")]
	ReadFailed,
	#[fail(display = "write mode disabled")]
	WriteModeDisabled,
	#[fail(display = "write failed")]
	WriteFailed,
}

impl ProgrammerError {
	/// Numeric code as reported to host tools.
	pub fn code(&self) -> i32 {
		match self {
			ProgrammerError::InvalidWiringType => 11,
			ProgrammerError::PinsNotInitialized => 12,
			ProgrammerError::ChipNotSupported => 21,
			ProgrammerError::ChipAlreadyInitialized => 22,
			ProgrammerError::ChipNotInitialized => 23,
			ProgrammerError::InvalidPageSize => 31,
			ProgrammerError::InvalidPageNo => 32,
			ProgrammerError::InvalidAddress => 33,
			ProgrammerError::ReadModeDisabled => 41,
			ProgrammerError::ReadFailed => 42,
			ProgrammerError::WriteModeDisabled => 51,
			ProgrammerError::WriteFailed => 52,
		}
	}
}

pub type PResult<T> = Result<T, ProgrammerError>;
