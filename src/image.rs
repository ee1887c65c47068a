//! Whole-chip operations on top of the page API.

use failure::{
	Error,
	Fail,
};

use crate::error::ProgrammerError;
use crate::gpio::Gpio;
use crate::programmer::Programmer;
use crate::AResult;

pub const DEFAULT_PAGE_SIZE: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
#[fail(display = "verify failed at 0x{:04x}: expected 0x{:02x}, read 0x{:02x}", address, expected, actual)]
pub struct VerifyMismatch {
	pub address: u32,
	pub expected: u8,
	pub actual: u8,
}

fn chip_memory_size<G: Gpio>(programmer: &Programmer<G>) -> AResult<u32> {
	if programmer.socket().is_none() {
		return Err(ProgrammerError::PinsNotInitialized.into());
	}
	Ok(programmer.memory_size().ok_or(ProgrammerError::ChipNotInitialized)?)
}

// full pages through the page API, the remainder byte by byte
fn read_range<G: Gpio>(programmer: &mut Programmer<G>, len: usize, page_size: usize) -> AResult<Vec<u8>> {
	programmer.set_read_mode(page_size)?;

	let mut data = Vec::with_capacity(len);
	let pages = len / page_size;
	for page_no in 0..pages as u32 {
		let page = with_context!(("reading page {}", page_no),
			programmer.read_page(page_no).map_err(Error::from))?;
		data.extend_from_slice(&page);
	}
	for address in data.len() as u32..len as u32 {
		let b = with_context!(("reading 0x{:04x}", address),
			programmer.read_byte(address).map_err(Error::from))?;
		data.push(b);
	}
	Ok(data)
}

/// Reads the whole chip.
pub fn read_image<G: Gpio>(programmer: &mut Programmer<G>, page_size: usize) -> AResult<Vec<u8>> {
	let memory_size = chip_memory_size(programmer)?;
	let image = read_range(programmer, memory_size as usize, page_size)?;
	info!("read {} bytes", image.len());
	Ok(image)
}

/// Writes `data` starting at address 0; the rest of the chip is untouched.
pub fn write_image<G: Gpio>(programmer: &mut Programmer<G>, data: &[u8], page_size: usize) -> AResult<()> {
	let memory_size = chip_memory_size(programmer)?;
	ensure!(!data.is_empty(), "image is empty");
	ensure!(data.len() <= memory_size as usize,
		"image ({} bytes) is larger than the chip ({} bytes)", data.len(), memory_size);

	programmer.set_write_mode(page_size)?;

	let mut pages = data.chunks_exact(page_size);
	for (page_no, page) in pages.by_ref().enumerate() {
		let page_no = page_no as u32;
		with_context!(("writing page {}", page_no),
			programmer.write_page(page_no, page).map_err(Error::from))?;
	}
	let tail = pages.remainder();
	let tail_start = (data.len() - tail.len()) as u32;
	for (address, &b) in (tail_start..).zip(tail.iter()) {
		with_context!(("writing 0x{:04x}", address),
			programmer.write_byte(address, b).map_err(Error::from))?;
	}

	info!("wrote {} bytes (last write cycle {} us)", data.len(), programmer.write_op_wait_time_us());
	Ok(())
}

/// Fills the whole chip with `pattern`.
pub fn erase<G: Gpio>(programmer: &mut Programmer<G>, pattern: u8, page_size: usize) -> AResult<()> {
	let memory_size = chip_memory_size(programmer)?;
	debug!("erasing {} bytes with 0x{:02x}", memory_size, pattern);
	write_image(programmer, &vec![pattern; memory_size as usize], page_size)
}

/// Reads back the first `data.len()` bytes; fails with [`VerifyMismatch`] at
/// the first differing byte.
pub fn verify_image<G: Gpio>(programmer: &mut Programmer<G>, data: &[u8], page_size: usize) -> AResult<()> {
	let memory_size = chip_memory_size(programmer)?;
	ensure!(data.len() <= memory_size as usize,
		"image ({} bytes) is larger than the chip ({} bytes)", data.len(), memory_size);

	let actual = read_range(programmer, data.len(), page_size)?;
	let mismatch = data.iter().zip(actual.iter()).enumerate()
		.find(|&(_, (e, a))| e != a);
	if let Some((address, (&expected, &actual))) = mismatch {
		return Err(VerifyMismatch {
			address: address as u32,
			expected,
			actual,
		}.into());
	}
	info!("verified {} bytes", data.len());
	Ok(())
}

/// Hex dump lines of one page (`page`) or of the whole chip.
pub fn dump_pages<G: Gpio>(programmer: &mut Programmer<G>, page_size: usize, page: Option<u32>) -> AResult<Vec<String>> {
	let memory_size = chip_memory_size(programmer)?;
	programmer.set_read_mode(page_size)?;
	let pages: Vec<u32> = match page {
		Some(page_no) => vec![page_no],
		None => (0..memory_size / page_size as u32).collect(),
	};

	let mut lines = Vec::with_capacity(pages.len());
	for page_no in pages {
		let data = programmer.read_page(page_no)?;
		lines.push(format_page_dump(page_no * page_size as u32, &data));
	}
	Ok(lines)
}

fn printable(b: u8) -> char {
	if b >= 0x20 && b <= 0x7e {
		b as char
	} else {
		'.'
	}
}

/// One line of hex dump: `00000040: 4142 0020 ... AB. ...`
pub fn format_page_dump(address: u32, bytes: &[u8]) -> String {
	let mut line = format!("{:08x}: ", address);
	for (n, b) in bytes.iter().enumerate() {
		line.push_str(&format!("{:02x}", b));
		if n % 2 == 1 || n + 1 == bytes.len() {
			line.push(' ');
		}
	}
	line.extend(bytes.iter().cloned().map(printable));
	line
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sim::SimulatedChip;
	use crate::wiring::WiringRegistry;

	fn ready() -> Programmer<SimulatedChip> {
		let registry = WiringRegistry::builtin().unwrap();
		let profile = registry.resolve("AT28C64", "MEGA_DIP28").unwrap();
		let mut p = Programmer::new(SimulatedChip::new(&profile), registry);
		p.init_programmer("MEGA_DIP28").unwrap();
		p.init_chip("AT28C64").unwrap();
		p
	}

	#[test]
	fn erase_then_read() {
		let mut p = ready();
		erase(&mut p, 0x00, DEFAULT_PAGE_SIZE).unwrap();
		let image = read_image(&mut p, DEFAULT_PAGE_SIZE).unwrap();
		assert_eq!(image.len(), 8192);
		assert!(image.iter().all(|&b| b == 0x00));
	}

	#[test]
	fn write_with_tail_and_verify() {
		let mut p = ready();
		let data: Vec<u8> = (0..100u32).map(|i| (i * 7) as u8).collect();
		write_image(&mut p, &data, DEFAULT_PAGE_SIZE).unwrap();
		assert_eq!(&p.hardware().memory()[..100], &data[..]);
		assert_eq!(p.hardware().memory()[100], 0xff);
		assert_eq!(p.hardware().completed_writes(), 100);
		verify_image(&mut p, &data, DEFAULT_PAGE_SIZE).unwrap();
	}

	#[test]
	fn verify_reports_first_mismatch() {
		let mut p = ready();
		let data = vec![0x11u8; 128];
		write_image(&mut p, &data, 32).unwrap();
		p.hardware_mut().load(70, &[0x10, 0x00]);
		let err = verify_image(&mut p, &data, 32).unwrap_err();
		let mismatch = err.downcast_ref::<VerifyMismatch>().unwrap();
		assert_eq!(*mismatch, VerifyMismatch { address: 70, expected: 0x11, actual: 0x10 });
	}

	#[test]
	fn rejects_bad_images() {
		let mut p = ready();
		assert!(write_image(&mut p, &[], DEFAULT_PAGE_SIZE).is_err());
		let err = write_image(&mut p, &vec![0u8; 8193], DEFAULT_PAGE_SIZE).unwrap_err();
		assert!(err.to_string().contains("larger than the chip"), "{}", err);
		assert_eq!(p.hardware().completed_writes(), 0);
	}

	#[test]
	fn invalid_page_size_is_a_programmer_error() {
		let mut p = ready();
		let err = read_image(&mut p, 65).unwrap_err();
		assert_eq!(err.downcast_ref::<ProgrammerError>(), Some(&ProgrammerError::InvalidPageSize));
	}

	fn image_error(err: &failure::Error) -> Option<ProgrammerError> {
		err.downcast_ref::<ProgrammerError>().cloned()
	}

	#[test]
	fn needs_initialized_pins_and_chip() {
		let registry = WiringRegistry::builtin().unwrap();
		let profile = registry.resolve("AT28C64", "MEGA_DIP28").unwrap();
		let mut p = Programmer::new(SimulatedChip::new(&profile), registry);
		let err = read_image(&mut p, DEFAULT_PAGE_SIZE).unwrap_err();
		assert_eq!(image_error(&err), Some(ProgrammerError::PinsNotInitialized));
		let err = erase(&mut p, 0xff, DEFAULT_PAGE_SIZE).unwrap_err();
		assert_eq!(image_error(&err), Some(ProgrammerError::PinsNotInitialized));

		p.init_programmer("MEGA_DIP28").unwrap();
		let err = read_image(&mut p, DEFAULT_PAGE_SIZE).unwrap_err();
		assert_eq!(image_error(&err), Some(ProgrammerError::ChipNotInitialized));
		let err = verify_image(&mut p, &[0], DEFAULT_PAGE_SIZE).unwrap_err();
		assert_eq!(image_error(&err), Some(ProgrammerError::ChipNotInitialized));
	}

	#[test]
	fn dump_single_and_all_pages() {
		let mut p = ready();
		p.hardware_mut().load(16, b"hello");
		let lines = dump_pages(&mut p, 16, Some(1)).unwrap();
		assert_eq!(lines, vec![format!("00000010: 6865 6c6c 6fff {}hello{}", "ffff ".repeat(5), ".".repeat(11))]);
		assert_eq!(dump_pages(&mut p, 64, None).unwrap().len(), 8192 / 64);
	}

	#[test]
	fn dump_page_out_of_range() {
		let mut p = ready();
		for &page_no in [8192 / 64, u32::max_value()].iter() {
			let err = dump_pages(&mut p, 64, Some(page_no)).unwrap_err();
			assert_eq!(image_error(&err), Some(ProgrammerError::InvalidPageNo));
		}
	}

	#[test]
	fn page_dump_format() {
		assert_eq!(
			format_page_dump(0x40, b"AB\x00 z~\x7f\xff"),
			"00000040: 4142 0020 7a7e 7fff AB. z~..",
		);
		assert_eq!(format_page_dump(0x1000, &[0x61, 0x62, 0x63]), "00001000: 6162 63 abc");
	}
}
