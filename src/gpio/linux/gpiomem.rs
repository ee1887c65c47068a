/* BCM2835/BCM2836/BCM2837 GPIO registers through /dev/gpiomem */

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::io::{
	FromRawFd,
};
use std::ptr;

use libc::{
	MAP_SHARED,
	O_CLOEXEC,
	O_RDWR,
	O_SYNC,
	PROT_READ,
	PROT_WRITE,
	c_void,
	mmap,
	munmap,
	open,
};

use crate::gpio::{
	Clock,
	Direction,
	Gpio,
	PinNo,
};

// register byte offsets
const GPFSEL0: usize = 0x00;
const GPSET0: usize = 0x1c;
const GPCLR0: usize = 0x28;
const GPLEV0: usize = 0x34;
const GPPUD: usize = 0x94;
const GPPUDCLK0: usize = 0x98;

const BLOCK_SIZE: usize = 4096;
const PIN_COUNT: PinNo = 54;

const FSEL_INPUT: u32 = 0b000;
const FSEL_OUTPUT: u32 = 0b001;

const PUD_OFF: u32 = 0b00;
const PUD_UP: u32 = 0b10;

#[derive(Debug)]
pub struct GpioMem {
	ptr: ptr::NonNull<u32>,
	clock: Clock,
	// last pull configuration per pin, avoids redoing the clocked sequence
	pull: [Option<u32>; PIN_COUNT as usize],
}

impl Drop for GpioMem {
	fn drop(&mut self) {
		unsafe {
			let res = munmap(
				self.ptr.as_ptr() as *mut c_void,
				BLOCK_SIZE,
			);
			if 0 != res {
				panic!("munmap failed: {}", io::Error::last_os_error());
			}
		}
	}
}

impl GpioMem {
	fn read_reg(&self, offset: usize) -> u32 {
		assert!(offset & 3 == 0);
		assert!(offset + 3 < BLOCK_SIZE);
		unsafe { ptr::read_volatile(self.ptr.as_ptr().add(offset / 4)) }
	}

	fn write_reg(&mut self, offset: usize, data: u32) {
		assert!(offset & 3 == 0);
		assert!(offset + 3 < BLOCK_SIZE);
		unsafe { ptr::write_volatile(self.ptr.as_ptr().add(offset / 4), data) }
	}

	fn set_function(&mut self, pin: PinNo, function: u32) {
		let offset = GPFSEL0 + 4 * (pin as usize / 10);
		let shift = (pin % 10) * 3;
		let value = self.read_reg(offset);
		self.write_reg(offset, (value & !(0b111 << shift)) | (function << shift));
	}

	// the legacy GPPUD sequence needs 150 cycles setup/hold; a microsecond is plenty
	fn set_pull(&mut self, pin: PinNo, pud: u32) {
		if self.pull[pin as usize] == Some(pud) {
			return;
		}
		let clk = GPPUDCLK0 + 4 * (pin as usize / 32);
		self.write_reg(GPPUD, pud);
		self.delay_us(1);
		self.write_reg(clk, 1 << (pin % 32));
		self.delay_us(1);
		self.write_reg(GPPUD, 0);
		self.write_reg(clk, 0);
		self.pull[pin as usize] = Some(pud);
	}
}

impl Gpio for GpioMem {
	fn set_direction(&mut self, pin: PinNo, direction: Direction) {
		assert!(pin < PIN_COUNT, "no such BCM GPIO: {}", pin);
		match direction {
			Direction::Input => {
				self.set_function(pin, FSEL_INPUT);
				self.set_pull(pin, PUD_OFF);
			},
			Direction::InputPullUp => {
				self.set_function(pin, FSEL_INPUT);
				self.set_pull(pin, PUD_UP);
			},
			Direction::Output => {
				self.set_function(pin, FSEL_OUTPUT);
			},
		}
	}

	fn write(&mut self, pin: PinNo, high: bool) {
		assert!(pin < PIN_COUNT, "no such BCM GPIO: {}", pin);
		let base = if high { GPSET0 } else { GPCLR0 };
		self.write_reg(base + 4 * (pin as usize / 32), 1 << (pin % 32));
	}

	fn read(&mut self, pin: PinNo) -> bool {
		assert!(pin < PIN_COUNT, "no such BCM GPIO: {}", pin);
		0 != (self.read_reg(GPLEV0 + 4 * (pin as usize / 32)) >> (pin % 32)) & 1
	}

	fn micros(&self) -> u64 {
		self.clock.micros()
	}
}

// TODO: exclusive open / file locking?
pub fn inner_open(path: &str) -> io::Result<GpioMem> {
	let path = CString::new(path)?;

	let fd = unsafe { open(path.as_ptr(), O_RDWR | O_CLOEXEC | O_SYNC) };
	if -1 == fd {
		return Err(io::Error::last_os_error());
	}
	// now get fd managed to prevent resource leak; the mapping outlives it
	let _f = unsafe { fs::File::from_raw_fd(fd) };

	let area = unsafe {
		mmap(
			ptr::null_mut(),
			BLOCK_SIZE,
			PROT_READ | PROT_WRITE,
			MAP_SHARED,
			fd,
			0,
		)
	};

	if area as usize == !0usize {
		return Err(io::Error::last_os_error());
	}
	match ptr::NonNull::new(area as *mut u32) {
		None => panic!("mmap shouldn't return NULL ever"),
		Some(area) => Ok(GpioMem {
			ptr: area,
			clock: Clock::new(),
			pull: [None; PIN_COUNT as usize],
		}),
	}
}
