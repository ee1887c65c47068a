//! Conversion between integers and the bit sequences driven onto (or sampled
//! from) a parallel bus.
//!
//! Bit order is least significant bit first: `bits[i]` belongs to bus line
//! `i` (`A{i}` or `IO{i}`), on the address and the data bus alike.

pub const MAX_WIDTH: usize = 32;

fn mask(width: usize) -> u32 {
	if width >= 32 { !0u32 } else { (1u32 << width) - 1 }
}

/// `value` is masked to `width` bits; bits above the bus width are dropped.
pub fn encode(value: u32, width: usize) -> Vec<bool> {
	assert!(width >= 1 && width <= MAX_WIDTH, "invalid bus width: {}", width);
	let value = value & mask(width);
	(0..width).map(|bit| 0 != (value >> bit) & 1).collect()
}

/// Only the first `width` entries of `bits` are used.
pub fn decode(bits: &[bool], width: usize) -> u32 {
	assert!(width >= 1 && width <= MAX_WIDTH, "invalid bus width: {}", width);
	assert!(bits.len() >= width, "got {} bits for a {}-bit bus", bits.len(), width);
	let mut result = 0u32;
	for bit in (0..width).rev() {
		result = (result << 1) | (bits[bit] as u32);
	}
	result
}

/// Highest address line first, i.e. the reversal of `encode`; A0 is the
/// last character.
pub fn address_to_binary_string(address: u32, width: usize) -> String {
	encode(address, width).iter().rev()
		.map(|&b| if b { '1' } else { '0' })
		.collect()
}

pub fn address_to_hex_string(address: u32) -> String {
	format!("{:08x}", address)
}

pub fn data_to_hex_string(data: u8) -> String {
	format!("{:02x}", data)
}
