//! # Direct RGB222 pixels
//!
//! One byte per pixel, and that byte is exactly what goes out of the pins:
//! colour in the low six bits and the idle sync levels in the top two. The
//! DMA chain can therefore point straight at viewport rows.

// -----------------------------------------------------------------------------
// Licence Statement
// -----------------------------------------------------------------------------
// Copyright (c) Jonathan 'theJPster' Pallant and the Neotron Developers, 2021
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.
// -----------------------------------------------------------------------------

// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

use super::{PixelFormat, Rgb222, Rgb888};
use crate::timing::{Timing, SYNC_MASK};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Finished output samples.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Rgb222Format {
	/// Sync levels outside the sync pulses, OR'd into every pixel
	sync_bits: u8,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Rgb222Format {
	/// Use the given idle sync bits.
	pub const fn new(sync_bits: u8) -> Rgb222Format {
		Rgb222Format {
			sync_bits: sync_bits & SYNC_MASK,
		}
	}

	/// The idle sync bits for a timing.
	pub const fn for_timing(timing: &Timing) -> Rgb222Format {
		Rgb222Format::new(timing.sync_bits(false, false))
	}

	/// The sync bits OR'd into every pixel.
	pub const fn sync_bits(&self) -> u8 {
		self.sync_bits
	}
}

impl PixelFormat for Rgb222Format {
	fn row_bytes(width: usize) -> usize {
		width
	}

	fn encode(&self, colour: Rgb888) -> u8 {
		Rgb222::from(colour).bits() | self.sync_bits
	}

	fn decode(&self, pixel: u8) -> Rgb222 {
		Rgb222::from_sample(pixel)
	}

	fn get(row: &[u8], x: usize) -> u8 {
		row[x]
	}

	fn set(row: &mut [u8], x: usize, pixel: u8) {
		row[x] = pixel;
	}

	/// Inverts the colour but leaves the sync levels alone.
	fn invert(&self, pixel: u8) -> u8 {
		!(pixel ^ SYNC_MASK)
	}

	fn fill(row: &mut [u8], x0: usize, x1: usize, pixel: u8) {
		row[x0..x1].fill(pixel);
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pixel::colours;

	#[test]
	fn encode_carries_sync_bits() {
		let f = Rgb222Format::new(SYNC_MASK);
		assert_eq!(f.encode(colours::BLACK), 0xC0);
		assert_eq!(f.encode(colours::BRIGHT_WHITE), 0xFF);
		assert_eq!(f.decode(0xC0 | 0x21), Rgb222::new(1, 0, 2));
		let f = Rgb222Format::new(0);
		assert_eq!(f.encode(colours::BRIGHT_BLUE), 0x30);
	}

	#[test]
	fn invert_keeps_sync() {
		let f = Rgb222Format::new(SYNC_MASK);
		let black = f.encode(colours::BLACK);
		let white = f.invert(black);
		assert_eq!(white, 0xFF);
		assert_eq!(f.invert(white), black);
		let f = Rgb222Format::new(0x40);
		assert_eq!(f.invert(0x40 | 0x05), 0x40 | 0x3A);
	}

	#[test]
	fn fill_range() {
		let mut row = [0u8; 8];
		Rgb222Format::fill(&mut row, 2, 5, 7);
		assert_eq!(row, [0, 0, 7, 7, 7, 0, 0, 0]);
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
