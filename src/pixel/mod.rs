//! # Pixels and colours
//!
//! Drawing code works in [`Rgb888`] colours. A [`PixelFormat`] turns those
//! into the bytes stored in a viewport row, and reads them back again. Two
//! formats exist: [`rgb222::Rgb222Format`] stores finished output samples
//! (colour plus sync levels) and [`indexed4::Indexed4Format`] stores 4-bit
//! palette indices, two per byte.

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
// Sub-modules
// -----------------------------------------------------------------------------

pub mod indexed4;
pub mod rgb222;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// A 24-bit colour, as the drawing API sees it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb888 {
	/// Red, 0..=255
	pub red: u8,
	/// Green, 0..=255
	pub green: u8,
	/// Blue, 0..=255
	pub blue: u8,
}

/// Represents a 6-bit colour value, as it appears on the output pins.
///
/// Each channel has two bits. Red is in bits 0..=1, green in 2..=3 and blue
/// in 4..=5, leaving the top two bits of an output sample for the sync
/// signals.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb222(u8);

/// Turns colours into row bytes and back.
///
/// Every pixel value fits in a `u8`: a whole output sample for direct
/// formats, a palette index for indexed ones.
pub trait PixelFormat {
	/// Bytes needed to store a row of `width` pixels.
	fn row_bytes(width: usize) -> usize;

	/// The pixel value that best represents `colour`.
	fn encode(&self, colour: Rgb888) -> u8;

	/// The colour a pixel value will show as.
	fn decode(&self, pixel: u8) -> Rgb222;

	/// Read pixel `x` from a row.
	fn get(row: &[u8], x: usize) -> u8;

	/// Write pixel `x` in a row.
	fn set(row: &mut [u8], x: usize, pixel: u8);

	/// The inverse of a pixel value, as used by `InvertRect`.
	fn invert(&self, pixel: u8) -> u8;

	/// Set pixels `x0..x1` in a row.
	fn fill(row: &mut [u8], x0: usize, x1: usize, pixel: u8) {
		for x in x0..x1 {
			Self::set(row, x, pixel);
		}
	}
}

/// The pixel format of the current video mode, picked at run time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Format {
	/// Finished samples, one byte per pixel
	Rgb222(rgb222::Rgb222Format),
	/// Palette indices, two pixels per byte
	Indexed4(indexed4::Indexed4Format),
}

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// Some handy colours
pub mod colours {
	use super::Rgb888;

	/// Black
	pub const BLACK: Rgb888 = Rgb888::new(0, 0, 0);
	/// Dark blue
	pub const BLUE: Rgb888 = Rgb888::new(0, 0, 128);
	/// Dark green
	pub const GREEN: Rgb888 = Rgb888::new(0, 128, 0);
	/// Dark cyan
	pub const CYAN: Rgb888 = Rgb888::new(0, 128, 128);
	/// Dark red
	pub const RED: Rgb888 = Rgb888::new(128, 0, 0);
	/// Dark magenta
	pub const MAGENTA: Rgb888 = Rgb888::new(128, 0, 128);
	/// Dark yellow
	pub const YELLOW: Rgb888 = Rgb888::new(128, 128, 0);
	/// Light grey
	pub const WHITE: Rgb888 = Rgb888::new(128, 128, 128);
	/// Dark grey
	pub const BRIGHT_BLACK: Rgb888 = Rgb888::new(64, 64, 64);
	/// Blue
	pub const BRIGHT_BLUE: Rgb888 = Rgb888::new(0, 0, 255);
	/// Green
	pub const BRIGHT_GREEN: Rgb888 = Rgb888::new(0, 255, 0);
	/// Cyan
	pub const BRIGHT_CYAN: Rgb888 = Rgb888::new(0, 255, 255);
	/// Red
	pub const BRIGHT_RED: Rgb888 = Rgb888::new(255, 0, 0);
	/// Magenta
	pub const BRIGHT_MAGENTA: Rgb888 = Rgb888::new(255, 0, 255);
	/// Yellow
	pub const BRIGHT_YELLOW: Rgb888 = Rgb888::new(255, 255, 0);
	/// White
	pub const BRIGHT_WHITE: Rgb888 = Rgb888::new(255, 255, 255);
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Rgb888 {
	/// Make a colour from 8-bit red, green and blue values.
	pub const fn new(red: u8, green: u8, blue: u8) -> Rgb888 {
		Rgb888 { red, green, blue }
	}
}

impl Rgb222 {
	/// Make a colour from 2-bit red, green and blue values.
	pub const fn new(red: u8, green: u8, blue: u8) -> Rgb222 {
		Rgb222((red & 3) | ((green & 3) << 2) | ((blue & 3) << 4))
	}

	/// Keep the colour bits of an output sample.
	pub const fn from_sample(sample: u8) -> Rgb222 {
		Rgb222(sample & 0x3F)
	}

	/// Reduce an 8-bit per channel colour.
	pub const fn from_rgb888(colour: Rgb888) -> Rgb222 {
		Rgb222::new(colour.red >> 6, colour.green >> 6, colour.blue >> 6)
	}

	/// Expand to 8 bits per channel.
	pub const fn to_rgb888(self) -> Rgb888 {
		// 0, 85, 170, 255
		Rgb888::new(self.red() * 85, self.green() * 85, self.blue() * 85)
	}

	/// Red, 0..=3
	pub const fn red(self) -> u8 {
		self.0 & 3
	}

	/// Green, 0..=3
	pub const fn green(self) -> u8 {
		(self.0 >> 2) & 3
	}

	/// Blue, 0..=3
	pub const fn blue(self) -> u8 {
		(self.0 >> 4) & 3
	}

	/// The colour bits of an output sample.
	pub const fn bits(self) -> u8 {
		self.0
	}

	/// Squared distance between two colours.
	pub const fn distance(self, other: Rgb222) -> u8 {
		let dr = self.red().abs_diff(other.red());
		let dg = self.green().abs_diff(other.green());
		let db = self.blue().abs_diff(other.blue());
		dr * dr + dg * dg + db * db
	}
}

impl From<Rgb888> for Rgb222 {
	fn from(colour: Rgb888) -> Rgb222 {
		Rgb222::from_rgb888(colour)
	}
}

impl Format {
	/// Bytes in one row of `width` pixels.
	pub fn row_bytes(&self, width: usize) -> usize {
		match self {
			Format::Rgb222(_) => <rgb222::Rgb222Format as PixelFormat>::row_bytes(width),
			Format::Indexed4(_) => <indexed4::Indexed4Format as PixelFormat>::row_bytes(width),
		}
	}

	/// The colour of a pixel in a row.
	pub fn decode_at(&self, row: &[u8], x: usize) -> Rgb222 {
		match self {
			Format::Rgb222(f) => f.decode(rgb222::Rgb222Format::get(row, x)),
			Format::Indexed4(f) => f.decode(indexed4::Indexed4Format::get(row, x)),
		}
	}

	/// Store a colour into a row.
	pub fn encode_at(&self, row: &mut [u8], x: usize, colour: Rgb888) {
		match self {
			Format::Rgb222(f) => rgb222::Rgb222Format::set(row, x, f.encode(colour)),
			Format::Indexed4(f) => indexed4::Indexed4Format::set(row, x, f.encode(colour)),
		}
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rgb222_packing() {
		let c = Rgb222::new(1, 2, 3);
		assert_eq!(c.bits(), 0b11_10_01);
		assert_eq!((c.red(), c.green(), c.blue()), (1, 2, 3));
		assert_eq!(Rgb222::from(colours::BRIGHT_RED), Rgb222::new(3, 0, 0));
		assert_eq!(Rgb222::from_sample(0xC0 | 0x15), Rgb222(0x15));
		assert_eq!(Rgb222::new(3, 3, 3).to_rgb888(), colours::BRIGHT_WHITE);
	}

	#[test]
	fn distance() {
		assert_eq!(Rgb222::new(0, 0, 0).distance(Rgb222::new(3, 3, 3)), 27);
		assert_eq!(Rgb222::new(2, 1, 0).distance(Rgb222::new(2, 1, 0)), 0);
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
