//! # Bitmaps and glyphs
//!
//! Source images for `DrawBitmap`, `DrawGlyph` and sprites. The data always
//! lives somewhere else (usually flash), so these are just descriptions of a
//! borrowed byte slice.

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

use crate::pixel::{Rgb222, Rgb888};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// How the bytes of a [`Bitmap`] are laid out.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitmapFormat {
	/// One bit per pixel, MSB first, rows padded to a byte. Set bits are
	/// drawn in `foreground`, clear bits are transparent.
	Mask {
		/// Colour of the set bits
		foreground: Rgb888,
	},
	/// One byte per pixel, `AABBGGRR`. Zero alpha is transparent.
	Rgba2222,
	/// Four bytes per pixel: red, green, blue, alpha. Zero alpha is
	/// transparent.
	Rgba8888,
	/// One byte per pixel, each one a pixel value in the viewport's own
	/// format. Used for saved sprite backgrounds.
	Native,
}

/// An image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Bitmap {
	/// Pixels per row
	pub width: u16,
	/// Rows
	pub height: u16,
	/// Byte layout
	pub format: BitmapFormat,
	/// The pixels
	pub data: &'static [u8],
}

/// What one pixel of a bitmap says to do.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Source {
	/// Leave the destination alone
	Transparent,
	/// Draw this colour
	Colour(Rgb888),
	/// Store this pixel value as it is
	Native(u8),
}

/// A one bit per pixel image, for text.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Glyph {
	/// Left edge, relative to the origin
	pub x: i16,
	/// Top edge, relative to the origin
	pub y: i16,
	/// Pixels per row
	pub width: u8,
	/// Rows
	pub height: u8,
	/// Rows of bits, MSB first, each row padded to a byte
	pub data: &'static [u8],
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl BitmapFormat {
	/// Bytes in one row of `width` pixels.
	pub const fn row_bytes(&self, width: usize) -> usize {
		match self {
			BitmapFormat::Mask { .. } => (width + 7) / 8,
			BitmapFormat::Rgba2222 | BitmapFormat::Native => width,
			BitmapFormat::Rgba8888 => width * 4,
		}
	}
}

impl Bitmap {
	/// Describe an image.
	pub const fn new(width: u16, height: u16, format: BitmapFormat, data: &'static [u8]) -> Bitmap {
		Bitmap {
			width,
			height,
			format,
			data,
		}
	}

	/// Does `data` hold every pixel?
	pub fn is_complete(&self) -> bool {
		self.data.len() >= self.format.row_bytes(self.width as usize) * self.height as usize
	}

	/// Look at one pixel. Outside the image, or past the end of `data`,
	/// is transparent.
	pub fn pixel(&self, x: usize, y: usize) -> Source {
		if x >= self.width as usize || y >= self.height as usize {
			return Source::Transparent;
		}
		let row = y * self.format.row_bytes(self.width as usize);
		match self.format {
			BitmapFormat::Mask { foreground } => match self.data.get(row + x / 8) {
				Some(byte) if byte & (0x80 >> (x & 7)) != 0 => Source::Colour(foreground),
				_ => Source::Transparent,
			},
			BitmapFormat::Rgba2222 => match self.data.get(row + x) {
				Some(byte) if byte >> 6 != 0 => {
					Source::Colour(Rgb222::new(*byte, byte >> 2, byte >> 4).to_rgb888())
				}
				_ => Source::Transparent,
			},
			BitmapFormat::Rgba8888 => match self.data.get(row + x * 4..row + x * 4 + 4) {
				Some(&[red, green, blue, alpha]) if alpha != 0 => {
					Source::Colour(Rgb888::new(red, green, blue))
				}
				_ => Source::Transparent,
			},
			BitmapFormat::Native => match self.data.get(row + x) {
				Some(value) => Source::Native(*value),
				None => Source::Transparent,
			},
		}
	}
}

impl Glyph {
	/// Is the bit at (`x`, `y`) set?
	pub fn bit(&self, x: usize, y: usize) -> bool {
		if x >= self.width as usize || y >= self.height as usize {
			return false;
		}
		let row_bytes = (self.width as usize + 7) / 8;
		self.data
			.get(y * row_bytes + x / 8)
			.map(|byte| byte & (0x80 >> (x & 7)) != 0)
			.unwrap_or(false)
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pixel::colours;

	static MASK: [u8; 4] = [0b1010_0000, 0x00, 0xFF, 0b1000_0000];
	static RGBA2222: [u8; 2] = [0b11_00_00_11, 0b00_11_11_11];
	static RGBA8888: [u8; 8] = [1, 2, 3, 255, 9, 9, 9, 0];

	#[test]
	fn mask_pixels() {
		let b = Bitmap::new(
			9,
			2,
			BitmapFormat::Mask {
				foreground: colours::BRIGHT_RED,
			},
			&MASK,
		);
		assert!(b.is_complete());
		assert_eq!(b.pixel(0, 0), Source::Colour(colours::BRIGHT_RED));
		assert_eq!(b.pixel(1, 0), Source::Transparent);
		assert_eq!(b.pixel(2, 0), Source::Colour(colours::BRIGHT_RED));
		assert_eq!(b.pixel(8, 1), Source::Colour(colours::BRIGHT_RED));
		assert_eq!(b.pixel(9, 1), Source::Transparent);
	}

	#[test]
	fn rgba2222_alpha() {
		let b = Bitmap::new(2, 1, BitmapFormat::Rgba2222, &RGBA2222);
		assert_eq!(b.pixel(0, 0), Source::Colour(colours::BRIGHT_RED));
		assert_eq!(b.pixel(1, 0), Source::Transparent);
	}

	#[test]
	fn rgba8888_alpha() {
		let b = Bitmap::new(2, 1, BitmapFormat::Rgba8888, &RGBA8888);
		assert_eq!(b.pixel(0, 0), Source::Colour(Rgb888::new(1, 2, 3)));
		assert_eq!(b.pixel(1, 0), Source::Transparent);
	}

	#[test]
	fn short_data_is_transparent() {
		let b = Bitmap::new(4, 4, BitmapFormat::Native, &RGBA2222);
		assert!(!b.is_complete());
		assert_eq!(b.pixel(1, 0), Source::Native(RGBA2222[1]));
		assert_eq!(b.pixel(0, 3), Source::Transparent);
	}

	#[test]
	fn glyph_bits() {
		static DATA: [u8; 2] = [0b0100_0000, 0b1000_0000];
		let g = Glyph {
			x: 0,
			y: 0,
			width: 2,
			height: 2,
			data: &DATA,
		};
		assert!(!g.bit(0, 0));
		assert!(g.bit(1, 0));
		assert!(g.bit(0, 1));
		assert!(!g.bit(2, 1));
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
