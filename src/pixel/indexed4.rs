//! # 16-colour palette pixels
//!
//! Two pixels per byte, first pixel in the high nibble. The viewport is only
//! half the size of an RGB222 one, but it cannot be streamed directly: the
//! retrace interrupt expands rows into line buffers with
//! [`render_scanline`] just before the DMA engine reaches them.

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
use crate::config::PALETTE_SIZE;
use crate::retrace::ScanlineContext;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Palette indices, two per byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Indexed4Format {
	palette: [Rgb222; PALETTE_SIZE],
}

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// The power-on palette, in the usual PC text-mode order.
pub const DEFAULT_PALETTE: [Rgb222; PALETTE_SIZE] = [
	Rgb222::new(0, 0, 0),
	Rgb222::new(0, 0, 2),
	Rgb222::new(0, 2, 0),
	Rgb222::new(0, 2, 2),
	Rgb222::new(2, 0, 0),
	Rgb222::new(2, 0, 2),
	Rgb222::new(2, 2, 0),
	Rgb222::new(2, 2, 2),
	Rgb222::new(1, 1, 1),
	Rgb222::new(0, 0, 3),
	Rgb222::new(0, 3, 0),
	Rgb222::new(0, 3, 3),
	Rgb222::new(3, 0, 0),
	Rgb222::new(3, 0, 3),
	Rgb222::new(3, 3, 0),
	Rgb222::new(3, 3, 3),
];

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Indexed4Format {
	/// Use the given palette.
	pub const fn new(palette: [Rgb222; PALETTE_SIZE]) -> Indexed4Format {
		Indexed4Format { palette }
	}

	/// The palette.
	pub const fn palette(&self) -> &[Rgb222; PALETTE_SIZE] {
		&self.palette
	}

	/// Change one palette entry. Out of range indices are ignored.
	pub fn set_palette_item(&mut self, index: usize, colour: Rgb888) {
		if let Some(entry) = self.palette.get_mut(index) {
			*entry = Rgb222::from(colour);
		}
	}

	/// The output sample for every palette entry, with the idle sync bits.
	pub fn samples(&self, sync_bits: u8) -> [u8; PALETTE_SIZE] {
		let mut samples = [0u8; PALETTE_SIZE];
		for (sample, colour) in samples.iter_mut().zip(self.palette.iter()) {
			*sample = colour.bits() | sync_bits;
		}
		samples
	}
}

impl Default for Indexed4Format {
	fn default() -> Indexed4Format {
		Indexed4Format::new(DEFAULT_PALETTE)
	}
}

impl PixelFormat for Indexed4Format {
	fn row_bytes(width: usize) -> usize {
		(width + 1) / 2
	}

	/// Picks the nearest palette entry. Ties go to the lowest index.
	fn encode(&self, colour: Rgb888) -> u8 {
		let wanted = Rgb222::from(colour);
		let mut best = 0;
		let mut best_distance = u8::MAX;
		for (idx, entry) in self.palette.iter().enumerate() {
			let distance = entry.distance(wanted);
			if distance < best_distance {
				best = idx;
				best_distance = distance;
				if distance == 0 {
					break;
				}
			}
		}
		best as u8
	}

	fn decode(&self, pixel: u8) -> Rgb222 {
		self.palette[(pixel & 0x0F) as usize]
	}

	fn get(row: &[u8], x: usize) -> u8 {
		let byte = row[x / 2];
		if x & 1 == 0 {
			byte >> 4
		} else {
			byte & 0x0F
		}
	}

	fn set(row: &mut [u8], x: usize, pixel: u8) {
		let byte = &mut row[x / 2];
		if x & 1 == 0 {
			*byte = (*byte & 0x0F) | (pixel << 4);
		} else {
			*byte = (*byte & 0xF0) | (pixel & 0x0F);
		}
	}

	fn invert(&self, pixel: u8) -> u8 {
		!pixel & 0x0F
	}
}

/// Expand one row of palette indices into output samples.
///
/// This is the default scanline function for line-rendered output. It runs
/// in interrupt context, so it only does table lookups.
pub fn render_scanline(ctx: &ScanlineContext<'_>, row: &[u8], out: &mut [u8]) {
	let half = out.len() / 2;
	let mut pairs = out.chunks_exact_mut(2);
	for (pair, byte) in (&mut pairs).zip(row.iter()) {
		pair[0] = ctx.samples[(byte >> 4) as usize];
		pair[1] = ctx.samples[(byte & 0x0F) as usize];
	}
	if let Some(last) = pairs.into_remainder().first_mut() {
		if let Some(byte) = row.get(half) {
			*last = ctx.samples[(byte >> 4) as usize];
		}
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pixel::colours;
	use crate::retrace::ScanlineState;

	#[test]
	fn nibbles() {
		let mut row = [0u8; 2];
		Indexed4Format::set(&mut row, 0, 0xA);
		Indexed4Format::set(&mut row, 1, 0x5);
		Indexed4Format::set(&mut row, 3, 0xF);
		assert_eq!(row, [0xA5, 0x0F]);
		assert_eq!(Indexed4Format::get(&row, 0), 0xA);
		assert_eq!(Indexed4Format::get(&row, 1), 0x5);
		assert_eq!(Indexed4Format::get(&row, 2), 0x0);
		assert_eq!(Indexed4Format::row_bytes(5), 3);
	}

	#[test]
	fn nearest_colour() {
		let f = Indexed4Format::default();
		assert_eq!(f.encode(colours::BLACK), 0);
		assert_eq!(f.encode(colours::BRIGHT_WHITE), 15);
		assert_eq!(f.encode(colours::BRIGHT_RED), 12);
		assert_eq!(f.decode(12), Rgb222::new(3, 0, 0));
		assert_eq!(f.invert(0), 15);
		assert_eq!(f.invert(12), 3);
	}

	#[test]
	fn palette_update() {
		let mut f = Indexed4Format::default();
		f.set_palette_item(1, colours::BRIGHT_MAGENTA);
		f.set_palette_item(99, colours::BRIGHT_MAGENTA);
		assert_eq!(f.palette()[1], Rgb222::new(3, 0, 3));
		assert_eq!(f.samples(0xC0)[1], 0xC0 | 0x33);
	}

	#[test]
	fn scanline_expansion() {
		let f = Indexed4Format::default();
		let samples = f.samples(0xC0);
		let state = ScanlineState::new();
		let ctx = ScanlineContext {
			state: &state,
			y: 0,
			samples: &samples,
		};
		let row = [0x0F, 0xC1, 0x20];
		let mut out = [0u8; 5];
		render_scanline(&ctx, &row, &mut out);
		assert_eq!(
			out,
			[samples[0], samples[15], samples[12], samples[1], samples[2]]
		);
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
