//! # Sprites
//!
//! Bitmaps drawn over the viewport after each batch of primitives, and taken
//! off again before the next one. Each sprite saves what was underneath it in
//! a buffer the caller provides.
//!
//! When double buffered, the drawing surface is redrawn every frame anyway,
//! so backgrounds are saved but never put back.

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

use crate::bitmap::Bitmap;
use crate::config::MAX_SPRITES;
use crate::error::{Error, Result};
use crate::painter::Painter;
use crate::pixel::PixelFormat;
use crate::primitive::Point;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// A bitmap that floats over the viewport.
#[derive(Debug)]
pub struct Sprite {
	/// What to draw
	bitmap: &'static Bitmap,
	/// Top left, in viewport coordinates
	pub position: Point,
	/// Hidden sprites are not drawn
	pub visible: bool,
	background: &'static mut [u8],
	saved: Option<Point>,
}

/// The sprites, in drawing order.
#[derive(Debug, Default)]
pub struct Sprites {
	list: heapless::Vec<Sprite, MAX_SPRITES>,
	hidden: bool,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Sprite {
	/// Make a visible sprite at the top left.
	///
	/// `background` needs a byte for every pixel of the bitmap.
	pub fn new(bitmap: &'static Bitmap, background: &'static mut [u8]) -> Result<Sprite> {
		if background.len() < bitmap.width as usize * bitmap.height as usize {
			return Err(Error::OutOfBounds);
		}
		Ok(Sprite {
			bitmap,
			position: Point::default(),
			visible: true,
			background,
			saved: None,
		})
	}

	/// Change the image. The new one cannot be bigger than the old one's
	/// background buffer.
	pub fn set_bitmap(&mut self, bitmap: &'static Bitmap) -> Result<()> {
		if self.background.len() < bitmap.width as usize * bitmap.height as usize {
			return Err(Error::OutOfBounds);
		}
		self.bitmap = bitmap;
		Ok(())
	}

	/// The image.
	pub fn bitmap(&self) -> &'static Bitmap {
		self.bitmap
	}

	/// Where the background was last saved from, if it is still held.
	pub fn saved_at(&self) -> Option<Point> {
		self.saved
	}

	/// Drop the saved background without putting it back, for when the
	/// surface underneath has gone.
	pub fn forget_background(&mut self) {
		self.saved = None;
	}

	/// Move to a new position.
	pub fn move_to(&mut self, x: i16, y: i16) {
		self.position = Point::new(x, y);
	}
}

impl Sprites {
	/// No sprites.
	pub const fn new() -> Sprites {
		Sprites {
			list: heapless::Vec::new(),
			hidden: false,
		}
	}

	/// Add a sprite on top of the others. Gives it back if the list is full.
	pub fn push(&mut self, sprite: Sprite) -> core::result::Result<(), Sprite> {
		self.list.push(sprite)
	}

	/// Swap in a new set of sprites, handing back the old ones (and their
	/// background buffers). Hide them first, or their backgrounds are lost.
	pub fn replace(
		&mut self,
		sprites: heapless::Vec<Sprite, MAX_SPRITES>,
	) -> heapless::Vec<Sprite, MAX_SPRITES> {
		core::mem::replace(&mut self.list, sprites)
	}

	/// The sprites.
	pub fn iter(&self) -> impl Iterator<Item = &Sprite> {
		self.list.iter()
	}

	/// The sprites, for moving about.
	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sprite> {
		self.list.iter_mut()
	}

	/// Number of sprites.
	pub fn len(&self) -> usize {
		self.list.len()
	}

	/// Are there no sprites?
	pub fn is_empty(&self) -> bool {
		self.list.is_empty()
	}

	/// Have the sprites been taken off the surface?
	pub fn is_hidden(&self) -> bool {
		self.hidden
	}

	/// Take the sprites off, topmost first, putting back what was
	/// underneath. Does nothing when double buffered, or already hidden.
	pub fn hide<F: PixelFormat>(&mut self, painter: &mut Painter<'_, F>, double_buffered: bool) {
		if self.hidden {
			return;
		}
		self.hidden = true;
		if double_buffered {
			return;
		}
		for sprite in self.list.iter_mut().rev() {
			if let Some(at) = sprite.saved.take() {
				let bitmap = sprite.bitmap;
				painter.restore_area(
					at,
					bitmap.width as usize,
					bitmap.height as usize,
					sprite.background,
				);
			}
		}
	}

	/// Save what is under each visible sprite, then draw it, bottom first.
	/// Does nothing unless hidden.
	pub fn show<F: PixelFormat>(&mut self, painter: &mut Painter<'_, F>) {
		if !self.hidden {
			return;
		}
		self.hidden = false;
		let bounds = painter.state().bounds();
		for sprite in self.list.iter_mut() {
			if !sprite.visible {
				sprite.saved = None;
				continue;
			}
			let bitmap = sprite.bitmap;
			painter.save_area(
				sprite.position,
				bitmap.width as usize,
				bitmap.height as usize,
				sprite.background,
			);
			painter.bitmap(sprite.position, bitmap, bounds);
			sprite.saved = Some(sprite.position);
		}
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bitmap::BitmapFormat;
	use crate::memory::{test_region, BumpPool};
	use crate::pixel::colours;
	use crate::pixel::rgb222::Rgb222Format;
	use crate::primitive::{PaintState, Primitive, Rect};
	use crate::viewport::{allocate_viewport, Surface};

	static MASK: [u8; 2] = [0b1100_0000, 0b1100_0000];
	static BLOCK: Bitmap = Bitmap::new(
		2,
		2,
		BitmapFormat::Mask {
			foreground: colours::BRIGHT_RED,
		},
		&MASK,
	);

	fn sprite(x: i16, y: i16) -> Sprite {
		let mut s = Sprite::new(&BLOCK, test_region(4)).unwrap();
		s.move_to(x, y);
		s
	}

	fn surface() -> Surface {
		let mut pool = BumpPool::new(test_region(1024));
		let (s, _) = allocate_viewport(&mut pool, 8, 8, false, 1, 0).unwrap();
		unsafe { Surface::new(s.drawing(), 8) }
	}

	#[test]
	fn background_too_small() {
		assert_eq!(
			Sprite::new(&BLOCK, test_region(3)).unwrap_err(),
			Error::OutOfBounds
		);
	}

	#[test]
	fn show_then_hide_restores() {
		let mut surf = surface();
		let format = Rgb222Format::new(0);
		let mut state = PaintState::new(8, 8);
		let mut p = Painter::new(&mut surf, &format, &mut state);
		p.put_colour(1, 1, colours::BRIGHT_WHITE);

		let mut sprites = Sprites::new();
		sprites.push(sprite(0, 0)).unwrap();
		sprites.push(sprite(1, 1)).unwrap();

		// Not hidden yet, so nothing happens
		sprites.show(&mut p);
		assert_eq!(p.pixel(0, 0), Some(0));

		sprites.hide(&mut p, false);
		sprites.show(&mut p);
		assert_eq!(p.pixel(0, 0), Some(0x03));
		assert_eq!(p.pixel(2, 2), Some(0x03));

		sprites.hide(&mut p, false);
		assert_eq!(p.pixel(0, 0), Some(0));
		assert_eq!(p.pixel(2, 2), Some(0));
		// Restored in reverse order, so the second sprite's saved copy of
		// the first sprite is undone by the first sprite's restore.
		assert_eq!(p.pixel(1, 1), Some(0x3F));
		assert!(sprites.iter().all(|s| s.saved_at().is_none()));
	}

	#[test]
	fn moved_sprite() {
		let mut surf = surface();
		let format = Rgb222Format::new(0);
		let mut state = PaintState::new(8, 8);
		let mut p = Painter::new(&mut surf, &format, &mut state);
		let mut sprites = Sprites::new();
		sprites.push(sprite(6, 6)).unwrap();
		sprites.hide(&mut p, false);
		sprites.show(&mut p);
		sprites.hide(&mut p, false);
		for s in sprites.iter_mut() {
			s.move_to(7, 0);
		}
		p.execute(&Primitive::FillRect(Rect::new(0, 0, 0, 0)));
		sprites.show(&mut p);
		assert_eq!(p.pixel(6, 6), Some(0));
		// Half off the edge
		assert_eq!(p.pixel(7, 0), Some(0x03));
		assert_eq!(p.pixel(7, 1), Some(0x03));
		assert_eq!(p.pixel(6, 0), Some(0));
	}

	#[test]
	fn invisible_and_double_buffered() {
		let mut surf = surface();
		let format = Rgb222Format::new(0);
		let mut state = PaintState::new(8, 8);
		let mut p = Painter::new(&mut surf, &format, &mut state);
		let mut sprites = Sprites::new();
		let mut s = sprite(0, 0);
		s.visible = false;
		sprites.push(s).unwrap();
		sprites.push(sprite(4, 4)).unwrap();
		sprites.hide(&mut p, true);
		sprites.show(&mut p);
		assert_eq!(p.pixel(0, 0), Some(0));
		assert_eq!(p.pixel(4, 4), Some(0x03));
		sprites.hide(&mut p, true);
		assert!(sprites.is_hidden());
		// Double buffered: not put back
		assert_eq!(p.pixel(4, 4), Some(0x03));
		assert_eq!(sprites.replace(heapless::Vec::new()).len(), 2);
		assert!(sprites.is_empty());
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
