//! # Painter
//!
//! Carries out [`Primitive`]s on a [`Surface`], in some [`PixelFormat`].
//!
//! Everything is clipped: either to the absolute clipping rectangle in the
//! [`PaintState`], or (for `Clear`, scrolling and sprites) to the viewport.

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

use crate::bitmap::{Bitmap, Glyph, Source};
use crate::pixel::{PixelFormat, Rgb222, Rgb888};
use crate::primitive::{PaintState, Point, Primitive, Rect};
use crate::viewport::Surface;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Draws into one surface.
pub struct Painter<'a, F: PixelFormat> {
	surface: &'a mut Surface,
	format: &'a F,
	state: &'a mut PaintState,
}

/// Work a primitive leaves for whoever owns the buffers and sprites.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Followup {
	/// Nothing more to do
	None,
	/// Exchange the drawing and visible buffers
	SwapBuffers,
	/// Take the sprites off and put them back
	RefreshSprites,
	/// Sprites over this rectangle need redrawing
	Refresh(Rect),
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl<'a, F: PixelFormat> Painter<'a, F> {
	/// Draw onto `surface` with the given state.
	pub fn new(surface: &'a mut Surface, format: &'a F, state: &'a mut PaintState) -> Painter<'a, F> {
		Painter {
			surface,
			format,
			state,
		}
	}

	/// The paint state.
	pub fn state(&self) -> &PaintState {
		self.state
	}

	/// Carry out one primitive.
	pub fn execute(&mut self, primitive: &Primitive) -> Followup {
		match *primitive {
			Primitive::Refresh(rect) => return Followup::Refresh(rect),
			Primitive::Reset => self.state.reset(),
			Primitive::SetPenColor(colour) => self.state.pen = colour,
			Primitive::SetBrushColor(colour) => self.state.brush = colour,
			Primitive::SetPixel(p) => {
				let p = p.offset(self.state.origin);
				let value = self.format.encode(self.state.actual_pen());
				self.plot(p.x as i32, p.y as i32, value);
			}
			Primitive::SetPixelAt(p, colour) => {
				let p = p.offset(self.state.origin);
				let value = self.format.encode(colour);
				self.plot(p.x as i32, p.y as i32, value);
			}
			Primitive::MoveTo(p) => self.state.position = p.offset(self.state.origin),
			Primitive::LineTo(p) => {
				let to = p.offset(self.state.origin);
				let from = self.state.position;
				self.line(from, to);
				self.state.position = to;
			}
			Primitive::DrawRect(rect) => self.draw_rect(rect),
			Primitive::FillRect(rect) => {
				let rect = rect.normalized().offset(self.state.origin);
				let value = self.format.encode(self.state.actual_brush());
				self.fill(rect, value, self.state.abs_clip);
			}
			Primitive::InvertRect(rect) => self.invert_rect(rect),
			Primitive::SwapFgBg(rect) => self.swap_fg_bg(rect),
			Primitive::CopyRect(rect) => self.copy_rect(rect),
			Primitive::Clear => {
				let value = self.format.encode(self.state.brush);
				let bounds = self.state.bounds();
				self.fill(bounds, value, bounds);
			}
			Primitive::VScroll(delta) => self.vscroll(delta as i32),
			Primitive::HScroll(delta) => self.hscroll(delta as i32),
			Primitive::SetScrollingRegion(rect) => self.state.set_scrolling_region(rect),
			Primitive::SetClippingRect(rect) => self.state.set_clip(rect),
			Primitive::SetOrigin(p) => self.state.set_origin(p),
			Primitive::DrawGlyph(glyph) => self.glyph(&glyph),
			Primitive::SetGlyphOptions(options) => self.state.glyph_options = options,
			Primitive::SetPaintOptions(options) => self.state.paint_options = options,
			Primitive::DrawBitmap(p, bitmap) => {
				let p = p.offset(self.state.origin);
				self.bitmap(p, bitmap, self.state.abs_clip);
			}
			Primitive::RefreshSprites => return Followup::RefreshSprites,
			Primitive::SwapBuffers => return Followup::SwapBuffers,
		}
		Followup::None
	}

	/// Read a pixel value, in viewport coordinates.
	pub fn pixel(&self, x: i32, y: i32) -> Option<u8> {
		if !self.state.bounds().contains(x, y) {
			return None;
		}
		self.surface.row(y as usize).map(|row| F::get(row, x as usize))
	}

	/// Read a pixel's colour, in viewport coordinates.
	pub fn colour(&self, x: i32, y: i32) -> Option<Rgb222> {
		self.pixel(x, y).map(|p| self.format.decode(p))
	}

	/// Write a colour, in viewport coordinates, ignoring the clipping
	/// rectangle.
	pub fn put_colour(&mut self, x: i32, y: i32, colour: Rgb888) {
		let value = self.format.encode(colour);
		self.store(x, y, value, self.state.bounds());
	}

	/// Copy the pixels under a `width` x `height` area into `buffer`, one
	/// pixel value per byte. Pixels outside the viewport are skipped.
	pub fn save_area(&self, at: Point, width: usize, height: usize, buffer: &mut [u8]) {
		for dy in 0..height {
			for dx in 0..width {
				let x = at.x as i32 + dx as i32;
				let y = at.y as i32 + dy as i32;
				if let (Some(value), Some(slot)) = (self.pixel(x, y), buffer.get_mut(dy * width + dx)) {
					*slot = value;
				}
			}
		}
	}

	/// Put back an area taken by [`Painter::save_area`].
	pub fn restore_area(&mut self, at: Point, width: usize, height: usize, buffer: &[u8]) {
		let bounds = self.state.bounds();
		for dy in 0..height {
			for dx in 0..width {
				if let Some(value) = buffer.get(dy * width + dx) {
					self.store(at.x as i32 + dx as i32, at.y as i32 + dy as i32, *value, bounds);
				}
			}
		}
	}

	/// Draw a bitmap with its top left at `at`, in viewport coordinates.
	pub fn bitmap(&mut self, at: Point, bitmap: &Bitmap, clip: Rect) {
		for y in 0..bitmap.height as usize {
			for x in 0..bitmap.width as usize {
				let value = match bitmap.pixel(x, y) {
					Source::Transparent => continue,
					Source::Colour(colour) => self.format.encode(colour),
					Source::Native(value) => value,
				};
				self.store(at.x as i32 + x as i32, at.y as i32 + y as i32, value, clip);
			}
		}
	}

	/// Write through the clipping rectangle, honouring the `not` option.
	fn plot(&mut self, x: i32, y: i32, value: u8) {
		let clip = self.state.abs_clip;
		if self.state.paint_options.not {
			if let Some(old) = self.pixel(x, y) {
				let inverted = self.format.invert(old);
				self.store(x, y, inverted, clip);
			}
		} else {
			self.store(x, y, value, clip);
		}
	}

	fn store(&mut self, x: i32, y: i32, value: u8, clip: Rect) {
		if !clip.contains(x, y) || !self.state.bounds().contains(x, y) {
			return;
		}
		if let Some(row) = self.surface.row_mut(y as usize) {
			F::set(row, x as usize, value);
		}
	}

	/// Bresenham, both ends included.
	fn line(&mut self, from: Point, to: Point) {
		let value = self.format.encode(self.state.actual_pen());
		let (mut x, mut y) = (from.x as i32, from.y as i32);
		let (x1, y1) = (to.x as i32, to.y as i32);
		let dx = (x1 - x).abs();
		let dy = -(y1 - y).abs();
		let sx = if x < x1 { 1 } else { -1 };
		let sy = if y < y1 { 1 } else { -1 };
		let mut err = dx + dy;
		loop {
			self.plot(x, y, value);
			if x == x1 && y == y1 {
				break;
			}
			let e2 = 2 * err;
			if e2 >= dy {
				err += dy;
				x += sx;
			}
			if e2 <= dx {
				err += dx;
				y += sy;
			}
		}
	}

	fn draw_rect(&mut self, rect: Rect) {
		let r = rect.normalized().offset(self.state.origin);
		self.line(Point::new(r.x1, r.y1), Point::new(r.x2, r.y1));
		if r.y2 != r.y1 {
			self.line(Point::new(r.x1, r.y2), Point::new(r.x2, r.y2));
		}
		// Sides without the corners, so `not` inverts each pixel once
		if r.y2 - r.y1 > 1 {
			for x in [r.x1, r.x2] {
				self.line(Point::new(x, r.y1 + 1), Point::new(x, r.y2 - 1));
				if r.x1 == r.x2 {
					break;
				}
			}
		}
	}

	/// Fill `rect` (viewport coordinates) with a pixel value.
	fn fill(&mut self, rect: Rect, value: u8, clip: Rect) {
		let r = rect.intersection(clip).intersection(self.state.bounds());
		if r.is_empty() {
			return;
		}
		for y in r.y1..=r.y2 {
			if let Some(row) = self.surface.row_mut(y as usize) {
				F::fill(row, r.x1 as usize, r.x2 as usize + 1, value);
			}
		}
	}

	fn invert_rect(&mut self, rect: Rect) {
		let r = rect
			.normalized()
			.offset(self.state.origin)
			.intersection(self.state.abs_clip);
		if r.is_empty() {
			return;
		}
		for y in r.y1..=r.y2 {
			if let Some(row) = self.surface.row_mut(y as usize) {
				for x in r.x1 as usize..=r.x2 as usize {
					let inverted = self.format.invert(F::get(row, x));
					F::set(row, x, inverted);
				}
			}
		}
	}

	fn swap_fg_bg(&mut self, rect: Rect) {
		let pen = self.format.encode(self.state.pen);
		let brush = self.format.encode(self.state.brush);
		let r = rect
			.normalized()
			.offset(self.state.origin)
			.intersection(self.state.abs_clip);
		if r.is_empty() || pen == brush {
			return;
		}
		for y in r.y1..=r.y2 {
			if let Some(row) = self.surface.row_mut(y as usize) {
				for x in r.x1 as usize..=r.x2 as usize {
					let old = F::get(row, x);
					if old == pen {
						F::set(row, x, brush);
					} else if old == brush {
						F::set(row, x, pen);
					}
				}
			}
		}
	}

	/// Copy `source` (relative to the origin) so its top left lands on the
	/// pen position. Overlapping areas copy correctly.
	fn copy_rect(&mut self, source: Rect) {
		let src = source.normalized().offset(self.state.origin);
		let dst = self.state.position;
		let dx = dst.x as i32 - src.x1 as i32;
		let dy = dst.y as i32 - src.y1 as i32;
		let clip = self.state.abs_clip;
		let (w, h) = (src.width(), src.height());
		for j in 0..h {
			let j = if dy > 0 { h - 1 - j } else { j };
			for i in 0..w {
				let i = if dy == 0 && dx > 0 { w - 1 - i } else { i };
				let (sx, sy) = (src.x1 as i32 + i, src.y1 as i32 + j);
				if let Some(value) = self.pixel(sx, sy) {
					self.store(sx + dx, sy + dy, value, clip);
				}
			}
		}
	}

	/// Move the scrolling region down (positive) or up (negative).
	fn vscroll(&mut self, delta: i32) {
		let r = self.state.scrolling_region;
		if delta == 0 || r.is_empty() {
			return;
		}
		let fill = self.format.encode(self.state.brush);
		let n = delta.abs().min(r.height());
		let whole_rows = r.x1 == 0 && r.width() as usize == self.state.bounds().width() as usize;
		let rows = r.height() - n;
		for k in 0..rows {
			let (src, dst) = if delta < 0 {
				(r.y1 as i32 + n + k, r.y1 as i32 + k)
			} else {
				(r.y2 as i32 - n - k, r.y2 as i32 - k)
			};
			if whole_rows {
				self.surface.copy_row(src as usize, dst as usize);
			} else {
				for x in r.x1 as i32..=r.x2 as i32 {
					if let Some(value) = self.pixel(x, src) {
						self.store(x, dst, value, r);
					}
				}
			}
		}
		let uncovered = if delta < 0 {
			Rect::new(r.x1, r.y2 - (n - 1) as i16, r.x2, r.y2)
		} else {
			Rect::new(r.x1, r.y1, r.x2, r.y1 + (n - 1) as i16)
		};
		self.fill(uncovered, fill, r);
	}

	/// Move the scrolling region right (positive) or left (negative).
	fn hscroll(&mut self, delta: i32) {
		let r = self.state.scrolling_region;
		if delta == 0 || r.is_empty() {
			return;
		}
		let fill = self.format.encode(self.state.brush);
		let n = delta.abs().min(r.width());
		let (x1, x2) = (r.x1 as usize, r.x2 as usize);
		let n_us = n as usize;
		for y in r.y1..=r.y2 {
			if let Some(row) = self.surface.row_mut(y as usize) {
				if delta > 0 {
					for x in (x1 + n_us..=x2).rev() {
						let value = F::get(row, x - n_us);
						F::set(row, x, value);
					}
					F::fill(row, x1, x1 + n_us, fill);
				} else {
					for x in x1..x2 + 1 - n_us {
						let value = F::get(row, x + n_us);
						F::set(row, x, value);
					}
					F::fill(row, x2 + 1 - n_us, x2 + 1, fill);
				}
			}
		}
	}

	fn glyph(&mut self, glyph: &Glyph) {
		let at = Point::new(glyph.x, glyph.y).offset(self.state.origin);
		let (mut fg, mut bg) = (self.state.actual_pen(), self.state.actual_brush());
		if self.state.glyph_options.invert {
			core::mem::swap(&mut fg, &mut bg);
		}
		let (fg, bg) = (self.format.encode(fg), self.format.encode(bg));
		let fill_background = self.state.glyph_options.fill_background;
		let clip = self.state.abs_clip;
		for y in 0..glyph.height as usize {
			for x in 0..glyph.width as usize {
				let (px, py) = (at.x as i32 + x as i32, at.y as i32 + y as i32);
				if glyph.bit(x, y) {
					self.store(px, py, fg, clip);
				} else if fill_background {
					self.store(px, py, bg, clip);
				}
			}
		}
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------


// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
