//! # Drawing primitives
//!
//! A [`Primitive`] is one queued drawing command. Coordinates are relative to
//! the current origin, and rectangles include both corners.

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

use crate::bitmap::{Bitmap, Glyph};
use crate::pixel::{colours, Rgb888};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// A position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Point {
	/// Column
	pub x: i16,
	/// Row
	pub y: i16,
}

/// A rectangle, including both corners.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rect {
	/// Left
	pub x1: i16,
	/// Top
	pub y1: i16,
	/// Right
	pub x2: i16,
	/// Bottom
	pub y2: i16,
}

/// Options for line and rectangle drawing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PaintOptions {
	/// Use the brush colour as the pen, and the pen as the brush
	pub swap_fg_bg: bool,
	/// Invert pixels instead of drawing in the pen colour
	pub not: bool,
}

/// Options for glyph drawing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GlyphOptions {
	/// Draw the clear bits in the brush colour, instead of skipping them
	pub fill_background: bool,
	/// Exchange pen and brush for this glyph
	pub invert: bool,
}

/// One queued drawing command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Primitive {
	/// Redraw sprites over the given area (nothing else needs refreshing)
	Refresh(Rect),
	/// Put the paint state back to how it was after `set_resolution`
	Reset,
	/// Set the pen colour
	SetPenColor(Rgb888),
	/// Set the brush colour
	SetBrushColor(Rgb888),
	/// Set one pixel in the pen colour
	SetPixel(Point),
	/// Set one pixel in the given colour
	SetPixelAt(Point, Rgb888),
	/// Move the pen
	MoveTo(Point),
	/// Draw a line from the pen position, then move the pen there
	LineTo(Point),
	/// Outline a rectangle in the pen colour
	DrawRect(Rect),
	/// Fill a rectangle in the brush colour
	FillRect(Rect),
	/// Invert every pixel in a rectangle
	InvertRect(Rect),
	/// Exchange pen and brush coloured pixels in a rectangle
	SwapFgBg(Rect),
	/// Copy a rectangle to the pen position
	CopyRect(Rect),
	/// Fill the whole viewport in the brush colour
	Clear,
	/// Scroll the scrolling region up (negative) or down (positive)
	VScroll(i16),
	/// Scroll the scrolling region left (negative) or right (positive)
	HScroll(i16),
	/// Set the area `VScroll` and `HScroll` move
	SetScrollingRegion(Rect),
	/// Set the clipping rectangle, relative to the origin
	SetClippingRect(Rect),
	/// Set the origin every other coordinate is relative to
	SetOrigin(Point),
	/// Draw a glyph in the pen colour
	DrawGlyph(Glyph),
	/// Set how glyphs are drawn
	SetGlyphOptions(GlyphOptions),
	/// Set how lines and rectangles are drawn
	SetPaintOptions(PaintOptions),
	/// Draw a bitmap with its top left corner at a point
	DrawBitmap(Point, &'static Bitmap),
	/// Take sprites off and put them back at their new positions
	RefreshSprites,
	/// Exchange the drawing and visible buffers
	SwapBuffers,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Point {
	/// Make a point.
	pub const fn new(x: i16, y: i16) -> Point {
		Point { x, y }
	}

	/// Shift by another point.
	pub const fn offset(self, by: Point) -> Point {
		Point {
			x: self.x.saturating_add(by.x),
			y: self.y.saturating_add(by.y),
		}
	}
}

impl Rect {
	/// Make a rectangle from two corners.
	pub const fn new(x1: i16, y1: i16, x2: i16, y2: i16) -> Rect {
		Rect { x1, y1, x2, y2 }
	}

	/// The rectangle covering a whole `width` x `height` area.
	pub const fn full(width: usize, height: usize) -> Rect {
		Rect {
			x1: 0,
			y1: 0,
			x2: clamp_i16(width as i32 - 1),
			y2: clamp_i16(height as i32 - 1),
		}
	}

	/// Put the corners in order, so `x1 <= x2` and `y1 <= y2`.
	pub fn normalized(self) -> Rect {
		Rect {
			x1: self.x1.min(self.x2),
			y1: self.y1.min(self.y2),
			x2: self.x1.max(self.x2),
			y2: self.y1.max(self.y2),
		}
	}

	/// Shift by a point.
	pub const fn offset(self, by: Point) -> Rect {
		Rect {
			x1: self.x1.saturating_add(by.x),
			y1: self.y1.saturating_add(by.y),
			x2: self.x2.saturating_add(by.x),
			y2: self.y2.saturating_add(by.y),
		}
	}

	/// The part of this rectangle also inside `other`.
	///
	/// Can be empty; see [`Rect::is_empty`].
	pub fn intersection(self, other: Rect) -> Rect {
		Rect {
			x1: self.x1.max(other.x1),
			y1: self.y1.max(other.y1),
			x2: self.x2.min(other.x2),
			y2: self.y2.min(other.y2),
		}
	}

	/// The smallest rectangle holding both.
	pub fn union(self, other: Rect) -> Rect {
		Rect {
			x1: self.x1.min(other.x1),
			y1: self.y1.min(other.y1),
			x2: self.x2.max(other.x2),
			y2: self.y2.max(other.y2),
		}
	}

	/// Does this rectangle hold no pixels?
	pub const fn is_empty(&self) -> bool {
		self.x2 < self.x1 || self.y2 < self.y1
	}

	/// Is a point inside?
	pub const fn contains(&self, x: i32, y: i32) -> bool {
		x >= self.x1 as i32 && x <= self.x2 as i32 && y >= self.y1 as i32 && y <= self.y2 as i32
	}

	/// Pixels across.
	pub const fn width(&self) -> i32 {
		self.x2 as i32 - self.x1 as i32 + 1
	}

	/// Pixels down.
	pub const fn height(&self) -> i32 {
		self.y2 as i32 - self.y1 as i32 + 1
	}
}

/// Saturate a coordinate into an `i16`.
pub(crate) const fn clamp_i16(value: i32) -> i16 {
	if value > i16::MAX as i32 {
		i16::MAX
	} else if value < i16::MIN as i32 {
		i16::MIN
	} else {
		value as i16
	}
}

/// Where primitives draw, and in what colours.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PaintState {
	/// Line, outline and glyph colour
	pub pen: Rgb888,
	/// Fill, clear and scroll colour
	pub brush: Rgb888,
	/// Pen position, relative to the origin
	pub position: Point,
	/// Added to every coordinate
	pub origin: Point,
	/// Clipping rectangle, relative to the origin
	pub clip: Rect,
	/// Clipping rectangle in viewport coordinates, already clamped
	pub abs_clip: Rect,
	/// The area scrolls move, in viewport coordinates
	pub scrolling_region: Rect,
	/// Line and rectangle options
	pub paint_options: PaintOptions,
	/// Glyph options
	pub glyph_options: GlyphOptions,
	width: usize,
	height: usize,
}

impl PaintState {
	/// The state after a mode change, for a `width` x `height` viewport.
	pub fn new(width: usize, height: usize) -> PaintState {
		let full = Rect::full(width, height);
		PaintState {
			pen: colours::BRIGHT_WHITE,
			brush: colours::BLACK,
			position: Point::default(),
			origin: Point::default(),
			clip: full,
			abs_clip: full,
			scrolling_region: full,
			paint_options: PaintOptions::default(),
			glyph_options: GlyphOptions::default(),
			width,
			height,
		}
	}

	/// Go back to the state after a mode change.
	pub fn reset(&mut self) {
		*self = PaintState::new(self.width, self.height);
	}

	/// The viewport this state is for.
	pub fn bounds(&self) -> Rect {
		Rect::full(self.width, self.height)
	}

	/// The colour lines are drawn in.
	pub fn actual_pen(&self) -> Rgb888 {
		if self.paint_options.swap_fg_bg {
			self.brush
		} else {
			self.pen
		}
	}

	/// The colour fills are drawn in.
	pub fn actual_brush(&self) -> Rgb888 {
		if self.paint_options.swap_fg_bg {
			self.pen
		} else {
			self.brush
		}
	}

	/// Set the clipping rectangle, relative to the origin.
	pub fn set_clip(&mut self, clip: Rect) {
		self.clip = clip;
		self.update_abs_clip();
	}

	/// Set the origin. The clipping rectangle moves with it.
	pub fn set_origin(&mut self, origin: Point) {
		self.origin = origin;
		self.update_abs_clip();
	}

	/// Set the scrolling region, clamped to the viewport.
	pub fn set_scrolling_region(&mut self, region: Rect) {
		self.scrolling_region = region.normalized().intersection(self.bounds());
	}

	fn update_abs_clip(&mut self) {
		self.abs_clip = self
			.clip
			.normalized()
			.offset(self.origin)
			.intersection(self.bounds());
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rect_geometry() {
		let r = Rect::new(10, 8, 2, 4).normalized();
		assert_eq!(r, Rect::new(2, 4, 10, 8));
		assert_eq!((r.width(), r.height()), (9, 5));
		assert!(r.contains(2, 8));
		assert!(!r.contains(11, 8));
		let i = r.intersection(Rect::new(8, 0, 20, 5));
		assert_eq!(i, Rect::new(8, 4, 10, 5));
		assert!(r.intersection(Rect::new(20, 20, 30, 30)).is_empty());
		assert_eq!(Rect::full(640, 480), Rect::new(0, 0, 639, 479));
	}

	#[test]
	fn abs_clip_follows_origin() {
		let mut s = PaintState::new(320, 240);
		s.set_clip(Rect::new(0, 0, 99, 99));
		s.set_origin(Point::new(300, 200));
		assert_eq!(s.abs_clip, Rect::new(300, 200, 319, 239));
		s.set_origin(Point::new(-50, -50));
		assert_eq!(s.abs_clip, Rect::new(0, 0, 49, 49));
		s.reset();
		assert_eq!(s.abs_clip, Rect::full(320, 240));
		assert_eq!(s.origin, Point::default());
	}

	#[test]
	fn swapped_colours() {
		let mut s = PaintState::new(8, 8);
		s.pen = colours::BRIGHT_RED;
		s.brush = colours::BLUE;
		assert_eq!(s.actual_pen(), colours::BRIGHT_RED);
		s.paint_options.swap_fg_bg = true;
		assert_eq!(s.actual_pen(), colours::BLUE);
		assert_eq!(s.actual_brush(), colours::BRIGHT_RED);
	}

	#[test]
	fn scrolling_region_is_clamped() {
		let mut s = PaintState::new(100, 50);
		s.set_scrolling_region(Rect::new(90, 40, 10, 80));
		assert_eq!(s.scrolling_region, Rect::new(10, 40, 90, 49));
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
