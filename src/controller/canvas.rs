//! # Canvas
//!
//! The drawing side of a video controller: paint state, sprites and the pixel
//! format of the current mode. Whoever holds the canvas lock may draw.

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

use crate::error::{Error, Result};
use crate::painter::{Followup, Painter};
use crate::pixel::{indexed4::Indexed4Format, Format, PixelFormat, Rgb222, Rgb888};
use crate::primitive::{PaintState, Primitive, Rect};
use crate::sprite::Sprites;
use crate::viewport::{RowTable, Surface};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Paint state, sprites and pixel format.
pub struct Canvas {
	pub(crate) format: Option<Format>,
	pub(crate) palette: Indexed4Format,
	pub(crate) state: PaintState,
	pub(crate) sprites: Sprites,
	/// A `SwapBuffers` came off the queue too late in a batch, and runs
	/// first next time
	pub(crate) pending_swap: bool,
}

/// Where drawing goes, copied out of the scan-out state.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Target {
	pub(crate) drawing: RowTable,
	pub(crate) visible: RowTable,
	pub(crate) row_bytes: usize,
	pub(crate) double_buffered: bool,
}

/// Things that need a [`Painter`].
pub(crate) enum Job<'a> {
	Draw(&'a Primitive),
	HideSprites,
	ShowSprites,
	Read(Rect, &'a mut [Rgb222]),
	Write(Rect, &'a [Rgb888]),
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Canvas {
	/// No mode yet.
	pub(crate) fn new() -> Canvas {
		Canvas {
			format: None,
			palette: Indexed4Format::default(),
			state: PaintState::new(0, 0),
			sprites: Sprites::new(),
			pending_swap: false,
		}
	}

	/// Start again for a new viewport.
	pub(crate) fn reset(&mut self, format: Format, width: usize, height: usize) {
		self.format = Some(format);
		self.state = PaintState::new(width, height);
		for sprite in self.sprites.iter_mut() {
			sprite.forget_background();
		}
	}

	/// Forget the mode.
	pub(crate) fn clear(&mut self) {
		self.format = None;
		self.pending_swap = false;
	}

	/// Carry out a job on `target`. Reads look at the visible rows,
	/// everything else at the drawing rows.
	pub(crate) fn run(&mut self, target: &Target, job: Job<'_>) -> Result<Followup> {
		let table = match job {
			Job::Read(..) => target.visible,
			_ => target.drawing,
		};
		// Safety: the rows belong to the current mode, which cannot change
		// while the canvas is locked
		let mut surface = unsafe { Surface::new(table, target.row_bytes) };
		let double_buffered = target.double_buffered;
		match self.format.as_ref() {
			None => Err(Error::NotConfigured),
			Some(Format::Rgb222(f)) => run_job(
				&mut Painter::new(&mut surface, f, &mut self.state),
				&mut self.sprites,
				double_buffered,
				job,
			),
			Some(Format::Indexed4(f)) => run_job(
				&mut Painter::new(&mut surface, f, &mut self.state),
				&mut self.sprites,
				double_buffered,
				job,
			),
		}
	}
}

fn run_job<F: PixelFormat>(
	painter: &mut Painter<'_, F>,
	sprites: &mut Sprites,
	double_buffered: bool,
	job: Job<'_>,
) -> Result<Followup> {
	match job {
		Job::Draw(primitive) => return Ok(painter.execute(primitive)),
		Job::HideSprites => sprites.hide(painter, double_buffered),
		Job::ShowSprites => sprites.show(painter),
		Job::Read(rect, out) => {
			let rect = checked(painter, rect, out.len())?;
			let mut pixels = out.iter_mut();
			for y in rect.y1..=rect.y2 {
				for x in rect.x1..=rect.x2 {
					if let (Some(slot), Some(colour)) = (pixels.next(), painter.colour(x as i32, y as i32)) {
						*slot = colour;
					}
				}
			}
		}
		Job::Write(rect, data) => {
			let rect = checked(painter, rect, data.len())?;
			let mut pixels = data.iter();
			for y in rect.y1..=rect.y2 {
				for x in rect.x1..=rect.x2 {
					if let Some(colour) = pixels.next() {
						painter.put_colour(x as i32, y as i32, *colour);
					}
				}
			}
		}
	}
	Ok(Followup::None)
}

/// The rectangle must be inside the viewport, and `len` must cover it.
fn checked<F: PixelFormat>(painter: &Painter<'_, F>, rect: Rect, len: usize) -> Result<Rect> {
	let rect = rect.normalized();
	let bounds = painter.state().bounds();
	if rect.intersection(bounds) != rect || len < (rect.width() * rect.height()) as usize {
		return Err(Error::OutOfBounds);
	}
	Ok(rect)
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
