//! # Serial-command panels
//!
//! Small LCD and OLED panels keep their own frame memory and are updated by
//! sending them commands over SPI or I²C. There is no descriptor chain and no
//! retrace: primitives are drawn straight into a local copy of the picture,
//! and the changed area is pushed to the panel when asked.

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

use crate::error::Error;
use crate::memory::DmaMemory;
use crate::painter::{Followup, Painter};
use crate::pixel::{colours, PixelFormat};
use crate::primitive::{PaintState, Primitive, Rect};
use crate::timing::Timing;
use crate::viewport::{allocate_viewport, Surface, Surfaces, Viewport};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Talks to one panel controller chip.
pub trait PanelDriver {
	/// Bus errors
	type Error: core::fmt::Debug;

	/// Reset and wake the panel.
	fn begin(&mut self) -> Result<(), Self::Error>;

	/// Configure the panel for a mode. Only the visible size of `timing`
	/// matters to most panels.
	fn set_resolution(
		&mut self,
		timing: &Timing,
		viewport: &Viewport,
		double_buffered: bool,
	) -> Result<(), Self::Error>;

	/// Send the pixels in `area` (viewport coordinates) from `surface`.
	fn flush(&mut self, surface: &Surface, area: Rect) -> Result<(), Self::Error>;
}

/// What went wrong driving a panel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PanelError<E> {
	/// The local frame could not be set up
	Video(Error),
	/// The panel did not accept a command
	Bus(E),
}

/// A panel, plus the local copy of its picture.
pub struct Panel<D: PanelDriver, F: PixelFormat> {
	driver: D,
	format: F,
	frame: Option<Frame>,
}

struct Frame {
	surfaces: Surfaces,
	viewport: Viewport,
	row_bytes: usize,
	state: PaintState,
	dirty: Option<Rect>,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl<E> From<Error> for PanelError<E> {
	fn from(error: Error) -> PanelError<E> {
		PanelError::Video(error)
	}
}

impl<D: PanelDriver, F: PixelFormat> Panel<D, F> {
	/// Wrap a driver. Nothing is sent until [`Panel::begin`].
	pub const fn new(driver: D, format: F) -> Panel<D, F> {
		Panel {
			driver,
			format,
			frame: None,
		}
	}

	/// Wake the panel up.
	pub fn begin(&mut self) -> Result<(), PanelError<D::Error>> {
		self.driver.begin().map_err(PanelError::Bus)
	}

	/// Set up the local frame for `timing`, using memory from `memory`, and
	/// tell the panel. Anything previously allocated from `memory` is freed.
	pub fn set_resolution<M: DmaMemory + ?Sized>(
		&mut self,
		memory: &mut M,
		timing: &Timing,
		double_buffered: bool,
	) -> Result<Viewport, PanelError<D::Error>> {
		timing.validate()?;
		self.frame = None;
		memory.free_all();
		let mut viewport = Viewport::fit(timing, 0, 0, 1);
		let row_bytes = F::row_bytes(viewport.width);
		let black = self.format.encode(colours::BLACK);
		let (surfaces, height) =
			allocate_viewport(memory, row_bytes, viewport.height, double_buffered, 1, black)?;
		viewport.height = height;
		self.driver
			.set_resolution(timing, &viewport, double_buffered)
			.map_err(PanelError::Bus)?;
		info!(
			"panel: {}x{}, double buffered {}",
			viewport.width,
			viewport.height,
			double_buffered
		);
		self.frame = Some(Frame {
			surfaces,
			viewport,
			row_bytes,
			state: PaintState::new(viewport.width, viewport.height),
			dirty: None,
		});
		Ok(viewport)
	}

	/// The current viewport, if a mode is set.
	pub fn viewport(&self) -> Option<Viewport> {
		self.frame.as_ref().map(|f| f.viewport)
	}

	/// Draw a primitive into the local frame. `SwapBuffers` sends the whole
	/// frame and then swaps.
	pub fn draw(&mut self, primitive: &Primitive) -> Result<(), PanelError<D::Error>> {
		let frame = self.frame.as_mut().ok_or(Error::NotConfigured)?;
		let touched = touched_area(primitive, &frame.state);
		// Safety: the rows belong to this panel until the next mode change
		let mut surface = unsafe { Surface::new(frame.surfaces.drawing(), frame.row_bytes) };
		let followup = Painter::new(&mut surface, &self.format, &mut frame.state).execute(primitive);
		if let Some(area) = touched {
			frame.dirty = Some(frame.dirty.map_or(area, |d| d.union(area)));
		}
		if followup == Followup::SwapBuffers {
			frame.dirty = Some(frame.state.bounds());
			self.flush()?;
			if let Some(frame) = self.frame.as_mut() {
				frame.surfaces.swap();
			}
		}
		Ok(())
	}

	/// Send whatever changed since the last flush.
	pub fn flush(&mut self) -> Result<(), PanelError<D::Error>> {
		let frame = self.frame.as_mut().ok_or(Error::NotConfigured)?;
		let Some(area) = frame.dirty.take() else {
			return Ok(());
		};
		let area = area.intersection(frame.state.bounds());
		if area.is_empty() {
			return Ok(());
		}
		// Safety: as in `draw`
		let surface = unsafe { Surface::new(frame.surfaces.drawing(), frame.row_bytes) };
		debug!("panel: flush {:?}", area);
		self.driver.flush(&surface, area).map_err(PanelError::Bus)
	}

	/// Get the driver back.
	pub fn release(self) -> D {
		self.driver
	}
}

/// The area a primitive can change, in viewport coordinates. `None` for
/// primitives that only change the paint state.
fn touched_area(primitive: &Primitive, state: &PaintState) -> Option<Rect> {
	match primitive {
		Primitive::Clear => Some(state.bounds()),
		Primitive::VScroll(_) | Primitive::HScroll(_) => Some(state.scrolling_region),
		Primitive::SetPixel(_)
		| Primitive::SetPixelAt(..)
		| Primitive::LineTo(_)
		| Primitive::DrawRect(_)
		| Primitive::FillRect(_)
		| Primitive::InvertRect(_)
		| Primitive::SwapFgBg(_)
		| Primitive::CopyRect(_)
		| Primitive::DrawGlyph(_)
		| Primitive::DrawBitmap(..) => Some(state.abs_clip),
		_ => None,
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------


// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
