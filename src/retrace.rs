//! # Retrace handling
//!
//! The scan-out peripheral runs on its own; the only thing software ever sees
//! of it is an interrupt each time it finishes a descriptor flagged `EOF`.
//! This module turns those interrupts into a small state machine and keeps
//! the [`ScanlineState`] that scanline functions use.
//!
//! In direct output mode there is one interrupt per frame, at the start of
//! the vertical front porch. In line-rendered mode there is one every
//! `LINE_BUFFER_COUNT / 2` viewport rows, and each of them asks for the next
//! batch of rows to be expanded into the line ring.

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

use crate::chain::Flags;
use crate::config::{OutputMode, LINE_BUFFER_COUNT, PALETTE_SIZE};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Where the scan-out is, as far as software knows.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RetracePhase {
	/// No video mode, or the peripheral is stopped
	Idle,
	/// A chain is running and the next frame has nothing pending
	ArmedForNextFrame,
	/// Visible rows are being streamed (line-rendered mode only)
	StreamingVisibleArea,
	/// Vertical blanking; drawing may run
	StreamingBlanking,
}

/// Per-frame scan-out counters, mutated only on the interrupt path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanlineState {
	/// Viewport rows streamed since the frame started
	pub line: u16,
	/// Frames since the mode was set
	pub frame: u32,
	/// Field parity, flips every frame
	pub field: u8,
	/// Colour subcarrier phase at `line`
	pub subcarrier_phase: u16,
}

/// How the colour subcarrier phase moves from line to line.
///
/// Only composite-style scanline functions care about this. VGA output uses
/// [`Subcarrier::NONE`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Subcarrier {
	/// Phase advance per line
	pub step: u16,
	/// Phase wraps at this value
	pub period: u16,
}

/// What a scanline function gets to work with.
pub struct ScanlineContext<'a> {
	/// Scan-out counters at the time of the call
	pub state: &'a ScanlineState,
	/// The viewport row being expanded
	pub y: usize,
	/// Output sample for each palette index
	pub samples: &'a [u8; PALETTE_SIZE],
}

/// Expands one viewport row into output samples.
///
/// This runs in interrupt context, so it is a plain function pointer.
pub type ScanlineFn = fn(&ScanlineContext<'_>, &[u8], &mut [u8]);

/// What the interrupt handler should do about a descriptor it was told of.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RetraceEvent {
	/// Nothing
	Ignored,
	/// Vertical blanking started. Run the consumer.
	VerticalBlank,
	/// Expand `count` viewport rows starting at `row` into the line ring.
	RenderLines {
		/// First viewport row
		row: usize,
		/// How many rows (wrapping at the viewport height)
		count: usize,
		/// The last visible row has now been rendered; release the
		/// primitive task
		release: bool,
	},
}

/// The retrace state machine.
#[derive(Debug, Clone)]
pub struct Retrace {
	phase: RetracePhase,
	state: ScanlineState,
	subcarrier: Subcarrier,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl ScanlineState {
	/// All zeros.
	pub const fn new() -> ScanlineState {
		ScanlineState {
			line: 0,
			frame: 0,
			field: 0,
			subcarrier_phase: 0,
		}
	}

	/// Go back to line zero, and count a new frame.
	pub fn new_frame(&mut self) {
		self.line = 0;
		self.subcarrier_phase = 0;
		self.frame = self.frame.wrapping_add(1);
		self.field ^= 1;
	}

	/// Move on by `lines` rows.
	pub fn advance(&mut self, lines: usize, subcarrier: Subcarrier) {
		self.line = self.line.wrapping_add(lines as u16);
		if subcarrier.period > 1 {
			let step = (subcarrier.step as u32 * lines as u32) % subcarrier.period as u32;
			let phase = (self.subcarrier_phase as u32 + step) % subcarrier.period as u32;
			self.subcarrier_phase = phase as u16;
		}
	}
}

impl Subcarrier {
	/// No subcarrier.
	pub const NONE: Subcarrier = Subcarrier { step: 0, period: 1 };

	/// Advance `step` per line, wrapping at `period`.
	pub const fn new(step: u16, period: u16) -> Subcarrier {
		Subcarrier { step, period }
	}
}

impl Retrace {
	/// An idle state machine.
	pub const fn new(subcarrier: Subcarrier) -> Retrace {
		Retrace {
			phase: RetracePhase::Idle,
			state: ScanlineState::new(),
			subcarrier,
		}
	}

	/// Where we think the scan-out is.
	pub fn phase(&self) -> RetracePhase {
		self.phase
	}

	/// The scan-out counters.
	pub fn state(&self) -> &ScanlineState {
		&self.state
	}

	/// A chain has just been started.
	pub fn arm(&mut self) {
		self.state = ScanlineState::new();
		self.phase = RetracePhase::ArmedForNextFrame;
	}

	/// The peripheral has been stopped.
	pub fn stop(&mut self) {
		self.phase = RetracePhase::Idle;
	}

	/// The consumer finished with this blanking interval.
	pub fn blanking_done(&mut self) {
		if self.phase == RetracePhase::StreamingBlanking {
			self.phase = RetracePhase::ArmedForNextFrame;
		}
	}

	/// Handle an interrupt for a descriptor carrying `flags`.
	///
	/// `height` is the viewport height in rows; it must be a non-zero
	/// multiple of `LINE_BUFFER_COUNT` in line-rendered mode.
	pub fn on_node(&mut self, flags: Flags, mode: OutputMode, height: usize) -> RetraceEvent {
		if self.phase == RetracePhase::Idle || !flags.contains(Flags::EOF) {
			return RetraceEvent::Ignored;
		}
		match mode {
			OutputMode::Direct => {
				self.state.new_frame();
				self.phase = RetracePhase::StreamingBlanking;
				RetraceEvent::VerticalBlank
			}
			OutputMode::LineRendered => {
				if height == 0 {
					return RetraceEvent::Ignored;
				}
				if flags.contains(Flags::FRAME_START) {
					self.state.new_frame();
					self.phase = RetracePhase::StreamingVisibleArea;
				}
				let count = LINE_BUFFER_COUNT / 2;
				let row = (self.state.line as usize + count) % height;
				self.state.advance(count, self.subcarrier);
				let release = row + count >= height;
				if release {
					self.phase = RetracePhase::StreamingBlanking;
				}
				RetraceEvent::RenderLines {
					row,
					count,
					release,
				}
			}
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
	fn idle_ignores_everything() {
		let mut r = Retrace::new(Subcarrier::NONE);
		assert_eq!(r.phase(), RetracePhase::Idle);
		assert_eq!(
			r.on_node(Flags::EOF, OutputMode::Direct, 480),
			RetraceEvent::Ignored
		);
	}

	#[test]
	fn direct_mode_cycle() {
		let mut r = Retrace::new(Subcarrier::NONE);
		r.arm();
		assert_eq!(r.phase(), RetracePhase::ArmedForNextFrame);
		assert_eq!(
			r.on_node(Flags::NONE, OutputMode::Direct, 480),
			RetraceEvent::Ignored
		);
		assert_eq!(
			r.on_node(Flags::EOF, OutputMode::Direct, 480),
			RetraceEvent::VerticalBlank
		);
		assert_eq!(r.phase(), RetracePhase::StreamingBlanking);
		assert_eq!(r.state().frame, 1);
		assert_eq!(r.state().field, 1);
		r.blanking_done();
		assert_eq!(r.phase(), RetracePhase::ArmedForNextFrame);
		r.on_node(Flags::EOF, OutputMode::Direct, 480);
		assert_eq!(r.state().field, 0);
		r.stop();
		assert_eq!(r.phase(), RetracePhase::Idle);
	}

	#[test]
	fn line_mode_batches() {
		let height = 8;
		let mut r = Retrace::new(Subcarrier::NONE);
		r.arm();
		let start = Flags::EOF | Flags::FRAME_START;
		// Row 0 streamed: render rows 2 and 3
		assert_eq!(
			r.on_node(start, OutputMode::LineRendered, height),
			RetraceEvent::RenderLines {
				row: 2,
				count: 2,
				release: false
			}
		);
		assert_eq!(r.phase(), RetracePhase::StreamingVisibleArea);
		assert_eq!(
			r.on_node(Flags::EOF, OutputMode::LineRendered, height),
			RetraceEvent::RenderLines {
				row: 4,
				count: 2,
				release: false
			}
		);
		// Rows 6 and 7 are the last visible ones
		assert_eq!(
			r.on_node(Flags::EOF, OutputMode::LineRendered, height),
			RetraceEvent::RenderLines {
				row: 6,
				count: 2,
				release: true
			}
		);
		assert_eq!(r.phase(), RetracePhase::StreamingBlanking);
		// Then the top of the next frame is prepared
		assert_eq!(
			r.on_node(Flags::EOF, OutputMode::LineRendered, height),
			RetraceEvent::RenderLines {
				row: 0,
				count: 2,
				release: false
			}
		);
		r.on_node(start, OutputMode::LineRendered, height);
		assert_eq!(r.state().line, 2);
		assert_eq!(r.state().frame, 2);
	}

	#[test]
	fn subcarrier_wraps() {
		let mut s = ScanlineState::new();
		let sc = Subcarrier::new(3, 4);
		s.advance(1, sc);
		assert_eq!(s.subcarrier_phase, 3);
		s.advance(2, sc);
		assert_eq!(s.subcarrier_phase, 1);
		s.advance(2, Subcarrier::NONE);
		assert_eq!(s.subcarrier_phase, 1);
		assert_eq!(s.line, 5);
		s.new_frame();
		assert_eq!((s.line, s.subcarrier_phase, s.frame), (0, 0, 1));
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
