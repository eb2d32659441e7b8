//! # Drawing time budgets
//!
//! Queued primitives are drawn while the monitor is not looking, and the
//! consumer must stop before the next frame reaches the rows it is drawing
//! into. A [`Budget`] is how long that is, worked out from the timing once
//! per video mode. A [`Deadline`] checks a budget against a free-running
//! [`CycleCounter`].

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

use crate::config::{OutputMode, LINE_BUFFER_COUNT};
use crate::timing::Timing;
use fugit::HertzU32;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// How long the drawing task may run each frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BudgetPolicy {
	/// Only the vertical blanking interval. Slower, but never tears.
	VerticalBlank,
	/// Half of a whole frame. Faster, but drawing can be seen.
	#[default]
	HalfFrame,
}

/// Where the consumer runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsumerContext {
	/// Inside the retrace interrupt
	Interrupt,
	/// In a task released by the retrace interrupt
	Task,
}

/// A free-running counter the consumer can time itself with.
///
/// It only has to count up and wrap at `u32::MAX`.
pub trait CycleCounter {
	/// The current count.
	fn now(&self) -> u32;

	/// How fast the count goes up.
	fn frequency(&self) -> HertzU32;
}

/// How long the consumer may run for, each frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Budget {
	micros: u32,
}

/// A budget that has started running.
#[derive(Debug, Copy, Clone)]
pub struct Deadline {
	start: u32,
	ticks: u32,
	enabled: bool,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl ConsumerContext {
	/// Where the consumer runs in each output mode. Line-rendered mode always
	/// uses the task; direct mode uses `direct`.
	pub const fn for_mode(mode: OutputMode, direct: ConsumerContext) -> ConsumerContext {
		match mode {
			OutputMode::Direct => direct,
			OutputMode::LineRendered => ConsumerContext::Task,
		}
	}
}

impl Budget {
	/// A budget of exactly `micros` microseconds.
	pub const fn from_micros(micros: u32) -> Budget {
		Budget { micros }
	}

	/// Work out the budget for a video mode.
	///
	/// `viewport_row` is the first timing line the viewport occupies; lines
	/// above it are blank, so drawing can carry on over them.
	pub fn for_timing(
		timing: &Timing,
		viewport_row: usize,
		context: ConsumerContext,
		policy: BudgetPolicy,
	) -> Budget {
		let blanking = timing.v_front_porch as usize
			+ timing.v_sync as usize
			+ timing.v_back_porch as usize
			+ viewport_row;
		let micros = match (context, policy) {
			(ConsumerContext::Interrupt, _) => timing.lines_to_micros(blanking),
			(ConsumerContext::Task, BudgetPolicy::VerticalBlank) => {
				timing.lines_to_micros(LINE_BUFFER_COUNT / 2 + blanking)
			}
			(ConsumerContext::Task, BudgetPolicy::HalfFrame) => {
				timing.lines_to_micros(timing.v_total()) / 2
			}
		};
		Budget { micros }
	}

	/// The budget in microseconds.
	pub const fn micros(&self) -> u32 {
		self.micros
	}

	/// The budget in ticks of a counter running at `frequency`.
	pub fn ticks(&self, frequency: HertzU32) -> u32 {
		let ticks = self.micros as u64 * frequency.raw() as u64 / 1_000_000;
		ticks.min(u32::MAX as u64) as u32
	}
}

impl Deadline {
	/// Start the clock. A disabled deadline never expires.
	pub fn start<C: CycleCounter + ?Sized>(counter: &C, budget: Budget, enabled: bool) -> Deadline {
		Deadline {
			start: if enabled { counter.now() } else { 0 },
			ticks: budget.ticks(counter.frequency()),
			enabled,
		}
	}

	/// Ticks since the clock started.
	pub fn elapsed<C: CycleCounter + ?Sized>(&self, counter: &C) -> u32 {
		counter.now().wrapping_sub(self.start)
	}

	/// Has the budget run out?
	pub fn expired<C: CycleCounter + ?Sized>(&self, counter: &C) -> bool {
		self.enabled && self.elapsed(counter) >= self.ticks
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------


// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
