//! # Configuration
//!
//! Compile-time limits, and the run-time [`Config`] a
//! [`VideoController`](crate::controller::VideoController) is created with.

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

use crate::retrace::{ScanlineFn, Subcarrier};
use crate::scheduler::{BudgetPolicy, ConsumerContext};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// How pixels get from the viewport to the output peripheral.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputMode {
	/// Viewport rows hold finished samples (RGB222 plus sync) and the DMA
	/// chain points straight at them. Drawing runs during vertical blanking,
	/// in the retrace interrupt unless [`Config::direct_consumer`] says
	/// otherwise.
	Direct,
	/// Viewport rows hold 4-bit palette indices. The interrupt expands a few
	/// rows at a time into a small ring of line buffers, and drawing runs in
	/// a task released once per frame.
	LineRendered,
}

/// Run-time settings for a video controller.
#[derive(Copy, Clone)]
pub struct Config {
	/// Where samples come from
	pub output_mode: OutputMode,
	/// How long the drawing task may run each frame
	pub budget_policy: BudgetPolicy,
	/// Queue primitives for the retrace consumer, rather than drawing them
	/// immediately in the caller
	pub background_execution: bool,
	/// Stop draining the queue when the frame budget runs out
	pub background_timeout: bool,
	/// Where the queue is drained in direct mode: inside the retrace
	/// interrupt, or in [`VideoController::run_primitive_task`] once the
	/// interrupt has seen vertical blanking
	///
	/// [`VideoController::run_primitive_task`]: crate::VideoController::run_primitive_task
	pub direct_consumer: ConsumerContext,
	/// Expands one viewport row into output samples (line-rendered mode)
	pub scanline_fn: ScanlineFn,
	/// Colour subcarrier phase advance per line
	pub subcarrier: Subcarrier,
}

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// How many separate allocations the viewport rows may be split across.
pub const VIEWPORT_MEMORY_POOL_COUNT: usize = 4;

/// DMA-capable allocations are aligned to this many bytes.
pub const DMA_ALIGN: usize = 4;

/// Viewport width and placement are multiples of this many samples.
pub const VIEWPORT_QUANTUM: usize = 4;

/// Line buffers in the ring used by line-rendered mode. Half of them are
/// rendered on each interrupt while the DMA streams the other half.
pub const LINE_BUFFER_COUNT: usize = 4;

/// Suggested primitive queue depth.
pub const DEFAULT_QUEUE_SIZE: usize = 128;

/// Most sprites a controller tracks.
pub const MAX_SPRITES: usize = 16;

/// Entries in the line-rendered palette.
pub const PALETTE_SIZE: usize = 16;

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Config {
	/// The default settings: direct output, half-frame budget, queued drawing
	/// with the timeout enabled.
	pub const fn new() -> Config {
		Config {
			output_mode: OutputMode::Direct,
			budget_policy: BudgetPolicy::HalfFrame,
			background_execution: true,
			background_timeout: true,
			direct_consumer: ConsumerContext::Interrupt,
			scanline_fn: crate::pixel::indexed4::render_scanline,
			subcarrier: Subcarrier::NONE,
		}
	}

	/// Change the output mode.
	pub const fn with_output_mode(mut self, output_mode: OutputMode) -> Config {
		self.output_mode = output_mode;
		self
	}

	/// Change the drawing budget policy.
	pub const fn with_budget_policy(mut self, budget_policy: BudgetPolicy) -> Config {
		self.budget_policy = budget_policy;
		self
	}

	/// Draw immediately in the caller instead of queueing.
	pub const fn with_background_execution(mut self, enabled: bool) -> Config {
		self.background_execution = enabled;
		self
	}

	/// Let the consumer overrun its budget (or not).
	pub const fn with_background_timeout(mut self, enabled: bool) -> Config {
		self.background_timeout = enabled;
		self
	}

	/// Drain the direct-mode queue in the interrupt or in the task.
	pub const fn with_direct_consumer(mut self, direct_consumer: ConsumerContext) -> Config {
		self.direct_consumer = direct_consumer;
		self
	}

	/// Where the consumer runs for the configured output mode.
	pub const fn consumer(&self) -> ConsumerContext {
		ConsumerContext::for_mode(self.output_mode, self.direct_consumer)
	}

	/// Replace the line-rendered scanline expander.
	pub const fn with_scanline_fn(mut self, scanline_fn: ScanlineFn) -> Config {
		self.scanline_fn = scanline_fn;
		self
	}

	/// Set the subcarrier phase step, for composite encoders.
	pub const fn with_subcarrier(mut self, subcarrier: Subcarrier) -> Config {
		self.subcarrier = subcarrier;
		self
	}
}

impl Default for Config {
	fn default() -> Config {
		Config::new()
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
