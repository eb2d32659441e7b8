//! # Scan-out peripheral
//!
//! The hardware that walks a descriptor chain and clocks the samples out to
//! the pins. The controller only ever talks to it through this trait.

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

use crate::chain::Chain;
use crate::error::Result;
use fugit::HertzU32;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Streams a descriptor chain out of the chip, forever.
pub trait ScanoutPeripheral {
	/// Work out the sample clock closest to `requested`. Returns `None` if
	/// nothing close enough can be generated.
	fn sample_clock(&mut self, requested: HertzU32) -> Option<HertzU32>;

	/// Start streaming from the head of `chain`, at the clock last agreed by
	/// [`ScanoutPeripheral::sample_clock`].
	///
	/// Descriptors with an interrupt flag must cause a call to
	/// `VideoController::on_interrupt` once they have been fetched.
	fn start(&mut self, chain: &Chain) -> Result<()>;

	/// Stop streaming. Must not return until the chain is no longer read.
	fn stop(&mut self);

	/// The head node of `chain` now leads somewhere else. Peripherals that
	/// keep their own copy of the links must update it before the next
	/// frame.
	fn redirect(&mut self, chain: &Chain);

	/// Descriptors in `chain` now point at different buffers (panning).
	/// Peripherals that keep their own copy of the descriptors must copy
	/// them again.
	fn refresh(&mut self, chain: &Chain) {
		let _ = chain;
	}

	/// For peripherals with one shared interrupt that do not report which
	/// descriptor raised it. Clear the interrupt and return the index of the
	/// descriptor that did. Peripherals whose handler already knows the
	/// index call `VideoController::on_interrupt` and leave this alone.
	fn acknowledge(&mut self, chain: &Chain) -> Option<usize> {
		let _ = chain;
		None
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	/// Remembers what it was asked to do.
	#[derive(Debug, Default)]
	pub(crate) struct MockPeripheral {
		pub(crate) running: bool,
		pub(crate) starts: usize,
		pub(crate) redirects: usize,
		pub(crate) refreshes: usize,
		pub(crate) entry: Option<usize>,
		/// Highest clock it can make
		pub(crate) max_clock: Option<HertzU32>,
		/// The node being "sent"
		pub(crate) cursor: Option<usize>,
	}

	impl ScanoutPeripheral for MockPeripheral {
		fn sample_clock(&mut self, requested: HertzU32) -> Option<HertzU32> {
			match self.max_clock {
				Some(max) if requested > max => None,
				_ => Some(requested),
			}
		}

		fn start(&mut self, chain: &Chain) -> Result<()> {
			self.running = true;
			self.starts += 1;
			self.entry = Some(chain.entry());
			self.cursor = chain.first_sent();
			Ok(())
		}

		fn stop(&mut self) {
			self.running = false;
		}

		fn redirect(&mut self, chain: &Chain) {
			self.redirects += 1;
			self.entry = Some(chain.entry());
		}

		fn refresh(&mut self, _chain: &Chain) {
			self.refreshes += 1;
		}

		fn acknowledge(&mut self, chain: &Chain) -> Option<usize> {
			let done = self.cursor?;
			self.cursor = chain.following(done);
			Some(done)
		}
	}

	#[test]
	fn clock_limit() {
		let mut p = MockPeripheral {
			max_clock: Some(HertzU32::MHz(30)),
			..Default::default()
		};
		assert_eq!(p.sample_clock(HertzU32::MHz(25)), Some(HertzU32::MHz(25)));
		assert_eq!(p.sample_clock(HertzU32::MHz(40)), None);
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
