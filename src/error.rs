//! # Errors
//!
//! Everything that can go wrong when configuring a video mode.
//!
//! Nothing on the interrupt path returns an error. If rendering falls behind
//! the beam, the hardware simply streams stale pixels for a frame.

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

use core::fmt;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Describes why a modeline string was rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModelineError {
	/// The line did not start with a quoted label
	MissingLabel,
	/// The quoted label does not fit in a `timing::Label`
	LabelTooLong,
	/// Fewer than nine numeric fields were given
	MissingField,
	/// A numeric field could not be parsed
	BadNumber,
	/// A sync-start/sync-end/total field was smaller than the one before it
	BadGeometry,
	/// A `+`/`-` token named neither `HSync` nor `VSync`
	BadPolarity,
}

/// The errors this crate can report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
	/// A modeline string could not be parsed
	Modeline(ModelineError),
	/// A timing has a zero-length period, or an unsupported scan count
	InvalidTiming,
	/// The sample clock for this timing cannot be generated
	UnsupportedClock,
	/// Not even one viewport row fits in DMA-capable memory
	OutOfMemory,
	/// The scan-out peripheral cannot hold a chain this long
	ChainTooLong,
	/// No video mode has been set yet
	NotConfigured,
	/// A rectangle or buffer does not match the viewport
	OutOfBounds,
}

/// Shorthand for a result carrying our [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl From<ModelineError> for Error {
	fn from(error: ModelineError) -> Error {
		Error::Modeline(error)
	}
}

impl fmt::Display for ModelineError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let text = match self {
			ModelineError::MissingLabel => "missing quoted label",
			ModelineError::LabelTooLong => "label too long",
			ModelineError::MissingField => "missing numeric field",
			ModelineError::BadNumber => "malformed number",
			ModelineError::BadGeometry => "sync and total fields out of order",
			ModelineError::BadPolarity => "unknown sync polarity token",
		};
		f.write_str(text)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::Modeline(e) => write!(f, "bad modeline: {}", e),
			Error::InvalidTiming => f.write_str("invalid timing"),
			Error::UnsupportedClock => f.write_str("unsupported sample clock"),
			Error::OutOfMemory => f.write_str("out of DMA memory"),
			Error::ChainTooLong => f.write_str("descriptor chain too long for peripheral"),
			Error::NotConfigured => f.write_str("no video mode set"),
			Error::OutOfBounds => f.write_str("rectangle outside viewport"),
		}
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
