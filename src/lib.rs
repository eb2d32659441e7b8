//! # DMA VGA
//!
//! Generates a VGA signal by streaming a cyclic chain of DMA descriptors out
//! of a parallel peripheral, and draws into the picture from a queue of
//! primitives that is drained while the monitor is not looking.
//!
//! The pieces, bottom up:
//!
//! * [`timing`] parses XFree86 modelines into [`Timing`] values.
//! * [`memory`] hands out DMA-capable memory.
//! * [`viewport`] allocates the rows of the picture, one or two copies.
//! * [`chain`] builds the descriptor chain that sends a whole frame.
//! * [`retrace`] follows the chain's interrupts through each frame.
//! * [`primitive`], [`painter`] and [`sprite`] do the drawing.
//! * [`scheduler`] decides how long drawing may take each frame.
//! * [`controller`] ties all of that to one [`peripheral`].
//!
//! [`display`] drives command-based LCD and OLED panels with the same drawing
//! code, and [`input`] buffers raw PS/2 bytes for the keyboard and mouse
//! ports.

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

#![cfg_attr(not(test), no_std)]

// -----------------------------------------------------------------------------
// Sub-modules
// -----------------------------------------------------------------------------

// Must come first, so the logging macros are visible everywhere else
mod fmt;

pub mod bitmap;
pub mod chain;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
#[cfg(feature = "rp2040")]
pub mod hw;
pub mod input;
pub mod memory;
pub mod painter;
pub mod peripheral;
pub mod pixel;
pub mod primitive;
pub mod retrace;
pub mod scheduler;
pub mod sprite;
pub mod timing;
pub mod viewport;

// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

pub use config::{Config, OutputMode};
pub use controller::VideoController;
pub use error::{Error, Result};
pub use timing::Timing;

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
