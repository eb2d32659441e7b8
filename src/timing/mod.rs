//! # Video timings
//!
//! A [`Timing`] describes one video standard: how many samples make up each
//! horizontal period, how many lines make up each vertical period, the sync
//! polarities and the pixel clock. Timings are plain values. Nothing in here
//! touches hardware.
//!
//! Timings are usually written as XFree86-style modelines. See the
//! [`modeline`] module for the syntax, and the constants below for the modes
//! we know work.

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
// Sub-modules
// -----------------------------------------------------------------------------

pub mod modeline;

// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

use crate::error::{Error, Result};
use fugit::HertzU32;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// The human readable name of a timing, e.g. `640x480@60Hz`.
pub type Label = heapless::String<LABEL_LEN>;

/// Describes the polarity of a sync pulse.
///
/// Some pulses are positive (active-high), some are negative (active-low).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncPolarity {
	/// An active-high pulse
	Positive,
	/// An active-low pulse
	Negative,
}

/// Which part of the horizontal period each line starts with.
///
/// The order is always front-porch, sync, back-porch, visible. This only
/// chooses where in that cycle the line buffer begins, which matters to
/// monitors that lock on to a particular edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanStart {
	/// Front porch, sync, back porch, visible
	FrontPorch,
	/// Sync, back porch, visible, front porch
	Sync,
	/// Back porch, visible, front porch, sync
	BackPorch,
	/// Visible, front porch, sync, back porch
	VisibleArea,
}

/// One of the four parts of a horizontal period.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Segment {
	/// Blank, before the sync pulse
	FrontPorch,
	/// The sync pulse itself
	Sync,
	/// Blank, after the sync pulse
	BackPorch,
	/// Where pixels go
	Visible,
}

/// Describes one video standard.
///
/// Horizontal values are in samples (i.e. pixel clocks), vertical values are
/// in lines. When `scan_count` is more than one, every line is sent that many
/// times, so the vertical values describe the logical picture and the monitor
/// sees `scan_count` times as many lines.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
	/// Name, for logging
	pub label: Label,
	/// The sample (pixel) clock
	pub frequency: HertzU32,
	/// Visible samples per line
	pub h_visible: u16,
	/// Samples between the visible area and the sync pulse
	pub h_front_porch: u16,
	/// Samples in the sync pulse
	pub h_sync: u16,
	/// Samples between the sync pulse and the visible area
	pub h_back_porch: u16,
	/// Visible lines per frame
	pub v_visible: u16,
	/// Lines between the visible area and the sync pulse
	pub v_front_porch: u16,
	/// Lines in the sync pulse
	pub v_sync: u16,
	/// Lines between the sync pulse and the visible area
	pub v_back_porch: u16,
	/// Polarity of the horizontal sync pulse
	pub h_sync_polarity: SyncPolarity,
	/// Polarity of the vertical sync pulse
	pub v_sync_polarity: SyncPolarity,
	/// How many times each line is sent (1, 2 or 4)
	pub scan_count: u8,
	/// Send repeated lines as black, for a scan-line effect
	pub multi_scan_blank: bool,
	/// Where each horizontal period starts
	pub h_starting_block: ScanStart,
}

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// Longest label a timing can carry.
pub const LABEL_LEN: usize = 22;

/// Bit position of the horizontal sync signal in each output sample.
pub const HSYNC_BIT: u8 = 6;

/// Bit position of the vertical sync signal in each output sample.
pub const VSYNC_BIT: u8 = 7;

/// Mask covering both sync bits in an output sample.
pub const SYNC_MASK: u8 = (1 << HSYNC_BIT) | (1 << VSYNC_BIT);

/// Smallest horizontal porch `moved` will leave behind.
pub const MIN_MOVE_H_PORCH: u16 = 8;

/// Smallest vertical porch `moved` will leave behind.
pub const MIN_MOVE_V_PORCH: u16 = 1;

/// Smallest horizontal porch `shrunk` will leave behind.
pub const MIN_SHRINK_H_PORCH: u16 = 4;

/// Smallest vertical porch `shrunk` will leave behind.
pub const MIN_SHRINK_V_PORCH: u16 = 1;

/// 640x480 @ 60 Hz, the industry standard VGA mode
pub const VGA_640X480_60HZ: &str =
	"\"640x480@60Hz\" 25.175 640 656 752 800 480 490 492 525 -HSync -VSync";

/// 640x480 @ 75 Hz (VESA)
pub const VESA_640X480_75HZ: &str =
	"\"640x480@75Hz\" 31.5 640 656 720 840 480 481 484 500 -HSync -VSync";

/// 640x400 @ 70 Hz, as used by IBM VGA text mode
pub const VGA_640X400_70HZ: &str =
	"\"640x400@70Hz\" 25.175 640 656 752 800 400 412 414 449 -HSync -VSync";

/// 640x350 @ 70 Hz, EGA compatible
pub const VGA_640X350_70HZ: &str =
	"\"640x350@70Hz\" 25.175 640 656 752 800 350 387 389 449 -HSync -VSync";

/// 640x240 @ 60 Hz, line doubled
pub const VGA_640X240_60HZ: &str =
	"\"640x240@60Hz\" 25.175 640 656 752 800 240 245 247 262 -HSync -VSync DoubleScan";

/// 320x240 @ 60 Hz, line doubled at half the VGA pixel clock
pub const QVGA_320X240_60HZ: &str =
	"\"320x240@60Hz\" 12.6 320 328 376 400 240 245 246 262 -HSync -VSync DoubleScan";

/// 320x200 @ 75 Hz, line doubled
pub const VGA_320X200_75HZ: &str =
	"\"320x200@75Hz\" 12.93 320 352 376 408 200 208 211 229 -HSync -VSync DoubleScan";

/// 320x200 @ 75 Hz, with every second line black like an old CRT
pub const VGA_320X200_75HZ_RETRO: &str = "\"320x200@75Hz\" 12.93 320 352 376 408 200 208 211 229 -HSync -VSync DoubleScan MultiScanBlank";

/// 256x384 @ 60 Hz, line doubled
pub const VGA_256X384_60HZ: &str = "\"256x384@60\" 17.09 256 272 304 352 384 387 391 404 -HSync -VSync DoubleScan FrontPorchBegins";

/// 512x384 @ 60 Hz, line doubled
pub const VGA_512X384_60HZ: &str =
	"\"512x384@60Hz\" 32.5 512 524 592 672 384 385 388 403 -HSync -VSync DoubleScan";

/// 720x576 @ 50 Hz, PAL timing on a VGA connector
pub const PAL_720X576_50HZ: &str =
	"\"720x576@50Hz\" 27 720 732 795 864 576 581 586 625 -HSync -VSync";

/// 800x600 @ 56 Hz (VESA)
pub const SVGA_800X600_56HZ: &str =
	"\"800x600@56Hz\" 36 800 824 896 1024 600 601 603 625 -HSync -VSync";

/// 800x600 @ 60 Hz (VESA)
pub const SVGA_800X600_60HZ: &str =
	"\"800x600@60Hz\" 40 800 840 968 1056 600 601 605 628 -HSync -VSync";

/// NTSC-like 640x240 progressive timing
pub const NTSC_640X240_60HZ: &str =
	"\"NTSC 640x240 (60Hz)\" 12.312 640 662 719 784 240 244 247 262 -hsync -vsync";

/// Every modeline constant in this module, for menus and tests.
pub const PRESETS: &[&str] = &[
	VGA_640X480_60HZ,
	VESA_640X480_75HZ,
	VGA_640X400_70HZ,
	VGA_640X350_70HZ,
	VGA_640X240_60HZ,
	QVGA_320X240_60HZ,
	VGA_320X200_75HZ,
	VGA_320X200_75HZ_RETRO,
	VGA_256X384_60HZ,
	VGA_512X384_60HZ,
	PAL_720X576_50HZ,
	SVGA_800X600_56HZ,
	SVGA_800X600_60HZ,
	NTSC_640X240_60HZ,
];

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl SyncPolarity {
	/// The level of the sync pin while the pulse is asserted.
	pub const fn active(&self) -> bool {
		match self {
			SyncPolarity::Positive => true,
			SyncPolarity::Negative => false,
		}
	}

	/// The level of the sync pin while the pulse is not asserted.
	pub const fn idle(&self) -> bool {
		!self.active()
	}

	/// Parse the sign in front of `HSync`/`VSync` in a modeline.
	pub const fn from_sign(sign: u8) -> Option<SyncPolarity> {
		match sign {
			b'+' => Some(SyncPolarity::Positive),
			b'-' => Some(SyncPolarity::Negative),
			_ => None,
		}
	}
}

impl ScanStart {
	/// The four horizontal segments in the order they are sent.
	pub const fn order(&self) -> [Segment; 4] {
		match self {
			ScanStart::FrontPorch => [
				Segment::FrontPorch,
				Segment::Sync,
				Segment::BackPorch,
				Segment::Visible,
			],
			ScanStart::Sync => [
				Segment::Sync,
				Segment::BackPorch,
				Segment::Visible,
				Segment::FrontPorch,
			],
			ScanStart::BackPorch => [
				Segment::BackPorch,
				Segment::Visible,
				Segment::FrontPorch,
				Segment::Sync,
			],
			ScanStart::VisibleArea => [
				Segment::Visible,
				Segment::FrontPorch,
				Segment::Sync,
				Segment::BackPorch,
			],
		}
	}
}

impl Timing {
	/// Parse a modeline. See [`modeline::parse`].
	pub fn from_modeline(line: &str) -> Result<Timing> {
		Ok(modeline::parse(line)?)
	}

	/// Check the invariants `set_resolution` relies on.
	///
	/// Every period must be non-zero and the scan count must be 1, 2 or 4.
	pub fn validate(&self) -> Result<()> {
		let periods = [
			self.h_visible,
			self.h_front_porch,
			self.h_sync,
			self.h_back_porch,
			self.v_visible,
			self.v_front_porch,
			self.v_sync,
			self.v_back_porch,
		];
		if periods.iter().any(|p| *p == 0) {
			return Err(Error::InvalidTiming);
		}
		if !matches!(self.scan_count, 1 | 2 | 4) {
			return Err(Error::InvalidTiming);
		}
		if self.frequency.raw() == 0 {
			return Err(Error::InvalidTiming);
		}
		Ok(())
	}

	/// Samples in one horizontal period.
	pub const fn h_total(&self) -> usize {
		self.h_visible as usize
			+ self.h_front_porch as usize
			+ self.h_sync as usize
			+ self.h_back_porch as usize
	}

	/// Logical lines in one vertical period.
	pub const fn v_total(&self) -> usize {
		self.v_visible as usize
			+ self.v_front_porch as usize
			+ self.v_sync as usize
			+ self.v_back_porch as usize
	}

	/// Lines the monitor actually sees in one frame.
	pub const fn frame_lines(&self) -> usize {
		self.scan_count as usize * self.v_total()
	}

	/// Samples in one complete frame, blanking included.
	pub const fn frame_samples(&self) -> usize {
		self.frame_lines() * self.h_total()
	}

	/// Length of one segment of the horizontal period.
	pub const fn segment_len(&self, segment: Segment) -> usize {
		match segment {
			Segment::FrontPorch => self.h_front_porch as usize,
			Segment::Sync => self.h_sync as usize,
			Segment::BackPorch => self.h_back_porch as usize,
			Segment::Visible => self.h_visible as usize,
		}
	}

	/// Offset of a segment from the start of the line buffer.
	pub fn segment_offset(&self, segment: Segment) -> usize {
		let mut offset = 0;
		for s in self.h_starting_block.order() {
			if s == segment {
				break;
			}
			offset += self.segment_len(s);
		}
		offset
	}

	/// Refresh rate in millihertz, e.g. `59_940` for 59.94 Hz.
	pub fn refresh_rate_millihz(&self) -> u32 {
		let samples = self.frame_samples() as u64;
		if samples == 0 {
			return 0;
		}
		(self.frequency.raw() as u64 * 1000 / samples) as u32
	}

	/// How long the given number of logical lines take to send, in
	/// microseconds, rounded up.
	pub fn lines_to_micros(&self, lines: usize) -> u32 {
		let freq = self.frequency.raw() as u64;
		if freq == 0 {
			return 0;
		}
		let samples = (lines * self.scan_count as usize * self.h_total()) as u64;
		((samples * 1_000_000 + freq - 1) / freq) as u32
	}

	/// How long one frame takes to send, in microseconds, rounded up.
	pub fn frame_period_micros(&self) -> u32 {
		self.lines_to_micros(self.v_total())
	}

	/// The output sample bits for the two sync signals.
	///
	/// Pass `true` for a signal that is inside its sync pulse. The polarity
	/// of each signal is taken into account.
	pub const fn sync_bits(&self, hsync_asserted: bool, vsync_asserted: bool) -> u8 {
		let h = if hsync_asserted {
			self.h_sync_polarity.active()
		} else {
			self.h_sync_polarity.idle()
		};
		let v = if vsync_asserted {
			self.v_sync_polarity.active()
		} else {
			self.v_sync_polarity.idle()
		};
		((h as u8) << HSYNC_BIT) | ((v as u8) << VSYNC_BIT)
	}

	/// Move the picture on the monitor by trading samples between the front
	/// and back porches. Positive `dx` moves right, positive `dy` moves down.
	///
	/// The totals, and so the frame rate, are unchanged.
	pub fn moved(&self, dx: i32, dy: i32) -> Timing {
		let mut t = self.clone();
		let (fp, bp) = trade_porches(
			t.h_front_porch,
			t.h_back_porch,
			dx,
			MIN_MOVE_H_PORCH,
		);
		t.h_front_porch = fp;
		t.h_back_porch = bp;
		let (fp, bp) = trade_porches(
			t.v_front_porch,
			t.v_back_porch,
			dy,
			MIN_MOVE_V_PORCH,
		);
		t.v_front_porch = fp;
		t.v_back_porch = bp;
		t
	}

	/// Shrink (positive values) or grow (negative values) the picture by
	/// widening the porches. Each step of `sx` adds four samples to each
	/// horizontal porch, each step of `sy` adds one line to each vertical
	/// porch.
	///
	/// This changes the totals, and so the refresh rate.
	pub fn shrunk(&self, sx: i32, sy: i32) -> Timing {
		let mut t = self.clone();
		t.h_back_porch = grow_porch(t.h_back_porch, 4 * sx, MIN_SHRINK_H_PORCH);
		t.h_front_porch = grow_porch(t.h_front_porch, 4 * sx, MIN_SHRINK_H_PORCH);
		t.v_back_porch = grow_porch(t.v_back_porch, sy, MIN_SHRINK_V_PORCH);
		t.v_front_porch = grow_porch(t.v_front_porch, sy, MIN_SHRINK_V_PORCH);
		t
	}
}

impl core::str::FromStr for Timing {
	type Err = Error;

	fn from_str(s: &str) -> Result<Timing> {
		Timing::from_modeline(s)
	}
}

/// Move `offset` units from the front porch to the back porch, keeping each
/// at least `min` where the sum allows.
fn trade_porches(front: u16, back: u16, offset: i32, min: u16) -> (u16, u16) {
	let sum = front as i32 + back as i32;
	let min = min as i32;
	let front = (front as i32 - offset).max(min);
	let back = (sum - front).max(min);
	let front = (sum - back).max(0);
	(front as u16, (sum - front) as u16)
}

/// Add `delta` to a porch, keeping it at least `min`.
fn grow_porch(porch: u16, delta: i32, min: u16) -> u16 {
	(porch as i32 + delta).max(min as i32).min(u16::MAX as i32) as u16
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn vga() -> Timing {
		Timing::from_modeline(VGA_640X480_60HZ).unwrap()
	}

	#[test]
	fn totals() {
		let t = vga();
		assert_eq!(t.h_total(), 800);
		assert_eq!(t.v_total(), 525);
		assert_eq!(t.frame_samples(), 800 * 525);
		// 25.175 MHz / 420,000 samples = 59.94 Hz
		assert_eq!(t.refresh_rate_millihz(), 59_940);
	}

	#[test]
	fn frame_period() {
		let t = vga();
		// 420,000 samples at 25.175 MHz is 16,683.2 us
		assert_eq!(t.frame_period_micros(), 16_684);
		// 45 lines of 800 samples is 1,429.99 us
		assert_eq!(t.lines_to_micros(45), 1430);
	}

	#[test]
	fn every_preset_is_valid() {
		for preset in PRESETS {
			let t = Timing::from_modeline(preset).unwrap();
			assert_eq!(t.validate(), Ok(()), "{}", preset);
		}
	}

	#[test]
	fn zero_porch_is_rejected() {
		let t = Timing::from_modeline(
			"\"400x300@60Hz\" 20 400 420 484 528 300 300 302 314 -HSync -VSync DoubleScan",
		)
		.unwrap();
		assert_eq!(t.v_front_porch, 0);
		assert_eq!(t.validate(), Err(Error::InvalidTiming));
	}

	#[test]
	fn segment_offsets_follow_starting_block() {
		let mut t = vga();
		assert_eq!(t.segment_offset(Segment::Visible), 16 + 96 + 48);
		assert_eq!(t.segment_offset(Segment::Sync), 16);
		t.h_starting_block = ScanStart::Sync;
		assert_eq!(t.segment_offset(Segment::Sync), 0);
		assert_eq!(t.segment_offset(Segment::Visible), 96 + 48);
		t.h_starting_block = ScanStart::BackPorch;
		assert_eq!(t.segment_offset(Segment::Sync), 48 + 640 + 16);
		t.h_starting_block = ScanStart::VisibleArea;
		assert_eq!(t.segment_offset(Segment::Visible), 0);
		assert_eq!(t.segment_offset(Segment::Sync), 640 + 16);
	}

	#[test]
	fn sync_bits_honour_polarity() {
		let mut t = vga();
		// Both negative: idle high
		assert_eq!(t.sync_bits(false, false), SYNC_MASK);
		assert_eq!(t.sync_bits(true, false), 1 << VSYNC_BIT);
		assert_eq!(t.sync_bits(false, true), 1 << HSYNC_BIT);
		t.h_sync_polarity = SyncPolarity::Positive;
		t.v_sync_polarity = SyncPolarity::Positive;
		assert_eq!(t.sync_bits(false, false), 0);
		assert_eq!(t.sync_bits(true, true), SYNC_MASK);
	}

	#[test]
	fn moving_keeps_totals() {
		let t = vga();
		let m = t.moved(4, 2);
		assert_eq!(m.h_total(), t.h_total());
		assert_eq!(m.v_total(), t.v_total());
		assert_eq!(m.h_front_porch, 12);
		assert_eq!(m.h_back_porch, 52);
		assert_eq!(m.v_front_porch, 8);
		assert_eq!(m.v_back_porch, 35);
	}

	#[test]
	fn moving_stops_at_minimum_porch() {
		let t = vga();
		let m = t.moved(100, 100);
		assert_eq!(m.h_front_porch, MIN_MOVE_H_PORCH);
		assert_eq!(m.h_back_porch, 16 + 48 - MIN_MOVE_H_PORCH);
		assert_eq!(m.v_front_porch, MIN_MOVE_V_PORCH);
		let m = t.moved(-100, -100);
		assert_eq!(m.h_back_porch, MIN_MOVE_H_PORCH);
		assert_eq!(m.v_back_porch, MIN_MOVE_V_PORCH);
		assert_eq!(m.v_total(), t.v_total());
	}

	#[test]
	fn shrinking_widens_porches() {
		let t = vga();
		let s = t.shrunk(2, 3);
		assert_eq!(s.h_front_porch, 16 + 8);
		assert_eq!(s.h_back_porch, 48 + 8);
		assert_eq!(s.v_front_porch, 10 + 3);
		assert_eq!(s.v_back_porch, 33 + 3);
		let s = t.shrunk(-100, -100);
		assert_eq!(s.h_front_porch, MIN_SHRINK_H_PORCH);
		assert_eq!(s.v_back_porch, MIN_SHRINK_V_PORCH);
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
