//! # Modeline parser
//!
//! Turns an XFree86-style modeline into a [`Timing`]:
//!
//! ```text
//! "label" MHz hdisp hsyncstart hsyncend htotal vdisp vsyncstart vsyncend vtotal
//!     (+HSync | -HSync) (+VSync | -VSync)
//!     [DoubleScan | QuadScan]
//!     [FrontPorchBegins | SyncBegins | BackPorchBegins | VisibleBegins]
//!     [MultiScanBlank]
//! ```
//!
//! Flags are recognised by their first letter (ignoring case), so `D` means
//! `DoubleScan`. Polarities default to negative, the scan count to one and
//! the starting block to the front porch. Unknown flags are ignored.

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

use super::{Label, ScanStart, SyncPolarity, Timing};
use crate::error::ModelineError;

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

/// Parse a modeline. This has no side effects.
pub fn parse(line: &str) -> Result<Timing, ModelineError> {
	let line = line.trim_start();
	let rest = line
		.strip_prefix('"')
		.ok_or(ModelineError::MissingLabel)?;
	let end = rest.find('"').ok_or(ModelineError::MissingLabel)?;
	let mut label = Label::new();
	label
		.push_str(&rest[..end])
		.map_err(|_| ModelineError::LabelTooLong)?;

	let mut tokens = rest[end + 1..].split_ascii_whitespace();

	let frequency = parse_mhz(tokens.next().ok_or(ModelineError::MissingField)?)
		.ok_or(ModelineError::BadNumber)?;

	let mut fields = [0u16; 8];
	for field in fields.iter_mut() {
		let token = tokens.next().ok_or(ModelineError::MissingField)?;
		*field = token.parse().map_err(|_| ModelineError::BadNumber)?;
	}
	let [hdisp, hsyncstart, hsyncend, htotal, vdisp, vsyncstart, vsyncend, vtotal] = fields;

	let mut timing = Timing {
		label,
		frequency: fugit::HertzU32::from_raw(frequency),
		h_visible: hdisp,
		h_front_porch: difference(hsyncstart, hdisp)?,
		h_sync: difference(hsyncend, hsyncstart)?,
		h_back_porch: difference(htotal, hsyncend)?,
		v_visible: vdisp,
		v_front_porch: difference(vsyncstart, vdisp)?,
		v_sync: difference(vsyncend, vsyncstart)?,
		v_back_porch: difference(vtotal, vsyncend)?,
		h_sync_polarity: SyncPolarity::Negative,
		v_sync_polarity: SyncPolarity::Negative,
		scan_count: 1,
		multi_scan_blank: false,
		h_starting_block: ScanStart::FrontPorch,
	};

	for token in tokens {
		let bytes = token.as_bytes();
		if let Some(polarity) = SyncPolarity::from_sign(bytes[0]) {
			match bytes.get(1).map(u8::to_ascii_uppercase) {
				Some(b'H') => timing.h_sync_polarity = polarity,
				Some(b'V') => timing.v_sync_polarity = polarity,
				_ => return Err(ModelineError::BadPolarity),
			}
			continue;
		}
		match bytes[0].to_ascii_uppercase() {
			b'D' => timing.scan_count = 2,
			b'Q' => timing.scan_count = 4,
			b'F' => timing.h_starting_block = ScanStart::FrontPorch,
			b'S' => timing.h_starting_block = ScanStart::Sync,
			b'B' => timing.h_starting_block = ScanStart::BackPorch,
			b'V' => timing.h_starting_block = ScanStart::VisibleArea,
			b'M' => timing.multi_scan_blank = true,
			_ => {
				// Unknown flags are skipped, like other modeline readers do
			}
		}
	}

	Ok(timing)
}

/// Parse a frequency in MHz with up to six decimal places into Hz.
///
/// Floating point is avoided so that `25.175` is exactly 25,175,000 Hz.
pub fn parse_mhz(text: &str) -> Option<u32> {
	let (whole, fraction) = match text.split_once('.') {
		Some((w, f)) => (w, f),
		None => (text, ""),
	};
	if whole.is_empty() && fraction.is_empty() {
		return None;
	}
	let mut hz: u32 = if whole.is_empty() {
		0
	} else {
		whole.parse::<u32>().ok()?.checked_mul(1_000_000)?
	};
	let mut scale = 100_000;
	for c in fraction.bytes() {
		if !c.is_ascii_digit() {
			return None;
		}
		hz = hz.checked_add((c - b'0') as u32 * scale)?;
		scale /= 10;
	}
	Some(hz)
}

/// `later - earlier`, which a well-formed modeline never makes negative.
fn difference(later: u16, earlier: u16) -> Result<u16, ModelineError> {
	later
		.checked_sub(earlier)
		.ok_or(ModelineError::BadGeometry)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::timing;

	#[test]
	fn vga_640x480() {
		let t = parse(timing::VGA_640X480_60HZ).unwrap();
		assert_eq!(t.label.as_str(), "640x480@60Hz");
		assert_eq!(t.frequency.raw(), 25_175_000);
		assert_eq!(
			(t.h_visible, t.h_front_porch, t.h_sync, t.h_back_porch),
			(640, 16, 96, 48)
		);
		assert_eq!(
			(t.v_visible, t.v_front_porch, t.v_sync, t.v_back_porch),
			(480, 10, 2, 33)
		);
		assert_eq!(t.h_sync_polarity, SyncPolarity::Negative);
		assert_eq!(t.v_sync_polarity, SyncPolarity::Negative);
		assert_eq!(t.scan_count, 1);
		assert!(!t.multi_scan_blank);
		assert_eq!(t.h_starting_block, ScanStart::FrontPorch);
	}

	#[test]
	fn flags() {
		let t = parse("\"x\" 40 800 840 968 1056 600 601 605 628 +HSync +vsync QuadScan SyncBegins M")
			.unwrap();
		assert_eq!(t.h_sync_polarity, SyncPolarity::Positive);
		assert_eq!(t.v_sync_polarity, SyncPolarity::Positive);
		assert_eq!(t.scan_count, 4);
		assert_eq!(t.h_starting_block, ScanStart::Sync);
		assert!(t.multi_scan_blank);

		let t = parse("\"x\" 40 800 840 968 1056 600 601 605 628 -HSync -VSync d visiblebegins")
			.unwrap();
		assert_eq!(t.scan_count, 2);
		assert_eq!(t.h_starting_block, ScanStart::VisibleArea);

		let t = parse("\"x\" 40 800 840 968 1056 600 601 605 628 BackPorchBegins Wibble")
			.unwrap();
		assert_eq!(t.h_starting_block, ScanStart::BackPorch);
	}

	#[test]
	fn lower_case_polarity() {
		let t = parse(timing::NTSC_640X240_60HZ).unwrap();
		assert_eq!(t.label.as_str(), "NTSC 640x240 (60Hz)");
		assert_eq!(t.frequency.raw(), 12_312_000);
		assert_eq!(t.h_sync_polarity, SyncPolarity::Negative);
	}

	#[test]
	fn megahertz() {
		assert_eq!(parse_mhz("25.175"), Some(25_175_000));
		assert_eq!(parse_mhz("12.6"), Some(12_600_000));
		assert_eq!(parse_mhz("36"), Some(36_000_000));
		assert_eq!(parse_mhz("54.00"), Some(54_000_000));
		assert_eq!(parse_mhz(".5"), Some(500_000));
		assert_eq!(parse_mhz("1.2345678"), Some(1_234_567));
		assert_eq!(parse_mhz("abc"), None);
		assert_eq!(parse_mhz("1.x"), None);
		assert_eq!(parse_mhz("."), None);
		assert_eq!(parse_mhz("5000"), None);
	}

	#[test]
	fn errors() {
		assert_eq!(
			parse("640x480 25.175 640 656 752 800 480 490 492 525"),
			Err(ModelineError::MissingLabel)
		);
		assert_eq!(
			parse("\"unterminated 25.175 640"),
			Err(ModelineError::MissingLabel)
		);
		assert_eq!(
			parse("\"this label is much too long for us\" 25 1 2 3 4 5 6 7 8"),
			Err(ModelineError::LabelTooLong)
		);
		assert_eq!(
			parse("\"x\" 25.175 640 656 752 800 480 490 492"),
			Err(ModelineError::MissingField)
		);
		assert_eq!(
			parse("\"x\" 25.175 640 656 752 800 480 490 492 five"),
			Err(ModelineError::BadNumber)
		);
		assert_eq!(
			parse("\"x\" 25.175 640 600 752 800 480 490 492 525"),
			Err(ModelineError::BadGeometry)
		);
		assert_eq!(
			parse("\"x\" 25.175 640 656 752 800 480 490 492 525 +Wobble"),
			Err(ModelineError::BadPolarity)
		);
	}

	#[test]
	fn from_str() {
		let t: Timing = timing::QVGA_320X240_60HZ.parse().unwrap();
		assert_eq!(t.scan_count, 2);
		assert_eq!(t.h_total(), 400);
		assert_eq!(t.v_total(), 262);
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
