//! # Viewport memory
//!
//! The viewport is the part of the visible area that has pixels behind it.
//! It is stored as a table of row pointers, so rows can live in whatever
//! DMA-capable blocks the [`DmaMemory`] provider can find, and so the
//! double-buffer swap is just a matter of swapping two tables.
//!
//! Line-rendered output also needs a small ring of full-width line buffers,
//! which the retrace interrupt fills a few rows ahead of the scan-out.

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

use crate::config::{DMA_ALIGN, VIEWPORT_MEMORY_POOL_COUNT, VIEWPORT_QUANTUM};
use crate::error::{Error, Result};
use crate::memory::{align_up, allocate_array, DmaMemory};
use crate::timing::Timing;
use core::alloc::Layout;
use core::ptr::NonNull;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Size and position of the viewport, within the visible area.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Viewport {
	/// Pixels per row. Always a multiple of four.
	pub width: usize,
	/// Rows
	pub height: usize,
	/// Samples of blank visible area to the left
	pub col: usize,
	/// Lines of blank visible area above
	pub row: usize,
}

/// A table of pointers to viewport rows.
///
/// The table and the rows it points at belong to the memory provider; this
/// is just a view of them, valid until the next `free_all`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RowTable {
	rows: NonNull<NonNull<u8>>,
	len: usize,
}

/// A [`RowTable`] plus what you need to draw into it.
#[derive(Debug)]
pub struct Surface {
	table: RowTable,
	row_bytes: usize,
}

/// The drawing and visible row tables.
///
/// When not double buffered both are the same table.
#[derive(Debug, Copy, Clone)]
pub struct Surfaces {
	tables: [RowTable; 2],
	visible: usize,
	double_buffered: bool,
}

/// A ring of full-width line buffers for line-rendered output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LineRing {
	base: NonNull<u8>,
	stride: usize,
	width: usize,
	count: usize,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Viewport {
	/// Clamp a requested size to a timing, and centre it.
	///
	/// A width or height of zero, or one bigger than the visible area, means
	/// "all of it". The width and column are rounded down to
	/// [`VIEWPORT_QUANTUM`]; the height is rounded down to `height_quantum`.
	/// Neither goes below one quantum.
	pub fn fit(timing: &Timing, width: usize, height: usize, height_quantum: usize) -> Viewport {
		let h_visible = timing.h_visible as usize;
		let v_visible = timing.v_visible as usize;
		let width = if width == 0 || width >= h_visible {
			h_visible
		} else {
			width
		};
		let width = (width & !(VIEWPORT_QUANTUM - 1)).max(VIEWPORT_QUANTUM.min(h_visible));
		let height = if height == 0 || height >= v_visible {
			v_visible
		} else {
			height
		};
		let quantum = height_quantum.max(1);
		let height = ((height / quantum) * quantum).max(quantum.min(v_visible));
		Viewport {
			width,
			height,
			col: ((h_visible - width) / 2) & !(VIEWPORT_QUANTUM - 1),
			row: (v_visible - height) / 2,
		}
	}

	/// Samples of blank visible area to the right.
	pub fn right_pad(&self, timing: &Timing) -> usize {
		(timing.h_visible as usize).saturating_sub(self.width + self.col)
	}

	/// Does timing line `line` (in the visible area) show a viewport row?
	pub fn contains_line(&self, line: usize) -> bool {
		line >= self.row && line < self.row + self.height
	}
}

// Safety: a RowTable is only a pair of numbers until someone dereferences it,
// and that requires `unsafe`.
unsafe impl Send for RowTable {}
unsafe impl Sync for RowTable {}

impl RowTable {
	/// Number of rows.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Is the table empty?
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Pointer to row `y`.
	pub fn row(&self, y: usize) -> Option<NonNull<u8>> {
		if y < self.len {
			// Safety: y is in bounds and every entry was written at allocation
			Some(unsafe { *self.rows.as_ptr().add(y) })
		} else {
			None
		}
	}

	/// The table itself.
	pub fn as_ptr(&self) -> *const NonNull<u8> {
		self.rows.as_ptr()
	}
}

impl Surface {
	/// Make a surface over a row table.
	///
	/// # Safety
	///
	/// Every row must be valid for `row_bytes` bytes, and nothing else may
	/// hold a Rust reference to those bytes while this surface exists.
	pub unsafe fn new(table: RowTable, row_bytes: usize) -> Surface {
		Surface { table, row_bytes }
	}

	/// Number of rows.
	pub fn height(&self) -> usize {
		self.table.len()
	}

	/// Bytes per row.
	pub fn row_bytes(&self) -> usize {
		self.row_bytes
	}

	/// Read a row.
	pub fn row(&self, y: usize) -> Option<&[u8]> {
		self.table
			.row(y)
			// Safety: see `Surface::new`
			.map(|p| unsafe { core::slice::from_raw_parts(p.as_ptr(), self.row_bytes) })
	}

	/// Write a row.
	pub fn row_mut(&mut self, y: usize) -> Option<&mut [u8]> {
		self.table
			.row(y)
			// Safety: see `Surface::new`
			.map(|p| unsafe { core::slice::from_raw_parts_mut(p.as_ptr(), self.row_bytes) })
	}

	/// Move row `src` to `dst` by copying bytes.
	pub fn copy_row(&mut self, src: usize, dst: usize) {
		if src == dst {
			return;
		}
		if let (Some(s), Some(d)) = (self.table.row(src), self.table.row(dst)) {
			// Safety: see `Surface::new`. Rows never overlap.
			unsafe { core::ptr::copy(s.as_ptr(), d.as_ptr(), self.row_bytes) };
		}
	}
}

impl Surfaces {
	/// One table used for both drawing and display.
	pub fn single(table: RowTable) -> Surfaces {
		Surfaces {
			tables: [table, table],
			visible: 0,
			double_buffered: false,
		}
	}

	/// Two tables. The first is visible.
	pub fn double(visible: RowTable, drawing: RowTable) -> Surfaces {
		Surfaces {
			tables: [visible, drawing],
			visible: 0,
			double_buffered: true,
		}
	}

	/// Are there two tables?
	pub fn is_double_buffered(&self) -> bool {
		self.double_buffered
	}

	/// The table drawing goes into.
	pub fn drawing(&self) -> RowTable {
		self.tables[self.drawing_index()]
	}

	/// The table being shown.
	pub fn visible(&self) -> RowTable {
		self.tables[self.visible]
	}

	/// Which of the two allocations is being shown.
	pub fn visible_index(&self) -> usize {
		self.visible
	}

	/// Which of the two allocations drawing goes into.
	pub fn drawing_index(&self) -> usize {
		if self.double_buffered {
			self.visible ^ 1
		} else {
			self.visible
		}
	}

	/// Look up a table by allocation index.
	pub fn table(&self, index: usize) -> RowTable {
		self.tables[index & 1]
	}

	/// Exchange drawing and visible. Does nothing when single buffered.
	pub fn swap(&mut self) {
		if self.double_buffered {
			self.visible ^= 1;
		}
	}
}

/// Allocate the viewport rows, and the row tables for them.
///
/// Rows come from up to [`VIEWPORT_MEMORY_POOL_COUNT`] separate blocks,
/// largest first. If memory runs out the height is reduced, keeping it a
/// multiple of `height_quantum`, and the achieved height is returned along
/// with the tables. Every row is filled with `fill`.
pub fn allocate_viewport<M: DmaMemory + ?Sized>(
	memory: &mut M,
	row_bytes: usize,
	height: usize,
	double_buffered: bool,
	height_quantum: usize,
	fill: u8,
) -> Result<(Surfaces, usize)> {
	let copies = if double_buffered { 2 } else { 1 };
	let wanted = height * copies;
	if wanted == 0 || row_bytes == 0 {
		return Err(Error::OutOfMemory);
	}
	let table: NonNull<NonNull<u8>> =
		allocate_array(memory, wanted, core::mem::align_of::<NonNull<u8>>())
			.ok_or(Error::OutOfMemory)?;
	let stride = align_up(row_bytes, DMA_ALIGN);

	let mut got = 0;
	for _pool in 0..VIEWPORT_MEMORY_POOL_COUNT {
		if got == wanted {
			break;
		}
		let lines = (wanted - got).min(memory.largest_free_block(DMA_ALIGN) / stride);
		if lines == 0 {
			break;
		}
		let layout = Layout::from_size_align(lines * stride, DMA_ALIGN).map_err(|_| Error::OutOfMemory)?;
		let Some(block) = memory.allocate(layout) else {
			break;
		};
		for i in 0..lines {
			// Safety: `block` holds `lines` rows of `stride` bytes, and the
			// table has room for `wanted` entries.
			unsafe {
				let row = block.as_ptr().add(i * stride);
				core::ptr::write_bytes(row, fill, stride);
				table.as_ptr().add(got + i).write(NonNull::new_unchecked(row));
			}
		}
		got += lines;
	}

	let quantum = height_quantum.max(1);
	let achieved = ((got / copies) / quantum) * quantum;
	if achieved == 0 {
		warn!("viewport: no room for a single row of {} bytes", row_bytes);
		return Err(Error::OutOfMemory);
	}
	if achieved < height {
		warn!("viewport: height reduced from {} to {}", height, achieved);
	}
	let first = RowTable {
		rows: table,
		len: achieved,
	};
	let surfaces = if double_buffered {
		// Safety: the table holds at least `2 * achieved` entries
		let second = RowTable {
			rows: unsafe { NonNull::new_unchecked(table.as_ptr().add(achieved)) },
			len: achieved,
		};
		Surfaces::double(first, second)
	} else {
		Surfaces::single(first)
	};
	Ok((surfaces, achieved))
}

// Safety: the ring is a view of DMA memory with no thread affinity.
unsafe impl Send for LineRing {}
unsafe impl Sync for LineRing {}

impl LineRing {
	/// Allocate `count` line buffers of `width` samples, filled with `fill`.
	pub fn allocate<M: DmaMemory + ?Sized>(
		memory: &mut M,
		count: usize,
		width: usize,
		fill: u8,
	) -> Result<LineRing> {
		let stride = align_up(width.max(1), DMA_ALIGN);
		let layout =
			Layout::from_size_align(stride * count.max(1), DMA_ALIGN).map_err(|_| Error::OutOfMemory)?;
		let base = memory.allocate(layout).ok_or(Error::OutOfMemory)?;
		// Safety: freshly allocated, `layout.size()` bytes long
		unsafe { core::ptr::write_bytes(base.as_ptr(), fill, layout.size()) };
		Ok(LineRing {
			base,
			stride,
			width,
			count: count.max(1),
		})
	}

	/// Number of buffers.
	pub fn count(&self) -> usize {
		self.count
	}

	/// Samples per buffer.
	pub fn width(&self) -> usize {
		self.width
	}

	/// Buffer `index`, wrapping.
	pub fn slot(&self, index: usize) -> NonNull<u8> {
		// Safety: (index % count) * stride is inside the allocation
		unsafe { NonNull::new_unchecked(self.base.as_ptr().add((index % self.count) * self.stride)) }
	}

	/// Buffer `index`, wrapping, as a slice.
	///
	/// # Safety
	///
	/// Only the retrace interrupt may write line buffers, and only to slots
	/// the scan-out is not currently reading.
	#[allow(clippy::mut_from_ref)]
	pub unsafe fn slot_mut(&self, index: usize) -> &mut [u8] {
		core::slice::from_raw_parts_mut(self.slot(index).as_ptr(), self.width)
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::{test_region, BumpPool, PoolSet};
	use crate::timing;

	fn vga() -> Timing {
		Timing::from_modeline(timing::VGA_640X480_60HZ).unwrap()
	}

	#[test]
	fn fit_whole_screen() {
		let vp = Viewport::fit(&vga(), 640, 480, 1);
		assert_eq!(
			vp,
			Viewport {
				width: 640,
				height: 480,
				col: 0,
				row: 0
			}
		);
		assert_eq!(Viewport::fit(&vga(), 0, 0, 1), vp);
	}

	#[test]
	fn fit_clamps_oversize() {
		let vp = Viewport::fit(&vga(), 800, 600, 1);
		assert_eq!((vp.width, vp.height), (640, 480));
	}

	#[test]
	fn fit_quantises_and_centres() {
		let vp = Viewport::fit(&vga(), 321, 201, 1);
		assert_eq!(vp.width, 320);
		assert_eq!(vp.width % 4, 0);
		assert_eq!(vp.col, 160);
		assert_eq!(vp.col % 4, 0);
		assert_eq!(vp.height, 201);
		assert_eq!(vp.row, 139);
		assert_eq!(vp.right_pad(&vga()), 160);
		let vp = Viewport::fit(&vga(), 302, 201, 4);
		assert_eq!(vp.width, 300);
		assert_eq!(vp.col, 168);
		assert_eq!(vp.height, 200);
		assert!(vp.contains_line(140));
		assert!(!vp.contains_line(139));
		assert!(!vp.contains_line(340));
	}

	#[test]
	fn fit_keeps_one_quantum() {
		for width in 1..VIEWPORT_QUANTUM {
			let vp = Viewport::fit(&vga(), width, 1, 4);
			assert_eq!(vp.width, VIEWPORT_QUANTUM);
			assert_eq!(vp.col, 316);
			assert_eq!(vp.height, 4);
		}
	}

	#[test]
	fn single_buffered_tables_are_shared() {
		let mut pool = BumpPool::new(test_region(64 * 1024));
		let (s, h) = allocate_viewport(&mut pool, 100, 100, false, 1, 0xC0).unwrap();
		assert_eq!(h, 100);
		assert_eq!(s.drawing(), s.visible());
		assert!(!s.is_double_buffered());
		let row = s.drawing().row(99).unwrap();
		assert_eq!(row.as_ptr() as usize % DMA_ALIGN, 0);
		assert_eq!(unsafe { *row.as_ptr() }, 0xC0);
		assert!(s.drawing().row(100).is_none());
	}

	#[test]
	fn double_buffered_tables_differ() {
		let mut pool = BumpPool::new(test_region(64 * 1024));
		let (mut s, h) = allocate_viewport(&mut pool, 64, 50, true, 1, 0).unwrap();
		assert_eq!(h, 50);
		let first_drawing = s.drawing();
		let first_visible = s.visible();
		assert_ne!(first_drawing, first_visible);
		for n in 1..=5 {
			s.swap();
			if n % 2 == 1 {
				assert_eq!(s.visible(), first_drawing);
				assert_eq!(s.drawing(), first_visible);
			} else {
				assert_eq!(s.visible(), first_visible);
			}
		}
	}

	#[test]
	fn memory_pressure_reduces_height_only() {
		// Room for the table and about 40 rows of 100 bytes
		let mut pool = BumpPool::new(test_region(480 * 8 + 40 * 100));
		let (s, h) = allocate_viewport(&mut pool, 100, 480, false, 4, 0).unwrap();
		assert!(h < 480);
		assert_eq!(h % 4, 0);
		assert!(h >= 36);
		assert_eq!(s.drawing().len(), h);
	}

	#[test]
	fn rows_split_across_pools() {
		let mut set: PoolSet<4> = PoolSet::new();
		set.add(BumpPool::new(test_region(2400))).ok().unwrap();
		set.add(BumpPool::new(test_region(1400))).ok().unwrap();
		set.add(BumpPool::new(test_region(1000))).ok().unwrap();
		let (s, h) = allocate_viewport(&mut set, 100, 40, false, 1, 0).unwrap();
		assert_eq!(h, 40);
		let t = s.drawing();
		for y in 0..h {
			let row = t.row(y).unwrap().as_ptr() as usize;
			assert_eq!(row % DMA_ALIGN, 0);
		}
		let used: usize = set.pools().iter().filter(|p| p.used() > 0).count();
		assert!(used >= 2);
	}

	#[test]
	fn nothing_fits() {
		let mut pool = BumpPool::new(test_region(64));
		assert_eq!(
			allocate_viewport(&mut pool, 100, 10, false, 1, 0).map(|(_, h)| h),
			Err(Error::OutOfMemory)
		);
	}

	#[test]
	fn surface_rows() {
		let mut pool = BumpPool::new(test_region(4096));
		let (s, _) = allocate_viewport(&mut pool, 10, 4, false, 1, 0).unwrap();
		let mut surface = unsafe { Surface::new(s.drawing(), 10) };
		surface.row_mut(1).unwrap()[3] = 7;
		surface.copy_row(1, 2);
		assert_eq!(surface.row(2).unwrap()[3], 7);
		assert_eq!(surface.height(), 4);
		assert!(surface.row(4).is_none());
	}

	#[test]
	fn line_ring_wraps() {
		let mut pool = BumpPool::new(test_region(4096));
		let ring = LineRing::allocate(&mut pool, 4, 10, 0x55).unwrap();
		assert_eq!(ring.slot(1), ring.slot(5));
		assert_ne!(ring.slot(0), ring.slot(1));
		assert_eq!(ring.slot(1).as_ptr() as usize - ring.slot(0).as_ptr() as usize, 12);
		assert!(unsafe { ring.slot_mut(3) }.iter().all(|b| *b == 0x55));
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
