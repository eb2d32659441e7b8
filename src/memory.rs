//! # DMA-capable memory
//!
//! Everything the output peripheral reads (descriptors, blank lines, viewport
//! rows and line buffers) must come from memory its DMA engine can reach.
//! That is a property of the platform, so the video code only sees the
//! [`DmaMemory`] trait.
//!
//! [`BumpPool`] hands out aligned blocks from a fixed region and frees them
//! all at once. That matches how a video mode uses memory: everything is
//! allocated by `set_resolution` and thrown away by the next one.
//! [`PoolSet`] joins several discontiguous regions (e.g. the striped and
//! non-striped SRAM banks on an RP2040) so a large viewport can be split
//! across them.

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

use core::alloc::Layout;
use core::ptr::NonNull;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// A source of memory the scan-out DMA engine can read.
pub trait DmaMemory {
	/// Allocate a block. Returns `None` if no single free block is big enough.
	fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>>;

	/// The largest block `allocate` could currently return with the given
	/// alignment.
	fn largest_free_block(&self, align: usize) -> usize;

	/// Release every block handed out so far.
	///
	/// Nothing allocated before this call may be used afterwards. The video
	/// controller stops the peripheral and drops its chain before calling it.
	fn free_all(&mut self);
}

/// A bump allocator over one fixed region of memory.
pub struct BumpPool {
	base: NonNull<u8>,
	size: usize,
	used: usize,
	peak: usize,
	failures: usize,
}

/// Up to `N` [`BumpPool`]s, used as one [`DmaMemory`].
pub struct PoolSet<const N: usize> {
	pools: heapless::Vec<BumpPool, N>,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

/// Allocate space for `len` values of type `T`, aligned to at least `align`.
///
/// The memory is not initialised.
pub fn allocate_array<T, M: DmaMemory + ?Sized>(
	memory: &mut M,
	len: usize,
	align: usize,
) -> Option<NonNull<T>> {
	let layout = Layout::array::<T>(len).ok()?.align_to(align).ok()?;
	memory.allocate(layout).map(NonNull::cast)
}

/// Round `value` up to the next multiple of `align` (a power of two).
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
	(value + align - 1) & !(align - 1)
}

// Safety: the pool is the only thing holding `base` and it has no thread
// affinity.
unsafe impl Send for BumpPool {}

impl BumpPool {
	/// Take ownership of a region of DMA-capable memory.
	pub fn new(region: &'static mut [u8]) -> BumpPool {
		let size = region.len();
		BumpPool {
			base: NonNull::from(region).cast(),
			size,
			used: 0,
			peak: 0,
			failures: 0,
		}
	}

	/// Bytes handed out since the last `free_all`, padding included.
	pub fn used(&self) -> usize {
		self.used
	}

	/// Highest `used` value ever seen.
	pub fn peak(&self) -> usize {
		self.peak
	}

	/// Total size of the region.
	pub fn capacity(&self) -> usize {
		self.size
	}

	/// How many allocations this pool has refused.
	pub fn failure_count(&self) -> usize {
		self.failures
	}

	/// Bytes of padding needed before the next block of this alignment.
	fn padding(&self, align: usize) -> usize {
		let next = self.base.as_ptr() as usize + self.used;
		align_up(next, align) - next
	}
}

impl DmaMemory for BumpPool {
	fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
		let start = self.used + self.padding(layout.align());
		let end = start.checked_add(layout.size())?;
		if end > self.size || layout.size() == 0 {
			self.failures += 1;
			return None;
		}
		self.used = end;
		self.peak = self.peak.max(end);
		// Safety: start < size, so this stays inside the region.
		NonNull::new(unsafe { self.base.as_ptr().add(start) })
	}

	fn largest_free_block(&self, align: usize) -> usize {
		self.size
			.saturating_sub(self.used)
			.saturating_sub(self.padding(align))
	}

	fn free_all(&mut self) {
		self.used = 0;
	}
}

impl<const N: usize> PoolSet<N> {
	/// Make an empty set.
	pub const fn new() -> PoolSet<N> {
		PoolSet {
			pools: heapless::Vec::new(),
		}
	}

	/// Add a pool. Gives it back if the set is full.
	pub fn add(&mut self, pool: BumpPool) -> Result<(), BumpPool> {
		self.pools.push(pool)
	}

	/// Look at the pools in this set.
	pub fn pools(&self) -> &[BumpPool] {
		&self.pools
	}
}

impl<const N: usize> Default for PoolSet<N> {
	fn default() -> PoolSet<N> {
		PoolSet::new()
	}
}

impl<const N: usize> DmaMemory for PoolSet<N> {
	/// Allocates from the pool with the smallest free block that fits, which
	/// keeps the big blocks for the viewport.
	fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
		let best = self
			.pools
			.iter()
			.enumerate()
			.map(|(idx, p)| (idx, p.largest_free_block(layout.align())))
			.filter(|(_, free)| *free >= layout.size())
			.min_by_key(|(_, free)| *free)
			.map(|(idx, _)| idx)?;
		self.pools[best].allocate(layout)
	}

	fn largest_free_block(&self, align: usize) -> usize {
		self.pools
			.iter()
			.map(|p| p.largest_free_block(align))
			.max()
			.unwrap_or(0)
	}

	fn free_all(&mut self) {
		for pool in self.pools.iter_mut() {
			pool.free_all();
		}
	}
}

/// Leak a zeroed heap buffer, to stand in for DMA memory on a host.
#[cfg(test)]
pub(crate) fn test_region(size: usize) -> &'static mut [u8] {
	Box::leak(vec![0u8; size].into_boxed_slice())
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------


// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
