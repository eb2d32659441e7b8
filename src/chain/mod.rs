//! # Descriptor chains
//!
//! A video frame is sent as a cycle of DMA descriptors. Each one points at
//! some samples and says how many to send; the output peripheral walks the
//! cycle forever without any help from the CPU. Blanking intervals and
//! sync pulses point into two pre-filled blank lines, and viewport lines
//! point at the viewport rows (or, in line-rendered mode, at a small ring of
//! line buffers).
//!
//! The descriptors live in an arena and link to each other by index. The
//! number of descriptors a frame needs is known in closed form, so the arena
//! can be allocated before the viewport, from the same DMA-capable memory.
//!
//! Once a chain is running, only two things may change: the `buf` of view
//! descriptors (panning, and re-pointing at a new row table), and the `next`
//! of the head descriptor (descriptor-level double buffering). Both are
//! single-word stores.

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


// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

use crate::config::{OutputMode, DMA_ALIGN, LINE_BUFFER_COUNT};
use crate::error::{Error, Result};
use crate::memory::{align_up, allocate_array, DmaMemory};
use crate::timing::{ScanStart, Segment, Timing};
use crate::viewport::{LineRing, RowTable, Viewport};
use core::alloc::Layout;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Things the interrupt handler needs to know about a descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flags(u8);

/// What a descriptor is for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
	/// The zero-length node that selects which of two chains runs next
	Head,
	/// A whole blank line
	Blank,
	/// Part of a blank line, either side of the viewport
	Pad,
	/// A viewport row, straight from the row table
	View {
		/// Which viewport row, before panning
		row: u16,
	},
	/// A viewport row, via the line ring
	Line {
		/// Which viewport row
		row: u16,
	},
}

/// One node in a chain.
#[repr(C)]
#[derive(Debug)]
pub struct Descriptor {
	buf: AtomicPtr<u8>,
	len: u32,
	next: AtomicUsize,
	flags: Flags,
	role: Role,
}

/// Where view descriptors get their samples from, one per chain copy.
#[derive(Debug, Copy, Clone)]
pub enum ViewSource {
	/// Rows of finished samples
	Rows(RowTable),
	/// The line ring
	Lines(LineRing),
}

/// Everything about the frame, apart from where the samples are.
#[derive(Debug, Clone, Copy)]
pub struct FrameLayout<'a> {
	/// The video timing
	pub timing: &'a Timing,
	/// Where the viewport sits
	pub viewport: Viewport,
	/// Direct or line-rendered
	pub mode: OutputMode,
}

/// The two pre-filled blank lines every blank descriptor points into.
#[derive(Debug, Copy, Clone)]
pub struct BlankLines {
	plain: NonNull<u8>,
	vsync: NonNull<u8>,
	len: usize,
}

/// An arena of descriptors, holding one frame (or two, when double
/// buffered at descriptor level).
#[derive(Debug)]
pub struct Chain {
	nodes: NonNull<Descriptor>,
	capacity: usize,
	len: usize,
	frame_nodes: usize,
	copies: usize,
	head: Option<usize>,
	visible: usize,
}

/// Walks one frame of a chain, starting at its entry node.
pub struct Walk<'a> {
	chain: &'a Chain,
	next: Option<usize>,
	remaining: usize,
}

/// Appends descriptors to a chain arena.
struct Emitter {
	nodes: NonNull<Descriptor>,
	idx: usize,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Flags {
	/// No flags.
	pub const NONE: Flags = Flags(0);
	/// Raise the retrace interrupt once this node has been sent.
	pub const EOF: Flags = Flags(1 << 0);
	/// First viewport row of a frame (line-rendered mode).
	pub const FRAME_START: Flags = Flags(1 << 1);

	/// Are all of `other`'s flags set?
	pub const fn contains(&self, other: Flags) -> bool {
		self.0 & other.0 == other.0
	}

	/// The raw bits.
	pub const fn bits(&self) -> u8 {
		self.0
	}
}

impl core::ops::BitOr for Flags {
	type Output = Flags;

	fn bitor(self, rhs: Flags) -> Flags {
		Flags(self.0 | rhs.0)
	}
}

impl Descriptor {
	/// The samples this node sends.
	pub fn buf(&self) -> *const u8 {
		self.buf.load(Ordering::Acquire)
	}

	/// How many samples this node sends.
	pub fn len(&self) -> usize {
		self.len as usize
	}

	/// Does this node send nothing at all?
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Index of the node sent after this one.
	pub fn next(&self) -> usize {
		self.next.load(Ordering::Acquire)
	}

	/// Interrupt flags.
	pub fn flags(&self) -> Flags {
		self.flags
	}

	/// What this node is for.
	pub fn role(&self) -> Role {
		self.role
	}

	fn set_buf(&self, buf: NonNull<u8>) {
		self.buf.store(buf.as_ptr(), Ordering::Release);
	}
}

impl ViewSource {
	/// Where viewport row `row` comes from.
	fn row(&self, row: usize) -> Option<NonNull<u8>> {
		match self {
			ViewSource::Rows(table) => table.row(row),
			ViewSource::Lines(ring) => Some(ring.slot(row)),
		}
	}
}

// Safety: blank lines are written once, before any chain points at them,
// and only read afterwards.
unsafe impl Send for BlankLines {}
unsafe impl Sync for BlankLines {}

impl BlankLines {
	/// Allocate and fill the two blank lines for a timing.
	pub fn allocate<M: DmaMemory + ?Sized>(memory: &mut M, timing: &Timing) -> Result<BlankLines> {
		let len = timing.h_total();
		let layout = Layout::from_size_align(align_up(len, DMA_ALIGN), DMA_ALIGN)
			.map_err(|_| Error::OutOfMemory)?;
		let plain = memory.allocate(layout).ok_or(Error::OutOfMemory)?;
		let vsync = memory.allocate(layout).ok_or(Error::OutOfMemory)?;
		let lines = BlankLines { plain, vsync, len };
		lines.fill(timing);
		Ok(lines)
	}

	/// Write black samples, with an HSync pulse in the right place.
	///
	/// The timing must have the same `h_total` the lines were allocated for.
	pub fn fill(&self, timing: &Timing) {
		let sync_at = timing.segment_offset(Segment::Sync);
		let sync_end = sync_at + timing.h_sync as usize;
		for (line, vsync) in [(self.plain, false), (self.vsync, true)] {
			// Safety: each line is `len` bytes long and nothing is streaming it
			let samples = unsafe { core::slice::from_raw_parts_mut(line.as_ptr(), self.len) };
			samples.fill(timing.sync_bits(false, vsync));
			let end = sync_end.min(self.len);
			samples[sync_at.min(end)..end].fill(timing.sync_bits(true, vsync));
		}
	}

	/// The blank line without VSync.
	pub fn plain(&self) -> NonNull<u8> {
		self.plain
	}

	/// The blank line with VSync asserted.
	pub fn vsync(&self) -> NonNull<u8> {
		self.vsync
	}

	/// Samples per line.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Are the lines empty?
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// A pointer `offset` samples into the plain line.
	fn plain_at(&self, offset: usize) -> NonNull<u8> {
		// Safety: callers only ask for offsets inside the line
		unsafe { NonNull::new_unchecked(self.plain.as_ptr().add(offset.min(self.len))) }
	}
}

/// How many descriptors one chain copy needs for this timing and viewport.
///
/// Every logical line is sent `scan_count` times. Each send is one node, plus
/// two or three for lines with viewport pixels, depending on where the
/// starting block puts the blank padding.
pub fn frame_node_count(timing: &Timing, viewport: &Viewport) -> usize {
	let scan = timing.scan_count as usize;
	let extra = match timing.h_starting_block {
		ScanStart::FrontPorch => (viewport.right_pad(timing) > 0) as usize,
		ScanStart::Sync | ScanStart::BackPorch => 1,
		ScanStart::VisibleArea => (viewport.col > 0) as usize,
	};
	scan * (timing.v_total() + viewport.height) + scan * viewport.height * extra
}

/// How many descriptors the whole arena needs: `copies` frames, plus a head
/// node when there is more than one copy.
pub fn node_count(timing: &Timing, viewport: &Viewport, copies: usize) -> usize {
	frame_node_count(timing, viewport) * copies + (copies > 1) as usize
}

impl Emitter {
	fn push(&mut self, buf: NonNull<u8>, len: usize, flags: Flags, role: Role) {
		let idx = self.idx;
		// Safety: the caller checked the arena has room for every node
		unsafe {
			self.nodes.as_ptr().add(idx).write(Descriptor {
				buf: AtomicPtr::new(buf.as_ptr()),
				len: len as u32,
				next: AtomicUsize::new(idx + 1),
				flags,
				role,
			});
		}
		self.idx += 1;
	}
}

// Safety: the arena belongs to whoever owns the chain. Shared access only
// touches atomics.
unsafe impl Send for Chain {}
unsafe impl Sync for Chain {}

impl Chain {
	/// Allocate an arena for `capacity` descriptors.
	pub fn allocate<M: DmaMemory + ?Sized>(memory: &mut M, capacity: usize) -> Result<Chain> {
		let nodes = allocate_array::<Descriptor, M>(memory, capacity.max(1), DMA_ALIGN)
			.ok_or(Error::OutOfMemory)?;
		Ok(Chain {
			nodes,
			capacity,
			len: 0,
			frame_nodes: 0,
			copies: 0,
			head: None,
			visible: 0,
		})
	}

	/// Fill the arena with one frame per view source.
	///
	/// Two sources give a chain that is double buffered at descriptor level:
	/// a head node followed by two frames, each ending back at the head. The
	/// first source is visible to begin with.
	pub fn build(&mut self, layout: &FrameLayout<'_>, blanks: &BlankLines, sources: &[ViewSource]) -> Result<()> {
		let timing = layout.timing;
		let vp = layout.viewport;
		let copies = sources.len();
		if copies == 0 || copies > 2 || blanks.len() != timing.h_total() {
			return Err(Error::InvalidTiming);
		}
		let needed = node_count(timing, &vp, copies);
		if needed > self.capacity {
			return Err(Error::ChainTooLong);
		}

		let mut emit = Emitter {
			nodes: self.nodes,
			idx: 0,
		};
		self.head = None;
		if copies > 1 {
			self.head = Some(0);
			emit.push(blanks.plain(), 0, Flags::NONE, Role::Head);
		}

		let frame_nodes = frame_node_count(timing, &vp);
		for source in sources {
			let first = emit.idx;
			self.emit_frame(&mut emit, layout, blanks, source);
			debug_assert_eq!(emit.idx - first, frame_nodes);
			let last = emit.idx - 1;
			// Safety: `last` was just written
			let last = unsafe { &*self.nodes.as_ptr().add(last) };
			last.next.store(self.head.unwrap_or(first), Ordering::Relaxed);
		}

		self.len = emit.idx;
		self.frame_nodes = frame_nodes;
		self.copies = copies;
		self.visible = 0;
		if let Some(head) = self.head {
			self.nodes()[head].next.store(self.start(0), Ordering::Release);
		}
		debug!(
			"chain: {} nodes, {} per frame, {} copies",
			self.len,
			frame_nodes,
			copies
		);
		Ok(())
	}

	fn emit_frame(&self, emit: &mut Emitter, layout: &FrameLayout<'_>, blanks: &BlankLines, source: &ViewSource) {
		let timing = layout.timing;
		let vp = layout.viewport;
		let h_total = timing.h_total();
		let lead = timing.segment_offset(Segment::Visible) + vp.col;
		let trail = h_total - lead - vp.width;
		let v_visible = timing.v_visible as usize;
		let v_sync_start = v_visible + timing.v_front_porch as usize;
		let v_sync_end = v_sync_start + timing.v_sync as usize;
		let batch = LINE_BUFFER_COUNT / 2;

		for line in 0..timing.v_total() {
			for scan in 0..timing.scan_count as usize {
				let mut flags = Flags::NONE;
				if layout.mode == OutputMode::Direct && line == v_visible && scan == 0 {
					flags = Flags::EOF;
				}
				if line >= v_sync_start && line < v_sync_end {
					emit.push(blanks.vsync(), h_total, flags, Role::Blank);
				} else if line >= v_visible || !vp.contains_line(line) {
					emit.push(blanks.plain(), h_total, flags, Role::Blank);
				} else {
					let row = line - vp.row;
					if lead > 0 {
						emit.push(blanks.plain(), lead, Flags::NONE, Role::Pad);
					}
					if scan > 0 && timing.multi_scan_blank {
						emit.push(blanks.plain_at(lead), vp.width, Flags::NONE, Role::Pad);
					} else {
						let buf = source.row(row).unwrap_or_else(|| blanks.plain_at(lead));
						let (role, flags) = match source {
							ViewSource::Rows(_) => (Role::View { row: row as u16 }, Flags::NONE),
							ViewSource::Lines(_) => {
								let mut flags = Flags::NONE;
								if scan == 0 && row % batch == 0 {
									flags = Flags::EOF;
									if row == 0 {
										flags = flags | Flags::FRAME_START;
									}
								}
								(Role::Line { row: row as u16 }, flags)
							}
						};
						emit.push(buf, vp.width, flags, role);
					}
					if trail > 0 {
						emit.push(blanks.plain_at(lead + vp.width), trail, Flags::NONE, Role::Pad);
					}
				}
			}
		}
	}

	/// How many nodes the arena has room for.
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// How many nodes were built.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Has nothing been built yet?
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Nodes in one frame copy.
	pub fn frame_nodes(&self) -> usize {
		self.frame_nodes
	}

	/// One or two frame copies.
	pub fn copies(&self) -> usize {
		self.copies
	}

	/// The head node, when double buffered at descriptor level.
	pub fn head(&self) -> Option<usize> {
		self.head
	}

	/// The node the peripheral must start from.
	pub fn entry(&self) -> usize {
		self.head.unwrap_or(0)
	}

	/// First node of a frame copy.
	pub fn start(&self, copy: usize) -> usize {
		self.head.map_or(0, |_| 1) + copy * self.frame_nodes
	}

	/// Which copy runs next time round.
	pub fn visible_copy(&self) -> usize {
		self.visible
	}

	/// All the built nodes.
	pub fn nodes(&self) -> &[Descriptor] {
		// Safety: the first `len` nodes have been written
		unsafe { core::slice::from_raw_parts(self.nodes.as_ptr(), self.len) }
	}

	/// The nodes of one frame copy.
	pub fn copy_nodes(&self, copy: usize) -> &[Descriptor] {
		let start = self.start(copy);
		&self.nodes()[start..start + self.frame_nodes]
	}

	/// Look up one node.
	pub fn node(&self, index: usize) -> Option<&Descriptor> {
		self.nodes().get(index)
	}

	/// The first node the peripheral sends samples from. Skips the head.
	pub fn first_sent(&self) -> Option<usize> {
		let entry = self.entry();
		match self.node(entry) {
			Some(node) if !node.is_empty() => Some(entry),
			Some(_) => self.following(entry),
			None => None,
		}
	}

	/// The node sent after `index`, following the links past the head.
	pub fn following(&self, index: usize) -> Option<usize> {
		let mut next = self.node(index)?.next();
		for _ in 0..self.len {
			let node = self.node(next)?;
			if !node.is_empty() {
				return Some(next);
			}
			next = node.next();
		}
		None
	}

	/// Re-point view nodes so that view row `r` shows table row
	/// `(r + offset) % height`. `tables` holds one table per copy.
	///
	/// Only `buf` is written, so this is safe while the chain is running.
	pub fn pan(&self, tables: &[RowTable], offset: usize) {
		for copy in 0..self.copies {
			let Some(table) = tables.get(copy).or(tables.first()) else {
				return;
			};
			if table.is_empty() {
				continue;
			}
			for node in self.copy_nodes(copy) {
				if let Role::View { row } = node.role {
					if let Some(buf) = table.row((row as usize + offset) % table.len()) {
						node.set_buf(buf);
					}
				}
			}
		}
	}

	/// Make `copy` the one that runs from the next frame on.
	///
	/// The head node is only read at a frame boundary, so the switch never
	/// happens mid-frame. Does nothing without a head node.
	pub fn redirect(&mut self, copy: usize) {
		if let Some(head) = self.head {
			let copy = copy % self.copies;
			self.nodes()[head].next.store(self.start(copy), Ordering::Release);
			self.visible = copy;
		}
	}

	/// Run the other copy from the next frame on.
	pub fn swap(&mut self) {
		if self.head.is_some() {
			self.redirect(self.visible ^ 1);
		}
	}

	/// Walk one frame, as the peripheral would.
	pub fn walk(&self) -> Walk<'_> {
		Walk {
			chain: self,
			next: if self.is_empty() { None } else { Some(self.entry()) },
			remaining: self.len,
		}
	}

	/// Samples in one pass of the walk. Equals the timing's frame samples.
	pub fn frame_samples(&self) -> usize {
		self.walk().map(|d| d.len()).sum()
	}
}

impl<'a> Iterator for Walk<'a> {
	type Item = &'a Descriptor;

	fn next(&mut self) -> Option<&'a Descriptor> {
		let idx = self.next?;
		if self.remaining == 0 {
			return None;
		}
		self.remaining -= 1;
		let node = self.chain.node(idx)?;
		let next = node.next();
		self.next = if next == self.chain.entry() { None } else { Some(next) };
		Some(node)
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
