//! # RP2040 scan-out
//!
//! PIO0 state machine 0 shifts one byte per sample onto GPIO0 to GPIO7: the
//! RGB222 colour bits on GPIO0 to GPIO5, H-Sync on GPIO6 and V-Sync on GPIO7.
//! The state machine's clock divider sets the sample clock.
//!
//! The RP2040 DMA engine cannot follow a linked list, so the chain is copied
//! into a table of [`ControlBlock`]s, one per descriptor, and three channels
//! walk the table without any help from the CPU:
//!
//! * The data channel sends one descriptor's samples to the PIO FIFO, then
//!   triggers the control channel.
//! * The control channel copies the next control block into the data
//!   channel's registers, which starts it again.
//! * At the end of a frame the data channel triggers the reload channel
//!   instead, which points the control channel back at the start of the
//!   table for the visible frame copy.
//!
//! Only descriptors with the end-of-frame flag raise `DMA_IRQ_0`. The handler
//! must call `VideoController::on_dma_interrupt`, which works out which
//! descriptor it was through [`PioScanout::acknowledge`]. A late handler
//! delays the drawing, never the picture.

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

use core::sync::atomic::{AtomicU32, Ordering};

use crate::chain::{Chain, Flags};
use crate::error::{Error, Result};
use crate::peripheral::ScanoutPeripheral;
use crate::scheduler::CycleCounter;
use fugit::HertzU32;
use rp2040_hal::{
	pac,
	pio::{
		Buffers, InstallError, PIOBuilder, PIOExt, PinDir, Running, ShiftDirection, StateMachine,
		Stopped, Tx, SM0,
	},
};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

type Sm = (pac::PIO0, SM0);

enum Machine {
	Stopped(StateMachine<Sm, Stopped>),
	Running(StateMachine<Sm, Running>),
}

/// One transfer for the data channel, laid out like the channel's first
/// four registers so the control channel can copy it straight in.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct ControlBlock {
	read_addr: u32,
	write_addr: u32,
	trans_count: u32,
	ctrl: u32,
}

/// Sends a descriptor chain out of PIO0, through a table of DMA control
/// blocks.
pub struct PioScanout {
	dma: pac::DMA,
	machine: Option<Machine>,
	fifo: Tx<Sm>,
	system_clock: HertzU32,
	/// Clock divider, 16.8 fixed point
	divisor: (u16, u8),
	blocks: &'static mut [ControlBlock],
	/// Control blocks per frame copy
	frame_blocks: usize,
	/// Offsets, within a frame copy, of the descriptors that interrupt
	marks: heapless::Vec<u16, MAX_MARKS>,
	/// The frame copy the last interrupt came from
	last_copy: usize,
}

/// The RP2040 timer, which counts microseconds.
pub struct TimerCounter(rp2040_hal::Timer);

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// DMA channel that feeds the PIO FIFO
const DATA_CHAN: usize = 0;

/// DMA channel that loads the data channel from the control block table
const CONTROL_CHAN: usize = 1;

/// DMA channel that rewinds the control channel at the end of each frame
const RELOAD_CHAN: usize = 2;

/// Lowest pin the state machine drives
const FIRST_PIN: u8 = 0;

/// Pins the state machine drives
const PIN_COUNT: u8 = 8;

/// Most interrupting descriptors in one frame
const MAX_MARKS: usize = 512;

/// `TREQ_SEL` value for "as fast as possible"
const TREQ_UNPACED: u8 = 0x3F;

/// The control channel writes four words into a 16 byte ring
const CONTROL_RING_BITS: u8 = 4;

/// `CTRL` bits, for the control words in the table
const CTRL_EN: u32 = 1 << 0;
const CTRL_INCR_READ: u32 = 1 << 4;
const CTRL_CHAIN_TO_SHIFT: u32 = 11;
const CTRL_TREQ_SEL_SHIFT: u32 = 15;
const CTRL_IRQ_QUIET: u32 = 1 << 21;

/// Where the reload channel gets the control table address from
static FRAME_START: AtomicU32 = AtomicU32::new(0);

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl ControlBlock {
	/// A block that sends nothing.
	pub const EMPTY: ControlBlock = ControlBlock {
		read_addr: 0,
		write_addr: 0,
		trans_count: 0,
		ctrl: 0,
	};
}

impl PioScanout {
	/// Take PIO0 and the DMA engine. The pins must already be set to
	/// `FunctionPio0`, and the DMA engine must be out of reset.
	///
	/// `blocks` needs one entry per descriptor in every frame copy of the
	/// largest chain that will be started.
	pub fn new(
		pio: pac::PIO0,
		dma: pac::DMA,
		resets: &mut pac::RESETS,
		system_clock: HertzU32,
		blocks: &'static mut [ControlBlock],
	) -> core::result::Result<PioScanout, InstallError> {
		let (mut pio, sm0, _sm1, _sm2, _sm3) = pio.split(resets);

		// Autopull every 8 bits, so each FIFO write is one sample. Pins hold
		// the last sample between transfers.
		let program = pio_proc::pio_asm!(
			".wrap_target"
			"out pins, 8"
			".wrap"
		);
		let installed = pio.install(&program.program)?;
		let (mut sm, _, fifo) = PIOBuilder::from_installed_program(installed)
			.buffers(Buffers::OnlyTx)
			.out_pins(FIRST_PIN, PIN_COUNT)
			.autopull(true)
			.out_shift_direction(ShiftDirection::Right)
			.pull_threshold(8)
			.build(sm0);
		sm.set_pindirs((FIRST_PIN..FIRST_PIN + PIN_COUNT).map(|x| (x, PinDir::Output)));

		Ok(PioScanout {
			dma,
			machine: Some(Machine::Stopped(sm)),
			fifo,
			system_clock,
			divisor: (1, 0),
			blocks,
			frame_blocks: 0,
			marks: heapless::Vec::new(),
			last_copy: 0,
		})
	}

	/// The data channel's control word for one descriptor.
	fn data_ctrl(&self, interrupt: bool, last: bool) -> u32 {
		let chain_to = (if last { RELOAD_CHAN } else { CONTROL_CHAN }) as u32;
		let mut ctrl = CTRL_EN
			| CTRL_INCR_READ
			| (chain_to << CTRL_CHAIN_TO_SHIFT)
			| (u32::from(self.fifo.dreq_value()) << CTRL_TREQ_SEL_SHIFT);
		if !interrupt {
			ctrl |= CTRL_IRQ_QUIET;
		}
		ctrl
	}

	/// Copy every frame copy of `chain` into the control block table.
	fn fill(&mut self, chain: &Chain) -> Result<()> {
		let frame_blocks = chain.frame_nodes();
		let copies = chain.copies();
		if frame_blocks == 0 || frame_blocks > usize::from(u16::MAX) {
			return Err(Error::ChainTooLong);
		}
		if frame_blocks * copies > self.blocks.len() {
			warn!(
				"pio: {} control blocks needed, {} available",
				frame_blocks * copies,
				self.blocks.len()
			);
			return Err(Error::ChainTooLong);
		}
		let fifo = self.fifo.fifo_address() as usize as u32;
		self.marks.clear();
		for copy in 0..copies {
			for (offset, node) in chain.copy_nodes(copy).iter().enumerate() {
				let interrupt = node.flags().contains(Flags::EOF);
				if copy == 0 && interrupt {
					self.marks
						.push(offset as u16)
						.map_err(|_| Error::ChainTooLong)?;
				}
				let block = ControlBlock {
					read_addr: node.buf() as usize as u32,
					write_addr: fifo,
					trans_count: node.len() as u32,
					ctrl: self.data_ctrl(interrupt, offset + 1 == frame_blocks),
				};
				self.blocks[copy * frame_blocks + offset] = block;
			}
		}
		self.frame_blocks = frame_blocks;
		self.last_copy = chain.visible_copy();
		Ok(())
	}

	/// Address of the first control block of a frame copy.
	fn frame_start(&self, copy: usize) -> u32 {
		self.blocks[copy * self.frame_blocks..].as_ptr() as usize as u32
	}

	/// Turn off and abort all three channels.
	fn halt_channels(&mut self) {
		let mask = (1 << DATA_CHAN) | (1 << CONTROL_CHAN) | (1 << RELOAD_CHAN);
		// Aborting a channel that another can still trigger does not stick,
		// so disable them all first.
		for chan in [RELOAD_CHAN, CONTROL_CHAN, DATA_CHAN] {
			self.dma
				.ch(chan)
				.ch_al1_ctrl()
				.modify(|_, w| w.en().clear_bit());
		}
		self.dma.chan_abort().write(|w| unsafe { w.bits(mask) });
		while self.dma.chan_abort().read().bits() != 0 {}
	}

	/// Is the control or reload channel part way through loading a block?
	fn loading(&self) -> bool {
		self.dma.ch(CONTROL_CHAN).ch_ctrl_trig().read().busy().bit_is_set()
			|| self.dma.ch(RELOAD_CHAN).ch_ctrl_trig().read().busy().bit_is_set()
	}
}

/// The 16.8 fixed-point divider for `wanted` from `system`, if there is one.
fn divisor_for(system: HertzU32, wanted: HertzU32) -> Option<(u16, u8)> {
	let wanted = u64::from(wanted.to_Hz());
	if wanted == 0 {
		return None;
	}
	let div256 = (u64::from(system.to_Hz()) * 256 + wanted / 2) / wanted;
	let int = div256 >> 8;
	if !(1..=0xFFFF).contains(&int) {
		return None;
	}
	Some((int as u16, (div256 & 0xFF) as u8))
}

/// The clock a divider gives.
fn divided(system: HertzU32, (int, frac): (u16, u8)) -> HertzU32 {
	let div256 = (u64::from(int) << 8) | u64::from(frac);
	HertzU32::from_raw((u64::from(system.to_Hz()) * 256 / div256) as u32)
}

impl ScanoutPeripheral for PioScanout {
	fn sample_clock(&mut self, requested: HertzU32) -> Option<HertzU32> {
		let divisor = divisor_for(self.system_clock, requested)?;
		self.divisor = divisor;
		Some(divided(self.system_clock, divisor))
	}

	fn start(&mut self, chain: &Chain) -> Result<()> {
		self.stop();
		let Some(Machine::Stopped(mut sm)) = self.machine.take() else {
			return Err(Error::NotConfigured);
		};
		if let Err(e) = self.fill(chain) {
			self.machine = Some(Machine::Stopped(sm));
			return Err(e);
		}
		sm.clock_divisor_fixed_point(self.divisor.0, self.divisor.1);
		let first = self.frame_start(chain.visible_copy());
		FRAME_START.store(first, Ordering::Release);

		let data = self.dma.ch(DATA_CHAN);
		let control = self.dma.ch(CONTROL_CHAN);
		let reload = self.dma.ch(RELOAD_CHAN);

		// Reload: one word, from FRAME_START into the control channel's
		// read address trigger
		reload
			.ch_read_addr()
			.write(|w| unsafe { w.bits(FRAME_START.as_ptr() as usize as u32) });
		reload
			.ch_write_addr()
			.write(|w| unsafe { w.bits(control.ch_al3_read_addr_trig().as_ptr() as usize as u32) });
		reload.ch_trans_count().write(|w| unsafe { w.bits(1) });
		reload.ch_al1_ctrl().write(|w| {
			w.data_size().size_word();
			w.incr_read().clear_bit();
			w.incr_write().clear_bit();
			unsafe { w.treq_sel().bits(TREQ_UNPACED) };
			unsafe { w.chain_to().bits(RELOAD_CHAN as u8) };
			unsafe { w.ring_size().bits(0) };
			w.ring_sel().clear_bit();
			w.bswap().clear_bit();
			w.irq_quiet().set_bit();
			w.en().set_bit();
			w.sniff_en().clear_bit();
			w
		});

		// Control: four words at a time, into the data channel's registers,
		// wrapping on the write side
		control
			.ch_write_addr()
			.write(|w| unsafe { w.bits(data.ch_read_addr().as_ptr() as usize as u32) });
		control.ch_trans_count().write(|w| unsafe { w.bits(4) });
		control.ch_al1_ctrl().write(|w| {
			w.data_size().size_word();
			w.incr_read().set_bit();
			w.incr_write().set_bit();
			unsafe { w.treq_sel().bits(TREQ_UNPACED) };
			unsafe { w.chain_to().bits(CONTROL_CHAN as u8) };
			unsafe { w.ring_size().bits(CONTROL_RING_BITS) };
			w.ring_sel().set_bit();
			w.bswap().clear_bit();
			w.irq_quiet().set_bit();
			w.en().set_bit();
			w.sniff_en().clear_bit();
			w
		});

		self.dma
			.ints0()
			.write(|w| unsafe { w.bits(1 << DATA_CHAN) });
		self.dma
			.inte0()
			.modify(|r, w| unsafe { w.bits(r.bits() | (1 << DATA_CHAN)) });

		// The state machine stalls on an empty FIFO, so start it first
		self.machine = Some(Machine::Running(sm.start()));
		self.dma
			.ch(CONTROL_CHAN)
			.ch_al3_read_addr_trig()
			.write(|w| unsafe { w.bits(first) });
		debug!(
			"pio: running, divisor {}+{}/256, {} control blocks",
			self.divisor.0,
			self.divisor.1,
			self.frame_blocks * chain.copies()
		);
		Ok(())
	}

	fn stop(&mut self) {
		self.dma
			.inte0()
			.modify(|r, w| unsafe { w.bits(r.bits() & !(1 << DATA_CHAN)) });
		self.halt_channels();
		self.dma
			.ints0()
			.write(|w| unsafe { w.bits(1 << DATA_CHAN) });
		self.machine = match self.machine.take() {
			Some(Machine::Running(sm)) => Some(Machine::Stopped(sm.stop())),
			other => other,
		};
	}

	fn redirect(&mut self, chain: &Chain) {
		// Read by the reload channel, so it takes effect at the next frame
		FRAME_START.store(self.frame_start(chain.visible_copy()), Ordering::Release);
	}

	fn refresh(&mut self, chain: &Chain) {
		let frame_blocks = self.frame_blocks;
		for copy in 0..chain.copies() {
			for (offset, node) in chain.copy_nodes(copy).iter().enumerate() {
				let Some(block) = self.blocks.get_mut(copy * frame_blocks + offset) else {
					return;
				};
				// Safety: a valid, aligned field. The DMA may be reading the
				// block, hence volatile.
				unsafe {
					core::ptr::write_volatile(&mut block.read_addr, node.buf() as usize as u32)
				};
			}
		}
	}

	fn acknowledge(&mut self, chain: &Chain) -> Option<usize> {
		let status = self.dma.ints0().read().bits();
		if status & (1 << DATA_CHAN) == 0 {
			return None;
		}
		self.dma
			.ints0()
			.write(|w| unsafe { w.bits(1 << DATA_CHAN) });
		if self.frame_blocks == 0 {
			return None;
		}
		// The next block is loaded a few cycles after the interrupt
		while self.loading() {}
		let base = self.blocks.as_ptr() as usize;
		let read = self.dma.ch(CONTROL_CHAN).ch_read_addr().read().bits() as usize;
		// The control channel has moved past the block being sent
		let loaded = (read.wrapping_sub(base) / core::mem::size_of::<ControlBlock>()).checked_sub(1)?;
		let copy = loaded / self.frame_blocks;
		let offset = loaded % self.frame_blocks;
		// The interrupting descriptor is the last marked one before the one
		// being sent; before any, it was the last one of the previous frame.
		let before = self.marks.partition_point(|&m| usize::from(m) < offset);
		let (copy, mark) = match before.checked_sub(1) {
			Some(i) => (copy, self.marks[i]),
			None => (self.last_copy, *self.marks.last()?),
		};
		self.last_copy = copy;
		Some(chain.start(copy) + usize::from(mark))
	}
}

impl TimerCounter {
	/// Count with the given timer.
	pub fn new(timer: rp2040_hal::Timer) -> TimerCounter {
		TimerCounter(timer)
	}
}

impl CycleCounter for TimerCounter {
	fn now(&self) -> u32 {
		self.0.get_counter_low()
	}

	fn frequency(&self) -> HertzU32 {
		HertzU32::MHz(1)
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
