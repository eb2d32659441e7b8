//! # Video Controller
//!
//! Owns a video mode (timing, viewport, descriptor chain and the memory they
//! live in) and the queue of drawing primitives that feeds it.
//!
//! Drawing happens in one of two places:
//!
//! * In direct mode, the retrace interrupt drains the queue during vertical
//!   blanking, for as long as the frame budget allows. With
//!   [`Config::direct_consumer`] set to [`ConsumerContext::Task`] the
//!   interrupt only releases the drawing task instead.
//! * In line-rendered mode the interrupt is busy expanding rows into the line
//!   ring, so it only releases a task (see
//!   [`VideoController::run_primitive_task`]) once the last visible row has
//!   been rendered.
//!
//! Two locks protect the state. The canvas (paint state, sprites, pixel
//! format) is an async mutex, held by whoever is drawing. The scan-out state
//! (chain, viewport rows, peripheral) is a blocking critical-section mutex,
//! only ever held briefly. Code that takes both takes the canvas first.

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

mod canvas;

#[cfg(test)]
mod tests;

// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

use core::cell::RefCell;
use core::future::poll_fn;
use core::ptr::NonNull;

use atomic_polyfill::{AtomicBool, AtomicU32, Ordering};
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex as BlockingMutex};
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use fugit::HertzU32;

use crate::chain::{node_count, BlankLines, Chain, FrameLayout, ViewSource};
use crate::config::{Config, OutputMode, LINE_BUFFER_COUNT, MAX_SPRITES, PALETTE_SIZE};
use crate::error::{Error, Result};
use crate::memory::DmaMemory;
use crate::peripheral::ScanoutPeripheral;
use crate::pixel::{
	colours, indexed4::Indexed4Format, rgb222::Rgb222Format, Format, PixelFormat, Rgb222, Rgb888,
};
use crate::primitive::{Primitive, Rect};
use crate::retrace::{
	Retrace, RetraceEvent, RetracePhase, ScanlineContext, ScanlineFn, ScanlineState,
};
use crate::scheduler::{Budget, BudgetPolicy, ConsumerContext, CycleCounter, Deadline};
use crate::sprite::{Sprite, Sprites};
use crate::timing::Timing;
use crate::viewport::{allocate_viewport, LineRing, RowTable, Surfaces, Viewport};

pub use canvas::Canvas;
use canvas::{Job, Target};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Drives one video output.
///
/// `Q` is the depth of the primitive queue. Share the controller between the
/// interrupt handler and tasks by reference (it is `Sync` when the memory
/// provider and peripheral are `Send`).
pub struct VideoController<M, P, C, const Q: usize>
where
	M: DmaMemory,
	P: ScanoutPeripheral,
	C: CycleCounter,
{
	config: Config,
	counter: C,
	queue: Channel<CriticalSectionRawMutex, Primitive, Q>,
	canvas: Mutex<CriticalSectionRawMutex, Canvas>,
	scanout: BlockingMutex<CriticalSectionRawMutex, RefCell<Scanout<M, P>>>,
	/// Suspension depth; the consumer does nothing while non-zero
	suspended: AtomicU32,
	background: AtomicBool,
	timeout: AtomicBool,
	/// Raised when the interrupt hands a frame to the drawing task
	retrace_signal: Signal<CriticalSectionRawMutex, ()>,
	/// Raised when a queued `SwapBuffers` has been carried out
	swap_done: Signal<CriticalSectionRawMutex, ()>,
	/// `SwapBuffers` primitives queued so far; each one's position is its
	/// ticket
	swaps_queued: AtomicU32,
	/// `SwapBuffers` primitives carried out so far
	swaps_done: AtomicU32,
	late_renders: AtomicU32,
}

/// Everything the retrace interrupt touches.
struct Scanout<M, P> {
	memory: M,
	peripheral: P,
	retrace: Retrace,
	budget_policy: BudgetPolicy,
	mode: Option<Mode>,
}

/// The current video mode.
struct Mode {
	timing: Timing,
	/// What was asked for, so the mode can be rebuilt
	request: (usize, usize),
	viewport: Viewport,
	output: OutputMode,
	sample_clock: HertzU32,
	chain: Chain,
	blanks: BlankLines,
	surfaces: Surfaces,
	ring: Option<LineRing>,
	row_bytes: usize,
	/// Output sample for each palette index
	samples: [u8; PALETTE_SIZE],
	scanline_fn: ScanlineFn,
	pan: usize,
	consumer: ConsumerContext,
	budget: Budget,
}

/// What a mode's memory has to hold, apart from the height.
#[derive(Debug, Copy, Clone)]
struct ModeShape {
	output: OutputMode,
	copies: usize,
	double_buffered: bool,
	quantum: usize,
	row_bytes: usize,
	fill: u8,
	idle: u8,
}

/// Everything a mode allocates.
struct ModeMemory {
	blanks: BlankLines,
	chain: Chain,
	ring: Option<LineRing>,
	surfaces: Surfaces,
	height: usize,
}

/// How much of the queue one pass of the consumer takes.
#[derive(Debug, Copy, Clone)]
enum Limit {
	/// Stop when the deadline passes, or at a `SwapBuffers` that is not
	/// first in the batch. Nothing happens while suspended.
	Frame(Deadline),
	/// Drain everything.
	Everything,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl<M, P, C, const Q: usize> VideoController<M, P, C, Q>
where
	M: DmaMemory,
	P: ScanoutPeripheral,
	C: CycleCounter,
{
	/// A controller with no video mode. Nothing is output until
	/// [`VideoController::set_resolution`].
	pub fn new(config: Config, memory: M, peripheral: P, counter: C) -> Self {
		VideoController {
			config,
			counter,
			queue: Channel::new(),
			canvas: Mutex::new(Canvas::new()),
			scanout: BlockingMutex::new(RefCell::new(Scanout {
				memory,
				peripheral,
				retrace: Retrace::new(config.subcarrier),
				budget_policy: config.budget_policy,
				mode: None,
			})),
			suspended: AtomicU32::new(0),
			background: AtomicBool::new(config.background_execution),
			timeout: AtomicBool::new(config.background_timeout),
			retrace_signal: Signal::new(),
			swap_done: Signal::new(),
			swaps_queued: AtomicU32::new(0),
			swaps_done: AtomicU32::new(0),
			late_renders: AtomicU32::new(0),
		}
	}

	// -------------------------------------------------------------------------
	// Modes
	// -------------------------------------------------------------------------

	/// Switch to a new video mode.
	///
	/// A `width` or `height` of zero means the whole visible area. If memory
	/// is short the viewport gets fewer rows; the returned [`Viewport`] says
	/// what was achieved. If the peripheral cannot make the sample clock, the
	/// current mode is left running and [`Error::UnsupportedClock`] comes
	/// back. Any other failure leaves no mode at all.
	pub async fn set_resolution(
		&self,
		timing: Timing,
		width: usize,
		height: usize,
		double_buffered: bool,
	) -> Result<Viewport> {
		timing.validate()?;
		let mut canvas = self.canvas.lock().await;
		let palette = canvas.palette;
		let result = self.scanout.lock(|s| {
			s.borrow_mut().set_mode(
				timing,
				(width, height),
				double_buffered,
				&self.config,
				&palette,
			)
		});
		match result {
			Ok((viewport, format)) => {
				canvas.reset(format, viewport.width, viewport.height);
				Ok(viewport)
			}
			Err(Error::UnsupportedClock) => Err(Error::UnsupportedClock),
			Err(e) => {
				canvas.clear();
				Err(e)
			}
		}
	}

	/// Parse a modeline and switch to it.
	pub async fn set_resolution_modeline(
		&self,
		modeline: &str,
		width: usize,
		height: usize,
		double_buffered: bool,
	) -> Result<Viewport> {
		let timing = Timing::from_modeline(modeline)?;
		self.set_resolution(timing, width, height, double_buffered).await
	}

	/// Stop the output and free all of its memory.
	pub async fn end(&self) {
		let mut canvas = self.canvas.lock().await;
		self.scanout.lock(|s| s.borrow_mut().stop());
		canvas.clear();
		info!("video: stopped");
	}

	/// Shift the picture on the monitor, by trading porch for porch. The
	/// viewport and its contents are untouched.
	pub fn move_screen(&self, dx: i32, dy: i32) -> Result<()> {
		self.scanout.lock(|s| s.borrow_mut().move_screen(dx, dy))
	}

	/// Make the visible area smaller (or larger, for negative values) by
	/// widening the porches, then set the mode again. The viewport is
	/// rebuilt, so its contents are lost.
	pub async fn shrink_screen(&self, sx: i32, sy: i32) -> Result<Viewport> {
		let (timing, (width, height), double_buffered) = self
			.scanout
			.lock(|s| {
				s.borrow().mode.as_ref().map(|m| {
					(
						m.timing.shrunk(sx, sy),
						m.request,
						m.surfaces.is_double_buffered(),
					)
				})
			})
			.ok_or(Error::NotConfigured)?;
		self.set_resolution(timing, width, height, double_buffered).await
	}

	/// Scroll the whole viewport up by `offset` rows, without moving any
	/// pixels: row `r` of the picture shows row `(r + offset) % height`.
	pub fn pan(&self, offset: usize) -> Result<()> {
		self.scanout.lock(|s| {
			let mut s = s.borrow_mut();
			let s = &mut *s;
			let mode = s.mode.as_mut().ok_or(Error::NotConfigured)?;
			mode.pan = offset % mode.viewport.height.max(1);
			if mode.output == OutputMode::Direct {
				mode.chain.pan(&mode.tables(), mode.pan);
				s.peripheral.refresh(&mode.chain);
			}
			trace!("video: pan {}", mode.pan);
			Ok(())
		})
	}

	/// Change one entry of the line-rendered palette. The new colour shows
	/// from the next rendered row.
	pub async fn set_palette_item(&self, index: usize, colour: Rgb888) {
		let mut canvas = self.canvas.lock().await;
		canvas.palette.set_palette_item(index, colour);
		let palette = canvas.palette;
		if let Some(Format::Indexed4(format)) = canvas.format.as_mut() {
			*format = palette;
		}
		self.scanout.lock(|s| {
			if let Some(mode) = s.borrow_mut().mode.as_mut() {
				mode.samples = palette.samples(mode.timing.sync_bits(false, false));
			}
		});
	}

	/// Change how long the line-rendered drawing task gets each frame.
	pub fn set_budget_policy(&self, policy: BudgetPolicy) {
		self.scanout.lock(|s| {
			let mut s = s.borrow_mut();
			s.budget_policy = policy;
			if let Some(mode) = s.mode.as_mut() {
				mode.update_budget(policy);
			}
		});
	}

	// -------------------------------------------------------------------------
	// Primitives
	// -------------------------------------------------------------------------

	/// Draw something.
	///
	/// When background execution is on and the mode is single buffered the
	/// primitive is queued for the retrace consumer, waiting if the queue is
	/// full. Otherwise it is drawn now, in the caller. `SwapBuffers` is
	/// always queued, and this waits until it has happened.
	pub async fn add_primitive(&self, primitive: Primitive) -> Result<()> {
		if primitive == Primitive::SwapBuffers {
			return self.swap_buffers().await;
		}
		if self.queues_primitives() {
			self.queue.send(primitive).await;
			Ok(())
		} else {
			let mut canvas = self.canvas.lock().await;
			self.draw_now(&mut canvas, &primitive)
		}
	}

	/// Like [`VideoController::add_primitive`], but never waits. The
	/// primitive comes back if the queue is full, or if it needed drawing
	/// now and someone else was drawing.
	///
	/// A `SwapBuffers` sent this way is queued but not waited for.
	pub fn try_add_primitive(&self, primitive: Primitive) -> core::result::Result<(), Primitive> {
		if primitive == Primitive::SwapBuffers {
			return self.try_queue_swap().map(|_| ()).ok_or(primitive);
		}
		if self.queues_primitives() {
			return self.queue.try_send(primitive).map_err(|e| match e {
				embassy_sync::channel::TrySendError::Full(p) => p,
			});
		}
		let Ok(mut canvas) = self.canvas.try_lock() else {
			return Err(primitive);
		};
		self.draw_now(&mut canvas, &primitive).map_err(|_| primitive)
	}

	/// Queue a buffer swap and wait until the consumer has done it.
	///
	/// Single buffered modes have nothing to swap, but the wait still marks
	/// the point where everything queued before it has been drawn. Swaps
	/// queued earlier (by anyone) do not end the wait early.
	pub async fn swap_buffers(&self) -> Result<()> {
		if !self.is_configured() {
			return Err(Error::NotConfigured);
		}
		let ticket = loop {
			if let Some(ticket) = self.try_queue_swap() {
				break ticket;
			}
			poll_fn(|cx| self.queue.poll_ready_to_send(cx)).await;
		};
		loop {
			let done = self.swaps_done.load(Ordering::Acquire);
			if reached(done, ticket) {
				if done != self.swaps_queued.load(Ordering::Acquire) {
					// The signal only wakes one waiter; pass it on
					self.swap_done.signal(());
				}
				return Ok(());
			}
			self.swap_done.wait().await;
		}
	}

	/// Queue a `SwapBuffers` and hand back its ticket, unless the queue is
	/// full.
	fn try_queue_swap(&self) -> Option<u32> {
		critical_section::with(|_| {
			self.queue.try_send(Primitive::SwapBuffers).ok()?;
			Some(self.swaps_queued.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
		})
	}

	/// Draw everything in the queue now, in the caller, with the consumer
	/// suspended.
	pub async fn process_primitives_now(&self) -> Result<()> {
		self.suspend_background_primitive_execution();
		let result = {
			let mut canvas = self.canvas.lock().await;
			self.consume(&mut canvas, Limit::Everything)
		};
		self.resume_background_primitive_execution();
		result.map(|_| ())
	}

	/// Stop the consumer. Calls nest: it starts again when every suspend has
	/// been matched by a resume.
	pub fn suspend_background_primitive_execution(&self) {
		let depth = self.suspended.fetch_add(1, Ordering::AcqRel) + 1;
		trace!("video: suspend, depth {}", depth);
	}

	/// Undo one suspend. Extra resumes are ignored.
	pub fn resume_background_primitive_execution(&self) {
		let _ = self
			.suspended
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
				Some(n.saturating_sub(1))
			});
	}

	/// Is the consumer suspended?
	pub fn is_suspended(&self) -> bool {
		self.suspended.load(Ordering::Acquire) != 0
	}

	/// Choose between queueing primitives and drawing them in the caller.
	/// Turning it off draws whatever is still queued.
	pub async fn enable_background_primitive_execution(&self, enabled: bool) {
		self.background.store(enabled, Ordering::Release);
		if !enabled && self.is_configured() {
			if let Err(e) = self.process_primitives_now().await {
				warn!("video: queued primitives not drawn: {}", e);
			}
		}
	}

	/// Choose whether the consumer stops when its budget runs out.
	pub fn enable_background_primitive_timeout(&self, enabled: bool) {
		self.timeout.store(enabled, Ordering::Release);
	}

	/// Number of primitives waiting.
	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	// -------------------------------------------------------------------------
	// Pixels and sprites
	// -------------------------------------------------------------------------

	/// Copy the colours in `rect` (inclusive, viewport coordinates) from the
	/// visible surface into `out`, row by row.
	pub async fn read_screen(&self, rect: Rect, out: &mut [Rgb222]) -> Result<()> {
		let mut canvas = self.canvas.lock().await;
		let target = self.target().ok_or(Error::NotConfigured)?;
		canvas.run(&target, Job::Read(rect, out)).map(|_| ())
	}

	/// Write `data` into `rect` (inclusive, viewport coordinates) on the
	/// drawing surface, row by row.
	pub async fn write_screen(&self, rect: Rect, data: &[Rgb888]) -> Result<()> {
		let mut canvas = self.canvas.lock().await;
		let target = self.target().ok_or(Error::NotConfigured)?;
		canvas.run(&target, Job::Write(rect, data)).map(|_| ())
	}

	/// Replace the sprites, handing back the old ones. The old sprites are
	/// taken off the screen and the new ones drawn.
	pub async fn set_sprites(
		&self,
		sprites: heapless::Vec<Sprite, MAX_SPRITES>,
	) -> heapless::Vec<Sprite, MAX_SPRITES> {
		let mut canvas = self.canvas.lock().await;
		let Some(target) = self.target() else {
			return canvas.sprites.replace(sprites);
		};
		if let Err(e) = canvas.run(&target, Job::HideSprites) {
			warn!("video: old sprites not removed: {}", e);
		}
		let old = canvas.sprites.replace(sprites);
		if let Err(e) = canvas.run(&target, Job::ShowSprites) {
			warn!("video: new sprites not drawn: {}", e);
		}
		old
	}

	/// Change the sprites in place. The screen catches up at the next batch
	/// of primitives, or at [`VideoController::refresh_sprites`].
	pub async fn with_sprites<R>(&self, f: impl FnOnce(&mut Sprites) -> R) -> R {
		let mut canvas = self.canvas.lock().await;
		f(&mut canvas.sprites)
	}

	/// Redraw the sprites where they are now.
	pub async fn refresh_sprites(&self) -> Result<()> {
		self.add_primitive(Primitive::RefreshSprites).await
	}

	// -------------------------------------------------------------------------
	// Interrupts and tasks
	// -------------------------------------------------------------------------

	/// Call from the DMA interrupt handler with the index of the descriptor
	/// that just finished.
	pub fn on_interrupt(&self, node: usize) -> RetraceEvent {
		self.handle_interrupt(|_, _| Some(node))
	}

	/// Call from the DMA interrupt handler when the peripheral steps through
	/// the chain itself (see [`ScanoutPeripheral::acknowledge`]).
	pub fn on_dma_interrupt(&self) -> RetraceEvent {
		self.handle_interrupt(|peripheral, chain| peripheral.acknowledge(chain))
	}

	fn handle_interrupt(&self, finished: impl FnOnce(&mut P, &Chain) -> Option<usize>) -> RetraceEvent {
		let (event, consumer) = self.scanout.lock(|s| {
			let mut s = s.borrow_mut();
			let s = &mut *s;
			let ignored = (RetraceEvent::Ignored, ConsumerContext::Interrupt);
			let Some(mode) = s.mode.as_ref() else {
				return ignored;
			};
			let Some(node) = finished(&mut s.peripheral, &mode.chain) else {
				return ignored;
			};
			let Some(flags) = mode.chain.node(node).map(|d| d.flags()) else {
				return ignored;
			};
			let event = s.retrace.on_node(flags, mode.output, mode.viewport.height);
			if let RetraceEvent::RenderLines { row, count, .. } = event {
				mode.render_lines(s.retrace.state(), row, count);
			}
			(event, mode.consumer)
		});
		match event {
			RetraceEvent::VerticalBlank if consumer == ConsumerContext::Task => {
				self.release_frame();
			}
			RetraceEvent::VerticalBlank => {
				match self.canvas.try_lock() {
					Ok(mut canvas) => {
						let deadline = self.deadline();
						if let Err(e) = self.consume(&mut canvas, Limit::Frame(deadline)) {
							warn!("video: frame not drawn: {}", e);
						}
					}
					Err(_) => {
						self.late_renders.fetch_add(1, Ordering::Relaxed);
					}
				}
				self.scanout.lock(|s| s.borrow_mut().retrace.blanking_done());
			}
			RetraceEvent::RenderLines { release: true, .. } => {
				self.release_frame();
			}
			_ => {}
		}
		event
	}

	/// Let the drawing task run.
	fn release_frame(&self) {
		if self.retrace_signal.signaled() {
			self.late_renders.fetch_add(1, Ordering::Relaxed);
		}
		self.retrace_signal.signal(());
	}

	/// Wait for the interrupt to release a frame, then drain the queue for as
	/// long as the budget allows.
	pub async fn process_released_frame(&self) {
		self.retrace_signal.wait().await;
		{
			let mut canvas = self.canvas.lock().await;
			let deadline = self.deadline();
			if let Err(e) = self.consume(&mut canvas, Limit::Frame(deadline)) {
				warn!("video: frame not drawn: {}", e);
			}
		}
		self.scanout.lock(|s| s.borrow_mut().retrace.blanking_done());
	}

	/// The drawing task, for line-rendered mode and for direct mode with the
	/// consumer in a task. Spawn it once and leave it running.
	pub async fn run_primitive_task(&self) -> ! {
		loop {
			self.process_released_frame().await;
		}
	}

	// -------------------------------------------------------------------------
	// Information
	// -------------------------------------------------------------------------

	/// Is a mode running?
	pub fn is_configured(&self) -> bool {
		self.scanout.lock(|s| s.borrow().mode.is_some())
	}

	/// The current viewport.
	pub fn viewport(&self) -> Option<Viewport> {
		self.with_mode(|m| m.viewport)
	}

	/// The current timing.
	pub fn timing(&self) -> Option<Timing> {
		self.with_mode(|m| m.timing.clone())
	}

	/// The sample clock the peripheral actually made.
	pub fn sample_clock(&self) -> Option<HertzU32> {
		self.with_mode(|m| m.sample_clock)
	}

	/// Is the current mode double buffered?
	pub fn is_double_buffered(&self) -> bool {
		self.with_mode(|m| m.surfaces.is_double_buffered())
			.unwrap_or(false)
	}

	/// Row `y` of the drawing surface, for code that wants to poke at pixels
	/// directly. Only valid until the next mode change.
	pub fn scanline(&self, y: usize) -> Option<NonNull<u8>> {
		self.with_mode(|m| m.surfaces.drawing().row(y)).flatten()
	}

	/// Look at the descriptor chain.
	pub fn with_chain<R>(&self, f: impl FnOnce(&Chain) -> R) -> Option<R> {
		self.with_mode(|m| f(&m.chain))
	}

	/// Where the retrace state machine thinks the scan-out is.
	pub fn retrace_phase(&self) -> RetracePhase {
		self.scanout.lock(|s| s.borrow().retrace.phase())
	}

	/// The scan-out counters.
	pub fn scanline_state(&self) -> ScanlineState {
		self.scanout.lock(|s| *s.borrow().retrace.state())
	}

	/// How many times the consumer could not run (or a frame was released
	/// before the last one had been picked up).
	pub fn late_renders(&self) -> u32 {
		self.late_renders.load(Ordering::Relaxed)
	}

	/// The drawing budget for the current mode.
	pub fn budget(&self) -> Option<Budget> {
		self.with_mode(|m| m.budget)
	}

	/// Look at the memory provider and the peripheral.
	pub fn with_hardware<R>(&self, f: impl FnOnce(&M, &P) -> R) -> R {
		self.scanout.lock(|s| {
			let s = s.borrow();
			f(&s.memory, &s.peripheral)
		})
	}

	// -------------------------------------------------------------------------
	// Internals
	// -------------------------------------------------------------------------

	fn queues_primitives(&self) -> bool {
		self.background.load(Ordering::Acquire) && !self.is_double_buffered()
	}

	fn with_mode<R>(&self, f: impl FnOnce(&Mode) -> R) -> Option<R> {
		self.scanout.lock(|s| s.borrow().mode.as_ref().map(f))
	}

	fn target(&self) -> Option<Target> {
		self.with_mode(Mode::target)
	}

	fn deadline(&self) -> Deadline {
		let budget = self.budget().unwrap_or_default();
		Deadline::start(&self.counter, budget, self.timeout.load(Ordering::Acquire))
	}

	/// Draw one primitive in the caller, with the sprites taken off first.
	fn draw_now(&self, canvas: &mut Canvas, primitive: &Primitive) -> Result<()> {
		let target = self.target().ok_or(Error::NotConfigured)?;
		canvas.run(&target, Job::HideSprites)?;
		let result = canvas.run(&target, Job::Draw(primitive));
		canvas.run(&target, Job::ShowSprites)?;
		result.map(|_| ())
	}

	/// Swap the buffers and tell whoever is waiting.
	fn execute_swap(&self) -> Option<Target> {
		let target = self.scanout.lock(|s| s.borrow_mut().swap());
		self.swaps_done.fetch_add(1, Ordering::AcqRel);
		self.swap_done.signal(());
		target
	}

	/// Take primitives off the queue and draw them. Returns how many were
	/// carried out.
	fn consume(&self, canvas: &mut Canvas, limit: Limit) -> Result<usize> {
		if matches!(limit, Limit::Frame(_)) && self.is_suspended() {
			return Ok(0);
		}
		let mut target = self.target().ok_or(Error::NotConfigured)?;
		let mut done = 0;
		let mut hidden = false;
		if canvas.pending_swap {
			canvas.pending_swap = false;
			target = self.execute_swap().unwrap_or(target);
			done += 1;
		}
		loop {
			if let Limit::Frame(deadline) = limit {
				if done > 0 && deadline.expired(&self.counter) {
					break;
				}
			}
			let Ok(primitive) = self.queue.try_receive() else {
				break;
			};
			if primitive == Primitive::SwapBuffers {
				if done > 0 && matches!(limit, Limit::Frame(_)) {
					// Show this frame's work first; swap at the start of the
					// next one.
					canvas.pending_swap = true;
					break;
				}
				target = self.execute_swap().unwrap_or(target);
			} else {
				if !hidden {
					canvas.run(&target, Job::HideSprites)?;
					hidden = true;
				}
				canvas.run(&target, Job::Draw(&primitive))?;
			}
			done += 1;
		}
		if hidden {
			canvas.run(&target, Job::ShowSprites)?;
		}
		Ok(done)
	}
}

impl<M: DmaMemory, P: ScanoutPeripheral> Scanout<M, P> {
	/// Tear down the current mode (unless the clock is impossible) and build
	/// a new one.
	fn set_mode(
		&mut self,
		timing: Timing,
		request: (usize, usize),
		double_buffered: bool,
		config: &Config,
		palette: &Indexed4Format,
	) -> Result<(Viewport, Format)> {
		let Some(sample_clock) = self.peripheral.sample_clock(timing.frequency) else {
			warn!(
				"video: {} needs a {} Hz clock, which cannot be made",
				timing.label.as_str(),
				timing.frequency.raw()
			);
			return Err(Error::UnsupportedClock);
		};
		self.stop();

		let output = config.output_mode;
		let quantum = match output {
			OutputMode::Direct => 1,
			OutputMode::LineRendered => LINE_BUFFER_COUNT,
		};
		let mut viewport = Viewport::fit(&timing, request.0, request.1, quantum);
		let idle = timing.sync_bits(false, false);
		let (format, row_bytes, fill) = match output {
			OutputMode::Direct => {
				let f = Rgb222Format::for_timing(&timing);
				(
					Format::Rgb222(f),
					Rgb222Format::row_bytes(viewport.width),
					f.encode(colours::BLACK),
				)
			}
			OutputMode::LineRendered => (
				Format::Indexed4(*palette),
				Indexed4Format::row_bytes(viewport.width),
				0,
			),
		};
		let shape = ModeShape {
			output,
			copies: if output == OutputMode::Direct && double_buffered {
				2
			} else {
				1
			},
			double_buffered,
			quantum,
			row_bytes,
			fill,
			idle,
		};

		// Fewer rows need fewer descriptors, so keep trying smaller viewports
		// until everything fits.
		let ModeMemory {
			blanks,
			mut chain,
			ring,
			surfaces,
			height,
		} = loop {
			match self.allocate_mode(&timing, &viewport, &shape) {
				Ok(allocated) => break allocated,
				Err(Error::OutOfMemory) if viewport.height > quantum => {
					self.memory.free_all();
					let step = ((viewport.height / 8).max(quantum) / quantum) * quantum;
					viewport.height = viewport.height.saturating_sub(step).max(quantum);
					debug!("video: retrying with {} rows", viewport.height);
				}
				Err(e) => {
					self.memory.free_all();
					return Err(e);
				}
			}
		};
		viewport.height = height;
		viewport.row = (timing.v_visible as usize - height) / 2;

		let sources = view_sources(output, ring, &surfaces);
		let layout = FrameLayout {
			timing: &timing,
			viewport,
			mode: output,
		};
		chain.build(&layout, &blanks, &sources)?;

		let consumer = config.consumer();
		let mode = Mode {
			budget: Budget::for_timing(&timing, viewport.row, consumer, self.budget_policy),
			timing,
			request,
			viewport,
			output,
			sample_clock,
			chain,
			blanks,
			surfaces,
			ring,
			row_bytes,
			samples: palette.samples(idle),
			scanline_fn: config.scanline_fn,
			pan: 0,
			consumer,
		};
		self.peripheral.start(&mode.chain)?;
		self.retrace.arm();
		info!(
			"video: {} at {} Hz, viewport {}x{} at ({}, {}), {} nodes",
			mode.timing.label.as_str(),
			sample_clock.raw(),
			viewport.width,
			viewport.height,
			viewport.col,
			viewport.row,
			mode.chain.len()
		);
		self.mode = Some(mode);
		Ok((viewport, format))
	}

	/// Allocate the blank lines, the chain, the line ring and the rows for a
	/// viewport. Rows may come up short; the chain never does.
	fn allocate_mode(&mut self, timing: &Timing, viewport: &Viewport, shape: &ModeShape) -> Result<ModeMemory> {
		let blanks = BlankLines::allocate(&mut self.memory, timing)?;
		let chain = Chain::allocate(&mut self.memory, node_count(timing, viewport, shape.copies))?;
		let ring = match shape.output {
			OutputMode::Direct => None,
			OutputMode::LineRendered => Some(LineRing::allocate(
				&mut self.memory,
				LINE_BUFFER_COUNT,
				viewport.width,
				shape.idle,
			)?),
		};
		let (surfaces, height) = allocate_viewport(
			&mut self.memory,
			shape.row_bytes,
			viewport.height,
			shape.double_buffered,
			shape.quantum,
			shape.fill,
		)?;
		Ok(ModeMemory {
			blanks,
			chain,
			ring,
			surfaces,
			height,
		})
	}

	/// Stop the peripheral and free everything.
	fn stop(&mut self) {
		if self.mode.take().is_some() {
			self.peripheral.stop();
		}
		self.retrace.stop();
		self.memory.free_all();
	}

	/// Rebuild the chain in place for a moved timing. On failure there is
	/// no mode.
	fn move_screen(&mut self, dx: i32, dy: i32) -> Result<()> {
		let result = self.restart_moved(dx, dy);
		if result.is_err() {
			self.stop();
		}
		result
	}

	fn restart_moved(&mut self, dx: i32, dy: i32) -> Result<()> {
		let mode = self.mode.as_mut().ok_or(Error::NotConfigured)?;
		self.peripheral.stop();
		self.retrace.stop();
		mode.timing = mode.timing.moved(dx, dy);
		mode.blanks.fill(&mode.timing);
		// Same viewport, so the same number of nodes
		let sources = view_sources(mode.output, mode.ring, &mode.surfaces);
		let layout = FrameLayout {
			timing: &mode.timing,
			viewport: mode.viewport,
			mode: mode.output,
		};
		mode.chain.build(&layout, &mode.blanks, &sources)?;
		if mode.output == OutputMode::Direct {
			mode.chain.pan(&mode.tables(), mode.pan);
		}
		mode.chain.redirect(mode.surfaces.visible_index());
		mode.update_budget(self.budget_policy);
		self.peripheral.start(&mode.chain)?;
		self.retrace.arm();
		debug!("video: moved by ({}, {})", dx, dy);
		Ok(())
	}

	/// Exchange drawing and visible surfaces. Returns the new drawing target.
	fn swap(&mut self) -> Option<Target> {
		let mode = self.mode.as_mut()?;
		mode.surfaces.swap();
		if mode.chain.copies() > 1 {
			mode.chain.redirect(mode.surfaces.visible_index());
			self.peripheral.redirect(&mode.chain);
		}
		Some(mode.target())
	}
}

impl Mode {
	fn target(&self) -> Target {
		Target {
			drawing: self.surfaces.drawing(),
			visible: self.surfaces.visible(),
			row_bytes: self.row_bytes,
			double_buffered: self.surfaces.is_double_buffered(),
		}
	}

	fn tables(&self) -> [RowTable; 2] {
		[self.surfaces.table(0), self.surfaces.table(1)]
	}

	fn update_budget(&mut self, policy: BudgetPolicy) {
		self.budget = Budget::for_timing(&self.timing, self.viewport.row, self.consumer, policy);
	}

	/// Expand `count` visible rows from `row` into the line ring.
	fn render_lines(&self, state: &ScanlineState, row: usize, count: usize) {
		let Some(ring) = self.ring.as_ref() else {
			return;
		};
		let height = self.viewport.height;
		if height == 0 {
			return;
		}
		let table = self.surfaces.visible();
		for i in 0..count {
			let y = (row + i) % height;
			let Some(src) = table.row((y + self.pan) % height) else {
				continue;
			};
			// Safety: the row holds `row_bytes` bytes, and the chain is
			// streaming the other half of the ring.
			let (src, out) = unsafe {
				(
					core::slice::from_raw_parts(src.as_ptr(), self.row_bytes),
					ring.slot_mut(y),
				)
			};
			let ctx = ScanlineContext {
				state,
				y,
				samples: &self.samples,
			};
			(self.scanline_fn)(&ctx, src, out);
		}
	}
}

/// Has the swap counter reached `ticket`? Both wrap.
fn reached(done: u32, ticket: u32) -> bool {
	(done.wrapping_sub(ticket) as i32) >= 0
}

/// One view source per chain copy.
fn view_sources(
	output: OutputMode,
	ring: Option<LineRing>,
	surfaces: &Surfaces,
) -> heapless::Vec<ViewSource, 2> {
	let mut sources = heapless::Vec::new();
	match (output, ring) {
		(OutputMode::LineRendered, Some(ring)) => {
			let _ = sources.push(ViewSource::Lines(ring));
		}
		_ => {
			let _ = sources.push(ViewSource::Rows(surfaces.table(0)));
			if surfaces.is_double_buffered() {
				let _ = sources.push(ViewSource::Rows(surfaces.table(1)));
			}
		}
	}
	sources
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
