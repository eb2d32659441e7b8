//! Tests for the video controller

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

use super::*;
use crate::bitmap::{Bitmap, BitmapFormat};
use crate::chain::{Flags, Role};
use crate::memory::{test_region, BumpPool};
use crate::peripheral::tests::MockPeripheral;
use crate::primitive::Point;
use crate::scheduler::tests::ManualCounter;
use crate::timing;
use embassy_futures::block_on;
use std::sync::Arc;
use std::time::Duration;

type Controller<C, const Q: usize> = VideoController<BumpPool, MockPeripheral, C, Q>;

/// A counter that jumps a tenth of a second every time it is read, so
/// every budget has run out by the time anyone looks.
struct Racing(ManualCounter);

impl CycleCounter for Racing {
	fn now(&self) -> u32 {
		self.0.add(100_000);
		self.0.now()
	}

	fn frequency(&self) -> HertzU32 {
		self.0.frequency()
	}
}

fn controller<C: CycleCounter, const Q: usize>(
	config: Config,
	region: usize,
	counter: C,
) -> Controller<C, Q> {
	VideoController::new(
		config,
		BumpPool::new(test_region(region)),
		MockPeripheral::default(),
		counter,
	)
}

fn direct(config: Config) -> Controller<ManualCounter, 16> {
	let ctrl = controller(config, 1024 * 1024, ManualCounter::new(0));
	block_on(ctrl.set_resolution(vga(), 0, 0, false)).unwrap();
	ctrl
}

fn vga() -> Timing {
	Timing::from_modeline(timing::VGA_640X480_60HZ).unwrap()
}

fn qvga() -> Timing {
	Timing::from_modeline(timing::QVGA_320X240_60HZ).unwrap()
}

fn eof_nodes<C: CycleCounter, const Q: usize>(ctrl: &Controller<C, Q>) -> Vec<usize> {
	ctrl.with_chain(|c| {
		c.nodes()
			.iter()
			.enumerate()
			.filter(|(_, d)| d.flags().contains(Flags::EOF))
			.map(|(i, _)| i)
			.collect::<Vec<_>>()
	})
	.unwrap()
}

fn vblank<C: CycleCounter, const Q: usize>(ctrl: &Controller<C, Q>) {
	let node = eof_nodes(ctrl)[0];
	assert_eq!(ctrl.on_interrupt(node), RetraceEvent::VerticalBlank);
}

fn pixel<C: CycleCounter, const Q: usize>(ctrl: &Controller<C, Q>, x: i16, y: i16) -> Rgb222 {
	let mut out = [Rgb222::default(); 1];
	block_on(ctrl.read_screen(Rect::new(x, y, x, y), &mut out)).unwrap();
	out[0]
}

fn rgb(colour: Rgb888) -> Rgb222 {
	Rgb222::from_rgb888(colour)
}

fn hardware<C: CycleCounter, const Q: usize>(ctrl: &Controller<C, Q>) -> (bool, usize, usize) {
	ctrl.with_hardware(|_, p| (p.running, p.starts, p.redirects))
}

#[test]
fn whole_screen_single_buffered() {
	let ctrl = direct(Config::new());
	let t = vga();
	assert_eq!(
		ctrl.viewport(),
		Some(Viewport {
			width: 640,
			height: 480,
			col: 0,
			row: 0,
		})
	);
	assert_eq!(ctrl.with_chain(|c| c.frame_samples()), Some(t.frame_samples()));
	assert_eq!(hardware(&ctrl), (true, 1, 0));
	assert_eq!(ctrl.retrace_phase(), RetracePhase::ArmedForNextFrame);
	assert_eq!(ctrl.sample_clock(), Some(t.frequency));
	assert!(!ctrl.is_double_buffered());
	assert!(ctrl.scanline(479).is_some());
	assert!(ctrl.scanline(480).is_none());
	// The picture starts black
	assert_eq!(pixel(&ctrl, 639, 479), rgb(colours::BLACK));
}

#[test]
fn oversize_request_is_clamped() {
	let ctrl = controller::<_, 16>(Config::new(), 1024 * 1024, ManualCounter::new(0));
	let svga = Timing::from_modeline(timing::SVGA_800X600_60HZ).unwrap();
	let vp = block_on(ctrl.set_resolution(svga, 1024, 768, false)).unwrap();
	assert_eq!((vp.width, vp.height, vp.col, vp.row), (800, 600, 0, 0));
}

#[test]
fn short_of_memory_loses_rows() {
	let ctrl = controller::<_, 16>(Config::new(), 200_000, ManualCounter::new(0));
	let t = vga();
	let vp = block_on(ctrl.set_resolution(t.clone(), 0, 0, false)).unwrap();
	assert!(vp.height > 0 && vp.height < 480);
	assert_eq!(vp.width, 640);
	assert_eq!(vp.row, (480 - vp.height) / 2);
	assert_eq!(ctrl.with_chain(|c| c.frame_samples()), Some(t.frame_samples()));
}

#[test]
fn descriptors_short_of_memory_lose_rows() {
	// Not even the descriptors for a full-height viewport fit in here
	let ctrl = controller::<_, 16>(Config::new(), 32 * 1024, ManualCounter::new(0));
	let t = vga();
	let vp = block_on(ctrl.set_resolution(t.clone(), 0, 0, false)).unwrap();
	assert!(vp.height > 0 && vp.height < 480);
	assert_eq!(vp.width, 640);
	assert_eq!(vp.row, (480 - vp.height) / 2);
	assert_eq!(ctrl.with_chain(|c| c.frame_samples()), Some(t.frame_samples()));
	assert!(ctrl.scanline(vp.height - 1).is_some());
	assert_eq!(hardware(&ctrl), (true, 1, 0));
}

#[test]
fn no_memory_no_mode() {
	let ctrl = controller::<_, 16>(Config::new(), 4096, ManualCounter::new(0));
	assert_eq!(
		block_on(ctrl.set_resolution(vga(), 0, 0, false)),
		Err(Error::OutOfMemory)
	);
	assert!(!ctrl.is_configured());
	assert_eq!(ctrl.retrace_phase(), RetracePhase::Idle);
	assert_eq!(
		block_on(ctrl.read_screen(Rect::new(0, 0, 0, 0), &mut [Rgb222::default()])),
		Err(Error::NotConfigured)
	);
}

#[test]
fn unsupported_clock_keeps_old_mode() {
	let ctrl = controller::<_, 16>(Config::new(), 1024 * 1024, ManualCounter::new(0));
	ctrl.scanout.lock(|s| s.borrow_mut().peripheral.max_clock = Some(HertzU32::MHz(30)));
	block_on(ctrl.set_resolution(vga(), 0, 0, false)).unwrap();
	let svga = Timing::from_modeline(timing::SVGA_800X600_60HZ).unwrap();
	assert_eq!(
		block_on(ctrl.set_resolution(svga, 0, 0, false)),
		Err(Error::UnsupportedClock)
	);
	assert_eq!(ctrl.viewport().map(|v| v.width), Some(640));
	assert_eq!(hardware(&ctrl), (true, 1, 0));
	// Drawing still works
	ctrl.try_add_primitive(Primitive::Clear).unwrap();
	vblank(&ctrl);
	assert_eq!(ctrl.queued(), 0);
}

#[test]
fn bad_timing_rejected() {
	let ctrl = controller::<_, 16>(Config::new(), 1024, ManualCounter::new(0));
	let mut t = vga();
	t.h_front_porch = 0;
	t.h_back_porch = 0;
	assert_eq!(
		block_on(ctrl.set_resolution(t, 0, 0, false)),
		Err(Error::InvalidTiming)
	);
	assert!(matches!(
		block_on(ctrl.set_resolution_modeline("640 480", 0, 0, false)),
		Err(Error::Modeline(_))
	));
}

#[test]
fn blanking_drains_the_queue() {
	let ctrl = direct(Config::new());
	ctrl.try_add_primitive(Primitive::SetBrushColor(colours::BRIGHT_RED))
		.unwrap();
	ctrl.try_add_primitive(Primitive::Clear).unwrap();
	assert_eq!(ctrl.queued(), 2);
	// Nothing drawn yet
	assert_eq!(pixel(&ctrl, 10, 10), rgb(colours::BLACK));
	// Visible area nodes mean nothing in direct mode
	assert_eq!(ctrl.on_interrupt(0), RetraceEvent::Ignored);
	vblank(&ctrl);
	assert_eq!(ctrl.queued(), 0);
	assert_eq!(pixel(&ctrl, 10, 10), rgb(colours::BRIGHT_RED));
	assert_eq!(ctrl.retrace_phase(), RetracePhase::ArmedForNextFrame);
	assert_eq!(ctrl.scanline_state().frame, 1);
	assert_eq!(ctrl.late_renders(), 0);
}

#[test]
fn stepping_through_the_chain() {
	let ctrl = controller::<_, 16>(Config::new(), 2 * 1024 * 1024, ManualCounter::new(0));
	block_on(ctrl.set_resolution(vga(), 0, 0, true)).unwrap();
	let frame = ctrl.with_chain(|c| c.frame_nodes()).unwrap();
	let mut blanks = 0;
	for _ in 0..frame * 3 {
		if ctrl.on_dma_interrupt() == RetraceEvent::VerticalBlank {
			blanks += 1;
		}
	}
	assert_eq!(blanks, 3);
	assert_eq!(ctrl.scanline_state().frame, 3);
}

#[test]
fn budget_limits_each_blanking() {
	let ctrl = controller::<_, 16>(Config::new(), 1024 * 1024, Racing(ManualCounter::new(0)));
	block_on(ctrl.set_resolution(vga(), 0, 0, false)).unwrap();
	for _ in 0..3 {
		ctrl.try_add_primitive(Primitive::Clear).unwrap();
	}
	vblank(&ctrl);
	// Always at least one
	assert_eq!(ctrl.queued(), 2);
	ctrl.enable_background_primitive_timeout(false);
	vblank(&ctrl);
	assert_eq!(ctrl.queued(), 0);
}

#[test]
fn full_queue_pushes_back() {
	let ctrl = Arc::new(direct_with_queue());
	for _ in 0..4 {
		ctrl.try_add_primitive(Primitive::Clear).unwrap();
	}
	assert_eq!(
		ctrl.try_add_primitive(Primitive::HScroll(1)),
		Err(Primitive::HScroll(1))
	);
	let other = Arc::clone(&ctrl);
	let t = std::thread::spawn(move || block_on(other.add_primitive(Primitive::VScroll(1))));
	std::thread::sleep(Duration::from_millis(20));
	assert!(!t.is_finished());
	vblank(&ctrl);
	t.join().unwrap().unwrap();
	assert!(ctrl.queued() <= 1);
}

fn direct_with_queue() -> Controller<ManualCounter, 4> {
	let ctrl = controller(Config::new(), 1024 * 1024, ManualCounter::new(0));
	block_on(ctrl.set_resolution(vga(), 0, 0, false)).unwrap();
	ctrl
}

#[test]
fn suspended_consumer_holds_back_a_full_queue() {
	let ctrl = Arc::new(direct_with_queue());
	ctrl.suspend_background_primitive_execution();
	for _ in 0..4 {
		block_on(ctrl.add_primitive(Primitive::Clear)).unwrap();
	}
	let other = Arc::clone(&ctrl);
	let t = std::thread::spawn(move || {
		block_on(other.add_primitive(Primitive::SetPixel(Point::new(1, 1))))
	});
	std::thread::sleep(Duration::from_millis(20));
	assert!(!t.is_finished());
	// Blanking comes and goes, but nothing is taken off the queue
	vblank(&ctrl);
	std::thread::sleep(Duration::from_millis(20));
	assert!(!t.is_finished());
	assert_eq!(ctrl.queued(), 4);

	ctrl.resume_background_primitive_execution();
	vblank(&ctrl);
	t.join().unwrap().unwrap();
	while ctrl.queued() > 0 {
		vblank(&ctrl);
	}
	assert_eq!(pixel(&ctrl, 1, 1), rgb(colours::BRIGHT_WHITE));
}

#[test]
fn late_swap_waits_for_next_frame() {
	let ctrl = direct(Config::new());
	let queue = [
		Primitive::SetBrushColor(colours::BRIGHT_RED),
		Primitive::Clear,
		Primitive::SwapBuffers,
		Primitive::SetBrushColor(colours::BRIGHT_BLUE),
		Primitive::Clear,
	];
	for p in queue {
		ctrl.try_add_primitive(p).unwrap();
	}
	vblank(&ctrl);
	assert_eq!(ctrl.queued(), 2);
	assert!(!ctrl.swap_done.signaled());
	assert_eq!(pixel(&ctrl, 0, 0), rgb(colours::BRIGHT_RED));
	vblank(&ctrl);
	assert!(ctrl.swap_done.signaled());
	assert_eq!(ctrl.queued(), 0);
	assert_eq!(pixel(&ctrl, 0, 0), rgb(colours::BRIGHT_BLUE));
}

#[test]
fn double_buffered_swap() {
	let ctrl = controller::<_, 16>(Config::new(), 2 * 1024 * 1024, ManualCounter::new(0));
	let t = vga();
	block_on(ctrl.set_resolution(t.clone(), 0, 0, true)).unwrap();
	assert!(ctrl.is_double_buffered());
	assert_eq!(ctrl.with_chain(|c| c.copies()), Some(2));
	assert_eq!(ctrl.with_chain(|c| c.frame_samples()), Some(t.frame_samples()));

	// Double buffered, so drawing is immediate, into the hidden surface
	block_on(ctrl.add_primitive(Primitive::SetBrushColor(colours::BRIGHT_RED))).unwrap();
	block_on(ctrl.add_primitive(Primitive::Clear)).unwrap();
	assert_eq!(ctrl.queued(), 0);
	assert_eq!(pixel(&ctrl, 0, 0), rgb(colours::BLACK));

	ctrl.try_add_primitive(Primitive::SwapBuffers).unwrap();
	vblank(&ctrl);
	assert_eq!(pixel(&ctrl, 0, 0), rgb(colours::BRIGHT_RED));
	assert_eq!(ctrl.with_chain(|c| c.visible_copy()), Some(1));
	assert_eq!(hardware(&ctrl), (true, 1, 1));

	// And back again, from another thread that waits for it
	let ctrl = Arc::new(ctrl);
	let other = Arc::clone(&ctrl);
	let t = std::thread::spawn(move || block_on(other.swap_buffers()));
	while !t.is_finished() {
		vblank(&ctrl);
		std::thread::sleep(Duration::from_millis(1));
	}
	t.join().unwrap().unwrap();
	assert_eq!(ctrl.with_chain(|c| c.visible_copy()), Some(0));
	assert_eq!(pixel(&ctrl, 0, 0), rgb(colours::BLACK));
	assert_eq!(hardware(&ctrl).2, 2);
}

#[test]
fn earlier_swap_does_not_end_the_wait() {
	let ctrl = Arc::new(controller::<_, 16>(
		Config::new(),
		2 * 1024 * 1024,
		ManualCounter::new(0),
	));
	block_on(ctrl.set_resolution(vga(), 0, 0, true)).unwrap();
	// Someone else's swap, not waited for
	ctrl.try_add_primitive(Primitive::SwapBuffers).unwrap();
	let other = Arc::clone(&ctrl);
	let t = std::thread::spawn(move || block_on(other.swap_buffers()));
	while ctrl.queued() < 2 {
		std::thread::sleep(Duration::from_millis(1));
	}

	// Only the first swap fits in this frame
	vblank(&ctrl);
	assert_eq!(ctrl.with_chain(|c| c.visible_copy()), Some(1));
	std::thread::sleep(Duration::from_millis(20));
	assert!(!t.is_finished());

	vblank(&ctrl);
	t.join().unwrap().unwrap();
	assert_eq!(ctrl.with_chain(|c| c.visible_copy()), Some(0));
	assert_eq!(hardware(&ctrl).2, 2);
}

#[test]
fn suspend_nests() {
	let ctrl = direct(Config::new());
	ctrl.suspend_background_primitive_execution();
	ctrl.suspend_background_primitive_execution();
	ctrl.try_add_primitive(Primitive::Clear).unwrap();
	vblank(&ctrl);
	assert_eq!(ctrl.queued(), 1);
	ctrl.resume_background_primitive_execution();
	vblank(&ctrl);
	assert_eq!(ctrl.queued(), 1);
	ctrl.resume_background_primitive_execution();
	ctrl.resume_background_primitive_execution();
	assert!(!ctrl.is_suspended());
	vblank(&ctrl);
	assert_eq!(ctrl.queued(), 0);
}

#[test]
fn process_now_drains_everything() {
	let ctrl = direct(Config::new());
	ctrl.try_add_primitive(Primitive::SetBrushColor(colours::BRIGHT_GREEN))
		.unwrap();
	ctrl.try_add_primitive(Primitive::FillRect(Rect::new(0, 0, 3, 3)))
		.unwrap();
	ctrl.try_add_primitive(Primitive::SwapBuffers).unwrap();
	ctrl.try_add_primitive(Primitive::SetPixel(Point::new(8, 8)))
		.unwrap();
	block_on(ctrl.process_primitives_now()).unwrap();
	assert_eq!(ctrl.queued(), 0);
	assert!(!ctrl.is_suspended());
	assert!(ctrl.swap_done.signaled());
	assert_eq!(pixel(&ctrl, 3, 3), rgb(colours::BRIGHT_GREEN));
	assert_eq!(pixel(&ctrl, 8, 8), rgb(colours::BRIGHT_WHITE));
}

#[test]
fn foreground_drawing() {
	let ctrl = direct(Config::new().with_background_execution(false));
	block_on(ctrl.add_primitive(Primitive::SetPixel(Point::new(5, 6)))).unwrap();
	assert_eq!(ctrl.queued(), 0);
	assert_eq!(pixel(&ctrl, 5, 6), rgb(colours::BRIGHT_WHITE));

	block_on(ctrl.enable_background_primitive_execution(true));
	block_on(ctrl.add_primitive(Primitive::SetPixel(Point::new(7, 7)))).unwrap();
	assert_eq!(ctrl.queued(), 1);
	// Turning it off again draws what was queued
	block_on(ctrl.enable_background_primitive_execution(false));
	assert_eq!(ctrl.queued(), 0);
	assert_eq!(pixel(&ctrl, 7, 7), rgb(colours::BRIGHT_WHITE));
}

#[test]
fn read_and_write_rectangles() {
	let ctrl = direct(Config::new());
	let data = [
		colours::BRIGHT_RED,
		colours::BRIGHT_GREEN,
		colours::BRIGHT_BLUE,
		colours::BRIGHT_WHITE,
	];
	block_on(ctrl.write_screen(Rect::new(10, 20, 11, 21), &data)).unwrap();
	let mut out = [Rgb222::default(); 4];
	block_on(ctrl.read_screen(Rect::new(11, 21, 10, 20), &mut out)).unwrap();
	assert_eq!(out, data.map(rgb));
	assert_eq!(
		block_on(ctrl.read_screen(Rect::new(639, 0, 640, 0), &mut out)),
		Err(Error::OutOfBounds)
	);
	assert_eq!(
		block_on(ctrl.write_screen(Rect::new(0, 0, 4, 0), &data)),
		Err(Error::OutOfBounds)
	);
}

fn view_row_zero<C: CycleCounter, const Q: usize>(ctrl: &Controller<C, Q>) -> *const u8 {
	ctrl.with_chain(|c| {
		c.nodes()
			.iter()
			.find(|d| d.role() == Role::View { row: 0 })
			.map(|d| d.buf())
	})
	.flatten()
	.unwrap()
}

#[test]
fn pan_and_move() {
	let ctrl = direct(Config::new());
	let before = ctrl.timing().unwrap();
	assert_eq!(view_row_zero(&ctrl), ctrl.scanline(0).unwrap().as_ptr() as *const u8);
	ctrl.pan(3).unwrap();
	assert_eq!(view_row_zero(&ctrl), ctrl.scanline(3).unwrap().as_ptr() as *const u8);
	ctrl.pan(483).unwrap();
	assert_eq!(view_row_zero(&ctrl), ctrl.scanline(3).unwrap().as_ptr() as *const u8);
	assert_eq!(ctrl.with_hardware(|_, p| p.refreshes), 2);

	ctrl.move_screen(8, 2).unwrap();
	let after = ctrl.timing().unwrap();
	assert_ne!(before, after);
	assert_eq!(before.h_total(), after.h_total());
	assert_eq!(before.v_total(), after.v_total());
	assert_eq!(ctrl.with_chain(|c| c.frame_samples()), Some(after.frame_samples()));
	// Panning survives the rebuild
	assert_eq!(view_row_zero(&ctrl), ctrl.scanline(3).unwrap().as_ptr() as *const u8);
	assert_eq!(hardware(&ctrl), (true, 2, 0));
	assert_eq!(ctrl.retrace_phase(), RetracePhase::ArmedForNextFrame);
}

#[test]
fn shrink_rebuilds() {
	let ctrl = direct(Config::new());
	let vp = block_on(ctrl.shrink_screen(0, 10)).unwrap();
	let t = ctrl.timing().unwrap();
	assert_eq!(t.v_total(), 525 + 20);
	assert_eq!(vp.height, 480);
	assert_eq!(ctrl.with_chain(|c| c.frame_samples()), Some(t.frame_samples()));
	assert_eq!(hardware(&ctrl).1, 2);
}

#[test]
fn end_stops_everything() {
	let ctrl = direct(Config::new().with_background_execution(false));
	block_on(ctrl.end());
	assert!(!ctrl.is_configured());
	assert_eq!(hardware(&ctrl), (false, 1, 0));
	assert_eq!(ctrl.retrace_phase(), RetracePhase::Idle);
	assert_eq!(
		block_on(ctrl.add_primitive(Primitive::Clear)),
		Err(Error::NotConfigured)
	);
	assert_eq!(block_on(ctrl.swap_buffers()), Err(Error::NotConfigured));
	assert_eq!(ctrl.on_interrupt(0), RetraceEvent::Ignored);
}

static MASK: [u8; 2] = [0b1100_0000, 0b1100_0000];
static BLOCK: Bitmap = Bitmap::new(
	2,
	2,
	BitmapFormat::Mask {
		foreground: colours::BRIGHT_RED,
	},
	&MASK,
);

#[test]
fn sprites_stay_on_top() {
	let ctrl = direct(Config::new().with_background_execution(false));
	let mut sprites = heapless::Vec::new();
	sprites
		.push(Sprite::new(&BLOCK, test_region(4)).unwrap())
		.unwrap();
	assert!(block_on(ctrl.set_sprites(sprites)).is_empty());
	assert_eq!(pixel(&ctrl, 1, 1), rgb(colours::BRIGHT_RED));

	block_on(ctrl.add_primitive(Primitive::SetBrushColor(colours::BRIGHT_BLUE))).unwrap();
	block_on(ctrl.add_primitive(Primitive::Clear)).unwrap();
	assert_eq!(pixel(&ctrl, 1, 1), rgb(colours::BRIGHT_RED));
	assert_eq!(pixel(&ctrl, 2, 2), rgb(colours::BRIGHT_BLUE));

	block_on(ctrl.with_sprites(|s| {
		for sprite in s.iter_mut() {
			sprite.move_to(10, 10);
		}
	}));
	block_on(ctrl.refresh_sprites()).unwrap();
	assert_eq!(pixel(&ctrl, 1, 1), rgb(colours::BRIGHT_BLUE));
	assert_eq!(pixel(&ctrl, 11, 11), rgb(colours::BRIGHT_RED));

	let old = block_on(ctrl.set_sprites(heapless::Vec::new()));
	assert_eq!(old.len(), 1);
	assert_eq!(pixel(&ctrl, 11, 11), rgb(colours::BRIGHT_BLUE));
}

#[test]
fn direct_drawing_in_task() {
	let config = Config::new().with_direct_consumer(ConsumerContext::Task);
	let ctrl = Arc::new(controller::<_, 16>(config, 1024 * 1024, ManualCounter::new(0)));
	block_on(ctrl.set_resolution(vga(), 0, 0, false)).unwrap();
	assert_eq!(
		ctrl.budget(),
		Some(Budget::for_timing(
			&vga(),
			0,
			ConsumerContext::Task,
			BudgetPolicy::HalfFrame
		))
	);
	ctrl.try_add_primitive(Primitive::SetBrushColor(colours::BRIGHT_GREEN))
		.unwrap();
	ctrl.try_add_primitive(Primitive::Clear).unwrap();

	// The interrupt only lets the task go
	vblank(&ctrl);
	assert_eq!(ctrl.queued(), 2);
	assert_eq!(ctrl.retrace_phase(), RetracePhase::StreamingBlanking);
	assert_eq!(pixel(&ctrl, 5, 5), rgb(colours::BLACK));

	let other = Arc::clone(&ctrl);
	let task = std::thread::spawn(move || block_on(other.process_released_frame()));
	task.join().unwrap();
	assert_eq!(ctrl.queued(), 0);
	assert_eq!(pixel(&ctrl, 5, 5), rgb(colours::BRIGHT_GREEN));
	assert_eq!(ctrl.retrace_phase(), RetracePhase::ArmedForNextFrame);

	// A second blanking before the task has run again is a late render
	vblank(&ctrl);
	vblank(&ctrl);
	assert_eq!(ctrl.late_renders(), 1);
}

fn line_rendered() -> Controller<ManualCounter, 16> {
	let config = Config::new()
		.with_output_mode(OutputMode::LineRendered)
		.with_background_execution(false);
	let ctrl = controller(config, 512 * 1024, ManualCounter::new(0));
	block_on(ctrl.set_resolution(qvga(), 0, 0, false)).unwrap();
	ctrl
}

fn ring_sample(ctrl: &Controller<ManualCounter, 16>, slot: usize) -> u8 {
	ctrl.scanout.lock(|s| {
		let s = s.borrow();
		let ring = s.mode.as_ref().unwrap().ring.unwrap();
		// Safety: nothing else is writing the ring in this test
		unsafe { *ring.slot(slot).as_ptr() }
	})
}

#[test]
fn line_rendered_frame() {
	let ctrl = line_rendered();
	let t = qvga();
	let vp = ctrl.viewport().unwrap();
	assert_eq!((vp.width, vp.height), (320, 240));
	assert_eq!(ctrl.with_chain(|c| c.frame_samples()), Some(t.frame_samples()));

	block_on(ctrl.add_primitive(Primitive::SetBrushColor(colours::BRIGHT_RED))).unwrap();
	block_on(ctrl.add_primitive(Primitive::Clear)).unwrap();
	assert_eq!(pixel(&ctrl, 319, 239), rgb(colours::BRIGHT_RED));

	let idle = t.sync_bits(false, false);
	let nodes = eof_nodes(&ctrl);
	assert_eq!(nodes.len(), vp.height / (LINE_BUFFER_COUNT / 2));
	for (i, node) in nodes.iter().enumerate() {
		let event = ctrl.on_interrupt(*node);
		let RetraceEvent::RenderLines { row, count, release } = event else {
			panic!("node {} gave {:?}", node, event);
		};
		assert_eq!(count, 2);
		assert_eq!(row, (2 * i + 2) % vp.height);
		assert_eq!(release, i == nodes.len() - 2);
		if i == 0 {
			assert_eq!(ring_sample(&ctrl, 2), 0x03 | idle);
			assert_eq!(ctrl.retrace_phase(), RetracePhase::StreamingVisibleArea);
		}
		if release {
			assert!(ctrl.retrace_signal.signaled());
			assert_eq!(ctrl.retrace_phase(), RetracePhase::StreamingBlanking);
		}
	}
	block_on(ctrl.process_released_frame());
	assert_eq!(ctrl.retrace_phase(), RetracePhase::ArmedForNextFrame);
	assert_eq!(ctrl.late_renders(), 0);

	// Two frames with nobody picking them up
	for _ in 0..2 {
		for node in &nodes {
			ctrl.on_interrupt(*node);
		}
	}
	assert_eq!(ctrl.late_renders(), 1);
}

#[test]
fn line_rendered_palette_change() {
	let ctrl = line_rendered();
	block_on(ctrl.add_primitive(Primitive::SetBrushColor(colours::BRIGHT_RED))).unwrap();
	block_on(ctrl.add_primitive(Primitive::Clear)).unwrap();
	let red = Indexed4Format::default().encode(colours::BRIGHT_RED) as usize;
	block_on(ctrl.set_palette_item(red, colours::BRIGHT_GREEN));
	let first = eof_nodes(&ctrl)[0];
	ctrl.on_interrupt(first);
	let idle = qvga().sync_bits(false, false);
	assert_eq!(ring_sample(&ctrl, 2), 0x0C | idle);
	assert_eq!(pixel(&ctrl, 0, 0), rgb(colours::BRIGHT_GREEN));
}

#[test]
fn line_rendered_queue_runs_in_task() {
	let config = Config::new().with_output_mode(OutputMode::LineRendered);
	let ctrl = Arc::new(controller::<_, 16>(config, 512 * 1024, ManualCounter::new(0)));
	block_on(ctrl.set_resolution(qvga(), 0, 0, false)).unwrap();
	ctrl.try_add_primitive(Primitive::SetBrushColor(colours::BRIGHT_CYAN))
		.unwrap();
	ctrl.try_add_primitive(Primitive::Clear).unwrap();

	let other = Arc::clone(&ctrl);
	let task = std::thread::spawn(move || block_on(other.process_released_frame()));
	// The interrupt never drains the queue itself
	for node in eof_nodes(&ctrl) {
		ctrl.on_interrupt(node);
	}
	task.join().unwrap();
	assert_eq!(ctrl.queued(), 0);
	assert_eq!(pixel(&ctrl, 100, 100), rgb(colours::BRIGHT_CYAN));
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
