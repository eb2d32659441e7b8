//! # DMA VGA demo
//!
//! Demo firmware for a Raspberry Pi Pico with a resistor-ladder VGA socket.
//! It:
//!
//! * sets the system clock to 126 MHz,
//! * hands GPIO0 to GPIO7 to PIO0 (RGB222 plus H-Sync and V-Sync),
//! * starts a 320x240 video mode, and
//! * bounces a box around the screen, one step per frame.
//!
//! All drawing is queued. The DMA interrupt only notices vertical blanking;
//! the queue is drained by the drawing task, which runs alongside the demo
//! in the main loop.

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

#![no_std]
#![no_main]

// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

use core::cell::Cell;

use cortex_m_rt::entry;
use critical_section::Mutex;
use defmt::*;
use defmt_rtt as _;
use dma_vga::{
	hw::rp2040::{ControlBlock, PioScanout, TimerCounter},
	memory::BumpPool,
	pixel::colours,
	primitive::{Point, Primitive, Rect},
	scheduler::ConsumerContext,
	timing::{self, Timing},
	Config, VideoController,
};
use embassy_futures::{
	block_on,
	select::{select, Either},
};
use fugit::RateExtU32;
use panic_probe as _;
use rp_pico::hal::{
	self,
	pac::{self, interrupt},
	Clock,
};
use static_cell::{ConstStaticCell, StaticCell};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

type Video = VideoController<BumpPool, PioScanout, TimerCounter, 32>;

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// This is the standard RP2040 bootloader. It must be stored in the first 256
/// bytes of the external SPI Flash chip. It will map the external SPI flash
/// chip to address `0x1000_0000` and jump to an Interrupt Vector Table at
/// address `0x1000_0100` (i.e. immediately after the bootloader).
///
/// See `memory.x` for a definition of the `.boot2` section.
#[link_section = ".boot2"]
#[used]
pub static BOOT2_FIRMWARE: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

/// Rows, blank lines and descriptors all come from here
static VIDEO_RAM: ConstStaticCell<[u8; 120 * 1024]> = ConstStaticCell::new([0; 120 * 1024]);

/// One DMA control block per descriptor, for both frame copies of a
/// line-doubled 320x240 mode
static CONTROL_BLOCKS: ConstStaticCell<[ControlBlock; 1100]> =
	ConstStaticCell::new([ControlBlock::EMPTY; 1100]);

static VIDEO: StaticCell<Video> = StaticCell::new();

/// For the interrupt handler
static VIDEO_REF: Mutex<Cell<Option<&'static Video>>> = Mutex::new(Cell::new(None));

/// Edge length of the bouncing box
const BOX_SIZE: i16 = 24;

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

/// This is the entry-point to the firmware. It is called by cortex-m-rt once
/// the `.bss` and `.data` sections have been initialised.
#[entry]
fn main() -> ! {
	cortex_m::interrupt::disable();

	info!("DMA VGA demo starting...");

	// Grab the singleton containing all the RP2040 peripherals
	let mut pac = pac::Peripherals::take().unwrap();

	// Reset the DMA engine. If we don't do this, starting from a debugger
	// (as opposed to a cold-start) is unreliable.
	pac.RESETS.reset().modify(|_r, w| w.dma().set_bit());
	cortex_m::asm::nop();
	pac.RESETS.reset().modify(|_r, w| w.dma().clear_bit());
	while pac.RESETS.reset_done().read().dma().bit_is_clear() {}

	// Needed by the clock setup
	let mut watchdog = hal::watchdog::Watchdog::new(pac.WATCHDOG);

	// Run at 126 MHz SYS_PLL, 48 MHz, USB_PLL

	let xosc = hal::xosc::setup_xosc_blocking(pac.XOSC, rp_pico::XOSC_CRYSTAL_FREQ.Hz())
		.map_err(|_x| false)
		.unwrap();

	// Configure watchdog tick generation to tick over every microsecond
	watchdog.enable_tick_generation((rp_pico::XOSC_CRYSTAL_FREQ / 1_000_000) as u8);

	let mut clocks = hal::clocks::ClocksManager::new(pac.CLOCKS);

	let pll_sys = hal::pll::setup_pll_blocking(
		pac.PLL_SYS,
		xosc.operating_frequency(),
		hal::pll::PLLConfig {
			vco_freq: 1512.MHz(),
			refdiv: 1,
			post_div1: 6,
			post_div2: 2,
		},
		&mut clocks,
		&mut pac.RESETS,
	)
	.map_err(|_x| false)
	.unwrap();

	let pll_usb = hal::pll::setup_pll_blocking(
		pac.PLL_USB,
		xosc.operating_frequency(),
		hal::pll::common_configs::PLL_USB_48MHZ,
		&mut clocks,
		&mut pac.RESETS,
	)
	.map_err(|_x| false)
	.unwrap();

	clocks
		.init_default(&xosc, &pll_sys, &pll_usb)
		.map_err(|_x| false)
		.unwrap();

	info!("Clocks OK");

	let sio = hal::sio::Sio::new(pac.SIO);

	// Configure and grab all the RP2040 pins the Pico exposes.
	let pins = rp_pico::Pins::new(
		pac.IO_BANK0,
		pac.PADS_BANK0,
		sio.gpio_bank0,
		&mut pac.RESETS,
	);

	// Give the six colour pins, H-Sync and V-Sync to PIO0
	let _red0 = pins.gpio0.into_function::<hal::gpio::FunctionPio0>();
	let _red1 = pins.gpio1.into_function::<hal::gpio::FunctionPio0>();
	let _green0 = pins.gpio2.into_function::<hal::gpio::FunctionPio0>();
	let _green1 = pins.gpio3.into_function::<hal::gpio::FunctionPio0>();
	let _blue0 = pins.gpio4.into_function::<hal::gpio::FunctionPio0>();
	let _blue1 = pins.gpio5.into_function::<hal::gpio::FunctionPio0>();
	let _h_sync = pins.gpio6.into_function::<hal::gpio::FunctionPio0>();
	let _v_sync = pins.gpio7.into_function::<hal::gpio::FunctionPio0>();

	info!("Pins OK");

	let scanout = PioScanout::new(
		pac.PIO0,
		pac.DMA,
		&mut pac.RESETS,
		clocks.system_clock.freq(),
		CONTROL_BLOCKS.take(),
	)
	.unwrap();
	let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
	let memory = BumpPool::new(VIDEO_RAM.take());

	let video: &'static Video = VIDEO.init(VideoController::new(
		Config::new().with_direct_consumer(ConsumerContext::Task),
		memory,
		scanout,
		TimerCounter::new(timer),
	));
	critical_section::with(|cs| VIDEO_REF.borrow(cs).set(Some(video)));

	unsafe {
		pac::NVIC::unmask(pac::Interrupt::DMA_IRQ_0);
		cortex_m::interrupt::enable();
	}

	match block_on(select(video.run_primitive_task(), run(video))) {
		Either::First(never) | Either::Second(never) => never,
	}
}

/// Set the mode, then draw forever.
async fn run(video: &'static Video) -> ! {
	let qvga = Timing::from_modeline(timing::QVGA_320X240_60HZ).unwrap();
	let viewport = video.set_resolution(qvga, 0, 0, false).await.unwrap();
	info!("VGA running at {}x{}", viewport.width, viewport.height);

	let width = viewport.width as i16;
	let height = viewport.height as i16;
	for primitive in [
		Primitive::SetBrushColor(colours::BLUE),
		Primitive::Clear,
		Primitive::SetPenColor(colours::BRIGHT_WHITE),
		Primitive::DrawRect(Rect::new(0, 0, width - 1, height - 1)),
		Primitive::MoveTo(Point::new(0, 0)),
		Primitive::LineTo(Point::new(width - 1, height - 1)),
		Primitive::MoveTo(Point::new(width - 1, 0)),
		Primitive::LineTo(Point::new(0, height - 1)),
	] {
		video.add_primitive(primitive).await.unwrap();
	}

	let (mut x, mut y) = (10i16, 20i16);
	let (mut dx, mut dy) = (2i16, 1i16);
	loop {
		let old = Rect::new(x, y, x + BOX_SIZE - 1, y + BOX_SIZE - 1);
		if x + dx < 1 || x + dx + BOX_SIZE > width - 1 {
			dx = -dx;
		}
		if y + dy < 1 || y + dy + BOX_SIZE > height - 1 {
			dy = -dy;
		}
		x += dx;
		y += dy;
		let new = Rect::new(x, y, x + BOX_SIZE - 1, y + BOX_SIZE - 1);
		for primitive in [
			Primitive::SetBrushColor(colours::BLUE),
			Primitive::FillRect(old),
			Primitive::SetBrushColor(colours::BRIGHT_YELLOW),
			Primitive::FillRect(new),
		] {
			video.add_primitive(primitive).await.unwrap();
		}
		// Single buffered, so this just waits for the next blanking period
		video.swap_buffers().await.unwrap();
	}
}

/// Called when DMA raises IRQ0; i.e. when an end-of-frame descriptor has
/// been sent to the PIO FIFO.
#[interrupt]
fn DMA_IRQ_0() {
	if let Some(video) = critical_section::with(|cs| VIDEO_REF.borrow(cs).get()) {
		video.on_dma_interrupt();
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
