//! # Input ports
//!
//! A byte-wide, bidirectional port per attached device (keyboard on port 0,
//! mouse on port 1), as presented by a PS/2 style decoder. Nothing on the
//! video path uses this; it is here so dialogs and terminals can read keys.
//!
//! [`BufferedPorts`] is a ready-made implementation: the decoder's interrupt
//! pushes received bytes in, and picks bytes to send out. Waiting callers
//! sleep until the decoder hands over a byte, the port is unlocked, or
//! [`BufferedPorts::tick`] tells them to look at the clock.

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

use core::cell::RefCell;

use crate::scheduler::{Budget, CycleCounter, Deadline};
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_sync::signal::Signal;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Errors latched by a port since they were last read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortErrors {
	/// A byte arrived with the wrong parity
	pub parity: bool,
	/// A byte arrived without a proper stop bit
	pub framing: bool,
	/// The device stopped clocking part way through a byte
	pub clock_timeout: bool,
}

/// Why a byte could not be sent.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
	/// There is no such port
	NoSuchPort,
	/// The outgoing buffer is full
	Busy,
}

/// Something that exchanges bytes with attached input devices.
#[allow(async_fn_in_trait)]
pub trait InputPort {
	/// Wait up to `timeout_ms` for a byte from `port`. A timeout of zero
	/// only checks what has already arrived.
	async fn get_data(&self, port: usize, timeout_ms: u32) -> Option<u8>;

	/// Send a byte to `port`.
	fn send_data(&self, data: u8, port: usize) -> Result<(), SendError>;

	/// Take exclusive use of `port`, waiting up to `timeout_ms`. Returns
	/// `false` if someone else still holds it.
	async fn lock(&self, port: usize, timeout_ms: u32) -> bool;

	/// Give up exclusive use of `port`.
	fn unlock(&self, port: usize);

	/// Read and clear the latched errors for `port`.
	fn errors(&self, port: usize) -> PortErrors;
}

/// Software FIFOs between a decoder interrupt and the [`InputPort`] API.
pub struct BufferedPorts<C: CycleCounter, const N: usize> {
	counter: C,
	ports: Mutex<CriticalSectionRawMutex, RefCell<[PortState<N>; PORT_COUNT]>>,
	/// Raised when a port may have changed, to wake whoever waits on it
	changed: [Signal<CriticalSectionRawMutex, ()>; PORT_COUNT],
}

struct PortState<const N: usize> {
	rx: heapless::Deque<u8, N>,
	tx: heapless::Deque<u8, N>,
	locked: bool,
	errors: PortErrors,
}

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// Number of ports: keyboard and mouse.
pub const PORT_COUNT: usize = 2;

/// The keyboard port.
pub const KEYBOARD_PORT: usize = 0;

/// The mouse port.
pub const MOUSE_PORT: usize = 1;

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl PortErrors {
	/// Did anything go wrong?
	pub fn any(&self) -> bool {
		self.parity || self.framing || self.clock_timeout
	}

	fn merge(&mut self, other: PortErrors) {
		self.parity |= other.parity;
		self.framing |= other.framing;
		self.clock_timeout |= other.clock_timeout;
	}
}

impl<const N: usize> PortState<N> {
	const fn new() -> PortState<N> {
		PortState {
			rx: heapless::Deque::new(),
			tx: heapless::Deque::new(),
			locked: false,
			errors: PortErrors {
				parity: false,
				framing: false,
				clock_timeout: false,
			},
		}
	}
}

impl<C: CycleCounter, const N: usize> BufferedPorts<C, N> {
	/// Empty buffers, timed with `counter`.
	pub const fn new(counter: C) -> BufferedPorts<C, N> {
		BufferedPorts {
			counter,
			ports: Mutex::new(RefCell::new([PortState::new(), PortState::new()])),
			changed: [Signal::new(), Signal::new()],
		}
	}

	/// A byte arrived from the device. Returns `false` (and the byte is
	/// lost) if nobody has read the earlier ones.
	pub fn received(&self, port: usize, data: u8) -> bool {
		let stored = self
			.with_port(port, |p| p.rx.push_back(data).is_ok())
			.unwrap_or(false);
		self.notify(port);
		stored
	}

	/// Wake every waiting caller so it can check its timeout. Call this
	/// regularly (from a timer, or once a frame) if anyone waits with a
	/// timeout; the timeout is only as fine as the ticks.
	pub fn tick(&self) {
		for signal in &self.changed {
			signal.signal(());
		}
	}

	/// The decoder saw a bad byte.
	pub fn report_errors(&self, port: usize, errors: PortErrors) {
		if errors.any() {
			warn!("input: port {} errors {:?}", port, errors);
		}
		let _ = self.with_port(port, |p| p.errors.merge(errors));
	}

	/// The next byte to send to the device, if any.
	pub fn next_to_send(&self, port: usize) -> Option<u8> {
		self.with_port(port, |p| p.tx.pop_front()).flatten()
	}

	fn with_port<R>(&self, port: usize, f: impl FnOnce(&mut PortState<N>) -> R) -> Option<R> {
		self.ports.lock(|ports| ports.borrow_mut().get_mut(port).map(f))
	}

	fn notify(&self, port: usize) {
		if let Some(signal) = self.changed.get(port) {
			signal.signal(());
		}
	}

	/// Try `f` on `port` until it gives an answer or the timeout runs out,
	/// sleeping in between.
	async fn wait_for<R>(
		&self,
		port: usize,
		timeout_ms: u32,
		mut f: impl FnMut(&mut PortState<N>) -> Option<R>,
	) -> Option<R> {
		let signal = self.changed.get(port)?;
		let budget = Budget::from_micros(timeout_ms.saturating_mul(1000));
		let deadline = Deadline::start(&self.counter, budget, true);
		loop {
			if let Some(r) = self.with_port(port, &mut f).flatten() {
				return Some(r);
			}
			if deadline.expired(&self.counter) {
				return None;
			}
			signal.wait().await;
		}
	}
}

impl<C: CycleCounter, const N: usize> InputPort for BufferedPorts<C, N> {
	async fn get_data(&self, port: usize, timeout_ms: u32) -> Option<u8> {
		self.wait_for(port, timeout_ms, |p| p.rx.pop_front()).await
	}

	fn send_data(&self, data: u8, port: usize) -> Result<(), SendError> {
		match self.with_port(port, |p| p.tx.push_back(data)) {
			None => Err(SendError::NoSuchPort),
			Some(Err(_)) => Err(SendError::Busy),
			Some(Ok(())) => Ok(()),
		}
	}

	async fn lock(&self, port: usize, timeout_ms: u32) -> bool {
		self.wait_for(port, timeout_ms, |p| {
			if p.locked {
				None
			} else {
				p.locked = true;
				Some(())
			}
		})
		.await
		.is_some()
	}

	fn unlock(&self, port: usize) {
		if self.with_port(port, |p| p.locked = false).is_some() {
			self.notify(port);
		}
	}

	fn errors(&self, port: usize) -> PortErrors {
		self.with_port(port, |p| core::mem::take(&mut p.errors))
			.unwrap_or_default()
	}
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scheduler::tests::ManualCounter;
	use embassy_futures::block_on;
	use std::sync::Arc;
	use std::time::Duration;

	/// A counter that moves on by a millisecond every time it is read, so
	/// timeouts end quickly.
	struct Racing(ManualCounter);

	impl CycleCounter for Racing {
		fn now(&self) -> u32 {
			self.0.add(1000);
			self.0.now()
		}

		fn frequency(&self) -> fugit::HertzU32 {
			self.0.frequency()
		}
	}

	fn ports() -> BufferedPorts<Racing, 4> {
		BufferedPorts::new(Racing(ManualCounter::new(0)))
	}

	/// Ports whose clock never moves, so nothing ever times out.
	fn patient_ports() -> BufferedPorts<ManualCounter, 4> {
		BufferedPorts::new(ManualCounter::new(0))
	}

	#[test]
	fn bytes_in_order() {
		let p = ports();
		assert!(p.received(KEYBOARD_PORT, 0xF0));
		assert!(p.received(KEYBOARD_PORT, 0x1C));
		assert_eq!(block_on(p.get_data(MOUSE_PORT, 0)), None);
		assert_eq!(block_on(p.get_data(KEYBOARD_PORT, 0)), Some(0xF0));
		assert_eq!(block_on(p.get_data(KEYBOARD_PORT, 10)), Some(0x1C));
		assert_eq!(block_on(p.get_data(7, 10)), None);
	}

	#[test]
	fn full_buffers() {
		let p = ports();
		for b in 0..4 {
			assert!(p.received(MOUSE_PORT, b));
			p.send_data(b, MOUSE_PORT).unwrap();
		}
		assert!(!p.received(MOUSE_PORT, 99));
		assert_eq!(p.send_data(99, MOUSE_PORT), Err(SendError::Busy));
		assert_eq!(p.send_data(99, 2), Err(SendError::NoSuchPort));
		assert_eq!(p.next_to_send(MOUSE_PORT), Some(0));
	}

	#[test]
	fn errors_are_latched_until_read() {
		let p = ports();
		p.report_errors(
			KEYBOARD_PORT,
			PortErrors {
				parity: true,
				..Default::default()
			},
		);
		p.report_errors(
			KEYBOARD_PORT,
			PortErrors {
				clock_timeout: true,
				..Default::default()
			},
		);
		let e = p.errors(KEYBOARD_PORT);
		assert!(e.parity && e.clock_timeout && !e.framing);
		assert!(!p.errors(KEYBOARD_PORT).any());
	}

	#[test]
	fn empty_port_times_out_on_tick() {
		let p = Arc::new(ports());
		let other = Arc::clone(&p);
		let t = std::thread::spawn(move || block_on(other.get_data(KEYBOARD_PORT, 10)));
		while !t.is_finished() {
			p.tick();
			std::thread::sleep(Duration::from_millis(1));
		}
		assert_eq!(t.join().unwrap(), None);
	}

	#[test]
	fn byte_arrives_while_waiting() {
		let p = Arc::new(patient_ports());
		let other = Arc::clone(&p);
		let t = std::thread::spawn(move || block_on(other.get_data(MOUSE_PORT, 100)));
		std::thread::sleep(Duration::from_millis(20));
		assert!(!t.is_finished());
		// A keyboard byte leaves the mouse reader waiting
		assert!(p.received(KEYBOARD_PORT, 0x55));
		std::thread::sleep(Duration::from_millis(5));
		assert!(!t.is_finished());
		assert!(p.received(MOUSE_PORT, 0xAA));
		assert_eq!(t.join().unwrap(), Some(0xAA));
		assert_eq!(block_on(p.get_data(KEYBOARD_PORT, 0)), Some(0x55));
	}

	#[test]
	fn exclusive_lock() {
		let p = Arc::new(ports());
		assert!(block_on(p.lock(KEYBOARD_PORT, 0)));
		let other = Arc::clone(&p);
		let t = std::thread::spawn(move || block_on(other.lock(KEYBOARD_PORT, 5)));
		while !t.is_finished() {
			p.tick();
			std::thread::sleep(Duration::from_millis(1));
		}
		assert!(!t.join().unwrap());
		assert!(block_on(p.lock(MOUSE_PORT, 0)));
		p.unlock(KEYBOARD_PORT);
		assert!(block_on(p.lock(KEYBOARD_PORT, 0)));
	}

	#[test]
	fn unlock_hands_the_port_over() {
		let p = Arc::new(patient_ports());
		assert!(block_on(p.lock(MOUSE_PORT, 0)));
		let other = Arc::clone(&p);
		let t = std::thread::spawn(move || block_on(other.lock(MOUSE_PORT, 100)));
		std::thread::sleep(Duration::from_millis(20));
		assert!(!t.is_finished());
		p.unlock(MOUSE_PORT);
		assert!(t.join().unwrap());
		assert!(!block_on(p.lock(MOUSE_PORT, 0)));
	}
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
