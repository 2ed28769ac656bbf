use std::thread;
use std::time::{
	Duration,
	Instant,
};

use super::Pin;

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Busy wait; for delays shorter than the scheduler can sleep.
pub fn spin_delay(duration: Duration) {
	let start = Instant::now();
	while start.elapsed() < duration {
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Level {
	Low,
	High,
}

impl Level {
	pub fn is_high(self) -> bool {
		self == Level::High
	}

	pub fn is_low(self) -> bool {
		self == Level::Low
	}
}

impl From<bool> for Level {
	fn from(v: bool) -> Self {
		match v {
			false => Level::Low,
			true => Level::High,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Input,
	Output,
}

/// Internal pull resistor of an input line.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Pull {
	Off,
	Up,
	Down,
}

/// Raw access to the GPIO ports of the host.
///
/// A port is a group of up to 32 lines that can be written, read and
/// switched in one go; only the bits set in `mask` are touched.
/// Hardware faults aren't detectable here, so nothing returns an error.
pub trait Hardware {
	fn write_port(&mut self, port: u8, mask: u32, value: u32);
	fn read_port(&mut self, port: u8) -> u32;
	fn set_port_direction(&mut self, port: u8, mask: u32, direction: Direction);

	// backends without pull resistors ignore this
	fn set_port_pull(&mut self, _port: u8, _mask: u32, _pull: Pull) {
	}

	// delays are lower bounds; sleeping longer is always fine
	fn delay_us(&mut self, us: u32) {
		reliable_sleep(Duration::from_micros(us.into()));
	}

	fn delay_ms(&mut self, ms: u32) {
		reliable_sleep(Duration::from_millis(ms.into()));
	}

	fn write_pin(&mut self, pin: Pin, level: Level) {
		let value = if level.is_high() { pin.mask() } else { 0 };
		self.write_port(pin.port, pin.mask(), value);
	}

	fn read_pin(&mut self, pin: Pin) -> Level {
		Level::from(0 != self.read_port(pin.port) & pin.mask())
	}

	fn set_pin_direction(&mut self, pin: Pin, direction: Direction) {
		self.set_port_direction(pin.port, pin.mask(), direction);
	}

	fn set_pin_pull(&mut self, pin: Pin, pull: Pull) {
		self.set_port_pull(pin.port, pin.mask(), pull);
	}
}

impl<'a, H: ?Sized + Hardware> Hardware for &'a mut H {
	fn write_port(&mut self, port: u8, mask: u32, value: u32) {
		H::write_port(*self, port, mask, value)
	}
	fn read_port(&mut self, port: u8) -> u32 {
		H::read_port(*self, port)
	}
	fn set_port_direction(&mut self, port: u8, mask: u32, direction: Direction) {
		H::set_port_direction(*self, port, mask, direction)
	}
	fn set_port_pull(&mut self, port: u8, mask: u32, pull: Pull) {
		H::set_port_pull(*self, port, mask, pull)
	}
	fn delay_us(&mut self, us: u32) {
		H::delay_us(*self, us)
	}
	fn delay_ms(&mut self, ms: u32) {
		H::delay_ms(*self, ms)
	}
}
