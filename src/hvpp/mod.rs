/// High-voltage parallel programming (ATmega48/88/168, ATtiny2313)
///
/// Commands and data go over the 8-bit data bus and are latched with an
/// XTAL1 strobe; XA1/XA0 select what gets loaded (command or data byte),
/// BS1/BS2 select the fuse byte.
///
/// Load command:  XA1=1 XA0=0 BS1=0 (BS2=0), bus = command, strobe XTAL1
/// Load data:     XA1=0 XA0=1 BS1=0 (BS2=0), bus = data, strobe XTAL1
/// Write fuse:    select fuse with BS1/BS2, pulse WR low, wait for RDY
/// Read fuse:     select fuse with BS1/BS2, OE low, read bus, OE high
///
/// On the ATtiny2313 BS2 is the XA1 pin, so loading a command must leave BS2
/// alone.

use crate::fuse::{
	FuseSelector,
	ProgrammingMode,
};
use crate::gpio::{
	Hardware,
	Level,
	LineRole,
	Signals,
};
use crate::session::FuseEngine;

pub const CMD_WRITE_FUSE: u8 = 0b0100_0000;
pub const CMD_READ_FUSE: u8 = 0b0000_0100;

/// settle time after changing control lines
const SETTLE_MS: u32 = 1;

/// (BS1, BS2) to burn a fuse byte
pub fn write_select(fuse: FuseSelector) -> (Level, Level) {
	match fuse {
		FuseSelector::Low => (Level::Low, Level::Low),
		FuseSelector::High => (Level::High, Level::Low),
		FuseSelector::Extended => (Level::Low, Level::High),
	}
}

/// (BS1, BS2) to read a fuse byte; (High, Low) would read the lock bits
pub fn read_select(fuse: FuseSelector) -> (Level, Level) {
	match fuse {
		FuseSelector::Low => (Level::Low, Level::Low),
		FuseSelector::High => (Level::High, Level::High),
		FuseSelector::Extended => (Level::Low, Level::High),
	}
}

pub struct Hvpp<'a, H: Hardware> {
	signals: &'a mut Signals<H>,
	// BS2 is shared with XA1
	bs2_on_xa1: bool,
}

impl<'a, H: Hardware> Hvpp<'a, H> {
	pub fn new(signals: &'a mut Signals<H>) -> Self {
		let mode = signals.roles().mode();
		assert!(!mode.is_serial(), "parallel programming with a serial role table");
		Hvpp {
			signals,
			bs2_on_xa1: mode == ProgrammingMode::Tiny2313,
		}
	}

	fn load_byte(&mut self, byte: u8) {
		self.signals.write_bus(byte);
		self.signals.strobe(LineRole::Xtal1);
		self.signals.release_bus();
	}

	pub fn send_command(&mut self, command: u8) {
		trace!("HVPP command 0b{:08b}", command);
		self.signals.set_high(LineRole::Xa1);
		self.signals.set_low(LineRole::Xa0);
		self.signals.set_low(LineRole::Bs1);
		if !self.bs2_on_xa1 {
			// command load doesn't work with BS2 high
			self.signals.set_low(LineRole::Bs2);
		}
		self.load_byte(command);
	}

	pub fn read_fuse(&mut self, fuse: FuseSelector) -> u8 {
		self.send_command(CMD_READ_FUSE);
		self.signals.release_bus();

		let (bs1, bs2) = read_select(fuse);
		self.signals.write(LineRole::Bs2, bs2);
		self.signals.write(LineRole::Bs1, bs1);

		self.signals.set_low(LineRole::Oe);
		self.signals.delay_ms(SETTLE_MS);
		let value = self.signals.read_bus();
		self.signals.set_high(LineRole::Oe);

		debug!("HVPP read {}: 0x{:02x}", fuse, value);
		value
	}

	pub fn write_fuse(&mut self, fuse: FuseSelector, value: u8) {
		debug!("HVPP write {}: 0x{:02x}", fuse, value);
		self.send_command(CMD_WRITE_FUSE);

		// load data low byte
		self.signals.set_low(LineRole::Xa1);
		self.signals.set_high(LineRole::Xa0);
		self.signals.set_low(LineRole::Bs1);
		if !self.bs2_on_xa1 {
			self.signals.set_low(LineRole::Bs2);
		}
		self.signals.delay_ms(SETTLE_MS);
		self.load_byte(value);

		let (bs1, bs2) = write_select(fuse);
		self.signals.write(LineRole::Bs1, bs1);
		self.signals.write(LineRole::Bs2, bs2);
		self.signals.delay_ms(SETTLE_MS);

		self.signals.set_low(LineRole::Wr);
		self.signals.delay_ms(SETTLE_MS);
		self.signals.set_high(LineRole::Wr);

		self.signals.wait_until_high(LineRole::Rdy);

		self.signals.set_low(LineRole::Bs1);
		self.signals.set_low(LineRole::Bs2);
	}
}

impl<'a, H: Hardware> FuseEngine for Hvpp<'a, H> {
	fn read_fuse(&mut self, fuse: FuseSelector) -> u8 {
		Hvpp::read_fuse(self, fuse)
	}

	fn write_fuse(&mut self, fuse: FuseSelector, value: u8) {
		Hvpp::write_fuse(self, fuse, value)
	}
}
