/// High-voltage serial programming (8-pin ATtiny parts)
///
/// Every instruction is an 11-bit frame clocked on SCI, MSB first: a zero
/// bit, eight bits of data on SDI (and instruction on SII) in parallel, two
/// zero bits. The target answers on SDO while the frame is clocked in.
///
/// Fuses are read with a 3-instruction sequence (only the answer to the third
/// one is the fuse value) and written with a 4-instruction sequence, after
/// which SDO stays low until the burn is complete.

mod instructions;

pub use self::instructions::{
	CMD_READ_FUSE,
	CMD_WRITE_FUSE,
	LOAD_COMMAND,
	LOAD_DATA_LOW,
	ReadSequence,
	WriteSequence,
	read_sequence,
	write_sequence,
};

use crate::fuse::FuseSelector;
use crate::gpio::{
	Hardware,
	Level,
	LineRole,
	Signals,
};
use crate::session::FuseEngine;

pub struct Hvsp<'a, H: Hardware> {
	signals: &'a mut Signals<H>,
}

impl<'a, H: Hardware> Hvsp<'a, H> {
	pub fn new(signals: &'a mut Signals<H>) -> Self {
		assert!(signals.roles().mode().is_serial(), "serial programming with a parallel role table");
		Hvsp { signals }
	}

	// set up SDI/SII, then latch them with a SCI pulse
	fn clock_bit(&mut self, data: bool, instruction: bool) {
		self.signals.write(LineRole::Sdi, Level::from(data));
		self.signals.write(LineRole::Sii, Level::from(instruction));
		self.signals.strobe(LineRole::Sci);
	}

	fn sample(&mut self) -> bool {
		self.signals.read(LineRole::Sdo).is_high()
	}

	/// Clock one frame out and return what the target sent meanwhile.
	///
	/// The response is captured for every frame; whether it means anything
	/// depends on the instruction sequence, which is up to the caller.
	pub fn transfer(&mut self, data: u8, instruction: u8) -> u8 {
		let mut response = 0u8;

		self.signals.set_low(LineRole::Sci);
		self.clock_bit(false, false);

		// the response MSB comes "early", before the first data bit is
		// clocked (ATtiny25/45/85 datasheet, Table 20-16)
		if self.sample() {
			response |= 0x80;
		}

		for i in 0..8 {
			let mask = 0x80u8 >> i;
			self.clock_bit(0 != data & mask, 0 != instruction & mask);
			// bit i is clocked, the target already shows response bit 6 - i
			if i < 7 && self.sample() {
				response |= 0x40 >> i;
			}
		}

		self.clock_bit(false, false);
		self.clock_bit(false, false);

		trace!("HVSP frame data 0x{:02x} instr 0x{:02x} -> 0x{:02x}", data, instruction, response);
		response
	}

	pub fn read_fuse(&mut self, fuse: FuseSelector) -> u8 {
		let seq = read_sequence(fuse);
		self.transfer(seq.data, seq.instructions[0]);
		self.transfer(0x00, seq.instructions[1]);
		let value = self.transfer(0x00, seq.instructions[2]);
		debug!("HVSP read {}: 0x{:02x}", fuse, value);
		value
	}

	pub fn write_fuse(&mut self, fuse: FuseSelector, value: u8) {
		debug!("HVSP write {}: 0x{:02x}", fuse, value);
		let seq = write_sequence(fuse);
		self.transfer(seq.data, seq.instructions[0]);
		self.transfer(value, seq.instructions[1]);
		self.transfer(0x00, seq.instructions[2]);
		self.transfer(0x00, seq.instructions[3]);
		self.signals.wait_until_high(LineRole::Sdo);
	}
}

impl<'a, H: Hardware> FuseEngine for Hvsp<'a, H> {
	fn read_fuse(&mut self, fuse: FuseSelector) -> u8 {
		Hvsp::read_fuse(self, fuse)
	}

	fn write_fuse(&mut self, fuse: FuseSelector, value: u8) {
		Hvsp::write_fuse(self, fuse, value)
	}
}
