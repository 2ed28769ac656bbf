use std::io::{
	BufRead,
	Write,
};

use crate::fuse::{
	DEFAULT_EFUSE,
	FuseSelector,
	FuseSet,
	ProgrammingMode,
};
use crate::session::{
	Operator,
	SessionConfig,
	SessionReport,
	State,
};

/// Where the fuse values to burn come from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FuseSource {
	/// ask for every value
	Interactive,
	/// burn these without asking
	Fixed(FuseSet),
}

fn example_value(fuse: FuseSelector) -> &'static str {
	match fuse {
		FuseSelector::Low => "0x62",
		FuseSelector::High => "0xDF",
		FuseSelector::Extended => "0xF9",
	}
}

/// One hex digit; anything else contributes its raw character code.
fn hex_digit(c: u8) -> u8 {
	match c {
		b'0'..=b'9' => c - b'0',
		b'A'..=b'F' => c - b'A' + 10,
		b'a'..=b'f' => c - b'a' + 10,
		_ => c,
	}
}

/// Text console of the fixture (a terminal, or a serial line).
pub struct Console<R, W> {
	input: R,
	output: W,
	source: FuseSource,
}

impl<R: BufRead, W: Write> Console<R, W> {
	pub fn new(input: R, output: W, source: FuseSource) -> Self {
		Console { input, output, source }
	}

	pub fn output(&self) -> &W {
		&self.output
	}

	pub fn into_output(self) -> W {
		self.output
	}

	fn read_byte(&mut self) -> crate::AResult<u8> {
		let byte = {
			let buf = self.input.fill_buf()?;
			match buf.first() {
				Some(&b) => b,
				None => bail!("console input closed"),
			}
		};
		self.input.consume(1);
		Ok(byte)
	}

	/// Ask for the chip family until one of the menu entries is picked.
	pub fn select_mode(&mut self) -> crate::AResult<ProgrammingMode> {
		writeln!(self.output, "Select mode:")?;
		writeln!(self.output, "1: ATmega (28-pin)")?;
		writeln!(self.output, "2: ATtiny2313")?;
		writeln!(self.output, "3: ATtiny (8-pin) / HVSP")?;
		self.output.flush()?;

		let mode = loop {
			let c = self.read_byte()?;
			match c {
				b'1' => break ProgrammingMode::Atmega,
				b'2' => break ProgrammingMode::Tiny2313,
				b'3' => break ProgrammingMode::Hvsp,
				// line endings of the previous answer
				_ if c.is_ascii_whitespace() => (),
				_ => {
					writeln!(self.output, "Invalid response.  Try again.")?;
					self.output.flush()?;
				},
			}
		};
		self.announce_mode(mode)?;
		Ok(mode)
	}

	pub fn announce_mode(&mut self, mode: ProgrammingMode) -> crate::AResult<()> {
		writeln!(self.output, "Selected mode: {}", mode)?;
		Ok(())
	}

	/// Prompt for one fuse byte: everything up to an `x` is skipped, the next
	/// two characters are the hex value. Not validated.
	pub fn ask_fuse(&mut self, fuse: FuseSelector) -> crate::AResult<u8> {
		write!(self.output, "Enter desired {} hex value (ie. {}): ", fuse, example_value(fuse))?;
		self.output.flush()?;

		while self.read_byte()? != b'x' {}
		let high = self.read_byte()?;
		let low = self.read_byte()?;
		let value = hex_digit(low).wrapping_add(hex_digit(high).wrapping_mul(16));

		writeln!(self.output, "{:X}", value)?;
		Ok(value)
	}

	fn print_fuses(&mut self, prefix: &str, fuses: &FuseSet) -> crate::AResult<()> {
		for fuse in fuses.selectors() {
			if let Some(value) = fuses.get(fuse) {
				writeln!(self.output, "{}{}: {:X}", prefix, fuse, value)?;
			}
		}
		Ok(())
	}
}

impl<R: BufRead, W: Write> Operator for Console<R, W> {
	fn state_changed(&mut self, state: State) -> crate::AResult<()> {
		if state == State::AwaitButton {
			writeln!(self.output, "Insert target AVR and press button.")?;
			self.output.flush()?;
		}
		Ok(())
	}

	fn existing_fuses(&mut self, _config: &SessionConfig, existing: &FuseSet) -> crate::AResult<()> {
		writeln!(self.output)?;
		writeln!(self.output, "Existing fuse values:")?;
		self.print_fuses("", existing)?;
		writeln!(self.output)?;
		self.output.flush()?;
		Ok(())
	}

	fn desired_fuses(&mut self, config: &SessionConfig, _existing: &FuseSet) -> crate::AResult<FuseSet> {
		match self.source {
			FuseSource::Fixed(mut fuses) => {
				fuses.extended = if config.burn_efuse {
					Some(fuses.extended.unwrap_or(DEFAULT_EFUSE))
				} else {
					None
				};
				Ok(fuses)
			},
			FuseSource::Interactive => {
				let low = self.ask_fuse(FuseSelector::Low)?;
				let high = self.ask_fuse(FuseSelector::High)?;
				let extended = if config.burn_efuse {
					Some(self.ask_fuse(FuseSelector::Extended)?)
				} else {
					None
				};
				Ok(FuseSet { low, high, extended })
			},
		}
	}

	fn burning(&mut self) -> crate::AResult<()> {
		writeln!(self.output, "Burning fuses...")?;
		self.output.flush()?;
		Ok(())
	}

	fn finished(&mut self, report: &SessionReport) -> crate::AResult<()> {
		writeln!(self.output)?;
		self.print_fuses("Read ", &report.read_back)?;
		writeln!(self.output, "Burn complete.")?;
		writeln!(self.output)?;
		writeln!(self.output, "It is now safe to remove the target AVR.")?;
		writeln!(self.output)?;
		self.output.flush()?;
		Ok(())
	}
}
