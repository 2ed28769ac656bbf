use std::fmt;
use std::str;

use crate::fuse::ProgrammingMode;

use super::BusLayout;

/// Number of ports any backend may expose.
pub const MAX_PORTS: u8 = 8;
/// Lines per port.
pub const PORT_WIDTH: u8 = 32;

/// A physical line: bit `bit` of GPIO port `port`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Pin {
	pub port: u8,
	pub bit: u8,
}

impl Pin {
	pub const fn new(port: u8, bit: u8) -> Self {
		Pin { port, bit }
	}

	/// line number counting through the ports (`port * 32 + bit`)
	pub const fn gpio(number: u8) -> Self {
		Pin { port: number / PORT_WIDTH, bit: number % PORT_WIDTH }
	}

	pub fn mask(&self) -> u32 {
		1u32 << self.bit
	}

	pub fn is_valid(&self) -> bool {
		self.port < MAX_PORTS && self.bit < PORT_WIDTH
	}
}

impl fmt::Display for Pin {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}.{}", self.port, self.bit)
	}
}

impl str::FromStr for Pin {
	type Err = ::failure::Error;

	// "17" (line number) or "1.4" (port.bit)
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let pin = match s.find('.') {
			None => {
				let number = with_context!(("invalid GPIO line number: {:?}", s),
					Ok(s.parse::<u8>()?)
				)?;
				Pin::gpio(number)
			},
			Some(dot) => {
				let (port_s, bit_s) = (&s[..dot], &s[dot + 1..]);
				let port = with_context!(("invalid GPIO port: {:?}", port_s),
					Ok(port_s.parse::<u8>()?)
				)?;
				let bit = with_context!(("invalid GPIO bit: {:?}", bit_s),
					Ok(bit_s.parse::<u8>()?)
				)?;
				Pin::new(port, bit)
			},
		};
		ensure!(pin.port < MAX_PORTS, "GPIO port {} out of range (max {})", pin.port, MAX_PORTS - 1);
		ensure!(pin.bit < PORT_WIDTH, "GPIO bit {} out of range (max {})", pin.bit, PORT_WIDTH - 1);
		Ok(pin)
	}
}

/// Logical signal of the programming fixture.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum LineRole {
	Vcc,
	/// RDY/!BSY from the target
	Rdy,
	Oe,
	Wr,
	Bs1,
	Bs2,
	Xa0,
	Xa1,
	/// enable of the 12V converter feeding !RESET, active low
	Rst,
	Xtal1,
	Pagel,
	Sci,
	Sdo,
	Sii,
	Sdi,
	Button,
}

impl LineRole {
	pub const ALL: [LineRole; 16] = [
		LineRole::Vcc, LineRole::Rdy, LineRole::Oe, LineRole::Wr,
		LineRole::Bs1, LineRole::Bs2, LineRole::Xa0, LineRole::Xa1,
		LineRole::Rst, LineRole::Xtal1, LineRole::Pagel, LineRole::Sci,
		LineRole::Sdo, LineRole::Sii, LineRole::Sdi, LineRole::Button,
	];

	pub fn name(&self) -> &'static str {
		match self {
			LineRole::Vcc => "VCC",
			LineRole::Rdy => "RDY",
			LineRole::Oe => "OE",
			LineRole::Wr => "WR",
			LineRole::Bs1 => "BS1",
			LineRole::Bs2 => "BS2",
			LineRole::Xa0 => "XA0",
			LineRole::Xa1 => "XA1",
			LineRole::Rst => "RST",
			LineRole::Xtal1 => "XTAL1",
			LineRole::Pagel => "PAGEL",
			LineRole::Sci => "SCI",
			LineRole::Sdo => "SDO",
			LineRole::Sii => "SII",
			LineRole::Sdi => "SDI",
			LineRole::Button => "BUTTON",
		}
	}

	/// serial roles never get a pin of their own
	pub fn shared_with(&self) -> Option<LineRole> {
		match self {
			LineRole::Sci => Some(LineRole::Bs1),
			LineRole::Sdo => Some(LineRole::Rdy),
			LineRole::Sii => Some(LineRole::Xa0),
			LineRole::Sdi => Some(LineRole::Xa1),
			_ => None,
		}
	}
}

impl fmt::Display for LineRole {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl str::FromStr for LineRole {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		LineRole::ALL.iter()
			.find(|role| role.name().eq_ignore_ascii_case(s))
			.cloned()
			.ok_or_else(|| format_err!("unknown signal line {:?}", s))
	}
}

/// Binding of the fixture's signals to host pins, before any mode specific
/// aliasing is applied.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PinMap {
	pub vcc: Pin,
	pub rdy: Pin,
	pub oe: Pin,
	pub wr: Pin,
	pub bs1: Pin,
	pub bs2: Pin,
	pub xa0: Pin,
	pub xa1: Pin,
	pub rst: Pin,
	pub xtal1: Pin,
	pub pagel: Pin,
	pub button: Pin,
	pub data: BusLayout,
}

impl PinMap {
	/// Raspberry Pi header layout, data bus on GPIO 16-23.
	pub fn standard() -> Self {
		PinMap {
			vcc: Pin::gpio(4),
			rdy: Pin::gpio(5),
			oe: Pin::gpio(6),
			pagel: Pin::gpio(7),
			bs2: Pin::gpio(8),
			button: Pin::gpio(9),
			wr: Pin::gpio(10),
			bs1: Pin::gpio(11),
			xa0: Pin::gpio(24),
			xa1: Pin::gpio(25),
			rst: Pin::gpio(26),
			xtal1: Pin::gpio(27),
			data: BusLayout::contiguous(0, 16),
		}
	}

	/// Compute module layout: the data bus straddles both GPIO ports
	/// (DATA0-3 on GPIO 28-31, DATA4-7 on GPIO 32-35).
	pub fn split() -> Self {
		PinMap {
			data: BusLayout::new([
				Pin::gpio(28), Pin::gpio(29), Pin::gpio(30), Pin::gpio(31),
				Pin::gpio(32), Pin::gpio(33), Pin::gpio(34), Pin::gpio(35),
			]),
			..PinMap::standard()
		}
	}

	pub fn preset(name: &str) -> crate::AResult<Self> {
		match name {
			"standard" => Ok(PinMap::standard()),
			"split" => Ok(PinMap::split()),
			_ => bail!("unknown pin layout {:?} (expected standard or split)", name),
		}
	}

	fn slot(&mut self, role: LineRole) -> Option<&mut Pin> {
		match role {
			LineRole::Vcc => Some(&mut self.vcc),
			LineRole::Rdy => Some(&mut self.rdy),
			LineRole::Oe => Some(&mut self.oe),
			LineRole::Wr => Some(&mut self.wr),
			LineRole::Bs1 => Some(&mut self.bs1),
			LineRole::Bs2 => Some(&mut self.bs2),
			LineRole::Xa0 => Some(&mut self.xa0),
			LineRole::Xa1 => Some(&mut self.xa1),
			LineRole::Rst => Some(&mut self.rst),
			LineRole::Xtal1 => Some(&mut self.xtal1),
			LineRole::Pagel => Some(&mut self.pagel),
			LineRole::Button => Some(&mut self.button),
			LineRole::Sci | LineRole::Sdo | LineRole::Sii | LineRole::Sdi => None,
		}
	}

	/// Rebind one signal.
	pub fn set(&mut self, role: LineRole, pin: Pin) -> crate::AResult<()> {
		ensure!(pin.is_valid(), "invalid pin {} for {}", pin, role);
		match self.slot(role) {
			Some(slot) => *slot = pin,
			None => bail!("{} always shares the {} pin, rebind that instead", role, role.shared_with().map_or("", |r| r.name())),
		}
		Ok(())
	}

	/// Apply a `ROLE=PIN` override.
	pub fn apply_override(&mut self, binding: &str) -> crate::AResult<()> {
		let eq = binding.find('=').ok_or_else(|| format_err!("pin override must look like ROLE=PIN: {:?}", binding))?;
		let role = binding[..eq].trim().parse::<LineRole>()?;
		let pin = binding[eq + 1..].trim().parse::<Pin>()?;
		self.set(role, pin)
	}

	pub fn bindings(&self) -> Vec<(String, Pin)> {
		let mut all = vec![
			(LineRole::Vcc.to_string(), self.vcc),
			(LineRole::Rdy.to_string(), self.rdy),
			(LineRole::Oe.to_string(), self.oe),
			(LineRole::Wr.to_string(), self.wr),
			(LineRole::Bs1.to_string(), self.bs1),
			(LineRole::Bs2.to_string(), self.bs2),
			(LineRole::Xa0.to_string(), self.xa0),
			(LineRole::Xa1.to_string(), self.xa1),
			(LineRole::Rst.to_string(), self.rst),
			(LineRole::Xtal1.to_string(), self.xtal1),
			(LineRole::Pagel.to_string(), self.pagel),
			(LineRole::Button.to_string(), self.button),
		];
		for (bit, pin) in self.data.lines().iter().enumerate() {
			all.push((format!("DATA{}", bit), *pin));
		}
		all
	}

	/// Every signal needs its own pin; aliasing happens in `LineRoleTable`.
	pub fn validate(&self) -> crate::AResult<()> {
		let all = self.bindings();
		for (i, (name, pin)) in all.iter().enumerate() {
			ensure!(pin.is_valid(), "{} bound to invalid pin {}", name, pin);
			if let Some((other, _)) = all[..i].iter().find(|(_, p)| p == pin) {
				bail!("{} and {} are both bound to pin {}", other, name, pin);
			}
		}
		Ok(())
	}
}

impl Default for PinMap {
	fn default() -> Self {
		PinMap::standard()
	}
}

/// Role to pin binding for one session; resolved once when the mode is known.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LineRoleTable {
	mode: ProgrammingMode,
	pins: [Pin; 16],
	data: BusLayout,
}

impl LineRoleTable {
	pub fn resolve(map: &PinMap, mode: ProgrammingMode) -> Self {
		let tiny2313 = mode == ProgrammingMode::Tiny2313;
		let mut pins = [map.vcc; 16];
		for role in LineRole::ALL.iter() {
			pins[*role as usize] = match role {
				LineRole::Vcc => map.vcc,
				LineRole::Rdy | LineRole::Sdo => map.rdy,
				LineRole::Oe => map.oe,
				LineRole::Wr => map.wr,
				LineRole::Bs1 | LineRole::Sci => map.bs1,
				LineRole::Bs2 => if tiny2313 { map.xa1 } else { map.bs2 },
				LineRole::Xa0 | LineRole::Sii => map.xa0,
				LineRole::Xa1 | LineRole::Sdi => map.xa1,
				LineRole::Rst => map.rst,
				LineRole::Xtal1 => map.xtal1,
				LineRole::Pagel => if tiny2313 { map.bs1 } else { map.pagel },
				LineRole::Button => map.button,
			};
		}
		LineRoleTable {
			mode,
			pins,
			data: map.data.clone(),
		}
	}

	pub fn mode(&self) -> ProgrammingMode {
		self.mode
	}

	pub fn pin(&self, role: LineRole) -> Pin {
		self.pins[role as usize]
	}

	pub fn bus(&self) -> &BusLayout {
		&self.data
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parse_pins() {
		assert_eq!("17".parse::<Pin>().unwrap(), Pin::new(0, 17));
		assert_eq!("33".parse::<Pin>().unwrap(), Pin::new(1, 1));
		assert_eq!("4.3".parse::<Pin>().unwrap(), Pin::new(4, 3));
		assert_eq!(Pin::new(4, 3).to_string(), "4.3");
		assert!("".parse::<Pin>().is_err());
		assert!("8.0".parse::<Pin>().is_err());
		assert!("1.32".parse::<Pin>().is_err());
		assert!("1.".parse::<Pin>().is_err());
		assert!("x".parse::<Pin>().is_err());
	}

	#[test]
	fn parse_roles() {
		assert_eq!("xtal1".parse::<LineRole>().unwrap(), LineRole::Xtal1);
		assert_eq!("BS2".parse::<LineRole>().unwrap(), LineRole::Bs2);
		assert!("bs3".parse::<LineRole>().is_err());
	}

	#[test]
	fn tiny2313_aliases_pagel_and_bs2() {
		let map = PinMap::standard();
		let table = LineRoleTable::resolve(&map, ProgrammingMode::Tiny2313);
		assert_eq!(table.pin(LineRole::Pagel), table.pin(LineRole::Bs1));
		assert_eq!(table.pin(LineRole::Bs2), table.pin(LineRole::Xa1));
	}

	#[test]
	fn atmega_keeps_roles_distinct() {
		let map = PinMap::standard();
		let table = LineRoleTable::resolve(&map, ProgrammingMode::Atmega);
		assert_ne!(table.pin(LineRole::Pagel), table.pin(LineRole::Bs1));
		assert_ne!(table.pin(LineRole::Bs2), table.pin(LineRole::Xa1));
		assert_eq!(table.pin(LineRole::Pagel), map.pagel);
		assert_eq!(table.pin(LineRole::Bs2), map.bs2);
	}

	#[test]
	fn serial_roles_reuse_parallel_pins() {
		let map = PinMap::standard();
		let table = LineRoleTable::resolve(&map, ProgrammingMode::Hvsp);
		assert_eq!(table.pin(LineRole::Sci), map.bs1);
		assert_eq!(table.pin(LineRole::Sdo), map.rdy);
		assert_eq!(table.pin(LineRole::Sii), map.xa0);
		assert_eq!(table.pin(LineRole::Sdi), map.xa1);
		assert_eq!(table.pin(LineRole::Bs2), map.bs2);
	}

	#[test]
	fn presets_are_valid() {
		PinMap::standard().validate().unwrap();
		PinMap::split().validate().unwrap();
	}

	#[test]
	fn overrides() {
		let mut map = PinMap::standard();
		map.apply_override("xtal1=3").unwrap();
		assert_eq!(map.xtal1, Pin::gpio(3));
		map.validate().unwrap();

		// collides with VCC
		map.apply_override("oe=4").unwrap();
		assert!(map.validate().is_err());

		assert!(map.apply_override("sci=12").is_err());
		assert!(map.apply_override("xtal1").is_err());
		assert!(map.apply_override("xtal1=9.0").is_err());
	}

	#[test]
	fn bus_collision_detected() {
		let mut map = PinMap::standard();
		map.set(LineRole::Button, Pin::gpio(20)).unwrap();
		assert!(map.validate().is_err());
	}
}
