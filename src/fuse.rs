use std::fmt;
use std::str;

/// Fuse values burned when the operator isn't asked (ATmega168 factory defaults)
pub const DEFAULT_LFUSE: u8 = 0x62;
pub const DEFAULT_HFUSE: u8 = 0xDF;
pub const DEFAULT_EFUSE: u8 = 0xF9;

/// Chip family on the fixture; picks the protocol engine and the pin aliasing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ProgrammingMode {
	/// 28-pin ATmega parts, parallel programming
	Atmega,
	/// ATtiny2313: parallel programming with PAGEL on BS1 and BS2 on XA1
	Tiny2313,
	/// 8-pin ATtiny parts, serial programming
	Hvsp,
}

impl ProgrammingMode {
	pub fn is_serial(&self) -> bool {
		*self == ProgrammingMode::Hvsp
	}

	pub fn name(&self) -> &'static str {
		match self {
			ProgrammingMode::Atmega => "ATMEGA",
			ProgrammingMode::Tiny2313 => "ATtiny2313",
			ProgrammingMode::Hvsp => "ATtiny/HVSP",
		}
	}

	// fuse interdependencies: HVPP parts want HFUSE first, HVSP parts LFUSE
	pub fn burn_order(&self) -> [FuseSelector; 3] {
		match self {
			ProgrammingMode::Hvsp => [FuseSelector::Low, FuseSelector::High, FuseSelector::Extended],
			_ => [FuseSelector::High, FuseSelector::Low, FuseSelector::Extended],
		}
	}
}

impl fmt::Display for ProgrammingMode {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl str::FromStr for ProgrammingMode {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"1" | "atmega" => Ok(ProgrammingMode::Atmega),
			"2" | "tiny2313" | "attiny2313" => Ok(ProgrammingMode::Tiny2313),
			"3" | "hvsp" | "attiny" => Ok(ProgrammingMode::Hvsp),
			_ => bail!("unknown programming mode {:?} (expected atmega, tiny2313 or hvsp)", s),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum FuseSelector {
	Low,
	High,
	Extended,
}

impl FuseSelector {
	/// read/report order
	pub const ALL: [FuseSelector; 3] = [FuseSelector::Low, FuseSelector::High, FuseSelector::Extended];

	pub fn name(&self) -> &'static str {
		match self {
			FuseSelector::Low => "LFUSE",
			FuseSelector::High => "HFUSE",
			FuseSelector::Extended => "EFUSE",
		}
	}
}

impl fmt::Display for FuseSelector {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// The two or three fuse bytes of one target; `extended` is `None` when
/// EFUSE handling is disabled.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FuseSet {
	pub low: u8,
	pub high: u8,
	pub extended: Option<u8>,
}

impl FuseSet {
	pub fn defaults(with_extended: bool) -> Self {
		FuseSet {
			low: DEFAULT_LFUSE,
			high: DEFAULT_HFUSE,
			extended: if with_extended { Some(DEFAULT_EFUSE) } else { None },
		}
	}

	pub fn get(&self, fuse: FuseSelector) -> Option<u8> {
		match fuse {
			FuseSelector::Low => Some(self.low),
			FuseSelector::High => Some(self.high),
			FuseSelector::Extended => self.extended,
		}
	}

	pub fn set(&mut self, fuse: FuseSelector, value: u8) {
		match fuse {
			FuseSelector::Low => self.low = value,
			FuseSelector::High => self.high = value,
			FuseSelector::Extended => self.extended = Some(value),
		}
	}

	/// selectors with a value, in read order
	pub fn selectors(&self) -> Vec<FuseSelector> {
		FuseSelector::ALL.iter().cloned().filter(|&fuse| self.get(fuse).is_some()).collect()
	}
}

impl Default for FuseSet {
	fn default() -> Self {
		FuseSet::defaults(false)
	}
}

/// Parse a fuse byte from the command line: hex, optional `0x` prefix.
pub fn parse_fuse_byte(s: &str) -> crate::AResult<u8> {
	let digits = if s.starts_with("0x") || s.starts_with("0X") { &s[2..] } else { s };
	ensure!(!digits.is_empty() && digits.len() <= 2, "fuse value must be one hex byte: {:?}", s);
	with_context!(("invalid fuse value {:?}", s),
		Ok(u8::from_str_radix(digits, 16)?)
	)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parse_modes() {
		assert_eq!("atmega".parse::<ProgrammingMode>().unwrap(), ProgrammingMode::Atmega);
		assert_eq!("ATMEGA".parse::<ProgrammingMode>().unwrap(), ProgrammingMode::Atmega);
		assert_eq!("2".parse::<ProgrammingMode>().unwrap(), ProgrammingMode::Tiny2313);
		assert_eq!("hvsp".parse::<ProgrammingMode>().unwrap(), ProgrammingMode::Hvsp);
		assert!("4".parse::<ProgrammingMode>().is_err());
		assert!("".parse::<ProgrammingMode>().is_err());
	}

	#[test]
	fn burn_order_per_protocol() {
		use super::FuseSelector::*;
		assert_eq!(ProgrammingMode::Atmega.burn_order(), [High, Low, Extended]);
		assert_eq!(ProgrammingMode::Tiny2313.burn_order(), [High, Low, Extended]);
		assert_eq!(ProgrammingMode::Hvsp.burn_order(), [Low, High, Extended]);
	}

	#[test]
	fn parse_fuse_bytes() {
		assert_eq!(parse_fuse_byte("0x62").unwrap(), 0x62);
		assert_eq!(parse_fuse_byte("DF").unwrap(), 0xdf);
		assert_eq!(parse_fuse_byte("f9").unwrap(), 0xf9);
		assert_eq!(parse_fuse_byte("0X7").unwrap(), 0x07);
		assert!(parse_fuse_byte("0x").is_err());
		assert!(parse_fuse_byte("123").is_err());
		assert!(parse_fuse_byte("zz").is_err());
	}

	#[test]
	fn fuse_set_without_extended() {
		let set = FuseSet::defaults(false);
		assert_eq!(set.selectors(), vec![FuseSelector::Low, FuseSelector::High]);
		assert_eq!(set.get(FuseSelector::Extended), None);

		let mut set = FuseSet::defaults(true);
		set.set(FuseSelector::Extended, 0xff);
		assert_eq!(set.get(FuseSelector::Extended), Some(0xff));
		assert_eq!(set.selectors().len(), 3);
	}
}
