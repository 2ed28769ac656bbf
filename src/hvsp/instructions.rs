// Serial instructions, ATtiny25/45/85 datasheet Table 20-16 (also ATtiny13A).
// Only the first instruction of a sequence carries a fixed data byte; the
// data of a write's second instruction is the fuse value, everything else is
// sent with data 0x00. The zero padding of the frames is added by `transfer`.

use crate::fuse::FuseSelector;

pub const LOAD_COMMAND: u8 = 0b0100_1100;
pub const LOAD_DATA_LOW: u8 = 0b0010_1100;

pub const CMD_READ_FUSE: u8 = 0b0000_0100;
pub const CMD_WRITE_FUSE: u8 = 0b0100_0000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReadSequence {
	pub data: u8,
	pub instructions: [u8; 3],
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WriteSequence {
	pub data: u8,
	pub instructions: [u8; 4],
}

pub fn read_sequence(fuse: FuseSelector) -> ReadSequence {
	let instructions = match fuse {
		FuseSelector::Low => [LOAD_COMMAND, 0b0110_1000, 0b0110_1100],
		FuseSelector::High => [LOAD_COMMAND, 0b0111_1010, 0b0111_1110],
		// not all ATtinys have an EFUSE
		FuseSelector::Extended => [LOAD_COMMAND, 0b0110_1010, 0b0110_1110],
	};
	ReadSequence {
		data: CMD_READ_FUSE,
		instructions,
	}
}

pub fn write_sequence(fuse: FuseSelector) -> WriteSequence {
	let instructions = match fuse {
		FuseSelector::Low => [LOAD_COMMAND, LOAD_DATA_LOW, 0b0110_0100, 0b0110_1100],
		FuseSelector::High => [LOAD_COMMAND, LOAD_DATA_LOW, 0b0111_0100, 0b0111_1100],
		FuseSelector::Extended => [LOAD_COMMAND, LOAD_DATA_LOW, 0b0110_0110, 0b0110_1110],
	};
	WriteSequence {
		data: CMD_WRITE_FUSE,
		instructions,
	}
}
