/// Simulated fixture with an AVR in the socket
///
/// `SimulatedTarget` implements `Hardware` on top of host port latches and
/// models the target side of HVPP and HVSP at pin level: programming mode
/// entry/exit, command/data latching, fuse burns with a busy phase, and the
/// target driving RDY/SDO and the data bus. Delays advance a virtual clock.
///
/// Everything the host does wrong that would matter on real hardware (bus
/// contention, malformed serial frames) is recorded instead of panicking, so
/// tests can assert on it.

use std::collections::VecDeque;

use crate::fuse::{
	FuseSelector,
	FuseSet,
	ProgrammingMode,
};
use crate::gpio::{
	Direction,
	Hardware,
	Level,
	LineRole,
	LineRoleTable,
	MAX_PORTS,
	Pin,
	PinMap,
	Pull,
};

const CMD_WRITE_FUSE: u8 = 0x40;
const CMD_READ_FUSE: u8 = 0x04;
/// what BS1=1, BS2=0 reads back (no lock bits programmed)
const LOCK_BITS: u8 = 0xff;
/// unprogrammed fuse byte
const ERASED: u8 = 0xff;

/// zero bit, 8 bits, two zero bits
const FRAME_BITS: u32 = 11;
const FRAME_PADDING: u16 = 0b100_0000_0011;
/// target starts driving SDO this long after 12V on !RESET
const SDO_DRIVE_DELAY_US: u64 = 5;

pub const DEFAULT_BURN_POLLS: u32 = 3;

/// Host line state at a port read.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PortRead {
	pub port: u8,
	pub bs1: Level,
	pub bs2: Level,
	pub oe: Level,
	/// any data bus line is a host output
	pub host_driving: bool,
}

#[derive(Clone, Copy)]
struct Controls {
	vcc: bool,
	rst: bool,
	xtal1: bool,
	wr: bool,
	sci: bool,
}

pub struct SimulatedTarget {
	roles: LineRoleTable,
	out: [u32; MAX_PORTS as usize],
	// bit set: host output
	dir: [u32; MAX_PORTS as usize],
	pull_up: [u32; MAX_PORTS as usize],
	pull_down: [u32; MAX_PORTS as usize],
	now_us: u64,

	fuses: FuseSet,
	programming: bool,
	was_programming: bool,
	entered_at_us: u64,
	command: u8,
	data: u8,
	busy: u32,
	burn_polls: u32,

	// serial frame being clocked in
	frame_edges: u32,
	sdi_reg: u16,
	sii_reg: u16,
	sdo_out: u8,
	pending: Option<FuseSelector>,

	burns: Vec<(FuseSelector, u8)>,
	frames: Vec<(u8, u8)>,
	framing_errors: u32,
	busy_polls: u32,
	contention: bool,
	port_reads: Vec<PortRead>,

	button_script: VecDeque<Level>,
	button_pressed: bool,
}

impl SimulatedTarget {
	/// Target wired per `map`, speaking the protocol of `mode`, with the
	/// given fuse contents (a missing EFUSE reads as erased).
	pub fn new(map: &PinMap, mode: ProgrammingMode, fuses: FuseSet) -> Self {
		SimulatedTarget {
			roles: LineRoleTable::resolve(map, mode),
			out: [0; MAX_PORTS as usize],
			dir: [0; MAX_PORTS as usize],
			pull_up: [0; MAX_PORTS as usize],
			pull_down: [0; MAX_PORTS as usize],
			now_us: 0,
			fuses,
			programming: false,
			was_programming: false,
			entered_at_us: 0,
			command: 0,
			data: 0,
			busy: 0,
			burn_polls: DEFAULT_BURN_POLLS,
			frame_edges: 0,
			sdi_reg: 0,
			sii_reg: 0,
			sdo_out: 0xff,
			pending: None,
			burns: Vec::new(),
			frames: Vec::new(),
			framing_errors: 0,
			busy_polls: 0,
			contention: false,
			port_reads: Vec::new(),
			button_script: VecDeque::new(),
			button_pressed: false,
		}
	}

	/// Number of busy polls (RDY or SDO low) after each burn.
	pub fn set_burn_polls(&mut self, polls: u32) {
		self.burn_polls = polls;
	}

	pub fn press_button(&mut self) {
		self.button_pressed = true;
	}

	pub fn release_button(&mut self) {
		self.button_pressed = false;
	}

	/// Levels returned by the next reads of the button's port; afterwards
	/// the button follows `press_button`/`release_button` again. A released
	/// button without pull-up floats and reads low.
	pub fn script_button(&mut self, levels: &[Level]) {
		self.button_script.extend(levels.iter().cloned());
	}

	pub fn button_script_remaining(&self) -> usize {
		self.button_script.len()
	}

	pub fn in_programming_mode(&self) -> bool {
		self.programming
	}

	/// Programming mode was entered at least once.
	pub fn was_programming(&self) -> bool {
		self.was_programming
	}

	pub fn contention(&self) -> bool {
		self.contention
	}

	pub fn fuses(&self) -> FuseSet {
		self.fuses
	}

	pub fn burns(&self) -> &[(FuseSelector, u8)] {
		&self.burns
	}

	/// Decoded serial frames as (data, instruction).
	pub fn frames(&self) -> &[(u8, u8)] {
		&self.frames
	}

	pub fn framing_errors(&self) -> u32 {
		self.framing_errors
	}

	pub fn busy_polls(&self) -> u32 {
		self.busy_polls
	}

	pub fn port_reads(&self) -> &[PortRead] {
		&self.port_reads
	}

	pub fn clear_port_reads(&mut self) {
		self.port_reads.clear();
	}

	pub fn now_us(&self) -> u64 {
		self.now_us
	}

	/// Level the host drives on `pin` (low when it isn't an output).
	pub fn host_level(&self, pin: Pin) -> Level {
		let port = pin.port as usize;
		Level::from(0 != self.out[port] & self.dir[port] & pin.mask())
	}

	pub fn pull(&self, pin: Pin) -> Pull {
		let port = pin.port as usize;
		if 0 != self.pull_up[port] & pin.mask() {
			Pull::Up
		} else if 0 != self.pull_down[port] & pin.mask() {
			Pull::Down
		} else {
			Pull::Off
		}
	}

	/// The target drives SDO (serial programming only).
	pub fn sdo_driven(&self) -> bool {
		self.programming
			&& self.roles.mode().is_serial()
			&& self.now_us - self.entered_at_us >= SDO_DRIVE_DELAY_US
	}

	fn host_high(&self, role: LineRole) -> bool {
		self.host_level(self.roles.pin(role)).is_high()
	}

	fn controls(&self) -> Controls {
		Controls {
			vcc: self.host_high(LineRole::Vcc),
			rst: self.host_high(LineRole::Rst),
			xtal1: self.host_high(LineRole::Xtal1),
			wr: self.host_high(LineRole::Wr),
			sci: self.host_high(LineRole::Sci),
		}
	}

	// byte on the bus as driven by the host
	fn host_bus(&self) -> u8 {
		self.roles.bus().gather(|port| self.out[port as usize] & self.dir[port as usize])
	}

	fn host_drives_bus(&self) -> bool {
		self.roles.bus().ports().iter().any(|bits| 0 != self.dir[bits.port as usize] & bits.mask)
	}

	fn fuse(&self, fuse: FuseSelector) -> u8 {
		self.fuses.get(fuse).unwrap_or(ERASED)
	}

	fn update(&mut self, before: Controls) {
		let after = self.controls();

		if before.rst && !after.rst && after.vcc {
			self.enter();
		} else if self.programming && ((!before.rst && after.rst) || !after.vcc) {
			self.leave();
		}

		if self.programming {
			if self.roles.mode().is_serial() {
				if !before.sci && after.sci {
					self.clock_serial();
				}
			} else {
				if !before.xtal1 && after.xtal1 {
					self.latch();
				}
				if before.wr && !after.wr {
					self.write_pulse();
				}
			}
		}

		self.check_contention();
	}

	fn enter(&mut self) {
		if self.roles.mode().is_serial() {
			let sdo = self.roles.pin(LineRole::Sdo);
			let sdo_low = 0 != self.dir[sdo.port as usize] & sdo.mask() && self.host_level(sdo).is_low();
			if !sdo_low {
				warn!("sim: 12V applied without SDO held low, not entering serial programming");
				return;
			}
		}

		self.programming = true;
		self.was_programming = true;
		self.entered_at_us = self.now_us;
		self.command = 0;
		self.data = 0;
		self.busy = 0;
		self.frame_edges = 0;
		self.sdi_reg = 0;
		self.sii_reg = 0;
		self.sdo_out = 0xff;
		self.pending = None;
		debug!("sim: entered programming mode at {}us", self.now_us);
	}

	fn leave(&mut self) {
		self.programming = false;
		self.busy = 0;
		debug!("sim: left programming mode at {}us", self.now_us);
	}

	fn burn(&mut self, fuse: FuseSelector, value: u8) {
		debug!("sim: burning {} = 0x{:02x}", fuse, value);
		self.fuses.set(fuse, value);
		self.burns.push((fuse, value));
		self.busy = self.burn_polls;
	}

	// XTAL1 rising edge
	fn latch(&mut self) {
		let byte = self.host_bus();
		match (self.host_high(LineRole::Xa1), self.host_high(LineRole::Xa0)) {
			(true, false) => self.command = byte,
			(false, true) => self.data = byte,
			_ => trace!("sim: ignoring XTAL1 strobe, XA1/XA0 select no command/data load"),
		}
	}

	// WR falling edge
	fn write_pulse(&mut self) {
		if self.command != CMD_WRITE_FUSE {
			warn!("sim: WR pulse without write fuse command (command 0x{:02x})", self.command);
			return;
		}
		let fuse = match (self.host_high(LineRole::Bs1), self.host_high(LineRole::Bs2)) {
			(false, false) => FuseSelector::Low,
			(true, false) => FuseSelector::High,
			(false, true) => FuseSelector::Extended,
			(true, true) => {
				warn!("sim: WR pulse with BS1 and BS2 high");
				return;
			},
		};
		let data = self.data;
		self.burn(fuse, data);
	}

	// what the target drives on the bus, if anything
	fn bus_output(&self) -> Option<u8> {
		if !self.programming || self.roles.mode().is_serial() {
			return None;
		}
		if self.command != CMD_READ_FUSE || self.host_high(LineRole::Oe) {
			return None;
		}
		Some(match (self.host_high(LineRole::Bs1), self.host_high(LineRole::Bs2)) {
			(false, false) => self.fuse(FuseSelector::Low),
			(true, true) => self.fuse(FuseSelector::High),
			(false, true) => self.fuse(FuseSelector::Extended),
			(true, false) => LOCK_BITS,
		})
	}

	// SCI rising edge
	fn clock_serial(&mut self) {
		let sdi = self.host_high(LineRole::Sdi) as u16;
		let sii = self.host_high(LineRole::Sii) as u16;
		self.sdi_reg = (self.sdi_reg << 1) | sdi;
		self.sii_reg = (self.sii_reg << 1) | sii;
		self.frame_edges += 1;
		if self.frame_edges == FRAME_BITS {
			self.complete_frame();
		}
	}

	fn complete_frame(&mut self) {
		let (sdi, sii) = (self.sdi_reg, self.sii_reg);
		self.frame_edges = 0;
		self.sdi_reg = 0;
		self.sii_reg = 0;
		self.sdo_out = 0xff;

		if 0 != (sdi | sii) & FRAME_PADDING {
			warn!("sim: serial frame with non-zero padding (SDI 0b{:011b}, SII 0b{:011b})", sdi, sii);
			self.framing_errors += 1;
		}
		let data = (sdi >> 2) as u8;
		let instruction = (sii >> 2) as u8;
		trace!("sim: frame data 0x{:02x} instr 0x{:02x}", data, instruction);
		self.frames.push((data, instruction));

		match instruction {
			// load command
			0x4c => self.command = data,
			// load data low byte
			0x2c => self.data = data,
			_ => (),
		}

		if self.command == CMD_READ_FUSE {
			// value shows up during the next frame
			let fuse = match instruction {
				0x68 => Some(FuseSelector::Low),
				0x7a => Some(FuseSelector::High),
				0x6a => Some(FuseSelector::Extended),
				_ => None,
			};
			if let Some(fuse) = fuse {
				self.sdo_out = self.fuse(fuse);
			}
		} else if self.command == CMD_WRITE_FUSE {
			match instruction {
				0x64 => self.pending = Some(FuseSelector::Low),
				0x74 => self.pending = Some(FuseSelector::High),
				0x66 => self.pending = Some(FuseSelector::Extended),
				0x6c | 0x7c | 0x6e => {
					let fuse = match instruction {
						0x6c => FuseSelector::Low,
						0x7c => FuseSelector::High,
						_ => FuseSelector::Extended,
					};
					if self.pending.take() == Some(fuse) {
						let data = self.data;
						self.burn(fuse, data);
					} else {
						warn!("sim: {} write not armed", fuse);
					}
				},
				_ => (),
			}
		}
	}

	fn sdo_level(&self) -> bool {
		if self.busy > 0 {
			return false;
		}
		match self.frame_edges {
			// response MSB is presented after the leading zero bit
			k @ 1..=8 => 0 != (self.sdo_out >> (8 - k)) & 1,
			_ => true,
		}
	}

	// (mask, value) of lines the target drives on `port`
	fn target_drive(&self, port: u8) -> (u32, u32) {
		let mut mask = 0;
		let mut value = 0;
		if !self.programming {
			return (mask, value);
		}

		let mut drive = |pin: Pin, high: bool| {
			if pin.port == port {
				mask |= pin.mask();
				if high {
					value |= pin.mask();
				}
			}
		};

		if self.roles.mode().is_serial() {
			if self.sdo_driven() {
				drive(self.roles.pin(LineRole::Sdo), self.sdo_level());
			}
		} else {
			drive(self.roles.pin(LineRole::Rdy), self.busy == 0);
			if let Some(byte) = self.bus_output() {
				for bits in self.roles.bus().scatter(byte) {
					if bits.port == port {
						mask |= bits.mask;
						value |= bits.value;
					}
				}
			}
		}
		(mask, value)
	}

	fn check_contention(&mut self) {
		for port in 0..MAX_PORTS {
			let (mask, _) = self.target_drive(port);
			let clash = mask & self.dir[port as usize];
			if 0 != clash {
				if !self.contention {
					warn!("sim: host and target both drive port {} bits 0x{:08x}", port, clash);
				}
				self.contention = true;
			}
		}
	}
}

impl Hardware for SimulatedTarget {
	fn write_port(&mut self, port: u8, mask: u32, value: u32) {
		let before = self.controls();
		let latch = &mut self.out[port as usize];
		*latch = (*latch & !mask) | (value & mask);
		self.update(before);
	}

	fn read_port(&mut self, port: u8) -> u32 {
		let host = self.dir[port as usize];
		let (drive_mask, drive_value) = self.target_drive(port);
		let mut value = (self.out[port as usize] & host) | (drive_value & drive_mask & !host);

		let button = self.roles.pin(LineRole::Button);
		if button.port == port && 0 == host & button.mask() {
			let level = match self.button_script.pop_front() {
				Some(level) => level,
				None => Level::from(!self.button_pressed && 0 != self.pull_up[port as usize] & button.mask()),
			};
			if level.is_high() {
				value |= button.mask();
			}
		}

		self.port_reads.push(PortRead {
			port,
			bs1: self.host_level(self.roles.pin(LineRole::Bs1)),
			bs2: self.host_level(self.roles.pin(LineRole::Bs2)),
			oe: self.host_level(self.roles.pin(LineRole::Oe)),
			host_driving: self.host_drives_bus(),
		});

		if self.programming && self.busy > 0 && port == self.roles.pin(LineRole::Rdy).port {
			self.busy -= 1;
			self.busy_polls += 1;
		}

		value
	}

	fn set_port_direction(&mut self, port: u8, mask: u32, direction: Direction) {
		let before = self.controls();
		let dir = &mut self.dir[port as usize];
		match direction {
			Direction::Input => *dir &= !mask,
			Direction::Output => *dir |= mask,
		}
		self.update(before);
	}

	fn set_port_pull(&mut self, port: u8, mask: u32, pull: Pull) {
		let port = port as usize;
		self.pull_up[port] &= !mask;
		self.pull_down[port] &= !mask;
		match pull {
			Pull::Off => (),
			Pull::Up => self.pull_up[port] |= mask,
			Pull::Down => self.pull_down[port] |= mask,
		}
	}

	fn delay_us(&mut self, us: u32) {
		self.now_us += u64::from(us);
		self.check_contention();
	}

	fn delay_ms(&mut self, ms: u32) {
		self.now_us += 1000 * u64::from(ms);
		self.check_contention();
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::gpio::Signals;
	use crate::session::{
		enter_programming,
		init_lines,
	};

	fn signals(mode: ProgrammingMode) -> Signals<SimulatedTarget> {
		let map = PinMap::standard();
		let target = SimulatedTarget::new(&map, mode, FuseSet::defaults(true));
		let mut signals = Signals::new(target, LineRoleTable::resolve(&map, mode));
		init_lines(&mut signals);
		signals
	}

	#[test]
	fn serial_entry_needs_sdo_low() {
		let mut signals = signals(ProgrammingMode::Hvsp);
		// parallel style entry: SDO stays an input
		signals.set_high(LineRole::Vcc);
		signals.set_low(LineRole::Rst);
		assert!(!signals.hardware().in_programming_mode());
	}

	#[test]
	fn detects_bus_contention() {
		let mut signals = signals(ProgrammingMode::Atmega);
		enter_programming(&mut signals);
		// read fuse command, then output enable with the bus still driven
		signals.set_high(LineRole::Xa1);
		signals.set_low(LineRole::Xa0);
		signals.write_bus(CMD_READ_FUSE);
		signals.strobe(LineRole::Xtal1);
		assert!(!signals.hardware().contention());
		signals.set_low(LineRole::Oe);
		assert!(signals.hardware().contention());
	}

	#[test]
	fn button_script_then_pressed_state() {
		let mut signals = signals(ProgrammingMode::Atmega);
		signals.hardware().script_button(&[Level::Low]);
		assert_eq!(signals.read(LineRole::Button), Level::Low);
		assert_eq!(signals.read(LineRole::Button), Level::High);
		signals.hardware().press_button();
		assert_eq!(signals.read(LineRole::Button), Level::Low);
		signals.hardware().release_button();
		assert_eq!(signals.read(LineRole::Button), Level::High);
	}

	#[test]
	fn released_button_floats_without_pull_up() {
		let mut signals = signals(ProgrammingMode::Atmega);
		let button = signals.roles().pin(LineRole::Button);
		assert_eq!(signals.hardware().pull(button), Pull::Up);
		assert_eq!(signals.read(LineRole::Button), Level::High);

		signals.set_pull(LineRole::Button, Pull::Off);
		assert_eq!(signals.hardware().pull(button), Pull::Off);
		assert_eq!(signals.read(LineRole::Button), Level::Low);
	}

	#[test]
	fn delays_advance_virtual_time() {
		let mut signals = signals(ProgrammingMode::Atmega);
		let start = signals.hardware().now_us();
		signals.delay_ms(2);
		signals.delay_us(5);
		assert_eq!(signals.hardware().now_us() - start, 2005);
	}
}
