use super::{
	Direction,
	Hardware,
	Level,
	LineRole,
	LineRoleTable,
	Pull,
};

/// Both edges of a strobe are held at least this long.
pub const STROBE_WIDTH_MS: u32 = 1;

/// Role-level view of the fixture: the hardware plus the role table that
/// was resolved for the session's mode.
pub struct Signals<H: Hardware> {
	hardware: H,
	roles: LineRoleTable,
}

impl<H: Hardware> Signals<H> {
	pub fn new(hardware: H, roles: LineRoleTable) -> Self {
		Signals { hardware, roles }
	}

	pub fn roles(&self) -> &LineRoleTable {
		&self.roles
	}

	pub fn hardware(&mut self) -> &mut H {
		&mut self.hardware
	}

	pub fn into_hardware(self) -> H {
		self.hardware
	}

	pub fn write(&mut self, role: LineRole, level: Level) {
		let pin = self.roles.pin(role);
		self.hardware.write_pin(pin, level);
	}

	pub fn set_high(&mut self, role: LineRole) {
		self.write(role, Level::High);
	}

	pub fn set_low(&mut self, role: LineRole) {
		self.write(role, Level::Low);
	}

	pub fn read(&mut self, role: LineRole) -> Level {
		let pin = self.roles.pin(role);
		self.hardware.read_pin(pin)
	}

	pub fn set_direction(&mut self, role: LineRole, direction: Direction) {
		let pin = self.roles.pin(role);
		self.hardware.set_pin_direction(pin, direction);
	}

	pub fn set_pull(&mut self, role: LineRole, pull: Pull) {
		let pin = self.roles.pin(role);
		self.hardware.set_pin_pull(pin, pull);
	}

	/// Drive `byte` onto the data bus (value first, then output enable).
	pub fn write_bus(&mut self, byte: u8) {
		for bits in self.roles.bus().scatter(byte) {
			self.hardware.write_port(bits.port, bits.mask, bits.value);
			self.hardware.set_port_direction(bits.port, bits.mask, Direction::Output);
		}
	}

	pub fn read_bus(&mut self) -> u8 {
		let hardware = &mut self.hardware;
		self.roles.bus().gather(|port| hardware.read_port(port))
	}

	/// Stop driving the data bus: output 0, then switch to input, so the
	/// target may drive the lines afterwards.
	pub fn release_bus(&mut self) {
		for bits in self.roles.bus().ports() {
			self.hardware.write_port(bits.port, bits.mask, 0);
			self.hardware.set_port_direction(bits.port, bits.mask, Direction::Input);
		}
	}

	/// Turning the bus into outputs drives the value last written with
	/// `write_bus` (0 after `release_bus`).
	pub fn set_bus_direction(&mut self, direction: Direction) {
		match direction {
			Direction::Input => self.release_bus(),
			Direction::Output => {
				for bits in self.roles.bus().ports() {
					self.hardware.set_port_direction(bits.port, bits.mask, Direction::Output);
				}
			},
		}
	}

	pub fn delay_ms(&mut self, ms: u32) {
		self.hardware.delay_ms(ms);
	}

	pub fn delay_us(&mut self, us: u32) {
		self.hardware.delay_us(us);
	}

	/// Positive pulse on `role`, set up and held for `STROBE_WIDTH_MS`; ends low.
	pub fn strobe(&mut self, role: LineRole) {
		self.delay_ms(STROBE_WIDTH_MS);
		self.set_high(role);
		self.delay_ms(STROBE_WIDTH_MS);
		self.set_low(role);
	}

	/// Block until the target pulls `role` high.
	///
	/// There is no timeout: the fixture has no way to tell a long burn from a
	/// missing target, a hanging target needs a power cycle.
	pub fn wait_until_high(&mut self, role: LineRole) {
		let mut polls = 0u64;
		while self.read(role).is_low() {
			polls += 1;
		}
		trace!("{} high after {} polls", role, polls);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::fuse::{
		FuseSet,
		ProgrammingMode,
	};
	use crate::gpio::PinMap;
	use crate::sim::SimulatedTarget;

	fn signals(map: &PinMap) -> Signals<SimulatedTarget> {
		let target = SimulatedTarget::new(map, ProgrammingMode::Atmega, FuseSet::defaults(false));
		Signals::new(target, LineRoleTable::resolve(map, ProgrammingMode::Atmega))
	}

	fn bus_levels(signals: &mut Signals<SimulatedTarget>) -> Vec<Level> {
		let lines = signals.roles().bus().lines().clone();
		lines.iter().map(|&pin| signals.hardware().host_level(pin)).collect()
	}

	#[test]
	fn bus_across_ports() {
		let map = PinMap::split();
		let mut signals = signals(&map);
		signals.write_bus(0xa5);
		assert_eq!(signals.read_bus(), 0xa5);
		assert_eq!(bus_levels(&mut signals), vec![
			Level::High, Level::Low, Level::High, Level::Low,
			Level::Low, Level::High, Level::Low, Level::High,
		]);
	}

	#[test]
	fn release_drops_drive_before_input() {
		let mut signals = signals(&PinMap::standard());
		signals.write_bus(0xff);
		signals.release_bus();
		assert!(bus_levels(&mut signals).iter().all(|l| l.is_low()));
		// nobody drives the bus now
		assert_eq!(signals.read_bus(), 0x00);

		// back to outputs: drives the released value, not the old byte
		signals.set_bus_direction(Direction::Output);
		assert!(bus_levels(&mut signals).iter().all(|l| l.is_low()));
		signals.set_bus_direction(Direction::Input);
		assert_eq!(signals.read_bus(), 0x00);
	}

	#[test]
	fn strobe_is_positive_pulse() {
		let mut signals = signals(&PinMap::standard());
		signals.set_direction(LineRole::Xtal1, Direction::Output);
		let start = signals.hardware().now_us();
		signals.strobe(LineRole::Xtal1);
		let xtal1 = signals.roles().pin(LineRole::Xtal1);
		assert_eq!(signals.hardware().host_level(xtal1), Level::Low);
		assert_eq!(signals.hardware().now_us() - start, 2 * 1000 * u64::from(STROBE_WIDTH_MS));
	}

	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	enum PortOp {
		Write(u8, u32, u32),
		SetDirection(u8, u32, Direction),
	}

	#[derive(Default)]
	struct Recorder {
		ops: Vec<PortOp>,
	}

	impl Hardware for Recorder {
		fn write_port(&mut self, port: u8, mask: u32, value: u32) {
			self.ops.push(PortOp::Write(port, mask, value));
		}

		fn read_port(&mut self, _port: u8) -> u32 {
			0
		}

		fn set_port_direction(&mut self, port: u8, mask: u32, direction: Direction) {
			self.ops.push(PortOp::SetDirection(port, mask, direction));
		}

		fn delay_us(&mut self, _us: u32) {
		}

		fn delay_ms(&mut self, _ms: u32) {
		}
	}

	#[test]
	fn release_writes_zero_then_switches_to_input() {
		let map = PinMap::split();
		let roles = LineRoleTable::resolve(&map, ProgrammingMode::Atmega);
		let ports = roles.bus().ports();
		assert!(ports.len() > 1);

		let mut recorder = Recorder::default();
		{
			let mut signals = Signals::new(&mut recorder, roles.clone());
			signals.write_bus(0xff);
			signals.release_bus();
		}

		// only look at what release_bus did
		let ops = &recorder.ops[2 * ports.len()..];
		assert_eq!(ops.len(), 2 * ports.len());
		for bits in ports {
			let position = |op| ops.iter().position(|&o| o == op);
			let written = position(PortOp::Write(bits.port, bits.mask, 0)).unwrap();
			let released = position(PortOp::SetDirection(bits.port, bits.mask, Direction::Input)).unwrap();
			assert!(written < released, "port {}", bits.port);
		}
	}
}
