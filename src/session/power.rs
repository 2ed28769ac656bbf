use std::ops::{
	Deref,
	DerefMut,
};

use crate::gpio::{
	Direction,
	Hardware,
	LineRole,
	Pull,
	Signals,
};

/// Target VCC stable before 12V hits !RESET
const VCC_SETTLE_US: u32 = 80;
/// SDO is released this soon after 12V, the target starts driving it shortly after.
const SDO_RELEASE_US: u32 = 1;
const ENTRY_SETTLE_US: u32 = 10;
const ENTRY_DONE_MS: u32 = 1;
const EXIT_SETTLE_MS: u32 = 1;

const BUTTON_POLL_MS: u32 = 1;
const BUTTON_DEBOUNCE_MS: u32 = 100;

// lines pulled low before entering (and after leaving) programming mode
const ENTRY_LOW: [LineRole; 7] = [
	LineRole::Pagel, LineRole::Xa1, LineRole::Xa0, LineRole::Bs1,
	LineRole::Bs2, LineRole::Wr, LineRole::Oe,
];
const EXIT_LOW: [LineRole; 7] = [
	LineRole::Oe, LineRole::Wr, LineRole::Pagel, LineRole::Xa1,
	LineRole::Xa0, LineRole::Bs1, LineRole::Bs2,
];

/// Idle state of the fixture: target unpowered, 12V off, bus released.
pub fn init_lines<H: Hardware>(signals: &mut Signals<H>) {
	for &role in [
		LineRole::Vcc, LineRole::Oe, LineRole::Wr, LineRole::Bs1, LineRole::Xa0,
		LineRole::Xa1, LineRole::Pagel, LineRole::Rst, LineRole::Bs2, LineRole::Xtal1,
	].iter() {
		signals.set_direction(role, Direction::Output);
	}
	signals.set_direction(LineRole::Rdy, Direction::Input);
	signals.set_direction(LineRole::Button, Direction::Input);
	// button shorts to ground, floats otherwise
	signals.set_pull(LineRole::Button, Pull::Up);

	// 12V enable is active low
	signals.set_high(LineRole::Rst);
	signals.set_low(LineRole::Vcc);
	signals.release_bus();
}

/// Block until the (active low) button is pressed and still pressed after
/// the debounce delay.
pub fn wait_for_button<H: Hardware>(signals: &mut Signals<H>) {
	loop {
		while signals.read(LineRole::Button).is_high() {
			signals.delay_ms(BUTTON_POLL_MS);
		}
		signals.delay_ms(BUTTON_DEBOUNCE_MS);
		if signals.read(LineRole::Button).is_low() {
			break;
		}
		trace!("button bounced");
	}
	debug!("button pressed");
}

pub fn enter_programming<H: Hardware>(signals: &mut Signals<H>) {
	let serial = signals.roles().mode().is_serial();

	signals.release_bus();
	for &role in ENTRY_LOW.iter() {
		signals.set_low(role);
	}

	if serial {
		signals.set_low(LineRole::Sdi);
		signals.set_low(LineRole::Sii);
		// SDO low selects serial programming
		signals.set_low(LineRole::Sdo);
		signals.set_direction(LineRole::Sdo, Direction::Output);
	}

	signals.set_high(LineRole::Vcc);
	signals.delay_us(VCC_SETTLE_US);
	signals.set_low(LineRole::Rst);

	if serial {
		signals.delay_us(SDO_RELEASE_US);
		signals.set_direction(LineRole::Sdo, Direction::Input);
	}

	signals.delay_us(ENTRY_SETTLE_US);
	signals.set_high(LineRole::Oe);
	signals.set_high(LineRole::Wr);
	signals.delay_ms(ENTRY_DONE_MS);

	info!("{}: entered programming mode", signals.roles().mode());
}

pub fn exit_programming<H: Hardware>(signals: &mut Signals<H>) {
	signals.release_bus();
	signals.set_high(LineRole::Rst);
	signals.delay_ms(EXIT_SETTLE_MS);
	for &role in EXIT_LOW.iter() {
		signals.set_low(role);
	}
	signals.set_low(LineRole::Vcc);

	info!("{}: left programming mode", signals.roles().mode());
}

/// Target held in programming mode; leaves it when dropped.
pub struct Programming<'a, H: Hardware>(&'a mut Signals<H>, bool);

impl<'a, H: Hardware> Programming<'a, H> {
	pub fn enter(signals: &'a mut Signals<H>) -> Self {
		enter_programming(signals);
		Programming(signals, true)
	}

	pub fn exit(mut self) {
		self.1 = false;
		exit_programming(&mut *self.0);
	}
}

impl<'a, H: Hardware> Drop for Programming<'a, H> {
	fn drop(&mut self) {
		if self.1 {
			warn!("session aborted, leaving programming mode");
			exit_programming(&mut *self.0);
		}
	}
}

impl<'a, H: Hardware> Deref for Programming<'a, H> {
	type Target = Signals<H>;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, H: Hardware> DerefMut for Programming<'a, H> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::fuse::{
		FuseSet,
		ProgrammingMode,
	};
	use crate::gpio::{
		Level,
		LineRoleTable,
		PinMap,
	};
	use crate::sim::SimulatedTarget;

	fn idle(mode: ProgrammingMode) -> Signals<SimulatedTarget> {
		let map = PinMap::standard();
		let target = SimulatedTarget::new(&map, mode, FuseSet::defaults(true));
		let mut signals = Signals::new(target, LineRoleTable::resolve(&map, mode));
		init_lines(&mut signals);
		signals
	}

	fn host_level(signals: &mut Signals<SimulatedTarget>, role: LineRole) -> Level {
		let pin = signals.roles().pin(role);
		signals.hardware().host_level(pin)
	}

	#[test]
	fn idle_lines() {
		let mut signals = idle(ProgrammingMode::Atmega);
		assert_eq!(host_level(&mut signals, LineRole::Rst), Level::High);
		assert_eq!(host_level(&mut signals, LineRole::Vcc), Level::Low);
		assert!(!signals.hardware().in_programming_mode());

		let button = signals.roles().pin(LineRole::Button);
		assert_eq!(signals.hardware().pull(button), Pull::Up);
		// nobody pressed it
		assert_eq!(signals.read(LineRole::Button), Level::High);
	}

	#[test]
	fn enter_and_exit() {
		for &mode in [ProgrammingMode::Atmega, ProgrammingMode::Tiny2313, ProgrammingMode::Hvsp].iter() {
			let mut signals = idle(mode);
			enter_programming(&mut signals);
			assert!(signals.hardware().in_programming_mode(), "{}", mode);
			assert_eq!(host_level(&mut signals, LineRole::Oe), Level::High);
			assert_eq!(host_level(&mut signals, LineRole::Wr), Level::High);

			exit_programming(&mut signals);
			assert!(!signals.hardware().in_programming_mode(), "{}", mode);
			assert_eq!(host_level(&mut signals, LineRole::Rst), Level::High);
			assert_eq!(host_level(&mut signals, LineRole::Vcc), Level::Low);
			assert!(!signals.hardware().contention(), "{}", mode);
		}
	}

	#[test]
	fn guard_exits_on_drop() {
		let mut signals = idle(ProgrammingMode::Hvsp);
		{
			let mut target = Programming::enter(&mut signals);
			assert!(target.hardware().in_programming_mode());
		}
		assert!(!signals.hardware().in_programming_mode());
		assert_eq!(host_level(&mut signals, LineRole::Vcc), Level::Low);
	}

	#[test]
	fn debounce_ignores_short_press() {
		let mut signals = idle(ProgrammingMode::Atmega);
		// released, released, bounce (gone after the debounce delay), pressed
		signals.hardware().script_button(&[
			Level::High, Level::High, Level::Low, Level::High, Level::Low, Level::Low,
		]);
		let start = signals.hardware().now_us();
		wait_for_button(&mut signals);
		let target = signals.hardware();
		assert_eq!(target.button_script_remaining(), 0);
		assert!(target.now_us() - start >= 2 * 1000 * u64::from(BUTTON_DEBOUNCE_MS));
	}
}
