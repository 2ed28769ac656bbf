/// Session controller
///
/// One session takes a target from "button pressed" to "safe to remove":
///
/// Idle -> AwaitButton -> EnterProgramming -> ReadExisting
///   -> AwaitDesiredValues -> BurnFuses -> Verify -> ExitProgramming -> Idle
///
/// The protocol engine is picked from the mode once; the operator (console or
/// batch configuration) is only consulted through `Operator`.

mod power;

pub use self::power::{
	Programming,
	enter_programming,
	exit_programming,
	init_lines,
	wait_for_button,
};

use crate::fuse::{
	FuseSelector,
	FuseSet,
	ProgrammingMode,
};
use crate::gpio::{
	Hardware,
	LineRoleTable,
	PinMap,
	Signals,
};
use crate::hvpp::Hvpp;
use crate::hvsp::Hvsp;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum State {
	Idle,
	AwaitButton,
	EnterProgramming,
	ReadExisting,
	AwaitDesiredValues,
	BurnFuses,
	Verify,
	ExitProgramming,
}

/// Fuse access of a protocol engine; only valid while the target is in
/// programming mode.
pub trait FuseEngine {
	fn read_fuse(&mut self, fuse: FuseSelector) -> u8;

	/// Returns after the target signalled the burn is complete.
	fn write_fuse(&mut self, fuse: FuseSelector, value: u8);
}

impl<'a, E: ?Sized + FuseEngine> FuseEngine for &'a mut E {
	fn read_fuse(&mut self, fuse: FuseSelector) -> u8 {
		E::read_fuse(*self, fuse)
	}

	fn write_fuse(&mut self, fuse: FuseSelector, value: u8) {
		E::write_fuse(*self, fuse, value)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SessionConfig {
	pub mode: ProgrammingMode,
	/// also read and burn EFUSE
	pub burn_efuse: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SessionReport {
	pub mode: ProgrammingMode,
	pub existing: FuseSet,
	pub desired: FuseSet,
	pub read_back: FuseSet,
}

/// The person (or configuration) deciding what gets burned.
///
/// Errors abort the session; the target is taken out of programming mode
/// before the error is returned.
pub trait Operator {
	fn state_changed(&mut self, _state: State) -> crate::AResult<()> {
		Ok(())
	}

	fn existing_fuses(&mut self, config: &SessionConfig, existing: &FuseSet) -> crate::AResult<()>;

	/// Must return an EFUSE value exactly when `config.burn_efuse` is set.
	fn desired_fuses(&mut self, config: &SessionConfig, existing: &FuseSet) -> crate::AResult<FuseSet>;

	fn burning(&mut self) -> crate::AResult<()> {
		Ok(())
	}

	/// Called after the target left programming mode.
	fn finished(&mut self, report: &SessionReport) -> crate::AResult<()>;
}

impl<'a, O: ?Sized + Operator> Operator for &'a mut O {
	fn state_changed(&mut self, state: State) -> crate::AResult<()> {
		O::state_changed(*self, state)
	}

	fn existing_fuses(&mut self, config: &SessionConfig, existing: &FuseSet) -> crate::AResult<()> {
		O::existing_fuses(*self, config, existing)
	}

	fn desired_fuses(&mut self, config: &SessionConfig, existing: &FuseSet) -> crate::AResult<FuseSet> {
		O::desired_fuses(*self, config, existing)
	}

	fn burning(&mut self) -> crate::AResult<()> {
		O::burning(*self)
	}

	fn finished(&mut self, report: &SessionReport) -> crate::AResult<()> {
		O::finished(*self, report)
	}
}

/// Read LFUSE, HFUSE and (if enabled) EFUSE, in that order.
pub fn read_fuses<E: ?Sized + FuseEngine>(engine: &mut E, with_extended: bool) -> FuseSet {
	let low = engine.read_fuse(FuseSelector::Low);
	let high = engine.read_fuse(FuseSelector::High);
	let extended = if with_extended {
		Some(engine.read_fuse(FuseSelector::Extended))
	} else {
		None
	};
	FuseSet { low, high, extended }
}

/// Burn every fuse in `desired` in the order the mode requires.
pub fn burn_fuses<E: ?Sized + FuseEngine>(engine: &mut E, mode: ProgrammingMode, desired: &FuseSet) {
	for &fuse in mode.burn_order().iter() {
		if let Some(value) = desired.get(fuse) {
			engine.write_fuse(fuse, value);
		}
	}
}

fn step<O: ?Sized + Operator>(state: &mut State, operator: &mut O, next: State) -> crate::AResult<()> {
	debug!("session: {:?} -> {:?}", *state, next);
	*state = next;
	operator.state_changed(next)
}

// ReadExisting up to (and including) Verify
fn program<E, O>(engine: &mut E, config: &SessionConfig, state: &mut State, operator: &mut O) -> crate::AResult<(FuseSet, FuseSet, FuseSet)>
where
	E: ?Sized + FuseEngine,
	O: ?Sized + Operator,
{
	step(state, operator, State::ReadExisting)?;
	let existing = read_fuses(engine, config.burn_efuse);
	operator.existing_fuses(config, &existing)?;

	step(state, operator, State::AwaitDesiredValues)?;
	let desired = operator.desired_fuses(config, &existing)?;
	ensure!(desired.extended.is_some() == config.burn_efuse,
		"EFUSE value {} but EFUSE burning is {}",
		if desired.extended.is_some() { "given" } else { "missing" },
		if config.burn_efuse { "enabled" } else { "disabled" });

	step(state, operator, State::BurnFuses)?;
	operator.burning()?;
	burn_fuses(engine, config.mode, &desired);

	step(state, operator, State::Verify)?;
	let read_back = read_fuses(engine, config.burn_efuse);

	Ok((existing, desired, read_back))
}

pub struct Session<H: Hardware> {
	signals: Signals<H>,
	config: SessionConfig,
	state: State,
}

impl<H: Hardware> Session<H> {
	/// Resolves the line roles for the mode and puts the fixture into its idle state.
	pub fn new(hardware: H, map: &PinMap, config: SessionConfig) -> Self {
		let mut signals = Signals::new(hardware, LineRoleTable::resolve(map, config.mode));
		init_lines(&mut signals);
		Session {
			signals,
			config,
			state: State::Idle,
		}
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn state(&self) -> State {
		self.state
	}

	pub fn hardware(&mut self) -> &mut H {
		self.signals.hardware()
	}

	pub fn into_hardware(self) -> H {
		self.signals.into_hardware()
	}

	fn program_target<O: ?Sized + Operator>(&mut self, operator: &mut O) -> crate::AResult<SessionReport> {
		let config = self.config;
		let state = &mut self.state;

		step(state, operator, State::AwaitButton)?;
		wait_for_button(&mut self.signals);

		step(state, operator, State::EnterProgramming)?;
		let mut target = Programming::enter(&mut self.signals);

		let (existing, desired, read_back) = if config.mode.is_serial() {
			program(&mut Hvsp::new(&mut *target), &config, state, operator)?
		} else {
			program(&mut Hvpp::new(&mut *target), &config, state, operator)?
		};

		step(state, operator, State::ExitProgramming)?;
		target.exit();
		step(state, operator, State::Idle)?;

		Ok(SessionReport {
			mode: config.mode,
			existing,
			desired,
			read_back,
		})
	}

	/// Run one complete session; blocks on the button and on burns.
	pub fn run<O: ?Sized + Operator>(&mut self, operator: &mut O) -> crate::AResult<SessionReport> {
		let report = match self.program_target(operator) {
			Ok(report) => report,
			Err(e) => {
				self.state = State::Idle;
				return Err(e);
			},
		};
		info!("{}: read back LFUSE 0x{:02X} HFUSE 0x{:02X}{}",
			report.mode, report.read_back.low, report.read_back.high,
			report.read_back.extended.map_or(String::new(), |e| format!(" EFUSE 0x{:02X}", e)));
		operator.finished(&report)?;
		Ok(report)
	}
}
