/// GPIO access for the programming fixture
///
/// `Hardware` is the raw port interface a backend implements (memory mapped
/// registers on the real fixture, `sim::SimulatedTarget` in tests);
/// `Signals` adds the fixture's signal names, the data bus and strobes on top.

mod bus;
mod hardware;
mod linux;
mod pins;
mod signals;

pub use self::bus::{
	BusLayout,
	PortBits,
};

pub use self::hardware::{
	Direction,
	Hardware,
	Level,
	Pull,
	reliable_sleep,
	spin_delay,
};

pub use self::pins::{
	LineRole,
	LineRoleTable,
	MAX_PORTS,
	PORT_WIDTH,
	Pin,
	PinMap,
};

pub use self::signals::{
	STROBE_WIDTH_MS,
	Signals,
};

// OS-specific. for now linux only.
pub use self::linux::{
	Gpiomem,
	open_gpiomem,
};
