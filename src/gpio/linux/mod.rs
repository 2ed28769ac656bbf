/* BCM283x GPIO block, as exposed (without the rest of the peripherals) by /dev/gpiomem */

mod mapped;

use std::time::Duration;

use self::mapped::RegisterWindow;

use crate::gpio::{
	Direction,
	Hardware,
	PinMap,
	Pull,
	reliable_sleep,
	spin_delay,
};

#[allow(dead_code)]
mod consts {
	pub const GPIO_BLOCK_LEN: usize = 0x1000;

	pub const GPFSEL0: usize = 0x00; // function select, 3 bits per line, 10 lines per register
	pub const GPSET0: usize = 0x1c;  // write 1 to drive high
	pub const GPCLR0: usize = 0x28;  // write 1 to drive low
	pub const GPLEV0: usize = 0x34;  // line levels

	pub const FSEL_INPUT: u32 = 0b000;
	pub const FSEL_OUTPUT: u32 = 0b001;
	pub const FSEL_MASK: u32 = 0b111;

	// GPIO 0-31 and 32-53
	pub const PORTS: u8 = 2;
	pub const LINES: u8 = 54;

	// BCM2835-7: pull code in GPPUD, clocked into the lines set in GPPUDCLKn
	pub const GPPUD: usize = 0x94;
	pub const GPPUDCLK0: usize = 0x98;
	pub const PUD_OFF: u32 = 0b00;
	pub const PUD_DOWN: u32 = 0b01;
	pub const PUD_UP: u32 = 0b10;
	/// at least 150 core clock cycles around the GPPUDCLK write
	pub const PUD_SETUP_US: u32 = 5;

	// BCM2711: 2 bits per line, 16 lines per register
	pub const GPIO_PUP_PDN_CNTRL0: usize = 0xe4;
	pub const GPIO_PUP_PDN_CNTRL3: usize = 0xf0;
	pub const PUP_PDN_OFF: u32 = 0b00;
	pub const PUP_PDN_UP: u32 = 0b01;
	pub const PUP_PDN_DOWN: u32 = 0b10;
	pub const PUP_PDN_MASK: u32 = 0b11;
	/// what the unimplemented GPIO_PUP_PDN_CNTRL3 reads on older chips ("gpio")
	pub const LEGACY_FILL: u32 = 0x6770_696f;

	/// shorter delays spin instead of sleeping
	pub const SPIN_LIMIT_US: u32 = 1000;
}

use self::consts::*;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PullControl {
	Legacy,
	Bcm2711,
}

fn pup_pdn_field(line: u8) -> (usize, u32) {
	(GPIO_PUP_PDN_CNTRL0 + 4 * (line as usize / 16), 2 * (line as u32 % 16))
}

pub struct Gpiomem {
	regs: RegisterWindow,
	pull_control: PullControl,
}

impl Gpiomem {
	fn port_register(base: usize, port: u8) -> usize {
		assert!(port < PORTS, "GPIO port {} not available", port);
		base + 4 * port as usize
	}

	fn set_function(&mut self, line: u8, function: u32) {
		let reg = GPFSEL0 + 4 * (line as usize / 10);
		let shift = 3 * (line as u32 % 10);
		let fsel = self.regs.read(reg);
		self.regs.write(reg, (fsel & !(FSEL_MASK << shift)) | (function << shift));
	}

	/// Wait at least `us` microseconds. Sleeping overshoots by tens of
	/// microseconds or more, so short delays spin.
	pub fn pause_us(us: u32) {
		let duration = Duration::from_micros(us.into());
		if us < SPIN_LIMIT_US {
			spin_delay(duration);
		} else {
			reliable_sleep(duration);
		}
	}

	/// Make sure all pins of `map` exist on this chip.
	pub fn check_pin_map(map: &PinMap) -> crate::AResult<()> {
		for (name, pin) in map.bindings() {
			ensure!(pin.port < PORTS && pin.port * 32 + pin.bit < LINES,
				"{} bound to pin {}, but GPIO only has lines 0-{}", name, pin, LINES - 1);
		}
		Ok(())
	}
}

impl Hardware for Gpiomem {
	fn write_port(&mut self, port: u8, mask: u32, value: u32) {
		let set = mask & value;
		let clear = mask & !value;
		if 0 != set {
			self.regs.write(Self::port_register(GPSET0, port), set);
		}
		if 0 != clear {
			self.regs.write(Self::port_register(GPCLR0, port), clear);
		}
	}

	fn read_port(&mut self, port: u8) -> u32 {
		self.regs.read(Self::port_register(GPLEV0, port))
	}

	fn set_port_direction(&mut self, port: u8, mask: u32, direction: Direction) {
		let function = match direction {
			Direction::Input => FSEL_INPUT,
			Direction::Output => FSEL_OUTPUT,
		};
		for bit in 0..32u8 {
			if 0 != mask & (1 << bit) {
				self.set_function(port * 32 + bit, function);
			}
		}
	}

	fn set_port_pull(&mut self, port: u8, mask: u32, pull: Pull) {
		match self.pull_control {
			PullControl::Legacy => {
				let code = match pull {
					Pull::Off => PUD_OFF,
					Pull::Up => PUD_UP,
					Pull::Down => PUD_DOWN,
				};
				let clock = Self::port_register(GPPUDCLK0, port);
				self.regs.write(GPPUD, code);
				spin_delay(Duration::from_micros(PUD_SETUP_US.into()));
				self.regs.write(clock, mask);
				spin_delay(Duration::from_micros(PUD_SETUP_US.into()));
				self.regs.write(GPPUD, PUD_OFF);
				self.regs.write(clock, 0);
			},
			PullControl::Bcm2711 => {
				let code = match pull {
					Pull::Off => PUP_PDN_OFF,
					Pull::Up => PUP_PDN_UP,
					Pull::Down => PUP_PDN_DOWN,
				};
				for bit in 0..32u8 {
					if 0 != mask & (1 << bit) {
						let (reg, shift) = pup_pdn_field(port * 32 + bit);
						let old = self.regs.read(reg);
						self.regs.write(reg, (old & !(PUP_PDN_MASK << shift)) | (code << shift));
					}
				}
			},
		}
	}

	fn delay_us(&mut self, us: u32) {
		Self::pause_us(us);
	}
}

pub fn open_gpiomem(path: &str) -> crate::AResult<Gpiomem> {
	with_context!(("couldn't map GPIO registers from {}", path), {
		let regs = mapped::map_device(path, GPIO_BLOCK_LEN)?;
		let pull_control = if LEGACY_FILL == regs.read(GPIO_PUP_PDN_CNTRL3) {
			PullControl::Legacy
		} else {
			PullControl::Bcm2711
		};
		debug!("mapped {} bytes of GPIO registers from {} ({:?} pull control)", GPIO_BLOCK_LEN, path, pull_control);
		Ok(Gpiomem { regs, pull_control })
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use std::time::Instant;

	use crate::gpio::{
		LineRole,
		Pin,
	};

	#[test]
	fn pin_maps_on_bcm283x() {
		Gpiomem::check_pin_map(&PinMap::standard()).unwrap();
		Gpiomem::check_pin_map(&PinMap::split()).unwrap();

		let mut map = PinMap::standard();
		map.set(LineRole::Xtal1, Pin::gpio(53)).unwrap();
		Gpiomem::check_pin_map(&map).unwrap();
		map.set(LineRole::Xtal1, Pin::gpio(54)).unwrap();
		assert!(Gpiomem::check_pin_map(&map).is_err());
		map.set(LineRole::Xtal1, Pin::new(2, 0)).unwrap();
		assert!(Gpiomem::check_pin_map(&map).is_err());
	}

	#[test]
	fn short_delays_stay_short() {
		let mut taken: Vec<Duration> = (0..200).map(|_| {
			let start = Instant::now();
			Gpiomem::pause_us(1);
			start.elapsed()
		}).collect();
		taken.sort();
		assert!(taken[0] >= Duration::from_micros(1));
		// allow for the odd preemption, but not for sleeping
		assert!(taken[189] < Duration::from_micros(20), "95th percentile {:?}", taken[189]);
	}

	#[test]
	fn long_delays_are_lower_bounds() {
		let start = Instant::now();
		Gpiomem::pause_us(SPIN_LIMIT_US + 500);
		assert!(start.elapsed() >= Duration::from_micros(1500));
	}

	#[test]
	fn bcm2711_pull_fields() {
		assert_eq!(pup_pdn_field(0), (0xe4, 0));
		assert_eq!(pup_pdn_field(17), (0xe8, 2));
		assert_eq!(pup_pdn_field(53), (0xf0, 10));
	}
}
