#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate hvrescue;
use hvrescue::*;

use std::io;
use std::process::exit;

use hvrescue::console::{
	Console,
	FuseSource,
};
use hvrescue::fuse::{
	FuseSelector,
	FuseSet,
	ProgrammingMode,
};
use hvrescue::gpio::PinMap;
use hvrescue::session::{
	Session,
	SessionConfig,
};
use hvrescue::sim::SimulatedTarget;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn pin_map(matches: &clap::ArgMatches) -> AResult<PinMap> {
	let mut map = PinMap::preset(matches.value_of("pins").unwrap_or("standard"))?;
	if let Some(bindings) = matches.values_of("pin") {
		for binding in bindings {
			map.apply_override(binding)?;
		}
	}
	map.validate()?;
	for (name, pin) in map.bindings() {
		debug!("{} on pin {}", name, pin);
	}
	Ok(map)
}

fn fuse_source(matches: &clap::ArgMatches, burn_efuse: bool) -> AResult<FuseSource> {
	let given = [
		("lfuse", FuseSelector::Low),
		("hfuse", FuseSelector::High),
		("efuse", FuseSelector::Extended),
	];

	if !matches.is_present("batch") {
		for &(name, _) in given.iter() {
			if matches.is_present(name) {
				warn!("--{} is ignored without --batch", name);
			}
		}
		return Ok(FuseSource::Interactive);
	}

	ensure!(burn_efuse || !matches.is_present("efuse"), "--efuse needs --extended");
	let mut fuses = FuseSet::defaults(burn_efuse);
	for &(name, selector) in given.iter() {
		if let Some(value) = matches.value_of(name) {
			fuses.set(selector, fuse::parse_fuse_byte(value)?);
		}
	}
	Ok(FuseSource::Fixed(fuses))
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@arg mode: -m --mode +takes_value "Chip family: atmega (1), tiny2313 (2) or hvsp (3); asks if not given")
		(@arg extended: -x --extended "Also read and burn the extended fuse byte (EFUSE)")
		(@arg batch: -b --batch "Burn fixed fuse values instead of asking for them")
		(@arg lfuse: --lfuse +takes_value "LFUSE value in batch mode (hex, default 0x62)")
		(@arg hfuse: --hfuse +takes_value "HFUSE value in batch mode (hex, default 0xDF)")
		(@arg efuse: --efuse +takes_value "EFUSE value in batch mode (hex, default 0xF9)")
		(@arg pins: -p --pins +takes_value "Pin layout: standard (default) or split")
		(@arg pin: --pin +takes_value +multiple number_of_values(1) "Move one signal to another pin: ROLE=PIN, PIN is a GPIO number or port.bit")
		(@arg device: -d --device +takes_value "GPIO register device (default /dev/gpiomem)")
		(@arg simulate: -s --simulate "Run one session against a simulated target")
		(@arg once: --once "Exit after one session")
	).get_matches();

	let map = pin_map(&matches)?;
	let burn_efuse = matches.is_present("extended");
	let source = fuse_source(&matches, burn_efuse)?;

	let stdin = io::stdin();
	let stdout = io::stdout();
	let mut console = Console::new(stdin.lock(), stdout.lock(), source);

	let mode = if matches.is_present("mode") {
		let mode = get_param::<ProgrammingMode>(&matches, "mode")?;
		console.announce_mode(mode)?;
		mode
	} else {
		console.select_mode()?
	};
	let config = SessionConfig { mode, burn_efuse };

	if matches.is_present("simulate") {
		let mut target = SimulatedTarget::new(&map, mode, FuseSet::defaults(true));
		target.press_button();
		let mut session = Session::new(target, &map, config);
		session.run(&mut console)?;
		return Ok(());
	}

	gpio::Gpiomem::check_pin_map(&map)?;
	let device = matches.value_of("device").unwrap_or("/dev/gpiomem");
	let gpio = gpio::open_gpiomem(device)?;

	let mut session = Session::new(gpio, &map, config);
	loop {
		session.run(&mut console)?;
		if matches.is_present("once") {
			break;
		}
	}

	Ok(())
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
