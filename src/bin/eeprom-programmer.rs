#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

use parallel_eeprom_programmer::*;
use parallel_eeprom_programmer::gpio::Gpio;
use parallel_eeprom_programmer::sim::SimulatedChip;

use std::fs;
use std::process::exit;
use std::time::Instant;

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

fn parse_pattern(matches: &clap::ArgMatches) -> AResult<u8> {
	let pattern = matches.value_of("pattern").unwrap_or("ff");
	let digits = pattern.trim_start_matches("0x").trim_start_matches("0X");
	match u8::from_str_radix(digits, 16) {
		Ok(p) => Ok(p),
		Err(_) => bail!("invalid erase pattern {:?}, expected a hex value in [00, ff]", pattern),
	}
}

fn open_backend(matches: &clap::ArgMatches, registry: &WiringRegistry, chip: &str, socket: &str) -> AResult<Box<dyn Gpio>> {
	let backend = matches.value_of("backend").unwrap_or("sysfs");
	let gpio: Box<dyn Gpio> = match backend {
		"sysfs" => {
			let socket = registry.socket(socket).ok_or(ProgrammerError::InvalidWiringType)?;
			match gpio::linux::open_sysfs(&socket.board_pins()) {
				Ok(gpio) => Box::new(gpio) as Box<dyn Gpio>,
				Err(e) => bail!("couldn't open sysfs GPIO pins of {}: {}", socket.name, e),
			}
		},
		"gpiomem" => {
			match gpio::linux::open_gpiomem() {
				Ok(gpio) => Box::new(gpio) as Box<dyn Gpio>,
				Err(e) => bail!("couldn't map /dev/gpiomem: {}", e),
			}
		},
		"sim" => {
			let profile = registry.resolve(chip, socket)?;
			warn!("using a simulated {} (erased, nothing is written to real hardware)", profile.model());
			Box::new(SimulatedChip::new(&profile)) as Box<dyn Gpio>
		},
		_ => bail!("unknown backend {:?}", backend),
	};
	debug!("backend: {}", backend);
	Ok(gpio)
}

fn list(registry: &WiringRegistry) -> AResult<()> {
	println!("chips:");
	for name in registry.chip_names() {
		if let Some(chip) = registry.chip(name) {
			println!("  {:<12} {:<8} write cycle {} us", chip.name, chip.package, chip.write_cycle_us);
		}
	}
	println!("sockets:");
	for name in registry.socket_names() {
		if let Some(socket) = registry.socket(name) {
			println!("  {:<12} {:<8} {} pins", socket.name, socket.package, socket.pins.len());
		}
	}
	Ok(())
}

type Prog = Programmer<Box<dyn Gpio>>;

fn read(programmer: &mut Prog, page_size: usize, sub_m: &clap::ArgMatches) -> AResult<()> {
	let file: String = get_param(sub_m, "FILE")?;
	let start = Instant::now();
	let data = image::read_image(programmer, page_size)?;
	if let Err(e) = fs::write(&file, &data) {
		bail!("couldn't write {:?}: {}", file, e);
	}
	info!("read data: success, {} bytes in {:.02} sec", data.len(), start.elapsed().as_secs_f64());
	Ok(())
}

fn erase(programmer: &mut Prog, page_size: usize, pattern: u8) -> AResult<()> {
	info!("erase data: 0x{:02X}", pattern);
	let start = Instant::now();
	image::erase(programmer, pattern, page_size)?;
	info!("erase data: success, {:.02} sec", start.elapsed().as_secs_f64());
	Ok(())
}

fn write(programmer: &mut Prog, page_size: usize, sub_m: &clap::ArgMatches) -> AResult<()> {
	let file: String = get_param(sub_m, "FILE")?;
	let data = match fs::read(&file) {
		Ok(d) => d,
		Err(e) => bail!("couldn't read {:?}: {}", file, e),
	};

	if !sub_m.is_present("skip_erase") {
		erase(programmer, page_size, parse_pattern(sub_m)?)?;
	}

	let start = Instant::now();
	image::write_image(programmer, &data, page_size)?;
	info!("write data: success, {} bytes in {:.02} sec", data.len(), start.elapsed().as_secs_f64());

	if !sub_m.is_present("no_verify") {
		image::verify_image(programmer, &data, page_size)?;
		info!("verify data: success");
	}
	Ok(())
}

fn dump(programmer: &mut Prog, page_size: usize, sub_m: &clap::ArgMatches) -> AResult<()> {
	let page = match sub_m.value_of("page") {
		Some(_) => Some(get_param::<u32>(sub_m, "page")?),
		None => None,
	};
	for line in image::dump_pages(programmer, page_size, page)? {
		println!("{}", line);
	}
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg backend: -b --backend +takes_value possible_value[sysfs gpiomem sim] default_value("sysfs") "GPIO backend")
		(@arg socket: -s --socket +takes_value default_value("RPI_DIP28") "socket wiring the chip is plugged into")
		(@arg wiring: --wiring +takes_value "YAML file with additional chip and socket definitions")
		(@arg chip: -p --chip +takes_value "chip model (e.g. AT28C64)")
		(@arg page_size: --("page-size") +takes_value default_value("64") "page size for page operations (1..64)")
		(@arg oe_delay: --("oe-delay-us") +takes_value default_value("1") "delay between !OE and sampling the data bus")
		(@arg write_margin: --("write-margin") +takes_value default_value("140") "maximum write completion wait, percent of the chip's write cycle time")
		(@subcommand list =>
			(about: "list known chips and sockets")
		)
		(@subcommand read =>
			(about: "read the whole chip into a file")
			(@arg FILE: +required "output file")
		)
		(@subcommand write =>
			(about: "write a file into the chip (erases and verifies by default)")
			(@arg FILE: +required "input file")
			(@arg skip_erase: --("skip-erase") "don't erase the chip first")
			(@arg no_verify: --("no-verify") "don't read back the written data")
			(@arg pattern: --pattern +takes_value "erase pattern (hex)")
		)
		(@subcommand erase =>
			(about: "fill the whole chip with a pattern")
			(@arg pattern: --pattern +takes_value "erase pattern (hex, default ff)")
		)
		(@subcommand dump =>
			(about: "hex dump pages of the chip")
			(@arg page: --page +takes_value "only dump this page")
		)
	).get_matches();

	let mut registry = WiringRegistry::builtin()?;
	if let Some(path) = matches.value_of("wiring") {
		registry.load_file(path)?;
	}

	if let ("list", _) = matches.subcommand() {
		return list(&registry);
	}

	let chip = match matches.value_of("chip") {
		Some(c) => c.to_string(),
		None => bail!("missing chip model (-p)"),
	};
	let socket: String = get_param(&matches, "socket")?;
	let page_size: usize = get_param(&matches, "page_size")?;
	let timings = Timings {
		output_enable_delay_us: get_param(&matches, "oe_delay")?,
		write_margin_percent: get_param(&matches, "write_margin")?,
		..Timings::default()
	};

	let gpio = open_backend(&matches, &registry, &chip, &socket)?;
	let mut programmer = Programmer::with_timings(gpio, registry, timings);
	programmer.init_programmer(&socket)?;
	programmer.init_chip(&chip)?;
	if let Some(profile) = programmer.profile() {
		info!("{}: {} bytes", profile.model(), profile.memory_size());
	}

	let result = match matches.subcommand() {
		("read", Some(sub_m)) => read(&mut programmer, page_size, sub_m),
		("write", Some(sub_m)) => write(&mut programmer, page_size, sub_m),
		("erase", Some(sub_m)) => {
			let pattern = parse_pattern(sub_m)?;
			erase(&mut programmer, page_size, pattern)
		},
		("dump", Some(sub_m)) => dump(&mut programmer, page_size, sub_m),
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	};

	programmer.release_chip()?;
	result
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		let code = e.iter_chain().filter_map(|f| f.downcast_ref::<ProgrammerError>()).next();
		if let Some(pe) = code {
			error!("programmer error code {}", pe.code());
		}
		exit(1);
	}
}
