// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use lqrseam::imageio::{energy_image, from_dynamic, to_dynamic};
use lqrseam::{logging, Carver, CarverConfig, EnergyFunction, ResizeOrder, ResizeStatus, VMapSnapshot};
use std::fs;
use std::process;

extern crate clap;
extern crate image;

use clap::{App, Arg, ArgMatches};
use failure::{bail, format_err, Error};
use log::info;

/// A size given as pixels, or as a percentage of `reference`.
fn parse_size(text: &str, reference: u32) -> Result<u32, Error> {
    let size = match text.strip_suffix('%') {
        Some(percent) => {
            let p: f64 = percent
                .trim()
                .parse()
                .map_err(|_| format_err!("'{}' is not a percentage", text))?;
            if !p.is_finite() || p <= 0.0 {
                bail!("'{}' is not a positive percentage", text);
            }
            (reference as f64 * p / 100.0).round() as u32
        }
        None => text
            .trim()
            .parse()
            .map_err(|_| format_err!("'{}' is not a size in pixels", text))?,
    };
    if size == 0 {
        bail!("'{}' comes to zero pixels", text);
    }
    Ok(size)
}

fn configuration(matches: &ArgMatches) -> Result<CarverConfig, Error> {
    let mut config = match matches.value_of("config") {
        Some(path) => CarverConfig::load(path)?,
        None => CarverConfig::default(),
    };
    if let Some(step) = matches.value_of("step") {
        config.max_step = step
            .parse()
            .map_err(|_| format_err!("'{}' is not a step size", step))?;
    }
    if let Some(rigidity) = matches.value_of("rigidity") {
        config.rigidity = rigidity
            .parse()
            .map_err(|_| format_err!("'{}' is not a rigidity", rigidity))?;
    }
    if let Some(order) = matches.value_of("order") {
        config.resize_order = order.parse::<ResizeOrder>()?;
    }
    if let Some(switch) = matches.value_of("side-switch") {
        config.side_switch_frequency = switch
            .parse()
            .map_err(|_| format_err!("'{}' is not a switch frequency", switch))?;
    }
    if let Some(energy) = matches.value_of("energy") {
        config.energy = energy.parse::<EnergyFunction>()?;
    }
    config.validate()?;
    Ok(config)
}

fn run() -> Result<(), Error> {
    let matches = App::new("lqrseam")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Content-aware resizing by seam carving")
        .arg(
            Arg::with_name("input")
                .help("The image to resize")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("Where to write the result; the format follows the extension"),
        )
        .arg(
            Arg::with_name("width")
                .long("width")
                .takes_value(true)
                .help("Target width, in pixels or as a percentage (50%)"),
        )
        .arg(
            Arg::with_name("height")
                .long("height")
                .takes_value(true)
                .help("Target height, in pixels or as a percentage (50%)"),
        )
        .arg(
            Arg::with_name("step")
                .long("step")
                .takes_value(true)
                .help("Largest sideways move of a seam between rows"),
        )
        .arg(
            Arg::with_name("rigidity")
                .long("rigidity")
                .takes_value(true)
                .help("Cost of sideways seam moves"),
        )
        .arg(
            Arg::with_name("order")
                .long("order")
                .takes_value(true)
                .help("horizontal, vertical, alternate or alternate:N"),
        )
        .arg(
            Arg::with_name("side-switch")
                .long("side-switch")
                .takes_value(true)
                .help("Flip the tie-break side this many times per pass"),
        )
        .arg(
            Arg::with_name("energy")
                .long("energy")
                .takes_value(true)
                .help("norm, sumabs, xabs, luma or null"),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("JSON carver settings; flags override it"),
        )
        .arg(
            Arg::with_name("dump-vmap")
                .long("dump-vmap")
                .takes_value(true)
                .help("Write the visibility map to this JSON file"),
        )
        .arg(
            Arg::with_name("load-vmap")
                .long("load-vmap")
                .takes_value(true)
                .help("Start from a visibility map written by --dump-vmap"),
        )
        .arg(
            Arg::with_name("energy-map")
                .long("energy-map")
                .takes_value(true)
                .help("Write the energy of the result as a grey image"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Debug logging; RUST_LOG is honoured"),
        )
        .get_matches();

    logging::init(matches.is_present("verbose"));
    let config = configuration(&matches)?;

    let input = matches.value_of("input").unwrap_or_default();
    let picture = image::open(input).map_err(|e| format_err!("{}: {}", input, e))?;
    let mut carver = Carver::new(from_dynamic(&picture)?)?;
    carver.configure(&config)?;
    carver.init(config.max_step, config.rigidity)?;

    if let Some(path) = matches.value_of("load-vmap") {
        let snapshot = VMapSnapshot::from_json(&fs::read_to_string(path)?)?;
        carver.load_vmap(&snapshot)?;
    }

    let width = match matches.value_of("width") {
        Some(w) => parse_size(w, carver.ref_width())?,
        None => carver.width(),
    };
    let height = match matches.value_of("height") {
        Some(h) => parse_size(h, carver.ref_height())?,
        None => carver.height(),
    };
    if let ResizeStatus::Cancelled { width, height } = carver.resize(width, height)? {
        bail!("resize stopped at {}x{}", width, height);
    }
    info!("{} is now {}x{}", input, carver.width(), carver.height());

    if let Some(path) = matches.value_of("dump-vmap") {
        fs::write(path, carver.dump_vmap()?.to_json()?)?;
    }
    if let Some(path) = matches.value_of("energy-map") {
        energy_image(carver.width(), carver.height(), &carver.energy_map()?)?.save(path)?;
    }
    match matches.value_of("output") {
        Some(path) => to_dynamic(&carver.render()?)?.save(path)?,
        None if matches.is_present("dump-vmap") || matches.is_present("energy-map") => {}
        None => bail!("nothing to do: give --output, --dump-vmap or --energy-map"),
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("lqrseam: {}", e);
        for cause in e.iter_causes() {
            eprintln!("  caused by: {}", cause);
        }
        process::exit(1);
    }
}
