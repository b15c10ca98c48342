#![warn(clippy::all)]

use std::{fmt::Display, str::FromStr, time::Instant};

use anyhow::{anyhow, bail, Result};
use clap::{App, Arg, ArgMatches};
use dualbuf_core::{containers::DualDomainBuffer, nalgebra::Vector2};
use log::{debug, info};
use rand::{rngs::SmallRng, Rng, SeedableRng};

struct Args {
    pub dims: Vector2<usize>,
    pub iterations: usize,
    pub dual_domain: bool,
    pub fill: u8,
    pub seed: Option<u64>,
}

fn parse_value<T>(matches: &ArgMatches, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = matches
        .value_of(name)
        .ok_or_else(|| anyhow!("Missing value for {}", name))?;
    raw.parse::<T>()
        .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", raw, name, e))
}

fn get_args() -> Result<Args> {
    let matches = App::new("dualbuf roundtrip")
        .version("0.1")
        .about("Allocates a dual-domain buffer and verifies clear, transfer and copy operations on it")
        .arg(
            Arg::with_name("WIDTH")
                .short("W")
                .long("width")
                .takes_value(true)
                .value_name("WIDTH")
                .default_value("640")
                .help("Width of the buffer in elements"),
        )
        .arg(
            Arg::with_name("HEIGHT")
                .short("H")
                .long("height")
                .takes_value(true)
                .value_name("HEIGHT")
                .default_value("480")
                .help("Height of the buffer in elements"),
        )
        .arg(
            Arg::with_name("ITERATIONS")
                .short("n")
                .long("iterations")
                .takes_value(true)
                .value_name("COUNT")
                .default_value("10")
                .help("Number of roundtrips to run"),
        )
        .arg(
            Arg::with_name("HOST_ONLY")
                .long("host-only")
                .help("Allocate host memory only. Transfers become no-ops and are not verified"),
        )
        .arg(
            Arg::with_name("FILL")
                .long("fill")
                .takes_value(true)
                .value_name("BYTE")
                .default_value("255")
                .help("Byte value used to clear the buffer"),
        )
        .arg(
            Arg::with_name("SEED")
                .long("seed")
                .takes_value(true)
                .value_name("SEED")
                .help("Seed for the random test patterns"),
        )
        .get_matches();

    let seed = if matches.is_present("SEED") {
        Some(parse_value(&matches, "SEED")?)
    } else {
        None
    };

    Ok(Args {
        dims: Vector2::new(
            parse_value(&matches, "WIDTH")?,
            parse_value(&matches, "HEIGHT")?,
        ),
        iterations: parse_value(&matches, "ITERATIONS")?,
        dual_domain: !matches.is_present("HOST_ONLY"),
        fill: parse_value(&matches, "FILL")?,
        seed,
    })
}

fn verify_fill(buffer: &DualDomainBuffer<u32>, fill: u8) -> Result<()> {
    let expected = u32::from_ne_bytes([fill; 4]);
    if let Some(index) = buffer.host_data().iter().position(|value| *value != expected) {
        bail!(
            "Element {} is {:#x} after clearing with {:#x}",
            index,
            buffer.host_data()[index],
            fill
        );
    }
    Ok(())
}

fn run_roundtrip(
    buffer: &mut DualDomainBuffer<u32>,
    copy: &mut DualDomainBuffer<u32>,
    args: &Args,
    rng: &mut SmallRng,
) -> Result<()> {
    buffer.clear(args.fill);
    verify_fill(buffer, args.fill)?;

    let pattern = (0..buffer.len()).map(|_| rng.gen()).collect::<Vec<u32>>();
    buffer.host_data_mut().copy_from_slice(&pattern);
    buffer.update_device_from_host();

    copy.set_from(buffer, true, true);
    if copy.host_data() != pattern.as_slice() {
        bail!("Host copy differs from its source");
    }

    buffer.host_data_mut().iter_mut().for_each(|value| *value = !*value);
    buffer.update_host_from_device();
    if buffer.is_dual_domain() && buffer.host_data() != pattern.as_slice() {
        bail!("Host data was not restored from the device");
    }

    if buffer.is_dual_domain() {
        copy.host_data_mut().fill(0);
        copy.update_host_from_device();
        if copy.host_data() != pattern.as_slice() {
            bail!("Device copy differs from its source");
        }
    }

    // Same dimensions, so nothing may be reallocated
    let before = copy.host_data().to_vec();
    copy.change_dims(buffer.dims());
    if copy.host_data() != before.as_slice() {
        bail!("change_dims with unchanged dimensions modified the content");
    }
    Ok(())
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = get_args()?;
    let mut rng = match args.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };

    let mut buffer = DualDomainBuffer::<u32>::new(args.dual_domain);
    buffer.allocate(args.dims);
    let mut copy = DualDomainBuffer::<u32>::with_dims(args.dims, args.dual_domain);
    info!(
        "Running {} roundtrips on a {}x{} buffer ({} bytes per domain, {})",
        args.iterations,
        args.dims.x,
        args.dims.y,
        buffer.size_in_bytes(),
        if args.dual_domain {
            "dual-domain"
        } else {
            "host only"
        }
    );

    let t_start = Instant::now();
    for iteration in 0..args.iterations {
        run_roundtrip(&mut buffer, &mut copy, &args, &mut rng)
            .map_err(|e| anyhow!("Roundtrip {} failed: {}", iteration + 1, e))?;
        debug!("Roundtrip {}/{} ok", iteration + 1, args.iterations);
    }
    let elapsed = t_start.elapsed();

    info!(
        "{} roundtrips took {:.3}ms ({:.3}ms per roundtrip)",
        args.iterations,
        elapsed.as_secs_f64() * 1000.0,
        elapsed.as_secs_f64() * 1000.0 / args.iterations.max(1) as f64
    );
    Ok(())
}
