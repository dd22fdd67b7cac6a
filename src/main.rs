mod args;

use anyhow::{bail, Context, Result};
use args::Args;
use blockspeed::*;
use clap::Parser;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::{
    io::{self, Write},
    process::ExitCode,
};

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut conf = load_conf(args)?;
    args.apply(&mut conf);

    TermLogger::init(
        conf.log_level,
        ConfigBuilder::new().build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("Can't set up logging")?;

    let mut device = open_device(args, &conf)?;
    benchmark(device.as_mut(), &conf)
}

fn load_conf(args: &Args) -> Result<Conf> {
    if let Some(path) = &args.config {
        if !path.exists() {
            bail!("Config file {} not found", path.display());
        }
    }
    Conf::load(args.config.as_deref()).context("Can't load configuration")
}

#[cfg(all(feature = "libtiepie", unix))]
fn open_device(args: &Args, conf: &Conf) -> Result<Box<dyn Device>> {
    if args.simulate {
        return Ok(Box::new(SimulatedScope::new(&conf.simulator)?));
    }
    Ok(Box::new(TiePieScope::open(conf.acquisition.serial_number)?))
}

#[cfg(not(all(feature = "libtiepie", unix)))]
fn open_device(args: &Args, conf: &Conf) -> Result<Box<dyn Device>> {
    if !args.simulate {
        log::info!("Built without libtiepie, using the simulated oscilloscope");
    }
    Ok(Box::new(SimulatedScope::new(&conf.simulator)?))
}

fn benchmark(device: &mut dyn Device, conf: &Conf) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", device.describe())?;

    let session = configure(device, &conf.acquisition)?;
    report::write_session(&mut stdout, &session)?;

    let mut acq = AcquisitionLoop::new(device, &session)?;
    writeln!(stdout, "\nPerforming measurements...")?;
    stdout.flush()?;
    report::log_run_start(session.measurements);

    let stats = acq.run()?;
    report::write_result(&mut stdout, &stats)?;
    Ok(())
}
