//! Command line entry point for Impulcifer.

use clap::Parser;
use impulcifer::{
    args::{
        CommandTask::{Process, Sweep},
        ImpulciferArgs, ProcessCommand, SweepCommand,
    },
    pipeline::Pipeline,
    sweep::ReferenceSweep,
    wav::{read_wav, write_channels},
    Result,
};

use log::{error, info};
use std::process::ExitCode;

// Example:
// cargo run --bin impulcifer --
//                            process
//                            --dir-path    data/demo
//                            --speakers    FL,FR
//                            --silence-length 2.0
//                            --compensate-headphones

fn main() -> ExitCode {
    env_logger::init();
    let args = ImpulciferArgs::parse();

    let result = match args.command {
        Process(cmd) => process(&cmd),
        Sweep(cmd) => sweep(&cmd),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn process(cmd: &ProcessCommand) -> Result<()> {
    let config = cmd.pipeline_config()?;
    let paths = cmd.paths()?;
    info!("reading {:?} and {:?}", paths.recording, paths.test_signal);

    let recording = read_wav(&paths.recording)?;
    let reference = ReferenceSweep::from_signal(
        read_wav(&paths.test_signal)?,
        config.low_frequency,
        config.high_frequency,
    )?;
    let headphones = match &paths.headphones {
        Some(path) if config.compensate_headphones => Some(read_wav(path)?),
        _ => None,
    };

    let output = Pipeline::new(config).process(recording, &reference, headphones)?;
    output.write(&paths.out_dir)
}

fn sweep(cmd: &SweepCommand) -> Result<()> {
    let sweep = ReferenceSweep::exponential(cmd.samp_rate, cmd.duration, cmd.low, cmd.high)?;
    write_channels(&cmd.outfile, sweep.sample_rate(), &[sweep.samples()])?;
    info!(
        "wrote a {} s sweep from {} Hz to {} Hz to {:?}",
        sweep.duration(),
        sweep.low(),
        sweep.high(),
        cmd.outfile
    );
    Ok(())
}
