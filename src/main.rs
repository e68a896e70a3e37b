use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};

use fes_cycle_lab::pedal::SampleBuffer;
use fes_cycle_lab::simulation::{ErgometerConfig, MockStimulator, SimulatedErgometer};
use fes_cycle_lab::{
    MuscleSet, Session, SessionConfig, SessionError, SessionResult, StimulationParameters,
    StopSignal,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "FES pedaling on a simulated ergometer", long_about = None)]
struct Args {
    /// JSON session configuration, anything left out takes its default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Channel group to stimulate, overrides the configuration
    #[arg(long, global = true)]
    muscle_set: Option<MuscleSet>,

    /// Cadence of the simulated ergometer
    #[arg(long, global = true, default_value_t = 60.0)]
    cadence: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Optimize stimulation parameters and print the report as JSON
    Optimize {
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        n_init: Option<usize>,

        #[arg(long)]
        n_iterations: Option<usize>,
    },
    /// Replay fixed stimulation parameters from a JSON file
    Stimulate {
        parameters: PathBuf,

        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> SessionResult<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(muscle_set) = args.muscle_set {
        config.muscle_set = muscle_set;
    }
    if let Command::Optimize {
        seed,
        n_init,
        n_iterations,
    } = &args.command
    {
        config.optimizer.seed = seed.or(config.optimizer.seed);
        config.optimizer.n_init = n_init.unwrap_or(config.optimizer.n_init);
        config.optimizer.n_iterations = n_iterations.unwrap_or(config.optimizer.n_iterations);
    }
    config.validate()?;
    Ok(config)
}

fn execute(session: &Session, command: &Command) -> SessionResult<()> {
    match command {
        Command::Optimize { .. } => {
            let report = session.run_optimization()?;
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| {
                    SessionError::InvalidConfig(format!("report is not serializable: {e}"))
                })?;
            println!("{json}");
            Ok(())
        }
        Command::Stimulate { parameters, seconds } => {
            let text = fs::read_to_string(parameters).map_err(|e| {
                SessionError::InvalidConfig(format!("cannot read {}: {e}", parameters.display()))
            })?;
            let parameters: StimulationParameters = serde_json::from_str(&text)
                .map_err(|e| SessionError::InvalidConfig(e.to_string()))?;
            session.stimulate_fixed(&parameters, Some(Duration::from_secs(*seconds)))
        }
    }
}

fn run(args: Args) -> SessionResult<()> {
    let config = load_config(&args)?;
    let buffer = Arc::new(SampleBuffer::new());
    let (device, log) = MockStimulator::new();
    let session = Session::new(config, buffer.clone(), Box::new(device))?;

    let ergometer_stop = StopSignal::new();
    let ergometer = SimulatedErgometer::new(
        ErgometerConfig {
            cadence_rpm: args.cadence,
            ..ErgometerConfig::default()
        },
        buffer,
    )
    .with_stimulator(log.clone())
    .spawn(ergometer_stop.clone());

    let outcome = execute(&session, &args.command);

    ergometer_stop.raise();
    if ergometer.join().is_err() {
        error!("Simulated ergometer panicked");
    }
    info!("Stimulator received {} applies", log.applies());
    outcome
}
