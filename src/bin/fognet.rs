//! Command-line driver for fog network experiments and attack replays.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use symbios_fognet::{
    parse_best_layouts, Attack, AttackSim, Experiment, ExperimentConfig, FitnessEvaluator,
    Heuristic, Layout, ReportSink, WriterSink,
};

/// Evolve fog/edge/cloud network wiring with self-driving automata.
#[derive(Parser, Debug)]
#[command(name = "fognet", version, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one evolutionary experiment
    Run(RunArgs),
    /// Replay evolved networks under a denial-of-service attack
    Attack(AttackArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON experiment configuration (defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid layout file; a random layout is generated when omitted
    #[arg(short, long)]
    layout: Option<PathBuf>,

    /// Write fitness lines and the final report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the configured seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Save the layout that was used, for later attack replays
    #[arg(long)]
    save_layout: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("kind").required(true).args(["towers", "inject"])))]
struct AttackArgs {
    /// Report text containing `Best Layout:` lines
    #[arg(short, long)]
    report: PathBuf,

    /// Grid layout the report was produced on
    #[arg(short, long)]
    layout: PathBuf,

    /// Configuration of the original run (traffic and seed)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable this many random mid towers
    #[arg(long)]
    towers: Option<usize>,

    /// Flood this many random mid towers with extra streams
    #[arg(long)]
    inject: Option<usize>,

    /// Streams added per flooded tower
    #[arg(long, default_value_t = 5)]
    streams: usize,

    /// Size of each injected stream (Mbps)
    #[arg(long, default_value_t = 20.0)]
    stream_size: f64,

    /// Heuristic index (0..7) used to score before and after
    #[arg(long, default_value_t = 0)]
    heuristic: usize,

    /// Seed for picking attacked towers
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => run(args),
        Command::Attack(args) => attack(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> symbios_fognet::Result<ExperimentConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ExperimentConfig::from_path(path)
        }
        None => Ok(ExperimentConfig::default()),
    }
}

fn load_layout(path: &PathBuf) -> symbios_fognet::Result<Layout> {
    info!("Loading layout from {}", path.display());
    Layout::parse(&fs::read_to_string(path)?)
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let layout = args.layout.as_ref().map(load_layout).transpose()?;

    let experiment = Experiment::new(config, layout)?;
    if let Some(path) = &args.save_layout {
        fs::write(path, experiment.topology().layout().to_grid_string())?;
        info!("Layout saved to {}", path.display());
    }

    let mut sink: Box<dyn ReportSink> = match &args.output {
        Some(path) => Box::new(WriterSink::new(BufWriter::new(File::create(path)?))),
        None => Box::new(WriterSink::new(io::stdout().lock())),
    };
    experiment.run(sink.as_mut())?;
    Ok(())
}

fn attack(args: AttackArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_ref())?;
    let layout = load_layout(&args.layout)?;
    let phenotypes = parse_best_layouts(&fs::read_to_string(&args.report)?)?;
    info!("Found {} stored networks", phenotypes.len());

    let attack = match (args.towers, args.inject) {
        (Some(count), _) => Attack::DisableTowers { count },
        (None, Some(targets)) => Attack::InjectTraffic {
            targets,
            streams_per_target: args.streams,
            stream_size: args.stream_size,
        },
        (None, None) => unreachable!("clap requires --towers or --inject"),
    };

    let fitness = FitnessEvaluator::new(symbios_fognet::FitnessConfig {
        heuristic: Heuristic::from_index(args.heuristic)?,
        ..config.evolver.fitness
    });
    let topology = Experiment::new(config, Some(layout))?.topology().clone();
    let mut sim = AttackSim::new(topology, fitness, args.seed);

    for (idx, phenotype) in phenotypes.iter().enumerate() {
        let outcome = sim.simulate(phenotype, &attack)?;
        println!(
            "Network {}: towers {:?} fitness {} -> {} disconnected {} -> {} failed streams {} -> {}",
            idx + 1,
            outcome.targets,
            outcome.fitness_before,
            outcome.fitness_after,
            outcome.disconnected_before,
            outcome.disconnected_after,
            outcome.failed_before,
            outcome.failed_after,
        );
    }
    Ok(())
}
