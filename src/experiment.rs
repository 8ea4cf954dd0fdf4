//! Drives an engine from a configuration and writes the results to a sink.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::ExperimentConfig;
use crate::engine::{Algorithm, EvolutionEngine};
use crate::error::Result;
use crate::generational::Generational;
use crate::layout::Layout;
use crate::report::{Report, ReportSink};
use crate::sda::SdaConfig;
use crate::steady::SteadyState;
use crate::topology::Topology;

/// Number of evenly spaced fitness snapshots per run, besides the first
/// and the last.
const SNAPSHOTS: usize = 10;

/// A validated configuration bound to its topology.
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
    topology: Topology,
    engine_seed: u64,
}

impl Experiment {
    /// Validate `config` and build the topology, from `layout` when given,
    /// otherwise from the configured grid.
    pub fn new(config: ExperimentConfig, layout: Option<Layout>) -> Result<Self> {
        config.validate()?;
        // Separate streams so a saved layout replays with the same traffic.
        let mut master = ChaCha8Rng::seed_from_u64(config.seed);
        let mut layout_rng = ChaCha8Rng::seed_from_u64(master.random());
        let mut traffic_rng = ChaCha8Rng::seed_from_u64(master.random());
        let engine_seed = master.random::<u64>();

        let layout = match layout {
            Some(layout) => layout,
            None => Layout::random(&config.grid, &mut layout_rng)?,
        };
        let topology = Topology::new(layout, &config.traffic, &mut traffic_rng)?;
        Ok(Self {
            config,
            topology,
            engine_seed,
        })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// The network every individual is evaluated on.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Genotype structure sized to this topology.
    #[must_use]
    pub fn sda_config(&self) -> SdaConfig {
        SdaConfig {
            output_len: self.topology.phenotype_len(),
            ..self.config.sda.clone()
        }
    }

    /// Build the configured engine with an initialized population.
    pub fn engine(&self) -> Result<Box<dyn EvolutionEngine>> {
        let evolver = self.config.evolver.clone();
        let sda = self.sda_config();
        let topology = self.topology.clone();
        Ok(match evolver.algorithm {
            Algorithm::SteadyState => {
                Box::new(SteadyState::new(evolver, sda, topology, self.engine_seed)?)
            }
            Algorithm::Generational => {
                Box::new(Generational::new(evolver, sda, topology, self.engine_seed)?)
            }
        })
    }

    /// Run the configured number of steps and write the results.
    pub fn run(&self, sink: &mut dyn ReportSink) -> Result<Report> {
        info!(
            seed = self.config.seed,
            algorithm = ?self.config.evolver.algorithm,
            nodes = self.topology.total_nodes(),
            steps = self.config.evolver.num_generations,
            "starting experiment"
        );
        let mut engine = self.engine()?;
        run_engine(engine.as_mut(), self.config.evolver.num_generations, sink)
    }
}

/// Step `engine` `steps` times, sampling fitness values about every tenth
/// of the run, then emit the final report.
pub fn run_engine(
    engine: &mut dyn EvolutionEngine,
    steps: usize,
    sink: &mut dyn ReportSink,
) -> Result<Report> {
    let interval = (steps / SNAPSHOTS).max(1);
    snapshot(engine, sink)?;

    for step in 1..=steps {
        engine.step()?;
        if step % interval == 0 || step == steps {
            snapshot(engine, sink)?;
        }
    }

    let report = engine.report()?;
    info!(
        generations = report.generations,
        best = ?report.best.as_ref().map(|b| b.fitness),
        average = ?report.average_fitness,
        live = report.live_members,
        "experiment finished"
    );
    sink.report(&report)?;
    Ok(report)
}

fn snapshot(engine: &dyn EvolutionEngine, sink: &mut dyn ReportSink) -> Result<()> {
    let population = engine.population();
    info!(
        generation = engine.generations(),
        best = ?population.best().and_then(|m| m.vitality.fitness()),
        average = ?population.average_live_fitness(),
        live = population.live_count(),
        "fitness snapshot"
    );
    sink.fitness_values(&population.fitness_values())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EvolverConfig;
    use crate::layout::GridConfig;
    use crate::report::MemorySink;

    fn small_config(algorithm: Algorithm, steps: usize) -> ExperimentConfig {
        ExperimentConfig {
            seed: 5,
            grid: GridConfig::new(5, 5, 1, 1, 3),
            sda: SdaConfig::binary(3, 1),
            evolver: EvolverConfig {
                algorithm,
                pop_size: 10,
                tournament_size: 3,
                num_generations: steps,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_count() {
        let experiment = Experiment::new(small_config(Algorithm::SteadyState, 25), None).unwrap();
        let mut sink = MemorySink::new();
        experiment.run(&mut sink).unwrap();
        // initial + steps 2,4,..,24 + final
        assert_eq!(sink.fitness_lines.len(), 1 + 12 + 1);
        assert_eq!(sink.reports.len(), 1);
        assert!(sink.fitness_lines.iter().all(|v| v.len() == 10));
    }

    #[test]
    fn test_final_step_not_duplicated() {
        let experiment = Experiment::new(small_config(Algorithm::Generational, 20), None).unwrap();
        let mut sink = MemorySink::new();
        let report = experiment.run(&mut sink).unwrap();
        assert_eq!(sink.fitness_lines.len(), 1 + 10);
        assert_eq!(report.generations, 20);
    }

    #[test]
    fn test_sda_sized_to_topology() {
        let experiment = Experiment::new(small_config(Algorithm::SteadyState, 1), None).unwrap();
        assert_eq!(experiment.sda_config().output_len, 10);
    }

    #[test]
    fn test_runs_reproducible() {
        let config = small_config(Algorithm::SteadyState, 30);
        let a = Experiment::new(config.clone(), None)
            .unwrap()
            .run(&mut MemorySink::new())
            .unwrap();
        let b = Experiment::new(config, None)
            .unwrap()
            .run(&mut MemorySink::new())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_layout_overrides_grid() {
        let layout = Layout::parse("1 0 1\n0 1 0\n1 1 0\n0 0 1\n").unwrap();
        let experiment =
            Experiment::new(small_config(Algorithm::SteadyState, 1), Some(layout)).unwrap();
        assert_eq!(experiment.topology().num_edge_nodes(), 2);
        assert_eq!(experiment.topology().num_mid_nodes(), 3);
        assert_eq!(experiment.topology().num_cloud_nodes(), 1);
    }
}
