//! # Symbios Fognet
//!
//! Evolves the wiring of simulated fog/edge/cloud networks. Candidate
//! networks are encoded by self-driving automata (SDAs) whose decoded output
//! lists which tower pairs are linked.
//!
//! ## Features
//!
//! - **SDA Genotype**: A small finite-state transducer that feeds on its own
//!   output, with mutation and two-point crossover. Implements
//!   `symbios_genetics::Genotype`.
//! - **Network Simulation**: BFS layering from the cloud tier, greedy
//!   multi-hop traffic forwarding, Dijkstra shortest paths and per-tower
//!   energy draw
//! - **Seven Fitness Heuristics**: Distance, data load, energy and their sums
//! - **Two Engines**: Steady-state tournament replacement and generational
//!   search with elitism, both with a necrotic filter for non-viable wiring
//! - **Attack Replays**: Tower removal and traffic injection against evolved
//!   networks
//!
//! ## Quick Start
//!
//! ```rust
//! use symbios_fognet::{
//!     Algorithm, EvolverConfig, Experiment, ExperimentConfig, GridConfig, MemorySink, SdaConfig,
//! };
//!
//! let config = ExperimentConfig {
//!     seed: 42,
//!     grid: GridConfig::new(5, 5, 1, 1, 3),
//!     sda: SdaConfig::binary(3, 10),
//!     evolver: EvolverConfig {
//!         algorithm: Algorithm::SteadyState,
//!         pop_size: 10,
//!         tournament_size: 3,
//!         num_generations: 20,
//!         ..EvolverConfig::default()
//!     },
//!     ..ExperimentConfig::default()
//! };
//!
//! let experiment = Experiment::new(config, None).unwrap();
//! let mut sink = MemorySink::new();
//! let report = experiment.run(&mut sink).unwrap();
//! println!("{}", report);
//! ```
//!
//! ## Using with Symbios Genetics
//!
//! ```rust,ignore
//! use symbios_genetics::{algorithms::simple::SimpleGA, Evolver};
//! use symbios_fognet::{FitnessEvaluator, NecroticFilter, NetworkEvaluator, Sda, SdaConfig};
//!
//! let evaluator = NetworkEvaluator::new(topology, FitnessEvaluator::default(), NecroticFilter::default());
//! let config = SdaConfig::binary(10, topology_pairs);
//! let initial: Vec<Sda> = (0..100).map(|_| Sda::random(&config, &mut rng)).collect();
//!
//! let mut ga = SimpleGA::new(initial, 0.3, 5, 42);
//! for _ in 0..100 {
//!     ga.step(&evaluator);
//! }
//! ```
//!
//! ## Architecture
//!
//! ### Layout and Topology
//!
//! A [`Layout`] stores tower sites in a `SlotMap` arena so towers can be
//! removed without disturbing the others. A [`Topology`] flattens it into
//! dense indices (edge, mid, cloud) and precomputes distances. Applying a
//! phenotype rebuilds only the per-individual scratch state: adjacency,
//! layers, traffic and energy.
//!
//! ### Vitality
//!
//! A phenotype that is over- or under-wired, or that strands an edge tower,
//! is [`Vitality::NonViable`]. That is an ordinary outcome, not an error:
//! the member keeps its slot and ranks last.

pub mod attack;
pub mod config;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod fitness;
pub mod generational;
pub mod layout;
pub mod population;
pub mod report;
pub mod sda;
pub mod steady;
pub mod topology;

// Re-exports for convenience
pub use attack::{parse_best_layouts, Attack, AttackOutcome, AttackSim};
pub use config::ExperimentConfig;
pub use engine::{Algorithm, EvolutionEngine, EvolverConfig};
pub use error::{FogError, Result};
pub use experiment::{run_engine, Experiment};
pub use fitness::{
    data_fitness, distance_fitness, energy_fitness, minimum_network_fitness, DistanceScoring,
    FitnessConfig, FitnessEvaluator, Heuristic, NetworkEvaluator,
};
pub use generational::Generational;
pub use layout::{GridConfig, Layout, NodeId, Site, Tier};
pub use population::{assess, Member, NecroticFilter, Population, Vitality};
pub use report::{fitness_line, BestMember, MemorySink, Report, ReportSink, WriterSink};
pub use sda::{Sda, SdaConfig};
pub use steady::{MatingEvent, SteadyState};
pub use topology::{ConnectionMode, ShortestPaths, Topology, TrafficConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use symbios_genetics::Genotype;

    #[test]
    fn test_genotype_trait_implementation() {
        let config = SdaConfig::binary(4, 21);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let mut sda = Sda::random(&config, &mut rng);
        let before = sda.clone();

        // Rate 1.0 always applies one trial
        sda.mutate(&mut rng, 1.0);
        let changed = before
            .transitions()
            .iter()
            .zip(sda.transitions())
            .filter(|(a, b)| a != b)
            .count()
            + before
                .responses()
                .iter()
                .zip(sda.responses())
                .filter(|(a, b)| a != b)
                .count();
        assert!(changed <= 1);

        let other = Sda::random(&config, &mut rng);
        let child = sda.crossover(&other, &mut rng);
        assert!(child.is_initialized());
        assert_eq!(child.output().unwrap().len(), 21);
    }

    #[test]
    fn test_genotype_trait_rate_zero_is_noop() {
        let config = SdaConfig::binary(4, 21);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut sda = Sda::random(&config, &mut rng);
        let before = sda.clone();
        for _ in 0..20 {
            sda.mutate(&mut rng, 0.0);
        }
        assert_eq!(sda, before);
    }

    #[test]
    fn test_topology_serialization() {
        let config = GridConfig::new(4, 4, 1, 1, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let layout = Layout::random(&config, &mut rng).unwrap();

        let json = serde_json::to_string(&layout).unwrap();
        let back: Layout = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_grid_string(), layout.to_grid_string());
        assert_eq!(back.len(), layout.len());
    }
}
