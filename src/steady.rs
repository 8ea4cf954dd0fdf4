//! Steady-state engine: one tournament per step, the two best sampled
//! members breed and their children overwrite the two worst sampled.

use tracing::debug;

use crate::engine::{EngineCore, EvolutionEngine, EvolverConfig};
use crate::error::Result;
use crate::population::{Population, Vitality};
use crate::report::Report;
use crate::sda::{Sda, SdaConfig};
use crate::topology::Topology;

/// What a single mating event did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatingEvent {
    /// Slots of the two parents.
    pub parents: (usize, usize),
    /// Slots overwritten by the children.
    pub replaced: (usize, usize),
    /// Evaluation of each child.
    pub children: (Vitality, Vitality),
}

/// Steady-state tournament engine.
#[derive(Debug, Clone)]
pub struct SteadyState {
    core: EngineCore,
    seeded_dead: usize,
}

impl SteadyState {
    /// Validate the configuration and initialize a viable population.
    pub fn new(config: EvolverConfig, sda: SdaConfig, topology: Topology, seed: u64) -> Result<Self> {
        Self::with_genotypes(config, sda, topology, seed, Vec::new())
    }

    /// Start from existing genotypes, e.g. the best of earlier runs.
    /// Slots beyond them are filled randomly.
    pub fn with_genotypes(
        config: EvolverConfig,
        sda: SdaConfig,
        topology: Topology,
        seed: u64,
        genotypes: Vec<Sda>,
    ) -> Result<Self> {
        let (core, seeded_dead) = EngineCore::seeded(config, sda, topology, seed, genotypes)?;
        Ok(Self { core, seeded_dead })
    }

    /// Seeded genotypes that were non-viable and got replaced.
    #[must_use]
    pub const fn seeded_dead(&self) -> usize {
        self.seeded_dead
    }

    /// The network the population is evaluated on.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.core.topology
    }

    /// Tournament, breed, evaluate, replace.
    pub fn mating_event(&mut self) -> Result<MatingEvent> {
        let core = &mut self.core;
        let size = core.config.tournament_size;
        let picked = core
            .population
            .tournament(size, core.config.tournament_max_repeats, &mut core.rng);

        let parents = (picked[0], picked[1]);
        let mut first = core.population.members()[parents.0].genotype.clone();
        let mut second = core.population.members()[parents.1].genotype.clone();
        core.breed(&mut first, &mut second)?;

        let first = core.evaluate(first)?;
        let second = core.evaluate(second)?;
        let children = (first.vitality, second.vitality);

        let replaced = (picked[size - 1], picked[size - 2]);
        core.population.replace(replaced.0, first);
        core.population.replace(replaced.1, second);
        core.generations += 1;

        debug!(
            event = core.generations,
            ?parents,
            ?replaced,
            first_viable = children.0.is_viable(),
            second_viable = children.1.is_viable(),
            "mating event"
        );

        Ok(MatingEvent {
            parents,
            replaced,
            children,
        })
    }
}

impl EvolutionEngine for SteadyState {
    fn step(&mut self) -> Result<()> {
        self.mating_event().map(|_| ())
    }

    fn population(&self) -> &Population {
        &self.core.population
    }

    fn generations(&self) -> usize {
        self.core.generations
    }

    fn config(&self) -> &EvolverConfig {
        &self.core.config
    }

    fn report(&mut self) -> Result<Report> {
        self.core.report()
    }
}
