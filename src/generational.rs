//! Generational engine with elitism and a tournament parent pool.

use rand::Rng;
use tracing::debug;

use crate::engine::{EngineCore, EvolutionEngine, EvolverConfig};
use crate::error::Result;
use crate::population::{Member, Population};
use crate::report::Report;
use crate::sda::SdaConfig;
use crate::topology::Topology;

/// Redraws allowed when looking for a second parent unlike the first.
const DISTINCT_PARENT_TRIES: usize = 10;

/// Generational tournament engine.
///
/// Each step keeps the `elitism` best members, builds a pool of
/// `tournament_size` tournament winners and fills the rest of the next
/// generation with children of random pool pairs.
#[derive(Debug, Clone)]
pub struct Generational {
    core: EngineCore,
}

impl Generational {
    /// Validate the configuration and initialize a viable population.
    pub fn new(config: EvolverConfig, sda: SdaConfig, topology: Topology, seed: u64) -> Result<Self> {
        Ok(Self {
            core: EngineCore::new(config, sda, topology, seed)?,
        })
    }

    /// The network the population is evaluated on.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.core.topology
    }

    fn pick_parents(&mut self, pool: &[usize]) -> (usize, usize) {
        let core = &mut self.core;
        let first = pool[core.rng.random_range(0..pool.len())];
        let mut second = pool[core.rng.random_range(0..pool.len())];
        for _ in 0..DISTINCT_PARENT_TRIES {
            let members = core.population.members();
            if members[second].genotype != members[first].genotype {
                break;
            }
            second = pool[core.rng.random_range(0..pool.len())];
        }
        (first, second)
    }
}

impl EvolutionEngine for Generational {
    fn step(&mut self) -> Result<()> {
        let pop_size = self.core.config.pop_size;

        let mut order: Vec<usize> = (0..pop_size).collect();
        self.core.population.rank(&mut order);
        let mut next: Vec<Member> = order[..self.core.config.elitism]
            .iter()
            .map(|&i| self.core.population.members()[i].clone())
            .collect();

        let pool = {
            let core = &mut self.core;
            core.population.tournament_pool(
                core.config.tournament_size,
                core.config.tournament_candidates,
                core.config.tournament_max_repeats,
                &mut core.rng,
            )
        };

        while next.len() < pop_size {
            let (a, b) = self.pick_parents(&pool);
            let members = self.core.population.members();
            let mut first = members[a].genotype.clone();
            let mut second = members[b].genotype.clone();
            self.core.breed(&mut first, &mut second)?;

            next.push(self.core.evaluate(first)?);
            if next.len() < pop_size {
                next.push(self.core.evaluate(second)?);
            }
        }

        self.core.population = Population::new(next, self.core.config.lower_is_better);
        self.core.generations += 1;

        debug!(
            generation = self.core.generations,
            live = self.core.population.live_count(),
            best = ?self.core.population.best().and_then(|m| m.vitality.fitness()),
            "generation complete"
        );
        Ok(())
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
