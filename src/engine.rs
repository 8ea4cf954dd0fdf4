//! Evolution engine configuration and the machinery both engines share.
//!
//! [`SteadyState`](crate::SteadyState) and [`Generational`](crate::Generational)
//! differ only in how they pick parents and replace members. Population
//! initialization, breeding and evaluation live in [`EngineCore`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::error::{FogError, Result};
use crate::fitness::{FitnessConfig, FitnessEvaluator};
use crate::population::{assess, Member, NecroticFilter, Population};
use crate::report::Report;
use crate::sda::{Sda, SdaConfig};
use crate::topology::Topology;

/// Which engine an experiment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    SteadyState,
    Generational,
}

/// Hyperparameters of both engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolverConfig {
    /// Which engine runs the experiment.
    pub algorithm: Algorithm,
    /// Number of population slots.
    pub pop_size: usize,
    /// Steady-state: slots sampled per mating event.
    /// Generational: size of the parent pool.
    pub tournament_size: usize,
    /// Generational: draws compared per pool winner.
    pub tournament_candidates: usize,
    /// How often one slot may appear in a tournament or pool.
    pub tournament_max_repeats: usize,
    /// Mating events (steady-state) or generations (generational).
    #[serde(alias = "num_mating_events")]
    pub num_generations: usize,
    /// Whether offspring may be produced by crossover.
    pub crossover_enabled: bool,
    /// Probability that a parent pair is crossed over.
    pub crossover_rate: f64,
    /// Whether offspring are mutated.
    pub mutation_enabled: bool,
    /// Probability that a child receives mutation trials.
    pub mutation_rate: f64,
    /// Mutation trials applied when the mutation coin lands.
    pub num_mutations: usize,
    /// Generational: best members copied over unchanged.
    pub elitism: usize,
    /// Rank smaller fitness values first.
    pub lower_is_better: bool,
    /// Link count bounds for viable phenotypes.
    pub necrotic: NecroticFilter,
    /// Random genotypes tried per slot before initialization gives up.
    pub max_init_attempts: usize,
    /// Heuristic and distance scoring.
    pub fitness: FitnessConfig,
}

impl Default for EvolverConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::SteadyState,
            pop_size: 100,
            tournament_size: 7,
            tournament_candidates: 4,
            tournament_max_repeats: 1,
            num_generations: 100,
            crossover_enabled: true,
            crossover_rate: 0.5,
            mutation_enabled: true,
            mutation_rate: 0.1,
            num_mutations: 1,
            elitism: 2,
            lower_is_better: true,
            necrotic: NecroticFilter::default(),
            max_init_attempts: 10_000,
            fitness: FitnessConfig::default(),
        }
    }
}

impl EvolverConfig {
    /// Check ranges. Every error names the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.pop_size < 2 {
            return Err(FogError::config("pop_size", "must be at least 2"));
        }
        if self.tournament_size < 2 {
            return Err(FogError::config("tournament_size", "must be at least 2"));
        }
        if self.tournament_max_repeats == 0 {
            return Err(FogError::config(
                "tournament_max_repeats",
                "must be at least 1",
            ));
        }
        match self.algorithm {
            Algorithm::SteadyState => {
                if self.tournament_size > self.pop_size {
                    return Err(FogError::config(
                        "tournament_size",
                        format!("must not exceed pop_size ({})", self.pop_size),
                    ));
                }
            }
            Algorithm::Generational => {
                if self.tournament_size > self.pop_size * self.tournament_max_repeats {
                    return Err(FogError::config(
                        "tournament_size",
                        "must not exceed pop_size * tournament_max_repeats",
                    ));
                }
                if self.tournament_candidates == 0 {
                    return Err(FogError::config(
                        "tournament_candidates",
                        "must be at least 1",
                    ));
                }
                if self.elitism >= self.pop_size {
                    return Err(FogError::config(
                        "elitism",
                        format!("must be below pop_size ({})", self.pop_size),
                    ));
                }
            }
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(FogError::config("crossover_rate", "must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(FogError::config("mutation_rate", "must be within [0, 1]"));
        }
        if self.mutation_enabled && self.num_mutations == 0 {
            return Err(FogError::config("num_mutations", "must be at least 1"));
        }
        if !(self.necrotic.min_factor >= 0.0) {
            return Err(FogError::config("necrotic.min_factor", "must be non-negative"));
        }
        if !(self.necrotic.max_factor >= self.necrotic.min_factor) {
            return Err(FogError::config(
                "necrotic.max_factor",
                "must not be below necrotic.min_factor",
            ));
        }
        if self.max_init_attempts == 0 {
            return Err(FogError::config("max_init_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

/// Common interface of the evolution engines.
pub trait EvolutionEngine {
    /// One mating event (steady-state) or one generation (generational).
    fn step(&mut self) -> Result<()>;

    fn population(&self) -> &Population;

    /// Steps completed so far.
    fn generations(&self) -> usize;

    fn config(&self) -> &EvolverConfig;

    /// Replay the best member and summarize the population.
    fn report(&mut self) -> Result<Report>;
}

/// State shared by both engines.
#[derive(Debug, Clone)]
pub(crate) struct EngineCore {
    /// Validated engine configuration.
    pub config: EvolverConfig,
    /// Structure of every genotype in the population.
    pub sda: SdaConfig,
    /// Shared network, rewired for each evaluation.
    pub topology: Topology,
    /// Scores viable networks.
    pub fitness: FitnessEvaluator,
    /// Engine-owned random stream.
    pub rng: ChaCha8Rng,
    /// Current members.
    pub population: Population,
    /// Completed steps.
    pub generations: usize,
}

impl EngineCore {
    /// Validate, then fill the population with viable random genotypes.
    pub fn new(config: EvolverConfig, sda: SdaConfig, topology: Topology, seed: u64) -> Result<Self> {
        Self::seeded(config, sda, topology, seed, Vec::new()).map(|(core, _)| core)
    }

    /// Like [`EngineCore::new`], but the first slots take the given
    /// genotypes. Non-viable ones are replaced by random viable genotypes;
    /// their number is returned alongside the core.
    pub fn seeded(
        config: EvolverConfig,
        sda: SdaConfig,
        topology: Topology,
        seed: u64,
        genotypes: Vec<Sda>,
    ) -> Result<(Self, usize)> {
        config.validate()?;
        sda.validate()?;
        if sda.output_len != topology.phenotype_len() {
            return Err(FogError::config(
                "output_len",
                format!(
                    "must equal the topology's pair count ({})",
                    topology.phenotype_len()
                ),
            ));
        }
        if genotypes.len() > config.pop_size {
            return Err(FogError::config(
                "pop_size",
                format!("smaller than the {} seeded genotypes", genotypes.len()),
            ));
        }

        let mut core = Self {
            fitness: FitnessEvaluator::new(config.fitness),
            population: Population::new(Vec::new(), config.lower_is_better),
            rng: ChaCha8Rng::seed_from_u64(seed),
            generations: 0,
            config,
            sda,
            topology,
        };

        let mut members = Vec::with_capacity(core.config.pop_size);
        let mut seeded_dead = 0;
        for genotype in genotypes {
            let member = core.evaluate(genotype)?;
            if member.vitality.is_viable() {
                members.push(member);
            } else {
                seeded_dead += 1;
                members.push(core.random_viable()?);
            }
        }
        while members.len() < core.config.pop_size {
            members.push(core.random_viable()?);
        }
        core.population = Population::new(members, core.config.lower_is_better);

        info!(
            pop_size = core.config.pop_size,
            nodes = core.topology.total_nodes(),
            seeded_dead,
            "population initialized"
        );
        Ok((core, seeded_dead))
    }

    /// Draw random genotypes until one survives the necrotic filter.
    fn random_viable(&mut self) -> Result<Member> {
        for attempt in 1..=self.config.max_init_attempts {
            let genotype = Sda::random(&self.sda, &mut self.rng);
            let member = self.evaluate(genotype)?;
            if member.vitality.is_viable() {
                return Ok(member);
            }
            trace!(attempt, "necrotic genotype rejected during initialization");
        }
        Err(FogError::PopulationExhausted {
            attempts: self.config.max_init_attempts,
        })
    }

    /// Score a genotype on the shared topology.
    pub fn evaluate(&mut self, genotype: Sda) -> Result<Member> {
        let vitality = assess(
            &genotype,
            &mut self.topology,
            &self.config.necrotic,
            &self.fitness,
        )?;
        Ok(Member { genotype, vitality })
    }

    /// Crossover and mutation on a pair of children, in draw order:
    /// crossover coin, cut points, then each child's mutation coin and trials.
    pub fn breed(&mut self, first: &mut Sda, second: &mut Sda) -> Result<()> {
        if self.config.crossover_enabled && self.rng.random::<f64>() < self.config.crossover_rate {
            first.crossover_with(second, &mut self.rng)?;
        }
        if self.config.mutation_enabled {
            for child in [first, second] {
                if self.rng.random::<f64>() < self.config.mutation_rate {
                    child.mutate_n(self.config.num_mutations, &mut self.rng)?;
                }
            }
        }
        Ok(())
    }

    /// Summary of the current population.
    pub fn report(&mut self) -> Result<Report> {
        Report::build(
            &self.population,
            &mut self.topology,
            &self.fitness,
            self.config.mutation_rate,
            self.generations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::GridConfig;
    use crate::topology::TrafficConfig;

    fn small_core(config: EvolverConfig) -> Result<EngineCore> {
        let grid = GridConfig::new(5, 5, 1, 1, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let topology = Topology::random(&grid, &TrafficConfig::default(), &mut rng)?;
        let sda = SdaConfig::binary(3, topology.phenotype_len());
        EngineCore::new(config, sda, topology, 42)
    }

    #[test]
    fn test_default_config_valid() {
        assert!(EvolverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_tournament_larger_than_population() {
        let config = EvolverConfig {
            pop_size: 5,
            tournament_size: 6,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tournament_size"));
    }

    #[test]
    fn test_invalid_rates_and_bounds() {
        let config = EvolverConfig {
            mutation_rate: 1.5,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("mutation_rate"));

        let config = EvolverConfig {
            necrotic: NecroticFilter::new(3.0, 2.0),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("necrotic"));

        let config = EvolverConfig {
            algorithm: Algorithm::Generational,
            pop_size: 4,
            tournament_size: 2,
            elitism: 4,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("elitism"));
    }

    #[test]
    fn test_core_initializes_viable_population() {
        let core = small_core(EvolverConfig {
            pop_size: 10,
            tournament_size: 3,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(core.population.len(), 10);
        assert_eq!(core.population.live_count(), 10);
    }

    #[test]
    fn test_output_len_mismatch_rejected() {
        let grid = GridConfig::new(5, 5, 1, 1, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let topology = Topology::random(&grid, &TrafficConfig::default(), &mut rng).unwrap();
        let sda = SdaConfig::binary(3, 11);
        let err = EngineCore::new(EvolverConfig::default(), sda, topology, 1).unwrap_err();
        assert!(matches!(err, FogError::Config { parameter: "output_len", .. }));
    }

    #[test]
    fn test_exhausted_initialization() {
        let err = small_core(EvolverConfig {
            pop_size: 4,
            tournament_size: 2,
            necrotic: NecroticFilter::new(100.0, 100.0),
            max_init_attempts: 5,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, FogError::PopulationExhausted { attempts: 5 }));
    }
}
