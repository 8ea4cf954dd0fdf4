//! Denial-of-service replays against evolved networks.
//!
//! A stored phenotype is applied verbatim (the edge-to-cloud rule is
//! bypassed), scored, attacked and scored again.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FogError, Result};
use crate::fitness::FitnessEvaluator;
use crate::report::BEST_LAYOUT_PREFIX;
use crate::topology::{ConnectionMode, Topology};

/// Attack variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attack {
    /// Disable `count` random mid towers. Their links disappear.
    DisableTowers { count: usize },
    /// Add `streams_per_target` streams of `stream_size` Mbps at each of
    /// `targets` random mid towers.
    InjectTraffic {
        targets: usize,
        streams_per_target: usize,
        stream_size: f64,
    },
}

/// Scores before and after one attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackOutcome {
    /// Attack that was applied.
    pub attack: Attack,
    /// Dense indices (in the unattacked network) of the towers hit.
    pub targets: Vec<usize>,
    /// Fitness of the intact network.
    pub fitness_before: f64,
    /// Fitness of the attacked network.
    pub fitness_after: f64,
    /// Some edge node had no route to the cloud before the attack.
    pub disconnected_before: bool,
    /// Some edge node lost its route to the cloud.
    pub disconnected_after: bool,
    /// Undelivered streams before the attack.
    pub failed_before: usize,
    /// Undelivered streams after the attack.
    pub failed_after: usize,
}

/// Extract every `Best Layout:` phenotype from report text.
pub fn parse_best_layouts(text: &str) -> Result<Vec<Vec<usize>>> {
    let mut layouts = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let Some(rest) = line.trim_start().strip_prefix(BEST_LAYOUT_PREFIX.trim_end()) else {
            continue;
        };
        let phenotype = rest
            .split_whitespace()
            .map(|tok| {
                tok.parse::<usize>()
                    .map_err(|_| FogError::parse(idx + 1, format!("invalid symbol `{tok}`")))
            })
            .collect::<Result<Vec<_>>>()?;
        if phenotype.is_empty() {
            return Err(FogError::parse(idx + 1, "empty layout"));
        }
        layouts.push(phenotype);
    }
    Ok(layouts)
}

/// Replays phenotypes on a topology under attack.
#[derive(Debug, Clone)]
pub struct AttackSim {
    topology: Topology,
    fitness: FitnessEvaluator,
    rng: ChaCha8Rng,
}

impl AttackSim {
    /// Simulator over `topology` with its own seeded target picker.
    #[must_use]
    pub fn new(topology: Topology, fitness: FitnessEvaluator, seed: u64) -> Self {
        Self {
            topology,
            fitness,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The unattacked topology.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Score `phenotype` as is, then under `attack`.
    pub fn simulate(&mut self, phenotype: &[usize], attack: &Attack) -> Result<AttackOutcome> {
        let mut before = self.topology.clone();
        let disconnected_before = before.set_connections(phenotype, ConnectionMode::Bypass)?;
        let (fitness_before, failed_before) = self.score(&mut before);

        let num_mid = before.num_mid_nodes();
        let (mut after, targets, disconnected_after) = match *attack {
            Attack::DisableTowers { count } => {
                let targets = self.pick_mid_towers(&before, count)?;
                let (mut after, matrix) = without_towers(&before, &targets)?;
                let dead = after.set_connection_matrix(&matrix)?;
                (after, targets, dead)
            }
            Attack::InjectTraffic {
                targets,
                streams_per_target,
                stream_size,
            } => {
                if !(stream_size > 0.0) {
                    return Err(FogError::MalformedInput(format!(
                        "stream size {stream_size} must be positive"
                    )));
                }
                let targets = self.pick_mid_towers(&before, targets)?;
                let mut after = before.clone();
                let streams = vec![stream_size; streams_per_target];
                for &target in &targets {
                    after.inject_traffic(target, &streams)?;
                }
                (after, targets, disconnected_before)
            }
        };
        let (fitness_after, failed_after) = self.score(&mut after);

        debug!(
            ?attack,
            ?targets,
            num_mid,
            fitness_before,
            fitness_after,
            disconnected_after,
            failed_after,
            "attack simulated"
        );

        Ok(AttackOutcome {
            attack: attack.clone(),
            targets,
            fitness_before,
            fitness_after,
            disconnected_before,
            disconnected_after,
            failed_before,
            failed_after,
        })
    }

    fn pick_mid_towers(&mut self, topology: &Topology, count: usize) -> Result<Vec<usize>> {
        let num_mid = topology.num_mid_nodes();
        if count > num_mid {
            return Err(FogError::MalformedInput(format!(
                "cannot attack {count} towers, network has {num_mid} mid nodes"
            )));
        }
        let offset = topology.num_edge_nodes();
        let mut picked: Vec<usize> = index::sample(&mut self.rng, num_mid, count)
            .into_iter()
            .map(|i| i + offset)
            .collect();
        picked.sort_unstable();
        Ok(picked)
    }

    /// Fitness plus undelivered streams.
    fn score(&self, topology: &mut Topology) -> (f64, usize) {
        let fitness = self.fitness.score(topology);
        if !self.fitness.heuristic().needs_traffic() {
            topology.distribute_traffic();
        }
        (fitness, topology.failed_streams().len())
    }
}

/// Copy of `topology` without the given towers, plus its reduced matrix.
fn without_towers(topology: &Topology, removed: &[usize]) -> Result<(Topology, Vec<Vec<bool>>)> {
    let mut layout = topology.layout().clone();
    for &idx in removed {
        if let Some(id) = topology.node_id(idx) {
            layout.remove_site(id);
        }
    }

    let kept: Vec<usize> = (0..topology.total_nodes())
        .filter(|i| !removed.contains(i))
        .collect();
    let matrix = kept
        .iter()
        .map(|&i| kept.iter().map(|&j| topology.is_connected(i, j)).collect())
        .collect();

    let reduced = Topology::from_parts(
        layout,
        topology.edge_streams().to_vec(),
        topology.transmission_rate(),
    )?;
    Ok((reduced, matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::{FitnessConfig, Heuristic};
    use crate::layout::Layout;

    /// edge (0,1); mids (1,0) (1,2); cloud (2,1), wired as a diamond.
    fn diamond() -> (Topology, Vec<usize>) {
        let layout = Layout::parse("0 1 0\n1 0 1\n0 1 0\n").unwrap();
        let topo = Topology::from_parts(layout, vec![vec![10.0, 10.0]], 0.03).unwrap();
        (topo, vec![1, 1, 0, 0, 1, 1])
    }

    fn data_fitness() -> FitnessEvaluator {
        FitnessEvaluator::new(FitnessConfig {
            heuristic: Heuristic::Data,
            ..Default::default()
        })
    }

    #[test]
    fn test_parse_best_layouts() {
        let text = "Fitness Values: 1, 2\nBest Layout: 1 0 1\nBest Fitness: 2\n  Best Layout: 0 0 1 1\n";
        let layouts = parse_best_layouts(text).unwrap();
        assert_eq!(layouts, vec![vec![1, 0, 1], vec![0, 0, 1, 1]]);

        assert!(parse_best_layouts("Best Layout: 1 x 0").is_err());
        assert!(parse_best_layouts("nothing here").unwrap().is_empty());
    }

    #[test]
    fn test_disable_one_tower_keeps_route() {
        let (topo, phenotype) = diamond();
        let mut sim = AttackSim::new(topo, FitnessEvaluator::default(), 42);
        let outcome = sim
            .simulate(&phenotype, &Attack::DisableTowers { count: 1 })
            .unwrap();
        assert_eq!(outcome.targets.len(), 1);
        assert!((1..3).contains(&outcome.targets[0]));
        assert!(!outcome.disconnected_before);
        assert!(!outcome.disconnected_after);
        assert!((outcome.fitness_before - outcome.fitness_after).abs() < 1e-9);
    }

    #[test]
    fn test_disable_all_towers_disconnects() {
        let (topo, phenotype) = diamond();
        let mut sim = AttackSim::new(topo, FitnessEvaluator::default(), 42);
        let outcome = sim
            .simulate(&phenotype, &Attack::DisableTowers { count: 2 })
            .unwrap();
        assert!(outcome.disconnected_after);
        assert_eq!(outcome.failed_after, 2);
    }

    #[test]
    fn test_too_many_towers() {
        let (topo, phenotype) = diamond();
        let mut sim = AttackSim::new(topo, FitnessEvaluator::default(), 42);
        assert!(sim
            .simulate(&phenotype, &Attack::DisableTowers { count: 3 })
            .is_err());
    }

    #[test]
    fn test_injection_raises_load() {
        let (topo, phenotype) = diamond();
        let mut sim = AttackSim::new(topo, data_fitness(), 42);
        let outcome = sim
            .simulate(
                &phenotype,
                &Attack::InjectTraffic {
                    targets: 2,
                    streams_per_target: 3,
                    stream_size: 40.0,
                },
            )
            .unwrap();
        assert_eq!(outcome.targets, vec![1, 2]);
        assert!(outcome.fitness_after > outcome.fitness_before);
        assert_eq!(outcome.failed_after, 0);
    }

    #[test]
    fn test_bypass_replays_edge_cloud_link() {
        // edge (0,0), mid (1,1), cloud (2,0); only the direct edge-cloud link.
        let layout = Layout::parse("1 0\n0 1\n1 0\n").unwrap();
        let topo = Topology::from_parts(layout, vec![vec![5.0]], 0.03).unwrap();
        let mut sim = AttackSim::new(topo, FitnessEvaluator::default(), 1);
        // Pairs: (1,0) (2,0) (2,1)
        let outcome = sim
            .simulate(&[0, 1, 0], &Attack::DisableTowers { count: 1 })
            .unwrap();
        assert!(!outcome.disconnected_before);
        assert!(!outcome.disconnected_after);
        assert!((outcome.fitness_before - 2.0).abs() < 1e-9);
    }
}
