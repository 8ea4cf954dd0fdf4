//! Fitness heuristics over a configured [`Topology`].
//!
//! Every component is minimised. [`FitnessEvaluator::score`] runs the
//! traffic and energy simulations only when the selected [`Heuristic`]
//! reads them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use symbios_genetics::Evaluator;

use crate::error::{FogError, Result};
use crate::population::{assess, NecroticFilter};
use crate::sda::Sda;
use crate::topology::Topology;

/// Which fitness components are summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Heuristic {
    #[default]
    Distance,
    Data,
    Energy,
    DistanceData,
    DistanceEnergy,
    DataEnergy,
    All,
}

impl Heuristic {
    /// Every mode, in index order.
    pub const ALL: [Heuristic; 7] = [
        Heuristic::Distance,
        Heuristic::Data,
        Heuristic::Energy,
        Heuristic::DistanceData,
        Heuristic::DistanceEnergy,
        Heuristic::DataEnergy,
        Heuristic::All,
    ];

    /// Mode from its numeric index (`0..7`, in the order of [`Heuristic::ALL`]).
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            FogError::config("heuristic", format!("mode index {index} is not in 0..7"))
        })
    }

    /// Numeric index of this mode.
    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&h| h == self).unwrap_or(0)
    }

    /// Whether the distance component is summed.
    #[must_use]
    pub const fn uses_distance(self) -> bool {
        matches!(
            self,
            Self::Distance | Self::DistanceData | Self::DistanceEnergy | Self::All
        )
    }

    /// Whether the data load component is summed.
    #[must_use]
    pub const fn uses_data(self) -> bool {
        matches!(
            self,
            Self::Data | Self::DistanceData | Self::DataEnergy | Self::All
        )
    }

    /// Whether the energy component is summed.
    #[must_use]
    pub const fn uses_energy(self) -> bool {
        matches!(
            self,
            Self::Energy | Self::DistanceEnergy | Self::DataEnergy | Self::All
        )
    }

    /// Whether traffic has to be distributed before scoring.
    #[must_use]
    pub const fn needs_traffic(self) -> bool {
        self.uses_data() || self.uses_energy()
    }
}

/// How the distance component is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceScoring {
    /// Mean edge-to-cloud shortest path length.
    #[default]
    AveragePath,
    /// Average path plus a penalty for wiring not on any edge node's
    /// shortest path to its nearest cloud node.
    MinimumNetwork,
}

/// Fitness settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    /// Components to sum.
    pub heuristic: Heuristic,
    /// How the distance component is measured.
    pub distance_scoring: DistanceScoring,
}

/// Scores a topology whose connections are already set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitnessEvaluator {
    config: FitnessConfig,
}

impl FitnessEvaluator {
    /// Evaluator for the given configuration.
    #[must_use]
    pub const fn new(config: FitnessConfig) -> Self {
        Self { config }
    }

    /// Configured heuristic.
    #[must_use]
    pub const fn heuristic(&self) -> Heuristic {
        self.config.heuristic
    }

    /// Full scoring configuration.
    #[must_use]
    pub const fn config(&self) -> &FitnessConfig {
        &self.config
    }

    /// Run whatever simulation the heuristic needs, then sum its components.
    pub fn score(&self, topology: &mut Topology) -> f64 {
        let heuristic = self.config.heuristic;
        if heuristic.needs_traffic() {
            topology.distribute_traffic();
        }
        if heuristic.uses_energy() {
            topology.compute_energy_consumption();
        }

        let mut total = 0.0;
        if heuristic.uses_distance() {
            total += match self.config.distance_scoring {
                DistanceScoring::AveragePath => distance_fitness(topology),
                DistanceScoring::MinimumNetwork => minimum_network_fitness(topology),
            };
        }
        if heuristic.uses_data() {
            total += data_fitness(topology);
        }
        if heuristic.uses_energy() {
            total += energy_fitness(topology);
        }
        total
    }
}

/// Average over edge nodes of the mean shortest-path length to every
/// reachable cloud node. An edge node with no reachable cloud contributes 0.
#[must_use]
pub fn distance_fitness(topology: &Topology) -> f64 {
    let num_edge = topology.num_edge_nodes();
    if num_edge == 0 {
        return 0.0;
    }

    let total: f64 = (0..num_edge)
        .map(|edge| {
            let dist = topology.shortest_path(edge);
            let reachable: Vec<f64> = topology
                .cloud_nodes()
                .filter_map(|cloud| dist[cloud])
                .collect();
            if reachable.is_empty() {
                0.0
            } else {
                reachable.iter().sum::<f64>() / reachable.len() as f64
            }
        })
        .sum();

    total / num_edge as f64
}

/// Total wire length in use minus the wire on each edge node's shortest
/// path to its nearest cloud node, plus [`distance_fitness`].
#[must_use]
pub fn minimum_network_fitness(topology: &Topology) -> f64 {
    let n = topology.total_nodes();
    let mut used = 0.0;
    for i in 0..n {
        for j in 0..i {
            if topology.is_connected(i, j) {
                used += topology.distance(i, j);
            }
        }
    }

    let mut required: HashSet<(usize, usize)> = HashSet::new();
    for edge in 0..topology.num_edge_nodes() {
        let tree = topology.shortest_path_tree(edge);
        let nearest = topology
            .cloud_nodes()
            .filter_map(|cloud| tree.distance[cloud].map(|d| (cloud, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((cloud, _)) = nearest else {
            continue;
        };
        if let Some(path) = tree.path_to(cloud) {
            for hop in path.windows(2) {
                required.insert((hop[0].min(hop[1]), hop[0].max(hop[1])));
            }
        }
    }
    let needed: f64 = required
        .iter()
        .map(|&(a, b)| topology.distance(a, b))
        .sum();

    (used - needed).max(0.0) + distance_fitness(topology)
}

/// Average over non-edge nodes that received streams of incoming volume
/// per received stream.
#[must_use]
pub fn data_fitness(topology: &Topology) -> f64 {
    let data = topology.data();
    let per_node: Vec<f64> = (topology.num_edge_nodes()..topology.total_nodes())
        .filter(|&x| !data[x].is_empty())
        .map(|x| topology.incoming_traffic(x) / data[x].len() as f64)
        .collect();

    if per_node.is_empty() {
        0.0
    } else {
        per_node.iter().sum::<f64>() / per_node.len() as f64
    }
}

/// Average energy draw of the non-edge nodes.
#[must_use]
pub fn energy_fitness(topology: &Topology) -> f64 {
    let energy = &topology.energy_consumption()[topology.num_edge_nodes()..];
    if energy.is_empty() {
        0.0
    } else {
        energy.iter().sum::<f64>() / energy.len() as f64
    }
}

/// Adapter for generic `symbios_genetics` algorithms, which maximise.
///
/// Each evaluation works on a private clone of the topology. The returned
/// fitness is the negated score; non-viable or undecodable genotypes get
/// `f32::NEG_INFINITY`.
#[derive(Debug, Clone)]
pub struct NetworkEvaluator {
    topology: Topology,
    fitness: FitnessEvaluator,
    filter: NecroticFilter,
}

impl NetworkEvaluator {
    /// Adapter scoring genotypes on clones of `topology`.
    #[must_use]
    pub fn new(topology: Topology, fitness: FitnessEvaluator, filter: NecroticFilter) -> Self {
        Self {
            topology,
            fitness,
            filter,
        }
    }

    /// Minimisation score of a genotype, `None` when it is non-viable.
    pub fn score(&self, genotype: &Sda) -> Result<Option<f64>> {
        let mut scratch = self.topology.clone();
        let vitality = assess(genotype, &mut scratch, &self.filter, &self.fitness)?;
        Ok(vitality.fitness())
    }
}

impl Evaluator<Sda> for NetworkEvaluator {
    fn evaluate(&self, genome: &Sda) -> (f32, Vec<f32>, Vec<f32>) {
        let fitness = match self.score(genome) {
            Ok(Some(score)) => -(score as f32),
            Ok(None) | Err(_) => f32::NEG_INFINITY,
        };
        (fitness, vec![fitness], vec![])
    }
}
