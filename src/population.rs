//! Population bookkeeping shared by both evolution engines.
//!
//! A slot holds a genotype and its [`Vitality`]. Non-viable members keep
//! their slot and take part in tournaments, but always rank last and read
//! as the current worst live fitness.

use std::cmp::Ordering;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FogError, Result};
use crate::fitness::FitnessEvaluator;
use crate::sda::Sda;
use crate::topology::{ConnectionMode, Topology};

/// Outcome of evaluating a genotype.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Vitality {
    Viable { fitness: f64 },
    NonViable,
}

impl Vitality {
    /// Whether the member passed the necrotic filter.
    #[must_use]
    pub const fn is_viable(&self) -> bool {
        matches!(self, Self::Viable { .. })
    }

    /// Fitness of a viable member.
    #[must_use]
    pub const fn fitness(&self) -> Option<f64> {
        match *self {
            Self::Viable { fitness } => Some(fitness),
            Self::NonViable => None,
        }
    }
}

/// A population slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// The member's genotype.
    pub genotype: Sda,
    /// Outcome of its last evaluation.
    pub vitality: Vitality,
}

/// Rejects phenotypes whose link count is out of range or whose network
/// leaves an edge node without a route to the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NecroticFilter {
    /// Lower bound on links, as a multiple of the node count.
    pub min_factor: f64,
    /// Upper bound on links, as a multiple of the node count.
    pub max_factor: f64,
}

impl Default for NecroticFilter {
    fn default() -> Self {
        Self {
            min_factor: 1.0,
            max_factor: 7.0,
        }
    }
}

impl NecroticFilter {
    /// Bounds of `min_factor` and `max_factor` times the node count.
    #[must_use]
    pub const fn new(min_factor: f64, max_factor: f64) -> Self {
        Self {
            min_factor,
            max_factor,
        }
    }

    /// Whether `links` lies within `[min * nodes, max * nodes]`.
    #[must_use]
    pub fn within_bounds(&self, links: usize, total_nodes: usize) -> bool {
        let links = links as f64;
        let nodes = total_nodes as f64;
        links >= self.min_factor * nodes && links <= self.max_factor * nodes
    }

    /// Apply the filter, setting the topology's connections if the link
    /// count passes. Returns `true` for a necrotic phenotype.
    ///
    /// A phenotype of the wrong length is a [`FogError::MalformedInput`].
    pub fn is_necrotic(&self, phenotype: &[usize], topology: &mut Topology) -> Result<bool> {
        if phenotype.len() != topology.phenotype_len() {
            return Err(FogError::MalformedInput(format!(
                "phenotype has {} symbols, expected {}",
                phenotype.len(),
                topology.phenotype_len()
            )));
        }
        let links = phenotype.iter().filter(|&&bit| bit != 0).count();
        if !self.within_bounds(links, topology.total_nodes()) {
            return Ok(true);
        }
        topology.set_connections(phenotype, ConnectionMode::Enforced)
    }
}

/// Decode a genotype, filter it and score it on `topology`.
pub fn assess(
    genotype: &Sda,
    topology: &mut Topology,
    filter: &NecroticFilter,
    fitness: &FitnessEvaluator,
) -> Result<Vitality> {
    let phenotype = genotype.output()?;
    if filter.is_necrotic(&phenotype, topology)? {
        return Ok(Vitality::NonViable);
    }
    Ok(Vitality::Viable {
        fitness: fitness.score(topology),
    })
}

/// Fixed-size set of members ranked by fitness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    members: Vec<Member>,
    lower_is_better: bool,
}

impl Population {
    /// Wrap evaluated members.
    #[must_use]
    pub fn new(members: Vec<Member>, lower_is_better: bool) -> Self {
        Self {
            members,
            lower_is_better,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// All members in slot order.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Member at slot `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Member> {
        self.members.get(idx)
    }

    /// Ranking direction.
    #[must_use]
    pub const fn lower_is_better(&self) -> bool {
        self.lower_is_better
    }

    /// Overwrite one slot.
    pub fn replace(&mut self, idx: usize, member: Member) {
        self.members[idx] = member;
    }

    /// Iterate members in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// Ordering that puts the better fitness first.
    fn cmp_fitness(&self, a: f64, b: f64) -> Ordering {
        if self.lower_is_better {
            a.total_cmp(&b)
        } else {
            b.total_cmp(&a)
        }
    }

    /// Best-first comparison of two slots. Non-viable members sort last.
    #[must_use]
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        match (
            self.members[a].vitality.fitness(),
            self.members[b].vitality.fitness(),
        ) {
            (Some(fa), Some(fb)) => self.cmp_fitness(fa, fb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// Stable best-first sort of slot indices.
    pub fn rank(&self, indices: &mut [usize]) {
        indices.sort_by(|&a, &b| self.compare(a, b));
    }

    /// Number of viable members.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.members.iter().filter(|m| m.vitality.is_viable()).count()
    }

    /// Worst fitness among viable members.
    #[must_use]
    pub fn worst_live_fitness(&self) -> Option<f64> {
        self.members
            .iter()
            .filter_map(|m| m.vitality.fitness())
            .max_by(|a, b| self.cmp_fitness(*a, *b))
    }

    /// Slot of the best viable member.
    #[must_use]
    pub fn best_index(&self) -> Option<usize> {
        (0..self.members.len())
            .filter(|&i| self.members[i].vitality.is_viable())
            .min_by(|&a, &b| self.compare(a, b))
    }

    /// Best-ranked member.
    #[must_use]
    pub fn best(&self) -> Option<&Member> {
        self.best_index().map(|i| &self.members[i])
    }

    /// Mean fitness over viable members.
    #[must_use]
    pub fn average_live_fitness(&self) -> Option<f64> {
        let live: Vec<f64> = self
            .members
            .iter()
            .filter_map(|m| m.vitality.fitness())
            .collect();
        if live.is_empty() {
            None
        } else {
            Some(live.iter().sum::<f64>() / live.len() as f64)
        }
    }

    /// Fitness of a slot as ranking sees it. Non-viable members read as the
    /// worst live fitness, or infinitely bad when nobody is alive.
    #[must_use]
    pub fn effective_fitness(&self, idx: usize) -> f64 {
        match self.members[idx].vitality {
            Vitality::Viable { fitness } => fitness,
            Vitality::NonViable => self.worst_live_fitness().unwrap_or(if self.lower_is_better {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            }),
        }
    }

    /// Effective fitness of every slot in order.
    #[must_use]
    pub fn fitness_values(&self) -> Vec<f64> {
        (0..self.members.len())
            .map(|i| self.effective_fitness(i))
            .collect()
    }

    /// Sample `size` slots and rank them best-first.
    ///
    /// A request for the whole population returns every index. Otherwise
    /// slots are drawn uniformly from those drawn fewer than `max_repeats`
    /// times, never repeating the previous draw while another slot is open.
    /// The result is shorter than `size` only when every slot is capped.
    pub fn tournament<R: Rng>(&self, size: usize, max_repeats: usize, rng: &mut R) -> Vec<usize> {
        let n = self.members.len();
        let mut picked: Vec<usize> = if size >= n {
            (0..n).collect()
        } else {
            let mut open = OpenSlots::new(n, max_repeats);
            let mut picked = Vec::with_capacity(size);
            while picked.len() < size {
                let Some(idx) = open.draw(picked.last().copied(), rng) else {
                    break;
                };
                open.take(idx);
                picked.push(idx);
            }
            picked
        };
        self.rank(&mut picked);
        picked
    }

    /// Pool of `size` tournament winners, each the best of `candidates`
    /// uniform draws among slots still open. A slot enters the pool at most
    /// `max_repeats` times.
    pub fn tournament_pool<R: Rng>(
        &self,
        size: usize,
        candidates: usize,
        max_repeats: usize,
        rng: &mut R,
    ) -> Vec<usize> {
        let mut open = OpenSlots::new(self.members.len(), max_repeats);
        let mut pool = Vec::with_capacity(size);

        while pool.len() < size {
            let Some(mut winner) = open.draw(None, rng) else {
                break;
            };
            for _ in 1..candidates.max(1) {
                let Some(challenger) = open.draw(None, rng) else {
                    break;
                };
                if self.compare(challenger, winner) == Ordering::Less {
                    winner = challenger;
                }
            }
            open.take(winner);
            pool.push(winner);
        }
        pool
    }
}

/// Slots drawn fewer than `cap` times.
struct OpenSlots {
    open: Vec<usize>,
    counts: Vec<usize>,
    cap: usize,
}

impl OpenSlots {
    fn new(n: usize, max_repeats: usize) -> Self {
        Self {
            open: (0..n).collect(),
            counts: vec![0; n],
            cap: max_repeats.max(1),
        }
    }

    /// Uniform open slot, avoiding `previous` unless it is the only one.
    fn draw<R: Rng>(&self, previous: Option<usize>, rng: &mut R) -> Option<usize> {
        match previous.and_then(|p| self.open.iter().position(|&i| i == p)) {
            Some(pos) if self.open.len() > 1 => {
                let mut k = rng.random_range(0..self.open.len() - 1);
                if k >= pos {
                    k += 1;
                }
                Some(self.open[k])
            }
            _ if self.open.is_empty() => None,
            _ => Some(self.open[rng.random_range(0..self.open.len())]),
        }
    }

    fn take(&mut self, idx: usize) {
        self.counts[idx] += 1;
        if self.counts[idx] >= self.cap {
            self.open.retain(|&i| i != idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{GridConfig, Layout};
    use crate::sda::SdaConfig;
    use crate::topology::TrafficConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn population(fits: &[Option<f64>]) -> Population {
        let config = SdaConfig::binary(3, 10);
        let mut rng = test_rng();
        let members = fits
            .iter()
            .map(|f| Member {
                genotype: Sda::random(&config, &mut rng),
                vitality: match f {
                    Some(fitness) => Vitality::Viable { fitness: *fitness },
                    None => Vitality::NonViable,
                },
            })
            .collect();
        Population::new(members, true)
    }

    #[test]
    fn test_ranking_lower_is_better() {
        let pop = population(&[Some(3.0), None, Some(1.0), Some(2.0)]);
        let mut idx = vec![0, 1, 2, 3];
        pop.rank(&mut idx);
        assert_eq!(idx, vec![2, 3, 0, 1]);
        assert_eq!(pop.best_index(), Some(2));
        assert_eq!(pop.worst_live_fitness(), Some(3.0));
    }

    #[test]
    fn test_ranking_higher_is_better() {
        let mut pop = population(&[Some(3.0), None, Some(1.0)]);
        pop.lower_is_better = false;
        let mut idx = vec![1, 2, 0];
        pop.rank(&mut idx);
        assert_eq!(idx, vec![0, 2, 1]);
        assert_eq!(pop.worst_live_fitness(), Some(1.0));
    }

    #[test]
    fn test_dead_reads_as_worst() {
        let pop = population(&[Some(3.0), None, Some(1.0)]);
        assert_eq!(pop.fitness_values(), vec![3.0, 3.0, 1.0]);
        assert_eq!(pop.live_count(), 2);
        assert_eq!(pop.average_live_fitness(), Some(2.0));
    }

    #[test]
    fn test_all_dead() {
        let pop = population(&[None, None]);
        assert_eq!(pop.best_index(), None);
        assert_eq!(pop.average_live_fitness(), None);
        assert!(pop.effective_fitness(0).is_infinite());
    }

    #[test]
    fn test_tournament_full_population() {
        let pop = population(&[Some(3.0), Some(1.0), Some(2.0)]);
        let picked = pop.tournament(3, 1, &mut test_rng());
        assert_eq!(picked, vec![1, 2, 0]);
    }

    #[test]
    fn test_tournament_distinct_and_sorted() {
        let fits: Vec<Option<f64>> = (0..10).map(|i| Some(i as f64)).collect();
        let pop = population(&fits);
        let mut rng = test_rng();
        for _ in 0..50 {
            let picked = pop.tournament(4, 1, &mut rng);
            assert_eq!(picked.len(), 4);
            let mut unique = picked.clone();
            unique.dedup();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), 4);
            assert!(picked.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_tournament_pool_respects_cap() {
        let fits: Vec<Option<f64>> = (0..5).map(|i| Some(i as f64)).collect();
        let pop = population(&fits);
        let pool = pop.tournament_pool(6, 3, 2, &mut test_rng());
        assert_eq!(pool.len(), 6);
        for idx in 0..5 {
            assert!(pool.iter().filter(|&&p| p == idx).count() <= 2);
        }
    }

    #[test]
    fn test_tournament_pool_fills_under_tight_cap() {
        // Every slot used exactly once even though the best slot wins almost
        // every wide tournament.
        let fits: Vec<Option<f64>> = (0..8).map(|i| Some(i as f64)).collect();
        let pop = population(&fits);
        let mut rng = test_rng();
        for _ in 0..20 {
            let mut pool = pop.tournament_pool(8, 50, 1, &mut rng);
            assert_eq!(pool.len(), 8);
            pool.sort_unstable();
            assert_eq!(pool, (0..8).collect::<Vec<_>>());
        }

        // Asking for more than the caps allow returns what is available.
        let pool = pop.tournament_pool(20, 3, 2, &mut rng);
        assert_eq!(pool.len(), 16);
    }

    #[test]
    fn test_tournament_near_full_never_repeats_neighbour() {
        let fits: Vec<Option<f64>> = (0..4).map(|i| Some(i as f64)).collect();
        let pop = population(&fits);
        let mut rng = test_rng();
        for _ in 0..50 {
            let picked = pop.tournament(3, 1, &mut rng);
            assert_eq!(picked.len(), 3);
            let mut unique = picked.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), 3);
        }
    }

    #[test]
    fn test_necrotic_bounds() {
        let filter = NecroticFilter::default();
        assert!(!filter.within_bounds(0, 10));
        assert!(!filter.within_bounds(75, 10));
        assert!(filter.within_bounds(10, 10));
        assert!(filter.within_bounds(30, 10));
        assert!(filter.within_bounds(70, 10));
    }

    #[test]
    fn test_necrotic_skips_connections_when_out_of_bounds() {
        let layout = Layout::parse("1 0 0\n1 0 0\n0 1 0\n1 0 0\n").unwrap();
        let mut topo = Topology::from_parts(layout, vec![vec![10.0]], 0.03).unwrap();
        let filter = NecroticFilter::default();
        assert!(filter.is_necrotic(&[0; 6], &mut topo).unwrap());
        assert!(filter.is_necrotic(&[1; 5], &mut topo).is_err());
    }

    #[test]
    fn test_assess_matches_filter() {
        let grid = GridConfig::new(5, 5, 1, 1, 3);
        let mut rng = test_rng();
        let mut topo = Topology::random(&grid, &TrafficConfig::default(), &mut rng).unwrap();
        let config = SdaConfig::binary(3, topo.phenotype_len());
        let filter = NecroticFilter::default();
        let fitness = FitnessEvaluator::default();

        for _ in 0..20 {
            let sda = Sda::random(&config, &mut rng);
            let vitality = assess(&sda, &mut topo, &filter, &fitness).unwrap();
            let phenotype = sda.output().unwrap();
            let dead = filter.is_necrotic(&phenotype, &mut topo).unwrap();
            assert_eq!(vitality.is_viable(), !dead);
            if let Vitality::Viable { fitness } = vitality {
                assert!(fitness.is_finite() && fitness >= 0.0);
            }
        }
    }
}
