//! Simulated fog/edge/cloud network.
//!
//! A [`Topology`] pairs a static part (node sites, pairwise distances, edge
//! traffic streams) with per-individual scratch state that is rebuilt every
//! time a phenotype is applied: the adjacency matrix, BFS layers from the
//! cloud, the traffic matrix, received streams and energy draw.
//!
//! ## Node order
//!
//! Dense indices run edge nodes first, then mid nodes, then cloud nodes,
//! matching [`Layout::ordered_ids`]. A phenotype lists the pairs `(i, j)`
//! with `j < i` for `i = 1..n`, one symbol per pair.
//!
//! ## Adjacency snapshot
//!
//! After the matrix is set, neighbours are also stored in CSR form
//! (`adj_offsets`/`adj_targets`) so BFS and Dijkstra walk only existing
//! links. Neighbours are listed in ascending index order, which keeps every
//! traversal deterministic.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FogError, Result};
use crate::layout::{GridConfig, Layout, NodeId, Site, Tier};

/// Edge traffic generation and energy constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Cap on the total volume an edge node emits (Mbps).
    pub max_edge_output: f64,
    /// Smallest stream size (Mbps).
    pub stream_lower: f64,
    /// Exclusive upper bound on a stream size (Mbps).
    pub stream_upper: f64,
    /// Energy cost per Mbps per unit of distance (W).
    pub transmission_rate: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            max_edge_output: 100.0,
            stream_lower: 5.0,
            stream_upper: 20.0,
            transmission_rate: 0.03,
        }
    }
}

impl TrafficConfig {
    /// Check ranges. Every error names the offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.stream_lower > 0.0) {
            return Err(FogError::config("stream_lower", "must be positive"));
        }
        if !(self.stream_upper > self.stream_lower) {
            return Err(FogError::config(
                "stream_upper",
                "must be greater than stream_lower",
            ));
        }
        if !(self.max_edge_output >= 0.0) {
            return Err(FogError::config("max_edge_output", "must be non-negative"));
        }
        if !(self.transmission_rate >= 0.0) {
            return Err(FogError::config("transmission_rate", "must be non-negative"));
        }
        Ok(())
    }

    /// Draw stream sizes until the next one would exceed the output cap.
    pub fn draw_streams<R: Rng>(&self, rng: &mut R) -> Result<Vec<f64>> {
        self.validate()?;
        let mut streams = Vec::new();
        let mut output = 0.0;
        loop {
            let size = rng.random_range(self.stream_lower..self.stream_upper);
            if output + size > self.max_edge_output {
                break;
            }
            streams.push(size);
            output += size;
        }
        Ok(streams)
    }
}

/// Whether the edge-to-cloud rule is applied when setting connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Direct edge-to-cloud links are dropped.
    #[default]
    Enforced,
    /// The phenotype is applied verbatim (attack replays).
    Bypass,
}

/// Distances and predecessors from one source node.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPaths {
    /// Node the tree is rooted at.
    pub source: usize,
    /// `None` where no path exists.
    pub distance: Vec<Option<f64>>,
    /// Previous hop on the shortest path.
    pub previous: Vec<Option<usize>>,
}

impl ShortestPaths {
    /// Node sequence from the source to `target`, inclusive.
    #[must_use]
    pub fn path_to(&self, target: usize) -> Option<Vec<usize>> {
        self.distance.get(target).copied().flatten()?;
        let mut path = vec![target];
        let mut current = target;
        while current != self.source {
            current = self.previous[current]?;
            path.push(current);
        }
        path.reverse();
        Some(path)
    }
}

#[derive(Debug, Clone)]
struct Stream {
    size: f64,
    /// Nodes already visited, origin first.
    path: Vec<usize>,
}

/// Min-heap entry for Dijkstra.
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    dist: f64,
    node: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the smallest distance first.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// A network layout plus the state derived from the current phenotype.
#[derive(Debug, Clone)]
pub struct Topology {
    layout: Layout,
    node_ids: Vec<NodeId>,
    sites: Vec<Site>,
    num_edge: usize,
    num_mid: usize,
    num_cloud: usize,
    distance: Vec<Vec<f64>>,
    transmission_rate: f64,
    /// Streams originating at each edge node.
    edge_streams: Vec<Vec<f64>>,
    /// Extra streams originating at non-edge nodes.
    injected: Vec<Vec<f64>>,

    connections: Vec<Vec<bool>>,
    adj_offsets: Vec<usize>,
    adj_targets: Vec<usize>,
    layer: Vec<Option<usize>>,
    traffic: Vec<Vec<f64>>,
    data: Vec<Vec<f64>>,
    energy: Vec<f64>,
    failed: Vec<f64>,
}

impl Topology {
    /// Random layout on a grid, with random edge traffic.
    pub fn random<R: Rng>(grid: &GridConfig, traffic: &TrafficConfig, rng: &mut R) -> Result<Self> {
        traffic.validate()?;
        let layout = Layout::random(grid, rng)?;
        Self::new(layout, traffic, rng)
    }

    /// Build from an existing layout and draw edge traffic streams.
    pub fn new<R: Rng>(layout: Layout, traffic: &TrafficConfig, rng: &mut R) -> Result<Self> {
        traffic.validate()?;
        let num_edge = layout.count(Tier::Edge);
        let edge_streams = (0..num_edge)
            .map(|_| traffic.draw_streams(rng))
            .collect::<Result<Vec<_>>>()?;
        Self::from_parts(layout, edge_streams, traffic.transmission_rate)
    }

    /// Build from a layout and explicit per-edge-node streams.
    pub fn from_parts(
        layout: Layout,
        edge_streams: Vec<Vec<f64>>,
        transmission_rate: f64,
    ) -> Result<Self> {
        layout.ensure_tiers()?;
        let num_edge = layout.count(Tier::Edge);
        let num_mid = layout.count(Tier::Mid);
        let num_cloud = layout.count(Tier::Cloud);
        if edge_streams.len() != num_edge {
            return Err(FogError::MalformedInput(format!(
                "{} stream lists for {} edge nodes",
                edge_streams.len(),
                num_edge
            )));
        }

        let node_ids = layout.ordered_ids();
        let sites: Vec<Site> = node_ids
            .iter()
            .filter_map(|&id| layout.get(id).copied())
            .collect();
        let n = sites.len();

        let distance = sites
            .iter()
            .map(|a| sites.iter().map(|b| a.distance(b)).collect())
            .collect();

        let mut topology = Self {
            layout,
            node_ids,
            sites,
            num_edge,
            num_mid,
            num_cloud,
            distance,
            transmission_rate,
            edge_streams,
            injected: vec![Vec::new(); n],
            connections: vec![vec![false; n]; n],
            adj_offsets: vec![0; n + 1],
            adj_targets: Vec::new(),
            layer: vec![None; n],
            traffic: vec![vec![0.0; n]; n],
            data: Vec::new(),
            energy: vec![0.0; n],
            failed: Vec::new(),
        };
        topology.reset_traffic();
        topology.layer_nodes();
        Ok(topology)
    }

    /// Tower placement this topology was built from.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Layout id of a dense node index.
    #[must_use]
    pub fn node_id(&self, idx: usize) -> Option<NodeId> {
        self.node_ids.get(idx).copied()
    }

    /// Dense index of a layout id.
    #[must_use]
    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.node_ids.iter().position(|&n| n == id)
    }

    /// Site of node `idx`.
    #[must_use]
    pub fn site(&self, idx: usize) -> Option<&Site> {
        self.sites.get(idx)
    }

    /// Number of edge towers.
    #[must_use]
    pub const fn num_edge_nodes(&self) -> usize {
        self.num_edge
    }

    /// Number of mid towers.
    #[must_use]
    pub const fn num_mid_nodes(&self) -> usize {
        self.num_mid
    }

    /// Number of cloud towers.
    #[must_use]
    pub const fn num_cloud_nodes(&self) -> usize {
        self.num_cloud
    }

    /// Number of towers across all tiers.
    #[must_use]
    pub const fn total_nodes(&self) -> usize {
        self.num_edge + self.num_mid + self.num_cloud
    }

    /// Number of node pairs, i.e. the required phenotype length.
    #[must_use]
    pub const fn phenotype_len(&self) -> usize {
        let n = self.total_nodes();
        n * (n - 1) / 2
    }

    /// Tier of node `idx`.
    #[inline]
    #[must_use]
    pub fn tier(&self, idx: usize) -> Tier {
        if idx < self.num_edge {
            Tier::Edge
        } else if idx < self.num_edge + self.num_mid {
            Tier::Mid
        } else {
            Tier::Cloud
        }
    }

    /// Whether node `idx` is an edge tower.
    #[inline]
    #[must_use]
    pub fn is_edge(&self, idx: usize) -> bool {
        idx < self.num_edge
    }

    /// Whether node `idx` is a cloud tower.
    #[inline]
    #[must_use]
    pub fn is_cloud(&self, idx: usize) -> bool {
        idx >= self.num_edge + self.num_mid
    }

    /// Range of cloud node indices.
    #[must_use]
    pub fn cloud_nodes(&self) -> std::ops::Range<usize> {
        self.num_edge + self.num_mid..self.total_nodes()
    }

    /// Euclidean distance between two nodes.
    #[must_use]
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        self.distance[a][b]
    }

    /// Pairwise Euclidean distances.
    #[must_use]
    pub fn distances(&self) -> &[Vec<f64>] {
        &self.distance
    }

    /// Current adjacency matrix.
    #[must_use]
    pub fn connections(&self) -> &[Vec<bool>] {
        &self.connections
    }

    /// Whether `a` and `b` are linked.
    #[inline]
    #[must_use]
    pub fn is_connected(&self, a: usize, b: usize) -> bool {
        self.connections[a][b]
    }

    /// Number of undirected links currently set.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.adj_targets.len() / 2
    }

    /// Neighbours of a node in ascending order.
    pub fn neighbors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let start = self.adj_offsets[idx];
        let end = self.adj_offsets[idx + 1];
        self.adj_targets[start..end].iter().copied()
    }

    /// BFS layers: cloud nodes hold `total_nodes`, each hop outward one less.
    #[must_use]
    pub fn layers(&self) -> &[Option<usize>] {
        &self.layer
    }

    /// BFS layer of node `idx`, `None` if unreachable.
    #[must_use]
    pub fn layer(&self, idx: usize) -> Option<usize> {
        self.layer[idx]
    }

    /// True when every edge node has a path to some cloud node.
    #[must_use]
    pub fn edges_reach_cloud(&self) -> bool {
        self.layer[..self.num_edge].iter().all(Option::is_some)
    }

    /// Directed volume `traffic[from][to]` routed over each link.
    #[must_use]
    pub fn traffic_matrix(&self) -> &[Vec<f64>] {
        &self.traffic
    }

    /// Streams per node: originated streams at edge nodes, received streams elsewhere.
    #[must_use]
    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    /// Streams originating at each edge tower.
    #[must_use]
    pub fn edge_streams(&self) -> &[Vec<f64>] {
        &self.edge_streams
    }

    /// Streams that found no eligible next hop in the last distribution.
    #[must_use]
    pub fn failed_streams(&self) -> &[f64] {
        &self.failed
    }

    /// Per-node energy draw from the last [`compute_energy_consumption`](Self::compute_energy_consumption).
    #[must_use]
    pub fn energy_consumption(&self) -> &[f64] {
        &self.energy
    }

    /// Energy cost per Mbps per unit of distance.
    #[must_use]
    pub const fn transmission_rate(&self) -> f64 {
        self.transmission_rate
    }

    /// Total traffic received by a node.
    #[must_use]
    pub fn incoming_traffic(&self, idx: usize) -> f64 {
        self.traffic.iter().map(|row| row[idx]).sum()
    }

    /// Apply a phenotype to the adjacency matrix.
    ///
    /// Any non-zero symbol is a link. In [`ConnectionMode::Enforced`] links
    /// between an edge node and a cloud node are dropped. Layers are
    /// recomputed and traffic state is reset.
    ///
    /// Returns `true` when some edge node cannot reach a cloud node.
    pub fn set_connections(&mut self, phenotype: &[usize], mode: ConnectionMode) -> Result<bool> {
        let expected = self.phenotype_len();
        if phenotype.len() != expected {
            return Err(FogError::MalformedInput(format!(
                "phenotype has {} symbols, topology with {} nodes needs {}",
                phenotype.len(),
                self.total_nodes(),
                expected
            )));
        }

        let n = self.total_nodes();
        let mut pos = 0;
        for i in 0..n {
            self.connections[i][i] = false;
            for j in 0..i {
                let forbidden = mode == ConnectionMode::Enforced && self.is_edge_cloud_pair(i, j);
                let linked = phenotype[pos] != 0 && !forbidden;
                self.connections[i][j] = linked;
                self.connections[j][i] = linked;
                pos += 1;
            }
        }

        Ok(self.refresh())
    }

    /// Apply an explicit symmetric adjacency matrix. The diagonal is ignored.
    ///
    /// Returns `true` when some edge node cannot reach a cloud node.
    pub fn set_connection_matrix(&mut self, matrix: &[Vec<bool>]) -> Result<bool> {
        let n = self.total_nodes();
        if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
            return Err(FogError::MalformedInput(format!(
                "connection matrix must be {n}x{n}"
            )));
        }
        for i in 0..n {
            for j in 0..i {
                if matrix[i][j] != matrix[j][i] {
                    return Err(FogError::MalformedInput(format!(
                        "connection matrix is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }

        for (i, row) in matrix.iter().enumerate() {
            for (j, &linked) in row.iter().enumerate() {
                self.connections[i][j] = linked && i != j;
            }
        }
        Ok(self.refresh())
    }

    fn is_edge_cloud_pair(&self, a: usize, b: usize) -> bool {
        (self.is_edge(a) && self.is_cloud(b)) || (self.is_cloud(a) && self.is_edge(b))
    }

    /// Rebuild derived state after the matrix changed.
    fn refresh(&mut self) -> bool {
        self.rebuild_adjacency();
        self.layer_nodes();
        self.reset_traffic();
        !self.edges_reach_cloud()
    }

    fn rebuild_adjacency(&mut self) {
        let n = self.total_nodes();
        self.adj_offsets.clear();
        self.adj_targets.clear();
        self.adj_offsets.push(0);
        for row in &self.connections {
            for (j, &linked) in row.iter().enumerate().take(n) {
                if linked {
                    self.adj_targets.push(j);
                }
            }
            self.adj_offsets.push(self.adj_targets.len());
        }
    }

    fn reset_traffic(&mut self) {
        let n = self.total_nodes();
        for row in &mut self.traffic {
            row.iter_mut().for_each(|v| *v = 0.0);
        }
        self.data = vec![Vec::new(); n];
        for (idx, streams) in self.edge_streams.iter().enumerate() {
            self.data[idx].clone_from(streams);
        }
        self.energy = vec![0.0; n];
        self.failed.clear();
    }

    /// Breadth-first layering seeded from every cloud node at once.
    ///
    /// Cloud nodes get layer `total_nodes`; each hop outward is one lower.
    /// Unreached nodes stay `None`.
    pub fn layer_nodes(&mut self) {
        let top = self.total_nodes();
        self.layer.iter_mut().for_each(|l| *l = None);

        let mut queue: VecDeque<usize> = VecDeque::new();
        for cloud in self.cloud_nodes() {
            self.layer[cloud] = Some(top);
            queue.push_back(cloud);
        }

        while let Some(current) = queue.pop_front() {
            let next_layer = self.layer[current].map(|l| l - 1);
            let start = self.adj_offsets[current];
            let end = self.adj_offsets[current + 1];
            for &neighbor in &self.adj_targets[start..end] {
                if self.layer[neighbor].is_none() {
                    self.layer[neighbor] = next_layer;
                    queue.push_back(neighbor);
                }
            }
        }
    }

    /// Add streams that originate at a non-edge, non-cloud node.
    pub fn inject_traffic(&mut self, idx: usize, streams: &[f64]) -> Result<()> {
        if idx >= self.total_nodes() || self.is_edge(idx) || self.is_cloud(idx) {
            return Err(FogError::MalformedInput(format!(
                "traffic can only be injected at mid nodes, got node {idx}"
            )));
        }
        self.injected[idx].extend_from_slice(streams);
        Ok(())
    }

    /// Drop all injected streams.
    pub fn clear_injections(&mut self) {
        self.injected.iter_mut().for_each(Vec::clear);
    }

    /// Push every pending stream towards the cloud.
    ///
    /// Streams are forwarded one at a time. A stream moves to a connected
    /// non-edge neighbour whose layer is not lower than the current node's,
    /// preferring strictly higher layers, then the neighbour with the least
    /// traffic received so far, then the lowest index. A stream never
    /// revisits a node. Streams reaching a cloud node stop there; streams
    /// with no eligible neighbour are recorded as failed.
    pub fn distribute_traffic(&mut self) {
        self.reset_traffic();
        let n = self.total_nodes();

        let mut pending: Vec<VecDeque<Stream>> = vec![VecDeque::new(); n];
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut queued = vec![false; n];

        let origins = self
            .edge_streams
            .iter()
            .enumerate()
            .chain(self.injected.iter().enumerate().skip(self.num_edge));
        for (idx, streams) in origins {
            if streams.is_empty() {
                continue;
            }
            pending[idx].extend(streams.iter().map(|&size| Stream {
                size,
                path: vec![idx],
            }));
            if !queued[idx] {
                queued[idx] = true;
                queue.push_back(idx);
            }
        }

        let mut incoming = vec![0.0; n];
        while let Some(node) = queue.pop_front() {
            queued[node] = false;
            while let Some(mut stream) = pending[node].pop_front() {
                let Some(next) = self.next_hop(node, &stream.path, &incoming) else {
                    self.failed.push(stream.size);
                    continue;
                };

                self.traffic[node][next] += stream.size;
                incoming[next] += stream.size;
                self.data[next].push(stream.size);

                if !self.is_cloud(next) {
                    stream.path.push(next);
                    pending[next].push_back(stream);
                    if !queued[next] {
                        queued[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }

        if !self.failed.is_empty() {
            warn!(
                failed = self.failed.len(),
                volume = self.failed.iter().sum::<f64>(),
                "streams could not be delivered to the cloud"
            );
        }
    }

    fn next_hop(&self, node: usize, path: &[usize], incoming: &[f64]) -> Option<usize> {
        let here = self.layer[node]?;
        let mut best: Option<(bool, f64, usize)> = None;

        for x in self.neighbors(node) {
            if self.is_edge(x) || path.contains(&x) {
                continue;
            }
            let Some(there) = self.layer[x] else {
                continue;
            };
            if there < here {
                continue;
            }
            let higher = there > here;
            let better = match best {
                None => true,
                Some((best_higher, best_in, _)) => {
                    (higher && !best_higher) || (higher == best_higher && incoming[x] < best_in)
                }
            };
            if better {
                best = Some((higher, incoming[x], x));
            }
        }

        best.map(|(_, _, x)| x)
    }

    /// Dijkstra over existing links weighted by Euclidean distance.
    #[must_use]
    pub fn shortest_path(&self, source: usize) -> Vec<Option<f64>> {
        self.shortest_path_tree(source).distance
    }

    /// Dijkstra with predecessor tracking.
    #[must_use]
    pub fn shortest_path_tree(&self, source: usize) -> ShortestPaths {
        let n = self.total_nodes();
        let mut distance: Vec<Option<f64>> = vec![None; n];
        let mut previous: Vec<Option<usize>> = vec![None; n];
        let mut settled = vec![false; n];
        let mut heap = BinaryHeap::new();

        if source < n {
            distance[source] = Some(0.0);
            heap.push(HeapEntry {
                dist: 0.0,
                node: source,
            });
        }

        while let Some(HeapEntry { dist, node }) = heap.pop() {
            if settled[node] {
                continue;
            }
            settled[node] = true;

            for next in self.neighbors(node) {
                let candidate = dist + self.distance[node][next];
                let improves = distance[next].map_or(true, |d| candidate < d);
                if improves {
                    distance[next] = Some(candidate);
                    previous[next] = Some(node);
                    heap.push(HeapEntry {
                        dist: candidate,
                        node: next,
                    });
                }
            }
        }

        ShortestPaths {
            source,
            distance,
            previous,
        }
    }

    /// Energy draw of every non-edge node: received volume times link
    /// distance, summed over neighbours and scaled by the transmission rate.
    /// Edge nodes draw nothing.
    pub fn compute_energy_consumption(&mut self) {
        let n = self.total_nodes();
        for x in 0..n {
            self.energy[x] = if self.is_edge(x) {
                0.0
            } else {
                let weighted: f64 = (0..n)
                    .map(|from| self.traffic[from][x] * self.distance[from][x])
                    .sum();
                weighted * self.transmission_rate
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    /// edge (0,0) -> mid (1,0) -> mid (2,1) -> cloud (3,0)
    fn line_topology() -> Topology {
        let layout = Layout::parse("1 0 0\n1 0 0\n0 1 0\n1 0 0\n").unwrap();
        Topology::from_parts(layout, vec![vec![10.0, 20.0]], 0.03).unwrap()
    }

    // Pairs in order: (1,0) (2,0) (2,1) (3,0) (3,1) (3,2)
    const LINE: [usize; 6] = [1, 0, 1, 0, 0, 1];

    #[test]
    fn test_node_counts() {
        let topo = line_topology();
        assert_eq!(topo.num_edge_nodes(), 1);
        assert_eq!(topo.num_mid_nodes(), 2);
        assert_eq!(topo.num_cloud_nodes(), 1);
        assert_eq!(topo.total_nodes(), 4);
        assert_eq!(topo.phenotype_len(), 6);
        assert_eq!(topo.tier(0), Tier::Edge);
        assert_eq!(topo.tier(2), Tier::Mid);
        assert_eq!(topo.tier(3), Tier::Cloud);
    }

    #[test]
    fn test_random_topology_traffic_cap() {
        let grid = GridConfig::new(5, 5, 2, 1, 3);
        let traffic = TrafficConfig::default();
        let topo = Topology::random(&grid, &traffic, &mut test_rng()).unwrap();
        for streams in topo.edge_streams() {
            assert!(!streams.is_empty());
            assert!(streams.iter().sum::<f64>() <= traffic.max_edge_output);
            assert!(streams.iter().all(|&s| (5.0..20.0).contains(&s)));
        }
    }

    #[test]
    fn test_bad_stream_bounds_rejected() {
        let layout = Layout::parse("1 0 0\n1 0 0\n0 1 0\n1 0 0\n").unwrap();
        let inverted = TrafficConfig {
            stream_lower: 20.0,
            stream_upper: 5.0,
            ..TrafficConfig::default()
        };
        match Topology::new(layout.clone(), &inverted, &mut test_rng()) {
            Err(FogError::Config { parameter, .. }) => assert_eq!(parameter, "stream_upper"),
            other => panic!("expected config error, got {other:?}"),
        }

        let negative = TrafficConfig {
            stream_lower: -20.0,
            stream_upper: -5.0,
            ..TrafficConfig::default()
        };
        assert!(matches!(
            Topology::new(layout, &negative, &mut test_rng()),
            Err(FogError::Config { .. })
        ));
        assert!(negative.draw_streams(&mut test_rng()).is_err());

        let grid = GridConfig::new(5, 5, 1, 1, 3);
        assert!(Topology::random(&grid, &inverted, &mut test_rng()).is_err());
    }

    #[test]
    fn test_set_connections_symmetric_and_forced() {
        let mut topo = line_topology();
        let all = vec![1; topo.phenotype_len()];
        topo.set_connections(&all, ConnectionMode::Enforced).unwrap();

        let n = topo.total_nodes();
        for i in 0..n {
            assert!(!topo.is_connected(i, i));
            for j in 0..n {
                assert_eq!(topo.is_connected(i, j), topo.is_connected(j, i));
            }
        }
        assert!(!topo.is_connected(0, 3));
        assert_eq!(topo.connection_count(), 5);

        topo.set_connections(&all, ConnectionMode::Bypass).unwrap();
        assert!(topo.is_connected(0, 3));
        assert_eq!(topo.connection_count(), 6);
    }

    #[test]
    fn test_set_connections_length_mismatch() {
        let mut topo = line_topology();
        let err = topo
            .set_connections(&[1, 0, 1], ConnectionMode::Enforced)
            .unwrap_err();
        assert!(matches!(err, FogError::MalformedInput(_)));
    }

    #[test]
    fn test_layers_on_line() {
        let mut topo = line_topology();
        let dead = topo.set_connections(&LINE, ConnectionMode::Enforced).unwrap();
        assert!(!dead);
        assert_eq!(topo.layers(), &[Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_disconnected_edge_is_dead() {
        let mut topo = line_topology();
        let dead = topo
            .set_connections(&[1, 0, 0, 0, 0, 0], ConnectionMode::Enforced)
            .unwrap();
        assert!(dead);
        assert_eq!(topo.layer(0), None);
        assert_eq!(topo.layer(3), Some(4));
    }

    #[test]
    fn test_complete_graph_layers_all_reached() {
        let grid = GridConfig::new(6, 6, 2, 2, 6);
        let mut topo =
            Topology::random(&grid, &TrafficConfig::default(), &mut test_rng()).unwrap();
        let all = vec![1; topo.phenotype_len()];
        topo.set_connections(&all, ConnectionMode::Bypass).unwrap();
        assert!(topo.layers().iter().all(Option::is_some));
    }

    #[test]
    fn test_shortest_path_on_line() {
        let mut topo = line_topology();
        topo.set_connections(&LINE, ConnectionMode::Enforced).unwrap();
        let tree = topo.shortest_path_tree(0);
        let expected = 1.0 + 2.0 * 2f64.sqrt();
        assert!((tree.distance[3].unwrap() - expected).abs() < 1e-9);
        assert_eq!(tree.path_to(3), Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn test_shortest_path_unreachable() {
        let mut topo = line_topology();
        topo.set_connections(&[1, 0, 0, 0, 0, 0], ConnectionMode::Enforced)
            .unwrap();
        let dist = topo.shortest_path(0);
        assert_eq!(dist[0], Some(0.0));
        assert_eq!(dist[1], Some(1.0));
        assert_eq!(dist[3], None);
    }

    #[test]
    fn test_traffic_reaches_cloud() {
        let mut topo = line_topology();
        topo.set_connections(&LINE, ConnectionMode::Enforced).unwrap();
        topo.distribute_traffic();

        let traffic = topo.traffic_matrix();
        assert!((traffic[0][1] - 30.0).abs() < 1e-9);
        assert!((traffic[1][2] - 30.0).abs() < 1e-9);
        assert!((traffic[2][3] - 30.0).abs() < 1e-9);
        assert_eq!(topo.data()[3], vec![10.0, 20.0]);
        assert!(topo.failed_streams().is_empty());
    }

    #[test]
    fn test_traffic_failure_recorded() {
        let mut topo = line_topology();
        topo.set_connections(&[1, 0, 0, 0, 0, 0], ConnectionMode::Enforced)
            .unwrap();
        topo.distribute_traffic();
        assert_eq!(topo.failed_streams(), &[10.0, 20.0]);
    }

    #[test]
    fn test_traffic_prefers_least_loaded_parallel_relay() {
        // edge (0,1); mids (1,0) and (1,2); cloud (2,1).
        let layout = Layout::parse("0 1 0\n1 0 1\n0 1 0\n").unwrap();
        let mut topo = Topology::from_parts(layout, vec![vec![10.0, 10.0]], 0.03).unwrap();
        // Pairs: (1,0) (2,0) (2,1) (3,0) (3,1) (3,2)
        topo.set_connections(&[1, 1, 0, 0, 1, 1], ConnectionMode::Enforced)
            .unwrap();
        topo.distribute_traffic();

        let traffic = topo.traffic_matrix();
        assert!((traffic[0][1] - 10.0).abs() < 1e-9);
        assert!((traffic[0][2] - 10.0).abs() < 1e-9);
        assert!((topo.incoming_traffic(3) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_injected_traffic() {
        let mut topo = line_topology();
        topo.set_connections(&LINE, ConnectionMode::Enforced).unwrap();
        topo.inject_traffic(2, &[5.0]).unwrap();
        topo.distribute_traffic();
        assert!((topo.traffic_matrix()[2][3] - 35.0).abs() < 1e-9);

        topo.clear_injections();
        topo.distribute_traffic();
        assert!((topo.traffic_matrix()[2][3] - 30.0).abs() < 1e-9);

        assert!(topo.inject_traffic(0, &[1.0]).is_err());
        assert!(topo.inject_traffic(3, &[1.0]).is_err());
    }

    #[test]
    fn test_energy_consumption() {
        let mut topo = line_topology();
        topo.set_connections(&LINE, ConnectionMode::Enforced).unwrap();
        topo.distribute_traffic();
        topo.compute_energy_consumption();

        let energy = topo.energy_consumption();
        let root2 = 2f64.sqrt();
        assert_eq!(energy[0], 0.0);
        assert!((energy[1] - 0.03 * 30.0).abs() < 1e-9);
        assert!((energy[2] - 0.03 * 30.0 * root2).abs() < 1e-9);
        assert!((energy[3] - 0.03 * 30.0 * root2).abs() < 1e-9);
    }

    #[test]
    fn test_idempotent_reapply() {
        let grid = GridConfig::new(5, 5, 1, 1, 3);
        let mut rng = test_rng();
        let mut topo = Topology::random(&grid, &TrafficConfig::default(), &mut rng).unwrap();
        let bits: Vec<usize> = (0..topo.phenotype_len())
            .map(|_| rng.random_range(0..2))
            .collect();

        topo.set_connections(&bits, ConnectionMode::Enforced).unwrap();
        topo.distribute_traffic();
        let (conn, layer, traffic) = (
            topo.connections().to_vec(),
            topo.layers().to_vec(),
            topo.traffic_matrix().to_vec(),
        );

        topo.set_connections(&bits, ConnectionMode::Enforced).unwrap();
        topo.distribute_traffic();
        assert_eq!(topo.connections(), conn.as_slice());
        assert_eq!(topo.layers(), layer.as_slice());
        assert_eq!(topo.traffic_matrix(), traffic.as_slice());
    }

    #[test]
    fn test_connection_matrix() {
        let mut topo = line_topology();
        let mut matrix = vec![vec![false; 4]; 4];
        for (a, b) in [(0, 1), (1, 2), (2, 3)] {
            matrix[a][b] = true;
            matrix[b][a] = true;
        }
        assert!(!topo.set_connection_matrix(&matrix).unwrap());
        assert_eq!(topo.layers(), &[Some(1), Some(2), Some(3), Some(4)]);

        matrix[0][3] = true;
        assert!(topo.set_connection_matrix(&matrix).is_err());
    }
}
