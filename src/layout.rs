//! Physical placement of network towers on a grid.
//!
//! Sites live in a `SlotMap` arena so towers can be removed (for example by a
//! tower attack) without invalidating the ids of the remaining ones. The
//! [`Topology`](crate::Topology) flattens the arena into dense indices ordered
//! edge tier first, then mid, then cloud, each by `(row, col)`.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::error::{FogError, Result};

new_key_type! {
    /// Stable identifier of a tower site within a [`Layout`].
    pub struct NodeId;
}

/// The network tier a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Data originators on the first grid row.
    Edge,
    /// Relays on interior grid rows.
    Mid,
    /// Traffic sinks on the last grid row.
    Cloud,
}

/// A tower placed on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Network tier of the tower.
    pub tier: Tier,
    /// Grid row, 0 is the edge row.
    pub row: usize,
    /// Grid column.
    pub col: usize,
}

impl Site {
    /// Euclidean distance between two grid cells.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Grid coordinates are small
    pub fn distance(&self, other: &Site) -> f64 {
        let dr = self.row as f64 - other.row as f64;
        let dc = self.col as f64 - other.col as f64;
        dr.hypot(dc)
    }
}

/// Grid size and node counts for a synthetic layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Grid width.
    pub cols: usize,
    /// Grid height, at least 2.
    pub rows: usize,
    /// Towers placed on the first row.
    pub num_edge: usize,
    /// Towers placed on interior rows.
    pub num_mid: usize,
    /// Towers placed on the last row.
    pub num_cloud: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cols: 10,
            rows: 10,
            num_edge: 1,
            num_mid: 30,
            num_cloud: 1,
        }
    }
}

impl GridConfig {
    /// Grid with the given size and tower counts.
    #[must_use]
    pub fn new(cols: usize, rows: usize, num_edge: usize, num_cloud: usize, num_mid: usize) -> Self {
        Self {
            cols,
            rows,
            num_edge,
            num_mid,
            num_cloud,
        }
    }

    /// Total number of nodes the grid will hold.
    #[must_use]
    pub const fn total_nodes(&self) -> usize {
        self.num_edge + self.num_mid + self.num_cloud
    }

    /// Check that the node counts fit the grid.
    pub fn validate(&self) -> Result<()> {
        if self.num_edge == 0 {
            return Err(FogError::config("num_edge", "at least one edge node is required"));
        }
        if self.num_cloud == 0 {
            return Err(FogError::config("num_cloud", "at least one cloud node is required"));
        }
        if self.rows < 2 {
            return Err(FogError::config("rows", "need separate edge and cloud rows"));
        }
        if self.num_edge > self.cols {
            return Err(FogError::config(
                "num_edge",
                format!("{} edge nodes do not fit in {} columns", self.num_edge, self.cols),
            ));
        }
        if self.num_cloud > self.cols {
            return Err(FogError::config(
                "num_cloud",
                format!("{} cloud nodes do not fit in {} columns", self.num_cloud, self.cols),
            ));
        }
        let interior = (self.rows - 2) * self.cols;
        if self.num_mid > interior {
            return Err(FogError::config(
                "num_mid",
                format!("{} mid nodes do not fit in {} interior cells", self.num_mid, interior),
            ));
        }
        Ok(())
    }
}

/// Tower placement on a `rows x cols` grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    rows: usize,
    cols: usize,
    sites: SlotMap<NodeId, Site>,
}

impl Layout {
    /// Create an empty grid.
    #[must_use]
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            sites: SlotMap::with_key(),
        }
    }

    /// Randomly place towers: edge nodes on row 0, cloud nodes on the last row,
    /// mid nodes anywhere in between. No two towers share a cell.
    pub fn random<R: Rng>(config: &GridConfig, rng: &mut R) -> Result<Self> {
        config.validate().map_err(|err| match err {
            FogError::Config { parameter, reason } => {
                FogError::MalformedInput(format!("{parameter}: {reason}"))
            }
            other => other,
        })?;

        let mut layout = Self::empty(config.rows, config.cols);
        let mut occupied = vec![vec![false; config.cols]; config.rows];
        let last = config.rows - 1;

        for _ in 0..config.num_edge {
            let col = loop {
                let col = rng.random_range(0..config.cols);
                if !occupied[0][col] {
                    break col;
                }
            };
            occupied[0][col] = true;
            layout.insert(Site { tier: Tier::Edge, row: 0, col })?;
        }

        for _ in 0..config.num_cloud {
            let col = loop {
                let col = rng.random_range(0..config.cols);
                if !occupied[last][col] {
                    break col;
                }
            };
            occupied[last][col] = true;
            layout.insert(Site { tier: Tier::Cloud, row: last, col })?;
        }

        for _ in 0..config.num_mid {
            let (row, col) = loop {
                let row = rng.random_range(1..last);
                let col = rng.random_range(0..config.cols);
                if !occupied[row][col] {
                    break (row, col);
                }
            };
            occupied[row][col] = true;
            layout.insert(Site { tier: Tier::Mid, row, col })?;
        }

        Ok(layout)
    }

    /// Parse a whitespace-separated grid where any non-zero cell is a tower.
    ///
    /// Row 0 holds edge nodes, the last row cloud nodes, interior rows mid nodes.
    pub fn parse(text: &str) -> Result<Self> {
        let mut grid: Vec<Vec<bool>> = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<i64>()
                        .map(|v| v != 0)
                        .map_err(|_| FogError::parse(idx + 1, format!("invalid cell `{tok}`")))
                })
                .collect::<Result<Vec<_>>>()?;
            if let Some(first) = grid.first() {
                if first.len() != row.len() {
                    return Err(FogError::parse(
                        idx + 1,
                        format!("expected {} columns, found {}", first.len(), row.len()),
                    ));
                }
            }
            grid.push(row);
        }

        if grid.len() < 2 {
            return Err(FogError::MalformedInput(
                "layout needs at least an edge row and a cloud row".to_string(),
            ));
        }

        let rows = grid.len();
        let cols = grid[0].len();
        let mut layout = Self::empty(rows, cols);
        for (row, cells) in grid.iter().enumerate() {
            for (col, &occupied) in cells.iter().enumerate() {
                if !occupied {
                    continue;
                }
                let tier = if row == 0 {
                    Tier::Edge
                } else if row == rows - 1 {
                    Tier::Cloud
                } else {
                    Tier::Mid
                };
                layout.insert(Site { tier, row, col })?;
            }
        }

        layout.ensure_tiers()?;
        Ok(layout)
    }

    /// Add a tower. The cell must be free and the tier must match the row.
    pub fn insert(&mut self, site: Site) -> Result<NodeId> {
        if site.row >= self.rows || site.col >= self.cols {
            return Err(FogError::MalformedInput(format!(
                "site ({}, {}) outside {}x{} grid",
                site.row, site.col, self.rows, self.cols
            )));
        }
        let expected = if site.row == 0 {
            Tier::Edge
        } else if site.row == self.rows - 1 {
            Tier::Cloud
        } else {
            Tier::Mid
        };
        if site.tier != expected {
            return Err(FogError::MalformedInput(format!(
                "{:?} node cannot sit on row {}",
                site.tier, site.row
            )));
        }
        if self.site_at(site.row, site.col).is_some() {
            return Err(FogError::MalformedInput(format!(
                "cell ({}, {}) already occupied",
                site.row, site.col
            )));
        }
        Ok(self.sites.insert(site))
    }

    /// Remove a tower, returning its site.
    pub fn remove_site(&mut self, id: NodeId) -> Option<Site> {
        self.sites.remove(id)
    }

    /// Site stored under `id`.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Site> {
        self.sites.get(id)
    }

    /// Node id occupying a cell, if any.
    #[must_use]
    pub fn site_at(&self, row: usize, col: usize) -> Option<NodeId> {
        self.sites
            .iter()
            .find(|(_, s)| s.row == row && s.col == col)
            .map(|(id, _)| id)
    }

    /// Grid height.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Grid width.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Number of towers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether the layout has no towers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Number of towers in a tier.
    #[must_use]
    pub fn count(&self, tier: Tier) -> usize {
        self.sites.values().filter(|s| s.tier == tier).count()
    }

    /// Node ids in dense order: tier, then row, then column.
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<(NodeId, Site)> = self.sites.iter().map(|(id, s)| (id, *s)).collect();
        ids.sort_by_key(|(_, s)| (s.tier, s.row, s.col));
        ids.into_iter().map(|(id, _)| id).collect()
    }

    /// Fail with [`FogError::MalformedInput`] if the edge or cloud tier is empty.
    pub fn ensure_tiers(&self) -> Result<()> {
        if self.count(Tier::Edge) == 0 {
            return Err(FogError::MalformedInput("layout has no edge nodes".to_string()));
        }
        if self.count(Tier::Cloud) == 0 {
            return Err(FogError::MalformedInput("layout has no cloud nodes".to_string()));
        }
        Ok(())
    }

    /// The parseable `0/1` grid form.
    #[must_use]
    pub fn to_grid_string(&self) -> String {
        let mut out = String::new();
        for row in 0..self.rows {
            let cells: Vec<&str> = (0..self.cols)
                .map(|col| if self.site_at(row, col).is_some() { "1" } else { "0" })
                .collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }
}

impl FromStr for Layout {
    type Err = FogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Renders the grid with 1-based dense node numbers in occupied cells.
impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = self.ordered_ids();
        for row in 0..self.rows {
            let cells: Vec<String> = (0..self.cols)
                .map(|col| match self.site_at(row, col) {
                    Some(id) => order
                        .iter()
                        .position(|&o| o == id)
                        .map_or_else(|| "?".to_string(), |p| (p + 1).to_string()),
                    None => "0".to_string(),
                })
                .collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}
