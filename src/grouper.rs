//! Interference graph over the stations of an instance.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    constraint::ConstraintManager,
    model::{Domains, Station},
};

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Less => self.parent[a] = b,
            std::cmp::Ordering::Greater => self.parent[b] = a,
            std::cmp::Ordering::Equal => {
                self.parent[b] = a;
                self.rank[a] += 1;
            }
        }
    }
}

/// Undirected graph with an edge between stations linked by a relevant constraint.
pub struct ConstraintGraph {
    stations: Vec<Station>,
    neighbours: Vec<BTreeSet<usize>>,
}

impl ConstraintGraph {
    pub fn new(domains: &Domains, constraints: &ConstraintManager) -> Self {
        let stations: Vec<Station> = domains.keys().copied().collect();
        let index: BTreeMap<Station, usize> =
            stations.iter().enumerate().map(|(i, &s)| (s, i)).collect();

        let mut neighbours = vec![BTreeSet::new(); stations.len()];
        for constraint in constraints.relevant_constraints(domains) {
            let (a, b) = (index[&constraint.source], index[&constraint.target]);
            if a != b {
                neighbours[a].insert(b);
                neighbours[b].insert(a);
            }
        }

        Self {
            stations,
            neighbours,
        }
    }

    pub fn neighbours(&self, station: Station) -> BTreeSet<Station> {
        match self.stations.binary_search(&station) {
            Ok(i) => self.neighbours[i].iter().map(|&j| self.stations[j]).collect(),
            Err(_) => BTreeSet::new(),
        }
    }

    pub fn edge_count(&self) -> usize {
        self.neighbours.iter().map(|n| n.len()).sum::<usize>() / 2
    }

    /// Connected components, smallest first.
    pub fn components(&self) -> Vec<BTreeSet<Station>> {
        let mut sets = UnionFind::new(self.stations.len());
        for (a, neighbours) in self.neighbours.iter().enumerate() {
            for &b in neighbours {
                sets.union(a, b);
            }
        }

        let mut by_root: BTreeMap<usize, BTreeSet<Station>> = BTreeMap::new();
        for (i, &station) in self.stations.iter().enumerate() {
            by_root.entry(sets.find(i)).or_default().insert(station);
        }

        let mut components: Vec<BTreeSet<Station>> = by_root.into_values().collect();
        components.sort_by_key(|c| (c.len(), c.first().copied()));
        components
    }
}
