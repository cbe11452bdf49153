//! Dependency graph built on petgraph

use mosaic_core::{AtomicTask, MosaicError, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// Anything with an id and a set of dependency ids
pub trait GraphNode {
    fn node_id(&self) -> &str;
    fn dependency_ids(&self) -> Vec<&str>;
}

impl GraphNode for AtomicTask {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn dependency_ids(&self) -> Vec<&str> {
        self.dependencies.iter().map(String::as_str).collect()
    }
}

/// Serializable form of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: String,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

impl GraphNode for SnapshotNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn dependency_ids(&self) -> Vec<&str> {
        self.dependencies.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<SnapshotNode>,
    #[serde(default)]
    pub levels: Vec<Vec<String>>,
}

/// Directed depends-on graph
///
/// An edge `a -> b` means `a` must resolve before `b` starts.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build from nodes; every dependency id must name a node in the set
    pub fn build<N: GraphNode>(nodes: &[N]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in nodes {
            let id = node.node_id().to_string();
            if index.contains_key(&id) {
                return Err(MosaicError::Scheduling(format!("duplicate node id {}", id)));
            }
            let idx = graph.add_node(id.clone());
            index.insert(id, idx);
        }

        for node in nodes {
            let to = index[node.node_id()];
            for dep in node.dependency_ids() {
                let from = index.get(dep).ok_or_else(|| {
                    MosaicError::Scheduling(format!(
                        "{} depends on unknown node {}",
                        node.node_id(),
                        dep
                    ))
                })?;
                graph.update_edge(*from, to, ());
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built dependency graph"
        );
        Ok(Self { graph, index })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Every cycle as a sorted list of member ids; empty if acyclic
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
            })
            .map(|scc| {
                let mut ids: Vec<String> = scc.iter().map(|&i| self.graph[i].clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    pub fn is_acyclic(&self) -> bool {
        self.detect_cycles().is_empty()
    }

    /// Partition into levels with tightest placement
    ///
    /// A node with no dependencies is level 0; otherwise one more than its
    /// deepest dependency. Ids within a level are sorted.
    pub fn compute_levels(&self) -> Result<Vec<Vec<String>>> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();
        let mut level: HashMap<NodeIndex, usize> = HashMap::new();
        let mut queue: VecDeque<NodeIndex> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();
        for n in &queue {
            level.insert(*n, 0);
        }

        while let Some(n) = queue.pop_front() {
            let current = level[&n];
            for next in self.graph.neighbors_directed(n, Direction::Outgoing) {
                let entry = level.entry(next).or_insert(0);
                *entry = (*entry).max(current + 1);
                if let Some(d) = in_degree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if in_degree.values().any(|&d| d > 0) {
            let cycles: Vec<String> = self
                .detect_cycles()
                .iter()
                .map(|c| c.join(" -> "))
                .collect();
            return Err(MosaicError::Scheduling(format!(
                "dependency cycle: {}",
                cycles.join("; ")
            )));
        }

        let depth = level.values().max().map(|m| m + 1).unwrap_or(0);
        let mut levels = vec![Vec::new(); depth];
        for (n, l) in level {
            levels[l].push(self.graph[n].clone());
        }
        for ids in &mut levels {
            ids.sort();
        }
        Ok(levels)
    }

    /// Nodes that depend directly on `id`, sorted
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Direct dependencies of `id`, sorted
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Every node reachable through dependents of `id`, sorted
    pub fn transitive_dependents(&self, id: &str) -> Vec<String> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            for next in self.graph.neighbors_directed(n, Direction::Outgoing) {
                if seen.insert(self.graph[next].clone()) {
                    stack.push(next);
                }
            }
        }
        seen.remove(id);
        seen.into_iter().collect()
    }

    pub fn level_of(&self, id: &str) -> Option<usize> {
        let levels = self.compute_levels().ok()?;
        levels.iter().position(|level| level.iter().any(|n| n == id))
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<SnapshotNode> = self
            .graph
            .node_indices()
            .map(|n| SnapshotNode {
                id: self.graph[n].clone(),
                dependencies: self
                    .graph
                    .neighbors_directed(n, Direction::Incoming)
                    .map(|d| self.graph[d].clone())
                    .collect(),
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        GraphSnapshot {
            nodes,
            levels: self.compute_levels().unwrap_or_default(),
        }
    }

    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Result<Self> {
        Self::build(&snapshot.nodes)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&n) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(n, direction)
            .map(|m| self.graph[m].clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("nodes", &self.len())
            .field("edges", &self.edge_count())
            .finish()
    }
}
