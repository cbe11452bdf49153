//! # mosaic-graph
//!
//! Depends-on graph over atoms: cycle detection and topological levels.
//! Atoms in the same level have no dependency on each other and may run in
//! parallel; level k+1 only starts once level k is resolved.

mod dag;

pub use dag::{DependencyGraph, GraphNode, GraphSnapshot, SnapshotNode};
