//! Organisation-unit `PartOf` hierarchy: cycle detection and ancestor paths.
//!
//! Each unit has at most one parent, so the hierarchy is a functional graph:
//! following parents from any node either ends at a root or enters exactly
//! one cycle.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::StoreError;
use crate::model::EntityId;

/// Child → parent edges keyed by node name, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct PartOfGraph {
    edges: IndexMap<String, String>,
}

impl PartOfGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `child` is part of `parent`. A later edge for the same
    /// child replaces the earlier one.
    pub fn add_edge(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        self.edges.insert(child.into(), parent.into());
    }

    /// Whether `node` already has a parent edge.
    #[must_use]
    pub fn has_parent(&self, node: &str) -> bool {
        self.edges.contains_key(node)
    }

    /// Parent of `node`.
    #[must_use]
    pub fn parent_of(&self, node: &str) -> Option<&str> {
        self.edges.get(node).map(String::as_str)
    }

    /// Every cycle in the graph, each listed once from its first-inserted
    /// member and closed by repeating it (`[A, B, A]`).
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut finished: HashSet<&str> = HashSet::new();
        let mut cycles = Vec::new();

        for start in self.edges.keys() {
            if finished.contains(start.as_str()) {
                continue;
            }
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: HashMap<&str, usize> = HashMap::new();
            let mut node = Some(start.as_str());

            while let Some(current) = node {
                if finished.contains(current) {
                    break;
                }
                if let Some(&index) = on_path.get(current) {
                    let mut cycle: Vec<String> = path[index..].iter().map(|s| (*s).to_string()).collect();
                    cycle.push(current.to_string());
                    cycles.push(cycle);
                    break;
                }
                on_path.insert(current, path.len());
                path.push(current);
                node = self.parent_of(current);
            }
            finished.extend(path);
        }
        cycles
    }

    /// Every node that sits on a cycle, mapped to its cycle rotated to start
    /// and end at that node.
    #[must_use]
    pub fn cycle_members(&self) -> IndexMap<String, Vec<String>> {
        let mut members = IndexMap::new();
        for cycle in self.cycles() {
            let ring = &cycle[..cycle.len() - 1];
            for (offset, node) in ring.iter().enumerate() {
                let mut rotated: Vec<String> = ring[offset..].iter().chain(&ring[..offset]).cloned().collect();
                rotated.push(node.clone());
                members.insert(node.clone(), rotated);
            }
        }
        members
    }
}

/// Walks parents from `start` and returns the ancestors, nearest first.
///
/// The walk stops at a root, at a node already visited (so a corrupted
/// hierarchy cannot loop forever), or when `parent_of` fails.
///
/// # Errors
///
/// Propagates the first error of `parent_of`.
pub fn ancestor_path<N, F>(start: N, mut parent_of: F) -> Result<Vec<N>, StoreError>
where
    N: Copy + Eq + Hash,
    F: FnMut(N) -> Result<Option<N>, StoreError>,
{
    let mut visited = HashSet::from([start]);
    let mut path = Vec::new();
    let mut current = start;
    while let Some(parent) = parent_of(current)? {
        if !visited.insert(parent) {
            break;
        }
        path.push(parent);
        current = parent;
    }
    Ok(path)
}

/// Whether `candidate` is an ancestor of `node`.
///
/// # Errors
///
/// Propagates the first error of `parent_of`.
pub fn is_ancestor<F>(node: EntityId, candidate: EntityId, parent_of: F) -> Result<bool, StoreError>
where
    F: FnMut(EntityId) -> Result<Option<EntityId>, StoreError>,
{
    Ok(ancestor_path(node, parent_of)?.contains(&candidate))
}
