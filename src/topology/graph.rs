//! Dependency Graph
//!
//! Resources declare what they depend on; creation order is derived from
//! those declarations, never from the order they were declared in.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::types::ResourceId;
use crate::error::{Result, TopologyError};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<ResourceId>,
    index: HashMap<ResourceId, usize>,
    /// `edges[n]` lists the nodes `n` depends on
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if absent and return its index
    pub fn add(&mut self, id: ResourceId) -> usize {
        if let Some(&i) = self.index.get(&id) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(id.clone(), i);
        self.nodes.push(id);
        self.edges.push(Vec::new());
        i
    }

    /// Declare that `node` cannot be created before `dependency`
    pub fn depends_on(&mut self, node: ResourceId, dependency: ResourceId) {
        let n = self.add(node);
        let d = self.add(dependency);
        if !self.edges[n].contains(&d) {
            self.edges[n].push(d);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Direct dependencies of `id`
    pub fn dependencies(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.index
            .get(id)
            .map(|&i| self.edges[i].iter().map(|&d| &self.nodes[d]).collect())
            .unwrap_or_default()
    }

    /// Kahn's algorithm; ties go to the earliest-declared node
    pub fn topological_order(&self) -> Result<Vec<ResourceId>> {
        let count = self.nodes.len();
        let mut remaining: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (node, deps) in self.edges.iter().enumerate() {
            for &d in deps {
                dependents[d].push(node);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, &r)| r == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(self.nodes[i].clone());
            for &dependent in &dependents[i] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < count {
            let stuck = remaining
                .iter()
                .enumerate()
                .filter(|(_, &r)| r > 0)
                .map(|(i, _)| self.nodes[i].to_string())
                .collect();
            return Err(TopologyError::DependencyCycle(stuck));
        }

        Ok(order)
    }
}
