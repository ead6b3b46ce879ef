//! Execution DAG over the registered graph.
//!
//! Edges run from a dependency to its dependent. The DAG is used both by the
//! dispatcher (dependency counts and dependents) and for planning (waves).

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::graph::Graph;
use crate::identity::Identity;

use super::types::ExecuteError;

/// A DAG of identities built from a [`Graph`].
pub struct ExecutionDag {
  graph: DiGraph<Identity, ()>,
  nodes: BTreeMap<Identity, NodeIndex>,
}

impl ExecutionDag {
  /// Build the DAG from every registration and its resolved edges.
  ///
  /// Two edges from the same dependent to the same target (for example a
  /// node observed under two synonyms) collapse into one.
  pub fn from_graph(graph: &Graph) -> Result<Self, ExecuteError> {
    let mut dag = DiGraph::new();
    let mut nodes = BTreeMap::new();

    for (identity, _) in graph.registrations() {
      let idx = dag.add_node(identity.clone());
      nodes.insert(identity.clone(), idx);
    }

    for (identity, registration) in graph.registrations() {
      let dependent = nodes[identity];
      for edge in &registration.dependencies {
        let Some(&dependency) = nodes.get(&edge.target) else {
          return Err(ExecuteError::UnknownNode(edge.target.clone()));
        };
        dag.update_edge(dependency, dependent, ());
      }
    }

    let dag = Self { graph: dag, nodes };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), ExecuteError> {
    toposort(&self.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Identities in an order where dependencies come before dependents.
  pub fn topological_order(&self) -> Result<Vec<Identity>, ExecuteError> {
    let sorted = toposort(&self.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Number of distinct dependencies of every node.
  pub fn dependency_counts(&self) -> HashMap<Identity, usize> {
    self
      .nodes
      .iter()
      .map(|(identity, &idx)| {
        let count = self.graph.neighbors_directed(idx, Direction::Incoming).count();
        (identity.clone(), count)
      })
      .collect()
  }

  /// Nodes without dependencies, in identity order.
  pub fn roots(&self) -> Vec<Identity> {
    self
      .nodes
      .iter()
      .filter(|(_, idx)| self.graph.neighbors_directed(**idx, Direction::Incoming).next().is_none())
      .map(|(identity, _)| identity.clone())
      .collect()
  }

  /// Direct dependents of `identity`.
  pub fn dependents(&self, identity: &Identity) -> Vec<Identity> {
    let Some(&idx) = self.nodes.get(identity) else {
      return Vec::new();
    };
    let mut dependents: Vec<_> = self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|dependent| self.graph[dependent].clone())
      .collect();
    dependents.sort();
    dependents
  }

  /// Direct dependencies of `identity`.
  pub fn dependencies(&self, identity: &Identity) -> Vec<Identity> {
    let Some(&idx) = self.nodes.get(identity) else {
      return Vec::new();
    };
    let mut dependencies: Vec<_> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dependency| self.graph[dependency].clone())
      .collect();
    dependencies.sort();
    dependencies
  }

  /// Group nodes into waves: every node's dependencies lie in earlier waves.
  ///
  /// Each wave is sorted by identity.
  pub fn execution_waves(&self) -> Result<Vec<Vec<Identity>>, ExecuteError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();
      if ready.is_empty() {
        return Err(ExecuteError::CycleDetected);
      }

      for idx in &ready {
        remaining.remove(idx);
        for neighbor in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&neighbor) {
            *degree = degree.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<Identity> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }
}
