//! The build graph: a registry of sources and steps keyed by identity.
//!
//! Graphs are defined once, imperatively, through a [`GraphBuilder`] and are
//! read-only afterwards:
//!
//! ```
//! use stepwise_lib::graph::Graph;
//!
//! let graph = Graph::define(|graph| {
//!   graph.add_source("sources", "src")?;
//!   Ok(())
//! })
//! .unwrap();
//! assert_eq!(graph.len(), 1);
//! ```

mod builder;
mod types;

pub use builder::GraphBuilder;
pub use types::*;

use std::collections::BTreeMap;

use crate::execute::dag::ExecutionDag;
use crate::execute::types::ExecuteError;
use crate::identity::Identity;

/// A fully registered build graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  nodes: BTreeMap<Identity, Registration>,
  exports: BTreeMap<String, Identity>,
}

impl Graph {
  /// Build a graph by running `populate` against the root namespace.
  pub fn define<F>(populate: F) -> Result<Self, RegistrationError>
  where
    F: FnOnce(&mut GraphBuilder<'_>) -> Result<(), RegistrationError>,
  {
    let mut nodes = BTreeMap::new();
    let mut builder = GraphBuilder::root(&mut nodes);
    populate(&mut builder)?;
    let exports = builder.into_visible();
    Ok(Self { nodes, exports })
  }

  pub fn registration(&self, identity: &Identity) -> Option<&Registration> {
    self.nodes.get(identity)
  }

  pub fn registrations(&self) -> impl Iterator<Item = (&Identity, &Registration)> {
    self.nodes.iter()
  }

  /// Externally visible names and the nodes they resolve to.
  pub fn exports(&self) -> &BTreeMap<String, Identity> {
    &self.exports
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Group identities into waves: every node's dependencies lie in earlier waves.
  pub fn plan(&self) -> Result<Vec<Vec<Identity>>, ExecuteError> {
    ExecutionDag::from_graph(self)?.execution_waves()
  }
}
