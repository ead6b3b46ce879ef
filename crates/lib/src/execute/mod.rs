//! Graph execution.
//!
//! [`execute`] runs every node of a [`Graph`] against a build root:
//! - sources are fingerprinted in place on every run
//! - a step is dispatched once all of its dependencies have published, and
//!   runs only if its inputs or its own published output changed
//! - independent nodes run concurrently, bounded by
//!   [`ExecuteConfig::parallelism`]
//!
//! The first failure stops further dispatch: nodes still waiting for a
//! permit are never started. Nodes already running are allowed to finish,
//! their results are discarded, and the failure is returned wrapped with the
//! failing identity.

pub mod dag;
pub mod publish;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::graph::{Body, Graph, Registration};
use crate::hash::HashFunction;
use crate::identity::Identity;
use crate::root_lock::RootLock;

pub use dag::ExecutionDag;
pub use publish::NodeStore;
pub use types::{BuildEvent, BuildListener, BuildResult, ExecuteConfig, ExecuteError, NodeError, NodeResult, NodeStatus};

use publish::{Input, run_source, run_step};

/// Execute `graph` under `config.root`.
///
/// Holds the root's exclusive lock for the whole run. On success the result
/// holds every exported node, keyed by its exported name.
pub async fn execute(graph: &Graph, config: &ExecuteConfig) -> Result<BuildResult, ExecuteError> {
  let started = Instant::now();
  let dag = ExecutionDag::from_graph(graph)?;
  let _lock = RootLock::acquire(&config.root, "build")?;

  info!(
    nodes = dag.len(),
    root = %config.root.display(),
    hash = %config.hash,
    parallelism = config.parallelism,
    "starting build"
  );

  let mut dispatcher = Dispatcher {
    graph,
    config,
    hash: config.hash.function(),
    semaphore: Arc::new(Semaphore::new(config.parallelism.max(1))),
    halted: Arc::new(AtomicBool::new(false)),
    tasks: JoinSet::new(),
  };

  let mut pending = dag.dependency_counts();
  let mut completed: HashMap<Identity, NodeResult> = HashMap::new();
  let mut failure: Option<ExecuteError> = None;

  for identity in dag.roots() {
    dispatcher.spawn(identity, &completed)?;
  }

  while let Some(joined) = dispatcher.tasks.join_next().await {
    let (identity, outcome) = match joined {
      Ok(done) => done,
      Err(e) => {
        // The wrapper task itself never panics; this only fires on runtime shutdown.
        dispatcher.halt();
        failure.get_or_insert(ExecuteError::Io(std::io::Error::other(e.to_string())));
        continue;
      }
    };

    match outcome {
      Err(NodeError::Halted) => {
        debug!(identity = %identity, "not started after a failure");
      }
      Ok(result) if failure.is_none() => {
        completed.insert(identity.clone(), result);
        for dependent in dag.dependents(&identity) {
          let Some(remaining) = pending.get_mut(&dependent) else {
            continue;
          };
          *remaining = remaining.saturating_sub(1);
          if *remaining == 0 {
            dispatcher.spawn(dependent, &completed)?;
          }
        }
      }
      Ok(_) => {
        debug!(identity = %identity, "discarding result of node finished after a failure");
      }
      Err(source) if failure.is_none() => {
        dispatcher.halt();
        error!(identity = %identity, error = %source, "node failed");
        failure = Some(ExecuteError::node(&identity, source));
      }
      Err(source) => {
        warn!(identity = %identity, error = %source, "another node failed while draining");
      }
    }
  }

  if let Some(err) = failure {
    return Err(err);
  }

  let mut result = BuildResult {
    elapsed: started.elapsed(),
    ..BuildResult::default()
  };
  for (name, identity) in graph.exports() {
    if let Some(node) = completed.get(identity) {
      result.nodes.insert(name.clone(), node.clone());
    }
  }

  info!(
    executed = count(&completed, NodeStatus::Executed),
    reused = count(&completed, NodeStatus::Reused),
    skipped = count(&completed, NodeStatus::Skipped),
    elapsed_ms = result.elapsed.as_millis() as u64,
    "build complete"
  );

  Ok(result)
}

fn count(completed: &HashMap<Identity, NodeResult>, status: NodeStatus) -> usize {
  completed.values().filter(|node| node.status == status).count()
}

struct Dispatcher<'a> {
  graph: &'a Graph,
  config: &'a ExecuteConfig,
  hash: Arc<dyn HashFunction>,
  semaphore: Arc<Semaphore>,
  /// Set on the first failure. Nodes check it once they hold a permit.
  halted: Arc<AtomicBool>,
  tasks: JoinSet<(Identity, Result<NodeResult, NodeError>)>,
}

impl Dispatcher<'_> {
  fn halt(&self) {
    self.halted.store(true, Ordering::SeqCst);
  }

  /// Spawn `identity`. Every one of its dependencies must be in `completed`.
  fn spawn(&mut self, identity: Identity, completed: &HashMap<Identity, NodeResult>) -> Result<(), ExecuteError> {
    let Some(registration) = self.graph.registration(&identity) else {
      return Err(ExecuteError::UnknownNode(identity));
    };
    let inputs = gather_inputs(registration, completed)?;
    debug!(identity = %identity, inputs = inputs.len(), "dispatching");

    let node = run_node(
      identity.clone(),
      registration.body.clone(),
      inputs,
      self.config.clone(),
      self.hash.clone(),
      self.semaphore.clone(),
      self.halted.clone(),
    );

    // Nested so a panicking step surfaces as a failure of its own identity.
    let handle = tokio::spawn(node);
    self.tasks.spawn(async move {
      let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(e) => Err(NodeError::Join(e.to_string())),
      };
      (identity, outcome)
    });
    Ok(())
  }
}

fn gather_inputs(
  registration: &Registration,
  completed: &HashMap<Identity, NodeResult>,
) -> Result<Vec<Input>, ExecuteError> {
  registration
    .dependencies
    .iter()
    .map(|edge| {
      let node = completed
        .get(&edge.target)
        .ok_or_else(|| ExecuteError::UnknownNode(edge.target.clone()))?;
      Ok(Input {
        key: edge.key.clone(),
        node: node.clone(),
      })
    })
    .collect()
}

async fn run_node(
  identity: Identity,
  body: Body,
  inputs: Vec<Input>,
  config: ExecuteConfig,
  hash: Arc<dyn HashFunction>,
  semaphore: Arc<Semaphore>,
  halted: Arc<AtomicBool>,
) -> Result<NodeResult, NodeError> {
  let _permit = semaphore
    .acquire_owned()
    .await
    .map_err(|e| NodeError::Join(e.to_string()))?;
  if halted.load(Ordering::SeqCst) {
    return Err(NodeError::Halted);
  }

  let started = Instant::now();
  config.emit(BuildEvent::Started {
    identity: identity.clone(),
  });

  let outcome = match body {
    Body::Source(path) => run_source(identity.clone(), path, hash).await,
    Body::Step(step) => run_step(identity.clone(), step, inputs, config.root.clone(), hash).await,
  };

  let elapsed = started.elapsed();
  let event = match &outcome {
    Ok(node) if node.status == NodeStatus::Skipped => BuildEvent::Skipped { identity, elapsed },
    Ok(node) => BuildEvent::Succeeded {
      identity,
      status: node.status,
      elapsed,
    },
    Err(e) => {
      // Set while still holding the permit: no queued node starts after a failure.
      halted.store(true, Ordering::SeqCst);
      BuildEvent::Failed {
        identity,
        error: render_chain(e),
        elapsed,
      }
    }
  };
  config.emit(event);

  outcome
}

/// Render an error and its causes as `outer: inner: root`.
fn render_chain(error: &dyn std::error::Error) -> String {
  let mut rendered = error.to_string();
  let mut source = error.source();
  while let Some(cause) = source {
    rendered.push_str(": ");
    rendered.push_str(&cause.to_string());
    source = cause.source();
  }
  rendered
}
