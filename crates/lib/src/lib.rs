//! stepwise-lib: an incremental build-graph executor.
//!
//! A build is a graph of named nodes. Sources are live folders; steps read
//! their dependencies' folders and write an output folder. Every output is
//! fingerprinted, so a rerun only executes steps whose inputs changed and
//! publishes each new output atomically.
//!
//! - [`graph`]: registering sources, steps and modules into a [`Graph`]
//! - [`execute()`]: running a graph against a build root
//! - [`step`]: the contract step bodies implement, with built-ins in [`steps`]
//! - [`manifest`]: loading a graph from a JSON file

pub mod checksum;
pub mod consts;
pub mod execute;
pub mod graph;
pub mod hash;
pub mod identity;
pub mod manifest;
pub mod paths;
pub mod placeholder;
pub mod root_lock;
pub mod step;
pub mod steps;

pub use execute::{BuildEvent, BuildResult, ExecuteConfig, ExecuteError, NodeStatus, execute};
pub use graph::{Dependency, Graph, GraphBuilder, RegistrationError};
pub use hash::HashAlgorithm;
pub use identity::Identity;
pub use step::{Arguments, Step, StepArgument, StepContext, StepError, StepOutcome};
