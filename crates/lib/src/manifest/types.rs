//! Serialized graph-file types.
//!
//! A graph file is a JSON document with an ordered list of nodes:
//!
//! ```json
//! {
//!   "nodes": [
//!     { "kind": "source", "id": "source", "path": "src" },
//!     {
//!       "kind": "step",
//!       "id": "step",
//!       "dependencies": ["source", { "id": "source", "as": "input" }],
//!       "step": { "type": "exec", "command": "cp -r $${dep:input}/. $${out}" }
//!     },
//!     {
//!       "kind": "module",
//!       "id": "lib",
//!       "dependencies": ["step"],
//!       "exports": { "internal": null, "main": "" },
//!       "nodes": []
//!     }
//!   ]
//! }
//! ```
//!
//! Nodes register in file order, so a node may only depend on nodes listed
//! before it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level graph document.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
}

/// One entry of a `nodes` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeDef {
  /// A live folder. Relative paths resolve against the graph file's directory.
  Source { id: String, path: PathBuf },

  Step {
    id: String,
    #[serde(default)]
    dependencies: Vec<DependencyDef>,
    step: StepDef,
  },

  Module {
    id: String,
    #[serde(default)]
    dependencies: Vec<DependencyDef>,
    /// Member name to external name: `null` hides, `""` exposes as the module
    /// itself, anything else as `module/<alias>`. Unlisted members keep their name.
    #[serde(default)]
    exports: BTreeMap<String, Option<String>>,
    #[serde(default)]
    nodes: Vec<NodeDef>,
  },

  /// Splice a step between `target` and its dependencies.
  Prepend { target: String, id: String, step: StepDef },

  /// Splice a step downstream of `target`; the old node moves to `id`.
  Append { target: String, id: String, step: StepDef },

  /// Swap the body of `id` for a step or a source folder.
  Replace {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step: Option<StepDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
  },
}

impl NodeDef {
  pub fn id(&self) -> &str {
    match self {
      NodeDef::Source { id, .. }
      | NodeDef::Step { id, .. }
      | NodeDef::Module { id, .. }
      | NodeDef::Prepend { id, .. }
      | NodeDef::Append { id, .. }
      | NodeDef::Replace { id, .. } => id,
    }
  }
}

/// A dependency: a bare reference or a reference with a synonym.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyDef {
  Reference(String),
  Aliased {
    id: String,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
  },
}

/// A built-in step body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepDef {
  Exec {
    command: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    always_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shell: Option<String>,
  },
  Copy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    only: Option<String>,
  },
}
