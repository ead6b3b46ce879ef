//! Registration records and registration-time errors.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::identity::{Identity, IdentityError};
use crate::step::Step;

/// Errors detected while building the graph. None of these can occur during
/// execution.
#[derive(Debug, Error)]
pub enum RegistrationError {
  #[error(transparent)]
  Identity(#[from] IdentityError),

  #[error("identity already registered: {0}")]
  DuplicateIdentity(String),

  #[error("unknown dependency '{reference}' in {namespace}")]
  UnknownDependency { namespace: String, reference: String },

  #[error("dependency '{reference}' climbs {hops} level(s) but {namespace} is nested only {depth} deep")]
  OutOfScope {
    namespace: String,
    reference: String,
    hops: usize,
    depth: usize,
  },

  #[error("redundant root dependency '{dependency}': it already covers '{covered}'")]
  RedundantRootDependency { dependency: String, covered: String },

  #[error("duplicate synonym '{0}': two dependencies would be observed under the same name")]
  DuplicateSynonym(String),

  #[error("module {module} resolves two identities to the same exported name '{name}'")]
  DuplicateResolution { module: String, name: String },

  #[error("unknown identity '{reference}' in {namespace}")]
  UnknownIdentity { namespace: String, reference: String },

  #[error("cannot prepend onto source {0}: sources never observe dependencies")]
  PrependOntoSource(String),
}

/// A dependency as declared at registration: a reference and an optional
/// synonym under which the registering step observes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  pub(crate) reference: String,
  pub(crate) synonym: Option<String>,
}

impl Dependency {
  pub fn on(reference: impl Into<String>) -> Self {
    Self {
      reference: reference.into(),
      synonym: None,
    }
  }

  /// Observe this dependency under `synonym` instead of its reference.
  pub fn alias(mut self, synonym: impl Into<String>) -> Self {
    self.synonym = Some(synonym.into());
    self
  }

  pub fn reference(&self) -> &str {
    &self.reference
  }

  pub fn synonym(&self) -> Option<&str> {
    self.synonym.as_deref()
  }
}

impl From<&str> for Dependency {
  fn from(value: &str) -> Self {
    Dependency::on(value)
  }
}

impl From<String> for Dependency {
  fn from(value: String) -> Self {
    Dependency::on(value)
  }
}

impl From<(&str, &str)> for Dependency {
  fn from((reference, synonym): (&str, &str)) -> Self {
    Dependency::on(reference).alias(synonym)
  }
}

/// A resolved dependency edge: the node it points at and the key under which
/// the dependent observes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
  pub key: String,
  pub target: Identity,
}

/// What a registration does when executed.
#[derive(Clone)]
pub enum Body {
  /// A live filesystem folder, fingerprinted on every run.
  Source(PathBuf),
  /// A step plugin.
  Step(Arc<dyn Step>),
}

impl fmt::Debug for Body {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Body::Source(path) => f.debug_tuple("Source").field(path).finish(),
      Body::Step(_) => f.debug_tuple("Step").field(&"..").finish(),
    }
  }
}

/// A node of the graph.
#[derive(Debug, Clone)]
pub struct Registration {
  pub body: Body,
  pub dependencies: Vec<Edge>,
}

impl Registration {
  pub fn is_source(&self) -> bool {
    matches!(self.body, Body::Source(_))
  }
}
