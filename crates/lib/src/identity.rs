//! Identities and dependency references within the build graph namespace.
//!
//! An [`Identity`] is a slash-separated path of segments, each matching
//! `[A-Za-z0-9-]+`. Module nesting extends the path (`module/child`), and the
//! on-disk layout mirrors it one directory per segment.
//!
//! A [`Reference`] is how a registration names one of its dependencies: zero or
//! more leading `../` hops followed by an identity. References are resolved
//! against the registering namespace by [`crate::graph::GraphBuilder`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between identity segments.
pub const SEPARATOR: char = '/';

/// Segment denoting one hop up the module chain.
pub const PARENT: &str = "..";

/// Errors raised when parsing identities or references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
  #[error("identity must not be empty")]
  Empty,

  #[error("invalid segment '{segment}' in '{identity}': segments may only contain [A-Za-z0-9-]")]
  InvalidSegment { identity: String, segment: String },

  #[error("'..' may only appear as a leading segment in '{0}'")]
  MisplacedParent(String),
}

/// A validated, slash-separated identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
  /// Parse and validate an identity.
  pub fn parse(value: &str) -> Result<Self, IdentityError> {
    if value.is_empty() {
      return Err(IdentityError::Empty);
    }
    for segment in value.split(SEPARATOR) {
      if segment == PARENT {
        return Err(IdentityError::MisplacedParent(value.to_string()));
      }
      validate_segment(value, segment)?;
    }
    Ok(Identity(value.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Append `child` beneath this identity.
  pub fn join(&self, child: &Identity) -> Identity {
    Identity(format!("{}{}{}", self.0, SEPARATOR, child.0))
  }

  pub fn segments(&self) -> impl Iterator<Item = &str> {
    self.0.split(SEPARATOR)
  }

  /// True if `self` is a strict `/`-prefix of `other`.
  pub fn is_ancestor_of(&self, other: &Identity) -> bool {
    is_ancestor(&self.0, &other.0)
  }

  /// Relative filesystem path with one directory per segment.
  pub fn relative_path(&self) -> PathBuf {
    self.segments().collect()
  }
}

impl fmt::Display for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl TryFrom<String> for Identity {
  type Error = IdentityError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Identity::parse(&value)
  }
}

impl From<Identity> for String {
  fn from(value: Identity) -> Self {
    value.0
  }
}

/// A dependency reference: `hops` leading `../` segments and a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
  hops: usize,
  name: Identity,
  text: String,
}

impl Reference {
  pub fn parse(value: &str) -> Result<Self, IdentityError> {
    if value.is_empty() {
      return Err(IdentityError::Empty);
    }

    let mut hops = 0;
    let mut rest = value;
    while let Some(stripped) = rest.strip_prefix("../") {
      hops += 1;
      rest = stripped;
    }
    if rest == PARENT {
      return Err(IdentityError::InvalidSegment {
        identity: value.to_string(),
        segment: PARENT.to_string(),
      });
    }

    let name = Identity::parse(rest).map_err(|e| match e {
      IdentityError::MisplacedParent(_) => IdentityError::MisplacedParent(value.to_string()),
      IdentityError::InvalidSegment { segment, .. } => IdentityError::InvalidSegment {
        identity: value.to_string(),
        segment,
      },
      other => other,
    })?;

    Ok(Reference {
      hops,
      name,
      text: value.to_string(),
    })
  }

  /// Number of module levels this reference climbs.
  pub fn hops(&self) -> usize {
    self.hops
  }

  pub fn name(&self) -> &Identity {
    &self.name
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }

  /// True if both references climb the same number of levels and `self`
  /// names a strict ancestor of `other`.
  pub fn is_ancestor_of(&self, other: &Reference) -> bool {
    self.hops == other.hops && self.name.is_ancestor_of(&other.name)
  }
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.text)
  }
}

/// True if `ancestor` is a strict `/`-prefix of `path`.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
  path.len() > ancestor.len() && path.starts_with(ancestor) && path[ancestor.len()..].starts_with(SEPARATOR)
}

/// Encode a dependency key as a file-name token.
///
/// Segments are joined with `.` and `..` hops become `_`. Neither character
/// is legal inside a segment, so the encoding is injective.
pub fn key_file_name(key: &str) -> String {
  key
    .split(SEPARATOR)
    .map(|segment| if segment == PARENT { "_" } else { segment })
    .collect::<Vec<_>>()
    .join(".")
}

fn validate_segment(identity: &str, segment: &str) -> Result<(), IdentityError> {
  if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
    return Err(IdentityError::InvalidSegment {
      identity: identity.to_string(),
      segment: segment.to_string(),
    });
  }
  Ok(())
}
