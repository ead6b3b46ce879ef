//! Placeholder parsing and substitution for exec step commands.
//!
//! A command is written before any folder exists, so it names folders
//! symbolically and they are substituted when the step runs.
//!
//! # Placeholder Formats
//!
//! - `$${out}` - the folder the step writes its output into
//! - `$${previous}` - the last published output (empty when there is none)
//! - `$${supplement}` - scratch folder discarded after the run
//! - `$${dep:<key>}` - folder of the dependency observed under `<key>`
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `$out` work naturally without any escaping.
//!
//! # Escaping
//!
//! `$$${` produces a literal `$${`.
//!
//! # Example
//!
//! ```
//! use stepwise_lib::placeholder::{parse, Placeholder, Segment};
//!
//! let segments = parse("cp $${dep:../source}/a.txt $out").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("cp ".to_string()),
//!     Segment::Placeholder(Placeholder::Dependency("../source".to_string())),
//!     Segment::Literal("/a.txt $out".to_string()),
//! ]);
//! ```

use thiserror::Error;

const OPEN: &str = "$${";
const ESCAPED_OPEN: &str = "$$${";

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  /// `$${out}`
  Out,
  /// `$${previous}`
  Previous,
  /// `$${supplement}`
  Supplement,
  /// `$${dep:<key>}`
  Dependency(String),
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder: {0}")]
  Unknown(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("unresolved dependency '{0}'")]
  UnresolvedDependency(String),
}

/// Supplies values for placeholders.
pub trait Resolver {
  fn resolve_out(&self) -> Result<&str, PlaceholderError>;

  /// Returns an empty string when there is no previous output.
  fn resolve_previous(&self) -> Result<&str, PlaceholderError>;

  fn resolve_supplement(&self) -> Result<&str, PlaceholderError>;

  fn resolve_dependency(&self, key: &str) -> Result<&str, PlaceholderError>;
}

/// Split `input` into literal text and placeholders.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(start) = rest.find(OPEN) {
    // An escape is the same opener with one more leading `$`.
    if start > 0 && rest[..start].ends_with('$') {
      let escaped = start - 1;
      if rest[escaped..].starts_with(ESCAPED_OPEN) {
        literal.push_str(&rest[..escaped]);
        literal.push_str(OPEN);
        rest = &rest[escaped + ESCAPED_OPEN.len()..];
        continue;
      }
    }

    literal.push_str(&rest[..start]);
    let body_start = start + OPEN.len();
    let position = input.len() - rest.len() + start;
    let Some(length) = rest[body_start..].find('}') else {
      return Err(PlaceholderError::Unclosed(position));
    };

    if !literal.is_empty() {
      segments.push(Segment::Literal(std::mem::take(&mut literal)));
    }
    let body = &rest[body_start..body_start + length];
    segments.push(Segment::Placeholder(parse_body(body)?));
    rest = &rest[body_start + length + 1..];
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn parse_body(body: &str) -> Result<Placeholder, PlaceholderError> {
  match body {
    "out" => Ok(Placeholder::Out),
    "previous" => Ok(Placeholder::Previous),
    "supplement" => Ok(Placeholder::Supplement),
    _ => match body.split_once(':') {
      Some(("dep", "")) => Err(PlaceholderError::Malformed(format!("missing dependency key in '{body}'"))),
      Some(("dep", key)) => Ok(Placeholder::Dependency(key.to_string())),
      Some((kind, _)) => Err(PlaceholderError::Unknown(kind.to_string())),
      None => Err(PlaceholderError::Unknown(body.to_string())),
    },
  }
}

/// Parse and substitute in one step.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  substitute_segments(&parse(input)?, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();
  for segment in segments {
    match segment {
      Segment::Literal(text) => result.push_str(text),
      Segment::Placeholder(placeholder) => result.push_str(match placeholder {
        Placeholder::Out => resolver.resolve_out()?,
        Placeholder::Previous => resolver.resolve_previous()?,
        Placeholder::Supplement => resolver.resolve_supplement()?,
        Placeholder::Dependency(key) => resolver.resolve_dependency(key)?,
      }),
    }
  }
  Ok(result)
}
