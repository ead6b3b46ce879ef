//! The mutable registration surface of the build graph.
//!
//! A [`GraphBuilder`] is scoped to one namespace: the root, or a module
//! created by [`GraphBuilder::add_module`]. Module builders run synchronously
//! and borrow the same node table, so by the time `add_module` returns the
//! child namespace is fully populated and its exports are merged into the
//! parent.
//!
//! # Reference resolution
//!
//! A dependency reference with `n` leading `../` hops is looked up in the
//! inherited table, where a module's declared dependencies are exposed as
//! `../<reference>` (or `<synonym>`). A reference without hops is looked up in
//! the inherited table (synonyms), then among the names visible in this
//! namespace, then as a direct path to a hidden module-internal node.
//!
//! A reference that names a module expands to every visible member of it,
//! observed as `<key>/<member>`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::identity::{Identity, Reference, is_ancestor};
use crate::step::Step;

use super::types::{Body, Dependency, Edge, Registration, RegistrationError};

/// Registration surface for one namespace of the graph.
pub struct GraphBuilder<'g> {
  nodes: &'g mut BTreeMap<Identity, Registration>,
  prefix: Option<Identity>,
  depth: usize,
  inherited: BTreeMap<String, Identity>,
  visible: BTreeMap<String, Identity>,
  modules: BTreeSet<String>,
}

impl<'g> GraphBuilder<'g> {
  pub(crate) fn root(nodes: &'g mut BTreeMap<Identity, Registration>) -> Self {
    Self {
      nodes,
      prefix: None,
      depth: 0,
      inherited: BTreeMap::new(),
      visible: BTreeMap::new(),
      modules: BTreeSet::new(),
    }
  }

  pub(crate) fn into_visible(self) -> BTreeMap<String, Identity> {
    self.visible
  }

  /// The module this builder populates, or `None` at the root.
  pub fn namespace(&self) -> Option<&Identity> {
    self.prefix.as_ref()
  }

  /// Dependencies forwarded into this module, keyed by their `../` (or synonym) names.
  pub fn inherited(&self) -> &BTreeMap<String, Identity> {
    &self.inherited
  }

  /// Names visible in this namespace and the nodes they resolve to.
  pub fn visible(&self) -> &BTreeMap<String, Identity> {
    &self.visible
  }

  /// Register a source folder.
  pub fn add_source(&mut self, identity: &str, path: impl Into<PathBuf>) -> Result<Identity, RegistrationError> {
    self.register(identity, Body::Source(path.into()), Vec::new())
  }

  /// Register a step with the given dependencies.
  pub fn add_step<S, I>(&mut self, identity: &str, step: S, dependencies: I) -> Result<Identity, RegistrationError>
  where
    S: Step + 'static,
    I: IntoIterator,
    I::Item: Into<Dependency>,
  {
    let edges = self
      .resolve_dependencies(dependencies)?
      .into_iter()
      .map(|dependency| dependency.edge)
      .collect();
    self.register(identity, Body::Step(Arc::new(step)), edges)
  }

  /// Register a module whose members are all exported under their own names.
  pub fn add_module<I, F>(&mut self, identity: &str, dependencies: I, populate: F) -> Result<(), RegistrationError>
  where
    I: IntoIterator,
    I::Item: Into<Dependency>,
    F: FnOnce(&mut GraphBuilder<'_>, &BTreeMap<String, Identity>) -> Result<(), RegistrationError>,
  {
    self.add_module_with_exports(identity, dependencies, |name| Some(name.to_string()), populate)
  }

  /// Register a module, deciding each member's external name with `exports`.
  ///
  /// `exports` maps a member's name inside the module to:
  /// - `None`: hidden from this namespace (still reachable as `module/member`)
  /// - `Some("")`: exposed as the module's own identity
  /// - `Some(alias)`: exposed as `module/alias`
  pub fn add_module_with_exports<I, R, F>(
    &mut self,
    identity: &str,
    dependencies: I,
    exports: R,
    populate: F,
  ) -> Result<(), RegistrationError>
  where
    I: IntoIterator,
    I::Item: Into<Dependency>,
    R: Fn(&str) -> Option<String>,
    F: FnOnce(&mut GraphBuilder<'_>, &BTreeMap<String, Identity>) -> Result<(), RegistrationError>,
  {
    let name = Identity::parse(identity)?;
    self.check_available(name.as_str())?;
    let module = self.qualify(&name);

    let inherited = self
      .resolve_dependencies(dependencies)?
      .into_iter()
      .map(|dependency| {
        let key = if dependency.synonym {
          dependency.edge.key
        } else {
          format!("../{}", dependency.edge.key)
        };
        (key, dependency.edge.target)
      })
      .collect::<BTreeMap<_, _>>();

    debug!(module = %module, inherited = inherited.len(), "populating module");

    let mut child = GraphBuilder {
      nodes: &mut *self.nodes,
      prefix: Some(module.clone()),
      depth: self.depth + 1,
      inherited,
      visible: BTreeMap::new(),
      modules: BTreeSet::new(),
    };
    let inherited = child.inherited.clone();
    populate(&mut child, &inherited)?;
    let members = child.into_visible();

    let mut exported = BTreeMap::new();
    for (member, target) in members {
      let Some(alias) = exports(&member) else {
        debug!(module = %module, member = %member, "member hidden by export resolver");
        continue;
      };
      let external = if alias.is_empty() {
        name.to_string()
      } else {
        format!("{}/{}", name, Identity::parse(&alias)?)
      };
      if exported.insert(external.clone(), target).is_some() {
        return Err(RegistrationError::DuplicateResolution {
          module: module.to_string(),
          name: external,
        });
      }
    }

    self.visible.extend(exported);
    self.modules.insert(name.to_string());
    Ok(())
  }

  /// Swap the body of an existing registration for `step`, keeping its
  /// identity and dependency edges.
  pub fn replace_step<S>(&mut self, identity: &str, step: S) -> Result<(), RegistrationError>
  where
    S: Step + 'static,
  {
    self.replace_body(identity, Body::Step(Arc::new(step)))
  }

  /// Swap the body of an existing registration for a source folder, keeping
  /// its identity and dependency edges.
  pub fn replace_source(&mut self, identity: &str, path: impl Into<PathBuf>) -> Result<(), RegistrationError> {
    self.replace_body(identity, Body::Source(path.into()))
  }

  /// Splice `step` between `existing` and its current dependencies.
  ///
  /// The new node takes over `existing`'s dependency set and `existing` is
  /// rewired to depend on the new node alone.
  pub fn prepend_step<S>(&mut self, existing: &str, identity: &str, step: S) -> Result<Identity, RegistrationError>
  where
    S: Step + 'static,
  {
    let target = self.local_node(existing)?;
    let registration = self.registration(&target, existing)?;
    if registration.is_source() {
      return Err(RegistrationError::PrependOntoSource(target.to_string()));
    }
    let dependencies = registration.dependencies.clone();
    let spliced = self.register(identity, Body::Step(Arc::new(step)), dependencies)?;

    if let Some(registration) = self.nodes.get_mut(&target) {
      registration.dependencies = vec![Edge {
        key: identity.to_string(),
        target: spliced.clone(),
      }];
    }

    debug!(existing = %target, spliced = %spliced, "prepended step");
    Ok(spliced)
  }

  /// Splice `step` directly downstream of `existing`.
  ///
  /// The current registration at `existing` moves to `identity` unchanged and
  /// a fresh node depending on it takes over `existing`, so every reference to
  /// `existing` now observes the new step's output.
  pub fn append_step<S>(&mut self, existing: &str, identity: &str, step: S) -> Result<Identity, RegistrationError>
  where
    S: Step + 'static,
  {
    let target = self.local_node(existing)?;
    let name = Identity::parse(identity)?;
    self.check_available(name.as_str())?;
    let renamed = self.qualify(&name);
    if self.nodes.contains_key(&renamed) {
      return Err(RegistrationError::DuplicateIdentity(renamed.to_string()));
    }

    let Some(registration) = self.nodes.remove(&target) else {
      return Err(self.unknown_identity(existing));
    };
    self.nodes.insert(renamed.clone(), registration);
    self.nodes.insert(
      target.clone(),
      Registration {
        body: Body::Step(Arc::new(step)),
        dependencies: vec![Edge {
          key: name.to_string(),
          target: renamed.clone(),
        }],
      },
    );
    self.visible.insert(name.to_string(), renamed.clone());

    debug!(existing = %target, renamed = %renamed, "appended step");
    Ok(renamed)
  }

  fn register(&mut self, identity: &str, body: Body, dependencies: Vec<Edge>) -> Result<Identity, RegistrationError> {
    let name = Identity::parse(identity)?;
    self.check_available(name.as_str())?;
    let qualified = self.qualify(&name);
    if self.nodes.contains_key(&qualified) {
      return Err(RegistrationError::DuplicateIdentity(qualified.to_string()));
    }

    debug!(identity = %qualified, dependencies = dependencies.len(), "registered");
    self.nodes.insert(qualified.clone(), Registration { body, dependencies });
    self.visible.insert(name.to_string(), qualified.clone());
    Ok(qualified)
  }

  fn replace_body(&mut self, identity: &str, body: Body) -> Result<(), RegistrationError> {
    let target = self.local_node(identity)?;
    if let Some(registration) = self.nodes.get_mut(&target) {
      registration.body = body;
      debug!(identity = %target, "replaced body");
    }
    Ok(())
  }

  fn registration(&self, target: &Identity, reference: &str) -> Result<&Registration, RegistrationError> {
    self.nodes.get(target).ok_or_else(|| self.unknown_identity(reference))
  }

  /// Reject `name` if it equals, contains or is contained by a name already
  /// used in this namespace.
  fn check_available(&self, name: &str) -> Result<(), RegistrationError> {
    let clash = self
      .visible
      .keys()
      .chain(self.modules.iter())
      .any(|taken| taken == name || is_ancestor(taken, name) || is_ancestor(name, taken));
    if clash {
      return Err(RegistrationError::DuplicateIdentity(match &self.prefix {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name.to_string(),
      }));
    }
    Ok(())
  }

  fn qualify(&self, name: &Identity) -> Identity {
    match &self.prefix {
      Some(prefix) => prefix.join(name),
      None => name.clone(),
    }
  }

  fn namespace_name(&self) -> String {
    match &self.prefix {
      Some(prefix) => format!("module {}", prefix),
      None => "the root namespace".to_string(),
    }
  }

  fn unknown_identity(&self, reference: &str) -> RegistrationError {
    RegistrationError::UnknownIdentity {
      namespace: self.namespace_name(),
      reference: reference.to_string(),
    }
  }

  /// Find the node a local name refers to, visible or hidden.
  fn local_node(&self, name: &str) -> Result<Identity, RegistrationError> {
    let local = Identity::parse(name)?;
    if let Some(target) = self.visible.get(name) {
      return Ok(target.clone());
    }
    let internal = self.qualify(&local);
    if self.nodes.contains_key(&internal) {
      return Ok(internal);
    }
    Err(self.unknown_identity(name))
  }

  fn resolve_dependencies<I>(&self, dependencies: I) -> Result<Vec<ResolvedDependency>, RegistrationError>
  where
    I: IntoIterator,
    I::Item: Into<Dependency>,
  {
    let declared = dependencies
      .into_iter()
      .map(|dependency| {
        let dependency = dependency.into();
        let reference = Reference::parse(&dependency.reference)?;
        let synonym = dependency.synonym.as_deref().map(Identity::parse).transpose()?;
        Ok((reference, synonym))
      })
      .collect::<Result<Vec<_>, RegistrationError>>()?;

    for (ancestor, _) in &declared {
      if let Some((covered, _)) = declared.iter().find(|(other, _)| ancestor.is_ancestor_of(other)) {
        return Err(RegistrationError::RedundantRootDependency {
          dependency: ancestor.to_string(),
          covered: covered.to_string(),
        });
      }
    }

    let mut keys = BTreeSet::new();
    let mut resolved = Vec::new();
    for (reference, synonym) in declared {
      let base = match &synonym {
        Some(synonym) => synonym.to_string(),
        None => reference.to_string(),
      };
      for (suffix, target) in self.resolve(&reference)? {
        let key = if suffix.is_empty() {
          base.clone()
        } else {
          format!("{}/{}", base, suffix)
        };
        if !keys.insert(key.clone()) {
          return Err(RegistrationError::DuplicateSynonym(key));
        }
        resolved.push(ResolvedDependency {
          edge: Edge { key, target },
          synonym: synonym.is_some(),
        });
      }
    }

    Ok(resolved)
  }

  /// Resolve one reference to the node(s) it names, each paired with its
  /// path below the reference (empty for an exact match).
  fn resolve(&self, reference: &Reference) -> Result<Vec<(String, Identity)>, RegistrationError> {
    if reference.hops() > self.depth {
      return Err(RegistrationError::OutOfScope {
        namespace: self.namespace_name(),
        reference: reference.to_string(),
        hops: reference.hops(),
        depth: self.depth,
      });
    }

    let text = reference.as_str();
    let inherited = matching(&self.inherited, text);
    if !inherited.is_empty() {
      return Ok(inherited);
    }

    if reference.hops() == 0 {
      let visible = matching(&self.visible, text);
      if !visible.is_empty() {
        return Ok(visible);
      }

      let internal = self.qualify(reference.name());
      if self.nodes.contains_key(&internal) {
        return Ok(vec![(String::new(), internal)]);
      }
    }

    Err(RegistrationError::UnknownDependency {
      namespace: self.namespace_name(),
      reference: text.to_string(),
    })
  }
}

struct ResolvedDependency {
  edge: Edge,
  synonym: bool,
}

fn matching(table: &BTreeMap<String, Identity>, reference: &str) -> Vec<(String, Identity)> {
  table
    .iter()
    .filter_map(|(name, target)| {
      if name == reference {
        Some((String::new(), target.clone()))
      } else if is_ancestor(reference, name) {
        Some((name[reference.len() + 1..].to_string(), target.clone()))
      } else {
        None
      }
    })
    .collect()
}
