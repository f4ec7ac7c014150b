//! Layered variable store and `${NAME}` substitution.
//!
//! Workflow text can reference values that are only known at build time
//! (directories, platform facts, the checked out source path). This module
//! parses such text and substitutes references from a [`VarStore`].
//!
//! # Reference Format
//!
//! `${NAME}` where `NAME` is one or more word characters (letters, digits,
//! `_`). Anything else passes through verbatim, so shell syntax like `$HOME`,
//! `$1` or `${HOME:-/tmp}` is left for the shell.
//!
//! # Layers
//!
//! The store is composed of three maps, looked up in this order:
//!
//! - *input*: `key=value` parameters supplied by the user
//! - *inner*: derived facts, exposed with the `HPB_` prefix
//! - *declared*: variables declared by the workflow document
//!
//! # Example
//!
//! ```
//! use hpb_lib::vars::VarStore;
//!
//! let mut store = VarStore::new();
//! store.set("PREFIX", "/opt/foo");
//! assert_eq!(store.resolve_text("cmake -DPREFIX=${PREFIX} $HOME").unwrap(), "cmake -DPREFIX=/opt/foo $HOME");
//! assert!(store.resolve_text("echo ${UNDEFINED}").is_err());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::INNER_VAR_PREFIX;

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no references)
  Literal(String),

  /// A `${NAME}` reference, holding `NAME`
  Var(String),
}

/// Errors that can occur during variable resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarError {
  /// A referenced name is not present in any layer.
  #[error("undefined variable '${{{token}}}' in '{text}'")]
  Undefined { token: String, text: String },
}

impl VarError {
  /// The name that could not be resolved.
  pub fn token(&self) -> &str {
    match self {
      VarError::Undefined { token, .. } => token,
    }
  }
}

/// Source of values for substitution.
pub trait Lookup {
  /// Look up a name, returning `None` if it is undefined.
  fn lookup(&self, name: &str) -> Option<&str>;
}

impl Lookup for BTreeMap<String, String> {
  fn lookup(&self, name: &str) -> Option<&str> {
    self.get(name).map(String::as_str)
  }
}

fn is_word_char(c: char) -> bool {
  c == '_' || c.is_alphanumeric()
}

/// Parse a string into literal and reference segments.
///
/// Malformed references (unclosed, empty, or containing non-word characters)
/// are kept as literal text.
pub fn parse(input: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(start) = rest.find("${") {
    let after = &rest[start + 2..];
    let name_len: usize = after.chars().take_while(|c| is_word_char(*c)).map(char::len_utf8).sum();

    if name_len > 0 && after[name_len..].starts_with('}') {
      literal.push_str(&rest[..start]);
      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }
      segments.push(Segment::Var(after[..name_len].to_string()));
      rest = &after[name_len + 1..];
    } else {
      // Not a reference: keep "${" and continue scanning after it
      literal.push_str(&rest[..start + 2]);
      rest = after;
    }
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  segments
}

/// Substitute every reference in `input` using `lookup`.
///
/// Text without references is returned unchanged. If any reference is
/// undefined the whole call fails; no partially substituted text is returned.
pub fn substitute(input: &str, lookup: &impl Lookup) -> Result<String, VarError> {
  let segments = parse(input);
  let mut result = String::with_capacity(input.len());

  for segment in &segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Var(name) => {
        let value = lookup.lookup(name).ok_or_else(|| VarError::Undefined {
          token: name.clone(),
          text: input.to_string(),
        })?;
        result.push_str(value);
      }
    }
  }

  Ok(result)
}

/// A scalar value from a workflow document, coerced to text on use.
///
/// Numbers keep their YAML spelling, so `1.0` stays `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  Bool(bool),
  Number(serde_yaml::Number),
  Text(String),
}

impl fmt::Display for Scalar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scalar::Bool(b) => write!(f, "{b}"),
      Scalar::Number(n) => write!(f, "{n}"),
      Scalar::Text(s) => f.write_str(s),
    }
  }
}

impl From<&str> for Scalar {
  fn from(s: &str) -> Self {
    Scalar::Text(s.to_string())
  }
}

/// A name/value pair to resolve, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarEntry {
  pub name: String,
  pub value: String,
}

impl VarEntry {
  pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      value: value.into(),
    }
  }
}

/// Controls where [`VarStore::resolve_all`] writes its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
  /// Write resolved values back into the entries.
  pub add_to_entries: bool,
  /// Merge resolved values into the store.
  pub add_to_store: bool,
  /// Replace names already present in the store.
  pub override_existing: bool,
}

impl Default for ResolveOptions {
  fn default() -> Self {
    Self {
      add_to_entries: true,
      add_to_store: true,
      override_existing: false,
    }
  }
}

/// Which map of the store a name lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
  Input,
  Inner,
  Declared,
}

/// Layered key/value store used for all substitution during a build.
#[derive(Debug, Clone, Default)]
pub struct VarStore {
  input: BTreeMap<String, String>,
  inner: BTreeMap<String, String>,
  declared: BTreeMap<String, String>,
}

impl VarStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Full name under which an inner fact is exposed (`ROOT_DIR` -> `HPB_ROOT_DIR`).
  pub fn inner_name(name: &str) -> String {
    format!("{INNER_VAR_PREFIX}_{name}")
  }

  /// Set a derived fact. The name is exposed with the `HPB_` prefix.
  pub fn set_inner(&mut self, name: &str, value: impl Into<String>) {
    self.inner.insert(Self::inner_name(name), value.into());
  }

  /// Set a user-supplied parameter.
  pub fn set_input(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.input.insert(name.into(), value.into());
  }

  /// Set a declared variable.
  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.declared.insert(name.into(), value.into());
  }

  /// Look up a name across all layers.
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .input
      .get(name)
      .or_else(|| self.inner.get(name))
      .or_else(|| self.declared.get(name))
      .map(String::as_str)
  }

  /// The layer currently holding `name`, if any.
  pub fn layer_of(&self, name: &str) -> Option<Layer> {
    if self.input.contains_key(name) {
      Some(Layer::Input)
    } else if self.inner.contains_key(name) {
      Some(Layer::Inner)
    } else if self.declared.contains_key(name) {
      Some(Layer::Declared)
    } else {
      None
    }
  }

  pub fn contains(&self, name: &str) -> bool {
    self.layer_of(name).is_some()
  }

  /// Resolve all `${NAME}` references in `text`.
  pub fn resolve_text(&self, text: &str) -> Result<String, VarError> {
    substitute(text, self)
  }

  /// Resolve every entry in order, writing results according to `options`.
  ///
  /// Later entries see values merged by earlier ones. Returns the failures;
  /// an empty vector means every entry was fully resolved.
  pub fn resolve_all(&mut self, entries: &mut [VarEntry], options: ResolveOptions) -> Vec<VarError> {
    let mut unresolved = Vec::new();

    for entry in entries.iter_mut() {
      let value = match self.resolve_text(&entry.value) {
        Ok(v) => v,
        Err(e) => {
          unresolved.push(e);
          continue;
        }
      };

      if options.add_to_entries {
        entry.value = value.clone();
      }

      if !options.add_to_store {
        continue;
      }

      match self.layer_of(&entry.name) {
        None => self.set(entry.name.clone(), value),
        Some(_) if !options.override_existing => {}
        Some(Layer::Input) => self.set_input(entry.name.clone(), value),
        Some(Layer::Inner) => {
          self.inner.insert(entry.name.clone(), value);
        }
        Some(Layer::Declared) => self.set(entry.name.clone(), value),
      }
    }

    unresolved
  }

  /// Evaluate a scalar as a boolean.
  ///
  /// Text is resolved first, then `true`, `1` and `yes` (any case) are true.
  /// Numbers are true when non-zero; floats are truncated first.
  pub fn is_truthy(&self, value: &Scalar) -> Result<bool, VarError> {
    Ok(match value {
      Scalar::Bool(b) => *b,
      Scalar::Number(n) => match n.as_i64() {
        Some(i) => i != 0,
        None => n.as_f64().is_some_and(|x| x.trunc() != 0.0),
      },
      Scalar::Text(s) => {
        let resolved = self.resolve_text(s)?;
        matches!(resolved.trim().to_lowercase().as_str(), "true" | "1" | "yes")
      }
    })
  }
}

impl Lookup for VarStore {
  fn lookup(&self, name: &str) -> Option<&str> {
    self.get(name)
  }
}
