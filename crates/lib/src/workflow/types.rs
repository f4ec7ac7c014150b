//! Typed shape of a workflow document.
//!
//! ```yaml
//! variables:
//!   - PREFIX: /opt/foo
//!   - CC:
//!       linux: gcc
//!       windows: cl
//!       default: cc
//! source:
//!   maintainer: google
//!   name: googletest
//!   tag: v1.13.0
//!   repo_kind: git
//!   repo_url: https://github.com/google/googletest.git
//! build:
//!   build_type: ${BUILD_TYPE}
//! deps:
//!   - maintainer: madler
//!     name: zlib
//!     tag: v1.3.0
//! jobs:
//!   build:
//!     steps:
//!       - name: configure
//!         run: cmake -S ${HPB_SOURCE_PATH} -B ${HPB_BUILD_DIR}
//!   package:
//!     needs: [build]
//!     steps:
//!       - run: cmake --install ${HPB_BUILD_DIR} --prefix ${HPB_OUTPUT_DIR}
//! ```
//!
//! Job and variable declaration order is preserved.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::vars::Scalar;

/// Key under which a platform-conditional value names its fallback.
pub const DEFAULT_PLATFORM_KEY: &str = "default";

/// A mapping that keeps its keys in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered<V>(pub Vec<(String, V)>);

impl<V> Default for Ordered<V> {
  fn default() -> Self {
    Self(Vec::new())
  }
}

impl<V> Ordered<V> {
  pub fn get(&self, key: &str) -> Option<&V> {
    self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(|(k, _)| k.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<V> FromIterator<(String, V)> for Ordered<V> {
  fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Ordered<V> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
      type Value = Ordered<V>;

      fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping")
      }

      fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Ordered::default())
      }

      fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries: Vec<(String, V)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, V>()? {
          if entries.iter().any(|(k, _)| *k == key) {
            return Err(de::Error::custom(format!("duplicate key '{key}'")));
          }
          entries.push((key, value));
        }
        Ok(Ordered(entries))
      }
    }

    deserializer.deserialize_any(OrderedVisitor(PhantomData))
  }
}

/// A variable value, possibly chosen by platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
  Scalar(Scalar),
  /// Keyed by system name (`linux`, `darwin`, `windows`) or `default`.
  PerPlatform(BTreeMap<String, Option<Scalar>>),
}

impl VarValue {
  /// Text of this value on `system`: the system's entry, else `default`, else empty.
  pub fn for_system(&self, system: &str) -> String {
    match self {
      VarValue::Scalar(s) => s.to_string(),
      VarValue::PerPlatform(map) => map
        .get(system)
        .or_else(|| map.get(DEFAULT_PLATFORM_KEY))
        .and_then(|v| v.as_ref())
        .map(Scalar::to_string)
        .unwrap_or_default(),
    }
  }
}

/// One declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
  pub name: String,
  pub value: Option<VarValue>,
}

fn deserialize_variables<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Variable>, D::Error> {
  let items: Option<Vec<Ordered<Option<VarValue>>>> = Option::deserialize(deserializer)?;
  Ok(
    items
      .unwrap_or_default()
      .into_iter()
      .flat_map(|item| item.0)
      .map(|(name, value)| Variable { name, value })
      .collect(),
  )
}

/// One command step of a job.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Step {
  pub name: String,
  /// Commands separated by `;` or newlines.
  pub run: String,
  /// Skip condition, evaluated as a boolean.
  pub ignore: Option<Scalar>,
}

/// A named group of steps.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Job {
  pub steps: Vec<Step>,
  /// Jobs that must complete before this one.
  pub needs: Vec<String>,
}

/// Jobs in declaration order.
pub type Jobs = Ordered<Job>;

/// Read any scalar as text, so `tag: 1.0` is accepted unquoted.
fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  Ok(Scalar::deserialize(deserializer)?.to_string())
}

/// Declared dependency reference. Values may contain `${NAME}` references.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DepSpec {
  #[serde(deserialize_with = "scalar_text")]
  pub maintainer: String,
  #[serde(deserialize_with = "scalar_text")]
  pub name: String,
  #[serde(deserialize_with = "scalar_text")]
  pub tag: String,
}

/// A parsed workflow document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Workflow {
  #[serde(deserialize_with = "deserialize_variables")]
  pub variables: Vec<Variable>,
  pub source: Ordered<Scalar>,
  pub build: Ordered<Scalar>,
  pub deps: Vec<DepSpec>,
  pub test_deps: Vec<DepSpec>,
  pub jobs: Jobs,
}

impl Workflow {
  /// Declared variables with platform-conditional values chosen for `system`.
  pub fn variables_for(&self, system: &str) -> Vec<(String, String)> {
    self
      .variables
      .iter()
      .map(|v| {
        let value = v.value.as_ref().map(|v| v.for_system(system)).unwrap_or_default();
        (v.name.clone(), value)
      })
      .collect()
  }
}
