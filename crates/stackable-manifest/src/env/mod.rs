//! Environment variable declarations and the machinery to consolidate them.
//!
//! A [`Declaration`] describes a single environment variable (or a bulk
//! import of a whole secret or config map) contributed by one producer. Many
//! independent producers emit declarations without knowing about each other:
//! the two configuration syntaxes (see [`crate::config`]) and any number of
//! extensions. The [`DeclarationMerger`] turns that unordered collection into
//! a single, conflict-free [`Resolution`], which can then be mapped onto the
//! fields of a Kubernetes container via [`Resolution::container_env`].
//!
//! ```
//! use stackable_manifest::env::{Declaration, DeclarationMerger};
//!
//! let resolution = DeclarationMerger::new()
//!     .resolve([
//!         Declaration::var("DB_URL", "jdbc:postgresql://db/app").legacy(),
//!         Declaration::var("DB_URL", "jdbc:postgresql://db/app"),
//!         Declaration::secret("db-credentials"),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(resolution.len(), 2);
//! assert_eq!(resolution.diagnostics().len(), 1);
//! ```
use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

pub mod container;
pub mod merge;
mod name;

pub use container::ContainerEnv;
pub use merge::{Conflict, ConflictError, DeclarationMerger, Diagnostic, Resolution};
pub use name::env_var_name;

/// The textual form of [`Target::Any`].
pub const ANY_TARGET: &str = "*";

/// The category of a [`Declaration`].
///
/// The kind decides how a declaration interacts with other declarations
/// sharing its name: see [`EnvKind::allows_multiple`].
#[derive(
    Clone,
    Copy,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum EnvKind {
    /// A literal value.
    Var,

    /// A value projected from a field of the pod via the downward API.
    Field,

    /// A single key of a secret.
    KeyFromSecret,

    /// A single key of a config map.
    #[serde(rename = "keyFromConfigmap")]
    #[strum(serialize = "keyFromConfigmap")]
    KeyFromConfigMap,

    /// All keys of a secret, imported as variables.
    Secret,

    /// All keys of a config map, imported as variables.
    #[serde(rename = "configmap")]
    #[strum(serialize = "configmap")]
    ConfigMap,
}

impl EnvKind {
    /// Returns whether several declarations of this kind may share a name.
    ///
    /// Only bulk imports are additive. Every other kind defines exactly one
    /// variable, so a second declaration with the same name is either a
    /// duplicate, a supersession or a conflict.
    pub fn allows_multiple(self) -> bool {
        matches!(self, Self::Secret | Self::ConfigMap)
    }
}

/// The configuration syntax a [`Declaration`] originates from.
///
/// [`Generation::Current`] always takes precedence over
/// [`Generation::Legacy`] for the same name and kind.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Generation {
    Legacy,

    #[default]
    Current,
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum TargetError {
    #[snafu(display("deployment target cannot be empty"))]
    EmptyTarget,
}

/// The deployment target a [`Declaration`] applies to.
///
/// Parses from and displays as a plain string, where `*` denotes
/// [`Target::Any`].
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    #[default]
    Any,
    Named(String),
}

impl Target {
    /// Returns whether declarations with this target apply to `target`.
    pub fn matches(&self, target: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Named(name) => name == target,
        }
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        ensure!(!input.is_empty(), EmptyTargetSnafu);

        if input == ANY_TARGET {
            Ok(Self::Any)
        } else {
            Ok(Self::Named(input.to_owned()))
        }
    }
}

impl TryFrom<String> for Target {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(value: Target) -> Self {
        value.to_string()
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str(ANY_TARGET),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Where the value of a [`Declaration`] comes from.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnvSource {
    Value(String),
    Field {
        path: String,
    },
    SecretKey {
        secret: String,
        key: String,
    },
    ConfigMapKey {
        config_map: String,
        key: String,
    },
    Secret {
        secret: String,
        prefix: Option<String>,
    },
    ConfigMap {
        config_map: String,
        prefix: Option<String>,
    },
}

impl EnvSource {
    pub fn kind(&self) -> EnvKind {
        match self {
            Self::Value(_) => EnvKind::Var,
            Self::Field { .. } => EnvKind::Field,
            Self::SecretKey { .. } => EnvKind::KeyFromSecret,
            Self::ConfigMapKey { .. } => EnvKind::KeyFromConfigMap,
            Self::Secret { .. } => EnvKind::Secret,
            Self::ConfigMap { .. } => EnvKind::ConfigMap,
        }
    }
}

impl Display for EnvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.write_str(value),
            Self::Field { path } => f.write_str(path),
            Self::SecretKey { secret: name, key }
            | Self::ConfigMapKey {
                config_map: name,
                key,
            } => write!(f, "{name}/{key}"),
            Self::Secret {
                secret: name,
                prefix,
            }
            | Self::ConfigMap {
                config_map: name,
                prefix,
            } => match prefix {
                Some(prefix) => write!(f, "{name} (prefix {prefix})"),
                None => f.write_str(name),
            },
        }
    }
}

/// A single, immutable environment variable declaration.
///
/// Declarations are constructed once per contributed variable and consumed
/// by the [`DeclarationMerger`]. Use the named constructors and the consuming
/// `with_*` functions to build one:
///
/// ```
/// use stackable_manifest::env::{Declaration, EnvKind, Generation, Target};
///
/// let declaration = Declaration::key_from_secret("DB_PASSWORD", "db-credentials", "password")
///     .legacy()
///     .with_target(Target::Named("openshift".to_owned()));
///
/// assert_eq!(declaration.kind(), EnvKind::KeyFromSecret);
/// assert_eq!(declaration.generation(), Generation::Legacy);
/// assert_eq!(declaration.value(), "db-credentials/password");
/// ```
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Declaration {
    name: String,
    source: EnvSource,
    generation: Generation,
    target: Target,
}

impl Declaration {
    /// Creates a [`Generation::Current`] declaration applying to any target.
    pub fn new(name: impl Into<String>, source: EnvSource) -> Self {
        Self {
            name: name.into(),
            source,
            generation: Generation::default(),
            target: Target::default(),
        }
    }

    pub fn var(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, EnvSource::Value(value.into()))
    }

    pub fn field(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, EnvSource::Field { path: path.into() })
    }

    pub fn key_from_secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            EnvSource::SecretKey {
                secret: secret.into(),
                key: key.into(),
            },
        )
    }

    pub fn key_from_config_map(
        name: impl Into<String>,
        config_map: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            EnvSource::ConfigMapKey {
                config_map: config_map.into(),
                key: key.into(),
            },
        )
    }

    /// Imports all keys of the secret. The declaration is named after the
    /// secret.
    pub fn secret(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self::new(secret.clone(), EnvSource::Secret {
            secret,
            prefix: None,
        })
    }

    /// Imports all keys of the config map. The declaration is named after the
    /// config map.
    pub fn config_map(config_map: impl Into<String>) -> Self {
        let config_map = config_map.into();
        Self::new(config_map.clone(), EnvSource::ConfigMap {
            config_map,
            prefix: None,
        })
    }

    pub fn with_generation(self, generation: Generation) -> Self {
        Self { generation, ..self }
    }

    /// Shorthand for `with_generation(Generation::Legacy)`.
    pub fn legacy(self) -> Self {
        self.with_generation(Generation::Legacy)
    }

    pub fn with_target(self, target: Target) -> Self {
        Self { target, ..self }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EnvKind {
        self.source.kind()
    }

    pub fn source(&self) -> &EnvSource {
        &self.source
    }

    /// The payload rendered as a string: the literal value, the field path or
    /// the referenced object (as `object/key` for keyed references).
    pub fn value(&self) -> String {
        self.source.to_string()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn allows_multiple(&self) -> bool {
        self.kind().allows_multiple()
    }

    /// Returns whether `self` and `other` describe the same thing, regardless
    /// of the target they were contributed for.
    pub(crate) fn is_equivalent(&self, other: &Self) -> bool {
        self.name == other.name
            && self.source == other.source
            && self.generation == other.generation
    }
}

impl Display for Declaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{kind} {name:?} = {value:?} ({generation}, target {target})",
            kind = self.kind(),
            name = self.name,
            value = self.value(),
            generation = self.generation,
            target = self.target,
        )
    }
}
