//! The two configuration syntaxes environment variables can be declared in.
//!
//! Both syntaxes are producers of [`Declaration`]s: [`LegacyEnvVar`] entries
//! produce [`Generation::Legacy`] declarations, [`EnvConfig`] produces
//! [`Generation::Current`] ones. Neither knows about the other (or about
//! contributions from extensions), reconciling them is the job of the
//! [`DeclarationMerger`](crate::env::DeclarationMerger).
//!
//! ```yaml
//! envVars:
//!   db-url:
//!     value: jdbc:postgresql://db/app
//! env:
//!   vars:
//!     db.url: jdbc:postgresql://db/app
//!   secrets:
//!     - db-credentials
//!   mapping:
//!     db.password:
//!       fromSecret: db-credentials
//!       withKey: password
//! ```
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    env::{Declaration, EnvSource, Generation, Target, env_var_name},
    validation,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("environment variable {key:?} converts to invalid name {name:?}"))]
    InvalidEnvVarName {
        source: validation::Errors,
        key: String,
        name: String,
    },

    #[snafu(display("invalid name {name:?} for a referenced secret or config map"))]
    InvalidObjectName {
        source: validation::Errors,
        name: String,
    },

    #[snafu(display("invalid key {key:?} referenced by environment variable {name:?}"))]
    InvalidKey {
        source: validation::Errors,
        name: String,
        key: String,
    },

    #[snafu(display(
        "legacy environment variable {key:?} neither sets a value, a field, a secret nor a config map"
    ))]
    EmptyLegacyEntry { key: String },

    #[snafu(display("legacy environment variable {key:?} sets more than one source"))]
    AmbiguousLegacyEntry { key: String },

    #[snafu(display(
        "mapping for environment variable {name:?} must reference exactly one secret or config map"
    ))]
    InvalidMapping { name: String },
}

/// An environment variable in the legacy per-name syntax.
///
/// The combination of fields that are set decides the kind of the resulting
/// declaration:
///
/// | set fields            | kind               |
/// |-----------------------|--------------------|
/// | `field`               | `field`            |
/// | `secret` + `value`    | `keyFromSecret`    |
/// | `configmap` + `value` | `keyFromConfigmap` |
/// | `value`               | `var`              |
/// | `secret`              | `secret`           |
/// | `configmap`           | `configmap`        |
///
/// In combination with `secret` or `configmap`, `value` names the key. An
/// entry setting only `secret` and `configmap` imports both. Any other
/// combination, like `field` with anything else, is rejected.
///
/// Bulk imports are named after the imported object, the key of the entry
/// (and `name`) only names single variables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEnvVar {
    /// Overrides the name given by the key of the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configmap: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Imports a whole secret or config map with a prefix added to every
/// variable name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixedImport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_configmap: Option<String>,
}

/// A variable taking its value from one key of a secret or config map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_configmap: Option<String>,

    pub with_key: String,
}

/// Environment variables in the current, structured syntax.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvConfig {
    /// Literal values by variable name.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Downward API field paths by variable name.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Secrets to import all keys of.
    #[serde(default)]
    pub secrets: Vec<String>,

    /// Config maps to import all keys of.
    #[serde(default)]
    pub configmaps: Vec<String>,

    /// Keyed references by variable name.
    #[serde(default)]
    pub mapping: BTreeMap<String, KeyMapping>,

    /// Prefixed imports by prefix.
    #[serde(default)]
    pub using_prefix: BTreeMap<String, PrefixedImport>,
}

/// The environment section of an application's configuration, holding both
/// syntaxes side by side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEnv {
    #[serde(default)]
    pub env_vars: BTreeMap<String, LegacyEnvVar>,

    #[serde(default)]
    pub env: EnvConfig,
}

impl ApplicationEnv {
    /// Converts both syntaxes into declarations for `target`, legacy first.
    pub fn declarations(&self, target: &Target) -> Result<Vec<Declaration>> {
        let mut declarations = legacy_declarations(&self.env_vars, target)?;
        declarations.extend(self.env.declarations(target)?);
        Ok(declarations)
    }
}

/// Converts legacy entries into [`Generation::Legacy`] declarations.
pub fn legacy_declarations(
    env_vars: &BTreeMap<String, LegacyEnvVar>,
    target: &Target,
) -> Result<Vec<Declaration>> {
    let mut declarations = Vec::new();

    for (key, env_var) in env_vars {
        let raw_name = env_var.name.as_deref().unwrap_or(key);

        let LegacyEnvVar {
            field,
            value,
            secret,
            configmap,
            ..
        } = env_var;
        let sources = match (field, value, secret, configmap) {
            (None, None, None, None) => return EmptyLegacyEntrySnafu { key }.fail(),
            (Some(path), None, None, None) => {
                vec![(raw_name, EnvSource::Field { path: path.clone() })]
            }
            (Some(_), ..) | (None, Some(_), Some(_), Some(_)) => {
                return AmbiguousLegacyEntrySnafu { key }.fail();
            }
            (None, Some(value), Some(secret), None) => {
                vec![(raw_name, secret_key(raw_name, secret, value)?)]
            }
            (None, Some(value), None, Some(config_map)) => {
                vec![(raw_name, config_map_key(raw_name, config_map, value)?)]
            }
            (None, Some(value), None, None) => vec![(raw_name, EnvSource::Value(value.clone()))],
            (None, None, secret, config_map) => {
                let mut sources = Vec::new();
                if let Some(secret) = secret {
                    sources.push((secret.as_str(), secret_import(secret, None)?));
                }
                if let Some(config_map) = config_map {
                    sources.push((config_map.as_str(), config_map_import(config_map, None)?));
                }
                sources
            }
        };

        for (name, source) in sources {
            declarations.push(declaration(name, source, Generation::Legacy, target)?);
        }
    }

    Ok(declarations)
}

impl EnvConfig {
    /// Converts the configuration into [`Generation::Current`] declarations.
    pub fn declarations(&self, target: &Target) -> Result<Vec<Declaration>> {
        let mut sources = Vec::new();

        for (name, value) in &self.vars {
            sources.push((name.as_str(), EnvSource::Value(value.clone())));
        }

        for (name, path) in &self.fields {
            sources.push((name.as_str(), EnvSource::Field { path: path.clone() }));
        }

        for secret in &self.secrets {
            sources.push((secret.as_str(), secret_import(secret, None)?));
        }

        for config_map in &self.configmaps {
            sources.push((config_map.as_str(), config_map_import(config_map, None)?));
        }

        for (name, mapping) in &self.mapping {
            let source = match (&mapping.from_secret, &mapping.from_configmap) {
                (Some(secret), None) => secret_key(name, secret, &mapping.with_key)?,
                (None, Some(config_map)) => config_map_key(name, config_map, &mapping.with_key)?,
                _ => return InvalidMappingSnafu { name }.fail(),
            };
            sources.push((name.as_str(), source));
        }

        for (prefix, import) in &self.using_prefix {
            if let Some(secret) = &import.for_secret {
                sources.push((secret.as_str(), secret_import(secret, Some(prefix))?));
            }
            if let Some(config_map) = &import.for_configmap {
                sources.push((config_map.as_str(), config_map_import(config_map, Some(prefix))?));
            }
        }

        sources
            .into_iter()
            .map(|(name, source)| declaration(name, source, Generation::Current, target))
            .collect()
    }
}

/// Builds the declaration, normalising the name of single-definition kinds.
fn declaration(
    raw_name: &str,
    source: EnvSource,
    generation: Generation,
    target: &Target,
) -> Result<Declaration> {
    let name = if source.kind().allows_multiple() {
        raw_name.to_owned()
    } else {
        let name = env_var_name(raw_name);
        validation::is_env_var_name(&name).context(InvalidEnvVarNameSnafu {
            key: raw_name,
            name: &name,
        })?;
        name
    };

    Ok(Declaration::new(name, source)
        .with_generation(generation)
        .with_target(target.clone()))
}

fn secret_key(name: &str, secret: &str, key: &str) -> Result<EnvSource> {
    validation::is_rfc_1123_subdomain(secret).context(InvalidObjectNameSnafu { name: secret })?;
    validation::is_config_map_key(key).context(InvalidKeySnafu { name, key })?;

    Ok(EnvSource::SecretKey {
        secret: secret.to_owned(),
        key: key.to_owned(),
    })
}

fn config_map_key(name: &str, config_map: &str, key: &str) -> Result<EnvSource> {
    validation::is_rfc_1123_subdomain(config_map)
        .context(InvalidObjectNameSnafu { name: config_map })?;
    validation::is_config_map_key(key).context(InvalidKeySnafu { name, key })?;

    Ok(EnvSource::ConfigMapKey {
        config_map: config_map.to_owned(),
        key: key.to_owned(),
    })
}

fn secret_import(secret: &str, prefix: Option<&str>) -> Result<EnvSource> {
    validation::is_rfc_1123_subdomain(secret).context(InvalidObjectNameSnafu { name: secret })?;

    Ok(EnvSource::Secret {
        secret: secret.to_owned(),
        prefix: prefix.map(ToOwned::to_owned),
    })
}

fn config_map_import(config_map: &str, prefix: Option<&str>) -> Result<EnvSource> {
    validation::is_rfc_1123_subdomain(config_map)
        .context(InvalidObjectNameSnafu { name: config_map })?;

    Ok(EnvSource::ConfigMap {
        config_map: config_map.to_owned(),
        prefix: prefix.map(ToOwned::to_owned),
    })
}
