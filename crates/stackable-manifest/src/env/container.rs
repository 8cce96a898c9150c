//! Maps resolved declarations onto the environment fields of a container.
use k8s_openapi::api::core::v1::{
    ConfigMapEnvSource, ConfigMapKeySelector, Container, EnvFromSource, EnvVar, EnvVarSource,
    ObjectFieldSelector, SecretEnvSource, SecretKeySelector,
};

use crate::env::{Declaration, EnvSource, Resolution};

/// The `env` and `envFrom` entries derived from a [`Resolution`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerEnv {
    pub env: Vec<EnvVar>,
    pub env_from: Vec<EnvFromSource>,
}

impl ContainerEnv {
    /// Applies the entries to `container`.
    ///
    /// Existing variables with the same name are replaced, bulk imports are
    /// appended.
    pub fn apply_to(self, container: &mut Container) {
        let env = container.env.get_or_insert_with(Vec::new);
        env.retain(|existing| !self.env.iter().any(|env_var| env_var.name == existing.name));
        env.extend(self.env);

        if !self.env_from.is_empty() {
            container
                .env_from
                .get_or_insert_with(Vec::new)
                .extend(self.env_from);
        }
    }
}

impl Resolution {
    /// Maps the resolved declarations onto container fields.
    ///
    /// The entries are ordered by name, so the output is stable across runs.
    pub fn container_env(&self) -> ContainerEnv {
        let mut container_env = ContainerEnv::default();

        for declaration in self {
            match env_from_source(declaration) {
                Some(env_from) => container_env.env_from.push(env_from),
                None => container_env.env.push(env_var(declaration)),
            }
        }

        container_env
    }
}

fn env_var(declaration: &Declaration) -> EnvVar {
    let name = declaration.name().to_owned();

    let value_from = match declaration.source() {
        EnvSource::Value(value) => {
            return EnvVar {
                name,
                value: Some(value.clone()),
                ..EnvVar::default()
            };
        }
        EnvSource::Field { path } => EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: path.clone(),
                ..ObjectFieldSelector::default()
            }),
            ..EnvVarSource::default()
        },
        EnvSource::SecretKey { secret, key } => EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.clone(),
                key: key.clone(),
                ..SecretKeySelector::default()
            }),
            ..EnvVarSource::default()
        },
        EnvSource::ConfigMapKey { config_map, key } => EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: config_map.clone(),
                key: key.clone(),
                ..ConfigMapKeySelector::default()
            }),
            ..EnvVarSource::default()
        },
        EnvSource::Secret { .. } | EnvSource::ConfigMap { .. } => EnvVarSource::default(),
    };

    EnvVar {
        name,
        value_from: Some(value_from),
        ..EnvVar::default()
    }
}

fn env_from_source(declaration: &Declaration) -> Option<EnvFromSource> {
    match declaration.source() {
        EnvSource::Secret { secret, prefix } => Some(EnvFromSource {
            prefix: prefix.clone(),
            secret_ref: Some(SecretEnvSource {
                name: secret.clone(),
                ..SecretEnvSource::default()
            }),
            ..EnvFromSource::default()
        }),
        EnvSource::ConfigMap { config_map, prefix } => Some(EnvFromSource {
            prefix: prefix.clone(),
            config_map_ref: Some(ConfigMapEnvSource {
                name: config_map.clone(),
                ..ConfigMapEnvSource::default()
            }),
            ..EnvFromSource::default()
        }),
        _ => None,
    }
}
