//! The Configuration data model (spec §3), including the hyphenated/
//! underscored key aliasing and schema normalization rules of spec §6.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ControllerConfig {
    pub disabled: bool,
    pub channel: String,
    #[serde(rename = "agent-version", alias = "agent_version")]
    pub agent_version: String,
    #[serde(rename = "model-defaults", alias = "model_defaults")]
    pub model_defaults: IndexMap<String, String>,
    #[serde(rename = "bootstrap-constraints", alias = "bootstrap_constraints")]
    pub bootstrap_constraints: IndexMap<String, String>,
    #[serde(rename = "extra-bootstrap-args", alias = "extra_bootstrap_args")]
    pub extra_bootstrap_args: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LocalContainerConfig {
    pub enabled: bool,
    pub bootstrap: bool,
    pub channel: String,
    #[serde(rename = "model-defaults", alias = "model_defaults")]
    pub model_defaults: IndexMap<String, String>,
    #[serde(rename = "bootstrap-constraints", alias = "bootstrap_constraints")]
    pub bootstrap_constraints: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PublicCloudConfig {
    pub enabled: bool,
    pub bootstrap: bool,
    #[serde(rename = "credentials-file", alias = "credentials_file")]
    pub credentials_file: String,
    #[serde(rename = "model-defaults", alias = "model_defaults")]
    pub model_defaults: IndexMap<String, String>,
    #[serde(rename = "bootstrap-constraints", alias = "bootstrap_constraints")]
    pub bootstrap_constraints: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct KubeMicroConfig {
    pub enabled: bool,
    pub bootstrap: bool,
    pub channel: String,
    pub addons: Vec<String>,
    #[serde(rename = "model-defaults", alias = "model_defaults")]
    pub model_defaults: IndexMap<String, String>,
    #[serde(rename = "bootstrap-constraints", alias = "bootstrap_constraints")]
    pub bootstrap_constraints: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct KubeCanonicalConfig {
    pub enabled: bool,
    pub bootstrap: bool,
    pub channel: String,
    #[serde(deserialize_with = "deserialize_features")]
    pub features: IndexMap<String, IndexMap<String, String>>,
    #[serde(rename = "model-defaults", alias = "model_defaults")]
    pub model_defaults: IndexMap<String, String>,
    #[serde(rename = "bootstrap-constraints", alias = "bootstrap_constraints")]
    pub bootstrap_constraints: IndexMap<String, String>,
}

/// Normalizes the kube-canonical feature map (spec §6 "Schema
/// normalization"): a null inner map becomes empty, and boolean leaf
/// scalars are lowercased to their string form.
fn deserialize_features<'de, D>(deserializer: D) -> Result<IndexMap<String, IndexMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawLeaf {
        Bool(bool),
        Str(String),
        Other(serde_yaml_ng::Value),
    }

    let raw: Option<IndexMap<String, Option<IndexMap<String, RawLeaf>>>> = Option::deserialize(deserializer)?;

    let mut normalized = IndexMap::new();
    for (feature_name, feature_config) in raw.unwrap_or_default() {
        let inner = match feature_config {
            None => IndexMap::new(),
            Some(map) => map
                .into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        RawLeaf::Bool(b) => b.to_string(),
                        RawLeaf::Str(s) => s,
                        RawLeaf::Other(v) => serde_yaml_ng::to_string(&v).unwrap_or_default().trim().to_string(),
                    };
                    (k, value)
                })
                .collect(),
        };
        normalized.insert(feature_name, inner);
    }

    Ok(normalized)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub local_container: LocalContainerConfig,
    pub kube_canonical: KubeCanonicalConfig,
    pub kube_micro: KubeMicroConfig,
    pub public_cloud: PublicCloudConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapConfig {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct HostConfig {
    pub packages: Vec<String>,
    #[serde(deserialize_with = "deserialize_snaps")]
    pub snaps: IndexMap<String, SnapConfig>,
}

/// A null-valued snap entry is accepted and becomes the default snap
/// descriptor (spec §6 "Schema normalization").
fn deserialize_snaps<'de, D>(deserializer: D) -> Result<IndexMap<String, SnapConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, Option<SnapConfig>>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default().into_iter().map(|(k, v)| (k, v.unwrap_or_default())).collect())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ConfigOverrides {
    pub controller_disabled: bool,
    pub controller_channel: String,
    pub kube_canonical_channel: String,
    pub kube_micro_channel: String,
    pub local_container_channel: String,
    pub charmcraft_channel: String,
    pub snapcraft_channel: String,
    pub rockcraft_channel: String,
    pub public_cloud_credential_file: String,
    pub extra_snaps: Vec<String>,
    pub extra_debs: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Provisioning,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ConciergeConfig {
    pub controller: ControllerConfig,
    pub providers: ProvidersConfig,
    pub host: HostConfig,

    #[serde(skip)]
    pub overrides: ConfigOverrides,
    #[serde(default)]
    pub status: Status,
    #[serde(skip)]
    pub trace: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hyphenated_and_underscored_controller_keys() {
        let hyphenated: ControllerConfig = serde_yaml_ng::from_str("agent-version: '3.1'").unwrap();
        assert_eq!(hyphenated.agent_version, "3.1");

        let underscored: ControllerConfig = serde_yaml_ng::from_str("agent_version: '3.2'").unwrap();
        assert_eq!(underscored.agent_version, "3.2");
    }

    #[test]
    fn null_snap_entry_becomes_default_descriptor() {
        let host: HostConfig = serde_yaml_ng::from_str("snaps:\n  charmcraft:\n").unwrap();
        assert_eq!(host.snaps.get("charmcraft"), Some(&SnapConfig::default()));
    }

    #[test]
    fn feature_map_lowercases_bools_and_nullifies_missing() {
        let cfg: KubeCanonicalConfig = serde_yaml_ng::from_str(
            "features:\n  dns:\n  metrics-server:\n    enabled: true\n",
        )
        .unwrap();
        assert_eq!(cfg.features.get("dns"), Some(&IndexMap::new()));
        assert_eq!(cfg.features.get("metrics-server").unwrap().get("enabled"), Some(&"true".to_string()));
    }
}
