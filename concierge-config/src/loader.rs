//! Configuration loading, override application, and environment-variable
//! mapping (spec §6, `SPEC_FULL.md` §13).

use std::path::Path;

use concierge_core::error::{ConciergeError, Result};
use tracing::info;

use crate::model::{ConciergeConfig, ConfigOverrides};
use crate::presets;

/// Preset wins over an explicit file path wins over a default
/// `./concierge.yaml` wins over the built-in `dev` preset.
pub fn load_config(config_file: &str, preset: &str, overrides: Option<ConfigOverrides>) -> Result<ConciergeConfig> {
    let mut config = if !preset.is_empty() {
        info!(preset, "loading preset");
        presets::get_preset(preset)?
    } else if !config_file.is_empty() {
        load_from_file(Path::new(config_file))?
    } else {
        let default_path = Path::new("concierge.yaml");
        if default_path.exists() {
            load_from_file(default_path)?
        } else {
            info!("no config file found, using 'dev' preset");
            presets::get_preset("dev")?
        }
    };

    if let Some(overrides) = overrides {
        apply_overrides(&mut config, &overrides);
        config.overrides = overrides;
    }

    Ok(config)
}

fn load_from_file(path: &Path) -> Result<ConciergeConfig> {
    if !path.exists() {
        return Err(ConciergeError::FileNotFound(format!("configuration file not found: {}", path.display())));
    }

    info!(path = %path.display(), "loading configuration file");

    let raw = std::fs::read_to_string(path)?;
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(&raw)?;

    let value = match value {
        serde_yaml_ng::Value::Null => serde_yaml_ng::Value::Mapping(Default::default()),
        mapping @ serde_yaml_ng::Value::Mapping(_) => mapping,
        _ => return Err(ConciergeError::ConfigurationInvalid("configuration file must contain a YAML mapping".to_string())),
    };

    serde_yaml_ng::from_value(value).map_err(ConciergeError::Yaml)
}

/// Applies `spec.md` §6's merge rule to the scalar provider/controller
/// fields: truthy overrides falsey. `extra_snaps`/`extra_debs` and the
/// charmcraft/snapcraft/rockcraft channel overrides are deliberately left
/// untouched here — `Plan::new` (spec §4.7, item 1) is the sole place
/// that folds those into the host snap/package set, so that a snap or
/// package named by an override is represented exactly once in the plan.
pub fn apply_overrides(config: &mut ConciergeConfig, overrides: &ConfigOverrides) {
    if overrides.controller_disabled {
        config.controller.disabled = true;
    }
    if !overrides.controller_channel.is_empty() {
        config.controller.channel = overrides.controller_channel.clone();
    }

    if !overrides.local_container_channel.is_empty() {
        config.providers.local_container.channel = overrides.local_container_channel.clone();
    }
    if !overrides.kube_micro_channel.is_empty() {
        config.providers.kube_micro.channel = overrides.kube_micro_channel.clone();
    }
    if !overrides.kube_canonical_channel.is_empty() {
        config.providers.kube_canonical.channel = overrides.kube_canonical_channel.clone();
    }
    if !overrides.public_cloud_credential_file.is_empty() {
        config.providers.public_cloud.credentials_file = overrides.public_cloud_credential_file.clone();
    }
}

/// Reads `CONCIERGE_*` overrides from the environment (spec §6
/// "Environment variables").
pub fn get_env_overrides() -> ConfigOverrides {
    fn get_bool(key: &str) -> bool {
        std::env::var(format!("CONCIERGE_{}", key.to_uppercase()))
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
    fn get_str(key: &str) -> String {
        std::env::var(format!("CONCIERGE_{}", key.to_uppercase())).unwrap_or_default()
    }
    fn get_list(key: &str) -> Vec<String> {
        get_str(key).split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    }

    ConfigOverrides {
        controller_disabled: get_bool("controller_disabled"),
        controller_channel: get_str("controller_channel"),
        kube_canonical_channel: get_str("kube_canonical_channel"),
        kube_micro_channel: get_str("kube_micro_channel"),
        local_container_channel: get_str("local_container_channel"),
        charmcraft_channel: get_str("charmcraft_channel"),
        snapcraft_channel: get_str("snapcraft_channel"),
        rockcraft_channel: get_str("rockcraft_channel"),
        public_cloud_credential_file: get_str("public_cloud_credential_file"),
        extra_snaps: get_list("extra_snaps"),
        extra_debs: get_list("extra_debs"),
    }
}

/// Merges CLI-sourced overrides with environment-sourced ones: scalars
/// follow "CLI wins if truthy, else environment"; lists concatenate
/// CLI-then-environment (spec §6 merge rule).
pub fn merge_overrides(cli: ConfigOverrides, env: ConfigOverrides) -> ConfigOverrides {
    ConfigOverrides {
        controller_disabled: cli.controller_disabled || env.controller_disabled,
        controller_channel: pick(cli.controller_channel, env.controller_channel),
        kube_canonical_channel: pick(cli.kube_canonical_channel, env.kube_canonical_channel),
        kube_micro_channel: pick(cli.kube_micro_channel, env.kube_micro_channel),
        local_container_channel: pick(cli.local_container_channel, env.local_container_channel),
        charmcraft_channel: pick(cli.charmcraft_channel, env.charmcraft_channel),
        snapcraft_channel: pick(cli.snapcraft_channel, env.snapcraft_channel),
        rockcraft_channel: pick(cli.rockcraft_channel, env.rockcraft_channel),
        public_cloud_credential_file: pick(cli.public_cloud_credential_file, env.public_cloud_credential_file),
        extra_snaps: cli.extra_snaps.into_iter().chain(env.extra_snaps).collect(),
        extra_debs: cli.extra_debs.into_iter().chain(env.extra_debs).collect(),
    }
}

fn pick(cli: String, env: String) -> String {
    if !cli.is_empty() {
        cli
    } else {
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_becomes_empty_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concierge.yaml");
        std::fs::write(&path, "").unwrap();
        let config = load_from_file(&path).unwrap();
        assert_eq!(config.host.packages, Vec::<String>::new());
    }

    #[test]
    fn controller_channel_override_wins_over_config_value() {
        let mut config = ConciergeConfig::default();
        config.controller.channel = "stable".to_string();
        let overrides = ConfigOverrides { controller_channel: "latest/edge".to_string(), ..Default::default() };
        apply_overrides(&mut config, &overrides);
        assert_eq!(config.controller.channel, "latest/edge");
    }

    #[test]
    fn falsey_overrides_leave_config_value_untouched() {
        let mut config = ConciergeConfig::default();
        config.controller.channel = "stable".to_string();
        apply_overrides(&mut config, &ConfigOverrides::default());
        assert_eq!(config.controller.channel, "stable");
    }

    #[test]
    fn env_bool_truthy_values() {
        std::env::set_var("CONCIERGE_CONTROLLER_DISABLED", "Yes");
        assert!(get_env_overrides().controller_disabled);
        std::env::remove_var("CONCIERGE_CONTROLLER_DISABLED");
    }
}
