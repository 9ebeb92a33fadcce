//! Built-in configuration presets. `spec.md` §1 explicitly descopes "the
//! preset catalog" as an external collaborator; this carries just enough
//! of it (`machine`, `k8s`, `dev`) for the crate to be usable standalone
//! and to back the end-to-end scenarios in spec §8, in place of the
//! original's larger five-preset catalog.

use concierge_core::error::{ConciergeError, Result};
use indexmap::IndexMap;

use crate::model::{
    ConciergeConfig, ControllerConfig, HostConfig, KubeCanonicalConfig, LocalContainerConfig, ProvidersConfig, SnapConfig,
};

fn default_controller() -> ControllerConfig {
    ControllerConfig {
        model_defaults: IndexMap::from([
            ("test-mode".to_string(), "true".to_string()),
            ("automatically-retry-hooks".to_string(), "false".to_string()),
        ]),
        ..Default::default()
    }
}

fn default_packages() -> Vec<String> {
    vec!["python3-pip".to_string(), "python3-venv".to_string()]
}

fn default_snaps() -> IndexMap<String, SnapConfig> {
    IndexMap::from([
        ("charmcraft".to_string(), SnapConfig { channel: "latest/stable".to_string(), connections: vec![] }),
        ("jq".to_string(), SnapConfig { channel: "latest/stable".to_string(), connections: vec![] }),
        ("yq".to_string(), SnapConfig { channel: "latest/stable".to_string(), connections: vec![] }),
    ])
}

fn default_local_container() -> LocalContainerConfig {
    LocalContainerConfig { enabled: true, bootstrap: true, ..Default::default() }
}

fn default_kube_canonical() -> KubeCanonicalConfig {
    KubeCanonicalConfig {
        enabled: true,
        bootstrap: true,
        bootstrap_constraints: IndexMap::from([("root-disk".to_string(), "2G".to_string())]),
        features: IndexMap::from([
            (
                "load-balancer".to_string(),
                IndexMap::from([
                    ("l2-mode".to_string(), "true".to_string()),
                    ("cidrs".to_string(), "10.43.45.0/28".to_string()),
                ]),
            ),
            ("local-storage".to_string(), IndexMap::new()),
            ("network".to_string(), IndexMap::new()),
        ]),
        ..Default::default()
    }
}

fn machine_preset() -> ConciergeConfig {
    let mut snaps = default_snaps();
    snaps.insert("snapcraft".to_string(), SnapConfig { channel: "latest/stable".to_string(), connections: vec![] });

    ConciergeConfig {
        controller: default_controller(),
        providers: ProvidersConfig { local_container: default_local_container(), ..Default::default() },
        host: HostConfig { packages: default_packages(), snaps },
        ..Default::default()
    }
}

fn k8s_preset() -> ConciergeConfig {
    let mut snaps = default_snaps();
    snaps.insert("rockcraft".to_string(), SnapConfig { channel: "latest/stable".to_string(), connections: vec![] });

    ConciergeConfig {
        controller: default_controller(),
        providers: ProvidersConfig {
            local_container: LocalContainerConfig { enabled: true, ..Default::default() },
            kube_canonical: default_kube_canonical(),
            ..Default::default()
        },
        host: HostConfig { packages: default_packages(), snaps },
        ..Default::default()
    }
}

fn dev_preset() -> ConciergeConfig {
    let mut snaps = default_snaps();
    snaps.insert("rockcraft".to_string(), SnapConfig { channel: "latest/stable".to_string(), connections: vec![] });
    snaps.insert("snapcraft".to_string(), SnapConfig { channel: "latest/stable".to_string(), connections: vec![] });
    snaps.insert(
        "jhack".to_string(),
        SnapConfig { channel: "latest/stable".to_string(), connections: vec!["jhack:dot-local-share-juju".to_string()] },
    );

    ConciergeConfig {
        controller: default_controller(),
        providers: ProvidersConfig {
            local_container: default_local_container(),
            kube_canonical: default_kube_canonical(),
            ..Default::default()
        },
        host: HostConfig { packages: default_packages(), snaps },
        ..Default::default()
    }
}

pub fn get_preset(name: &str) -> Result<ConciergeConfig> {
    match name {
        "machine" => Ok(machine_preset()),
        "k8s" => Ok(k8s_preset()),
        "dev" => Ok(dev_preset()),
        other => Err(ConciergeError::ConfigurationInvalid(format!(
            "unknown preset '{other}'. Available presets: machine, k8s, dev"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_preset_enables_local_container_and_kube_canonical() {
        let cfg = get_preset("dev").unwrap();
        assert!(cfg.providers.local_container.enabled);
        assert!(cfg.providers.kube_canonical.enabled);
    }

    #[test]
    fn unknown_preset_is_configuration_invalid() {
        let err = get_preset("nonexistent").unwrap_err();
        assert!(matches!(err, ConciergeError::ConfigurationInvalid(_)));
    }
}
