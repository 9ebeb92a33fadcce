//! The `Provider` capability set (adds introspection to `Executable`) and
//! the factory that builds enabled providers from configuration (spec
//! §4.5, §4.7, §9 "Capability-set polymorphism").

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use concierge_config::ConciergeConfig;
use concierge_core::worker::Worker;

use crate::handler::Executable;
use crate::providers::{KubeCanonical, KubeMicro, LocalContainer, PublicCloud};

/// Opaque provider-supplied credentials, serialized verbatim by the
/// controller handler into its credentials file.
pub type Credentials = IndexMap<String, serde_yaml_ng::Value>;

#[async_trait]
pub trait Provider: Executable {
    fn name(&self) -> &str;
    fn bootstrap(&self) -> bool;
    fn cloud_name(&self) -> &str;
    fn group_name(&self) -> &str;
    fn credentials(&self) -> Credentials;
    fn model_defaults(&self) -> IndexMap<String, String>;
    fn bootstrap_constraints(&self) -> IndexMap<String, String>;
}

/// Fixed provider order (spec §4.7): observable externally in restore and
/// startup-log ordering.
pub const PROVIDER_ORDER: [&str; 4] = ["local-container", "kube-micro", "kube-canonical", "public-cloud"];

pub fn create_provider(name: &str, worker: Arc<Worker>, config: &ConciergeConfig) -> Option<Arc<dyn Provider>> {
    match name {
        "local-container" if config.providers.local_container.enabled => {
            Some(Arc::new(LocalContainer::new(worker, config)))
        }
        "kube-micro" if config.providers.kube_micro.enabled => Some(Arc::new(KubeMicro::new(worker, config))),
        "kube-canonical" if config.providers.kube_canonical.enabled => {
            Some(Arc::new(KubeCanonical::new(worker, config)))
        }
        "public-cloud" if config.providers.public_cloud.enabled => Some(Arc::new(PublicCloud::new(worker, config))),
        _ => None,
    }
}

pub fn create_all_providers(worker: Arc<Worker>, config: &ConciergeConfig) -> Vec<Arc<dyn Provider>> {
    PROVIDER_ORDER.iter().filter_map(|name| create_provider(name, worker.clone(), config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NullSnapSource;

    #[test]
    fn disabled_providers_are_absent_from_the_factory_output() {
        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let config = ConciergeConfig::default();
        let providers = create_all_providers(worker, &config);
        assert!(providers.is_empty());
    }
}
