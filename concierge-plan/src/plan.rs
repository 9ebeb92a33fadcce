//! The `Plan` (spec §4.7): the concrete set of snap, deb, provider, and
//! controller handlers built from one configuration, executed in the
//! fixed three-stage order.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use concierge_config::ConciergeConfig;
use concierge_core::error::Result;
use concierge_core::models::Snap;
use concierge_core::worker::Worker;

use crate::controller::Controller;
use crate::handler::{do_action, Action};
use crate::packages::{SnapPackageHandler, SystemPackageHandler};
use crate::provider::{create_all_providers, Provider};

/// charmcraft/snapcraft/rockcraft are the only snaps with a dedicated
/// override channel (spec §4.7 "Host snap/package assembly").
fn snap_channel_override(config: &ConciergeConfig, snap_name: &str) -> &str {
    match snap_name {
        "charmcraft" => &config.overrides.charmcraft_channel,
        "snapcraft" => &config.overrides.snapcraft_channel,
        "rockcraft" => &config.overrides.rockcraft_channel,
        _ => "",
    }
}

pub struct Plan {
    config: ConciergeConfig,
    worker: Arc<Worker>,
    snaps: Vec<Snap>,
    debs: Vec<String>,
    providers: Vec<Arc<dyn Provider>>,
}

impl Plan {
    pub fn new(config: ConciergeConfig, worker: Arc<Worker>) -> Self {
        // Build the snap set from host.snaps plus parsed extra_snaps (spec
        // §4.7, item 1): an extra colliding with a host entry by name does
        // not replace it unless the extra carries an explicit channel, and
        // the charmcraft/snapcraft/rockcraft channel-override map always
        // wins regardless of which side contributed the entry.
        let mut by_name: IndexMap<String, Snap> = IndexMap::new();
        for (snap_name, snap_config) in &config.host.snaps {
            by_name.insert(
                snap_name.clone(),
                Snap { name: snap_name.clone(), channel: snap_config.channel.clone(), connections: snap_config.connections.clone() },
            );
        }
        for snap_str in &config.overrides.extra_snaps {
            let extra = Snap::from_string(snap_str);
            match by_name.get_mut(&extra.name) {
                Some(existing) if !extra.channel.is_empty() => existing.channel = extra.channel.clone(),
                Some(_) => {}
                None => {
                    by_name.insert(extra.name.clone(), extra);
                }
            }
        }
        for snap in by_name.values_mut() {
            let override_channel = snap_channel_override(&config, &snap.name);
            if !override_channel.is_empty() {
                snap.channel = override_channel.to_string();
            }
        }
        let snaps: Vec<Snap> = by_name.into_values().collect();

        let mut debs = config.host.packages.clone();
        debs.extend(config.overrides.extra_debs.iter().cloned());

        let providers = create_all_providers(worker.clone(), &config);
        for provider in &providers {
            if config.overrides.controller_disabled && provider.bootstrap() {
                warn!(provider = provider.name(), "provider will not be bootstrapped because the controller is disabled");
            }
        }

        let mut config = config;
        if config.overrides.controller_disabled {
            config.controller.disabled = true;
        }

        Plan { config, worker, snaps, debs, providers }
    }

    pub async fn execute(&self, action: Action) -> Result<()> {
        let snap_handler = SnapPackageHandler::new(self.worker.clone(), self.snaps.clone());
        let deb_handler = SystemPackageHandler::new(self.worker.clone(), self.debs.clone());

        let (snaps, debs) = {
            let _stage = concierge_core::scoped_context!("stage" => "packages");
            tokio::join!(do_action(&snap_handler, action), do_action(&deb_handler, action))
        };
        combine(vec![snaps, debs])?;

        let provider_results = {
            let _stage = concierge_core::scoped_context!("stage" => "providers");
            futures_util::future::join_all(self.providers.iter().map(|p| do_action(p.as_ref(), action))).await
        };
        combine(provider_results)?;

        if self.config.controller.disabled {
            return Ok(());
        }

        let _stage = concierge_core::scoped_context!("stage" => "controller");
        let controller = Controller::new(self.worker.clone(), &self.config, self.providers.clone());
        do_action(&controller, action).await
    }
}

fn combine(results: Vec<Result<()>>) -> Result<()> {
    for result in results {
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NullSnapSource;

    #[test]
    fn extra_snaps_pick_up_their_dedicated_channel_override() {
        let mut config = ConciergeConfig::default();
        config.overrides.extra_snaps = vec!["charmcraft".to_string()];
        config.overrides.charmcraft_channel = "latest/edge".to_string();

        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let plan = Plan::new(config, worker);

        let snap = plan.snaps.iter().find(|s| s.name == "charmcraft").unwrap();
        assert_eq!(snap.channel, "latest/edge");
    }

    #[test]
    fn extra_snap_colliding_with_host_snap_is_represented_once() {
        use concierge_config::SnapConfig;

        let mut config = ConciergeConfig::default();
        config.host.snaps.insert("yq".to_string(), SnapConfig { channel: "stable".to_string(), connections: vec![] });
        config.overrides.extra_snaps = vec!["yq".to_string()];

        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let plan = Plan::new(config, worker);

        assert_eq!(plan.snaps.iter().filter(|s| s.name == "yq").count(), 1);
        assert_eq!(plan.snaps.iter().find(|s| s.name == "yq").unwrap().channel, "stable");
    }

    #[test]
    fn extra_snap_with_explicit_channel_overrides_host_entry_channel() {
        use concierge_config::SnapConfig;

        let mut config = ConciergeConfig::default();
        config.host.snaps.insert("jq".to_string(), SnapConfig { channel: "stable".to_string(), connections: vec![] });
        config.overrides.extra_snaps = vec!["jq/latest/edge".to_string()];

        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let plan = Plan::new(config, worker);

        assert_eq!(plan.snaps.iter().filter(|s| s.name == "jq").count(), 1);
        assert_eq!(plan.snaps.iter().find(|s| s.name == "jq").unwrap().channel, "latest/edge");
    }

    #[test]
    fn disable_controller_override_propagates_into_config() {
        let mut config = ConciergeConfig::default();
        config.overrides.controller_disabled = true;

        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let plan = Plan::new(config, worker);

        assert!(plan.config.controller.disabled);
    }

    #[test]
    fn disabled_providers_produce_an_empty_provider_list() {
        let config = ConciergeConfig::default();
        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let plan = Plan::new(config, worker);
        assert!(plan.providers.is_empty());
    }
}
