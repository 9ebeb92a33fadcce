//! MicroK8s provider (spec §4.5 "Kube-micro provider"): as kube-canonical,
//! but with a computed default channel and addon enabling.

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{info, warn};

use concierge_config::ConciergeConfig;
use concierge_core::command::Command;
use concierge_core::error::Result;
use concierge_core::models::Snap;
use concierge_core::worker::Worker;

use crate::handler::Executable;
use crate::packages::SnapPackageHandler;
use crate::provider::{Credentials, Provider};

const DEFAULT_CHANNEL: &str = "1.32-strict/stable";
const OPERATION_DEADLINE: Duration = Duration::from_secs(5 * 60);

pub struct KubeMicro {
    worker: Arc<Worker>,
    bootstrap: bool,
    model_defaults: IndexMap<String, String>,
    bootstrap_constraints: IndexMap<String, String>,
    addons: Vec<String>,
    /// Empty means "not yet computed"; resolved on first `prepare`.
    channel: StdMutex<String>,
}

impl KubeMicro {
    pub fn new(worker: Arc<Worker>, config: &ConciergeConfig) -> Self {
        let cfg = &config.providers.kube_micro;
        let channel = if !config.overrides.kube_micro_channel.is_empty() {
            config.overrides.kube_micro_channel.clone()
        } else {
            cfg.channel.clone()
        };

        KubeMicro {
            worker,
            bootstrap: cfg.bootstrap,
            model_defaults: cfg.model_defaults.clone(),
            bootstrap_constraints: cfg.bootstrap_constraints.clone(),
            addons: cfg.addons.clone(),
            channel: StdMutex::new(channel),
        }
    }

    fn channel(&self) -> String {
        self.channel.lock().expect("channel mutex poisoned").clone()
    }

    async fn ensure_channel(&self) -> Result<()> {
        if !self.channel().is_empty() {
            return Ok(());
        }
        let computed = self.compute_default_channel().await;
        *self.channel.lock().expect("channel mutex poisoned") = computed;
        Ok(())
    }

    async fn compute_default_channel(&self) -> String {
        match self.worker.snap_channels("microk8s").await {
            Ok(channels) => channels
                .into_iter()
                .find(|channel| channel.contains("strict") && channel.contains("stable"))
                .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            Err(e) => {
                warn!(error = %e, "failed to get microk8s channels");
                DEFAULT_CHANNEL.to_string()
            }
        }
    }

    fn snaps(&self) -> Vec<Snap> {
        vec![
            Snap { name: "microk8s".to_string(), channel: self.channel(), connections: Vec::new() },
            Snap { name: "kubectl".to_string(), channel: "stable".to_string(), connections: Vec::new() },
        ]
    }

    async fn install(&self) -> Result<()> {
        SnapPackageHandler::new(self.worker.clone(), self.snaps()).prepare().await
    }

    async fn init(&self) -> Result<()> {
        let cmd =
            Command::new("microk8s", vec!["status".to_string(), "--wait-ready".to_string(), "--timeout".to_string(), "270".to_string()]);
        self.worker.run_with_retries(&cmd, OPERATION_DEADLINE).await?;
        Ok(())
    }

    /// The address-range addon hard-codes a specific range; whether this
    /// should be configurable is left open upstream.
    async fn enable_addons(&self) -> Result<()> {
        for addon in &self.addons {
            let enable_arg = if addon == "metallb" { "metallb:10.64.140.43-10.64.140.49".to_string() } else { addon.clone() };
            let cmd = Command::new("microk8s", vec!["enable".to_string(), enable_arg]);
            self.worker.run_with_retries(&cmd, OPERATION_DEADLINE).await?;
        }
        Ok(())
    }

    async fn enable_non_root_user_control(&self) -> Result<()> {
        let username = self.worker.username().to_string();
        let group = self.group_name().to_string();
        let cmd = Command::new("usermod", vec!["-a".to_string(), "-G".to_string(), group, username]);
        self.worker.run(&cmd).await
    }

    async fn setup_kubectl(&self) -> Result<()> {
        let cmd = Command::new("microk8s", vec!["config".to_string()]);
        let output = self.worker.run(&cmd).await?;
        self.worker.write_home_file(Path::new(".kube/config"), &output).await
    }
}

#[async_trait]
impl Executable for KubeMicro {
    async fn prepare(&self) -> Result<()> {
        self.ensure_channel().await?;
        self.install().await?;
        self.init().await?;
        self.enable_addons().await?;
        self.enable_non_root_user_control().await?;
        self.setup_kubectl().await?;
        info!(provider = self.name(), "prepared provider");
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        SnapPackageHandler::new(self.worker.clone(), self.snaps()).restore().await?;
        self.worker.remove_all_home(Path::new(".kube")).await?;
        info!(provider = self.name(), "removed provider");
        Ok(())
    }
}

#[async_trait]
impl Provider for KubeMicro {
    fn name(&self) -> &str {
        "kube-micro"
    }
    fn bootstrap(&self) -> bool {
        self.bootstrap
    }
    fn cloud_name(&self) -> &str {
        "microk8s"
    }
    fn group_name(&self) -> &str {
        if self.channel().contains("strict") {
            "snap_microk8s"
        } else {
            "microk8s"
        }
    }
    fn credentials(&self) -> Credentials {
        Credentials::new()
    }
    fn model_defaults(&self) -> IndexMap<String, String> {
        self.model_defaults.clone()
    }
    fn bootstrap_constraints(&self) -> IndexMap<String, String> {
        self.bootstrap_constraints.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NullSnapSource;

    fn provider() -> KubeMicro {
        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        KubeMicro::new(worker, &ConciergeConfig::default())
    }

    #[test]
    fn empty_channel_is_non_strict_group_until_computed() {
        let p = provider();
        assert_eq!(p.group_name(), "microk8s");
    }

    #[test]
    fn strict_channel_selects_snap_group() {
        let p = provider();
        *p.channel.lock().unwrap() = "1.32-strict/stable".to_string();
        assert_eq!(p.group_name(), "snap_microk8s");
    }
}
