//! Canonical Kubernetes provider (spec §4.5 "Kube-canonical provider").

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use concierge_config::ConciergeConfig;
use concierge_core::command::Command;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::models::Snap;
use concierge_core::worker::Worker;

use crate::handler::Executable;
use crate::packages::{SnapPackageHandler, SystemPackageHandler};
use crate::provider::{Credentials, Provider};

const DEFAULT_CHANNEL: &str = "1.32-classic/stable";
const FEATURE_DEADLINE: Duration = Duration::from_secs(5 * 60);

pub struct KubeCanonical {
    worker: Arc<Worker>,
    bootstrap: bool,
    model_defaults: IndexMap<String, String>,
    bootstrap_constraints: IndexMap<String, String>,
    features: IndexMap<String, IndexMap<String, String>>,
    debs: Vec<String>,
    snaps: Vec<Snap>,
}

impl KubeCanonical {
    pub fn new(worker: Arc<Worker>, config: &ConciergeConfig) -> Self {
        let cfg = &config.providers.kube_canonical;
        let channel = if !config.overrides.kube_canonical_channel.is_empty() {
            config.overrides.kube_canonical_channel.clone()
        } else if !cfg.channel.is_empty() {
            cfg.channel.clone()
        } else {
            DEFAULT_CHANNEL.to_string()
        };

        KubeCanonical {
            worker,
            bootstrap: cfg.bootstrap,
            model_defaults: cfg.model_defaults.clone(),
            bootstrap_constraints: cfg.bootstrap_constraints.clone(),
            features: cfg.features.clone(),
            debs: vec!["iptables".to_string()],
            snaps: vec![
                Snap { name: "k8s".to_string(), channel, connections: Vec::new() },
                Snap { name: "kubectl".to_string(), channel: "stable".to_string(), connections: Vec::new() },
            ],
        }
    }

    async fn install(&self) -> Result<()> {
        let (iptables, snaps) = tokio::join!(self.install_iptables(), self.install_snaps());
        iptables?;
        snaps?;
        Ok(())
    }

    async fn install_iptables(&self) -> Result<()> {
        let probe = Command::new("which", vec!["iptables".to_string()]);
        if self.worker.run(&probe).await.is_ok() {
            return Ok(());
        }
        SystemPackageHandler::new(self.worker.clone(), self.debs.clone()).prepare().await
    }

    async fn install_snaps(&self) -> Result<()> {
        SnapPackageHandler::new(self.worker.clone(), self.snaps.clone()).prepare().await
    }

    async fn init(&self) -> Result<()> {
        self.handle_existing_containerd().await;

        if self.needs_bootstrap().await? {
            let cmd = Command::new("k8s", vec!["bootstrap".to_string()]);
            self.worker.run_with_retries(&cmd, FEATURE_DEADLINE).await?;
        }

        let cmd =
            Command::new("k8s", vec!["status".to_string(), "--wait-ready".to_string(), "--timeout".to_string(), "270s".to_string()]);
        self.worker.run_with_retries(&cmd, FEATURE_DEADLINE).await?;
        Ok(())
    }

    async fn needs_bootstrap(&self) -> Result<bool> {
        let cmd = Command::new("k8s", vec!["status".to_string()]);
        match self.worker.run(&cmd).await {
            Ok(_) => Ok(false),
            Err(ConciergeError::Command(failure))
                if failure.merged_output.contains("The node is not part of a Kubernetes cluster") =>
            {
                Ok(true)
            }
            Err(other) => Err(other),
        }
    }

    async fn configure_features(&self) -> Result<()> {
        for (feature_name, settings) in &self.features {
            for (key, value) in settings {
                let set_arg = format!("{feature_name}.{key}={value}");
                let cmd = Command::new("k8s", vec!["set".to_string(), set_arg]);
                self.worker.run(&cmd).await?;
            }

            let cmd = Command::new("k8s", vec!["enable".to_string(), feature_name.clone()]);
            self.worker.run_with_retries(&cmd, FEATURE_DEADLINE).await?;
        }
        Ok(())
    }

    async fn setup_kubectl(&self) -> Result<()> {
        let cmd =
            Command::new("k8s", vec!["kubectl".to_string(), "config".to_string(), "view".to_string(), "--raw".to_string()]);
        let output = self.worker.run(&cmd).await?;
        self.worker.write_home_file(Path::new(".kube/config"), &output).await
    }

    /// Canonical Kubernetes expects a clean machine; some hosts already run
    /// containerd, which conflicts with the k8s snap's own container runtime.
    async fn handle_existing_containerd(&self) {
        let probe = Command::new("systemctl", vec!["is-active".to_string(), "containerd.service".to_string()]);
        let is_active = match self.worker.run(&probe).await {
            Ok(output) => String::from_utf8_lossy(&output).trim() == "active",
            Err(_) => {
                debug!("containerd service is not active or does not exist");
                return;
            }
        };

        if is_active {
            debug!("containerd service is active, stopping it");
            let stop = Command::new("systemctl", vec!["stop".to_string(), "containerd.service".to_string()]);
            if let Err(e) = self.worker.run(&stop).await {
                warn!(error = %e, "failed to stop containerd service");
            }
        }

        let containerd_path = Path::new("/run/containerd");
        if containerd_path.exists() {
            debug!("removing /run/containerd directory");
            if let Err(e) = tokio::fs::remove_dir_all(containerd_path).await {
                warn!(error = %e, "failed to remove /run/containerd directory");
            }
        }
    }

    async fn restore_containerd(&self) {
        let probe = Command::new("systemctl", vec!["cat".to_string(), "containerd.service".to_string()]);
        if self.worker.run(&probe).await.is_err() {
            return;
        }

        debug!("restarting containerd service");
        let start = Command::new("systemctl", vec!["start".to_string(), "containerd.service".to_string()]);
        if let Err(e) = self.worker.run(&start).await {
            warn!(error = %e, "failed to restart containerd service");
        }
    }
}

#[async_trait]
impl Executable for KubeCanonical {
    async fn prepare(&self) -> Result<()> {
        self.install().await?;
        self.init().await?;
        self.configure_features().await?;
        self.setup_kubectl().await?;
        info!(provider = self.name(), "prepared provider");
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        SnapPackageHandler::new(self.worker.clone(), self.snaps.clone()).restore().await?;
        self.worker.remove_all_home(Path::new(".kube")).await?;
        self.restore_containerd().await;
        info!(provider = self.name(), "removed provider");
        Ok(())
    }
}

#[async_trait]
impl Provider for KubeCanonical {
    fn name(&self) -> &str {
        "kube-canonical"
    }
    fn bootstrap(&self) -> bool {
        self.bootstrap
    }
    fn cloud_name(&self) -> &str {
        "k8s"
    }
    fn group_name(&self) -> &str {
        ""
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
