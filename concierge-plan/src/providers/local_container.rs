//! Local container provider (spec §4.5 "Local container provider"),
//! installing and configuring the LXD container hypervisor snap.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info};

use concierge_config::ConciergeConfig;
use concierge_core::command::Command;
use concierge_core::error::Result;
use concierge_core::models::Snap;
use concierge_core::worker::Worker;

use crate::handler::Executable;
use crate::packages::SnapPackageHandler;
use crate::provider::{Credentials, Provider};

pub struct LocalContainer {
    worker: Arc<Worker>,
    bootstrap: bool,
    model_defaults: IndexMap<String, String>,
    bootstrap_constraints: IndexMap<String, String>,
    channel: String,
    snap: Snap,
}

impl LocalContainer {
    pub fn new(worker: Arc<Worker>, config: &ConciergeConfig) -> Self {
        let cfg = &config.providers.local_container;
        let channel =
            if !config.overrides.local_container_channel.is_empty() { config.overrides.local_container_channel.clone() } else { cfg.channel.clone() };

        LocalContainer {
            worker,
            bootstrap: cfg.bootstrap,
            model_defaults: cfg.model_defaults.clone(),
            bootstrap_constraints: cfg.bootstrap_constraints.clone(),
            snap: Snap { name: "lxd".to_string(), channel: channel.clone(), connections: Vec::new() },
            channel,
        }
    }

    async fn install(&self) -> Result<()> {
        let restart = self.workaround_refresh().await?;

        let handler = SnapPackageHandler::new(self.worker.clone(), vec![self.snap.clone()]);
        handler.prepare().await?;

        if restart {
            let cmd = Command::new("snap", vec!["start".to_string(), self.name().to_string()]);
            self.worker.run_exclusive(&cmd).await?;
        }
        Ok(())
    }

    async fn init(&self) -> Result<()> {
        let waitready = Command::new("lxd", vec!["waitready".to_string(), "--timeout".to_string(), "270".to_string()]);
        self.worker.run(&waitready).await?;

        let init = Command::new("lxd", vec!["init".to_string(), "--minimal".to_string()]);
        self.worker.run(&init).await?;

        let disable_ipv6 = Command::new(
            "lxc",
            vec![
                "network".to_string(),
                "set".to_string(),
                "lxdbr0".to_string(),
                "ipv6.address".to_string(),
                "none".to_string(),
            ],
        );
        self.worker.run(&disable_ipv6).await?;
        Ok(())
    }

    async fn enable_non_root_user_control(&self) -> Result<()> {
        let username = self.worker.username().to_string();

        let chmod = Command::new("chmod", vec!["a+wr".to_string(), "/var/snap/lxd/common/lxd/unix.socket".to_string()]);
        self.worker.run(&chmod).await?;

        let usermod = Command::new("usermod", vec!["-a".to_string(), "-G".to_string(), "lxd".to_string(), username]);
        self.worker.run(&usermod).await?;
        Ok(())
    }

    async fn deconflict_firewall(&self) -> Result<()> {
        let flush = Command::new("iptables", vec!["-F".to_string(), "FORWARD".to_string()]);
        self.worker.run(&flush).await?;

        let accept = Command::new("iptables", vec!["-P".to_string(), "FORWARD".to_string(), "ACCEPT".to_string()]);
        self.worker.run(&accept).await?;
        Ok(())
    }

    /// A channel-crossing refresh can leave a stale control socket behind
    /// unless LXD is stopped first.
    async fn workaround_refresh(&self) -> Result<bool> {
        let info = self.worker.snap_info(self.name(), &self.channel).await?;

        if !info.installed {
            return Ok(false);
        }

        if self.channel.is_empty() || info.tracking_channel == self.channel {
            debug!(tracking = %info.tracking_channel, target = %self.channel, "skipping lxd stop, no channel change");
            return Ok(false);
        }

        debug!(tracking = %info.tracking_channel, target = %self.channel, "lxd channel mismatch, stopping for refresh");
        let stop = Command::new("snap", vec!["stop".to_string(), self.name().to_string()]);
        self.worker.run_exclusive(&stop).await?;
        Ok(true)
    }
}

#[async_trait]
impl Executable for LocalContainer {
    async fn prepare(&self) -> Result<()> {
        self.install().await?;
        self.init().await?;
        self.enable_non_root_user_control().await?;
        self.deconflict_firewall().await?;
        info!(provider = self.name(), "prepared provider");
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        let handler = SnapPackageHandler::new(self.worker.clone(), vec![self.snap.clone()]);
        handler.restore().await?;
        info!(provider = self.name(), "restored provider");
        Ok(())
    }
}

#[async_trait]
impl Provider for LocalContainer {
    fn name(&self) -> &str {
        "local-container"
    }
    fn bootstrap(&self) -> bool {
        self.bootstrap
    }
    fn cloud_name(&self) -> &str {
        "localhost"
    }
    fn group_name(&self) -> &str {
        "lxd"
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
