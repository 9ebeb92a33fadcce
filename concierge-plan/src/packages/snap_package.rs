//! Snap-package handler (spec §4.4 "Snap-package handler"): installs,
//! connects, and removes snaps, querying C2 to decide install vs refresh.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use concierge_core::command::Command;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::models::Snap;
use concierge_core::worker::Worker;

use crate::handler::Executable;

pub struct SnapPackageHandler {
    worker: Arc<Worker>,
    snaps: Vec<Snap>,
}

impl SnapPackageHandler {
    pub fn new(worker: Arc<Worker>, snaps: Vec<Snap>) -> Self {
        SnapPackageHandler { worker, snaps }
    }

    async fn install_snap(&self, snap: &Snap) -> Result<()> {
        debug!(snap = %snap.name, "installing snap");

        let info = self.worker.snap_info(&snap.name, &snap.channel).await?;
        let action = if info.installed { "refresh" } else { "install" };

        let mut args = vec![action.to_string(), snap.name.clone()];
        if !snap.channel.is_empty() {
            args.push("--channel".to_string());
            args.push(snap.channel.clone());
        }
        if info.classic {
            args.push("--classic".to_string());
        }

        let cmd = Command::new("snap", args);
        self.worker.run_exclusive(&cmd).await
    }

    async fn connect_snap(&self, snap: &Snap) -> Result<()> {
        for connection in &snap.connections {
            let parts: Vec<&str> = connection.split_whitespace().collect();
            if parts.len() > 2 {
                return Err(ConciergeError::ConfigurationInvalid(format!(
                    "too many arguments in snap connection string '{connection}'"
                )));
            }

            let mut args = vec!["connect".to_string()];
            args.extend(parts.into_iter().map(str::to_string));

            let cmd = Command::new("snap", args);
            self.worker.run_exclusive(&cmd).await?;
        }
        Ok(())
    }

    async fn remove_snap(&self, snap: &Snap) -> Result<()> {
        debug!(snap = %snap.name, "removing snap");
        let cmd = Command::new("snap", vec!["remove".to_string(), snap.name.clone(), "--purge".to_string()]);
        self.worker.run_exclusive(&cmd).await
    }
}

#[async_trait]
impl Executable for SnapPackageHandler {
    async fn prepare(&self) -> Result<()> {
        for snap in &self.snaps {
            self.install_snap(snap).await?;
            self.connect_snap(snap).await?;
        }
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        for snap in &self.snaps {
            self.remove_snap(snap).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NullSnapSource;

    #[tokio::test]
    async fn more_than_two_connection_parts_is_fatal() {
        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let snap = Snap { name: "charmcraft".to_string(), channel: String::new(), connections: vec!["a b c".to_string()] };
        let handler = SnapPackageHandler::new(worker, vec![]);
        let err = handler.connect_snap(&snap).await.unwrap_err();
        assert!(matches!(err, ConciergeError::ConfigurationInvalid(_)));
    }
}
