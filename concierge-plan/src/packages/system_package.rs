//! System-package handler (spec §4.4 "System-package handler"): installs
//! and removes apt packages via the host package manager.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use concierge_core::command::Command;
use concierge_core::error::Result;
use concierge_core::worker::Worker;

use crate::handler::Executable;

pub struct SystemPackageHandler {
    worker: Arc<Worker>,
    packages: Vec<String>,
}

impl SystemPackageHandler {
    pub fn new(worker: Arc<Worker>, packages: Vec<String>) -> Self {
        SystemPackageHandler { worker, packages }
    }
}

#[async_trait]
impl Executable for SystemPackageHandler {
    async fn prepare(&self) -> Result<()> {
        if self.packages.is_empty() {
            return Ok(());
        }

        let update = Command::new("apt-get", vec!["update".to_string()]);
        self.worker.run_exclusive(&update).await?;

        for package in &self.packages {
            let install = Command::new("apt-get", vec!["install".to_string(), "-y".to_string(), package.clone()]);
            self.worker.run_exclusive(&install).await?;
            info!(package, "installed apt package");
        }

        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        for package in &self.packages {
            let remove = Command::new("apt-get", vec!["remove".to_string(), "-y".to_string(), package.clone()]);
            self.worker.run_exclusive(&remove).await?;
            info!(package, "removed apt package");
        }

        let autoremove = Command::new("apt-get", vec!["autoremove".to_string(), "-y".to_string()]);
        self.worker.run_exclusive(&autoremove).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NullSnapSource;

    #[tokio::test]
    async fn empty_package_list_skips_refresh() {
        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let handler = SystemPackageHandler::new(worker, vec![]);
        handler.prepare().await.unwrap();
    }
}
