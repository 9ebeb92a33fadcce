//! The `Manager` (spec §4.8): top-level entry point wiring configuration,
//! the worker, and a `Plan` together, and persisting the runtime record
//! that `restore`/`status` read back.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use concierge_config::{ConciergeConfig, Status};
use concierge_core::error::{ConciergeError, Result};
use concierge_core::models::SnapSource;
use concierge_core::worker::Worker;

use crate::handler::Action;
use crate::plan::Plan;

const RECORD_PATH: &str = ".cache/concierge/concierge.yaml";

pub struct Manager {
    config: ConciergeConfig,
    worker: Arc<Worker>,
}

impl Manager {
    pub fn new(config: ConciergeConfig, trace: bool, snap_source: Box<dyn SnapSource>) -> Self {
        Manager { config, worker: Arc::new(Worker::new(trace, snap_source)) }
    }

    pub async fn prepare(&mut self) -> Result<()> {
        match self.execute(Action::Prepare).await {
            Ok(()) => {
                self.config.status = Status::Succeeded;
                self.record_runtime_config().await?;
                Ok(())
            }
            Err(e) => {
                self.config.status = Status::Failed;
                self.record_runtime_config().await?;
                Err(e)
            }
        }
    }

    pub async fn restore(&mut self) -> Result<()> {
        self.execute(Action::Restore).await
    }

    pub async fn status(&self) -> Result<Status> {
        let contents = self.worker.read_home_file(Path::new(RECORD_PATH)).await.map_err(|e| match e {
            ConciergeError::FileNotFound(_) => {
                ConciergeError::FileNotFound("concierge has not prepared this machine and cannot report its status".to_string())
            }
            other => other,
        })?;

        let config: ConciergeConfig = serde_yaml_ng::from_slice(&contents)?;
        Ok(config.status)
    }

    async fn execute(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Prepare => {
                self.config.status = Status::Provisioning;
                self.record_runtime_config().await?;
            }
            Action::Restore => {
                self.load_runtime_config().await?;
            }
        }

        let plan = Plan::new(self.config.clone(), self.worker.clone());
        plan.execute(action).await
    }

    async fn record_runtime_config(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(&self.config)?;
        self.worker.write_home_file(Path::new(RECORD_PATH), content.as_bytes()).await?;
        debug!(path = RECORD_PATH, "saved merged runtime configuration");
        Ok(())
    }

    async fn load_runtime_config(&mut self) -> Result<()> {
        let contents = self.worker.read_home_file(Path::new(RECORD_PATH)).await?;
        self.config = serde_yaml_ng::from_slice(&contents)?;
        debug!(path = RECORD_PATH, "loaded previous runtime configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NullSnapSource;

    #[tokio::test]
    async fn status_without_a_prior_prepare_is_a_clear_error() {
        let manager = Manager::new(ConciergeConfig::default(), false, Box::new(NullSnapSource));
        let err = manager.status().await.unwrap_err();
        assert!(matches!(err, ConciergeError::FileNotFound(_)));
    }
}
