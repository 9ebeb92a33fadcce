//! Public-cloud provider (spec §4.5 "Public-cloud provider"): a credentials
//! adapter that installs nothing locally.

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::info;

use concierge_config::ConciergeConfig;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::worker::Worker;

use crate::handler::Executable;
use crate::provider::{Credentials, Provider};

pub struct PublicCloud {
    worker: Arc<Worker>,
    bootstrap: bool,
    model_defaults: IndexMap<String, String>,
    bootstrap_constraints: IndexMap<String, String>,
    credentials_file: String,
    credentials: StdMutex<Credentials>,
}

impl PublicCloud {
    pub fn new(worker: Arc<Worker>, config: &ConciergeConfig) -> Self {
        let cfg = &config.providers.public_cloud;
        let credentials_file = if !config.overrides.public_cloud_credential_file.is_empty() {
            config.overrides.public_cloud_credential_file.clone()
        } else {
            cfg.credentials_file.clone()
        };

        PublicCloud {
            worker,
            bootstrap: cfg.bootstrap,
            model_defaults: cfg.model_defaults.clone(),
            bootstrap_constraints: cfg.bootstrap_constraints.clone(),
            credentials_file,
            credentials: StdMutex::new(Credentials::new()),
        }
    }
}

#[async_trait]
impl Executable for PublicCloud {
    async fn prepare(&self) -> Result<()> {
        if self.credentials_file.is_empty() {
            return Ok(());
        }

        let contents = self.worker.read_file(Path::new(&self.credentials_file)).await?;
        let text = String::from_utf8_lossy(&contents);
        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(&text)
            .map_err(|e| ConciergeError::ConfigurationInvalid(format!("failed to parse public-cloud credentials: {e}")))?;

        let mapping = match value {
            serde_yaml_ng::Value::Mapping(m) => m,
            _ => return Err(ConciergeError::ConfigurationInvalid("credentials file must contain a YAML mapping".to_string())),
        };

        let mut credentials = Credentials::new();
        for (key, value) in mapping {
            if let serde_yaml_ng::Value::String(key) = key {
                credentials.insert(key, value);
            }
        }
        *self.credentials.lock().expect("credentials mutex poisoned") = credentials;

        info!(provider = self.name(), "prepared provider");
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        info!(provider = self.name(), "restored provider");
        Ok(())
    }
}

#[async_trait]
impl Provider for PublicCloud {
    fn name(&self) -> &str {
        "public-cloud"
    }
    fn bootstrap(&self) -> bool {
        self.bootstrap
    }
    fn cloud_name(&self) -> &str {
        "google"
    }
    fn group_name(&self) -> &str {
        ""
    }
    fn credentials(&self) -> Credentials {
        self.credentials.lock().expect("credentials mutex poisoned").clone()
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

    #[tokio::test]
    async fn no_credentials_file_is_a_noop() {
        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let provider = PublicCloud::new(worker, &ConciergeConfig::default());
        provider.prepare().await.unwrap();
        assert!(provider.credentials().is_empty());
    }

    #[tokio::test]
    async fn credentials_file_is_parsed_into_the_opaque_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.yaml");
        std::fs::write(&path, "client-email: test@example.com\nprivate-key: secret\n").unwrap();

        let worker = Arc::new(Worker::new(false, Box::new(NullSnapSource)));
        let mut config = ConciergeConfig::default();
        config.providers.public_cloud.credentials_file = path.to_string_lossy().to_string();

        let provider = PublicCloud::new(worker, &config);
        provider.prepare().await.unwrap();

        let creds = provider.credentials();
        assert_eq!(creds.get("client-email").unwrap().as_str(), Some("test@example.com"));
    }
}
