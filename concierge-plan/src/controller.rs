//! The cluster-orchestration controller handler (spec §4.6 "Controller"):
//! installs the controller tool, writes provider credentials, and
//! bootstraps a controller on each provider that requests one.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::info;

use concierge_config::ConciergeConfig;
use concierge_core::command::Command;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::models::Snap;
use concierge_core::retry::{self, RetryBounds, RetryLimit};
use concierge_core::worker::Worker;

use crate::handler::Executable;
use crate::packages::SnapPackageHandler;
use crate::provider::Provider;

const BOOTSTRAP_DEADLINE: Duration = Duration::from_secs(5 * 60);
const CHECK_BOOTSTRAPPED_BOUNDS: RetryBounds = RetryBounds { min: Duration::from_secs(1), max: Duration::from_secs(10) };
const CHECK_BOOTSTRAPPED_ATTEMPTS: u32 = 10;

pub struct Controller {
    worker: Arc<Worker>,
    providers: Vec<Arc<dyn Provider>>,
    channel: String,
    agent_version: String,
    model_defaults: IndexMap<String, String>,
    bootstrap_constraints: IndexMap<String, String>,
    extra_bootstrap_args: String,
    snap: Snap,
}

impl Controller {
    pub fn new(worker: Arc<Worker>, config: &ConciergeConfig, providers: Vec<Arc<dyn Provider>>) -> Self {
        let cfg = &config.controller;
        let channel = if !config.overrides.controller_channel.is_empty() { config.overrides.controller_channel.clone() } else { cfg.channel.clone() };

        Controller {
            worker,
            providers,
            agent_version: cfg.agent_version.clone(),
            model_defaults: cfg.model_defaults.clone(),
            bootstrap_constraints: cfg.bootstrap_constraints.clone(),
            extra_bootstrap_args: cfg.extra_bootstrap_args.clone(),
            snap: Snap { name: "juju".to_string(), channel: channel.clone(), connections: Vec::new() },
            channel,
        }
    }

    async fn install(&self) -> Result<()> {
        SnapPackageHandler::new(self.worker.clone(), vec![self.snap.clone()]).prepare().await
    }

    async fn write_credentials(&self) -> Result<()> {
        let mut credentials = serde_yaml_ng::Mapping::new();
        for provider in &self.providers {
            let provider_creds = provider.credentials();
            if provider_creds.is_empty() {
                continue;
            }

            let mut concierge_creds = serde_yaml_ng::Mapping::new();
            concierge_creds.insert("concierge".into(), serde_yaml_ng::to_value(provider_creds)?);
            credentials.insert(provider.cloud_name().into(), concierge_creds.into());
        }

        if credentials.is_empty() {
            return Ok(());
        }

        let mut document = serde_yaml_ng::Mapping::new();
        document.insert("credentials".into(), credentials.into());
        let content = serde_yaml_ng::to_string(&document)?;

        self.worker.write_home_file(Path::new(".local/share/juju/credentials.yaml"), content.as_bytes()).await
    }

    async fn bootstrap_all(&self) -> Result<()> {
        let results = futures_util::future::join_all(self.providers.iter().map(|p| self.bootstrap_provider(p))).await;
        combine(results)
    }

    async fn bootstrap_provider(&self, provider: &Arc<dyn Provider>) -> Result<()> {
        if !provider.bootstrap() {
            return Ok(());
        }

        let controller_name = format!("concierge-{}", provider.name());

        if self.check_bootstrapped(&controller_name).await? {
            info!(provider = provider.name(), "previous controller found");
            return Ok(());
        }

        info!(provider = provider.name(), "bootstrapping controller");

        let mut args = vec!["bootstrap".to_string(), provider.cloud_name().to_string(), controller_name.clone(), "--verbose".to_string()];

        if !self.agent_version.is_empty() {
            args.push("--agent-version".to_string());
            args.push(self.agent_version.clone());
        }

        let model_defaults = merge(&self.model_defaults, &provider.model_defaults());
        let bootstrap_constraints = merge(&self.bootstrap_constraints, &provider.bootstrap_constraints());

        for key in sorted_keys(&model_defaults) {
            args.push("--model-default".to_string());
            args.push(format!("{key}={}", model_defaults[&key]));
        }
        for key in sorted_keys(&bootstrap_constraints) {
            args.push("--bootstrap-constraints".to_string());
            args.push(format!("{key}={}", bootstrap_constraints[&key]));
        }

        if !self.extra_bootstrap_args.is_empty() {
            args.extend(shell_split(&self.extra_bootstrap_args)?);
        }

        let username = self.worker.username().to_string();
        let group = provider.group_name().to_string();
        let cmd = Command::new("juju", args).with_privilege_drop(username.clone(), group);
        self.worker.run_with_retries(&cmd, BOOTSTRAP_DEADLINE).await?;

        let add_model = Command::new(
            "juju",
            vec!["add-model".to_string(), "-c".to_string(), controller_name, "testing".to_string()],
        )
        .with_privilege_drop(username, String::new());
        self.worker.run(&add_model).await?;

        info!(provider = provider.name(), "bootstrapped controller");
        Ok(())
    }

    /// The retry loop is the sole source of truth on "is it bootstrapped";
    /// a post-loop re-probe would duplicate that work for no benefit.
    async fn check_bootstrapped(&self, controller_name: &str) -> Result<bool> {
        let username = self.worker.username().to_string();
        let cmd = Command::new("juju", vec!["show-controller".to_string(), controller_name.to_string()])
            .with_privilege_drop(username, String::new());

        let outcome =
            retry::retry(CHECK_BOOTSTRAPPED_BOUNDS, RetryLimit::MaxAttempts(CHECK_BOOTSTRAPPED_ATTEMPTS), retry::never_terminal, || {
                let cmd = cmd.clone();
                async move { self.worker.run(&cmd).await }
            })
            .await;

        match outcome {
            Ok(_) => Ok(true),
            Err(ConciergeError::Command(failure))
                if failure.merged_output.contains(&format!("controller {controller_name} not found")) =>
            {
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    async fn kill_provider(&self, provider: &Arc<dyn Provider>) -> Result<()> {
        let controller_name = format!("concierge-{}", provider.name());

        if !self.check_bootstrapped(&controller_name).await? {
            info!(provider = provider.name(), "no controller found");
            return Ok(());
        }

        info!(provider = provider.name(), "destroying controller");

        let username = self.worker.username().to_string();
        let cmd = Command::new(
            "juju",
            vec!["kill-controller".to_string(), "--verbose".to_string(), "--no-prompt".to_string(), controller_name],
        )
        .with_privilege_drop(username, String::new());
        self.worker.run(&cmd).await?;

        info!(provider = provider.name(), "destroyed controller");
        Ok(())
    }
}

fn merge(base: &IndexMap<String, String>, overlay: &IndexMap<String, String>) -> IndexMap<String, String> {
    let mut result = base.clone();
    for (k, v) in overlay {
        result.insert(k.clone(), v.clone());
    }
    result
}

fn sorted_keys(map: &IndexMap<String, String>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

fn shell_split(raw: &str) -> Result<Vec<String>> {
    shell_words::split(raw).map_err(|e| ConciergeError::ConfigurationInvalid(format!("invalid extra bootstrap args: {e}")))
}

fn combine(results: Vec<Result<()>>) -> Result<()> {
    for result in results {
        result?;
    }
    Ok(())
}

#[async_trait]
impl Executable for Controller {
    async fn prepare(&self) -> Result<()> {
        self.install().await?;
        self.worker.mk_home_subdir(Path::new(".local/share/juju")).await?;
        self.write_credentials().await?;
        self.bootstrap_all().await?;
        info!("prepared controller");
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        for provider in &self.providers {
            if provider.credentials().is_empty() {
                continue;
            }
            self.kill_provider(provider).await?;
        }

        self.worker.remove_all_home(Path::new(".local/share/juju")).await?;
        SnapPackageHandler::new(self.worker.clone(), vec![self.snap.clone()]).restore().await?;
        info!("restored controller");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overlay_takes_precedence() {
        let mut base = IndexMap::new();
        base.insert("a".to_string(), "1".to_string());
        let mut overlay = IndexMap::new();
        overlay.insert("a".to_string(), "2".to_string());
        overlay.insert("b".to_string(), "3".to_string());

        let merged = merge(&base, &overlay);
        assert_eq!(merged.get("a"), Some(&"2".to_string()));
        assert_eq!(merged.get("b"), Some(&"3".to_string()));
    }

    #[test]
    fn sorted_keys_are_lexicographic() {
        let mut map = IndexMap::new();
        map.insert("zebra".to_string(), String::new());
        map.insert("apple".to_string(), String::new());
        assert_eq!(sorted_keys(&map), vec!["apple".to_string(), "zebra".to_string()]);
    }

    #[test]
    fn shell_split_handles_quoted_args() {
        let parts = shell_split("--foo 'bar baz'").unwrap();
        assert_eq!(parts, vec!["--foo".to_string(), "bar baz".to_string()]);
    }

    #[test]
    fn shell_split_rejects_unbalanced_quotes() {
        assert!(shell_split("--foo 'unterminated").is_err());
    }
}
