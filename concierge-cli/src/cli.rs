//! Command-line interface: argument parsing and wiring into
//! `concierge_plan::Manager` (`SPEC_FULL.md` §14).

use clap::{Parser, Subcommand};

use concierge_config::{get_env_overrides, load_config, merge_overrides, ConfigOverrides};
use concierge_core::error::Result;
use concierge_core::scoped_context;
use concierge_plan::Manager;
use concierge_snapd::SnapdClient;

/// One request-scoped structured-logging context per invocation (spec §9
/// Open Question; `SPEC_FULL.md` §11), carrying `{request_id, action}` for
/// every log event the Worker/Plan emit beneath it.
fn request_scope(action: &str) -> concierge_core::context::ContextGuard {
    scoped_context!("request_id" => uuid::Uuid::new_v4().to_string(), "action" => action)
}

#[derive(Parser)]
#[command(name = "concierge")]
#[command(about = "Provision a machine for charm and Kubernetes-app development")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install and configure providers and the controller
    Prepare {
        /// Path to a configuration file
        #[arg(long, default_value = "")]
        config: String,
        /// Name of a built-in preset (machine, k8s, dev)
        #[arg(long, default_value = "")]
        preset: String,
        /// Skip installing and bootstrapping the controller
        #[arg(long)]
        controller_disabled: bool,
        #[arg(long, default_value = "")]
        charmcraft_channel: String,
        #[arg(long, default_value = "")]
        snapcraft_channel: String,
        #[arg(long, default_value = "")]
        rockcraft_channel: String,
        #[arg(long, default_value = "")]
        controller_channel: String,
        #[arg(long, default_value = "")]
        kube_canonical_channel: String,
        #[arg(long, default_value = "")]
        kube_micro_channel: String,
        #[arg(long, default_value = "")]
        local_container_channel: String,
        #[arg(long, default_value = "")]
        public_cloud_credential_file: String,
        /// Comma-separated extra snaps, optionally `name/channel`
        #[arg(long, value_delimiter = ',', default_value = "")]
        extra_snaps: Vec<String>,
        /// Comma-separated extra apt packages
        #[arg(long, value_delimiter = ',', default_value = "")]
        extra_debs: Vec<String>,
        /// Print every command and its output
        #[arg(long)]
        trace: bool,
    },
    /// Remove everything concierge installed
    Restore {
        #[arg(long)]
        trace: bool,
    },
    /// Report the outcome of the last prepare
    Status,
}

fn overrides_from_args(
    controller_disabled: bool,
    charmcraft_channel: String,
    snapcraft_channel: String,
    rockcraft_channel: String,
    controller_channel: String,
    kube_canonical_channel: String,
    kube_micro_channel: String,
    local_container_channel: String,
    public_cloud_credential_file: String,
    extra_snaps: Vec<String>,
    extra_debs: Vec<String>,
) -> ConfigOverrides {
    ConfigOverrides {
        controller_disabled,
        controller_channel,
        kube_canonical_channel,
        kube_micro_channel,
        local_container_channel,
        charmcraft_channel,
        snapcraft_channel,
        rockcraft_channel,
        public_cloud_credential_file,
        extra_snaps: extra_snaps.into_iter().filter(|s| !s.is_empty()).collect(),
        extra_debs: extra_debs.into_iter().filter(|s| !s.is_empty()).collect(),
    }
}

pub async fn execute(args: Args) -> Result<()> {
    match args.command {
        Command::Prepare {
            config,
            preset,
            controller_disabled,
            charmcraft_channel,
            snapcraft_channel,
            rockcraft_channel,
            controller_channel,
            kube_canonical_channel,
            kube_micro_channel,
            local_container_channel,
            public_cloud_credential_file,
            extra_snaps,
            extra_debs,
            trace,
        } => {
            concierge_core::logging::init()?;
            let _scope = request_scope("prepare");

            let cli_overrides = overrides_from_args(
                controller_disabled,
                charmcraft_channel,
                snapcraft_channel,
                rockcraft_channel,
                controller_channel,
                kube_canonical_channel,
                kube_micro_channel,
                local_container_channel,
                public_cloud_credential_file,
                extra_snaps,
                extra_debs,
            );
            let overrides = merge_overrides(cli_overrides, get_env_overrides());

            let mut config = load_config(&config, &preset, Some(overrides))?;
            config.trace = trace;

            let mut manager = Manager::new(config, trace, Box::new(SnapdClient::default()));
            manager.prepare().await
        }
        Command::Restore { trace } => {
            concierge_core::logging::init()?;
            let _scope = request_scope("restore");

            let overrides = merge_overrides(ConfigOverrides::default(), get_env_overrides());
            let config = load_config("", "", Some(overrides))?;

            let mut manager = Manager::new(config, trace, Box::new(SnapdClient::default()));
            manager.restore().await
        }
        Command::Status => {
            concierge_core::logging::init()?;
            let _scope = request_scope("status");

            let config = load_config("", "", None)?;
            let manager = Manager::new(config, false, Box::new(SnapdClient::default()));
            let status = manager.status().await?;
            println!("{status:?}");
            Ok(())
        }
    }
}
