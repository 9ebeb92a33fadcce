//! Plan executor: package and provider handlers, the controller, and the
//! `Plan`/`Manager` that tie them together (spec §4.4-§4.8).

pub mod controller;
pub mod handler;
pub mod manager;
pub mod packages;
pub mod plan;
pub mod provider;
pub mod providers;

pub use controller::Controller;
pub use handler::{do_action, Action, Executable};
pub use manager::Manager;
pub use plan::Plan;
pub use provider::{create_all_providers, create_provider, Credentials, Provider, PROVIDER_ORDER};

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;

    use concierge_core::error::Result;
    use concierge_core::models::{SnapInfo, SnapSource};

    /// A `SnapSource` that reports nothing installed and no channels, for
    /// tests that never expect the snapd client to be consulted.
    pub struct NullSnapSource;

    #[async_trait]
    impl SnapSource for NullSnapSource {
        async fn snap_info(&self, _name: &str, _channel: &str) -> Result<SnapInfo> {
            Ok(SnapInfo::default())
        }
        async fn snap_channels(&self, _name: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }
}
