//! Snapd HTTP API client (C2, spec §4.3). Speaks HTTP/1.1 over the
//! daemon's Unix-domain socket; the `Host` header is nominal since the
//! connector supplies the socket path directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::models::{SnapInfo, SnapSource};
use concierge_core::retry::{self, RetryBounds, RetryLimit};
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyperlocal::{UnixClientExt, UnixConnector, Uri as UnixUri};
use serde_json::Value;
use tracing::debug;

/// Canonical snapd socket path.
pub const SNAPD_SOCKET: &str = "/run/snapd.socket";

/// Retry bounds for every daemon call (spec §4.3): [1s, 10s], 10 attempts.
const SNAPD_RETRY_BOUNDS: RetryBounds = RetryBounds { min: Duration::from_secs(1), max: Duration::from_secs(10) };
const SNAPD_MAX_ATTEMPTS: u32 = 10;

/// Substrings (case-insensitive) that mark a daemon error as permanent —
/// must not be retried, must be re-raised immediately (spec §4.3).
const PERMANENT_ERROR_SUBSTRINGS: &[&str] = &["snap not installed", "not found", "snap not available", "invalid"];

pub struct SnapdClient {
    socket_path: PathBuf,
    client: Client<UnixConnector, Empty<Bytes>>,
}

impl Default for SnapdClient {
    fn default() -> Self {
        Self::new(SNAPD_SOCKET)
    }
}

impl SnapdClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        SnapdClient { socket_path: socket_path.into(), client: Client::unix() }
    }

    async fn snap_installed_info(&self, name: &str) -> Result<(bool, String)> {
        match self.get_snap(name).await {
            Ok(snap) => {
                if snap.get("status").and_then(Value::as_str) == Some("active") {
                    let tracking = snap
                        .get("tracking-channel")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .or_else(|| snap.get("channel").and_then(Value::as_str))
                        .unwrap_or("")
                        .to_string();
                    Ok((true, tracking))
                } else {
                    Ok((false, String::new()))
                }
            }
            Err(e) if is_permanent(&e) && e.to_string().to_lowercase().contains("snap not installed") => {
                Ok((false, String::new()))
            }
            Err(e) => Err(e),
        }
    }

    async fn snap_is_classic(&self, name: &str, channel: &str) -> bool {
        let store_info = match self.find_snap(name).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(snap = name, error = %e, "failed to check snap confinement");
                return false;
            }
        };

        if !channel.is_empty() {
            if let Some(confinement) =
                store_info.get("channels").and_then(|c| c.get(channel)).and_then(|c| c.get("confinement")).and_then(Value::as_str)
            {
                return confinement == "classic";
            }
        }

        store_info.get("confinement").and_then(Value::as_str) == Some("classic")
    }

    async fn get_snap(&self, name: &str) -> Result<Value> {
        self.with_retry(|| self.request("GET", &format!("/v2/snaps/{name}"))).await
    }

    async fn find_snap(&self, name: &str) -> Result<Value> {
        self.with_retry(|| async {
            let result = self.request("GET", &format!("/v2/find?name={name}")).await?;
            match result {
                Value::Array(items) => items
                    .iter()
                    .find(|s| s.get("name").and_then(Value::as_str) == Some(name))
                    .or_else(|| items.first())
                    .cloned()
                    .ok_or_else(|| ConciergeError::Daemon(format!("snap '{name}' not found in store"))),
                _ => Err(ConciergeError::Daemon(format!("snap '{name}' not found in store"))),
            }
        })
        .await
    }

    async fn with_retry<T, Fut>(&self, attempt: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = Result<T>>,
    {
        retry::retry(SNAPD_RETRY_BOUNDS, RetryLimit::MaxAttempts(SNAPD_MAX_ATTEMPTS), is_permanent, attempt).await
    }

    async fn request(&self, method: &str, endpoint: &str) -> Result<Value> {
        if !Path::new(&self.socket_path).exists() {
            return Err(ConciergeError::ConfigurationInvalid(format!(
                "snapd socket not found at {}",
                self.socket_path.display()
            )));
        }

        let uri: hyper::Uri = UnixUri::new(&self.socket_path, endpoint).into();
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", "localhost")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ConciergeError::Daemon(e.to_string()))?;

        debug!(endpoint, "querying snapd API");

        let response =
            tokio::time::timeout(Duration::from_secs(30), self.client.request(request))
                .await
                .map_err(|_| ConciergeError::Daemon(format!("timed out querying {endpoint}")))?
                .map_err(|e| ConciergeError::Daemon(e.to_string()))?;

        let body = response.into_body().collect().await.map_err(|e| ConciergeError::Daemon(e.to_string()))?.to_bytes();

        let parsed: Value = serde_json::from_slice(&body).map_err(|e| ConciergeError::Daemon(e.to_string()))?;

        let status_code = parsed.get("status-code").and_then(Value::as_i64);
        if status_code != Some(200) {
            let message = parsed
                .get("result")
                .and_then(|r| r.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ConciergeError::Daemon(message.to_string()));
        }

        Ok(parsed.get("result").cloned().unwrap_or(Value::Null))
    }
}

fn is_permanent(err: &ConciergeError) -> bool {
    let text = err.to_string().to_lowercase();
    PERMANENT_ERROR_SUBSTRINGS.iter().any(|needle| text.contains(needle))
}

#[async_trait]
impl SnapSource for SnapdClient {
    async fn snap_info(&self, name: &str, channel: &str) -> Result<SnapInfo> {
        let (installed, tracking_channel) = self.snap_installed_info(name).await?;
        let classic = self.snap_is_classic(name, channel).await;

        debug!(snap = name, installed, classic, tracking = %tracking_channel, "queried snapd API");

        Ok(SnapInfo { installed, classic, tracking_channel })
    }

    async fn snap_channels(&self, name: &str) -> Result<Vec<String>> {
        let store_info = self.find_snap(name).await?;
        let Some(channels) = store_info.get("channels").and_then(Value::as_object) else {
            return Ok(Vec::new());
        };
        let mut names: Vec<String> = channels.keys().cloned().collect();
        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_error_classification_is_case_insensitive() {
        let err = ConciergeError::Daemon("Snap Not Installed".to_string());
        assert!(is_permanent(&err));
    }

    #[test]
    fn generic_transport_error_is_not_permanent() {
        let err = ConciergeError::Daemon("connection reset by peer".to_string());
        assert!(!is_permanent(&err));
    }

    #[tokio::test]
    async fn missing_socket_is_fatal_not_retried() {
        let client = SnapdClient::new("/nonexistent/snapd.socket");
        let err = client.get_snap("core").await.unwrap_err();
        assert!(matches!(err, ConciergeError::ConfigurationInvalid(_)));
    }
}
