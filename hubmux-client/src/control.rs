//! Hub control API client
//!
//! Thin JSON client over the Hub's REST endpoints. Failures are returned
//! to the caller untouched; nothing here retries.

use std::time::{Duration, Instant};

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use hubmux_protocol::{AgentPolicy, AgentRecord, AgentSummary, HubStatus, PolicyPatch};
use hubmux_utils::{HubmuxError, Result};

/// Default control API base URL
pub const DEFAULT_HUB_URL: &str = "http://localhost:9000";

/// Timeout for a single health check
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Default overall wait in [`ControlClient::wait_until_alive`]
pub const ALIVE_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default poll interval in [`ControlClient::wait_until_alive`]
pub const ALIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Client for the Hub control API
#[derive(Debug, Clone)]
pub struct ControlClient {
    base: Url,
    http: reqwest::Client,
}

impl ControlClient {
    /// Create a client for the Hub at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| HubmuxError::config(format!("Invalid Hub URL '{}': {}", base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(HubmuxError::config(format!(
                "Hub URL must be http or https, got '{}'",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("hubmux/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HubmuxError::http(e.to_string()))?;

        Ok(Self { base, http })
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| HubmuxError::internal(format!("Bad endpoint path '{}': {}", path, e)))
    }

    fn agent_endpoint(&self, agent_id: &str, suffix: &str) -> Result<Url> {
        let mut url = self.endpoint("/api/agents/")?;
        url.path_segments_mut()
            .map_err(|_| HubmuxError::internal("Hub URL cannot be a base"))?
            .pop_if_empty()
            .push(agent_id)
            .extend(suffix.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        trace!(%method, %url, "Control request");
        self.http.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| HubmuxError::http(e.to_string()))?;
        decode(response).await
    }

    /// `GET /api/status`
    pub async fn status(&self) -> Result<HubStatus> {
        let url = self.endpoint("/api/status")?;
        self.send(self.request(Method::GET, url)).await
    }

    /// `GET /api/agents`
    pub async fn list(&self) -> Result<Vec<AgentSummary>> {
        let url = self.endpoint("/api/agents")?;
        self.send(self.request(Method::GET, url)).await
    }

    /// `GET /api/agents/{id}`
    pub async fn get(&self, agent_id: &str) -> Result<AgentRecord> {
        let url = self.agent_endpoint(agent_id, "")?;
        self.send(self.request(Method::GET, url)).await
    }

    /// `POST /api/agents/{id}/start`
    pub async fn start(&self, agent_id: &str) -> Result<AgentRecord> {
        let url = self.agent_endpoint(agent_id, "start")?;
        self.send(self.request(Method::POST, url)).await
    }

    /// `POST /api/agents/{id}/stop`
    pub async fn stop(&self, agent_id: &str) -> Result<AgentRecord> {
        let url = self.agent_endpoint(agent_id, "stop")?;
        self.send(self.request(Method::POST, url)).await
    }

    /// `POST /api/agents/{id}/restart-session`
    pub async fn restart_session(&self, agent_id: &str) -> Result<AgentRecord> {
        let url = self.agent_endpoint(agent_id, "restart-session")?;
        self.send(self.request(Method::POST, url)).await
    }

    /// `GET /api/agents/{id}/policy`
    pub async fn get_policy(&self, agent_id: &str) -> Result<AgentPolicy> {
        let url = self.agent_endpoint(agent_id, "policy")?;
        self.send(self.request(Method::GET, url)).await
    }

    /// `PUT /api/agents/{id}/policy`
    pub async fn set_policy(&self, agent_id: &str, policy: &AgentPolicy) -> Result<AgentPolicy> {
        let url = self.agent_endpoint(agent_id, "policy")?;
        self.send(self.request(Method::PUT, url).json(policy)).await
    }

    /// Apply a partial update on top of the current policy.
    ///
    /// The Hub only accepts whole policies, so this reads, merges, and
    /// writes. An empty patch skips the write.
    pub async fn update_policy(&self, agent_id: &str, patch: &PolicyPatch) -> Result<AgentPolicy> {
        let current = self.get_policy(agent_id).await?;
        if patch.is_empty() {
            return Ok(current);
        }
        self.set_policy(agent_id, &current.patched(patch)).await
    }

    /// `GET /api/health` with a short timeout. Never fails.
    pub async fn is_alive(&self) -> bool {
        let Ok(url) = self.endpoint("/api/health") else {
            return false;
        };
        match self
            .request(Method::GET, url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    /// Poll [`ControlClient::is_alive`] every `interval` until it succeeds
    /// or `timeout` passes.
    pub async fn wait_until_alive(&self, timeout: Duration, interval: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.is_alive().await {
                return true;
            }
            if start.elapsed() >= timeout {
                debug!(timeout_ms = timeout.as_millis() as u64, "Hub did not come up");
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HubmuxError::Api {
            status: status.as_u16(),
            body: api_detail(&body),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| HubmuxError::InvalidMessage(format!("Unexpected response body: {}", e)))
}

/// The Hub wraps errors as `{"detail": "..."}`; fall back to the raw body
fn api_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubmux_protocol::{AgentState, LaunchPolicy, ShutdownPolicy};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(id: &str, state: &str) -> serde_json::Value {
        json!({
            "id": id,
            "state": state,
            "policy": {"launch": "manual", "shutdown": "manual", "idle_timeout_minutes": 30},
            "container_id": null,
            "started_at": null,
            "last_activity": null,
            "inbox_count": 1,
            "pty_attached": false,
            "session_alive": false
        })
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(ControlClient::new("not a url").is_err());
        assert!(ControlClient::new("ws://localhost:9000").is_err());
        assert!(ControlClient::new(DEFAULT_HUB_URL).is_ok());
    }

    #[test]
    fn test_agent_endpoint_escapes_id() {
        let client = ControlClient::new("http://hub:9000").unwrap();
        assert_eq!(
            client.agent_endpoint("qa", "policy").unwrap().as_str(),
            "http://hub:9000/api/agents/qa/policy"
        );
        assert_eq!(
            client.agent_endpoint("a b", "").unwrap().as_str(),
            "http://hub:9000/api/agents/a%20b"
        );
    }

    #[test]
    fn test_api_detail() {
        assert_eq!(api_detail(r#"{"detail":"Agent not found: zz"}"#), "Agent not found: zz");
        assert_eq!(api_detail("plain text"), "plain text");
    }

    #[tokio::test]
    async fn test_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "agents": [{"id": "claude", "state": "running", "inbox_count": 2, "launch_policy": "always_on"}],
                "uptime_seconds": 42.0
            })))
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        let status = client.status().await.unwrap();
        assert_eq!(status.agents.len(), 1);
        assert_eq!(status.agents[0].state, AgentState::Running);
        assert_eq!(status.uptime_seconds, 42.0);
    }

    #[tokio::test]
    async fn test_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "qa", "state": "stopped", "inbox_count": 0, "launch_policy": "manual"},
                {"id": "bu", "state": "stale", "inbox_count": 3, "launch_policy": "auto_on_task"}
            ])))
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        let agents = client.list().await.unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[1].state, AgentState::Stale);
        assert_eq!(agents[1].launch_policy, LaunchPolicy::AutoOnTask);
    }

    #[tokio::test]
    async fn test_get_and_start() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents/qa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(record("qa", "stopped")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/agents/qa/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(record("qa", "starting")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        assert_eq!(client.get("qa").await.unwrap().state, AgentState::Stopped);
        assert_eq!(client.start("qa").await.unwrap().state, AgentState::Starting);
    }

    #[tokio::test]
    async fn test_stop_and_restart_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/qa/stop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(record("qa", "stopping")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/agents/qa/restart-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(record("qa", "running")))
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        assert_eq!(client.stop("qa").await.unwrap().state, AgentState::Stopping);
        assert_eq!(
            client.restart_session("qa").await.unwrap().state,
            AgentState::Running
        );
    }

    #[tokio::test]
    async fn test_not_found_is_typed_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/zz/start"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Agent not found: zz"})),
            )
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        let err = client.start("zz").await.unwrap_err();
        match err {
            HubmuxError::Api { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "Agent not found: zz");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conflict_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/qa/start"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already running"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        let err = client.start("qa").await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_policy_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents/qa/policy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "launch": "manual", "shutdown": "manual", "idle_timeout_minutes": 30
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/agents/qa/policy"))
            .and(body_json(json!({
                "launch": "manual", "shutdown": "idle_timeout", "idle_timeout_minutes": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "launch": "manual", "shutdown": "idle_timeout", "idle_timeout_minutes": 10
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        let patch = PolicyPatch {
            shutdown: Some(ShutdownPolicy::IdleTimeout),
            idle_timeout_minutes: Some(10),
            ..Default::default()
        };
        let policy = client.update_policy("qa", &patch).await.unwrap();
        assert_eq!(policy.shutdown, ShutdownPolicy::IdleTimeout);
        assert_eq!(policy.idle_timeout_minutes, 10);
    }

    #[tokio::test]
    async fn test_empty_patch_skips_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents/qa/policy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "launch": "always_on", "shutdown": "manual", "idle_timeout_minutes": 30
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        let policy = client
            .update_policy("qa", &PolicyPatch::default())
            .await
            .unwrap();
        assert_eq!(policy.launch, LaunchPolicy::AlwaysOn);
    }

    #[tokio::test]
    async fn test_is_alive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        assert!(client.is_alive().await);
    }

    #[tokio::test]
    async fn test_is_alive_false_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        assert!(!client.is_alive().await);
    }

    #[tokio::test]
    async fn test_is_alive_false_on_slow_hub() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        assert!(!client.is_alive().await);
    }

    #[tokio::test]
    async fn test_wait_until_alive_gives_up() {
        // Nothing listens here
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ControlClient::new(&format!("http://{}", addr)).unwrap();
        let alive = client
            .wait_until_alive(Duration::from_millis(200), Duration::from_millis(50))
            .await;
        assert!(!alive);
    }

    #[tokio::test]
    async fn test_wait_until_alive_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ControlClient::new(&server.uri()).unwrap();
        assert!(
            client
                .wait_until_alive(ALIVE_WAIT_TIMEOUT, ALIVE_POLL_INTERVAL)
                .await
        );
    }
}
