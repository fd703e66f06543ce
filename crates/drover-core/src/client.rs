//! Decision-service client.
//!
//! The remote service proposes the next action; this module drives its
//! observable protocol: token exchange, agent/map registration, task
//! submission, and step queries. The planning logic itself is opaque.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::ClientError;
use crate::types::ActionResponse;

/// Default decision-service endpoints, overridable via configuration.
pub const DEFAULT_BASE_URL: &str = "https://api.drover.dev/v2";
pub const DEFAULT_TOKEN_URL: &str = "https://api.drover.dev/accesses/tokens";

/// One worker entry in the routing map registered for multi-worker agents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// The decision-service boundary.
///
/// Implementations must be `Send + Sync`; runs share a client behind `Arc`.
/// A scripted implementation lives in [`crate::mock`].
#[async_trait]
pub trait DecisionClient: Send + Sync {
    /// Create an agent or worker record, returning its id.
    async fn create_agent(
        &self,
        name: &str,
        description: &str,
        goal: &str,
    ) -> Result<String, ClientError>;

    /// Register the worker routing map for a multi-worker agent.
    async fn create_map(&self, workers: &[WorkerDescriptor]) -> Result<String, ClientError>;

    /// Bind a task to an agent record, returning the submission id.
    async fn set_task(&self, agent_id: &str, task: &str) -> Result<String, ClientError>;

    /// Request the next action for a standalone worker task.
    async fn next_worker_action(
        &self,
        agent_id: &str,
        submission_id: &str,
        payload: &Value,
    ) -> Result<ActionResponse, ClientError>;

    /// Request the next action (and routing) for a multi-worker agent.
    async fn next_agent_action(
        &self,
        agent_id: &str,
        payload: &Value,
    ) -> Result<ActionResponse, ClientError>;
}

/// HTTP implementation over the JSON `{"data": ...}` envelope protocol.
///
/// A fresh bearer token is derived per authorized call: token lifetime is
/// this client's concern, never the loop's, and tokens are not cached
/// across sessions.
#[derive(Debug, Clone)]
pub struct HttpDecisionClient {
    api_key: String,
    base_url: String,
    token_url: String,
    http: reqwest::Client,
}

impl HttpDecisionClient {
    /// Create a client with default endpoints and a 30s request timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_timeout(api_key, Duration::from_secs(30))
    }

    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            http,
        }
    }

    /// Build a client from resolved configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut client = Self::with_timeout(
            config.api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        );
        client.base_url = config.base_url.clone();
        client.token_url = config.token_url.clone();
        client
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Exchange the API key for a short-lived bearer token.
    async fn access_token(&self) -> Result<String, ClientError> {
        let response = self
            .http
            .post(&self.token_url)
            .header("x-api-key", &self.api_key)
            .json(&json!({"data": {}}))
            .send()
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;
        if !status.is_success() {
            return Err(ClientError::Auth(format!("HTTP {}: {}", status, body)));
        }
        body.get("data")
            .and_then(|d| d.get("accessToken"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Auth("response carried no accessToken".to_string()))
    }

    /// POST a `{"data": ...}` envelope with bearer auth; unwrap the
    /// response envelope.
    async fn post(&self, path: &str, data: Value) -> Result<Value, ClientError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Posting to decision service");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "data": data }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::http(status.as_u16(), text));
        }
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| ClientError::decode(format!("invalid JSON body: {e}")))?;
        body.get("data")
            .cloned()
            .ok_or_else(|| ClientError::decode("response carried no data envelope"))
    }

    fn id_from(data: &Value, context: &str) -> Result<String, ClientError> {
        data.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::decode(format!("{context} response carried no id")))
    }
}

#[async_trait]
impl DecisionClient for HttpDecisionClient {
    async fn create_agent(
        &self,
        name: &str,
        description: &str,
        goal: &str,
    ) -> Result<String, ClientError> {
        let data = self
            .post(
                "/agents",
                json!({"name": name, "description": description, "goal": goal}),
            )
            .await?;
        let id = Self::id_from(&data, "create_agent")?;
        debug!(agent_id = %id, %name, "Created agent record");
        Ok(id)
    }

    async fn create_map(&self, workers: &[WorkerDescriptor]) -> Result<String, ClientError> {
        let data = self.post("/maps", json!({ "locations": workers })).await?;
        let id = Self::id_from(&data, "create_map")?;
        debug!(map_id = %id, workers = workers.len(), "Registered worker map");
        Ok(id)
    }

    async fn set_task(&self, agent_id: &str, task: &str) -> Result<String, ClientError> {
        let data = self
            .post(&format!("/agents/{agent_id}/tasks"), json!({ "task": task }))
            .await?;
        // The service has returned the submission under either key.
        data.get("submission_id")
            .or_else(|| data.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::decode("task response carried no submission id"))
    }

    async fn next_worker_action(
        &self,
        agent_id: &str,
        submission_id: &str,
        payload: &Value,
    ) -> Result<ActionResponse, ClientError> {
        let data = self
            .post(
                &format!("/agents/{agent_id}/tasks/{submission_id}/next"),
                payload.clone(),
            )
            .await?;
        serde_json::from_value(data).map_err(|e| ClientError::decode(e.to_string()))
    }

    async fn next_agent_action(
        &self,
        agent_id: &str,
        payload: &Value,
    ) -> Result<ActionResponse, ClientError> {
        let data = self
            .post(&format!("/agents/{agent_id}/actions"), payload.clone())
            .await?;
        serde_json::from_value(data).map_err(|e| ClientError::decode(e.to_string()))
    }
}
