//! Scripted test doubles: a decision client and a recording sleeper.
//!
//! Shipped as a public module so hosts can exercise their reducers and
//! action spaces offline, without a decision service or real sleeping.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{DecisionClient, WorkerDescriptor};
use crate::error::ClientError;
use crate::retry::Sleeper;
use crate::types::ActionResponse;

/// One recorded call against the mock client.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateAgent {
        name: String,
        description: String,
        goal: String,
    },
    CreateMap {
        worker_ids: Vec<String>,
    },
    SetTask {
        agent_id: String,
        task: String,
    },
    NextWorkerAction {
        agent_id: String,
        submission_id: String,
        payload: Value,
    },
    NextAgentAction {
        agent_id: String,
        payload: Value,
    },
}

/// Decision client replaying a scripted queue of responses.
///
/// Step queries pop the queue front; an exhausted queue answers with a bare
/// `is_finished` response so runs always terminate. Registration calls
/// return fixed ids. Every call is recorded for assertions.
#[derive(Debug, Default)]
pub struct MockDecisionClient {
    responses: Mutex<VecDeque<Result<ActionResponse, ClientError>>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockDecisionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted response for the next step query.
    pub fn enqueue(&self, response: ActionResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error for the next step query.
    pub fn enqueue_error(&self, error: ClientError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Everything recorded so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of step queries (worker or agent) answered, retries included.
    pub fn decision_requests(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    MockCall::NextWorkerAction { .. } | MockCall::NextAgentAction { .. }
                )
            })
            .count()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_response(&self) -> Result<ActionResponse, ClientError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ActionResponse {
                    is_finished: true,
                    ..ActionResponse::default()
                })
            })
    }
}

#[async_trait]
impl DecisionClient for MockDecisionClient {
    async fn create_agent(
        &self,
        name: &str,
        description: &str,
        goal: &str,
    ) -> Result<String, ClientError> {
        self.record(MockCall::CreateAgent {
            name: name.to_string(),
            description: description.to_string(),
            goal: goal.to_string(),
        });
        Ok("agent-1".to_string())
    }

    async fn create_map(&self, workers: &[WorkerDescriptor]) -> Result<String, ClientError> {
        self.record(MockCall::CreateMap {
            worker_ids: workers.iter().map(|w| w.id.clone()).collect(),
        });
        Ok("map-1".to_string())
    }

    async fn set_task(&self, agent_id: &str, task: &str) -> Result<String, ClientError> {
        self.record(MockCall::SetTask {
            agent_id: agent_id.to_string(),
            task: task.to_string(),
        });
        Ok("submission-1".to_string())
    }

    async fn next_worker_action(
        &self,
        agent_id: &str,
        submission_id: &str,
        payload: &Value,
    ) -> Result<ActionResponse, ClientError> {
        self.record(MockCall::NextWorkerAction {
            agent_id: agent_id.to_string(),
            submission_id: submission_id.to_string(),
            payload: payload.clone(),
        });
        self.next_response()
    }

    async fn next_agent_action(
        &self,
        agent_id: &str,
        payload: &Value,
    ) -> Result<ActionResponse, ClientError> {
        self.record(MockCall::NextAgentAction {
            agent_id: agent_id.to_string(),
            payload: payload.clone(),
        });
        self.next_response()
    }
}

/// Sleeper that records requested durations and never actually waits.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
