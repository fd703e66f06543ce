//! The worker loop: one action space, one reducer, one task at a time.
//!
//! INIT -> REQUEST_DECISION -> DISPATCH -> REDUCE_STATE, repeating until
//! the decision service signals completion, the step limit trips, or the
//! host cancels at an iteration boundary.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::DecisionClient;
use crate::error::{RegistryError, RunError};
use crate::executor::Executor;
use crate::registry::FunctionRegistry;
use crate::retry::{retry_with_backoff, RetryConfig, Sleeper, TokioSleeper};
use crate::state::{Session, SharedReducer, State, StateReducer};
use crate::types::Function;

/// Declared identity and behavior of one worker.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Identity, also the name registered with the decision service
    pub id: String,
    /// Human-readable description surfaced for routing
    pub description: String,
    /// Optional standing instruction, registered as the worker's goal
    pub instruction: Option<String>,
    /// State reducer owning this worker's state transitions
    pub reducer: SharedReducer,
    /// Ordered action space
    pub action_space: Vec<Function>,
}

impl WorkerConfig {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        reducer: impl StateReducer + 'static,
        action_space: Vec<Function>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            instruction: None,
            reducer: Arc::new(reducer),
            action_space,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }
}

// Reducers are plain closures more often than not; keep Debug useful
// without demanding Debug of them.
impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("instruction", &self.instruction)
            .field("action_space", &self.action_space)
            .finish_non_exhaustive()
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    Failed,
}

/// What a completed run looked like.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Completed loop iterations (decision request + optional dispatch)
    pub steps: usize,
    /// Functions actually dispatched
    pub dispatches: usize,
    /// Final state as produced by the last reducer call
    pub state: State,
    /// Most recent plain-text message from the decision service
    pub last_message: Option<String>,
}

/// Single action-space execution loop.
///
/// The registry is fixed at construction; duplicate function names fail
/// here, before anything touches the network. One worker drives one run at
/// a time; independent runs belong on independent workers.
pub struct Worker {
    config: WorkerConfig,
    registry: FunctionRegistry,
    client: Arc<dyn DecisionClient>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    max_steps: Option<usize>,
    cancel: Option<CancellationToken>,
    dispatch_on_finish: bool,
    agent_id: Option<String>,
}

impl Worker {
    pub fn new(
        client: Arc<dyn DecisionClient>,
        config: WorkerConfig,
    ) -> Result<Self, RegistryError> {
        let registry = FunctionRegistry::from_action_space(config.action_space.clone())?;
        Ok(Self {
            config,
            registry,
            client,
            retry: RetryConfig::default(),
            sleeper: Arc::new(TokioSleeper),
            max_steps: None,
            cancel: None,
            dispatch_on_finish: true,
            agent_id: None,
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// End the run with a `Failed` report after this many iterations
    /// without completion.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Token observed only at iteration boundaries, never mid-call.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether a final `is_finished` response that still names a function
    /// call dispatches it before terminating. Defaults to true.
    pub fn with_dispatch_on_finish(mut self, dispatch: bool) -> Self {
        self.dispatch_on_finish = dispatch;
        self
    }

    /// Reuse an existing server-side record instead of registering one.
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Drive one task to completion.
    pub async fn run(&mut self, task: &str) -> Result<RunReport, RunError> {
        let agent_id = self.ensure_registered().await?;
        info!(worker = %self.config.id, %task, "Starting worker run");

        // INIT: the reducer's deterministic initial state.
        let mut state = self.config.reducer.reduce(None, None);
        let mut session = Session::new(task);

        let submission_id = {
            let client = Arc::clone(&self.client);
            let agent_id = agent_id.clone();
            let task = task.to_string();
            retry_with_backoff(&self.retry, self.sleeper.as_ref(), move || {
                let client = Arc::clone(&client);
                let agent_id = agent_id.clone();
                let task = task.clone();
                async move { client.set_task(&agent_id, &task).await }
            })
            .await?
        };
        debug!(worker = %self.config.id, %submission_id, "Task submitted");
        session.submission_id = Some(submission_id.clone());

        let mut steps = 0usize;
        let mut dispatches = 0usize;
        let mut last_message: Option<String> = None;

        loop {
            // REQUEST_DECISION, wrapped in the backoff policy.
            let payload = self.decision_payload(&state, &session);
            let response = {
                let client = Arc::clone(&self.client);
                let agent_id = agent_id.clone();
                let submission_id = submission_id.clone();
                retry_with_backoff(&self.retry, self.sleeper.as_ref(), move || {
                    let client = Arc::clone(&client);
                    let agent_id = agent_id.clone();
                    let submission_id = submission_id.clone();
                    let payload = payload.clone();
                    async move {
                        client
                            .next_worker_action(&agent_id, &submission_id, &payload)
                            .await
                    }
                })
                .await?
            };

            if let Some(message) = &response.message {
                info!(worker = %self.config.id, %message, "Decision message");
                last_message = Some(message.clone());
            }

            // DISPATCH then REDUCE_STATE. A finished response may still
            // carry a final call: dispatch-before-terminate by default.
            if let Some(call) = &response.function_call {
                if !response.is_finished || self.dispatch_on_finish {
                    let function = self.registry.lookup(&call.fn_name).map_err(|e| {
                        RunError::Protocol(format!(
                            "decision service named an action outside the declared space: {e}"
                        ))
                    })?;
                    let result = Executor::execute(function, &call.args).await;
                    dispatches += 1;
                    state = self.config.reducer.reduce(Some(&result), Some(&state));
                    session.record_result(result);
                } else {
                    debug!(
                        worker = %self.config.id,
                        function = %call.fn_name,
                        "Final call skipped, dispatch_on_finish disabled"
                    );
                }
            }

            steps += 1;

            if response.is_finished {
                info!(worker = %self.config.id, steps, dispatches, "Run finished");
                return Ok(RunReport {
                    status: RunStatus::Done,
                    steps,
                    dispatches,
                    state,
                    last_message,
                });
            }

            // Iteration boundary: the only cancellation point.
            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    warn!(worker = %self.config.id, "Run cancelled at iteration boundary");
                    return Err(RunError::Cancelled);
                }
            }
            if let Some(limit) = self.max_steps {
                if steps >= limit {
                    warn!(worker = %self.config.id, limit, "Step limit reached");
                    return Ok(RunReport {
                        status: RunStatus::Failed,
                        steps,
                        dispatches,
                        state,
                        last_message: Some(format!(
                            "step limit of {limit} reached before the task finished"
                        )),
                    });
                }
            }
        }
    }

    /// Create the server-side record on first use.
    async fn ensure_registered(&mut self) -> Result<String, RunError> {
        if let Some(id) = &self.agent_id {
            return Ok(id.clone());
        }
        let goal = self.config.instruction.clone().unwrap_or_default();
        let id = {
            let client = Arc::clone(&self.client);
            let name = self.config.id.clone();
            let description = self.config.description.clone();
            retry_with_backoff(&self.retry, self.sleeper.as_ref(), move || {
                let client = Arc::clone(&client);
                let name = name.clone();
                let description = description.clone();
                let goal = goal.clone();
                async move { client.create_agent(&name, &description, &goal).await }
            })
            .await?
        };
        info!(worker = %self.config.id, agent_id = %id, "Registered worker record");
        self.agent_id = Some(id.clone());
        Ok(id)
    }

    /// The step-query payload: serialized state, the ordered action space
    /// declarations, and the session context (task, accumulated query/route
    /// history, latest result).
    fn decision_payload(&self, state: &State, session: &Session) -> Value {
        json!({
            "state": state,
            "functions": self.registry.declarations(),
            "task": session.task,
            "previous_queries": session.queries(),
            "previous_routes": session.routes(),
            "last_result": session.last_result,
        })
    }
}
