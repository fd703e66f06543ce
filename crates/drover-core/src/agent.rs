//! Agent: multiple workers behind one routing decision.
//!
//! An agent-level decision call both routes (which worker's action space is
//! eligible this step) and proposes the next action. The routed worker's
//! registry and reducer serve that step only; an agent-level reducer folds
//! the same result into agent state.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{DecisionClient, WorkerDescriptor};
use crate::error::RunError;
use crate::executor::Executor;
use crate::registry::FunctionRegistry;
use crate::retry::{retry_with_backoff, RetryConfig, Sleeper, TokioSleeper};
use crate::state::{Session, SharedReducer, State, StateReducer};
use crate::worker::{RunReport, RunStatus, Worker, WorkerConfig};

/// Declared identity and composition of an agent.
#[derive(Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub goal: String,
    /// Agent-level reducer aggregating or overriding worker state
    pub reducer: SharedReducer,
    pub workers: Vec<WorkerConfig>,
}

impl AgentConfig {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        goal: impl Into<String>,
        reducer: impl StateReducer + 'static,
        workers: Vec<WorkerConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            goal: goal.into(),
            reducer: Arc::new(reducer),
            workers,
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("goal", &self.goal)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// Per-worker runtime: fixed registry plus that worker's own state slot.
struct WorkerRuntime {
    config: WorkerConfig,
    registry: FunctionRegistry,
    state: Option<State>,
}

/// Orchestrator composing multiple workers plus a routing decision.
pub struct Agent {
    config: AgentConfig,
    client: Arc<dyn DecisionClient>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    max_steps: Option<usize>,
    cancel: Option<CancellationToken>,
    dispatch_on_finish: bool,
    runtimes: Vec<WorkerRuntime>,
    agent_id: Option<String>,
    map_id: Option<String>,
}

impl Agent {
    /// Build the agent and every worker's registry. Duplicate function
    /// names within a worker, or duplicate worker ids, fail here.
    pub fn new(client: Arc<dyn DecisionClient>, config: AgentConfig) -> Result<Self, RunError> {
        let mut runtimes = Vec::with_capacity(config.workers.len());
        for worker in &config.workers {
            if runtimes
                .iter()
                .any(|r: &WorkerRuntime| r.config.id == worker.id)
            {
                return Err(RunError::Config(format!(
                    "duplicate worker id `{}`",
                    worker.id
                )));
            }
            runtimes.push(WorkerRuntime {
                config: worker.clone(),
                registry: FunctionRegistry::from_action_space(worker.action_space.clone())?,
                state: None,
            });
        }
        if runtimes.is_empty() {
            return Err(RunError::Config("agent needs at least one worker".into()));
        }
        Ok(Self {
            config,
            client,
            retry: RetryConfig::default(),
            sleeper: Arc::new(TokioSleeper),
            max_steps: None,
            cancel: None,
            dispatch_on_finish: true,
            runtimes,
            agent_id: None,
            map_id: None,
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

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_dispatch_on_finish(mut self, dispatch: bool) -> Self {
        self.dispatch_on_finish = dispatch;
        self
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    /// Register the agent record and the worker routing map server-side.
    /// Must run before `run()`.
    pub async fn compile(&mut self) -> Result<(), RunError> {
        let agent_id = {
            let client = Arc::clone(&self.client);
            let name = self.config.name.clone();
            let description = self.config.description.clone();
            let goal = self.config.goal.clone();
            retry_with_backoff(&self.retry, self.sleeper.as_ref(), move || {
                let client = Arc::clone(&client);
                let name = name.clone();
                let description = description.clone();
                let goal = goal.clone();
                async move { client.create_agent(&name, &description, &goal).await }
            })
            .await?
        };

        let descriptors: Vec<WorkerDescriptor> = self
            .runtimes
            .iter()
            .map(|r| WorkerDescriptor {
                id: r.config.id.clone(),
                name: r.config.id.clone(),
                description: r.config.description.clone(),
            })
            .collect();
        let map_id = {
            let client = Arc::clone(&self.client);
            let descriptors = descriptors.clone();
            retry_with_backoff(&self.retry, self.sleeper.as_ref(), move || {
                let client = Arc::clone(&client);
                let descriptors = descriptors.clone();
                async move { client.create_map(&descriptors).await }
            })
            .await?
        };

        info!(agent = %self.config.name, %agent_id, %map_id, "Agent compiled");
        self.agent_id = Some(agent_id);
        self.map_id = Some(map_id);
        Ok(())
    }

    /// Drive the agent until the decision service finishes, the step limit
    /// trips, or the host cancels.
    pub async fn run(&mut self) -> Result<RunReport, RunError> {
        let agent_id = self
            .agent_id
            .clone()
            .ok_or_else(|| RunError::Config("agent must be compiled before run".into()))?;
        info!(agent = %self.config.name, %agent_id, "Starting agent run");

        let agent_reducer = Arc::clone(&self.config.reducer);
        let mut agent_state = agent_reducer.reduce(None, None);
        let mut session = Session::new(&self.config.goal);

        let mut current = 0usize;
        let mut steps = 0usize;
        let mut dispatches = 0usize;
        let mut last_message: Option<String> = None;

        loop {
            // Routing context travels with the step query: the currently
            // routed worker's state and declared action space.
            let payload = {
                let runtime = &mut self.runtimes[current];
                if runtime.state.is_none() {
                    runtime.state = Some(runtime.config.reducer.reduce(None, None));
                }
                json!({
                    "state": agent_state,
                    "task": session.task,
                    "previous_queries": session.queries(),
                    "previous_routes": session.routes(),
                    "last_result": session.last_result,
                    "worker": {
                        "id": runtime.config.id,
                        "state": runtime.state,
                        "functions": runtime.registry.declarations(),
                    },
                })
            };

            let response = {
                let client = Arc::clone(&self.client);
                let agent_id = agent_id.clone();
                retry_with_backoff(&self.retry, self.sleeper.as_ref(), move || {
                    let client = Arc::clone(&client);
                    let agent_id = agent_id.clone();
                    let payload = payload.clone();
                    async move { client.next_agent_action(&agent_id, &payload).await }
                })
                .await?
            };

            // Routing sub-step: the response may move the spotlight before
            // this step's dispatch.
            if let Some(worker_id) = &response.current_worker {
                current = self
                    .runtimes
                    .iter()
                    .position(|r| r.config.id == *worker_id)
                    .ok_or_else(|| {
                        RunError::Protocol(format!("routed to unknown worker `{worker_id}`"))
                    })?;
                debug!(agent = %self.config.name, worker = %worker_id, "Routed");
            }

            if let Some(message) = &response.message {
                info!(agent = %self.config.name, %message, "Decision message");
                last_message = Some(message.clone());
            }

            if let Some(call) = &response.function_call {
                if !response.is_finished || self.dispatch_on_finish {
                    let runtime = &mut self.runtimes[current];
                    let result = {
                        let function = runtime.registry.lookup(&call.fn_name).map_err(|e| {
                            RunError::Protocol(format!(
                                "decision service named an action outside worker `{}`: {e}",
                                runtime.config.id
                            ))
                        })?;
                        Executor::execute(function, &call.args).await
                    };
                    dispatches += 1;
                    let previous = runtime
                        .state
                        .take()
                        .unwrap_or_else(|| runtime.config.reducer.reduce(None, None));
                    runtime.state = Some(
                        runtime
                            .config
                            .reducer
                            .reduce(Some(&result), Some(&previous)),
                    );
                    agent_state = agent_reducer.reduce(Some(&result), Some(&agent_state));
                    session.record_result(result);
                }
            }

            steps += 1;

            if response.is_finished {
                info!(agent = %self.config.name, steps, dispatches, "Agent run finished");
                return Ok(RunReport {
                    status: RunStatus::Done,
                    steps,
                    dispatches,
                    state: agent_state,
                    last_message,
                });
            }

            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    warn!(agent = %self.config.name, "Run cancelled at iteration boundary");
                    return Err(RunError::Cancelled);
                }
            }
            if let Some(limit) = self.max_steps {
                if steps >= limit {
                    warn!(agent = %self.config.name, limit, "Step limit reached");
                    return Ok(RunReport {
                        status: RunStatus::Failed,
                        steps,
                        dispatches,
                        state: agent_state,
                        last_message: Some(format!(
                            "step limit of {limit} reached before the task finished"
                        )),
                    });
                }
            }
        }
    }

    /// Hand out a standalone worker for direct `run(task)` use, sharing
    /// this agent's client and policies.
    pub fn get_worker(&self, id: &str) -> Result<Worker, RunError> {
        let runtime = self
            .runtimes
            .iter()
            .find(|r| r.config.id == id)
            .ok_or_else(|| RunError::Config(format!("unknown worker `{id}`")))?;
        let worker = Worker::new(Arc::clone(&self.client), runtime.config.clone())?
            .with_retry_config(self.retry)
            .with_sleeper(Arc::clone(&self.sleeper))
            .with_dispatch_on_finish(self.dispatch_on_finish);
        Ok(worker)
    }
}
