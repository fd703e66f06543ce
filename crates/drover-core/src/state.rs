//! State, the reducer contract, and run-scoped sessions.
//!
//! State is an immutable value replaced wholesale each step: the loop never
//! mutates it, only the reducer produces a new one.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::FunctionResult;

/// Opaque state owned by the host, produced solely by the reducer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Map<String, Value>);

impl State {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Functional update: returns a new state with the entry set.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for State {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Pure function folding a result into the next state.
///
/// Called once per step, after dispatch and before the next decision
/// request. The contract:
///
/// - With `previous_state == None` (only ever the first call) the reducer
///   must ignore `previous_result` and return a deterministic initial state.
/// - With a non-`None` state and a defensively absent result it must return
///   a well-defined state rather than faulting the loop.
/// - Same inputs, same output: no hidden process-global reads.
pub trait StateReducer: Send + Sync {
    fn reduce(
        &self,
        previous_result: Option<&FunctionResult>,
        previous_state: Option<&State>,
    ) -> State;
}

impl<F> StateReducer for F
where
    F: Fn(Option<&FunctionResult>, Option<&State>) -> State + Send + Sync,
{
    fn reduce(
        &self,
        previous_result: Option<&FunctionResult>,
        previous_state: Option<&State>,
    ) -> State {
        self(previous_result, previous_state)
    }
}

/// Shared handle to a reducer.
pub type SharedReducer = Arc<dyn StateReducer>;

/// One (query, route) pair retained from a step's result info.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub query: String,
    pub route: Value,
}

/// Run-scoped context: the task, the latest result, and accumulated
/// history. One session per `run()` invocation, discarded when it ends.
#[derive(Clone, Default)]
pub struct Session {
    pub task: String,
    pub submission_id: Option<String>,
    pub last_result: Option<FunctionResult>,
    pub history: Vec<HistoryEntry>,
}

impl Session {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            submission_id: None,
            last_result: None,
            history: Vec::new(),
        }
    }

    /// Queries accumulated so far, oldest first.
    pub fn queries(&self) -> Vec<&str> {
        self.history.iter().map(|h| h.query.as_str()).collect()
    }

    /// Routes paired one-to-one with the accumulated queries.
    pub fn routes(&self) -> Vec<&Value> {
        self.history.iter().map(|h| &h.route).collect()
    }

    /// Record a step result, accumulating (query, route) history when the
    /// result info carries those keys.
    pub fn record_result(&mut self, result: FunctionResult) {
        if let Some(query) = result.info.get("query").and_then(Value::as_str) {
            let route = result.info.get("route").cloned().unwrap_or(Value::Null);
            self.history.push(HistoryEntry {
                query: query.to_string(),
                route,
            });
        }
        self.last_result = Some(result);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("task", &self.task)
            .field("submission_id", &self.submission_id)
            .field("last_result", &self.last_result)
            .field("history_len", &self.history.len())
            .finish()
    }
}
