//! drover-core: SDK for agents driven by a remote decision service
//!
//! Provides:
//! - Function/Argument/FunctionResult data model and registry
//! - Worker and Agent orchestration loops
//! - Decision-service HTTP client (token exchange, registration, step queries)
//! - Exponential retry/backoff policy for transient failures
//! - Configuration loading (drover.toml) and scripted test doubles

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod mock;
pub mod registry;
pub mod retry;
pub mod state;
pub mod types;
pub mod worker;

pub use agent::{Agent, AgentConfig};
pub use client::{DecisionClient, HttpDecisionClient, WorkerDescriptor};
pub use config::Config;
pub use error::{ClientError, RegistryError, RunError};
pub use executor::Executor;
pub use registry::FunctionRegistry;
pub use retry::{retry_with_backoff, RetryConfig, Retryable, Sleeper, TokioSleeper};
pub use state::{HistoryEntry, Session, SharedReducer, State, StateReducer};
pub use types::{
    ActionResponse, Argument, ArgumentType, Executable, FnExecutable, Function, FunctionCall,
    FunctionDeclaration, FunctionResult, FunctionResultStatus,
};
pub use worker::{RunReport, RunStatus, Worker, WorkerConfig};
