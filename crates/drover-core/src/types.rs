//! Core data model: functions, arguments, results, and wire types.
//!
//! A `Function` is a named, typed capability with declared arguments and an
//! executable. The decision service only ever sees the declaration; the
//! executable stays local.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Semantic tag for a declared argument.
///
/// The known tags match what decision services commonly emit; anything else
/// round-trips through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    String,
    Number,
    Int,
    Float,
    Bool,
    Item,
    Sittable,
    Object,
    #[serde(untagged)]
    Custom(String),
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentType::String => write!(f, "string"),
            ArgumentType::Number => write!(f, "number"),
            ArgumentType::Int => write!(f, "int"),
            ArgumentType::Float => write!(f, "float"),
            ArgumentType::Bool => write!(f, "bool"),
            ArgumentType::Item => write!(f, "item"),
            ArgumentType::Sittable => write!(f, "sittable"),
            ArgumentType::Object => write!(f, "object"),
            ArgumentType::Custom(s) => write!(f, "{}", s),
        }
    }
}

/// A declared argument of a function. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Argument name, unique within one function
    pub name: String,
    /// Semantic tag surfaced to the decision service
    #[serde(rename = "type")]
    pub arg_type: ArgumentType,
    /// Human-readable description
    pub description: String,
    /// Whether the argument must be present at dispatch
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Argument {
    /// Create a required argument.
    pub fn new(
        name: impl Into<String>,
        arg_type: ArgumentType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arg_type,
            description: description.into(),
            required: true,
        }
    }

    /// Mark the argument as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Terminal status of one function invocation.
///
/// There is no partial or pending status: every dispatch ends in one of
/// these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FunctionResultStatus {
    Done,
    Failed,
}

impl fmt::Display for FunctionResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionResultStatus::Done => write!(f, "DONE"),
            FunctionResultStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of one function invocation.
///
/// `info` is always present, possibly empty: the state reducer and the
/// decision service both read it unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub status: FunctionResultStatus,
    pub feedback_message: String,
    #[serde(default)]
    pub info: Map<String, Value>,
}

impl FunctionResult {
    /// Create a successful result.
    pub fn done(feedback_message: impl Into<String>) -> Self {
        Self {
            status: FunctionResultStatus::Done,
            feedback_message: feedback_message.into(),
            info: Map::new(),
        }
    }

    /// Create a failed result.
    pub fn failed(feedback_message: impl Into<String>) -> Self {
        Self {
            status: FunctionResultStatus::Failed,
            feedback_message: feedback_message.into(),
            info: Map::new(),
        }
    }

    /// Attach an info map.
    pub fn with_info(mut self, info: Map<String, Value>) -> Self {
        self.info = info;
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == FunctionResultStatus::Done
    }
}

/// The capability behind a function.
///
/// Executables receive the full argument map: the declared arguments plus
/// whatever extra keys the decision service chose to send. Expected domain
/// failures must be encoded as a `Failed` result; only truly unexpected
/// faults should return `Err`, and even those are caught by the executor.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn call(&self, args: &Map<String, Value>) -> Result<FunctionResult>;
}

/// Adapter wrapping a plain closure as an `Executable`.
pub struct FnExecutable<F>(F);

impl<F> FnExecutable<F>
where
    F: Fn(&Map<String, Value>) -> Result<FunctionResult> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Executable for FnExecutable<F>
where
    F: Fn(&Map<String, Value>) -> Result<FunctionResult> + Send + Sync,
{
    async fn call(&self, args: &Map<String, Value>) -> Result<FunctionResult> {
        (self.0)(args)
    }
}

/// A named, invocable capability with declared arguments.
///
/// Functions are immutable value objects; equality covers the declaration
/// only, never the executable.
#[derive(Clone)]
pub struct Function {
    pub fn_name: String,
    pub fn_description: String,
    pub args: Vec<Argument>,
    /// Optional guidance string surfaced alongside the declaration
    pub hint: Option<String>,
    executable: Arc<dyn Executable>,
}

impl Function {
    pub fn new(
        fn_name: impl Into<String>,
        fn_description: impl Into<String>,
        args: Vec<Argument>,
        executable: impl Executable + 'static,
    ) -> Self {
        Self {
            fn_name: fn_name.into(),
            fn_description: fn_description.into(),
            args,
            hint: None,
            executable: Arc::new(executable),
        }
    }

    /// Convenience constructor taking a plain closure.
    pub fn from_fn<F>(
        fn_name: impl Into<String>,
        fn_description: impl Into<String>,
        args: Vec<Argument>,
        f: F,
    ) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<FunctionResult> + Send + Sync + 'static,
    {
        Self::new(fn_name, fn_description, args, FnExecutable::new(f))
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub(crate) fn executable(&self) -> &dyn Executable {
        self.executable.as_ref()
    }

    /// The serializable projection surfaced to the decision service.
    pub fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            fn_name: self.fn_name.clone(),
            fn_description: self.fn_description.clone(),
            args: self.args.clone(),
            hint: self.hint.clone(),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("fn_name", &self.fn_name)
            .field("fn_description", &self.fn_description)
            .field("args", &self.args)
            .field("hint", &self.hint)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.fn_name == other.fn_name
            && self.fn_description == other.fn_description
            && self.args == other.args
            && self.hint == other.hint
    }
}

/// Wire projection of a `Function`, without the executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub fn_name: String,
    pub fn_description: String,
    pub args: Vec<Argument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A function call proposed by the decision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub fn_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// One decision-service response.
///
/// The fields are mutually compatible: a response may carry a message and a
/// function call at the same time, and a finished response may still name a
/// final call to dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_finished: bool,
    /// Worker routed to handle the current step (agent-level calls only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_worker: Option<String>,
}
