//! Executor: argument validation and fault-isolated dispatch.
//!
//! The single point where declared argument contracts are enforced.
//! Executables are untrusted third-party code; whatever goes wrong inside
//! them becomes a FAILED result, never a crashed loop.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::{Function, FunctionResult};

pub struct Executor;

impl Executor {
    /// Dispatch one function call.
    ///
    /// Missing required arguments fail before the executable is invoked;
    /// executables may assume validated required arguments are present.
    /// Errors raised by the executable are converted to FAILED results
    /// carrying the error text.
    pub async fn execute(function: &Function, args: &Map<String, Value>) -> FunctionResult {
        for arg in &function.args {
            if arg.required && !args.contains_key(&arg.name) {
                return FunctionResult::failed(format!(
                    "missing required argument `{}` for `{}`",
                    arg.name, function.fn_name
                ));
            }
        }

        debug!(function = %function.fn_name, "Dispatching function");
        match function.executable().call(args).await {
            Ok(result) => {
                debug!(
                    function = %function.fn_name,
                    status = %result.status,
                    "Function returned"
                );
                result
            }
            Err(error) => {
                warn!(function = %function.fn_name, error = %error, "Executable fault");
                FunctionResult::failed(error.to_string())
            }
        }
    }
}
