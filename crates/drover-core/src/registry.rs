//! Function registry: the declared action space of one worker.

use std::collections::HashMap;

use crate::error::RegistryError;
use crate::types::{Function, FunctionDeclaration};

/// Name-keyed registry of functions, preserving registration order.
///
/// Order matters: the list is surfaced to the decision service as the
/// enumerated set of legal actions, and tie-breaking on the service side is
/// order-preserving. The registry is built once per worker construction and
/// never mutated mid-run.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: Vec<Function>,
    index: HashMap<String, usize>,
}

impl FunctionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a registry from an ordered action space.
    ///
    /// Fails on the first duplicate name, making duplicate declarations a
    /// construction-time error.
    pub fn from_action_space(action_space: Vec<Function>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for function in action_space {
            registry.register(function)?;
        }
        Ok(registry)
    }

    /// Register a function.
    pub fn register(&mut self, function: Function) -> Result<(), RegistryError> {
        if self.index.contains_key(&function.fn_name) {
            return Err(RegistryError::DuplicateName(function.fn_name.clone()));
        }
        self.index
            .insert(function.fn_name.clone(), self.functions.len());
        self.functions.push(function);
        Ok(())
    }

    /// Look up a function by name, returned unchanged.
    pub fn lookup(&self, name: &str) -> Result<&Function, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.functions[i])
            .ok_or_else(|| RegistryError::UnknownFunction(name.to_string()))
    }

    /// The action space in registration order.
    pub fn list(&self) -> &[Function] {
        &self.functions
    }

    /// Wire projections of the action space, in registration order.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.functions.iter().map(Function::declaration).collect()
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
