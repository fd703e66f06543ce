//! Demo action space: an NPC that can take, throw, and sit on objects.

use anyhow::Result;
use serde_json::{json, Map, Value};

use drover_core::{
    Argument, ArgumentType, Function, FunctionResult, State, WorkerConfig,
};

fn object_arg(description: &str, arg_type: ArgumentType) -> Vec<Argument> {
    vec![Argument::new("object", arg_type, description)]
}

fn named_object(args: &Map<String, Value>) -> Option<&str> {
    args.get("object").and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn take_object(args: &Map<String, Value>) -> Result<FunctionResult> {
    match named_object(args) {
        Some(object) => Ok(FunctionResult::done(format!(
            "Successfully took the {object}"
        ))),
        None => Ok(FunctionResult::failed("No object specified")),
    }
}

fn throw_object(args: &Map<String, Value>) -> Result<FunctionResult> {
    match named_object(args) {
        Some(object) => Ok(FunctionResult::done(format!(
            "Successfully threw the {object}"
        ))),
        None => Ok(FunctionResult::failed("No object specified")),
    }
}

fn sit_on_object(args: &Map<String, Value>) -> Result<FunctionResult> {
    const SITTABLE: &[&str] = &["chair", "bench", "stool", "couch", "sofa", "bed"];
    let Some(object) = named_object(args) else {
        return Ok(FunctionResult::failed("No object specified"));
    };
    if SITTABLE.contains(&object.to_lowercase().as_str()) {
        Ok(FunctionResult::done(format!("Successfully sat on the {object}")))
    } else {
        Ok(FunctionResult::failed(format!(
            "Cannot sit on {object} - not a sittable object"
        )))
    }
}

/// The environment is static: the same objects are visible every step,
/// with a running log of what happened to them.
fn environment_reducer(
    result: Option<&FunctionResult>,
    state: Option<&State>,
) -> State {
    let objects = json!([
        {"name": "apple", "description": "A red apple", "type": ["item", "food"]},
        {"name": "banana", "description": "A yellow banana", "type": ["item", "food"]},
        {"name": "orange", "description": "A juicy orange", "type": ["item", "food"]},
        {"name": "chair", "description": "A chair", "type": ["sittable"]},
        {"name": "table", "description": "A table", "type": ["sittable"]},
    ]);

    let mut log: Vec<Value> = state
        .and_then(|s| s.get("log"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if let Some(result) = result {
        log.push(json!(result.feedback_message));
    }

    State::new()
        .with("objects", objects)
        .with("log", Value::Array(log))
}

pub fn npc_worker() -> WorkerConfig {
    let action_space = vec![
        Function::from_fn(
            "take",
            "Take object",
            object_arg("Object to take", ArgumentType::Item),
            take_object,
        ),
        Function::from_fn(
            "throw",
            "Throw object",
            object_arg("Object to throw", ArgumentType::Item),
            throw_object,
        ),
        Function::from_fn(
            "sit",
            "Take a seat",
            object_arg("Object to sit on", ArgumentType::Sittable),
            sit_on_object,
        ),
    ];

    WorkerConfig::new(
        "npc",
        "You are an evil NPC in a game.",
        environment_reducer,
        action_space,
    )
    .with_instruction("Choose the evil-est actions.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(object: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("object".into(), json!(object));
        map
    }

    #[test]
    fn test_sit_rejects_non_sittable() {
        let result = sit_on_object(&args("apple")).unwrap();
        assert!(!result.is_done());
        assert!(result.feedback_message.contains("not a sittable object"));
    }

    #[test]
    fn test_sit_is_case_insensitive() {
        assert!(sit_on_object(&args("Chair")).unwrap().is_done());
    }

    #[test]
    fn test_reducer_keeps_a_log() {
        let initial = environment_reducer(None, None);
        assert_eq!(initial.get("log"), Some(&json!([])));

        let next = environment_reducer(
            Some(&FunctionResult::done("Successfully took the apple")),
            Some(&initial),
        );
        assert_eq!(
            next.get("log"),
            Some(&json!(["Successfully took the apple"]))
        );
    }

    #[test]
    fn test_action_space_registers() {
        let config = npc_worker();
        assert_eq!(config.action_space.len(), 3);
    }
}
