//! Loop-level worker scenarios against the scripted decision client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use drover_core::mock::{MockCall, MockDecisionClient, RecordingSleeper};
use drover_core::{
    ActionResponse, Argument, ArgumentType, ClientError, Function, FunctionCall, FunctionResult,
    RunError, RunStatus, State, Worker, WorkerConfig,
};

fn take_function() -> Function {
    Function::from_fn(
        "take",
        "Take object",
        vec![Argument::new("object", ArgumentType::Item, "Object to take")],
        |args| {
            let object = args.get("object").and_then(Value::as_str).unwrap_or("");
            if object.is_empty() {
                Ok(FunctionResult::failed("No object specified"))
            } else {
                Ok(FunctionResult::done(format!(
                    "Successfully took the {object}"
                )))
            }
        },
    )
}

/// Counts its own invocations in the state so tests can observe how often
/// the loop called it.
fn counting_reducer(
    result: Option<&FunctionResult>,
    state: Option<&State>,
) -> State {
    match state {
        None => State::new().with("reduced", json!(1)),
        Some(s) => {
            let n = s.get("reduced").and_then(Value::as_u64).unwrap_or(0);
            let last = result
                .map(|r| json!(r.feedback_message))
                .unwrap_or(Value::Null);
            s.clone().with("reduced", json!(n + 1)).with("last", last)
        }
    }
}

fn test_worker(client: Arc<MockDecisionClient>, sleeper: Arc<RecordingSleeper>) -> Worker {
    let config = WorkerConfig::new(
        "npc",
        "An NPC in a test environment",
        counting_reducer,
        vec![take_function()],
    )
    .with_instruction("Do what the task says");
    Worker::new(client, config).unwrap().with_sleeper(sleeper)
}

fn take_call(object: &str) -> FunctionCall {
    let mut args = Map::new();
    args.insert("object".into(), json!(object));
    FunctionCall {
        fn_name: "take".into(),
        args,
    }
}

#[tokio::test]
async fn take_then_finish_dispatches_once() {
    let client = Arc::new(MockDecisionClient::new());
    client.enqueue(ActionResponse {
        function_call: Some(take_call("apple")),
        ..ActionResponse::default()
    });
    client.enqueue(ActionResponse {
        is_finished: true,
        ..ActionResponse::default()
    });
    let sleeper = Arc::new(RecordingSleeper::new());

    let mut worker = test_worker(client.clone(), sleeper.clone());
    let report = worker.run("take the apple").await.unwrap();

    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.steps, 2);
    assert_eq!(report.dispatches, 1);
    assert_eq!(client.decision_requests(), 2);
    // Initial reduce plus one post-dispatch reduce.
    assert_eq!(report.state.get("reduced"), Some(&json!(2)));
    assert_eq!(
        report.state.get("last"),
        Some(&json!("Successfully took the apple"))
    );
    assert!(sleeper.slept().is_empty());
}

#[tokio::test]
async fn run_registers_and_submits_task() {
    let client = Arc::new(MockDecisionClient::new());
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut worker = test_worker(client.clone(), sleeper);
    worker.run("take the apple").await.unwrap();

    let calls = client.calls();
    assert_eq!(
        calls[0],
        MockCall::CreateAgent {
            name: "npc".into(),
            description: "An NPC in a test environment".into(),
            goal: "Do what the task says".into(),
        }
    );
    assert_eq!(
        calls[1],
        MockCall::SetTask {
            agent_id: "agent-1".into(),
            task: "take the apple".into(),
        }
    );
    // The step query carries state and the declared action space.
    match &calls[2] {
        MockCall::NextWorkerAction { payload, .. } => {
            assert_eq!(payload["functions"][0]["fn_name"], json!("take"));
            assert_eq!(payload["state"]["reduced"], json!(1));
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn decision_payload_carries_session_context() {
    let search = Function::from_fn(
        "search",
        "Search the web",
        vec![Argument::new("query", ArgumentType::String, "Search query")],
        |args| {
            let query = args.get("query").and_then(Value::as_str).unwrap_or("");
            let mut info = Map::new();
            info.insert("query".into(), json!(query));
            info.insert("route".into(), json!({"kind": "web"}));
            Ok(FunctionResult::done("found it").with_info(info))
        },
    );
    let config = WorkerConfig::new(
        "npc",
        "An NPC in a test environment",
        counting_reducer,
        vec![take_function(), search],
    );

    let client = Arc::new(MockDecisionClient::new());
    let mut search_args = Map::new();
    search_args.insert("query".into(), json!("token price"));
    client.enqueue(ActionResponse {
        function_call: Some(FunctionCall {
            fn_name: "search".into(),
            args: search_args,
        }),
        ..ActionResponse::default()
    });
    client.enqueue(ActionResponse {
        function_call: Some(take_call("apple")),
        ..ActionResponse::default()
    });
    client.enqueue(ActionResponse {
        is_finished: true,
        ..ActionResponse::default()
    });

    let mut worker = Worker::new(client.clone(), config)
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::new()));
    worker.run("look up prices, then take the apple").await.unwrap();

    let payloads: Vec<Value> = client
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::NextWorkerAction { payload, .. } => Some(payload),
            _ => None,
        })
        .collect();
    assert_eq!(payloads.len(), 3);

    // First query: task present, no history yet.
    assert_eq!(
        payloads[0]["task"],
        json!("look up prices, then take the apple")
    );
    assert_eq!(payloads[0]["previous_queries"], json!([]));
    assert_eq!(payloads[0]["last_result"], Value::Null);

    // After the search dispatch, its (query, route) pair is surfaced.
    assert_eq!(payloads[1]["previous_queries"], json!(["token price"]));
    assert_eq!(payloads[1]["previous_routes"], json!([{"kind": "web"}]));
    assert_eq!(payloads[1]["last_result"]["feedback_message"], json!("found it"));

    // The take dispatch carries no query info; history is unchanged.
    assert_eq!(payloads[2]["previous_queries"], json!(["token price"]));
    assert_eq!(
        payloads[2]["last_result"]["feedback_message"],
        json!("Successfully took the apple")
    );
}

#[tokio::test]
async fn rate_limits_back_off_then_succeed() {
    let client = Arc::new(MockDecisionClient::new());
    client.enqueue_error(ClientError::http(429, "Too Many Requests"));
    client.enqueue_error(ClientError::http(429, "Too Many Requests"));
    client.enqueue(ActionResponse {
        function_call: Some(take_call("apple")),
        ..ActionResponse::default()
    });
    client.enqueue(ActionResponse {
        is_finished: true,
        ..ActionResponse::default()
    });
    let sleeper = Arc::new(RecordingSleeper::new());

    let mut worker = test_worker(client.clone(), sleeper.clone());
    let report = worker.run("take the apple").await.unwrap();

    assert_eq!(report.dispatches, 1);
    let slept: Vec<u64> = sleeper.slept().iter().map(Duration::as_secs).collect();
    assert_eq!(slept, vec![30, 60]);
}

#[tokio::test]
async fn retry_exhaustion_surfaces_last_error() {
    let client = Arc::new(MockDecisionClient::new());
    for _ in 0..4 {
        client.enqueue_error(ClientError::http(429, "Too Many Requests"));
    }
    let sleeper = Arc::new(RecordingSleeper::new());

    let mut worker = test_worker(client.clone(), sleeper.clone());
    let error = worker.run("take the apple").await.unwrap_err();

    match error {
        RunError::Client(ClientError::Http { status, .. }) => assert_eq!(status, 429),
        other => panic!("unexpected error: {other}"),
    }
    let slept: Vec<u64> = sleeper.slept().iter().map(Duration::as_secs).collect();
    assert_eq!(slept, vec![30, 60, 120]);
}

#[tokio::test]
async fn unknown_function_fails_without_backoff() {
    let client = Arc::new(MockDecisionClient::new());
    client.enqueue(ActionResponse {
        function_call: Some(FunctionCall {
            fn_name: "fly".into(),
            args: Map::new(),
        }),
        ..ActionResponse::default()
    });
    let sleeper = Arc::new(RecordingSleeper::new());

    let mut worker = test_worker(client.clone(), sleeper.clone());
    let error = worker.run("take the apple").await.unwrap_err();

    assert!(matches!(error, RunError::Protocol(_)));
    assert!(error.to_string().contains("fly"));
    // Protocol disagreement never touches the backoff path.
    assert!(sleeper.slept().is_empty());
    assert_eq!(client.decision_requests(), 1);
}

#[tokio::test]
async fn finished_response_with_call_dispatches_before_terminating() {
    let client = Arc::new(MockDecisionClient::new());
    client.enqueue(ActionResponse {
        function_call: Some(take_call("apple")),
        message: Some("Wrapping up".into()),
        is_finished: true,
        ..ActionResponse::default()
    });
    let sleeper = Arc::new(RecordingSleeper::new());

    let mut worker = test_worker(client.clone(), sleeper);
    let report = worker.run("take the apple").await.unwrap();

    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.dispatches, 1);
    assert_eq!(report.last_message.as_deref(), Some("Wrapping up"));
    assert_eq!(client.decision_requests(), 1);
}

#[tokio::test]
async fn dispatch_on_finish_can_be_disabled() {
    let client = Arc::new(MockDecisionClient::new());
    client.enqueue(ActionResponse {
        function_call: Some(take_call("apple")),
        is_finished: true,
        ..ActionResponse::default()
    });
    let sleeper = Arc::new(RecordingSleeper::new());

    let mut worker = test_worker(client.clone(), sleeper).with_dispatch_on_finish(false);
    let report = worker.run("take the apple").await.unwrap();

    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.dispatches, 0);
}

#[tokio::test]
async fn failed_dispatch_feeds_back_into_the_loop() {
    let client = Arc::new(MockDecisionClient::new());
    // The service omits the required argument; the failure is recovered
    // locally and the loop keeps going.
    client.enqueue(ActionResponse {
        function_call: Some(FunctionCall {
            fn_name: "take".into(),
            args: Map::new(),
        }),
        ..ActionResponse::default()
    });
    client.enqueue(ActionResponse {
        is_finished: true,
        ..ActionResponse::default()
    });
    let sleeper = Arc::new(RecordingSleeper::new());

    let mut worker = test_worker(client.clone(), sleeper);
    let report = worker.run("take the apple").await.unwrap();

    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.dispatches, 1);
    let last = report.state.get("last").and_then(Value::as_str).unwrap();
    assert!(last.contains("missing required argument `object`"));
}

#[tokio::test]
async fn step_limit_fails_the_run() {
    let client = Arc::new(MockDecisionClient::new());
    for _ in 0..5 {
        client.enqueue(ActionResponse {
            message: Some("still thinking".into()),
            ..ActionResponse::default()
        });
    }
    let sleeper = Arc::new(RecordingSleeper::new());

    let mut worker = test_worker(client.clone(), sleeper).with_max_steps(3);
    let report = worker.run("take the apple").await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.steps, 3);
    assert_eq!(client.decision_requests(), 3);
    assert!(report
        .last_message
        .as_deref()
        .unwrap()
        .contains("step limit of 3"));
}

#[tokio::test]
async fn cancellation_observed_at_iteration_boundary() {
    let client = Arc::new(MockDecisionClient::new());
    client.enqueue(ActionResponse {
        function_call: Some(take_call("apple")),
        ..ActionResponse::default()
    });
    let sleeper = Arc::new(RecordingSleeper::new());
    let token = CancellationToken::new();
    token.cancel();

    let mut worker = test_worker(client.clone(), sleeper).with_cancellation(token);
    let error = worker.run("take the apple").await.unwrap_err();

    assert!(matches!(error, RunError::Cancelled));
    // The in-flight iteration completed: one decision, one dispatch.
    assert_eq!(client.decision_requests(), 1);
}

#[tokio::test]
async fn duplicate_action_space_fails_construction() {
    let client = Arc::new(MockDecisionClient::new());
    let config = WorkerConfig::new(
        "npc",
        "duplicate space",
        counting_reducer,
        vec![take_function(), take_function()],
    );
    assert!(Worker::new(client, config).is_err());
}
