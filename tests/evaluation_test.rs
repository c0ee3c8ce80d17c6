mod common;

use std::sync::Arc;

use common::{calls, engine, engine_with, register_counting};
use pretty_assertions::assert_eq;
use serde_json::json;
use stepwise::dependency::ResolutionScope;
use stepwise::eval::context::Context;
use stepwise::eval::evaluator::StepOutcome;
use stepwise::eval::state::{MethodStates, StepInstanceId};
use stepwise::operator::definition::CachePolicy;
use stepwise::{EngineConfig, EngineError, Script, Step};

#[tokio::test]
async fn test_operand_micro_syntax() {
    let outcome = engine()
        .run_json(
            r#"[
                {"set": "whole", "op": "get", "left": "/", "right": ""},
                {"set": "a", "op": "get", "left": "/", "right": "a"},
                {"set": "missing", "op": "get", "left": "/", "right": "missing"},
                {"set": "escaped", "op": "==", "left": {"=": "/a"}, "right": "/a"}
            ]"#,
            json!({"a": 1}),
        )
        .await
        .unwrap();

    assert_eq!(outcome.context.variable("whole"), Some(&json!({"a": 1})));
    assert_eq!(outcome.context.variable("a"), Some(&json!(1)));
    assert_eq!(outcome.context.variable("missing"), Some(&json!(null)));
    assert_eq!(outcome.context.variable("escaped"), Some(&json!(false)));
}

#[tokio::test]
async fn test_and_short_circuits() {
    let engine = engine();
    let counter = register_counting(&engine, "touch", CachePolicy::Never);

    let script = Script::from_value(&json!([
        {"set": "r", "op": "&&", "left": "/flag", "right": {"op": "touch", "input": true}}
    ]))
    .unwrap();

    let outcome = engine.run(&script, json!({"flag": false})).await.unwrap();
    assert_eq!(outcome.output["r"], json!(false));
    assert_eq!(calls(&counter), 0);

    let outcome = engine.run(&script, json!({"flag": true})).await.unwrap();
    assert_eq!(outcome.output["r"], json!(true));
    assert_eq!(calls(&counter), 1);
}

#[tokio::test]
async fn test_or_short_circuits() {
    let engine = engine();
    let counter = register_counting(&engine, "touch", CachePolicy::Never);
    let script = Script::new(vec![
        Step::new("||")
            .set("r")
            .left(json!(1))
            .right(json!({"op": "touch", "input": false})),
    ]);

    let outcome = engine.run(&script, json!({})).await.unwrap();
    assert_eq!(outcome.output["r"], json!(true));
    assert_eq!(calls(&counter), 0);
}

#[tokio::test]
async fn test_if_evaluates_selected_branch_only() {
    let engine = engine();
    let counter = register_counting(&engine, "touch", CachePolicy::Never);
    let script = Script::from_value(&json!([{
        "set": "r",
        "op": "if",
        "input": {
            "test": "/admin",
            "then": "/secret",
            "else": {"op": "touch", "input": "public"}
        }
    }]))
    .unwrap();

    let outcome = engine
        .run(&script, json!({"admin": true, "secret": 42}))
        .await
        .unwrap();
    assert_eq!(outcome.output["r"], json!(42));
    assert_eq!(calls(&counter), 0);

    let outcome = engine.run(&script, json!({"admin": false})).await.unwrap();
    assert_eq!(outcome.output["r"], json!("public"));
    assert_eq!(calls(&counter), 1);
}

#[tokio::test]
async fn test_try_catches_runtime_failures_only() {
    let outcome = engine()
        .run_json(
            r#"[{
                "set": "r",
                "op": "try",
                "left": {"op": "fail", "input": "boom"},
                "right": "/error"
            }]"#,
            json!({}),
        )
        .await
        .unwrap();
    assert_eq!(outcome.output["r"], json!("Operator fail failed: boom"));

    let err = engine()
        .run_json(
            r#"[{"op": "try", "left": {"op": "missing"}, "right": 0}]"#,
            json!({}),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown operator: missing"), "{}", err);
}

#[tokio::test]
async fn test_failure_aborts_remaining_steps() {
    let engine = engine();
    let counter = register_counting(&engine, "touch", CachePolicy::Never);
    let script = Script::new(vec![
        Step::new("fail").input(json!("stop")),
        Step::new("touch").input(json!(1)),
    ]);

    let err = engine.run(&script, json!({})).await.unwrap_err();
    assert_eq!(err, EngineError::runtime("fail", "stop"));
    assert_eq!(calls(&counter), 0);
}

#[tokio::test]
async fn test_filter_resumes_across_turns() {
    let mut config = EngineConfig::default();
    config.iteration.slice_size = 3;
    let engine = engine_with(config);
    let evaluator = engine.evaluator();

    // keep everything but 2
    let step = Step::new("filter")
        .left(json!([1, 2, 3, 4, 5]))
        .right(json!({"op": "!", "input": {"op": "==", "left": "/", "right": 2}}));
    let context = Context::default();
    let id = StepInstanceId::root(0);
    let scope = Arc::new(ResolutionScope::new());
    let mut states = MethodStates::new();

    let first = evaluator
        .turn(&step, &context, &id, &mut states, &scope)
        .await
        .unwrap();
    assert_eq!(first, StepOutcome::Suspended);
    let state = states.get(&id).unwrap();
    assert_eq!(state.index, 3);
    assert_eq!(state.accumulator, json!([1, 3]));

    let second = evaluator
        .turn(&step, &context, &id, &mut states, &scope)
        .await
        .unwrap();
    assert_eq!(second, StepOutcome::Complete(json!([1, 3, 4, 5])));
    assert!(states.is_empty());

    // a single uninterrupted pass agrees
    let single = engine_with(EngineConfig::default());
    let outcome = single
        .run(&Script::new(vec![step.set("kept")]), json!({}))
        .await
        .unwrap();
    assert_eq!(outcome.output["kept"], json!([1, 3, 4, 5]));
}

#[tokio::test]
async fn test_map_and_reduce() {
    let mut config = EngineConfig::default();
    config.iteration.slice_size = 2;
    let outcome = engine_with(config)
        .run_json(
            r#"[
                {"set": "titles", "op": "map", "left": "/posts", "right": "/title"},
                {"set": "lastPublished", "op": "reduce",
                 "left": {"items": "/posts", "initial": null},
                 "right": {"op": "if", "input": {
                     "test": "/item/published",
                     "then": "/item/title",
                     "else": "/acc"
                 }}}
            ]"#,
            json!({"posts": [
                {"title": "a", "published": true},
                {"title": "b", "published": false},
                {"title": "c", "published": true}
            ]}),
        )
        .await
        .unwrap();

    assert_eq!(outcome.output["titles"], json!(["a", "b", "c"]));
    assert_eq!(outcome.output["lastPublished"], json!("c"));
}

#[tokio::test]
async fn test_reduce_accumulates_across_slices() {
    let mut config = EngineConfig::default();
    config.iteration.slice_size = 1;
    let outcome = engine_with(config)
        .run_json(
            r#"[{"set": "last", "op": "reduce",
                 "left": {"items": [1, 2, 3], "initial": "start"},
                 "right": "/item"}]"#,
            json!({}),
        )
        .await
        .unwrap();
    assert_eq!(outcome.output["last"], json!(3));
}

#[tokio::test]
async fn test_iteration_needs_an_array() {
    let err = engine()
        .run_json(
            r#"[{"op": "map", "left": "/posts", "right": "/"}]"#,
            json!({"posts": "not a list"}),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Validation error in map"), "{}", err);
}

#[tokio::test]
async fn test_pass_through_moves_cursor() {
    let outcome = engine()
        .run_json(
            r#"[
                {"op": "get", "left": "/", "right": "user"},
                {"set": "name", "op": "get", "left": "/", "right": "name"}
            ]"#,
            json!({"user": {"name": "John"}}),
        )
        .await
        .unwrap();
    assert_eq!(outcome.context.variable("name"), Some(&json!("John")));
}

#[tokio::test]
async fn test_zero_slice_size_is_rejected_up_front() {
    let mut config = EngineConfig::default();
    config.iteration.slice_size = 0;
    let result = stepwise::Engine::with_builtins(config);
    assert!(matches!(result, Err(stepwise::Error::Config(_))));
}
