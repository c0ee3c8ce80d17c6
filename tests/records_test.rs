mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::engine;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use stepwise::dependency::ResolutionScope;
use stepwise::persistence::{
    InMemoryPersistence, MockPersistence, PERSISTENCE_SERVICE, Persistence,
};
use stepwise::transport::{FieldInvocation, SelectionSet};
use stepwise::{Engine, EngineConfig, Script};

fn post(id: &str) -> Option<Value> {
    match id {
        "1" => Some(json!({"id": "1", "title": "Hello", "author": "2"})),
        _ => None,
    }
}

fn user(id: &str) -> Option<Value> {
    match id {
        "2" => Some(json!({"id": "2", "name": "John", "email": "john@example.com"})),
        _ => None,
    }
}

fn mock_persistence(expected_reads: usize) -> MockPersistence {
    let mut persistence = MockPersistence::new();
    persistence
        .expect_find_by_id()
        .times(expected_reads)
        .returning(|model, id| match model {
            "Post" => Ok(post(id)),
            "User" => Ok(user(id)),
            _ => Ok(None),
        });
    persistence.expect_references().returning(|model| {
        let mut references = HashMap::new();
        if model == "Post" {
            references.insert("author".to_string(), "User".to_string());
        }
        references
    });
    persistence
}

fn read_and_expand() -> Script {
    Script::from_value(&json!([
        {
            "set": "post",
            "op": "read",
            "input": {"model": "Post", "id": "1", "selections": {"author": {"name": {}}}}
        },
        {
            "set": "post",
            "op": "expand",
            "left": "/post",
            "right": {"=": {"model": "Post", "selections": {"author": {"name": {}}}}}
        }
    ]))
    .unwrap()
}

#[tokio::test]
async fn test_read_then_expand_with_mocked_persistence() {
    let persistence: Arc<dyn Persistence> = Arc::new(mock_persistence(2));
    let scope = ResolutionScope::new().with_mock(PERSISTENCE_SERVICE, persistence);

    let outcome = engine()
        .run_with_scope(&read_and_expand(), json!({}), scope)
        .await
        .unwrap();
    assert_eq!(
        outcome.output["post"],
        json!({"author": {"name": "John"}})
    );
}

#[tokio::test]
async fn test_repeated_reads_hit_request_resources() {
    // one Post and one User lookup, however often they are read
    let persistence: Arc<dyn Persistence> = Arc::new(mock_persistence(2));
    let engine = engine().with_persistence(persistence);
    let script = Script::from_value(&json!([
        {"set": "a", "op": "read", "input": {"model": "Post", "id": "1"}},
        {"set": "b", "op": "read", "input": {"model": "Post", "id": "1"}},
        {"set": "c", "op": "read", "input": {"model": "User", "id": 2}},
        {"set": "d", "op": "read", "input": {"model": "User", "id": "2"}}
    ]))
    .unwrap();

    let outcome = engine.run(&script, json!({})).await.unwrap();
    assert_eq!(outcome.output["a"], outcome.output["b"]);
    assert_eq!(outcome.output["c"]["name"], json!("John"));
    assert_eq!(outcome.output["c"], outcome.output["d"]);
}

#[tokio::test]
async fn test_missing_record_reads_as_null() {
    let persistence: Arc<dyn Persistence> = Arc::new(mock_persistence(1));
    let engine = engine().with_persistence(persistence);

    let outcome = engine
        .run_json(
            r#"[{"set": "post", "op": "read", "input": {"model": "Post", "id": "404"}}]"#,
            json!({}),
        )
        .await
        .unwrap();
    assert_eq!(outcome.output["post"], Value::Null);
}

#[tokio::test]
async fn test_fields_against_in_memory_fixtures() {
    let persistence = InMemoryPersistence::from_fixtures(json!({
        "Post": {
            "references": {"author": "User", "comments": "Comment"},
            "records": [
                {"id": "1", "title": "Hello", "author": "2", "comments": ["c1", "c2"]}
            ]
        },
        "User": {"records": [{"id": "2", "name": "John"}, {"id": "3", "name": "Ann"}]},
        "Comment": {
            "references": {"author": "User"},
            "records": [
                {"id": "c1", "body": "first", "author": "3"},
                {"id": "c2", "body": "second", "author": "9"}
            ]
        }
    }))
    .unwrap();
    let engine = Engine::with_builtins(EngineConfig::default())
        .unwrap()
        .with_persistence(Arc::new(persistence));

    let fields = [
        FieldInvocation::new("post", "read")
            .alias("firstPost")
            .parameter("model", json!("Post"))
            .parameter("id", json!("1"))
            .selections(
                SelectionSet::new().leaf("title").field(
                    "comments",
                    SelectionSet::new()
                        .leaf("body")
                        .field("author", SelectionSet::new().leaf("name")),
                ),
            ),
        FieldInvocation::new("User", "read")
            .parameter("id", json!("3"))
            .selections(SelectionSet::new().leaf("name")),
    ];

    let outcome = engine.run_fields(&fields, json!({})).await.unwrap();
    assert_eq!(
        outcome.output,
        json!({
            "firstPost": {
                "title": "Hello",
                "comments": [
                    {"body": "first", "author": {"name": "Ann"}},
                    {"body": "second", "author": null}
                ]
            },
            "User": {"name": "Ann"}
        })
    );
}

#[tokio::test]
async fn test_fields_with_non_record_operators() {
    let persistence: Arc<dyn Persistence> = Arc::new(mock_persistence(1));
    let engine = engine().with_persistence(persistence);

    let fields = [
        FieldInvocation::new("time", "now"),
        FieldInvocation::new("same", "eq")
            .parameter("left", json!({"a": 1}))
            .parameter("right", json!({"a": 1})),
        FieldInvocation::new("hidden", "not").parameter("input", json!(true)),
        FieldInvocation::new("Post", "read").parameter("id", json!("1")),
    ];

    let outcome = engine.run_fields(&fields, json!({})).await.unwrap();
    assert!(outcome.output["time"].is_string());
    assert_eq!(outcome.output["same"], json!(true));
    assert_eq!(outcome.output["hidden"], json!(false));
    assert_eq!(outcome.output["Post"]["title"], json!("Hello"));
}
