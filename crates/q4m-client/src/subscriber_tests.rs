//! Tests for the subscriber.

use super::*;
use crate::error::{ConnectionError, ProtocolError};
use crate::providers::memory::InMemoryQ4m;
use crate::test_support::ScriptedConnection;
use serde_json::{json, Value};
use std::error::Error as _;

fn item(value: Value) -> WorkItem {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {:?}", other),
    }
}

#[tokio::test]
async fn test_subscribe_appends_row() {
    let store = InMemoryQ4m::default();
    store.create_table("t", &["id", "message"]);
    let mut subscriber = Subscriber::new(QueueSession::new(store.connect()));

    subscriber
        .subscribe("t", &item(json!({"id": 1, "message": "a"})))
        .await
        .unwrap();
    subscriber
        .subscribe("t", &item(json!({"id": 2, "message": "b"})))
        .await
        .unwrap();

    let rows = store.rows("t");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["message"], json!("b"));
    assert!(!subscriber.session().is_owner());
}

#[tokio::test]
async fn test_empty_item_is_rejected_without_sql() {
    let mut subscriber = Subscriber::new(QueueSession::new(ScriptedConnection::new()));

    let err = subscriber.subscribe("t", &WorkItem::new()).await.unwrap_err();

    assert!(err.source.is_validation());
    assert_eq!(err.table, "t");
    assert_eq!(err.item, "{}");
    assert!(err.source().is_some());
    let session = subscriber.into_session();
    assert!(session.connection().statements.is_empty());
}

#[tokio::test]
async fn test_structured_value_is_wrapped_validation_error() {
    let mut subscriber = Subscriber::new(QueueSession::new(ScriptedConnection::new()));

    let err = subscriber
        .subscribe("t", &item(json!({"id": 1, "meta": {"k": "v"}})))
        .await
        .unwrap_err();

    assert!(err.source.is_validation());
    assert!(subscriber.session().connection().statements.is_empty());
}

#[tokio::test]
async fn test_execution_failure_carries_table_and_item() {
    let mut subscriber = Subscriber::new(QueueSession::new(
        ScriptedConnection::new().fail_execute("Table 'db.t' doesn't exist"),
    ));

    let err = subscriber
        .subscribe("t", &item(json!({"id": 1})))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        r#"Failed to subscribe. table=[t], queue=[{"id":1}]"#
    );
    assert!(matches!(
        err.source,
        QueueError::Protocol(ProtocolError::Execution { ref source, .. })
            if *source == ConnectionError::new("Table 'db.t' doesn't exist")
    ));
}
