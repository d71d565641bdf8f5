//! Tests for error types.

use super::*;
use std::error::Error as _;

#[test]
fn test_connection_error_display() {
    let err = ConnectionError::with_code("42S02", "Table 'q.missing' doesn't exist");
    assert_eq!(
        err.to_string(),
        "Table 'q.missing' doesn't exist (code: 42S02)"
    );

    let err = ConnectionError::new("gone away");
    assert_eq!(err.to_string(), "gone away (code: none)");
}

#[test]
fn test_queue_error_classification() {
    let validation: QueueError = ValidationError::EmptyItem.into();
    assert!(validation.is_validation());
    assert!(!validation.is_protocol());

    let protocol: QueueError = ProtocolError::NotOwner {
        operation: "dequeue",
    }
    .into();
    assert!(protocol.is_protocol());
    assert!(!protocol.is_validation());
}

#[test]
fn test_missing_and_incorrect_responses_have_distinct_messages() {
    let missing = ProtocolError::MissingResponse {
        function: "queue_end()".to_string(),
    };
    let incorrect = ProtocolError::IncorrectResponse {
        function: "queue_end()".to_string(),
        response: "0".to_string(),
    };

    assert_ne!(missing.to_string(), incorrect.to_string());
    assert!(incorrect.to_string().contains("response=[0]"));
}

#[test]
fn test_no_table_available_lists_tables() {
    let err = ProtocolError::NoTableAvailable {
        tables: vec!["high".to_string(), "low".to_string()],
        response: "0".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "No table available. tables=[high,low], response=[0]"
    );
}

#[test]
fn test_execution_error_keeps_connection_error_as_source() {
    let err = ProtocolError::Execution {
        sql: "SELECT queue_end()".to_string(),
        source: ConnectionError::new("lost connection"),
    };

    let source = err.source().expect("execution error should have a source");
    assert_eq!(source.to_string(), "lost connection (code: none)");
}

#[test]
fn test_consumer_retry_error_carries_serialized_item() {
    let err = ConsumerError::Retry {
        item: r#"{"id":1}"#.to_string(),
        source: ValidationError::EmptyItem.into(),
    };

    assert!(err.to_string().contains(r#"queue=[{"id":1}]"#));
    assert!(err.source().is_some());
}

#[test]
fn test_subscriber_error_wraps_cause() {
    let err = SubscriberError {
        table: "jobs".to_string(),
        item: "{}".to_string(),
        source: ValidationError::EmptyItem.into(),
    };

    assert_eq!(err.to_string(), "Failed to subscribe. table=[jobs], queue=[{}]");
    assert!(matches!(
        err.source,
        QueueError::Validation(ValidationError::EmptyItem)
    ));
}
