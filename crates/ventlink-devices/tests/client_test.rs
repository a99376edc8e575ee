//! VariableClient retry and serialization tests.
//!
//! Run with: cargo test -p ventlink-devices --test client_test

mod common;

use common::MockTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use ventlink_core::catalog::{FAN_STAGE, PARTY_MODE, TEMPERATURE_OUTSIDE_AIR};
use ventlink_core::{DescriptorError, Value};
use ventlink_devices::{ClientError, DeviceLock, ProtocolError, Reading, VariableClient};

#[tokio::test(start_paused = true)]
async fn test_get_retries_conflicts_then_succeeds() {
    let transport = MockTransport::with_values(&[("v00102", "2")]);
    transport.script_read(Err(ProtocolError::new("Unexpected function code 16", &[], &[]).into()));
    transport.script_read(Ok(Reading {
        name: "v00104".into(),
        value: "12.5".into(),
    }));
    let client = VariableClient::new(transport.clone());

    let started = Instant::now();
    let value = client.get(&FAN_STAGE).await;
    let elapsed = started.elapsed();

    assert_eq!(value, Some(Value::Int(2)));
    assert_eq!(transport.reads().len(), 3);
    // Two backoffs of 100..=500ms each.
    assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(1000), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_get_gives_up_after_three_attempts() {
    let transport = MockTransport::new();
    let client = VariableClient::new(transport.clone());

    assert_eq!(client.get(&FAN_STAGE).await, None);
    assert_eq!(transport.reads(), vec!["v00102"; 3]);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_value_is_retried() {
    let transport = MockTransport::with_values(&[("v00094", "1")]);
    transport.script_read(Ok(Reading {
        name: "v00094".into(),
        value: "yes".into(),
    }));
    let client = VariableClient::new(transport.clone());

    assert_eq!(client.get(&PARTY_MODE).await, Some(Value::Bool(true)));
    assert_eq!(transport.reads().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_get_raw_returns_text_that_decodes() {
    let transport = MockTransport::with_values(&[("v00094", "1")]);
    transport.script_read(Ok(Reading {
        name: "v00094".into(),
        value: "yes".into(),
    }));
    let client = VariableClient::new(transport.clone());

    assert_eq!(client.get_raw(&PARTY_MODE).await.as_deref(), Some("1"));
    assert_eq!(transport.reads().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_try_get_reports_mismatch() {
    let transport = MockTransport::new();
    transport.script_read(Ok(Reading {
        name: "v00104".into(),
        value: "12.5".into(),
    }));
    let client = VariableClient::new(transport);

    let err = client.try_get(&FAN_STAGE).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::VariableMismatch { ref expected, ref received }
            if expected == "v00102" && received == "v00104"
    ));
    assert!(err.is_conflict());
}

#[tokio::test(start_paused = true)]
async fn test_set_writes_assignment() {
    let transport = MockTransport::new();
    let client = VariableClient::new(transport.clone());
    let fan_stage = FAN_STAGE.writable().unwrap();

    assert!(client.set(&fan_stage, &Value::Int(3)).await);
    assert_eq!(transport.writes(), vec!["v00102=3"]);
    assert_eq!(client.get(&FAN_STAGE).await, Some(Value::Int(3)));
}

#[tokio::test(start_paused = true)]
async fn test_set_retries_then_fails() {
    let transport = MockTransport::new();
    for _ in 0..3 {
        transport.script_write(Err(ClientError::Timeout {
            operation: "write",
            timeout_ms: 10_000,
        }));
    }
    let client = VariableClient::new(transport.clone());

    assert!(!client.set(&PARTY_MODE.writable().unwrap(), &Value::Bool(true)).await);
    assert_eq!(transport.writes().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_set_rejects_unencodable_value() {
    let transport = MockTransport::new();
    let client = VariableClient::new(transport.clone());

    assert!(!client.set(&FAN_STAGE.writable().unwrap(), &Value::Text("fast".into())).await);
    assert!(transport.writes().is_empty());
}

#[test]
fn test_read_only_variable_has_no_write_handle() {
    let err = TEMPERATURE_OUTSIDE_AIR.writable().unwrap_err();
    assert_eq!(err, DescriptorError::ReadOnly("v00104".into()));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_exchanges_are_serialized() {
    let transport = MockTransport::with_values(&[("v00102", "1"), ("v00094", "0")]);
    transport.delay("v00102", Duration::from_millis(50));
    transport.delay("v00094", Duration::from_millis(30));
    let client = VariableClient::new(transport.clone());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            match i % 3 {
                0 => client.get(&FAN_STAGE).await.is_some(),
                1 => client.get(&PARTY_MODE).await.is_some(),
                _ => client.set(&FAN_STAGE.writable().unwrap(), &Value::Int(2)).await,
            }
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }

    assert_eq!(transport.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clients_sharing_a_lock_do_not_overlap() {
    let transport = MockTransport::with_values(&[("v00102", "1")]);
    transport.delay("v00102", Duration::from_millis(50));
    let lock = DeviceLock::default();
    let first = VariableClient::with_lock(transport.clone(), Arc::clone(&lock));
    let second = VariableClient::with_lock(transport.clone(), lock);

    let fan_stage = FAN_STAGE;
    let (a, b) = tokio::join!(first.get(&fan_stage), second.get(&fan_stage));

    assert_eq!(a, Some(Value::Int(1)));
    assert_eq!(b, Some(Value::Int(1)));
    assert_eq!(transport.max_in_flight(), 1);
}
