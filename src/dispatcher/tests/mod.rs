use crate::dispatcher::Dispatcher;
use crate::dispatcher::test_helpers::{
    GatedTransport, HangingTransport, RecordingTransport, create_dispatcher_with_config,
    create_test_dispatcher, test_config, wait_for_idle,
};
use crate::error::{Error, TransportError};
use crate::types::{
    BindAction, CountJobSpec, EngineState, Entry, Event, JobId, JobOutcome, ProbeStage,
    RangeJobSpec, SingleMappingRequest, TagAction, TagEntry, TagRequest, UidMessage,
    VerifyRequest,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

mod agent;

fn range_spec(subnet: &str, batch_size: usize) -> RangeJobSpec {
    RangeJobSpec {
        subnet: subnet.into(),
        user_prefix: "u".into(),
        timeout: 60,
        batch_size: Some(batch_size),
        endpoint: Some("10.1.1.1:5006".into()),
        cert_bundle: None,
        operation: BindAction::Login,
    }
}

fn count_spec(count: u64) -> CountJobSpec {
    CountJobSpec {
        count,
        user_prefix: "u".into(),
        base_ip: "10.0.0.5".into(),
        timeout: 60,
        endpoint: Some("10.1.1.1:5006".into()),
        cert_bundle: None,
        operation: BindAction::Login,
    }
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Entries of a decoded bindings message
fn bindings(message: &UidMessage) -> &[Entry] {
    match message {
        UidMessage::Bindings { entries, .. } => entries,
        other => panic!("expected bindings, got {other:?}"),
    }
}
