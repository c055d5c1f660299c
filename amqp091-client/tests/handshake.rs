use std::time::Duration;

use amqp091_client::{
    auth::PlainCredentials,
    connection::{self, delegate::ConnectionEvent},
    types::{methods::Method, FieldValue, MethodKind},
    Connection, ConnectionState,
};

mod common;

use common::Harness;

#[tokio::test]
async fn handshake_is_a_single_queue_item() {
    let harness = Harness::new();
    harness.connection.start().unwrap();
    assert_eq!(harness.connection.state(), ConnectionState::Handshaking);
    assert_eq!(harness.queue.items(), 1);
    assert!(!harness.broker.header_received());

    assert_eq!(harness.queue.step().await, Some("handshake"));
    assert!(harness.broker.header_received());
    assert_eq!(harness.connection.state(), ConnectionState::Open);
    assert_eq!(harness.queue.pending(), 0);
    harness.connection.wait_until_open().await.unwrap();

    let kinds: Vec<MethodKind> = harness
        .broker
        .sent_methods(0)
        .iter()
        .map(Method::kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            MethodKind::ConnectionStartOk,
            MethodKind::ConnectionTuneOk,
            MethodKind::ConnectionOpen
        ]
    );
}

#[tokio::test]
async fn start_ok_carries_credentials_and_client_properties() {
    let builder = Connection::builder()
        .credentials(PlainCredentials::new("app", "s3cret"))
        .client_property("connection_name", "orders");
    let harness = Harness::with_builder(builder);
    harness.open().await;

    let start_ok = match &harness.broker.sent_methods(0)[0] {
        Method::ConnectionStartOk(start_ok) => start_ok.clone(),
        other => panic!("expected start-ok, got {:?}", other),
    };
    assert_eq!(start_ok.mechanism, "PLAIN");
    assert_eq!(start_ok.response, "\0app\0s3cret");
    assert_eq!(start_ok.locale, "en_US");

    let properties = start_ok.client_properties;
    assert_eq!(
        properties.get("platform"),
        Some(&FieldValue::from("Rust"))
    );
    assert_eq!(
        properties.get("connection_name"),
        Some(&FieldValue::from("orders"))
    );
    match properties.get("capabilities") {
        Some(FieldValue::FieldTable(capabilities)) => {
            assert_eq!(
                capabilities.get("publisher_confirms"),
                Some(&FieldValue::Boolean(true))
            );
            assert_eq!(
                capabilities.get("connection.blocked"),
                Some(&FieldValue::Boolean(true))
            );
        }
        other => panic!("expected a capabilities table, got {:?}", other),
    }
}

#[tokio::test]
async fn tuning_takes_the_smaller_non_zero_value() {
    let builder = Connection::builder()
        .channel_max(16)
        .frame_max(0)
        .heartbeat(10)
        .vhost("staging");
    let harness = Harness::with_builder(builder);
    harness.open().await;

    let methods = harness.broker.sent_methods(0);
    match &methods[1] {
        Method::ConnectionTuneOk(tune_ok) => {
            assert_eq!(tune_ok.channel_max, 16);
            assert_eq!(tune_ok.frame_max, 131072);
            assert_eq!(tune_ok.heartbeat, 10);
        }
        other => panic!("expected tune-ok, got {:?}", other),
    }
    match &methods[2] {
        Method::ConnectionOpen(open) => assert_eq!(open.virtual_host, "staging"),
        other => panic!("expected open, got {:?}", other),
    }

    assert_eq!(harness.connection.channel_max(), 16);
    assert_eq!(harness.connection.frame_max(), 131072);
    assert_eq!(harness.connection.heartbeat(), 10);
    assert_eq!(harness.heartbeat.starts(), 1);
    assert_eq!(harness.heartbeat.interval(), Some(Duration::from_secs(10)));
}

#[tokio::test]
async fn channel_max_is_enforced_after_tuning() {
    let harness = Harness::with_builder(Connection::builder().channel_max(2));
    harness.open().await;

    assert_eq!(harness.connection.create_channel().unwrap().id(), 1);
    assert_eq!(harness.connection.create_channel().unwrap().id(), 2);
    assert!(matches!(
        harness.connection.create_channel(),
        Err(connection::Error::ChannelMaxReached)
    ));
}

#[tokio::test]
async fn unsupported_mechanism_fails_the_handshake() {
    let mut harness = Harness::new();
    harness.broker.set_mechanisms("EXTERNAL AMQPLAIN");
    harness.connection.start().unwrap();
    harness.queue.step().await;

    assert_eq!(harness.connection.state(), ConnectionState::Failed);
    assert!(!harness.connection.is_connected());
    assert!(harness.broker.sent_methods(0).is_empty());

    let events = harness.drain_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ConnectionEvent::HandshakeFailed(reason) => assert!(reason.contains("PLAIN")),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(
        harness.connection.wait_until_open().await,
        Err(connection::Error::HandshakeFailed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn silent_broker_times_out_the_handshake() {
    let builder = Connection::builder().handshake_timeout(Duration::from_secs(5));
    let mut harness = Harness::with_builder(builder);
    harness.broker.set_silent(true);
    harness.connection.start().unwrap();

    let started = tokio::time::Instant::now();
    harness.queue.step().await;
    assert_eq!(started.elapsed(), Duration::from_secs(5));

    assert_eq!(harness.connection.state(), ConnectionState::Failed);
    assert_eq!(harness.queue.pending(), 0);
    assert_eq!(harness.heartbeat.starts(), 0);
    assert!(!harness.connection.is_connected());
    assert!(matches!(
        harness.drain_events().as_slice(),
        [ConnectionEvent::HandshakeFailed(_)]
    ));

    // Nothing further is queued once failed
    harness.connection.close();
    assert_eq!(harness.queue.items(), 1);
    assert!(harness.connection.create_channel().is_err());
}

#[tokio::test]
async fn start_is_only_allowed_once() {
    let harness = Harness::new();
    harness.connection.start().unwrap();
    assert!(matches!(
        harness.connection.start(),
        Err(connection::Error::IllegalState(ConnectionState::Handshaking))
    ));
    assert_eq!(harness.queue.items(), 1);
}

#[tokio::test]
async fn channels_need_an_open_connection() {
    let harness = Harness::new();
    assert!(matches!(
        harness.connection.create_channel(),
        Err(connection::Error::IllegalState(ConnectionState::Start))
    ));
    harness.connection.start().unwrap();
    assert!(harness.connection.create_channel().is_err());
    assert_eq!(harness.queue.items(), 1);
}

#[tokio::test]
async fn open_rejects_other_schemes() {
    let result = Connection::open("amqps://localhost").await;
    assert!(matches!(
        result,
        Err(connection::OpenError::InvalidScheme(scheme)) if scheme == "amqps"
    ));

    let result = Connection::open("not a url").await;
    assert!(matches!(result, Err(connection::OpenError::UrlError(_))));
}
