//! Session lifecycle: auth failures, teardown, manual reconnect.

use utalk_core::error::ErrorKind;
use utalk_core::events::{SessionEndReason, SessionEvent};
use utalk_core::types::ConversationId;
use utalk_entity::message::MessageKind;
use utalk_transport::status::ConnectionStatus;

use crate::helpers::{self, ApiScript};

#[tokio::test(start_paused = true)]
async fn rejected_handshake_surfaces_auth_and_invalidates() {
    let (client, transport, _api) = helpers::test_client();
    transport.reject_handshake.store(true, std::sync::atomic::Ordering::SeqCst);
    let mut session_events = client.session_events();

    let err = client
        .connect(helpers::credentials())
        .await
        .expect_err("handshake must fail");
    assert_eq!(err.kind, ErrorKind::Authentication);

    match session_events.recv().await.expect("event") {
        SessionEvent::Invalidated { reason } => {
            assert_eq!(reason, SessionEndReason::Unauthorized);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn rest_401_invalidates_the_session_and_tears_down() {
    let (client, _transport, api) = helpers::test_client();
    let mut session_events = client.session_events();

    let conv = ConversationId::new();
    api.script(ApiScript::Fail(utalk_core::AppError::authentication(
        "Message POST rejected: 401",
    )));

    let err = client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect_err("401 escalates");
    assert_eq!(err.kind, ErrorKind::Authentication);

    match session_events.recv().await.expect("event") {
        SessionEvent::Invalidated { reason } => {
            assert_eq!(reason, SessionEndReason::Unauthorized);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The teardown handler clears local state.
    helpers::settle().await;
    assert!(client.messages(conv).is_empty());
}

#[tokio::test(start_paused = true)]
async fn logout_clears_state_and_drops_the_link() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect("send");
    assert_eq!(client.messages(conv).len(), 1);

    client.logout();
    helpers::settle().await;

    assert!(client.messages(conv).is_empty());
    assert!(!transport.is_connected());
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_reruns_the_handshake() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    transport.set_connected(false);
    helpers::settle().await;
    assert_eq!(
        client.connection_state().status,
        ConnectionStatus::Disconnected
    );

    client.reconnect_now().await.expect("reconnect");
    helpers::settle().await;

    let state = client.connection_state();
    assert_eq!(state.status, ConnectionStatus::Connected);
    assert!(state.last_connected_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn health_monitor_tracks_transport_state_changes() {
    let (client, transport, _api) = helpers::test_client();
    let mut watch = client.connection_watch();

    client.connect(helpers::credentials()).await.expect("connect");
    watch.changed().await.expect("status change");
    assert_eq!(watch.borrow().status, ConnectionStatus::Connected);

    transport.set_connected(false);
    watch.changed().await.expect("status change");
    assert_eq!(watch.borrow().status, ConnectionStatus::Disconnected);
}
