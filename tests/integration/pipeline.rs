//! Outbound pipeline behavior: dual-path delivery, reconciliation, retries.

use utalk_core::error::ErrorKind;
use utalk_core::types::{ConversationId, MessageId};
use utalk_entity::message::{LocalMessageId, MessageKind, MessageStatus};
use utalk_transport::frames::ServerFrame;

use crate::helpers::{self, AckScript, ApiScript};

#[tokio::test(start_paused = true)]
async fn transport_ack_success_yields_single_sent_record() {
    let (client, transport, api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    let server_id = MessageId::new();
    transport.script(AckScript::OkWithId(server_id));

    let sent = client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect("send");

    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.id, LocalMessageId::Server(server_id));

    let messages = client.messages(conv);
    assert_eq!(messages.len(), 1, "exactly one record after reconciliation");
    assert_eq!(messages[0].id.as_server_id(), Some(server_id));
    assert_eq!(api.call_count(), 0, "no fallback after transport success");
}

#[tokio::test(start_paused = true)]
async fn disconnected_transport_goes_straight_to_rest() {
    let (client, transport, api) = helpers::test_client();
    // No connect: the ack wait is skipped entirely.

    let conv = ConversationId::new();
    let server_id = MessageId::new();
    api.script(ApiScript::OkWithId(server_id));

    let sent = client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect("send");

    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.id, LocalMessageId::Server(server_id));
    assert_eq!(client.messages(conv).len(), 1);
    assert!(transport.emitted.lock().unwrap().is_empty());
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_ack_failure_falls_back_to_rest() {
    let (client, transport, api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    transport.script(AckScript::Reject("rate limited"));
    let server_id = MessageId::new();
    api.script(ApiScript::OkWithId(server_id));

    let sent = client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect("send");

    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.id.as_server_id(), Some(server_id));
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn ack_timeout_and_rest_failure_mark_the_record() {
    let (client, transport, api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    transport.script(AckScript::Timeout);
    api.script(ApiScript::Fail(utalk_core::AppError::api(
        "Message POST returned 500",
    )));

    let sent = client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect("send returns the terminal record");

    assert_eq!(sent.status, MessageStatus::Error);
    assert_eq!(sent.retry_count, 1);
    assert!(!sent.id.is_confirmed(), "temporary id is retained");
    assert!(sent.error_reason.unwrap().contains("500"));

    let messages = client.messages(conv);
    assert_eq!(messages.len(), 1, "never a second record");
}

#[tokio::test(start_paused = true)]
async fn fallback_carries_the_idempotency_key() {
    let (client, _transport, api) = helpers::test_client();

    let conv = ConversationId::new();
    let sent = client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect("send");

    let calls = api.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.client_ref, sent.client_ref);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_blocks_the_fourth_retry_without_io() {
    let (client, _transport, api) = helpers::test_client();
    // Transport stays disconnected; every attempt lands on REST.

    let conv = ConversationId::new();
    for _ in 0..4 {
        api.script(ApiScript::Fail(utalk_core::AppError::api(
            "Message POST returned 503",
        )));
    }

    let failed = client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect("send");
    assert_eq!(failed.retry_count, 1);
    let client_ref = failed.client_ref.clone();

    for expected in 2..=4u32 {
        let record = client
            .retry_message(conv, &client_ref)
            .await
            .expect("retry returns the terminal record");
        assert_eq!(record.status, MessageStatus::Error);
        assert_eq!(record.retry_count, expected);
    }
    assert_eq!(api.call_count(), 4);

    let err = client
        .retry_message(conv, &client_ref)
        .await
        .expect_err("budget exhausted");
    assert_eq!(err.kind, ErrorKind::RetryLimit);
    assert_eq!(api.call_count(), 4, "rejected before any network call");
}

#[tokio::test(start_paused = true)]
async fn server_echo_after_fallback_does_not_duplicate() {
    let (client, transport, api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    transport.script(AckScript::Timeout);
    let server_id = MessageId::new();
    api.script(ApiScript::OkWithId(server_id));

    let sent = client
        .send_message(conv, "hello", MessageKind::Text, vec![])
        .await
        .expect("send");
    assert_eq!(sent.id.as_server_id(), Some(server_id));

    // The transport path had reached the server after all; its record comes
    // back through the live stream with our reference attached.
    let mut echo = sent.clone();
    echo.status = MessageStatus::Sent;
    transport.inject(ServerFrame::MessageNew { message: echo }).await;
    helpers::settle().await;

    let messages = client.messages(conv);
    assert_eq!(messages.len(), 1, "echo collapses into the existing record");
    assert_eq!(messages[0].id.as_server_id(), Some(server_id));
}

#[tokio::test(start_paused = true)]
async fn concurrent_sends_are_independent() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    transport.script(AckScript::OkWithId(MessageId::new()));
    transport.script(AckScript::OkWithId(MessageId::new()));

    let (a, b) = tokio::join!(
        client.send_message(conv, "first", MessageKind::Text, vec![]),
        client.send_message(conv, "second", MessageKind::Text, vec![]),
    );
    a.expect("first send");
    b.expect("second send");

    let messages = client.messages(conv);
    assert_eq!(messages.len(), 2);
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}
