//! Presence, typing, unread counts, and inbound stream reconciliation.

use std::time::Duration;

use utalk_core::types::{ConversationId, UserId};
use utalk_entity::conversation::Conversation;
use utalk_entity::presence::PresenceStatus;
use utalk_transport::frames::ServerFrame;

use crate::helpers;

#[tokio::test(start_paused = true)]
async fn typing_indicator_expires_without_a_stop_event() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let (user, conv) = (UserId::new(), ConversationId::new());
    transport
        .inject(ServerFrame::Typing {
            user_id: user,
            conversation_id: conv,
            is_typing: true,
        })
        .await;
    helpers::settle().await;
    assert_eq!(client.typing_users(conv), vec![user]);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(client.typing_users(conv).is_empty());
    assert!(!client.is_anyone_typing(conv));
}

#[tokio::test(start_paused = true)]
async fn explicit_typing_stop_clears_immediately() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let (user, conv) = (UserId::new(), ConversationId::new());
    transport
        .inject(ServerFrame::Typing {
            user_id: user,
            conversation_id: conv,
            is_typing: true,
        })
        .await;
    transport
        .inject(ServerFrame::Typing {
            user_id: user,
            conversation_id: conv,
            is_typing: false,
        })
        .await;
    helpers::settle().await;

    assert!(client.typing_users(conv).is_empty());
}

#[tokio::test(start_paused = true)]
async fn presence_events_update_the_tracker() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let user = UserId::new();
    transport
        .inject(ServerFrame::PresenceChanged {
            user_id: user,
            status: PresenceStatus::Busy,
        })
        .await;
    helpers::settle().await;

    assert_eq!(client.presence(user).unwrap().status, PresenceStatus::Busy);
}

#[tokio::test(start_paused = true)]
async fn selecting_a_conversation_zeroes_unread_synchronously() {
    let (client, _transport, _api) = helpers::test_client();

    let conv = ConversationId::new();
    let mut conversation = Conversation::new(conv);
    conversation.unread_count = 5;
    client.store().upsert_conversation(conversation);

    // The reset is visible before any await: no settle, no round-trip.
    client.store().select_conversation(conv);
    assert_eq!(client.conversation(conv).unwrap().unread_count, 0);
}

#[tokio::test(start_paused = true)]
async fn open_conversation_resets_unread_and_moves_the_subscription() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let (conv_a, conv_b) = (ConversationId::new(), ConversationId::new());
    let mut conversation = Conversation::new(conv_b);
    conversation.unread_count = 3;
    client.store().upsert_conversation(conversation);

    client.open_conversation(conv_a).await.expect("open a");
    client.open_conversation(conv_b).await.expect("open b");

    assert_eq!(client.conversation(conv_b).unwrap().unread_count, 0);

    // One live subscription: opening B unsubscribed A.
    let sent = transport.sent.lock().unwrap();
    let subs: Vec<_> = sent
        .iter()
        .filter_map(|f| match f {
            utalk_transport::frames::ClientFrame::Subscribe { conversation_id } => {
                Some(("sub", *conversation_id))
            }
            utalk_transport::frames::ClientFrame::Unsubscribe { conversation_id } => {
                Some(("unsub", *conversation_id))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        subs,
        vec![("sub", conv_a), ("unsub", conv_a), ("sub", conv_b)]
    );
}

#[tokio::test(start_paused = true)]
async fn customer_message_counts_unread_only_when_not_selected() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let (selected, background) = (ConversationId::new(), ConversationId::new());
    client.store().upsert_conversation(Conversation::new(selected));
    client
        .store()
        .upsert_conversation(Conversation::new(background));
    client.open_conversation(selected).await.expect("open");

    transport
        .inject(ServerFrame::MessageNew {
            message: helpers::customer_message(selected, "seen right away", 0),
        })
        .await;
    transport
        .inject(ServerFrame::MessageNew {
            message: helpers::customer_message(background, "waiting", 0),
        })
        .await;
    helpers::settle().await;

    assert_eq!(client.conversation(selected).unwrap().unread_count, 0);
    assert_eq!(client.conversation(background).unwrap().unread_count, 1);
}

#[tokio::test(start_paused = true)]
async fn snapshots_merge_sorted_and_skip_malformed_records() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    client.open_conversation(conv).await.expect("open");

    let records = vec![
        serde_json::to_value(helpers::customer_message(conv, "third", 30)).unwrap(),
        serde_json::json!({"not": "a message"}),
        serde_json::to_value(helpers::customer_message(conv, "first", 10)).unwrap(),
        serde_json::to_value(helpers::customer_message(conv, "second", 20)).unwrap(),
    ];
    transport
        .inject(ServerFrame::ConversationSnapshot {
            conversation_id: conv,
            messages: records,
        })
        .await;
    helpers::settle().await;

    let contents: Vec<_> = client
        .messages(conv)
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test(start_paused = true)]
async fn snapshot_for_an_unsubscribed_conversation_is_dropped() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    transport
        .inject(ServerFrame::ConversationSnapshot {
            conversation_id: conv,
            messages: vec![serde_json::to_value(helpers::customer_message(conv, "x", 0)).unwrap()],
        })
        .await;
    helpers::settle().await;

    assert!(client.messages(conv).is_empty());
}

#[tokio::test(start_paused = true)]
async fn delivery_receipts_advance_message_status() {
    let (client, transport, _api) = helpers::test_client();
    client.connect(helpers::credentials()).await.expect("connect");

    let conv = ConversationId::new();
    let message = helpers::customer_message(conv, "hello", 0);
    let server_id = message.id.as_server_id().unwrap();
    transport.inject(ServerFrame::MessageNew { message }).await;
    transport
        .inject(ServerFrame::MessageStatus {
            conversation_id: conv,
            message_id: server_id,
            status: "read".into(),
        })
        .await;
    helpers::settle().await;

    assert_eq!(
        client.messages(conv)[0].status,
        utalk_entity::message::MessageStatus::Read
    );
}
