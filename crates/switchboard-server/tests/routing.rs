//! Routing and room behavior tests
//!
//! Drives the hub through its event interface and checks who receives what.

mod common;

use common::{Hub, last_history};
use serde_json::json;
use switchboard_proto::{Identity, RoomId, ServerMessage};
use switchboard_server::SHUTDOWN_NOTICE;

fn message(from: &Identity, payload: serde_json::Value, is_broadcast: Option<bool>) -> ServerMessage {
    ServerMessage::Message { from: from.clone(), payload, is_broadcast }
}

fn is_error(msg: &ServerMessage) -> bool {
    matches!(msg, ServerMessage::Error { .. })
}

#[test]
fn every_connection_sees_the_full_roster_after_connect() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    let c = hub.connect();

    let mut expected = vec![a.clone(), b.clone(), c.clone()];
    expected.sort();

    for id in [&a, &b, &c] {
        let last_roster = hub
            .take(id)
            .into_iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::UserList { users } => Some(users),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_roster, expected);
    }
}

#[test]
fn new_connection_learns_identity_before_roster() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();

    assert_eq!(hub.take(&a), vec![
        ServerMessage::RegisterSuccess { id: a.clone() },
        ServerMessage::UserList { users: vec![a.clone()] },
    ]);
}

#[test]
fn identities_are_32_hex_characters() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();

    assert_eq!(a.as_str().len(), 32);
    assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn route_reaches_only_the_recipient() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    let c = hub.connect();
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "type": "route", "to": b, "payload": "hi" }));

    assert_eq!(hub.take(&b), vec![message(&a, json!("hi"), None)]);
    assert!(hub.take(&a).is_empty());
    assert!(hub.take(&c).is_empty());
    assert_eq!(hub.persisted, 1);
}

#[test]
fn route_miss_errors_to_sender_without_persisting() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "type": "route", "to": "nonexistent", "payload": "x" }));

    let replies = hub.take(&a);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0], ServerMessage::error("Recipient not found: nonexistent"));
    assert!(hub.take(&b).is_empty());
    assert_eq!(hub.persisted, 0);
    assert!(hub.driver.storage().is_empty());
}

#[test]
fn broadcast_excludes_sender() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    let c = hub.connect();
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "type": "broadcast", "payload": "p" }));

    assert!(hub.take(&a).is_empty());
    assert_eq!(hub.take(&b), vec![message(&a, json!("p"), Some(true))]);
    assert_eq!(hub.take(&c), vec![message(&a, json!("p"), Some(true))]);
    assert_eq!(hub.persisted, 1);
}

#[test]
fn typing_signals_go_to_everyone_else() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "type": "start-typing" }));
    hub.send_json(&a, json!({ "type": "stop-typing" }));

    assert!(hub.take(&a).is_empty());
    assert_eq!(hub.take(&b), vec![
        ServerMessage::UserTyping { id: a.clone() },
        ServerMessage::UserStoppedTyping { id: a.clone() },
    ]);
    assert_eq!(hub.persisted, 0);
}

#[test]
fn join_room_notifies_both_sides_with_matching_room() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "type": "join-room", "with": b }));

    let room_id = RoomId::between(&a, &b);
    assert_eq!(room_id, RoomId::between(&b, &a));
    assert_eq!(hub.take(&a), vec![ServerMessage::JoinedRoom {
        room_id: room_id.clone(),
        with: b.clone()
    }]);
    assert_eq!(hub.take(&b), vec![ServerMessage::JoinedRoom { room_id, with: a.clone() }]);
}

#[test]
fn join_room_with_offline_partner_changes_nothing() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "type": "join-room", "with": "offline" }));

    let replies = hub.take(&a);
    assert_eq!(replies.len(), 1);
    assert!(is_error(&replies[0]));
    assert_eq!(hub.driver.registry().room_of(&a), None);
}

#[test]
fn room_message_is_private_and_not_persisted() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    let c = hub.connect();
    hub.send_json(&a, json!({ "type": "join-room", "with": b }));
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "type": "room-message", "payload": "secret" }));

    assert_eq!(hub.take(&b), vec![message(&a, json!("secret"), Some(false))]);
    assert!(hub.take(&c).is_empty());
    assert_eq!(hub.persisted, 0);

    hub.send_json(&c, json!({ "type": "get-history" }));
    assert!(last_history(&hub.take(&c)).is_empty());
}

#[test]
fn history_is_filtered_by_participant() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    let c = hub.connect();

    hub.send_json(&a, json!({ "type": "route", "to": b, "payload": "direct" }));
    hub.send_json(&a, json!({ "type": "broadcast", "payload": "everyone" }));
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "type": "get-history" }));
    let a_history: Vec<_> = last_history(&hub.take(&a)).into_iter().map(|r| r.payload).collect();
    assert_eq!(a_history, vec![json!("direct"), json!("everyone")]);

    hub.send_json(&b, json!({ "type": "get-history" }));
    assert_eq!(last_history(&hub.take(&b)).len(), 2);

    hub.send_json(&c, json!({ "type": "get-history" }));
    let c_history = last_history(&hub.take(&c));
    assert_eq!(c_history.len(), 1);
    assert!(c_history[0].is_broadcast);
    assert_eq!(c_history[0].recipient_id, None);
}

#[test]
fn disconnect_updates_roster_and_releases_partner() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    let c = hub.connect();
    hub.send_json(&a, json!({ "type": "join-room", "with": b }));
    hub.clear_inboxes();

    hub.disconnect(&a);

    let room_id = RoomId::between(&a, &b);
    let mut remaining = vec![b.clone(), c.clone()];
    remaining.sort();

    assert_eq!(hub.take(&b), vec![
        ServerMessage::UserList { users: remaining.clone() },
        ServerMessage::PartnerLeftRoom { room_id },
        ServerMessage::UserStoppedTyping { id: a.clone() },
    ]);
    assert_eq!(hub.take(&c), vec![
        ServerMessage::UserList { users: remaining },
        ServerMessage::UserStoppedTyping { id: a.clone() },
    ]);
    assert_eq!(hub.driver.registry().room_of(&b), None);

    // B is no longer in a room
    hub.send_json(&b, json!({ "type": "room-message", "payload": 1 }));
    assert_eq!(hub.take(&b), vec![ServerMessage::error("Not in a room")]);
}

#[test]
fn closing_twice_sends_nothing_new() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();

    hub.disconnect(&a);
    hub.clear_inboxes();
    hub.disconnect(&a);

    assert!(hub.take(&b).is_empty());
    assert_eq!(hub.driver.connection_count(), 1);
}

#[test]
fn malformed_frame_only_answers_sender() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    hub.clear_inboxes();

    hub.send(&a, "this is not json");

    let replies = hub.take(&a);
    assert_eq!(replies.len(), 1);
    assert!(is_error(&replies[0]));
    assert!(hub.take(&b).is_empty());
    assert_eq!(hub.driver.connection_count(), 2);
}

#[test]
fn missing_type_is_reported() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    hub.clear_inboxes();

    hub.send_json(&a, json!({ "payload": 1 }));

    assert_eq!(hub.take(&a), vec![ServerMessage::error(
        "Invalid message format: missing \"type\" field"
    )]);
}

#[test]
fn shutdown_notifies_everyone_once_and_empties_registry() {
    let mut hub = Hub::in_memory();
    let a = hub.connect();
    let b = hub.connect();
    hub.clear_inboxes();

    hub.shutdown();
    let notice = vec![ServerMessage::info(SHUTDOWN_NOTICE)];
    assert_eq!(hub.take(&a), notice);
    assert_eq!(hub.take(&b), notice);
    assert_eq!(hub.closed().len(), 2);
    assert_eq!(hub.driver.connection_count(), 0);

    hub.shutdown();
    hub.disconnect(&a);
    assert!(hub.take(&a).is_empty());
    assert!(hub.take(&b).is_empty());
    assert_eq!(hub.closed().len(), 2);
}
