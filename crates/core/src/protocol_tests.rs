// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn test_record() -> Record {
    Record::from_value(json!({"id": "cus-1", "name": "Ali"})).unwrap()
}

#[parameterized(
    ping = { ClientMessage::ping(7), 7 },
    create = { ClientMessage::Create { req: 1, entity: EntityType::Customers, record: test_record() }, 1 },
    update = { ClientMessage::Update { req: 2, entity: EntityType::Customers, record: test_record() }, 2 },
    delete = { ClientMessage::Delete { req: 3, entity: EntityType::Sales, id: "sal-1".into() }, 3 },
    list = { ClientMessage::List { req: 4, entity: EntityType::Products }, 4 },
)]
fn client_message_request_id(msg: ClientMessage, expected: RequestId) {
    assert_eq!(msg.request_id(), expected);
    let parsed = ClientMessage::from_json(&msg.to_json().unwrap()).unwrap();
    assert_eq!(parsed, msg);
}

#[test]
fn client_message_wire_format() {
    let msg = ClientMessage::Delete {
        req: 3,
        entity: EntityType::Sales,
        id: "sal-1".into(),
    };
    let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({"type": "delete", "req": 3, "entity": "sales", "id": "sal-1"})
    );
}

#[test]
fn server_record_is_flat() {
    let msg = ServerMessage::Record {
        req: 9,
        record: test_record(),
    };
    let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({"type": "record", "req": 9, "record": {"id": "cus-1", "name": "Ali"}})
    );
}

#[parameterized(
    pong = { ServerMessage::pong(5), Some(5) },
    deleted = { ServerMessage::Deleted { req: 6 }, Some(6) },
    records = { ServerMessage::Records { req: 8, records: vec![] }, Some(8) },
    error_with_req = { ServerMessage::error(Some(4), RemoteErrorKind::Conflict, "exists"), Some(4) },
    error_without_req = { ServerMessage::error(None, RemoteErrorKind::Unknown, "bad json"), None },
)]
fn server_message_request_id(msg: ServerMessage, expected: Option<RequestId>) {
    assert_eq!(msg.request_id(), expected);
    let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
    assert_eq!(parsed, msg);
}

#[test]
fn error_kind_wire_names() {
    let json = serde_json::to_string(&RemoteErrorKind::NotFound).unwrap();
    assert_eq!(json, "\"not_found\"");
    assert_eq!(RemoteErrorKind::NotFound.to_string(), "not_found");
}
