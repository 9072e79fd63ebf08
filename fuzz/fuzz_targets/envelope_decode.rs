//! Fuzz target for inbound envelope decoding
//!
//! # Strategy
//!
//! - Random text: arbitrary UTF-8 fed straight to the decoder
//! - Shaped objects: a known or unknown `type` plus random extra fields
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - A successfully decoded message reports a known `type`
//! - Every error renders a non-empty reply message

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value};
use switchboard_proto::ClientMessage;

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(String),
    Shaped { kind: KindChoice, fields: Vec<(String, FieldValue)> },
}

#[derive(Debug, Arbitrary)]
enum KindChoice {
    Known(u8),
    Other(String),
    NotAString(i64),
    Missing,
}

#[derive(Debug, Arbitrary)]
enum FieldValue {
    Null,
    Bool(bool),
    Number(i64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Number(n) => Value::from(n),
            Self::Text(s) => Value::String(s),
            Self::List(items) => Value::Array(items.into_iter().map(Value::String).collect()),
        }
    }
}

fuzz_target!(|input: Input| {
    let text = match input {
        Input::Raw(text) => text,
        Input::Shaped { kind, fields } => {
            let mut object = Map::new();
            for (key, value) in fields {
                object.insert(key, value.into_json());
            }
            match kind {
                KindChoice::Known(i) => {
                    let known = ClientMessage::KNOWN_TYPES;
                    let kind = known[i as usize % known.len()];
                    object.insert("type".to_string(), Value::from(kind));
                },
                KindChoice::Other(kind) => {
                    object.insert("type".to_string(), Value::String(kind));
                },
                KindChoice::NotAString(n) => {
                    object.insert("type".to_string(), Value::from(n));
                },
                KindChoice::Missing => {
                    object.remove("type");
                },
            }
            Value::Object(object).to_string()
        },
    };

    match ClientMessage::decode(&text) {
        Ok(message) => assert!(ClientMessage::KNOWN_TYPES.contains(&message.kind())),
        Err(e) => assert!(!e.to_string().is_empty()),
    }
});
