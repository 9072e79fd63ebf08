//! Switchboard wire protocol.
//!
//! Every application frame is a single JSON document carrying a `type`
//! discriminator. Clients send [`ClientMessage`]s, the hub answers with
//! [`ServerMessage`]s, and routed or broadcast traffic is persisted as
//! [`MessageRecord`]s.
//!
//! # Components
//!
//! - [`Identity`]: server-assigned connection handle
//! - [`RoomId`]: canonical two-party room token
//! - [`ClientMessage`]: inbound envelope, decoded with [`ClientMessage::decode`]
//! - [`ServerMessage`]: outbound envelope, encoded with [`ServerMessage::encode`]
//! - [`MessageRecord`]: persisted history entry
//!
//! This crate has no I/O and no runtime dependency. It is shared by the server
//! and by tests that play the client side.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod identity;
mod record;
mod server;

pub use client::ClientMessage;
pub use error::ProtocolError;
pub use identity::{Identity, RoomId};
pub use record::MessageRecord;
pub use server::ServerMessage;
