//! Fuzz target for hub driver event sequences
//!
//! Drives the hub with arbitrary connects, disconnects, frames and shutdowns
//! over a store that fails at a fuzzed rate.
//!
//! # Strategy
//!
//! - Well-formed envelopes aimed at live, departed and invented identities
//! - Raw garbage frames
//! - Duplicate disconnects and repeated shutdowns
//! - Store failure rates from 0% to 90%
//!
//! # Invariants
//!
//! - Driver NEVER panics
//! - Registry size equals the number of live identities
//! - Every `Send` targets a registered identity
//! - Nothing is accepted after shutdown

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::json;
use switchboard_proto::Identity;
use switchboard_server::{
    ChaoticStorage, DriverConfig, HubAction, HubDriver, HubEvent, MemoryStorage, Storage,
    SystemEnv,
};

#[derive(Debug, Arbitrary)]
struct Scenario {
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate: u8,
    capacity: u8,
    steps: Vec<Step>,
}

#[derive(Debug, Arbitrary)]
enum Step {
    Connect,
    Disconnect(u8),
    Route { from: u8, to: Target },
    Broadcast(u8),
    Typing { from: u8, start: bool },
    Join { from: u8, with: Target },
    RoomMessage(u8),
    History(u8),
    Garbage { from: u8, text: String },
    Shutdown,
}

#[derive(Debug, Arbitrary)]
enum Target {
    Live(u8),
    Invented(String),
}

fuzz_target!(|scenario: Scenario| {
    let rate = f64::from(scenario.failure_rate % 10) / 10.0;
    let storage = ChaoticStorage::with_seed(
        MemoryStorage::with_capacity(usize::from(scenario.capacity)),
        rate,
        scenario.chaos_seed,
    );
    let config = DriverConfig { max_connections: 16, ..DriverConfig::default() };
    let mut driver: HubDriver<SystemEnv, _, ()> = HubDriver::new(SystemEnv::new(), storage, config);
    let mut live: Vec<Identity> = Vec::new();

    for step in scenario.steps {
        let event = match step {
            Step::Connect => {
                if let Ok((identity, actions)) = driver.accept_connection(()) {
                    live.push(identity);
                    check(&mut driver, actions);
                } else {
                    assert!(driver.is_shutting_down() || driver.connection_count() == 16);
                }
                None
            },
            Step::Disconnect(i) => pick(&live, i).map(|identity| {
                live.retain(|other| other != &identity);
                HubEvent::ConnectionClosed { identity, reason: "fuzz".to_string() }
            }),
            Step::Shutdown => Some(HubEvent::Shutdown),
            Step::Route { from, to } => {
                let to = target(&live, to);
                frame(pick(&live, from), json!({ "type": "route", "to": to, "payload": 1 }))
            },
            Step::Broadcast(i) => {
                frame(pick(&live, i), json!({ "type": "broadcast", "payload": [1, 2] }))
            },
            Step::Typing { from, start } => {
                let kind = if start { "start-typing" } else { "stop-typing" };
                frame(pick(&live, from), json!({ "type": kind }))
            },
            Step::Join { from, with } => {
                let with = target(&live, with);
                frame(pick(&live, from), json!({ "type": "join-room", "with": with }))
            },
            Step::RoomMessage(i) => {
                frame(pick(&live, i), json!({ "type": "room-message", "payload": null }))
            },
            Step::History(i) => frame(pick(&live, i), json!({ "type": "get-history" })),
            Step::Garbage { from, text } => {
                pick(&live, from).map(|identity| HubEvent::FrameReceived { identity, text })
            },
        };

        if let Some(event) = event {
            if let Ok(actions) = driver.process_event(event) {
                check(&mut driver, actions);
            }
        }

        if driver.is_shutting_down() {
            live.clear();
        }
        assert_eq!(driver.connection_count(), live.len());
    }
});

fn pick(live: &[Identity], i: u8) -> Option<Identity> {
    (!live.is_empty()).then(|| live[usize::from(i) % live.len()].clone())
}

fn target(live: &[Identity], target: Target) -> Identity {
    match target {
        Target::Live(i) => pick(live, i).unwrap_or_else(|| Identity::from("nobody")),
        Target::Invented(name) => Identity::new(name),
    }
}

fn frame(from: Option<Identity>, envelope: serde_json::Value) -> Option<HubEvent> {
    from.map(|identity| HubEvent::FrameReceived { identity, text: envelope.to_string() })
}

/// Execute actions the way the runtime does and check their targets.
fn check<S: Storage>(driver: &mut HubDriver<SystemEnv, S, ()>, actions: Vec<HubAction>) {
    for action in actions {
        match action {
            HubAction::Send { to, .. } => assert!(driver.handle(&to).is_some(), "send to {to}"),
            HubAction::Close { identity } => {
                driver.take_connection(&identity);
            },
            HubAction::Persist { record } => {
                let _ = driver.storage().insert(&record);
            },
            HubAction::FetchHistory { requester, limit } => {
                let _ = driver.storage().query(&requester, limit);
            },
            HubAction::ReleaseStorage => {
                let _ = driver.storage().close();
            },
            HubAction::Log { .. } => {},
        }
    }
}
