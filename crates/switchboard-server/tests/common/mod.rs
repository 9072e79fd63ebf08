//! Deterministic hub harness shared by the integration tests.
//!
//! Runs a [`HubDriver`] with a seeded environment and executes its actions
//! synchronously: sends land in per-identity inboxes, persistence and history
//! queries hit the store directly.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use switchboard_proto::{Identity, ServerMessage};
use switchboard_server::{
    DriverConfig, HubAction, HubDriver, HubEvent, MemoryStorage, Storage, env::Environment,
};

/// Seeded RNG plus a clock that ticks one millisecond per reading.
#[derive(Clone)]
pub struct SeededEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    clock: Arc<AtomicU64>,
}

impl SeededEnv {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            clock: Arc::new(AtomicU64::new(1_700_000_000_000)),
        }
    }
}

impl Environment for SeededEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        Duration::from_millis(self.clock.load(Ordering::SeqCst))
    }

    fn wall_clock_millis(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

/// Driver plus synchronous action executor.
pub struct Hub<S: Storage> {
    pub driver: HubDriver<SeededEnv, S, ()>,
    inboxes: BTreeMap<Identity, Vec<ServerMessage>>,
    closed: Vec<Identity>,
    pub persist_failures: usize,
    pub persisted: usize,
}

impl Hub<MemoryStorage> {
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new(), DriverConfig::default(), 42)
    }
}

impl<S: Storage> Hub<S> {
    pub fn new(storage: S, config: DriverConfig, seed: u64) -> Self {
        Self {
            driver: HubDriver::new(SeededEnv::new(seed), storage, config),
            inboxes: BTreeMap::new(),
            closed: Vec::new(),
            persist_failures: 0,
            persisted: 0,
        }
    }

    pub fn connect(&mut self) -> Identity {
        let (identity, actions) = self.driver.accept_connection(()).unwrap();
        self.apply(actions);
        identity
    }

    pub fn send(&mut self, from: &Identity, text: impl Into<String>) {
        let actions = self
            .driver
            .process_event(HubEvent::FrameReceived { identity: from.clone(), text: text.into() })
            .unwrap();
        self.apply(actions);
    }

    pub fn send_json(&mut self, from: &Identity, value: Value) {
        self.send(from, value.to_string());
    }

    pub fn disconnect(&mut self, identity: &Identity) {
        let actions = self
            .driver
            .process_event(HubEvent::ConnectionClosed {
                identity: identity.clone(),
                reason: "test disconnect".to_string(),
            })
            .unwrap();
        self.apply(actions);
    }

    pub fn shutdown(&mut self) {
        let actions = self.driver.process_event(HubEvent::Shutdown).unwrap();
        self.apply(actions);
    }

    /// Drain everything delivered to `identity` so far.
    pub fn take(&mut self, identity: &Identity) -> Vec<ServerMessage> {
        self.inboxes.remove(identity).unwrap_or_default()
    }

    /// Forget everything delivered so far.
    pub fn clear_inboxes(&mut self) {
        self.inboxes.clear();
    }

    /// Connections closed by the hub, in order.
    pub fn closed(&self) -> &[Identity] {
        &self.closed
    }

    pub fn apply(&mut self, actions: Vec<HubAction>) {
        for action in actions {
            match action {
                HubAction::Send { to, message } => self.deliver(&to, message),
                HubAction::Close { identity } => {
                    if self.driver.take_connection(&identity).is_some() {
                        self.closed.push(identity);
                    }
                },
                HubAction::Persist { record } => match self.driver.storage().insert(&record) {
                    Ok(()) => self.persisted += 1,
                    Err(_) => self.persist_failures += 1,
                },
                HubAction::FetchHistory { requester, limit } => {
                    let reply = match self.driver.storage().query(&requester, limit) {
                        Ok(history) => ServerMessage::MessageHistory { history },
                        Err(e) => ServerMessage::error(format!("Failed to load history: {e}")),
                    };
                    self.deliver(&requester, reply);
                },
                HubAction::ReleaseStorage => self.driver.storage().close().unwrap(),
                HubAction::Log { .. } => {},
            }
        }
    }

    fn deliver(&mut self, to: &Identity, message: ServerMessage) {
        // Same rule as the runtime: a recipient that already left gets nothing
        if self.driver.handle(to).is_some() {
            self.inboxes.entry(to.clone()).or_default().push(message);
        }
    }
}

/// Records from the last `message-history` envelope in `inbox`.
pub fn last_history(inbox: &[ServerMessage]) -> Vec<switchboard_proto::MessageRecord> {
    inbox
        .iter()
        .rev()
        .find_map(|m| match m {
            ServerMessage::MessageHistory { history } => Some(history.clone()),
            _ => None,
        })
        .expect("no message-history envelope delivered")
}
