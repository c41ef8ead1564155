// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event router.
//!
//! `emit` delivers to every currently-registered matching waiter and
//! discards the rest — there is no history buffer. Each waiter is one-shot:
//! one `emit` produces at most one `Matched` per registration. The router is
//! created inside the engine and passed around by clone; nothing global, so
//! tests run engines side by side with disjoint routers.

use indexmap::IndexMap;
use meow_core::{EngineEvent, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Result of awaiting an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Matched(IndexMap<String, Value>),
    TimedOut,
    Cancelled,
}

/// Payload predicate: a conjunction of top-level field equalities.
///
/// Predicates are data, not closures, so the external CLI can express them
/// (`--predicate agent_id=worker`) and recovery can re-register them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub equals: Vec<(String, Value)>,
}

impl Predicate {
    /// Match any payload.
    pub fn any() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            equals: vec![(name.into(), value.into())],
        }
    }

    pub fn and(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((name.into(), value.into()));
        self
    }

    pub fn matches(&self, payload: &IndexMap<String, Value>) -> bool {
        self.equals
            .iter()
            .all(|(name, expected)| payload.get(name) == Some(expected))
    }
}

struct Waiter {
    id: u64,
    event_type: String,
    predicate: Predicate,
    tx: oneshot::Sender<IndexMap<String, Value>>,
}

#[derive(Default)]
struct RouterState {
    waiters: Vec<Waiter>,
    next_id: u64,
}

/// Registration handle: deregisters the waiter when dropped without a match.
pub struct Registration {
    router: EventRouter,
    id: u64,
    rx: oneshot::Receiver<IndexMap<String, Value>>,
}

impl Registration {
    /// Wait for the event, a timeout, or cancellation.
    pub async fn wait(self, timeout: Duration, cancel: &CancellationToken) -> Outcome {
        let Registration { router, id, rx } = self;
        let outcome = tokio::select! {
            result = rx => match result {
                Ok(payload) => Outcome::Matched(payload),
                // Router dropped the sender; treat as cancellation
                Err(_) => Outcome::Cancelled,
            },
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };
        if !matches!(outcome, Outcome::Matched(_)) {
            router.deregister(id);
        }
        outcome
    }
}

/// In-process pub/sub for engine events.
#[derive(Clone, Default)]
pub struct EventRouter {
    state: Arc<Mutex<RouterState>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every matching waiter. Non-blocking.
    ///
    /// Returns the number of waiters that received the event.
    pub fn emit(&self, event: &EngineEvent) -> usize {
        let mut matched = Vec::new();
        {
            let mut state = self.state.lock();
            let mut kept = Vec::with_capacity(state.waiters.len());
            for waiter in state.waiters.drain(..) {
                if waiter.event_type == event.event_type && waiter.predicate.matches(&event.payload)
                {
                    matched.push(waiter.tx);
                } else {
                    kept.push(waiter);
                }
            }
            state.waiters = kept;
        }

        let mut delivered = 0;
        for tx in matched {
            // A receiver that gave up concurrently is not an error
            if tx.send(event.payload.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::debug!(
            event_type = %event.event_type,
            delivered,
            "emit"
        );
        delivered
    }

    /// Register a waiter for the next matching event.
    pub fn register(&self, event_type: impl Into<String>, predicate: Predicate) -> Registration {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.waiters.push(Waiter {
                id,
                event_type: event_type.into(),
                predicate,
                tx,
            });
            id
        };
        Registration {
            router: self.clone(),
            id,
            rx,
        }
    }

    /// Block until a matching event arrives, the timeout elapses, or the
    /// token is cancelled.
    pub async fn await_event(
        &self,
        event_type: &str,
        predicate: Predicate,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Outcome {
        self.register(event_type, predicate)
            .wait(timeout, cancel)
            .await
    }

    fn deregister(&self, id: u64) {
        self.state.lock().waiters.retain(|w| w.id != id);
    }

    /// Number of currently-registered waiters (diagnostics).
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
