//! The relay's reconciliation loop.
//!
//! Runs as its own task, decoupled from the connection tasks through the
//! inbound queue: a stalled peer can slow its own connection but never the
//! processing of everyone else's reports. Each tick drains whatever the
//! connections queued, reconciles it against the registry, re-broadcasts
//! disconnect notices, and publishes the consolidated snapshot.

use crate::broadcast::BroadcastRouter;
use crate::registry::SessionRegistry;
use log::{debug, error};
use shared::{encode, Envelope, Mode, Reconciler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

pub struct Relay {
    registry: Arc<RwLock<SessionRegistry>>,
    router: Arc<BroadcastRouter>,
    inbound_rx: mpsc::UnboundedReceiver<Envelope>,
    reconciler: Reconciler,
    tick_duration: Duration,
    cycle: u64,
}

impl Relay {
    pub fn new(
        registry: Arc<RwLock<SessionRegistry>>,
        router: Arc<BroadcastRouter>,
        inbound_rx: mpsc::UnboundedReceiver<Envelope>,
        tick_duration: Duration,
    ) -> Self {
        Self {
            registry,
            router,
            inbound_rx,
            reconciler: Reconciler::new(Mode::Authoritative, None),
            tick_duration,
            cycle: 0,
        }
    }

    /// Runs reconciliation cycles until the task is cancelled.
    pub async fn run(&mut self) {
        let mut tick = interval(self.tick_duration);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately.
        tick.tick().await;

        loop {
            tick.tick().await;
            self.run_cycle().await;
        }
    }

    /// One reconciliation cycle: drain, reconcile, publish.
    pub async fn run_cycle(&mut self) {
        let mut batch = Vec::new();
        while let Ok(envelope) = self.inbound_rx.try_recv() {
            batch.push(envelope);
        }

        let active = self.registry.read().await.list_active();
        let outcome = self.reconciler.apply_batch(batch, Some(&active));

        // Departed sessions are removed from the registry unconditionally;
        // the leave/disconnect paths usually got there first, so a miss is
        // expected.
        if !outcome.removed.is_empty() {
            let mut registry = self.registry.write().await;
            for session_id in &outcome.removed {
                let _ = registry.remove(session_id);
            }
        }

        // Replicas purge exclusively on notices, so every consumed notice
        // is forwarded to the remaining peers.
        for notice in &outcome.notices {
            match encode(notice) {
                Ok(frame) => self.router.broadcast(frame).await,
                Err(e) => error!("Failed to encode disconnect notice: {}", e),
            }
        }

        if let Some(snapshot) = &outcome.snapshot {
            match encode(snapshot) {
                Ok(frame) => self.router.broadcast(frame).await,
                Err(e) => error!("Failed to encode snapshot: {}", e),
            }
        }

        self.cycle += 1;
        if self.cycle % 100 == 0 {
            debug!(
                "Cycle {}: {} sessions, {} tracked views",
                self.cycle,
                active.len(),
                self.reconciler.view().len()
            );
        }
    }

    /// Current shared view, for inspection in tests.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}
