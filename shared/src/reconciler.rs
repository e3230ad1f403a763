//! Merges batches of inbound envelopes into the shared position view.
//!
//! The same reconciler runs on both sides of the wire. The relay runs it in
//! [`Mode::Authoritative`]: it consumes raw position reports, purges stale
//! entries against the registry's active set, and produces the consolidated
//! snapshot that gets broadcast. Clients run it in [`Mode::Replica`]: they
//! consume snapshots and disconnect notices, never purge on their own (a
//! peer that missed one reporting tick is not gone), and never emit.

use crate::protocol::{Envelope, EntityReport, Message};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// Which side of the wire this reconciler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Owns the canonical view and performs stale-entry purge.
    Authoritative,
    /// Mirrors the relay's view; removal is driven by disconnect notices only.
    Replica,
}

/// Result of one reconciliation cycle.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Session ids dropped from the view this cycle.
    pub removed: Vec<String>,
    /// Disconnect notices consumed this cycle, for re-broadcast to peers.
    pub notices: Vec<Envelope>,
    /// At most one consolidated snapshot, authoritative mode only. `None`
    /// when idle (zero active sessions) so an empty relay stays quiescent.
    pub snapshot: Option<Envelope>,
}

pub struct Reconciler {
    mode: Mode,
    /// Our own session id. Reports echoed back for it are skipped; the local
    /// entity set is authoritative locally. The relay has no local session.
    local_id: Option<String>,
    view: HashMap<String, Vec<EntityReport>>,
}

impl Reconciler {
    pub fn new(mode: Mode, local_id: Option<String>) -> Self {
        Self {
            mode,
            local_id,
            view: HashMap::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current shared view: session id -> latest entity list.
    pub fn view(&self) -> &HashMap<String, Vec<EntityReport>> {
        &self.view
    }

    fn is_local(&self, session_id: &str) -> bool {
        self.local_id.as_deref() == Some(session_id)
    }

    /// Runs one reconciliation cycle over a drained batch.
    ///
    /// `active` is the registry's membership snapshot; the relay passes it on
    /// every cycle, replicas pass `None`. Within a batch, the last report for
    /// a session id wins.
    pub fn apply_batch(
        &mut self,
        batch: Vec<Envelope>,
        active: Option<&HashSet<String>>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut candidates: HashSet<String> = self.view.keys().cloned().collect();

        for envelope in batch {
            match envelope.body {
                Message::PositionReport(entities) => {
                    if self.is_local(&envelope.session_id) {
                        continue;
                    }
                    // The registry is the authority on membership: a report
                    // from an id it does not know (never joined, spoofed, or
                    // already retired) must not enter the view, or it would
                    // be refreshed into every snapshot from then on.
                    if self.mode == Mode::Authoritative {
                        if let Some(active) = active {
                            if !active.contains(&envelope.session_id) {
                                warn!(
                                    "Dropping report from unregistered session {}",
                                    envelope.session_id
                                );
                                continue;
                            }
                        }
                    }
                    candidates.remove(&envelope.session_id);
                    self.view.insert(envelope.session_id, entities);
                }
                Message::AllPositionsSnapshot(entries) => {
                    for (session_id, entities) in entries {
                        if self.is_local(&session_id) {
                            continue;
                        }
                        candidates.remove(&session_id);
                        self.view.insert(session_id, entities);
                    }
                }
                Message::DisconnectNotice => {
                    let session_id = envelope.session_id.clone();
                    if self.view.remove(&session_id).is_some() {
                        debug!("Dropped departed session {} from view", session_id);
                    }
                    candidates.remove(&session_id);
                    outcome.removed.push(session_id);
                    outcome.notices.push(envelope);
                }
                Message::Unrecognized(ref raw) => {
                    warn!("Discarding unrecognized message: {:?}", raw);
                }
            }
        }

        // Entries nobody refreshed this cycle are stale once the registry no
        // longer knows the session. Catches notices that were dropped or
        // reordered. Replicas must not do this: a peer that merely skipped a
        // reporting tick would flicker out.
        if self.mode == Mode::Authoritative {
            if let Some(active) = active {
                for session_id in candidates {
                    if !active.contains(&session_id) {
                        self.view.remove(&session_id);
                        outcome.removed.push(session_id);
                    }
                }
            }
        }

        outcome.snapshot = self.snapshot_envelope(active);
        outcome
    }

    /// Consolidated snapshot for broadcast. Suspended entirely while the
    /// relay is idle so an empty relay does not accumulate outbound work.
    fn snapshot_envelope(&self, active: Option<&HashSet<String>>) -> Option<Envelope> {
        if self.mode != Mode::Authoritative {
            return None;
        }
        if active.map_or(true, |a| a.is_empty()) {
            return None;
        }
        let sender = self.local_id.clone().unwrap_or_default();
        Some(Envelope::new(
            sender,
            Message::AllPositionsSnapshot(self.view.clone()),
        ))
    }
}
