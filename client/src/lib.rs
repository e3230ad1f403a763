//! # Position Sync Client Library
//!
//! Client-side implementation for the position synchronization relay. The
//! client keeps a replica of the shared world: its own position is the only
//! thing it knows first-hand, everything else arrives as snapshots from the
//! relay.
//!
//! ## Module Organization
//!
//! ### Bootstrap Module (`bootstrap`)
//! HTTP session lifecycle against the relay:
//! - `join` to obtain a session id
//! - `ping`/`update` to keep the session fresh
//! - `leave` to retire it deliberately
//!
//! ### Network Module (`network`)
//! The persistent WebSocket connection and the sync loop:
//! - send/receive worker tasks around an outbound/inbound queue pair
//! - replica-mode reconciliation of incoming snapshots and notices
//! - fixed-cadence position reporting
//!
//! ### Mover Module (`mover`)
//! A synthetic patrol that gives a headless client something to report.
//!
//! ## Design Notes
//!
//! The client trusts the relay completely: snapshots overwrite the replica
//! view, and a peer disappears only when a disconnect notice says so. Local
//! echoes of the client's own id inside a snapshot are skipped so the local
//! mover stays the single source of truth for the client's own position.

pub mod bootstrap;
pub mod mover;
pub mod network;
