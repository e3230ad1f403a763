//! # Position Relay Server Library
//!
//! The relay that keeps every connected client's view of peer positions in
//! sync. Clients bootstrap a session over plain HTTP, open a persistent
//! WebSocket, and stream position reports; the relay reconciles those
//! reports into one consolidated snapshot and broadcasts it back out.
//!
//! ## Architecture
//!
//! One lightweight task per open connection performs the blocking reads and
//! writes; everything they produce flows through queues, so a slow or
//! stalled peer cannot block message processing for anyone else:
//!
//! - **Connection read tasks** decode frames and feed the relay-wide
//!   inbound queue (`routes`).
//! - **Connection write tasks** each drain their own outbound channel, the
//!   consumer end of the broadcast fan-out (`broadcast`).
//! - **The relay task** drains the inbound queue at a fixed cadence,
//!   reconciles the batch against registry membership, and publishes the
//!   snapshot (`relay`, with the algorithm itself in `shared::reconciler`).
//!
//! ## Module Organization
//!
//! - [`registry`] — session lifecycle; the source of truth for membership.
//! - [`broadcast`] — per-connection outbound channels and fan-out.
//! - [`routes`] — bootstrap endpoints and WebSocket connection handling.
//! - [`relay`] — the reconciliation loop.
//!
//! ## Ownership
//!
//! Each shared resource has exactly one mutating role: the registry is
//! written by the bootstrap handlers and the disconnect path, the shared
//! view by the relay task only, and every outbound channel has the
//! broadcast router as its sole producer and one write task as its sole
//! consumer.

pub mod broadcast;
pub mod registry;
pub mod relay;
pub mod routes;
