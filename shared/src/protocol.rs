//! Wire message envelope and codec shared by the relay and clients.
//!
//! Every frame on the wire is one UTF-8 JSON envelope: a session id plus a
//! tagged message body. The tag set is closed; anything that fails to parse
//! is wrapped as [`Message::Unrecognized`] so a bad frame can be logged and
//! discarded without tearing the connection down.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A screen-space rectangle reported for one entity.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

/// Explicit entity classification carried in position reports.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Player,
}

/// One entity's position inside a session's report.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntityReport {
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub rect: Rect,
}

impl EntityReport {
    pub fn player(entity_id: impl Into<String>, rect: Rect) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_kind: EntityKind::Player,
            rect,
        }
    }
}

/// One connected participant's identity and liveness record.
///
/// Owned by the session registry on the relay; serialized verbatim in
/// bootstrap responses so clients can carry it around.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub display_name: String,
    /// Seconds since the UNIX epoch, refreshed on ping/update.
    pub last_activity: f64,
}

/// Response body shared by the join/ping/update/leave bootstrap calls.
/// `session` is `null` when the id is unknown.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionReply {
    pub session: Option<Session>,
}

/// The uniform wire message wrapper.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub session_id: String,
    #[serde(flatten)]
    pub body: Message,
}

impl Envelope {
    pub fn new(session_id: impl Into<String>, body: Message) -> Self {
        Self {
            session_id: session_id.into(),
            body,
        }
    }
}

/// Message body, tagged by `kind` with a `payload` whose shape is fixed per
/// kind. A payload that does not match its kind fails to parse and becomes
/// [`Message::Unrecognized`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Message {
    /// A session's latest entity rectangles, sent at the report cadence.
    PositionReport(Vec<EntityReport>),
    /// The relay's consolidated view: session id -> latest entity list.
    AllPositionsSnapshot(HashMap<String, Vec<EntityReport>>),
    /// A session left; payload intentionally empty.
    DisconnectNotice,
    /// Marker for input that could not be decoded; payload is the raw text.
    Unrecognized(String),
}

/// Encodes an envelope as a single JSON text frame.
pub fn encode(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

/// Decodes a text frame. Never fails: malformed input comes back as an
/// `unrecognized` envelope carrying the raw text, for the caller to log
/// and discard.
pub fn decode(raw: &str) -> Envelope {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("Malformed envelope ({}): {:?}", e, raw);
            Envelope {
                session_id: String::new(),
                body: Message::Unrecognized(raw.to_string()),
            }
        }
    }
}
