//! Types shared between the relay server and clients: the wire envelope
//! codec, the position-report data model, and the state reconciler that
//! both sides run (authoritative on the relay, replica on clients).

pub mod protocol;
pub mod reconciler;

pub use protocol::{
    decode, encode, EntityKind, EntityReport, Envelope, Message, Rect, Session, SessionReply,
};
pub use reconciler::{BatchOutcome, Mode, Reconciler};

/// World bounds clients clamp their rectangles to.
pub const WORLD_WIDTH: f32 = 1280.0;
pub const WORLD_HEIGHT: f32 = 720.0;
/// Side length of a player rectangle.
pub const PLAYER_SIZE: f32 = 64.0;
/// Position reports per second per session; also the relay snapshot cadence.
pub const REPORTS_PER_SECOND: u32 = 10;
