//! Session bootstrap over plain request/response.
//!
//! One call per verb: `join` to obtain an identifier, `ping`/`update` to
//! refresh it, `leave` to retire it. The relay treats registry membership,
//! not socket liveness, as the authority for who is still playing, so a
//! client that wants to stay visible keeps its session alive here.

use log::debug;
use shared::{Session, SessionReply};

pub struct BootstrapClient {
    http: reqwest::Client,
    base_url: String,
}

impl BootstrapClient {
    /// `base_url` is the relay's HTTP origin, e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Requests a fresh session. The relay falls back to the generated id
    /// as the display name when no name is requested.
    pub async fn join(
        &self,
        requested_name: Option<&str>,
    ) -> Result<Session, Box<dyn std::error::Error>> {
        let mut request = self.http.get(format!("{}/join", self.base_url));
        if let Some(name) = requested_name {
            request = request.query(&[("requested_name", name)]);
        }
        let reply: SessionReply = request.send().await?.json().await?;
        reply
            .session
            .ok_or_else(|| "join returned no session".into())
    }

    /// Refreshes the session's last-activity timestamp. `None` means the
    /// relay no longer knows the id.
    pub async fn ping(&self, id: &str) -> Result<Option<Session>, Box<dyn std::error::Error>> {
        self.refresh("ping", id).await
    }

    /// Same contract as [`BootstrapClient::ping`]; the relay exposes the
    /// operation under both names.
    pub async fn update(&self, id: &str) -> Result<Option<Session>, Box<dyn std::error::Error>> {
        self.refresh("update", id).await
    }

    async fn refresh(
        &self,
        verb: &str,
        id: &str,
    ) -> Result<Option<Session>, Box<dyn std::error::Error>> {
        let url = format!("{}/{}/{}", self.base_url, verb, id);
        let reply: SessionReply = self.http.get(url).send().await?.json().await?;
        Ok(reply.session)
    }

    /// Retires the session. Safe to call even if the transport disconnect
    /// already got there; the relay treats the second removal as a no-op.
    pub async fn leave(&self, id: &str) -> Result<Option<Session>, Box<dyn std::error::Error>> {
        let url = format!("{}/leave/{}", self.base_url, id);
        let reply: SessionReply = self.http.get(url).send().await?.json().await?;
        debug!("Leave reply for {}: {:?}", id, reply.session);
        Ok(reply.session)
    }

    /// The WebSocket endpoint for a session id.
    pub fn ws_url(&self, id: &str) -> String {
        let origin = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/ws/{}", origin, id)
    }
}
