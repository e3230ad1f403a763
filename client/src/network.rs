//! WebSocket transport and the replica-side synchronization loop.
//!
//! [`Connection`] owns the socket and the queue pair around it: a send
//! worker drains the outbound queue onto the wire, a receive worker decodes
//! frames off the wire into the inbound queue. Neither worker blocks the
//! other, so a stalled write never delays incoming snapshots.
//!
//! [`SyncClient`] drives the fixed-cadence cycle on top of that transport:
//! drain whatever arrived, fold it into the replica view, step the local
//! mover, and report the new position.

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{
    encode, EntityReport, Envelope, Message, Mode, Reconciler, Session, REPORTS_PER_SECOND,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::mover::PatrolMover;

pub struct Connection {
    outbound_tx: mpsc::UnboundedSender<Envelope>,
    inbound_rx: mpsc::UnboundedReceiver<Envelope>,
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
}

impl Connection {
    /// Connects to `ws_url` and spawns the send/receive workers.
    pub async fn open(ws_url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (socket, _) = connect_async(ws_url).await?;
        info!("Connected to {}", ws_url);

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Envelope>();

        let send_task = tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                match encode(&envelope) {
                    Ok(text) => {
                        if sink.send(WsMessage::Text(text.into())).await.is_err() {
                            debug!("Send worker stopping: socket closed");
                            return;
                        }
                    }
                    Err(e) => error!("Failed to encode outbound envelope: {}", e),
                }
            }
            // Outbound queue dropped: announce the close before the sink goes.
            let _ = sink.send(WsMessage::Close(None)).await;
        });

        let recv_task = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(raw)) => {
                        let envelope = shared::decode(raw.as_str());
                        match envelope.body {
                            Message::AllPositionsSnapshot(_) | Message::DisconnectNotice => {
                                if inbound_tx.send(envelope).is_err() {
                                    return;
                                }
                            }
                            Message::Unrecognized(ref raw) => {
                                warn!("Ignoring unrecognized frame: {}", raw);
                            }
                            Message::PositionReport(_) => {
                                // The relay never forwards raw reports.
                                debug!("Ignoring position-report frame from relay");
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        info!("Relay closed the connection");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Receive worker stopping: {}", e);
                        return;
                    }
                }
            }
        });

        Ok(Self {
            outbound_tx,
            inbound_rx,
            send_task,
            recv_task,
        })
    }

    /// Queues an envelope for the send worker. Errors only if the worker
    /// has already stopped, which the run loop treats as a disconnect.
    pub fn send(&self, envelope: Envelope) -> Result<(), Box<dyn std::error::Error>> {
        self.outbound_tx
            .send(envelope)
            .map_err(|_| "connection closed".into())
    }

    /// Drains everything currently queued without waiting.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut batch = Vec::new();
        while let Ok(envelope) = self.inbound_rx.try_recv() {
            batch.push(envelope);
        }
        batch
    }

    pub fn is_open(&self) -> bool {
        !self.send_task.is_finished() && !self.recv_task.is_finished()
    }

    /// Flushes the close frame and tears down both workers.
    pub async fn close(self) {
        let Self {
            outbound_tx,
            inbound_rx,
            send_task,
            recv_task,
        } = self;
        drop(outbound_tx);
        drop(inbound_rx);
        let _ = send_task.await;
        recv_task.abort();
        let _ = recv_task.await;
    }
}

pub struct SyncClient {
    session: Session,
    connection: Connection,
    reconciler: Reconciler,
    mover: PatrolMover,
}

impl SyncClient {
    pub fn new(session: Session, connection: Connection, mover: PatrolMover) -> Self {
        let reconciler = Reconciler::new(Mode::Replica, Some(session.id.clone()));
        Self {
            session,
            connection,
            reconciler,
            mover,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The replica view: peers only, keyed by session id. The local mover
    /// is deliberately absent; callers overlay it themselves.
    pub fn view(&self) -> &HashMap<String, Vec<EntityReport>> {
        self.reconciler.view()
    }

    /// Runs reconciliation cycles at the report cadence until the relay
    /// drops the connection. One cycle: drain inbound, fold into the view,
    /// step the mover, report.
    pub async fn run(&mut self) {
        let dt = 1.0 / REPORTS_PER_SECOND as f32;
        let mut ticker = interval(Duration::from_millis(1000 / REPORTS_PER_SECOND as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let batch = self.connection.drain();
            if !batch.is_empty() {
                let outcome = self.reconciler.apply_batch(batch, None);
                for id in &outcome.removed {
                    info!("Peer {} left", id);
                }
            }

            self.mover.advance(dt);
            let report = Envelope::new(
                self.session.id.clone(),
                Message::PositionReport(vec![EntityReport::player(
                    self.session.id.clone(),
                    self.mover.rect().clone(),
                )]),
            );
            if self.connection.send(report).is_err() || !self.connection.is_open() {
                info!("Connection lost, stopping sync loop");
                return;
            }
        }
    }

    pub async fn shutdown(self) {
        self.connection.close().await;
    }
}
