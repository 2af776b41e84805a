//! Verbindung – Verwaltet eine einzelne TCP-Verbindung zu einem Peer
//!
//! Jede Verbindung (Host -> Gast und Gast -> Host) bekommt einen
//! `ConnectionHandler` in einem eigenen tokio-Task. Der Handler macht
//! ausschliesslich I/O: eingehende Frames werden zu `ConnectionEvent`s und
//! in die Event-Queue der Engine gestellt, ausgehende Frames kommen ueber
//! die Send-Queue des `PeerHandle`.
//!
//! ## Lebenszyklus
//! ```text
//! verbunden -> liest/schreibt Frames -> Gegenstelle trennt  -> Disconnected
//!                                    -> PeerHandle verworfen -> Queue leeren, schliessen
//! ```
//!
//! Leeren und Schliessen laufen gemeinsam unter `close_grace`; danach wird
//! der Socket hart geschlossen. Ein einzelner Schreibvorgang auf eine
//! laufende Verbindung ist durch `schreib_timeout` begrenzt.
//!
//! `Disconnected` wird hoechstens einmal gemeldet und nie, wenn die Engine
//! die Verbindung selbst freigegeben hat.

use backroom_core::{ConnectionId, Message, ProtocolError, TransportError};
use backroom_protocol::{Decoded, Frame, FrameCodec, JoinRejection};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::SessionConfig;
use crate::engine::EngineEvent;

// ---------------------------------------------------------------------------
// ConnectionEvent
// ---------------------------------------------------------------------------

/// Typisiertes Ereignis einer Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    // Beim Host: vom Gast
    JoinRequest { secret_key: String, username: String },
    MessageReceived { body: String },
    LeaveNotice,

    // Beim Gast: vom Host
    AuthResult { ok: bool, reason: Option<JoinRejection> },
    Delivered(Message),
    Kicked,
    Banned,
    RoomClosed,

    // Beide Seiten
    MalformedFrame(ProtocolError),
    Disconnected(TransportError),
}

impl ConnectionEvent {
    /// Uebersetzt ein empfangenes Frame
    pub fn aus_frame(frame: Frame) -> Self {
        match frame {
            Frame::JoinRequest {
                secret_key,
                username,
            } => Self::JoinRequest {
                secret_key,
                username,
            },
            Frame::Post { body } => Self::MessageReceived { body },
            Frame::Leave => Self::LeaveNotice,
            Frame::AuthResult { ok, reason } => Self::AuthResult { ok, reason },
            Frame::Chat {
                sender,
                body,
                sequence,
            } => Self::Delivered(Message::chat(sender, body, sequence)),
            Frame::System { body, sequence } => Self::Delivered(Message::system(
                crate::message_bus::SYSTEM_ABSENDER,
                body,
                sequence,
            )),
            Frame::KickNotice => Self::Kicked,
            Frame::BanNotice => Self::Banned,
            Frame::RoomClosedNotice => Self::RoomClosed,
        }
    }
}

// ---------------------------------------------------------------------------
// PeerHandle
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
///
/// Gehoert genau einem Besitzer in der Engine. Wird das Handle verworfen,
/// leert der Handler die Queue und schliesst die Verbindung.
#[derive(Debug)]
pub struct PeerHandle {
    connection_id: ConnectionId,
    peer_addr: SocketAddr,
    tx: mpsc::Sender<Frame>,
    /// Signalisiert dem Handler das Verwerfen, auch mitten in einem Schreibvorgang
    _verworfen: DropGuard,
}

impl PeerHandle {
    /// Sendet ein Frame nicht-blockierend an den Peer
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::warn!(
                    verbindung = %self.connection_id,
                    frame = frame.art(),
                    "Send-Queue voll, Frame verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    verbindung = %self.connection_id,
                    "Send-Queue geschlossen (Peer getrennt)"
                );
                false
            }
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Handle mit direkt lesbarer Queue, ohne Socket
    #[cfg(test)]
    pub(crate) fn test_paar(queue: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(queue);
        let handle = Self {
            connection_id: ConnectionId::new(),
            peer_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            tx,
            _verworfen: CancellationToken::new().drop_guard(),
        };
        (handle, rx)
    }
}

// ---------------------------------------------------------------------------
// ConnectionHandler
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne TCP-Verbindung
pub struct ConnectionHandler {
    connection_id: ConnectionId,
    peer_addr: SocketAddr,
    engine_tx: mpsc::Sender<EngineEvent>,
    ausgehend_rx: mpsc::Receiver<Frame>,
    verworfen: CancellationToken,
    max_ungueltige_frames: u32,
    max_frame_groesse: usize,
    close_grace: Duration,
    schreib_timeout: Duration,
}

impl ConnectionHandler {
    /// Erstellt Handler und zugehoeriges Handle
    ///
    /// Das Handle muss bei der Engine ankommen, bevor der Handler gestartet
    /// wird, sonst koennten dessen Ereignisse einer unbekannten Verbindung
    /// zugeordnet werden.
    pub fn neu(
        peer_addr: SocketAddr,
        engine_tx: mpsc::Sender<EngineEvent>,
        config: &SessionConfig,
    ) -> (PeerHandle, Self) {
        let connection_id = ConnectionId::new();
        let (tx, ausgehend_rx) = mpsc::channel(config.send_queue_groesse.max(1));
        let verworfen = CancellationToken::new();

        let handle = PeerHandle {
            connection_id,
            peer_addr,
            tx,
            _verworfen: verworfen.clone().drop_guard(),
        };
        let handler = Self {
            connection_id,
            peer_addr,
            engine_tx,
            ausgehend_rx,
            verworfen,
            max_ungueltige_frames: config.max_ungueltige_frames,
            max_frame_groesse: config.max_frame_groesse,
            close_grace: config.close_grace,
            schreib_timeout: config.schreib_timeout,
        };
        (handle, handler)
    }

    /// Startet die Verarbeitungsschleife
    ///
    /// Laeuft bis die Gegenstelle trennt, ein I/O-Fehler auftritt oder die
    /// Engine das `PeerHandle` verwirft.
    pub async fn verarbeiten(mut self, stream: TcpStream) {
        let peer_addr = self.peer_addr;
        tracing::debug!(peer = %peer_addr, verbindung = %self.connection_id, "Verbindung gestartet");

        let mut framed = Framed::new(stream, FrameCodec::with_max_size(self.max_frame_groesse));
        let mut ungueltig_in_folge: u32 = 0;

        let verlust: Option<TransportError> = loop {
            tokio::select! {
                // Eingehendes Frame vom Peer
                eingehend = framed.next() => {
                    match eingehend {
                        Some(Ok(Decoded::Frame(frame))) => {
                            ungueltig_in_folge = 0;
                            tracing::trace!(peer = %peer_addr, frame = frame.art(), "Frame empfangen");
                            if !self.melden(ConnectionEvent::aus_frame(frame)).await {
                                break None;
                            }
                        }
                        Some(Ok(Decoded::Malformed(grund))) => {
                            ungueltig_in_folge += 1;
                            tracing::warn!(
                                peer = %peer_addr,
                                anzahl = ungueltig_in_folge,
                                fehler = %grund,
                                "Ungueltiges Frame"
                            );
                            if ungueltig_in_folge > self.max_ungueltige_frames {
                                break Some(TransportError::ConnectionLost(format!(
                                    "{} ungueltige Frames in Folge",
                                    ungueltig_in_folge
                                )));
                            }
                            let fehler = ProtocolError::MalformedFrame(grund);
                            if !self.melden(ConnectionEvent::MalformedFrame(fehler)).await {
                                break None;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break Some(TransportError::ConnectionLost(e.to_string()));
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung von der Gegenstelle getrennt");
                            break Some(TransportError::ConnectionLost(
                                "Gegenstelle hat die Verbindung geschlossen".to_string(),
                            ));
                        }
                    }
                }

                // Handle verworfen: Rest der Queue unter der Gnadenfrist
                _ = self.verworfen.cancelled() => break None,

                // Ausgehendes Frame aus der Engine
                ausgehend = self.ausgehend_rx.recv() => {
                    let Some(frame) = ausgehend else {
                        break None;
                    };
                    tracing::trace!(peer = %peer_addr, frame = frame.art(), "Frame senden");
                    tokio::select! {
                        gesendet = tokio::time::timeout(self.schreib_timeout, framed.send(frame)) => {
                            match gesendet {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => {
                                    tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                    break Some(TransportError::ConnectionLost(e.to_string()));
                                }
                                Err(_) => {
                                    tracing::warn!(
                                        peer = %peer_addr,
                                        timeout_ms = self.schreib_timeout.as_millis() as u64,
                                        "Gegenstelle nimmt keine Daten mehr an"
                                    );
                                    break Some(TransportError::ConnectionLost(
                                        "Schreib-Timeout".to_string(),
                                    ));
                                }
                            }
                        }
                        _ = self.verworfen.cancelled() => break None,
                    }
                }
            }
        };

        match verlust {
            Some(fehler) => {
                self.melden(ConnectionEvent::Disconnected(fehler)).await;
            }
            None => {
                let ausgehend_rx = &mut self.ausgehend_rx;
                let abschluss = async {
                    while let Some(frame) = ausgehend_rx.recv().await {
                        if let Err(e) = framed.feed(frame).await {
                            return Err(e);
                        }
                    }
                    framed.close().await
                };
                match tokio::time::timeout(self.close_grace, abschluss).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(peer = %peer_addr, fehler = %e, "Fehler beim Schliessen");
                    }
                    Err(_) => {
                        tracing::debug!(
                            peer = %peer_addr,
                            "Gnadenfrist ueberschritten, Verbindung wird hart geschlossen"
                        );
                    }
                }
                drop(framed);
            }
        }

        tracing::debug!(peer = %peer_addr, verbindung = %self.connection_id, "Verbindung beendet");
    }

    /// Stellt ein Ereignis in die Engine-Queue
    ///
    /// Gibt `false` zurueck, wenn die Engine nicht mehr laeuft.
    async fn melden(&self, event: ConnectionEvent) -> bool {
        self.engine_tx
            .send(EngineEvent::Verbindung {
                id: self.connection_id,
                event,
            })
            .await
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
