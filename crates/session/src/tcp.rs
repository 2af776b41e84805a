//! TCP-Listener – Bindet den Raum-Socket, akzeptiert Gaeste
//!
//! Der `RoomListener` laeuft in einem eigenen Task. Er meldet der Engine
//! zuerst, ob das Binden geklappt hat, und reicht danach jede angenommene
//! Verbindung als `PeerHandle` weiter. Die Pruefung des Beitritts macht
//! die Engine, der Listener kennt weder Roster noch Secret Key.

use backroom_core::TransportError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::SessionConfig;
use crate::connection::ConnectionHandler;
use crate::engine::{EngineEvent, RoomHandle};
use crate::error::SessionResult;

/// Accept-Fehler in Folge, ab denen der Socket als defekt gilt
const MAX_ACCEPT_FEHLER: u32 = 5;

/// Listener eines gehosteten Raums
pub struct RoomListener {
    config: SessionConfig,
    engine_tx: mpsc::Sender<EngineEvent>,
}

impl RoomListener {
    /// Erstellt einen neuen Listener
    pub fn neu(config: SessionConfig, engine_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { config, engine_tx }
    }

    /// Bindet den Socket und akzeptiert Verbindungen
    ///
    /// `antwort` wird von der Engine beantwortet, sobald sie das Ergebnis des
    /// Bindens verarbeitet hat. Laeuft bis `shutdown_rx` ein `true`-Signal
    /// empfaengt oder die Engine nicht mehr existiert.
    pub async fn starten(
        self,
        antwort: oneshot::Sender<SessionResult<RoomHandle>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let bind_ziel = self.config.bind_ziel();

        let listener = match TcpListener::bind(&bind_ziel).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(adresse = %bind_ziel, fehler = %e, "Binden fehlgeschlagen");
                let fehler = TransportError::ConnectFailed(format!("{}: {}", bind_ziel, e));
                let _ = self
                    .engine_tx
                    .send(EngineEvent::RaumFehlgeschlagen { fehler, antwort })
                    .await;
                return;
            }
        };

        let adresse = match listener.local_addr() {
            Ok(adresse) => adresse,
            Err(e) => {
                let fehler = TransportError::ConnectFailed(e.to_string());
                let _ = self
                    .engine_tx
                    .send(EngineEvent::RaumFehlgeschlagen { fehler, antwort })
                    .await;
                return;
            }
        };

        tracing::info!(adresse = %adresse, "Raum-Listener gestartet");
        if self
            .engine_tx
            .send(EngineEvent::RaumBereit { adresse, antwort })
            .await
            .is_err()
        {
            return;
        }

        self.accept_loop(listener, &mut shutdown_rx).await;
        tracing::info!(adresse = %adresse, "Raum-Listener gestoppt");
    }

    /// Interne Accept-Loop
    async fn accept_loop(&self, listener: TcpListener, shutdown_rx: &mut watch::Receiver<bool>) {
        let mut fehler_in_folge: u32 = 0;

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                ergebnis = listener.accept() => {
                    match ergebnis {
                        Ok((stream, peer_addr)) => {
                            fehler_in_folge = 0;
                            if !self.annehmen(stream, peer_addr).await {
                                break;
                            }
                        }
                        Err(e) => {
                            fehler_in_folge += 1;
                            tracing::error!(fehler = %e, anzahl = fehler_in_folge, "TCP-Accept-Fehler");
                            if fehler_in_folge >= MAX_ACCEPT_FEHLER {
                                let fehler = TransportError::ConnectionLost(format!(
                                    "Listener-Socket defekt: {}",
                                    e
                                ));
                                let _ = self.engine_tx.send(EngineEvent::ListenerFehler(fehler)).await;
                                break;
                            }
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                geaendert = shutdown_rx.changed() => {
                    if geaendert.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!("Raum-Listener: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }
    }

    /// Reicht eine angenommene Verbindung an die Engine weiter
    ///
    /// Gibt `false` zurueck, wenn die Engine nicht mehr laeuft.
    async fn annehmen(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) -> bool {
        tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

        let (handle, handler) = ConnectionHandler::neu(peer_addr, self.engine_tx.clone(), &self.config);

        // Erst das Handle melden, dann den Handler starten
        if self
            .engine_tx
            .send(EngineEvent::Angenommen(handle))
            .await
            .is_err()
        {
            return false;
        }
        tokio::spawn(handler.verarbeiten(stream));
        true
    }
}
