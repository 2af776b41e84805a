//! Session-Engine – Zustandsmaschine eines Peers
//!
//! Ein einzelner Task besitzt den gesamten Session-Zustand (Raum, Roster,
//! MessageBus) und verarbeitet alles nacheinander aus zwei Queues:
//! Kommandos der Oberflaeche (ueber `SessionHandle`) und Ereignisse der
//! Netzwerk-Tasks (`EngineEvent`). Es gibt keine Locks; die Reihenfolge der
//! Verarbeitung ist die Reihenfolge der Sequenznummern.
//!
//! ## Zustaende
//! ```text
//! Idle --start_room--> Hosting --Listener bereit--> Active --close_room--> Terminated
//!   |                     +------Binden fehlgeschlagen--> Idle
//!   +--join_room--> Joining --AuthResult ok--> Active --leave/kick/ban/closed--> Terminated
//!                      +------abgelehnt/Timeout/Verbindungsfehler--> Idle
//! ```
//!
//! Alle Ergebnisse, die nicht direkt als Antwort auf ein Kommando kommen,
//! gehen als `Notification` ueber genau einen Kanal an die Oberflaeche.

use backroom_core::{
    AuthError, ConnectionId, Message, ModerationError, Notification, SequenceNumber,
    TransportError,
};
use backroom_protocol::{Frame, JoinRejection};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};

use crate::auth_gate::{self, AuthGate};
use crate::config::SessionConfig;
use crate::connection::{ConnectionEvent, ConnectionHandler, PeerHandle};
use crate::error::{SessionError, SessionResult};
use crate::message_bus::{Abonnenten, MessageBus};
use crate::roster::{Participant, Roster};
use crate::tcp::RoomListener;

/// Groesse der Kommando- und Event-Queues
const QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// Oeffentliche Typen
// ---------------------------------------------------------------------------

/// Zustand der lokalen Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Hosting,
    Joining,
    Active,
    Terminated,
}

/// Ergebnis von `start_room`: alles, was Gaeste zum Beitreten brauchen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomHandle {
    pub address: SocketAddr,
    pub secret_key: String,
    pub host_username: String,
}

impl RoomHandle {
    /// Tatsaechlich gebundener Port (relevant bei Port 0)
    pub fn port(&self) -> u16 {
        self.address.port()
    }
}

/// Ereignis eines Netzwerk-Tasks an die Engine
#[derive(Debug)]
pub enum EngineEvent {
    /// Listener hat gebunden
    RaumBereit {
        adresse: SocketAddr,
        antwort: oneshot::Sender<SessionResult<RoomHandle>>,
    },
    /// Listener konnte nicht binden
    RaumFehlgeschlagen {
        fehler: TransportError,
        antwort: oneshot::Sender<SessionResult<RoomHandle>>,
    },
    /// Listener-Socket ist ausgefallen
    ListenerFehler(TransportError),
    /// Neue Verbindung, noch nicht authentifiziert
    Angenommen(PeerHandle),
    /// Anmeldefrist einer wartenden Verbindung abgelaufen
    AnmeldungAbgelaufen(ConnectionId),
    /// Gast hat die TCP-Verbindung zum Host aufgebaut
    Verbunden { versuch: u64, handle: PeerHandle },
    /// Gast konnte den Host nicht erreichen
    VerbindungFehlgeschlagen { versuch: u64, fehler: TransportError },
    /// Kein `AuthResult` innerhalb der Frist
    JoinTimeout { versuch: u64 },
    /// Ereignis einer bestehenden Verbindung
    Verbindung {
        id: ConnectionId,
        event: ConnectionEvent,
    },
}

// ---------------------------------------------------------------------------
// Kommandos
// ---------------------------------------------------------------------------

type Antwort<T> = oneshot::Sender<SessionResult<T>>;

enum Kommando {
    StartRoom {
        username: String,
        antwort: Antwort<RoomHandle>,
    },
    JoinRoom {
        adresse: String,
        port: u16,
        secret_key: String,
        username: String,
        antwort: Antwort<()>,
    },
    SendMessage {
        body: String,
        antwort: Antwort<()>,
    },
    Kick {
        username: String,
        antwort: Antwort<()>,
    },
    Ban {
        username: String,
        antwort: Antwort<()>,
    },
    Leave {
        antwort: Antwort<()>,
    },
    Close {
        antwort: Antwort<()>,
    },
    Subscribe {
        antwort: Antwort<BoxStream<'static, Message>>,
    },
    Roster {
        antwort: Antwort<Vec<String>>,
    },
    Zustand {
        antwort: oneshot::Sender<SessionState>,
    },
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle der Oberflaeche auf die Engine
///
/// Clone teilt dieselbe Engine. Wird das letzte Handle verworfen, raeumt
/// die Engine auf (Raum schliessen bzw. Raum verlassen) und beendet sich.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    kommando_tx: mpsc::Sender<Kommando>,
}

impl std::fmt::Debug for Kommando {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Kommando")
    }
}

impl SessionHandle {
    async fn anfragen<T>(
        &self,
        bauen: impl FnOnce(oneshot::Sender<T>) -> Kommando,
    ) -> SessionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.kommando_tx
            .send(bauen(tx))
            .await
            .map_err(|_| SessionError::EngineStopped)?;
        rx.await.map_err(|_| SessionError::EngineStopped)
    }

    /// Eroeffnet einen Raum und wird dessen Host
    pub async fn start_room(&self, username: impl Into<String>) -> SessionResult<RoomHandle> {
        let username = username.into();
        self.anfragen(|antwort| Kommando::StartRoom { username, antwort })
            .await?
    }

    /// Startet einen Beitrittsversuch
    ///
    /// Kehrt sofort zurueck. Das Ergebnis kommt als Notification:
    /// `SwitchedToActiveView` bei Erfolg, sonst `UsernameRejected`,
    /// `SecretKeyRejected` oder `NonCriticalError`.
    pub async fn join_room(
        &self,
        adresse: impl Into<String>,
        port: u16,
        secret_key: impl Into<String>,
        username: impl Into<String>,
    ) -> SessionResult<()> {
        let (adresse, secret_key, username) = (adresse.into(), secret_key.into(), username.into());
        self.anfragen(|antwort| Kommando::JoinRoom {
            adresse,
            port,
            secret_key,
            username,
            antwort,
        })
        .await?
    }

    /// Sendet eine Nachricht in den Raum
    pub async fn send_message(&self, body: impl Into<String>) -> SessionResult<()> {
        let body = body.into();
        self.anfragen(|antwort| Kommando::SendMessage { body, antwort })
            .await?
    }

    /// Wirft einen Gast hinaus (nur Host)
    pub async fn kick_user(&self, username: impl Into<String>) -> SessionResult<()> {
        let username = username.into();
        self.anfragen(|antwort| Kommando::Kick { username, antwort })
            .await?
    }

    /// Bannt einen Namen und wirft ihn hinaus, falls anwesend (nur Host)
    pub async fn ban_user(&self, username: impl Into<String>) -> SessionResult<()> {
        let username = username.into();
        self.anfragen(|antwort| Kommando::Ban { username, antwort })
            .await?
    }

    /// Verlaesst den Raum (nur Gast)
    pub async fn leave_room(&self) -> SessionResult<()> {
        self.anfragen(|antwort| Kommando::Leave { antwort }).await?
    }

    /// Schliesst den Raum fuer alle (nur Host)
    pub async fn close_room(&self) -> SessionResult<()> {
        self.anfragen(|antwort| Kommando::Close { antwort }).await?
    }

    /// Abonniert alle kuenftigen Nachrichten des Raums
    ///
    /// Beim Host kommen sie vom MessageBus, beim Gast in Sequenzreihenfolge
    /// vom Host. Der Stream endet mit der Session; danach nur per neuem
    /// Beitritt wieder abonnierbar.
    pub async fn subscribe(&self) -> SessionResult<BoxStream<'static, Message>> {
        self.anfragen(|antwort| Kommando::Subscribe { antwort })
            .await?
    }

    /// Aktuelle Teilnehmer in Beitrittsreihenfolge (nur Host)
    pub async fn roster(&self) -> SessionResult<Vec<String>> {
        self.anfragen(|antwort| Kommando::Roster { antwort }).await?
    }

    /// Aktueller Zustand der Session
    pub async fn state(&self) -> SessionResult<SessionState> {
        self.anfragen(|antwort| Kommando::Zustand { antwort }).await
    }
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

/// Meldet Notifications an die Oberflaeche
#[derive(Debug, Clone)]
struct Melder {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Melder {
    fn melden(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("Keine Oberflaeche mehr verbunden, Notification verworfen");
        }
    }
}

/// Ein gehosteter Raum
#[derive(Debug)]
struct Room {
    adresse: SocketAddr,
    host_username: String,
    gate: AuthGate,
    roster: Roster,
}

/// Lokaler Zustand als Host
struct HostSitzung {
    room: Room,
    bus: MessageBus,
    /// Angenommene, noch nicht authentifizierte Verbindungen
    wartend: HashMap<ConnectionId, PeerHandle>,
    shutdown_tx: watch::Sender<bool>,
}

/// Lokaler Zustand als Gast
struct GastSitzung {
    versuch: u64,
    username: String,
    secret_key: String,
    verbindung: Option<PeerHandle>,
    letzte_sequenz: SequenceNumber,
    abonnenten: Abonnenten,
}

enum Lokal {
    Keine,
    Startend {
        username: String,
        secret_key: String,
        shutdown_tx: watch::Sender<bool>,
    },
    Host(HostSitzung),
    Gast(GastSitzung),
}

impl HostSitzung {
    /// Nimmt eine Chat-Nachricht an und verteilt sie
    fn veroeffentlichen(&mut self, sender: &str, body: &str, melder: &Melder) -> SessionResult<()> {
        let nachricht = self.bus.publish(sender, body)?;
        if self.verteilen(nachricht, melder) {
            melder.melden(Notification::RosterChanged(self.room.roster.snapshot()));
        }
        Ok(())
    }

    /// Sagt den Abgang eines bereits entfernten Teilnehmers an
    fn abgang_ansagen(&mut self, username: &str, melder: &Melder) {
        let ansage = self.bus.publish_system(format!("{} left", username));
        self.verteilen(ansage, melder);
        melder.melden(Notification::RosterChanged(self.room.roster.snapshot()));
    }

    /// Zeigt Nachrichten lokal an und stellt sie allen Gaesten zu
    ///
    /// Gaeste, deren Zustellung scheitert, werden entfernt; ihr Abgang wird
    /// als weitere Nachricht in derselben Schleife verteilt. Gibt `true`
    /// zurueck, wenn sich das Roster dabei geaendert hat.
    fn verteilen(&mut self, nachricht: Message, melder: &Melder) -> bool {
        let mut warteschlange = VecDeque::from([nachricht]);
        let mut roster_geaendert = false;

        while let Some(nachricht) = warteschlange.pop_front() {
            melder.melden(Notification::MessageAppended(nachricht.clone()));

            for username in self.bus.deliver(&nachricht, &self.room.roster) {
                if self.room.roster.remove(&username).is_none() {
                    continue;
                }
                tracing::warn!(username = %username, "Zustellung fehlgeschlagen, Gast wird entfernt");
                melder.melden(Notification::NonCriticalError(format!(
                    "Zustellung an {} fehlgeschlagen",
                    username
                )));
                warteschlange.push_back(self.bus.publish_system(format!("{} left", username)));
                roster_geaendert = true;
            }
        }

        roster_geaendert
    }

    /// Benachrichtigt alle Gaeste und gibt alle Verbindungen frei
    fn schliessen(&mut self) {
        for gast in self.room.roster.gaeste_entfernen() {
            if let Some(verbindung) = gast.verbindung() {
                verbindung.senden(Frame::RoomClosedNotice);
            }
        }
        self.wartend.clear();
        self.bus.schliessen();
        let _ = self.shutdown_tx.send(true);
        tracing::info!(adresse = %self.room.adresse, "Raum geschlossen");
    }
}

/// Prueft, ob ein Moderationskommando erlaubt ist
fn moderierbar<'a>(
    zustand: SessionState,
    lokal: &'a mut Lokal,
    operation: &'static str,
    username: &str,
) -> SessionResult<&'a mut HostSitzung> {
    if zustand != SessionState::Active {
        return Err(SessionError::zustand(operation, zustand));
    }
    match lokal {
        Lokal::Host(host) if host.room.host_username == username => {
            Err(SessionError::CannotModerateHost)
        }
        Lokal::Host(host) => Ok(host),
        _ => Err(SessionError::NotHost),
    }
}

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

/// Besitzer des Session-Zustands
pub struct SessionEngine {
    config: SessionConfig,
    zustand: SessionState,
    lokal: Lokal,
    events_tx: mpsc::Sender<EngineEvent>,
    melder: Melder,
    naechster_versuch: u64,
}

impl SessionEngine {
    /// Startet eine Engine in einem eigenen Task
    ///
    /// Gibt das Handle fuer Kommandos und den Notification-Kanal zurueck.
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn starten(config: SessionConfig) -> (SessionHandle, mpsc::UnboundedReceiver<Notification>) {
        let (kommando_tx, kommando_rx) = mpsc::channel(QUEUE_GROESSE);
        let (events_tx, events_rx) = mpsc::channel(QUEUE_GROESSE);
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();

        let engine = Self {
            config,
            zustand: SessionState::Idle,
            lokal: Lokal::Keine,
            events_tx,
            melder: Melder { tx: notification_tx },
            naechster_versuch: 0,
        };
        tokio::spawn(engine.laufen(kommando_rx, events_rx));

        (SessionHandle { kommando_tx }, notification_rx)
    }

    async fn laufen(
        mut self,
        mut kommando_rx: mpsc::Receiver<Kommando>,
        mut events_rx: mpsc::Receiver<EngineEvent>,
    ) {
        tracing::debug!("Session-Engine gestartet");

        loop {
            tokio::select! {
                kommando = kommando_rx.recv() => match kommando {
                    Some(kommando) => self.kommando(kommando),
                    None => break,
                },
                Some(event) = events_rx.recv() => self.ereignis(event),
            }
        }

        self.aufraeumen();
        tracing::debug!("Session-Engine beendet");
    }

    fn aufraeumen(&mut self) {
        match std::mem::replace(&mut self.lokal, Lokal::Keine) {
            Lokal::Host(mut host) => host.schliessen(),
            Lokal::Gast(gast) => {
                if let Some(verbindung) = gast.verbindung {
                    if self.zustand == SessionState::Active {
                        verbindung.senden(Frame::Leave);
                    }
                }
            }
            Lokal::Startend { .. } | Lokal::Keine => {}
        }
        self.zustand = SessionState::Terminated;
    }

    fn zustand_setzen(&mut self, neu: SessionState) {
        if self.zustand != neu {
            tracing::debug!(von = ?self.zustand, nach = ?neu, "Zustandswechsel");
            self.zustand = neu;
        }
    }

    /// Zurueck nach Idle (Beitritt gescheitert, Binden gescheitert)
    fn zuruecksetzen(&mut self) {
        self.lokal = Lokal::Keine;
        self.zustand_setzen(SessionState::Idle);
    }

    /// Beendet die Session endgueltig und meldet einen kritischen Fehler
    fn abbrechen(&mut self, grund: String) {
        if let Lokal::Host(host) = &mut self.lokal {
            host.schliessen();
        }
        self.lokal = Lokal::Keine;
        self.zustand_setzen(SessionState::Terminated);
        tracing::warn!(grund = %grund, "Session beendet");
        self.melder.melden(Notification::CriticalError(grund));
    }

    // -----------------------------------------------------------------------
    // Kommandos
    // -----------------------------------------------------------------------

    fn kommando(&mut self, kommando: Kommando) {
        match kommando {
            Kommando::StartRoom { username, antwort } => {
                if let Err(e) = self.start_room(username, antwort) {
                    tracing::debug!(fehler = %e, "start_room abgelehnt");
                }
            }
            Kommando::JoinRoom {
                adresse,
                port,
                secret_key,
                username,
                antwort,
            } => {
                let _ = antwort.send(self.join_room(adresse, port, secret_key, username));
            }
            Kommando::SendMessage { body, antwort } => {
                let _ = antwort.send(self.send_message(&body));
            }
            Kommando::Kick { username, antwort } => {
                let _ = antwort.send(self.kick_user(&username));
            }
            Kommando::Ban { username, antwort } => {
                let _ = antwort.send(self.ban_user(&username));
            }
            Kommando::Leave { antwort } => {
                let _ = antwort.send(self.leave_room());
            }
            Kommando::Close { antwort } => {
                let _ = antwort.send(self.close_room());
            }
            Kommando::Subscribe { antwort } => {
                let ergebnis = match (&mut self.lokal, self.zustand) {
                    (Lokal::Host(host), SessionState::Active) => Ok(host.bus.subscribe().boxed()),
                    (Lokal::Gast(gast), SessionState::Active) => Ok(gast.abonnenten.abonnieren().boxed()),
                    (_, zustand) => Err(SessionError::zustand("subscribe", zustand)),
                };
                let _ = antwort.send(ergebnis);
            }
            Kommando::Roster { antwort } => {
                let ergebnis = match (&self.lokal, self.zustand) {
                    (Lokal::Host(host), SessionState::Active) => Ok(host.room.roster.snapshot()),
                    (Lokal::Gast(_), SessionState::Active) => Err(SessionError::NotHost),
                    (_, zustand) => Err(SessionError::zustand("roster", zustand)),
                };
                let _ = antwort.send(ergebnis);
            }
            Kommando::Zustand { antwort } => {
                let _ = antwort.send(self.zustand);
            }
        }
    }

    /// Startet den Listener; die Antwort kommt mit `RaumBereit` oder
    /// `RaumFehlgeschlagen` zurueck
    fn start_room(&mut self, username: String, antwort: Antwort<RoomHandle>) -> SessionResult<()> {
        let pruefung = if self.zustand != SessionState::Idle {
            Err(SessionError::zustand("start_room", self.zustand))
        } else {
            auth_gate::username_pruefen(&username, self.config.max_username_laenge)
                .map_err(SessionError::from)
        };
        if let Err(e) = pruefung {
            let _ = antwort.send(Err(e.clone()));
            return Err(e);
        }

        let secret_key = auth_gate::secret_key_erzeugen();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.lokal = Lokal::Startend {
            username,
            secret_key,
            shutdown_tx,
        };
        self.zustand_setzen(SessionState::Hosting);

        let listener = RoomListener::neu(self.config.clone(), self.events_tx.clone());
        tokio::spawn(listener.starten(antwort, shutdown_rx));
        Ok(())
    }

    fn join_room(
        &mut self,
        adresse: String,
        port: u16,
        secret_key: String,
        username: String,
    ) -> SessionResult<()> {
        if self.zustand != SessionState::Idle {
            return Err(SessionError::zustand("join_room", self.zustand));
        }

        self.naechster_versuch += 1;
        let versuch = self.naechster_versuch;
        tracing::info!(adresse = %adresse, port, username = %username, "Beitrittsversuch");

        self.lokal = Lokal::Gast(GastSitzung {
            versuch,
            username,
            secret_key,
            verbindung: None,
            letzte_sequenz: 0,
            abonnenten: Abonnenten::default(),
        });
        self.zustand_setzen(SessionState::Joining);

        // Verbindungsaufbau
        let events_tx = self.events_tx.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let verbindung =
                tokio::time::timeout(config.join_timeout, TcpStream::connect((adresse.as_str(), port)))
                    .await;
            let stream = match verbindung {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    let fehler = TransportError::ConnectFailed(format!("{}:{}: {}", adresse, port, e));
                    let _ = events_tx
                        .send(EngineEvent::VerbindungFehlgeschlagen { versuch, fehler })
                        .await;
                    return;
                }
                // Die Beitrittsfrist meldet sich selbst
                Err(_) => return,
            };
            let peer_addr = match stream.peer_addr() {
                Ok(peer_addr) => peer_addr,
                Err(e) => {
                    let fehler = TransportError::ConnectFailed(e.to_string());
                    let _ = events_tx
                        .send(EngineEvent::VerbindungFehlgeschlagen { versuch, fehler })
                        .await;
                    return;
                }
            };

            let (handle, handler) = ConnectionHandler::neu(peer_addr, events_tx.clone(), &config);
            if events_tx
                .send(EngineEvent::Verbunden { versuch, handle })
                .await
                .is_ok()
            {
                handler.verarbeiten(stream).await;
            }
        });

        // Beitrittsfrist
        let events_tx = self.events_tx.clone();
        let frist = self.config.join_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(frist).await;
            let _ = events_tx.send(EngineEvent::JoinTimeout { versuch }).await;
        });

        Ok(())
    }

    fn send_message(&mut self, body: &str) -> SessionResult<()> {
        match (&mut self.lokal, self.zustand) {
            (Lokal::Host(host), SessionState::Active) => {
                let absender = host.room.host_username.clone();
                host.veroeffentlichen(&absender, body, &self.melder)
            }
            (Lokal::Gast(gast), SessionState::Active) => {
                MessageBus::pruefen(body, self.config.max_nachricht_laenge)?;
                let gesendet = gast
                    .verbindung
                    .as_ref()
                    .map(|v| {
                        v.senden(Frame::Post {
                            body: body.to_string(),
                        })
                    })
                    .unwrap_or(false);
                if gesendet {
                    Ok(())
                } else {
                    Err(TransportError::ConnectionLost(
                        "Nachricht konnte nicht an den Host uebergeben werden".to_string(),
                    )
                    .into())
                }
            }
            (_, zustand) => Err(SessionError::zustand("send_message", zustand)),
        }
    }

    fn kick_user(&mut self, username: &str) -> SessionResult<()> {
        let host = moderierbar(self.zustand, &mut self.lokal, "kick_user", username)?;

        let teilnehmer = host
            .room
            .roster
            .remove(username)
            .ok_or_else(|| SessionError::NotMember(username.to_string()))?;
        if let Some(verbindung) = teilnehmer.verbindung() {
            verbindung.senden(Frame::KickNotice);
        }
        drop(teilnehmer);

        tracing::info!(username = %username, "Gast hinausgeworfen");
        host.abgang_ansagen(username, &self.melder);
        Ok(())
    }

    fn ban_user(&mut self, username: &str) -> SessionResult<()> {
        let host = moderierbar(self.zustand, &mut self.lokal, "ban_user", username)?;

        match host.room.roster.ban(username) {
            Some(teilnehmer) => {
                if let Some(verbindung) = teilnehmer.verbindung() {
                    verbindung.senden(Frame::BanNotice);
                }
                drop(teilnehmer);
                host.abgang_ansagen(username, &self.melder);
            }
            None => {
                tracing::info!(username = %username, "Bann fuer abwesenden Namen vorgemerkt");
            }
        }
        Ok(())
    }

    fn leave_room(&mut self) -> SessionResult<()> {
        match (&self.lokal, self.zustand) {
            (Lokal::Gast(gast), SessionState::Active) => {
                if let Some(verbindung) = &gast.verbindung {
                    verbindung.senden(Frame::Leave);
                }
                tracing::info!(username = %gast.username, "Raum verlassen");
                // Verwerfen des Handles schliesst die Verbindung nach dem Leave-Frame
                self.lokal = Lokal::Keine;
                self.zustand_setzen(SessionState::Terminated);
                Ok(())
            }
            (_, zustand) => Err(SessionError::zustand("leave_room", zustand)),
        }
    }

    fn close_room(&mut self) -> SessionResult<()> {
        match (&mut self.lokal, self.zustand) {
            (Lokal::Host(host), SessionState::Active) => {
                host.schliessen();
                self.lokal = Lokal::Keine;
                self.zustand_setzen(SessionState::Terminated);
                Ok(())
            }
            (Lokal::Gast(_), SessionState::Active) => Err(SessionError::NotHost),
            (_, zustand) => Err(SessionError::zustand("close_room", zustand)),
        }
    }

    // -----------------------------------------------------------------------
    // Ereignisse
    // -----------------------------------------------------------------------

    fn ereignis(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::RaumBereit { adresse, antwort } => self.raum_bereit(adresse, antwort),
            EngineEvent::RaumFehlgeschlagen { fehler, antwort } => {
                if matches!(self.lokal, Lokal::Startend { .. }) {
                    self.zuruecksetzen();
                }
                let _ = antwort.send(Err(fehler.into()));
            }
            EngineEvent::ListenerFehler(fehler) => {
                if matches!(self.lokal, Lokal::Host(_)) {
                    self.abbrechen(fehler.to_string());
                }
            }
            EngineEvent::Angenommen(handle) => self.angenommen(handle),
            EngineEvent::AnmeldungAbgelaufen(id) => {
                if let Lokal::Host(host) = &mut self.lokal {
                    if host.wartend.remove(&id).is_some() {
                        tracing::debug!(verbindung = %id, "Keine Anmeldung innerhalb der Frist, Verbindung getrennt");
                    }
                }
            }
            EngineEvent::Verbunden { versuch, handle } => self.verbunden(versuch, handle),
            EngineEvent::VerbindungFehlgeschlagen { versuch, fehler } => {
                if self.ist_aktueller_versuch(versuch) {
                    tracing::warn!(fehler = %fehler, "Host nicht erreichbar");
                    self.zuruecksetzen();
                    self.melder.melden(Notification::NonCriticalError(fehler.to_string()));
                }
            }
            EngineEvent::JoinTimeout { versuch } => {
                if self.ist_aktueller_versuch(versuch) {
                    tracing::warn!("Keine Antwort des Hosts innerhalb der Frist");
                    self.zuruecksetzen();
                    self.melder
                        .melden(Notification::aus_auth_fehler(&AuthError::Timeout));
                }
            }
            EngineEvent::Verbindung { id, event } => match self.lokal {
                Lokal::Host(_) => self.host_ereignis(id, event),
                Lokal::Gast(_) => self.gast_ereignis(id, event),
                _ => tracing::trace!(verbindung = %id, "Ereignis ohne Sitzung verworfen"),
            },
        }
    }

    fn raum_bereit(&mut self, adresse: SocketAddr, antwort: Antwort<RoomHandle>) {
        let (username, secret_key, shutdown_tx) = match std::mem::replace(&mut self.lokal, Lokal::Keine) {
            Lokal::Startend {
                username,
                secret_key,
                shutdown_tx,
            } => (username, secret_key, shutdown_tx),
            anderes => {
                self.lokal = anderes;
                let _ = antwort.send(Err(SessionError::zustand("start_room", self.zustand)));
                return;
            }
        };

        let mut roster = Roster::neu();
        if let Err(e) = roster.add(Participant::host(username.clone())) {
            self.zuruecksetzen();
            let _ = antwort.send(Err(e));
            return;
        }

        let handle = RoomHandle {
            address: adresse,
            secret_key: secret_key.clone(),
            host_username: username.clone(),
        };
        let snapshot = roster.snapshot();
        self.lokal = Lokal::Host(HostSitzung {
            room: Room {
                adresse,
                host_username: username,
                gate: AuthGate::neu(secret_key, self.config.max_username_laenge),
                roster,
            },
            bus: MessageBus::neu(self.config.max_nachricht_laenge),
            wartend: HashMap::new(),
            shutdown_tx,
        });
        self.zustand_setzen(SessionState::Active);

        tracing::info!(adresse = %adresse, host = %handle.host_username, "Raum eroeffnet");
        let _ = antwort.send(Ok(handle));
        self.melder.melden(Notification::SwitchedToActiveView);
        self.melder.melden(Notification::RosterChanged(snapshot));
    }

    fn angenommen(&mut self, handle: PeerHandle) {
        let Lokal::Host(host) = &mut self.lokal else {
            return;
        };
        let id = handle.connection_id();
        tracing::debug!(peer = %handle.peer_addr(), verbindung = %id, "Verbindung wartet auf Anmeldung");
        host.wartend.insert(id, handle);

        let events_tx = self.events_tx.clone();
        let frist = self.config.join_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(frist).await;
            let _ = events_tx.send(EngineEvent::AnmeldungAbgelaufen(id)).await;
        });
    }

    fn verbunden(&mut self, versuch: u64, handle: PeerHandle) {
        if !self.ist_aktueller_versuch(versuch) {
            tracing::debug!(versuch, "Verbindung eines veralteten Beitrittsversuchs verworfen");
            return;
        }
        if let Lokal::Gast(gast) = &mut self.lokal {
            tracing::debug!(peer = %handle.peer_addr(), "Mit Host verbunden, sende Anmeldung");
            handle.senden(Frame::JoinRequest {
                secret_key: gast.secret_key.clone(),
                username: gast.username.clone(),
            });
            gast.verbindung = Some(handle);
        }
    }

    fn ist_aktueller_versuch(&self, versuch: u64) -> bool {
        self.zustand == SessionState::Joining
            && matches!(&self.lokal, Lokal::Gast(gast) if gast.versuch == versuch)
    }

    // -----------------------------------------------------------------------
    // Ereignisse beim Host
    // -----------------------------------------------------------------------

    fn host_ereignis(&mut self, id: ConnectionId, event: ConnectionEvent) {
        let Lokal::Host(host) = &mut self.lokal else {
            return;
        };

        match event {
            ConnectionEvent::JoinRequest {
                secret_key,
                username,
            } => {
                let Some(handle) = host.wartend.remove(&id) else {
                    tracing::warn!(verbindung = %id, "JoinRequest einer nicht wartenden Verbindung ignoriert");
                    return;
                };
                match host.room.gate.authenticate(&secret_key, &username, &host.room.roster) {
                    Ok(zulassung) => {
                        handle.senden(Frame::auth_ok());
                        match host.room.roster.add(Participant::gast(zulassung, handle)) {
                            Ok(()) => {
                                tracing::info!(username = %username, "Gast beigetreten");
                                self.melder
                                    .melden(Notification::RosterChanged(host.room.roster.snapshot()));
                            }
                            Err(e) => {
                                tracing::error!(username = %username, fehler = %e, "Aufnahme ins Roster fehlgeschlagen");
                            }
                        }
                    }
                    Err(fehler) => {
                        tracing::info!(username = %username, grund = %fehler, "Beitritt abgelehnt");
                        if let Some(grund) = JoinRejection::aus_auth_fehler(&fehler) {
                            handle.senden(Frame::auth_abgelehnt(grund));
                        }
                        // Handle faellt hier weg: Verbindung schliesst nach dem AuthResult
                    }
                }
            }

            ConnectionEvent::MessageReceived { body } => {
                let Some(username) = host.room.roster.username_fuer(id) else {
                    tracing::warn!(verbindung = %id, "Nachricht vor der Anmeldung verworfen");
                    return;
                };
                if let Err(e) = host.veroeffentlichen(&username, &body, &self.melder) {
                    tracing::warn!(username = %username, fehler = %e, "Nachricht eines Gastes abgelehnt");
                    self.melder.melden(Notification::NonCriticalError(format!(
                        "Nachricht von {} abgelehnt: {}",
                        username, e
                    )));
                }
            }

            ConnectionEvent::LeaveNotice => {
                if host.wartend.remove(&id).is_some() {
                    return;
                }
                if let Some(username) = host.room.roster.username_fuer(id) {
                    host.room.roster.remove(&username);
                    tracing::info!(username = %username, "Gast hat den Raum verlassen");
                    host.abgang_ansagen(&username, &self.melder);
                }
            }

            ConnectionEvent::Disconnected(fehler) => {
                if host.wartend.remove(&id).is_some() {
                    tracing::debug!(verbindung = %id, "Wartende Verbindung getrennt");
                    return;
                }
                if let Some(username) = host.room.roster.username_fuer(id) {
                    host.room.roster.remove(&username);
                    tracing::warn!(username = %username, fehler = %fehler, "Verbindung zu Gast verloren");
                    self.melder.melden(Notification::NonCriticalError(format!(
                        "Verbindung zu {} verloren: {}",
                        username, fehler
                    )));
                    host.abgang_ansagen(&username, &self.melder);
                }
            }

            ConnectionEvent::MalformedFrame(fehler) => {
                self.melder.melden(Notification::NonCriticalError(format!(
                    "{} (Verbindung {})",
                    fehler, id
                )));
            }

            anderes => {
                tracing::warn!(verbindung = %id, ereignis = ?anderes, "Unerwartetes Frame beim Host ignoriert");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ereignisse beim Gast
    // -----------------------------------------------------------------------

    fn gast_ereignis(&mut self, id: ConnectionId, event: ConnectionEvent) {
        let Lokal::Gast(gast) = &mut self.lokal else {
            return;
        };
        if gast.verbindung.as_ref().map(PeerHandle::connection_id) != Some(id) {
            tracing::trace!(verbindung = %id, "Ereignis einer alten Verbindung verworfen");
            return;
        }

        match (self.zustand, event) {
            (SessionState::Joining, ConnectionEvent::AuthResult { ok: true, .. }) => {
                tracing::info!(username = %gast.username, "Beitritt angenommen");
                self.zustand_setzen(SessionState::Active);
                self.melder.melden(Notification::SwitchedToActiveView);
            }

            (SessionState::Joining, ConnectionEvent::AuthResult { ok: false, reason }) => {
                let fehler = reason.map(AuthError::from).unwrap_or_else(|| {
                    AuthError::InvalidUsername("Beitritt ohne Angabe von Gruenden abgelehnt".to_string())
                });
                tracing::info!(fehler = %fehler, "Beitritt abgelehnt");
                self.zuruecksetzen();
                self.melder.melden(Notification::aus_auth_fehler(&fehler));
            }

            (SessionState::Active, ConnectionEvent::Delivered(nachricht)) => {
                if nachricht.sequence <= gast.letzte_sequenz {
                    tracing::debug!(
                        sequenz = nachricht.sequence,
                        letzte = gast.letzte_sequenz,
                        "Veraltete Sequenznummer verworfen"
                    );
                    return;
                }
                gast.letzte_sequenz = nachricht.sequence;
                gast.abonnenten.weiterreichen(&nachricht);
                self.melder.melden(Notification::MessageAppended(nachricht));
            }

            (_, ConnectionEvent::Kicked) => self.abbrechen(ModerationError::Kicked.to_string()),
            (_, ConnectionEvent::Banned) => self.abbrechen(ModerationError::Banned.to_string()),
            (_, ConnectionEvent::RoomClosed) => self.abbrechen(ModerationError::RoomClosed.to_string()),

            (SessionState::Joining, ConnectionEvent::Disconnected(fehler)) => {
                tracing::warn!(fehler = %fehler, "Verbindung waehrend des Beitritts verloren");
                self.zuruecksetzen();
                self.melder.melden(Notification::NonCriticalError(fehler.to_string()));
            }

            (_, ConnectionEvent::Disconnected(fehler)) => self.abbrechen(fehler.to_string()),

            (_, ConnectionEvent::MalformedFrame(fehler)) => {
                self.melder.melden(Notification::NonCriticalError(fehler.to_string()));
            }

            (zustand, anderes) => {
                tracing::warn!(zustand = ?zustand, ereignis = ?anderes, "Unerwartetes Frame beim Gast ignoriert");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
