//! backroom-peer – Bibliotheks-Root
//!
//! Verbindet die Session-Engine mit der Konsole: Zeilen von stdin werden zu
//! Kommandos, Notifications werden auf stdout ausgegeben.

pub mod config;
pub mod konsole;

use anyhow::Result;
use backroom_core::Notification;
use backroom_session::{SessionEngine, SessionError, SessionHandle, SessionState};
use config::PeerConfig;
use konsole::Eingabe;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Was die Hauptschleife als naechstes tun soll
enum Schritt {
    Zeile(Option<String>),
    Notification(Notification),
    Beenden,
}

/// Haelt den laufenden Peer zusammen
pub struct Peer {
    pub config: PeerConfig,
}

impl Peer {
    /// Erstellt einen neuen Peer aus der gegebenen Konfiguration
    pub fn neu(config: PeerConfig) -> Self {
        Self { config }
    }

    /// Liest Befehle bis `/quit`, Ctrl-C oder Ende der Eingabe
    ///
    /// Nach einer beendeten Session startet der naechste `/host` oder
    /// `/join` eine neue Engine.
    pub async fn starten(self) -> Result<()> {
        let session_config = self.config.session_config()?;
        let (mut session, mut notifications) = SessionEngine::starten(session_config.clone());
        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();

        println!("Backroom {} – /hilfe fuer Befehle", env!("CARGO_PKG_VERSION"));

        loop {
            let schritt = tokio::select! {
                zeile = zeilen.next_line() => Schritt::Zeile(zeile?),
                Some(notification) = notifications.recv() => Schritt::Notification(notification),
                _ = tokio::signal::ctrl_c() => Schritt::Beenden,
            };

            match schritt {
                Schritt::Notification(notification) => {
                    println!("{}", konsole::formatieren(&notification));
                }
                Schritt::Zeile(None) | Schritt::Beenden => break,
                Schritt::Zeile(Some(zeile)) => {
                    let eingabe = match Eingabe::parsen(&zeile) {
                        Ok(eingabe) => eingabe,
                        Err(e) => {
                            println!("!  {}", e);
                            continue;
                        }
                    };
                    if eingabe == Eingabe::Quit {
                        break;
                    }

                    // Neue Session nach einer beendeten
                    if matches!(eingabe, Eingabe::Host { .. } | Eingabe::Join { .. })
                        && session.state().await? == SessionState::Terminated
                    {
                        (session, notifications) = SessionEngine::starten(session_config.clone());
                    }

                    if let Err(e) = self.ausfuehren(&session, eingabe).await {
                        println!("!  {}", e);
                    }
                }
            }
        }

        // Verbleibende Meldungen ausgeben, dann Engine beenden
        while let Ok(notification) = notifications.try_recv() {
            println!("{}", konsole::formatieren(&notification));
        }
        drop(session);
        tracing::info!("Backroom Peer beendet");
        Ok(())
    }

    /// Fuehrt eine Eingabe gegen die Session aus
    async fn ausfuehren(&self, session: &SessionHandle, eingabe: Eingabe) -> Result<(), SessionError> {
        match eingabe {
            Eingabe::Host { username } => {
                let raum = session.start_room(username).await?;
                println!(
                    "-- Raum eroeffnet auf Port {} | Secret Key: {}",
                    raum.port(),
                    raum.secret_key
                );
            }
            Eingabe::Join {
                adresse,
                port,
                secret_key,
                username,
            } => {
                session.join_room(adresse, port, secret_key, username).await?;
                println!("-- Verbinde ...");
            }
            Eingabe::Kick(username) => session.kick_user(username).await?,
            Eingabe::Ban(username) => session.ban_user(username).await?,
            Eingabe::Roster => {
                println!("-- Im Raum: {}", session.roster().await?.join(", "));
            }
            Eingabe::Leave => {
                session.leave_room().await?;
                println!("-- Raum verlassen");
            }
            Eingabe::Close => {
                session.close_room().await?;
                println!("-- Raum geschlossen");
            }
            Eingabe::Hilfe => println!("{}", konsole::HILFE),
            Eingabe::Nachricht(body) => session.send_message(body).await?,
            Eingabe::Quit | Eingabe::Leer => {}
        }
        Ok(())
    }
}

