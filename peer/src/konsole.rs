//! Konsole – Eingabezeilen parsen, Notifications darstellen
//!
//! ## Befehle
//! ```text
//! /host <name>                          Raum eroeffnen
//! /join <adresse> <port> <key> <name>   Raum beitreten
//! /kick <name>  /ban <name>             Moderation (nur Host)
//! /roster                               Teilnehmer anzeigen (nur Host)
//! /leave  /close  /quit  /hilfe
//! alles andere                          Nachricht senden
//! ```

use backroom_core::Notification;
use thiserror::Error;

/// Hilfetext fuer `/hilfe`
pub const HILFE: &str = "\
/host <name>                          Raum eroeffnen
/join <adresse> <port> <key> <name>   Raum beitreten
/kick <name>                          Gast hinauswerfen (Host)
/ban <name>                           Gast bannen (Host)
/roster                               Teilnehmer anzeigen (Host)
/leave                                Raum verlassen (Gast)
/close                                Raum schliessen (Host)
/quit                                 Beenden";

/// Fehler beim Parsen einer Eingabezeile
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EingabeFehler {
    #[error("Unbekannter Befehl: /{0} (siehe /hilfe)")]
    UnbekannterBefehl(String),

    #[error("Aufruf: {0}")]
    FalscheArgumente(&'static str),

    #[error("Ungueltiger Port: {0}")]
    UngueltigerPort(String),
}

/// Eine geparste Eingabezeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingabe {
    Host {
        username: String,
    },
    Join {
        adresse: String,
        port: u16,
        secret_key: String,
        username: String,
    },
    Kick(String),
    Ban(String),
    Roster,
    Leave,
    Close,
    Quit,
    Hilfe,
    Nachricht(String),
    Leer,
}

impl Eingabe {
    /// Parst eine Eingabezeile
    pub fn parsen(zeile: &str) -> Result<Self, EingabeFehler> {
        let zeile = zeile.trim_end_matches(['\r', '\n']);
        let Some(befehl) = zeile.strip_prefix('/') else {
            return Ok(if zeile.trim().is_empty() {
                Self::Leer
            } else {
                Self::Nachricht(zeile.to_string())
            });
        };

        let teile: Vec<&str> = befehl.split_whitespace().collect();
        let (name, argumente) = match teile.split_first() {
            Some((name, argumente)) => (*name, argumente),
            None => return Err(EingabeFehler::UnbekannterBefehl(String::new())),
        };

        match (name, argumente) {
            ("host", [username]) => Ok(Self::Host {
                username: username.to_string(),
            }),
            ("host", _) => Err(EingabeFehler::FalscheArgumente("/host <name>")),

            ("join", [adresse, port, secret_key, username]) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| EingabeFehler::UngueltigerPort(port.to_string()))?;
                Ok(Self::Join {
                    adresse: adresse.to_string(),
                    port,
                    secret_key: secret_key.to_string(),
                    username: username.to_string(),
                })
            }
            ("join", _) => Err(EingabeFehler::FalscheArgumente(
                "/join <adresse> <port> <key> <name>",
            )),

            ("kick", [username]) => Ok(Self::Kick(username.to_string())),
            ("kick", _) => Err(EingabeFehler::FalscheArgumente("/kick <name>")),
            ("ban", [username]) => Ok(Self::Ban(username.to_string())),
            ("ban", _) => Err(EingabeFehler::FalscheArgumente("/ban <name>")),

            ("roster", []) => Ok(Self::Roster),
            ("leave", []) => Ok(Self::Leave),
            ("close", []) => Ok(Self::Close),
            ("quit", []) => Ok(Self::Quit),
            ("hilfe" | "help", []) => Ok(Self::Hilfe),

            (anderer, _) => Err(EingabeFehler::UnbekannterBefehl(anderer.to_string())),
        }
    }
}

/// Formatiert eine Notification als Konsolenzeile
pub fn formatieren(notification: &Notification) -> String {
    match notification {
        Notification::MessageAppended(nachricht) if nachricht.ist_system() => {
            format!("[{}] * {}", nachricht.sequence, nachricht.body)
        }
        Notification::MessageAppended(nachricht) => {
            format!("[{}] <{}> {}", nachricht.sequence, nachricht.sender, nachricht.body)
        }
        Notification::CriticalError(grund) => format!("!! Sitzung beendet: {}", grund),
        Notification::NonCriticalError(grund) => format!("!  {}", grund),
        Notification::UsernameRejected(grund) => format!("!  Benutzername: {}", grund),
        Notification::SecretKeyRejected(grund) => format!("!  Secret Key: {}", grund),
        Notification::SwitchedToActiveView => "-- Im Raum. /hilfe fuer Befehle".to_string(),
        Notification::RosterChanged(namen) => format!("-- Im Raum: {}", namen.join(", ")),
    }
}
