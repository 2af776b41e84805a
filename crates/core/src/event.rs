//! Benachrichtigungen an die Praesentationsschicht
//!
//! Die Session-Engine meldet alles, was eine Oberflaeche anzeigen muss,
//! ueber genau einen Kanal und in Erzeugungsreihenfolge.

use crate::error::AuthError;
use crate::types::Message;

/// Alle Ereignisse, die eine Oberflaeche von der Session-Engine erhaelt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Neue Nachricht im Raum, bereits in Sequenz-Reihenfolge
    MessageAppended(Message),
    /// Fehler, der die lokale Session beendet
    CriticalError(String),
    /// Fehler, der nur protokolliert wird, Session laeuft weiter
    NonCriticalError(String),
    /// Beitritt abgelehnt, Ursache liegt beim Benutzernamen
    UsernameRejected(String),
    /// Beitritt abgelehnt, Ursache liegt beim Secret Key
    SecretKeyRejected(String),
    /// Beitritt erfolgreich, Oberflaeche soll zur Raumansicht wechseln
    SwitchedToActiveView,
    /// Aktuelle Teilnehmerliste in Beitrittsreihenfolge (nur beim Host)
    RosterChanged(Vec<String>),
}

impl Notification {
    /// Ordnet einen Beitrittsfehler dem passenden Eingabefeld zu
    pub fn aus_auth_fehler(fehler: &AuthError) -> Self {
        if fehler.betrifft_secret_key() {
            Self::SecretKeyRejected(fehler.to_string())
        } else if fehler.betrifft_username() {
            Self::UsernameRejected(fehler.to_string())
        } else {
            Self::NonCriticalError(fehler.to_string())
        }
    }

    /// Gibt true zurueck wenn die Benachrichtigung die Session beendet
    pub fn ist_kritisch(&self) -> bool {
        matches!(self, Self::CriticalError(_))
    }
}
