//! Fehler-Taxonomie fuer Backroom
//!
//! Vier Familien mit unterschiedlicher Wirkung auf die lokale Session:
//! - `AuthError`: Beitritt abgelehnt, Session bleibt `Idle`
//! - `ModerationError`: vom Host beendet, kritisch
//! - `TransportError`: Verbindung betroffen, Schwere haengt von der Verbindung ab
//! - `ProtocolError`: einzelnes Frame verworfen, nicht kritisch

use thiserror::Error;

/// Gruende, aus denen ein Beitritt scheitert
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Secret Key ist falsch")]
    InvalidSecretKey,

    #[error("Benutzername ist bereits vergeben")]
    UsernameTaken,

    #[error("Benutzername ist in diesem Raum gebannt")]
    UsernameBanned,

    #[error("Ungueltiger Benutzername: {0}")]
    InvalidUsername(String),

    #[error("Keine Antwort vom Host innerhalb des Zeitlimits")]
    Timeout,
}

impl AuthError {
    /// Gibt true zurueck wenn der Fehler das Secret-Key-Feld betrifft
    ///
    /// Alle anderen Beitrittsfehler werden dem Benutzernamen zugeordnet,
    /// ausser `Timeout`, der keinem Feld gehoert.
    pub fn betrifft_secret_key(&self) -> bool {
        matches!(self, Self::InvalidSecretKey)
    }

    /// Gibt true zurueck wenn der Fehler das Benutzernamen-Feld betrifft
    pub fn betrifft_username(&self) -> bool {
        matches!(
            self,
            Self::UsernameTaken | Self::UsernameBanned | Self::InvalidUsername(_)
        )
    }
}

/// Moderationsereignisse, die eine Gast-Session beenden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModerationError {
    #[error("Du wurdest aus dem Raum geworfen")]
    Kicked,

    #[error("Du wurdest aus dem Raum gebannt")]
    Banned,

    #[error("Der Host hat den Raum geschlossen")]
    RoomClosed,
}

/// Netzwerkfehler einer Verbindung
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Verbindung fehlgeschlagen: {0}")]
    ConnectFailed(String),

    #[error("Verbindung verloren: {0}")]
    ConnectionLost(String),
}

/// Fehler im Wire-Protokoll
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Ungueltiges Frame: {0}")]
    MalformedFrame(String),
}
