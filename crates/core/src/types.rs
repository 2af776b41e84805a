//! Gemeinsame Typen fuer Backroom
//!
//! IDs verwenden das Newtype-Pattern, damit Verbindungs-IDs nicht mit
//! anderen Zahlen oder Strings verwechselt werden koennen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fortlaufende Nummer einer Nachricht innerhalb eines Raums (vom Host vergeben)
pub type SequenceNumber = u64;

/// Eindeutige ID einer Netzwerkverbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Rolle eines Teilnehmers im Raum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Hat den Raum erstellt und darf moderieren (genau einer pro Raum)
    Host,
    /// Jeder andere Teilnehmer
    Guest,
}

/// Art einer Raum-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Von einem Teilnehmer geschrieben
    Chat,
    /// Vom Host erzeugte Ansage (z.B. "alice left")
    System,
}

/// Eine angenommene und nummerierte Nachricht
///
/// Die Sequenznummer vergibt ausschliesslich der Host. Sie definiert die
/// Reihenfolge, in der jeder Teilnehmer die Nachrichten sieht.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub body: String,
    pub sequence: SequenceNumber,
    pub kind: MessageKind,
}

impl Message {
    /// Erstellt eine Chat-Nachricht
    pub fn chat(sender: impl Into<String>, body: impl Into<String>, sequence: SequenceNumber) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            sequence,
            kind: MessageKind::Chat,
        }
    }

    /// Erstellt eine System-Nachricht
    pub fn system(sender: impl Into<String>, body: impl Into<String>, sequence: SequenceNumber) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            sequence,
            kind: MessageKind::System,
        }
    }

    pub fn ist_system(&self) -> bool {
        self.kind == MessageKind::System
    }
}
