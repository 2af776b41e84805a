//! Fehlertypen fuer die Session-Engine

use backroom_core::{AuthError, TransportError};
use thiserror::Error;

use crate::engine::SessionState;

/// Fehlertyp fuer die Session-Engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Kommando im aktuellen Zustand nicht erlaubt (Programmierfehler der Oberflaeche)
    #[error("'{operation}' ist im Zustand {zustand:?} nicht erlaubt")]
    InvalidState {
        operation: &'static str,
        zustand: SessionState,
    },

    /// Moderationskommando von einem Gast
    #[error("Nur der Host darf moderieren")]
    NotHost,

    /// Ziel eines Kicks ist nicht im Raum
    #[error("Kein Teilnehmer: {0}")]
    NotMember(String),

    /// Host versucht sich selbst zu moderieren
    #[error("Der Host kann sich nicht selbst moderieren")]
    CannotModerateHost,

    /// Teilnehmer ist bereits im Roster
    #[error("Bereits Teilnehmer: {0}")]
    AlreadyMember(String),

    /// Nachricht ist nach dem Trimmen leer
    #[error("Leere Nachricht")]
    EmptyMessage,

    /// Nachricht ueberschreitet die Maximallaenge
    #[error("Nachricht zu lang (Maximum: {max} Zeichen)")]
    MessageTooLong { max: usize },

    /// Beitritt abgelehnt
    #[error("Beitritt abgelehnt: {0}")]
    Auth(#[from] AuthError),

    /// Netzwerkfehler
    #[error("Transportfehler: {0}")]
    Transport(#[from] TransportError),

    /// Der Engine-Task laeuft nicht mehr
    #[error("Session-Engine beendet")]
    EngineStopped,
}

impl SessionError {
    /// Erstellt einen Zustandsfehler
    pub fn zustand(operation: &'static str, zustand: SessionState) -> Self {
        Self::InvalidState { operation, zustand }
    }
}

/// Result-Typ fuer die Session-Engine
pub type SessionResult<T> = Result<T, SessionError>;
