//! Raum-Protokoll (TCP)
//!
//! Definiert alle Frames, die zwischen Gast und Host ausgetauscht werden.
//!
//! ## Design
//! - JSON-Serialisierung via serde (Chat ist nicht zeitkritisch)
//! - Tagged Enum fuer typsichere Frame-Arten
//! - Nur der Host vergibt Sequenznummern; Gaeste senden `Post` ohne Nummer

use backroom_core::{AuthError, Message, SequenceNumber};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ablehnungsgruende
// ---------------------------------------------------------------------------

/// Grund fuer ein negatives `AuthResult` auf dem Draht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinRejection {
    InvalidSecretKey,
    UsernameTaken,
    UsernameBanned,
    InvalidUsername { reason: String },
}

impl From<JoinRejection> for AuthError {
    fn from(grund: JoinRejection) -> Self {
        match grund {
            JoinRejection::InvalidSecretKey => AuthError::InvalidSecretKey,
            JoinRejection::UsernameTaken => AuthError::UsernameTaken,
            JoinRejection::UsernameBanned => AuthError::UsernameBanned,
            JoinRejection::InvalidUsername { reason } => AuthError::InvalidUsername(reason),
        }
    }
}

impl JoinRejection {
    /// Uebersetzt einen lokalen Auth-Fehler in den Draht-Grund
    ///
    /// `Timeout` entsteht nur beim Gast und hat keine Draht-Entsprechung.
    pub fn aus_auth_fehler(fehler: &AuthError) -> Option<Self> {
        match fehler {
            AuthError::InvalidSecretKey => Some(Self::InvalidSecretKey),
            AuthError::UsernameTaken => Some(Self::UsernameTaken),
            AuthError::UsernameBanned => Some(Self::UsernameBanned),
            AuthError::InvalidUsername(reason) => Some(Self::InvalidUsername {
                reason: reason.clone(),
            }),
            AuthError::Timeout => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Haupt-Enum: Frame
// ---------------------------------------------------------------------------

/// Alle moeglichen Frames einer Raum-Verbindung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    // Gast -> Host
    JoinRequest { secret_key: String, username: String },
    Post { body: String },
    Leave,

    // Host -> Gast
    AuthResult {
        ok: bool,
        reason: Option<JoinRejection>,
    },
    Chat {
        sender: String,
        body: String,
        sequence: SequenceNumber,
    },
    System {
        body: String,
        sequence: SequenceNumber,
    },
    KickNotice,
    BanNotice,
    RoomClosedNotice,
}

impl Frame {
    /// Erstellt ein positives `AuthResult`
    pub fn auth_ok() -> Self {
        Self::AuthResult {
            ok: true,
            reason: None,
        }
    }

    /// Erstellt ein negatives `AuthResult`
    pub fn auth_abgelehnt(grund: JoinRejection) -> Self {
        Self::AuthResult {
            ok: false,
            reason: Some(grund),
        }
    }

    /// Verpackt eine nummerierte Nachricht fuer den Versand an Gaeste
    pub fn aus_nachricht(nachricht: &Message) -> Self {
        if nachricht.ist_system() {
            Self::System {
                body: nachricht.body.clone(),
                sequence: nachricht.sequence,
            }
        } else {
            Self::Chat {
                sender: nachricht.sender.clone(),
                body: nachricht.body.clone(),
                sequence: nachricht.sequence,
            }
        }
    }

    /// Kurzname der Frame-Art fuer Logs
    pub fn art(&self) -> &'static str {
        match self {
            Self::JoinRequest { .. } => "join_request",
            Self::Post { .. } => "post",
            Self::Leave => "leave",
            Self::AuthResult { .. } => "auth_result",
            Self::Chat { .. } => "chat",
            Self::System { .. } => "system",
            Self::KickNotice => "kick_notice",
            Self::BanNotice => "ban_notice",
            Self::RoomClosedNotice => "room_closed_notice",
        }
    }

    /// Serialisiert das Frame als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert ein Frame aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
