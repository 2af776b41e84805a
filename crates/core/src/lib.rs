//! backroom-core – Gemeinsame Typen, Fehler und Benachrichtigungen
//!
//! Dieses Crate stellt die Bausteine bereit, die Protokoll, Session-Engine
//! und Praesentationsschicht gemeinsam nutzen.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{AuthError, ModerationError, ProtocolError, TransportError};
pub use event::Notification;
pub use types::{ConnectionId, Message, MessageKind, Role, SequenceNumber};
