//! backroom-session – Raum hosten, beitreten, Nachrichten ordnen
//!
//! Dieser Crate implementiert die Session-Engine eines Backroom-Peers. Ein
//! Peer ist entweder Host eines Raums oder Gast in einem fremden Raum.
//!
//! ## Architektur
//!
//! ```text
//! Oberflaeche
//!     |  SessionHandle (Kommandos)          ^ Notifications (ein Kanal)
//!     v                                     |
//! SessionEngine (ein Task, besitzt den gesamten Zustand)
//!     |
//!     +-- AuthGate     (Secret Key, Namensformat, belegt, gebannt)
//!     +-- Roster       (Teilnehmer, Banns)
//!     +-- MessageBus   (Sequenznummern, Verteilung)
//!     ^
//!     |  EngineEvent (eine Queue)
//!     |
//! RoomListener (Host)          ConnectionHandler (pro Verbindung ein Task)
//! ```

pub mod auth_gate;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod message_bus;
pub mod roster;
pub mod tcp;

// Bequeme Re-Exporte
pub use auth_gate::{Admission, AuthGate};
pub use config::SessionConfig;
pub use connection::{ConnectionEvent, ConnectionHandler, PeerHandle};
pub use engine::{RoomHandle, SessionEngine, SessionHandle, SessionState};
pub use error::{SessionError, SessionResult};
pub use message_bus::{Abonnenten, MessageBus};
pub use roster::{Participant, Roster};
pub use tcp::RoomListener;
