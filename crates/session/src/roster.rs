//! Roster – Wer ist im Raum, wer ist gebannt
//!
//! Haelt den ephemeren Zustand aller Teilnehmer eines Raums. Wird nur von
//! der Session-Engine veraendert; Verbindungs-Tasks sehen ihn nie direkt.
//!
//! ## Invarianten
//! - Benutzernamen sind eindeutig (exakter, gross-/kleinschreibungssensitiver Vergleich)
//! - Ein gebannter Name kommt nie wieder in die Teilnehmerliste
//! - Genau ein Teilnehmer hat die Rolle `Host`

use backroom_core::{AuthError, ConnectionId, Role};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::auth_gate::Admission;
use crate::connection::PeerHandle;
use crate::error::{SessionError, SessionResult};

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// Ein authentifizierter Teilnehmer
#[derive(Debug)]
pub struct Participant {
    pub username: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
    /// Verbindung zum Gast; der lokale Host hat keine
    verbindung: Option<PeerHandle>,
    /// Beitrittsreihenfolge, vom Roster vergeben
    beitritts_index: u64,
}

impl Participant {
    /// Erstellt den Host-Teilnehmer (lokal, ohne Verbindung)
    pub fn host(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Host,
            joined_at: Utc::now(),
            verbindung: None,
            beitritts_index: 0,
        }
    }

    /// Erstellt einen Gast aus einer erfolgreichen Authentifizierung
    pub fn gast(zulassung: Admission, verbindung: PeerHandle) -> Self {
        Self {
            username: zulassung.into_username(),
            role: Role::Guest,
            joined_at: Utc::now(),
            verbindung: Some(verbindung),
            beitritts_index: 0,
        }
    }

    /// Verbindung des Teilnehmers (None beim Host)
    pub fn verbindung(&self) -> Option<&PeerHandle> {
        self.verbindung.as_ref()
    }

    pub fn ist_host(&self) -> bool {
        self.role == Role::Host
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Teilnehmer- und Bann-Liste eines Raums
#[derive(Debug, Default)]
pub struct Roster {
    teilnehmer: HashMap<String, Participant>,
    gebannt: HashSet<String>,
    naechster_index: u64,
}

impl Roster {
    /// Erstellt ein leeres Roster
    pub fn neu() -> Self {
        Self::default()
    }

    /// Nimmt einen Teilnehmer auf
    ///
    /// Schlaegt fehl, wenn der Name schon im Raum oder gebannt ist. Bei
    /// korrekter Pruefung durch das AuthGate tritt beides nie auf.
    pub fn add(&mut self, mut teilnehmer: Participant) -> SessionResult<()> {
        if self.teilnehmer.contains_key(&teilnehmer.username) {
            return Err(SessionError::AlreadyMember(teilnehmer.username));
        }
        if self.gebannt.contains(&teilnehmer.username) {
            return Err(SessionError::Auth(AuthError::UsernameBanned));
        }

        teilnehmer.beitritts_index = self.naechster_index;
        self.naechster_index += 1;

        tracing::debug!(
            username = %teilnehmer.username,
            role = ?teilnehmer.role,
            "Teilnehmer aufgenommen"
        );
        self.teilnehmer
            .insert(teilnehmer.username.clone(), teilnehmer);
        Ok(())
    }

    /// Entfernt einen Teilnehmer (idempotent)
    ///
    /// Gibt den Teilnehmer zurueck, falls er im Raum war. Das Fallenlassen
    /// des Rueckgabewerts schliesst seine Verbindung.
    pub fn remove(&mut self, username: &str) -> Option<Participant> {
        let entfernt = self.teilnehmer.remove(username);
        if entfernt.is_some() {
            tracing::debug!(username = %username, "Teilnehmer entfernt");
        }
        entfernt
    }

    /// Bannt einen Namen dauerhaft und entfernt ihn, falls er im Raum ist
    pub fn ban(&mut self, username: &str) -> Option<Participant> {
        self.gebannt.insert(username.to_string());
        tracing::info!(username = %username, "Benutzername gebannt");
        self.remove(username)
    }

    pub fn is_member(&self, username: &str) -> bool {
        self.teilnehmer.contains_key(username)
    }

    pub fn is_banned(&self, username: &str) -> bool {
        self.gebannt.contains(username)
    }

    /// Gibt einen Teilnehmer zurueck
    pub fn get(&self, username: &str) -> Option<&Participant> {
        self.teilnehmer.get(username)
    }

    /// Sucht den Teilnehmer, dem eine Verbindung gehoert
    pub fn username_fuer(&self, connection_id: ConnectionId) -> Option<String> {
        self.teilnehmer
            .values()
            .find(|t| t.verbindung().map(|v| v.connection_id()) == Some(connection_id))
            .map(|t| t.username.clone())
    }

    /// Alle Namen in Beitrittsreihenfolge
    pub fn snapshot(&self) -> Vec<String> {
        let mut teilnehmer: Vec<&Participant> = self.teilnehmer.values().collect();
        teilnehmer.sort_by_key(|t| t.beitritts_index);
        teilnehmer.into_iter().map(|t| t.username.clone()).collect()
    }

    /// Alle Teilnehmer mit Verbindung (also alle Gaeste)
    pub fn gaeste(&self) -> impl Iterator<Item = &Participant> {
        self.teilnehmer.values().filter(|t| t.verbindung.is_some())
    }

    /// Entfernt alle Gaeste und gibt sie zurueck (Raum wird geschlossen)
    pub fn gaeste_entfernen(&mut self) -> Vec<Participant> {
        let namen: Vec<String> = self
            .teilnehmer
            .values()
            .filter(|t| !t.ist_host())
            .map(|t| t.username.clone())
            .collect();
        namen
            .iter()
            .filter_map(|name| self.teilnehmer.remove(name))
            .collect()
    }

    pub fn anzahl(&self) -> usize {
        self.teilnehmer.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
