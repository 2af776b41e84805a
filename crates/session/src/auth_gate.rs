//! AuthGate – Zulassung neuer Teilnehmer
//!
//! Laeuft ausschliesslich auf dem Host, der die Wahrheit ueber das Roster
//! haelt. Ein Gast prueft seinen eigenen Beitritt nie lokal.
//!
//! ## Pruefreihenfolge
//! 1. Secret Key (exakter Vergleich)
//! 2. Format des Benutzernamens
//! 3. Name bereits im Raum
//! 4. Name gebannt

use backroom_core::AuthError;
use rand::Rng;

use crate::config::{SECRET_KEY_CHARSET, SECRET_KEY_LENGTH};
use crate::roster::Roster;

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Nachweis einer erfolgreichen Pruefung
///
/// Nur `AuthGate::authenticate` erzeugt dieses Token, daher kommt kein Gast
/// ohne Pruefung ins Roster.
#[derive(Debug)]
pub struct Admission {
    username: String,
}

impl Admission {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn into_username(self) -> String {
        self.username
    }
}

// ---------------------------------------------------------------------------
// AuthGate
// ---------------------------------------------------------------------------

/// Prueft Beitrittsanfragen gegen Secret Key und Roster
#[derive(Debug, Clone)]
pub struct AuthGate {
    secret_key: String,
    max_username_laenge: usize,
}

impl AuthGate {
    /// Erstellt ein AuthGate fuer einen Raum
    pub fn neu(secret_key: impl Into<String>, max_username_laenge: usize) -> Self {
        Self {
            secret_key: secret_key.into(),
            max_username_laenge,
        }
    }

    /// Secret Key des Raums
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Entscheidet ueber einen Beitritt
    ///
    /// Veraendert das Roster nicht. Die Engine nimmt den Teilnehmer mit dem
    /// zurueckgegebenen `Admission` auf.
    pub fn authenticate(
        &self,
        secret_key: &str,
        username: &str,
        roster: &Roster,
    ) -> Result<Admission, AuthError> {
        if secret_key != self.secret_key {
            return Err(AuthError::InvalidSecretKey);
        }

        username_pruefen(username, self.max_username_laenge)?;

        if roster.is_member(username) {
            return Err(AuthError::UsernameTaken);
        }
        if roster.is_banned(username) {
            return Err(AuthError::UsernameBanned);
        }

        Ok(Admission {
            username: username.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Prueft das Format eines Benutzernamens
///
/// Nicht leer, hoechstens `max_laenge` Zeichen, keine Steuerzeichen.
pub fn username_pruefen(username: &str, max_laenge: usize) -> Result<(), AuthError> {
    if username.trim().is_empty() {
        return Err(AuthError::InvalidUsername(
            "Benutzername darf nicht leer sein".to_string(),
        ));
    }
    if username.chars().count() > max_laenge {
        return Err(AuthError::InvalidUsername(format!(
            "Benutzername darf hoechstens {} Zeichen haben",
            max_laenge
        )));
    }
    if username.chars().any(char::is_control) {
        return Err(AuthError::InvalidUsername(
            "Benutzername enthaelt Steuerzeichen".to_string(),
        ));
    }
    Ok(())
}

/// Erzeugt einen zufaelligen Secret Key fuer einen neuen Raum
pub fn secret_key_erzeugen() -> String {
    let zeichen: Vec<char> = SECRET_KEY_CHARSET.chars().collect();
    let mut rng = rand::thread_rng();
    (0..SECRET_KEY_LENGTH)
        .map(|_| zeichen[rng.gen_range(0..zeichen.len())])
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Participant;

    fn gate() -> AuthGate {
        AuthGate::neu("K1", 20)
    }

    fn roster() -> Roster {
        let mut roster = Roster::neu();
        roster.add(Participant::host("host")).unwrap();
        roster
    }

    #[test]
    fn gueltiger_beitritt() {
        let zulassung = gate().authenticate("K1", "alice", &roster()).unwrap();
        assert_eq!(zulassung.username(), "alice");
    }

    #[test]
    fn falscher_key() {
        let ergebnis = gate().authenticate("K2", "bob", &roster());
        assert_eq!(ergebnis.unwrap_err(), AuthError::InvalidSecretKey);
    }

    #[test]
    fn key_wird_vor_dem_namen_geprueft() {
        // Name ist belegt und ungueltig, trotzdem gewinnt der Key-Fehler
        let ergebnis = gate().authenticate("falsch", "host", &roster());
        assert_eq!(ergebnis.unwrap_err(), AuthError::InvalidSecretKey);
        let ergebnis = gate().authenticate("falsch", "", &roster());
        assert_eq!(ergebnis.unwrap_err(), AuthError::InvalidSecretKey);
    }

    #[test]
    fn belegter_name() {
        let ergebnis = gate().authenticate("K1", "host", &roster());
        assert_eq!(ergebnis.unwrap_err(), AuthError::UsernameTaken);
    }

    #[test]
    fn gebannter_name() {
        let mut roster = roster();
        roster.ban("mallory");
        let ergebnis = gate().authenticate("K1", "mallory", &roster);
        assert_eq!(ergebnis.unwrap_err(), AuthError::UsernameBanned);
    }

    #[test]
    fn format_vor_belegt_und_gebannt() {
        let mut roster = roster();
        let zu_lang = "x".repeat(21);
        roster.ban(&zu_lang);
        let ergebnis = gate().authenticate("K1", &zu_lang, &roster);
        assert!(matches!(ergebnis, Err(AuthError::InvalidUsername(_))));
    }

    #[test]
    fn username_format() {
        assert!(username_pruefen("alice", 20).is_ok());
        assert!(username_pruefen(&"ä".repeat(20), 20).is_ok(), "Zeichen, nicht Bytes");
        assert!(username_pruefen("", 20).is_err());
        assert!(username_pruefen("   ", 20).is_err());
        assert!(username_pruefen(&"a".repeat(21), 20).is_err());
        assert!(username_pruefen("ali\nce", 20).is_err());
    }

    #[test]
    fn erzeugter_key_hat_laenge_und_zeichenvorrat() {
        let key = secret_key_erzeugen();
        assert_eq!(key.chars().count(), SECRET_KEY_LENGTH);
        assert!(key.chars().all(|c| SECRET_KEY_CHARSET.contains(c)));
        assert_ne!(key, secret_key_erzeugen());
    }
}
