//! Peer-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Peer ohne Konfigurationsdatei
//! lauffaehig ist.

use backroom_session::config::DEFAULT_PORT;
use backroom_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Herkunft der geladenen Konfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quelle {
    Datei,
    /// Datei fehlt, Standardwerte
    Standard,
}

/// Vollstaendige Peer-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Netzwerk-Einstellungen (nur beim Hosten relevant)
    pub netzwerk: NetzwerkEinstellungen,
    /// Grenzen und Fristen der Session
    pub sitzung: SitzungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer einen gehosteten Raum
    pub bind_adresse: String,
    /// Port fuer einen gehosteten Raum (0 = vom System gewaehlt)
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: DEFAULT_PORT,
        }
    }
}

/// Grenzen und Fristen der Session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungsEinstellungen {
    /// Wartezeit auf die Antwort des Hosts beim Beitreten
    pub join_timeout_ms: u64,
    /// Zeit fuer ausstehende Frames beim Schliessen einer Verbindung
    pub close_grace_ms: u64,
    /// Maximale Laenge eines Benutzernamens in Zeichen
    pub max_username_laenge: usize,
    /// Maximale Laenge einer Nachricht in Zeichen
    pub max_nachricht_laenge: usize,
    /// Ungueltige Frames in Folge bis zur Trennung
    pub max_ungueltige_frames: u32,
    /// Zeitlimit fuer einen einzelnen Schreibvorgang
    pub schreib_timeout_ms: u64,
    /// Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for SitzungsEinstellungen {
    fn default() -> Self {
        let standard = SessionConfig::default();
        Self {
            join_timeout_ms: standard.join_timeout.as_millis() as u64,
            close_grace_ms: standard.close_grace.as_millis() as u64,
            schreib_timeout_ms: standard.schreib_timeout.as_millis() as u64,
            max_username_laenge: standard.max_username_laenge,
            max_nachricht_laenge: standard.max_nachricht_laenge,
            max_ungueltige_frames: standard.max_ungueltige_frames,
            send_queue_groesse: standard.send_queue_groesse,
            max_frame_groesse: standard.max_frame_groesse,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl PeerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    ///
    /// Loggt nichts: der Aufrufer meldet die `Quelle`, sobald das Logging steht.
    pub fn laden(pfad: &str) -> anyhow::Result<(Self, Quelle)> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config
                    .pruefen()
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok((config, Quelle::Datei))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((Self::default(), Quelle::Standard)),
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die die Session-Engine nicht mit 0 betreiben kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        let sitzung = &self.sitzung;
        let pflichtwerte = [
            ("sitzung.join_timeout_ms", sitzung.join_timeout_ms as usize),
            ("sitzung.close_grace_ms", sitzung.close_grace_ms as usize),
            ("sitzung.schreib_timeout_ms", sitzung.schreib_timeout_ms as usize),
            ("sitzung.max_username_laenge", sitzung.max_username_laenge),
            ("sitzung.max_nachricht_laenge", sitzung.max_nachricht_laenge),
            ("sitzung.send_queue_groesse", sitzung.send_queue_groesse),
            ("sitzung.max_frame_groesse", sitzung.max_frame_groesse),
        ];
        for (feld, wert) in pflichtwerte {
            if wert == 0 {
                anyhow::bail!("'{feld}' muss groesser als 0 sein");
            }
        }
        Ok(())
    }

    /// Uebersetzt die Datei-Konfiguration fuer die Session-Engine
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        self.pruefen()?;
        Ok(SessionConfig {
            bind_adresse: self.netzwerk.bind_adresse.clone(),
            port: self.netzwerk.port,
            join_timeout: Duration::from_millis(self.sitzung.join_timeout_ms),
            close_grace: Duration::from_millis(self.sitzung.close_grace_ms),
            schreib_timeout: Duration::from_millis(self.sitzung.schreib_timeout_ms),
            max_username_laenge: self.sitzung.max_username_laenge,
            max_nachricht_laenge: self.sitzung.max_nachricht_laenge,
            max_ungueltige_frames: self.sitzung.max_ungueltige_frames,
            send_queue_groesse: self.sitzung.send_queue_groesse,
            max_frame_groesse: self.sitzung.max_frame_groesse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = PeerConfig::default();
        assert_eq!(cfg.netzwerk.port, 6666);
        assert_eq!(cfg.sitzung.join_timeout_ms, 10_000);
        assert_eq!(cfg.sitzung.max_nachricht_laenge, 250);
        assert_eq!(cfg.logging.format, "text");
    }

    #[test]
    fn session_config_uebernimmt_werte() {
        let mut cfg = PeerConfig::default();
        cfg.netzwerk.port = 0;
        cfg.sitzung.join_timeout_ms = 1500;

        let session = cfg.session_config().unwrap();
        assert_eq!(session.port, 0);
        assert_eq!(session.join_timeout, Duration::from_millis(1500));
        assert_eq!(session.bind_ziel(), "0.0.0.0:0");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            port = 7000

            [sitzung]
            max_username_laenge = 12
        "#;
        let cfg: PeerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.port, 7000);
        assert_eq!(cfg.sitzung.max_username_laenge, 12);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.sitzung.close_grace_ms, 2000);
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let (cfg, quelle) = PeerConfig::laden("/nicht/vorhanden/backroom.toml").unwrap();
        assert_eq!(cfg.netzwerk.port, DEFAULT_PORT);
        assert_eq!(quelle, Quelle::Standard);
    }

    #[test]
    fn leere_send_queue_wird_abgelehnt() {
        let mut cfg = PeerConfig::default();
        cfg.sitzung.send_queue_groesse = 0;

        let fehler = cfg.session_config().unwrap_err();
        assert!(fehler.to_string().contains("send_queue_groesse"));
    }

    #[test]
    fn datei_mit_nullwert_wird_beim_laden_abgelehnt() {
        let dir = tempfile::tempdir().expect("Temp-Verzeichnis konnte nicht erstellt werden");
        let pfad = dir.path().join("backroom.toml");
        std::fs::write(&pfad, "[sitzung]\nsend_queue_groesse = 0\n").unwrap();

        let fehler = PeerConfig::laden(pfad.to_str().unwrap()).unwrap_err();
        assert!(fehler.to_string().contains("send_queue_groesse"));
    }
}
