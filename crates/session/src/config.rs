//! Konfiguration der Session-Engine
//!
//! Wird per Konstruktor uebergeben. Die Binary fuellt sie aus der
//! TOML-Datei, Tests setzen kurze Zeitlimits und Port 0.

use std::time::Duration;

/// Standard-Port fuer einen gehosteten Raum
pub const DEFAULT_PORT: u16 = 6666;

/// Laenge eines vom Host erzeugten Secret Keys
pub const SECRET_KEY_LENGTH: usize = 24;

/// Zeichenvorrat fuer erzeugte Secret Keys
pub const SECRET_KEY_CHARSET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+[]{}|;:,.<>?/";

/// Konfiguration fuer eine Session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bind-Adresse beim Hosten
    pub bind_adresse: String,
    /// Port beim Hosten (0 = vom System gewaehlt)
    pub port: u16,
    /// Wartezeit auf ein `AuthResult` nach dem Beitrittsversuch
    pub join_timeout: Duration,
    /// Zeit, die ausgehende Frames beim Schliessen noch bekommen
    pub close_grace: Duration,
    /// Obergrenze fuer einen einzelnen Schreibvorgang auf eine laufende Verbindung
    pub schreib_timeout: Duration,
    /// Maximale Laenge eines Benutzernamens in Zeichen
    pub max_username_laenge: usize,
    /// Maximale Laenge einer Nachricht in Zeichen
    pub max_nachricht_laenge: usize,
    /// Ungueltige Frames in Folge, ab denen die Verbindung als verloren gilt
    pub max_ungueltige_frames: u32,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Frame-Groesse auf dem Draht
    pub max_frame_groesse: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            join_timeout: Duration::from_secs(10),
            close_grace: Duration::from_secs(2),
            schreib_timeout: Duration::from_secs(10),
            max_username_laenge: 20,
            max_nachricht_laenge: 250,
            max_ungueltige_frames: 3,
            send_queue_groesse: 64,
            max_frame_groesse: backroom_protocol::wire::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl SessionConfig {
    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_ziel(&self) -> String {
        format!("{}:{}", self.bind_adresse, self.port)
    }
}
