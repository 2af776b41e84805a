//! Gemeinsame Helfer fuer die Integration-Tests (echte TCP-Verbindungen auf 127.0.0.1)

#![allow(dead_code)]

use backroom_core::Notification;
use backroom_session::{RoomHandle, SessionConfig, SessionEngine, SessionHandle, SessionState};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Maximale Wartezeit auf ein erwartetes Ereignis
pub const WARTEZEIT: Duration = Duration::from_secs(5);

pub type Notifications = UnboundedReceiver<Notification>;

pub fn test_config() -> SessionConfig {
    SessionConfig {
        bind_adresse: "127.0.0.1".to_string(),
        port: 0,
        join_timeout: Duration::from_secs(2),
        close_grace: Duration::from_millis(200),
        ..SessionConfig::default()
    }
}

/// Startet einen Host mit eroeffnetem Raum
pub async fn host_starten(name: &str) -> (SessionHandle, Notifications, RoomHandle) {
    let (host, notifications) = SessionEngine::starten(test_config());
    let raum = host
        .start_room(name)
        .await
        .expect("Raum konnte nicht eroeffnet werden");
    (host, notifications, raum)
}

/// Wartet auf die erste Notification, die `passt` erfuellt; andere werden uebersprungen
pub async fn warten_auf<F>(rx: &mut Notifications, mut passt: F) -> Notification
where
    F: FnMut(&Notification) -> bool,
{
    tokio::time::timeout(WARTEZEIT, async {
        loop {
            let notification = rx.recv().await.expect("Notification-Kanal geschlossen");
            if passt(&notification) {
                return notification;
            }
        }
    })
    .await
    .expect("Timeout beim Warten auf eine Notification")
}

/// Wartet, bis das Roster des Hosts genau `namen` enthaelt
pub async fn warten_auf_roster(rx: &mut Notifications, namen: &[&str]) {
    let erwartet: Vec<String> = namen.iter().map(|n| n.to_string()).collect();
    warten_auf(rx, |n| matches!(n, Notification::RosterChanged(r) if *r == erwartet)).await;
}

/// Laesst einen Gast beitreten und wartet auf den Wechsel in die Raumansicht
pub async fn gast_beitreten(
    raum: &RoomHandle,
    name: &str,
) -> (SessionHandle, Notifications) {
    let (gast, mut notifications) = SessionEngine::starten(test_config());
    gast.join_room("127.0.0.1", raum.port(), raum.secret_key.clone(), name)
        .await
        .expect("join_room abgelehnt");
    warten_auf(&mut notifications, |n| *n == Notification::SwitchedToActiveView).await;
    assert_eq!(gast.state().await.unwrap(), SessionState::Active);
    (gast, notifications)
}

/// Wartet, bis eine Session den erwarteten Zustand erreicht
pub async fn warten_auf_zustand(session: &SessionHandle, zustand: SessionState) {
    tokio::time::timeout(WARTEZEIT, async {
        while session.state().await.unwrap() != zustand {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timeout beim Warten auf den Zustand");
}
