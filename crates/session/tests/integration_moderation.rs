//! Integration-Tests: Kick, Bann, Verlassen und Schliessen eines Raums

mod common;

use backroom_core::{AuthError, Message, ModerationError, Notification};
use backroom_session::{SessionEngine, SessionError, SessionState};
use common::*;

fn ist_nachricht(n: &Notification) -> bool {
    matches!(n, Notification::MessageAppended(_))
}

#[tokio::test]
async fn kick_beendet_gast_und_wird_angesagt() {
    let (host, mut host_rx, raum) = host_starten("host").await;
    let (alice, mut alice_rx) = gast_beitreten(&raum, "alice").await;
    let (_bob, mut bob_rx) = gast_beitreten(&raum, "bob").await;
    warten_auf_roster(&mut host_rx, &["host", "alice", "bob"]).await;

    alice.send_message("hi").await.unwrap();
    warten_auf(&mut host_rx, ist_nachricht).await;

    host.kick_user("alice").await.unwrap();

    let beendet = warten_auf(&mut alice_rx, |n| n.ist_kritisch()).await;
    assert_eq!(
        beendet,
        Notification::CriticalError(ModerationError::Kicked.to_string())
    );
    warten_auf_zustand(&alice, SessionState::Terminated).await;

    let ansage = Notification::MessageAppended(Message::system("", "alice left", 2));
    assert_eq!(warten_auf(&mut host_rx, ist_nachricht).await, ansage);
    warten_auf(&mut bob_rx, ist_nachricht).await; // "hi"
    assert_eq!(warten_auf(&mut bob_rx, ist_nachricht).await, ansage);

    assert_eq!(host.roster().await.unwrap(), vec!["host", "bob"]);
    assert_eq!(
        host.kick_user("alice").await,
        Err(SessionError::NotMember("alice".to_string()))
    );
}

#[tokio::test]
async fn gebannter_name_kann_nicht_zurueck() {
    let (host, mut host_rx, raum) = host_starten("host").await;
    let (alice, mut alice_rx) = gast_beitreten(&raum, "alice").await;
    warten_auf_roster(&mut host_rx, &["host", "alice"]).await;

    host.ban_user("alice").await.unwrap();
    let beendet = warten_auf(&mut alice_rx, |n| n.ist_kritisch()).await;
    assert_eq!(
        beendet,
        Notification::CriticalError(ModerationError::Banned.to_string())
    );
    warten_auf_zustand(&alice, SessionState::Terminated).await;
    warten_auf_roster(&mut host_rx, &["host"]).await;

    let (wieder, mut wieder_rx) = SessionEngine::starten(test_config());
    wieder
        .join_room("127.0.0.1", raum.port(), raum.secret_key.clone(), "alice")
        .await
        .unwrap();
    let notification = warten_auf(&mut wieder_rx, |_| true).await;
    assert_eq!(
        notification,
        Notification::UsernameRejected(AuthError::UsernameBanned.to_string())
    );
}

#[tokio::test]
async fn bann_vor_dem_beitritt() {
    let (host, _host_rx, raum) = host_starten("host").await;
    host.ban_user("mallory").await.unwrap();

    let (mallory, mut rx) = SessionEngine::starten(test_config());
    mallory
        .join_room("127.0.0.1", raum.port(), raum.secret_key.clone(), "mallory")
        .await
        .unwrap();
    let notification = warten_auf(&mut rx, |_| true).await;
    assert!(matches!(notification, Notification::UsernameRejected(_)));
    assert_eq!(host.roster().await.unwrap(), vec!["host"]);
}

#[tokio::test]
async fn verlassen_wird_angesagt() {
    let (host, mut host_rx, raum) = host_starten("host").await;
    let (alice, _alice_rx) = gast_beitreten(&raum, "alice").await;
    warten_auf_roster(&mut host_rx, &["host", "alice"]).await;

    alice.leave_room().await.unwrap();
    assert_eq!(alice.state().await.unwrap(), SessionState::Terminated);
    assert_eq!(
        alice.send_message("noch da?").await,
        Err(SessionError::zustand("send_message", SessionState::Terminated))
    );

    let ansage = warten_auf(&mut host_rx, ist_nachricht).await;
    assert_eq!(
        ansage,
        Notification::MessageAppended(Message::system("", "alice left", 1))
    );
    warten_auf_roster(&mut host_rx, &["host"]).await;
    assert_eq!(host.state().await.unwrap(), SessionState::Active);
}

#[tokio::test]
async fn beendete_gast_engine_wird_als_abgang_angesagt() {
    let (host, mut host_rx, raum) = host_starten("host").await;
    let (alice, _alice_rx) = gast_beitreten(&raum, "alice").await;
    warten_auf_roster(&mut host_rx, &["host", "alice"]).await;

    // Letztes Handle verworfen: Engine raeumt auf und meldet sich ab
    drop(alice);

    warten_auf(&mut host_rx, |n| {
        matches!(n, Notification::MessageAppended(m) if m.body == "alice left")
    })
    .await;
    warten_auf_roster(&mut host_rx, &["host"]).await;
    assert_eq!(host.state().await.unwrap(), SessionState::Active);
}

#[tokio::test]
async fn schliessen_beendet_alle_gaeste() {
    let (host, mut host_rx, raum) = host_starten("host").await;
    let (alice, mut alice_rx) = gast_beitreten(&raum, "alice").await;
    let (bob, mut bob_rx) = gast_beitreten(&raum, "bob").await;
    warten_auf_roster(&mut host_rx, &["host", "alice", "bob"]).await;

    host.close_room().await.unwrap();
    assert_eq!(host.state().await.unwrap(), SessionState::Terminated);

    let erwartet = Notification::CriticalError(ModerationError::RoomClosed.to_string());
    assert_eq!(warten_auf(&mut alice_rx, |n| n.ist_kritisch()).await, erwartet);
    assert_eq!(warten_auf(&mut bob_rx, |n| n.ist_kritisch()).await, erwartet);
    warten_auf_zustand(&alice, SessionState::Terminated).await;
    warten_auf_zustand(&bob, SessionState::Terminated).await;

    // Listener ist geschlossen: neue Beitritte scheitern
    let (spaet, mut spaet_rx) = SessionEngine::starten(test_config());
    spaet
        .join_room("127.0.0.1", raum.port(), raum.secret_key.clone(), "carol")
        .await
        .unwrap();
    let notification = warten_auf(&mut spaet_rx, |_| true).await;
    assert!(!notification.ist_kritisch());
    assert_ne!(notification, Notification::SwitchedToActiveView);
}
