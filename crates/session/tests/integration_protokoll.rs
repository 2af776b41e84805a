//! Integration-Tests auf Frame-Ebene: ein roher Peer spricht direkt das Draht-Protokoll

mod common;

use backroom_core::{Message, Notification};
use backroom_protocol::{Decoded, Frame, FrameCodec, JoinRejection};
use backroom_session::{SessionConfig, SessionEngine, SessionState};
use common::*;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

async fn naechstes_frame(framed: &mut Framed<TcpStream, FrameCodec>) -> Frame {
    let decoded = tokio::time::timeout(WARTEZEIT, framed.next())
        .await
        .expect("Timeout beim Lesen")
        .expect("Verbindung geschlossen")
        .expect("Lesefehler");
    match decoded {
        Decoded::Frame(frame) => frame,
        Decoded::Malformed(grund) => panic!("Ungueltiges Frame: {}", grund),
    }
}

#[tokio::test]
async fn roher_gast_erhaelt_auth_result_und_nachrichten() {
    let (host, mut host_rx, raum) = host_starten("host").await;

    let stream = TcpStream::connect(("127.0.0.1", raum.port())).await.unwrap();
    let mut gast = Framed::new(stream, FrameCodec::new());

    // Vor der Anmeldung wird nichts veroeffentlicht
    gast.send(Frame::Post { body: "zu frueh".into() }).await.unwrap();
    gast.send(Frame::JoinRequest {
        secret_key: raum.secret_key.clone(),
        username: "roh".into(),
    })
    .await
    .unwrap();
    assert_eq!(naechstes_frame(&mut gast).await, Frame::auth_ok());

    gast.send(Frame::Post { body: "hallo".into() }).await.unwrap();
    assert_eq!(
        naechstes_frame(&mut gast).await,
        Frame::Chat {
            sender: "roh".into(),
            body: "hallo".into(),
            sequence: 1
        }
    );
    warten_auf_roster(&mut host_rx, &["host", "roh"]).await;

    host.kick_user("roh").await.unwrap();
    assert_eq!(naechstes_frame(&mut gast).await, Frame::KickNotice);
    let ende = tokio::time::timeout(WARTEZEIT, gast.next()).await.unwrap();
    assert!(ende.is_none(), "Host muss die Verbindung nach dem Kick schliessen");
}

#[tokio::test]
async fn abgelehnter_roher_gast_wird_getrennt() {
    let (_host, _host_rx, raum) = host_starten("host").await;

    let stream = TcpStream::connect(("127.0.0.1", raum.port())).await.unwrap();
    let mut gast = Framed::new(stream, FrameCodec::new());
    gast.send(Frame::JoinRequest {
        secret_key: "falsch".into(),
        username: "roh".into(),
    })
    .await
    .unwrap();

    assert_eq!(
        naechstes_frame(&mut gast).await,
        Frame::auth_abgelehnt(JoinRejection::InvalidSecretKey)
    );
    let ende = tokio::time::timeout(WARTEZEIT, gast.next()).await.unwrap();
    assert!(ende.is_none());
}

#[tokio::test]
async fn ungueltige_frames_beim_host_sind_nicht_kritisch() {
    let (host, mut host_rx, raum) = host_starten("host").await;

    let mut stream = TcpStream::connect(("127.0.0.1", raum.port())).await.unwrap();
    let payload = b"kein json";
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
    stream.write_all(payload).await.unwrap();

    let notification = warten_auf(&mut host_rx, |n| matches!(n, Notification::NonCriticalError(_))).await;
    assert!(!notification.ist_kritisch());
    assert_eq!(host.state().await.unwrap(), SessionState::Active);
}

#[tokio::test]
async fn gast_verwirft_veraltete_sequenznummern() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (gast, mut gast_rx) = SessionEngine::starten(test_config());
    gast.join_room("127.0.0.1", port, "K", "alice").await.unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    let mut host = Framed::new(stream, FrameCodec::new());
    assert_eq!(
        naechstes_frame(&mut host).await,
        Frame::JoinRequest {
            secret_key: "K".into(),
            username: "alice".into()
        }
    );

    host.send(Frame::auth_ok()).await.unwrap();
    for sequence in [1, 1, 3, 2] {
        host.send(Frame::Chat {
            sender: "host".into(),
            body: format!("n{}", sequence),
            sequence,
        })
        .await
        .unwrap();
    }
    host.send(Frame::System {
        body: "ende".into(),
        sequence: 4,
    })
    .await
    .unwrap();

    warten_auf(&mut gast_rx, |n| *n == Notification::SwitchedToActiveView).await;
    let mut gesehen = Vec::new();
    while gesehen.len() < 3 {
        if let Notification::MessageAppended(n) =
            warten_auf(&mut gast_rx, |n| matches!(n, Notification::MessageAppended(_))).await
        {
            gesehen.push(n);
        }
    }
    assert_eq!(
        gesehen,
        vec![
            Message::chat("host", "n1", 1),
            Message::chat("host", "n3", 3),
            Message::system("", "ende", 4),
        ]
    );

    // Host verschwindet: fuer einen aktiven Gast kritisch
    drop(host);
    let kritisch = warten_auf(&mut gast_rx, |n| n.ist_kritisch()).await;
    assert!(matches!(kritisch, Notification::CriticalError(_)));
    warten_auf_zustand(&gast, SessionState::Terminated).await;
}

#[tokio::test]
async fn nicht_lesender_gast_wird_entfernt_ohne_andere_zu_stoeren() {
    let (host, mut host_rx) = SessionEngine::starten(SessionConfig {
        send_queue_groesse: 4,
        max_nachricht_laenge: 60 * 1024,
        ..test_config()
    });
    let raum = host.start_room("host").await.unwrap();

    // Roher Gast tritt bei und liest danach nie wieder
    let stream = TcpStream::connect(("127.0.0.1", raum.port())).await.unwrap();
    let mut langsam = Framed::new(stream, FrameCodec::new());
    langsam
        .send(Frame::JoinRequest {
            secret_key: raum.secret_key.clone(),
            username: "langsam".into(),
        })
        .await
        .unwrap();
    assert_eq!(naechstes_frame(&mut langsam).await, Frame::auth_ok());

    let (_alice, mut alice_rx) = gast_beitreten(&raum, "alice").await;
    warten_auf_roster(&mut host_rx, &["host", "langsam", "alice"]).await;

    let gross = "x".repeat(60 * 1024);
    let mut beim_host = Vec::new();
    let mut letzte_sequenz = 0;
    for _ in 0..1000 {
        host.send_message(gross.clone()).await.unwrap();

        // Alice bekommt jede Nachricht, ihre Queue laeuft nie voll
        match warten_auf(&mut alice_rx, |n| matches!(n, Notification::MessageAppended(_))).await {
            Notification::MessageAppended(m) => {
                assert_eq!(m.sequence, letzte_sequenz + 1);
                letzte_sequenz = m.sequence;
            }
            _ => unreachable!(),
        }

        while let Ok(n) = host_rx.try_recv() {
            beim_host.push(n);
        }
        if beim_host.iter().any(|n| matches!(n, Notification::NonCriticalError(_))) {
            break;
        }
    }

    let fehler = beim_host
        .iter()
        .position(|n| matches!(n, Notification::NonCriticalError(_)))
        .expect("Zustellung an den nicht lesenden Gast ist nie gescheitert");
    assert!(!beim_host[fehler].ist_kritisch());

    let abgang = Message::system("", "langsam left", letzte_sequenz + 1);
    assert_eq!(
        beim_host[fehler + 1..].to_vec(),
        vec![
            Notification::MessageAppended(abgang.clone()),
            Notification::RosterChanged(vec!["host".to_string(), "alice".to_string()]),
        ]
    );
    assert_eq!(
        warten_auf(&mut alice_rx, |n| matches!(n, Notification::MessageAppended(_))).await,
        Notification::MessageAppended(abgang)
    );
    assert_eq!(host.roster().await.unwrap(), vec!["host", "alice"]);
    drop(langsam);
}
