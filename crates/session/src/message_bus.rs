//! MessageBus – Nummerierung und Verteilung von Raum-Nachrichten
//!
//! Existiert nur beim Host. Jede angenommene Nachricht bekommt hier ihre
//! Sequenznummer und wird dann an alle Gaeste im Roster verteilt.
//! `Abonnenten` nutzt auch der Gast fuer seinen lokalen Nachrichten-Stream.
//!
//! ## Ordnung
//! - Sequenznummern beginnen bei 1 und steigen ohne Luecken
//! - Abgelehnte Nachrichten verbrauchen keine Nummer
//! - Die Verteilung erfolgt in Nummernreihenfolge, weil nur der
//!   Engine-Task den Bus benutzt

use backroom_core::{Message, SequenceNumber};
use backroom_protocol::Frame;
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;

use crate::error::{SessionError, SessionResult};
use crate::roster::Roster;

/// Absender von System-Nachrichten
pub const SYSTEM_ABSENDER: &str = "";

// ---------------------------------------------------------------------------
// Abonnenten
// ---------------------------------------------------------------------------

/// Lokale Empfaenger von Raum-Nachrichten
///
/// Alle Streams enden, wenn die Liste geschlossen oder verworfen wird.
#[derive(Debug, Default)]
pub struct Abonnenten {
    liste: Vec<mpsc::UnboundedSender<Message>>,
}

impl Abonnenten {
    /// Neuer Stream fuer alle kuenftigen Nachrichten
    pub fn abonnieren(&mut self) -> impl Stream<Item = Message> + Send + 'static {
        let (tx, rx) = mpsc::unbounded_channel();
        self.liste.push(tx);
        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|nachricht| (nachricht, rx))
        })
    }

    /// Reicht eine Nachricht weiter; verworfene Streams fallen heraus
    pub fn weiterreichen(&mut self, nachricht: &Message) {
        self.liste.retain(|tx| tx.send(nachricht.clone()).is_ok());
    }

    pub fn schliessen(&mut self) {
        self.liste.clear();
    }

    pub fn anzahl(&self) -> usize {
        self.liste.len()
    }
}

// ---------------------------------------------------------------------------
// MessageBus
// ---------------------------------------------------------------------------

/// Vergibt Sequenznummern und verteilt Nachrichten
#[derive(Debug)]
pub struct MessageBus {
    naechste_sequenz: SequenceNumber,
    max_laenge: usize,
    /// Lokale Abonnenten (z.B. ein Mitschnitt beim Host)
    abonnenten: Abonnenten,
}

impl MessageBus {
    /// Erstellt einen neuen Bus fuer einen Raum
    pub fn neu(max_laenge: usize) -> Self {
        Self {
            naechste_sequenz: 1,
            max_laenge,
            abonnenten: Abonnenten::default(),
        }
    }

    /// Prueft einen Nachrichtentext ohne eine Nummer zu vergeben
    pub fn pruefen(body: &str, max_laenge: usize) -> SessionResult<()> {
        if body.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if body.chars().count() > max_laenge {
            return Err(SessionError::MessageTooLong { max: max_laenge });
        }
        Ok(())
    }

    /// Nimmt eine Chat-Nachricht an und nummeriert sie
    pub fn publish(&mut self, sender: &str, body: &str) -> SessionResult<Message> {
        Self::pruefen(body, self.max_laenge)?;
        let nachricht = Message::chat(sender, body, self.naechste_nummer());
        self.abonnenten.weiterreichen(&nachricht);
        Ok(nachricht)
    }

    /// Nummeriert eine System-Ansage (z.B. "alice left")
    pub fn publish_system(&mut self, body: impl Into<String>) -> Message {
        let nachricht = Message::system(SYSTEM_ABSENDER, body, self.naechste_nummer());
        self.abonnenten.weiterreichen(&nachricht);
        nachricht
    }

    /// Sendet eine Nachricht an alle Gaeste im Roster
    ///
    /// Gibt die Namen der Gaeste zurueck, deren Send-Queue voll oder
    /// geschlossen war. Die Engine behandelt sie als getrennt.
    pub fn deliver(&self, nachricht: &Message, roster: &Roster) -> Vec<String> {
        let mut fehlgeschlagen = Vec::new();
        for gast in roster.gaeste() {
            let zugestellt = gast
                .verbindung()
                .map(|v| v.senden(Frame::aus_nachricht(nachricht)))
                .unwrap_or(false);
            if !zugestellt {
                fehlgeschlagen.push(gast.username.clone());
            }
        }

        tracing::trace!(
            sequenz = nachricht.sequence,
            fehlgeschlagen = fehlgeschlagen.len(),
            "Nachricht verteilt"
        );
        fehlgeschlagen
    }

    /// Abonniert alle kuenftigen Nachrichten des Raums
    ///
    /// Der Stream endet, wenn der Bus geschlossen oder verworfen wird.
    pub fn subscribe(&mut self) -> impl Stream<Item = Message> + Send + 'static {
        self.abonnenten.abonnieren()
    }

    /// Beendet alle Abonnements
    pub fn schliessen(&mut self) {
        self.abonnenten.schliessen();
    }

    /// Zuletzt vergebene Sequenznummer (0 = noch keine)
    pub fn letzte_sequenz(&self) -> SequenceNumber {
        self.naechste_sequenz - 1
    }

    fn naechste_nummer(&mut self) -> SequenceNumber {
        let nummer = self.naechste_sequenz;
        self.naechste_sequenz += 1;
        nummer
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_gate::AuthGate;
    use crate::connection::PeerHandle;
    use crate::roster::Participant;
    use futures_util::StreamExt;

    fn gast_aufnehmen(roster: &mut Roster, name: &str, queue: usize) -> mpsc::Receiver<Frame> {
        let (handle, rx) = PeerHandle::test_paar(queue);
        let zulassung = AuthGate::neu("K", 20)
            .authenticate("K", name, roster)
            .unwrap();
        roster.add(Participant::gast(zulassung, handle)).unwrap();
        rx
    }

    #[test]
    fn sequenz_beginnt_bei_eins_und_ist_lueckenlos() {
        let mut bus = MessageBus::neu(250);
        assert_eq!(bus.letzte_sequenz(), 0);

        let a = bus.publish("alice", "hi").unwrap();
        let b = bus.publish_system("bob left");
        let c = bus.publish("host", "tschuess").unwrap();

        assert_eq!((a.sequence, b.sequence, c.sequence), (1, 2, 3));
        assert!(b.ist_system());
        assert_eq!(bus.letzte_sequenz(), 3);
    }

    #[test]
    fn abgelehnte_nachricht_verbraucht_keine_nummer() {
        let mut bus = MessageBus::neu(250);
        assert_eq!(bus.publish("alice", "   "), Err(SessionError::EmptyMessage));
        assert_eq!(
            bus.publish("alice", &"x".repeat(251)),
            Err(SessionError::MessageTooLong { max: 250 })
        );

        let ok = bus.publish("alice", &"x".repeat(250)).unwrap();
        assert_eq!(ok.sequence, 1);
    }

    #[test]
    fn deliver_erreicht_alle_gaeste() {
        let mut roster = Roster::neu();
        roster.add(Participant::host("host")).unwrap();
        let mut rx_alice = gast_aufnehmen(&mut roster, "alice", 4);
        let mut rx_bob = gast_aufnehmen(&mut roster, "bob", 4);

        let mut bus = MessageBus::neu(250);
        let nachricht = bus.publish("host", "hallo").unwrap();
        assert!(bus.deliver(&nachricht, &roster).is_empty());

        let erwartet = Frame::aus_nachricht(&nachricht);
        assert_eq!(rx_alice.try_recv().unwrap(), erwartet);
        assert_eq!(rx_bob.try_recv().unwrap(), erwartet);
    }

    #[test]
    fn volle_oder_geschlossene_queue_wird_gemeldet() {
        let mut roster = Roster::neu();
        let _rx_alice = gast_aufnehmen(&mut roster, "alice", 1);
        let rx_bob = gast_aufnehmen(&mut roster, "bob", 4);
        drop(rx_bob);

        let mut bus = MessageBus::neu(250);
        let erste = bus.publish("host", "eins").unwrap();
        let mut fehlgeschlagen = bus.deliver(&erste, &roster);
        assert_eq!(fehlgeschlagen, vec!["bob".to_string()]);

        // alice hat Queue-Groesse 1 und liest nicht
        let zweite = bus.publish("host", "zwei").unwrap();
        fehlgeschlagen = bus.deliver(&zweite, &roster);
        fehlgeschlagen.sort();
        assert_eq!(fehlgeschlagen, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn subscribe_liefert_in_reihenfolge_und_endet() {
        let mut bus = MessageBus::neu(250);
        let stream = bus.subscribe();

        bus.publish("alice", "hi").unwrap();
        bus.publish_system("alice left");
        bus.schliessen();

        let nachrichten: Vec<Message> = stream.collect().await;
        let sequenzen: Vec<u64> = nachrichten.iter().map(|n| n.sequence).collect();
        assert_eq!(sequenzen, vec![1, 2]);
    }

    #[tokio::test]
    async fn verworfener_stream_faellt_aus_den_abonnenten() {
        let mut abonnenten = Abonnenten::default();
        let behalten = abonnenten.abonnieren();
        drop(abonnenten.abonnieren());
        assert_eq!(abonnenten.anzahl(), 2);

        abonnenten.weiterreichen(&Message::chat("alice", "hi", 1));
        assert_eq!(abonnenten.anzahl(), 1);

        drop(abonnenten);
        let nachrichten: Vec<Message> = behalten.collect().await;
        assert_eq!(nachrichten, vec![Message::chat("alice", "hi", 1)]);
    }
}
