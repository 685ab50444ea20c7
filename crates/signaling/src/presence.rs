//! Presence-Broadcaster – Wer ist gerade erreichbar?
//!
//! Nach jeder Aenderung der Connection-Registry wird der aktuelle Schnappschuss
//! der registrierten Benutzer als `online-users` an alle offenen Verbindungen
//! verschickt. Zusaetzlich wird der Schnappschuss ueber einen `watch`-Kanal
//! fuer prozessinterne Beobachter veroeffentlicht.
//!
//! Der Broadcaster wird ausschliesslich vom Registry-Actor aufgerufen, damit
//! ist die Reihenfolge der Snapshots identisch mit der Reihenfolge der
//! Registry-Aenderungen.

use ringline_core::UserId;
use ringline_observability::RinglineMetrics;
use ringline_protocol::ServerNachricht;
use std::sync::Arc;
use tokio::sync::watch;

use crate::broadcast::{an_alle_senden, ClientSender};

/// Verteilt Presence-Snapshots an alle offenen Verbindungen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    online_tx: watch::Sender<Vec<UserId>>,
    metriken: RinglineMetrics,
}

impl PresenceBroadcaster {
    pub fn neu(metriken: RinglineMetrics) -> Self {
        let (online_tx, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(PresenceInner {
                online_tx,
                metriken,
            }),
        }
    }

    /// Verschickt `online` an alle uebergebenen Verbindungen
    ///
    /// `online` muss bereits aufsteigend sortiert sein (BTreeMap-Schluessel).
    /// Volle oder geschlossene Queues verlieren genau diese eine Nachricht.
    pub fn veroeffentlichen<'a>(
        &self,
        online: Vec<UserId>,
        empfaenger: impl IntoIterator<Item = &'a ClientSender>,
    ) {
        let metriken = &self.inner.metriken;
        metriken.online_users.set(online.len() as i64);

        let nachricht = ServerNachricht::online(online.clone());
        let (gesendet, verworfen) = an_alle_senden(empfaenger, &nachricht);
        metriken.presence_broadcasts_total.inc();
        if verworfen > 0 {
            metriken.dropped_messages_total.inc_by(verworfen as u64);
        }

        tracing::debug!(
            online = online.len(),
            gesendet,
            verworfen,
            "Presence-Snapshot verteilt"
        );

        self.inner.online_tx.send_replace(online);
    }

    /// Abonniert den jeweils letzten Presence-Schnappschuss
    pub fn online_abonnieren(&self) -> watch::Receiver<Vec<UserId>> {
        self.inner.online_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
