//! Send-Queues der verbundenen Clients
//!
//! Jede Verbindung besitzt genau eine begrenzte FIFO-Queue. Alles was an
//! einen Client geht (weitergeleitete Signaling-Nachrichten, Presence,
//! Fehler) laeuft durch diese Queue, dadurch bleibt die Reihenfolge pro
//! Empfaenger erhalten.
//!
//! Senden ist immer nicht-blockierend (`try_send`). Ein langsamer oder
//! haengender Client verliert Nachrichten, blockiert aber niemanden.

use chrono::{DateTime, Utc};
use ringline_core::{UserId, VerbindungsId};
use ringline_protocol::ServerNachricht;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Groesse der Send-Queue pro Client
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub verbindung_id: VerbindungsId,
    pub user_id: UserId,
    pub verbunden_seit: DateTime<Utc>,
    tx: mpsc::Sender<ServerNachricht>,
}

impl ClientSender {
    /// Erstellt eine neue Queue und gibt Sender-Handle und Empfangsseite zurueck
    ///
    /// Die `ClientConnection` liest aus dem Receiver und schreibt auf den Socket.
    pub fn neu(user_id: UserId, kapazitaet: usize) -> (Self, mpsc::Receiver<ServerNachricht>) {
        let (tx, rx) = mpsc::channel(kapazitaet.max(1));
        let sender = Self {
            verbindung_id: VerbindungsId::new(),
            user_id,
            verbunden_seit: Utc::now(),
            tx,
        };
        (sender, rx)
    }

    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ServerNachricht) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(verworfen)) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    verbindung = %self.verbindung_id,
                    art = verworfen.art(),
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    user_id = %self.user_id,
                    verbindung = %self.verbindung_id,
                    "Send-Queue geschlossen (Client getrennt)"
                );
                false
            }
        }
    }

    /// Reserviert einen Platz in der Send-Queue ohne zu blockieren
    ///
    /// Mit dem Permit kann spaeter garantiert zugestellt werden. `None` wenn
    /// die Queue voll oder geschlossen ist.
    pub fn reservieren(&self) -> Option<mpsc::Permit<'_, ServerNachricht>> {
        match self.tx.try_reserve() {
            Ok(permit) => Some(permit),
            Err(mpsc::error::TrySendError::Full(())) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    verbindung = %self.verbindung_id,
                    "Send-Queue voll – kein Platz reserviert"
                );
                None
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::debug!(
                    user_id = %self.user_id,
                    verbindung = %self.verbindung_id,
                    "Send-Queue geschlossen (Client getrennt)"
                );
                None
            }
        }
    }
}

/// Sendet eine Nachricht an alle uebergebenen Clients
///
/// Gibt `(gesendet, verworfen)` zurueck.
pub fn an_alle_senden<'a>(
    empfaenger: impl IntoIterator<Item = &'a ClientSender>,
    nachricht: &ServerNachricht,
) -> (usize, usize) {
    let mut gesendet = 0;
    let mut verworfen = 0;
    for sender in empfaenger {
        if sender.senden(nachricht.clone()) {
            gesendet += 1;
        } else {
            verworfen += 1;
        }
    }
    (gesendet, verworfen)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
