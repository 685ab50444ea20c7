//! Connection-Registry – Benutzer-ID -> aktuelle Verbindung
//!
//! Einziger geteilter, veraenderlicher Verbindungszustand des Relays. Der
//! Zustand gehoert exklusiv einem Actor-Task; alle anderen Tasks halten nur
//! ein billig klonbares Handle und sprechen per Befehlskanal mit dem Actor.
//! Registrieren, Abmelden, Nachschlagen und Schnappschuss sind dadurch
//! gegenseitig ausgeschlossen.
//!
//! ## Semantik
//! - Pro Benutzer-ID hoechstens ein Eintrag, die letzte Registrierung gewinnt
//! - Eine ersetzte Verbindung bleibt offen und erhaelt weiter Presence
//! - Abmelden einer ersetzten Verbindung entfernt den neueren Eintrag nicht
//! - Abmelden ist idempotent

use ringline_core::{UserId, VerbindungsId};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{mpsc, oneshot};

use crate::broadcast::ClientSender;
use crate::error::{SignalingError, SignalingResult};
use crate::presence::PresenceBroadcaster;

/// Groesse des Befehlskanals zum Actor
const BEFEHL_KANAL_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// Befehle (Handle -> Actor)
// ---------------------------------------------------------------------------

enum RegistryBefehl {
    Registrieren {
        sender: ClientSender,
        antwort: oneshot::Sender<Option<ClientSender>>,
    },
    Abmelden {
        verbindung_id: VerbindungsId,
        antwort: oneshot::Sender<Option<UserId>>,
    },
    Nachschlagen {
        user_id: UserId,
        antwort: oneshot::Sender<Option<ClientSender>>,
    },
    Schnappschuss {
        antwort: oneshot::Sender<Vec<UserId>>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle auf den Registry-Actor
///
/// Clone ist billig, alle Klone sprechen mit demselben Actor.
#[derive(Clone)]
pub struct ConnectionRegistry {
    befehl_tx: mpsc::Sender<RegistryBefehl>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("actor_laeuft", &!self.befehl_tx.is_closed())
            .finish()
    }
}

impl ConnectionRegistry {
    /// Startet den Registry-Actor und gibt ein Handle zurueck
    ///
    /// Der Actor laeuft bis das letzte Handle gedroppt wurde.
    pub fn starten(presence: PresenceBroadcaster) -> Self {
        let (befehl_tx, befehl_rx) = mpsc::channel(BEFEHL_KANAL_GROESSE);
        let actor = RegistryActor {
            eintraege: BTreeMap::new(),
            verbindungen: HashMap::new(),
            presence,
        };
        tokio::spawn(actor.run(befehl_rx));
        Self { befehl_tx }
    }

    /// Traegt die Verbindung fuer ihre Benutzer-ID ein
    ///
    /// Gibt die ersetzte Verbindung zurueck, falls der Benutzer schon
    /// registriert war.
    pub async fn registrieren(&self, sender: ClientSender) -> SignalingResult<Option<ClientSender>> {
        let (antwort, rx) = oneshot::channel();
        self.befehl(RegistryBefehl::Registrieren { sender, antwort }).await?;
        rx.await.map_err(|_| SignalingError::RegistryGeschlossen)
    }

    /// Meldet eine Verbindung ab
    ///
    /// Gibt die Benutzer-ID zurueck, wenn dadurch ein Registry-Eintrag
    /// entfernt wurde. `None` bei unbekannter oder ersetzter Verbindung.
    pub async fn abmelden(&self, verbindung_id: VerbindungsId) -> SignalingResult<Option<UserId>> {
        let (antwort, rx) = oneshot::channel();
        self.befehl(RegistryBefehl::Abmelden {
            verbindung_id,
            antwort,
        })
        .await?;
        rx.await.map_err(|_| SignalingError::RegistryGeschlossen)
    }

    /// Sucht die aktuelle Verbindung eines Benutzers
    pub async fn nachschlagen(&self, user_id: &UserId) -> SignalingResult<Option<ClientSender>> {
        let (antwort, rx) = oneshot::channel();
        self.befehl(RegistryBefehl::Nachschlagen {
            user_id: user_id.clone(),
            antwort,
        })
        .await?;
        rx.await.map_err(|_| SignalingError::RegistryGeschlossen)
    }

    /// Konsistenter Schnappschuss aller registrierten Benutzer (aufsteigend sortiert)
    pub async fn schnappschuss(&self) -> SignalingResult<Vec<UserId>> {
        let (antwort, rx) = oneshot::channel();
        self.befehl(RegistryBefehl::Schnappschuss { antwort }).await?;
        rx.await.map_err(|_| SignalingError::RegistryGeschlossen)
    }

    async fn befehl(&self, befehl: RegistryBefehl) -> SignalingResult<()> {
        self.befehl_tx
            .send(befehl)
            .await
            .map_err(|_| SignalingError::RegistryGeschlossen)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct RegistryActor {
    /// Registry-Eintraege, sortiert nach Benutzer-ID
    eintraege: BTreeMap<UserId, ClientSender>,
    /// Alle offenen Verbindungen inklusive ersetzter
    verbindungen: HashMap<VerbindungsId, ClientSender>,
    presence: PresenceBroadcaster,
}

impl RegistryActor {
    async fn run(mut self, mut befehl_rx: mpsc::Receiver<RegistryBefehl>) {
        tracing::debug!("Registry-Actor gestartet");

        while let Some(befehl) = befehl_rx.recv().await {
            match befehl {
                RegistryBefehl::Registrieren { sender, antwort } => {
                    let ersetzt = self.registrieren(sender);
                    let _ = antwort.send(ersetzt);
                }
                RegistryBefehl::Abmelden {
                    verbindung_id,
                    antwort,
                } => {
                    let entfernt = self.abmelden(verbindung_id);
                    let _ = antwort.send(entfernt);
                }
                RegistryBefehl::Nachschlagen { user_id, antwort } => {
                    let _ = antwort.send(self.eintraege.get(&user_id).cloned());
                }
                RegistryBefehl::Schnappschuss { antwort } => {
                    let _ = antwort.send(self.schnappschuss());
                }
            }
        }

        tracing::debug!("Registry-Actor beendet");
    }

    fn registrieren(&mut self, sender: ClientSender) -> Option<ClientSender> {
        self.verbindungen
            .insert(sender.verbindung_id, sender.clone());
        let ersetzt = self.eintraege.insert(sender.user_id.clone(), sender);
        self.presence_verteilen();
        ersetzt
    }

    fn abmelden(&mut self, verbindung_id: VerbindungsId) -> Option<UserId> {
        let sender = self.verbindungen.remove(&verbindung_id)?;

        let ist_aktuell = self
            .eintraege
            .get(&sender.user_id)
            .is_some_and(|eintrag| eintrag.verbindung_id == verbindung_id);
        if !ist_aktuell {
            return None;
        }

        self.eintraege.remove(&sender.user_id);
        self.presence_verteilen();
        Some(sender.user_id)
    }

    fn schnappschuss(&self) -> Vec<UserId> {
        self.eintraege.keys().cloned().collect()
    }

    fn presence_verteilen(&self) {
        self.presence
            .veroeffentlichen(self.schnappschuss(), self.verbindungen.values());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
