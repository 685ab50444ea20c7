//! Anruf-Sitzungen – expliziter Zustandsautomat pro Benutzerpaar
//!
//! ```text
//!            call-request              call-accept
//!   Idle ──────────────────> Klingelt ─────────────> Aktiv
//!                              │  call-reject,          │ call-end,
//!                              │  call-end, Timeout,    │ Disconnect
//!                              │  Disconnect            │
//!                              v                        v
//!                           Beendet <───────────────────┘
//! ```
//!
//! Schluessel ist das ungeordnete Paar der beiden Benutzer-IDs. `Idle` und
//! `Beendet` sind nicht gespeichert: beim Uebergang nach `Beendet` wird der
//! Eintrag entfernt und die zurueckgegebene Sitzung traegt `Beendet`.
//! Pruefen und Uebergang passieren jeweils unter dem Eintrags-Lock der DashMap.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ringline_core::{AnrufId, UserId};
use ringline_protocol::{ErrorCode, MedienTyp};
use std::sync::Arc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Zustand einer Anruf-Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufZustand {
    Klingelt,
    Aktiv,
    Beendet,
}

/// Eine Anruf-Sitzung zwischen zwei Benutzern
#[derive(Debug, Clone)]
pub struct AnrufSitzung {
    pub id: AnrufId,
    pub anrufer: UserId,
    pub angerufener: UserId,
    pub medien_typ: MedienTyp,
    pub zustand: AnrufZustand,
    pub begonnen: DateTime<Utc>,
}

impl AnrufSitzung {
    /// Der jeweils andere Teilnehmer
    pub fn gegenueber(&self, user_id: &UserId) -> &UserId {
        if &self.anrufer == user_id {
            &self.angerufener
        } else {
            &self.anrufer
        }
    }

    /// Sekunden seit Beginn der Sitzung
    pub fn dauer_sek(&self) -> i64 {
        (Utc::now() - self.begonnen).num_seconds()
    }

    fn beendet(mut self) -> Self {
        self.zustand = AnrufZustand::Beendet;
        self
    }
}

/// Ungeordnetes Benutzerpaar
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AnrufPaar(UserId, UserId);

impl AnrufPaar {
    fn neu(a: &UserId, b: &UserId) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }

    fn enthaelt(&self, user_id: &UserId) -> bool {
        &self.0 == user_id || &self.1 == user_id
    }
}

/// Verletzung des Anruf-Zustandsautomaten
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnrufFehler {
    #[error("Zwischen {0} und {1} besteht bereits ein Anruf")]
    BereitsAktiv(UserId, UserId),

    #[error("Kein klingelnder Anruf von {0}")]
    KeinKlingelnderAnruf(UserId),

    #[error("Kein klingelnder oder laufender Anruf mit {0}")]
    KeinAktiverAnruf(UserId),
}

impl AnrufFehler {
    /// Fehler-Code fuer das `error`-Event an den Absender
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BereitsAktiv(..) => ErrorCode::CallAlreadyActive,
            Self::KeinKlingelnderAnruf(_) => ErrorCode::NoRingingCall,
            Self::KeinAktiverAnruf(_) => ErrorCode::NoActiveCall,
        }
    }

    /// Label fuer `ringline_rejected_messages_total`
    pub fn metrik_grund(&self) -> &'static str {
        match self {
            Self::BereitsAktiv(..) => "call_already_active",
            Self::KeinKlingelnderAnruf(_) => "no_ringing_call",
            Self::KeinAktiverAnruf(_) => "no_active_call",
        }
    }
}

// ---------------------------------------------------------------------------
// AnrufManager
// ---------------------------------------------------------------------------

/// Tabelle aller klingelnden und laufenden Anrufe
///
/// Clone teilt die Tabelle.
#[derive(Clone, Default)]
pub struct AnrufManager {
    sitzungen: Arc<DashMap<AnrufPaar, AnrufSitzung>>,
}

impl AnrufManager {
    pub fn neu() -> Self {
        Self::default()
    }

    /// `call-request`: Idle -> Klingelt
    pub fn anruf_starten(
        &self,
        anrufer: &UserId,
        angerufener: &UserId,
        medien_typ: MedienTyp,
    ) -> Result<AnrufSitzung, AnrufFehler> {
        match self.sitzungen.entry(AnrufPaar::neu(anrufer, angerufener)) {
            Entry::Occupied(_) => Err(AnrufFehler::BereitsAktiv(
                anrufer.clone(),
                angerufener.clone(),
            )),
            Entry::Vacant(frei) => {
                let sitzung = AnrufSitzung {
                    id: AnrufId::new(),
                    anrufer: anrufer.clone(),
                    angerufener: angerufener.clone(),
                    medien_typ,
                    zustand: AnrufZustand::Klingelt,
                    begonnen: Utc::now(),
                };
                frei.insert(sitzung.clone());
                Ok(sitzung)
            }
        }
    }

    /// `call-accept` vom Angerufenen: Klingelt -> Aktiv
    pub fn annehmen(
        &self,
        annehmender: &UserId,
        anrufer: &UserId,
    ) -> Result<AnrufSitzung, AnrufFehler> {
        let paar = AnrufPaar::neu(annehmender, anrufer);
        match self.sitzungen.get_mut(&paar) {
            Some(mut sitzung) if klingelt_von(&sitzung, anrufer, annehmender) => {
                sitzung.zustand = AnrufZustand::Aktiv;
                Ok(sitzung.clone())
            }
            _ => Err(AnrufFehler::KeinKlingelnderAnruf(anrufer.clone())),
        }
    }

    /// `call-reject` vom Angerufenen: Klingelt -> Beendet
    pub fn ablehnen(
        &self,
        ablehnender: &UserId,
        anrufer: &UserId,
    ) -> Result<AnrufSitzung, AnrufFehler> {
        self.sitzungen
            .remove_if(&AnrufPaar::neu(ablehnender, anrufer), |_, sitzung| {
                klingelt_von(sitzung, anrufer, ablehnender)
            })
            .map(|(_, sitzung)| sitzung.beendet())
            .ok_or_else(|| AnrufFehler::KeinKlingelnderAnruf(anrufer.clone()))
    }

    /// `ice-candidate`: nur bei klingelndem oder laufendem Anruf erlaubt
    pub fn kandidat_pruefen(&self, von: &UserId, an: &UserId) -> Result<(), AnrufFehler> {
        if self.sitzungen.contains_key(&AnrufPaar::neu(von, an)) {
            Ok(())
        } else {
            Err(AnrufFehler::KeinAktiverAnruf(an.clone()))
        }
    }

    /// `call-end`: beendet die Sitzung des Paares, falls vorhanden
    pub fn beenden(&self, von: &UserId, an: &UserId) -> Option<AnrufSitzung> {
        self.sitzungen
            .remove(&AnrufPaar::neu(von, an))
            .map(|(_, sitzung)| sitzung.beendet())
    }

    /// Klingel-Timeout: beendet die Sitzung nur wenn genau sie noch klingelt
    ///
    /// Ein Timer einer bereits beendeten oder angenommenen Sitzung ist ein No-op.
    pub fn zeitueberschreitung(&self, sitzung: &AnrufSitzung) -> Option<AnrufSitzung> {
        self.sitzungen
            .remove_if(
                &AnrufPaar::neu(&sitzung.anrufer, &sitzung.angerufener),
                |_, aktuell| aktuell.id == sitzung.id && aktuell.zustand == AnrufZustand::Klingelt,
            )
            .map(|(_, sitzung)| sitzung.beendet())
    }

    /// Beendet alle Sitzungen eines Benutzers die bis `stichtag` begonnen haben
    ///
    /// Sitzungen nach dem Stichtag gehoeren zu einer neueren Verbindung
    /// desselben Benutzers und bleiben bestehen.
    pub fn alle_beenden_fuer(
        &self,
        user_id: &UserId,
        stichtag: DateTime<Utc>,
    ) -> Vec<AnrufSitzung> {
        let paare: Vec<AnrufPaar> = self
            .sitzungen
            .iter()
            .filter(|eintrag| eintrag.key().enthaelt(user_id))
            .map(|eintrag| eintrag.key().clone())
            .collect();

        paare
            .into_iter()
            .filter_map(|paar| {
                self.sitzungen
                    .remove_if(&paar, |_, sitzung| sitzung.begonnen <= stichtag)
            })
            .map(|(_, sitzung)| sitzung.beendet())
            .collect()
    }

    /// Anzahl klingelnder oder laufender Anrufe
    pub fn aktive_anzahl(&self) -> usize {
        self.sitzungen.len()
    }
}

fn klingelt_von(sitzung: &AnrufSitzung, anrufer: &UserId, angerufener: &UserId) -> bool {
    sitzung.zustand == AnrufZustand::Klingelt
        && &sitzung.anrufer == anrufer
        && &sitzung.angerufener == angerufener
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
