//! Signaling-Protokoll (WebSocket, JSON)
//!
//! Definiert alle Nachrichten die ueber die Signaling-Verbindung zwischen
//! Client und Relay ausgetauscht werden.
//!
//! ## Design
//! - Jede Nachricht ist ein JSON-Textframe mit `type`-Diskriminator (kebab-case)
//! - Felder im camelCase wie von den Web-/Mobile-Clients erwartet
//! - Session-Descriptions und ICE-Kandidaten sind opake JSON-Werte, das Relay
//!   reicht sie unveraendert weiter

use ringline_core::{RinglineError, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer `error`-Events an den Absender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Nachricht nicht parsebar oder Pflichtfeld fehlt
    InvalidMessage,
    /// call-accept / call-reject ohne passenden klingelnden Anruf
    NoRingingCall,
    /// ice-candidate ohne klingelnden oder laufenden Anruf
    NoActiveCall,
    /// call-request obwohl zwischen den beiden bereits ein Anruf besteht
    CallAlreadyActive,
}

/// Medientyp eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedienTyp {
    Audio,
    Video,
}

impl std::fmt::Display for MedienTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Grund fuer ein vom Relay erzeugtes `call-ended`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndeGrund {
    /// Niemand hat innerhalb des Klingel-Timeouts abgenommen
    Timeout,
    /// Die Gegenseite hat die Verbindung verloren
    Disconnected,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Anruf-Anfrage (Offer) an einen anderen Benutzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnrufAnfrage {
    pub to: UserId,
    /// Vom Client behauptete Identitaet, wird vom Relay ueberschrieben
    pub from: UserId,
    pub from_display_name: String,
    pub media_type: MedienTyp,
    pub session_offer: serde_json::Value,
}

/// Annahme eines eingehenden Anrufs (Answer)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnrufAnnahme {
    pub to: UserId,
    pub session_answer: serde_json::Value,
}

/// Ablehnung eines eingehenden Anrufs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnrufAblehnung {
    pub to: UserId,
}

/// ICE-Kandidat fuer die Pfadaushandlung
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceKandidat {
    pub to: UserId,
    pub candidate: serde_json::Value,
}

/// Beenden eines Anrufs (beide Seiten, jederzeit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnrufEnde {
    pub to: UserId,
}

/// Alle Nachrichten die ein Client senden darf
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientNachricht {
    CallRequest(AnrufAnfrage),
    CallAccept(AnrufAnnahme),
    CallReject(AnrufAblehnung),
    IceCandidate(IceKandidat),
    CallEnd(AnrufEnde),
}

impl ClientNachricht {
    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Ziel-Benutzer der Nachricht
    pub fn ziel(&self) -> &UserId {
        match self {
            Self::CallRequest(n) => &n.to,
            Self::CallAccept(n) => &n.to,
            Self::CallReject(n) => &n.to,
            Self::IceCandidate(n) => &n.to,
            Self::CallEnd(n) => &n.to,
        }
    }

    /// Nachrichtenart wie auf dem Draht (fuer Logs und Metrik-Labels)
    pub fn art(&self) -> &'static str {
        match self {
            Self::CallRequest(_) => "call-request",
            Self::CallAccept(_) => "call-accept",
            Self::CallReject(_) => "call-reject",
            Self::IceCandidate(_) => "ice-candidate",
            Self::CallEnd(_) => "call-end",
        }
    }

    /// Semantische Pruefung nach erfolgreichem Parsen
    ///
    /// serde erzwingt bereits die Anwesenheit aller Pflichtfelder. Hier wird
    /// zusaetzlich abgelehnt: leeres `to`, `null`-Payloads und Anrufe an sich selbst.
    pub fn validieren(&self, absender: &UserId) -> ringline_core::Result<()> {
        let ziel = self.ziel();
        if ziel.ist_leer() {
            return Err(RinglineError::nachricht("Feld 'to' ist leer"));
        }

        match self {
            Self::CallRequest(n) => {
                if ziel == absender {
                    return Err(RinglineError::nachricht("Anruf an sich selbst"));
                }
                if n.session_offer.is_null() {
                    return Err(RinglineError::nachricht("Feld 'sessionOffer' ist null"));
                }
            }
            Self::CallAccept(n) if n.session_answer.is_null() => {
                return Err(RinglineError::nachricht("Feld 'sessionAnswer' ist null"));
            }
            Self::IceCandidate(n) if n.candidate.is_null() => {
                return Err(RinglineError::nachricht("Feld 'candidate' ist null"));
            }
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Aktuelle Menge erreichbarer Benutzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineBenutzer {
    pub users: Vec<UserId>,
}

/// Eingehender Anruf beim Angerufenen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EingehenderAnruf {
    pub from: UserId,
    pub from_display_name: String,
    pub media_type: MedienTyp,
    pub session_offer: serde_json::Value,
}

/// Anruf wurde angenommen (an den Anrufer)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnrufAngenommen {
    pub from: UserId,
    pub session_answer: serde_json::Value,
}

/// Anruf wurde abgelehnt (an den Anrufer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnrufAbgelehnt {
    pub from: UserId,
}

/// Weitergeleiteter ICE-Kandidat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceKandidatWeiter {
    pub from: UserId,
    pub candidate: serde_json::Value,
}

/// Anruf wurde beendet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnrufBeendet {
    pub from: UserId,
    /// Nur gesetzt wenn das Relay den Anruf beendet hat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<EndeGrund>,
}

/// Ziel ist nicht erreichbar (nur an den Absender)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenutzerOffline {
    pub user_id: UserId,
}

/// Fehler-Antwort (nur an den Absender)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

/// Alle Nachrichten die das Relay an Clients sendet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerNachricht {
    OnlineUsers(OnlineBenutzer),
    IncomingCall(EingehenderAnruf),
    CallAccepted(AnrufAngenommen),
    CallRejected(AnrufAbgelehnt),
    IceCandidate(IceKandidatWeiter),
    CallEnded(AnrufBeendet),
    UserOffline(BenutzerOffline),
    Error(ErrorResponse),
}

impl ServerNachricht {
    /// Erstellt ein `online-users`-Event
    pub fn online(users: Vec<UserId>) -> Self {
        Self::OnlineUsers(OnlineBenutzer { users })
    }

    /// Erstellt ein `user-offline`-Event
    pub fn offline(user_id: UserId) -> Self {
        Self::UserOffline(BenutzerOffline { user_id })
    }

    /// Erstellt ein `call-ended`-Event
    pub fn beendet(from: UserId, reason: Option<EndeGrund>) -> Self {
        Self::CallEnded(AnrufBeendet { from, reason })
    }

    /// Erstellt eine Fehler-Antwort
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            code,
            message: message.into(),
        })
    }

    /// Nachrichtenart wie auf dem Draht
    pub fn art(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => "online-users",
            Self::IncomingCall(_) => "incoming-call",
            Self::CallAccepted(_) => "call-accepted",
            Self::CallRejected(_) => "call-rejected",
            Self::IceCandidate(_) => "ice-candidate",
            Self::CallEnded(_) => "call-ended",
            Self::UserOffline(_) => "user-offline",
            Self::Error(_) => "error",
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
