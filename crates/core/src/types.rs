//! Gemeinsame Identifikationstypen fuer Ringline
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RinglineError};

/// Maximale Laenge einer Benutzer-ID in Zeichen
pub const MAX_USER_ID_LAENGE: usize = 128;

/// Benutzer-ID wie vom Client beim Handshake uebergeben
///
/// Opaker String. Wird vom Relay nicht gegen Zugangsdaten geprueft,
/// nur syntaktisch (nicht leer, begrenzte Laenge, keine Steuerzeichen).
/// Handshake und JSON-Felder laufen durch dieselbe Pruefung.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Erstellt eine UserId ohne Pruefung (fuer bereits validierte Werte und Tests)
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Prueft und erstellt eine UserId aus Benutzereingaben
    pub fn parse(roh: &str) -> Result<Self> {
        let id = roh.trim();
        if id.is_empty() {
            return Err(RinglineError::UngueltigeBenutzerId(
                "Benutzer-ID ist leer".into(),
            ));
        }
        if id.chars().count() > MAX_USER_ID_LAENGE {
            return Err(RinglineError::UngueltigeBenutzerId(format!(
                "Benutzer-ID laenger als {MAX_USER_ID_LAENGE} Zeichen"
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(RinglineError::UngueltigeBenutzerId(
                "Benutzer-ID enthaelt Steuerzeichen".into(),
            ));
        }
        Ok(Self(id.to_string()))
    }

    /// Gibt die ID als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prueft ob die ID leer ist (nur bei ungeprueften Werten moeglich)
    pub fn ist_leer(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = RinglineError;

    fn try_from(roh: String) -> Result<Self> {
        Self::parse(&roh)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::neu(id)
    }
}

/// Opakes Handle einer einzelnen Signaling-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub Uuid);

impl VerbindungsId {
    /// Erstellt eine neue zufaellige VerbindungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for VerbindungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Eindeutige ID einer Anruf-Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnrufId(pub Uuid);

impl AnrufId {
    /// Erstellt eine neue zufaellige AnrufId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnrufId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnrufId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call:{}", self.0)
    }
}
