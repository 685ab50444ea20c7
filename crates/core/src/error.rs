//! Fehlertypen fuer Ringline
//!
//! Zentraler Fehler-Enum fuer Identifikatoren, Nachrichten-Validierung und
//! Konfiguration. Untermodule koennen eigene Fehler definieren und via
//! `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Ringline
pub type Result<T> = std::result::Result<T, RinglineError>;

/// Fehler die crate-uebergreifend auftreten koennen
#[derive(Debug, Error)]
pub enum RinglineError {
    // --- Protokoll ---
    #[error("Ungueltige Benutzer-ID: {0}")]
    UngueltigeBenutzerId(String),

    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl RinglineError {
    /// Erstellt einen Nachrichten-Fehler
    pub fn nachricht(msg: impl Into<String>) -> Self {
        Self::UngueltigeNachricht(msg.into())
    }

    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}
