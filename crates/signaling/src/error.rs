//! Fehlertypen fuer den Signaling-Service

use ringline_core::RinglineError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (Listener, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket-Fehler beim Lesen oder Schreiben
    #[error("WebSocket-Fehler: {0}")]
    WebSocket(#[from] axum::Error),

    /// Ungueltige Benutzer-ID oder Nachricht
    #[error(transparent)]
    Ungueltig(#[from] RinglineError),

    /// JSON konnte nicht gelesen oder geschrieben werden
    #[error("Serialisierungsfehler: {0}")]
    Serialisierung(#[from] serde_json::Error),

    /// Der Registry-Actor laeuft nicht mehr
    #[error("Connection-Registry nicht erreichbar")]
    RegistryGeschlossen,

    /// Schreiben auf den Socket hat zu lange gedauert
    #[error("Timeout")]
    Timeout,
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
