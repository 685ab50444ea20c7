//! ringline-signaling – WebSocket-Signaling-Relay
//!
//! Dieser Crate implementiert das Relay fuer Anruf-Signaling: Clients melden
//! sich mit ihrer Benutzer-ID an, sehen wer erreichbar ist und tauschen
//! Offer, Answer, ICE-Kandidaten und Anrufende ueber das Relay aus. Medien
//! laufen nie ueber das Relay.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket Listener (SignalingServer, axum)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task, eine Send-Queue)
//!     |
//!     v
//! MessageDispatcher ──> AnrufManager (Zustand pro Benutzerpaar)
//!     |
//!     v
//! ConnectionRegistry (Actor) ──> PresenceBroadcaster ──> alle Verbindungen
//! ```

pub mod anruf;
pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod registry;
pub mod server_state;
pub mod ws;

// Bequeme Re-Exporte
pub use anruf::{AnrufFehler, AnrufManager, AnrufSitzung, AnrufZustand};
pub use broadcast::ClientSender;
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use presence::PresenceBroadcaster;
pub use registry::ConnectionRegistry;
pub use server_state::{SignalingConfig, SignalingState};
pub use ws::SignalingServer;
