//! ringline-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Identifikationstypen und den zentralen Fehlertyp
//! bereit, die von allen anderen Ringline-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, RinglineError};
pub use types::{AnrufId, UserId, VerbindungsId, MAX_USER_ID_LAENGE};
