//! ringline-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Client und
//! Signaling-Relay ausgetauscht werden.

pub mod signaling;

pub use signaling::{ClientNachricht, EndeGrund, ErrorCode, MedienTyp, ServerNachricht};
