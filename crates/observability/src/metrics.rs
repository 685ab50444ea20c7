//! Prometheus-kompatible Metriken fuer Ringline
//!
//! Registrierte Metriken:
//! - `ringline_open_connections` – Gauge: Offene Signaling-Verbindungen
//! - `ringline_online_users` – Gauge: Registrierte (erreichbare) Benutzer
//! - `ringline_calls_active` – Gauge: Klingelnde oder laufende Anrufe
//! - `ringline_relayed_messages_total` – Counter: Weitergeleitete Nachrichten (kind)
//! - `ringline_unreachable_total` – Counter: Nachrichten an nicht erreichbare Ziele
//! - `ringline_rejected_messages_total` – Counter: Abgelehnte Nachrichten (reason)
//! - `ringline_dropped_messages_total` – Counter: Verworfene ausgehende Nachrichten
//! - `ringline_presence_broadcasts_total` – Counter: Versendete Presence-Snapshots
//! - `ringline_call_timeouts_total` – Counter: Unbeantwortete Anrufe nach Timeout

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Ringline-Prometheus-Metriken
///
/// Jede Instanz hat ihre eigene Registry. Clone teilt die Metriken.
#[derive(Clone)]
pub struct RinglineMetrics {
    pub registry: Arc<Registry>,

    // Zustand
    pub open_connections: IntGauge,
    pub online_users: IntGauge,
    pub calls_active: IntGauge,

    // Signaling-Verkehr
    pub relayed_messages_total: IntCounterVec,
    pub unreachable_total: IntCounter,
    pub rejected_messages_total: IntCounterVec,
    pub dropped_messages_total: IntCounter,
    pub presence_broadcasts_total: IntCounter,
    pub call_timeouts_total: IntCounter,
}

impl RinglineMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Zustand ---
        let open_connections = IntGauge::with_opts(Opts::new(
            "ringline_open_connections",
            "Anzahl offener Signaling-Verbindungen",
        ))?;
        registry.register(Box::new(open_connections.clone()))?;

        let online_users = IntGauge::with_opts(Opts::new(
            "ringline_online_users",
            "Anzahl registrierter (erreichbarer) Benutzer",
        ))?;
        registry.register(Box::new(online_users.clone()))?;

        let calls_active = IntGauge::with_opts(Opts::new(
            "ringline_calls_active",
            "Anzahl klingelnder oder laufender Anrufe",
        ))?;
        registry.register(Box::new(calls_active.clone()))?;

        // --- Signaling-Verkehr ---
        let relayed_messages_total = IntCounterVec::new(
            Opts::new(
                "ringline_relayed_messages_total",
                "Weitergeleitete Signaling-Nachrichten",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(relayed_messages_total.clone()))?;

        let unreachable_total = IntCounter::with_opts(Opts::new(
            "ringline_unreachable_total",
            "Nachrichten an nicht erreichbare Benutzer",
        ))?;
        registry.register(Box::new(unreachable_total.clone()))?;

        let rejected_messages_total = IntCounterVec::new(
            Opts::new(
                "ringline_rejected_messages_total",
                "Abgelehnte Client-Nachrichten",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_messages_total.clone()))?;

        let dropped_messages_total = IntCounter::with_opts(Opts::new(
            "ringline_dropped_messages_total",
            "Verworfene ausgehende Nachrichten (Queue voll oder geschlossen)",
        ))?;
        registry.register(Box::new(dropped_messages_total.clone()))?;

        let presence_broadcasts_total = IntCounter::with_opts(Opts::new(
            "ringline_presence_broadcasts_total",
            "Versendete online-users Snapshots",
        ))?;
        registry.register(Box::new(presence_broadcasts_total.clone()))?;

        let call_timeouts_total = IntCounter::with_opts(Opts::new(
            "ringline_call_timeouts_total",
            "Anrufe die nach dem Klingel-Timeout beendet wurden",
        ))?;
        registry.register(Box::new(call_timeouts_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            open_connections,
            online_users,
            calls_active,
            relayed_messages_total,
            unreachable_total,
            rejected_messages_total,
            dropped_messages_total,
            presence_broadcasts_total,
            call_timeouts_total,
        })
    }

    /// Zaehlt eine weitergeleitete Nachricht
    pub fn weitergeleitet(&self, art: &str) {
        self.relayed_messages_total.with_label_values(&[art]).inc();
    }

    /// Zaehlt eine abgelehnte Nachricht
    pub fn abgelehnt(&self, grund: &str) {
        self.rejected_messages_total.with_label_values(&[grund]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RinglineMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RinglineMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = RinglineMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn zwei_instanzen_kollidieren_nicht() {
        // Eigene Registry pro Instanz, keine globale Doppelregistrierung
        let a = RinglineMetrics::neu().unwrap();
        let b = RinglineMetrics::neu().unwrap();
        a.online_users.set(3);
        assert_eq!(b.online_users.get(), 0);
    }

    #[test]
    fn counter_mit_labels() {
        let metriken = RinglineMetrics::neu().unwrap();
        metriken.weitergeleitet("call-request");
        metriken.weitergeleitet("call-request");
        metriken.abgelehnt("invalid_message");
        assert_eq!(
            metriken
                .relayed_messages_total
                .with_label_values(&["call-request"])
                .get(),
            2
        );
        assert_eq!(
            metriken
                .rejected_messages_total
                .with_label_values(&["invalid_message"])
                .get(),
            1
        );
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = RinglineMetrics::neu().unwrap();
        metriken.open_connections.set(5);
        metriken.unreachable_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("ringline_open_connections 5"));
        assert!(output.contains("ringline_unreachable_total 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = RinglineMetrics::neu().unwrap();

        // Vec-Metriken erscheinen in gather() erst nach dem ersten Label-Zugriff
        metriken.weitergeleitet("call-end");
        metriken.abgelehnt("no_ringing_call");

        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        for name in [
            "ringline_open_connections",
            "ringline_online_users",
            "ringline_calls_active",
            "ringline_relayed_messages_total",
            "ringline_unreachable_total",
            "ringline_rejected_messages_total",
            "ringline_dropped_messages_total",
            "ringline_presence_broadcasts_total",
            "ringline_call_timeouts_total",
        ] {
            assert!(namen.contains(&name), "{name} fehlt");
        }
    }
}
