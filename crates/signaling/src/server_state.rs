//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Registry-Handle, Anruf-Tabelle, Presence und Metriken. Wird als
//! `Arc<SignalingState>` an jeden Verbindungs-Task gegeben.

use ringline_observability::RinglineMetrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::anruf::AnrufManager;
use crate::broadcast::SEND_QUEUE_GROESSE;
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionRegistry;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// HTTP-Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
    /// Maximale Anzahl gleichzeitig offener Verbindungen
    pub max_verbindungen: usize,
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Nach dieser Zeit ohne Annahme wird ein klingelnder Anruf beendet
    pub klingel_timeout_sek: u64,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Maximale Dauer eines einzelnen Socket-Writes
    pub schreib_timeout_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            ws_pfad: "/ws".to_string(),
            max_verbindungen: 1024,
            send_queue_groesse: SEND_QUEUE_GROESSE,
            klingel_timeout_sek: 45,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            schreib_timeout_ms: 5000,
        }
    }
}

impl SignalingConfig {
    pub fn klingel_timeout(&self) -> Duration {
        Duration::from_secs(self.klingel_timeout_sek)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_sek)
    }

    pub fn verbindungs_timeout(&self) -> Duration {
        Duration::from_secs(self.verbindungs_timeout_sek)
    }

    pub fn schreib_timeout(&self) -> Duration {
        Duration::from_millis(self.schreib_timeout_ms)
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Signaling-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Handle auf den Registry-Actor
    pub registry: ConnectionRegistry,
    /// Klingelnde und laufende Anrufe
    pub anrufe: AnrufManager,
    /// Presence-Broadcaster (wird vom Registry-Actor aufgerufen)
    pub presence: PresenceBroadcaster,
    /// Prometheus-Metriken
    pub metriken: RinglineMetrics,
    /// Anzahl offener WebSocket-Verbindungen
    offene_verbindungen: AtomicUsize,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState und startet den Registry-Actor
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn neu(config: SignalingConfig, metriken: RinglineMetrics) -> Arc<Self> {
        let presence = PresenceBroadcaster::neu(metriken.clone());
        let registry = ConnectionRegistry::starten(presence.clone());
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            anrufe: AnrufManager::neu(),
            presence,
            metriken,
            offene_verbindungen: AtomicUsize::new(0),
            start_time: Instant::now(),
        })
    }

    /// Reserviert einen Verbindungsplatz
    ///
    /// Gibt `false` zurueck wenn `max_verbindungen` bereits erreicht ist.
    pub fn verbindung_reservieren(&self) -> bool {
        let max = self.config.max_verbindungen;
        let ergebnis = self
            .offene_verbindungen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |aktuell| {
                (aktuell < max).then_some(aktuell + 1)
            });
        match ergebnis {
            Ok(vorher) => {
                self.metriken.open_connections.set((vorher + 1) as i64);
                true
            }
            Err(_) => false,
        }
    }

    /// Gibt einen Verbindungsplatz wieder frei
    pub fn verbindung_freigeben(&self) {
        let vorher = self.offene_verbindungen.fetch_sub(1, Ordering::AcqRel);
        self.metriken
            .open_connections
            .set(vorher.saturating_sub(1) as i64);
    }

    pub fn offene_verbindungen(&self) -> usize {
        self.offene_verbindungen.load(Ordering::Acquire)
    }

    /// Aktualisiert das Gauge fuer klingelnde und laufende Anrufe
    pub fn anruf_gauge_aktualisieren(&self) {
        self.metriken
            .calls_active
            .set(self.anrufe.aktive_anzahl() as i64);
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_konfiguration() {
        let config = SignalingConfig::default();
        assert_eq!(config.ws_pfad, "/ws");
        assert_eq!(config.max_verbindungen, 1024);
        assert_eq!(config.send_queue_groesse, 64);
        assert_eq!(config.klingel_timeout(), Duration::from_secs(45));
        assert_eq!(config.keepalive(), Duration::from_secs(30));
        assert_eq!(config.verbindungs_timeout(), Duration::from_secs(90));
        assert_eq!(config.schreib_timeout(), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn verbindungslimit_wird_eingehalten() {
        let config = SignalingConfig {
            max_verbindungen: 2,
            ..Default::default()
        };
        let metriken = RinglineMetrics::neu().unwrap();
        let state = SignalingState::neu(config, metriken.clone());

        assert!(state.verbindung_reservieren());
        assert!(state.verbindung_reservieren());
        assert!(!state.verbindung_reservieren());
        assert_eq!(state.offene_verbindungen(), 2);
        assert_eq!(metriken.open_connections.get(), 2);

        state.verbindung_freigeben();
        assert_eq!(metriken.open_connections.get(), 1);
        assert!(state.verbindung_reservieren());
    }
}
