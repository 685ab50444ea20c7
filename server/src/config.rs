//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use ringline_core::{Result, RinglineError};
use ringline_observability::logging::{log_level_gueltig, LogFormat};
use ringline_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Signaling-Einstellungen (Timeouts, Queues)
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename der Instanz (nur fuer Logs)
    pub name: String,
    /// Maximale Anzahl gleichzeitig offener Verbindungen
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Ringline Relay".into(),
            max_verbindungen: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port des WebSocket-Endpunkts
    pub ws_port: u16,
    /// HTTP-Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            ws_port: 9980,
            ws_pfad: "/ws".into(),
        }
    }
}

/// Signaling-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Klingel-Timeout in Sekunden
    pub klingel_timeout_sek: u64,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Trennen nach so vielen Sekunden ohne eingehenden Frame
    pub verbindungs_timeout_sek: u64,
    /// Maximale Dauer eines Socket-Writes in Millisekunden
    pub schreib_timeout_ms: u64,
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            klingel_timeout_sek: standard.klingel_timeout_sek,
            keepalive_sek: standard.keepalive_sek,
            verbindungs_timeout_sek: standard.verbindungs_timeout_sek,
            schreib_timeout_ms: standard.schreib_timeout_ms,
            send_queue_groesse: standard.send_queue_groesse,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config: Self = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte die serde nicht abfangen kann
    pub fn validieren(&self) -> Result<()> {
        let s = &self.signaling;
        for (name, wert) in [
            ("signaling.klingel_timeout_sek", s.klingel_timeout_sek),
            ("signaling.keepalive_sek", s.keepalive_sek),
            ("signaling.verbindungs_timeout_sek", s.verbindungs_timeout_sek),
            ("signaling.schreib_timeout_ms", s.schreib_timeout_ms),
        ] {
            if wert == 0 {
                return Err(RinglineError::konfiguration(format!("{name} darf nicht 0 sein")));
            }
        }
        if s.send_queue_groesse == 0 {
            return Err(RinglineError::konfiguration(
                "signaling.send_queue_groesse darf nicht 0 sein",
            ));
        }
        if s.verbindungs_timeout_sek <= s.keepalive_sek {
            return Err(RinglineError::konfiguration(
                "signaling.verbindungs_timeout_sek muss groesser als keepalive_sek sein",
            ));
        }
        if self.server.max_verbindungen == 0 {
            return Err(RinglineError::konfiguration(
                "server.max_verbindungen darf nicht 0 sein",
            ));
        }
        if !self.netzwerk.ws_pfad.starts_with('/') {
            return Err(RinglineError::konfiguration(format!(
                "netzwerk.ws_pfad muss mit '/' beginnen: '{}'",
                self.netzwerk.ws_pfad
            )));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(RinglineError::konfiguration(format!(
                "Unbekannter Log-Level '{}'",
                self.logging.level
            )));
        }
        if self.logging.format.parse::<LogFormat>().is_err() {
            return Err(RinglineError::konfiguration(format!(
                "Unbekanntes Log-Format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Baut die Laufzeit-Konfiguration fuer den Signaling-Service
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            ws_pfad: self.netzwerk.ws_pfad.clone(),
            max_verbindungen: self.server.max_verbindungen,
            send_queue_groesse: self.signaling.send_queue_groesse,
            klingel_timeout_sek: self.signaling.klingel_timeout_sek,
            keepalive_sek: self.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            schreib_timeout_ms: self.signaling.schreib_timeout_ms,
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer den WebSocket-Endpunkt zurueck
    pub fn ws_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.ws_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.server.max_verbindungen, 1024);
        assert_eq!(cfg.netzwerk.ws_port, 9980);
        assert_eq!(cfg.signaling.klingel_timeout_sek, 45);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ws_bind_adresse(), "0.0.0.0:9980");
        assert_eq!(cfg.observability_bind_adresse(), "0.0.0.0:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Test-Relay"
            max_verbindungen = 10

            [netzwerk]
            ws_port = 7000

            [signaling]
            klingel_timeout_sek = 20
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Test-Relay");
        assert_eq!(cfg.server.max_verbindungen, 10);
        assert_eq!(cfg.netzwerk.ws_port, 7000);
        assert_eq!(cfg.signaling.klingel_timeout_sek, 20);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.ws_pfad, "/ws");
        assert_eq!(cfg.signaling.keepalive_sek, 30);
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.server.max_verbindungen = 3;
        cfg.netzwerk.ws_pfad = "/signal".into();
        cfg.signaling.send_queue_groesse = 8;

        let signaling = cfg.signaling_config();
        assert_eq!(signaling.max_verbindungen, 3);
        assert_eq!(signaling.ws_pfad, "/signal");
        assert_eq!(signaling.send_queue_groesse, 8);
        assert_eq!(signaling.klingel_timeout_sek, 45);
    }

    #[test]
    fn null_timeout_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.signaling.klingel_timeout_sek = 0;
        let fehler = cfg.validieren().unwrap_err();
        assert!(matches!(fehler, RinglineError::Konfiguration(_)));
        assert!(fehler.to_string().contains("klingel_timeout_sek"));
    }

    #[test]
    fn timeout_kuerzer_als_keepalive_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.signaling.verbindungs_timeout_sek = 10;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn ungueltiges_logging_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "laut".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn ws_pfad_ohne_slash_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.ws_pfad = "ws".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/ringline.toml").unwrap();
        assert_eq!(cfg.netzwerk.ws_port, 9980);
    }
}
