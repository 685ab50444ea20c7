//! ringline-server – Bibliotheks-Root
//!
//! Verdrahtet Signaling-Relay, Metriken und Health-Check und stellt den
//! oeffentlichen Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use ringline_observability::{observability_server_starten, HealthState, RinglineMetrics};
use ringline_signaling::{SignalingServer, SignalingState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Signal-Handler fehlgeschlagen"),
            }
            let _ = shutdown_tx.send(true);
        });

        let ws_addr: SocketAddr = self
            .config
            .ws_bind_adresse()
            .parse()
            .context("Ungueltige WebSocket-Bind-Adresse")?;
        let listener = TcpListener::bind(ws_addr)
            .await
            .with_context(|| format!("WebSocket-Port {ws_addr} konnte nicht gebunden werden"))?;

        self.mit_listener(listener, shutdown_rx).await
    }

    /// Laeuft auf einem bereits gebundenen WebSocket-Listener bis `shutdown_rx` `true` wird
    ///
    /// Reihenfolge:
    /// 1. Metriken und Health-Zustand anlegen
    /// 2. Signaling-Zustand (Registry-Actor) starten
    /// 3. Observability-Server starten (falls aktiviert)
    /// 4. WebSocket-Listener bedienen
    pub async fn mit_listener(
        self,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let metriken = RinglineMetrics::neu().context("Metriken konnten nicht registriert werden")?;
        let health = HealthState::neu(metriken.clone());
        let state = SignalingState::neu(self.config.signaling_config(), metriken.clone());

        tracing::info!(
            name = %self.config.server.name,
            ws = %listener.local_addr()?,
            pfad = %self.config.netzwerk.ws_pfad,
            max_verbindungen = self.config.server.max_verbindungen,
            "Server startet"
        );

        tokio::spawn(presence_protokollieren(Arc::clone(&state), shutdown_rx.clone()));

        if self.config.observability.aktiviert {
            let obs_addr: SocketAddr = self
                .config
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Bind-Adresse")?;
            let obs_metriken = metriken.clone();
            let obs_health = health.clone();
            let obs_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    observability_server_starten(obs_addr, obs_metriken, obs_health, obs_shutdown)
                        .await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        health.bereit_setzen(true);
        let ergebnis = SignalingServer::neu(state).starten(listener, shutdown_rx).await;
        health.bereit_setzen(false);

        ergebnis.context("Signaling-Server fehlgeschlagen")?;
        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Protokolliert jede Aenderung der erreichbaren Benutzer
async fn presence_protokollieren(state: Arc<SignalingState>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut online_rx = state.presence.online_abonnieren();
    loop {
        tokio::select! {
            geaendert = online_rx.changed() => {
                if geaendert.is_err() {
                    break;
                }
                let anzahl = online_rx.borrow_and_update().len();
                tracing::debug!(
                    online = anzahl,
                    verbindungen = state.offene_verbindungen(),
                    anrufe = state.anrufe.aktive_anzahl(),
                    uptime_sek = state.uptime_sek(),
                    "Presence geaendert"
                );
            }
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
