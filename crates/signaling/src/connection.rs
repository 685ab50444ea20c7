//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Eine einzige Select-Schleife verarbeitet eingehende Frames,
//! die Send-Queue, den Keepalive und das Shutdown-Signal.
//!
//! ## Lebenszyklus
//! ```text
//! Upgrade -> registrieren -> Schleife -> client_cleanup (genau einmal)
//! ```
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen WebSocket-Ping
//! - Kommt `verbindungs_timeout_sek` lang kein Frame, wird getrennt

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use ringline_core::UserId;
use ringline_protocol::ServerNachricht;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::broadcast::ClientSender;
use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

/// Eine einzelne Client-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    sender: ClientSender,
    sende_rx: mpsc::Receiver<ServerNachricht>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue Verbindung samt Send-Queue
    pub fn neu(state: Arc<SignalingState>, user_id: UserId, peer_addr: SocketAddr) -> Self {
        let (sender, sende_rx) = ClientSender::neu(user_id, state.config.send_queue_groesse);
        Self {
            state,
            sender,
            sende_rx,
            peer_addr,
        }
    }

    /// Verarbeitet die Verbindung bis zum Trennen oder Shutdown
    pub async fn verarbeiten(mut self, mut socket: WebSocket, mut shutdown_rx: watch::Receiver<bool>) {
        let peer = self.peer_addr;
        let ctx = DispatcherContext {
            user_id: self.sender.user_id.clone(),
            verbindung_id: self.sender.verbindung_id,
        };
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        if *shutdown_rx.borrow() {
            return;
        }

        match self.state.registry.registrieren(self.sender.clone()).await {
            Ok(Some(ersetzt)) => tracing::info!(
                peer = %peer,
                user_id = %ctx.user_id,
                ersetzt = %ersetzt.verbindung_id,
                "Benutzer neu registriert, vorherige Verbindung ersetzt"
            ),
            Ok(None) => tracing::info!(peer = %peer, user_id = %ctx.user_id, "Neue Verbindung"),
            Err(e) => {
                tracing::error!(peer = %peer, fehler = %e, "Registrierung fehlgeschlagen");
                return;
            }
        }

        let keepalive = self.state.config.keepalive();
        let timeout_dauer = self.state.config.verbindungs_timeout();
        let mut letzter_empfang = Instant::now();
        let mut ping_takt = tokio::time::interval_at(Instant::now() + keepalive, keepalive);

        loop {
            tokio::select! {
                // Eingehender Frame vom Client
                frame = socket.recv() => {
                    let nachricht = match frame {
                        Some(Ok(nachricht)) => nachricht,
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer, user_id = %ctx.user_id, "Verbindung vom Client getrennt");
                            break;
                        }
                    };
                    letzter_empfang = Instant::now();

                    match nachricht {
                        Message::Text(text) => {
                            tracing::trace!(peer = %peer, laenge = text.len(), "Nachricht empfangen");
                            if let Some(antwort) = dispatcher.roh_verarbeiten(&text, &ctx).await {
                                // Antworten laufen durch dieselbe FIFO-Queue
                                if !self.sender.senden(antwort) {
                                    self.state.metriken.dropped_messages_total.inc();
                                }
                            }
                        }
                        Message::Binary(daten) => {
                            tracing::debug!(peer = %peer, laenge = daten.len(), "Binaerframe ignoriert");
                        }
                        Message::Ping(_) | Message::Pong(_) => {}
                        Message::Close(_) => {
                            tracing::info!(peer = %peer, user_id = %ctx.user_id, "Close-Frame empfangen");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                Some(ausgehend) = self.sende_rx.recv() => {
                    if let Err(e) = self.nachricht_schreiben(&mut socket, &ausgehend).await {
                        tracing::warn!(peer = %peer, fehler = %e, "Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping und Inaktivitaets-Timeout
                _ = ping_takt.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        tracing::warn!(peer = %peer, user_id = %ctx.user_id, "Verbindungs-Timeout");
                        break;
                    }
                    if let Err(e) = self.schreiben(&mut socket, Message::Ping(Vec::new())).await {
                        tracing::warn!(peer = %peer, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = Message::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: "Server wird heruntergefahren".into(),
                        }));
                        let _ = self.schreiben(&mut socket, abschied).await;
                        break;
                    }
                }
            }
        }

        dispatcher.client_cleanup(&ctx).await;

        let dauer = chrono::Utc::now() - self.sender.verbunden_seit;
        tracing::info!(
            peer = %peer,
            user_id = %ctx.user_id,
            dauer_sek = dauer.num_seconds(),
            "Verbindungs-Task beendet"
        );
    }

    async fn nachricht_schreiben(
        &self,
        socket: &mut WebSocket,
        nachricht: &ServerNachricht,
    ) -> SignalingResult<()> {
        let json = nachricht.to_json()?;
        self.schreiben(socket, Message::Text(json)).await
    }

    /// Schreibt einen Frame mit Schreib-Timeout
    async fn schreiben(&self, socket: &mut WebSocket, nachricht: Message) -> SignalingResult<()> {
        match tokio::time::timeout(self.state.config.schreib_timeout(), socket.send(nachricht)).await {
            Ok(ergebnis) => Ok(ergebnis?),
            Err(_) => Err(SignalingError::Timeout),
        }
    }
}
