//! WebSocket-Listener – HTTP-Upgrade und Verbindungsannahme
//!
//! Der `SignalingServer` stellt `GET <ws_pfad>?userId=<id>` bereit. Jede
//! angenommene Verbindung laeuft als eigener tokio-Task in einer
//! `ClientConnection`.
//!
//! Abgelehnte Handshakes werden erst upgegradet und dann sofort mit einem
//! Close-Code geschlossen, damit Browser-Clients den Grund sehen:
//! - `4400` ungueltige Benutzer-ID
//! - `1013` Server voll

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use ringline_core::UserId;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::connection::ClientConnection;
use crate::error::SignalingResult;
use crate::server_state::SignalingState;

/// Close-Code fuer ungueltige oder fehlende Benutzer-ID
pub const CLOSE_UNGUELTIGE_BENUTZER_ID: u16 = 4400;

/// Query-Parameter des Handshakes
#[derive(Debug, Deserialize)]
pub struct VerbindungsQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Clone)]
struct WsState {
    signaling: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Bedient Verbindungen auf dem gebundenen Listener
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(
        self,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            pfad = %self.state.config.ws_pfad,
            "WebSocket Signaling-Server gestartet"
        );

        let app = self.router(shutdown_rx.clone());
        let mut stopp_rx = shutdown_rx;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while stopp_rx.changed().await.is_ok() {
                if *stopp_rx.borrow() {
                    break;
                }
            }
        })
        .await?;

        tracing::info!("WebSocket Signaling-Server gestoppt");
        Ok(())
    }

    /// Router mit dem WebSocket-Endpunkt
    pub fn router(&self, shutdown_rx: watch::Receiver<bool>) -> Router {
        Router::new()
            .route(&self.state.config.ws_pfad, get(ws_upgrade))
            .layer(TraceLayer::new_for_http())
            .with_state(WsState {
                signaling: Arc::clone(&self.state),
                shutdown_rx,
            })
    }
}

/// `GET /ws?userId=<id>`
async fn ws_upgrade(
    State(ws_state): State<WsState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<VerbindungsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let roh = query.user_id.unwrap_or_default();
    let user_id = match UserId::parse(&roh) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(peer = %peer, fehler = %e, "Handshake mit ungueltiger Benutzer-ID");
            return ws.on_upgrade(|socket| {
                schliessen(socket, CLOSE_UNGUELTIGE_BENUTZER_ID, "Ungueltige Benutzer-ID")
            });
        }
    };

    ws.on_upgrade(move |socket| async move {
        let state = ws_state.signaling;
        if !state.verbindung_reservieren() {
            tracing::warn!(
                peer = %peer,
                max = state.config.max_verbindungen,
                "Server voll – Verbindung abgelehnt"
            );
            schliessen(socket, close_code::AGAIN, "Server voll").await;
            return;
        }

        let verbindung = ClientConnection::neu(Arc::clone(&state), user_id, peer);
        verbindung.verarbeiten(socket, ws_state.shutdown_rx).await;
        state.verbindung_freigeben();
    })
}

async fn schliessen(mut socket: WebSocket, code: u16, grund: &'static str) {
    let frame = CloseFrame {
        code,
        reason: grund.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
