//! Message-Dispatcher – Routet Signaling-Nachrichten zum Ziel-Benutzer
//!
//! Der Dispatcher empfaengt Nachrichten von einer ClientConnection, sucht die
//! Ziel-Verbindung in der Registry und legt die passende Server-Nachricht in
//! deren Send-Queue. Antworten an den Absender (`user-offline`, `error`)
//! werden zurueckgegeben und von der Verbindung selbst verschickt.
//!
//! ## Reihenfolge der Pruefungen
//! 1. Semantische Validierung (leeres `to`, `null`-Payload, Selbstanruf)
//! 2. Erreichbarkeit des Ziels (sonst `user-offline`)
//! 3. Platz in der Ziel-Queue (sonst `user-offline`, Zustand unveraendert)
//! 4. Anruf-Zustandsautomat (sonst `error` mit passendem Code)
//!
//! `call-end` beendet die lokale Sitzung schon vor der Erreichbarkeitspruefung.

use ringline_core::{UserId, VerbindungsId};
use ringline_protocol::signaling::{
    AnrufAbgelehnt, AnrufAngenommen, EingehenderAnruf, IceKandidatWeiter,
};
use ringline_protocol::{ClientNachricht, EndeGrund, ErrorCode, ServerNachricht};
use std::sync::Arc;

use crate::anruf::{AnrufFehler, AnrufSitzung};
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Identitaet der aktuellen Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    /// Beim Handshake angegebene Benutzer-ID
    pub user_id: UserId,
    /// Handle der Verbindung (fuer das Abmelden)
    pub verbindung_id: VerbindungsId,
}

/// Zentraler Message-Dispatcher
#[derive(Clone)]
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet einen rohen Textframe
    ///
    /// Nicht lesbare Frames werden mit `error{INVALID_MESSAGE}` beantwortet,
    /// die Verbindung bleibt offen.
    pub async fn roh_verarbeiten(
        &self,
        text: &str,
        ctx: &DispatcherContext,
    ) -> Option<ServerNachricht> {
        match ClientNachricht::from_json(text) {
            Ok(nachricht) => self.dispatch(nachricht, ctx).await,
            Err(e) => Some(self.ungueltig(ctx, format!("Nachricht nicht lesbar: {e}"))),
        }
    }

    /// Verarbeitet eine eingehende Nachricht und gibt die Antwort an den Absender zurueck
    ///
    /// Gibt `None` zurueck wenn der Absender keine Antwort bekommt (Regelfall:
    /// die Nachricht wurde weitergeleitet).
    pub async fn dispatch(
        &self,
        nachricht: ClientNachricht,
        ctx: &DispatcherContext,
    ) -> Option<ServerNachricht> {
        let absender = &ctx.user_id;
        let art = nachricht.art();

        if let Err(e) = nachricht.validieren(absender) {
            return Some(self.ungueltig(ctx, e.to_string()));
        }

        if let ClientNachricht::CallEnd(ende) = &nachricht {
            if let Some(sitzung) = self.state.anrufe.beenden(absender, &ende.to) {
                tracing::info!(
                    anruf = %sitzung.id,
                    user_id = %absender,
                    gegenueber = %ende.to,
                    dauer_sek = sitzung.dauer_sek(),
                    "Anruf beendet"
                );
                self.state.anruf_gauge_aktualisieren();
            }
        }

        let ziel_id = nachricht.ziel().clone();
        let ziel = match self.state.registry.nachschlagen(&ziel_id).await {
            Ok(Some(ziel)) => ziel,
            Ok(None) => {
                self.state.metriken.unreachable_total.inc();
                tracing::debug!(
                    user_id = %absender,
                    ziel = %ziel_id,
                    art,
                    "Ziel nicht erreichbar"
                );
                return Some(ServerNachricht::offline(ziel_id));
            }
            Err(e) => {
                tracing::error!(user_id = %absender, fehler = %e, "Registry-Abfrage fehlgeschlagen");
                return None;
            }
        };

        // Erst Platz beim Ziel sichern, dann den Anrufzustand aendern. Ohne
        // Platz bleibt der Zustand unveraendert und der Absender erfaehrt es.
        let Some(platz) = ziel.reservieren() else {
            self.state.metriken.dropped_messages_total.inc();
            tracing::debug!(
                user_id = %absender,
                ziel = %ziel_id,
                art,
                "Ziel-Queue ohne Platz, Nachricht nicht zugestellt"
            );
            return Some(ServerNachricht::offline(ziel_id));
        };

        let (ausgehend, klingelnd) = match self.zustand_anwenden(nachricht, absender) {
            Ok(ergebnis) => ergebnis,
            Err(fehler) => {
                self.state.metriken.abgelehnt(fehler.metrik_grund());
                tracing::debug!(
                    user_id = %absender,
                    ziel = %ziel_id,
                    art,
                    fehler = %fehler,
                    "Nachricht passt nicht zum Anrufzustand"
                );
                return Some(ServerNachricht::error(fehler.code(), fehler.to_string()));
            }
        };
        self.state.anruf_gauge_aktualisieren();

        platz.send(ausgehend);
        self.state.metriken.weitergeleitet(art);
        tracing::debug!(user_id = %absender, ziel = %ziel_id, art, "Nachricht weitergeleitet");

        if let Some(sitzung) = klingelnd {
            self.klingel_timeout_starten(sitzung);
        }

        None
    }

    /// Prueft die Nachricht gegen den Anrufzustand und baut die weiterzuleitende Nachricht
    ///
    /// Bei `call-request` wird zusaetzlich die neue klingelnde Sitzung zurueckgegeben.
    fn zustand_anwenden(
        &self,
        nachricht: ClientNachricht,
        absender: &UserId,
    ) -> Result<(ServerNachricht, Option<AnrufSitzung>), AnrufFehler> {
        let anrufe = &self.state.anrufe;
        let from = absender.clone();

        match nachricht {
            ClientNachricht::CallRequest(anfrage) => {
                if &anfrage.from != absender {
                    tracing::warn!(
                        user_id = %absender,
                        behauptet = %anfrage.from,
                        "Abweichendes 'from' in call-request, wird ueberschrieben"
                    );
                }
                let sitzung = anrufe.anruf_starten(absender, &anfrage.to, anfrage.media_type)?;
                tracing::info!(
                    anruf = %sitzung.id,
                    anrufer = %absender,
                    angerufener = %anfrage.to,
                    medien = %anfrage.media_type,
                    "Anruf klingelt"
                );
                let ausgehend = ServerNachricht::IncomingCall(EingehenderAnruf {
                    from,
                    from_display_name: anfrage.from_display_name,
                    media_type: anfrage.media_type,
                    session_offer: anfrage.session_offer,
                });
                Ok((ausgehend, Some(sitzung)))
            }
            ClientNachricht::CallAccept(annahme) => {
                let sitzung = anrufe.annehmen(absender, &annahme.to)?;
                tracing::info!(
                    anruf = %sitzung.id,
                    medien = %sitzung.medien_typ,
                    klingelte_sek = sitzung.dauer_sek(),
                    "Anruf angenommen"
                );
                let ausgehend = ServerNachricht::CallAccepted(AnrufAngenommen {
                    from,
                    session_answer: annahme.session_answer,
                });
                Ok((ausgehend, None))
            }
            ClientNachricht::CallReject(ablehnung) => {
                let sitzung = anrufe.ablehnen(absender, &ablehnung.to)?;
                tracing::info!(anruf = %sitzung.id, "Anruf abgelehnt");
                Ok((ServerNachricht::CallRejected(AnrufAbgelehnt { from }), None))
            }
            ClientNachricht::IceCandidate(kandidat) => {
                anrufe.kandidat_pruefen(absender, &kandidat.to)?;
                let ausgehend = ServerNachricht::IceCandidate(IceKandidatWeiter {
                    from,
                    candidate: kandidat.candidate,
                });
                Ok((ausgehend, None))
            }
            // Sitzung wurde bereits vor der Erreichbarkeitspruefung beendet
            ClientNachricht::CallEnd(_) => Ok((ServerNachricht::beendet(from, None), None)),
        }
    }

    /// Startet den Klingel-Timer fuer eine neue Sitzung
    fn klingel_timeout_starten(&self, sitzung: AnrufSitzung) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(state.config.klingel_timeout()).await;

            let Some(beendet) = state.anrufe.zeitueberschreitung(&sitzung) else {
                return;
            };
            state.metriken.call_timeouts_total.inc();
            state.anruf_gauge_aktualisieren();
            tracing::info!(
                anruf = %beendet.id,
                anrufer = %beendet.anrufer,
                angerufener = %beendet.angerufener,
                "Anruf nicht angenommen – Klingel-Timeout"
            );

            let grund = Some(EndeGrund::Timeout);
            an_benutzer_senden(
                &state,
                &beendet.anrufer,
                ServerNachricht::beendet(beendet.angerufener.clone(), grund),
            )
            .await;
            an_benutzer_senden(
                &state,
                &beendet.angerufener,
                ServerNachricht::beendet(beendet.anrufer.clone(), grund),
            )
            .await;
        });
    }

    /// Bereinigt Registry und Anrufe wenn eine Verbindung getrennt wird
    ///
    /// Wird genau einmal pro Verbindung aufgerufen. Laufende Anrufe werden nur
    /// beendet wenn diese Verbindung noch der aktuelle Registry-Eintrag war,
    /// und nur solche die vor dem Abmelden begonnen haben.
    pub async fn client_cleanup(&self, ctx: &DispatcherContext) {
        let getrennt_um = chrono::Utc::now();
        let user_id = match self.state.registry.abmelden(ctx.verbindung_id).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                tracing::debug!(
                    user_id = %ctx.user_id,
                    verbindung = %ctx.verbindung_id,
                    "Ersetzte Verbindung getrennt, Registry unveraendert"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(user_id = %ctx.user_id, fehler = %e, "Abmelden fehlgeschlagen");
                return;
            }
        };

        let beendet = self.state.anrufe.alle_beenden_fuer(&user_id, getrennt_um);
        if !beendet.is_empty() {
            self.state.anruf_gauge_aktualisieren();
        }
        for sitzung in beendet {
            let gegenueber = sitzung.gegenueber(&user_id);
            tracing::info!(
                anruf = %sitzung.id,
                user_id = %user_id,
                gegenueber = %gegenueber,
                medien = %sitzung.medien_typ,
                dauer_sek = sitzung.dauer_sek(),
                "Anruf durch Verbindungsabbruch beendet"
            );
            an_benutzer_senden(
                &self.state,
                gegenueber,
                ServerNachricht::beendet(user_id.clone(), Some(EndeGrund::Disconnected)),
            )
            .await;
        }

        tracing::debug!(user_id = %user_id, "Client-Ressourcen bereinigt");
    }

    fn ungueltig(&self, ctx: &DispatcherContext, grund: String) -> ServerNachricht {
        self.state.metriken.abgelehnt("invalid_message");
        tracing::debug!(user_id = %ctx.user_id, grund = %grund, "Ungueltige Nachricht verworfen");
        ServerNachricht::error(ErrorCode::InvalidMessage, grund)
    }
}

/// Sendet eine vom Relay erzeugte Nachricht an einen Benutzer, falls erreichbar
async fn an_benutzer_senden(state: &SignalingState, user_id: &UserId, nachricht: ServerNachricht) {
    match state.registry.nachschlagen(user_id).await {
        Ok(Some(ziel)) => {
            if !ziel.senden(nachricht) {
                state.metriken.dropped_messages_total.inc();
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(user_id = %user_id, fehler = %e, "Registry-Abfrage fehlgeschlagen"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
