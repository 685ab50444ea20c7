//! Integration-Tests fuer das Signaling-Relay (echter Server, echte WebSockets)

use futures_util::{SinkExt, StreamExt};
use ringline_observability::RinglineMetrics;
use ringline_signaling::{SignalingConfig, SignalingServer, SignalingState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WARTEZEIT: Duration = Duration::from_secs(5);

struct TestServer {
    adresse: SocketAddr,
    state: Arc<SignalingState>,
    shutdown_tx: watch::Sender<bool>,
}

async fn server_starten(config: SignalingConfig) -> TestServer {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Listener konnte nicht gebunden werden");
    let adresse = listener.local_addr().unwrap();
    let state = SignalingState::neu(config, RinglineMetrics::neu().unwrap());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(SignalingServer::neu(Arc::clone(&state)).starten(listener, shutdown_rx));

    TestServer {
        adresse,
        state,
        shutdown_tx,
    }
}

async fn verbinden_roh(server: &TestServer, query: &str) -> Client {
    let url = format!("ws://{}/ws{}", server.adresse, query);
    let (client, _) = connect_async(url)
        .await
        .expect("WebSocket-Handshake fehlgeschlagen");
    client
}

/// Verbindet und wartet bis der eigene Benutzer in `online-users` auftaucht
async fn verbinden(server: &TestServer, user_id: &str) -> Client {
    let mut client = verbinden_roh(server, &format!("?userId={user_id}")).await;
    loop {
        let nachricht = empfangen_art(&mut client, "online-users").await;
        if nachricht["users"]
            .as_array()
            .is_some_and(|users| users.iter().any(|u| u == user_id))
        {
            return client;
        }
    }
}

async fn senden(client: &mut Client, nachricht: Value) {
    client
        .send(Message::Text(nachricht.to_string()))
        .await
        .expect("Senden fehlgeschlagen");
}

/// Naechster JSON-Textframe
async fn empfangen(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(WARTEZEIT, client.next())
            .await
            .expect("Keine Nachricht innerhalb der Wartezeit")
            .expect("Verbindung geschlossen")
            .expect("Lesefehler");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            andere => panic!("Unerwarteter Frame: {andere:?}"),
        }
    }
}

/// Naechste Nachricht der gewuenschten Art, andere werden uebersprungen
async fn empfangen_art(client: &mut Client, art: &str) -> Value {
    loop {
        let nachricht = empfangen(client).await;
        if nachricht["type"] == art {
            return nachricht;
        }
    }
}

/// Wartet auf einen Close-Frame und gibt dessen Code zurueck
async fn close_code(client: &mut Client) -> Option<u16> {
    loop {
        let frame = tokio::time::timeout(WARTEZEIT, client.next())
            .await
            .expect("Kein Close innerhalb der Wartezeit");
        match frame {
            Some(Ok(Message::Close(Some(close)))) => return Some(close.code.into()),
            Some(Ok(Message::Close(None))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

fn anruf_anfrage(to: &str, from: &str) -> Value {
    json!({
        "type": "call-request",
        "to": to,
        "from": from,
        "fromDisplayName": "Alice",
        "mediaType": "video",
        "sessionOffer": {"type": "offer", "sdp": "O"}
    })
}

#[tokio::test]
async fn beispiel_szenario_offer_answer_trennen() {
    let server = server_starten(SignalingConfig::default()).await;

    let mut u1 = verbinden(&server, "u1").await;
    let mut u2 = verbinden(&server, "u2").await;

    let presence = empfangen_art(&mut u1, "online-users").await;
    assert_eq!(presence["users"], json!(["u1", "u2"]));

    senden(&mut u1, anruf_anfrage("u2", "u1")).await;
    let eingehend = empfangen_art(&mut u2, "incoming-call").await;
    assert_eq!(eingehend["from"], "u1");
    assert_eq!(eingehend["fromDisplayName"], "Alice");
    assert_eq!(eingehend["mediaType"], "video");
    assert_eq!(eingehend["sessionOffer"], json!({"type": "offer", "sdp": "O"}));

    senden(
        &mut u2,
        json!({"type": "call-accept", "to": "u1", "sessionAnswer": {"type": "answer", "sdp": "A"}}),
    )
    .await;
    let angenommen = empfangen_art(&mut u1, "call-accepted").await;
    assert_eq!(angenommen["from"], "u2");
    assert_eq!(angenommen["sessionAnswer"], json!({"type": "answer", "sdp": "A"}));

    u2.close(None).await.unwrap();

    let presence = empfangen_art(&mut u1, "online-users").await;
    assert_eq!(presence["users"], json!(["u1"]));
    let beendet = empfangen_art(&mut u1, "call-ended").await;
    assert_eq!(beendet["from"], "u2");
    assert_eq!(beendet["reason"], "disconnected");

    // Spaetere Nachrichten an u2 ergeben user-offline
    senden(&mut u1, json!({"type": "call-end", "to": "u2"})).await;
    let offline = empfangen_art(&mut u1, "user-offline").await;
    assert_eq!(offline["userId"], "u2");
}

#[tokio::test]
async fn unbekanntes_ziel_ergibt_user_offline() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut u1 = verbinden(&server, "u1").await;

    senden(&mut u1, anruf_anfrage("u9", "u1")).await;
    let antwort = empfangen(&mut u1).await;
    assert_eq!(antwort, json!({"type": "user-offline", "userId": "u9"}));
    assert_eq!(server.state.metriken.unreachable_total.get(), 1);
}

#[tokio::test]
async fn kaputter_frame_ergibt_fehler_und_verbindung_bleibt_offen() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut u1 = verbinden(&server, "u1").await;

    senden(&mut u1, json!({"type": "call-hold", "to": "u2"})).await;
    let fehler = empfangen(&mut u1).await;
    assert_eq!(fehler["type"], "error");
    assert_eq!(fehler["code"], "INVALID_MESSAGE");

    u1.send(Message::Text("{kaputt".into())).await.unwrap();
    let fehler = empfangen(&mut u1).await;
    assert_eq!(fehler["code"], "INVALID_MESSAGE");

    // Binaerframes werden ignoriert
    u1.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

    senden(&mut u1, anruf_anfrage("u9", "u1")).await;
    let antwort = empfangen(&mut u1).await;
    assert_eq!(antwort["type"], "user-offline");
}

#[tokio::test]
async fn ice_kandidat_nur_an_exaktes_ziel() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut u1 = verbinden(&server, "u1").await;
    let mut u2 = verbinden(&server, "u2").await;
    let mut u3 = verbinden(&server, "u3").await;

    senden(&mut u1, anruf_anfrage("u2", "u1")).await;
    empfangen_art(&mut u2, "incoming-call").await;

    senden(
        &mut u1,
        json!({"type": "ice-candidate", "to": "u2", "candidate": {"candidate": "c1"}}),
    )
    .await;
    let kandidat = empfangen_art(&mut u2, "ice-candidate").await;
    assert_eq!(kandidat["from"], "u1");
    assert_eq!(kandidat["candidate"], json!({"candidate": "c1"}));

    // u3 sieht bis zum call-end von u2 nur Presence
    senden(&mut u2, json!({"type": "call-end", "to": "u3"})).await;
    loop {
        let nachricht = empfangen(&mut u3).await;
        if nachricht["type"] == "call-ended" {
            assert_eq!(nachricht["from"], "u2");
            break;
        }
        assert_eq!(nachricht["type"], "online-users");
    }
}

#[tokio::test]
async fn ungueltige_benutzer_id_wird_mit_4400_geschlossen() {
    let server = server_starten(SignalingConfig::default()).await;

    let mut ohne_id = verbinden_roh(&server, "").await;
    assert_eq!(close_code(&mut ohne_id).await, Some(4400));

    let mut leer = verbinden_roh(&server, "?userId=").await;
    assert_eq!(close_code(&mut leer).await, Some(4400));
}

#[tokio::test]
async fn voller_server_schliesst_mit_1013() {
    let config = SignalingConfig {
        max_verbindungen: 1,
        ..Default::default()
    };
    let server = server_starten(config).await;

    let _u1 = verbinden(&server, "u1").await;
    let mut u2 = verbinden_roh(&server, "?userId=u2").await;
    assert_eq!(close_code(&mut u2).await, Some(1013));
    assert_eq!(server.state.registry.schnappschuss().await.unwrap().len(), 1);
}

#[tokio::test]
async fn ersetzte_verbindung_laesst_neue_bestehen() {
    let server = server_starten(SignalingConfig::default()).await;

    let mut alt = verbinden(&server, "u1").await;
    let mut neu = verbinden(&server, "u1").await;
    let mut u2 = verbinden(&server, "u2").await;

    alt.close(None).await.unwrap();
    // Auf das Ende der alten Verbindung warten
    while alt.next().await.is_some() {}

    senden(&mut u2, json!({"type": "call-end", "to": "u1"})).await;
    let beendet = empfangen_art(&mut neu, "call-ended").await;
    assert_eq!(beendet["from"], "u2");

    let online = server.state.registry.schnappschuss().await.unwrap();
    let namen: Vec<&str> = online.iter().map(|u| u.as_str()).collect();
    assert_eq!(namen, vec!["u1", "u2"]);
}

#[tokio::test]
async fn shutdown_schliesst_verbindungen_mit_1001() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut u1 = verbinden(&server, "u1").await;

    server.shutdown_tx.send(true).unwrap();
    assert_eq!(close_code(&mut u1).await, Some(1001));
}

#[tokio::test]
async fn unbeantworteter_anruf_endet_mit_timeout() {
    let config = SignalingConfig {
        klingel_timeout_sek: 1,
        ..Default::default()
    };
    let server = server_starten(config).await;
    let mut u1 = verbinden(&server, "u1").await;
    let mut u2 = verbinden(&server, "u2").await;

    senden(&mut u1, anruf_anfrage("u2", "u1")).await;
    empfangen_art(&mut u2, "incoming-call").await;

    let beim_anrufer = empfangen_art(&mut u1, "call-ended").await;
    assert_eq!(beim_anrufer["from"], "u2");
    assert_eq!(beim_anrufer["reason"], "timeout");

    let beim_angerufenen = empfangen_art(&mut u2, "call-ended").await;
    assert_eq!(beim_angerufenen["from"], "u1");
    assert_eq!(beim_angerufenen["reason"], "timeout");

    assert_eq!(server.state.metriken.call_timeouts_total.get(), 1);

    // Nach dem Timeout ist ein neuer Anruf moeglich
    senden(&mut u1, anruf_anfrage("u2", "u1")).await;
    empfangen_art(&mut u2, "incoming-call").await;
}

/// Liest bis `online-users` genau die erwarteten Benutzer enthaelt
async fn warten_auf_online(client: &mut Client, erwartet: Value) {
    loop {
        let presence = empfangen_art(client, "online-users").await;
        if presence["users"] == erwartet {
            return;
        }
    }
}

#[tokio::test]
async fn stummer_client_faellt_nach_inaktivitaet_raus() {
    let config = SignalingConfig {
        keepalive_sek: 1,
        verbindungs_timeout_sek: 2,
        ..Default::default()
    };
    let server = server_starten(config).await;
    let mut u1 = verbinden(&server, "u1").await;
    // u2 liest nach dem Handshake nicht mehr und beantwortet keine Pings
    let _stumm = verbinden(&server, "u2").await;

    warten_auf_online(&mut u1, json!(["u1", "u2"])).await;
    warten_auf_online(&mut u1, json!(["u1"])).await;

    senden(&mut u1, anruf_anfrage("u2", "u1")).await;
    let offline = empfangen_art(&mut u1, "user-offline").await;
    assert_eq!(offline["userId"], "u2");
    assert_eq!(server.state.anrufe.aktive_anzahl(), 0);
}

#[tokio::test]
async fn blockierendes_schreiben_trennt_nach_schreib_timeout() {
    let config = SignalingConfig {
        schreib_timeout_ms: 200,
        ..Default::default()
    };
    let server = server_starten(config).await;
    let mut u1 = verbinden(&server, "u1").await;
    // u2 liest nicht, die Socket-Puffer laufen voll
    let _stumm = verbinden(&server, "u2").await;

    senden(&mut u1, anruf_anfrage("u2", "u1")).await;

    let gross = "x".repeat(512 * 1024);
    for _ in 0..96 {
        senden(
            &mut u1,
            json!({"type": "ice-candidate", "to": "u2", "candidate": {"candidate": gross}}),
        )
        .await;
    }

    warten_auf_online(&mut u1, json!(["u1"])).await;
    let beendet = empfangen_art(&mut u1, "call-ended").await;
    assert_eq!(beendet["from"], "u2");
    assert_eq!(beendet["reason"], "disconnected");
    assert_eq!(server.state.anrufe.aktive_anzahl(), 0);
}
