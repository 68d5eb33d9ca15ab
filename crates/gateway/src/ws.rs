//! WebSocket-Endpunkt – ein Tap pro Verbindung auf den geteilten Stream
//!
//! Pro Verbindung laeuft eine Select-Schleife ueber vier Quellen:
//! Roh-Eintraege des geteilten Streams, Transkript-Ereignisse (falls
//! abonniert), eingehende Socket-Nachrichten (nur Close ist relevant)
//! und das prozessweite Shutdown-Signal. Schliesst der Socket, faellt
//! nur der eigene Tap weg; der geteilte Stream lebt solange irgendein
//! Tap bleibt. Beim Shutdown schliesst jede Schleife ihren Socket selbst.

use crate::verbindung::{nachricht_bauen, ClientSitzung};
use crate::zustand::GatewayZustand;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use horchposten_core::event::LiveEvent;
use horchposten_protocol::{paket_dekodieren, rtp_extrahieren};
use std::collections::HashMap;

/// GET-Handler fuer den WebSocket-Upgrade
pub async fn ws_handler(
    State(zustand): State<GatewayZustand>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| verbindung_behandeln(socket, params, zustand))
}

/// Lebenszyklus einer einzelnen Verbindung
async fn verbindung_behandeln(
    mut socket: WebSocket,
    params: HashMap<String, String>,
    zustand: GatewayZustand,
) {
    // Pflicht-Parameter pruefen: ohne key sofortige Trennung,
    // es wird nie ein Ereignis gesendet
    let Some(mut sitzung) = ClientSitzung::aus_abfrage(&params) else {
        tracing::info!("Verbindung ohne key-Parameter – sofort getrennt");
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let mut abo = zustand.multiplexer.abonnieren(&sitzung.key);

    let mut transkript_abo = if sitzung.parse.transkription && zustand.speech_aktiviert {
        Some(zustand.relay.abonnieren(&sitzung.key))
    } else {
        if sitzung.parse.transkription {
            tracing::warn!(
                verbindung = %sitzung.id,
                "Transkription angefragt, aber keine Engine konfiguriert"
            );
        }
        None
    };

    sitzung.aktivieren();
    zustand.verbindungen.insert(sitzung.id, sitzung.key.clone());
    let mut shutdown_rx = zustand.shutdown.clone();

    loop {
        tokio::select! {
            // Roh-Eintrag des geteilten Streams
            eintrag = abo.empfangen() => match eintrag {
                Some(eintrag) => {
                    let mut event = paket_dekodieren(&eintrag);
                    if sitzung.parse.rtp {
                        if let Some(extraktion) = rtp_extrahieren(&event.data) {
                            event.data.rtp = Some(extraktion.kopf);
                        }
                    }
                    let text = nachricht_bauen(&LiveEvent::Paket(event), &sitzung.filter);
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Geteilter Stream endete (Store-Fehler): Verbindung schliessen
                None => {
                    tracing::debug!(verbindung = %sitzung.id, "Stream endete");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },

            // Transkript-Ereignis, falls abonniert
            transkript = async {
                transkript_abo
                    .as_mut()
                    .expect("Branch nur aktiv wenn Abo existiert")
                    .empfangen()
                    .await
            }, if transkript_abo.is_some() => match transkript {
                Some(event) => {
                    let text = nachricht_bauen(&LiveEvent::Transkript(event), &sitzung.filter);
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Relay endete; Paket-Events laufen weiter
                None => transkript_abo = None,
            },

            // Eingehende Socket-Nachrichten: nur Close ist relevant
            nachricht = socket.recv() => match nachricht {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(fehler)) => {
                    tracing::debug!(verbindung = %sitzung.id, fehler = %fehler, "Socket-Fehler");
                    break;
                }
            },

            // Prozessweites Shutdown: Socket schliessen, Tap faellt mit
            // (ein geschlossener Kanal zaehlt ebenfalls als Shutdown)
            ergebnis = shutdown_rx.changed() => {
                if ergebnis.is_err() || *shutdown_rx.borrow() {
                    tracing::info!(verbindung = %sitzung.id, "Shutdown – Verbindung wird geschlossen");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    // Drop von abo/transkript_abo entfernt genau die eigenen Taps
    zustand.verbindungen.remove(&sitzung.id);
    sitzung.schliessen();
}
