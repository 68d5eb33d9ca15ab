//! REST-Abfrage-Endpunkte
//!
//! Schmaler Abfrage-Rand neben dem WebSocket: Health-Check und die
//! Schluessel-Liste des Stores (Name + Store-Typ, case-insensitiv
//! sortiert). Antwort-Huelle: `{ timestamp, error, data }`.

use crate::zustand::GatewayZustand;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use horchposten_stream::SchluesselInfo;

/// Router der Abfrage-Endpunkte (unter `/api`)
pub fn api_router() -> Router<GatewayZustand> {
    Router::new().route("/keys", get(schluessel_auflisten))
}

/// GET /health – Health-Check-Endpunkt
pub async fn gesundheit() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// GET /api/keys – alle Store-Schluessel samt Typ
async fn schluessel_auflisten(State(zustand): State<GatewayZustand>) -> impl IntoResponse {
    let zeitstempel = chrono::Utc::now().timestamp_millis();
    match zustand.store.schluessel_auflisten().await {
        Ok(mut infos) => {
            schluessel_sortieren(&mut infos);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "timestamp": zeitstempel,
                    "error": null,
                    "data": infos,
                })),
            )
        }
        Err(fehler) => {
            tracing::warn!(fehler = %fehler, "Schluessel-Liste nicht abrufbar");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "timestamp": zeitstempel,
                    "error": fehler.to_string(),
                    "data": null,
                })),
            )
        }
    }
}

/// Sortiert case-insensitiv nach Schluesselnamen
fn schluessel_sortieren(infos: &mut [SchluesselInfo]) {
    infos.sort_by(|a, b| a.key.to_lowercase().cmp(&b.key.to_lowercase()));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
