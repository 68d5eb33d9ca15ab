//! Horchposten Server – Verdrahtung der Pipeline
//!
//! Baut aus der Konfiguration die Komponenten zusammen (Store,
//! Multiplexer, Speech-Relay, Gateway-Zustand), haengt den Axum-Router
//! mit WebSocket-, Abfrage- und Statik-Routen auf und faehrt bei
//! SIGINT/SIGTERM total herunter: das Shutdown-Signal schliesst jede
//! offene Verbindung, deren Taps fallen mit, und der Listener nimmt
//! nichts Neues mehr an.

pub mod config;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use config::ServerConfig;
use dashmap::DashMap;
use horchposten_gateway::rest::{api_router, gesundheit};
use horchposten_gateway::ws::ws_handler;
use horchposten_gateway::{GatewayZustand, SpeechRelay};
use horchposten_speech::{SpeechEngine, TcpSpeechEngine, WeiterleiterKonfig};
use horchposten_stream::{RedisStreamStore, StreamMultiplexer, StreamStore};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Der Horchposten-Server
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Erstellt den Server aus der geladenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Server und blockiert bis zum Shutdown
    pub async fn starten(self) -> Result<()> {
        let config = self.config;

        // Komponenten verdrahten
        let store: Arc<dyn StreamStore> = Arc::new(RedisStreamStore::neu(&config.store.url)?);
        let multiplexer = StreamMultiplexer::neu(Arc::clone(&store));

        let engine: Arc<dyn SpeechEngine> =
            Arc::new(TcpSpeechEngine::neu(config.speech.adresse.clone()));
        let relay = SpeechRelay::neu(
            multiplexer.clone(),
            engine,
            WeiterleiterKonfig {
                stille_schwelle: config.speech.stille_schwelle,
                stille_anzahl: config.speech.stille_anzahl,
            },
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let zustand = GatewayZustand {
            multiplexer,
            relay,
            store,
            speech_aktiviert: config.speech.aktiviert,
            shutdown: shutdown_rx,
            verbindungen: Arc::new(DashMap::new()),
        };

        // Router: WebSocket, Health, Abfragen, optional Statik
        let mut app = Router::new()
            .route(&config.netzwerk.ws_pfad, get(ws_handler))
            .route("/health", get(gesundheit))
            .nest("/api", api_router());
        if let Some(verzeichnis) = &config.statisch.verzeichnis {
            app = app.fallback_service(ServeDir::new(verzeichnis));
        }
        let app = app
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(zustand);

        let adresse = config.bind_adresse();
        let listener = tokio::net::TcpListener::bind(&adresse).await?;
        tracing::info!(
            name = %config.server.name,
            adresse = %adresse,
            ws_pfad = %config.netzwerk.ws_pfad,
            speech = config.speech.aktiviert,
            "Horchposten-Server gestartet"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_abwarten(shutdown_tx))
            .await?;

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Wartet auf SIGINT/SIGTERM und loest den prozessweiten Shutdown aus
async fn shutdown_abwarten(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("SIGINT-Handler muss installierbar sein");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM-Handler muss installierbar sein")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown-Signal empfangen – Verbindungen werden geschlossen");
    let _ = shutdown_tx.send(true);
}
