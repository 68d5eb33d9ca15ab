//! Geteilter Gateway-Zustand
//!
//! Wird als Axum-State an alle Handler gereicht. Clone teilt den inneren
//! Zustand (alles Arc-basiert).

use crate::pipeline::SpeechRelay;
use dashmap::DashMap;
use horchposten_core::types::StreamKey;
use horchposten_stream::{StreamMultiplexer, StreamStore};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Zustand des Gateways, geteilt ueber alle Verbindungen und Handler
#[derive(Clone)]
pub struct GatewayZustand {
    /// Geteilte Roh-Streams, ein Store-Leser pro Schluessel
    pub multiplexer: StreamMultiplexer,
    /// Ref-gezaehltes Speech-Relay pro Schluessel
    pub relay: SpeechRelay,
    /// Store-Zugang fuer die Abfrage-Endpunkte
    pub store: Arc<dyn StreamStore>,
    /// Ob die Spracherkennung ueberhaupt konfiguriert ist
    pub speech_aktiviert: bool,
    /// Prozessweites Shutdown-Signal (true = herunterfahren)
    pub shutdown: watch::Receiver<bool>,
    /// Offene Verbindungen (fuer Logging und Diagnose)
    pub verbindungen: Arc<DashMap<Uuid, StreamKey>>,
}

impl GatewayZustand {
    /// Anzahl aktuell offener Verbindungen
    pub fn verbindungs_anzahl(&self) -> usize {
        self.verbindungen.len()
    }
}
