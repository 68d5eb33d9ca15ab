//! Speech-Relay – dekodieren, extrahieren, weiterleiten: einmal pro Schluessel
//!
//! Transkription darf pro Schluessel nur EINE Engine-Sitzung pro Richtung
//! kosten, egal wie viele Verbindungen mithoeren. Das Relay ist deshalb
//! dieselbe ref-gezaehlte Registry-Form wie der Stream-Multiplexer: das
//! erste Transkript-Abo eines Schluessels startet die Relay-Aufgabe
//! (Roh-Tap -> Dekoder -> RTP-Extraktor -> Richtungs-Zuordnung ->
//! Audio-Weiterleiter), das letzte baut sie ab. Erkennungs-Ereignisse
//! beider Richtungen laufen als Transkript-Events in einen Broadcast,
//! den die Verbindungen anzapfen.

use chrono::Utc;
use horchposten_core::event::{EventTyp, TranskriptEvent};
use horchposten_core::types::StreamKey;
use horchposten_protocol::{paket_dekodieren, rtp_extrahieren};
use horchposten_speech::{
    richtung_bestimmen, AudioWeiterleiter, ErkennungsEreignis, Richtung, SpeechEngine,
    WeiterleiterKonfig,
};
use horchposten_stream::StreamMultiplexer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Kapazitaet des Transkript-Broadcasts pro Schluessel
const TRANSKRIPT_KAPAZITAET: usize = 256;
/// Kapazitaet der Erkennungs-Ereignis-Queue pro Richtung
const EREIGNIS_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// SpeechRelay
// ---------------------------------------------------------------------------

/// Ref-gezaehlte Relay-Registry, eine Relay-Aufgabe pro Schluessel
#[derive(Clone)]
pub struct SpeechRelay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    multiplexer: StreamMultiplexer,
    engine: Arc<dyn SpeechEngine>,
    konfig: WeiterleiterKonfig,
    eintraege: Mutex<HashMap<StreamKey, RelayEintrag>>,
    naechste_generation: AtomicU64,
}

struct RelayEintrag {
    ref_count: usize,
    tx: broadcast::Sender<TranskriptEvent>,
    abbruch_tx: watch::Sender<bool>,
    generation: u64,
}

impl SpeechRelay {
    /// Erstellt das Relay ueber Multiplexer und Engine
    pub fn neu(
        multiplexer: StreamMultiplexer,
        engine: Arc<dyn SpeechEngine>,
        konfig: WeiterleiterKonfig,
    ) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                multiplexer,
                engine,
                konfig,
                eintraege: Mutex::new(HashMap::new()),
                naechste_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Abonniert die Transkript-Ereignisse eines Schluessels
    ///
    /// Das erste Abo startet die Relay-Aufgabe, das letzte baut sie ab –
    /// dieselbe Lock-Disziplin wie im Stream-Multiplexer.
    pub fn abonnieren(&self, key: &StreamKey) -> TranskriptAbo {
        let mut eintraege = self.inner.eintraege.lock();

        if let Some(eintrag) = eintraege.get_mut(key) {
            eintrag.ref_count += 1;
            return TranskriptAbo {
                key: key.clone(),
                generation: eintrag.generation,
                rx: eintrag.tx.subscribe(),
                inner: Arc::clone(&self.inner),
            };
        }

        let (tx, rx) = broadcast::channel(TRANSKRIPT_KAPAZITAET);
        let (abbruch_tx, abbruch_rx) = watch::channel(false);
        let generation = self
            .inner
            .naechste_generation
            .fetch_add(1, Ordering::Relaxed);

        tokio::spawn(relay_aufgabe(
            Arc::clone(&self.inner),
            key.clone(),
            tx.clone(),
            abbruch_rx,
            generation,
        ));

        eintraege.insert(
            key.clone(),
            RelayEintrag {
                ref_count: 1,
                tx,
                abbruch_tx,
                generation,
            },
        );
        tracing::debug!(key = %key, generation, "Speech-Relay gestartet");

        TranskriptAbo {
            key: key.clone(),
            generation,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Anzahl aktiver Relay-Schluessel
    pub fn aktive_schluessel(&self) -> usize {
        self.inner.eintraege.lock().len()
    }
}

/// Relay-Aufgabe eines Schluessels
///
/// Laeuft bis zum Abbruch oder bis der geteilte Roh-Stream endet.
/// Beim Ende schliessen die Weiterleiter ihre Engine-Sitzungen ueber Drop.
async fn relay_aufgabe(
    inner: Arc<RelayInner>,
    key: StreamKey,
    transkript_tx: broadcast::Sender<TranskriptEvent>,
    mut abbruch_rx: watch::Receiver<bool>,
    generation: u64,
) {
    let mut abo = inner.multiplexer.abonnieren(&key);

    let (in_tx, in_rx) = mpsc::channel(EREIGNIS_QUEUE_GROESSE);
    let (out_tx, out_rx) = mpsc::channel(EREIGNIS_QUEUE_GROESSE);
    let mut nach_innen = AudioWeiterleiter::neu(
        Richtung::Eingehend,
        Arc::clone(&inner.engine),
        in_tx,
        inner.konfig.clone(),
    );
    let mut nach_aussen = AudioWeiterleiter::neu(
        Richtung::Ausgehend,
        Arc::clone(&inner.engine),
        out_tx,
        inner.konfig.clone(),
    );

    tokio::spawn(transkript_pumpe(
        EventTyp::SpeechIn,
        in_rx,
        transkript_tx.clone(),
    ));
    tokio::spawn(transkript_pumpe(
        EventTyp::SpeechOut,
        out_rx,
        transkript_tx.clone(),
    ));

    loop {
        tokio::select! {
            _ = abbruch_rx.changed() => {
                if *abbruch_rx.borrow() {
                    tracing::debug!(key = %key, "Speech-Relay abgebrochen");
                    break;
                }
            }
            eintrag = abo.empfangen() => match eintrag {
                Some(eintrag) => {
                    let event = paket_dekodieren(&eintrag);
                    let Some(extraktion) = rtp_extrahieren(&event.data) else {
                        continue;
                    };
                    let richtung = richtung_bestimmen(
                        &key,
                        event.data.layer_3_text("src_addr"),
                        event.data.layer_3_text("dst_addr"),
                    );
                    match richtung {
                        Some(Richtung::Eingehend) => {
                            nach_innen.weiterleiten(extraktion.sprach_nutzdaten);
                        }
                        Some(Richtung::Ausgehend) => {
                            nach_aussen.weiterleiten(extraktion.sprach_nutzdaten);
                        }
                        None => {
                            tracing::trace!(key = %key, "Keine Richtung zuordenbar");
                        }
                    }
                }
                None => {
                    tracing::debug!(key = %key, "Roh-Stream endete – Speech-Relay endet");
                    break;
                }
            }
        }
    }

    let mut eintraege = inner.eintraege.lock();
    if eintraege
        .get(&key)
        .is_some_and(|e| e.generation == generation)
    {
        eintraege.remove(&key);
        tracing::debug!(key = %key, generation, "Speech-Relay geraeumt");
    }
}

/// Hebt Erkennungs-Ereignisse einer Richtung zu Transkript-Events
async fn transkript_pumpe(
    typ: EventTyp,
    mut ereignisse: mpsc::Receiver<ErkennungsEreignis>,
    tx: broadcast::Sender<TranskriptEvent>,
) {
    while let Some(ereignis) = ereignisse.recv().await {
        let event = TranskriptEvent {
            event_typ: typ,
            timestamp: Utc::now().timestamp_millis().to_string(),
            data: ereignis.als_wert(),
        };
        // Kein Empfaenger ist transient – weiterpumpen
        let _ = tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// TranskriptAbo
// ---------------------------------------------------------------------------

/// Tap einer Verbindung auf die Transkript-Ereignisse eines Schluessels
pub struct TranskriptAbo {
    key: StreamKey,
    generation: u64,
    rx: broadcast::Receiver<TranskriptEvent>,
    inner: Arc<RelayInner>,
}

impl TranskriptAbo {
    /// Empfaengt das naechste Transkript-Event (`None` = Relay beendet)
    pub async fn empfangen(&mut self) -> Option<TranskriptEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(uebersprungen)) => {
                    tracing::warn!(
                        key = %self.key,
                        uebersprungen,
                        "Transkript-Abonnent zu langsam"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for TranskriptAbo {
    fn drop(&mut self) {
        let mut eintraege = self.inner.eintraege.lock();
        if let Some(eintrag) = eintraege.get_mut(&self.key) {
            if eintrag.generation != self.generation {
                return;
            }
            eintrag.ref_count -= 1;
            if eintrag.ref_count == 0 {
                let _ = eintrag.abbruch_tx.send(true);
                eintraege.remove(&self.key);
                tracing::debug!(key = %self.key, "Letztes Transkript-Abo weg – Relay wird abgebaut");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
