//! Mock-Store fuer die Tests von Leser und Multiplexer
//!
//! Speist vorbereitete Chargen (oder Fehler) aus, blockiert wie der echte
//! Store wenn nichts vorliegt, und zaehlt geoeffnete Leser – die Grundlage
//! der Ein-Leser-pro-Schluessel-Pruefungen.

use crate::store::{SchluesselInfo, StoreLeser, StreamFehler, StreamStore};
use async_trait::async_trait;
use horchposten_core::types::{LeseCursor, RawStreamEntry, StreamKey};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Eine vorbereitete Store-Antwort
enum MockAntwort {
    Charge(Vec<RawStreamEntry>),
    Fehler,
}

struct MockInner {
    chargen: Mutex<VecDeque<MockAntwort>>,
    signal: Notify,
    geoeffnete_leser: AtomicUsize,
    parameter: Mutex<Vec<(u64, usize)>>,
}

/// Store-Attrappe mit einspeisbaren Chargen
#[derive(Clone)]
pub(crate) struct MockStore {
    inner: Arc<MockInner>,
}

impl MockStore {
    pub(crate) fn neu() -> Self {
        Self {
            inner: Arc::new(MockInner {
                chargen: Mutex::new(VecDeque::new()),
                signal: Notify::new(),
                geoeffnete_leser: AtomicUsize::new(0),
                parameter: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Speist eine Charge ein und weckt einen wartenden Leser
    pub(crate) fn charge_einspeisen(&self, eintraege: Vec<RawStreamEntry>) {
        self.inner
            .chargen
            .lock()
            .push_back(MockAntwort::Charge(eintraege));
        self.inner.signal.notify_one();
    }

    /// Speist einen terminalen Lesefehler ein
    pub(crate) fn fehler_einspeisen(&self) {
        self.inner.chargen.lock().push_back(MockAntwort::Fehler);
        self.inner.signal.notify_one();
    }

    /// Anzahl der bisher geoeffneten Leser
    pub(crate) fn geoeffnete_leser(&self) -> usize {
        self.inner.geoeffnete_leser.load(Ordering::SeqCst)
    }

    /// Aufgezeichnete (block_ms, anzahl)-Parameter aller Lesungen
    pub(crate) fn aufgezeichnete_parameter(&self) -> Vec<(u64, usize)> {
        self.inner.parameter.lock().clone()
    }
}

#[async_trait]
impl StreamStore for MockStore {
    async fn leser_oeffnen(&self) -> Result<Box<dyn StoreLeser>, StreamFehler> {
        self.inner.geoeffnete_leser.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockLeser {
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn schluessel_auflisten(&self) -> Result<Vec<SchluesselInfo>, StreamFehler> {
        Ok(Vec::new())
    }
}

struct MockLeser {
    inner: Arc<MockInner>,
}

#[async_trait]
impl StoreLeser for MockLeser {
    async fn tail_lesen(
        &mut self,
        _key: &StreamKey,
        _cursor: &LeseCursor,
        block_ms: u64,
        anzahl: usize,
    ) -> Result<Vec<RawStreamEntry>, StreamFehler> {
        self.inner.parameter.lock().push((block_ms, anzahl));
        loop {
            // Warte-Future vor der Pruefung anlegen, sonst geht ein
            // notify zwischen Pruefung und await verloren
            let geweckt = self.inner.signal.notified();
            if let Some(antwort) = self.inner.chargen.lock().pop_front() {
                return match antwort {
                    MockAntwort::Charge(eintraege) => Ok(eintraege),
                    MockAntwort::Fehler => {
                        Err(StreamFehler::Verbindung("Mock-Verbindung getrennt".into()))
                    }
                };
            }
            geweckt.await;
        }
    }
}
