//! Stream-Multiplexer – ref-gezaehlte, geteilte Live-Streams pro Schluessel
//!
//! Kernstueck der Ressourcen-Teilung: N Abonnenten desselben Schluessels
//! kosten genau einen Store-Leser. Das erste Abo eines Schluessels startet
//! den Leser, das letzte abgebrochene Abo baut ihn ab und raeumt den
//! Registry-Eintrag – ein spaeterer Abonnent beginnt frisch am Tail statt
//! Historie nachzuspielen (rein "heisse" Semantik, keine Pufferung fuer
//! zukuenftige Abonnenten).
//!
//! ## Lock-Disziplin
//! Die gesamte Lebenszyklus-Verwaltung (Anlegen, Ref-Zaehlen, Abbau,
//! Raeumen) laeuft unter genau einem Mutex ueber der Schluessel-Registry.
//! Dadurch ist das Anlegen atomar gegenueber konkurrierenden Erst-Abos,
//! und ein Abo zum Zeitpunkt des letzten Abbruchs sieht nie einen halb
//! abgebauten Eintrag: Dekrement auf null, Abbruch-Signal und Raeumen sind
//! eine kritische Sektion. Ein Generationszaehler verhindert, dass eine
//! endende Lese-Aufgabe den Eintrag eines Nachfolgers raeumt.

use crate::leser::CursorLeser;
use crate::store::StreamStore;
use horchposten_core::types::{LeseCursor, RawStreamEntry, StreamKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Kapazitaet des Broadcast-Kanals pro Schluessel
const KANAL_KAPAZITAET: usize = 1024;

// ---------------------------------------------------------------------------
// StreamMultiplexer
// ---------------------------------------------------------------------------

/// Ref-gezaehlter Cache geteilter Live-Streams, ein Leser pro Schluessel
///
/// Thread-safe via Arc; Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct StreamMultiplexer {
    inner: Arc<MuxInner>,
}

struct MuxInner {
    store: Arc<dyn StreamStore>,
    eintraege: Mutex<HashMap<StreamKey, KeyEintrag>>,
    /// Zaehler aller je gestarteten Leser (Pruefstein der Tests)
    gestartete_leser: AtomicU64,
    naechste_generation: AtomicU64,
}

/// Registry-Eintrag eines aktiven Schluessels
struct KeyEintrag {
    ref_count: usize,
    tx: broadcast::Sender<Arc<RawStreamEntry>>,
    abbruch_tx: watch::Sender<bool>,
    generation: u64,
}

impl StreamMultiplexer {
    /// Erstellt einen neuen Multiplexer ueber dem gegebenen Store
    pub fn neu(store: Arc<dyn StreamStore>) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                store,
                eintraege: Mutex::new(HashMap::new()),
                gestartete_leser: AtomicU64::new(0),
                naechste_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Abonniert den geteilten Live-Stream eines Schluessels
    ///
    /// Das erste Abo startet den Leser am Tail; jedes weitere haengt sich
    /// an den laufenden Stream. Der Rueckgabewert ist der Tap dieses
    /// Abonnenten – sein Drop ist der Abbruch.
    pub fn abonnieren(&self, key: &StreamKey) -> StreamAbo {
        let mut eintraege = self.inner.eintraege.lock();

        if let Some(eintrag) = eintraege.get_mut(key) {
            eintrag.ref_count += 1;
            tracing::debug!(key = %key, ref_count = eintrag.ref_count, "Abo angehaengt");
            return StreamAbo {
                key: key.clone(),
                generation: eintrag.generation,
                rx: eintrag.tx.subscribe(),
                inner: Arc::clone(&self.inner),
            };
        }

        let (tx, rx) = broadcast::channel(KANAL_KAPAZITAET);
        let (abbruch_tx, abbruch_rx) = watch::channel(false);
        let generation = self
            .inner
            .naechste_generation
            .fetch_add(1, Ordering::Relaxed);

        self.inner.gestartete_leser.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(lese_aufgabe(
            Arc::clone(&self.inner),
            key.clone(),
            tx.clone(),
            abbruch_rx,
            generation,
        ));

        eintraege.insert(
            key.clone(),
            KeyEintrag {
                ref_count: 1,
                tx,
                abbruch_tx,
                generation,
            },
        );
        tracing::debug!(key = %key, generation, "Leser gestartet");

        StreamAbo {
            key: key.clone(),
            generation,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Anzahl der je gestarteten Leser
    pub fn gestartete_leser(&self) -> u64 {
        self.inner.gestartete_leser.load(Ordering::SeqCst)
    }

    /// Anzahl der aktuell aktiven Schluessel
    pub fn aktive_schluessel(&self) -> usize {
        self.inner.eintraege.lock().len()
    }
}

/// Lese-Aufgabe eines Schluessels: Tail-Lesen bis Abbruch oder Fehler
///
/// Ein Store-Fehler ist terminal: der Stream endet fuer alle Taps und der
/// Schluessel wird geraeumt, damit ein spaeteres Abo frisch verbindet.
async fn lese_aufgabe(
    inner: Arc<MuxInner>,
    key: StreamKey,
    tx: broadcast::Sender<Arc<RawStreamEntry>>,
    mut abbruch_rx: watch::Receiver<bool>,
    generation: u64,
) {
    match CursorLeser::oeffnen(inner.store.as_ref(), key.clone(), LeseCursor::Tail).await {
        Ok(mut leser) => loop {
            tokio::select! {
                _ = abbruch_rx.changed() => {
                    if *abbruch_rx.borrow() {
                        tracing::debug!(key = %key, "Lese-Aufgabe abgebrochen");
                        break;
                    }
                }
                ergebnis = leser.naechste_charge() => match ergebnis {
                    Ok(eintraege) => {
                        for eintrag in eintraege {
                            // Kein Empfaenger ist transient (Abbruch laeuft) – weiterlesen
                            let _ = tx.send(Arc::new(eintrag));
                        }
                    }
                    Err(fehler) => {
                        tracing::warn!(
                            key = %key,
                            fehler = %fehler,
                            "Store-Lesung fehlgeschlagen – Stream endet"
                        );
                        break;
                    }
                }
            }
        },
        Err(fehler) => {
            tracing::warn!(key = %key, fehler = %fehler, "Store-Verbindung fehlgeschlagen");
        }
    }

    // Eintrag raeumen, falls er noch zu dieser Generation gehoert
    let mut eintraege = inner.eintraege.lock();
    if eintraege
        .get(&key)
        .is_some_and(|e| e.generation == generation)
    {
        eintraege.remove(&key);
        tracing::debug!(key = %key, generation, "Schluessel geraeumt");
    }
}

// ---------------------------------------------------------------------------
// StreamAbo
// ---------------------------------------------------------------------------

/// Tap eines einzelnen Abonnenten auf den geteilten Stream
///
/// Drop bricht genau dieses Abo ab; faellt der Ref-Zaehler dabei auf null,
/// wird der Leser abgebaut und der Schluessel geraeumt.
pub struct StreamAbo {
    key: StreamKey,
    generation: u64,
    rx: broadcast::Receiver<Arc<RawStreamEntry>>,
    inner: Arc<MuxInner>,
}

impl StreamAbo {
    /// Schluessel dieses Abos
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Empfaengt den naechsten Eintrag
    ///
    /// `None` bedeutet Ende des geteilten Streams (Store-Fehler oder
    /// Abbau). Ein zu langsamer Abonnent ueberspringt verpasste Eintraege
    /// und liest weiter – der Stream ist rein live.
    pub async fn empfangen(&mut self) -> Option<Arc<RawStreamEntry>> {
        loop {
            match self.rx.recv().await {
                Ok(eintrag) => return Some(eintrag),
                Err(broadcast::error::RecvError::Lagged(uebersprungen)) => {
                    tracing::warn!(
                        key = %self.key,
                        uebersprungen,
                        "Abonnent zu langsam – Eintraege uebersprungen"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for StreamAbo {
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
                tracing::debug!(key = %self.key, "Letztes Abo weg – Leser wird abgebaut");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
