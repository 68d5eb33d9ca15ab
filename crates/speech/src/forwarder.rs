//! Audio-Weiterleiter – stille-bewusstes, rueckstau-bewusstes Relay
//!
//! Ein Weiterleiter pro logischer Richtung (`in`/`out`). Pro Chunk:
//!
//! 1. mu-law dekodieren, Median der Sample-Betraege als Pegelmass;
//!    unter der Stille-Schwelle zaehlt der Stille-Zaehler hoch, sonst
//!    faellt er auf null.
//! 2. Ohne nutzbare Sitzung wird eine neue geoeffnet (der Ereignis-Kanal
//!    der Richtung wird wieder angehaengt).
//! 3. Nimmt die Sitzung nichts an, wandert der Chunk in die FIFO-
//!    Warteschlange – der Aufrufer blockiert nie.
//! 4. Sonst: Warteschlange aelteste zuerst leeren, dann entweder die
//!    Sitzung proaktiv beenden (Stille-Zaehler erreicht exakt die
//!    Schwelle – der Kollaborateur finalisiert sein Teilergebnis, der
//!    ausloesende stille Chunk wird nicht geschrieben) oder den Chunk
//!    schreiben.
//!
//! Sitzungs-Fehler verwerfen nur die Sitzung; eingereihte Chunks bleiben
//! erhalten und fliessen in die naechste Sitzung – Wiederholung auf
//! Chunk-Ebene ohne Zutun des Aufrufers.

use crate::engine::{ErkennungsEreignis, SpeechEngine, SpeechSitzung};
use crate::mulaw;
use bytes::Bytes;
use horchposten_core::types::StreamKey;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Richtung
// ---------------------------------------------------------------------------

/// Logische Richtung eines Sprachkanals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Richtung {
    /// Zur Session hin (Ziel-Adresse steckt im Schluessel)
    Eingehend,
    /// Von der Session weg (Quell-Adresse steckt im Schluessel)
    Ausgehend,
}

impl fmt::Display for Richtung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eingehend => write!(f, "in"),
            Self::Ausgehend => write!(f, "out"),
        }
    }
}

/// Ordnet ein Paket anhand der Layer-3-Adressen einer Richtung zu
///
/// Ziel-Adresse im Schluessel gewinnt vor Quell-Adresse.
/// Substring-Match auf dem Schluesselnamen; Schluessel die ineinander
/// enthalten sind koennen fehlzuordnen.
pub fn richtung_bestimmen(
    key: &StreamKey,
    src_addr: Option<&str>,
    dst_addr: Option<&str>,
) -> Option<Richtung> {
    if dst_addr.is_some_and(|addr| key.enthaelt(addr)) {
        return Some(Richtung::Eingehend);
    }
    if src_addr.is_some_and(|addr| key.enthaelt(addr)) {
        return Some(Richtung::Ausgehend);
    }
    None
}

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Schwellen des Stille-Verhaltens
#[derive(Debug, Clone)]
pub struct WeiterleiterKonfig {
    /// Pegel (Median der Sample-Betraege) unter dem ein Chunk als still gilt
    pub stille_schwelle: f64,
    /// Anzahl aufeinanderfolgender stiller Chunks bis zum Sitzungs-Ende
    pub stille_anzahl: u32,
}

impl Default for WeiterleiterKonfig {
    fn default() -> Self {
        Self {
            stille_schwelle: 200.0,
            stille_anzahl: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// SitzungsZustand
// ---------------------------------------------------------------------------

/// Expliziter Sitzungs-Lebenszyklus statt Null-Pruefungen auf einem Handle
enum SitzungsZustand {
    /// Noch nie geoeffnet bzw. nach Abbau
    Keine,
    /// Offene, potenziell nutzbare Sitzung
    Offen(Box<dyn SpeechSitzung>),
    /// Proaktiv beendet (Stille) – die Engine finalisiert noch
    Draining,
    /// Engine-seitig gestorben
    Geschlossen,
}

impl SitzungsZustand {
    fn name(&self) -> &'static str {
        match self {
            Self::Keine => "keine",
            Self::Offen(_) => "offen",
            Self::Draining => "draining",
            Self::Geschlossen => "geschlossen",
        }
    }
}

// ---------------------------------------------------------------------------
// AudioWeiterleiter
// ---------------------------------------------------------------------------

/// Relay einer Richtung zum Erkennungs-Kollaborateur
pub struct AudioWeiterleiter {
    richtung: Richtung,
    engine: Arc<dyn SpeechEngine>,
    ereignis_tx: mpsc::Sender<ErkennungsEreignis>,
    konfig: WeiterleiterKonfig,
    zustand: SitzungsZustand,
    warteschlange: VecDeque<Bytes>,
    stille_zaehler: u32,
}

impl AudioWeiterleiter {
    /// Erstellt einen Weiterleiter; die erste Sitzung oeffnet erst der
    /// erste Chunk
    pub fn neu(
        richtung: Richtung,
        engine: Arc<dyn SpeechEngine>,
        ereignis_tx: mpsc::Sender<ErkennungsEreignis>,
        konfig: WeiterleiterKonfig,
    ) -> Self {
        Self {
            richtung,
            engine,
            ereignis_tx,
            konfig,
            zustand: SitzungsZustand::Keine,
            warteschlange: VecDeque::new(),
            stille_zaehler: 0,
        }
    }

    /// Leitet einen rohen mu-law-Chunk weiter
    pub fn weiterleiten(&mut self, chunk: Bytes) {
        // Pegelmass und Stille-Zaehler
        let samples = mulaw::dekodieren(&chunk);
        let pegel = mulaw::median_betrag(&samples);
        if pegel < self.konfig.stille_schwelle {
            self.stille_zaehler += 1;
        } else {
            self.stille_zaehler = 0;
        }

        // Sitzung sicherstellen
        if !self.sitzung_nutzbar() {
            tracing::debug!(
                richtung = %self.richtung,
                zustand = self.zustand.name(),
                "Sitzung nicht nutzbar – oeffne neue"
            );
            match self.engine.sitzung_oeffnen(self.ereignis_tx.clone()) {
                Ok(sitzung) => self.zustand = SitzungsZustand::Offen(sitzung),
                Err(fehler) => {
                    tracing::warn!(
                        richtung = %self.richtung,
                        fehler = %fehler,
                        "Sitzung liess sich nicht oeffnen – Chunk gepuffert"
                    );
                    self.zustand = SitzungsZustand::Geschlossen;
                    self.warteschlange.push_back(chunk);
                    return;
                }
            }
        }
        let SitzungsZustand::Offen(sitzung) = &mut self.zustand else {
            self.warteschlange.push_back(chunk);
            return;
        };

        // Rueckstau: nichts annehmbar -> einreihen, Aufrufer blockiert nie
        if !sitzung.ist_schreibbar() {
            self.warteschlange.push_back(chunk);
            return;
        }

        // Warteschlange aelteste zuerst leeren
        while let Some(anstehend) = self.warteschlange.pop_front() {
            if let Err(fehler) = sitzung.schreiben(anstehend.clone()) {
                tracing::warn!(
                    richtung = %self.richtung,
                    fehler = %fehler,
                    wartend = self.warteschlange.len() + 2,
                    "Sitzungs-Fehler beim Leeren – Chunks bleiben erhalten"
                );
                self.warteschlange.push_front(anstehend);
                self.warteschlange.push_back(chunk);
                self.zustand = SitzungsZustand::Geschlossen;
                return;
            }
        }

        // Stille-Schwelle exakt erreicht: Sitzung beenden statt den
        // (stillen) Chunk zu schreiben
        if self.stille_zaehler == self.konfig.stille_anzahl {
            tracing::info!(
                richtung = %self.richtung,
                stille_chunks = self.stille_zaehler,
                "Stille erkannt – Sitzung wird beendet"
            );
            sitzung.beenden();
            self.zustand = SitzungsZustand::Draining;
            return;
        }

        if let Err(fehler) = sitzung.schreiben(chunk.clone()) {
            tracing::warn!(
                richtung = %self.richtung,
                fehler = %fehler,
                "Sitzungs-Fehler beim Schreiben – Chunk bleibt erhalten"
            );
            self.warteschlange.push_back(chunk);
            self.zustand = SitzungsZustand::Geschlossen;
        }
    }

    /// Richtung dieses Weiterleiters
    pub fn richtung(&self) -> Richtung {
        self.richtung
    }

    /// Aktueller Stille-Zaehler
    pub fn stille_zaehler(&self) -> u32 {
        self.stille_zaehler
    }

    /// Anzahl aktuell eingereihter Chunks
    pub fn wartende_chunks(&self) -> usize {
        self.warteschlange.len()
    }

    /// Name des Sitzungs-Zustands (fuer Logs und Tests)
    pub fn zustands_name(&self) -> &'static str {
        self.zustand.name()
    }

    fn sitzung_nutzbar(&self) -> bool {
        matches!(&self.zustand, SitzungsZustand::Offen(s) if s.ist_offen())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SpeechFehler;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Aufgezeichneter Kern einer Mock-Sitzung
    #[derive(Default)]
    struct MockSitzungKern {
        geschrieben: Mutex<Vec<Bytes>>,
        beendet: AtomicBool,
        schreibbar: AtomicBool,
        offen: AtomicBool,
    }

    impl MockSitzungKern {
        fn geschriebene(&self) -> Vec<Bytes> {
            self.geschrieben.lock().clone()
        }
    }

    struct MockSitzung {
        kern: Arc<MockSitzungKern>,
    }

    impl SpeechSitzung for MockSitzung {
        fn ist_offen(&self) -> bool {
            self.kern.offen.load(Ordering::SeqCst) && !self.kern.beendet.load(Ordering::SeqCst)
        }

        fn ist_schreibbar(&self) -> bool {
            self.ist_offen() && self.kern.schreibbar.load(Ordering::SeqCst)
        }

        fn schreiben(&mut self, chunk: Bytes) -> Result<(), SpeechFehler> {
            if !self.ist_offen() {
                return Err(SpeechFehler::SitzungGeschlossen);
            }
            self.kern.geschrieben.lock().push(chunk);
            Ok(())
        }

        fn beenden(&mut self) {
            self.kern.beendet.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct MockEngine {
        sitzungen: Arc<Mutex<Vec<Arc<MockSitzungKern>>>>,
        oeffnen_schlaegt_fehl: Arc<AtomicBool>,
    }

    impl MockEngine {
        fn sitzung(&self, index: usize) -> Arc<MockSitzungKern> {
            Arc::clone(&self.sitzungen.lock()[index])
        }

        fn sitzungs_anzahl(&self) -> usize {
            self.sitzungen.lock().len()
        }
    }

    impl SpeechEngine for MockEngine {
        fn sitzung_oeffnen(
            &self,
            _ereignisse: mpsc::Sender<ErkennungsEreignis>,
        ) -> Result<Box<dyn SpeechSitzung>, SpeechFehler> {
            if self.oeffnen_schlaegt_fehl.load(Ordering::SeqCst) {
                return Err(SpeechFehler::Engine("Mock verweigert".into()));
            }
            let kern = Arc::new(MockSitzungKern::default());
            kern.offen.store(true, Ordering::SeqCst);
            kern.schreibbar.store(true, Ordering::SeqCst);
            self.sitzungen.lock().push(Arc::clone(&kern));
            Ok(Box::new(MockSitzung { kern }))
        }
    }

    fn weiterleiter(engine: &MockEngine, stille_anzahl: u32) -> AudioWeiterleiter {
        let (tx, _rx) = mpsc::channel(8);
        AudioWeiterleiter::neu(
            Richtung::Eingehend,
            Arc::new(engine.clone()),
            tx,
            WeiterleiterKonfig {
                stille_schwelle: 200.0,
                stille_anzahl,
            },
        )
    }

    /// Chunk aus stillen mu-law-Bytes (0xFF dekodiert zu 0)
    fn stiller_chunk() -> Bytes {
        Bytes::from_static(&[0xFF; 160])
    }

    /// Chunk mit Vollausschlag (0x80 dekodiert zu 32124)
    fn lauter_chunk() -> Bytes {
        Bytes::from_static(&[0x80; 160])
    }

    #[test]
    fn stille_beendet_sitzung_genau_einmal_ohne_den_ausloeser() {
        let engine = MockEngine::default();
        let mut wl = weiterleiter(&engine, 5);

        for _ in 0..5 {
            wl.weiterleiten(stiller_chunk());
        }

        let sitzung = engine.sitzung(0);
        assert_eq!(engine.sitzungs_anzahl(), 1);
        assert!(sitzung.beendet.load(Ordering::SeqCst));
        // Der fuenfte (ausloesende) Chunk wurde nicht geschrieben
        assert_eq!(sitzung.geschriebene().len(), 4);
        assert_eq!(wl.zustands_name(), "draining");
    }

    #[test]
    fn nach_dem_ende_oeffnet_der_naechste_chunk_eine_neue_sitzung() {
        let engine = MockEngine::default();
        let mut wl = weiterleiter(&engine, 3);

        for _ in 0..3 {
            wl.weiterleiten(stiller_chunk());
        }
        assert_eq!(engine.sitzungs_anzahl(), 1);

        wl.weiterleiten(lauter_chunk());
        assert_eq!(engine.sitzungs_anzahl(), 2);
        assert_eq!(engine.sitzung(1).geschriebene().len(), 1);
        // Zaehler ist durch den lauten Chunk zurueckgesetzt
        assert_eq!(wl.stille_zaehler(), 0);
    }

    #[test]
    fn lauter_chunk_setzt_den_zaehler_zurueck() {
        let engine = MockEngine::default();
        let mut wl = weiterleiter(&engine, 50);

        wl.weiterleiten(stiller_chunk());
        wl.weiterleiten(stiller_chunk());
        assert_eq!(wl.stille_zaehler(), 2);

        wl.weiterleiten(lauter_chunk());
        assert_eq!(wl.stille_zaehler(), 0);
    }

    #[test]
    fn rueckstau_wird_in_urspruenglicher_reihenfolge_geleert() {
        let engine = MockEngine::default();
        let mut wl = weiterleiter(&engine, 50);

        // Sitzung anlegen lassen, dann Annahme sperren
        wl.weiterleiten(lauter_chunk());
        let sitzung = engine.sitzung(0);
        sitzung.schreibbar.store(false, Ordering::SeqCst);

        let a = Bytes::from_static(&[0x81; 4]);
        let b = Bytes::from_static(&[0x82; 4]);
        wl.weiterleiten(a.clone());
        wl.weiterleiten(b.clone());
        assert_eq!(wl.wartende_chunks(), 2);
        assert_eq!(sitzung.geschriebene().len(), 1, "nichts waehrend der Sperre");

        // Annahme wieder oeffnen: erst a, dann b, dann der Live-Chunk
        sitzung.schreibbar.store(true, Ordering::SeqCst);
        let c = Bytes::from_static(&[0x83; 4]);
        wl.weiterleiten(c.clone());

        let geschrieben = sitzung.geschriebene();
        assert_eq!(geschrieben[1..], [a, b, c]);
        assert_eq!(wl.wartende_chunks(), 0);
    }

    #[test]
    fn sitzungs_tod_erhaelt_chunks_fuer_die_naechste_sitzung() {
        let engine = MockEngine::default();
        let mut wl = weiterleiter(&engine, 50);

        wl.weiterleiten(lauter_chunk());
        // Engine-seitiger Tod der Sitzung
        engine.sitzung(0).offen.store(false, Ordering::SeqCst);

        let chunk = Bytes::from_static(&[0x84; 4]);
        wl.weiterleiten(chunk.clone());

        assert_eq!(engine.sitzungs_anzahl(), 2);
        assert_eq!(engine.sitzung(1).geschriebene(), vec![chunk]);
    }

    #[test]
    fn fehlgeschlagenes_oeffnen_puffert_den_chunk() {
        let engine = MockEngine::default();
        engine.oeffnen_schlaegt_fehl.store(true, Ordering::SeqCst);
        let mut wl = weiterleiter(&engine, 50);

        let a = Bytes::from_static(&[0x85; 4]);
        wl.weiterleiten(a.clone());
        assert_eq!(wl.wartende_chunks(), 1);
        assert_eq!(wl.zustands_name(), "geschlossen");

        // Engine erholt sich: Warteschlange fliesst vor dem Live-Chunk
        engine.oeffnen_schlaegt_fehl.store(false, Ordering::SeqCst);
        let b = Bytes::from_static(&[0x86; 4]);
        wl.weiterleiten(b.clone());

        assert_eq!(engine.sitzung(0).geschriebene(), vec![a, b]);
        assert_eq!(wl.wartende_chunks(), 0);
    }

    #[test]
    fn richtung_ziel_adresse_gewinnt() {
        let key = StreamKey::neu("rtp:10.0.0.1:10.0.0.2");
        assert_eq!(
            richtung_bestimmen(&key, Some("10.0.0.9"), Some("10.0.0.2")),
            Some(Richtung::Eingehend)
        );
        assert_eq!(
            richtung_bestimmen(&key, Some("10.0.0.1"), Some("10.0.0.9")),
            Some(Richtung::Ausgehend)
        );
        assert_eq!(
            richtung_bestimmen(&key, Some("10.0.0.8"), Some("10.0.0.9")),
            None
        );
        assert_eq!(richtung_bestimmen(&key, None, None), None);
    }

    #[test]
    fn richtung_substring_schwaeche_bleibt_erhalten() {
        // "10.0.0.1" steckt als Teilstring in "10.0.0.10" – die Zuordnung
        // nutzt bewusst Substring-Match und ordnet hier eingehend zu
        let key = StreamKey::neu("rtp:10.0.0.10");
        assert_eq!(
            richtung_bestimmen(&key, None, Some("10.0.0.1")),
            Some(Richtung::Eingehend)
        );
    }
}
