//! Cursor-Leser – blockierendes Tail-Lesen eines Schluessels
//!
//! Der `CursorLeser` besitzt den monotonen Lese-Cursor eines Schluessels
//! und liest in einer Schleife Charge fuer Charge. Die Blockier-Parameter
//! haengen am Cursor-Zustand:
//!
//! - Cursor auf dem Tail-Sentinel: unbegrenzt blockieren, kleine Charge.
//!   Die Session kann beliebig lange still sein bevor Verkehr eintrifft.
//! - Danach: kurzes Blockier-Limit, grosse Charge. Verkehr kommt in
//!   Schueben, Ziel ist das schnelle Abtragen des Rueckstands.
//!
//! Verbindungsfehler sind terminal fuer diesen Leser; eine Wiederholung
//! findet hier nicht statt (der Multiplexer raeumt den Schluessel und ein
//! spaeterer Abonnent verbindet frisch).

use crate::store::{StoreLeser, StreamFehler, StreamStore};
use horchposten_core::types::{LeseCursor, RawStreamEntry, StreamKey};

/// Blockier-Limit solange der Cursor auf dem Tail-Sentinel steht (0 = unbegrenzt)
const TAIL_BLOCK_MS: u64 = 0;
/// Chargen-Limit fuer die erste Tail-Lesung
const TAIL_ANZAHL: usize = 100;
/// Blockier-Limit nach der ersten gelieferten Charge
const FOLGE_BLOCK_MS: u64 = 10;
/// Chargen-Limit fuer das Abtragen des Rueckstands
const FOLGE_ANZAHL: usize = 10_000;

/// Blockierender Tail-Leser ueber genau einem Schluessel
pub struct CursorLeser {
    key: StreamKey,
    cursor: LeseCursor,
    leser: Box<dyn StoreLeser>,
}

impl CursorLeser {
    /// Oeffnet eine dedizierte Store-Verbindung fuer den Schluessel
    pub async fn oeffnen(
        store: &dyn StreamStore,
        key: StreamKey,
        start: LeseCursor,
    ) -> Result<Self, StreamFehler> {
        let leser = store.leser_oeffnen().await?;
        tracing::debug!(key = %key, cursor = %start, "Cursor-Leser geoeffnet");
        Ok(Self {
            key,
            cursor: start,
            leser,
        })
    }

    /// Aktuelle Cursor-Position
    pub fn cursor(&self) -> &LeseCursor {
        &self.cursor
    }

    /// Liest die naechste Charge und rueckt den Cursor vor
    ///
    /// Eine leere Charge bedeutet Blockier-Timeout ohne neue Daten.
    /// Der Cursor uebernimmt jede gelieferte ID nur, wenn sie strikt
    /// groesser als die aktuelle Position ist – er laeuft nie rueckwaerts.
    pub async fn naechste_charge(&mut self) -> Result<Vec<RawStreamEntry>, StreamFehler> {
        let (block_ms, anzahl) = if self.cursor.ist_tail() {
            (TAIL_BLOCK_MS, TAIL_ANZAHL)
        } else {
            (FOLGE_BLOCK_MS, FOLGE_ANZAHL)
        };

        let eintraege = self
            .leser
            .tail_lesen(&self.key, &self.cursor, block_ms, anzahl)
            .await?;

        for eintrag in &eintraege {
            self.cursor.uebernehmen(eintrag.id);
        }

        Ok(eintraege)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
