//! Stream-Identitaeten und Lese-Cursor
//!
//! Ein `StreamKey` benennt eine aufgezeichnete Netzwerk-Session im Store.
//! Jeder Eintrag im Stream traegt eine `StreamEntryId` (Millisekunden +
//! Sequenz) mit Totalordnung; der `LeseCursor` haelt die Leseposition und
//! uebernimmt neue IDs nur, wenn sie strikt groesser sind (nie rueckwaerts).

use crate::error::CoreFehler;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// StreamKey
// ---------------------------------------------------------------------------

/// Schluessel einer aufgezeichneten Session im Stream-Store
///
/// Newtype um Verwechslung mit sonstigen Strings auszuschliessen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(String);

impl StreamKey {
    /// Erstellt einen neuen StreamKey
    pub fn neu(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Gibt den Schluessel als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prueft ob der Schluessel den gegebenen Teilstring enthaelt
    ///
    /// Grundlage der Richtungszuordnung im Speech-Relay: der Session-Key
    /// traegt die beteiligten Adressen im Namen. Substring-Match – Keys,
    /// die ineinander enthalten sind, koennen fehlzuordnen.
    pub fn enthaelt(&self, teil: &str) -> bool {
        self.0.contains(teil)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamKey {
    fn from(s: &str) -> Self {
        Self::neu(s)
    }
}

// ---------------------------------------------------------------------------
// StreamEntryId
// ---------------------------------------------------------------------------

/// ID eines Stream-Eintrags: Epoch-Millisekunden plus Sequenznummer
///
/// Textform ist `"millis-seq"`. Die Totalordnung vergleicht erst die
/// Millisekunden, bei Gleichheit die Sequenz (Feld-Reihenfolge der
/// Ord-Ableitung).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamEntryId {
    /// Epoch-Millisekunden des Eintrags
    pub millis: u64,
    /// Sequenznummer innerhalb derselben Millisekunde
    pub seq: u64,
}

impl StreamEntryId {
    /// Kleinste moegliche ID (`0-0`) – Vergleichsbasis fuer den Tail-Cursor
    pub const NULL: Self = Self { millis: 0, seq: 0 };

    /// Erstellt eine neue ID
    pub fn neu(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }
}

impl fmt::Display for StreamEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for StreamEntryId {
    type Err = CoreFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (millis, seq) = s
            .split_once('-')
            .ok_or_else(|| CoreFehler::UngueltigeEintragsId(s.into()))?;
        let millis = millis
            .parse::<u64>()
            .map_err(|_| CoreFehler::UngueltigeEintragsId(s.into()))?;
        let seq = seq
            .parse::<u64>()
            .map_err(|_| CoreFehler::UngueltigeEintragsId(s.into()))?;
        Ok(Self { millis, seq })
    }
}

// ---------------------------------------------------------------------------
// LeseCursor
// ---------------------------------------------------------------------------

/// Leseposition innerhalb eines Streams
///
/// `Tail` ist der Sentinel `"$"` – nur Eintraege strikt nach "jetzt".
/// `Ab(id)` liest alles strikt nach `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeseCursor {
    /// Nur neue Eintraege ab jetzt (Sentinel `$`)
    Tail,
    /// Alles strikt nach dieser ID
    Ab(StreamEntryId),
}

impl LeseCursor {
    /// Prueft ob der Cursor noch auf dem Tail-Sentinel steht
    pub fn ist_tail(&self) -> bool {
        matches!(self, Self::Tail)
    }

    /// Uebernimmt eine gelieferte ID als neue Position – aber nur wenn sie
    /// strikt groesser als die aktuelle ist. Der Cursor laeuft nie rueckwaerts.
    ///
    /// `Tail` vergleicht als `0-0`; eine gelieferte `0-0` laesst den Cursor
    /// deshalb auf dem Sentinel stehen.
    ///
    /// Gibt `true` zurueck wenn die ID uebernommen wurde.
    pub fn uebernehmen(&mut self, id: StreamEntryId) -> bool {
        let aktuell = match self {
            Self::Tail => StreamEntryId::NULL,
            Self::Ab(pos) => *pos,
        };
        if id > aktuell {
            *self = Self::Ab(id);
            true
        } else {
            false
        }
    }

    /// Textform fuer die Store-Anfrage (`$` oder `millis-seq`)
    pub fn als_argument(&self) -> String {
        match self {
            Self::Tail => "$".into(),
            Self::Ab(id) => id.to_string(),
        }
    }
}

impl fmt::Display for LeseCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.als_argument())
    }
}

impl FromStr for LeseCursor {
    type Err = CoreFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "$" {
            return Ok(Self::Tail);
        }
        s.parse::<StreamEntryId>()
            .map(Self::Ab)
            .map_err(|_| CoreFehler::UngueltigerCursor(s.into()))
    }
}

// ---------------------------------------------------------------------------
// RawStreamEntry
// ---------------------------------------------------------------------------

/// Roher Stream-Eintrag wie vom Store geliefert
///
/// Die Felder sind eine geordnete Liste von (Name, Textwert)-Paaren.
/// Namens-Eindeutigkeit garantiert der Store nicht; die Reihenfolge ist
/// signifikant und bleibt deshalb erhalten (keine Map).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStreamEntry {
    /// ID des Eintrags
    pub id: StreamEntryId,
    /// Geordnete (Feldname, Textwert)-Paare
    pub felder: Vec<(String, String)>,
}

impl RawStreamEntry {
    /// Erstellt einen neuen Eintrag
    pub fn neu(id: StreamEntryId, felder: Vec<(String, String)>) -> Self {
        Self { id, felder }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eintrags_id_parsen_und_anzeigen() {
        let id: StreamEntryId = "1526919030474-55".parse().unwrap();
        assert_eq!(id.millis, 1526919030474);
        assert_eq!(id.seq, 55);
        assert_eq!(id.to_string(), "1526919030474-55");
    }

    #[test]
    fn eintrags_id_parsen_fehler() {
        assert!("".parse::<StreamEntryId>().is_err());
        assert!("123".parse::<StreamEntryId>().is_err());
        assert!("a-b".parse::<StreamEntryId>().is_err());
        assert!("12-".parse::<StreamEntryId>().is_err());
    }

    #[test]
    fn eintrags_id_totalordnung() {
        let a = StreamEntryId::neu(1, 5);
        let b = StreamEntryId::neu(2, 0);
        let c = StreamEntryId::neu(2, 1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(StreamEntryId::neu(2, 1), c);
    }

    #[test]
    fn cursor_uebernimmt_nur_groessere_ids() {
        let mut cursor = LeseCursor::Ab(StreamEntryId::neu(10, 3));
        assert!(!cursor.uebernehmen(StreamEntryId::neu(10, 3)), "gleiche ID");
        assert!(!cursor.uebernehmen(StreamEntryId::neu(9, 99)), "aeltere ID");
        assert!(cursor.uebernehmen(StreamEntryId::neu(10, 4)));
        assert_eq!(cursor, LeseCursor::Ab(StreamEntryId::neu(10, 4)));
    }

    #[test]
    fn tail_cursor_vergleicht_als_null() {
        let mut cursor = LeseCursor::Tail;
        // 0-0 ist nicht strikt groesser als 0-0 – Sentinel bleibt stehen
        assert!(!cursor.uebernehmen(StreamEntryId::NULL));
        assert!(cursor.ist_tail());

        assert!(cursor.uebernehmen(StreamEntryId::neu(0, 1)));
        assert_eq!(cursor, LeseCursor::Ab(StreamEntryId::neu(0, 1)));
    }

    #[test]
    fn cursor_argument_form() {
        assert_eq!(LeseCursor::Tail.als_argument(), "$");
        assert_eq!(
            LeseCursor::Ab(StreamEntryId::neu(7, 0)).als_argument(),
            "7-0"
        );
    }

    #[test]
    fn cursor_parsen() {
        assert_eq!("$".parse::<LeseCursor>().unwrap(), LeseCursor::Tail);
        assert_eq!(
            "5-2".parse::<LeseCursor>().unwrap(),
            LeseCursor::Ab(StreamEntryId::neu(5, 2))
        );
        assert!("tail".parse::<LeseCursor>().is_err());
    }

    #[test]
    fn stream_key_enthaelt() {
        let key = StreamKey::neu("sess:10.0.0.1:10.0.0.2");
        assert!(key.enthaelt("10.0.0.1"));
        assert!(!key.enthaelt("10.0.0.3"));
    }
}
