//! Struktur-Dekoder – flache Feldliste zu geschichtetem Paket-Event
//!
//! Der Store liefert pro Eintrag eine geordnete Liste von
//! (Feldname, Textwert)-Paaren. Feldnamen folgen der Konvention
//! `<praefix>_<name>` mit Praefix aus der festen Tabelle unten; der
//! Praefix wird abgestreift und das Feld in die passende Schicht gelegt.
//! Felder ohne bekanntes Praefix bleiben auf der Top-Level-Ebene.
//!
//! Dekodieren ist rein strukturell und total: es gibt keinen Fehlerpfad,
//! jede Eingabe ergibt ein Event.

use horchposten_core::event::{EventTyp, FeldWert, PaketDaten, PaketEvent};
use horchposten_core::types::RawStreamEntry;

/// Schicht-Zuordnung eines Feld-Praefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schicht {
    Layer2,
    Layer3,
    Layer4,
    Payload,
}

/// Feste Praefix-Tabelle der Schicht-Zuordnung
const PRAEFIX_TABELLE: [(&str, Schicht); 4] = [
    ("layer_2_", Schicht::Layer2),
    ("layer_3_", Schicht::Layer3),
    ("layer_4_", Schicht::Layer4),
    ("payload_", Schicht::Payload),
];

/// Dekodiert einen rohen Stream-Eintrag in ein Paket-Event
///
/// Der Store degradiert numerische Werte zu Text; Felder deren
/// abgestreifter Name auf `size` oder `port` endet werden zurueck zu
/// Zahlen gehoben. Nicht parsbare Werte bleiben Text – Dekodieren
/// schlaegt nie fehl.
pub fn paket_dekodieren(eintrag: &RawStreamEntry) -> PaketEvent {
    let mut daten = PaketDaten::leer();

    for (name, wert) in &eintrag.felder {
        let (ziel, abgestreift) = schicht_bestimmen(name, &mut daten);
        let feld_wert = wert_heben(&abgestreift, wert);
        ziel.insert(abgestreift, feld_wert);
    }

    PaketEvent {
        event_typ: EventTyp::NetworkPacket,
        timestamp: eintrag.id.to_string(),
        data: daten,
    }
}

/// Bestimmt Ziel-Map und abgestreiften Namen fuer ein Feld
fn schicht_bestimmen<'a>(
    name: &str,
    daten: &'a mut PaketDaten,
) -> (
    &'a mut std::collections::BTreeMap<String, FeldWert>,
    String,
) {
    for (praefix, schicht) in PRAEFIX_TABELLE {
        if let Some(rest) = name.strip_prefix(praefix) {
            let ziel = match schicht {
                Schicht::Layer2 => &mut daten.layer_2,
                Schicht::Layer3 => &mut daten.layer_3,
                Schicht::Layer4 => &mut daten.layer_4,
                Schicht::Payload => &mut daten.payload,
            };
            return (ziel, rest.to_string());
        }
    }
    (&mut daten.weitere, name.to_string())
}

/// Hebt `size`/`port`-Felder zurueck auf ihren numerischen Typ
fn wert_heben(name: &str, wert: &str) -> FeldWert {
    if name.ends_with("size") || name.ends_with("port") {
        if let Ok(zahl) = wert.parse::<i64>() {
            return FeldWert::Zahl(zahl);
        }
    }
    FeldWert::Text(wert.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use horchposten_core::types::StreamEntryId;

    fn eintrag(felder: &[(&str, &str)]) -> RawStreamEntry {
        RawStreamEntry::neu(
            StreamEntryId::neu(1526919030474, 0),
            felder
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn schichten_werden_zugeordnet() {
        let event = paket_dekodieren(&eintrag(&[
            ("layer_2_src_mac", "aa:bb:cc:dd:ee:ff"),
            ("layer_3_src_addr", "10.0.0.1"),
            ("layer_4_src_port", "5004"),
            ("payload_type", "UDP"),
        ]));

        assert_eq!(event.event_typ, EventTyp::NetworkPacket);
        assert_eq!(event.timestamp, "1526919030474-0");
        assert_eq!(
            event.data.layer_2.get("src_mac"),
            Some(&FeldWert::Text("aa:bb:cc:dd:ee:ff".into()))
        );
        assert_eq!(event.data.layer_3_text("src_addr"), Some("10.0.0.1"));
        assert_eq!(
            event.data.layer_4.get("src_port"),
            Some(&FeldWert::Zahl(5004))
        );
        assert_eq!(event.data.payload_text("type"), Some("UDP"));
    }

    #[test]
    fn size_und_port_werden_zahlen() {
        // Beispiel aus der Gegenprobe: src_addr bleibt Text, size wird Zahl
        let event = paket_dekodieren(&eintrag(&[
            ("layer_3_src_addr", "10.0.0.1"),
            ("payload_size", "188"),
            ("payload_type", "UDP"),
        ]));

        assert_eq!(event.data.layer_3_text("src_addr"), Some("10.0.0.1"));
        assert_eq!(event.data.payload_zahl("size"), Some(188));
    }

    #[test]
    fn unbekanntes_praefix_bleibt_top_level() {
        let event = paket_dekodieren(&eintrag(&[
            ("capture_if", "eth0"),
            ("layer_9_x", "y"),
        ]));

        assert_eq!(
            event.data.weitere.get("capture_if"),
            Some(&FeldWert::Text("eth0".into()))
        );
        assert_eq!(
            event.data.weitere.get("layer_9_x"),
            Some(&FeldWert::Text("y".into()))
        );
        assert!(event.data.layer_2.is_empty());
    }

    #[test]
    fn nicht_parsbare_zahl_bleibt_text() {
        let event = paket_dekodieren(&eintrag(&[("payload_size", "gross")]));
        assert_eq!(
            event.data.payload.get("size"),
            Some(&FeldWert::Text("gross".into()))
        );
    }

    #[test]
    fn suffix_pruefung_auf_abgestreiftem_namen() {
        // "total_size" endet auf size und wird gehoben, "sized" nicht
        let event = paket_dekodieren(&eintrag(&[
            ("payload_total_size", "42"),
            ("payload_sized", "42"),
        ]));
        assert_eq!(event.data.payload_zahl("total_size"), Some(42));
        assert_eq!(
            event.data.payload.get("sized"),
            Some(&FeldWert::Text("42".into()))
        );
    }

    #[test]
    fn leerer_eintrag_ergibt_leeres_event() {
        let event = paket_dekodieren(&eintrag(&[]));
        assert!(event.data.layer_2.is_empty());
        assert!(event.data.payload.is_empty());
        assert!(event.data.weitere.is_empty());
        assert!(event.data.rtp.is_none());
    }

    #[test]
    fn doppelte_feldnamen_letzter_gewinnt() {
        // Der Store garantiert keine Eindeutigkeit; spaetere Werte
        // ueberschreiben fruehere in derselben Schicht
        let event = paket_dekodieren(&eintrag(&[
            ("payload_type", "TCP"),
            ("payload_type", "UDP"),
        ]));
        assert_eq!(event.data.payload_text("type"), Some("UDP"));
    }
}
