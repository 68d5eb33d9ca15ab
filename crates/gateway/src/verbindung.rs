//! Client-Sitzung – Zustand und Optionen einer Live-Verbindung
//!
//! Jede WebSocket-Verbindung traegt eine `ClientSitzung` mit den beim
//! Verbinden geparsten Abfrage-Optionen.
//!
//! ## State Machine
//! ```text
//! Verbindend -> Aktiv -> Geschlossen (terminal)
//! ```
//!
//! Abfrage-Parameter:
//! - `key`     Pflicht; fehlt er, wird der Socket sofort geschlossen.
//! - `parse`   Komma-Token: `rtp` (RTP-Header anhaengen),
//!             `realtime-text` (Transkription; impliziert `rtp`).
//! - `filter`  Komma-Liste von Top-Level-Feldern, die aus jedem
//!             ausgehenden Datensatz geloescht werden.

use horchposten_core::event::LiveEvent;
use horchposten_core::types::StreamKey;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Parse-Token fuer den RTP-Header
const TOKEN_RTP: &str = "rtp";
/// Parse-Token fuer die Echtzeit-Transkription
const TOKEN_TRANSKRIPTION: &str = "realtime-text";

// ---------------------------------------------------------------------------
// VerbindungsZustand
// ---------------------------------------------------------------------------

/// Zustand einer Live-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    /// Verbunden, Optionen geparst, Taps noch nicht gesetzt
    Verbindend,
    /// Taps gesetzt, Ereignisse fliessen
    Aktiv,
    /// Terminal – Socket zu, Taps abgebaut
    Geschlossen,
}

// ---------------------------------------------------------------------------
// ParseOptionen
// ---------------------------------------------------------------------------

/// Geparste `parse`-Token einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptionen {
    /// RTP-Header an Paket-Events anhaengen
    pub rtp: bool,
    /// Transkript-Ereignisse in den Stream mischen
    pub transkription: bool,
}

impl ParseOptionen {
    /// Parst die Komma-Token (Gross-/Kleinschreibung egal)
    ///
    /// Das Transkriptions-Token impliziert das RTP-Token.
    pub fn aus_token(text: &str) -> Self {
        let mut optionen = Self::default();
        for token in text.to_lowercase().split(',') {
            match token.trim() {
                TOKEN_RTP => optionen.rtp = true,
                TOKEN_TRANSKRIPTION => {
                    optionen.transkription = true;
                    optionen.rtp = true;
                }
                _ => {}
            }
        }
        optionen
    }
}

// ---------------------------------------------------------------------------
// ClientSitzung
// ---------------------------------------------------------------------------

/// Sitzung einer einzelnen Live-Verbindung
#[derive(Debug, Clone)]
pub struct ClientSitzung {
    /// Verbindungs-ID (fuer Logs und die Verbindungs-Registry)
    pub id: Uuid,
    /// Abonnierter Schluessel
    pub key: StreamKey,
    /// Geparste Parse-Optionen
    pub parse: ParseOptionen,
    /// Zu loeschende Top-Level-Felder
    pub filter: HashSet<String>,
    zustand: VerbindungsZustand,
}

impl ClientSitzung {
    /// Baut die Sitzung aus den Abfrage-Parametern
    ///
    /// `None` wenn der Pflicht-Parameter `key` fehlt oder leer ist –
    /// der Aufrufer schliesst den Socket dann sofort, ohne je ein
    /// Ereignis zu senden.
    pub fn aus_abfrage(params: &HashMap<String, String>) -> Option<Self> {
        let key = params.get("key").filter(|k| !k.is_empty())?;
        let parse = params
            .get("parse")
            .map(|p| ParseOptionen::aus_token(p))
            .unwrap_or_default();
        let filter = params
            .get("filter")
            .map(|f| {
                f.to_lowercase()
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id: Uuid::new_v4(),
            key: StreamKey::neu(key.clone()),
            parse,
            filter,
            zustand: VerbindungsZustand::Verbindend,
        })
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> VerbindungsZustand {
        self.zustand
    }

    /// Uebergang Verbindend -> Aktiv
    pub fn aktivieren(&mut self) {
        self.zustand = VerbindungsZustand::Aktiv;
        tracing::info!(
            verbindung = %self.id,
            key = %self.key,
            rtp = self.parse.rtp,
            transkription = self.parse.transkription,
            "Verbindung aktiv"
        );
    }

    /// Uebergang nach Geschlossen (terminal)
    pub fn schliessen(&mut self) {
        self.zustand = VerbindungsZustand::Geschlossen;
        tracing::info!(verbindung = %self.id, key = %self.key, "Verbindung geschlossen");
    }
}

// ---------------------------------------------------------------------------
// Serialisierung
// ---------------------------------------------------------------------------

/// Serialisiert ein Ereignis als eine Draht-Nachricht
///
/// Loescht zuvor jedes in `filter` genannte Top-Level-Feld aus dem
/// Daten-Teil; alle uebrigen Felder bleiben unveraendert.
pub fn nachricht_bauen(event: &LiveEvent, filter: &HashSet<String>) -> String {
    let mut daten = event.daten_als_wert();
    if let serde_json::Value::Object(map) = &mut daten {
        for feld in filter {
            map.remove(feld);
        }
    }
    serde_json::json!({
        "timestamp": event.timestamp(),
        "data": daten,
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use horchposten_core::event::{EventTyp, PaketDaten, PaketEvent, TranskriptEvent};

    fn params(paare: &[(&str, &str)]) -> HashMap<String, String> {
        paare
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ohne_key_keine_sitzung() {
        assert!(ClientSitzung::aus_abfrage(&params(&[])).is_none());
        assert!(ClientSitzung::aus_abfrage(&params(&[("key", "")])).is_none());
        assert!(ClientSitzung::aus_abfrage(&params(&[("parse", "rtp")])).is_none());
    }

    #[test]
    fn sitzung_mit_optionen() {
        let sitzung = ClientSitzung::aus_abfrage(&params(&[
            ("key", "sess:a"),
            ("parse", "rtp"),
            ("filter", "layer_2,Payload"),
        ]))
        .unwrap();

        assert_eq!(sitzung.key.as_str(), "sess:a");
        assert!(sitzung.parse.rtp);
        assert!(!sitzung.parse.transkription);
        assert!(sitzung.filter.contains("layer_2"));
        assert!(sitzung.filter.contains("payload"), "Filter wird kleingeschrieben");
        assert_eq!(sitzung.zustand(), VerbindungsZustand::Verbindend);
    }

    #[test]
    fn transkription_impliziert_rtp() {
        let optionen = ParseOptionen::aus_token("realtime-text");
        assert!(optionen.transkription);
        assert!(optionen.rtp);

        let optionen = ParseOptionen::aus_token("RTP");
        assert!(optionen.rtp);
        assert!(!optionen.transkription);

        let optionen = ParseOptionen::aus_token("unbekannt,,");
        assert_eq!(optionen, ParseOptionen::default());
    }

    #[test]
    fn zustands_uebergaenge() {
        let mut sitzung = ClientSitzung::aus_abfrage(&params(&[("key", "k")])).unwrap();
        assert_eq!(sitzung.zustand(), VerbindungsZustand::Verbindend);
        sitzung.aktivieren();
        assert_eq!(sitzung.zustand(), VerbindungsZustand::Aktiv);
        sitzung.schliessen();
        assert_eq!(sitzung.zustand(), VerbindungsZustand::Geschlossen);
    }

    #[test]
    fn filter_loescht_genau_die_genannten_felder() {
        let mut daten = PaketDaten::leer();
        daten.layer_2.insert("src_mac".into(), "aa".into());
        daten.layer_3.insert("src_addr".into(), "10.0.0.1".into());
        daten.payload.insert("size".into(), 188.into());
        daten.weitere.insert("capture_if".into(), "eth0".into());
        let event = LiveEvent::Paket(PaketEvent {
            event_typ: EventTyp::NetworkPacket,
            timestamp: "5-0".into(),
            data: daten,
        });

        let filter: HashSet<String> = ["layer_2", "capture_if"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let nachricht = nachricht_bauen(&event, &filter);
        let json: serde_json::Value = serde_json::from_str(&nachricht).unwrap();

        // Gefilterte Felder fehlen vollstaendig
        assert!(json["data"].get("layer_2").is_none());
        assert!(json["data"].get("capture_if").is_none());
        // Alle uebrigen sind unveraendert
        assert_eq!(json["timestamp"], "5-0");
        assert_eq!(json["data"]["layer_3"]["src_addr"], "10.0.0.1");
        assert_eq!(json["data"]["payload"]["size"], 188);
    }

    #[test]
    fn leerer_filter_laesst_alles_durch() {
        let mut daten = PaketDaten::leer();
        daten.layer_4.insert("src_port".into(), 5004.into());
        let event = LiveEvent::Paket(PaketEvent {
            event_typ: EventTyp::NetworkPacket,
            timestamp: "1-0".into(),
            data: daten,
        });

        let nachricht = nachricht_bauen(&event, &HashSet::new());
        let json: serde_json::Value = serde_json::from_str(&nachricht).unwrap();
        assert_eq!(json["data"]["layer_4"]["src_port"], 5004);
    }

    #[test]
    fn filter_wirkt_auch_auf_transkripte() {
        let event = LiveEvent::Transkript(TranskriptEvent {
            event_typ: EventTyp::SpeechIn,
            timestamp: "1700000000000".into(),
            data: serde_json::json!({ "typ": "zwischenergebnis", "ergebnis": { "t": "x" } }),
        });

        let filter: HashSet<String> = ["typ"].iter().map(|s| s.to_string()).collect();
        let nachricht = nachricht_bauen(&event, &filter);
        let json: serde_json::Value = serde_json::from_str(&nachricht).unwrap();

        assert!(json["data"].get("typ").is_none());
        assert_eq!(json["data"]["ergebnis"]["t"], "x");
    }
}
