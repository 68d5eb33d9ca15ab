//! Event-Modell der Pipeline
//!
//! Alle Ereignisse, die Richtung Subscriber fliessen: dekodierte
//! Netzwerk-Pakete (`PaketEvent`) und Transkript-Ereignisse der
//! Spracherkennung (`TranskriptEvent`). Auf dem Draht wird pro Ereignis
//! eine JSON-Nachricht `{ "timestamp": ..., "data": ... }` gesendet;
//! das Gateway baut diese Huelle selbst und filtert dabei Top-Level-Felder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// EventTyp
// ---------------------------------------------------------------------------

/// Art eines Pipeline-Ereignisses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTyp {
    /// Dekodiertes Netzwerk-Paket aus dem Stream-Store
    #[serde(rename = "NETWORK_PACKET")]
    NetworkPacket,
    /// Transkript der eingehenden Richtung
    #[serde(rename = "SPEECH_IN")]
    SpeechIn,
    /// Transkript der ausgehenden Richtung
    #[serde(rename = "SPEECH_OUT")]
    SpeechOut,
}

// ---------------------------------------------------------------------------
// FeldWert
// ---------------------------------------------------------------------------

/// Wert eines dekodierten Paket-Feldes
///
/// Der Store degradiert alle Werte zu Text; Felder deren Name auf `size`
/// oder `port` endet werden beim Dekodieren zurueck zu Zahlen gehoben.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeldWert {
    /// Numerischer Wert (urspruenglich Number, vom Store als Text geliefert)
    Zahl(i64),
    /// Unveraenderter Textwert
    Text(String),
}

impl FeldWert {
    /// Gibt den Textwert zurueck, falls es einer ist
    pub fn als_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Zahl(_) => None,
        }
    }

    /// Gibt den Zahlwert zurueck, falls es einer ist
    pub fn als_zahl(&self) -> Option<i64> {
        match self {
            Self::Zahl(z) => Some(*z),
            Self::Text(_) => None,
        }
    }
}

impl From<&str> for FeldWert {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

impl From<i64> for FeldWert {
    fn from(z: i64) -> Self {
        Self::Zahl(z)
    }
}

// ---------------------------------------------------------------------------
// RtpKopf
// ---------------------------------------------------------------------------

/// Kodierung der re-kodierten RTP-Teilfelder
///
/// Wird einmal pro Payload bestimmt (aus `payload.encoding_type`) und dann
/// konsistent fuer alle Teilfelder verwendet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KodierungsTyp {
    #[serde(rename = "base64")]
    Base64,
    #[serde(rename = "hex")]
    Hex,
}

/// Bit-exakt extrahierter RTP-Header samt re-kodierter Nutzdaten
///
/// Wird nur an ein Paket-Event angehaengt wenn JEDER Parse-Schritt gueltig
/// blieb – nie teilbefuellt. Feldnamen entsprechen der Draht-JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtpKopf {
    /// RTP-Version (nur 2 wird akzeptiert)
    pub version: u8,
    /// Padding-Bit
    pub padding: u8,
    /// Extension-Bit
    pub extension: u8,
    /// Anzahl CSRC-Eintraege (4 Bit)
    pub csrc_count: u8,
    /// Marker-Bit
    pub marker: u8,
    /// Payload-Typ (7 Bit)
    pub payload_type: u8,
    /// Sequenznummer (16 Bit, big-endian)
    pub sequence_number: u16,
    /// RTP-Zeitstempel (32 Bit, big-endian)
    pub timestamp: u32,
    /// Synchronisation Source (32 Bit, big-endian)
    pub ssrc: u32,
    /// Konsumierte Header-Laenge in Bytes (monoton waehrend des Parsens)
    pub header_length: usize,
    /// Kodierung aller re-kodierten Teilfelder
    pub payload_encoding_type: KodierungsTyp,
    /// Re-kodierte CSRC-Liste (nur wenn csrc_count > 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrc_payload: Option<String>,
    /// Extension-Header-ID (nur wenn Extension-Bit gesetzt)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_header_id: Option<u16>,
    /// Extension-Header-Laenge (nur wenn Extension-Bit gesetzt)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_header_length: Option<u16>,
    /// Re-kodierter Extension-Header (nur wenn Extension-Bit gesetzt)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_header_payload: Option<String>,
    /// Re-kodierte Sprach-Nutzdaten
    pub payload: String,
    /// Laenge der rohen Sprach-Nutzdaten in Bytes
    pub payload_length: usize,
}

// ---------------------------------------------------------------------------
// PaketDaten
// ---------------------------------------------------------------------------

/// Geschichtetes Datenmodell eines dekodierten Pakets
///
/// Felder ohne bekanntes Schicht-Praefix landen unveraendert in `weitere`
/// und werden beim Serialisieren auf die Top-Level-Ebene geflacht.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaketDaten {
    /// Sicherungsschicht (Ethernet)
    pub layer_2: BTreeMap<String, FeldWert>,
    /// Vermittlungsschicht (IP)
    pub layer_3: BTreeMap<String, FeldWert>,
    /// Transportschicht (TCP/UDP)
    pub layer_4: BTreeMap<String, FeldWert>,
    /// Transport-Nutzdaten
    pub payload: BTreeMap<String, FeldWert>,
    /// Extrahierter RTP-Header (nur wenn vollstaendig gueltig)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtp: Option<RtpKopf>,
    /// Felder ohne bekanntes Praefix – Top-Level im JSON
    #[serde(flatten)]
    pub weitere: BTreeMap<String, FeldWert>,
}

impl PaketDaten {
    /// Erstellt ein leeres Datenmodell
    pub fn leer() -> Self {
        Self::default()
    }

    /// Textwert eines Payload-Feldes
    pub fn payload_text(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(FeldWert::als_text)
    }

    /// Zahlwert eines Payload-Feldes
    pub fn payload_zahl(&self, name: &str) -> Option<i64> {
        self.payload.get(name).and_then(FeldWert::als_zahl)
    }

    /// Textwert eines Layer-3-Feldes (z.B. `src_addr`, `dst_addr`)
    pub fn layer_3_text(&self, name: &str) -> Option<&str> {
        self.layer_3.get(name).and_then(FeldWert::als_text)
    }
}

// ---------------------------------------------------------------------------
// Ereignisse
// ---------------------------------------------------------------------------

/// Dekodiertes Netzwerk-Paket-Ereignis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaketEvent {
    /// Ereignistyp (immer `NETWORK_PACKET`)
    #[serde(rename = "eventType")]
    pub event_typ: EventTyp,
    /// Eintrags-ID des Stream-Eintrags als Text (`millis-seq`)
    pub timestamp: String,
    /// Geschichtete Paketdaten
    pub data: PaketDaten,
}

/// Transkript-Ereignis der Spracherkennung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranskriptEvent {
    /// `SPEECH_IN` oder `SPEECH_OUT`
    #[serde(rename = "eventType")]
    pub event_typ: EventTyp,
    /// Epoch-Millisekunden als Text
    pub timestamp: String,
    /// Erkennungsergebnis des Kollaborateurs (opak)
    pub data: serde_json::Value,
}

/// Ein Ereignis auf dem Weg zum Subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Paket(PaketEvent),
    Transkript(TranskriptEvent),
}

impl LiveEvent {
    /// Zeitstempel des Ereignisses
    pub fn timestamp(&self) -> &str {
        match self {
            Self::Paket(e) => &e.timestamp,
            Self::Transkript(e) => &e.timestamp,
        }
    }

    /// Daten-Teil als JSON-Wert (fuer Filterung und Serialisierung)
    pub fn daten_als_wert(&self) -> serde_json::Value {
        match self {
            Self::Paket(e) => serde_json::to_value(&e.data).unwrap_or_default(),
            Self::Transkript(e) => e.data.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
