//! RTP-Extraktor – bit-exakter Parse der UDP-Nutzdaten
//!
//! Kein allgemeiner RTP/RTCP-Stack: es werden genau die Felder gelesen,
//! die noetig sind um die Sprach-Nutzdaten herauszuloesen.
//!
//! ## Pufferlayout (big-endian)
//!
//! ```text
//! Offset  Len        Beschreibung
//! ------  ---        -----------
//!  0       1         V(2) P(1) X(1) CC(4)
//!  1       1         M(1) PT(7)
//!  2       2         Sequenznummer
//!  4       4         Zeitstempel
//!  8       4         SSRC
//! 12       4*CC      CSRC-Liste (optional)
//!  ..      ..        Extension (optional)
//!  ..      Rest      Sprach-Nutzdaten
//! ```
//!
//! Jeder Schritt prueft die verbleibende Pufferlaenge; schlaegt ein
//! Schritt fehl, wird der Header komplett verworfen (nie teilbefuellt)
//! und das aeussere Event bleibt unberuehrt.
//!
//! Die Extension-Behandlung spiegelt das beobachtete Drahtverhalten:
//! ID/Laenge ruecken die konsumierte Laenge nicht vor, der erfasste
//! Extension-Ausschnitt beginnt an deren Offset, und eine Laenge von 0
//! ist ungueltig.

use base64::Engine as _;
use bytes::Bytes;
use horchposten_core::event::{KodierungsTyp, PaketDaten, RtpKopf};

/// Laenge des RTP-Basis-Headers in Bytes
const BASIS_KOPF_LAENGE: usize = 12;

/// Einzige akzeptierte RTP-Version
const RTP_VERSION: u8 = 2;

/// Ergebnis einer erfolgreichen Extraktion
///
/// `sprach_nutzdaten` ist der rohe (nicht re-kodierte) Ausschnitt hinter
/// dem Header – er geht an die Audio-Pipeline, waehrend der Kopf die
/// re-kodierte Form fuer die Draht-JSON traegt.
#[derive(Debug, Clone, PartialEq)]
pub struct RtpExtraktion {
    /// Vollstaendig befuellter Header
    pub kopf: RtpKopf,
    /// Rohe Sprach-Nutzdaten
    pub sprach_nutzdaten: Bytes,
}

/// Versucht, die UDP-Nutzdaten eines Pakets als RTP zu extrahieren
///
/// Vorbedingungen: `payload.type == "UDP"` und `payload.size > 0`.
/// Gibt `None` zurueck sobald irgendein Schritt ungueltig ist –
/// Fehlschlaege sind still und lokal, es gibt keinen Fehlerpfad.
pub fn rtp_extrahieren(daten: &PaketDaten) -> Option<RtpExtraktion> {
    if daten.payload_text("type") != Some("UDP") {
        return None;
    }
    if daten.payload_zahl("size").unwrap_or(0) <= 0 {
        return None;
    }

    // Kodierung einmal bestimmen, dann konsistent fuer alle Teilfelder
    let kodierung = match daten.payload_text("encoding_type") {
        None => KodierungsTyp::Base64,
        Some("base64") => KodierungsTyp::Base64,
        Some("hex") => KodierungsTyp::Hex,
        Some(_) => return None,
    };
    let puffer = dekodieren(kodierung, daten.payload_text("payload")?)?;

    // Basis-Header
    if puffer.len() < BASIS_KOPF_LAENGE {
        return None;
    }
    let version = puffer[0] >> 6;
    if version != RTP_VERSION {
        return None;
    }
    let padding = (puffer[0] & 0b0010_0000) >> 5;
    let extension = (puffer[0] & 0b0001_0000) >> 4;
    let csrc_count = puffer[0] & 0b0000_1111;
    let marker = puffer[1] >> 7;
    let payload_type = puffer[1] & 0b0111_1111;
    let sequence_number = u16::from_be_bytes([puffer[2], puffer[3]]);
    let timestamp = u32::from_be_bytes([puffer[4], puffer[5], puffer[6], puffer[7]]);
    let ssrc = u32::from_be_bytes([puffer[8], puffer[9], puffer[10], puffer[11]]);

    // Konsumierte Header-Laenge: monoton steigend, stets <= Pufferlaenge
    let mut konsumiert = BASIS_KOPF_LAENGE;

    // CSRC-Liste
    let mut csrc_payload = None;
    if csrc_count > 0 {
        let csrc_laenge = 4 * csrc_count as usize;
        if puffer.len() < konsumiert + csrc_laenge {
            return None;
        }
        csrc_payload = Some(kodieren(kodierung, &puffer[konsumiert..konsumiert + csrc_laenge]));
        konsumiert += csrc_laenge;
    }

    // Extension-Header
    let mut extension_header_id = None;
    let mut extension_header_length = None;
    let mut extension_header_payload = None;
    if extension == 1 {
        if puffer.len() < konsumiert + 4 {
            return None;
        }
        let id = u16::from_be_bytes([puffer[konsumiert], puffer[konsumiert + 1]]);
        let laenge = u16::from_be_bytes([puffer[konsumiert + 2], puffer[konsumiert + 3]]);
        if laenge == 0 || puffer.len() < konsumiert + laenge as usize {
            return None;
        }
        extension_header_id = Some(id);
        extension_header_length = Some(laenge);
        extension_header_payload = Some(kodieren(
            kodierung,
            &puffer[konsumiert..konsumiert + laenge as usize],
        ));
        konsumiert += laenge as usize;
    }

    // Hinter dem Header muessen Sprach-Nutzdaten uebrig sein
    if puffer.len() <= konsumiert {
        return None;
    }
    let sprach_nutzdaten = Bytes::copy_from_slice(&puffer[konsumiert..]);

    let kopf = RtpKopf {
        version,
        padding,
        extension,
        csrc_count,
        marker,
        payload_type,
        sequence_number,
        timestamp,
        ssrc,
        header_length: konsumiert,
        payload_encoding_type: kodierung,
        csrc_payload,
        extension_header_id,
        extension_header_length,
        extension_header_payload,
        payload: kodieren(kodierung, &sprach_nutzdaten),
        payload_length: sprach_nutzdaten.len(),
    };

    Some(RtpExtraktion {
        kopf,
        sprach_nutzdaten,
    })
}

/// Dekodiert den Payload-Text in rohe Bytes
fn dekodieren(kodierung: KodierungsTyp, text: &str) -> Option<Vec<u8>> {
    match kodierung {
        KodierungsTyp::Base64 => base64::engine::general_purpose::STANDARD
            .decode(text)
            .ok(),
        KodierungsTyp::Hex => hex::decode(text).ok(),
    }
}

/// Re-kodiert einen Byte-Ausschnitt in der bestimmten Kodierung
fn kodieren(kodierung: KodierungsTyp, bytes: &[u8]) -> String {
    match kodierung {
        KodierungsTyp::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
        KodierungsTyp::Hex => hex::encode(bytes),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
