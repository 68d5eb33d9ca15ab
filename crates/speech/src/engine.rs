//! Speech-Engine-Seam – der Erkennungs-Kollaborateur als opaker Duplex-Kanal
//!
//! Die Engine nimmt 8-kHz-mu-law-Chunks entgegen und liefert asynchron
//! Erkennungs-Ereignisse (Zwischenergebnis, Endergebnis, Aeusserungs-Ende)
//! ueber einen mpsc-Kanal zurueck. Eine Sitzung kann unabhaengig vom
//! Aufrufer unbrauchbar werden; der Weiterleiter prueft das vor jedem
//! Schreiben ueber `ist_offen`/`ist_schreibbar`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler der Engine-Anbindung
#[derive(Debug, Error)]
pub enum SpeechFehler {
    #[error("Sitzung ist geschlossen")]
    SitzungGeschlossen,

    #[error("Sitzung nimmt gerade nichts an (Queue voll)")]
    NichtSchreibbar,

    #[error("Engine-Fehler: {0}")]
    Engine(String),
}

// ---------------------------------------------------------------------------
// Ereignisse
// ---------------------------------------------------------------------------

/// Asynchrones Ereignis des Erkennungs-Kollaborateurs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typ", content = "ergebnis", rename_all = "snake_case")]
pub enum ErkennungsEreignis {
    /// Vorlaeufiges Transkript (kann sich noch aendern)
    Zwischenergebnis(serde_json::Value),
    /// Endgueltiges Transkript einer Aeusserung
    Endergebnis(serde_json::Value),
    /// Die Engine haelt die Aeusserung fuer beendet
    AeusserungsEnde,
}

impl ErkennungsEreignis {
    /// Ereignis als JSON-Wert fuer das Transkript-Event
    pub fn als_wert(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Eine offene Erkennungs-Sitzung
///
/// Schreiben ist nicht-blockierend: eine Verweigerung meldet sich ueber
/// `ist_schreibbar` bzw. als Fehler, nie durch Blockieren des Aufrufers.
pub trait SpeechSitzung: Send {
    /// Prueft ob die Sitzung noch nutzbar ist
    ///
    /// `false` nachdem `beenden` gerufen wurde oder die Engine die
    /// Sitzung ihrerseits aufgegeben hat.
    fn ist_offen(&self) -> bool;

    /// Prueft ob die Sitzung gerade einen Chunk annehmen wuerde
    fn ist_schreibbar(&self) -> bool;

    /// Reiht einen mu-law-Chunk zur Uebertragung ein
    fn schreiben(&mut self, chunk: bytes::Bytes) -> Result<(), SpeechFehler>;

    /// Beendet die Sitzung geordnet
    ///
    /// Bereits eingereihte Chunks werden noch uebertragen; die Engine
    /// finalisiert ein laufendes Teilergebnis.
    fn beenden(&mut self);
}

/// Fabrik fuer Erkennungs-Sitzungen
pub trait SpeechEngine: Send + Sync {
    /// Oeffnet eine neue Sitzung
    ///
    /// Ereignisse der Sitzung laufen in den uebergebenen Kanal; der
    /// Aufrufer haengt denselben Kanal an jede Folge-Sitzung derselben
    /// Richtung.
    fn sitzung_oeffnen(
        &self,
        ereignisse: mpsc::Sender<ErkennungsEreignis>,
    ) -> Result<Box<dyn SpeechSitzung>, SpeechFehler>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ereignis_drahtformat() {
        let ereignis =
            ErkennungsEreignis::Zwischenergebnis(serde_json::json!({ "transcript": "hallo" }));
        let json = serde_json::to_string(&ereignis).unwrap();
        assert_eq!(
            json,
            r#"{"typ":"zwischenergebnis","ergebnis":{"transcript":"hallo"}}"#
        );
    }

    #[test]
    fn aeusserungs_ende_ohne_inhalt() {
        let json = serde_json::to_string(&ErkennungsEreignis::AeusserungsEnde).unwrap();
        assert_eq!(json, r#"{"typ":"aeusserungs_ende"}"#);

        let zurueck: ErkennungsEreignis = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, ErkennungsEreignis::AeusserungsEnde);
    }

    #[test]
    fn ereignis_round_trip() {
        let ereignis = ErkennungsEreignis::Endergebnis(serde_json::json!({
            "transcript": "guten tag",
            "is_final": true
        }));
        let json = serde_json::to_string(&ereignis).unwrap();
        let zurueck: ErkennungsEreignis = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, ereignis);
    }
}
