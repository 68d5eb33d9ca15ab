//! Fehlertypen fuer die Kern-Datentypen
//!
//! Die Crates fuer Store, Speech und Gateway definieren eigene Fehler-Enums;
//! hier liegen nur die Fehler, die beim Parsen der gemeinsamen Typen entstehen.

use thiserror::Error;

/// Fehler beim Umgang mit den Kern-Datentypen
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreFehler {
    #[error("Ungueltige Eintrags-ID: '{0}' (erwartet 'millis-seq')")]
    UngueltigeEintragsId(String),

    #[error("Ungueltiger Cursor: '{0}' (erwartet '$' oder 'millis-seq')")]
    UngueltigerCursor(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = CoreFehler::UngueltigeEintragsId("abc".into());
        assert!(e.to_string().contains("'abc'"));
    }
}
