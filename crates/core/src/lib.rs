//! horchposten-core – Gemeinsame Typen, Events und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Horchposten-Crates gemeinsam genutzt werden: Stream-Schluessel,
//! Eintrags-IDs mit Totalordnung, Lese-Cursor sowie das Event-Modell der
//! dekodierten Pakete und Transkripte.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::CoreFehler;
pub use event::{EventTyp, FeldWert, LiveEvent, PaketDaten, PaketEvent, TranskriptEvent};
pub use types::{LeseCursor, RawStreamEntry, StreamEntryId, StreamKey};
