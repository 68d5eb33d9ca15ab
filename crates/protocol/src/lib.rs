//! horchposten-protocol – Struktur-Dekoder und RTP-Extraktor
//!
//! Zwei reine Funktionen ueber den Kern-Datentypen: `paket_dekodieren`
//! hebt die flache Feldliste eines Store-Eintrags in das geschichtete
//! Datenmodell, `rtp_extrahieren` parst die UDP-Nutzdaten bit-exakt als
//! RTP und liefert die rohen Sprach-Nutzdaten fuer die Audio-Pipeline.

pub mod paket;
pub mod rtp;

pub use paket::paket_dekodieren;
pub use rtp::{rtp_extrahieren, RtpExtraktion};
