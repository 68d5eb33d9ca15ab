//! horchposten-speech – Sprach-Weiterleitung an den Erkennungs-Kollaborateur
//!
//! Die Sprach-Nutzdaten aus dem RTP-Extraktor sind 8-kHz-mu-law-Chunks.
//! Pro logischer Richtung (`in`/`out`) haelt ein `AudioWeiterleiter` eine
//! Engine-Sitzung, erkennt Stille ueber den Median der dekodierten
//! Sample-Betraege und liefert Chunks geordnet und mit begrenztem
//! Rueckstau an den Kollaborateur. Die Engine selbst ist opak hinter dem
//! `SpeechEngine`-Trait; `TcpSpeechEngine` ist die Transport-Bruecke.

pub mod engine;
pub mod forwarder;
pub mod mulaw;
pub mod tcp_engine;

pub use engine::{ErkennungsEreignis, SpeechEngine, SpeechFehler, SpeechSitzung};
pub use forwarder::{richtung_bestimmen, AudioWeiterleiter, Richtung, WeiterleiterKonfig};
pub use tcp_engine::TcpSpeechEngine;
