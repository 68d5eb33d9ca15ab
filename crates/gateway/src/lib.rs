//! horchposten-gateway – Live-Verbindungen auf die geteilten Streams
//!
//! Das Gateway setzt pro WebSocket-Verbindung einen Tap auf den geteilten
//! Stream eines Schluessels, dekodiert Pakete, haengt auf Wunsch den
//! RTP-Header an, mischt Transkript-Ereignisse dazu und serialisiert pro
//! Ereignis eine JSON-Nachricht. Das Speech-Relay laeuft ref-gezaehlt
//! genau einmal pro Schluessel, egal wie viele Verbindungen mithoeren.

pub mod pipeline;
pub mod rest;
pub mod verbindung;
pub mod ws;
pub mod zustand;

pub use pipeline::{SpeechRelay, TranskriptAbo};
pub use verbindung::{ClientSitzung, ParseOptionen, VerbindungsZustand};
pub use zustand::GatewayZustand;
