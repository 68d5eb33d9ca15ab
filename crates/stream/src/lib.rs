//! horchposten-stream – Store-Anbindung und geteilte Live-Streams
//!
//! Drei Schichten, von unten nach oben:
//! - `store`: Trait-Seam zum append-only Stream-Store plus die
//!   Redis-Implementierung (blockierendes Tail-Read via `XREAD`).
//! - `leser`: der `CursorLeser` – haelt den monotonen Lese-Cursor eines
//!   Schluessels und liest blockierend Charge fuer Charge.
//! - `multiplexer`: der ref-gezaehlte `StreamMultiplexer` – N Abonnenten
//!   desselben Schluessels kosten genau einen Store-Leser.

pub mod leser;
pub mod multiplexer;
pub mod store;

#[cfg(test)]
pub(crate) mod teststore;

pub use leser::CursorLeser;
pub use multiplexer::{StreamAbo, StreamMultiplexer};
pub use store::{RedisStreamStore, SchluesselInfo, StoreLeser, StreamFehler, StreamStore};
