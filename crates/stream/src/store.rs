//! Store-Anbindung – blockierendes Tail-Read auf dem Stream-Store
//!
//! Der Store ist hinter zwei Traits gekapselt: `StreamStore` oeffnet
//! Leser und listet Schluessel, `StoreLeser` ist eine dedizierte
//! Verbindung fuer blockierende Tail-Reads. Jeder Cursor-Leser bekommt
//! seine eigene Verbindung, damit `BLOCK` nur ihn selbst aufhaelt.
//!
//! Die `XREAD`-Antwort wird aus dem rohen `redis::Value` gelaufen statt
//! ueber den typisierten Reply-Typ: der wuerde die Feld-Reihenfolge in
//! eine Map verlieren, und die Reihenfolge ist im Datenmodell signifikant.

use async_trait::async_trait;
use horchposten_core::types::{LeseCursor, RawStreamEntry, StreamEntryId, StreamKey};
use redis::Value;
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler der Store-Anbindung
#[derive(Debug, Error)]
pub enum StreamFehler {
    #[error("Store-Fehler: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Store-Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Unerwartete Store-Antwort: {0}")]
    UngueltigeAntwort(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Schluessel samt Store-Typ (fuer die Abfrage-Endpunkte)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchluesselInfo {
    /// Schluesselname
    pub key: String,
    /// Typ wie der Store ihn benennt (`stream`, `string`, ...)
    #[serde(rename = "type")]
    pub typ: String,
}

/// Zugang zum append-only Stream-Store
#[async_trait]
pub trait StreamStore: Send + Sync + 'static {
    /// Oeffnet eine dedizierte Lese-Verbindung
    async fn leser_oeffnen(&self) -> Result<Box<dyn StoreLeser>, StreamFehler>;

    /// Listet alle Schluessel samt Store-Typ
    async fn schluessel_auflisten(&self) -> Result<Vec<SchluesselInfo>, StreamFehler>;
}

/// Dedizierte Lese-Verbindung fuer blockierende Tail-Reads
#[async_trait]
pub trait StoreLeser: Send {
    /// Liest Eintraege strikt nach `cursor`
    ///
    /// Blockiert bis neue Daten vorliegen oder `block_ms` abgelaufen ist
    /// (`block_ms == 0` blockiert unbegrenzt). Liefert hoechstens `anzahl`
    /// Eintraege; ein Timeout liefert eine leere Liste.
    async fn tail_lesen(
        &mut self,
        key: &StreamKey,
        cursor: &LeseCursor,
        block_ms: u64,
        anzahl: usize,
    ) -> Result<Vec<RawStreamEntry>, StreamFehler>;
}

// ---------------------------------------------------------------------------
// Redis-Implementierung
// ---------------------------------------------------------------------------

/// Stream-Store-Anbindung via Redis Streams
pub struct RedisStreamStore {
    client: redis::Client,
}

impl RedisStreamStore {
    /// Erstellt die Anbindung aus einer Verbindungs-URL
    /// (z.B. `redis://127.0.0.1:6379/0`)
    pub fn neu(url: &str) -> Result<Self, StreamFehler> {
        let client = redis::Client::open(url)
            .map_err(|e| StreamFehler::Verbindung(format!("'{url}': {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn leser_oeffnen(&self) -> Result<Box<dyn StoreLeser>, StreamFehler> {
        let verbindung = self.client.get_multiplexed_async_connection().await?;
        Ok(Box::new(RedisLeser { verbindung }))
    }

    async fn schluessel_auflisten(&self) -> Result<Vec<SchluesselInfo>, StreamFehler> {
        let mut verbindung = self.client.get_multiplexed_async_connection().await?;

        let schluessel: Vec<String> = redis::cmd("KEYS")
            .arg("*")
            .query_async(&mut verbindung)
            .await?;

        let mut infos = Vec::with_capacity(schluessel.len());
        for key in schluessel {
            // Typ-Abfrage pro Schluessel; Einzel-Fehler degradieren zu "unknown"
            let typ: String = match redis::cmd("TYPE").arg(&key).query_async(&mut verbindung).await
            {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!(key = %key, fehler = %e, "Typ-Abfrage fehlgeschlagen");
                    "unknown".into()
                }
            };
            infos.push(SchluesselInfo { key, typ });
        }
        Ok(infos)
    }
}

/// Lese-Verbindung ueber eine dedizierte Redis-Connection
struct RedisLeser {
    verbindung: redis::aio::MultiplexedConnection,
}

#[async_trait]
impl StoreLeser for RedisLeser {
    async fn tail_lesen(
        &mut self,
        key: &StreamKey,
        cursor: &LeseCursor,
        block_ms: u64,
        anzahl: usize,
    ) -> Result<Vec<RawStreamEntry>, StreamFehler> {
        let antwort: Value = redis::cmd("XREAD")
            .arg("BLOCK")
            .arg(block_ms)
            .arg("COUNT")
            .arg(anzahl)
            .arg("STREAMS")
            .arg(key.as_str())
            .arg(cursor.als_argument())
            .query_async(&mut self.verbindung)
            .await?;

        antwort_parsen(antwort)
    }
}

// ---------------------------------------------------------------------------
// Antwort-Parsen
// ---------------------------------------------------------------------------

/// Laeuft eine rohe `XREAD`-Antwort ab und erhaelt die Feld-Reihenfolge
///
/// Form: `[ [key, [ [id, [feld, wert, feld, wert, ...]], ... ]], ... ]`
/// bzw. `Nil` bei Timeout. Eintraege mit unlesbarer ID werden einzeln
/// uebersprungen statt die ganze Charge zu verwerfen.
fn antwort_parsen(antwort: Value) -> Result<Vec<RawStreamEntry>, StreamFehler> {
    let streams = match antwort {
        Value::Nil => return Ok(Vec::new()),
        Value::Array(streams) => streams,
        // RESP3 liefert die Stream-Zuordnung als Map
        Value::Map(paare) => paare.into_iter().map(|(_, v)| v).collect(),
        sonst => {
            return Err(StreamFehler::UngueltigeAntwort(format!(
                "XREAD: {sonst:?}"
            )))
        }
    };

    let mut eintraege = Vec::new();
    for stream in streams {
        let eintrags_liste = match stream {
            // RESP2: [key, eintraege] – erkennbar am Text-Schluessel vorn
            Value::Array(mut teile)
                if teile.len() == 2
                    && matches!(teile[0], Value::BulkString(_) | Value::SimpleString(_)) =>
            {
                teile.pop().unwrap_or(Value::Nil)
            }
            // RESP3-Map: der Wert ist direkt die Eintragsliste
            liste @ Value::Array(_) => liste,
            sonst => {
                return Err(StreamFehler::UngueltigeAntwort(format!(
                    "Stream-Element: {sonst:?}"
                )))
            }
        };

        let Value::Array(roh_eintraege) = eintrags_liste else {
            return Err(StreamFehler::UngueltigeAntwort(
                "Eintragsliste ist kein Array".into(),
            ));
        };

        for roh in roh_eintraege {
            let Value::Array(mut teile) = roh else {
                return Err(StreamFehler::UngueltigeAntwort(
                    "Eintrag ist kein Array".into(),
                ));
            };
            if teile.len() != 2 {
                return Err(StreamFehler::UngueltigeAntwort(format!(
                    "Eintrag mit {} Elementen",
                    teile.len()
                )));
            }
            let felder_wert = teile.pop().unwrap_or(Value::Nil);
            let id_wert = teile.pop().unwrap_or(Value::Nil);

            let Some(id_text) = text_aus(&id_wert) else {
                return Err(StreamFehler::UngueltigeAntwort(
                    "Eintrags-ID ist kein Text".into(),
                ));
            };
            let id: StreamEntryId = match id_text.parse() {
                Ok(id) => id,
                Err(e) => {
                    tracing::debug!(id = %id_text, fehler = %e, "Eintrag uebersprungen");
                    continue;
                }
            };

            eintraege.push(RawStreamEntry::neu(id, felder_parsen(felder_wert)));
        }
    }
    Ok(eintraege)
}

/// Flache, alternierende Feldliste zu geordneten Paaren
///
/// Ein ungerades Rest-Element (Wert ohne Namen) wird verworfen.
fn felder_parsen(wert: Value) -> Vec<(String, String)> {
    let Value::Array(flach) = wert else {
        return Vec::new();
    };
    let mut felder = Vec::with_capacity(flach.len() / 2);
    let mut iter = flach.into_iter();
    while let (Some(name), Some(inhalt)) = (iter.next(), iter.next()) {
        if let (Some(name), Some(inhalt)) = (text_aus(&name), text_aus(&inhalt)) {
            felder.push((name, inhalt));
        }
    }
    felder
}

/// Textinhalt eines Store-Wertes
fn text_aus(wert: &Value) -> Option<String> {
    match wert {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(text) => Some(text.clone()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
