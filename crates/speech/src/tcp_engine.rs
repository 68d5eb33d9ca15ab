//! TCP-Bruecke zum Erkennungs-Kollaborateur
//!
//! Eine Sitzung ist eine TCP-Verbindung: mu-law-Chunks gehen roh auf die
//! Schreibseite, der Kollaborateur antwortet mit zeilenweisem JSON
//! (`ErkennungsEreignis`) auf der Leseseite.
//!
//! ## Aufbau pro Sitzung
//!
//! ```text
//! sitzung_oeffnen()
//!     |
//!     v
//! TcpSitzung (try_send) --> mpsc-Queue --> Schreib-Task --> TCP
//!                                              TCP --> Zeilen-Leser --> Ereignis-Kanal
//! ```
//!
//! Schreibbarkeit ist die freie Kapazitaet der Sende-Queue; ist die
//! Verbindung tot, schliesst die Queue und der Weiterleiter erkennt die
//! Sitzung als unbrauchbar. `beenden` laesst die Queue leerlaufen und
//! schliesst dann die Schreibseite – der Kollaborateur finalisiert sein
//! Teilergebnis und darf danach noch Ereignisse liefern.

use crate::engine::{ErkennungsEreignis, SpeechEngine, SpeechFehler, SpeechSitzung};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Groesse der Sende-Queue pro Sitzung (Chunks)
const SENDE_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// TcpSpeechEngine
// ---------------------------------------------------------------------------

/// Engine-Anbindung ueber eine konfigurierte TCP-Adresse
pub struct TcpSpeechEngine {
    adresse: String,
}

impl TcpSpeechEngine {
    /// Erstellt die Anbindung (z.B. `"127.0.0.1:9400"`)
    pub fn neu(adresse: impl Into<String>) -> Self {
        Self {
            adresse: adresse.into(),
        }
    }
}

impl SpeechEngine for TcpSpeechEngine {
    fn sitzung_oeffnen(
        &self,
        ereignisse: mpsc::Sender<ErkennungsEreignis>,
    ) -> Result<Box<dyn SpeechSitzung>, SpeechFehler> {
        let (daten_tx, daten_rx) = mpsc::channel::<Bytes>(SENDE_QUEUE_GROESSE);

        // Verbindungsaufbau laeuft im Task; bis dahin puffert die Queue.
        // Schlaegt er fehl, schliesst die Queue und die Sitzung wird
        // beim naechsten Chunk als unbrauchbar erkannt.
        tokio::spawn(sitzungs_aufgabe(
            self.adresse.clone(),
            daten_rx,
            ereignisse,
        ));

        Ok(Box::new(TcpSitzung {
            daten_tx: Some(daten_tx),
        }))
    }
}

/// Verbindet, pumpt Chunks auf die Schreibseite und startet den Zeilen-Leser
async fn sitzungs_aufgabe(
    adresse: String,
    mut daten_rx: mpsc::Receiver<Bytes>,
    ereignisse: mpsc::Sender<ErkennungsEreignis>,
) {
    let stream = match TcpStream::connect(&adresse).await {
        Ok(stream) => stream,
        Err(fehler) => {
            tracing::warn!(adresse = %adresse, fehler = %fehler, "Engine nicht erreichbar");
            return;
        }
    };
    tracing::debug!(adresse = %adresse, "Engine-Sitzung verbunden");

    let (lese_haelfte, mut schreib_haelfte) = stream.into_split();

    // Der Leser lebt unabhaengig weiter: nach dem Sitzungs-Ende liefert
    // der Kollaborateur noch das finale Transkript
    tokio::spawn(ereignisse_lesen(lese_haelfte, ereignisse));

    while let Some(chunk) = daten_rx.recv().await {
        if let Err(fehler) = schreib_haelfte.write_all(&chunk).await {
            tracing::warn!(fehler = %fehler, "Engine-Schreibfehler – Sitzung endet");
            return;
        }
    }

    // Queue leergelaufen (beenden): Schreibseite geordnet schliessen
    let _ = schreib_haelfte.shutdown().await;
    tracing::debug!(adresse = %adresse, "Engine-Sitzung geschlossen");
}

/// Liest zeilenweises JSON und reicht Ereignisse in den Kanal
async fn ereignisse_lesen(
    haelfte: OwnedReadHalf,
    ereignisse: mpsc::Sender<ErkennungsEreignis>,
) {
    let mut zeilen = BufReader::new(haelfte).lines();
    while let Ok(Some(zeile)) = zeilen.next_line().await {
        match serde_json::from_str::<ErkennungsEreignis>(&zeile) {
            Ok(ereignis) => {
                if ereignisse.send(ereignis).await.is_err() {
                    break;
                }
            }
            Err(fehler) => {
                tracing::debug!(fehler = %fehler, "Unlesbare Engine-Zeile verworfen");
            }
        }
    }
    tracing::debug!("Engine-Lesekanal beendet");
}

// ---------------------------------------------------------------------------
// TcpSitzung
// ---------------------------------------------------------------------------

/// Handle auf die Sende-Queue einer laufenden Sitzung
struct TcpSitzung {
    /// `None` nach `beenden` – der Schreib-Task laeuft dann leer
    daten_tx: Option<mpsc::Sender<Bytes>>,
}

impl SpeechSitzung for TcpSitzung {
    fn ist_offen(&self) -> bool {
        self.daten_tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn ist_schreibbar(&self) -> bool {
        self.daten_tx
            .as_ref()
            .is_some_and(|tx| !tx.is_closed() && tx.capacity() > 0)
    }

    fn schreiben(&mut self, chunk: Bytes) -> Result<(), SpeechFehler> {
        let Some(tx) = &self.daten_tx else {
            return Err(SpeechFehler::SitzungGeschlossen);
        };
        tx.try_send(chunk).map_err(|fehler| match fehler {
            mpsc::error::TrySendError::Full(_) => SpeechFehler::NichtSchreibbar,
            mpsc::error::TrySendError::Closed(_) => SpeechFehler::SitzungGeschlossen,
        })
    }

    fn beenden(&mut self) {
        self.daten_tx = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
