//! G.711 mu-law – Dekodierung und Pegelmass
//!
//! Telefonie-typische logarithmische 8-Bit-Kodierung linearer 14-Bit-Samples.
//! Hier wird nur dekodiert (der Kollaborateur nimmt mu-law direkt an);
//! gebraucht wird die lineare Form allein fuer das Stille-Mass.

/// Bias des mu-law-Segments (Standard-G.711)
const BIAS: i16 = 0x84;

/// Dekodiert ein einzelnes mu-law-Byte zu einem linearen Sample
pub fn sample_dekodieren(byte: u8) -> i16 {
    let byte = !byte;
    let vorzeichen = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantisse = byte & 0x0F;

    let mut sample = (((mantisse as i16) << 3) + BIAS) << exponent;
    sample -= BIAS;

    if vorzeichen != 0 {
        -sample
    } else {
        sample
    }
}

/// Dekodiert einen ganzen Chunk
pub fn dekodieren(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|b| sample_dekodieren(*b)).collect()
}

/// Median der Sample-Betraege eines Chunks
///
/// Bei gerader Laenge das Mittel der beiden mittleren Werte.
/// Leere Chunks haben den Pegel 0.
pub fn median_betrag(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut betraege: Vec<i32> = samples.iter().map(|s| (*s as i32).abs()).collect();
    betraege.sort_unstable();

    let mitte = betraege.len() / 2;
    if betraege.len() % 2 == 1 {
        betraege[mitte] as f64
    } else {
        (betraege[mitte - 1] + betraege[mitte]) as f64 / 2.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stille_bytes_dekodieren_zu_null() {
        // 0xFF ist die mu-law-Kodierung von 0, 0x7F die von -0
        assert_eq!(sample_dekodieren(0xFF), 0);
        assert_eq!(sample_dekodieren(0x7F), 0);
    }

    #[test]
    fn extremwerte() {
        // 0x00 ist der negative, 0x80 der positive Vollausschlag
        assert_eq!(sample_dekodieren(0x00), -32124);
        assert_eq!(sample_dekodieren(0x80), 32124);
    }

    #[test]
    fn segmentgrenzen() {
        // Werte aus der G.711-Dekodiertabelle
        assert_eq!(sample_dekodieren(0xFE), 8); // kleinster positiver Schritt
        assert_eq!(sample_dekodieren(0x7E), -8);
        assert_eq!(sample_dekodieren(0xF0), 120);
        assert_eq!(sample_dekodieren(0xEF), 132);
    }

    #[test]
    fn chunk_dekodieren() {
        let samples = dekodieren(&[0xFF, 0x80, 0x00]);
        assert_eq!(samples, vec![0, 32124, -32124]);
    }

    #[test]
    fn median_ungerade_laenge() {
        assert_eq!(median_betrag(&[3, -1, 2]), 2.0);
    }

    #[test]
    fn median_gerade_laenge() {
        // Betraege sortiert: 1, 2, 4, 6 -> (2 + 4) / 2
        assert_eq!(median_betrag(&[-4, 1, 6, -2]), 3.0);
    }

    #[test]
    fn median_leerer_chunk() {
        assert_eq!(median_betrag(&[]), 0.0);
    }

    #[test]
    fn median_nutzt_betraege() {
        // Ohne Betragsbildung waere der Median negativ
        assert_eq!(median_betrag(&[-100, -200, -300]), 200.0);
    }
}
