use anyhow::Result;
use serde::Serialize;
use splicemodel::SignalSensors;

use crate::alignment::{Alignment, Direction};
use crate::transcript::Transcript;

/// How translation of a transcript ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decay {
    NoStart,
    NoStop,
    /// The first in-frame stop lies far enough upstream of the last exon
    /// junction to trigger nonsense-mediated decay.
    Nmd { ejc_distance: i64 },
    Stop { ejc_distance: i64 },
}

/// Predicts the decay class of a coding transcript.
pub trait DecayRule: Send + Sync {
    fn predict(&self, transcript: &Transcript, seq: &[u8], sensors: &SignalSensors) -> Result<Decay>;
}

/// Nonsense-mediated decay by distance from the stop codon to the last
/// exon junction complex.
#[derive(Debug, Clone, Copy)]
pub struct EjcRule {
    pub distance: i64,
}

impl EjcRule {
    pub fn new(distance: i64) -> Self {
        Self { distance }
    }
}

impl DecayRule for EjcRule {
    fn predict(&self, transcript: &Transcript, seq: &[u8], sensors: &SignalSensors) -> Result<Decay> {
        let Some(cds) = transcript.spliced_cds() else {
            return Ok(Decay::NoStart);
        };
        let rna = transcript.spliced_sequence(seq)?;
        let last_exon = transcript.exons().last().map_or(0, |e| e.len());
        let last_ejc = transcript.spliced_len() - last_exon;
        let mut pos = cds.begin;
        while pos + 3 <= rna.len() as i64 {
            if sensors.is_stop_codon(&rna[pos as usize..pos as usize + 3]) {
                let ejc_distance = last_ejc - pos;
                return Ok(if ejc_distance >= self.distance {
                    Decay::Nmd { ejc_distance }
                } else {
                    Decay::Stop { ejc_distance }
                });
            }
            pos += 3;
        }
        Ok(Decay::NoStop)
    }
}

/// What happens to the protein product of a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "fate", rename_all = "kebab-case")]
pub enum ProteinFate {
    IdenticalProtein,
    ProteinDiffers { percent_match: f64 },
    #[serde(rename = "NMD")]
    Nmd { ejc_distance: i64 },
    #[serde(rename = "protein-truncation")]
    Truncation { percent_identity: f64, ejc_distance: i64 },
    NonstopDecay,
    Noncoding,
}

/// Decide the fate from the decay class and the two proteins. `premature`
/// says whether the stop codon ends translation before the reference stop.
pub fn classify(
    decay: Decay,
    premature: bool,
    alt_protein: &str,
    ref_protein: &str,
    ref_has_utr3: bool,
) -> ProteinFate {
    match decay {
        Decay::NoStart => ProteinFate::Noncoding,
        Decay::Nmd { ejc_distance } => ProteinFate::Nmd { ejc_distance },
        Decay::NoStop if ref_has_utr3 => ProteinFate::NonstopDecay,
        Decay::Stop { ejc_distance } if premature => ProteinFate::Truncation {
            percent_identity: percent_match(alt_protein, ref_protein),
            ejc_distance,
        },
        _ if alt_protein == ref_protein => ProteinFate::IdenticalProtein,
        _ => ProteinFate::ProteinDiffers {
            percent_match: percent_match(alt_protein, ref_protein),
        },
    }
}

/// Share of positions, in percent, at which two proteins agree, over the
/// length of the longer one.
pub fn percent_match(a: &str, b: &str) -> f64 {
    let len = a.len().max(b.len());
    if len == 0 {
        return 100.0;
    }
    let same = a.bytes().zip(b.bytes()).filter(|(x, y)| x == y).count();
    100.0 * same as f64 / len as f64
}

/// Amino-acid position of a stop codon before the last residue.
pub fn premature_stop(protein: &str) -> Option<usize> {
    protein.find('*').filter(|&pos| pos + 1 < protein.len())
}

/// Whether the stop codon of `alt` maps upstream of the reference stop.
pub fn stop_is_premature(alt: &Transcript, reference: &Transcript, alt_to_ref: &Alignment) -> bool {
    let (Some(alt_cds), Some(ref_cds)) = (alt.cds(), reference.cds()) else {
        return false;
    };
    match alt_to_ref.map_approximate(alt_cds.end - 3, Direction::None) {
        Some(pos) => pos < ref_cds.end - 3,
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Frameshift {
    pub mismatches: i64,
    pub percent: f64,
}

/// Compare the codon phase of every alternate coding base with the phase
/// of the reference base it is aligned to.
pub fn check_frameshift(reference: &Transcript, alt: &Transcript, alt_to_ref: &Alignment) -> Option<Frameshift> {
    let mut phase = 0;
    let (mut matches, mut mismatches) = (0i64, 0i64);
    for segment in alt.coding_segments() {
        for pos in segment.begin..segment.end {
            if let Some(ref_phase) = alt_to_ref.map(pos).and_then(|r| reference.phase_at(r)) {
                if ref_phase == phase {
                    matches += 1;
                } else {
                    mismatches += 1;
                }
            }
            phase = (phase + 1) % 3;
        }
    }
    if mismatches == 0 {
        return None;
    }
    let total = (matches + mismatches) as f64;
    let percent = (1000.0 * mismatches as f64 / total + 5.0 / 9.0).trunc() / 10.0;
    Some(Frameshift { mismatches, percent })
}
