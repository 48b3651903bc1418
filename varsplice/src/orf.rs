//! Open reading frames and start codons on spliced transcripts.
//!
//! All scanning happens on the spliced RNA; positions handed back to
//! callers are genomic unless stated otherwise.

use anyhow::{bail, Result};
use log::debug;
use serde::Serialize;
use splicemodel::{SignalSensor, SignalSensors};

use crate::alignment::{Alignment, Direction};
use crate::transcript::Transcript;

/// A start codon in spliced coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartCodon {
    pub pos: i64,
    pub score: f64,
}

/// The start codon sensor, or the short one when the full window would
/// not fit around `pos`.
fn start_sensor<'a>(sensors: &'a SignalSensors, rna: &[u8], pos: i64) -> &'a dyn SignalSensor {
    let sensor = sensors.start_codon.as_ref();
    let begin = pos - sensor.consensus_offset();
    if begin < 0 || begin + sensor.context_len() > rna.len() as i64 {
        sensors.short_start.as_ref()
    } else {
        sensor
    }
}

fn score_with(sensor: &dyn SignalSensor, rna: &[u8], pos: i64) -> f64 {
    let begin = pos - sensor.consensus_offset();
    if begin < 0 || begin + sensor.context_len() > rna.len() as i64 || !sensor.consensus_at(rna, pos) {
        return f64::NEG_INFINITY;
    }
    sensor.score(rna, begin)
}

/// Score of a start codon at spliced `pos` together with the cutoff of the
/// sensor that scored it.
pub fn start_codon_score(sensors: &SignalSensors, rna: &[u8], pos: i64) -> (f64, f64) {
    let sensor = start_sensor(sensors, rna, pos);
    (score_with(sensor, rna, pos), sensor.cutoff())
}

/// Every start codon whose full window fits in `rna` and scores at least
/// the cutoff, in order.
pub fn find_start_codons<'a>(sensors: &'a SignalSensors, rna: &'a [u8]) -> impl Iterator<Item = StartCodon> + 'a {
    let sensor = sensors.start_codon.as_ref();
    let offset = sensor.consensus_offset();
    let last = rna.len() as i64 - sensor.context_len();
    (0..=last).filter_map(move |begin| {
        if !sensor.consensus_at(rna, begin + offset) {
            return None;
        }
        let score = sensor.score(rna, begin);
        (score >= sensor.cutoff()).then_some(StartCodon {
            pos: begin + offset,
            score,
        })
    })
}

/// An open reading frame found by scanning.
#[derive(Debug, Clone)]
pub struct Orf {
    /// Copy of the scanned transcript with its coding region set to the ORF.
    pub transcript: Transcript,
    /// Genomic position of the start codon.
    pub start: i64,
    pub start_score: f64,
    pub len: i64,
}

/// ORF from the first recognised start codon to the first in-frame stop.
pub fn find_orf(sensors: &SignalSensors, transcript: &Transcript, seq: &[u8]) -> Result<Option<Orf>> {
    let rna = transcript.spliced_sequence(seq)?;
    let Some(codon) = find_start_codons(sensors, &rna).next() else {
        return Ok(None);
    };
    let Some(start) = transcript.to_genomic(codon.pos) else {
        bail!("Start codon at {} lies outside {}", codon.pos, transcript.id);
    };
    let mut orf = transcript.clone();
    orf.forget_cds();
    orf.split_utr_and_cds(seq, start, &sensors.stop_codons)?;
    let len = orf.spliced_cds().map_or(0, |c| c.len());
    Ok(Some(Orf {
        transcript: orf,
        start,
        start_score: codon.score,
        len,
    }))
}

/// First spliced position at or downstream of genomic `pos`.
fn spliced_at_or_after(transcript: &Transcript, pos: i64) -> Option<i64> {
    let mut cum_len = 0;
    for exon in transcript.exons() {
        if exon.end > pos {
            return Some(cum_len + (pos - exon.begin).max(0));
        }
        cum_len += exon.len();
    }
    None
}

/// Scan downstream from the old start codon for the first acceptable one.
/// The old position itself is scored with the short sensor. Returns the
/// genomic position of the new start codon, if any.
pub fn refine_start_codon(
    sensors: &SignalSensors,
    transcript: &Transcript,
    seq: &[u8],
    old_start: i64,
) -> Result<Option<i64>> {
    let rna = transcript.spliced_sequence(seq)?;
    let Some(mut pos) = spliced_at_or_after(transcript, old_start) else {
        return Ok(None);
    };
    let sensor = sensors.start_codon.as_ref();
    let (offset, window) = (sensor.consensus_offset(), sensor.context_len());
    let len = rna.len() as i64;
    let mut first = true;
    while pos - offset + window <= len {
        let scorer = if first || pos - offset < 0 {
            sensors.short_start.as_ref()
        } else {
            sensor
        };
        if score_with(scorer, &rna, pos) >= scorer.cutoff() {
            return Ok(transcript.to_genomic(pos));
        }
        pos += 1;
        first = false;
    }
    Ok(None)
}

/// Why a noncoding transcript is reported as gaining an ORF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrfGain {
    #[serde(rename = "ref-no-start-codon")]
    RefNoStartCodon,
    #[serde(rename = "ref-ORF-too-short")]
    RefOrfTooShort,
    #[serde(rename = "possible-misannotation")]
    PossibleMisannotation,
}

/// Compare the ORFs of a noncoding reference and its projection. Returns
/// the alternate ORF when it looks like a real coding gain.
pub fn noncoding_to_coding(
    sensors: &SignalSensors,
    min_orf_len: i64,
    ref_transcript: &Transcript,
    ref_seq: &[u8],
    alt_transcript: &Transcript,
    alt_seq: &[u8],
) -> Result<Option<(OrfGain, Orf)>> {
    let ref_orf = find_orf(sensors, ref_transcript, ref_seq)?;
    let Some(alt_orf) = find_orf(sensors, alt_transcript, alt_seq)? else {
        return Ok(None);
    };
    if alt_orf.len < min_orf_len {
        return Ok(None);
    }
    let gain = match ref_orf {
        None => OrfGain::RefNoStartCodon,
        Some(r) if r.len < min_orf_len && alt_orf.len >= 2 * r.len => OrfGain::RefOrfTooShort,
        Some(r) if alt_orf.len >= r.len => OrfGain::PossibleMisannotation,
        Some(_) => return Ok(None),
    };
    debug!("{} gains an ORF of {} nt: {:?}", alt_transcript.id, alt_orf.len, gain);
    Ok(Some((gain, alt_orf)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EarlierStartReason {
    WasIntronic,
    BadConsensus,
    ScoreBelowThreshold,
}

#[derive(Debug, Clone)]
pub struct EarlierStart {
    pub orf: Orf,
    pub reason: EarlierStartReason,
    pub old_len: i64,
    pub old_start: i64,
}

/// An upstream start codon in the alternate transcript that the reference
/// could not have used: it was intronic, lacked the consensus or scored
/// below the cutoff there.
pub fn earlier_start_codon(
    sensors: &SignalSensors,
    ref_transcript: &Transcript,
    ref_seq: &[u8],
    alt_transcript: &Transcript,
    alt_seq: &[u8],
    alt_to_ref: &Alignment,
) -> Result<Option<EarlierStart>> {
    let Some(cds) = alt_transcript.cds() else {
        return Ok(None);
    };
    let Some(orf) = find_orf(sensors, alt_transcript, alt_seq)? else {
        return Ok(None);
    };
    if orf.start >= cds.begin {
        return Ok(None);
    }
    let sensor = sensors.start_codon.as_ref();
    let ref_local = alt_to_ref
        .map_approximate(orf.start, Direction::Right)
        .and_then(|p| ref_transcript.to_spliced(p));
    let reason = match ref_local {
        None => EarlierStartReason::WasIntronic,
        Some(local) => {
            let ref_rna = ref_transcript.spliced_sequence(ref_seq)?;
            let begin = local - sensor.consensus_offset();
            if !sensor.consensus_at(&ref_rna, local) {
                EarlierStartReason::BadConsensus
            } else if begin >= 0 && sensor.score(&ref_rna, begin) < sensor.cutoff() {
                EarlierStartReason::ScoreBelowThreshold
            } else {
                return Ok(None);
            }
        }
    };
    let old_len = alt_transcript.spliced_cds().map_or(0, |c| c.len());
    Ok(Some(EarlierStart {
        orf,
        reason,
        old_len,
        old_start: cds.begin,
    }))
}

/// An upstream ORF of the reference whose start codon the alternate
/// transcript no longer recognises.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LostUorf {
    pub ref_pos: i64,
    pub ref_score: f64,
    pub ref_window: String,
    pub orf_len: i64,
    /// `None` when the start codon is no longer exonic.
    pub alt_pos: Option<i64>,
    pub alt_score: f64,
    pub alt_window: String,
    pub cutoff: f64,
}

pub fn lost_uorfs(
    sensors: &SignalSensors,
    ref_transcript: &Transcript,
    ref_seq: &[u8],
    alt_transcript: &Transcript,
    alt_seq: &[u8],
    ref_to_alt: &Alignment,
) -> Result<Vec<LostUorf>> {
    let Some(main) = ref_transcript.spliced_cds() else {
        return Ok(Vec::new());
    };
    let ref_rna = ref_transcript.spliced_sequence(ref_seq)?;
    let alt_rna = alt_transcript.spliced_sequence(alt_seq)?;
    let mut lost = Vec::new();
    for codon in find_start_codons(sensors, &ref_rna).take_while(|c| c.pos < main.begin) {
        let Some(ref_pos) = ref_transcript.to_genomic(codon.pos) else {
            continue;
        };
        let alt_genomic = ref_to_alt.map_approximate(ref_pos, Direction::None);
        let alt_spliced = alt_genomic.and_then(|p| alt_transcript.to_spliced(p));
        let (alt_score, cutoff, alt_window) = match alt_spliced {
            Some(local) => {
                let sensor = start_sensor(sensors, &alt_rna, local);
                let window = sensor.window_string(&alt_rna, local - sensor.consensus_offset());
                (score_with(sensor, &alt_rna, local), sensor.cutoff(), window)
            }
            None => (f64::NEG_INFINITY, sensors.start_codon.cutoff(), "intronic".to_string()),
        };
        if alt_score.is_finite() && alt_score >= cutoff {
            continue;
        }
        let mut uorf = ref_transcript.clone();
        uorf.forget_cds();
        uorf.split_utr_and_cds(ref_seq, ref_pos, &sensors.stop_codons)?;
        let sensor = sensors.start_codon.as_ref();
        lost.push(LostUorf {
            ref_pos,
            ref_score: codon.score,
            ref_window: sensor.window_string(&ref_rna, codon.pos - sensor.consensus_offset()),
            orf_len: uorf.spliced_cds().map_or(0, |c| c.len()),
            alt_pos: alt_spliced.and(alt_genomic),
            alt_score,
            alt_window,
            cutoff,
        });
    }
    Ok(lost)
}
