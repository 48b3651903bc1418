use anyhow::{bail, Result};
use serde::Serialize;
use splicemodel::{SignalSensor, SignalSensors, SignalType};
use std::f64::consts::LN_2;

use crate::change::StructureChange;
use crate::report::FailureTag;
use crate::transcript::{Strand, Transcript};

/// One boundary marker of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    #[serde(rename = "type")]
    pub ty: SignalType,
    pub pos: i64,
    pub score: f64,
    pub ref_score: f64,
    pub cutoff: f64,
    pub broken: bool,
    pub weakened: bool,
    pub cryptic: bool,
    pub de_novo: bool,
    /// Reference and alternate context windows with their scores.
    pub window: String,
}

impl Signal {
    fn unscored(ty: SignalType, pos: i64) -> Self {
        Self {
            ty,
            pos,
            score: 0.0,
            ref_score: 0.0,
            cutoff: 0.0,
            broken: false,
            weakened: false,
            cryptic: false,
            de_novo: false,
            window: String::new(),
        }
    }

    /// The sensor could not score the site at all.
    pub fn is_dead(&self) -> bool {
        self.score == f64::NEG_INFINITY
    }
}

/// Ordered signals of one projected transcript.
#[derive(Debug, Clone, Serialize)]
pub struct SignalList {
    pub transcript_id: String,
    pub gene_id: String,
    pub signals: Vec<Signal>,
    /// Genomic position of the start codon on the alternate sequence.
    pub start_codon: Option<i64>,
    pub change: StructureChange,
}

impl SignalList {
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn any_broken(&self) -> bool {
        self.signals.iter().any(|s| s.broken)
    }

    pub fn broken(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.broken)
    }

    pub fn weakened(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.weakened)
    }
}

/// Break a projected transcript into its boundary signals and judge each
/// splice site against the reference.
///
/// Fails with [`FailureTag::UnequalExonCount`] when the projection gained
/// or lost exons.
pub fn decompose(
    ref_transcript: &Transcript,
    alt_transcript: &Transcript,
    ref_seq: &[u8],
    alt_seq: &[u8],
    sensors: &SignalSensors,
) -> Result<SignalList> {
    if alt_transcript.strand != Strand::Forward || ref_transcript.strand != Strand::Forward {
        bail!("Transcript {} is not on the forward strand", alt_transcript.id);
    }
    let ref_exons = ref_transcript.exons();
    let alt_exons = alt_transcript.exons();
    if ref_exons.len() != alt_exons.len() {
        return Err(FailureTag::UnequalExonCount.into());
    }
    let n = alt_exons.len();
    let mut signals = Vec::with_capacity(2 * n);
    for (i, (ref_exon, alt_exon)) in ref_exons.iter().zip(alt_exons).enumerate() {
        if i == 0 {
            signals.push(Signal::unscored(SignalType::Tss, alt_exon.begin));
        } else {
            signals.push(check_site(
                sensors.acceptor.as_ref(),
                ref_seq,
                alt_seq,
                ref_exon.begin - 2,
                alt_exon.begin - 2,
            ));
        }
        if i + 1 < n {
            signals.push(check_site(
                sensors.donor.as_ref(),
                ref_seq,
                alt_seq,
                ref_exon.end,
                alt_exon.end,
            ));
        } else {
            signals.push(Signal::unscored(SignalType::Tes, alt_exon.end));
        }
    }
    Ok(SignalList {
        transcript_id: alt_transcript.id.clone(),
        gene_id: alt_transcript.gene_id.clone(),
        signals,
        start_codon: alt_transcript.coding_segments().first().map(|s| s.begin),
        change: StructureChange::default(),
    })
}

fn consensus(seq: &[u8], pos: i64, len: i64) -> Option<&[u8]> {
    if pos < 0 || pos + len > seq.len() as i64 {
        None
    } else {
        Some(&seq[pos as usize..(pos + len) as usize])
    }
}

fn check_site(sensor: &dyn SignalSensor, ref_seq: &[u8], alt_seq: &[u8], ref_pos: i64, alt_pos: i64) -> Signal {
    let len = sensor.consensus_len();
    let offset = sensor.consensus_offset();
    let broken = match (consensus(ref_seq, ref_pos, len), consensus(alt_seq, alt_pos, len)) {
        (_, None) => true,
        (Some(r), Some(a)) if r.eq_ignore_ascii_case(a) => false,
        (_, Some(a)) => !sensor.is_consensus(a),
    };
    let score = sensor.score(alt_seq, alt_pos - offset);
    let ref_score = sensor.score(ref_seq, ref_pos - offset);
    let cutoff = sensor.cutoff();
    let weakened = !broken && ref_score >= cutoff && score < cutoff && ref_score - score >= LN_2;
    let window = format!(
        "{} {:.2} {} {:.2}",
        sensor.window_string(ref_seq, ref_pos - offset),
        ref_score,
        sensor.window_string(alt_seq, alt_pos - offset),
        score
    );
    Signal {
        ty: sensor.signal_type(),
        pos: alt_pos,
        score,
        ref_score,
        cutoff,
        broken,
        weakened,
        cryptic: false,
        de_novo: false,
        window,
    }
}
