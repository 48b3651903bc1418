//! Per-transcript orchestration: project, decompose, build, enumerate and
//! judge.

use anyhow::Result;
use bstr::BString;
use log::{debug, info, warn};
use splicemodel::Model;

use crate::alignment::Alignment;
use crate::builder::GraphBuilder;
use crate::fate::{
    check_frameshift, classify, premature_stop, stop_is_premature, Decay, DecayRule, EjcRule, ProteinFate,
};
use crate::graph::SpliceGraph;
use crate::orf::{earlier_start_codon, lost_uorfs, noncoding_to_coding, refine_start_codon};
use crate::paths::{TranscriptPath, TranscriptPaths};
use crate::report::{AlternativeStructure, FailureTag, Finding, ProjectionReport, Status};
use crate::signals::decompose;
use crate::transcript::Transcript;

/// Everything known about one transcript before projection.
#[derive(Debug, Clone)]
pub struct ProjectionInput {
    pub ref_transcript: Transcript,
    /// Projected annotation, when the caller already has one. Otherwise
    /// the reference is projected through `alignment`.
    pub alt_transcript: Option<Transcript>,
    pub ref_seq: BString,
    pub alt_seq: BString,
    /// Maps reference positions onto the alternate sequence.
    pub alignment: Alignment,
}

impl ProjectionInput {
    pub fn id(&self) -> &str {
        &self.ref_transcript.id
    }
}

/// Sequences and annotation shared by every step of one check.
struct Context<'b> {
    reference: &'b Transcript,
    ref_seq: &'b [u8],
    alt_seq: &'b [u8],
    alt_to_ref: &'b Alignment,
    ref_to_alt: &'b Alignment,
    ref_protein: Option<String>,
}

impl Context<'_> {
    fn ref_has_utr3(&self) -> bool {
        self.reference
            .cds()
            .is_some_and(|cds| cds.end < self.reference.end())
    }
}

pub struct ProjectionChecker<'a> {
    model: &'a Model,
    decay: Box<dyn DecayRule>,
}

impl<'a> ProjectionChecker<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            decay: Box::new(EjcRule::new(model.thresholds.nmd_distance)),
        }
    }

    pub fn with_decay_rule(mut self, rule: impl DecayRule + 'static) -> Self {
        self.decay = Box::new(rule);
        self
    }

    pub fn check(&self, input: &ProjectionInput) -> Result<ProjectionReport> {
        let ref_seq: &[u8] = input.ref_seq.as_ref();
        let alt_seq: &[u8] = input.alt_seq.as_ref();
        let id = input.id();
        let gene_id = input.ref_transcript.gene_id.as_str();

        let (reference, extended, problems) = self.check_reference(&input.ref_transcript, ref_seq)?;
        if !problems.is_empty() {
            info!("{}: reference annotation is malformed", id);
            let mut report = ProjectionReport::failed(id, gene_id, FailureTag::BadReference);
            report.findings = problems;
            return Ok(report);
        }

        let alt_to_ref = input.alignment.inverse();
        let alt = match &input.alt_transcript {
            Some(t) => {
                let mut t = t.clone();
                if extended && t.is_coding() {
                    t.extend_cds_end(3)?;
                }
                t
            }
            None => reference.project(&input.alignment)?,
        };

        let signals = match decompose(&reference, &alt, ref_seq, alt_seq, &self.model.sensors) {
            Ok(signals) => signals,
            Err(err) => match err.downcast_ref::<FailureTag>() {
                Some(&tag) => {
                    info!("{}: {}", id, tag);
                    return Ok(ProjectionReport::failed(id, gene_id, tag));
                }
                None => return Err(err),
            },
        };
        let Some(built) = GraphBuilder::new(self.model, &signals, alt_seq, ref_seq, &alt_to_ref).build(false)? else {
            info!("{}: {}", id, FailureTag::NoGraph);
            return Ok(ProjectionReport::failed(id, gene_id, FailureTag::NoGraph));
        };
        let mut paths = TranscriptPaths::new(&built.graph);
        info!("{}: {} paths, exact: {}", id, paths.len(), built.exact);

        let ctx = Context {
            reference: &reference,
            ref_seq,
            alt_seq,
            alt_to_ref: &alt_to_ref,
            ref_to_alt: &input.alignment,
            ref_protein: match reference.is_coding() {
                true => Some(reference.protein(ref_seq)?),
                false => None,
            },
        };

        if built.exact && paths.len() == 1 {
            let mut report = ProjectionReport::new(id, gene_id, Status::Mapped);
            report.findings.extend(signals.weakened().filter_map(Finding::from_signal));
            match &ctx.ref_protein {
                Some(ref_protein) => self.handle_coding(&mut report, &ctx, &alt, ref_protein)?,
                None => self.handle_noncoding(&mut report, &ctx, &alt)?,
            }
            report.mapped_transcript = Some(alt);
            info!("{}: mapped", id);
            return Ok(report);
        }

        let mut report = ProjectionReport::new(id, gene_id, Status::SplicingChanges);
        report.findings.extend(signals.iter().filter_map(Finding::from_signal));
        report.mapped_transcript = Some(alt);
        if paths.is_empty() {
            report.status = Status::NoTranscript;
            info!("{}: no transcript", id);
            return Ok(report);
        }

        let thresholds = &self.model.thresholds;
        let ref_log_likelihood = self.reference_likelihood(&reference, ref_seq)?;
        paths.compute_posteriors();
        paths.compute_lrs(ref_log_likelihood);
        paths.filter(thresholds.min_path_score);
        paths.sort();
        paths.truncate(thresholds.max_alternatives);
        for (i, path) in paths.iter().enumerate() {
            let alt_id = format!("ALT{}_{}", i, id);
            let transcript = path.to_transcript(&built.graph, &alt_id, gene_id, reference.strand)?;
            let alternative = self.alternative(&ctx, &built.graph, path, transcript, signals.start_codon)?;
            report.alternatives.push(alternative);
        }
        if report.alternatives.is_empty() {
            report.status = Status::NoTranscript;
        }
        info!("{}: {} alternative structures", id, report.alternatives.len());
        Ok(report)
    }

    /// Coding consequences of a projection that kept the annotated
    /// structure.
    fn handle_coding(
        &self,
        report: &mut ProjectionReport,
        ctx: &Context,
        alt: &Transcript,
        ref_protein: &str,
    ) -> Result<()> {
        let sensors = &self.model.sensors;
        if !alt.is_coding() {
            report.findings.push(Finding::StartCodonLost);
            report.fate = Some(ProteinFate::Noncoding);
            return Ok(());
        }
        let alt_protein = alt.protein(ctx.alt_seq)?;
        if !alt_protein.starts_with('M') {
            report.findings.push(Finding::NoStartCodon);
        }
        if alt_protein != ref_protein {
            if let Some(shift) = check_frameshift(ctx.reference, alt, ctx.alt_to_ref) {
                report.findings.push(Finding::Frameshift(shift));
            }
        }
        let decay = self.decay.predict(alt, ctx.alt_seq, sensors)?;
        let ptc = premature_stop(&alt_protein);
        if let Some(aa_pos) = ptc {
            let (ejc_distance, nmd) = match decay {
                Decay::Nmd { ejc_distance } => (ejc_distance, true),
                Decay::Stop { ejc_distance } => (ejc_distance, false),
                Decay::NoStart | Decay::NoStop => (0, false),
            };
            report.findings.push(Finding::PrematureStop {
                aa_pos,
                protein_len: alt_protein.len(),
                ejc_distance,
                nmd,
            });
        }
        report.findings.extend(
            lost_uorfs(sensors, ctx.reference, ctx.ref_seq, alt, ctx.alt_seq, ctx.ref_to_alt)?
                .into_iter()
                .map(Finding::LostUorf),
        );
        if let Some(earlier) = earlier_start_codon(sensors, ctx.reference, ctx.ref_seq, alt, ctx.alt_seq, ctx.alt_to_ref)? {
            report.findings.push(Finding::EarlierStartCodon {
                from: earlier.old_start,
                to: earlier.orf.start,
                reason: earlier.reason,
                old_orf_len: earlier.old_len,
                new_orf_len: earlier.orf.len,
            });
        }
        report.fate = Some(classify(decay, ptc.is_some(), &alt_protein, ref_protein, ctx.ref_has_utr3()));
        Ok(())
    }

    fn handle_noncoding(&self, report: &mut ProjectionReport, ctx: &Context, alt: &Transcript) -> Result<()> {
        let gain = noncoding_to_coding(
            &self.model.sensors,
            self.model.thresholds.min_orf_len,
            ctx.reference,
            ctx.ref_seq,
            alt,
            ctx.alt_seq,
        )?;
        if let Some((reason, orf)) = gain {
            report.findings.push(Finding::OrfGain {
                reason,
                start: orf.start,
                len: orf.len,
            });
        }
        report.fate = Some(ProteinFate::Noncoding);
        Ok(())
    }

    /// Materialise one ranked path: find its reading frame, then its fate.
    fn alternative(
        &self,
        ctx: &Context,
        graph: &SpliceGraph,
        path: &TranscriptPath,
        mut transcript: Transcript,
        start_codon: Option<i64>,
    ) -> Result<AlternativeStructure> {
        let sensors = &self.model.sensors;
        let mut findings = Vec::new();
        if let (Some(_), Some(start)) = (&ctx.ref_protein, start_codon) {
            match refine_start_codon(sensors, &transcript, ctx.alt_seq, start)? {
                Some(new_start) => {
                    if new_start != start {
                        findings.push(Finding::StartCodonChange {
                            from: start,
                            to: new_start,
                        });
                    }
                    transcript.split_utr_and_cds(ctx.alt_seq, new_start, &sensors.stop_codons)?;
                }
                None => findings.push(Finding::StartCodonLost),
            }
            let earlier = earlier_start_codon(
                sensors,
                ctx.reference,
                ctx.ref_seq,
                &transcript,
                ctx.alt_seq,
                ctx.alt_to_ref,
            )?;
            if let Some(earlier) = earlier {
                findings.push(Finding::EarlierStartCodon {
                    from: earlier.old_start,
                    to: earlier.orf.start,
                    reason: earlier.reason,
                    old_orf_len: earlier.old_len,
                    new_orf_len: earlier.orf.len,
                });
                transcript = earlier.orf.transcript;
            }
        }

        let decay = self.decay.predict(&transcript, ctx.alt_seq, sensors)?;
        let protein = match transcript.is_coding() {
            true => Some(transcript.protein(ctx.alt_seq)?),
            false => None,
        };
        let fate = match &ctx.ref_protein {
            Some(ref_protein) => classify(
                decay,
                stop_is_premature(&transcript, ctx.reference, ctx.alt_to_ref),
                protein.as_deref().unwrap_or_default(),
                ref_protein,
                ctx.ref_has_utr3(),
            ),
            None => ProteinFate::Noncoding,
        };
        debug!("{}: {:?}", transcript.id, fate);
        Ok(AlternativeStructure {
            fate,
            structure_change: path.change,
            cryptic_signals: path.cryptic_signals(graph),
            score: path.score,
            posterior: path.posterior,
            likelihood_ratio: path.lr,
            findings,
            protein,
            transcript,
        })
    }

    /// Score of the annotated structure on the reference sequence.
    fn reference_likelihood(&self, reference: &Transcript, ref_seq: &[u8]) -> Result<f64> {
        let signals = decompose(reference, reference, ref_seq, ref_seq, &self.model.sensors)?;
        let identity = Alignment::identity(ref_seq.len());
        let Some(built) = GraphBuilder::new(self.model, &signals, ref_seq, ref_seq, &identity).build(true)? else {
            warn!("Cannot build the reference graph of {}", reference.id);
            return Ok(f64::NEG_INFINITY);
        };
        let paths = TranscriptPaths::new(&built.graph);
        if paths.len() != 1 {
            warn!("{} reference paths for {}", paths.len(), reference.id);
        }
        Ok(paths.iter().map(|p| p.score).fold(f64::NEG_INFINITY, f64::max))
    }

    /// Well-formedness of the reference annotation. A coding region that
    /// stops short of its stop codon is extended over it; the returned flag
    /// says whether that happened.
    fn check_reference(&self, reference: &Transcript, seq: &[u8]) -> Result<(Transcript, bool, Vec<Finding>)> {
        let sensors = &self.model.sensors;
        let mut reference = reference.clone();
        let mut extended = false;
        let mut problems = Vec::new();

        if reference.is_coding() {
            let mut protein = reference.protein(seq)?;
            if !protein.ends_with('*') && premature_stop(&protein).is_none() {
                let mut longer = reference.clone();
                if longer.extend_cds_end(3).is_ok() {
                    let p = longer.protein(seq)?;
                    if p.ends_with('*') {
                        debug!("Extended the coding region of {} over its stop codon", reference.id);
                        reference = longer;
                        protein = p;
                        extended = true;
                    }
                }
            }
            if !protein.starts_with('M') {
                problems.push(Finding::NoStartCodon);
            }
            let decay = self.decay.predict(&reference, seq, sensors)?;
            let ejc = match decay {
                Decay::Nmd { ejc_distance } | Decay::Stop { ejc_distance } => ejc_distance,
                Decay::NoStart | Decay::NoStop => 0,
            };
            let nmd = matches!(decay, Decay::Nmd { .. });
            match premature_stop(&protein) {
                Some(aa_pos) => problems.push(Finding::PrematureStop {
                    aa_pos,
                    protein_len: protein.len(),
                    ejc_distance: ejc,
                    nmd,
                }),
                None if !protein.ends_with('*') => problems.push(Finding::NoStopCodon),
                None if nmd => problems.push(Finding::PrematureStop {
                    aa_pos: protein.len().saturating_sub(1),
                    protein_len: protein.len(),
                    ejc_distance: ejc,
                    nmd,
                }),
                None => {}
            }
        }

        for pair in reference.exons().windows(2) {
            let donor = pair[0].end;
            if !sensors.donor.is_consensus(dinucleotide(seq, donor)) {
                problems.push(Finding::BadDonor {
                    pos: donor,
                    consensus: String::from_utf8_lossy(dinucleotide(seq, donor)).into_owned(),
                });
            }
            let acceptor = pair[1].begin - 2;
            if !sensors.acceptor.is_consensus(dinucleotide(seq, acceptor)) {
                problems.push(Finding::BadAcceptor {
                    pos: acceptor,
                    consensus: String::from_utf8_lossy(dinucleotide(seq, acceptor)).into_owned(),
                });
            }
        }
        Ok((reference, extended, problems))
    }
}

fn dinucleotide(seq: &[u8], pos: i64) -> &[u8] {
    if pos < 0 || pos + 2 > seq.len() as i64 {
        &[]
    } else {
        &seq[pos as usize..pos as usize + 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn input(gene: &testutil::Gene, alt_seq: Vec<u8>, alignment: Alignment) -> ProjectionInput {
        ProjectionInput {
            ref_transcript: gene.transcript.clone(),
            alt_transcript: None,
            ref_seq: gene.seq.clone().into(),
            alt_seq: alt_seq.into(),
            alignment,
        }
    }

    #[test]
    fn test_bad_reference() {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let mut broken = gene.clone();
        broken.seq[60] = b'C';
        let ali = Alignment::identity(broken.seq.len());
        let report = ProjectionChecker::new(&model)
            .check(&input(&broken, broken.seq.clone(), ali))
            .unwrap();
        assert_eq!(report.status, Status::Failed);
        assert_eq!(report.failure, Some(FailureTag::BadReference));
        assert_eq!(
            report.findings,
            [Finding::BadDonor {
                pos: 60,
                consensus: "CT".to_string()
            }]
        );
    }

    #[test]
    fn test_stop_codon_outside_cds() {
        // the annotated coding region ends before the stop codon
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let checker = ProjectionChecker::new(&model);
        let short = Transcript::new("t", "g", gene.transcript.strand, [(20, 60), (160, 220), (320, 380)], Some((25, 336)))
            .unwrap();
        let (reference, extended, problems) = checker.check_reference(&short, &gene.seq).unwrap();
        assert!(extended);
        assert!(problems.is_empty());
        assert_eq!(reference.cds(), gene.transcript.cds());
    }

    #[test]
    fn test_premature_stop_in_mapped_projection() {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let mut alt_seq = gene.seq.clone();
        alt_seq[31..34].copy_from_slice(b"TAG");
        let ali = Alignment::identity(alt_seq.len());
        let report = ProjectionChecker::new(&model)
            .check(&input(&gene, alt_seq, ali))
            .unwrap();
        assert!(report.is_mapped());
        assert_eq!(report.fate, Some(ProteinFate::Nmd { ejc_distance: 89 }));
        assert!(report.findings.contains(&Finding::PrematureStop {
            aa_pos: 2,
            protein_len: 38,
            ejc_distance: 89,
            nmd: true
        }));
    }
}
