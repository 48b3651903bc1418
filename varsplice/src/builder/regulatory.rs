use splicemodel::{ContentType, SignalType};

use super::GraphBuilder;
use crate::alignment::Direction;
use crate::change::StructureChange;
use crate::graph::VertexId;
use crate::interval::Interval;

/// Flank added on both sides of a variant when comparing exon content.
const REGULATORY_FLANK: i64 = 5;

/// An annotated exon edge: its vertices and the exon they delimit.
#[derive(Debug, Clone, Copy)]
struct ExonSpan {
    left: VertexId,
    right: VertexId,
    span: Interval,
}

impl GraphBuilder<'_> {
    /// Propose skips, shortened or extended exons and deep intronic
    /// cryptic exons where a variant changes exon definition.
    pub(super) fn handle_regulatory_changes(&mut self) {
        let variants = self.variants();
        if variants.is_empty() {
            return;
        }
        self.graph.sort();
        let exons = self.annotated_exons();
        self.handle_exon_weakening(&variants, &exons);
        self.handle_exon_shortening(&variants, &exons);
        self.handle_exon_extension(&variants, &exons);
        self.handle_deep_intronic(&variants, &exons);
    }

    fn annotated_exons(&self) -> Vec<ExonSpan> {
        let mut exons: Vec<ExonSpan> = self
            .graph
            .edges()
            .filter(|(_, e)| e.annotated && e.ty == ContentType::Exon)
            .map(|(_, e)| ExonSpan {
                left: e.left,
                right: e.right,
                span: Interval::new(self.graph.vertex(e.left).end, self.graph.vertex(e.right).begin),
            })
            .collect();
        exons.sort_by_key(|e| e.span.begin);
        exons
    }

    /// Ratio of per-base exon likelihood in the alternate window to that
    /// of the aligned reference window.
    fn exon_def_change(&self, window: Interval) -> f64 {
        if window.is_empty() {
            return 1.0;
        }
        let alt = self.content.score(ContentType::Exon, window.begin, window.end) / window.len() as f64;
        let ref_begin = self.alt_to_ref.map_approximate(window.begin, Direction::None);
        let ref_end = self.alt_to_ref.map_approximate(window.end, Direction::None);
        let (Some(ref_begin), Some(ref_end)) = (ref_begin, ref_end) else {
            return 1.0;
        };
        if ref_end <= ref_begin {
            return 1.0;
        }
        let reference = self
            .model
            .content
            .exon
            .score_range(self.ref_seq, ref_begin, ref_end)
            / (ref_end - ref_begin) as f64;
        (alt - reference).exp()
    }

    fn flanked(variant: &Interval) -> Interval {
        Interval::new(variant.begin - REGULATORY_FLANK, variant.end + REGULATORY_FLANK)
    }

    fn handle_exon_weakening(&mut self, variants: &[Interval], exons: &[ExonSpan]) {
        let weakening = self.model.thresholds.exon_weakening_threshold;
        for v in variants {
            let Some(exon) = exons.iter().find(|e| e.span.overlaps(v)) else {
                continue;
            };
            let window = Self::flanked(v).intersect(&exon.span);
            if self.exon_def_change(window) < weakening {
                self.add_exon_skipping_edges(exon);
            }
        }
    }

    /// Join every donor between the previous annotated vertex and the exon
    /// to every acceptor between the exon and the next annotated vertex.
    fn add_exon_skipping_edges(&mut self, exon: &ExonSpan) {
        let (begin_ty, end_ty) = (self.graph.vertex(exon.left).ty, self.graph.vertex(exon.right).ty);
        if !begin_ty.is_splice_site() || !end_ty.is_splice_site() {
            return;
        }
        let (Some(left), Some(right)) =
            (self.find_annotated_left(exon.left), self.find_annotated_right(exon.right))
        else {
            return;
        };
        let donors: Vec<VertexId> = (left..=exon.left)
            .filter(|&i| self.graph.vertex(i).ty == SignalType::Gt)
            .collect();
        let acceptors: Vec<VertexId> = (exon.right..=right)
            .filter(|&i| self.graph.vertex(i).ty == SignalType::Ag)
            .collect();
        for &donor in &donors {
            for &acceptor in &acceptors {
                let edge = self.link_vertices(donor, acceptor);
                self.tag(edge, StructureChange::EXON_SKIPPING | StructureChange::REGULATORY);
            }
        }
    }

    fn handle_exon_shortening(&mut self, variants: &[Interval], exons: &[ExonSpan]) {
        let model = self.model;
        let (shift, weakening) = (model.thresholds.max_splice_shift, model.thresholds.exon_weakening_threshold);
        for v in variants {
            for exon in exons {
                if !exon.span.overlaps(v) {
                    continue;
                }
                let to_right = exon.span.end - v.begin;
                let to_left = v.end - exon.span.begin;
                if to_right.min(to_left) > shift {
                    continue;
                }
                let window = Self::flanked(v).intersect(&exon.span);
                if self.exon_def_change(window) >= weakening {
                    continue;
                }
                if to_right <= to_left {
                    // new donor between the variant and the old exon end
                    let sites = self.find_sites(
                        model.sensors.donor.as_ref(),
                        Interval::new(exon.span.end - shift, v.begin),
                    );
                    self.rewire(&sites, exon.right);
                } else {
                    let sites = self.find_sites(
                        model.sensors.acceptor.as_ref(),
                        Interval::new(v.end, exon.span.begin + shift),
                    );
                    self.rewire(&sites, exon.left);
                }
            }
        }
    }

    /// Give each new site the neighbours of `like`.
    fn rewire(&mut self, sites: &[VertexId], like: VertexId) {
        let edges_in = self.graph.edges_in(like).to_vec();
        let edges_out = self.graph.edges_out(like).to_vec();
        for &site in sites {
            for &e in &edges_out {
                let right = self.graph.edge(e).right;
                let edge = self.link_vertices(site, right);
                self.tag(edge, StructureChange::REGULATORY);
            }
            for &e in &edges_in {
                let left = self.graph.edge(e).left;
                let edge = self.link_vertices(left, site);
                self.tag(edge, StructureChange::REGULATORY);
            }
        }
    }

    fn handle_exon_extension(&mut self, variants: &[Interval], exons: &[ExonSpan]) {
        let model = self.model;
        let (shift, strengthening) = (model.thresholds.max_splice_shift, model.thresholds.exon_strengthening_threshold);
        for v in variants {
            if exons.iter().any(|e| e.span.overlaps(v)) {
                continue;
            }
            for exon in exons {
                if v.distance_to(&exon.span) > shift {
                    continue;
                }
                let upstream = v.end <= exon.span.begin;
                let mut window = Self::flanked(v);
                if upstream {
                    window.end = window.end.min(exon.span.begin);
                } else {
                    window.begin = window.begin.max(exon.span.end);
                }
                if window.is_empty() || self.exon_def_change(window) <= strengthening {
                    continue;
                }
                if upstream {
                    let sites = self.find_sites(
                        model.sensors.acceptor.as_ref(),
                        Interval::new(exon.span.begin - shift, v.begin),
                    );
                    self.rewire(&sites, exon.left);
                } else {
                    let sites = self.find_sites(
                        model.sensors.donor.as_ref(),
                        Interval::new(v.end, exon.span.end + shift),
                    );
                    self.rewire(&sites, exon.right);
                }
            }
        }
    }

    fn handle_deep_intronic(&mut self, variants: &[Interval], exons: &[ExonSpan]) {
        let thresholds = &self.model.thresholds;
        let (min_intron, strengthening) = (thresholds.min_intron_len, thresholds.exon_strengthening_threshold);
        for v in variants {
            if exons.iter().any(|e| e.span.overlaps(v)) {
                continue;
            }
            for pair in exons.windows(2) {
                let (this, next) = (&pair[0], &pair[1]);
                let intron = Interval::new(this.span.end, next.span.begin);
                if !intron.overlaps(v) {
                    continue;
                }
                if v.begin - intron.begin < min_intron || intron.end - v.end < min_intron {
                    continue;
                }
                let window = Self::flanked(v);
                if !intron.contains(&window) || self.exon_def_change(window) <= strengthening {
                    continue;
                }
                self.propose_cryptic_exon(v, this.right, next.left);
            }
        }
    }

    /// Pair acceptors upstream of the variant with donors downstream of it
    /// and splice each qualifying pair into the surrounding intron.
    fn propose_cryptic_exon(&mut self, v: &Interval, prev_exon_end: VertexId, next_exon_begin: VertexId) {
        let model = self.model;
        let thresholds = &model.thresholds;
        let max_len = thresholds.max_cryptic_exon_len;
        let acceptors = self.find_sites(model.sensors.acceptor.as_ref(), Interval::new(v.begin - max_len, v.begin));
        let donors = self.find_sites(model.sensors.donor.as_ref(), Interval::new(v.end, v.end + max_len));
        let outer_donors: Vec<VertexId> = (prev_exon_end..=next_exon_begin)
            .filter(|&i| self.graph.vertex(i).ty == SignalType::Gt)
            .collect();
        let outer_acceptors: Vec<VertexId> = (prev_exon_end..=next_exon_begin)
            .filter(|&i| self.graph.vertex(i).ty == SignalType::Ag)
            .collect();

        for &acceptor in &acceptors {
            for &donor in &donors {
                let (a, d) = (self.graph.vertex(acceptor), self.graph.vertex(donor));
                let exon_len = d.begin - a.end;
                if exon_len > max_len || exon_len < thresholds.min_cryptic_exon_len {
                    continue;
                }
                if self.exon_intron_ratio(acceptor, donor) < thresholds.min_exon_intron_ratio {
                    continue;
                }
                let exon = self.link_vertices(acceptor, donor);
                self.tag(exon, StructureChange::CRYPTIC_EXON | StructureChange::REGULATORY);
                for &outer in &outer_donors {
                    if self.graph.vertex(acceptor).begin - self.graph.vertex(outer).end >= thresholds.min_intron_len {
                        let edge = self.link_vertices(outer, acceptor);
                        self.tag(edge, StructureChange::REGULATORY);
                    }
                }
                for &outer in &outer_acceptors {
                    if self.graph.vertex(outer).begin - self.graph.vertex(donor).end >= thresholds.min_intron_len {
                        let edge = self.link_vertices(donor, outer);
                        self.tag(edge, StructureChange::REGULATORY);
                    }
                }
            }
        }
    }

    /// Likelihood ratio of exon over intron content between two vertices.
    fn exon_intron_ratio(&self, acceptor: VertexId, donor: VertexId) -> f64 {
        let begin = self.context_window(acceptor).end;
        let end = self.context_window(donor).begin;
        let exon = self.content.score(ContentType::Exon, begin, end);
        let intron = self.content.score(ContentType::Intron, begin, end);
        (exon - intron).exp()
    }
}

#[cfg(test)]
mod tests {
    use crate::alignment::Alignment;
    use crate::builder::{BuiltGraph, GraphBuilder};
    use crate::signals::decompose;
    use crate::testutil;
    use splicemodel::{ContentType, Features, SignalType};

    fn build_regulatory(gene: &testutil::Gene, alt_seq: &[u8]) -> BuiltGraph {
        let model = testutil::model();
        let ali = Alignment::identity(alt_seq.len());
        let signals = decompose(&gene.transcript, &gene.transcript, &gene.seq, alt_seq, &model.sensors).unwrap();
        GraphBuilder::new(&model, &signals, alt_seq, &gene.seq, &ali)
            .with_features(Features {
                regulatory_changes: true,
                ..Features::none()
            })
            .build(false)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_exon_weakening() {
        let gene = testutil::three_exon_gene();
        // A-rich stretch inside the all-GC middle exon [160, 220)
        let mut alt_seq = gene.seq.clone();
        alt_seq[164..199].fill(b'A');
        let built = build_regulatory(&gene, &alt_seq);
        let g = &built.graph;
        // nothing new to splice to, only the skip
        assert!(g.vertices().all(|(_, v)| v.annotated));
        let skip = g.find_edge(ContentType::Intron, 64, 316).unwrap();
        let donor = g.find_vertex(SignalType::Gt, 60, 62).unwrap();
        let acceptor = g.find_vertex(SignalType::Ag, 318, 320).unwrap();
        assert_eq!((g.edge(skip).left, g.edge(skip).right), (donor, acceptor));
        assert!(g.edge(skip).change.exon_skipping);
        assert!(g.edge(skip).change.regulatory);
        assert!(!g.edge(skip).annotated);
    }

    #[test]
    fn test_exon_shortening() {
        let gene = testutil::three_exon_gene();
        // a T-rich stretch 40 bases before the donor at 220 moves the exon end
        // to the GT it creates at 179
        let mut alt_seq = gene.seq.clone();
        alt_seq[180..216].fill(b'T');
        let built = build_regulatory(&gene, &alt_seq);
        let g = &built.graph;
        let site = g.find_vertex(SignalType::Gt, 179, 181).unwrap();
        assert!(!g.vertex(site).annotated);
        // only a donor is proposed, never an acceptor
        assert_eq!(g.vertices().filter(|(_, v)| v.ty == SignalType::Ag).count(), 2);

        let acceptor = g.find_vertex(SignalType::Ag, 158, 160).unwrap();
        let next_acceptor = g.find_vertex(SignalType::Ag, 318, 320).unwrap();
        let exon = g.edges_in(site);
        assert_eq!(exon.len(), 1);
        let exon = g.edge(exon[0]);
        assert_eq!((exon.ty, exon.left), (ContentType::Exon, acceptor));
        assert!(exon.change.regulatory);
        let intron = g.edges_out(site);
        assert_eq!(intron.len(), 1);
        let intron = g.edge(intron[0]);
        assert_eq!((intron.ty, intron.right), (ContentType::Intron, next_acceptor));
        assert!(intron.change.regulatory);
        assert!(!built.exact);
    }

    #[test]
    fn test_exon_extension() {
        let gene = testutil::long_intron_gene();
        let mut alt_seq = gene.seq.clone();
        // GC-rich stretch just after the first exon, with a donor beyond it
        alt_seq[86..116].fill(b'C');
        alt_seq[120] = b'G';
        // GC-rich stretch just before the second exon, with an acceptor
        // further upstream
        alt_seq[650..676].fill(b'C');
        alt_seq[630..633].copy_from_slice(b"AGC");
        let built = build_regulatory(&gene, &alt_seq);
        let g = &built.graph;
        assert_eq!(g.num_vertices(), 8);
        let tss = g.find_vertex(SignalType::Tss, 20, 20).unwrap();
        let tes = g.find_vertex(SignalType::Tes, 740, 740).unwrap();
        let donor = g.find_vertex(SignalType::Gt, 80, 82).unwrap();
        let acceptor = g.find_vertex(SignalType::Ag, 678, 680).unwrap();

        // downstream of the first exon: a later donor takes over its end
        let new_donor = g.find_vertex(SignalType::Gt, 120, 122).unwrap();
        let lefts: Vec<_> = g.edges_in(new_donor).iter().map(|&e| g.edge(e).left).collect();
        let rights: Vec<_> = g.edges_out(new_donor).iter().map(|&e| g.edge(e).right).collect();
        assert_eq!(lefts, [tss]);
        assert_eq!(rights, [acceptor]);

        // upstream of the second exon: an earlier acceptor takes over its start
        let new_acceptor = g.find_vertex(SignalType::Ag, 630, 632).unwrap();
        let lefts: Vec<_> = g.edges_in(new_acceptor).iter().map(|&e| g.edge(e).left).collect();
        let rights: Vec<_> = g.edges_out(new_acceptor).iter().map(|&e| g.edge(e).right).collect();
        assert_eq!(lefts, [donor]);
        assert_eq!(rights, [tes]);

        for site in [new_donor, new_acceptor] {
            let edges = g.edges_in(site).iter().chain(g.edges_out(site));
            for &e in edges {
                assert!(g.edge(e).change.regulatory);
                assert!(!g.edge(e).change.cryptic_exon);
            }
        }
    }

    #[test]
    fn test_deep_intronic_cryptic_exon() {
        let model = testutil::model();
        let gene = testutil::long_intron_gene();
        // an acceptor and a donor 40 bases apart in the middle of the
        // intron; the variant between them makes the region look exonic
        let mut ref_seq = gene.seq.clone();
        ref_seq[398] = b'A';
        ref_seq[399] = b'G';
        ref_seq[440] = b'G';
        ref_seq[441] = b'T';
        let mut alt_seq = ref_seq.clone();
        alt_seq[412..432].fill(b'C');
        let ali = Alignment::identity(alt_seq.len());
        let signals = decompose(&gene.transcript, &gene.transcript, &ref_seq, &alt_seq, &model.sensors).unwrap();
        let built = GraphBuilder::new(&model, &signals, &alt_seq, &ref_seq, &ali)
            .with_features(Features {
                regulatory_changes: true,
                ..Features::none()
            })
            .build(false)
            .unwrap()
            .unwrap();
        let g = &built.graph;
        let acceptor = g.find_vertex(SignalType::Ag, 398, 400).unwrap();
        let donor = g.find_vertex(SignalType::Gt, 440, 442).unwrap();
        let exon = g
            .edges_out(acceptor)
            .iter()
            .find(|&&e| g.edge(e).right == donor)
            .copied()
            .unwrap();
        assert!(g.edge(exon).change.cryptic_exon);
        assert!(g.edge(exon).change.regulatory);
        assert_eq!(g.edges_in(acceptor).len(), 1);
        assert_eq!(g.edges_out(donor).len(), 1);
        assert!(!built.exact);
    }
}
