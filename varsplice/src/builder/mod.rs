//! Construction of the splice graph of one projected transcript.
//!
//! The annotated signals form a base chain; broken sites are then repaired
//! (exon skipping, intron retention, cryptic sites), optionally new sites
//! and exon-definition changes near the variants are proposed, and the
//! result is pruned and scored.

mod broken;
mod denovo;
mod regulatory;
mod variants;

pub use variants::changed_intervals;

use anyhow::{ensure, Result};
use log::{debug, info, warn};
use splicemodel::{ContentScores, ContentType, Features, Model, SignalSensor, SignalType};

use crate::alignment::Alignment;
use crate::change::StructureChange;
use crate::graph::{EdgeId, SpliceGraph, Vertex, VertexId};
use crate::interval::Interval;
use crate::signals::SignalList;

/// A finished graph.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: SpliceGraph,
    /// The graph holds exactly the annotated signals and nothing else.
    pub exact: bool,
}

pub struct GraphBuilder<'a> {
    model: &'a Model,
    features: Features,
    signals: &'a SignalList,
    alt_seq: &'a [u8],
    ref_seq: &'a [u8],
    alt_to_ref: &'a Alignment,
    content: ContentScores,
    graph: SpliceGraph,
    variants: Option<Vec<Interval>>,
}

impl<'a> GraphBuilder<'a> {
    /// `alt_to_ref` maps positions of `alt_seq` onto `ref_seq`.
    pub fn new(
        model: &'a Model,
        signals: &'a SignalList,
        alt_seq: &'a [u8],
        ref_seq: &'a [u8],
        alt_to_ref: &'a Alignment,
    ) -> Self {
        Self {
            model,
            features: model.features,
            signals,
            alt_seq,
            ref_seq,
            alt_to_ref,
            content: model.content.prefix_sums(alt_seq),
            graph: SpliceGraph::new(signals.transcript_id.clone(), alt_seq.len() as i64),
            variants: None,
        }
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Build the graph. In `strict` mode only the annotated signals are
    /// used. Returns `None` when the signals cannot be chained.
    pub fn build(mut self, strict: bool) -> Result<Option<BuiltGraph>> {
        if !self.build_transcript_graph() {
            warn!("Cannot chain the signals of {}", self.signals.transcript_id);
            return Ok(None);
        }
        self.log_size("base chain");

        if !strict {
            if self.signals.any_broken() {
                self.handle_broken_sites();
                self.log_size("broken site repair");
            }
            if self.features.de_novo_sites {
                self.handle_de_novo_sites();
                self.log_size("de novo sites");
            }
            if self.features.regulatory_changes {
                self.handle_regulatory_changes();
                self.log_size("regulatory changes");
            }
            self.graph.prune();
            self.log_size("pruning");
        }
        self.mark_intron_retentions();
        let dropped = self.score_edges()?;
        if dropped > 0 && !strict {
            self.graph.prune();
        }
        self.log_size("scoring");

        let annotated = self.graph.vertices().filter(|(_, v)| v.annotated).count();
        let exact = self.graph.all_annotated() && annotated == self.signals.len() + 2;
        info!(
            "Built graph for {} with {} vertices and {} edges (exact: {})",
            self.signals.transcript_id,
            self.graph.num_vertices(),
            self.graph.num_edges(),
            exact
        );
        debug!("{}", self.graph);
        Ok(Some(BuiltGraph { graph: self.graph, exact }))
    }

    fn log_size(&self, stage: &str) {
        debug!(
            "{} after {}: {} vertices, {} edges",
            self.signals.transcript_id,
            stage,
            self.graph.num_vertices(),
            self.graph.num_edges()
        );
    }

    /// One vertex per signal plus the termini, joined in order.
    fn build_transcript_graph(&mut self) -> bool {
        let len = self.alt_seq.len() as i64;
        let signals = self.signals;
        let mut chain = Vec::with_capacity(signals.len() + 2);
        chain.push(self.graph.add_vertex(Vertex::new(SignalType::LeftTerminus, 0, 0, 0.0, true)));
        for signal in signals.iter() {
            let cons_len = self.model.sensors.find(signal.ty).map_or(0, |s| s.consensus_len());
            let score = self.score_signal(signal.ty, signal.pos);
            match self.new_vertex(signal.ty, signal.pos, signal.pos + cons_len, score, true, false) {
                Some(id) => {
                    self.graph.vertex_mut(id).broken = signal.broken;
                    chain.push(id);
                }
                None => return false,
            }
        }
        chain.push(
            self.graph
                .add_vertex(Vertex::new(SignalType::RightTerminus, len, len, 0.0, true)),
        );
        for pair in chain.windows(2) {
            let (left, right) = (pair[0], pair[1]);
            let left_ty = self.graph.vertex(left).ty;
            if left_ty == self.graph.vertex(right).ty {
                return false;
            }
            let Some(ty) = ContentType::following(left_ty) else {
                return false;
            };
            if self.new_edge(ty, left, right, true).is_none() {
                return false;
            }
        }
        true
    }

    /// Raw sensor score of a signal at its consensus position.
    fn score_signal(&self, ty: SignalType, pos: i64) -> f64 {
        match self.model.sensors.find(ty) {
            None => 0.0,
            Some(sensor) if !sensor.consensus_at(self.alt_seq, pos) => f64::NEG_INFINITY,
            Some(sensor) => sensor.score(self.alt_seq, pos - sensor.consensus_offset()),
        }
    }

    /// Add a vertex unless one with the same type and span exists. A
    /// refused de novo vertex marks the existing one as de novo.
    fn new_vertex(
        &mut self,
        ty: SignalType,
        begin: i64,
        end: i64,
        score: f64,
        annotated: bool,
        de_novo: bool,
    ) -> Option<VertexId> {
        if let Some(existing) = self.graph.find_vertex(ty, begin, end) {
            if de_novo {
                self.graph.vertex_mut(existing).de_novo = true;
            }
            debug!("Vertex {} at {} already exists", ty, begin);
            return None;
        }
        let mut vertex = Vertex::new(ty, begin, end, score, annotated);
        vertex.de_novo = de_novo;
        if let Some(sensor) = self.model.sensors.find(ty) {
            let window = begin - sensor.consensus_offset();
            if let Some(background) = &self.model.content.splice_background {
                vertex.score -= background.score_range(self.alt_seq, window, window + sensor.context_len());
            }
            vertex.seq = sensor.window_string(self.alt_seq, window);
            vertex.threshold = sensor.cutoff();
        }
        Some(self.graph.add_vertex(vertex))
    }

    /// Sensor window of a vertex, or its own span if it has no sensor.
    fn context_window(&self, id: VertexId) -> Interval {
        let v = self.graph.vertex(id);
        match self.model.sensors.find(v.ty) {
            Some(sensor) => {
                let begin = v.begin - sensor.consensus_offset();
                Interval::new(begin, begin + sensor.context_len())
            }
            None => Interval::new(v.begin, v.end),
        }
    }

    /// Add an edge between the context windows of two vertices, refusing
    /// empty spans and duplicates.
    fn new_edge(&mut self, ty: ContentType, left: VertexId, right: VertexId, annotated: bool) -> Option<EdgeId> {
        let begin = self.context_window(left).end;
        let end = self.context_window(right).begin;
        if end - begin < 1 {
            debug!("Refusing {} edge [{}, {}): too short", ty, begin, end);
            return None;
        }
        if self.graph.find_edge(ty, begin, end).is_some() {
            debug!("Refusing {} edge [{}, {}): duplicate", ty, begin, end);
            return None;
        }
        Some(self.graph.add_edge(ty, left, right, begin, end, annotated))
    }

    /// Edge from `left` to `right` whose content follows the left vertex.
    fn link_vertices(&mut self, left: VertexId, right: VertexId) -> Option<EdgeId> {
        let (l, r) = (self.graph.vertex(left), self.graph.vertex(right));
        if l.end >= r.begin || l.ty == r.ty {
            return None;
        }
        let ty = ContentType::following(l.ty)?;
        self.new_edge(ty, left, right, false)
    }

    fn tag(&mut self, edge: Option<EdgeId>, change: StructureChange) {
        if let Some(e) = edge {
            self.graph.edge_mut(e).change |= change;
        }
    }

    /// A site of `sensor`'s type with its consensus at `cons_pos`, if the
    /// window fits, shows the consensus and scores at least the cutoff.
    fn try_site(&mut self, sensor: &dyn SignalSensor, cons_pos: i64) -> Option<VertexId> {
        let begin = cons_pos - sensor.consensus_offset();
        if begin < 0 || begin + sensor.context_len() > self.alt_seq.len() as i64 {
            return None;
        }
        if !sensor.consensus_at(self.alt_seq, cons_pos) {
            return None;
        }
        let score = sensor.score(self.alt_seq, begin);
        if score < sensor.cutoff() {
            return None;
        }
        self.new_vertex(
            sensor.signal_type(),
            cons_pos,
            cons_pos + sensor.consensus_len(),
            score,
            false,
            false,
        )
    }

    /// Sites whose consensus starts in `positions`.
    fn find_sites(&mut self, sensor: &dyn SignalSensor, positions: Interval) -> Vec<VertexId> {
        (positions.begin..positions.end)
            .filter_map(|pos| self.try_site(sensor, pos))
            .collect()
    }

    fn find_annotated_left(&self, id: VertexId) -> Option<VertexId> {
        (0..id).rev().find(|&i| self.graph.vertex(i).annotated)
    }

    fn find_annotated_right(&self, id: VertexId) -> Option<VertexId> {
        (id + 1..self.graph.num_vertices()).find(|&i| self.graph.vertex(i).annotated)
    }

    fn variants(&mut self) -> Vec<Interval> {
        if self.variants.is_none() {
            let variants = changed_intervals(self.alt_seq, self.ref_seq, self.alt_to_ref);
            debug!("{} changed intervals in {}", variants.len(), self.signals.transcript_id);
            self.variants = Some(variants);
        }
        self.variants.clone().unwrap_or_default()
    }

    /// Tag exon edges that span an annotated intron.
    fn mark_intron_retentions(&mut self) {
        let introns: Vec<Interval> = self
            .graph
            .edges()
            .filter(|(_, e)| e.annotated && e.ty == ContentType::Intron)
            .map(|(_, e)| Interval::new(e.begin, e.end))
            .collect();
        let retained: Vec<EdgeId> = self
            .graph
            .edges()
            .filter(|(_, e)| e.ty == ContentType::Exon)
            .filter(|(_, e)| {
                let span = Interval::new(e.begin, e.end);
                introns.iter().any(|i| span.contains(i))
            })
            .map(|(id, _)| id)
            .collect();
        for id in retained {
            self.graph.edge_mut(id).change |= StructureChange::INTRON_RETENTION;
        }
    }

    /// Score every edge and drop those whose score is not finite. Returns
    /// the number of dropped edges.
    fn score_edges(&mut self) -> Result<usize> {
        let ids: Vec<EdgeId> = self.graph.edges().map(|(id, _)| id).collect();
        let mut dropped = 0;
        for id in ids {
            let score = self.score_edge(id)?;
            self.graph.edge_mut(id).score = score;
            if !score.is_finite() {
                self.graph.drop_edge(id);
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("Dropped {} edges with non-finite scores", dropped);
            self.graph.purge();
        }
        Ok(dropped)
    }

    fn score_edge(&self, id: EdgeId) -> Result<f64> {
        let edge = self.graph.edge(id);
        if edge.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }
        let content = self.content.score(edge.ty, edge.begin, edge.end);
        ensure!(
            content.is_finite(),
            "Non-finite {} content score over [{}, {})",
            edge.ty,
            edge.begin,
            edge.end
        );
        let duration = self.model.durations.get(edge.ty).log_p(edge.len());
        ensure!(
            duration.is_finite(),
            "Non-finite {} duration score for length {}",
            edge.ty,
            edge.len()
        );
        let (from, to) = (self.graph.vertex(edge.left).ty, self.graph.vertex(edge.right).ty);
        let transition = self.model.transitions.log_p(from, to);
        if !transition.is_finite() {
            debug!("No transition {} -> {} for edge [{}, {})", from, to, edge.begin, edge.end);
            return Ok(f64::NEG_INFINITY);
        }
        let score = content + duration + transition;
        let thresholds = &self.model.thresholds;
        if edge.change.intron_retention && score < thresholds.min_intron_retention_llr {
            return Ok(f64::NEG_INFINITY);
        }
        if edge.change.cryptic_exon && score < thresholds.min_cryptic_exon_llr {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::decompose;
    use crate::testutil;
    use rand::Rng;

    fn identity_build(features: Features, strict: bool) -> BuiltGraph {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let signals = decompose(&gene.transcript, &gene.transcript, &gene.seq, &gene.seq, &model.sensors).unwrap();
        let ali = Alignment::identity(gene.seq.len());
        GraphBuilder::new(&model, &signals, &gene.seq, &gene.seq, &ali)
            .with_features(features)
            .build(strict)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_strict_identity() {
        let built = identity_build(Features::all(), true);
        assert!(built.exact);
        assert_eq!(built.graph.num_vertices(), 8);
        assert_eq!(built.graph.num_edges(), 7);
        let types: Vec<_> = built.graph.edges().map(|(_, e)| e.ty).collect();
        assert_eq!(
            types,
            [
                ContentType::Intergenic,
                ContentType::Exon,
                ContentType::Intron,
                ContentType::Exon,
                ContentType::Intron,
                ContentType::Exon,
                ContentType::Intergenic
            ]
        );
        for (_, e) in built.graph.edges() {
            assert!(e.score.is_finite());
            assert!(!e.change.any());
        }
    }

    #[test]
    fn test_unchained_signals() {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let mut signals =
            decompose(&gene.transcript, &gene.transcript, &gene.seq, &gene.seq, &model.sensors).unwrap();
        signals.signals.swap(1, 2);
        let ali = Alignment::identity(gene.seq.len());
        let built = GraphBuilder::new(&model, &signals, &gene.seq, &gene.seq, &ali)
            .build(false)
            .unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_retention_marking() {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let signals = decompose(&gene.transcript, &gene.transcript, &gene.seq, &gene.seq, &model.sensors).unwrap();
        let ali = Alignment::identity(gene.seq.len());
        let mut builder = GraphBuilder::new(&model, &signals, &gene.seq, &gene.seq, &ali);
        assert!(builder.build_transcript_graph());
        // TSS .. TES spans both annotated introns; AG .. GT of the middle
        // exon matches an annotated exon.
        let tss = builder.graph.find_vertex(SignalType::Tss, 20, 20).unwrap();
        let tes = builder.graph.find_vertex(SignalType::Tes, 380, 380).unwrap();
        let spanning = builder.new_edge(ContentType::Exon, tss, tes, false).unwrap();
        builder.mark_intron_retentions();
        assert!(builder.graph.edge(spanning).change.intron_retention);
        let marked = builder.graph.edges().filter(|(_, e)| e.change.intron_retention).count();
        assert_eq!(marked, 1);
    }

    #[test]
    fn test_retention_floor() {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let (alt_seq, ali) = testutil::delete(&gene.seq, 218, 6);
        let alt = testutil::skipped_donor_transcript();
        let signals = decompose(&gene.transcript, &alt, &gene.seq, &alt_seq, &model.sensors).unwrap();
        let alt_to_ref = ali.inverse();
        let features = Features {
            intron_retention: true,
            ..Features::none()
        };

        let built = GraphBuilder::new(&model, &signals, &alt_seq, &gene.seq, &alt_to_ref)
            .with_features(features)
            .build(false)
            .unwrap()
            .unwrap();
        assert!(built.graph.edges().any(|(_, e)| e.change.intron_retention));

        let mut thresholds = model.thresholds.clone();
        thresholds.min_intron_retention_llr = 0.0;
        let strict_model = testutil::model().with_thresholds(thresholds);
        let built = GraphBuilder::new(&strict_model, &signals, &alt_seq, &gene.seq, &alt_to_ref)
            .with_features(features)
            .build(false)
            .unwrap()
            .unwrap();
        assert!(!built.graph.edges().any(|(_, e)| e.change.intron_retention));
    }

    #[test]
    fn test_random_variants_keep_invariants() {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let mut rng = rand::rng();
        for _ in 0..30 {
            let mut alt_seq = gene.seq.clone();
            for _ in 0..rng.random_range(1..6) {
                let pos = rng.random_range(0..alt_seq.len());
                alt_seq[pos] = b"ACGT"[rng.random_range(0..4)];
            }
            let ali = Alignment::identity(alt_seq.len());
            let signals =
                decompose(&gene.transcript, &gene.transcript, &gene.seq, &alt_seq, &model.sensors).unwrap();
            let Some(built) = GraphBuilder::new(&model, &signals, &alt_seq, &gene.seq, &ali)
                .with_features(Features::all())
                .build(false)
                .unwrap()
            else {
                continue;
            };
            let g = &built.graph;
            for (_, e) in g.edges() {
                assert!(e.begin < e.end);
                assert!(e.score.is_finite());
            }
            let mut seen = std::collections::HashSet::new();
            for (_, v) in g.vertices() {
                assert!(seen.insert((v.ty, v.begin, v.end)));
            }
        }
    }
}
