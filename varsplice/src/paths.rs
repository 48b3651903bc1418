use anyhow::{bail, Result};
use log::{debug, warn};
use splicemodel::{ContentType, SignalType};

use crate::change::StructureChange;
use crate::graph::{EdgeId, SpliceGraph, VertexId};
use crate::signals::Signal;
use crate::transcript::{Strand, Transcript};

/// Number of bases a start or stop codon vertex adds to its exon.
const CODON_LEN: i64 = 3;

/// One terminus-to-terminus walk through a splice graph.
#[derive(Debug, Clone)]
pub struct TranscriptPath {
    pub vertices: Vec<VertexId>,
    pub edges: Vec<EdgeId>,
    /// Left vertex score plus, for every edge, the edge score and the
    /// score of the vertex it enters.
    pub score: f64,
    pub posterior: f64,
    /// Likelihood ratio against the reference structure.
    pub lr: f64,
    pub change: StructureChange,
}

impl TranscriptPath {
    fn new(graph: &SpliceGraph, edges: Vec<EdgeId>) -> Self {
        let mut vertices = Vec::with_capacity(edges.len() + 1);
        let mut change = StructureChange::default();
        let mut score = 0.0;
        if let Some(&first) = edges.first() {
            let left = graph.edge(first).left;
            vertices.push(left);
            score += graph.vertex(left).score;
        }
        for &e in &edges {
            let edge = graph.edge(e);
            vertices.push(edge.right);
            score += edge.score + graph.vertex(edge.right).score;
            change |= edge.change;
        }
        Self {
            vertices,
            edges,
            score,
            posterior: 0.0,
            lr: 0.0,
            change,
        }
    }

    /// Every vertex on the walk is one of the annotated signals.
    pub fn fully_annotated(&self, graph: &SpliceGraph) -> bool {
        self.vertices.iter().all(|&v| graph.vertex(v).annotated)
    }

    /// Exon layout of the walk. Exons bounded by a start or stop codon
    /// vertex include the codon.
    pub fn to_transcript(
        &self,
        graph: &SpliceGraph,
        id: &str,
        gene_id: &str,
        strand: Strand,
    ) -> Result<Transcript> {
        let exons: Vec<(i64, i64)> = self
            .edges
            .iter()
            .map(|&e| graph.edge(e))
            .filter(|e| e.ty == ContentType::Exon)
            .map(|e| {
                let (left, right) = (graph.vertex(e.left), graph.vertex(e.right));
                let mut begin = left.end;
                let mut end = right.begin;
                if left.ty.is_start_or_stop() {
                    begin -= CODON_LEN;
                }
                if right.ty.is_start_or_stop() {
                    end += CODON_LEN;
                }
                (begin, end)
            })
            .collect();
        if exons.is_empty() {
            bail!("Path for {} has no exons", id);
        }
        Transcript::new(id, gene_id, strand, exons, None)
    }

    /// Signals on the walk that were not in the annotation.
    pub fn cryptic_signals(&self, graph: &SpliceGraph) -> Vec<Signal> {
        self.vertices
            .iter()
            .map(|&v| graph.vertex(v))
            .filter(|v| !v.annotated)
            .map(|v| Signal {
                ty: v.ty,
                pos: v.begin,
                score: v.raw_score,
                ref_score: f64::NAN,
                cutoff: v.threshold,
                broken: false,
                weakened: false,
                cryptic: true,
                de_novo: v.de_novo,
                window: v.seq.clone(),
            })
            .collect()
    }
}

/// All walks of a graph, in discovery order until sorted.
#[derive(Debug, Clone, Default)]
pub struct TranscriptPaths {
    paths: Vec<TranscriptPath>,
}

impl TranscriptPaths {
    /// Enumerate every walk from the left terminus to the right terminus.
    pub fn new(graph: &SpliceGraph) -> Self {
        let mut paths = Vec::new();
        let (Some(start), Some(_)) = (
            graph.find_terminus(SignalType::LeftTerminus),
            graph.find_terminus(SignalType::RightTerminus),
        ) else {
            warn!("Graph for {} has no termini", graph.substrate);
            return Self { paths };
        };

        let mut stack: Vec<Vec<EdgeId>> = graph
            .edges_out(start)
            .iter()
            .rev()
            .map(|&e| vec![e])
            .collect();
        while let Some(walk) = stack.pop() {
            let Some(&last) = walk.last() else {
                continue;
            };
            let tip = graph.edge(last).right;
            if graph.vertex(tip).ty == SignalType::RightTerminus {
                paths.push(TranscriptPath::new(graph, walk));
                continue;
            }
            for &e in graph.edges_out(tip).iter().rev() {
                let mut next = walk.clone();
                next.push(e);
                stack.push(next);
            }
        }
        debug!("{} paths through {}", paths.len(), graph.substrate);
        Self { paths }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&TranscriptPath> {
        self.paths.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptPath> {
        self.paths.iter()
    }

    /// Normalise path scores into posterior weights.
    pub fn compute_posteriors(&mut self) {
        let max = self
            .paths
            .iter()
            .map(|p| p.score)
            .fold(f64::NEG_INFINITY, f64::max);
        let total = max + self.paths.iter().map(|p| (p.score - max).exp()).sum::<f64>().ln();
        for path in &mut self.paths {
            let posterior = (path.score - total).exp();
            if posterior.is_finite() {
                path.posterior = posterior;
            } else {
                warn!("Non-finite posterior for path with score {}", path.score);
                path.posterior = 0.0;
            }
        }
    }

    pub fn compute_lrs(&mut self, ref_log_likelihood: f64) {
        for path in &mut self.paths {
            path.lr = (path.score - ref_log_likelihood).exp();
        }
    }

    /// Keep paths whose posterior is at least `min_posterior`. Call after
    /// [`TranscriptPaths::compute_posteriors`].
    pub fn filter(&mut self, min_posterior: f64) {
        let before = self.paths.len();
        self.paths.retain(|p| p.posterior >= min_posterior);
        if self.paths.len() < before {
            debug!("Filtered {} paths below {}", before - self.paths.len(), min_posterior);
        }
    }

    /// Best first; ties keep discovery order.
    pub fn sort(&mut self) {
        self.paths.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    pub fn truncate(&mut self, max: usize) {
        self.paths.truncate(max);
    }
}

impl IntoIterator for TranscriptPaths {
    type Item = TranscriptPath;
    type IntoIter = std::vec::IntoIter<TranscriptPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::builder::GraphBuilder;
    use crate::graph::Vertex;
    use crate::signals::decompose;
    use crate::testutil;
    use splicemodel::Features;

    #[test]
    fn test_strict_identity_single_path() {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let signals = decompose(&gene.transcript, &gene.transcript, &gene.seq, &gene.seq, &model.sensors).unwrap();
        let ali = Alignment::identity(gene.seq.len());
        let built = GraphBuilder::new(&model, &signals, &gene.seq, &gene.seq, &ali)
            .build(true)
            .unwrap()
            .unwrap();
        let paths = TranscriptPaths::new(&built.graph);
        assert_eq!(paths.len(), 1);
        let path = paths.get(0).unwrap();
        assert!(path.fully_annotated(&built.graph));
        assert!(!path.change.any());
        assert!(path.score.is_finite());
        let t = path
            .to_transcript(&built.graph, "t", "g", Strand::Forward)
            .unwrap();
        assert_eq!(t.exons(), gene.transcript.exons());
        assert!(path.cryptic_signals(&built.graph).is_empty());
    }

    #[test]
    fn test_exon_skipping_paths() {
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let (alt_seq, ali) = testutil::delete(&gene.seq, 218, 6);
        let alt = testutil::skipped_donor_transcript();
        let signals = decompose(&gene.transcript, &alt, &gene.seq, &alt_seq, &model.sensors).unwrap();
        let alt_to_ref = ali.inverse();
        let built = GraphBuilder::new(&model, &signals, &alt_seq, &gene.seq, &alt_to_ref)
            .with_features(Features {
                exon_skipping: true,
                ..Features::none()
            })
            .build(false)
            .unwrap()
            .unwrap();
        let mut paths = TranscriptPaths::new(&built.graph);
        assert_eq!(paths.len(), 1);
        paths.compute_posteriors();
        let path = paths.get(0).unwrap();
        assert!((path.posterior - 1.0).abs() < 1e-9);
        assert!(path.change.exon_skipping);
        assert!(!path.fully_annotated(&built.graph));
        let t = path
            .to_transcript(&built.graph, "ALT0_t", "g", Strand::Forward)
            .unwrap();
        let exons: Vec<_> = t.exons().iter().map(|e| (e.begin, e.end)).collect();
        assert_eq!(exons, [(20, 60), (314, 374)]);
    }

    #[test]
    fn test_rank_and_truncate() {
        // three parallel exon edges of different lengths between the same
        // pair of intergenic stretches
        let mut g = SpliceGraph::new("s", 100);
        let lt = g.add_vertex(Vertex::new(SignalType::LeftTerminus, 0, 0, 0.0, true));
        let tss = g.add_vertex(Vertex::new(SignalType::Tss, 10, 10, 0.0, true));
        let tes1 = g.add_vertex(Vertex::new(SignalType::Tes, 40, 40, 0.0, true));
        let tes2 = g.add_vertex(Vertex::new(SignalType::Tes, 50, 50, -1.0, false));
        let tes3 = g.add_vertex(Vertex::new(SignalType::Tes, 60, 60, 0.5, false));
        let rt = g.add_vertex(Vertex::new(SignalType::RightTerminus, 100, 100, 0.0, true));
        g.add_edge(ContentType::Intergenic, lt, tss, 0, 10, true);
        for (tes, score) in [(tes1, -2.0), (tes2, -2.0), (tes3, -2.0)] {
            let end = g.vertex(tes).begin;
            let e = g.add_edge(ContentType::Exon, tss, tes, 10, end, false);
            g.edge_mut(e).score = score;
            g.add_edge(ContentType::Intergenic, tes, rt, end, 100, false);
        }
        let mut paths = TranscriptPaths::new(&g);
        assert_eq!(paths.len(), 3);
        paths.compute_posteriors();
        let total: f64 = paths.iter().map(|p| p.posterior).sum();
        assert!((total - 1.0).abs() < 1e-9);
        paths.sort();
        let tails: Vec<_> = paths
            .iter()
            .map(|p| g.vertex(p.vertices[2]).begin)
            .collect();
        assert_eq!(tails, [60, 40, 50]);
        paths.filter(0.2);
        assert_eq!(paths.len(), 2);
        paths.truncate(1);
        assert_eq!(paths.len(), 1);
        paths.compute_lrs(-1.5);
        assert!((paths.get(0).unwrap().lr - 1.0).abs() < 1e-9);
    }
}
