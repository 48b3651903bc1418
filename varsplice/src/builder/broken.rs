use splicemodel::{ContentType, SignalType};

use super::GraphBuilder;
use crate::change::StructureChange;
use crate::graph::{EdgeId, VertexId};

impl GraphBuilder<'_> {
    /// Offer alternatives around every broken vertex, then remove the
    /// broken vertices and their edges.
    pub(super) fn handle_broken_sites(&mut self) {
        let n = self.graph.num_vertices();
        for id in 0..n {
            if self.graph.vertex(id).broken {
                self.handle_broken_site(id);
            }
        }
        let broken: Vec<VertexId> = self
            .graph
            .vertices()
            .filter(|(_, v)| v.broken)
            .map(|(id, _)| id)
            .collect();
        for id in broken {
            self.graph.drop_vertex(id);
        }
        self.graph.purge();
    }

    fn handle_broken_site(&mut self, id: VertexId) {
        if self.features.exon_skipping {
            self.handle_exon_skipping(id);
        }
        if self.features.intron_retention {
            self.handle_intron_retention(id);
        }
        if self.features.cryptic_sites {
            self.handle_cryptic_site(id);
        }
    }

    fn annotated_edge(&self, edges: &[EdgeId]) -> Option<EdgeId> {
        edges.iter().copied().find(|&e| self.graph.edge(e).annotated)
    }

    fn annotated_edges(&self, id: VertexId) -> Option<(EdgeId, EdgeId)> {
        let left = self.annotated_edge(self.graph.edges_in(id))?;
        let right = self.annotated_edge(self.graph.edges_out(id))?;
        Some((left, right))
    }

    fn handle_exon_skipping(&mut self, id: VertexId) {
        let Some((left_edge, right_edge)) = self.annotated_edges(id) else {
            return;
        };
        if self.graph.edge(left_edge).ty == ContentType::Exon {
            self.skip_left(left_edge, right_edge);
        } else if self.graph.edge(right_edge).ty == ContentType::Exon {
            self.skip_right(left_edge, right_edge);
        }
    }

    /// The lost exon lies left of the broken vertex: join every intron
    /// entering the exon to the intron leaving the broken vertex.
    fn skip_left(&mut self, left_edge: EdgeId, right_edge: EdgeId) {
        if self.graph.edge(right_edge).ty != ContentType::Intron {
            return;
        }
        let to = self.graph.edge(right_edge).right;
        let introns = self.edges_of_type(self.graph.edges_in(self.graph.edge(left_edge).left), ContentType::Intron);
        for intron in introns {
            let from = self.graph.edge(intron).left;
            let edge = self.new_edge(ContentType::Intron, from, to, false);
            self.tag(edge, StructureChange::EXON_SKIPPING);
        }
    }

    fn skip_right(&mut self, left_edge: EdgeId, right_edge: EdgeId) {
        if self.graph.edge(left_edge).ty != ContentType::Intron {
            return;
        }
        let from = self.graph.edge(left_edge).left;
        let introns = self.edges_of_type(self.graph.edges_out(self.graph.edge(right_edge).right), ContentType::Intron);
        for intron in introns {
            let to = self.graph.edge(intron).right;
            let edge = self.new_edge(ContentType::Intron, from, to, false);
            self.tag(edge, StructureChange::EXON_SKIPPING);
        }
    }

    fn edges_of_type(&self, edges: &[EdgeId], ty: ContentType) -> Vec<EdgeId> {
        // the first incident edge decides whether the neighbour is usable
        match edges.first() {
            Some(&e) if self.graph.edge(e).ty == ty => {
                edges.iter().copied().filter(|&e| self.graph.edge(e).ty == ty).collect()
            }
            _ => Vec::new(),
        }
    }

    fn handle_intron_retention(&mut self, id: VertexId) {
        let Some((left_edge, right_edge)) = self.annotated_edges(id) else {
            return;
        };
        if self.graph.edge(left_edge).ty == ContentType::Intron {
            self.retain_left(left_edge, right_edge);
        } else if self.graph.edge(right_edge).ty == ContentType::Intron {
            self.retain_right(left_edge, right_edge);
        }
    }

    /// The broken vertex ends an intron: continue every exon entering the
    /// intron straight through it.
    fn retain_left(&mut self, left_edge: EdgeId, right_edge: EdgeId) {
        let to = self.graph.edge(right_edge).right;
        let exons = self.edges_of_type(self.graph.edges_in(self.graph.edge(left_edge).left), ContentType::Exon);
        for exon in exons {
            let from = self.graph.edge(exon).left;
            self.add_retention_edge(from, to);
        }
    }

    fn retain_right(&mut self, left_edge: EdgeId, right_edge: EdgeId) {
        let from = self.graph.edge(left_edge).left;
        let exons = self.edges_of_type(self.graph.edges_out(self.graph.edge(right_edge).right), ContentType::Exon);
        for exon in exons {
            let to = self.graph.edge(exon).right;
            self.add_retention_edge(from, to);
        }
    }

    fn add_retention_edge(&mut self, from: VertexId, to: VertexId) {
        let len = self.context_window(to).begin - self.context_window(from).end;
        if len > self.model.thresholds.max_intron_retention_len {
            return;
        }
        let edge = self.new_edge(ContentType::Exon, from, to, false);
        self.tag(edge, StructureChange::INTRON_RETENTION);
    }

    /// Look for another site of the same type within the maximum shift and
    /// wire it like the broken one.
    fn handle_cryptic_site(&mut self, id: VertexId) {
        let model = self.model;
        let (ty, begin, end) = {
            let v = self.graph.vertex(id);
            (v.ty, v.begin, v.end)
        };
        let Some(sensor) = model.sensors.find(ty) else {
            return;
        };
        let shift = model.thresholds.max_splice_shift;
        let offset = sensor.consensus_offset();
        let len = self.alt_seq.len() as i64;
        let scan_begin = (begin - shift - offset).max(0);
        let scan_end = (end + shift - sensor.consensus_len() - offset).min(len - sensor.context_len());
        let edges_in = self.graph.edges_in(id).to_vec();
        let edges_out = self.graph.edges_out(id).to_vec();

        for window in scan_begin..scan_end {
            let pos = window + offset;
            if pos == begin {
                continue;
            }
            let Some(site) = self.try_site(sensor, pos) else {
                continue;
            };
            for &e in &edges_in {
                let (content, left) = (self.graph.edge(e).ty, self.graph.edge(e).left);
                if self.respects_min_len(content, left, site) {
                    let edge = self.new_edge(content, left, site, false);
                    self.tag(edge, StructureChange::CRYPTIC_SITE);
                }
            }
            for &e in &edges_out {
                let (content, right) = (self.graph.edge(e).ty, self.graph.edge(e).right);
                if self.respects_min_len(content, site, right) {
                    let edge = self.new_edge(content, site, right, false);
                    self.tag(edge, StructureChange::CRYPTIC_SITE);
                }
            }
        }
    }

    /// Whether the exon or intron between two vertices would still be long
    /// enough.
    fn respects_min_len(&self, content: ContentType, left: VertexId, right: VertexId) -> bool {
        let (l, r) = (self.graph.vertex(left), self.graph.vertex(right));
        let thresholds = &self.model.thresholds;
        match content {
            ContentType::Exon => r.begin - l.end >= thresholds.min_exon_len,
            ContentType::Intron => {
                let intron_end = if r.ty == SignalType::Ag { r.end } else { r.begin };
                intron_end - l.begin >= thresholds.min_intron_len
            }
            ContentType::Intergenic => true,
        }
    }
}
