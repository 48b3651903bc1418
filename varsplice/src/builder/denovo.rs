use itertools::Itertools;
use splicemodel::{SignalSensor, SignalType};
use std::f64::consts::LN_2;

use super::GraphBuilder;
use crate::change::StructureChange;
use crate::graph::VertexId;
use crate::interval::Interval;

impl GraphBuilder<'_> {
    /// Scan the changed intervals for donors and acceptors the variant
    /// created, and wire them into the graph.
    pub(super) fn handle_de_novo_sites(&mut self) {
        let model = self.model;
        let variants = self.variants();
        if variants.is_empty() {
            return;
        }
        let mut new = self.scan_de_novo(model.sensors.donor.as_ref(), &variants);
        new.extend(self.scan_de_novo(model.sensors.acceptor.as_ref(), &variants));
        if new.is_empty() {
            return;
        }
        log::debug!("{} de novo sites in {}", new.len(), self.signals.transcript_id);

        let map = self.graph.sort();
        let new: Vec<VertexId> = new.into_iter().map(|id| map[id]).collect();
        self.link_de_novo_vertices(&new);
        if self.features.cryptic_exons {
            self.add_cryptic_exons(&new);
        }
    }

    fn scan_de_novo(&mut self, sensor: &dyn SignalSensor, variants: &[Interval]) -> Vec<VertexId> {
        let context_len = sensor.context_len();
        let windows = variants
            .iter()
            .map(|v| Interval::new((v.begin - context_len + 1).max(0), v.end))
            .coalesce(|a, b| {
                if a.end >= b.begin {
                    Ok(Interval::new(a.begin, a.end.max(b.end)))
                } else {
                    Err((a, b))
                }
            })
            .collect::<Vec<_>>();
        let mut found = Vec::new();
        for window in windows {
            for pos in window.begin..window.end {
                if let Some(id) = self.de_novo_site(sensor, pos) {
                    found.push(id);
                }
            }
        }
        found
    }

    /// A site whose window starts at `pos` and that is markedly better than
    /// whatever the reference has at the aligned position.
    fn de_novo_site(&mut self, sensor: &dyn SignalSensor, pos: i64) -> Option<VertexId> {
        let len = sensor.context_len();
        let offset = sensor.consensus_offset();
        let cutoff = sensor.cutoff();
        if pos + len > self.alt_seq.len() as i64 {
            return None;
        }
        let cons_pos = pos + offset;
        if !sensor.consensus_at(self.alt_seq, cons_pos) {
            return None;
        }
        let alt_score = sensor.score(self.alt_seq, pos);
        if alt_score < cutoff {
            return None;
        }
        if let Some(ref_pos) = self.alt_to_ref.map(pos) {
            if ref_pos + len <= self.ref_seq.len() as i64 && sensor.consensus_at(self.ref_seq, ref_pos + offset) {
                let ref_score = sensor.score(self.ref_seq, ref_pos);
                if ref_score >= cutoff || alt_score - ref_score < LN_2 {
                    return None;
                }
            }
        }
        if alt_score < cutoff + LN_2 {
            return None;
        }
        self.new_vertex(
            sensor.signal_type(),
            cons_pos,
            cons_pos + sensor.consensus_len(),
            alt_score,
            false,
            true,
        )
    }

    fn link_de_novo_vertices(&mut self, new: &[VertexId]) {
        for &id in new {
            let (left, right): (&[SignalType], &[SignalType]) = match self.graph.vertex(id).ty {
                SignalType::Gt => (&[SignalType::Tss, SignalType::Ag], &[SignalType::Ag]),
                SignalType::Ag => (&[SignalType::Gt], &[SignalType::Gt, SignalType::Tes]),
                _ => continue,
            };
            self.link_left(id, left);
            self.link_right(id, right);
        }
    }

    /// Link to compatible vertices on the left, nearest first, up to and
    /// including the first annotated one.
    fn link_left(&mut self, id: VertexId, types: &[SignalType]) {
        for other in (0..id).rev() {
            if !types.contains(&self.graph.vertex(other).ty) {
                continue;
            }
            let Some(edge) = self.link_vertices(other, id) else {
                continue;
            };
            self.tag(Some(edge), StructureChange::DE_NOVO_SITE);
            if self.graph.vertex(other).annotated {
                break;
            }
        }
    }

    fn link_right(&mut self, id: VertexId, types: &[SignalType]) {
        for other in id + 1..self.graph.num_vertices() {
            if !types.contains(&self.graph.vertex(other).ty) {
                continue;
            }
            let Some(edge) = self.link_vertices(id, other) else {
                continue;
            };
            self.tag(Some(edge), StructureChange::DE_NOVO_SITE);
            if self.graph.vertex(other).annotated {
                break;
            }
        }
    }

    fn add_cryptic_exons(&mut self, new: &[VertexId]) {
        let map = self.graph.sort();
        for &id in new {
            let id = map[id];
            match self.graph.vertex(id).ty {
                SignalType::Gt => self.scan_cryptic_exon_left(id),
                SignalType::Ag => self.scan_cryptic_exon_right(id),
                _ => {}
            }
        }
    }

    /// A new donor may end a cryptic exon inside the intron to its left.
    fn scan_cryptic_exon_left(&mut self, of: VertexId) {
        let model = self.model;
        let Some(left) = self.find_annotated_left(of) else {
            return;
        };
        if self.graph.vertex(left).ty != SignalType::Gt {
            return;
        }
        let of_begin = self.context_window(of).begin;
        let left_end = self
            .context_window(left)
            .end
            .max(of_begin - model.thresholds.max_cryptic_exon_len);
        let mates = self.find_mate_signals(model.sensors.acceptor.as_ref(), Interval::new(left_end, of_begin));
        for mate in mates {
            let exon = self.link_vertices(mate, of);
            self.tag(exon, StructureChange::CRYPTIC_EXON);
            self.link_vertices(left, mate);
        }
    }

    fn scan_cryptic_exon_right(&mut self, of: VertexId) {
        let model = self.model;
        let Some(right) = self.find_annotated_right(of) else {
            return;
        };
        if self.graph.vertex(right).ty != SignalType::Ag {
            return;
        }
        let of_end = self.context_window(of).end;
        let right_begin = self
            .context_window(right)
            .begin
            .min(of_end + model.thresholds.max_cryptic_exon_len);
        let mates = self.find_mate_signals(model.sensors.donor.as_ref(), Interval::new(of_end, right_begin));
        for mate in mates {
            let exon = self.link_vertices(of, mate);
            self.tag(exon, StructureChange::CRYPTIC_EXON);
            self.link_vertices(mate, right);
        }
    }

    /// Sites whose whole context window lies in `window`.
    fn find_mate_signals(&mut self, sensor: &dyn SignalSensor, window: Interval) -> Vec<VertexId> {
        let offset = sensor.consensus_offset();
        (window.begin..window.end - sensor.context_len() + 1)
            .filter_map(|pos| self.try_site(sensor, pos + offset))
            .collect()
    }
}
