use log::{debug, warn};
use smallvec::SmallVec;
use splicemodel::{ContentType, SignalType};
use std::fmt::Display;

use crate::change::StructureChange;

pub type VertexId = usize;
pub type EdgeId = usize;

/// A signal placed in the graph. `[begin, end)` is the consensus span.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub ty: SignalType,
    pub begin: i64,
    pub end: i64,
    /// Signal score less the background score of its context window.
    pub score: f64,
    pub raw_score: f64,
    pub threshold: f64,
    /// Printable context window.
    pub seq: String,
    pub annotated: bool,
    pub broken: bool,
    pub de_novo: bool,
    deleted: bool,
    edges_in: SmallVec<[EdgeId; 4]>,
    edges_out: SmallVec<[EdgeId; 4]>,
}

impl Vertex {
    pub fn new(ty: SignalType, begin: i64, end: i64, score: f64, annotated: bool) -> Self {
        Self {
            ty,
            begin,
            end,
            score,
            raw_score: score,
            threshold: f64::NEG_INFINITY,
            seq: String::new(),
            annotated,
            broken: false,
            de_novo: false,
            deleted: false,
            edges_in: SmallVec::new(),
            edges_out: SmallVec::new(),
        }
    }

    fn sort_rank(&self) -> u8 {
        match self.ty {
            SignalType::LeftTerminus => 0,
            SignalType::RightTerminus => 2,
            _ => 1,
        }
    }
}

/// The span between two vertices. `[begin, end)` runs from the end of the
/// left vertex's context window to the start of the right one's.
#[derive(Debug, Clone)]
pub struct Edge {
    pub ty: ContentType,
    pub left: VertexId,
    pub right: VertexId,
    pub begin: i64,
    pub end: i64,
    pub score: f64,
    pub annotated: bool,
    pub change: StructureChange,
    deleted: bool,
}

impl Edge {
    pub fn len(&self) -> i64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.len() < 1
    }
}

/// Arena of vertices and edges over one substrate sequence.
///
/// Removal is two-phase: [`SpliceGraph::drop_vertex`] and
/// [`SpliceGraph::drop_edge`] only mark, [`SpliceGraph::purge`] compacts
/// the arena and renumbers.
#[derive(Debug, Clone)]
pub struct SpliceGraph {
    pub substrate: String,
    pub substrate_len: i64,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl SpliceGraph {
    pub fn new(substrate: impl Into<String>, substrate_len: i64) -> Self {
        Self {
            substrate: substrate.into(),
            substrate_len,
            vertices: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.vertices[id]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id]
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices.iter().enumerate().filter(|(_, v)| !v.deleted)
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().enumerate().filter(|(_, e)| !e.deleted)
    }

    pub fn edges_in(&self, id: VertexId) -> &[EdgeId] {
        &self.vertices[id].edges_in
    }

    pub fn edges_out(&self, id: VertexId) -> &[EdgeId] {
        &self.vertices[id].edges_out
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> VertexId {
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }

    pub fn add_edge(
        &mut self,
        ty: ContentType,
        left: VertexId,
        right: VertexId,
        begin: i64,
        end: i64,
        annotated: bool,
    ) -> EdgeId {
        let id = self.edges.len();
        self.edges.push(Edge {
            ty,
            left,
            right,
            begin,
            end,
            score: 0.0,
            annotated,
            change: StructureChange::default(),
            deleted: false,
        });
        self.vertices[left].edges_out.push(id);
        self.vertices[right].edges_in.push(id);
        id
    }

    pub fn find_vertex(&self, ty: SignalType, begin: i64, end: i64) -> Option<VertexId> {
        self.vertices()
            .find(|(_, v)| v.ty == ty && v.begin == begin && v.end == end)
            .map(|(id, _)| id)
    }

    pub fn find_edge(&self, ty: ContentType, begin: i64, end: i64) -> Option<EdgeId> {
        self.edges()
            .find(|(_, e)| e.ty == ty && e.begin == begin && e.end == end)
            .map(|(id, _)| id)
    }

    pub fn find_terminus(&self, ty: SignalType) -> Option<VertexId> {
        self.vertices().find(|(_, v)| v.ty == ty).map(|(id, _)| id)
    }

    /// Every surviving vertex is an annotated signal.
    pub fn all_annotated(&self) -> bool {
        self.vertices().all(|(_, v)| v.annotated)
    }

    /// Mark a vertex and all of its edges for removal.
    pub fn drop_vertex(&mut self, id: VertexId) {
        let vertex = &mut self.vertices[id];
        vertex.deleted = true;
        let incident: SmallVec<[EdgeId; 8]> =
            vertex.edges_in.iter().chain(vertex.edges_out.iter()).copied().collect();
        for e in incident {
            self.edges[e].deleted = true;
        }
    }

    pub fn drop_edge(&mut self, id: EdgeId) {
        self.edges[id].deleted = true;
    }

    /// Remove everything marked for deletion, along with edges left
    /// dangling, and renumber.
    pub fn purge(&mut self) {
        let mut vertex_map = vec![None; self.vertices.len()];
        let mut n = 0;
        for (old, v) in self.vertices.iter().enumerate() {
            if !v.deleted {
                vertex_map[old] = Some(n);
                n += 1;
            }
        }
        let mut edge_map = vec![None; self.edges.len()];
        let mut m = 0;
        for (old, e) in self.edges.iter().enumerate() {
            if !e.deleted && vertex_map[e.left].is_some() && vertex_map[e.right].is_some() {
                edge_map[old] = Some(m);
                m += 1;
            }
        }
        let removed = (self.vertices.len() - n, self.edges.len() - m);
        self.renumber(&vertex_map, &edge_map);
        if removed != (0, 0) {
            debug!("Purged {} vertices and {} edges", removed.0, removed.1);
        }
    }

    /// Order vertices and edges by begin coordinate, keeping insertion order
    /// on ties except that the termini sort outermost. Returns the map from
    /// old to new vertex ids.
    pub fn sort(&mut self) -> Vec<VertexId> {
        let mut order: Vec<VertexId> = (0..self.vertices.len()).collect();
        order.sort_by_key(|&i| (self.vertices[i].begin, self.vertices[i].sort_rank()));
        let mut vertex_map = vec![None; self.vertices.len()];
        for (new, &old) in order.iter().enumerate() {
            vertex_map[old] = Some(new);
        }
        let mut edge_order: Vec<EdgeId> = (0..self.edges.len()).collect();
        edge_order.sort_by_key(|&i| self.edges[i].begin);
        let mut edge_map = vec![None; self.edges.len()];
        for (new, &old) in edge_order.iter().enumerate() {
            edge_map[old] = Some(new);
        }
        self.renumber(&vertex_map, &edge_map);
        vertex_map.into_iter().flatten().collect()
    }

    fn renumber(&mut self, vertex_map: &[Option<VertexId>], edge_map: &[Option<EdgeId>]) {
        let mut vertices: Vec<Option<Vertex>> = vec![None; vertex_map.iter().flatten().count()];
        for (old, v) in self.vertices.drain(..).enumerate() {
            if let Some(new) = vertex_map[old] {
                vertices[new] = Some(v);
            }
        }
        let mut edges: Vec<Option<Edge>> = vec![None; edge_map.iter().flatten().count()];
        for (old, e) in self.edges.drain(..).enumerate() {
            if let Some(new) = edge_map[old] {
                edges[new] = Some(e);
            }
        }
        self.vertices = vertices
            .into_iter()
            .flatten()
            .map(|mut v| {
                v.edges_in = v.edges_in.iter().filter_map(|e| edge_map[*e]).collect();
                v.edges_out = v.edges_out.iter().filter_map(|e| edge_map[*e]).collect();
                v
            })
            .collect();
        self.edges = edges
            .into_iter()
            .flatten()
            .filter_map(|mut e| {
                e.left = vertex_map[e.left]?;
                e.right = vertex_map[e.right]?;
                Some(e)
            })
            .collect();
    }

    /// Keep only what lies on some walk from the left terminus to the
    /// right terminus.
    pub fn prune(&mut self) {
        self.sort();
        let nv = self.vertices.len();
        let ne = self.edges.len();
        if nv == 0 {
            warn!("Pruning an empty graph");
            return;
        }
        let mut vertex_left = vec![false; nv];
        let mut vertex_right = vec![false; nv];
        let mut edge_left = vec![false; ne];
        let mut edge_right = vec![false; ne];

        if let Some(start) = self.find_terminus(SignalType::LeftTerminus) {
            let mut stack = vec![start];
            vertex_left[start] = true;
            while let Some(v) = stack.pop() {
                for &e in self.edges_out(v) {
                    edge_left[e] = true;
                    let next = self.edges[e].right;
                    if !vertex_left[next] {
                        vertex_left[next] = true;
                        stack.push(next);
                    }
                }
            }
        }
        if let Some(end) = self.find_terminus(SignalType::RightTerminus) {
            let mut stack = vec![end];
            vertex_right[end] = true;
            while let Some(v) = stack.pop() {
                for &e in self.edges_in(v) {
                    edge_right[e] = true;
                    let prev = self.edges[e].left;
                    if !vertex_right[prev] {
                        vertex_right[prev] = true;
                        stack.push(prev);
                    }
                }
            }
        }

        for id in 0..nv {
            if !(vertex_left[id] && vertex_right[id]) {
                self.vertices[id].deleted = true;
            }
        }
        for id in 0..ne {
            if !(edge_left[id] && edge_right[id]) {
                self.edges[id].deleted = true;
            }
        }
        self.purge();
        self.sort();
        if self.vertices.is_empty() {
            warn!("Nothing left of the graph on {} after pruning", self.substrate);
        }
    }
}

impl Display for SpliceGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (id, v) in self.vertices() {
            writeln!(
                f,
                "{}\tgraph\t{}\t{}\t{}\t{:.3}\t+\t.\tid={};annotated={};broken={};denovo={};seq={}",
                self.substrate,
                v.ty,
                v.begin + 1,
                v.end,
                v.score,
                id,
                v.annotated,
                v.broken,
                v.de_novo,
                if v.seq.is_empty() { "." } else { &v.seq }
            )?;
        }
        for (id, e) in self.edges() {
            writeln!(
                f,
                "{}\tgraph\t{}\t{}\t{}\t{:.3}\t+\t.\tid={};left={};right={};annotated={};change={}",
                self.substrate,
                e.ty,
                e.begin + 1,
                e.end,
                e.score,
                id,
                e.left,
                e.right,
                e.annotated,
                e.change
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn chain() -> SpliceGraph {
        let mut g = SpliceGraph::new("chr", 100);
        let lt = g.add_vertex(Vertex::new(SignalType::LeftTerminus, 0, 0, 0.0, true));
        let rt = g.add_vertex(Vertex::new(SignalType::RightTerminus, 100, 100, 0.0, true));
        let tss = g.add_vertex(Vertex::new(SignalType::Tss, 10, 10, 0.0, true));
        let tes = g.add_vertex(Vertex::new(SignalType::Tes, 90, 90, 0.0, true));
        g.add_edge(ContentType::Intergenic, tes, rt, 90, 100, true);
        g.add_edge(ContentType::Exon, tss, tes, 10, 90, true);
        g.add_edge(ContentType::Intergenic, lt, tss, 0, 10, true);
        g
    }

    #[test]
    fn test_sort() {
        let mut g = chain();
        let map = g.sort();
        assert_eq!(map, vec![0, 3, 1, 2]);
        let types: Vec<_> = g.vertices().map(|(_, v)| v.ty).collect();
        assert_eq!(
            types,
            [SignalType::LeftTerminus, SignalType::Tss, SignalType::Tes, SignalType::RightTerminus]
        );
        assert_eq!(g.edge(0).left, 0);
        assert_eq!(g.edge(0).right, 1);
        assert_eq!(g.edges_out(1), &[1]);
        assert_eq!(g.edges_in(3), &[2]);
    }

    #[test]
    fn test_drop_and_purge() {
        let mut g = chain();
        g.sort();
        let extra = g.add_vertex(Vertex::new(SignalType::Gt, 50, 52, -1.0, false));
        g.add_edge(ContentType::Exon, 1, extra, 10, 48, false);
        assert_eq!(g.find_vertex(SignalType::Gt, 50, 52), Some(extra));
        g.drop_vertex(extra);
        assert_eq!(g.find_vertex(SignalType::Gt, 50, 52), None);
        assert_eq!(g.find_edge(ContentType::Exon, 10, 48), None);
        g.purge();
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.num_edges(), 3);
        assert_eq!(g.edges_out(1).len(), 1);
        assert!(g.all_annotated());
    }

    #[test]
    fn test_prune_dead_ends() {
        let mut g = chain();
        g.sort();
        let dangling = g.add_vertex(Vertex::new(SignalType::Gt, 50, 52, 0.0, true));
        g.add_edge(ContentType::Exon, 1, dangling, 10, 48, true);
        let orphan = g.add_vertex(Vertex::new(SignalType::Ag, 60, 62, 0.0, true));
        g.add_edge(ContentType::Exon, orphan, 2, 64, 90, true);
        g.prune();
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.num_edges(), 3);
        assert!(g.to_string().lines().count() == 7);
    }

    fn random_graph(rng: &mut impl Rng) -> SpliceGraph {
        let len = 1000;
        let mut g = SpliceGraph::new("chr", len);
        g.add_vertex(Vertex::new(SignalType::LeftTerminus, 0, 0, 0.0, true));
        let n = rng.random_range(2..30);
        for _ in 0..n {
            let pos = rng.random_range(1..len - 2);
            let ty = if rng.random_bool(0.5) { SignalType::Gt } else { SignalType::Ag };
            g.add_vertex(Vertex::new(ty, pos, pos + 2, 0.0, rng.random_bool(0.5)));
        }
        g.add_vertex(Vertex::new(SignalType::RightTerminus, len, len, 0.0, true));
        g.sort();
        let nv = g.num_vertices();
        for _ in 0..rng.random_range(0..4 * nv) {
            let a = rng.random_range(0..nv);
            let b = rng.random_range(0..nv);
            let (l, r) = (a.min(b), a.max(b));
            let (begin, end) = (g.vertex(l).end, g.vertex(r).begin);
            if end > begin {
                g.add_edge(ContentType::Intron, l, r, begin, end, false);
            }
        }
        g
    }

    fn snapshot(g: &SpliceGraph) -> (Vec<(SignalType, i64)>, Vec<(i64, i64, usize, usize)>) {
        (
            g.vertices().map(|(_, v)| (v.ty, v.begin)).collect(),
            g.edges().map(|(_, e)| (e.begin, e.end, e.left, e.right)).collect(),
        )
    }

    #[test]
    fn test_prune_idempotent() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let mut g = random_graph(&mut rng);
            g.prune();
            let once = snapshot(&g);
            g.prune();
            assert_eq!(once, snapshot(&g));
            for (_, e) in g.edges() {
                assert!(e.begin < e.end);
            }
            if g.num_vertices() > 0 {
                assert_eq!(g.vertex(0).ty, SignalType::LeftTerminus);
                assert_eq!(g.vertex(g.num_vertices() - 1).ty, SignalType::RightTerminus);
            }
        }
    }
}
