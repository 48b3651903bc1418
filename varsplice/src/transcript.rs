use anyhow::{bail, ensure, Result};
use bstr::ByteSlice;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;

use crate::alignment::{Alignment, Direction};
use crate::interval::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

impl FromStr for Strand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            _ => bail!("Strand must be '+' or '-', found {}", s),
        }
    }
}

impl Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
        }
    }
}

/// A transcript model on the forward strand.
///
/// 0-based, half-open. `exons` cover the whole mature RNA (UTRs included);
/// `cds`, when present, runs from the first base of the start codon to
/// the last base of the stop codon (exclusive end), both genomic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub id: String,
    pub gene_id: String,
    pub strand: Strand,
    exons: Vec<Interval>,
    cds: Option<Interval>,
}

impl Transcript {
    pub fn new(
        id: impl Into<String>,
        gene_id: impl Into<String>,
        strand: Strand,
        exons: impl IntoIterator<Item = (i64, i64)>,
        cds: Option<(i64, i64)>,
    ) -> Result<Self> {
        let mut prev_end = None;
        let exons = exons
            .into_iter()
            .map(|(begin, end)| {
                ensure!(
                    prev_end.map_or(true, |p| begin > p),
                    "Exons must be non-overlapping, separated and in order"
                );
                ensure!(end > begin, "End coordinate must be greater than start coordinate");
                prev_end = Some(end);
                Ok(Interval::new(begin, end))
            })
            .collect::<Result<Vec<_>>>()?;
        ensure!(!exons.is_empty(), "Transcript must have at least one exon");
        let mut transcript = Self {
            id: id.into(),
            gene_id: gene_id.into(),
            strand,
            exons,
            cds: None,
        };
        if let Some((begin, end)) = cds {
            transcript.set_cds(begin, end)?;
        }
        Ok(transcript)
    }

    pub fn exons(&self) -> &[Interval] {
        &self.exons
    }

    pub fn num_exons(&self) -> usize {
        self.exons.len()
    }

    pub fn cds(&self) -> Option<Interval> {
        self.cds
    }

    pub fn is_coding(&self) -> bool {
        self.cds.is_some()
    }

    pub fn begin(&self) -> i64 {
        self.exons[0].begin
    }

    pub fn end(&self) -> i64 {
        self.exons[self.exons.len() - 1].end
    }

    pub fn set_cds(&mut self, begin: i64, end: i64) -> Result<()> {
        ensure!(end > begin, "Empty coding region [{}, {})", begin, end);
        ensure!(
            self.exons.iter().any(|e| e.contains_pos(begin))
                && self.exons.iter().any(|e| e.contains_pos(end - 1)),
            "Coding region [{}, {}) is not exonic",
            begin,
            end
        );
        self.cds = Some(Interval::new(begin, end));
        Ok(())
    }

    pub fn forget_cds(&mut self) {
        self.cds = None;
    }

    /// The exonic parts of the coding region, in order.
    pub fn coding_segments(&self) -> Vec<Interval> {
        match self.cds {
            None => Vec::new(),
            Some(cds) => self
                .exons
                .iter()
                .map(|e| e.intersect(&cds))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn spliced_len(&self) -> i64 {
        self.exons.iter().map(|e| e.len()).sum()
    }

    /// Convert a genomic coordinate to a coordinate in the mature RNA.
    pub fn to_spliced(&self, pos: i64) -> Option<i64> {
        let mut cum_len = 0;
        for exon in &self.exons {
            if exon.contains_pos(pos) {
                return Some(cum_len + pos - exon.begin);
            }
            cum_len += exon.len();
        }
        None
    }

    pub fn to_genomic(&self, spliced: i64) -> Option<i64> {
        if spliced < 0 {
            return None;
        }
        let mut cum_len = 0;
        for exon in &self.exons {
            if spliced < cum_len + exon.len() {
                return Some(exon.begin + spliced - cum_len);
            }
            cum_len += exon.len();
        }
        None
    }

    pub fn spliced_sequence(&self, seq: &[u8]) -> Result<Vec<u8>> {
        let mut rna = Vec::with_capacity(self.spliced_len() as usize);
        for exon in &self.exons {
            ensure!(
                exon.end as usize <= seq.len() && exon.begin >= 0,
                "Exon {} of {} lies outside the sequence",
                exon,
                self.id
            );
            rna.extend_from_slice(&seq[exon.begin as usize..exon.end as usize]);
        }
        Ok(rna.to_uppercase())
    }

    /// Spliced coordinates of the coding region.
    pub fn spliced_cds(&self) -> Option<Interval> {
        let cds = self.cds?;
        let begin = self.to_spliced(cds.begin)?;
        let len: i64 = self.coding_segments().iter().map(|s| s.len()).sum();
        Some(Interval::new(begin, begin + len))
    }

    pub fn cds_sequence(&self, seq: &[u8]) -> Result<Vec<u8>> {
        let Some(cds) = self.spliced_cds() else {
            return Ok(Vec::new());
        };
        let rna = self.spliced_sequence(seq)?;
        Ok(rna[cds.begin as usize..cds.end as usize].to_vec())
    }

    /// Translation of the annotated coding region.
    pub fn protein(&self, seq: &[u8]) -> Result<String> {
        Ok(translate(&self.cds_sequence(seq)?))
    }

    /// Reading frame (0, 1 or 2) of a genomic position inside the CDS.
    pub fn phase_at(&self, pos: i64) -> Option<i64> {
        let cds = self.spliced_cds()?;
        let spliced = self.to_spliced(pos)?;
        if cds.contains_pos(spliced) {
            Some((spliced - cds.begin) % 3)
        } else {
            None
        }
    }

    /// Set the coding region to start at `start` and run to the first
    /// in-frame stop codon, or to the last whole codon of the transcript
    /// when there is none.
    pub fn split_utr_and_cds(&mut self, seq: &[u8], start: i64, stop_codons: &[String]) -> Result<()> {
        let Some(spliced_start) = self.to_spliced(start) else {
            bail!("Start codon {} of {} is not exonic", start, self.id);
        };
        let rna = self.spliced_sequence(seq)?;
        let n = rna.len() as i64;
        let mut end = spliced_start;
        let mut pos = spliced_start;
        while pos + 3 <= n {
            end = pos + 3;
            let codon = &rna[pos as usize..end as usize];
            if stop_codons.iter().any(|c| c.as_bytes().eq_ignore_ascii_case(codon)) {
                break;
            }
            pos += 3;
        }
        ensure!(end > spliced_start, "No complete codon after {} in {}", start, self.id);
        let Some(last) = self.to_genomic(end - 1) else {
            bail!("Coding end of {} is not exonic", self.id);
        };
        self.set_cds(start, last + 1)
    }

    /// Extend the coding region by `n` bases downstream, growing the last
    /// exon if the coding region already reaches its end.
    pub fn extend_cds_end(&mut self, n: i64) -> Result<()> {
        let Some(cds) = self.cds else {
            bail!("Transcript {} is not coding", self.id);
        };
        let Some(spliced) = self.spliced_cds() else {
            bail!("Coding region of {} is not exonic", self.id);
        };
        let new_end = spliced.end + n;
        let last = self.exons.len() - 1;
        if new_end > self.spliced_len() {
            self.exons[last].end += new_end - self.spliced_len();
        }
        match self.to_genomic(new_end - 1) {
            Some(p) => self.set_cds(cds.begin, p + 1),
            None => bail!("Cannot extend the coding region of {}", self.id),
        }
    }

    /// Project this transcript through `alignment` (source = the sequence
    /// it is annotated on). Exon ends map to the nearest aligned boundary;
    /// the coding start maps leftward and is kept only if it still lies on
    /// an exon.
    pub fn project(&self, alignment: &Alignment) -> Result<Transcript> {
        let mut exons = Vec::with_capacity(self.exons.len());
        for exon in &self.exons {
            let begin = alignment.map_approximate(exon.begin - 2, Direction::None);
            let end = alignment.map_approximate(exon.end, Direction::None);
            match (begin, end) {
                (Some(b), Some(e)) if e > b + 2 => exons.push((b + 2, e)),
                _ => bail!("Exon {} of {} cannot be projected", exon, self.id),
            }
        }
        let mut projected = Transcript::new(&self.id, &self.gene_id, self.strand, exons, None)?;
        if let Some(cds) = self.cds {
            if let Some(start) = alignment.map_approximate(cds.begin, Direction::Left) {
                let end = alignment.map_approximate(cds.end, Direction::Right).unwrap_or(start);
                if projected.set_cds(start, end).is_err() {
                    projected.forget_cds();
                }
            }
        }
        Ok(projected)
    }
}

/// Translate with the standard genetic code; `X` for codons with
/// ambiguous bases. A trailing partial codon is dropped.
pub fn translate(dna: &[u8]) -> String {
    dna.chunks_exact(3).map(codon_to_aa).collect()
}

fn codon_to_aa(codon: &[u8]) -> char {
    const AAS: &[u8; 64] = b"KNKNTTTTRSRSIIMIQHQHPPPPRRRRLLLLEDEDAAAAGGGGVVVV*Y*YSSSS*CWCLFLF";
    let mut index = 0;
    for b in codon {
        let i = match b.to_ascii_uppercase() {
            b'A' => 0,
            b'C' => 1,
            b'G' => 2,
            b'T' => 3,
            _ => return 'X',
        };
        index = index * 4 + i;
    }
    AAS[index] as char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Transcript {
        Transcript::new("t1", "g1", Strand::Forward, [(10, 20), (30, 40), (50, 60)], Some((15, 55))).unwrap()
    }

    #[test]
    fn test_translate() {
        assert_eq!(translate(b"ATGGCCTGGTAA"), "MAW*");
        assert_eq!(translate(b"atgttnaa"), "MX");
        assert_eq!(translate(b"TTTGGGCCCAAA"), "FGPK");
    }

    #[test]
    fn test_coordinates() {
        let t = transcript();
        assert_eq!(t.spliced_len(), 30);
        assert_eq!(t.to_spliced(30), Some(10));
        assert_eq!(t.to_spliced(25), None);
        assert_eq!(t.to_genomic(19), Some(39));
        assert_eq!(t.to_genomic(25), Some(55));
        assert_eq!(t.to_genomic(30), None);
        assert_eq!(t.spliced_cds(), Some(Interval::new(5, 25)));
        assert_eq!(t.coding_segments().len(), 3);
        assert_eq!(t.phase_at(30), Some(2));
        assert_eq!(t.phase_at(12), None);
        assert!(Transcript::new("t", "g", Strand::Forward, [(10, 20), (15, 30)], None).is_err());
    }

    #[test]
    fn test_split_utr_and_cds() {
        let seq = b"CCCCCATGAAATAGCCCCCC";
        let mut t = Transcript::new("t", "g", Strand::Forward, [(0, 10), (12, 20)], None).unwrap();
        let stops = vec!["TAA".to_string(), "TAG".to_string(), "TGA".to_string()];
        t.split_utr_and_cds(seq, 5, &stops).unwrap();
        // spliced CCCCC ATG AAA GCC CCC C, no stop
        assert_eq!(t.cds(), Some(Interval::new(5, 19)));
        assert_eq!(t.protein(seq).unwrap(), "MKAP");
    }

    #[test]
    fn test_extend_and_project() {
        let mut t = transcript();
        t.extend_cds_end(3).unwrap();
        assert_eq!(t.cds(), Some(Interval::new(15, 58)));
        t.extend_cds_end(5).unwrap();
        assert_eq!(t.exons()[2], Interval::new(50, 63));

        let ali = Alignment::from_cigar("32M4D40M").unwrap();
        let projected = transcript().project(&ali).unwrap();
        assert_eq!(projected.exons()[0], Interval::new(10, 20));
        assert_eq!(projected.exons()[1], Interval::new(30, 36));
        assert_eq!(projected.exons()[2], Interval::new(46, 56));
        assert_eq!(projected.cds(), Some(Interval::new(15, 51)));
    }
}
