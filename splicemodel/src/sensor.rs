use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::signal::SignalType;

/// A scoring oracle for one kind of boundary signal. Implementations differ
/// in how they score a window, but graph code only ever asks "what is the
/// log-probability of the context window starting at this position".
pub trait SignalSensor: std::fmt::Debug + Send + Sync {
    fn signal_type(&self) -> SignalType;

    fn cutoff(&self) -> f64;

    /// Distance from the start of the context window to the consensus.
    fn consensus_offset(&self) -> i64;

    fn consensus_len(&self) -> i64;

    fn context_len(&self) -> i64;

    /// Accepted consensus strings, upper case.
    fn consensuses(&self) -> &[String];

    /// Log-probability of the window `[begin, begin + context_len)`.
    /// Returns negative infinity when the window does not fit in `seq`.
    fn score(&self, seq: &[u8], begin: i64) -> f64;

    fn is_consensus(&self, s: &[u8]) -> bool {
        self.consensuses()
            .iter()
            .any(|c| c.as_bytes().eq_ignore_ascii_case(s))
    }

    /// Whether one of the consensus strings starts at `pos`.
    fn consensus_at(&self, seq: &[u8], pos: i64) -> bool {
        let len = self.consensus_len();
        if pos < 0 || pos + len > seq.len() as i64 {
            return false;
        }
        self.is_consensus(&seq[pos as usize..(pos + len) as usize])
    }

    /// Printable window, consensus in upper case and flanks in lower case,
    /// joined by underscores. Empty if the window does not fit.
    fn window_string(&self, seq: &[u8], begin: i64) -> String {
        let len = self.context_len();
        let offset = self.consensus_offset();
        let cons = self.consensus_len();
        if begin < 0 || begin + len > seq.len() as i64 {
            return String::new();
        }
        let b = begin as usize;
        let (o, c, l) = (offset as usize, cons as usize, len as usize);
        let left = String::from_utf8_lossy(&seq[b..b + o]).to_lowercase();
        let mid = String::from_utf8_lossy(&seq[b + o..b + o + c]).to_uppercase();
        let right = String::from_utf8_lossy(&seq[b + o + c..b + l]).to_lowercase();
        format!("{}_{}_{}", left, mid, right)
    }
}

fn base_index(b: u8) -> Option<usize> {
    match b {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Position-specific base probabilities over a fixed window (WMM).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    pub signal_type: SignalType,
    pub cutoff: f64,
    pub consensus_offset: i64,
    #[serde(default = "default_consensus_len")]
    pub consensus_len: i64,
    pub consensuses: Vec<String>,
    /// One row of A, C, G, T probabilities per window position.
    pub matrix: Vec<[f64; 4]>,
}

fn default_consensus_len() -> i64 {
    2
}

impl WeightMatrix {
    pub fn new(
        signal_type: SignalType,
        cutoff: f64,
        consensus_offset: i64,
        consensuses: &[&str],
        matrix: Vec<[f64; 4]>,
    ) -> Result<Self> {
        let consensus_len = consensuses.first().map_or(0, |c| c.len() as i64);
        let wmm = Self {
            signal_type,
            cutoff,
            consensus_offset,
            consensus_len,
            consensuses: consensuses.iter().map(|c| c.to_uppercase()).collect(),
            matrix,
        };
        wmm.validate()?;
        Ok(wmm)
    }

    /// A matrix that is uniform everywhere except at the consensus, where
    /// each consensus base gets probability `cons_prob`.
    pub fn with_consensus(
        signal_type: SignalType,
        cutoff: f64,
        context_len: usize,
        consensus_offset: i64,
        consensus: &str,
        cons_prob: f64,
    ) -> Result<Self> {
        let mut matrix = vec![[0.25; 4]; context_len];
        let rest = (1.0 - cons_prob) / 3.0;
        for (i, b) in consensus.bytes().enumerate() {
            let row = consensus_offset as usize + i;
            ensure!(row < context_len, "Consensus does not fit in the window");
            let idx = base_index(b).unwrap_or(0);
            matrix[row] = [rest; 4];
            matrix[row][idx] = cons_prob;
        }
        Self::new(signal_type, cutoff, consensus_offset, &[consensus], matrix)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.matrix.is_empty(), "Empty weight matrix for {}", self.signal_type);
        ensure!(
            self.consensus_offset >= 0
                && self.consensus_offset + self.consensus_len <= self.matrix.len() as i64,
            "Consensus of {} sensor lies outside its window",
            self.signal_type
        );
        ensure!(
            self.consensuses.iter().all(|c| c.len() as i64 == self.consensus_len),
            "Consensus strings of {} sensor must all have length {}",
            self.signal_type,
            self.consensus_len
        );
        for row in &self.matrix {
            ensure!(row.iter().all(|p| *p >= 0.0), "Negative probability in weight matrix");
        }
        Ok(())
    }
}

impl SignalSensor for WeightMatrix {
    fn signal_type(&self) -> SignalType {
        self.signal_type
    }

    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn consensus_offset(&self) -> i64 {
        self.consensus_offset
    }

    fn consensus_len(&self) -> i64 {
        self.consensus_len
    }

    fn context_len(&self) -> i64 {
        self.matrix.len() as i64
    }

    fn consensuses(&self) -> &[String] {
        &self.consensuses
    }

    fn score(&self, seq: &[u8], begin: i64) -> f64 {
        let len = self.matrix.len() as i64;
        if begin < 0 || begin + len > seq.len() as i64 {
            return f64::NEG_INFINITY;
        }
        let window = &seq[begin as usize..(begin + len) as usize];
        window
            .iter()
            .zip(self.matrix.iter())
            .map(|(b, row)| match base_index(*b) {
                Some(i) => row[i].ln(),
                None => 0.25f64.ln(),
            })
            .sum()
    }
}

/// The sensors consulted by the engine, one per scored signal type.
#[derive(Debug)]
pub struct SignalSensors {
    pub donor: Box<dyn SignalSensor>,
    pub acceptor: Box<dyn SignalSensor>,
    pub start_codon: Box<dyn SignalSensor>,
    /// Used where the full start-codon window would run off the sequence.
    pub short_start: Box<dyn SignalSensor>,
    pub stop_codons: Vec<String>,
}

impl SignalSensors {
    pub fn find(&self, ty: SignalType) -> Option<&dyn SignalSensor> {
        match ty {
            SignalType::Gt => Some(self.donor.as_ref()),
            SignalType::Ag => Some(self.acceptor.as_ref()),
            SignalType::Atg => Some(self.start_codon.as_ref()),
            _ => None,
        }
    }

    pub fn is_stop_codon(&self, codon: &[u8]) -> bool {
        self.stop_codons
            .iter()
            .any(|c| c.as_bytes().eq_ignore_ascii_case(codon))
    }
}
