use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::signal::ContentType;

/// Per-base log-likelihood model for one functional region type.
pub trait ContentSensor: std::fmt::Debug + Send + Sync {
    /// Log-probability of the base at `pos` given whatever context the model
    /// uses. Positions outside the sequence score 0.
    fn score_base(&self, seq: &[u8], pos: usize) -> f64;

    /// Sum of base scores over `[begin, end)`, clipped to the sequence.
    fn score_range(&self, seq: &[u8], begin: i64, end: i64) -> f64 {
        let begin = begin.max(0) as usize;
        let end = end.clamp(0, seq.len() as i64) as usize;
        (begin..end).map(|pos| self.score_base(seq, pos)).sum()
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

/// Fixed-order Markov chain over ACGT.
///
/// `probs` holds `4^(order+1)` conditional probabilities indexed by the
/// context bases followed by the emitted base, most significant first.
/// Bases without a full context fall back to `marginal`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MarkovChain {
    pub order: usize,
    pub probs: Vec<f64>,
    #[serde(default = "uniform_marginal")]
    pub marginal: [f64; 4],
}

fn uniform_marginal() -> [f64; 4] {
    [0.25; 4]
}

impl MarkovChain {
    pub fn new(order: usize, probs: Vec<f64>, marginal: [f64; 4]) -> Result<Self> {
        let chain = Self { order, probs, marginal };
        chain.validate()?;
        Ok(chain)
    }

    /// Zeroth-order chain with the given base composition.
    pub fn composition(freqs: [f64; 4]) -> Result<Self> {
        Self::new(0, freqs.to_vec(), freqs)
    }

    pub fn validate(&self) -> Result<()> {
        let expected = 4usize.pow(self.order as u32 + 1);
        ensure!(
            self.probs.len() == expected,
            "Markov chain of order {} needs {} probabilities, found {}",
            self.order,
            expected,
            self.probs.len()
        );
        ensure!(
            self.probs.iter().chain(self.marginal.iter()).all(|p| *p > 0.0),
            "Markov chain probabilities must be positive"
        );
        Ok(())
    }
}

impl ContentSensor for MarkovChain {
    fn score_base(&self, seq: &[u8], pos: usize) -> f64 {
        let Some(&base) = seq.get(pos) else { return 0.0 };
        let Some(emit) = base_index(base) else {
            return 0.25f64.ln();
        };
        if pos < self.order {
            return self.marginal[emit].ln();
        }
        let mut index = 0usize;
        for b in &seq[pos - self.order..pos] {
            match base_index(*b) {
                Some(i) => index = index * 4 + i,
                None => return self.marginal[emit].ln(),
            }
        }
        self.probs[index * 4 + emit].ln()
    }
}

/// Cumulative base scores of one content sensor over one sequence, so that
/// any interval can be scored in constant time.
#[derive(Debug, Clone)]
pub struct PrefixSums(Vec<f64>);

impl PrefixSums {
    pub fn new(sensor: &dyn ContentSensor, seq: &[u8]) -> Self {
        let mut sums = Vec::with_capacity(seq.len() + 1);
        let mut acc = 0.0;
        sums.push(acc);
        for pos in 0..seq.len() {
            acc += sensor.score_base(seq, pos);
            sums.push(acc);
        }
        Self(sums)
    }

    pub fn len(&self) -> usize {
        self.0.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Score of `[begin, end)`, clipped to the sequence.
    pub fn interval(&self, begin: i64, end: i64) -> f64 {
        let n = self.len() as i64;
        let begin = begin.clamp(0, n) as usize;
        let end = end.clamp(0, n) as usize;
        if end <= begin {
            return 0.0;
        }
        self.0[end] - self.0[begin]
    }
}

/// The content sensors of a model.
#[derive(Debug)]
pub struct ContentSensors {
    pub exon: Box<dyn ContentSensor>,
    pub intron: Box<dyn ContentSensor>,
    pub intergenic: Box<dyn ContentSensor>,
    /// Background model subtracted from splice-site scores, if any.
    pub splice_background: Option<Box<dyn ContentSensor>>,
}

impl ContentSensors {
    pub fn get(&self, ty: ContentType) -> &dyn ContentSensor {
        match ty {
            ContentType::Exon => self.exon.as_ref(),
            ContentType::Intron => self.intron.as_ref(),
            ContentType::Intergenic => self.intergenic.as_ref(),
        }
    }

    /// Precompute prefix sums of every region type over `seq`.
    pub fn prefix_sums(&self, seq: &[u8]) -> ContentScores {
        ContentScores {
            exon: PrefixSums::new(self.exon.as_ref(), seq),
            intron: PrefixSums::new(self.intron.as_ref(), seq),
            intergenic: PrefixSums::new(self.intergenic.as_ref(), seq),
        }
    }
}

/// Prefix-sum accelerated content scores for one sequence.
#[derive(Debug, Clone)]
pub struct ContentScores {
    exon: PrefixSums,
    intron: PrefixSums,
    intergenic: PrefixSums,
}

impl ContentScores {
    pub fn score(&self, ty: ContentType, begin: i64, end: i64) -> f64 {
        match ty {
            ContentType::Exon => self.exon.interval(begin, end),
            ContentType::Intron => self.intron.interval(begin, end),
            ContentType::Intergenic => self.intergenic.interval(begin, end),
        }
    }
}
