//! Small synthetic model and genes shared by the unit tests.

use rand::Rng;
use splicemodel::{
    ContentConfig, Duration, Durations, Features, MarkovChain, Model, ModelConfig, SensorsConfig, SignalType,
    Thresholds, Transition, Transitions, WeightMatrix,
};

use crate::alignment::Alignment;
use crate::transcript::{Strand, Transcript};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Uniform sensors apart from a near-certain consensus, composition-only
/// content models and geometric durations.
pub fn model() -> Model {
    init();
    let sensors = SensorsConfig {
        donor: WeightMatrix::with_consensus(SignalType::Gt, -7.0, 6, 2, "GT", 0.97).unwrap(),
        acceptor: WeightMatrix::with_consensus(SignalType::Ag, -7.0, 6, 2, "AG", 0.97).unwrap(),
        start_codon: WeightMatrix::with_consensus(SignalType::Atg, -8.0, 6, 2, "ATG", 0.97).unwrap(),
        short_start: WeightMatrix::with_consensus(SignalType::Atg, -3.0, 3, 0, "ATG", 0.97).unwrap(),
        stop_codons: vec!["TAA".into(), "TAG".into(), "TGA".into()],
    };
    let content = ContentConfig {
        exon: MarkovChain::composition([0.2, 0.3, 0.3, 0.2]).unwrap(),
        intron: MarkovChain::composition([0.3, 0.2, 0.2, 0.3]).unwrap(),
        intergenic: MarkovChain::composition([0.25; 4]).unwrap(),
        splice_background: None,
    };
    let durations = Durations {
        exon: Duration::Geometric { mean: 150.0 },
        intron: Duration::Geometric { mean: 300.0 },
        intergenic: Duration::Geometric { mean: 100.0 },
    };
    let transitions = Transitions::new(
        [
            (SignalType::LeftTerminus, SignalType::Tss, 1.0),
            (SignalType::Tss, SignalType::Gt, 0.9),
            (SignalType::Tss, SignalType::Tes, 0.1),
            (SignalType::Gt, SignalType::Ag, 1.0),
            (SignalType::Ag, SignalType::Gt, 0.8),
            (SignalType::Ag, SignalType::Tes, 0.2),
            (SignalType::Tes, SignalType::RightTerminus, 1.0),
        ]
        .into_iter()
        .map(|(from, to, prob)| Transition { from, to, prob }),
    )
    .unwrap();
    Model::from_config(ModelConfig {
        sensors,
        content,
        durations,
        transitions,
        thresholds: Thresholds::default(),
        features: Features::default(),
    })
    .unwrap()
}

#[derive(Debug, Clone)]
pub struct Gene {
    pub seq: Vec<u8>,
    pub transcript: Transcript,
}

/// Three exons of a coding gene on a 400 nt sequence:
/// exons [20, 60), [160, 220), [320, 380) and CDS [25, 339).
pub fn three_exon_gene() -> Gene {
    let mut seq = Vec::with_capacity(400);
    seq.extend_from_slice(&[b'C'; 20]);
    // exon 1: 5' UTR, ATG, then alanines
    seq.extend_from_slice(b"CCCCCATG");
    seq.extend_from_slice(&b"GCC".repeat(10));
    seq.extend_from_slice(b"GC");
    seq.extend_from_slice(&intron(100, b'C'));
    // exon 2 keeps the frame
    seq.push(b'C');
    seq.extend_from_slice(&b"GCC".repeat(19));
    seq.extend_from_slice(b"GC");
    seq.extend_from_slice(&intron(100, b'C'));
    // exon 3: five more codons, the stop codon and the 3' UTR
    seq.push(b'C');
    seq.extend_from_slice(&b"GCC".repeat(5));
    seq.extend_from_slice(b"TAA");
    seq.extend_from_slice(&[b'C'; 41]);
    seq.extend_from_slice(&[b'C'; 20]);
    assert_eq!(seq.len(), 400);
    let transcript = Transcript::new(
        "t",
        "g",
        Strand::Forward,
        [(20, 60), (160, 220), (320, 380)],
        Some((25, 339)),
    )
    .unwrap();
    Gene { seq, transcript }
}

/// Two noncoding exons [20, 80) and [680, 740) around a T-rich intron.
pub fn long_intron_gene() -> Gene {
    let mut seq = Vec::with_capacity(760);
    seq.extend_from_slice(&[b'C'; 80]);
    seq.extend_from_slice(&intron(600, b'T'));
    seq.extend_from_slice(&[b'C'; 80]);
    assert_eq!(seq.len(), 760);
    let transcript = Transcript::new("t", "g", Strand::Forward, [(20, 80), (680, 740)], None).unwrap();
    Gene { seq, transcript }
}

fn intron(len: usize, fill: u8) -> Vec<u8> {
    let mut s = b"GT".to_vec();
    s.extend(std::iter::repeat(fill).take(len - 4));
    s.extend_from_slice(b"AG");
    s
}

/// Delete `len` bases at `begin`; the alignment maps the original onto the
/// shortened sequence.
pub fn delete(seq: &[u8], begin: usize, len: usize) -> (Vec<u8>, Alignment) {
    let mut alt = seq[..begin].to_vec();
    alt.extend_from_slice(&seq[begin + len..]);
    let cigar = format!("{}M{}D{}M", begin, len, seq.len() - begin - len);
    (alt, Alignment::from_cigar(&cigar).unwrap())
}

/// [`three_exon_gene`] projected over `delete(seq, 218, 6)`, which removes
/// the second donor.
pub fn skipped_donor_transcript() -> Transcript {
    Transcript::new(
        "t",
        "g",
        Strand::Forward,
        [(20, 60), (160, 218), (314, 374)],
        Some((25, 333)),
    )
    .unwrap()
}

pub fn random_seq(rng: &mut impl Rng, n: usize) -> Vec<u8> {
    (0..n).map(|_| b"ACGT"[rng.random_range(0..4)]).collect()
}
