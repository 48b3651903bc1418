use anyhow::bail;
use serde::{Serialize, Serializer};
use splicemodel::SignalType;
use std::fmt::Display;
use std::str::FromStr;

use crate::change::StructureChange;
use crate::fate::{Frameshift, ProteinFate};
use crate::orf::{EarlierStartReason, LostUorf, OrfGain};
use crate::signals::Signal;
use crate::transcript::Transcript;

/// A named reason why a transcript could not be analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureTag {
    UnequalExonCount,
    NoGraph,
    BadReference,
}

impl FailureTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureTag::UnequalExonCount => "unequal-exon-count",
            FailureTag::NoGraph => "no-graph",
            FailureTag::BadReference => "bad-reference",
        }
    }
}

impl Display for FailureTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "unequal-exon-count" => Ok(FailureTag::UnequalExonCount),
            "no-graph" => Ok(FailureTag::NoGraph),
            "bad-reference" => Ok(FailureTag::BadReference),
            _ => bail!("Unknown failure tag: {}", s),
        }
    }
}

impl std::error::Error for FailureTag {}

impl Serialize for FailureTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// The projection reproduces the annotated structure.
    Mapped,
    SplicingChanges,
    /// The graph admits no complete transcript.
    NoTranscript,
    Failed,
}

/// A biological observation attached to a report or to an alternative
/// structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Finding {
    BrokenSite {
        signal: SignalType,
        pos: i64,
        window: String,
    },
    WeakenedSite {
        signal: SignalType,
        pos: i64,
        window: String,
    },
    StartCodonChange {
        from: i64,
        to: i64,
    },
    StartCodonLost,
    NoStartCodon,
    NoStopCodon,
    EarlierStartCodon {
        from: i64,
        to: i64,
        reason: EarlierStartReason,
        old_orf_len: i64,
        new_orf_len: i64,
    },
    Frameshift(Frameshift),
    PrematureStop {
        aa_pos: usize,
        protein_len: usize,
        ejc_distance: i64,
        nmd: bool,
    },
    LostUorf(LostUorf),
    OrfGain {
        reason: OrfGain,
        start: i64,
        len: i64,
    },
    BadDonor {
        pos: i64,
        consensus: String,
    },
    BadAcceptor {
        pos: i64,
        consensus: String,
    },
}

impl Finding {
    /// Broken or weakened splice signal.
    pub fn from_signal(signal: &Signal) -> Option<Self> {
        if signal.broken {
            Some(Finding::BrokenSite {
                signal: signal.ty,
                pos: signal.pos,
                window: signal.window.clone(),
            })
        } else if signal.weakened {
            Some(Finding::WeakenedSite {
                signal: signal.ty,
                pos: signal.pos,
                window: signal.window.clone(),
            })
        } else {
            None
        }
    }
}

/// One candidate transcript structure on the alternate sequence.
#[derive(Debug, Clone, Serialize)]
pub struct AlternativeStructure {
    pub transcript: Transcript,
    #[serde(flatten)]
    pub fate: ProteinFate,
    pub structure_change: StructureChange,
    pub cryptic_signals: Vec<Signal>,
    pub score: f64,
    pub posterior: f64,
    pub likelihood_ratio: f64,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein: Option<String>,
}

/// The verdict for one projected transcript.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionReport {
    pub transcript_id: String,
    pub gene_id: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_transcript: Option<Transcript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fate: Option<ProteinFate>,
    pub findings: Vec<Finding>,
    pub alternatives: Vec<AlternativeStructure>,
}

impl ProjectionReport {
    pub fn new(transcript_id: &str, gene_id: &str, status: Status) -> Self {
        Self {
            transcript_id: transcript_id.to_string(),
            gene_id: gene_id.to_string(),
            status,
            failure: None,
            mapped_transcript: None,
            fate: None,
            findings: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    pub fn failed(transcript_id: &str, gene_id: &str, tag: FailureTag) -> Self {
        let mut report = Self::new(transcript_id, gene_id, Status::Failed);
        report.failure = Some(tag);
        report
    }

    pub fn is_mapped(&self) -> bool {
        self.status == Status::Mapped
    }
}
