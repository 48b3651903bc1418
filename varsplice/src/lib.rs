//! Projection of annotated transcripts onto variant sequences.
//!
//! For every transcript the annotated splice signals are re-scored on the
//! alternate sequence, a splice graph of plausible structures is built
//! around whatever the variants changed, and each structure is judged for
//! its effect on the encoded protein.

pub mod alignment;
pub mod batch;
pub mod builder;
mod change;
pub mod checker;
pub mod fate;
pub mod graph;
mod interval;
pub mod orf;
pub mod paths;
pub mod report;
pub mod signals;
pub mod transcript;

pub use alignment::{Alignment, Direction};
pub use builder::{BuiltGraph, GraphBuilder};
pub use change::StructureChange;
pub use checker::{ProjectionChecker, ProjectionInput};
pub use fate::{Decay, DecayRule, EjcRule, ProteinFate};
pub use graph::SpliceGraph;
pub use interval::Interval;
pub use paths::{TranscriptPath, TranscriptPaths};
pub use report::{AlternativeStructure, FailureTag, Finding, ProjectionReport, Status};
pub use signals::{decompose, Signal, SignalList};
pub use transcript::{Strand, Transcript};

#[cfg(test)]
mod testutil;
