mod content;
mod distribution;
mod sensor;
mod signal;
mod transitions;

pub use content::{ContentScores, ContentSensor, ContentSensors, MarkovChain, PrefixSums};
pub use distribution::{Duration, EmpiricalDistribution};
pub use sensor::{SignalSensor, SignalSensors, WeightMatrix};
pub use signal::{ContentType, SignalType};
pub use transitions::{Transition, Transitions};

use anyhow::{ensure, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Numeric limits and thresholds used while building and judging graphs.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub max_splice_shift: i64,
    pub min_exon_len: i64,
    pub min_intron_len: i64,
    /// Minimum distance (nt) from a stop codon to the last exon junction
    /// for the transcript to be considered a decay target.
    pub nmd_distance: i64,
    pub exon_weakening_threshold: f64,
    pub exon_strengthening_threshold: f64,
    pub min_exon_intron_ratio: f64,
    pub min_path_score: f64,
    pub max_alternatives: usize,
    pub max_cryptic_exon_len: i64,
    pub min_cryptic_exon_len: i64,
    pub max_intron_retention_len: i64,
    pub min_intron_retention_llr: f64,
    pub min_cryptic_exon_llr: f64,
    pub min_orf_len: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_splice_shift: 70,
            min_exon_len: 30,
            min_intron_len: 50,
            nmd_distance: 50,
            exon_weakening_threshold: 0.75,
            exon_strengthening_threshold: 1.25,
            min_exon_intron_ratio: 1.0,
            min_path_score: 0.0,
            max_alternatives: 10,
            max_cryptic_exon_len: 300,
            min_cryptic_exon_len: 20,
            max_intron_retention_len: 2000,
            min_intron_retention_llr: f64::NEG_INFINITY,
            min_cryptic_exon_llr: f64::NEG_INFINITY,
            min_orf_len: 300,
        }
    }
}

/// Which kinds of structural change the graph builder may propose.
#[derive(Deserialize, Serialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Features {
    pub exon_skipping: bool,
    pub intron_retention: bool,
    pub cryptic_sites: bool,
    pub de_novo_sites: bool,
    pub cryptic_exons: bool,
    pub regulatory_changes: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            exon_skipping: true,
            intron_retention: true,
            cryptic_sites: true,
            de_novo_sites: false,
            cryptic_exons: false,
            regulatory_changes: false,
        }
    }
}

impl Features {
    /// Nothing but the annotated structure.
    pub fn none() -> Self {
        Self {
            exon_skipping: false,
            intron_retention: false,
            cryptic_sites: false,
            de_novo_sites: false,
            cryptic_exons: false,
            regulatory_changes: false,
        }
    }

    pub fn all() -> Self {
        Self {
            exon_skipping: true,
            intron_retention: true,
            cryptic_sites: true,
            de_novo_sites: true,
            cryptic_exons: true,
            regulatory_changes: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SensorsConfig {
    pub donor: WeightMatrix,
    pub acceptor: WeightMatrix,
    pub start_codon: WeightMatrix,
    pub short_start: WeightMatrix,
    pub stop_codons: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ContentConfig {
    pub exon: MarkovChain,
    pub intron: MarkovChain,
    pub intergenic: MarkovChain,
    pub splice_background: Option<MarkovChain>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Durations {
    pub exon: Duration,
    pub intron: Duration,
    pub intergenic: Duration,
}

impl Durations {
    pub fn get(&self, ty: ContentType) -> &Duration {
        match ty {
            ContentType::Exon => &self.exon,
            ContentType::Intron => &self.intron,
            ContentType::Intergenic => &self.intergenic,
        }
    }
}

/// On-disk form of a model bundle.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelConfig {
    pub sensors: SensorsConfig,
    pub content: ContentConfig,
    pub durations: Durations,
    pub transitions: Transitions,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub features: Features,
}

/// Everything the engine consults to score sequence: signal sensors,
/// content sensors, duration distributions, transitions, thresholds and
/// the enabled features.
#[derive(Debug)]
pub struct Model {
    pub sensors: SignalSensors,
    pub content: ContentSensors,
    pub durations: Durations,
    pub transitions: Transitions,
    pub thresholds: Thresholds,
    pub features: Features,
}

impl Model {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("cannot read model file {}", path.as_ref().display()))?;
        Self::from_yaml_str(&yaml_str)
    }

    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let config: ModelConfig = serde_yaml::from_str(yaml_str)?;
        Self::from_config(config)
    }

    pub fn from_config(config: ModelConfig) -> Result<Self> {
        let ModelConfig { sensors, content, durations, transitions, thresholds, features } = config;
        for (slot, wmm) in [
            (SignalType::Gt, &sensors.donor),
            (SignalType::Ag, &sensors.acceptor),
            (SignalType::Atg, &sensors.start_codon),
            (SignalType::Atg, &sensors.short_start),
        ] {
            ensure!(
                wmm.signal_type == slot,
                "sensor registered for {} has signal type {}",
                slot,
                wmm.signal_type
            );
            wmm.validate()?;
        }
        ensure!(!sensors.stop_codons.is_empty(), "no stop codons configured");
        for chain in [&content.exon, &content.intron, &content.intergenic]
            .into_iter()
            .chain(content.splice_background.as_ref())
        {
            chain.validate()?;
        }
        durations.exon.validate()?;
        durations.intron.validate()?;
        durations.intergenic.validate()?;
        debug!("Loaded model with features {:?}", features);

        Ok(Self {
            sensors: SignalSensors {
                donor: Box::new(sensors.donor),
                acceptor: Box::new(sensors.acceptor),
                start_codon: Box::new(sensors.start_codon),
                short_start: Box::new(sensors.short_start),
                stop_codons: sensors.stop_codons.iter().map(|c| c.to_uppercase()).collect(),
            },
            content: ContentSensors {
                exon: Box::new(content.exon),
                intron: Box::new(content.intron),
                intergenic: Box::new(content.intergenic),
                splice_background: content
                    .splice_background
                    .map(|c| Box::new(c) as Box<dyn ContentSensor>),
            },
            durations,
            transitions,
            thresholds,
            features,
        })
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}
