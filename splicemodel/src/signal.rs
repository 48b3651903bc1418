use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::fmt::Display;
use std::str::FromStr;

/// Boundary markers of a gene model, in forward-strand orientation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalType {
    LeftTerminus,
    Tss,
    /// Start codon
    Atg,
    /// Stop codon
    Tag,
    /// Donor splice site
    Gt,
    /// Acceptor splice site
    Ag,
    Tes,
    RightTerminus,
}

impl SignalType {
    pub fn is_splice_site(&self) -> bool {
        matches!(self, SignalType::Gt | SignalType::Ag)
    }

    pub fn is_donor(&self) -> bool {
        *self == SignalType::Gt
    }

    pub fn is_acceptor(&self) -> bool {
        *self == SignalType::Ag
    }

    pub fn is_start_or_stop(&self) -> bool {
        matches!(self, SignalType::Atg | SignalType::Tag)
    }

    pub fn is_terminus(&self) -> bool {
        matches!(self, SignalType::LeftTerminus | SignalType::RightTerminus)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::LeftTerminus => "LEFT_TERMINUS",
            SignalType::Tss => "TSS",
            SignalType::Atg => "ATG",
            SignalType::Tag => "TAG",
            SignalType::Gt => "GT",
            SignalType::Ag => "AG",
            SignalType::Tes => "TES",
            SignalType::RightTerminus => "RIGHT_TERMINUS",
        }
    }
}

impl Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "LEFT_TERMINUS" => Ok(SignalType::LeftTerminus),
            "TSS" => Ok(SignalType::Tss),
            "ATG" | "START" => Ok(SignalType::Atg),
            "TAG" | "STOP" => Ok(SignalType::Tag),
            "GT" | "DONOR" => Ok(SignalType::Gt),
            "AG" | "ACCEPTOR" => Ok(SignalType::Ag),
            "TES" => Ok(SignalType::Tes),
            "RIGHT_TERMINUS" => Ok(SignalType::RightTerminus),
            _ => bail!("Invalid signal type: {}", s),
        }
    }
}

impl<'de> Deserialize<'de> for SignalType {
    fn deserialize<D>(deserializer: D) -> Result<SignalType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => SignalType::from_str(&s).map_err(serde::de::Error::custom),
            _ => Err(serde::de::Error::custom(format!("invalid value: {:?}", value))),
        }
    }
}

impl Serialize for SignalType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.as_str().serialize(serializer)
    }
}

/// Functional class of the sequence between two adjacent signals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ContentType {
    Exon,
    Intron,
    Intergenic,
}

impl ContentType {
    /// The content type of a span is fixed by the signal on its left.
    pub fn following(from: SignalType) -> Option<ContentType> {
        match from {
            SignalType::LeftTerminus => Some(ContentType::Intergenic),
            SignalType::Tss => Some(ContentType::Exon),
            SignalType::Atg => Some(ContentType::Exon),
            SignalType::Gt => Some(ContentType::Intron),
            SignalType::Ag => Some(ContentType::Exon),
            SignalType::Tag => Some(ContentType::Exon),
            SignalType::Tes => Some(ContentType::Intergenic),
            SignalType::RightTerminus => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Exon => "exon",
            ContentType::Intron => "intron",
            ContentType::Intergenic => "intergenic",
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "exon" => Ok(ContentType::Exon),
            "intron" => Ok(ContentType::Intron),
            "intergenic" => Ok(ContentType::Intergenic),
            _ => bail!("Invalid content type: {}", s),
        }
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D>(deserializer: D) -> Result<ContentType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => ContentType::from_str(&s).map_err(serde::de::Error::custom),
            _ => Err(serde::de::Error::custom(format!("invalid value: {:?}", value))),
        }
    }
}

impl Serialize for ContentType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.as_str().serialize(serializer)
    }
}
