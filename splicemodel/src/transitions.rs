use anyhow::{ensure, Result};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::signal::SignalType;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: SignalType,
    pub to: SignalType,
    pub prob: f64,
}

/// Log-probabilities of moving from one signal type to the next. Rows are
/// normalised so the outgoing probabilities of each type sum to one.
#[derive(Debug, Clone, Default)]
pub struct Transitions(IndexMap<(SignalType, SignalType), f64>);

impl Transitions {
    pub fn new(entries: impl IntoIterator<Item = Transition>) -> Result<Self> {
        let entries: Vec<Transition> = entries.into_iter().collect();
        for t in &entries {
            ensure!(t.prob >= 0.0, "Negative transition probability {} -> {}", t.from, t.to);
        }
        let row_sums: IndexMap<SignalType, f64> = entries
            .iter()
            .into_group_map_by(|t| t.from)
            .into_iter()
            .map(|(from, row)| (from, row.iter().map(|t| t.prob).sum()))
            .collect();
        let table = entries
            .iter()
            .map(|t| {
                let sum = row_sums.get(&t.from).copied().unwrap_or(0.0);
                let p = if sum > 0.0 { t.prob / sum } else { 0.0 };
                ((t.from, t.to), p.ln())
            })
            .collect();
        Ok(Self(table))
    }

    /// Negative infinity for transitions the model does not allow.
    pub fn log_p(&self, from: SignalType, to: SignalType) -> f64 {
        self.0.get(&(from, to)).copied().unwrap_or(f64::NEG_INFINITY)
    }

    pub fn entries(&self) -> impl Iterator<Item = Transition> + '_ {
        self.0.iter().map(|((from, to), lp)| Transition {
            from: *from,
            to: *to,
            prob: lp.exp(),
        })
    }
}

impl Display for Transitions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for ((from, to), lp) in &self.0 {
            writeln!(f, "{} -> {} : {}", from, to, lp.exp())?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Transitions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = Vec::<Transition>::deserialize(deserializer)?;
        Transitions::new(entries).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Transitions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.entries().collect::<Vec<_>>().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalised_rows() {
        let yaml = "
- {from: AG, to: GT, prob: 3}
- {from: AG, to: TES, prob: 1}
- {from: GT, to: AG, prob: 5}
";
        let trans: Transitions = serde_yaml::from_str(yaml).unwrap();
        assert!((trans.log_p(SignalType::Ag, SignalType::Gt) - 0.75f64.ln()).abs() < 1e-12);
        assert!((trans.log_p(SignalType::Ag, SignalType::Tes) - 0.25f64.ln()).abs() < 1e-12);
        assert_eq!(trans.log_p(SignalType::Gt, SignalType::Ag), 0.0);
        assert_eq!(trans.log_p(SignalType::Gt, SignalType::Tes), f64::NEG_INFINITY);
    }
}
