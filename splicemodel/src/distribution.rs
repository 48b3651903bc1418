use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Length distribution of one region type.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Duration {
    Geometric { mean: f64 },
    Empirical(EmpiricalDistribution),
}

impl Duration {
    pub fn log_p(&self, len: i64) -> f64 {
        match self {
            Duration::Geometric { mean } => {
                let q = 1.0 / (mean + 1.0);
                len as f64 * (1.0 - q).ln() + q.ln()
            }
            Duration::Empirical(d) => d.log_p(len),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Duration::Geometric { mean } => {
                ensure!(*mean > 0.0, "Geometric mean length must be positive");
                Ok(())
            }
            Duration::Empirical(d) => d.validate(),
        }
    }
}

/// Histogram of lengths; `bins` are `(x, weight)` pairs with evenly spaced,
/// increasing `x`. Weights are normalised on first use.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EmpiricalDistribution {
    pub bins: Vec<(i64, f64)>,
    #[serde(default = "default_interpolate")]
    pub interpolate: bool,
}

fn default_interpolate() -> bool {
    true
}

impl EmpiricalDistribution {
    pub fn new(bins: Vec<(i64, f64)>, interpolate: bool) -> Result<Self> {
        let d = Self { bins, interpolate };
        d.validate()?;
        Ok(d)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.bins.len() >= 2, "Empirical distribution needs at least two bins");
        ensure!(
            self.bins.windows(2).all(|w| w[0].0 < w[1].0),
            "Empirical distribution bins must be increasing"
        );
        ensure!(
            self.bins.iter().all(|(_, y)| *y > 0.0 && y.is_finite()),
            "Empirical distribution bins must have positive weight"
        );
        Ok(())
    }

    fn bin_size(&self) -> f64 {
        (self.bins[1].0 - self.bins[0].0) as f64
    }

    fn total(&self) -> f64 {
        self.bins.iter().map(|(_, y)| *y).sum::<f64>() * self.bin_size()
    }

    fn density(&self, i: usize) -> f64 {
        self.bins[i].1 / self.total()
    }

    pub fn log_p(&self, x: i64) -> f64 {
        let n = self.bins.len();
        let index = self.bins.partition_point(|(bx, _)| *bx < x);
        if index >= n {
            return self.density(n - 1).ln();
        }
        let (found_x, _) = self.bins[index];
        let found_y = self.density(index);
        if x == found_x || !self.interpolate {
            return found_y.ln();
        }
        // x lies strictly left of found_x
        let (x1, y1) = if index == 0 {
            (0, 0.0)
        } else {
            (self.bins[index - 1].0, self.density(index - 1))
        };
        let y = (found_y - y1) / (found_x - x1) as f64 * (x - x1) as f64 + y1;
        y.ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometric() {
        let d = Duration::Geometric { mean: 99.0 };
        let q: f64 = 0.01;
        assert!((d.log_p(0) - q.ln()).abs() < 1e-12);
        assert!((d.log_p(10) - (10.0 * (1.0 - q).ln() + q.ln())).abs() < 1e-12);
        assert!(d.log_p(10) > d.log_p(1000));
    }

    #[test]
    fn test_empirical() {
        let d = EmpiricalDistribution::new(vec![(0, 1.0), (10, 3.0), (20, 1.0)], true).unwrap();
        // total mass = 5 * 10
        assert!((d.log_p(10) - (3.0f64 / 50.0).ln()).abs() < 1e-12);
        assert!((d.log_p(5) - (2.0f64 / 50.0).ln()).abs() < 1e-12);
        assert!((d.log_p(500) - (1.0f64 / 50.0).ln()).abs() < 1e-12);

        let parsed: Duration = serde_yaml::from_str("empirical:\n  bins: [[0, 1.0], [10, 3.0], [20, 1.0]]\n").unwrap();
        assert!((parsed.log_p(10) - d.log_p(10)).abs() < 1e-12);
    }

    #[test]
    fn test_empirical_rejects_empty_bins() {
        assert!(EmpiricalDistribution::new(vec![(0, 1.0), (10, 0.0), (20, 1.0)], true).is_err());
        assert!(EmpiricalDistribution::new(vec![(0, 1.0), (10, -0.5), (20, 2.0)], false).is_err());
        let parsed: Duration = serde_yaml::from_str("empirical:\n  bins: [[0, 1.0], [10, 0.0]]\n").unwrap();
        assert!(parsed.validate().is_err());
    }
}
