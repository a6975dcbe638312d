use crate::utils::error::{Error, Result};
use std::fmt::Formatter;

/// Hyperparameters of one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub learning_rate: f32,
    /// Variance of the normal distribution used for initial weights.
    pub variance: f32,
    pub min_valid_accuracy: f32,
    pub max_epoch: usize,
    /// Trailing epochs over which validation error may not increase before
    /// training stops.
    pub n_non_inc_epoch: usize,
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            variance: 0.01,
            min_valid_accuracy: 0.5,
            max_epoch: 100_000,
            n_non_inc_epoch: 6,
            batch_size: 32,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if !(self.variance.is_finite() && self.variance >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "variance must be finite and >= 0, got {}",
                self.variance
            )));
        }
        if !(0.0..=1.0).contains(&self.min_valid_accuracy) {
            return Err(Error::InvalidConfig(format!(
                "minimum validation accuracy must lie in [0, 1], got {}",
                self.min_valid_accuracy
            )));
        }
        if self.max_epoch == 0 {
            return Err(Error::InvalidConfig("max epoch must be > 0".to_owned()));
        }
        if self.n_non_inc_epoch == 0 {
            return Err(Error::InvalidConfig(
                "non-increasing epoch window must be > 0".to_owned(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be > 0".to_owned()));
        }
        Ok(())
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "learning rate            = {}", self.learning_rate)?;
        writeln!(f, "variance                 = {}", self.variance)?;
        writeln!(f, "min validation accuracy  = {}", self.min_valid_accuracy)?;
        writeln!(f, "max epoch                = {}", self.max_epoch)?;
        writeln!(f, "non-increasing epochs    = {}", self.n_non_inc_epoch)?;
        write!(f, "batch size               = {}", self.batch_size)
    }
}
