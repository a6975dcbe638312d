use crate::utils::nn_trait::LearningRatePolicy;
use log::debug;

/// Never touches the rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Constant;

impl LearningRatePolicy for Constant {
    fn adjust(&mut self, learning_rate: f32, _: f32) -> f32 {
        learning_rate
    }
}

/// Multiplies the rate by `factor` the first time training accuracy passes
/// each threshold. This is the default policy.
#[derive(Debug, Clone)]
pub struct PhasedDecay {
    thresholds: Vec<f32>,
    factor: f32,
    phase: usize,
}

impl PhasedDecay {
    pub fn new(thresholds: Vec<f32>, factor: f32) -> Self {
        Self {
            thresholds,
            factor,
            phase: 0,
        }
    }

    pub fn phase(&self) -> usize {
        self.phase
    }
}

impl Default for PhasedDecay {
    fn default() -> Self {
        Self::new(vec![0.80, 0.85, 0.90, 0.95, 0.97, 0.98, 0.99], 0.5)
    }
}

impl LearningRatePolicy for PhasedDecay {
    fn adjust(&mut self, learning_rate: f32, train_acc: f32) -> f32 {
        let mut rate = learning_rate;
        while self.phase < self.thresholds.len() && train_acc > self.thresholds[self.phase] {
            rate *= self.factor;
            self.phase += 1;
            debug!(
                "training accuracy {:.4} passed phase {}, learning rate now {}",
                train_acc, self.phase, rate
            );
        }
        rate
    }
}

/// Multiplies the rate by `factor` whenever training accuracy falls below
/// the previous epoch's.
#[derive(Debug, Clone)]
pub struct DecayOnRegression {
    factor: f32,
    last_acc: Option<f32>,
}

impl DecayOnRegression {
    pub fn new(factor: f32) -> Self {
        Self {
            factor,
            last_acc: None,
        }
    }
}

impl LearningRatePolicy for DecayOnRegression {
    fn adjust(&mut self, learning_rate: f32, train_acc: f32) -> f32 {
        let regressed = matches!(self.last_acc, Some(prev) if train_acc < prev);
        self.last_acc = Some(train_acc);
        if regressed {
            debug!("training accuracy regressed to {:.4}", train_acc);
            learning_rate * self.factor
        } else {
            learning_rate
        }
    }
}
