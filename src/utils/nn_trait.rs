use crate::utils::error::Result;
use crate::utils::mat::Matrix;
use crate::utils::trainer::{EpochReport, Summary};
use std::ops::Range;

pub trait Layer {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;
    /// Training forward pass; keeps what `backward` needs.
    fn forward(&mut self, input: &Matrix) -> Result<Matrix>;
    /// Stateless forward pass for scoring.
    fn eval_forward(&self, input: &Matrix) -> Result<Matrix>;
    fn backward(&mut self, d_loss: &Matrix) -> Result<Matrix>;
    fn update_parameters(&mut self, rate: f32) -> Result<()>;
}

pub trait DataSet {
    fn dim(&self) -> usize;
    fn label_dim(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn get_x(&self, range: Range<usize>) -> Result<Matrix>;
    fn get_y(&self, range: Range<usize>) -> Result<Matrix>;
}

/// Adapts the learning rate once per epoch from the training accuracy.
pub trait LearningRatePolicy: Send {
    fn adjust(&mut self, learning_rate: f32, train_acc: f32) -> f32;
}

/// Receives training progress as data.
pub trait Reporter {
    fn epoch(&mut self, report: &EpochReport);
    fn summary(&mut self, summary: &Summary);
}
