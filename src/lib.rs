//! Feed-forward sigmoid networks trained by mini-batch gradient descent with
//! an adaptive learning rate and validation-based early stopping.
//!
//! Matrices run their kernels either sequentially or on the rayon pool
//! (`Backend`); the arithmetic is the same either way.

pub mod utils;

pub use utils::config::Config;
pub use utils::dataset::{MemoryDataSet, Normalization, RawData};
pub use utils::error::{Error, Result};
pub use utils::linear::AffineTransform;
pub use utils::mat::{Backend, Matrix};
pub use utils::measure::ErrorMeasure;
pub use utils::network::DNN;
pub use utils::nn_trait::{DataSet, Layer, LearningRatePolicy, Reporter};
pub use utils::trainer::{is_stopping, LogReporter, Summary, TrainState, TrainingSession};
