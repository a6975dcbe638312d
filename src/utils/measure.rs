//! Loss gradients and misclassification counts for a sigmoid output layer.
//!
//! Losses are summed over the batch and over output units. With `L2Error`
//! the loss is `0.5 * (p - t)^2`; with `CrossEntropy` it is the binary
//! cross-entropy of each sigmoid unit.

use crate::utils::error::{Error, Result};
use crate::utils::mat::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMeasure {
    /// Binary classification only: one output column.
    L2Error,
    CrossEntropy,
}

fn check(
    targets: &Matrix,
    predictions: &Matrix,
    kind: ErrorMeasure,
    op: &'static str,
) -> Result<()> {
    if targets.shape() != predictions.shape() {
        return Err(Error::DimensionMismatch {
            op,
            lhs: targets.shape(),
            rhs: predictions.shape(),
        });
    }
    if kind == ErrorMeasure::L2Error && predictions.cols() != 1 {
        return Err(Error::InvalidData(format!(
            "L2 error needs a single output column, got {}",
            predictions.cols()
        )));
    }
    Ok(())
}

/// Error signal at the output layer's pre-activation, ready for
/// `DNN::back_propagate`.
pub fn get_error(targets: &Matrix, predictions: &Matrix, kind: ErrorMeasure) -> Result<Matrix> {
    check(targets, predictions, kind, "get_error")?;
    let diff = predictions.sub(targets)?;
    match kind {
        ErrorMeasure::CrossEntropy => Ok(diff),
        ErrorMeasure::L2Error => diff.hadamard(&predictions.dsigma()),
    }
}

/// Number of rows whose predicted class differs from the target class.
///
/// Single-column outputs are thresholded at 0.5, wider ones compared by
/// arg-max.
pub fn zero_one_error(predictions: &Matrix, targets: &Matrix, kind: ErrorMeasure) -> Result<usize> {
    check(targets, predictions, kind, "zero_one_error")?;
    let n = predictions.rows();
    let wrong = if predictions.cols() == 1 {
        (0..n)
            .filter(|&i| (predictions.at(i, 0) >= 0.5) != (targets.at(i, 0) >= 0.5))
            .count()
    } else {
        (0..n)
            .filter(|&i| predictions.argmax_row(i) != targets.argmax_row(i))
            .count()
    };
    Ok(wrong)
}

pub fn loss(predictions: &Matrix, targets: &Matrix, kind: ErrorMeasure) -> Result<f32> {
    check(targets, predictions, kind, "loss")?;
    const EPS: f32 = 1e-7;
    let total: f32 = predictions
        .as_slice()
        .iter()
        .zip(targets.as_slice())
        .map(|(&p, &t)| match kind {
            ErrorMeasure::L2Error => 0.5 * (p - t) * (p - t),
            ErrorMeasure::CrossEntropy => {
                let p = p.clamp(EPS, 1.0 - EPS);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            }
        })
        .sum();
    Ok(total)
}
