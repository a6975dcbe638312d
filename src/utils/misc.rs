use crate::utils::error::{Error, Result};
use crate::utils::mat::Matrix;

/// Fails on the first NaN or infinity in `x`.
pub fn check_abnormal(x: &Matrix, op: &'static str) -> Result<()> {
    if x.is_finite() {
        Ok(())
    } else {
        Err(Error::NonFinite { op })
    }
}

/// `1 - errors / total`
pub fn accuracy(errors: usize, total: usize) -> f32 {
    1.0 - errors as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flags_nan_and_infinity() {
        let mut x = Matrix::new(2, 2);
        assert!(check_abnormal(&x, "test").is_ok());
        x.set(1, 0, f32::NAN);
        assert!(matches!(check_abnormal(&x, "test"), Err(Error::NonFinite { op: "test" })));
        x.set(1, 0, f32::INFINITY);
        assert!(check_abnormal(&x, "test").is_err());
    }

    #[test]
    fn accuracy_from_counts() {
        assert_relative_eq!(accuracy(0, 10), 1.0);
        assert_relative_eq!(accuracy(3, 12), 0.75);
    }
}
