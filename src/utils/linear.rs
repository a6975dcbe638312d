use crate::utils::error::{Error, Result};
use crate::utils::mat::{Backend, Matrix};
use crate::utils::nn_trait::Layer;
use log::warn;
use rand::Rng;

/// Sigmoid affine layer. `weight` is `(in_dim + 1) x out_dim`; its last row
/// multiplies the constant bias feature.
#[derive(Debug, Clone)]
pub struct AffineTransform {
    weight: Matrix,
    last_input: Option<Matrix>,
    last_output: Option<Matrix>,
    d_weight: Option<Matrix>,
}

impl AffineTransform {
    pub fn new<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        variance: f32,
        rng: &mut R,
    ) -> Result<Self> {
        let mut weight = Matrix::new(in_dim + 1, out_dim);
        weight.normal_init(variance, rng)?;
        Self::from_weight(weight)
    }

    pub fn from_weight(weight: Matrix) -> Result<Self> {
        let (h, w) = weight.shape();
        if h < 2 || w == 0 {
            return Err(Error::InvalidData(format!(
                "a {}x{} weight cannot hold a layer with a bias row",
                h, w
            )));
        }
        Ok(Self {
            weight,
            last_input: None,
            last_output: None,
            d_weight: None,
        })
    }

    pub fn weight(&self) -> &Matrix {
        &self.weight
    }

    pub fn set_backend(&mut self, backend: Backend) {
        self.weight.set_backend(backend);
    }

    /// Activation from the last training forward pass.
    pub fn output(&self) -> Option<&Matrix> {
        self.last_output.as_ref()
    }

    pub fn gradient(&self) -> Option<&Matrix> {
        self.d_weight.as_ref()
    }

    fn activate(&self, input: &Matrix) -> Result<(Matrix, Matrix)> {
        if input.cols() != self.input_dim() {
            return Err(Error::DimensionMismatch {
                op: "forward",
                lhs: input.shape(),
                rhs: self.weight.shape(),
            });
        }
        let with_bias = input.add_bias().with_backend(self.weight.backend());
        let mut now = with_bias.mul(&self.weight)?;
        now.sigmoid_();
        Ok((with_bias, now))
    }
}

impl Layer for AffineTransform {
    fn input_dim(&self) -> usize {
        self.weight.rows() - 1
    }

    fn output_dim(&self) -> usize {
        self.weight.cols()
    }

    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let (with_bias, now) = self.activate(input)?;
        self.last_input = Some(with_bias);
        self.last_output = Some(now.clone());
        Ok(now)
    }

    fn eval_forward(&self, input: &Matrix) -> Result<Matrix> {
        self.activate(input).map(|(_, now)| now)
    }

    /// `d_loss` is the error at this layer's pre-activation. Stores
    /// `input^T × d_loss` and returns `d_loss × W^T` without the bias column.
    fn backward(&mut self, d_loss: &Matrix) -> Result<Matrix> {
        let input = self.last_input.as_ref().ok_or(Error::StateMisuse {
            op: "backward",
            reason: "no forward pass to differentiate",
        })?;
        if d_loss.shape() != (input.rows(), self.output_dim()) {
            return Err(Error::DimensionMismatch {
                op: "backward",
                lhs: d_loss.shape(),
                rhs: (input.rows(), self.output_dim()),
            });
        }
        let d_loss = d_loss.clone().with_backend(self.weight.backend());
        self.d_weight = Some(input.T().mul(&d_loss)?);
        d_loss.mul(&self.weight.T())?.remove_bias()
    }

    fn update_parameters(&mut self, rate: f32) -> Result<()> {
        match self.d_weight.take() {
            Some(grad) => self.weight.add_scaled_(-rate, &grad),
            None if cfg!(debug_assertions) => Err(Error::StateMisuse {
                op: "update_parameters",
                reason: "no gradient since the last update",
            }),
            None => {
                warn!("update_parameters called without a gradient; weights left unchanged");
                Ok(())
            }
        }
    }
}
