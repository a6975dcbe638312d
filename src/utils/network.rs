use crate::utils::error::{Error, Result};
use crate::utils::linear::AffineTransform;
use crate::utils::mat::{Backend, Matrix};
use crate::utils::nn_trait::Layer;
use rand::Rng;
use rayon::prelude::*;

/// Feed-forward stack of sigmoid affine layers.
#[derive(Debug, Clone)]
pub struct DNN {
    transforms: Vec<AffineTransform>,
    dims: Vec<usize>,
    backend: Backend,
}

impl DNN {
    /// Random network with layer widths `dims`, input first.
    pub fn new<R: Rng + ?Sized>(dims: &[usize], variance: f32, rng: &mut R) -> Result<Self> {
        if dims.len() < 2 {
            return Err(Error::InvalidData(format!(
                "a network needs at least an input and an output width, got {:?}",
                dims
            )));
        }
        let transforms = dims
            .windows(2)
            .map(|w| AffineTransform::new(w[0], w[1], variance, rng))
            .collect::<Result<Vec<_>>>()?;
        Self::from_layers(transforms)
    }

    pub fn from_weights(weights: Vec<Matrix>) -> Result<Self> {
        let transforms = weights
            .into_iter()
            .map(AffineTransform::from_weight)
            .collect::<Result<Vec<_>>>()?;
        Self::from_layers(transforms)
    }

    pub fn from_layers(transforms: Vec<AffineTransform>) -> Result<Self> {
        let first = transforms.first().ok_or_else(|| {
            Error::InvalidData("a network needs at least one layer".to_owned())
        })?;
        let mut dims = vec![first.input_dim()];
        for (i, pair) in transforms.windows(2).enumerate() {
            if pair[0].output_dim() != pair[1].input_dim() {
                return Err(Error::InvalidLayerChain {
                    layer: i,
                    out_dim: pair[0].output_dim(),
                    next_in_dim: pair[1].input_dim(),
                });
            }
        }
        dims.extend(transforms.iter().map(|t| t.output_dim()));
        let backend = first.weight().backend();
        Ok(Self {
            transforms,
            dims,
            backend,
        })
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        for t in self.transforms.iter_mut() {
            t.set_backend(backend);
        }
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn n_layer(&self) -> usize {
        self.transforms.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn input_dim(&self) -> usize {
        self.dims[0]
    }

    pub fn output_dim(&self) -> usize {
        self.dims[self.dims.len() - 1]
    }

    pub fn layers(&self) -> &[AffineTransform] {
        &self.transforms
    }

    pub fn weights(&self) -> Vec<&Matrix> {
        self.transforms.iter().map(|t| t.weight()).collect()
    }

    /// Training forward pass; every layer keeps its activation.
    pub fn feed_forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let mut x = input.clone();
        for layer in self.transforms.iter_mut() {
            x = layer.forward(&x)?;
        }
        Ok(x)
    }

    /// Scoring pass, leaves layer state alone.
    pub fn predict(&self, input: &Matrix) -> Result<Matrix> {
        let mut x = input.clone();
        for layer in self.transforms.iter() {
            x = layer.eval_forward(&x)?;
        }
        Ok(x)
    }

    /// `error` is the signal at the output pre-activation (see
    /// `measure::get_error`). Computes every layer's gradient, no update.
    pub fn back_propagate(&mut self, error: &Matrix) -> Result<()> {
        let mut error = error.clone();
        for i in (0..self.transforms.len()).rev() {
            let propagated = self.transforms[i].backward(&error)?;
            if i > 0 {
                let hidden = self.transforms[i - 1].output().ok_or(Error::StateMisuse {
                    op: "back_propagate",
                    reason: "no forward pass to differentiate",
                })?;
                error = propagated.hadamard(&hidden.dsigma())?;
            }
        }
        Ok(())
    }

    pub fn update_parameters(&mut self, learning_rate: f32) -> Result<()> {
        match self.backend {
            Backend::Sequential => self
                .transforms
                .iter_mut()
                .try_for_each(|t| t.update_parameters(learning_rate)),
            Backend::Parallel => self
                .transforms
                .par_iter_mut()
                .try_for_each(|t| t.update_parameters(learning_rate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::measure::{get_error, loss, ErrorMeasure};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net(dims: &[usize]) -> DNN {
        let mut rng = StdRng::seed_from_u64(3);
        DNN::new(dims, 0.5, &mut rng).unwrap()
    }

    fn xor() -> (Matrix, Matrix) {
        let x = Matrix::from_rows(&[
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ])
        .unwrap();
        let y = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]]).unwrap();
        (x, y)
    }

    #[test]
    fn dims_follow_the_layers() {
        let dnn = net(&[2, 3, 4, 1]);
        assert_eq!(dnn.n_layer(), 3);
        assert_eq!(dnn.dims(), &[2, 3, 4, 1]);
        assert_eq!(dnn.weights()[1].shape(), (4, 4));
    }

    #[test]
    fn broken_chain_is_rejected() {
        let ws = vec![Matrix::new(3, 3), Matrix::new(5, 1)];
        match DNN::from_weights(ws) {
            Err(Error::InvalidLayerChain {
                layer,
                out_dim,
                next_in_dim,
            }) => assert_eq!((layer, out_dim, next_in_dim), (0, 3, 4)),
            other => panic!("expected InvalidLayerChain, got {:?}", other),
        }
        assert!(DNN::from_weights(vec![]).is_err());
        assert!(DNN::new(&[4], 0.1, &mut StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn feed_forward_keeps_every_activation() {
        let mut dnn = net(&[2, 3, 1]);
        let (x, _) = xor();
        let out = dnn.feed_forward(&x).unwrap();
        assert_eq!(out.shape(), (4, 1));
        assert_eq!(dnn.layers()[0].output().unwrap().shape(), (4, 3));
        assert_eq!(dnn.layers()[1].output(), Some(&out));
        assert_eq!(dnn.predict(&x).unwrap(), out);
    }

    #[test]
    fn gradient_matches_finite_difference_through_hidden_layer() {
        let mut dnn = net(&[2, 3, 1]);
        let (x, y) = xor();
        let out = dnn.feed_forward(&x).unwrap();
        let err = get_error(&y, &out, ErrorMeasure::CrossEntropy).unwrap();
        dnn.back_propagate(&err).unwrap();
        let grad = dnn.layers()[0].gradient().unwrap().clone();

        let eps = 1e-2;
        let weights: Vec<Matrix> = dnn.weights().into_iter().cloned().collect();
        for i in 0..3 {
            for j in 0..3 {
                let mut plus = weights.clone();
                let w = plus[0].at(i, j);
                plus[0].set(i, j, w + eps);
                let mut minus = weights.clone();
                minus[0].set(i, j, w - eps);
                let lp = loss(
                    &DNN::from_weights(plus).unwrap().predict(&x).unwrap(),
                    &y,
                    ErrorMeasure::CrossEntropy,
                )
                .unwrap();
                let lm = loss(
                    &DNN::from_weights(minus).unwrap().predict(&x).unwrap(),
                    &y,
                    ErrorMeasure::CrossEntropy,
                )
                .unwrap();
                assert_relative_eq!(grad.at(i, j), (lp - lm) / (2.0 * eps), epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn one_step_decreases_loss() {
        for backend in [Backend::Sequential, Backend::Parallel] {
            let mut dnn = net(&[2, 3, 1]).with_backend(backend);
            let (x, y) = xor();
            let out = dnn.feed_forward(&x).unwrap();
            let before = loss(&out, &y, ErrorMeasure::CrossEntropy).unwrap();
            let err = get_error(&y, &out, ErrorMeasure::CrossEntropy).unwrap();
            dnn.back_propagate(&err).unwrap();
            dnn.update_parameters(0.05).unwrap();
            let after = loss(&dnn.predict(&x).unwrap(), &y, ErrorMeasure::CrossEntropy).unwrap();
            assert!(after < before, "{:?}: {} -> {}", backend, before, after);
        }
    }

    #[test]
    fn backends_train_identically() {
        let (x, y) = xor();
        let mut seq = net(&[2, 4, 1]);
        let mut par = seq.clone().with_backend(Backend::Parallel);
        for _ in 0..5 {
            for dnn in [&mut seq, &mut par] {
                let out = dnn.feed_forward(&x).unwrap();
                let err = get_error(&y, &out, ErrorMeasure::CrossEntropy).unwrap();
                dnn.back_propagate(&err).unwrap();
                dnn.update_parameters(0.1).unwrap();
            }
        }
        assert_eq!(seq.weights(), par.weights());
    }

    #[test]
    fn back_propagate_needs_a_forward_pass() {
        let mut dnn = net(&[2, 3, 1]);
        let err = Matrix::new(4, 1);
        assert!(matches!(
            dnn.back_propagate(&err),
            Err(Error::StateMisuse { .. })
        ));
    }
}
