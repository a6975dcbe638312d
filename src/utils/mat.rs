use crate::utils::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::fmt::Formatter;
use std::ops::Range;

/// Where a matrix runs its kernels.
///
/// Both variants evaluate every output element with the same accumulation
/// order, so results match bit for bit; only throughput differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Sequential,
    Parallel,
}

/// Dense row-major matrix of `f32`.
#[derive(Debug, Clone)]
pub struct Matrix {
    data: Vec<f32>,
    row: usize,
    col: usize,
    backend: Backend,
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row && self.col == other.col && self.data == other.data
    }
}

/// Runs `f(row_index, row)` over every row of `data`, sequentially or on the
/// rayon pool. All kernels go through here.
fn for_each_row<F>(backend: Backend, data: &mut [f32], col: usize, f: F)
where
    F: Fn(usize, &mut [f32]) + Sync + Send,
{
    if col == 0 || data.is_empty() {
        return;
    }
    match backend {
        Backend::Sequential => data
            .chunks_mut(col)
            .enumerate()
            .for_each(|(i, row)| f(i, row)),
        Backend::Parallel => data
            .par_chunks_mut(col)
            .enumerate()
            .for_each(|(i, row)| f(i, row)),
    }
}

impl Matrix {
    pub fn new(n: usize, m: usize) -> Self {
        Matrix {
            data: vec![0.0; n * m],
            row: n,
            col: m,
            backend: Backend::default(),
        }
    }

    pub fn from_vec(n: usize, m: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != n * m {
            return Err(Error::InvalidData(format!(
                "buffer of {} values cannot form a {}x{} matrix",
                data.len(),
                n,
                m
            )));
        }
        Ok(Matrix {
            data,
            row: n,
            col: m,
            backend: Backend::default(),
        })
    }

    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let col = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * col);
        for (i, r) in rows.iter().enumerate() {
            if r.len() != col {
                return Err(Error::InvalidData(format!(
                    "row {} has {} values, expected {}",
                    i,
                    r.len(),
                    col
                )));
            }
            data.extend_from_slice(r);
        }
        Matrix::from_vec(rows.len(), col, data)
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn set_backend(&mut self, backend: Backend) {
        self.backend = backend;
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn rows(&self) -> usize {
        self.row
    }

    pub fn cols(&self) -> usize {
        self.col
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.col..(i + 1) * self.col]
    }

    pub fn at(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.col + j]
    }

    pub fn set(&mut self, i: usize, j: usize, val: f32) {
        self.data[i * self.col + j] = val;
    }

    /// Draws every entry from `N(0, variance)`.
    pub fn normal_init<R: Rng + ?Sized>(&mut self, variance: f32, rng: &mut R) -> Result<()> {
        let normal = Normal::new(0.0f32, variance.sqrt())
            .map_err(|e| Error::InvalidConfig(format!("variance {}: {}", variance, e)))?;
        self.data.iter_mut().for_each(|x| *x = normal.sample(rng));
        Ok(())
    }

    fn check_same_shape(&self, rhs: &Matrix, op: &'static str) -> Result<()> {
        if self.shape() != rhs.shape() {
            return Err(Error::DimensionMismatch {
                op,
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }
        Ok(())
    }

    fn ops_with_matrix_<T>(&mut self, rhs: &Matrix, op: &'static str, f: T) -> Result<()>
    where
        T: Fn(f32, f32) -> f32 + Sync + Send,
    {
        self.check_same_shape(rhs, op)?;
        let col = self.col;
        let src = &rhs.data;
        for_each_row(self.backend, &mut self.data, col, |i, dst| {
            let snd = &src[i * col..(i + 1) * col];
            for (a, &b) in dst.iter_mut().zip(snd) {
                *a = f(*a, b);
            }
        });
        Ok(())
    }

    fn ops_with_matrix<T>(&self, rhs: &Matrix, op: &'static str, f: T) -> Result<Matrix>
    where
        T: Fn(f32, f32) -> f32 + Sync + Send,
    {
        let mut ret = self.clone();
        ret.ops_with_matrix_(rhs, op, f)?;
        Ok(ret)
    }

    fn map_<T>(&mut self, f: T)
    where
        T: Fn(f32) -> f32 + Sync + Send,
    {
        for_each_row(self.backend, &mut self.data, self.col, |_, row| {
            row.iter_mut().for_each(|x| *x = f(*x))
        });
    }

    fn map<T>(&self, f: T) -> Matrix
    where
        T: Fn(f32) -> f32 + Sync + Send,
    {
        let mut ret = self.clone();
        ret.map_(f);
        ret
    }

    pub fn add(&self, rhs: &Matrix) -> Result<Matrix> {
        self.ops_with_matrix(rhs, "add", |a, b| a + b)
    }

    pub fn sub(&self, rhs: &Matrix) -> Result<Matrix> {
        self.ops_with_matrix(rhs, "sub", |a, b| a - b)
    }

    /// Elementwise product.
    pub fn hadamard(&self, rhs: &Matrix) -> Result<Matrix> {
        self.ops_with_matrix(rhs, "hadamard", |a, b| a * b)
    }

    /// `self += alpha * rhs`
    pub fn add_scaled_(&mut self, alpha: f32, rhs: &Matrix) -> Result<()> {
        self.ops_with_matrix_(rhs, "add_scaled", move |a, b| a + alpha * b)
    }

    pub fn mul_with_numeric(&self, rhs: f32) -> Matrix {
        self.map(move |x| x * rhs)
    }

    pub fn sigmoid(&self) -> Matrix {
        self.map(sigmoid)
    }

    pub fn sigmoid_(&mut self) {
        self.map_(sigmoid)
    }

    /// `x * (1 - x)` elementwise, the logistic derivative expressed in terms
    /// of the logistic output.
    pub fn dsigma(&self) -> Matrix {
        self.map(|x| x * (1.0 - x))
    }

    /// Matrix product `self × rhs`.
    pub fn mul(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.col != rhs.row {
            return Err(Error::DimensionMismatch {
                op: "mul",
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }
        let mut ret = Matrix::new(self.row, rhs.col).with_backend(self.backend);
        let (inner, width) = (self.col, rhs.col);
        let (lhs, snd) = (&self.data, &rhs.data);
        for_each_row(self.backend, &mut ret.data, width, |i, dst| {
            let fst = &lhs[i * inner..(i + 1) * inner];
            for (k, &a) in fst.iter().enumerate() {
                let src = &snd[k * width..(k + 1) * width];
                for (d, &b) in dst.iter_mut().zip(src) {
                    *d += a * b;
                }
            }
        });
        Ok(ret)
    }

    #[allow(non_snake_case)]
    pub fn T(&self) -> Matrix {
        let mut ret = Matrix::new(self.col, self.row).with_backend(self.backend);
        let (row, col) = (self.row, self.col);
        let src = &self.data;
        for_each_row(self.backend, &mut ret.data, row, |j, dst| {
            for (i, d) in dst.iter_mut().enumerate() {
                *d = src[i * col + j];
            }
        });
        ret
    }

    /// New matrix holding rows `idx`, in that order.
    pub fn select_rows(&self, idx: &[usize]) -> Result<Matrix> {
        if let Some(&bad) = idx.iter().find(|&&i| i >= self.row) {
            return Err(Error::IndexOutOfRange {
                index: bad,
                len: self.row,
            });
        }
        let mut ret = Matrix::new(idx.len(), self.col).with_backend(self.backend);
        let col = self.col;
        let src = &self.data;
        for_each_row(self.backend, &mut ret.data, col, |i, dst| {
            let from = idx[i] * col;
            dst.copy_from_slice(&src[from..from + col]);
        });
        Ok(ret)
    }

    /// Contiguous row block `range`.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Matrix> {
        if range.start > range.end || range.end > self.row {
            return Err(Error::IndexOutOfRange {
                index: range.end,
                len: self.row,
            });
        }
        let data = self.data[range.start * self.col..range.end * self.col].to_vec();
        Ok(Matrix {
            data,
            row: range.len(),
            col: self.col,
            backend: self.backend,
        })
    }

    /// Appends a constant-1 column.
    pub fn add_bias(&self) -> Matrix {
        let mut ret = Matrix::new(self.row, self.col + 1).with_backend(self.backend);
        let col = self.col;
        let src = &self.data;
        for_each_row(self.backend, &mut ret.data, col + 1, |i, dst| {
            dst[..col].copy_from_slice(&src[i * col..(i + 1) * col]);
            dst[col] = 1.0;
        });
        ret
    }

    /// Drops the last column.
    pub fn remove_bias(&self) -> Result<Matrix> {
        if self.col == 0 {
            return Err(Error::DimensionMismatch {
                op: "remove_bias",
                lhs: self.shape(),
                rhs: (self.row, 1),
            });
        }
        let col = self.col - 1;
        let mut ret = Matrix::new(self.row, col).with_backend(self.backend);
        let src = &self.data;
        let stride = self.col;
        for_each_row(self.backend, &mut ret.data, col, |i, dst| {
            dst.copy_from_slice(&src[i * stride..i * stride + col]);
        });
        Ok(ret)
    }

    /// Index of the largest entry in row `i`; the first one wins ties.
    pub fn argmax_row(&self, i: usize) -> usize {
        self.row(i)
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |a, (j, &v)| if v > a.1 { (j, v) } else { a })
            .0
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Matrix Sized [{}, {}]\n", self.row, self.col))?;
        for i in 0..self.row {
            for j in 0..self.col {
                f.write_fmt(format_args!("{:.4}", self.at(i, j)))?;
                if j + 1 == self.col {
                    f.write_str("\n")?;
                } else {
                    f.write_str(" ")?;
                }
            }
        }
        Ok(())
    }
}
