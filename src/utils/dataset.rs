//! In-memory dataset: feature matrix `x` plus target matrix `y`.
//!
//! Files hold one example per line, the class id first, then features either
//! dense (`2 0.1 0.5 0.3`) or sparse with 1-based indices (`2 1:0.1 3:0.3`).

use crate::utils::error::{Error, Result};
use crate::utils::mat::{Backend, Matrix};
use crate::utils::nn_trait::DataSet;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::ops::Range;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    #[default]
    None,
    /// Rescale every feature to `[0, 1]`.
    Rescale,
    /// `z = (x - mean) / std` per feature.
    StandardScore,
}

impl TryFrom<u8> for Normalization {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Normalization::None),
            1 => Ok(Normalization::Rescale),
            2 => Ok(Normalization::StandardScore),
            _ => Err(Error::InvalidConfig(format!("unknown normalization {}", v))),
        }
    }
}

/// Largest number of classes a label file may declare.
pub const MAX_CLASSES: usize = 1 << 16;

/// Features and class ids as read from a file, before targets are built.
#[derive(Debug, Clone)]
pub struct RawData {
    pub x: Matrix,
    pub labels: Vec<usize>,
}

impl RawData {
    pub fn load<P: AsRef<Path>>(path: P, input_dim: usize) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, input_dim)
    }

    /// `input_dim == 0` detects the width from the data.
    pub fn parse(text: &str, input_dim: usize) -> Result<Self> {
        let mut labels = Vec::new();
        let mut rows: Vec<Vec<(usize, f32)>> = Vec::new();
        let mut width = 0;

        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let label = tokens
                .next()
                .and_then(|t| t.parse::<usize>().ok())
                .ok_or_else(|| Error::Parse {
                    line: n + 1,
                    msg: "missing or non-integer label".to_owned(),
                })?;
            if label >= MAX_CLASSES {
                return Err(Error::Parse {
                    line: n + 1,
                    msg: format!("label {} exceeds the class limit {}", label, MAX_CLASSES),
                });
            }

            let mut row = Vec::new();
            for (k, tok) in tokens.enumerate() {
                let (idx, val) = match tok.split_once(':') {
                    Some((i, v)) => {
                        let i = i.parse::<usize>().ok().filter(|&i| i > 0).ok_or_else(|| {
                            Error::Parse {
                                line: n + 1,
                                msg: format!("bad feature index in {:?}", tok),
                            }
                        })?;
                        (i - 1, v)
                    }
                    None => (k, tok),
                };
                let val = val.parse::<f32>().map_err(|e| Error::Parse {
                    line: n + 1,
                    msg: format!("bad feature value {:?}: {}", tok, e),
                })?;
                width = width.max(idx + 1);
                row.push((idx, val));
            }
            labels.push(label);
            rows.push(row);
        }

        let dim = if input_dim == 0 { width } else { input_dim };
        if width > dim {
            return Err(Error::InvalidData(format!(
                "found feature index {} but input dimension is {}",
                width, dim
            )));
        }
        let mut x = Matrix::new(rows.len(), dim);
        for (i, row) in rows.iter().enumerate() {
            for &(j, v) in row {
                x.set(i, j, v);
            }
        }
        Ok(Self { x, labels })
    }

    /// Shifts class ids so the smallest allowed one is 0.
    pub fn check_label_base(&mut self, base: usize) -> Result<()> {
        if let Some(&bad) = self.labels.iter().find(|&&l| l < base) {
            return Err(Error::InvalidData(format!(
                "label {} is below the label base {}",
                bad, base
            )));
        }
        self.labels.iter_mut().for_each(|l| *l -= base);
        Ok(())
    }

    pub fn n_class(&self) -> Result<usize> {
        match self.labels.iter().max() {
            None => Ok(0),
            Some(&m) => m
                .checked_add(1)
                .filter(|&c| c <= MAX_CLASSES)
                .ok_or_else(|| {
                    Error::InvalidData(format!(
                        "label {} exceeds the class limit {}",
                        m, MAX_CLASSES
                    ))
                }),
        }
    }

    pub fn into_dataset(self) -> Result<MemoryDataSet> {
        let n_class = self.n_class()?.max(2);
        MemoryDataSet::from_class_ids(self.x, &self.labels, n_class)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDataSet {
    x: Matrix,
    y: Matrix,
}

impl MemoryDataSet {
    pub fn new(x: Matrix, y: Matrix) -> Result<Self> {
        if x.rows() != y.rows() {
            return Err(Error::DimensionMismatch {
                op: "dataset",
                lhs: x.shape(),
                rhs: y.shape(),
            });
        }
        Ok(Self { x, y })
    }

    /// Two classes give one 0/1 target column, more give one-hot rows.
    pub fn from_class_ids(x: Matrix, ids: &[usize], n_class: usize) -> Result<Self> {
        if n_class > MAX_CLASSES {
            return Err(Error::InvalidData(format!(
                "{} classes exceeds the class limit {}",
                n_class, MAX_CLASSES
            )));
        }
        if let Some(&bad) = ids.iter().find(|&&c| c >= n_class) {
            return Err(Error::InvalidData(format!(
                "class id {} out of range for {} classes",
                bad, n_class
            )));
        }
        let mut y = if n_class <= 2 {
            Matrix::new(ids.len(), 1)
        } else {
            Matrix::new(ids.len(), n_class)
        };
        for (i, &c) in ids.iter().enumerate() {
            if n_class <= 2 {
                y.set(i, 0, c as f32);
            } else {
                y.set(i, c, 1.0);
            }
        }
        Self::new(x, y)
    }

    pub fn x(&self) -> &Matrix {
        &self.x
    }

    pub fn y(&self) -> &Matrix {
        &self.y
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.x.set_backend(backend);
        self.y.set_backend(backend);
        self
    }

    pub fn normalize(&mut self, kind: Normalization) {
        let (n, d) = self.x.shape();
        if n == 0 {
            return;
        }
        for j in 0..d {
            let column = (0..n).map(|i| self.x.at(i, j));
            let (shift, scale) = match kind {
                Normalization::None => return,
                Normalization::Rescale => {
                    let (lo, hi) = column
                        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                            (lo.min(v), hi.max(v))
                        });
                    (lo, hi - lo)
                }
                Normalization::StandardScore => {
                    let mean = column.sum::<f32>() / n as f32;
                    let var = (0..n)
                        .map(|i| (self.x.at(i, j) - mean).powi(2))
                        .sum::<f32>()
                        / n as f32;
                    (mean, var.sqrt())
                }
            };
            // Constant features only get shifted.
            let scale = if scale > 0.0 { scale } else { 1.0 };
            for i in 0..n {
                let v = self.x.at(i, j);
                self.x.set(i, j, (v - shift) / scale);
            }
        }
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        self.x = self.x.select_rows(&order)?;
        self.y = self.y.select_rows(&order)?;
        Ok(())
    }

    /// Splits off the last `N / (ratio + 1)` rows for validation.
    pub fn split(&self, ratio: usize) -> Result<(MemoryDataSet, MemoryDataSet)> {
        let n = self.len();
        let n_valid = n / (ratio + 1);
        let n_train = n - n_valid;
        if n_valid == 0 || n_train == 0 {
            return Err(Error::InvalidData(format!(
                "cannot split {} rows with ratio {} into two non-empty sets",
                n, ratio
            )));
        }
        let train = MemoryDataSet::new(
            self.x.slice_rows(0..n_train)?,
            self.y.slice_rows(0..n_train)?,
        )?;
        let valid = MemoryDataSet::new(
            self.x.slice_rows(n_train..n)?,
            self.y.slice_rows(n_train..n)?,
        )?;
        Ok((train, valid))
    }
}

impl DataSet for MemoryDataSet {
    fn dim(&self) -> usize {
        self.x.cols()
    }

    fn label_dim(&self) -> usize {
        self.y.cols()
    }

    fn len(&self) -> usize {
        self.x.rows()
    }

    fn get_x(&self, range: Range<usize>) -> Result<Matrix> {
        self.x.slice_rows(range)
    }

    fn get_y(&self, range: Range<usize>) -> Result<Matrix> {
        self.y.slice_rows(range)
    }
}
