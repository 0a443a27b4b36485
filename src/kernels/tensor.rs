//! Dense row-major 2-D buffer used for activations and weights.

use crate::errors::GptError;

/// `rows × cols` matrix of f32 stored row-major.
///
/// For activations a row is one sequence position. For projection weights a
/// row is one output feature (the `O × D` convention used by [`matmul`]).
///
/// [`matmul`]: crate::kernels::matmul
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor2D {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Tensor2D {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap a flat buffer. Fails when `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, GptError> {
        if data.len() != rows * cols {
            return Err(GptError::shape(
                "tensor data",
                format!("{} elements ({}x{})", rows * cols, rows, cols),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, GptError> {
        let n = rows.len();
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(n * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(GptError::shape(
                    format!("row {}", i),
                    format!("{} columns", cols),
                    format!("{} columns", row.len()),
                ));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n,
            cols,
            data,
        })
    }

    /// Identity matrix, handy for hand-checkable models.
    pub fn identity(n: usize) -> Self {
        let mut t = Self::zeros(n, n);
        for i in 0..n {
            t.data[i * n + i] = 1.0;
        }
        t
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact(0) panics
        self.data.chunks(self.cols.max(1)).take(self.rows)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Returns the `cols × rows` transpose.
    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    /// Columns `[start, start + len)` of every row as a new tensor.
    pub fn columns(&self, start: usize, len: usize) -> Self {
        debug_assert!(start + len <= self.cols);
        let mut data = Vec::with_capacity(self.rows * len);
        for row in self.iter_rows() {
            data.extend_from_slice(&row[start..start + len]);
        }
        Self {
            rows: self.rows,
            cols: len,
            data,
        }
    }

    /// Element-wise sum; used for residual connections.
    pub fn add(&self, other: &Tensor2D) -> Self {
        debug_assert_eq!(self.shape(), other.shape());
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + b)
            .collect();
        Self {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Apply `f` to every element, consuming the tensor.
    pub fn map(mut self, f: impl Fn(f32) -> f32) -> Self {
        for x in self.data.iter_mut() {
            *x = f(*x);
        }
        self
    }
}
