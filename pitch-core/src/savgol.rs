//! # Savitzky-Golay Smoothing
//!
//! Local least-squares polynomial smoothing. Every output sample is the value,
//! at that position, of a polynomial of degree `poly_order` fitted to the
//! surrounding `window_len` input samples.
//!
//! Interior samples use a fixed convolution kernel. The first and last
//! `window_len / 2` samples are evaluated from polynomials fitted to the first
//! and last full windows, so the output has the same length as the input and
//! no padding is invented at the edges.

use crate::error::{PitchError, Result};

/// Shortest window the smoother accepts.
pub const MIN_WINDOW_LEN: usize = 5;

/// Forces a requested window length to an odd value of at least [`MIN_WINDOW_LEN`].
pub fn effective_window_len(requested: usize) -> usize {
    (requested | 1).max(MIN_WINDOW_LEN)
}

/// Checks that an (already coerced) window fits the block and the polynomial.
pub fn check_window(window_len: usize, poly_order: usize, block_len: usize) -> Result<()> {
    if window_len > block_len || poly_order >= window_len || window_len % 2 == 0 {
        return Err(PitchError::InvalidWindow {
            window_len,
            block_len,
        });
    }
    Ok(())
}

/// Precomputed Savitzky-Golay weights for one window length and order.
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window_len: usize,
    /// Weights for the center of the window.
    kernel: Vec<f64>,
    /// `head[k]` evaluates output sample `k` from the first window.
    head: Vec<Vec<f64>>,
    /// `tail[k]` evaluates output sample `len - half + k` from the last window.
    tail: Vec<Vec<f64>>,
}

impl SavitzkyGolay {
    /// Builds the weights. `window_len` is coerced with [`effective_window_len`].
    pub fn new(window_len: usize, poly_order: usize) -> Result<Self> {
        let window_len = effective_window_len(window_len);
        if poly_order >= window_len {
            return Err(PitchError::InvalidWindow {
                window_len,
                block_len: window_len,
            });
        }
        let half = window_len / 2;
        let weights_at = |position: usize| {
            fit_weights(window_len, poly_order, position).ok_or(PitchError::InvalidWindow {
                window_len,
                block_len: window_len,
            })
        };

        let kernel = weights_at(half)?;
        let head = (0..half).map(weights_at).collect::<Result<Vec<_>>>()?;
        let tail = (half + 1..window_len)
            .map(weights_at)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            window_len,
            kernel,
            head,
            tail,
        })
    }

    /// Smooths `block`, which must hold at least one full window.
    pub fn apply(&self, block: &[f64]) -> Result<Vec<f64>> {
        let len = block.len();
        if len < self.window_len {
            return Err(PitchError::InvalidWindow {
                window_len: self.window_len,
                block_len: len,
            });
        }
        let half = self.window_len / 2;
        let mut output = vec![0.0; len];

        let first = &block[..self.window_len];
        for (k, weights) in self.head.iter().enumerate() {
            output[k] = dot(weights, first);
        }

        for (center, window) in block.windows(self.window_len).enumerate() {
            output[center + half] = dot(&self.kernel, window);
        }

        let last = &block[len - self.window_len..];
        for (k, weights) in self.tail.iter().enumerate() {
            output[len - half + k] = dot(weights, last);
        }

        Ok(output)
    }
}

fn dot(weights: &[f64], samples: &[f64]) -> f64 {
    weights.iter().zip(samples).map(|(w, s)| w * s).sum()
}

/// Weights `w` such that `Σ w[i] * y[i]` is the least-squares polynomial fit of
/// the window evaluated at index `position`.
///
/// With design matrix `A[i][j] = x_i^j` this is `a(x_p)ᵀ (AᵀA)⁻¹ Aᵀ`, computed by
/// solving `(AᵀA) v = a(x_p)` and taking `w_i = A_i · v`. Positions are scaled
/// to `[-1, 1]` to keep the normal matrix well conditioned.
fn fit_weights(window_len: usize, poly_order: usize, position: usize) -> Option<Vec<f64>> {
    let half = (window_len / 2).max(1) as f64;
    let center = (window_len / 2) as f64;
    let terms = poly_order + 1;
    let powers = |x: f64| -> Vec<f64> {
        let mut row = Vec::with_capacity(terms);
        let mut value = 1.0;
        for _ in 0..terms {
            row.push(value);
            value *= x;
        }
        row
    };

    let rows: Vec<Vec<f64>> = (0..window_len)
        .map(|i| powers((i as f64 - center) / half))
        .collect();

    let mut normal = vec![vec![0.0; terms]; terms];
    for row in &rows {
        for (j, &rj) in row.iter().enumerate() {
            for (k, &rk) in row.iter().enumerate() {
                normal[j][k] += rj * rk;
            }
        }
    }

    let target = powers((position as f64 - center) / half);
    let v = solve(normal, target)?;
    Some(rows.iter().map(|row| dot(row, &v)).collect())
}

/// Gaussian elimination with partial pivoting. `None` if the system is singular.
fn solve(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))?;
        if matrix[pivot][col].abs() < 1e-12 {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in col + 1..n {
            let factor = matrix[row][col] / matrix[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                matrix[row][k] -= factor * matrix[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| matrix[row][k] * solution[k]).sum();
        solution[row] = (rhs[row] - tail) / matrix[row][row];
    }
    Some(solution)
}
