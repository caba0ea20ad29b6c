//! # Natural cubic splines
//!
//! Univariate cubic spline interpolation with value, first and second derivative queries, used
//! both for the arclength-parameterised reference curve and for re-fitting optimised output
//! points. Natural boundary conditions (zero second derivative at both ends).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A natural cubic spline over strictly increasing breakpoints.
///
/// On segment `i` the spline evaluates as
/// `a[i] + b[i]*dx + c[i]*dx^2 + d[i]*dx^3` with `dx = t - x[i]`.
#[derive(Debug, Clone)]
pub struct Spline {
    x: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SplineError {
    #[error("A spline needs at least two breakpoints, got {0}")]
    TooFewPoints(usize),

    #[error("Spline breakpoints must be strictly increasing")]
    NonIncreasingBreakpoints,

    #[error("Breakpoint and value slices differ in length ({0} vs {1})")]
    LengthMismatch(usize, usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Spline {
    /// Fit a natural cubic spline through the points `(x[i], y[i])`.
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self, SplineError> {
        let n = x.len();

        if n != y.len() {
            return Err(SplineError::LengthMismatch(n, y.len()));
        }
        if n < 2 {
            return Err(SplineError::TooFewPoints(n));
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SplineError::NonIncreasingBreakpoints);
        }

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let a = y.to_vec();

        // Tridiagonal system for the second-derivative coefficients, with natural boundary rows.
        let mut mat = DMatrix::<f64>::zeros(n, n);
        let mut rhs = DVector::<f64>::zeros(n);
        mat[(0, 0)] = 1.0;
        mat[(n - 1, n - 1)] = 1.0;
        for i in 1..n - 1 {
            mat[(i, i - 1)] = h[i - 1];
            mat[(i, i)] = 2.0 * (h[i - 1] + h[i]);
            mat[(i, i + 1)] = h[i];
            rhs[i] = 3.0 * ((a[i + 1] - a[i]) / h[i] - (a[i] - a[i - 1]) / h[i - 1]);
        }

        let c_vec = mat
            .lu()
            .solve(&rhs)
            .expect("strictly diagonally dominant spline system was singular");
        let c: Vec<f64> = c_vec.iter().copied().collect();

        let mut b = Vec::with_capacity(n - 1);
        let mut d = Vec::with_capacity(n - 1);
        for i in 0..n - 1 {
            b.push((a[i + 1] - a[i]) / h[i] - h[i] * (2.0 * c[i] + c[i + 1]) / 3.0);
            d.push((c[i + 1] - c[i]) / (3.0 * h[i]));
        }

        Ok(Self {
            x: x.to_vec(),
            a,
            b,
            c,
            d,
        })
    }

    /// Value of the spline at `t`. Queries outside the breakpoint range extrapolate with the
    /// edge segment's polynomial.
    pub fn value(&self, t: f64) -> f64 {
        let i = self.segment(t);
        let dx = t - self.x[i];
        self.a[i] + self.b[i] * dx + self.c[i] * dx.powi(2) + self.d[i] * dx.powi(3)
    }

    /// First derivative of the spline at `t`.
    pub fn first_deriv(&self, t: f64) -> f64 {
        let i = self.segment(t);
        let dx = t - self.x[i];
        self.b[i] + 2.0 * self.c[i] * dx + 3.0 * self.d[i] * dx.powi(2)
    }

    /// Second derivative of the spline at `t`.
    pub fn second_deriv(&self, t: f64) -> f64 {
        let i = self.segment(t);
        let dx = t - self.x[i];
        2.0 * self.c[i] + 6.0 * self.d[i] * dx
    }

    /// Index of the segment containing `t`, clamped to the valid range.
    fn segment(&self, t: f64) -> usize {
        let i = self.x.partition_point(|&xi| xi <= t);
        i.saturating_sub(1).min(self.x.len() - 2)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
