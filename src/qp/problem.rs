//! # QP problem assembly
//!
//! For `N` reference samples the decision vector `z` has `3N - 1` entries: the interleaved
//! state pairs `[psi_0, q_0, psi_1, q_1, ..]` (heading deviation and lateral offset at each
//! sample) followed by the `N - 1` steering angles `[delta_0, .., delta_{N-2}]`.
//!
//! The `9N - 1` constraint rows are laid out in fixed blocks so that later bound updates can
//! address rows directly without rebuilding the matrix:
//!
//! | rows            | content                                                    |
//! |-----------------|------------------------------------------------------------|
//! | `[0, 2N)`       | initial-state pins and linearised bicycle transitions      |
//! | `[2N, 4N)`      | identity rows on each state variable; hosts the terminal   |
//! |                 | offset band (row `4N - 1`) and the optional terminal       |
//! |                 | heading pin (row `4N - 2`)                                 |
//! | `[4N, 5N - 1)`  | steering bounds                                            |
//! | `[5N-1, 9N-1)`  | corridor rows, four per sample at offset `5N - 1 + 4i`     |
//!
//! The transition for step `i -> i+1` over arclength `h` linearises the bicycle model about the
//! reference: `q` advances by `h * psi`, and `psi` advances by `h * (delta / wheelbase - kappa)`
//! with `tan(delta)` linearised to keep the program convex. The corridor rows bound the lateral
//! position of each covering disk, `q_i + d_k * psi_i`, by the probed interval.
//!
//! The objective `0.5 * z' H z` has no linear term; `H` penalises lateral offset, steering
//! angle and steering rate, which makes it upper-triangular banded in the steering block.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::clearance::DiskCorridor;
use crate::discretize::{FrenetDeviation, Sample};
use crate::footprint::VehicleFootprint;
use crate::maths::wrap_angle;
use crate::params::Params;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A sparse matrix in compressed sparse column form.
#[derive(Debug, Clone)]
pub struct CscData {
    pub nrows: usize,
    pub ncols: usize,
    pub indptr: Vec<usize>,
    pub indices: Vec<usize>,
    pub data: Vec<f64>,
}

/// An assembled QP: Hessian (upper triangular), zero gradient, constraint matrix and bounds.
#[derive(Debug, Clone)]
pub struct QpProblem {
    /// Number of reference samples behind this problem.
    pub n: usize,

    pub hessian: CscData,
    pub gradient: Vec<f64>,
    pub constraints: CscData,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// The terminal condition of a build.
#[derive(Debug, Clone, Copy)]
pub struct TerminalCondition {
    /// Target lateral offset at the last sample, in meters.
    pub offset_m: f64,

    /// When set, the terminal heading deviation is pinned to
    /// `wrap(end_heading - reference heading at the last sample)`.
    pub end_heading_rad: Option<f64>,
}

/// Assembles [`QpProblem`]s for a sample list.
pub struct QpBuilder<'a> {
    samples: &'a [Sample],
    footprint: &'a VehicleFootprint,
    params: &'a Params,
}

/// Column-major accumulator for CSC assembly.
struct CscBuilder {
    nrows: usize,
    columns: Vec<Vec<(usize, f64)>>,
}

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Bound magnitude treated as infinite by the solver.
pub const QP_INFINITY: f64 = 1e30;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Number of decision variables for `n` samples.
pub fn num_vars(n: usize) -> usize {
    3 * n - 1
}

/// Number of constraint rows for `n` samples.
pub fn num_rows(n: usize) -> usize {
    9 * n - 1
}

/// Column of the heading deviation at sample `i`.
pub fn col_psi(i: usize) -> usize {
    2 * i
}

/// Column of the lateral offset at sample `i`.
pub fn col_q(i: usize) -> usize {
    2 * i + 1
}

/// Column of the steering angle over step `i`.
pub fn col_steer(n: usize, i: usize) -> usize {
    2 * n + i
}

/// Identity-bound row of the heading deviation at sample `i`.
pub fn row_state_psi(n: usize, i: usize) -> usize {
    2 * n + 2 * i
}

/// Identity-bound row of the lateral offset at sample `i`.
pub fn row_state_q(n: usize, i: usize) -> usize {
    2 * n + 2 * i + 1
}

/// Row carrying the terminal lateral offset band.
pub fn row_terminal_offset(n: usize) -> usize {
    4 * n - 1
}

/// Bound row of the steering angle over step `i`.
pub fn row_steer(n: usize, i: usize) -> usize {
    4 * n + i
}

/// First of the four corridor rows of sample `i`.
pub fn row_corridor(n: usize, i: usize) -> usize {
    5 * n - 1 + 4 * i
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CscBuilder {
    fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            columns: vec![Vec::new(); ncols],
        }
    }

    fn push(&mut self, row: usize, col: usize, value: f64) {
        self.columns[col].push((row, value));
    }

    fn finish(mut self) -> CscData {
        let ncols = self.columns.len();
        let mut indptr = Vec::with_capacity(ncols + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();

        indptr.push(0);
        for column in &mut self.columns {
            column.sort_by_key(|&(row, _)| row);
            for &(row, value) in column.iter() {
                indices.push(row);
                data.push(value);
            }
            indptr.push(indices.len());
        }

        CscData {
            nrows: self.nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }
}

impl<'a> QpBuilder<'a> {
    pub fn new(samples: &'a [Sample], footprint: &'a VehicleFootprint, params: &'a Params) -> Self {
        Self {
            samples,
            footprint,
            params,
        }
    }

    /// Assemble the full problem for the given initial deviation and terminal condition.
    pub fn build(&self, deviation: &FrenetDeviation, terminal: &TerminalCondition) -> QpProblem {
        let n = self.samples.len();

        QpProblem {
            n,
            hessian: self.hessian(n),
            gradient: vec![0.0; num_vars(n)],
            constraints: self.constraint_matrix(n),
            lower: self.bounds(n, deviation, terminal, false),
            upper: self.bounds(n, deviation, terminal, true),
        }
    }

    /// Upper-triangular Hessian: lateral offset weight on the `q` diagonal, steering weight plus
    /// the steering-rate coupling on the steering block.
    fn hessian(&self, n: usize) -> CscData {
        let w_q = self.params.offset_weight;
        let w_steer = self.params.steer_weight;
        let w_rate = self.params.steer_rate_weight;
        let m = n - 1;

        let mut builder = CscBuilder::new(num_vars(n), num_vars(n));

        for i in 0..n {
            builder.push(col_q(i), col_q(i), w_q);
        }

        for j in 0..m {
            // Sum of w_rate * (delta_{j+1} - delta_j)^2 contributes twice to interior diagonals
            // and once to the first and last.
            let rate_terms = if m == 1 {
                0.0
            } else if j == 0 || j == m - 1 {
                1.0
            } else {
                2.0
            };
            builder.push(
                col_steer(n, j),
                col_steer(n, j),
                w_steer + rate_terms * w_rate,
            );
            if j > 0 {
                builder.push(col_steer(n, j - 1), col_steer(n, j), -w_rate);
            }
        }

        builder.finish()
    }

    /// The `9N - 1` row constraint matrix; see the module docs for the block layout.
    fn constraint_matrix(&self, n: usize) -> CscData {
        let mut builder = CscBuilder::new(num_rows(n), num_vars(n));
        let wheelbase_m = self.footprint.wheelbase_m();

        // Initial-state pins
        builder.push(0, col_psi(0), 1.0);
        builder.push(1, col_q(0), 1.0);

        // Bicycle transitions for each step i -> i+1
        for i in 0..n - 1 {
            let h = self.samples[i + 1].s_m - self.samples[i].s_m;
            let psi_row = 2 * i + 2;
            let q_row = 2 * i + 3;

            builder.push(psi_row, col_psi(i + 1), 1.0);
            builder.push(psi_row, col_psi(i), -1.0);
            builder.push(psi_row, col_steer(n, i), -h / wheelbase_m);

            builder.push(q_row, col_q(i + 1), 1.0);
            builder.push(q_row, col_q(i), -1.0);
            builder.push(q_row, col_psi(i), -h);
        }

        // Identity rows on every state variable
        for i in 0..n {
            builder.push(row_state_psi(n, i), col_psi(i), 1.0);
            builder.push(row_state_q(n, i), col_q(i), 1.0);
        }

        // Steering bounds
        for i in 0..n - 1 {
            builder.push(row_steer(n, i), col_steer(n, i), 1.0);
        }

        // Corridor rows: lateral position of disk k is q_i + d_k * psi_i
        for i in 0..n {
            for (k, (offset_m, _)) in self.footprint.disks().iter().enumerate() {
                let row = row_corridor(n, i) + k;
                builder.push(row, col_psi(i), *offset_m);
                builder.push(row, col_q(i), 1.0);
            }
        }

        builder.finish()
    }

    /// Lower or upper bound vector.
    fn bounds(
        &self,
        n: usize,
        deviation: &FrenetDeviation,
        terminal: &TerminalCondition,
        upper: bool,
    ) -> Vec<f64> {
        let sign = if upper { 1.0 } else { -1.0 };
        let mut bounds = vec![sign * QP_INFINITY; num_rows(n)];

        // Initial-state pins are equalities
        bounds[0] = deviation.epsi_rad;
        bounds[1] = deviation.cte_m;

        // Transition rows: equalities with the curvature feed-forward on the psi rows
        for i in 0..n - 1 {
            let h = self.samples[i + 1].s_m - self.samples[i].s_m;
            bounds[2 * i + 2] = -h * self.samples[i].curv_m;
            bounds[2 * i + 3] = 0.0;
        }

        // Terminal pins in the identity block
        if let Some(end_heading_rad) = terminal.end_heading_rad {
            let end_psi = wrap_angle(end_heading_rad - self.samples[n - 1].heading_rad);
            bounds[row_state_psi(n, n - 1)] = end_psi;
        }
        bounds[row_terminal_offset(n)] =
            terminal.offset_m + sign * self.params.terminal_offset_tol_m;

        // Steering bounds
        for i in 0..n - 1 {
            bounds[row_steer(n, i)] = sign * self.params.max_steer_rad;
        }

        // Corridor bounds
        for (i, sample) in self.samples.iter().enumerate() {
            for (k, corridor) in sample.corridor.iter().enumerate() {
                bounds[row_corridor(n, i) + k] = if upper {
                    corridor.left_m
                } else {
                    corridor.right_m
                };
            }
        }

        bounds
    }
}

impl QpProblem {
    /// Re-target the terminal lateral offset band. Used by the lateral sampling mode between
    /// solver bound updates.
    pub fn set_terminal_offset(&mut self, offset_m: f64, tol_m: f64) {
        let row = row_terminal_offset(self.n);
        self.lower[row] = offset_m - tol_m;
        self.upper[row] = offset_m + tol_m;
    }

    /// Replace the corridor bounds of sample `i`. Used by the dynamic re-planning mode.
    pub fn set_corridor_bounds(&mut self, i: usize, corridor: &[DiskCorridor; 4]) {
        let base = row_corridor(self.n, i);
        for (k, disk) in corridor.iter().enumerate() {
            self.lower[base + k] = disk.right_m;
            self.upper[base + k] = disk.left_m;
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
