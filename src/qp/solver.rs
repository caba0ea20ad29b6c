//! # QP solver driver
//!
//! The optimiser consumes the sparse QP backend through the [`QpSolver`] trait: initialise once
//! with a full problem, then re-solve with only the bounds updated when sampling alternative
//! terminal conditions. [`OsqpDriver`] implements the trait over the OSQP solver with warm
//! starting enabled, which makes the repeated bound-update solves the cheap path.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use osqp::{CscMatrix, Problem, Settings, Status};
use std::borrow::Cow;

use crate::error::PathOptError;
use crate::qp::problem::{CscData, QpProblem};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Abstract interface over the sparse QP backend.
pub trait QpSolver {
    /// Set up the backend with the full problem. May be called again to replace the problem.
    fn init(&mut self, problem: &QpProblem, max_iterations: u32) -> Result<(), PathOptError>;

    /// Replace the constraint bounds, keeping matrices and cached factorisations.
    fn update_bounds(&mut self, lower: &[f64], upper: &[f64]) -> Result<(), PathOptError>;

    /// Solve and return the primal solution. A failed solve leaves the backend state untouched
    /// so the caller may retry with different bounds.
    fn solve(&mut self) -> Result<Vec<f64>, PathOptError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// [`QpSolver`] implementation over OSQP.
#[derive(Default)]
pub struct OsqpDriver {
    problem: Option<Problem>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

fn as_csc(csc: &CscData) -> CscMatrix<'_> {
    CscMatrix {
        nrows: csc.nrows,
        ncols: csc.ncols,
        indptr: Cow::Borrowed(&csc.indptr),
        indices: Cow::Borrowed(&csc.indices),
        data: Cow::Borrowed(&csc.data),
    }
}

impl QpSolver for OsqpDriver {
    fn init(&mut self, problem: &QpProblem, max_iterations: u32) -> Result<(), PathOptError> {
        let settings = Settings::default()
            .verbose(false)
            .warm_start(true)
            .max_iter(max_iterations);

        let hessian = as_csc(&problem.hessian).into_upper_tri();
        let constraints = as_csc(&problem.constraints);

        let problem = Problem::new(
            hessian,
            &problem.gradient,
            constraints,
            &problem.lower,
            &problem.upper,
            &settings,
        )
        .map_err(|e| PathOptError::SolverFailed(format!("setup failed: {:?}", e)))?;

        self.problem = Some(problem);
        Ok(())
    }

    fn update_bounds(&mut self, lower: &[f64], upper: &[f64]) -> Result<(), PathOptError> {
        match self.problem.as_mut() {
            Some(problem) => {
                problem.update_bounds(lower, upper);
                Ok(())
            }
            None => Err(PathOptError::SolverFailed(
                "bound update before initialisation".into(),
            )),
        }
    }

    fn solve(&mut self) -> Result<Vec<f64>, PathOptError> {
        let problem = self
            .problem
            .as_mut()
            .ok_or_else(|| PathOptError::SolverFailed("solve before initialisation".into()))?;

        match problem.solve() {
            Status::Solved(solution) => Ok(solution.x().to_vec()),
            other => {
                let reason = match other.x() {
                    Some(_) => "did not converge within the iteration cap",
                    None => "problem is infeasible",
                };
                Err(PathOptError::SolverFailed(reason.into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    /// min 0.5 x' [[4, 1], [1, 2]] x + [1, 1]' x
    /// s.t. 1 <= x0 + x1 <= 1, 0 <= x0 <= 0.7, 0 <= x1 <= 0.7
    fn tiny_problem() -> QpProblem {
        QpProblem {
            n: 1,
            hessian: CscData {
                nrows: 2,
                ncols: 2,
                indptr: vec![0, 1, 3],
                indices: vec![0, 0, 1],
                data: vec![4.0, 1.0, 2.0],
            },
            gradient: vec![1.0, 1.0],
            constraints: CscData {
                nrows: 3,
                ncols: 2,
                indptr: vec![0, 2, 4],
                indices: vec![0, 1, 0, 2],
                data: vec![1.0, 1.0, 1.0, 1.0],
            },
            lower: vec![1.0, 0.0, 0.0],
            upper: vec![1.0, 0.7, 0.7],
        }
    }

    #[test]
    fn test_solves_a_known_problem() {
        let mut driver = OsqpDriver::default();
        driver.init(&tiny_problem(), 250).unwrap();

        let x = driver.solve().unwrap();
        assert_relative_eq!(x[0], 0.3, epsilon = 1e-3);
        assert_relative_eq!(x[1], 0.7, epsilon = 1e-3);
    }

    #[test]
    fn test_bound_update_re_solves() {
        let mut driver = OsqpDriver::default();
        let problem = tiny_problem();
        driver.init(&problem, 250).unwrap();
        driver.solve().unwrap();

        // Relax the box on x1 and tighten x0: the optimum moves.
        driver
            .update_bounds(&[1.0, 0.0, 0.0], &[1.0, 0.2, 1.0])
            .unwrap();
        let x = driver.solve().unwrap();
        assert_relative_eq!(x[0], 0.2, epsilon = 1e-3);
        assert_relative_eq!(x[1], 0.8, epsilon = 1e-3);
    }

    #[test]
    fn test_solve_before_init_errors() {
        let mut driver = OsqpDriver::default();
        assert!(driver.solve().is_err());
        assert!(driver.update_bounds(&[0.0], &[1.0]).is_err());
    }
}
