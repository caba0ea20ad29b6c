//! Error types of the optimiser

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::params::ParamLoadError;
use crate::smoother::SmoothError;
use crate::spline::SplineError;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors that can occur while planning.
#[derive(Debug, thiserror::Error)]
pub enum PathOptError {
    /// The caller passed zero waypoints.
    #[error("No input waypoints were provided")]
    EmptyInput,

    /// The reference smoother could not produce a smoothed curve.
    #[error("Reference smoothing failed: {0}")]
    SmoothingFailed(#[from] SmoothError),

    /// The initial heading error exceeds the bound under which the bicycle-model linearisation
    /// is trustworthy.
    #[error("Initial heading error of {0:.3} rad is too large for the linearisation")]
    InitialHeadingTooLarge(f64),

    /// Too few samples remain after corridor truncation to form a viable QP.
    #[error("No viable corridor: only {0} sample(s) remain after truncation")]
    InfeasibleCorridor(usize),

    /// The QP solver reported infeasibility or hit the iteration cap without converging.
    #[error("QP solver failed: {0}")]
    SolverFailed(String),

    /// The collision checker rejected the first output state.
    #[error("First output state is in collision")]
    CollisionAtOutput,

    /// Lateral sampling produced no feasible path at any terminal offset.
    #[error("No feasible path was produced")]
    NoFeasiblePath,

    /// Fitting a spline through the optimised output points failed.
    #[error("Spline fit failed: {0}")]
    SplineFit(#[from] SplineError),

    /// A parameter file could not be loaded.
    #[error("Could not load parameters: {0}")]
    ParamLoad(#[from] ParamLoadError),
}

pub type Result<T> = std::result::Result<T, PathOptError>;
