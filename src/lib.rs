//! # Path optimiser
//!
//! This crate implements a constrained path optimiser for an Ackermann-steered vehicle. Given a
//! coarse sequence of waypoints, a start pose, an end pose, and a map exposing
//! distance-to-obstacle queries, it produces a smooth, collision-free, kinematically plausible
//! path which tracks the waypoints while keeping lateral clearance around the vehicle footprint.
//!
//! Planning runs in three stages:
//! 1. Reference smoothing - fit arclength-parameterised cubic splines through the waypoints (see
//!    [`smoother`]).
//! 2. Discretisation - sample the smoothed curve, build a Frenet frame at each sample, and
//!    extract a lateral free corridor for each of the four covering disks of the vehicle (see
//!    [`discretize`] and [`clearance`]).
//! 3. Lateral optimisation - solve a sparse convex QP over heading deviation, lateral offset and
//!    steering angle at each sample (see [`qp`]), then map the solution back to Cartesian space
//!    (see [`reconstruct`]).
//!
//! The entry point is [`PathOptimizer`], which owns the pipeline and exposes [`solve`], a
//! lateral-sampling mode [`sample_paths`], and a warm-started re-planning mode
//! [`optimize_dynamic`].
//!
//! [`solve`]: PathOptimizer::solve
//! [`sample_paths`]: PathOptimizer::sample_paths
//! [`optimize_dynamic`]: PathOptimizer::optimize_dynamic

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Lateral corridor extraction from the distance field
pub mod clearance;

/// Reference path discretisation into Frenet samples
pub mod discretize;

/// Error types of the optimiser
pub mod error;

/// Vehicle footprint model - four covering disks
pub mod footprint;

/// Consumed map interfaces - distance field and collision checker
pub mod map;

/// Utility maths functions - angle wrapping and frame transforms
pub mod maths;

/// Optimiser parameters
pub mod params;

/// QP problem assembly and solver driver
pub mod qp;

/// Mapping of QP solutions back to Cartesian paths
pub mod reconstruct;

/// Reference path smoothing
pub mod smoother;

/// Natural cubic splines with derivative queries
pub mod spline;

/// Path and state types
pub mod state;

/// The orchestrating optimiser
pub mod optimizer;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use clearance::DiskCorridor;
pub use discretize::{FrenetDeviation, Sample, SampleList};
pub use error::{PathOptError, Result};
pub use footprint::VehicleFootprint;
pub use map::{CollisionChecker, DiskCollisionChecker, DistanceMap};
pub use optimizer::PathOptimizer;
pub use params::Params;
pub use qp::{OsqpDriver, QpSolver};
pub use smoother::{CubicSplineSmoother, ReferenceSmoother, SmoothedRef};
pub use spline::Spline;
pub use state::{Path, State};
