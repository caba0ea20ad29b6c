//! # Path optimiser orchestration
//!
//! [`PathOptimizer`] wires the pipeline together: smoothing, discretisation, QP assembly,
//! solving and reconstruction. It owns the sample list, QP buffers and solver handles
//! exclusively; the map and collision checker are shared read-only references that must outlive
//! the optimiser and not be mutated during a call. All calls are blocking and single-threaded;
//! two concurrent calls on the same instance are not supported, but independent instances may
//! run in parallel.
//!
//! Three entry points:
//! - [`solve`](PathOptimizer::solve) - one best path along the reference.
//! - [`sample_paths`](PathOptimizer::sample_paths) - a set of paths over sampled terminal
//!   lateral offsets, re-solving the same QP with only the terminal bound row changed.
//! - [`optimize_dynamic`](PathOptimizer::optimize_dynamic) - re-planning on a pre-given
//!   reference and corridor set, rebuilding nothing but the corridor bounds after the first
//!   call.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use std::f64::consts::FRAC_PI_2;

use crate::clearance::DiskCorridor;
use crate::discretize::{Discretizer, FrenetDeviation, Sample, SampleList};
use crate::error::{PathOptError, Result};
use crate::footprint::VehicleFootprint;
use crate::map::{CollisionChecker, DistanceMap};
use crate::maths::wrap_angle;
use crate::params::Params;
use crate::qp::problem::{col_psi, col_q, QpBuilder, QpProblem, TerminalCondition};
use crate::qp::solver::{OsqpDriver, QpSolver};
use crate::reconstruct::Reconstructor;
use crate::smoother::{CubicSplineSmoother, ReferenceSmoother};
use crate::spline::Spline;
use crate::state::{Path, State};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// The path optimiser.
pub struct PathOptimizer<'a, M, C, S = OsqpDriver> {
    map: &'a M,
    checker: &'a C,
    params: Params,
    footprint: VehicleFootprint,

    waypoints: Vec<State>,
    start: State,
    end: State,

    /// Densify the output by re-interpolating the optimised points.
    densify: bool,

    smoother: Box<dyn ReferenceSmoother>,

    /// Warm-started re-planning state; present once `optimize_dynamic` has initialised.
    dynamic: Option<DynamicPlan<S>>,

    // Visualisation buffers
    smoothed_path: Path,
    samples: Option<SampleList>,
    rear_bounds: Vec<State>,
    center_bounds: Vec<State>,
    front_bounds: Vec<State>,
}

/// State kept between `optimize_dynamic` calls.
struct DynamicPlan<S> {
    solver: S,
    problem: QpProblem,
    samples: Vec<Sample>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a, M: DistanceMap, C: CollisionChecker> PathOptimizer<'a, M, C, OsqpDriver> {
    /// Create an optimiser with default parameters and the OSQP backend.
    pub fn new(
        waypoints: Vec<State>,
        start: State,
        end: State,
        map: &'a M,
        checker: &'a C,
        densify: bool,
    ) -> Self {
        Self::with_params(waypoints, start, end, map, checker, densify, Params::default())
    }
}

impl<'a, M: DistanceMap, C: CollisionChecker, S: QpSolver + Default> PathOptimizer<'a, M, C, S> {
    /// Create an optimiser with explicit parameters.
    pub fn with_params(
        waypoints: Vec<State>,
        start: State,
        end: State,
        map: &'a M,
        checker: &'a C,
        densify: bool,
        params: Params,
    ) -> Self {
        let footprint = VehicleFootprint::from_params(&params);

        Self {
            map,
            checker,
            params,
            footprint,
            waypoints,
            start,
            end,
            densify,
            smoother: Box::new(CubicSplineSmoother),
            dynamic: None,
            smoothed_path: Path::new_empty(),
            samples: None,
            rear_bounds: Vec::new(),
            center_bounds: Vec::new(),
            front_bounds: Vec::new(),
        }
    }

    /// Replace the reference smoothing stage.
    pub fn set_smoother(&mut self, smoother: Box<dyn ReferenceSmoother>) {
        self.smoother = smoother;
    }

    /// Produce the single best path along the reference.
    pub fn solve(&mut self) -> Result<Path> {
        if self.waypoints.is_empty() {
            warn!("Empty input, quitting path optimisation");
            return Err(PathOptError::EmptyInput);
        }

        let smoothed = self.smoother.smooth(&self.waypoints, &self.start)?;
        self.smoothed_path = smoothed.coarse_path.clone();

        let discretizer = Discretizer::new(self.map, &self.footprint, &self.params);
        let (list, deviation) =
            discretizer.discretize(&smoothed, &self.start, self.densify, true)?;
        self.record_clearance_bounds(&list);

        let terminal = TerminalCondition {
            offset_m: 0.0,
            end_heading_rad: list.use_end_heading.then_some(self.end.heading_rad),
        };
        let problem =
            QpBuilder::new(&list.samples, &self.footprint, &self.params).build(&deviation, &terminal);

        let mut solver = S::default();
        solver.init(&problem, self.params.max_solver_iterations)?;
        let solution = solver.solve()?;
        debug!("Single solve converged over {} samples", list.len());

        let reconstructor = Reconstructor::new(self.checker, &self.params);
        let path = if self.densify {
            reconstructor.densified(&list.samples, &solution)?
        } else {
            reconstructor.raw(&list.samples, &solution)?
        };

        self.samples = Some(list);
        Ok(path)
    }

    /// Produce a set of paths over sampled terminal lateral offsets at each requested
    /// longitudinal distance. Per-offset failures are skipped; errors iff no path at all was
    /// produced.
    pub fn sample_paths(&mut self, lon_set: &[f64], lat_set: &[f64]) -> Result<Vec<Path>> {
        if self.waypoints.is_empty() {
            warn!("Empty input, quitting path optimisation");
            return Err(PathOptError::EmptyInput);
        }

        let smoothed = self.smoother.smooth(&self.waypoints, &self.start)?;
        self.smoothed_path = smoothed.coarse_path.clone();

        let discretizer = Discretizer::new(self.map, &self.footprint, &self.params);
        let (list, deviation) =
            discretizer.discretize(&smoothed, &self.start, self.densify, false)?;
        self.record_clearance_bounds(&list);

        let mut paths = Vec::new();
        for &lon_m in lon_set {
            if let Err(e) =
                self.sample_single_longitudinal(&list, &deviation, lon_m, lat_set, &mut paths)
            {
                warn!("Sampling at {:.1} m failed: {}", lon_m, e);
            }
        }

        self.samples = Some(list);
        if paths.is_empty() {
            Err(PathOptError::NoFeasiblePath)
        } else {
            Ok(paths)
        }
    }

    /// Re-plan on a pre-given reference and corridor set.
    ///
    /// The first call fits reference splines over the waypoints' stored arclengths, assembles
    /// the QP and initialises the solver; subsequent calls only replace the corridor bound rows
    /// and re-solve warm-started. The caller guarantees an identical `s_list` across calls.
    pub fn optimize_dynamic(
        &mut self,
        s_list: &[f64],
        clearances: &[[DiskCorridor; 4]],
    ) -> Result<Path> {
        if self.dynamic.is_none() {
            self.init_dynamic(s_list, clearances)?;
        } else {
            let plan = self.dynamic.as_mut().unwrap();
            for (i, corridor) in clearances.iter().enumerate().take(plan.samples.len()) {
                plan.problem.set_corridor_bounds(i, corridor);
                plan.samples[i].corridor = *corridor;
            }
            plan.solver
                .update_bounds(&plan.problem.lower, &plan.problem.upper)?;
        }

        let plan = self.dynamic.as_mut().unwrap();
        let solution = plan.solver.solve()?;
        Ok(dynamic_path(&plan.samples, &solution))
    }

    /// The coarse smoothed reference of the last plan.
    pub fn smoothed_path(&self) -> &Path {
        &self.smoothed_path
    }

    /// The discretised reference of the last plan.
    pub fn samples(&self) -> Option<&SampleList> {
        self.samples.as_ref()
    }

    /// Clearance boundary vertices of the rear disk, alternating left/right per sample.
    pub fn rear_bounds(&self) -> &[State] {
        &self.rear_bounds
    }

    /// Clearance boundary vertices of the centre-front disk.
    pub fn center_bounds(&self) -> &[State] {
        &self.center_bounds
    }

    /// Clearance boundary vertices of the front disk.
    pub fn front_bounds(&self) -> &[State] {
        &self.front_bounds
    }

    /// Build the QP for one longitudinal prefix and sweep the terminal offset set.
    fn sample_single_longitudinal(
        &self,
        list: &SampleList,
        deviation: &FrenetDeviation,
        lon_m: f64,
        lat_set: &[f64],
        paths: &mut Vec<Path>,
    ) -> Result<()> {
        let prefix_len = list.samples.iter().take_while(|s| s.s_m <= lon_m).count();
        if prefix_len < self.params.min_sample_count {
            return Err(PathOptError::InfeasibleCorridor(prefix_len));
        }
        let prefix = &list.samples[..prefix_len];
        let last = &prefix[prefix_len - 1];

        let terminal = TerminalCondition {
            offset_m: lat_set.first().copied().unwrap_or(0.0),
            end_heading_rad: None,
        };
        let mut problem =
            QpBuilder::new(prefix, &self.footprint, &self.params).build(deviation, &terminal);

        let mut solver = S::default();
        solver.init(&problem, self.params.max_solver_iterations)?;

        let offsets = terminal_offset_set(
            &last.corridor[0],
            self.params.lateral_interval_m,
            self.params.lateral_span_m,
        );
        let normal = wrap_angle(last.heading_rad + FRAC_PI_2);
        let reconstructor = Reconstructor::new(self.checker, &self.params);

        let mut produced = 0usize;
        for &offset_m in &offsets {
            // Skip terminals the vehicle cannot even stand on.
            let terminal_state = State::new(
                last.x_m + offset_m * normal.cos(),
                last.y_m + offset_m * normal.sin(),
                last.heading_rad,
            );
            if !self.checker.is_state_free(&terminal_state) {
                debug!(
                    "Terminal lat {:.2} m at lon {:.1} m is not feasible",
                    offset_m, lon_m
                );
                continue;
            }

            problem.set_terminal_offset(offset_m, self.params.terminal_offset_tol_m);
            solver.update_bounds(&problem.lower, &problem.upper)?;

            let solution = match solver.solve() {
                Ok(s) => s,
                Err(e) => {
                    warn!(
                        "Solver failed at lon {:.1} m, lat {:.2} m: {}",
                        lon_m, offset_m, e
                    );
                    continue;
                }
            };

            // Sampling mode always emits the densified path.
            match reconstructor.densified(prefix, &solution) {
                Ok(path) if !path.is_empty() => {
                    paths.push(path);
                    produced += 1;
                }
                Ok(_) => {}
                Err(e) => debug!("Reconstruction rejected lat {:.2} m: {}", offset_m, e),
            }
        }

        debug!("Got {} path(s) at {:.1} m", produced, lon_m);
        Ok(())
    }

    /// First-call setup of the dynamic re-planning mode.
    fn init_dynamic(&mut self, s_list: &[f64], clearances: &[[DiskCorridor; 4]]) -> Result<()> {
        if self.waypoints.is_empty() {
            return Err(PathOptError::EmptyInput);
        }

        let s_set: Vec<f64> = self.waypoints.iter().map(|p| p.s_m).collect();
        let x_set: Vec<f64> = self.waypoints.iter().map(|p| p.x_m).collect();
        let y_set: Vec<f64> = self.waypoints.iter().map(|p| p.y_m).collect();
        let x_spline = Spline::new(&s_set, &x_set)?;
        let y_spline = Spline::new(&s_set, &y_set)?;

        let samples: Vec<Sample> = s_list
            .iter()
            .zip(clearances.iter())
            .map(|(&s, corridor)| {
                let x_d1 = x_spline.first_deriv(s);
                let y_d1 = y_spline.first_deriv(s);
                let x_d2 = x_spline.second_deriv(s);
                let y_d2 = y_spline.second_deriv(s);

                Sample {
                    s_m: s,
                    x_m: x_spline.value(s),
                    y_m: y_spline.value(s),
                    heading_rad: y_d1.atan2(x_d1),
                    curv_m: (x_d1 * y_d2 - y_d1 * x_d2)
                        / (x_d1.powi(2) + y_d1.powi(2)).powf(1.5),
                    corridor: *corridor,
                }
            })
            .collect();

        if samples.len() < self.params.min_sample_count {
            return Err(PathOptError::InfeasibleCorridor(samples.len()));
        }

        let deviation = FrenetDeviation {
            cte_m: 0.0,
            epsi_rad: 0.0,
        };
        let terminal = TerminalCondition {
            offset_m: 0.0,
            end_heading_rad: Some(self.end.heading_rad),
        };
        let problem =
            QpBuilder::new(&samples, &self.footprint, &self.params).build(&deviation, &terminal);

        let mut solver = S::default();
        solver.init(&problem, self.params.max_solver_iterations)?;

        self.dynamic = Some(DynamicPlan {
            solver,
            problem,
            samples,
        });
        Ok(())
    }

    /// Record the clearance boundary vertices of the rear, centre-front and front disks for
    /// visualisation.
    fn record_clearance_bounds(&mut self, list: &SampleList) {
        self.rear_bounds.clear();
        self.center_bounds.clear();
        self.front_bounds.clear();

        let footprint = self.footprint;
        for sample in &list.samples {
            let (sin_h, cos_h) = sample.heading_rad.sin_cos();
            let center_x = sample.x_m + footprint.rear_to_center_m() * cos_h;
            let center_y = sample.y_m + footprint.rear_to_center_m() * sin_h;
            let normal = wrap_angle(sample.heading_rad + FRAC_PI_2);
            let (sin_n, cos_n) = normal.sin_cos();

            for (k, buffer) in [
                (0usize, &mut self.rear_bounds),
                (2, &mut self.center_bounds),
                (3, &mut self.front_bounds),
            ] {
                let (offset_m, _) = footprint.disks()[k];
                let disk_x = center_x + offset_m * cos_h;
                let disk_y = center_y + offset_m * sin_h;
                let corridor = sample.corridor[k];

                buffer.push(State::new(
                    disk_x + corridor.left_m * cos_n,
                    disk_y + corridor.left_m * sin_n,
                    sample.heading_rad,
                ));
                buffer.push(State::new(
                    disk_x + corridor.right_m * cos_n,
                    disk_y + corridor.right_m * sin_n,
                    sample.heading_rad,
                ));
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Terminal lateral offsets to attempt, generated from the terminal rear-disk corridor: sweep
/// the corridor at the sampling interval, shrinking symmetrically when it is wider than the
/// span cap, and always include the reference itself.
pub(crate) fn terminal_offset_set(
    corridor: &DiskCorridor,
    interval_m: f64,
    span_cap_m: f64,
) -> Vec<f64> {
    let range = corridor.width_m();
    let reduced = if range >= span_cap_m {
        (range - span_cap_m) / 2.0
    } else {
        0.0
    };

    let mut offsets = Vec::new();
    let mut i = 0usize;
    while i as f64 * interval_m <= range - 2.0 * reduced {
        offsets.push(corridor.right_m + reduced + i as f64 * interval_m);
        i += 1;
    }
    offsets.push(0.0);

    offsets
}

/// Map a dynamic-mode solution back to Cartesian. Dynamic re-planning performs no output
/// collision validation.
fn dynamic_path(samples: &[Sample], solution: &[f64]) -> Path {
    let mut path = Path::new_empty();
    let mut total_s = 0.0;
    let mut last: Option<(f64, f64)> = None;

    for (i, sample) in samples.iter().enumerate() {
        let normal = wrap_angle(sample.heading_rad + FRAC_PI_2);
        let x_m = sample.x_m + solution[col_q(i)] * normal.cos();
        let y_m = sample.y_m + solution[col_q(i)] * normal.sin();

        if let Some((last_x, last_y)) = last {
            total_s += ((x_m - last_x).powi(2) + (y_m - last_y).powi(2)).sqrt();
        }
        last = Some((x_m, y_m));

        path.states.push(State {
            x_m,
            y_m,
            heading_rad: wrap_angle(sample.heading_rad + solution[col_psi(i)]),
            s_m: total_s,
            curv_m: 0.0,
        });
    }

    path
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
