//! # Path reconstruction
//!
//! Maps a QP solution back into Cartesian space. Each sample's optimised lateral offset is
//! applied along the Frenet normal of the reference; raw mode emits one state per sample with
//! the optimised heading deviation added to the reference heading, while densify mode re-fits
//! cubic splines through the output points and resamples them at a fixed spacing.
//!
//! Every emitted state is validated against the collision checker. Colliding states are never
//! emitted: a collision at the first state aborts reconstruction, later collisions truncate
//! the path.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use std::f64::consts::FRAC_PI_2;

use crate::discretize::Sample;
use crate::error::PathOptError;
use crate::map::CollisionChecker;
use crate::maths::wrap_angle;
use crate::params::Params;
use crate::qp::problem::{col_psi, col_q};
use crate::spline::Spline;
use crate::state::{Path, State};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Maps QP solutions to validated Cartesian paths.
pub struct Reconstructor<'a, C: CollisionChecker> {
    checker: &'a C,
    params: &'a Params,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

/// Cartesian position of sample `i` displaced by its optimised lateral offset.
fn offset_position(sample: &Sample, q_m: f64) -> (f64, f64) {
    let normal = wrap_angle(sample.heading_rad + FRAC_PI_2);
    (
        sample.x_m + q_m * normal.cos(),
        sample.y_m + q_m * normal.sin(),
    )
}

impl<'a, C: CollisionChecker> Reconstructor<'a, C> {
    pub fn new(checker: &'a C, params: &'a Params) -> Self {
        Self { checker, params }
    }

    /// Emit one output state per sample.
    pub fn raw(&self, samples: &[Sample], solution: &[f64]) -> Result<Path, PathOptError> {
        let mut path = Path::new_empty();
        let mut total_s = 0.0;
        let mut last: Option<(f64, f64)> = None;

        for (i, sample) in samples.iter().enumerate() {
            let (x_m, y_m) = offset_position(sample, solution[col_q(i)]);
            if let Some((last_x, last_y)) = last {
                total_s += ((x_m - last_x).powi(2) + (y_m - last_y).powi(2)).sqrt();
            }
            last = Some((x_m, y_m));

            let state = State {
                x_m,
                y_m,
                heading_rad: wrap_angle(sample.heading_rad + solution[col_psi(i)]),
                s_m: total_s,
                curv_m: 0.0,
            };

            if !self.checker.is_state_free(&state) {
                if path.is_empty() {
                    return Err(PathOptError::CollisionAtOutput);
                }
                warn!("Output collision check failed at sample {}, truncating", i);
                break;
            }
            path.states.push(state);
        }

        Ok(path)
    }

    /// Re-fit splines through the output points and resample at the output spacing.
    pub fn densified(&self, samples: &[Sample], solution: &[f64]) -> Result<Path, PathOptError> {
        // Chord-length parameterised output points
        let mut xs: Vec<f64> = Vec::with_capacity(samples.len());
        let mut ys: Vec<f64> = Vec::with_capacity(samples.len());
        let mut ss: Vec<f64> = Vec::with_capacity(samples.len());
        let mut total_s = 0.0;

        for (i, sample) in samples.iter().enumerate() {
            let (x_m, y_m) = offset_position(sample, solution[col_q(i)]);
            if let (Some(&last_x), Some(&last_y)) = (xs.last(), ys.last()) {
                let ds = ((x_m - last_x).powi(2) + (y_m - last_y).powi(2)).sqrt();
                // Coincident output points carry no new information and would break the fit
                if ds < 1e-9 {
                    continue;
                }
                total_s += ds;
            }
            xs.push(x_m);
            ys.push(y_m);
            ss.push(total_s);
        }

        let x_spline = Spline::new(&ss, &xs)?;
        let y_spline = Spline::new(&ss, &ys)?;

        let mut path = Path::new_empty();
        let mut j = 0usize;
        loop {
            let s = j as f64 * self.params.output_spacing_m;
            if s > total_s {
                break;
            }

            if !self.emit(&x_spline, &y_spline, s, &mut path)? {
                return Ok(path);
            }

            // The next step would overshoot: close with the exact endpoint.
            if (j + 1) as f64 * self.params.output_spacing_m > total_s && s < total_s {
                self.emit(&x_spline, &y_spline, total_s, &mut path)?;
                break;
            }
            j += 1;
        }

        Ok(path)
    }

    /// Evaluate, validate and append the resampled state at `s`. Returns false when the path
    /// was truncated by a collision.
    fn emit(
        &self,
        x_spline: &Spline,
        y_spline: &Spline,
        s: f64,
        path: &mut Path,
    ) -> Result<bool, PathOptError> {
        let x_d1 = x_spline.first_deriv(s);
        let y_d1 = y_spline.first_deriv(s);
        let x_d2 = x_spline.second_deriv(s);
        let y_d2 = y_spline.second_deriv(s);

        let state = State {
            x_m: x_spline.value(s),
            y_m: y_spline.value(s),
            heading_rad: y_d1.atan2(x_d1),
            s_m: s,
            curv_m: (x_d1 * y_d2 - y_d1 * x_d2) / (x_d1.powi(2) + y_d1.powi(2)).powf(1.5),
        };

        if !self.checker.is_state_free(&state) {
            if path.is_empty() {
                return Err(PathOptError::CollisionAtOutput);
            }
            warn!("Output collision check failed at s = {:.2} m, truncating", s);
            return Ok(false);
        }

        path.states.push(state);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::clearance::DiskCorridor;
    use approx::assert_relative_eq;

    struct AlwaysFree;

    impl CollisionChecker for AlwaysFree {
        fn is_state_free(&self, _state: &State) -> bool {
            true
        }
    }

    /// Rejects states past a given x position.
    struct BlockedBeyond {
        x_m: f64,
    }

    impl CollisionChecker for BlockedBeyond {
        fn is_state_free(&self, state: &State) -> bool {
            state.x_m < self.x_m
        }
    }

    fn straight_samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                s_m: i as f64,
                x_m: i as f64,
                y_m: 0.0,
                heading_rad: 0.0,
                curv_m: 0.0,
                corridor: [DiskCorridor::default(); 4],
            })
            .collect()
    }

    fn zero_solution(n: usize) -> Vec<f64> {
        vec![0.0; 3 * n - 1]
    }

    #[test]
    fn test_raw_zero_solution_reproduces_the_reference() {
        let checker = AlwaysFree;
        let params = Params::default();
        let recon = Reconstructor::new(&checker, &params);
        let samples = straight_samples(5);

        let path = recon.raw(&samples, &zero_solution(5)).unwrap();

        assert_eq!(path.len(), 5);
        for (state, sample) in path.states.iter().zip(samples.iter()) {
            assert_relative_eq!(state.x_m, sample.x_m, epsilon = 1e-12);
            assert_relative_eq!(state.y_m, 0.0, epsilon = 1e-12);
            assert_relative_eq!(state.heading_rad, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_raw_applies_offset_and_heading_deviation() {
        let checker = AlwaysFree;
        let params = Params::default();
        let recon = Reconstructor::new(&checker, &params);
        let samples = straight_samples(3);

        let mut solution = zero_solution(3);
        solution[col_q(1)] = 0.5; // half a meter left
        solution[col_psi(1)] = 0.1;

        let path = recon.raw(&samples, &solution).unwrap();
        assert_relative_eq!(path.states[1].x_m, 1.0, epsilon = 1e-12);
        assert_relative_eq!(path.states[1].y_m, 0.5, epsilon = 1e-12);
        assert_relative_eq!(path.states[1].heading_rad, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_raw_truncates_at_first_collision() {
        let checker = BlockedBeyond { x_m: 2.5 };
        let params = Params::default();
        let recon = Reconstructor::new(&checker, &params);
        let samples = straight_samples(5);

        let path = recon.raw(&samples, &zero_solution(5)).unwrap();
        assert_eq!(path.len(), 3);
        assert!(path.states.iter().all(|s| s.x_m < 2.5));
    }

    #[test]
    fn test_collision_at_first_state_errors() {
        let checker = BlockedBeyond { x_m: -1.0 };
        let params = Params::default();
        let recon = Reconstructor::new(&checker, &params);
        let samples = straight_samples(5);

        assert!(matches!(
            recon.raw(&samples, &zero_solution(5)),
            Err(PathOptError::CollisionAtOutput)
        ));
    }

    #[test]
    fn test_densified_spacing_and_endpoint() {
        let checker = AlwaysFree;
        let params = Params::default();
        let recon = Reconstructor::new(&checker, &params);
        let samples = straight_samples(5);

        let path = recon.densified(&samples, &zero_solution(5)).unwrap();

        // 4 m of straight output resampled at 0.3 m, endpoint appended
        assert!(path.len() >= 14);
        for pair in path.states.windows(2) {
            assert!(pair[1].s_m > pair[0].s_m);
        }
        let last = path.states.last().unwrap();
        assert_relative_eq!(last.x_m, 4.0, epsilon = 1e-9);
        assert_relative_eq!(last.s_m, 4.0, epsilon = 1e-9);
    }
}
