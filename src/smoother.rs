//! # Reference path smoothing
//!
//! The optimiser consumes the smoothing stage through the [`ReferenceSmoother`] trait: given the
//! raw waypoints and the start pose, produce a pair of arclength-parameterised cubic splines
//! `X(s)`, `Y(s)`, the total arclength, and the coarse smoothed path. A chord-length
//! parameterised fit, [`CubicSplineSmoother`], ships as the default implementation; callers with
//! their own smoothing stage substitute it via
//! [`PathOptimizer::set_smoother`](crate::PathOptimizer::set_smoother).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;

use crate::spline::{Spline, SplineError};
use crate::state::{Path, State};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The product of the smoothing stage.
pub struct SmoothedRef {
    /// X coordinate over arclength.
    pub x_spline: Spline,

    /// Y coordinate over arclength.
    pub y_spline: Spline,

    /// Total arclength of the smoothed reference, in meters.
    pub max_s_m: f64,

    /// The coarse smoothed path, for visualisation.
    pub coarse_path: Path,
}

/// Default smoother: a natural cubic spline fit parameterised by cumulative chord length.
#[derive(Debug, Default, Clone)]
pub struct CubicSplineSmoother;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SmoothError {
    #[error("Smoothing needs at least two distinct waypoints, got {0}")]
    TooFewWaypoints(usize),

    #[error("The waypoints span no distance")]
    DegenerateLength,

    #[error("Spline fit failed: {0}")]
    SplineFit(#[from] SplineError),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The smoothing stage of the pipeline.
pub trait ReferenceSmoother {
    /// Fit a smooth, arclength-parameterised curve through the waypoints.
    fn smooth(&self, waypoints: &[State], start: &State) -> Result<SmoothedRef, SmoothError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ReferenceSmoother for CubicSplineSmoother {
    fn smooth(&self, waypoints: &[State], _start: &State) -> Result<SmoothedRef, SmoothError> {
        // Drop consecutive duplicates, which would break the chord parameterisation.
        let mut points: Vec<&State> = Vec::with_capacity(waypoints.len());
        for point in waypoints {
            match points.last() {
                Some(last) if crate::maths::distance(last, point) < 1e-9 => {
                    warn!("Dropping duplicate waypoint at ({}, {})", point.x_m, point.y_m);
                }
                _ => points.push(point),
            }
        }

        if points.len() < 2 {
            return Err(SmoothError::TooFewWaypoints(points.len()));
        }

        // Cumulative chord length as the curve parameter.
        let mut s = Vec::with_capacity(points.len());
        s.push(0.0);
        for pair in points.windows(2) {
            let ds = crate::maths::distance(pair[0], pair[1]);
            s.push(s.last().unwrap() + ds);
        }
        let max_s_m = *s.last().unwrap();
        if max_s_m <= 0.0 {
            return Err(SmoothError::DegenerateLength);
        }

        let x: Vec<f64> = points.iter().map(|p| p.x_m).collect();
        let y: Vec<f64> = points.iter().map(|p| p.y_m).collect();
        let x_spline = Spline::new(&s, &x)?;
        let y_spline = Spline::new(&s, &y)?;

        // Coarse path: the retained waypoints with arclength and tangent heading attached.
        let coarse_path = Path {
            states: s
                .iter()
                .map(|&si| State {
                    x_m: x_spline.value(si),
                    y_m: y_spline.value(si),
                    heading_rad: y_spline.first_deriv(si).atan2(x_spline.first_deriv(si)),
                    s_m: si,
                    curv_m: 0.0,
                })
                .collect(),
        };

        Ok(SmoothedRef {
            x_spline,
            y_spline,
            max_s_m,
            coarse_path,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn straight_waypoints(n: usize) -> Vec<State> {
        (0..n).map(|i| State::new(i as f64, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_straight_line_arclength() {
        let waypoints = straight_waypoints(21);
        let smoothed = CubicSplineSmoother
            .smooth(&waypoints, &State::new(0.0, 0.0, 0.0))
            .unwrap();

        assert_relative_eq!(smoothed.max_s_m, 20.0, epsilon = 1e-9);
        assert_relative_eq!(smoothed.x_spline.value(7.5), 7.5, epsilon = 1e-9);
        assert_relative_eq!(smoothed.y_spline.value(7.5), 0.0, epsilon = 1e-9);
        assert_eq!(smoothed.coarse_path.len(), 21);
        assert_relative_eq!(smoothed.coarse_path.states[5].heading_rad, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_duplicate_waypoints_are_dropped() {
        let mut waypoints = straight_waypoints(5);
        waypoints.insert(2, waypoints[1]);

        let smoothed = CubicSplineSmoother
            .smooth(&waypoints, &State::new(0.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(smoothed.coarse_path.len(), 5);
    }

    #[test]
    fn test_too_few_waypoints() {
        let result = CubicSplineSmoother.smooth(
            &[State::new(1.0, 1.0, 0.0)],
            &State::new(0.0, 0.0, 0.0),
        );
        assert!(matches!(result, Err(SmoothError::TooFewWaypoints(1))));
    }
}
