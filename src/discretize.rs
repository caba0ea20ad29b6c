//! # Reference discretiser
//!
//! Turns the smoothed reference splines into the sample list consumed by the QP builder and the
//! path reconstructor: arclength breakpoints with non-uniform spacing, a Frenet frame (pose and
//! curvature) at each breakpoint, and the lateral corridor of each covering disk there.
//!
//! Spacing is finer near the start, where the vehicle may still carry a large heading deviation,
//! and relaxes after the near region. The discretiser also computes the initial Frenet deviation
//! of the start pose from the first reference point, and refuses to plan when the heading
//! deviation is too large for the linearised model.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};

use crate::clearance::{ClearanceProbe, DiskCorridor};
use crate::error::PathOptError;
use crate::footprint::VehicleFootprint;
use crate::map::DistanceMap;
use crate::maths::{distance, global_to_local, wrap_angle};
use crate::params::Params;
use crate::smoother::SmoothedRef;
use crate::state::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One discretised reference sample.
///
/// The pose is the rear-axle pose on the reference; the corridors were probed at the disk
/// centres of the footprint placed with its geometric centre `rear_to_center` ahead of the
/// rear axle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
    /// Arclength along the reference, in meters.
    pub s_m: f64,

    /// Rear-axle x position, in meters.
    pub x_m: f64,

    /// Rear-axle y position, in meters.
    pub y_m: f64,

    /// Reference tangent heading, in radians.
    pub heading_rad: f64,

    /// Reference curvature, in 1/meters.
    pub curv_m: f64,

    /// Lateral corridors of the four covering disks, rear to front.
    pub corridor: [DiskCorridor; 4],
}

/// The discretised reference.
#[derive(Debug, Clone)]
pub struct SampleList {
    /// Samples with strictly increasing arclength, `s_0 = 0`.
    pub samples: Vec<Sample>,

    /// Whether the terminal heading may still be constrained. Cleared when the list was
    /// truncated short of the reference end.
    pub use_end_heading: bool,
}

/// Frenet deviation of the start pose from the first reference point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrenetDeviation {
    /// Cross-track error, in meters. Positive means the reference lies to the vehicle's right.
    pub cte_m: f64,

    /// Heading error, in radians.
    pub epsi_rad: f64,
}

/// Produces [`SampleList`]s from smoothed references.
pub struct Discretizer<'a, M: DistanceMap> {
    map: &'a M,
    footprint: &'a VehicleFootprint,
    params: &'a Params,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SampleList {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<'a, M: DistanceMap> Discretizer<'a, M> {
    pub fn new(map: &'a M, footprint: &'a VehicleFootprint, params: &'a Params) -> Self {
        Self {
            map,
            footprint,
            params,
        }
    }

    /// Discretise the smoothed reference.
    ///
    /// `densify` selects the coarse far spacing (the output will be re-interpolated later);
    /// `apply_safety` enables the corridor safety shrink away from the start.
    pub fn discretize(
        &self,
        smoothed: &SmoothedRef,
        start: &State,
        densify: bool,
        apply_safety: bool,
    ) -> Result<(SampleList, FrenetDeviation), PathOptError> {
        let deviation = self.initial_deviation(smoothed, start)?;

        let breakpoints = self.breakpoints(smoothed.max_s_m, deviation.epsi_rad, densify);

        let probe = ClearanceProbe::new(self.map, self.params);
        let mut samples = Vec::with_capacity(breakpoints.len());
        let mut use_end_heading = self.params.use_end_heading;

        for &s in &breakpoints {
            let sample = self.reference_at(smoothed, s);

            // The clearance probe works on the geometric centre, ahead of the rear axle.
            let (sin_h, cos_h) = sample.heading_rad.sin_cos();
            let center = State::new(
                sample.x_m + self.footprint.rear_to_center_m() * cos_h,
                sample.y_m + self.footprint.rear_to_center_m() * sin_h,
                sample.heading_rad,
            );
            let safety = apply_safety && s >= self.params.safety_margin_min_s_m;
            let corridor = probe.corridors_for_footprint(&center, self.footprint, safety);

            // An inescapable disk near the reference end would make the terminal constraints
            // unsatisfiable; cut the list there instead and release the end heading.
            if corridor.iter().any(|c| c.is_degenerate())
                && s > self.params.terminal_degenerate_fraction * smoothed.max_s_m
            {
                warn!(
                    "Degenerate corridor at s = {:.2} m of {:.2} m, truncating the reference",
                    s, smoothed.max_s_m
                );
                use_end_heading = false;
                break;
            }

            samples.push(Sample { corridor, ..sample });
        }

        if samples.len() < self.params.min_sample_count {
            return Err(PathOptError::InfeasibleCorridor(samples.len()));
        }

        Ok((
            SampleList {
                samples,
                use_end_heading,
            },
            deviation,
        ))
    }

    /// Frenet deviation of the start pose from the first reference point, with the 75 deg
    /// sanity check on the heading error.
    fn initial_deviation(
        &self,
        smoothed: &SmoothedRef,
        start: &State,
    ) -> Result<FrenetDeviation, PathOptError> {
        let first_point = State::new(
            smoothed.x_spline.value(0.0),
            smoothed.y_spline.value(0.0),
            smoothed
                .y_spline
                .first_deriv(0.0)
                .atan2(smoothed.x_spline.first_deriv(0.0)),
        );

        let local = global_to_local(start, &first_point);
        let dist = distance(start, &first_point);
        let cte_m = if local.y_m < 0.0 { dist } else { -dist };

        let epsi_rad = wrap_angle(start.heading_rad - first_point.heading_rad);
        if epsi_rad.abs() > self.params.max_heading_dev_rad {
            warn!(
                "Initial heading error {:.1} deg exceeds the {:.1} deg bound",
                epsi_rad.to_degrees(),
                self.params.max_heading_dev_rad.to_degrees()
            );
            return Err(PathOptError::InitialHeadingTooLarge(epsi_rad));
        }

        Ok(FrenetDeviation { cte_m, epsi_rad })
    }

    /// Arclength breakpoints: fine spacing through the near region, then the far spacing, with
    /// the reference end appended only when the tail gap is large.
    fn breakpoints(&self, max_s_m: f64, epsi_rad: f64, densify: bool) -> Vec<f64> {
        let spacing_far = if densify {
            self.params.spacing_far_m
        } else {
            self.params.spacing_near_m
        };
        let spacing_near = if epsi_rad.abs() < self.params.uniform_spacing_heading_rad {
            spacing_far
        } else {
            self.params.spacing_near_m
        };

        let mut breakpoints = vec![0.0];
        let mut s = spacing_near;
        while s < max_s_m {
            breakpoints.push(s);
            s += if s <= self.params.near_region_m {
                spacing_near
            } else {
                spacing_far
            };
        }
        if max_s_m - breakpoints.last().unwrap() > self.params.tail_gap_m {
            breakpoints.push(max_s_m);
        }

        breakpoints
    }

    /// Pose and curvature of the reference at arclength `s`.
    fn reference_at(&self, smoothed: &SmoothedRef, s: f64) -> Sample {
        let x_d1 = smoothed.x_spline.first_deriv(s);
        let y_d1 = smoothed.y_spline.first_deriv(s);
        let x_d2 = smoothed.x_spline.second_deriv(s);
        let y_d2 = smoothed.y_spline.second_deriv(s);

        Sample {
            s_m: s,
            x_m: smoothed.x_spline.value(s),
            y_m: smoothed.y_spline.value(s),
            heading_rad: y_d1.atan2(x_d1),
            curv_m: (x_d1 * y_d2 - y_d1 * x_d2) / (x_d1.powi(2) + y_d1.powi(2)).powf(1.5),
            corridor: [DiskCorridor::default(); 4],
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::smoother::{CubicSplineSmoother, ReferenceSmoother};
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    struct FreeMap;

    impl DistanceMap for FreeMap {
        fn clearance_m_at(&self, _position_m: Vector2<f64>) -> f64 {
            100.0
        }
    }

    /// Everything at x >= wall_x is inside an obstacle.
    struct WallMap {
        wall_x_m: f64,
    }

    impl DistanceMap for WallMap {
        fn clearance_m_at(&self, position_m: Vector2<f64>) -> f64 {
            self.wall_x_m - position_m.x
        }
    }

    fn smooth_straight(length_m: usize) -> SmoothedRef {
        let waypoints: Vec<State> = (0..=length_m)
            .map(|i| State::new(i as f64, 0.0, 0.0))
            .collect();
        CubicSplineSmoother
            .smooth(&waypoints, &State::new(0.0, 0.0, 0.0))
            .unwrap()
    }

    #[test]
    fn test_spacing_switches_after_the_near_region() {
        let map = FreeMap;
        let params = Params::default();
        let footprint = VehicleFootprint::from_params(&params);
        let discretizer = Discretizer::new(&map, &footprint, &params);
        let smoothed = smooth_straight(20);

        // Start heading 30 deg off the reference keeps the near spacing active.
        let start = State::new(0.0, 0.0, 30f64.to_radians());
        let (list, deviation) = discretizer
            .discretize(&smoothed, &start, true, false)
            .unwrap();

        assert_relative_eq!(deviation.epsi_rad, 30f64.to_radians(), epsilon = 1e-9);
        assert_relative_eq!(list.samples[0].s_m, 0.0);

        for pair in list.samples.windows(2) {
            let gap = pair[1].s_m - pair[0].s_m;
            assert!(pair[1].s_m > pair[0].s_m);
            if pair[0].s_m <= 2.0 {
                assert_relative_eq!(gap, 0.3, epsilon = 1e-9);
            } else {
                assert_relative_eq!(gap, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_small_heading_error_gives_uniform_spacing() {
        let map = FreeMap;
        let params = Params::default();
        let footprint = VehicleFootprint::from_params(&params);
        let discretizer = Discretizer::new(&map, &footprint, &params);
        let smoothed = smooth_straight(20);

        let (list, _) = discretizer
            .discretize(&smoothed, &State::new(0.0, 0.0, 0.0), true, false)
            .unwrap();

        for pair in list.samples.windows(2) {
            assert_relative_eq!(pair[1].s_m - pair[0].s_m, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_heading_error_bound() {
        let map = FreeMap;
        let params = Params::default();
        let footprint = VehicleFootprint::from_params(&params);
        let discretizer = Discretizer::new(&map, &footprint, &params);
        let smoothed = smooth_straight(20);

        let just_inside = State::new(0.0, 0.0, 74.9f64.to_radians());
        assert!(discretizer
            .discretize(&smoothed, &just_inside, true, false)
            .is_ok());

        let just_outside = State::new(0.0, 0.0, 75.1f64.to_radians());
        assert!(matches!(
            discretizer.discretize(&smoothed, &just_outside, true, false),
            Err(PathOptError::InitialHeadingTooLarge(_))
        ));
    }

    #[test]
    fn test_cte_sign_follows_the_reference_side() {
        let map = FreeMap;
        let params = Params::default();
        let footprint = VehicleFootprint::from_params(&params);
        let discretizer = Discretizer::new(&map, &footprint, &params);
        let smoothed = smooth_straight(20);

        // Vehicle left of the reference: the reference is to its right, cte positive.
        let start = State::new(0.0, 1.0, 0.0);
        let (_, deviation) = discretizer
            .discretize(&smoothed, &start, true, false)
            .unwrap();
        assert_relative_eq!(deviation.cte_m, 1.0, epsilon = 1e-9);

        let start = State::new(0.0, -1.0, 0.0);
        let (_, deviation) = discretizer
            .discretize(&smoothed, &start, true, false)
            .unwrap();
        assert_relative_eq!(deviation.cte_m, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_terminal_truncation_releases_the_end_heading() {
        // A wall across the reference at x = 36 of a 40 m path: the front disk becomes
        // inescapable past s = 0.75 * 40, so the list truncates there.
        let map = WallMap { wall_x_m: 36.0 };
        let params = Params::default();
        let footprint = VehicleFootprint::from_params(&params);
        let discretizer = Discretizer::new(&map, &footprint, &params);
        let smoothed = smooth_straight(40);

        let (list, _) = discretizer
            .discretize(&smoothed, &State::new(0.0, 0.0, 0.0), true, false)
            .unwrap();

        assert!(!list.use_end_heading);
        let last_s = list.samples.last().unwrap().s_m;
        assert!(last_s > 30.0 && last_s < 36.0);

        // All retained corridors are well-formed.
        for sample in &list.samples {
            for corridor in &sample.corridor {
                assert!(corridor.left_m >= corridor.right_m);
            }
        }
    }
}
