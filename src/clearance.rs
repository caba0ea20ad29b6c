//! # Lateral clearance probe
//!
//! For a single covering disk the probe sweeps the distance field left and right along the
//! normal of the disk's heading to find the lateral interval the disk centre may occupy without
//! colliding. The convention is `left >= right`, with left positive (towards heading + pi/2) and
//! right typically negative. Equal bounds signal zero lateral freedom for that disk.
//!
//! When the disk origin itself is in collision the probe runs half-range escape walks on both
//! sides, picks the side that reaches free space sooner (ties pick right), walks that side out
//! to the far wall, and clamps the other bound to the just-escaped distance. The corridor then
//! contains the rescue direction rather than straddling the obstacle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

use crate::footprint::VehicleFootprint;
use crate::map::DistanceMap;
use crate::maths::wrap_angle;
use crate::params::Params;
use crate::state::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Lateral corridor of a single disk, `left_m >= right_m`.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct DiskCorridor {
    /// Bound towards heading + pi/2, in meters.
    pub left_m: f64,

    /// Bound towards heading - pi/2, in meters.
    pub right_m: f64,
}

/// Sweeps the distance field for lateral corridors.
pub struct ClearanceProbe<'a, M: DistanceMap> {
    map: &'a M,
    step_m: f64,
    cap_m: f64,
    shrink_slack_m: f64,
    shrink_ratio: f64,
    shrink_cap_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DiskCorridor {
    /// Corridor width, in meters.
    pub fn width_m(&self) -> f64 {
        self.left_m - self.right_m
    }

    /// True when the disk has zero lateral freedom.
    pub fn is_degenerate(&self) -> bool {
        self.left_m == self.right_m
    }
}

impl<'a, M: DistanceMap> ClearanceProbe<'a, M> {
    pub fn new(map: &'a M, params: &Params) -> Self {
        Self {
            map,
            step_m: params.clearance_step_m,
            cap_m: params.clearance_cap_m,
            shrink_slack_m: params.shrink_slack_m,
            shrink_ratio: params.shrink_ratio,
            shrink_cap_m: params.shrink_cap_m,
        }
    }

    /// Probe all four covering disks at the given geometric-centre pose.
    pub fn corridors_for_footprint(
        &self,
        center: &State,
        footprint: &VehicleFootprint,
        apply_safety: bool,
    ) -> [DiskCorridor; 4] {
        let (sin_h, cos_h) = center.heading_rad.sin_cos();

        footprint.disks().map(|(offset_m, radius_m)| {
            let disk_center = Vector2::new(
                center.x_m + offset_m * cos_h,
                center.y_m + offset_m * sin_h,
            );
            self.corridor(disk_center, center.heading_rad, radius_m, apply_safety)
        })
    }

    /// Probe a single disk.
    pub fn corridor(
        &self,
        center_m: Vector2<f64>,
        heading_rad: f64,
        radius_m: f64,
        apply_safety: bool,
    ) -> DiskCorridor {
        let left_angle = wrap_angle(heading_rad + FRAC_PI_2);
        let right_angle = wrap_angle(heading_rad - FRAC_PI_2);
        let n = (self.cap_m / self.step_m) as usize;

        let mut left_bound;
        let mut right_bound;

        if self.map.clearance_m_at(center_m) > radius_m {
            // Origin is free: walk each side until the disk no longer fits.
            let right_s = self.walk(center_m, right_angle, radius_m, 0.0, n, false);
            let left_s = self.walk(center_m, left_angle, radius_m, 0.0, n, false);
            right_bound = -(right_s - self.step_m);
            left_bound = left_s - self.step_m;
        } else {
            // Origin in collision: half-range escape walks on both sides.
            let right_s = self.walk(center_m, right_angle, radius_m, 0.0, n / 2, true);
            let left_s = self.walk(center_m, left_angle, radius_m, 0.0, n / 2, true);

            if left_s < right_s {
                // Escape left: clamp the right bound to the escape distance, then continue
                // outward to the far wall.
                right_bound = left_s;
                let far = self.walk(center_m, left_angle, radius_m, left_s, n, false);
                left_bound = far - self.step_m;
            } else {
                // Escape right (ties included).
                left_bound = -right_s;
                let far = self.walk(center_m, right_angle, radius_m, right_s, n, false);
                right_bound = -(far - self.step_m);
            }
        }

        if apply_safety {
            let base = (left_bound - right_bound - self.shrink_slack_m).max(0.0);
            let margin = (self.shrink_ratio * base).min(self.shrink_cap_m);
            left_bound -= margin;
            right_bound += margin;
        }

        DiskCorridor {
            left_m: left_bound,
            right_m: right_bound,
        }
    }

    /// Step outward from `start_s` along `angle` for at most `max_steps` steps, returning the
    /// distance at which the walk stopped.
    ///
    /// With `until_free` unset the walk stops where the disk no longer fits
    /// (`clearance < radius`); with it set the walk stops where the disk first fits again
    /// (`clearance > radius`). Either way the returned distance includes the terminating step.
    fn walk(
        &self,
        center_m: Vector2<f64>,
        angle_rad: f64,
        radius_m: f64,
        start_s: f64,
        max_steps: usize,
        until_free: bool,
    ) -> f64 {
        let (sin_a, cos_a) = angle_rad.sin_cos();
        let mut s = start_s;

        for _ in 0..max_steps {
            s += self.step_m;
            let position = center_m + Vector2::new(s * cos_a, s * sin_a);
            let clearance = self.map.clearance_m_at(position);
            let stop = if until_free {
                clearance > radius_m
            } else {
                clearance < radius_m
            };
            if stop {
                break;
            }
        }

        s
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
