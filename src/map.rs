//! # Consumed map interfaces
//!
//! The optimiser does not own a map representation. It consumes two read-only interfaces
//! provided by the caller: a distance field used by the corridor probe, and a full-footprint
//! collision checker used for final output validation. Both are held by reference for the
//! duration of a planning call and are never mutated by the core.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;

use crate::footprint::VehicleFootprint;
use crate::state::State;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A signed distance field over the workspace.
pub trait DistanceMap {
    /// Distance in meters from the given position to the nearest obstacle. Zero or negative
    /// inside obstacles.
    fn clearance_m_at(&self, position_m: Vector2<f64>) -> f64;
}

/// A full-footprint collision check for a single vehicle state.
pub trait CollisionChecker {
    /// True if the vehicle at the given rear-axle state does not collide with any obstacle.
    fn is_state_free(&self, state: &State) -> bool;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A [`CollisionChecker`] derived from a distance field and the covering-disk footprint.
///
/// A state is free when every covering disk has more clearance than its inflated radius, the
/// same criterion the corridor probe uses for lateral bounds.
pub struct DiskCollisionChecker<'a, M: DistanceMap> {
    map: &'a M,
    footprint: VehicleFootprint,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a, M: DistanceMap> DiskCollisionChecker<'a, M> {
    pub fn new(map: &'a M, footprint: VehicleFootprint) -> Self {
        Self { map, footprint }
    }
}

impl<'a, M: DistanceMap> CollisionChecker for DiskCollisionChecker<'a, M> {
    fn is_state_free(&self, state: &State) -> bool {
        let (sin_h, cos_h) = state.heading_rad.sin_cos();
        let center = Vector2::new(
            state.x_m + self.footprint.rear_to_center_m() * cos_h,
            state.y_m + self.footprint.rear_to_center_m() * sin_h,
        );

        self.footprint.disks().iter().all(|&(offset_m, radius_m)| {
            let disk_center = center + Vector2::new(offset_m * cos_h, offset_m * sin_h);
            self.map.clearance_m_at(disk_center) > radius_m
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::Params;

    /// Distance field of a single circular obstacle.
    struct DiskObstacle {
        center_m: Vector2<f64>,
        radius_m: f64,
    }

    impl DistanceMap for DiskObstacle {
        fn clearance_m_at(&self, position_m: Vector2<f64>) -> f64 {
            (position_m - self.center_m).norm() - self.radius_m
        }
    }

    #[test]
    fn test_disk_checker() {
        let map = DiskObstacle {
            center_m: Vector2::new(10.0, 0.0),
            radius_m: 1.0,
        };
        let footprint = VehicleFootprint::from_params(&Params::default());
        let checker = DiskCollisionChecker::new(&map, footprint);

        // Far from the obstacle
        assert!(checker.is_state_free(&State::new(0.0, 0.0, 0.0)));

        // Front disk reaches into the obstacle's inflated region
        assert!(!checker.is_state_free(&State::new(6.0, 0.0, 0.0)));
    }
}
